mod engine;
mod lang;
mod rules;
mod units;
mod walker;

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use engine::StaticAnalyzer;
pub use lang::{GoAnalyzer, PythonAnalyzer, RustAnalyzer, TypeScriptAnalyzer};
pub(crate) use rules::AnalyzerRules;
pub(crate) use units::is_nullable_hint;
pub use units::literal_truth;

/// The language type supported by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageType {
    /// TypeScript and JavaScript
    TypeScript,
    /// Python language
    Python,
    /// Rust language
    Rust,
    /// Go language
    Go,
}

impl LanguageType {
    /// Fence tag used when quoting source of this language.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Go => "go",
        }
    }
}

/// Trait for language-specific analyzers
pub trait LanguageAnalyzer {
    /// The language this analyzer understands
    fn language(&self) -> LanguageType;

    /// Analyze source text into a static model
    fn analyze_source(&mut self, source: &str) -> Result<StaticModel>;

    /// Read and analyze a file into a static model
    fn analyze_file(&mut self, file_path: &Path) -> Result<StaticModel> {
        if !file_path.exists() {
            return Err(crate::Error::FileNotFound(file_path.to_path_buf()));
        }
        let source = fs::read_to_string(file_path)?;
        let mut model = self.analyze_source(&source)?;
        model.path = Some(file_path.to_path_buf());
        Ok(model)
    }
}

/// Coarse runtime kind of a value, as far as it can be told from source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Number,
    String,
    Boolean,
    Null,
    Undefined,
    Array,
    Object,
    Function,
    #[serde(other)]
    Unknown,
}

/// Where a value comes from at the point it is used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "detail", rename_all = "camelCase")]
pub enum ValueHint {
    /// A literal whose kind is known
    Literal(ValueKind),
    /// The current value of a named variable
    Identifier(String),
    /// The result of calling the named function
    Call(String),
    /// Anything else
    Expression,
}

/// An identifier read by a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierRead {
    /// The identifier name
    pub name: String,

    /// Whether the value is dereferenced (member access, call, index)
    pub dereferenced: bool,
}

/// A call expression found in source
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    /// The called function or method name
    pub callee: String,

    /// The receiver expression for method calls (`obj` in `obj.run()`)
    pub receiver: Option<String>,

    /// Hints for each argument, in order
    pub arguments: Vec<ValueHint>,

    /// Whether the call result is awaited
    pub awaited: bool,

    /// 1-based line of the call
    pub line: usize,
}

/// A structural statement, in source order
#[derive(Debug, Clone)]
pub struct Statement {
    /// What the statement does
    pub kind: StatementKind,

    /// 1-based line where the statement starts
    pub line: usize,

    /// Short excerpt of the source construct
    pub text: String,

    /// Identifiers the statement reads, excluding nested calls
    pub reads: Vec<IdentifierRead>,
}

/// The kinds of statements the analyzer distinguishes
#[derive(Debug, Clone)]
pub enum StatementKind {
    Call(CallSite),
    Declaration {
        names: Vec<String>,
        value: Option<ValueHint>,
        type_hint: Option<String>,
    },
    Assignment {
        target: String,
        value: Option<ValueHint>,
    },
    Expression,
    Branch {
        condition: String,
        arms: Vec<Block>,
        has_else: bool,
    },
    Loop {
        header: String,
        /// `None` when the loop has no condition at all (`loop {}`, `for {}`)
        condition: Option<String>,
        body: Block,
    },
    Return {
        value: Option<ValueHint>,
    },
    Throw {
        value: Option<ValueHint>,
    },
    Break,
    Continue,
    Try {
        body: Block,
        handler: Option<Block>,
        finalizer: Option<Block>,
    },
}

/// A sequence of statements sharing one lexical block
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// The statements in source order
    pub statements: Vec<Statement>,

    /// Names bound when entering the block (loop variables, catch parameters, patterns)
    pub bindings: Vec<String>,

    /// 1-based line where the block starts
    pub line: usize,
}

/// Represents a parameter in a function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterModel {
    /// The name of the parameter
    pub name: String,

    /// The declared type, if any
    pub type_hint: Option<String>,

    /// Whether the caller may omit the parameter
    pub optional: bool,

    /// Whether the parameter has a default value
    pub has_default: bool,

    /// Whether the parameter collects remaining arguments
    pub variadic: bool,

    /// Whether the parameter is the receiver (`self`, `this`)
    pub is_self: bool,
}

/// Structural summary of a function body
#[derive(Debug, Clone, Default)]
pub struct BodySummary {
    /// Every call site in the body, in source order
    pub calls: Vec<CallSite>,

    /// Number of branch constructs
    pub branch_count: usize,

    /// Number of loop constructs
    pub loop_count: usize,

    /// Whether the body can raise an error that it does not handle itself
    pub can_throw: bool,
}

/// Represents a function or method in the code
#[derive(Debug, Clone)]
pub struct FunctionModel {
    /// The name of the function
    pub name: String,

    /// The owning class, impl or receiver type, for methods
    pub owner: Option<String>,

    /// The parameters of the function
    pub parameters: Vec<ParameterModel>,

    /// The return type of the function
    pub return_type: Option<String>,

    /// Whether the function is visible outside its module
    pub exported: bool,

    /// Whether the function is async
    pub is_async: bool,

    /// 1-based line of the declaration
    pub line: usize,

    /// The structured body
    pub body: Block,

    /// Counts and call sites derived from the body
    pub summary: BodySummary,
}

/// Structural model of one source text
#[derive(Debug, Clone)]
pub struct StaticModel {
    /// The file the model was read from, if any
    pub path: Option<PathBuf>,

    /// The language of the source
    pub language: LanguageType,

    /// Declared functions and methods, in source order
    pub functions: Vec<FunctionModel>,

    /// Module-level statements
    pub top_level: Block,

    /// Module-level names: variables, classes, types
    pub declarations: Vec<String>,

    /// Names bound by imports
    pub imports: Vec<String>,

    /// The package the file belongs to, for languages that name one (Go)
    pub package: Option<String>,

    /// Number of syntax error regions; non-zero means the model is partial
    pub parse_errors: usize,
}
