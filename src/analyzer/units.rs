use super::{
    AnalyzerRules, Block, BodySummary, CallSite, FunctionModel, LanguageType, StaticModel,
    Statement, StatementKind, ValueKind,
};
use std::fmt;

/// Method names that construct an instance of their owner type.
const CONSTRUCTOR_NAMES: &[&str] = &["constructor", "__init__", "new"];

/// Implementation of StaticModel.
///
/// # Examples
///
/// ```
/// use documcp::{LanguageType, StaticModel};
///
/// let model = StaticModel::new(LanguageType::Python);
/// assert!(model.functions.is_empty());
/// assert!(!model.is_partial());
/// assert!(model.find_function("main").is_none());
/// ```
impl StaticModel {
    /// Creates an empty model for the given language.
    pub fn new(language: LanguageType) -> Self {
        Self {
            path: None,
            language,
            functions: Vec::new(),
            top_level: Block::default(),
            declarations: Vec::new(),
            imports: Vec::new(),
            package: None,
            parse_errors: 0,
        }
    }

    /// Creates the stand-in model used when a source could not be analyzed at all.
    pub fn partial(language: LanguageType) -> Self {
        Self {
            parse_errors: 1,
            ..Self::new(language)
        }
    }

    /// Whether the model was built from source with syntax errors.
    pub fn is_partial(&self) -> bool {
        self.parse_errors > 0
    }

    /// Finds a function by plain name (`run`) or qualified name (`Service.run`).
    pub fn find_function(&self, name: &str) -> Option<&FunctionModel> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.functions.iter().find(|f| f.qualified_name() == name))
    }

    /// Finds the constructor of an owner type, if the model declares one.
    pub fn find_constructor(&self, owner: &str) -> Option<&FunctionModel> {
        self.functions.iter().find(|f| {
            f.owner.as_deref() == Some(owner) && CONSTRUCTOR_NAMES.contains(&f.name.as_str())
        })
    }

    /// Resolves a call site to a declaration by name.
    ///
    /// A call to a type name resolves to that type's constructor.
    pub fn resolve_call(&self, call: &CallSite) -> Option<&FunctionModel> {
        if let Some(receiver) = call.receiver.as_deref() {
            let owned = self
                .functions
                .iter()
                .find(|f| f.name == call.callee && f.owner.as_deref() == Some(receiver));
            if owned.is_some() {
                return owned;
            }
        }
        self.find_function(&call.callee)
            .or_else(|| self.find_constructor(&call.callee))
    }

    /// Resolves a call made from inside a method of `caller_owner`.
    ///
    /// `this.run()` and `self.run()` are looked up on the caller's own type first.
    pub fn resolve_call_from(
        &self,
        call: &CallSite,
        caller_owner: Option<&str>,
    ) -> Option<&FunctionModel> {
        let rules = AnalyzerRules::for_language(self.language);
        match (call.receiver.as_deref(), caller_owner) {
            (Some(receiver), Some(owner)) if rules.is_self_word(receiver) => {
                let site = CallSite {
                    receiver: Some(owner.to_string()),
                    ..call.clone()
                };
                self.resolve_call(&site)
            }
            _ => self.resolve_call(call),
        }
    }

    /// Whether more than one declaration answers to the plain name.
    pub fn is_overloaded(&self, name: &str) -> bool {
        self.functions.iter().filter(|f| f.name == name).count() > 1
    }

    /// Whether a name is a type that owns methods in this model.
    pub fn is_owner(&self, name: &str) -> bool {
        self.functions
            .iter()
            .any(|f| f.owner.as_deref() == Some(name))
    }

    /// Whether a name is declared at module level, as a value or a type.
    pub fn declares(&self, name: &str) -> bool {
        self.declarations.iter().any(|d| d == name)
    }

    /// Whether a name is bound by an import.
    pub fn imports_name(&self, name: &str) -> bool {
        self.imports.iter().any(|i| i == name)
    }

    /// Whether a name is the package this file declares.
    pub fn is_package(&self, name: &str) -> bool {
        self.package.as_deref() == Some(name)
    }

    /// One line per function, used to describe the model to an LLM backend.
    pub fn outline(&self) -> String {
        let mut output = String::new();
        for function in &self.functions {
            let params = function
                .parameters
                .iter()
                .filter(|p| !p.is_self)
                .map(|p| match &p.type_hint {
                    Some(hint) => format!("{}: {}", p.name, hint),
                    None => p.name.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            output.push_str(&format!(
                "- {}{}({}){} [line {}, {} branches, {} loops, calls: {}]\n",
                if function.is_async { "async " } else { "" },
                function.qualified_name(),
                params,
                function
                    .return_type
                    .as_ref()
                    .map(|r| format!(" -> {}", r))
                    .unwrap_or_default(),
                function.line,
                function.summary.branch_count,
                function.summary.loop_count,
                function
                    .summary
                    .calls
                    .iter()
                    .map(|c| c.callee.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ));
        }
        output
    }
}

impl FunctionModel {
    /// The name qualified by its owner, e.g. `UserService.getUser`.
    pub fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}", owner, self.name),
            None => self.name.clone(),
        }
    }

    /// Whether the function builds an instance of its owner type.
    pub fn is_constructor(&self) -> bool {
        self.owner.is_some() && CONSTRUCTOR_NAMES.contains(&self.name.as_str())
    }

    /// Number of parameters a caller has to supply.
    pub fn required_parameters(&self) -> usize {
        self.parameters
            .iter()
            .filter(|p| !p.is_self && !p.optional && !p.variadic)
            .count()
    }
}

impl Block {
    /// Creates an empty block starting at the given line.
    pub fn new(line: usize) -> Self {
        Self {
            statements: Vec::new(),
            bindings: Vec::new(),
            line,
        }
    }

    /// Whether control can never fall off the end of this block.
    pub fn terminates(&self) -> bool {
        self.statements.last().is_some_and(Statement::terminates)
    }

    /// Whether the block contains a `break`, `return` or `throw` anywhere inside it.
    pub fn has_exit(&self) -> bool {
        self.statements.iter().any(|s| match &s.kind {
            StatementKind::Break | StatementKind::Return { .. } | StatementKind::Throw { .. } => {
                true
            }
            StatementKind::Branch { arms, .. } => arms.iter().any(Block::has_exit),
            StatementKind::Try {
                body,
                handler,
                finalizer,
            } => {
                body.has_exit()
                    || handler.as_ref().is_some_and(Block::has_exit)
                    || finalizer.as_ref().is_some_and(Block::has_exit)
            }
            // a nested loop's `break` exits only that loop
            StatementKind::Loop { body, .. } => body.contains_return_or_throw(),
            _ => false,
        })
    }

    fn contains_return_or_throw(&self) -> bool {
        self.statements.iter().any(|s| match &s.kind {
            StatementKind::Return { .. } | StatementKind::Throw { .. } => true,
            _ => s.children().any(Block::contains_return_or_throw),
        })
    }

    /// Whether the block raises an error that is not caught inside it.
    pub fn can_throw(&self) -> bool {
        self.statements.iter().any(|s| match &s.kind {
            StatementKind::Throw { .. } => true,
            StatementKind::Try {
                body,
                handler,
                finalizer,
            } => {
                (handler.is_none() && body.can_throw())
                    || handler.as_ref().is_some_and(Block::can_throw)
                    || finalizer.as_ref().is_some_and(Block::can_throw)
            }
            _ => s.children().any(Block::can_throw),
        })
    }

    /// Every call site in the block and its nested blocks, in source order.
    pub fn call_sites(&self) -> Vec<CallSite> {
        let mut calls = Vec::new();
        self.collect_calls(&mut calls);
        calls
    }

    fn collect_calls(&self, calls: &mut Vec<CallSite>) {
        for statement in &self.statements {
            if let StatementKind::Call(call) = &statement.kind {
                calls.push(call.clone());
            }
            for child in statement.children() {
                child.collect_calls(calls);
            }
        }
    }

    fn count(&self, branches: &mut usize, loops: &mut usize) {
        for statement in &self.statements {
            match &statement.kind {
                StatementKind::Branch { .. } => *branches += 1,
                StatementKind::Loop { .. } => *loops += 1,
                _ => {}
            }
            for child in statement.children() {
                child.count(branches, loops);
            }
        }
    }

    /// Derive the body summary for this block.
    pub fn summarize(&self) -> BodySummary {
        let mut branch_count = 0;
        let mut loop_count = 0;
        self.count(&mut branch_count, &mut loop_count);
        BodySummary {
            calls: self.call_sites(),
            branch_count,
            loop_count,
            can_throw: self.can_throw(),
        }
    }
}

impl Statement {
    /// Nested blocks of compound statements.
    pub fn children(&self) -> impl Iterator<Item = &Block> {
        let blocks: Vec<&Block> = match &self.kind {
            StatementKind::Branch { arms, .. } => arms.iter().collect(),
            StatementKind::Loop { body, .. } => vec![body],
            StatementKind::Try {
                body,
                handler,
                finalizer,
            } => std::iter::once(body)
                .chain(handler.iter())
                .chain(finalizer.iter())
                .collect(),
            _ => Vec::new(),
        };
        blocks.into_iter()
    }

    /// Whether control never continues to the next statement.
    pub fn terminates(&self) -> bool {
        match &self.kind {
            StatementKind::Return { .. }
            | StatementKind::Throw { .. }
            | StatementKind::Break
            | StatementKind::Continue => true,
            StatementKind::Branch { arms, has_else, .. } => {
                *has_else && !arms.is_empty() && arms.iter().all(Block::terminates)
            }
            StatementKind::Loop {
                condition, body, ..
            } => {
                let endless = match condition {
                    None => true,
                    Some(c) => literal_truth(c) == Some(true),
                };
                endless && !body.has_exit()
            }
            _ => false,
        }
    }
}

impl ValueKind {
    /// Maps a declared type to the value kind it admits.
    ///
    /// Returns `None` when the type is too loose or too complex to check.
    ///
    /// # Examples
    ///
    /// ```
    /// use documcp::ValueKind;
    ///
    /// assert_eq!(ValueKind::from_type_hint("number"), Some(ValueKind::Number));
    /// assert_eq!(ValueKind::from_type_hint("&str"), Some(ValueKind::String));
    /// assert_eq!(ValueKind::from_type_hint("Vec<u8>"), Some(ValueKind::Array));
    /// assert_eq!(ValueKind::from_type_hint("any"), None);
    /// ```
    pub fn from_type_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim().trim_start_matches('&').trim_start_matches("mut ").trim();
        let kind = match hint {
            "number" | "int" | "float" | "complex" | "bigint" | "i8" | "i16" | "i32" | "i64"
            | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128" | "usize" | "f32"
            | "f64" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16"
            | "uint32" | "uint64" | "float32" | "float64" | "byte" | "rune" => Self::Number,
            "string" | "str" | "String" => Self::String,
            "boolean" | "bool" => Self::Boolean,
            "null" | "None" | "nil" => Self::Null,
            "undefined" | "void" => Self::Undefined,
            "list" | "tuple" => Self::Array,
            "dict" | "object" | "Object" => Self::Object,
            _ if hint.ends_with("[]")
                || hint.starts_with("Array<")
                || hint.starts_with("Vec<")
                || hint.starts_with("list[")
                || hint.starts_with("List[")
                || hint.starts_with("[]")
                || (hint.starts_with('[') && hint.ends_with(']')) =>
            {
                Self::Array
            }
            _ if hint.starts_with("dict[")
                || hint.starts_with("Dict[")
                || hint.starts_with("Record<")
                || hint.starts_with("map[")
                || hint.starts_with("HashMap<") =>
            {
                Self::Object
            }
            _ => return None,
        };
        Some(kind)
    }

    /// Whether the kind is one of the scalar literal kinds.
    pub fn is_primitive(self) -> bool {
        matches!(self, Self::Number | Self::String | Self::Boolean)
    }

    /// Whether the kind denotes an absent value.
    pub fn is_nullish(self) -> bool {
        matches!(self, Self::Null | Self::Undefined)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Array => "array",
            Self::Object => "object",
            Self::Function => "function",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Whether a declared type explicitly admits an absent value.
pub(crate) fn is_nullable_hint(hint: &str) -> bool {
    let hint = hint.trim();
    hint.contains('|')
        || hint.ends_with('?')
        || hint.starts_with("Option<")
        || hint.starts_with("Optional[")
        || hint.starts_with('*')
        || hint.contains("None")
        || hint.contains("null")
        || hint.contains("undefined")
        || matches!(hint, "any" | "unknown" | "Any" | "object" | "interface{}")
}

/// Evaluates a condition that is a plain literal.
///
/// Returns `None` for anything that needs runtime information.
///
/// # Examples
///
/// ```
/// use documcp::literal_truth;
///
/// assert_eq!(literal_truth("(true)"), Some(true));
/// assert_eq!(literal_truth("False"), Some(false));
/// assert_eq!(literal_truth("user.active"), None);
/// ```
pub fn literal_truth(condition: &str) -> Option<bool> {
    let mut text = condition.trim();
    while text.starts_with('(') && text.ends_with(')') && text.len() >= 2 {
        text = text[1..text.len() - 1].trim();
    }
    match text {
        "true" | "True" | "1" => Some(true),
        "false" | "False" | "0" | "null" | "None" | "nil" | "undefined" => Some(false),
        _ => None,
    }
}
