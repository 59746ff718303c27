use super::{
    GoAnalyzer, LanguageAnalyzer, LanguageType, PythonAnalyzer, RustAnalyzer, StaticModel,
    TypeScriptAnalyzer,
};
use crate::{Error, Result};
use regex::Regex;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Keyword patterns used to guess the language of a bare snippet.
static LANGUAGE_HINTS: LazyLock<Vec<(LanguageType, Regex)>> = LazyLock::new(|| {
    [
        (LanguageType::Rust, r"\bfn\s+\w+\s*[(<]"),
        (LanguageType::Rust, r"\blet\s+mut\b"),
        (LanguageType::Rust, r"\bimpl\b[^{]*\{"),
        (LanguageType::Rust, r"\w+!\("),
        (LanguageType::Rust, r"\w::\w"),
        (LanguageType::Go, r"(?m)^\s*package\s+\w+"),
        (LanguageType::Go, r"\bfunc\b"),
        (LanguageType::Go, r":="),
        (LanguageType::Go, r"\bfmt\.\w+"),
        (LanguageType::Python, r"(?m)^\s*def\s+\w+\s*\(.*\)\s*(->.*)?:\s*$"),
        (LanguageType::Python, r"(?m)^\s*(from\s+[\w.]+\s+)?import\s+[\w.]+\s*$"),
        (LanguageType::Python, r"\bself\."),
        (LanguageType::Python, r"(?m)^\s*(elif|except)\b"),
        (LanguageType::Python, r"\b(None|True|False)\b"),
        (LanguageType::TypeScript, r"\b(const|let|var)\s+\w+\s*(:\s*[\w<>\[\]]+\s*)?="),
        (LanguageType::TypeScript, r"\bfunction\b"),
        (LanguageType::TypeScript, r"=>"),
        (LanguageType::TypeScript, r"==="),
        (LanguageType::TypeScript, r"\bconsole\.\w+"),
        (LanguageType::TypeScript, r";\s*$"),
    ]
    .into_iter()
    .filter_map(|(language, pattern)| Regex::new(pattern).ok().map(|re| (language, re)))
    .collect()
});

/// The static analyzer: one tree-sitter backed analyzer per supported language.
///
/// Parsers are created lazily by [`StaticAnalyzer::initialize`], which is idempotent.
///
/// # Examples
///
/// ```
/// use documcp::{LanguageType, StaticAnalyzer};
///
/// let mut analyzer = StaticAnalyzer::new();
/// analyzer.initialize().unwrap();
/// analyzer.initialize().unwrap();
///
/// let model = analyzer
///     .analyze_source("function add(a, b) { return a + b; }", LanguageType::TypeScript)
///     .unwrap();
/// assert_eq!(model.functions[0].name, "add");
/// ```
#[derive(Default)]
pub struct StaticAnalyzer {
    typescript: Option<TypeScriptAnalyzer>,
    python: Option<PythonAnalyzer>,
    rust: Option<RustAnalyzer>,
    go: Option<GoAnalyzer>,
}

impl StaticAnalyzer {
    /// Create an analyzer with no parsers loaded yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an analyzer with all parsers loaded
    pub fn try_new() -> Result<Self> {
        let mut analyzer = Self::new();
        analyzer.initialize()?;
        Ok(analyzer)
    }

    /// Load every language parser. Calling it again is a no-op.
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.typescript = Some(TypeScriptAnalyzer::try_new()?);
        self.python = Some(PythonAnalyzer::try_new()?);
        self.rust = Some(RustAnalyzer::try_new()?);
        self.go = Some(GoAnalyzer::try_new()?);
        debug!("static analyzer initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.typescript.is_some() && self.python.is_some() && self.rust.is_some() && self.go.is_some()
    }

    /// Detect the language type from a file extension
    pub fn detect_language(path: &Path) -> Option<LanguageType> {
        match path.extension().and_then(OsStr::to_str) {
            Some("ts") | Some("tsx") | Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => {
                Some(LanguageType::TypeScript)
            }
            Some("py") => Some(LanguageType::Python),
            Some("rs") => Some(LanguageType::Rust),
            Some("go") => Some(LanguageType::Go),
            _ => None,
        }
    }

    /// Parse a language name as given by a caller (`"ts"`, `"python"`, `"golang"`).
    pub fn parse_language(name: &str) -> Result<LanguageType> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ts" | "typescript" | "js" | "javascript" | "tsx" | "jsx" => {
                Ok(LanguageType::TypeScript)
            }
            "py" | "python" => Ok(LanguageType::Python),
            "rs" | "rust" => Ok(LanguageType::Rust),
            "go" | "golang" => Ok(LanguageType::Go),
            other => Err(Error::UnsupportedLanguage(other.to_string())),
        }
    }

    /// Guess the language of a snippet by keyword heuristics.
    ///
    /// Ties and snippets with no signal default to TypeScript/JavaScript.
    ///
    /// # Examples
    ///
    /// ```
    /// use documcp::{LanguageType, StaticAnalyzer};
    ///
    /// let source = "def greet(name):\n    return name\n";
    /// assert_eq!(StaticAnalyzer::detect_language_from_source(source), LanguageType::Python);
    /// assert_eq!(StaticAnalyzer::detect_language_from_source("foo();"), LanguageType::TypeScript);
    /// ```
    pub fn detect_language_from_source(source: &str) -> LanguageType {
        let order = [
            LanguageType::TypeScript,
            LanguageType::Python,
            LanguageType::Rust,
            LanguageType::Go,
        ];
        let score = |language: LanguageType| {
            LANGUAGE_HINTS
                .iter()
                .filter(|(l, re)| *l == language && re.is_match(source))
                .count()
        };
        let mut best = (LanguageType::TypeScript, score(LanguageType::TypeScript));
        for language in order.into_iter().skip(1) {
            let s = score(language);
            if s > best.1 {
                best = (language, s);
            }
        }
        best.0
    }

    fn analyzer_mut(&mut self, language: LanguageType) -> Result<&mut dyn LanguageAnalyzer> {
        self.initialize()?;
        let analyzer: Option<&mut dyn LanguageAnalyzer> = match language {
            LanguageType::TypeScript => self.typescript.as_mut().map(|a| a as &mut dyn LanguageAnalyzer),
            LanguageType::Python => self.python.as_mut().map(|a| a as &mut dyn LanguageAnalyzer),
            LanguageType::Rust => self.rust.as_mut().map(|a| a as &mut dyn LanguageAnalyzer),
            LanguageType::Go => self.go.as_mut().map(|a| a as &mut dyn LanguageAnalyzer),
        };
        analyzer.ok_or_else(|| Error::UnsupportedLanguage(format!("{:?}", language)))
    }

    /// Analyze a file, or return `None` when its language is not supported
    pub fn analyze_file(&mut self, file_path: &Path) -> Result<Option<StaticModel>> {
        let Some(language) = Self::detect_language(file_path) else {
            debug!("no analyzer for {}", file_path.display());
            return Ok(None);
        };
        let model = self.analyzer_mut(language)?.analyze_file(file_path)?;
        if model.is_partial() {
            warn!(
                "{} has {} syntax error region(s); using a partial model",
                file_path.display(),
                model.parse_errors
            );
        }
        Ok(Some(model))
    }

    /// Analyze source text in a known language
    pub fn analyze_source(&mut self, source: &str, language: LanguageType) -> Result<StaticModel> {
        let model = self.analyzer_mut(language)?.analyze_source(source)?;
        if model.is_partial() {
            warn!(
                "{:?} source has {} syntax error region(s); using a partial model",
                language, model.parse_errors
            );
        }
        debug!(
            "analyzed {:?} source: {} function(s), {} top-level statement(s)",
            language,
            model.functions.len(),
            model.top_level.statements.len()
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_detect_language_by_extension() {
        assert_eq!(
            StaticAnalyzer::detect_language(Path::new("a/b/service.tsx")),
            Some(LanguageType::TypeScript)
        );
        assert_eq!(
            StaticAnalyzer::detect_language(Path::new("lib.rs")),
            Some(LanguageType::Rust)
        );
        assert_eq!(StaticAnalyzer::detect_language(Path::new("README.md")), None);
    }

    #[test]
    fn test_detect_language_from_source() {
        let rust = "fn main() {\n    let mut v = Vec::new();\n    println!(\"{:?}\", v);\n}";
        assert_eq!(
            StaticAnalyzer::detect_language_from_source(rust),
            LanguageType::Rust
        );
        let go = "package main\n\nfunc main() {\n\tx := 1\n\tfmt.Println(x)\n}";
        assert_eq!(StaticAnalyzer::detect_language_from_source(go), LanguageType::Go);
        let ts = "const user = getUser(1);\nconsole.log(user.name);";
        assert_eq!(
            StaticAnalyzer::detect_language_from_source(ts),
            LanguageType::TypeScript
        );
    }

    #[test]
    fn test_parse_language_names() {
        assert_eq!(
            StaticAnalyzer::parse_language("JavaScript").unwrap(),
            LanguageType::TypeScript
        );
        assert_eq!(StaticAnalyzer::parse_language("golang").unwrap(), LanguageType::Go);
        assert!(matches!(
            StaticAnalyzer::parse_language("cobol"),
            Err(Error::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_analyze_file_unsupported_and_missing() {
        let mut analyzer = StaticAnalyzer::new();
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        writeln!(file, "plain text").unwrap();
        assert!(analyzer.analyze_file(file.path()).unwrap().is_none());

        let missing = analyzer.analyze_file(Path::new("/definitely/missing/file.py"));
        assert!(matches!(missing, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_analyze_file_from_temp_source() {
        let mut analyzer = StaticAnalyzer::try_new().unwrap();
        let mut file = NamedTempFile::with_suffix(".py").unwrap();
        writeln!(file, "def area(r):\n    return 3.14 * r * r\n").unwrap();
        let model = analyzer.analyze_file(file.path()).unwrap().unwrap();
        assert_eq!(model.language, LanguageType::Python);
        assert_eq!(model.path.as_deref(), Some(file.path()));
        assert_eq!(model.functions[0].name, "area");
    }
}
