use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for the DocuMCP library.
///
/// Errors stay inside the library: the tool façade turns every one of them into
/// a structured `success: false` response.
///
/// # Examples
///
/// ```
/// use documcp::Error;
/// use std::path::PathBuf;
///
/// let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
/// let error = Error::Io(io_err);
/// assert!(matches!(error, Error::Io(_)));
///
/// let error = Error::Parse("invalid syntax".to_string());
/// assert!(matches!(error, Error::Parse(_)));
///
/// let error = Error::FileNotFound(PathBuf::from("missing.ts"));
/// assert_eq!(error.to_string(), "File not found: missing.ts");
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The parser could not produce a syntax tree at all
    #[error("Parse error: {0}")]
    Parse(String),

    /// Tree-sitter error for tree-sitter specific failures
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    /// File not found error
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unsupported language error
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The requested entry point is not declared in the analysed source
    #[error("Entry point not found: {0}")]
    EntryPointNotFound(String),

    /// The LLM backend failed or returned something unusable
    #[error("LLM backend error: {0}")]
    Llm(String),

    /// The simulator itself faulted while tracing
    #[error("Simulation fault: {0}")]
    Simulation(String),
}

/// Result type alias for DocuMCP operations.
///
/// # Examples
///
/// ```
/// use documcp::{Error, Result};
///
/// fn lookup(name: &str) -> Result<()> {
///     Err(Error::EntryPointNotFound(name.to_string()))
/// }
///
/// assert!(lookup("main").is_err());
/// ```
pub type Result<T> = std::result::Result<T, Error>;
