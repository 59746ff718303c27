use super::walker::build_model;
use crate::{Error, LanguageType, Result, StaticModel};
use tree_sitter::Parser;

mod go;
mod python;
mod rust;
mod ts;

pub struct TypeScriptAnalyzer {
    parser: Parser,
}

pub struct PythonAnalyzer {
    parser: Parser,
}

pub struct RustAnalyzer {
    parser: Parser,
}

pub struct GoAnalyzer {
    parser: Parser,
}

fn new_parser(language: tree_sitter::Language) -> Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| Error::TreeSitter(e.to_string()))?;
    Ok(parser)
}

/// Parse source text and walk the tree into a model.
///
/// Syntax errors do not fail the analysis; they are counted on the model instead.
fn parse_model(parser: &mut Parser, source: &str, language: LanguageType) -> Result<StaticModel> {
    let tree = parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| Error::Parse("Failed to parse source code".to_string()))?;
    Ok(build_model(&tree, source, language))
}

#[cfg(test)]
pub(crate) fn fixture_path(file_name: &str) -> std::path::PathBuf {
    let manifest_dir =
        std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR should be set during tests");
    std::path::PathBuf::from(manifest_dir)
        .join("fixtures")
        .join(file_name)
}
