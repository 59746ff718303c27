use super::{RustAnalyzer, new_parser, parse_model};
use crate::{LanguageAnalyzer, LanguageType, Result, StaticModel};
use std::ops::{Deref, DerefMut};
use tree_sitter::Parser;

impl RustAnalyzer {
    pub fn try_new() -> Result<Self> {
        let parser = new_parser(tree_sitter_rust::LANGUAGE.into())?;
        Ok(Self { parser })
    }
}

impl LanguageAnalyzer for RustAnalyzer {
    fn language(&self) -> LanguageType {
        LanguageType::Rust
    }

    fn analyze_source(&mut self, source: &str) -> Result<StaticModel> {
        parse_model(self, source, LanguageType::Rust)
    }
}

impl Deref for RustAnalyzer {
    type Target = Parser;

    fn deref(&self) -> &Self::Target {
        &self.parser
    }
}

impl DerefMut for RustAnalyzer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.parser
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::lang::fixture_path;
    use crate::{StatementKind, ValueHint};

    fn analyze_fixture(file_name: &str) -> Result<StaticModel> {
        let mut analyzer = RustAnalyzer::try_new()?;
        analyzer.analyze_file(&fixture_path(file_name))
    }

    #[test]
    fn test_analyze_rust_impls() {
        let model = analyze_fixture("geometry.rs").expect("Failed to analyze Rust file");
        assert!(model.declares("Point"));
        assert!(model.declares("Shape"));
        assert_eq!(model.imports, vec!["fmt".to_string()]);

        let new = model.find_function("Point.new").unwrap();
        assert!(new.exported);
        assert_eq!(new.parameters.len(), 2);
        assert_eq!(new.return_type.as_deref(), Some("Self"));

        let distance = model.find_function("distance").unwrap();
        assert!(distance.parameters[0].is_self);
        assert_eq!(distance.required_parameters(), 1);

        // trait impl methods are public through the trait
        assert!(model.find_function("Point.fmt").unwrap().exported);
        assert!(model.find_function("load_points").unwrap().is_async);
        assert!(!model.find_function("checked_sqrt").unwrap().exported);
    }

    #[test]
    fn test_rust_tail_expression_returns() {
        let model = analyze_fixture("geometry.rs").unwrap();
        let distance = model.find_function("distance").unwrap();
        match &distance.body.statements.last().unwrap().kind {
            StatementKind::Return { value } => {
                assert_eq!(value, &Some(ValueHint::Call("sqrt".to_string())));
            }
            other => panic!("unexpected statement {other:?}"),
        }

        let checked = model.find_function("checked_sqrt").unwrap();
        assert!(checked.summary.can_throw);
        assert!(matches!(
            checked.body.statements.last().unwrap().kind,
            StatementKind::Return { .. }
        ));
    }

    #[test]
    fn test_rust_match_arms_bind_fields() {
        let model = analyze_fixture("geometry.rs").unwrap();
        let area = model.find_function("area").unwrap();
        let branch = area
            .body
            .statements
            .iter()
            .find_map(|s| match &s.kind {
                StatementKind::Branch { arms, has_else, .. } => Some((arms, *has_else)),
                _ => None,
            })
            .unwrap();
        assert!(branch.1);
        assert_eq!(branch.0.len(), 2);
        assert!(branch.0[0].bindings.contains(&"radius".to_string()));
        assert!(branch.0[1].bindings.contains(&"width".to_string()));
    }
}
