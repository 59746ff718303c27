use super::{GoAnalyzer, new_parser, parse_model};
use crate::{LanguageAnalyzer, LanguageType, Result, StaticModel};
use std::ops::{Deref, DerefMut};
use tree_sitter::Parser;

impl GoAnalyzer {
    pub fn try_new() -> Result<Self> {
        let parser = new_parser(tree_sitter_go::LANGUAGE.into())?;
        Ok(Self { parser })
    }
}

impl LanguageAnalyzer for GoAnalyzer {
    fn language(&self) -> LanguageType {
        LanguageType::Go
    }

    fn analyze_source(&mut self, source: &str) -> Result<StaticModel> {
        parse_model(self, source, LanguageType::Go)
    }
}

impl Deref for GoAnalyzer {
    type Target = Parser;

    fn deref(&self) -> &Self::Target {
        &self.parser
    }
}

impl DerefMut for GoAnalyzer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.parser
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatementKind;
    use crate::analyzer::lang::fixture_path;

    fn analyze_fixture(file_name: &str) -> Result<StaticModel> {
        let mut analyzer = GoAnalyzer::try_new()?;
        analyzer.analyze_file(&fixture_path(file_name))
    }

    #[test]
    fn test_analyze_go_methods() {
        let model = analyze_fixture("inventory.go").expect("Failed to analyze Go file");
        assert_eq!(model.imports, vec!["errors".to_string(), "fmt".to_string()]);
        assert_eq!(model.package.as_deref(), Some("inventory"));
        assert!(model.is_package("inventory"));
        assert!(model.declares("Item"));
        assert!(model.declares("Inventory"));

        let add = model.find_function("Inventory.Add").unwrap();
        assert!(add.exported);
        assert_eq!(add.parameters[0].name, "inv");
        assert!(add.parameters[0].is_self);
        assert_eq!(add.required_parameters(), 2);
        assert_eq!(add.return_type.as_deref(), Some("error"));

        assert!(model.find_function("NewInventory").unwrap().exported);
        assert!(!model.find_function("describe").unwrap().exported);
    }

    #[test]
    fn test_go_panic_and_range_loop() {
        let model = analyze_fixture("inventory.go").unwrap();
        assert!(model.find_function("mustPositive").unwrap().summary.can_throw);

        let total = model.find_function("Total").unwrap();
        assert_eq!(total.summary.loop_count, 1);
        let body = total
            .body
            .statements
            .iter()
            .find_map(|s| match &s.kind {
                StatementKind::Loop { body, condition, .. } => Some((body, condition.clone())),
                _ => None,
            })
            .unwrap();
        assert!(body.0.bindings.contains(&"item".to_string()));
        assert_eq!(body.1.as_deref(), Some("inv.items"));
    }

    #[test]
    fn test_go_short_var_declaration() {
        let model = analyze_fixture("inventory.go").unwrap();
        let add = model.find_function("Add").unwrap();
        let names: Vec<String> = add
            .body
            .statements
            .iter()
            .filter_map(|s| match &s.kind {
                StatementKind::Declaration { names, .. } => Some(names.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(names, vec!["item".to_string(), "ok".to_string()]);
    }
}
