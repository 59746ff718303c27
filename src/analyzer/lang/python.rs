use super::{PythonAnalyzer, new_parser, parse_model};
use crate::{LanguageAnalyzer, LanguageType, Result, StaticModel};
use std::ops::{Deref, DerefMut};
use tree_sitter::Parser;

impl PythonAnalyzer {
    pub fn try_new() -> Result<Self> {
        let parser = new_parser(tree_sitter_python::LANGUAGE.into())?;
        Ok(Self { parser })
    }
}

impl LanguageAnalyzer for PythonAnalyzer {
    fn language(&self) -> LanguageType {
        LanguageType::Python
    }

    fn analyze_source(&mut self, source: &str) -> Result<StaticModel> {
        parse_model(self, source, LanguageType::Python)
    }
}

impl Deref for PythonAnalyzer {
    type Target = Parser;

    fn deref(&self) -> &Self::Target {
        &self.parser
    }
}

impl DerefMut for PythonAnalyzer {
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
        let mut analyzer = PythonAnalyzer::try_new()?;
        analyzer.analyze_file(&fixture_path(file_name))
    }

    #[test]
    fn test_analyze_python_class() {
        let model = analyze_fixture("calculator.py").expect("Failed to analyze Python file");
        assert!(model.declares("Calculator"));
        assert_eq!(model.imports, vec!["math".to_string(), "Optional".to_string()]);

        let init = model.find_constructor("Calculator").unwrap();
        assert_eq!(init.name, "__init__");
        assert!(init.parameters[0].is_self);
        assert_eq!(init.parameters[1].name, "precision");
        assert!(init.parameters[1].has_default);
        assert_eq!(init.required_parameters(), 0);

        let add = model.find_function("Calculator.add").unwrap();
        assert_eq!(add.required_parameters(), 2);
        assert_eq!(add.return_type.as_deref(), Some("float"));
    }

    #[test]
    fn test_python_exports_and_throws() {
        let model = analyze_fixture("calculator.py").unwrap();
        assert!(!model.find_function("_clamp").unwrap().exported);
        assert!(model.find_function("hypotenuse").unwrap().exported);

        let divide = model.find_function("divide").unwrap();
        assert!(divide.summary.can_throw);
        assert_eq!(divide.summary.branch_count, 1);
        assert!(!model.find_function("add").unwrap().summary.can_throw);
    }

    #[test]
    fn test_python_assignments_declare() {
        let mut analyzer = PythonAnalyzer::try_new().unwrap();
        let model = analyzer
            .analyze_source("calc = Calculator(3)\nvalue = calc.add(1, 2)\nvalue += 1\n")
            .unwrap();
        let declarations = model
            .top_level
            .statements
            .iter()
            .filter(|s| matches!(s.kind, StatementKind::Declaration { .. }))
            .count();
        assert_eq!(declarations, 2);
        assert!(matches!(
            model.top_level.statements.last().unwrap().kind,
            StatementKind::Assignment { .. }
        ));
        assert!(model.declares("calc"));
    }

    #[test]
    fn test_python_except_binding() {
        let mut analyzer = PythonAnalyzer::try_new().unwrap();
        let source = "try:\n    run()\nexcept ValueError as err:\n    print(err)\n";
        let model = analyzer.analyze_source(source).unwrap();
        match &model.top_level.statements[0].kind {
            StatementKind::Try { handler, .. } => {
                let handler = handler.as_ref().unwrap();
                assert!(handler.bindings.contains(&"err".to_string()));
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }
}
