use super::{TypeScriptAnalyzer, new_parser, parse_model};
use crate::{LanguageAnalyzer, LanguageType, Result, StaticModel};
use std::ops::{Deref, DerefMut};
use tree_sitter::Parser;

impl TypeScriptAnalyzer {
    /// JavaScript sources go through the TypeScript grammar as well.
    pub fn try_new() -> Result<Self> {
        let parser = new_parser(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())?;
        Ok(Self { parser })
    }
}

impl LanguageAnalyzer for TypeScriptAnalyzer {
    fn language(&self) -> LanguageType {
        LanguageType::TypeScript
    }

    fn analyze_source(&mut self, source: &str) -> Result<StaticModel> {
        parse_model(self, source, LanguageType::TypeScript)
    }
}

impl Deref for TypeScriptAnalyzer {
    type Target = Parser;

    fn deref(&self) -> &Self::Target {
        &self.parser
    }
}

impl DerefMut for TypeScriptAnalyzer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.parser
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::lang::fixture_path;
    use crate::{StatementKind, ValueHint, ValueKind};

    fn analyze_fixture(file_name: &str) -> Result<StaticModel> {
        let mut analyzer = TypeScriptAnalyzer::try_new()?;
        analyzer.analyze_file(&fixture_path(file_name))
    }

    fn kinds(statements: &[crate::Statement]) -> Vec<&'static str> {
        statements
            .iter()
            .map(|s| match &s.kind {
                StatementKind::Call(_) => "call",
                StatementKind::Declaration { .. } => "declaration",
                StatementKind::Assignment { .. } => "assignment",
                StatementKind::Expression => "expression",
                StatementKind::Branch { .. } => "branch",
                StatementKind::Loop { .. } => "loop",
                StatementKind::Return { .. } => "return",
                StatementKind::Throw { .. } => "throw",
                StatementKind::Break => "break",
                StatementKind::Continue => "continue",
                StatementKind::Try { .. } => "try",
            })
            .collect()
    }

    #[test]
    fn test_analyze_ts_functions_and_methods() {
        let model = analyze_fixture("user_service.ts").expect("Failed to analyze TS file");
        assert!(!model.is_partial());
        assert_eq!(model.imports, vec!["Logger".to_string()]);
        for name in ["User", "UserRepository", "UserService", "greet"] {
            assert!(model.declares(name), "missing declaration {name}");
        }

        let get_user = model.find_function("UserService.getUser").unwrap();
        assert_eq!(get_user.owner.as_deref(), Some("UserService"));
        assert!(get_user.exported);
        assert_eq!(get_user.parameters.len(), 1);
        assert_eq!(get_user.parameters[0].type_hint.as_deref(), Some("string"));
        assert_eq!(get_user.return_type.as_deref(), Some("User"));

        let ctor = model.find_constructor("UserService").unwrap();
        assert_eq!(ctor.parameters[0].name, "repo");

        let update = model.find_function("updateEmail").unwrap();
        assert!(update.is_async);

        assert!(model.find_function("formatUser").unwrap().exported);
        assert!(!model.find_function("normalize").unwrap().exported);
        let greet = model.find_function("greet").unwrap();
        assert!(greet.exported);
        assert!(greet.summary.calls.iter().any(|c| c.callee == "normalize"));
    }

    #[test]
    fn test_ts_method_body_structure() {
        let model = analyze_fixture("user_service.ts").unwrap();
        let get_user = model.find_function("getUser").unwrap();
        assert_eq!(
            kinds(&get_user.body.statements),
            vec!["call", "declaration", "branch", "return"]
        );
        match &get_user.body.statements[0].kind {
            StatementKind::Call(call) => {
                assert_eq!(call.callee, "findById");
                assert_eq!(call.receiver.as_deref(), Some("this.repo"));
            }
            other => panic!("unexpected statement {other:?}"),
        }
        match &get_user.body.statements[2].kind {
            StatementKind::Branch { arms, has_else, .. } => {
                assert!(!has_else);
                assert_eq!(kinds(&arms[0].statements), vec!["call", "throw"]);
            }
            other => panic!("unexpected statement {other:?}"),
        }
        assert_eq!(get_user.summary.branch_count, 1);
        assert!(get_user.summary.can_throw);
    }

    #[test]
    fn test_ts_reads_and_assignments() {
        let model = analyze_fixture("user_service.ts").unwrap();
        let update = model.find_function("updateEmail").unwrap();
        let assignment = update
            .body
            .statements
            .iter()
            .find(|s| matches!(s.kind, StatementKind::Assignment { .. }))
            .unwrap();
        let user = assignment.reads.iter().find(|r| r.name == "user").unwrap();
        assert!(user.dereferenced);
        assert!(assignment.reads.iter().any(|r| r.name == "email" && !r.dereferenced));
    }

    #[test]
    fn test_ts_snippet_top_level() {
        let mut analyzer = TypeScriptAnalyzer::try_new().unwrap();
        let model = analyzer
            .analyze_source("const total = add(1, 2);\nconsole.log(total);\nlet missing = null;\n")
            .unwrap();
        assert_eq!(
            kinds(&model.top_level.statements),
            vec!["call", "declaration", "call", "declaration"]
        );
        match &model.top_level.statements[0].kind {
            StatementKind::Call(call) => {
                assert_eq!(call.callee, "add");
                assert_eq!(
                    call.arguments,
                    vec![
                        ValueHint::Literal(ValueKind::Number),
                        ValueHint::Literal(ValueKind::Number)
                    ]
                );
            }
            other => panic!("unexpected statement {other:?}"),
        }
        match &model.top_level.statements[3].kind {
            StatementKind::Declaration { value, .. } => {
                assert_eq!(value, &Some(ValueHint::Literal(ValueKind::Null)));
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_ts_partial_parse() {
        let model = analyze_fixture("broken.ts").unwrap();
        assert!(model.is_partial());
        assert!(model.find_function("ok").is_some());
    }

    #[test]
    fn test_ts_recursive_fixture() {
        let model = analyze_fixture("recursive.ts").unwrap();
        let factorial = model.find_function("factorial").unwrap();
        assert!(factorial.summary.calls.iter().any(|c| c.callee == "factorial"));
        assert_eq!(model.functions.len(), 3);
    }
}
