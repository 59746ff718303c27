use super::{
    BindingState, CallResolution, ExecutionStep, IssueType, PotentialIssue, Severity,
    SimulationOptions, StepOperation,
};
use crate::analyzer::{AnalyzerRules, is_nullable_hint};
use crate::{LanguageType, ValueKind};
use std::collections::HashSet;

/// Run every enabled detection pass over the steps of a trace.
///
/// Each pass reads the steps on its own, so turning one off never changes
/// what the others report. The error-handling pass always runs.
pub(crate) fn detect_issues(
    steps: &[ExecutionStep],
    language: LanguageType,
    options: &SimulationOptions,
    unresolved_entry: Option<&str>,
) -> Vec<PotentialIssue> {
    let rules = AnalyzerRules::for_language(language);
    let mut issues = Vec::new();
    if options.detect_null_refs {
        issues.extend(null_references(steps, unresolved_entry));
    }
    if options.detect_type_mismatches {
        issues.extend(type_mismatches(steps, &rules, language));
    }
    if options.detect_unreachable_code {
        issues.extend(unreachable_code(steps));
    }
    issues.extend(missing_error_handling(steps, &rules, language));
    issues
}

/// Drop repeated issues, keeping the first of each.
pub(crate) fn dedupe(issues: Vec<PotentialIssue>) -> Vec<PotentialIssue> {
    let mut seen = HashSet::new();
    issues
        .into_iter()
        .filter(|issue| {
            seen.insert((
                issue.issue_type,
                issue.location.function.clone(),
                issue.location.line,
                issue.message.clone(),
            ))
        })
        .collect()
}

fn on_path_severity(step: &ExecutionStep, hard: bool) -> Severity {
    if hard && step.on_path {
        Severity::Error
    } else {
        Severity::Warning
    }
}

/// Null dereferences, unsupplied parameters and names with no declaration.
fn null_references(steps: &[ExecutionStep], unresolved_entry: Option<&str>) -> Vec<PotentialIssue> {
    let mut issues = Vec::new();
    let mut reported: HashSet<(String, String)> = HashSet::new();
    for step in steps.iter().filter(|s| s.reachable) {
        for read in &step.reads {
            let found = match &read.state {
                BindingState::Unbound => Some((
                    IssueType::UndefinedVariable,
                    on_path_severity(step, true),
                    format!("`{}` is used but never declared", read.name),
                )),
                BindingState::Missing => Some((
                    IssueType::NullReference,
                    on_path_severity(step, read.dereferenced && !read.checked),
                    format!(
                        "`{}` is a required parameter the caller never supplied",
                        read.name
                    ),
                )),
                BindingState::Local { kind } | BindingState::Parameter { kind }
                    if kind.is_nullish() && read.dereferenced && !read.checked =>
                {
                    Some((
                        IssueType::NullReference,
                        on_path_severity(step, true),
                        format!("`{}` is {} where it is dereferenced", read.name, kind),
                    ))
                }
                _ => None,
            };
            if let Some((issue_type, severity, message)) = found {
                if reported.insert((step.function.clone(), read.name.clone())) {
                    issues.push(PotentialIssue::at(step, issue_type, severity, message));
                }
            }
        }

        let Some(call) = &step.call else {
            continue;
        };
        let plain_unresolved =
            call.resolution == CallResolution::Unresolved && call.receiver.is_none();
        if plain_unresolved
            && unresolved_entry != Some(call.callee.as_str())
            && reported.insert((step.function.clone(), call.callee.clone()))
        {
            issues.push(PotentialIssue::at(
                step,
                IssueType::UndefinedVariable,
                Severity::Warning,
                format!("`{}` is called but never declared", call.callee),
            ));
        }
    }
    issues
}

/// Arguments against parameter hints, arity, and values changing kind.
fn type_mismatches(
    steps: &[ExecutionStep],
    rules: &AnalyzerRules,
    language: LanguageType,
) -> Vec<PotentialIssue> {
    let hinted = if rules.enforces_type_hints {
        Severity::Error
    } else {
        Severity::Warning
    };
    // JavaScript tolerates a wrong argument count at runtime
    let arity = if language == LanguageType::TypeScript {
        Severity::Warning
    } else {
        Severity::Error
    };
    let mut issues = Vec::new();
    for step in steps.iter().filter(|s| s.reachable) {
        if let Some(call) = &step.call {
            let resolved = matches!(
                call.resolution,
                CallResolution::Resolved | CallResolution::NotEntered | CallResolution::Recursive
            );
            if let (true, Some(target)) = (resolved, &call.target) {
                let params = &call.parameters;
                let required = params.iter().filter(|p| !p.optional && !p.variadic).count();
                let variadic = params.iter().any(|p| p.variadic);
                let given = call.arguments.len();
                if given < required {
                    issues.push(PotentialIssue::at(
                        step,
                        IssueType::TypeMismatch,
                        arity,
                        format!(
                            "`{}` expects at least {} argument(s) but gets {}",
                            target, required, given
                        ),
                    ));
                } else if !variadic && given > params.len() {
                    issues.push(PotentialIssue::at(
                        step,
                        IssueType::TypeMismatch,
                        arity,
                        format!(
                            "`{}` takes at most {} argument(s) but gets {}",
                            target,
                            params.len(),
                            given
                        ),
                    ));
                }
                for (param, actual) in params.iter().zip(&call.arguments) {
                    if param.variadic {
                        break;
                    }
                    let Some(hint) = param.type_hint.as_deref() else {
                        continue;
                    };
                    let Some(expected) = ValueKind::from_type_hint(hint) else {
                        continue;
                    };
                    if *actual == ValueKind::Unknown || *actual == expected {
                        continue;
                    }
                    if actual.is_nullish() && (param.optional || is_nullable_hint(hint)) {
                        continue;
                    }
                    issues.push(PotentialIssue::at(
                        step,
                        IssueType::TypeMismatch,
                        hinted,
                        format!(
                            "Argument `{}` of `{}` expects {} but receives {}",
                            param.name, target, expected, actual
                        ),
                    ));
                }
            }
        }

        for write in &step.writes {
            if write.declared {
                let Some(hint) = write.type_hint.as_deref() else {
                    continue;
                };
                let Some(expected) = ValueKind::from_type_hint(hint) else {
                    continue;
                };
                let actual = write.kind;
                let tolerated = actual == ValueKind::Unknown
                    || actual == expected
                    || (actual.is_nullish() && is_nullable_hint(hint))
                    // an uninitialised declaration is not a mismatch
                    || (actual == ValueKind::Undefined && step.value == Some(ValueKind::Undefined)
                        && !step.construct.contains('='));
                if !tolerated {
                    issues.push(PotentialIssue::at(
                        step,
                        IssueType::TypeMismatch,
                        hinted,
                        format!(
                            "`{}` is declared as {} but initialised with {}",
                            write.name, hint, actual
                        ),
                    ));
                }
            } else if rules.enforces_type_hints {
                let Some(previous) = write.previous else {
                    continue;
                };
                if previous.is_primitive() && write.kind.is_primitive() && previous != write.kind
                {
                    issues.push(PotentialIssue::at(
                        step,
                        IssueType::TypeMismatch,
                        Severity::Warning,
                        format!(
                            "`{}` changes from {} to {}",
                            write.name, previous, write.kind
                        ),
                    ));
                }
            }
        }
    }
    issues
}

/// Dead statements and loops that never exit.
fn unreachable_code(steps: &[ExecutionStep]) -> Vec<PotentialIssue> {
    let mut issues = Vec::new();
    let mut dead_run: Option<&str> = None;
    for step in steps {
        if step.reachable {
            dead_run = None;
        } else {
            // one issue per run of dead steps in a function
            if dead_run != Some(step.function.as_str()) {
                issues.push(PotentialIssue::at(
                    step,
                    IssueType::UnreachableCode,
                    Severity::Warning,
                    format!("Code at line {} can never run", step.line),
                ));
            }
            dead_run = Some(step.function.as_str());
        }

        let endless = step.operation == StepOperation::Loop
            && step.reachable
            && step.branch.as_ref().is_some_and(|b| b.infinite);
        if endless {
            let condition = step
                .branch
                .as_ref()
                .map(|b| b.condition.as_str())
                .unwrap_or_default();
            issues.push(PotentialIssue::at(
                step,
                IssueType::InfiniteLoop,
                Severity::Warning,
                format!("Loop `{}` has no way to exit", condition),
            ));
        }
    }
    issues
}

/// Calls into failing code that nothing guards, un-awaited async calls and panicking helpers.
fn missing_error_handling(
    steps: &[ExecutionStep],
    rules: &AnalyzerRules,
    language: LanguageType,
) -> Vec<PotentialIssue> {
    let has_promises = matches!(language, LanguageType::TypeScript | LanguageType::Python);
    let mut issues = Vec::new();
    for step in steps.iter().filter(|s| s.reachable) {
        let Some(call) = &step.call else {
            continue;
        };
        if step.on_path && step.call_depth == 0 && call.can_throw && !step.guarded {
            issues.push(PotentialIssue::at(
                step,
                IssueType::MissingErrorHandling,
                Severity::Warning,
                format!(
                    "`{}` can raise an error but the call is not wrapped in error handling",
                    call.callee
                ),
            ));
        }
        if has_promises && call.is_async && !call.awaited {
            issues.push(PotentialIssue::at(
                step,
                IssueType::MissingErrorHandling,
                Severity::Warning,
                format!(
                    "`{}` is async but never awaited, so its failures go unnoticed",
                    call.callee
                ),
            ));
        }
        if rules.panicking_methods.contains(&call.callee.as_str()) {
            issues.push(PotentialIssue::at(
                step,
                IssueType::MissingErrorHandling,
                Severity::Info,
                format!("`{}` panics instead of handling the failure", call.callee),
            ));
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{CallInfo, ControlInfo, ParameterSpec, VariableRead, VariableWrite};

    fn step(id: usize, operation: StepOperation) -> ExecutionStep {
        ExecutionStep {
            id: format!("step-{}", id),
            operation,
            construct: String::new(),
            function: "main".to_string(),
            line: id,
            call_depth: 0,
            on_path: true,
            reachable: true,
            guarded: false,
            reads: Vec::new(),
            writes: Vec::new(),
            call: None,
            branch: None,
            value: None,
        }
    }

    fn read(name: &str, state: BindingState, dereferenced: bool) -> VariableRead {
        VariableRead {
            name: name.to_string(),
            state,
            dereferenced,
            checked: false,
        }
    }

    fn call(callee: &str, resolution: CallResolution) -> CallInfo {
        CallInfo {
            callee: callee.to_string(),
            receiver: None,
            resolution,
            target: Some(callee.to_string()),
            arguments: Vec::new(),
            parameters: Vec::new(),
            awaited: false,
            is_async: false,
            can_throw: false,
        }
    }

    fn types(issues: &[PotentialIssue]) -> Vec<IssueType> {
        issues.iter().map(|i| i.issue_type).collect()
    }

    #[test]
    fn test_null_dereference_and_unbound_names() {
        let mut s = step(1, StepOperation::Expression);
        s.reads.push(read(
            "user",
            BindingState::Local {
                kind: ValueKind::Null,
            },
            true,
        ));
        s.reads.push(read("ghost", BindingState::Unbound, false));
        let issues = null_references(&[s], None);
        assert_eq!(
            types(&issues),
            vec![IssueType::NullReference, IssueType::UndefinedVariable]
        );
        assert!(issues.iter().all(|i| i.severity == Severity::Error));
    }

    #[test]
    fn test_checked_and_off_path_reads_are_softer() {
        let mut checked = step(1, StepOperation::Expression);
        checked.reads.push(VariableRead {
            checked: true,
            ..read("user", BindingState::Missing, true)
        });
        let mut off_path = step(2, StepOperation::Expression);
        off_path.function = "other".to_string();
        off_path.on_path = false;
        off_path.reads.push(read("id", BindingState::Missing, true));
        let issues = null_references(&[checked, off_path], None);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.severity == Severity::Warning));
    }

    #[test]
    fn test_unresolved_entry_call_is_not_reported_twice() {
        let mut s = step(1, StepOperation::Call);
        s.call = Some(call("foo", CallResolution::Unresolved));
        assert!(null_references(std::slice::from_ref(&s), Some("foo")).is_empty());
        assert_eq!(null_references(&[s], None).len(), 1);
    }

    #[test]
    fn test_arity_and_argument_kinds() {
        let mut s = step(1, StepOperation::Call);
        let mut info = call("area", CallResolution::Resolved);
        info.parameters = vec![
            ParameterSpec {
                name: "width".to_string(),
                type_hint: Some("number".to_string()),
                optional: false,
                variadic: false,
            },
            ParameterSpec {
                name: "height".to_string(),
                type_hint: Some("number".to_string()),
                optional: false,
                variadic: false,
            },
        ];
        info.arguments = vec![ValueKind::String];
        s.call = Some(info);
        let rules = AnalyzerRules::for_language(LanguageType::Rust);
        let issues = type_mismatches(&[s], &rules, LanguageType::Rust);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].message.contains("at least 2"));
        assert!(issues[1].message.contains("expects number but receives string"));
        assert!(issues.iter().all(|i| i.severity == Severity::Error));

        // the same target invoked as the entry point has no caller to blame
        let mut entry = step(2, StepOperation::Call);
        let mut info = call("area", CallResolution::Entry);
        info.parameters = vec![ParameterSpec {
            name: "width".to_string(),
            type_hint: Some("number".to_string()),
            optional: false,
            variadic: false,
        }];
        entry.call = Some(info);
        assert!(type_mismatches(&[entry], &rules, LanguageType::Rust).is_empty());
    }

    #[test]
    fn test_python_hints_only_warn() {
        let mut s = step(1, StepOperation::Declaration);
        s.construct = "count: int = \"three\"".to_string();
        s.writes.push(VariableWrite {
            name: "count".to_string(),
            kind: ValueKind::String,
            declared: true,
            type_hint: Some("int".to_string()),
            previous: None,
            parameter: false,
        });
        let rules = AnalyzerRules::for_language(LanguageType::Python);
        let issues = type_mismatches(&[s], &rules, LanguageType::Python);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
    }

    #[test]
    fn test_reassignment_to_other_primitive() {
        let mut s = step(1, StepOperation::Assignment);
        s.writes.push(VariableWrite {
            name: "total".to_string(),
            kind: ValueKind::String,
            declared: false,
            type_hint: None,
            previous: Some(ValueKind::Number),
            parameter: false,
        });
        let ts = AnalyzerRules::for_language(LanguageType::TypeScript);
        let issues = type_mismatches(std::slice::from_ref(&s), &ts, LanguageType::TypeScript);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("from number to string"));

        let py = AnalyzerRules::for_language(LanguageType::Python);
        assert!(type_mismatches(&[s], &py, LanguageType::Python).is_empty());
    }

    #[test]
    fn test_dead_runs_and_infinite_loops() {
        let mut looped = step(1, StepOperation::Loop);
        looped.branch = Some(ControlInfo {
            condition: "true".to_string(),
            taken: Some(0),
            arms: 1,
            has_else: false,
            resolved: true,
            infinite: true,
        });
        let mut dead_a = step(2, StepOperation::Call);
        dead_a.reachable = false;
        dead_a.on_path = false;
        let mut dead_b = step(3, StepOperation::Return);
        dead_b.reachable = false;
        dead_b.on_path = false;
        let issues = unreachable_code(&[looped, dead_a, dead_b]);
        assert_eq!(
            types(&issues),
            vec![IssueType::InfiniteLoop, IssueType::UnreachableCode]
        );
    }

    #[test]
    fn test_error_handling_pass() {
        let mut risky = step(1, StepOperation::Call);
        let mut info = call("load", CallResolution::Resolved);
        info.can_throw = true;
        risky.call = Some(info.clone());
        let mut guarded = step(2, StepOperation::Call);
        guarded.guarded = true;
        guarded.call = Some(info);
        let mut unwrap = step(3, StepOperation::Call);
        unwrap.call = Some(call("unwrap", CallResolution::Builtin));

        let rules = AnalyzerRules::for_language(LanguageType::Rust);
        let issues = missing_error_handling(&[risky, guarded, unwrap], &rules, LanguageType::Rust);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].location.line, 1);
        assert_eq!(issues[1].severity, Severity::Info);
    }

    #[test]
    fn test_toggles_are_independent() {
        let mut s = step(1, StepOperation::Expression);
        s.reads.push(read("ghost", BindingState::Unbound, false));
        let mut dead = step(2, StepOperation::Call);
        dead.reachable = false;
        let steps = vec![s, dead];

        let all = detect_issues(
            &steps,
            LanguageType::TypeScript,
            &SimulationOptions::default(),
            None,
        );
        let no_nulls = detect_issues(
            &steps,
            LanguageType::TypeScript,
            &SimulationOptions {
                detect_null_refs: false,
                ..Default::default()
            },
            None,
        );
        let unreachable = |issues: &[PotentialIssue]| {
            issues
                .iter()
                .filter(|i| i.issue_type == IssueType::UnreachableCode)
                .count()
        };
        assert_eq!(unreachable(&all), unreachable(&no_nulls));
        assert!(types(&all).contains(&IssueType::UndefinedVariable));
        assert!(!types(&no_nulls).contains(&IssueType::UndefinedVariable));
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let s = step(1, StepOperation::Expression);
        let issue = PotentialIssue::at(&s, IssueType::Other, Severity::Info, "same");
        assert_eq!(dedupe(vec![issue.clone(), issue]).len(), 1);
    }
}
