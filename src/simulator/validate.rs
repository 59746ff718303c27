use super::{ExecutionTrace, IssueType, Severity, StepOperation};
use crate::ValueKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

static NEGATED_THROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:does\s+not|doesn't|never|without|won't|will\s+not|should\s+not|shouldn't|cannot|can't)\s+(?:\w+\s+)?(?:throw|throws|throwing|raise|raises|raising|panic|panics|panicking|error|errors|fail|fails|failing)\b|\bno\s+(?:error|errors|exception|exceptions|panic)\b",
    )
    .expect("valid regex")
});

static THROWS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:throw|throws|throwing|raise|raises|raising|panic|panics|panicking|reject|rejects|exception|errors\s+out)\b",
    )
    .expect("valid regex")
});

static RETURNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\breturns?\s+(?:an?\s+|the\s+)?(\w+)").expect("valid regex")
});

static MENTIONED_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`([A-Za-z_][A-Za-z0-9_.:]*)\([^`]*\)`").expect("valid regex")
});

/// Outcome of checking a trace against its documented behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleValidationResult {
    /// The trace ends normally with no error-severity issue
    pub is_valid: bool,
    /// Valid, and nothing in the expected behaviour contradicts the trace
    pub matches_documentation: bool,
    pub suggestions: Vec<String>,
}

/// Compares free-text expected behaviour with what a trace shows.
///
/// Implementations are heuristic. A contradiction is a statement in the
/// expected behaviour the trace clearly disagrees with; silence is not one.
pub trait BehaviorMatcher: fmt::Debug + Send + Sync {
    fn contradictions(&self, trace: &ExecutionTrace, expected: &str) -> Vec<String>;
}

/// Keyword-level matcher for raising, returned kinds and mentioned calls
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordMatcher;

impl KeywordMatcher {
    fn traced_throw(trace: &ExecutionTrace) -> Option<usize> {
        trace
            .path_steps()
            .find(|s| s.reachable && s.operation == StepOperation::Throw)
            .map(|s| s.line)
    }

    fn can_throw_anywhere(trace: &ExecutionTrace) -> bool {
        trace.execution_steps.iter().any(|s| {
            s.reachable
                && (s.operation == StepOperation::Throw
                    || s.call.as_ref().is_some_and(|c| c.can_throw))
        })
    }

    /// Kinds returned by the outermost function that returns on the path.
    fn returned_kinds(trace: &ExecutionTrace) -> BTreeSet<String> {
        let returns: Vec<_> = trace
            .path_steps()
            .filter(|s| s.reachable && s.operation == StepOperation::Return)
            .collect();
        let depth = returns
            .iter()
            .map(|s| s.call_depth)
            .filter(|d| *d > 0)
            .min()
            .unwrap_or(0);
        returns
            .iter()
            .filter(|s| s.call_depth == depth)
            .filter_map(|s| s.value)
            .filter(|k| *k != ValueKind::Unknown)
            .map(|k| k.to_string())
            .collect()
    }

    fn kind_of_word(word: &str) -> Option<ValueKind> {
        let kind = match word.to_ascii_lowercase().as_str() {
            "number" | "numeric" | "integer" | "int" | "float" | "count" | "sum" => {
                ValueKind::Number
            }
            "string" | "str" | "text" => ValueKind::String,
            "true" | "false" | "boolean" | "bool" => ValueKind::Boolean,
            "null" | "none" | "nil" | "nothing" => ValueKind::Null,
            "undefined" | "void" => ValueKind::Undefined,
            "array" | "list" | "vec" | "vector" | "slice" => ValueKind::Array,
            "object" | "instance" | "dict" | "map" | "struct" | "record" => ValueKind::Object,
            _ => return None,
        };
        Some(kind)
    }

    fn reached(trace: &ExecutionTrace, name: &str) -> bool {
        let short = name.rsplit(['.', ':']).next().unwrap_or(name);
        trace.execution_steps.iter().any(|s| {
            s.function == name
                || s.function.rsplit('.').next() == Some(short)
                || s.call
                    .as_ref()
                    .is_some_and(|c| c.callee == short || c.target.as_deref() == Some(name))
        })
    }
}

impl BehaviorMatcher for KeywordMatcher {
    fn contradictions(&self, trace: &ExecutionTrace, expected: &str) -> Vec<String> {
        let mut found = Vec::new();
        let negated = NEGATED_THROW.is_match(expected);
        let throw_line = Self::traced_throw(trace);

        if negated {
            if let Some(line) = throw_line {
                found.push(format!(
                    "documented as not raising an error, but the traced path raises one at line {}",
                    line
                ));
            }
        } else if THROWS.is_match(expected) && !Self::can_throw_anywhere(trace) {
            found.push(
                "documented to raise an error, but no traced path raises one".to_string(),
            );
        }

        if let Some(word) = RETURNS.captures(expected).and_then(|c| c.get(1)) {
            if let Some(expected_kind) = Self::kind_of_word(word.as_str()) {
                let actual = Self::returned_kinds(trace);
                let matches = actual.iter().any(|k| {
                    *k == expected_kind.to_string()
                        || (expected_kind.is_nullish() && (k == "null" || k == "undefined"))
                });
                if !actual.is_empty() && !matches {
                    found.push(format!(
                        "documented to return {}, but the traced path returns {}",
                        expected_kind,
                        actual.into_iter().collect::<Vec<_>>().join(" or ")
                    ));
                } else if throw_line.is_some() && actual.is_empty() && !THROWS.is_match(expected)
                {
                    found.push(format!(
                        "documented to return {}, but the traced path raises an error instead",
                        expected_kind
                    ));
                }
            }
        }

        for capture in MENTIONED_CALL.captures_iter(expected) {
            let name = &capture[1];
            if !Self::reached(trace, name) {
                found.push(format!("`{}` is mentioned but never called", name));
            }
        }
        found
    }
}

/// Judges traces, optionally against documented behaviour
#[derive(Debug)]
pub struct Validator {
    confidence_threshold: f64,
    matcher: Box<dyn BehaviorMatcher>,
}

impl Validator {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
            matcher: Box::new(KeywordMatcher),
        }
    }

    /// Replace the default keyword matcher.
    pub fn with_matcher(mut self, matcher: impl BehaviorMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    /// Judge a trace; the trace itself is left untouched.
    pub fn validate(&self, trace: &ExecutionTrace, expected: Option<&str>) -> ExampleValidationResult {
        let is_valid = trace.reached_end && !trace.has_errors();
        let contradictions = expected
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(|e| self.matcher.contradictions(trace, e))
            .unwrap_or_default();

        let mut suggestions = Vec::new();
        for issue in trace
            .potential_issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
        {
            let suggestion = format!(
                "Fix the {} in `{}` at line {}: {}",
                serde_json::to_value(issue.issue_type)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default(),
                issue.location.function,
                issue.location.line,
                issue.message
            );
            if !suggestions.contains(&suggestion) {
                suggestions.push(suggestion);
            }
        }
        if !trace.reached_end {
            let limited = trace
                .potential_issues
                .iter()
                .any(|i| i.issue_type == IssueType::ExecutionLimit);
            let suggestion = if trace.execution_steps.is_empty() {
                "The example produced no steps; check that it calls the documented API"
            } else if limited {
                "The simulation stopped early; raise maxSteps or timeoutMs, or shorten the example"
            } else {
                "The example does not run to completion; make sure the documented path returns normally"
            };
            suggestions.push(suggestion.to_string());
        }
        for contradiction in &contradictions {
            suggestions.push(format!(
                "Align the documentation with the code: {}",
                contradiction
            ));
        }
        if !trace.execution_steps.is_empty() && trace.confidence_score < self.confidence_threshold {
            suggestions.push(format!(
                "Confidence {:.2} is below {:.2}; review the example by hand",
                trace.confidence_score, self.confidence_threshold
            ));
        }

        ExampleValidationResult {
            is_valid,
            matches_documentation: is_valid && contradictions.is_empty(),
            suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{ExecutionStep, PotentialIssue};

    fn step(id: usize, operation: StepOperation, depth: usize) -> ExecutionStep {
        ExecutionStep {
            id: format!("step-{}", id),
            operation,
            construct: String::new(),
            function: "getUser".to_string(),
            line: id,
            call_depth: depth,
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

    fn returning(kind: ValueKind) -> ExecutionTrace {
        let mut trace = ExecutionTrace::empty("ex", "getUser");
        let mut ret = step(1, StepOperation::Return, 1);
        ret.value = Some(kind);
        trace.execution_steps.push(ret);
        trace.execution_path.push("step-1".to_string());
        trace.reached_end = true;
        trace.confidence_score = 0.85;
        trace
    }

    #[test]
    fn test_clean_trace_matches() {
        let trace = returning(ValueKind::Object);
        let result = Validator::new(0.7).validate(&trace, Some("Returns the user object"));
        assert!(result.is_valid);
        assert!(result.matches_documentation);
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn test_return_kind_contradiction() {
        let trace = returning(ValueKind::Number);
        let result = Validator::new(0.7).validate(&trace, Some("returns a string"));
        assert!(result.is_valid);
        assert!(!result.matches_documentation);
        assert!(result.suggestions[0].contains("returns number"));
    }

    #[test]
    fn test_negated_throw_contradicted_by_trace() {
        let mut trace = ExecutionTrace::empty("ex", "load");
        trace
            .execution_steps
            .push(step(1, StepOperation::Throw, 1));
        trace.execution_path.push("step-1".to_string());
        trace.confidence_score = 0.8;
        let contradictions = KeywordMatcher.contradictions(&trace, "Never throws");
        assert_eq!(contradictions.len(), 1);

        let quiet = returning(ValueKind::Null);
        assert!(KeywordMatcher.contradictions(&quiet, "never throws").is_empty());
        assert_eq!(KeywordMatcher.contradictions(&quiet, "throws on bad input").len(), 1);
    }

    #[test]
    fn test_mentioned_call_must_be_reached() {
        let trace = returning(ValueKind::Object);
        assert!(KeywordMatcher.contradictions(&trace, "calls `getUser(id)`").is_empty());
        let missing = KeywordMatcher.contradictions(&trace, "then calls `save()`");
        assert_eq!(missing, vec!["`save` is mentioned but never called".to_string()]);
    }

    #[test]
    fn test_error_issue_invalidates() {
        let mut trace = returning(ValueKind::Object);
        trace.potential_issues.push(PotentialIssue::at(
            &trace.execution_steps[0],
            IssueType::NullReference,
            Severity::Error,
            "`user` is null where it is dereferenced",
        ));
        let result = Validator::new(0.7).validate(&trace, None);
        assert!(!result.is_valid);
        assert!(!result.matches_documentation);
        assert!(result.suggestions[0].starts_with("Fix the null-reference in `getUser`"));
    }

    #[test]
    fn test_incomplete_and_low_confidence() {
        let mut trace = returning(ValueKind::Object);
        trace.reached_end = false;
        trace.confidence_score = 0.4;
        let result = Validator::new(0.7).validate(&trace, None);
        assert!(!result.is_valid);
        assert_eq!(result.suggestions.len(), 2);
        assert!(result.suggestions[1].contains("0.40 is below 0.70"));
    }

    #[derive(Debug)]
    struct AlwaysContradicts;

    impl BehaviorMatcher for AlwaysContradicts {
        fn contradictions(&self, _trace: &ExecutionTrace, _expected: &str) -> Vec<String> {
            vec!["nope".to_string()]
        }
    }

    #[test]
    fn test_custom_matcher() {
        let trace = returning(ValueKind::Object);
        let validator = Validator::new(0.7).with_matcher(AlwaysContradicts);
        assert!(!validator.validate(&trace, Some("anything")).matches_documentation);
        // no expected behaviour means nothing to contradict
        assert!(validator.validate(&trace, None).matches_documentation);
    }
}
