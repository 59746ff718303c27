use serde::{Deserialize, Serialize};

pub const UNRESOLVED_CALL_PENALTY: f64 = 0.1;
pub const AMBIGUOUS_BRANCH_PENALTY: f64 = 0.05;
pub const DYNAMIC_DISPATCH_PENALTY: f64 = 0.05;
pub const MISSING_IMPLEMENTATION_PENALTY: f64 = 0.15;
pub const PARTIAL_PARSE_PENALTY: f64 = 0.1;
pub const STATIC_FALLBACK_PENALTY: f64 = 0.15;

/// Floor for any trace that recorded at least one step.
pub const MIN_CONFIDENCE: f64 = 0.05;

/// Ambiguity collected while tracing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Penalties {
    /// Distinct callees that resolved to nothing
    pub unresolved_calls: usize,
    /// On-path branches decided by heuristic rather than a literal
    pub ambiguous_branches: usize,
    /// Distinct callees whose target depends on runtime values
    pub dynamic_dispatch: usize,
    /// Entry point or implementation that could not be found
    pub missing_implementation: usize,
    /// Sources parsed with syntax errors
    pub partial_parse: usize,
    pub static_fallback: bool,
}

impl Penalties {
    pub fn total(&self) -> f64 {
        self.unresolved_calls as f64 * UNRESOLVED_CALL_PENALTY
            + self.ambiguous_branches as f64 * AMBIGUOUS_BRANCH_PENALTY
            + self.dynamic_dispatch as f64 * DYNAMIC_DISPATCH_PENALTY
            + self.missing_implementation as f64 * MISSING_IMPLEMENTATION_PENALTY
            + self.partial_parse as f64 * PARTIAL_PARSE_PENALTY
            + if self.static_fallback {
                STATIC_FALLBACK_PENALTY
            } else {
                0.0
            }
    }
}

/// Score a trace: 1.0 minus penalties, clamped to `[MIN_CONFIDENCE, 1]`.
///
/// A trace without steps always scores exactly 0. `reported` is an upper bound
/// supplied by the reasoning backend, if it gave one.
///
/// # Examples
///
/// ```
/// use documcp::simulator::{score, Penalties};
///
/// let penalties = Penalties { static_fallback: true, ..Default::default() };
/// assert_eq!(score(&penalties, 3, None), 0.85);
/// assert_eq!(score(&penalties, 0, None), 0.0);
/// ```
pub fn score(penalties: &Penalties, step_count: usize, reported: Option<f64>) -> f64 {
    if step_count == 0 {
        return 0.0;
    }
    let mut value = 1.0 - penalties.total();
    if let Some(reported) = reported.filter(|r| r.is_finite()) {
        value = value.min(reported);
    }
    // keep two decimals so equal inputs print equal scores
    let value = (value * 100.0).round() / 100.0;
    value.clamp(MIN_CONFIDENCE, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_without_ambiguity_is_one() {
        assert_eq!(score(&Penalties::default(), 1, None), 1.0);
    }

    #[test]
    fn test_penalties_accumulate_and_clamp() {
        let penalties = Penalties {
            unresolved_calls: 2,
            ambiguous_branches: 1,
            static_fallback: true,
            ..Default::default()
        };
        assert_eq!(score(&penalties, 4, None), 0.6);

        let hopeless = Penalties {
            unresolved_calls: 30,
            ..Default::default()
        };
        assert_eq!(score(&hopeless, 4, None), MIN_CONFIDENCE);
    }

    #[test]
    fn test_reported_confidence_caps_score() {
        assert_eq!(score(&Penalties::default(), 2, Some(0.4)), 0.4);
        assert_eq!(score(&Penalties::default(), 2, Some(f64::NAN)), 1.0);
        assert_eq!(score(&Penalties::default(), 0, Some(0.9)), 0.0);
    }
}
