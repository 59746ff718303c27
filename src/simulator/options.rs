use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Knobs for one simulation run.
///
/// # Examples
///
/// ```
/// use documcp::{SimulationOptions, SimulationOverrides};
///
/// let options = SimulationOptions::default();
/// assert_eq!(options.max_steps, 100);
///
/// let tuned = options.with_overrides(&SimulationOverrides {
///     max_steps: Some(10),
///     ..Default::default()
/// });
/// assert_eq!(tuned.max_steps, 10);
/// assert_eq!(tuned.max_depth, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationOptions {
    /// Maximum call frames descended into
    pub max_depth: usize,

    /// Maximum number of steps recorded before the trace halts
    pub max_steps: usize,

    /// Wall-clock budget for one simulation, in milliseconds
    pub timeout_ms: u64,

    /// Whether the façade builds a call graph for the entry point
    pub include_call_graph: bool,

    pub detect_null_refs: bool,
    pub detect_type_mismatches: bool,
    pub detect_unreachable_code: bool,

    /// Advisory: below this, callers should warn that the trace is shaky
    pub confidence_threshold: f64,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_steps: 100,
            timeout_ms: 30_000,
            include_call_graph: true,
            detect_null_refs: true,
            detect_type_mismatches: true,
            detect_unreachable_code: true,
            confidence_threshold: 0.7,
        }
    }
}

impl SimulationOptions {
    /// Apply per-call overrides on top of these options.
    pub fn with_overrides(&self, overrides: &SimulationOverrides) -> Self {
        Self {
            max_depth: overrides.max_depth.unwrap_or(self.max_depth),
            max_steps: overrides.max_steps.unwrap_or(self.max_steps),
            timeout_ms: overrides.timeout_ms.unwrap_or(self.timeout_ms),
            include_call_graph: overrides
                .include_call_graph
                .unwrap_or(self.include_call_graph),
            detect_null_refs: overrides.detect_null_refs.unwrap_or(self.detect_null_refs),
            detect_type_mismatches: overrides
                .detect_type_mismatches
                .unwrap_or(self.detect_type_mismatches),
            detect_unreachable_code: overrides
                .detect_unreachable_code
                .unwrap_or(self.detect_unreachable_code),
            confidence_threshold: overrides
                .confidence_threshold
                .unwrap_or(self.confidence_threshold),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject option sets no simulation can run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(Error::InvalidConfig("maxSteps must be at least 1".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("timeoutMs must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "confidenceThreshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Per-call overrides; every field left out keeps the configured value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct SimulationOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_call_graph: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detect_null_refs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detect_type_mismatches: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detect_unreachable_code: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
}

impl SimulationOverrides {
    /// Layer `other` on top of `self`; fields set in `other` win.
    pub fn merged(&self, other: &SimulationOverrides) -> SimulationOverrides {
        SimulationOverrides {
            max_depth: other.max_depth.or(self.max_depth),
            max_steps: other.max_steps.or(self.max_steps),
            timeout_ms: other.timeout_ms.or(self.timeout_ms),
            include_call_graph: other.include_call_graph.or(self.include_call_graph),
            detect_null_refs: other.detect_null_refs.or(self.detect_null_refs),
            detect_type_mismatches: other.detect_type_mismatches.or(self.detect_type_mismatches),
            detect_unreachable_code: other
                .detect_unreachable_code
                .or(self.detect_unreachable_code),
            confidence_threshold: other.confidence_threshold.or(self.confidence_threshold),
        }
    }
}
