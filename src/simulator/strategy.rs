use super::{ExecutionStep, Penalties, PotentialIssue, SimulationOptions, interp};
use crate::{Error, Result, StaticModel};
use async_trait::async_trait;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::debug;

/// Everything a strategy needs to trace one example
#[derive(Debug)]
pub struct TraceContext<'a> {
    pub example_id: &'a str,
    pub example_source: &'a str,
    pub implementation_source: &'a str,
    pub example: &'a StaticModel,
    pub implementation: &'a StaticModel,
    /// The example is traced against itself
    pub self_simulation: bool,
    /// Explicit entry point, if the caller named one
    pub entry_point: Option<&'a str>,
    pub options: &'a SimulationOptions,
    pub deadline: Instant,
}

/// Steps and issues as produced by a strategy, before scoring and detection passes
#[derive(Debug, Clone, Default)]
pub struct RawTrace {
    pub entry_point: String,
    pub steps: Vec<ExecutionStep>,
    pub issues: Vec<PotentialIssue>,
    pub reached_end: bool,
    pub penalties: Penalties,
    /// An upper bound on confidence supplied by the reasoning backend
    pub reported_confidence: Option<f64>,
    /// The entry point named a function that does not exist
    pub unresolved_entry: bool,
}

/// A way of reconstructing an execution
#[async_trait]
pub trait TraceStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the strategy reasons with a language model
    fn is_llm(&self) -> bool;

    async fn trace(&self, ctx: &TraceContext<'_>) -> Result<RawTrace>;
}

/// Derives the trace purely from the static models
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticTraceStrategy;

impl StaticTraceStrategy {
    /// Run the interpreter, turning a panic inside it into an error.
    pub fn run(&self, ctx: &TraceContext<'_>) -> Result<RawTrace> {
        let started = Instant::now();
        match catch_panic(|| interp::run(ctx)) {
            Ok(mut raw) => {
                raw.penalties.static_fallback = true;
                debug!(
                    "static trace of {}: {} step(s) in {:?}",
                    ctx.example_id,
                    raw.steps.len(),
                    started.elapsed()
                );
                Ok(raw)
            }
            Err(message) => Err(Error::Simulation(message)),
        }
    }
}

/// Run `f`, returning the panic message if it panics.
pub(crate) fn catch_panic<T>(f: impl FnOnce() -> T) -> std::result::Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}

#[async_trait]
impl TraceStrategy for StaticTraceStrategy {
    fn name(&self) -> &'static str {
        "static"
    }

    fn is_llm(&self) -> bool {
        false
    }

    async fn trace(&self, ctx: &TraceContext<'_>) -> Result<RawTrace> {
        self.run(ctx)
    }
}
