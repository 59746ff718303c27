//! Traces code examples against an implementation without running them.
//!
//! A [`TraceStrategy`] produces raw steps; the simulator then runs the issue
//! detection passes, scores confidence and assembles the [`ExecutionTrace`].

mod assisted;
mod call_graph;
mod confidence;
mod detect;
mod interp;
mod options;
mod strategy;
mod trace;
mod validate;

pub use assisted::LlmTraceStrategy;
pub use call_graph::{CallGraph, CallGraphBuilder, CallGraphEdge, CallGraphNode};
pub use confidence::{
    AMBIGUOUS_BRANCH_PENALTY, DYNAMIC_DISPATCH_PENALTY, MIN_CONFIDENCE,
    MISSING_IMPLEMENTATION_PENALTY, PARTIAL_PARSE_PENALTY, Penalties, STATIC_FALLBACK_PENALTY,
    UNRESOLVED_CALL_PENALTY, score,
};
pub use options::{SimulationOptions, SimulationOverrides};
pub use strategy::{RawTrace, StaticTraceStrategy, TraceContext, TraceStrategy};

use strategy::catch_panic;
pub use trace::{
    BindingState, CallInfo, CallResolution, ControlInfo, ExecutionStep, ExecutionTrace,
    IssueLocation, IssueType, ParameterSpec, PotentialIssue, Severity, StepOperation,
    VariableRead, VariableSummary, VariableWrite,
};
pub use validate::{BehaviorMatcher, ExampleValidationResult, KeywordMatcher, Validator};

use crate::llm::LlmBackend;
use crate::{LanguageType, Result, StaticAnalyzer, StaticModel};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// One example to simulate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationInput {
    /// Defaults to a hash of the example code
    pub example_id: Option<String>,
    pub example_code: String,
    /// `None` traces the example against itself
    pub implementation_code: Option<String>,
    /// Detected from the code when absent
    pub language: Option<LanguageType>,
    pub entry_point: Option<String>,
}

impl SimulationInput {
    pub fn new(example_code: impl Into<String>) -> Self {
        Self {
            example_code: example_code.into(),
            ..Default::default()
        }
    }

    pub fn with_implementation(mut self, implementation_code: impl Into<String>) -> Self {
        self.implementation_code = Some(implementation_code.into());
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn with_language(mut self, language: LanguageType) -> Self {
        self.language = Some(language);
        self
    }
}

/// Sources and their static models, ready to trace
#[derive(Debug, Clone)]
pub struct PreparedSimulation {
    pub example_id: String,
    pub language: LanguageType,
    pub example_source: String,
    pub implementation_source: String,
    pub example: StaticModel,
    pub implementation: StaticModel,
    pub self_simulation: bool,
    pub entry_point: Option<String>,
    /// Set when analysing a source panicked; the simulation then fails
    pub fault: Option<String>,
}

/// Runs simulations with one strategy chosen at construction.
///
/// # Examples
///
/// ```
/// use documcp::{ExecutionSimulator, SimulationOptions};
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// let simulator = ExecutionSimulator::new(SimulationOptions::default(), None);
/// let trace = runtime.block_on(simulator.simulate_execution(
///     "const total = add(1, 2);",
///     Some("export function add(a: number, b: number): number { return a + b; }"),
///     None,
/// ));
/// assert_eq!(trace.entry_point, "add");
/// assert!(trace.reached_end);
/// assert!(!simulator.is_llm_available());
/// ```
pub struct ExecutionSimulator {
    options: SimulationOptions,
    strategy: Box<dyn TraceStrategy>,
}

impl ExecutionSimulator {
    /// Use the LLM strategy when a backend is given, static tracing otherwise.
    pub fn new(options: SimulationOptions, backend: Option<Arc<dyn LlmBackend>>) -> Self {
        let strategy: Box<dyn TraceStrategy> = match backend {
            Some(backend) => Box::new(LlmTraceStrategy::new(backend)),
            None => Box::new(StaticTraceStrategy),
        };
        Self { options, strategy }
    }

    pub fn with_strategy(options: SimulationOptions, strategy: impl TraceStrategy + 'static) -> Self {
        Self {
            options,
            strategy: Box::new(strategy),
        }
    }

    pub fn options(&self) -> &SimulationOptions {
        &self.options
    }

    pub fn is_llm_available(&self) -> bool {
        self.strategy.is_llm()
    }

    /// Analyse both sources. Unparseable sources become partial models.
    pub fn prepare(&self, input: &SimulationInput) -> PreparedSimulation {
        let self_simulation = input.implementation_code.is_none();
        let implementation_source = input
            .implementation_code
            .clone()
            .unwrap_or_else(|| input.example_code.clone());
        let language = input.language.unwrap_or_else(|| {
            StaticAnalyzer::detect_language_from_source(&implementation_source)
        });
        let example_id = input
            .example_id
            .clone()
            .unwrap_or_else(|| format!("example-{:08x}", fnv1a(&input.example_code)));

        let mut analyzer = StaticAnalyzer::new();
        let mut fault = None;
        let mut analyze = |source: &str, role: &str| {
            match catch_panic(|| analyzer.analyze_source(source, language)) {
                Ok(Ok(model)) => model,
                Ok(Err(e)) => {
                    warn!("{}: could not analyse {}: {}", example_id, role, e);
                    StaticModel::partial(language)
                }
                Err(message) => {
                    error!("{}: analysing {} panicked: {}", example_id, role, message);
                    if fault.is_none() {
                        fault = Some(message);
                    }
                    StaticModel::partial(language)
                }
            }
        };
        let example = analyze(&input.example_code, "example");
        let implementation = if self_simulation {
            example.clone()
        } else {
            analyze(&implementation_source, "implementation")
        };

        PreparedSimulation {
            example_id,
            language,
            example_source: input.example_code.clone(),
            implementation_source,
            example,
            implementation,
            self_simulation,
            entry_point: input.entry_point.clone(),
            fault,
        }
    }

    /// Trace one example. Never fails: faults come back as an empty trace.
    pub async fn simulate(&self, input: &SimulationInput) -> ExecutionTrace {
        let prepared = self.prepare(input);
        self.simulate_prepared(&prepared).await
    }

    pub async fn simulate_prepared(&self, prepared: &PreparedSimulation) -> ExecutionTrace {
        let started = Instant::now();
        let entry = prepared.entry_point.as_deref().unwrap_or_default();
        if prepared.example_source.trim().is_empty() {
            return ExecutionTrace::failed(
                &prepared.example_id,
                entry,
                "exampleCode is empty; there is nothing to simulate",
            );
        }
        if let Some(fault) = &prepared.fault {
            return ExecutionTrace::failed(
                &prepared.example_id,
                entry,
                format!("simulation failed: {}", fault),
            );
        }

        let ctx = TraceContext {
            example_id: &prepared.example_id,
            example_source: &prepared.example_source,
            implementation_source: &prepared.implementation_source,
            example: &prepared.example,
            implementation: &prepared.implementation,
            self_simulation: prepared.self_simulation,
            entry_point: prepared.entry_point.as_deref(),
            options: &self.options,
            deadline: started + self.options.timeout(),
        };
        let raw = match self.strategy.trace(&ctx).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(
                    "{}: {} strategy failed: {}",
                    prepared.example_id,
                    self.strategy.name(),
                    e
                );
                let mut trace = ExecutionTrace::failed(
                    &prepared.example_id,
                    entry,
                    format!("simulation failed: {}", e),
                );
                trace.simulation_duration = started.elapsed().as_millis() as u64;
                return trace;
            }
        };
        let example_id = &prepared.example_id;
        match catch_panic(|| self.finish(raw, prepared, started)) {
            Ok(trace) => trace,
            Err(message) => {
                error!("{}: assembling the trace panicked: {}", example_id, message);
                let mut trace = ExecutionTrace::failed(
                    example_id,
                    entry,
                    format!("simulation failed: {}", message),
                );
                trace.simulation_duration = started.elapsed().as_millis() as u64;
                trace
            }
        }
    }

    /// Trace `example` against `implementation`, or against itself when absent.
    pub async fn simulate_execution(
        &self,
        example: &str,
        implementation: Option<&str>,
        entry_point: Option<&str>,
    ) -> ExecutionTrace {
        let input = SimulationInput {
            example_code: example.to_string(),
            implementation_code: implementation.map(str::to_string),
            entry_point: entry_point.map(str::to_string),
            ..Default::default()
        };
        self.simulate(&input).await
    }

    /// Simulate, then judge the trace against the documented behaviour.
    pub async fn validate_example(
        &self,
        example: &str,
        implementation: Option<&str>,
        expected_behavior: &str,
    ) -> ExampleValidationResult {
        let trace = self.simulate_execution(example, implementation, None).await;
        self.validate_trace(&trace, Some(expected_behavior))
    }

    pub fn validate_trace(
        &self,
        trace: &ExecutionTrace,
        expected_behavior: Option<&str>,
    ) -> ExampleValidationResult {
        Validator::new(self.options.confidence_threshold).validate(trace, expected_behavior)
    }

    pub fn build_call_graph(&self, entry_point: &str, model: &StaticModel) -> Result<CallGraph> {
        CallGraphBuilder::new(self.options.max_depth).build(entry_point, model)
    }

    fn finish(&self, raw: RawTrace, prepared: &PreparedSimulation, started: Instant) -> ExecutionTrace {
        let unresolved_entry = raw.unresolved_entry.then_some(raw.entry_point.as_str());
        let mut issues = raw.issues.clone();
        issues.extend(detect::detect_issues(
            &raw.steps,
            prepared.language,
            &self.options,
            unresolved_entry,
        ));
        let issues = detect::dedupe(issues);
        let confidence_score = score(&raw.penalties, raw.steps.len(), raw.reported_confidence);
        let trace = ExecutionTrace {
            example_id: prepared.example_id.clone(),
            entry_point: raw.entry_point,
            variables_accessed: trace::summarize_variables(&raw.steps),
            execution_path: raw
                .steps
                .iter()
                .filter(|s| s.on_path)
                .map(|s| s.id.clone())
                .collect(),
            execution_steps: raw.steps,
            potential_issues: issues,
            confidence_score,
            reached_end: raw.reached_end,
            simulation_duration: started.elapsed().as_millis() as u64,
        };
        debug!(
            "{}: {} step(s), {} issue(s), confidence {:.2} via {}",
            trace.example_id,
            trace.execution_steps.len(),
            trace.potential_issues.len(),
            trace.confidence_score,
            self.strategy.name()
        );
        trace
    }
}

/// Stable 32-bit FNV-1a hash, used for default example ids.
fn fnv1a(text: &str) -> u32 {
    text.bytes().fold(0x811c_9dc5_u32, |hash, byte| {
        (hash ^ byte as u32).wrapping_mul(0x0100_0193)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use async_trait::async_trait;

    const SERVICE: &str = r#"
export class UserService {
  private users: Map<string, User> = new Map();

  getUser(id: string): User | undefined {
    return this.users.get(id);
  }

  requireUser(id: string): User {
    const user = this.getUser(id);
    if (!user) {
      throw new Error("no such user");
    }
    return user;
  }
}
"#;

    struct Broken;

    #[async_trait]
    impl TraceStrategy for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn is_llm(&self) -> bool {
            false
        }

        async fn trace(&self, _ctx: &TraceContext<'_>) -> Result<RawTrace> {
            Err(Error::Simulation("analyzer crashed".to_string()))
        }
    }

    fn simulator() -> ExecutionSimulator {
        ExecutionSimulator::new(SimulationOptions::default(), None)
    }

    #[tokio::test]
    async fn test_trace_invariants() {
        let trace = simulator()
            .simulate_execution(
                "const service = new UserService();\nconst user = service.requireUser(\"42\");\nconsole.log(user.name);\n",
                Some(SERVICE),
                None,
            )
            .await;
        assert_eq!(trace.entry_point, "UserService.requireUser");
        assert!(!trace.execution_steps.is_empty());
        assert!(trace.confidence_score > 0.0 && trace.confidence_score <= 1.0);

        // the path is an ordered subsequence of the steps
        let mut ids = trace.execution_steps.iter().map(|s| &s.id);
        assert!(trace.execution_path.iter().all(|p| ids.any(|id| id == p)));

        for name in trace.variables_accessed.keys() {
            assert!(trace.execution_steps.iter().any(|s| {
                s.reads.iter().any(|r| &r.name == name) || s.writes.iter().any(|w| &w.name == name)
            }));
        }
    }

    #[tokio::test]
    async fn test_empty_example_fails_cleanly() {
        let trace = simulator().simulate_execution("   ", Some(SERVICE), None).await;
        assert!(trace.execution_steps.is_empty());
        assert_eq!(trace.confidence_score, 0.0);
        assert!(!trace.reached_end);
        assert_eq!(trace.potential_issues.len(), 1);
    }

    #[tokio::test]
    async fn test_strategy_fault_becomes_trace() {
        let simulator = ExecutionSimulator::with_strategy(SimulationOptions::default(), Broken);
        let trace = simulator.simulate(&SimulationInput::new("run();")).await;
        assert!(trace.execution_steps.is_empty());
        assert_eq!(trace.confidence_score, 0.0);
        assert!(!trace.reached_end);
        assert_eq!(trace.potential_issues.len(), 1);
        assert_eq!(trace.potential_issues[0].issue_type, IssueType::SimulationError);
        assert!(trace.potential_issues[0].message.contains("analyzer crashed"));
    }

    #[tokio::test]
    async fn test_analysis_fault_becomes_trace() {
        let simulator = simulator();
        let mut prepared =
            simulator.prepare(&SimulationInput::new("run();").with_implementation(SERVICE));
        assert!(prepared.fault.is_none());
        prepared.fault = Some("index out of bounds".to_string());
        let trace = simulator.simulate_prepared(&prepared).await;
        assert!(trace.execution_steps.is_empty());
        assert_eq!(trace.confidence_score, 0.0);
        assert_eq!(trace.potential_issues.len(), 1);
        assert_eq!(trace.potential_issues[0].issue_type, IssueType::SimulationError);
        assert!(trace.potential_issues[0].message.contains("index out of bounds"));
    }

    #[tokio::test]
    async fn test_self_simulation() {
        let example = "function greet(name) {\n  return \"hi \" + name;\n}\ngreet(\"ada\");\n";
        let trace = simulator().simulate_execution(example, None, None).await;
        assert_eq!(trace.entry_point, "greet");
        assert!(trace.reached_end);
        assert!(!trace.has_errors());
    }

    #[tokio::test]
    async fn test_toggle_does_not_change_other_passes() {
        let example = "function f() {\n  return 1;\n  cleanup();\n}\nf();\nconsole.log(missing.value);\n";
        let all = simulator().simulate_execution(example, None, None).await;
        let quiet = ExecutionSimulator::new(
            SimulationOptions {
                detect_null_refs: false,
                ..Default::default()
            },
            None,
        )
        .simulate_execution(example, None, None)
        .await;
        let unreachable = |t: &ExecutionTrace| {
            t.potential_issues
                .iter()
                .filter(|i| i.issue_type == IssueType::UnreachableCode)
                .count()
        };
        assert_eq!(unreachable(&all), 1);
        assert_eq!(unreachable(&all), unreachable(&quiet));
        assert!(all
            .potential_issues
            .iter()
            .any(|i| i.issue_type == IssueType::UndefinedVariable));
        assert!(!quiet
            .potential_issues
            .iter()
            .any(|i| i.issue_type == IssueType::UndefinedVariable));
    }

    #[tokio::test]
    async fn test_type_and_unreachable_toggles_are_independent() {
        let implementation = "function scale(n: number): number {\n  return n * 2;\n  console.log(\"done\");\n}\n";
        let example = "scale(\"three\");\nconsole.log(missing.value);\n";
        let count = |t: &ExecutionTrace, kind: IssueType| {
            t.potential_issues.iter().filter(|i| i.issue_type == kind).count()
        };
        let run = |options: SimulationOptions| async move {
            ExecutionSimulator::new(options, None)
                .simulate_execution(example, Some(implementation), None)
                .await
        };
        let all = run(SimulationOptions::default()).await;
        assert!(count(&all, IssueType::TypeMismatch) > 0);
        assert_eq!(count(&all, IssueType::UnreachableCode), 1);
        assert!(count(&all, IssueType::UndefinedVariable) > 0);

        let no_types = run(SimulationOptions {
            detect_type_mismatches: false,
            ..Default::default()
        })
        .await;
        assert_eq!(count(&no_types, IssueType::TypeMismatch), 0);
        let no_dead = run(SimulationOptions {
            detect_unreachable_code: false,
            ..Default::default()
        })
        .await;
        assert_eq!(count(&no_dead, IssueType::UnreachableCode), 0);

        for kind in [IssueType::UnreachableCode, IssueType::UndefinedVariable] {
            assert_eq!(count(&no_types, kind), count(&all, kind));
        }
        for kind in [IssueType::TypeMismatch, IssueType::UndefinedVariable] {
            assert_eq!(count(&no_dead, kind), count(&all, kind));
        }
    }

    #[tokio::test]
    async fn test_reassigned_parameter_is_summarized_as_parameter() {
        let example = "def bump(limit, step):\n    limit = limit + 1\n    step += 1\n    total = limit + step\n    return total\n\nbump(3, 1)\n";
        let trace = simulator()
            .simulate(&SimulationInput::new(example).with_language(LanguageType::Python))
            .await;
        for name in ["limit", "step"] {
            let summary = &trace.variables_accessed[name];
            assert_eq!(summary.binding, "parameter", "{}", name);
            assert_eq!(summary.writes, 1);
        }
        assert_eq!(trace.variables_accessed["total"].binding, "local");
    }

    #[tokio::test]
    async fn test_validate_example() {
        let result = simulator()
            .validate_example(
                "const total = add(1, 2);",
                Some("export function add(a: number, b: number): number {\n  return a + b;\n}\n"),
                "Returns a number and never throws",
            )
            .await;
        assert!(result.is_valid);
        assert!(result.matches_documentation);
    }

    #[test]
    fn test_default_ids_are_stable() {
        let simulator = simulator();
        let a = simulator.prepare(&SimulationInput::new("run();"));
        let b = simulator.prepare(&SimulationInput::new("run();"));
        assert_eq!(a.example_id, b.example_id);
        assert!(a.self_simulation);
        assert_eq!(a.language, LanguageType::TypeScript);
    }

    #[test]
    fn test_call_graph_from_prepared_model() {
        let simulator = simulator();
        let prepared = simulator.prepare(
            &SimulationInput::new("new UserService().requireUser(\"1\");").with_implementation(SERVICE),
        );
        let graph = simulator
            .build_call_graph("UserService.requireUser", &prepared.implementation)
            .unwrap();
        assert!(graph.node("UserService.getUser").is_some());
    }
}
