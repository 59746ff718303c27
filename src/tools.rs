//! The `simulate_execution` and `batch_simulate_execution` tools.
//!
//! Every failure is folded into the response: callers always get a
//! well-formed result with `success`, a `summary` and `recommendations`.

use crate::config::Config;
use crate::llm::{LlmBackend, backend_from_settings};
use crate::registry::ToolRegistry;
use crate::simulator::{
    CallGraph, ExampleValidationResult, ExecutionSimulator, ExecutionTrace, IssueType,
    PreparedSimulation, Severity, SimulationInput, SimulationOptions, SimulationOverrides,
};
use crate::{Result, StaticAnalyzer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const HIGH_CONFIDENCE: f64 = 0.8;

/// Input of `simulate_execution`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct SimulateExecutionRequest {
    /// The documentation example to trace
    pub example_code: String,
    /// Source the example calls into; the example is traced against itself when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_code: Option<String>,
    /// Path to the implementation file; an unreadable path fails the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_path: Option<String>,
    /// Function to start from; detected from the example when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    /// Plain-text description of what the example should do
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_behavior: Option<String>,
    /// typescript, javascript, python, rust or go; detected when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Identifier echoed back in the trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_id: Option<String>,
    /// Per-call simulation options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<SimulationOverrides>,
}

/// Output of `simulate_execution`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateExecutionResponse {
    pub success: bool,
    pub trace: ExecutionTrace,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ExampleValidationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_graph: Option<CallGraph>,
    pub summary: String,
    pub recommendations: Vec<String>,
}

/// Input of `batch_simulate_execution`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "mcp", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct BatchSimulateRequest {
    /// Examples to simulate, in order
    pub examples: Vec<SimulateExecutionRequest>,
    /// Options for every example; per-example options win
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_options: Option<SimulationOverrides>,
}

/// One example's outcome inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExampleResult {
    pub example_id: String,
    /// Succeeded with no error-severity issue
    pub passed: bool,
    #[serde(flatten)]
    pub result: SimulateExecutionResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub average_confidence: f64,
}

/// Output of `batch_simulate_execution`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSimulateResponse {
    /// Every example passed
    pub success: bool,
    pub results: Vec<BatchExampleResult>,
    pub summary: BatchSummary,
    pub report: String,
}

/// Confidence band used in summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

impl ConfidenceBucket {
    pub fn of(confidence: f64, threshold: f64) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            Self::High
        } else if confidence >= threshold {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for ConfidenceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Shared state for tool calls: configuration, registry and the optional LLM backend
#[derive(Clone)]
pub struct ToolContext {
    config: Config,
    registry: ToolRegistry,
    backend: Option<Arc<dyn LlmBackend>>,
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

impl ToolContext {
    /// Build the context, connecting the LLM backend the configuration names.
    pub fn new(config: Config) -> Result<Self> {
        let backend = backend_from_settings(config.llm.as_ref())?;
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: Config, backend: Option<Arc<dyn LlmBackend>>) -> Self {
        Self {
            config,
            registry: ToolRegistry::new(),
            backend,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn is_llm_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Run `simulate_execution`.
    ///
    /// # Examples
    ///
    /// ```
    /// use documcp::{Config, SimulateExecutionRequest, ToolContext};
    ///
    /// let runtime = tokio::runtime::Runtime::new().unwrap();
    /// let tools = ToolContext::with_backend(Config::default(), None);
    /// let response = runtime.block_on(tools.simulate_execution(SimulateExecutionRequest {
    ///     example_code: "   ".to_string(),
    ///     ..Default::default()
    /// }));
    /// assert!(!response.success);
    /// assert!(response.trace.execution_steps.is_empty());
    /// ```
    pub async fn simulate_execution(
        &self,
        request: SimulateExecutionRequest,
    ) -> SimulateExecutionResponse {
        self.simulate_with(request, None).await
    }

    /// Run `batch_simulate_execution`: each example in order, none affecting the next.
    pub async fn batch_simulate_execution(
        &self,
        request: BatchSimulateRequest,
    ) -> BatchSimulateResponse {
        let mut results = Vec::with_capacity(request.examples.len());
        for (n, mut example) in request.examples.into_iter().enumerate() {
            let example_id = example
                .example_id
                .get_or_insert_with(|| format!("example-{}", n + 1))
                .clone();
            let result = self
                .simulate_with(example, request.global_options.as_ref())
                .await;
            let passed = result.success && !result.trace.has_errors();
            debug!("batch example {}: passed={}", example_id, passed);
            results.push(BatchExampleResult {
                example_id,
                passed,
                result,
            });
        }

        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let average_confidence = if total == 0 {
            0.0
        } else {
            let sum: f64 = results.iter().map(|r| r.result.trace.confidence_score).sum();
            (sum / total as f64 * 100.0).round() / 100.0
        };
        let summary = BatchSummary {
            total,
            passed,
            failed: total - passed,
            average_confidence,
        };
        let report = format!(
            "{} of {} example(s) passed, {} failed; average confidence {:.2}.",
            summary.passed, summary.total, summary.failed, summary.average_confidence
        );
        info!("{}", report);
        BatchSimulateResponse {
            success: summary.failed == 0,
            results,
            summary,
            report,
        }
    }

    async fn simulate_with(
        &self,
        request: SimulateExecutionRequest,
        global: Option<&SimulationOverrides>,
    ) -> SimulateExecutionResponse {
        let example_id = request.example_id.clone().unwrap_or_default();
        let entry = request.entry_point.clone().unwrap_or_default();
        let fail = |message: String, recommendation: &str| {
            warn!("{}", message);
            SimulateExecutionResponse {
                success: false,
                trace: ExecutionTrace::empty(example_id.clone(), entry.clone()),
                validation: None,
                call_graph: None,
                summary: message,
                recommendations: vec![recommendation.to_string()],
            }
        };

        if request.example_code.trim().is_empty() {
            return fail(
                "Simulation failed: exampleCode is required and must not be empty.".to_string(),
                "Pass the documentation example as exampleCode.",
            );
        }

        let overrides = global
            .cloned()
            .unwrap_or_default()
            .merged(&request.options.clone().unwrap_or_default());
        let options = self.config.simulation.with_overrides(&overrides);
        if let Err(e) = options.validate() {
            return fail(
                format!("Simulation failed: {}.", e),
                "Fix the simulation options and try again.",
            );
        }

        let language = match request.language.as_deref() {
            Some(name) => match StaticAnalyzer::parse_language(name) {
                Ok(language) => Some(language),
                Err(e) => {
                    return fail(
                        format!("Simulation failed: {}.", e),
                        "Use one of typescript, javascript, python, rust or go.",
                    );
                }
            },
            None => request
                .implementation_path
                .as_deref()
                .and_then(|p| StaticAnalyzer::detect_language(Path::new(p))),
        };

        let implementation_code = match (&request.implementation_code, &request.implementation_path) {
            (Some(code), _) => Some(code.clone()),
            (None, Some(path)) => match tokio::fs::read_to_string(path).await {
                Ok(code) => Some(code),
                Err(e) => {
                    return fail(
                        format!(
                            "Simulation failed: could not load implementationPath {}: {}.",
                            path, e
                        ),
                        "Check that implementationPath points to a readable source file, or pass implementationCode instead.",
                    );
                }
            },
            (None, None) => None,
        };

        let input = SimulationInput {
            example_id: request.example_id.clone(),
            example_code: request.example_code,
            implementation_code,
            language,
            entry_point: request.entry_point,
        };
        let simulator = ExecutionSimulator::new(options, self.backend.clone());
        let prepared = simulator.prepare(&input);
        let trace = simulator.simulate_prepared(&prepared).await;

        let validation = request
            .expected_behavior
            .as_deref()
            .map(|expected| simulator.validate_trace(&trace, Some(expected)));
        let call_graph = if simulator.options().include_call_graph {
            call_graph_for(&simulator, &trace, &prepared)
        } else {
            None
        };

        let success = !trace.execution_steps.is_empty();
        let summary = summarize(&trace, validation.as_ref(), simulator.options());
        let recommendations = recommend(&trace, validation.as_ref(), simulator.options());
        SimulateExecutionResponse {
            success,
            trace,
            validation,
            call_graph,
            summary,
            recommendations,
        }
    }
}

/// Build the call graph for the trace's entry point, if it is declared anywhere.
fn call_graph_for(
    simulator: &ExecutionSimulator,
    trace: &ExecutionTrace,
    prepared: &PreparedSimulation,
) -> Option<CallGraph> {
    if trace.execution_steps.is_empty() {
        return None;
    }
    let model = [&prepared.implementation, &prepared.example]
        .into_iter()
        .find(|m| m.find_function(&trace.entry_point).is_some())?;
    match simulator.build_call_graph(&trace.entry_point, model) {
        Ok(graph) => Some(graph),
        Err(e) => {
            warn!("{}: no call graph: {}", trace.example_id, e);
            None
        }
    }
}

fn kebab(issue_type: IssueType) -> String {
    serde_json::to_value(issue_type)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// One-paragraph description derived only from the trace and validation.
pub fn summarize(
    trace: &ExecutionTrace,
    validation: Option<&ExampleValidationResult>,
    options: &SimulationOptions,
) -> String {
    if trace.execution_steps.is_empty() {
        let reason = trace
            .potential_issues
            .first()
            .map(|i| i.message.as_str())
            .unwrap_or("no steps could be inferred");
        return format!("Simulation failed: {}.", reason);
    }
    let entry = if trace.entry_point.is_empty() {
        "the example"
    } else {
        trace.entry_point.as_str()
    };
    let mut summary = format!(
        "Simulated `{}` in {} step(s); {}. Confidence {:.2} ({}). Issues: {} error(s), {} warning(s), {} info.",
        entry,
        trace.execution_steps.len(),
        if trace.reached_end {
            "the example runs to completion"
        } else {
            "the example does not run to completion"
        },
        trace.confidence_score,
        ConfidenceBucket::of(trace.confidence_score, options.confidence_threshold),
        trace.count_severity(Severity::Error),
        trace.count_severity(Severity::Warning),
        trace.count_severity(Severity::Info),
    );
    if let Some(validation) = validation {
        summary.push_str(match (validation.is_valid, validation.matches_documentation) {
            (true, true) => " Validation passed and the trace matches the documentation.",
            (true, false) => " Validation passed but the trace contradicts the documentation.",
            (false, _) => " Validation failed.",
        });
    }
    summary
}

/// Actionable follow-ups derived only from the trace and validation.
pub fn recommend(
    trace: &ExecutionTrace,
    validation: Option<&ExampleValidationResult>,
    options: &SimulationOptions,
) -> Vec<String> {
    let mut recommendations = Vec::new();
    if trace.execution_steps.is_empty() {
        recommendations.push(
            "Check that the example and implementation parse and that the example calls into the implementation."
                .to_string(),
        );
        return recommendations;
    }

    let errors = trace.count_severity(Severity::Error);
    if errors > 0 {
        recommendations.push(format!(
            "Fix the {} error-level issue(s) before publishing this example.",
            errors
        ));
    }
    let kinds: BTreeSet<String> = trace
        .potential_issues
        .iter()
        .filter(|i| i.severity != Severity::Info || i.issue_type == IssueType::ExecutionLimit)
        .map(|i| kebab(i.issue_type))
        .collect();
    for kind in &kinds {
        let advice = match kind.as_str() {
            "null-reference" => "Guard values that can be null or undefined before dereferencing them.",
            "type-mismatch" => "Check argument and variable types against the declared signatures.",
            "undefined-variable" => "Declare or import every name the example uses.",
            "unreachable-code" => "Remove statements that can never run.",
            "missing-error-handling" => {
                "Handle errors from calls that can fail, or show how the failure surfaces."
            }
            "infinite-loop" => "Make sure every loop has a reachable exit.",
            "execution-limit" => "Raise maxSteps or timeoutMs, or shorten the example.",
            "simulation-error" => "Simplify the example; the simulator could not trace part of it.",
            _ => continue,
        };
        recommendations.push(advice.to_string());
    }
    if !trace.reached_end && !kinds.contains("execution-limit") {
        recommendations.push("Make sure the example runs to completion.".to_string());
    }
    match ConfidenceBucket::of(trace.confidence_score, options.confidence_threshold) {
        ConfidenceBucket::Low => recommendations.push(
            "Confidence is low; review the trace by hand before relying on it.".to_string(),
        ),
        ConfidenceBucket::Medium => recommendations
            .push("Confidence is moderate; spot-check the inferred path.".to_string()),
        ConfidenceBucket::High => {}
    }
    if validation.is_some_and(|v| v.is_valid && !v.matches_documentation) {
        recommendations.push(
            "Update the expected behaviour or the example so that they agree.".to_string(),
        );
    }
    if recommendations.is_empty() {
        recommendations.push("No changes needed; the example traces cleanly.".to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CALCULATOR: &str = r#"
export function add(a: number, b: number): number {
  return a + b;
}

export function factorial(n: number): number {
  if (n <= 1) {
    return 1;
  }
  return n * factorial(n - 1);
}
"#;

    fn tools() -> ToolContext {
        ToolContext::with_backend(Config::default(), None)
    }

    fn request(example: &str) -> SimulateExecutionRequest {
        SimulateExecutionRequest {
            example_code: example.to_string(),
            implementation_code: Some(CALCULATOR.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_blank_example_is_rejected() {
        for blank in ["", "  \n\t "] {
            let response = tools()
                .simulate_execution(SimulateExecutionRequest {
                    example_code: blank.to_string(),
                    ..Default::default()
                })
                .await;
            assert!(!response.success);
            assert!(response.trace.execution_steps.is_empty());
            assert_eq!(response.trace.confidence_score, 0.0);
            assert!(response.summary.contains("exampleCode"));
        }
    }

    #[tokio::test]
    async fn test_undeclared_function_scenario() {
        let response = tools()
            .simulate_execution(SimulateExecutionRequest {
                example_code: "foo();".to_string(),
                ..Default::default()
            })
            .await;
        let trace = &response.trace;
        assert_eq!(trace.entry_point, "foo");
        assert!(!trace.reached_end);
        assert!(trace
            .potential_issues
            .iter()
            .any(|i| i.issue_type == IssueType::UndefinedVariable));
        assert!(response.call_graph.is_none());
    }

    #[tokio::test]
    async fn test_unreadable_implementation_path() {
        let response = tools()
            .simulate_execution(SimulateExecutionRequest {
                example_code: "add(1, 2);".to_string(),
                implementation_path: Some("/definitely/not/here/calc.ts".to_string()),
                ..Default::default()
            })
            .await;
        assert!(!response.success);
        assert!(response.trace.execution_steps.is_empty());
        assert_eq!(response.trace.confidence_score, 0.0);
        assert!(response.summary.contains("could not load implementationPath"));
        assert!(!response.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_implementation_path_is_read() {
        let mut file = NamedTempFile::with_suffix(".py").unwrap();
        writeln!(file, "def double(x: int) -> int:\n    return x * 2\n").unwrap();
        let response = tools()
            .simulate_execution(SimulateExecutionRequest {
                example_code: "result = double(21)\n".to_string(),
                implementation_path: Some(file.path().display().to_string()),
                ..Default::default()
            })
            .await;
        assert!(response.success);
        assert_eq!(response.trace.entry_point, "double");
        assert!(response.trace.reached_end);
    }

    #[tokio::test]
    async fn test_static_fallback_is_deterministic() {
        let tools = tools();
        let first = tools.simulate_execution(request("const x = factorial(3);")).await;
        let second = tools.simulate_execution(request("const x = factorial(3);")).await;
        assert_eq!(first.trace.execution_steps, second.trace.execution_steps);
        assert_eq!(first.trace.potential_issues, second.trace.potential_issues);
        assert_eq!(first.trace.confidence_score, second.trace.confidence_score);
        assert_eq!(first.summary, second.summary);
    }

    #[tokio::test]
    async fn test_recursive_call_graph() {
        let response = tools()
            .simulate_execution(request("const f = factorial(5);"))
            .await;
        assert_eq!(response.trace.entry_point, "factorial");
        let graph = response.call_graph.unwrap();
        let recursive: Vec<_> = graph.edges.iter().filter(|e| e.recursive).collect();
        assert_eq!(recursive.len(), 1);
        assert_eq!(recursive[0].from, "factorial");
        assert_eq!(recursive[0].to, "factorial");
    }

    #[tokio::test]
    async fn test_call_graph_can_be_disabled() {
        let mut req = request("add(1, 2);");
        req.options = Some(SimulationOverrides {
            include_call_graph: Some(false),
            ..Default::default()
        });
        let response = tools().simulate_execution(req).await;
        assert!(response.success);
        assert!(response.call_graph.is_none());
    }

    #[tokio::test]
    async fn test_validation_is_attached() {
        let mut req = request("const sum = add(1, 2);");
        req.expected_behavior = Some("Returns a number and never throws".to_string());
        let response = tools().simulate_execution(req).await;
        let validation = response.validation.unwrap();
        assert!(validation.is_valid);
        assert!(validation.matches_documentation);
        assert!(response.summary.contains("Validation passed"));
    }

    #[tokio::test]
    async fn test_invalid_language_and_options() {
        let mut req = request("add(1, 2);");
        req.language = Some("cobol".to_string());
        assert!(!tools().simulate_execution(req).await.success);

        let mut req = request("add(1, 2);");
        req.options = Some(SimulationOverrides {
            max_steps: Some(0),
            ..Default::default()
        });
        let response = tools().simulate_execution(req).await;
        assert!(!response.success);
        assert!(response.summary.contains("maxSteps"));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let batch = BatchSimulateRequest {
            examples: vec![
                request("add(1, 2);"),
                SimulateExecutionRequest {
                    example_code: "add(1, 2);".to_string(),
                    implementation_path: Some("/missing/calc.ts".to_string()),
                    ..Default::default()
                },
                request("factorial(4);"),
            ],
            global_options: None,
        };
        let response = tools().batch_simulate_execution(batch).await;
        assert_eq!(response.results.len(), 3);
        assert_eq!(response.summary.total, 3);
        assert!(response.summary.failed >= 1);
        assert_eq!(
            response.summary.passed + response.summary.failed,
            response.summary.total
        );
        assert!((0.0..=1.0).contains(&response.summary.average_confidence));
        assert!(!response.success);

        let ids: Vec<_> = response.results.iter().map(|r| r.example_id.as_str()).collect();
        assert_eq!(ids, vec!["example-1", "example-2", "example-3"]);
        assert!(response.results[0].result.success);
        assert!(!response.results[1].result.success);
        assert!(response.results[2].result.success);

        let tools = tools();
        for (index, example) in [(0, "add(1, 2);"), (2, "factorial(4);")] {
            let mut alone = request(example);
            alone.example_id = Some(format!("example-{}", index + 1));
            let alone = tools.simulate_execution(alone).await;
            let batched = &response.results[index].result.trace;
            assert_eq!(batched.execution_steps, alone.trace.execution_steps);
            assert_eq!(batched.potential_issues, alone.trace.potential_issues);
        }
    }

    #[tokio::test]
    async fn test_trace_invariants_hold() {
        let tools = tools();
        let cases = [
            request("const x = factorial(3);"),
            request("add(1);"),
            SimulateExecutionRequest {
                example_code: "calc = Calculator()\nprint(calc.divide(1, 0))\n".to_string(),
                implementation_code: Some(
                    "class Calculator:\n    def divide(self, a, b):\n        if b == 0:\n            raise ValueError(\"zero\")\n        return a / b\n"
                        .to_string(),
                ),
                ..Default::default()
            },
            SimulateExecutionRequest {
                example_code: "fn main() {\n    let v: Option<i32> = None;\n    println!(\"{}\", v.unwrap());\n}\n"
                    .to_string(),
                language: Some("rust".to_string()),
                ..Default::default()
            },
            SimulateExecutionRequest {
                example_code: "package main\n\nfunc main() {\n\tfor {\n\t}\n}\n".to_string(),
                ..Default::default()
            },
        ];
        for case in cases {
            let trace = tools.simulate_execution(case).await.trace;
            assert!((0.0..=1.0).contains(&trace.confidence_score));
            assert_eq!(trace.confidence_score == 0.0, trace.execution_steps.is_empty());

            let ids: Vec<&str> = trace.execution_steps.iter().map(|s| s.id.as_str()).collect();
            let mut cursor = ids.iter();
            for id in &trace.execution_path {
                assert!(cursor.any(|s| s == id), "{id} out of order");
            }
        }
    }

    #[tokio::test]
    async fn test_global_options_merge_under_example_options() {
        let example = "factorial(4);\nadd(1, 2);\nadd(3, 4);\nadd(5, 6);\n";
        let mut tight = request(example);
        tight.options = Some(SimulationOverrides {
            max_steps: Some(1),
            ..Default::default()
        });
        let batch = BatchSimulateRequest {
            examples: vec![request(example), tight],
            global_options: Some(SimulationOverrides {
                max_steps: Some(3),
                ..Default::default()
            }),
        };
        let response = tools().batch_simulate_execution(batch).await;
        assert_eq!(response.results[0].result.trace.execution_steps.len(), 3);
        assert_eq!(response.results[1].result.trace.execution_steps.len(), 1);
        assert!(response.results.iter().all(|r| {
            r.result
                .trace
                .potential_issues
                .iter()
                .any(|i| i.issue_type == IssueType::ExecutionLimit)
        }));
    }

    #[tokio::test]
    async fn test_named_entry_is_not_an_arity_error() {
        let response = tools()
            .simulate_execution(SimulateExecutionRequest {
                example_code: "print(\"demo\")\n".to_string(),
                implementation_code: Some(
                    "def add(a: int, b: int) -> int:\n    return a + b\n".to_string(),
                ),
                entry_point: Some("add".to_string()),
                language: Some("python".to_string()),
                ..Default::default()
            })
            .await;
        let trace = &response.trace;
        assert_eq!(trace.entry_point, "add");
        assert!(trace.execution_steps.iter().any(|s| s.function == "add"));
        assert!(!trace
            .potential_issues
            .iter()
            .any(|i| i.issue_type == IssueType::TypeMismatch));
        assert_eq!(trace.count_severity(Severity::Error), 0);
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_module_qualified_calls_reach_implementation() {
        let python = tools()
            .simulate_execution(SimulateExecutionRequest {
                example_code: "import calc\nprint(calc.add(1, 2))\n".to_string(),
                implementation_code: Some(
                    "def add(a: int, b: int) -> int:\n    return a + b\n".to_string(),
                ),
                language: Some("python".to_string()),
                ..Default::default()
            })
            .await;
        let go = tools()
            .simulate_execution(SimulateExecutionRequest {
                example_code: "package main\n\nfunc main() {\n\ttotal := calc.Add(1, 2)\n\tprintln(total)\n}\n"
                    .to_string(),
                implementation_code: Some(
                    "package calc\n\nfunc Add(a int, b int) int {\n\treturn a + b\n}\n".to_string(),
                ),
                language: Some("go".to_string()),
                ..Default::default()
            })
            .await;
        for (response, target) in [(&python, "add"), (&go, "Add")] {
            let trace = &response.trace;
            assert_eq!(trace.entry_point, target);
            let call = trace
                .execution_steps
                .iter()
                .filter_map(|s| s.call.as_ref())
                .find(|c| c.callee == target)
                .unwrap();
            assert_eq!(call.resolution, crate::CallResolution::Resolved);
            assert_eq!(call.target.as_deref(), Some(target));
            assert!(trace.execution_steps.iter().any(|s| s.function == target));
            assert!(!trace.potential_issues.iter().any(|i| matches!(
                i.issue_type,
                IssueType::UndefinedVariable | IssueType::TypeMismatch
            )));
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let response = tools()
            .batch_simulate_execution(BatchSimulateRequest::default())
            .await;
        assert!(response.success);
        assert_eq!(response.summary.total, 0);
        assert_eq!(response.summary.average_confidence, 0.0);
    }

    #[test]
    fn test_summary_is_derived_from_trace() {
        let options = SimulationOptions::default();
        let trace = ExecutionTrace::failed("ex", "main", "boom");
        assert_eq!(summarize(&trace, None, &options), "Simulation failed: boom.");
        assert_eq!(ConfidenceBucket::of(0.85, 0.7), ConfidenceBucket::High);
        assert_eq!(ConfidenceBucket::of(0.7, 0.7), ConfidenceBucket::Medium);
        assert_eq!(ConfidenceBucket::of(0.69, 0.7), ConfidenceBucket::Low);
    }

    #[test]
    fn test_request_wire_format() {
        let request: SimulateExecutionRequest = serde_json::from_str(
            r#"{"exampleCode": "run()", "entryPoint": "run", "options": {"maxSteps": 5}}"#,
        )
        .unwrap();
        assert_eq!(request.entry_point.as_deref(), Some("run"));
        assert_eq!(request.options.unwrap().max_steps, Some(5));
    }
}
