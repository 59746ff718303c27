use super::{
    CallInfo, CallResolution, ExecutionStep, IssueLocation, IssueType, PotentialIssue, RawTrace,
    Severity, StaticTraceStrategy, StepOperation, TraceContext, TraceStrategy,
};
use crate::llm::LlmBackend;
use crate::{Error, Result, ValueKind};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// The shape a backend is asked to answer with
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerTrace {
    #[serde(default)]
    entry_point: Option<String>,
    #[serde(default)]
    steps: Vec<AnswerStep>,
    #[serde(default)]
    issues: Vec<AnswerIssue>,
    #[serde(default)]
    reached_end: bool,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerStep {
    operation: String,
    #[serde(default)]
    construct: String,
    #[serde(default)]
    function: String,
    #[serde(default)]
    line: usize,
    #[serde(default)]
    depth: usize,
    #[serde(default = "on_path_default")]
    on_path: bool,
    #[serde(default)]
    callee: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnswerIssue {
    #[serde(rename = "type")]
    issue_type: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    function: String,
    #[serde(default)]
    line: usize,
    message: String,
}

fn on_path_default() -> bool {
    true
}

const ANSWER_SHAPE: &str = r#"{"entryPoint": string,
 "steps": [{"operation": "call|declaration|assignment|branch|loop|return|throw|try|catch|break|continue|expression",
            "construct": string, "function": string, "line": number, "depth": number,
            "onPath": boolean, "callee": string | null,
            "value": "number|string|boolean|null|undefined|array|object|function|unknown" | null}],
 "issues": [{"type": "null-reference|type-mismatch|undefined-variable|unreachable-code|missing-error-handling|infinite-loop",
             "severity": "error|warning|info", "function": string, "line": number, "message": string}],
 "reachedEnd": boolean, "confidence": number}"#;

/// Asks a language model for the trace, falling back to static tracing
pub struct LlmTraceStrategy {
    backend: Arc<dyn LlmBackend>,
    fallback: StaticTraceStrategy,
}

impl LlmTraceStrategy {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            fallback: StaticTraceStrategy,
        }
    }

    fn prompt(ctx: &TraceContext<'_>) -> String {
        let fence = ctx.implementation.language.as_str();
        let entry = ctx
            .entry_point
            .unwrap_or("the first call in the example that reaches the implementation");
        let mut prompt = format!(
            "Trace the {} example below step by step without executing it.\n\
             Entry point: {}\nRecord at most {} steps and descend at most {} calls deep.\n\n",
            fence, entry, ctx.options.max_steps, ctx.options.max_depth
        );
        if !ctx.self_simulation {
            prompt.push_str(&format!(
                "Declared functions:\n{}\nImplementation:\n```{}\n{}\n```\n\n",
                ctx.implementation.outline(),
                fence,
                ctx.implementation_source
            ));
        }
        prompt.push_str(&format!(
            "Example:\n```{}\n{}\n```\n\nAnswer with JSON of this shape:\n{}\n",
            fence, ctx.example_source, ANSWER_SHAPE
        ));
        prompt
    }

    async fn fall_back(&self, ctx: &TraceContext<'_>, reason: &str) -> Result<RawTrace> {
        warn!(
            "{}: {} ({}), falling back to static tracing",
            ctx.example_id,
            reason,
            self.backend.name()
        );
        self.fallback.trace(ctx).await
    }
}

#[async_trait]
impl TraceStrategy for LlmTraceStrategy {
    fn name(&self) -> &'static str {
        "llm"
    }

    fn is_llm(&self) -> bool {
        true
    }

    async fn trace(&self, ctx: &TraceContext<'_>) -> Result<RawTrace> {
        let remaining = ctx.deadline.saturating_duration_since(Instant::now());
        let prompt = Self::prompt(ctx);
        let answer =
            match tokio::time::timeout(remaining, self.backend.complete(&prompt)).await {
                Ok(Ok(answer)) => answer,
                Ok(Err(e)) => return self.fall_back(ctx, &e.to_string()).await,
                Err(_) => return self.fall_back(ctx, "backend timed out").await,
            };
        match parse_answer(ctx, &answer) {
            Ok(raw) => {
                debug!(
                    "{}: {} step(s) from {}",
                    ctx.example_id,
                    raw.steps.len(),
                    self.backend.name()
                );
                Ok(raw)
            }
            Err(e) => self.fall_back(ctx, &e.to_string()).await,
        }
    }
}

fn parse_enum<T: DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(text.trim().to_ascii_lowercase())).ok()
}

/// Turn a backend answer into a raw trace.
fn parse_answer(ctx: &TraceContext<'_>, answer: &str) -> Result<RawTrace> {
    let (Some(start), Some(end)) = (answer.find('{'), answer.rfind('}')) else {
        return Err(Error::Llm("answer holds no JSON object".to_string()));
    };
    if end < start {
        return Err(Error::Llm("answer holds no JSON object".to_string()));
    }
    let parsed: AnswerTrace = serde_json::from_str(&answer[start..=end])
        .map_err(|e| Error::Llm(format!("answer is not a trace: {}", e)))?;
    if parsed.steps.is_empty() {
        return Err(Error::Llm("answer has no steps".to_string()));
    }

    let entry_point = ctx
        .entry_point
        .map(str::to_string)
        .or(parsed.entry_point)
        .or_else(|| parsed.steps.first().map(|s| s.function.clone()))
        .unwrap_or_default();
    let models = [ctx.implementation, ctx.example];
    let mut raw = RawTrace {
        entry_point: entry_point.clone(),
        reached_end: parsed.reached_end,
        reported_confidence: parsed.confidence.map(|c| c.clamp(0.0, 1.0)),
        ..Default::default()
    };

    let total = parsed.steps.len();
    let mut unresolved = HashSet::new();
    for (n, step) in parsed.steps.into_iter().take(ctx.options.max_steps).enumerate() {
        let call = step.callee.map(|callee| {
            let target = models.iter().find_map(|m| m.find_function(&callee));
            if target.is_none() {
                unresolved.insert(callee.clone());
            }
            CallInfo {
                resolution: if target.is_some() {
                    CallResolution::Resolved
                } else {
                    CallResolution::Unresolved
                },
                target: target.map(|f| f.qualified_name()),
                receiver: None,
                arguments: Vec::new(),
                parameters: Vec::new(),
                awaited: false,
                is_async: false,
                can_throw: target.is_some_and(|f| f.summary.can_throw),
                callee,
            }
        });
        raw.steps.push(ExecutionStep {
            id: format!("step-{}", n + 1),
            operation: parse_enum(&step.operation).unwrap_or(StepOperation::Expression),
            construct: step.construct,
            function: if step.function.is_empty() {
                entry_point.clone()
            } else {
                step.function
            },
            line: step.line,
            call_depth: step.depth,
            on_path: step.on_path,
            reachable: true,
            // guarding is unknown here; treat calls as guarded to stay quiet
            guarded: true,
            reads: Vec::new(),
            writes: Vec::new(),
            call,
            branch: None,
            value: step.value.as_deref().and_then(parse_enum::<ValueKind>),
        });
    }

    for issue in parsed.issues {
        let step_id = raw
            .steps
            .iter()
            .find(|s| s.line == issue.line && issue.line > 0)
            .map(|s| s.id.clone());
        raw.issues.push(PotentialIssue::new(
            parse_enum(&issue.issue_type).unwrap_or(IssueType::Other),
            parse_enum(&issue.severity).unwrap_or(Severity::Warning),
            IssueLocation {
                function: issue.function,
                line: issue.line,
                step_id,
            },
            issue.message,
        ));
    }

    if total > ctx.options.max_steps {
        raw.reached_end = false;
        raw.issues.push(PotentialIssue::new(
            IssueType::ExecutionLimit,
            Severity::Info,
            IssueLocation {
                function: entry_point.clone(),
                line: raw.steps.last().map(|s| s.line).unwrap_or_default(),
                step_id: raw.steps.last().map(|s| s.id.clone()),
            },
            format!(
                "step budget exceeded: stopped after {} steps",
                ctx.options.max_steps
            ),
        ));
    }

    raw.penalties.unresolved_calls = unresolved.len();
    raw.penalties.partial_parse = models.iter().filter(|m| m.is_partial()).count();
    if !ctx.self_simulation && ctx.implementation.find_function(&entry_point).is_none() {
        raw.penalties.missing_implementation = 1;
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LanguageType, SimulationOptions, StaticAnalyzer, StaticModel};
    use std::time::Duration;

    const IMPLEMENTATION: &str = r#"
export function getUser(id: string) {
  if (!id) {
    throw new Error("missing id");
  }
  return { id };
}
"#;
    const EXAMPLE: &str = "const user = getUser(\"42\");\nconsole.log(user.id);\n";

    struct Canned(&'static str);

    #[async_trait]
    impl LlmBackend for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Slow;

    #[async_trait]
    impl LlmBackend for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    fn models() -> (StaticModel, StaticModel) {
        let mut analyzer = StaticAnalyzer::new();
        let example = analyzer
            .analyze_source(EXAMPLE, LanguageType::TypeScript)
            .unwrap();
        let implementation = analyzer
            .analyze_source(IMPLEMENTATION, LanguageType::TypeScript)
            .unwrap();
        (example, implementation)
    }

    fn context<'a>(
        example: &'a StaticModel,
        implementation: &'a StaticModel,
        options: &'a SimulationOptions,
        budget: Duration,
    ) -> TraceContext<'a> {
        TraceContext {
            example_id: "ex-1",
            example_source: EXAMPLE,
            implementation_source: IMPLEMENTATION,
            example,
            implementation,
            self_simulation: false,
            entry_point: None,
            options,
            deadline: Instant::now() + budget,
        }
    }

    #[tokio::test]
    async fn test_answer_becomes_trace() {
        let answer = r#"Here you go:
{"entryPoint": "getUser",
 "steps": [
   {"operation": "call", "construct": "getUser(\"42\")", "function": "<example>", "line": 1, "depth": 0, "callee": "getUser"},
   {"operation": "branch", "construct": "if (!id)", "function": "getUser", "line": 3, "depth": 1, "value": null},
   {"operation": "return", "construct": "return { id }", "function": "getUser", "line": 6, "depth": 1, "value": "object"},
   {"operation": "teleport", "function": "<example>", "line": 2, "onPath": false}
 ],
 "issues": [{"type": "null-reference", "severity": "warning", "function": "<example>", "line": 2, "message": "user may be null"}],
 "reachedEnd": true, "confidence": 0.9}"#;
        let (example, implementation) = models();
        let options = SimulationOptions::default();
        let ctx = context(&example, &implementation, &options, Duration::from_secs(5));
        let strategy = LlmTraceStrategy::new(Arc::new(Canned(answer)));
        let raw = strategy.trace(&ctx).await.unwrap();

        assert_eq!(raw.entry_point, "getUser");
        assert_eq!(raw.steps.len(), 4);
        assert_eq!(raw.steps[2].value, Some(ValueKind::Object));
        assert_eq!(raw.steps[3].operation, StepOperation::Expression);
        assert!(!raw.steps[3].on_path);
        let call = raw.steps[0].call.as_ref().unwrap();
        assert_eq!(call.resolution, CallResolution::Resolved);
        assert!(call.can_throw);
        assert_eq!(raw.issues[0].issue_type, IssueType::NullReference);
        assert_eq!(raw.issues[0].location.step_id.as_deref(), Some("step-4"));
        assert_eq!(raw.reported_confidence, Some(0.9));
        assert!(!raw.penalties.static_fallback);
    }

    #[tokio::test]
    async fn test_step_budget_applies_to_answers() {
        let answer = r#"{"steps": [
            {"operation": "call", "line": 1, "callee": "getUser"},
            {"operation": "branch", "line": 3},
            {"operation": "return", "line": 6}], "reachedEnd": true}"#;
        let (example, implementation) = models();
        let options = SimulationOptions {
            max_steps: 2,
            ..Default::default()
        };
        let ctx = context(&example, &implementation, &options, Duration::from_secs(5));
        let raw = LlmTraceStrategy::new(Arc::new(Canned(answer)))
            .trace(&ctx)
            .await
            .unwrap();
        assert_eq!(raw.steps.len(), 2);
        assert!(!raw.reached_end);
        assert_eq!(raw.issues[0].issue_type, IssueType::ExecutionLimit);
    }

    #[tokio::test]
    async fn test_garbage_falls_back_to_static() {
        let (example, implementation) = models();
        let options = SimulationOptions::default();
        let ctx = context(&example, &implementation, &options, Duration::from_secs(5));
        let raw = LlmTraceStrategy::new(Arc::new(Canned("I cannot help with that")))
            .trace(&ctx)
            .await
            .unwrap();
        assert!(raw.penalties.static_fallback);
        assert_eq!(raw.entry_point, "getUser");
        assert!(!raw.steps.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_falls_back_within_budget() {
        let (example, implementation) = models();
        let options = SimulationOptions::default();
        let ctx = context(&example, &implementation, &options, Duration::from_millis(50));
        let started = Instant::now();
        let raw = LlmTraceStrategy::new(Arc::new(Slow))
            .trace(&ctx)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(raw.penalties.static_fallback);
        assert!(!raw.reached_end);
    }

    #[test]
    fn test_prompt_mentions_sources() {
        let (example, implementation) = models();
        let options = SimulationOptions::default();
        let ctx = context(&example, &implementation, &options, Duration::from_secs(1));
        let prompt = LlmTraceStrategy::prompt(&ctx);
        assert!(prompt.contains("```typescript"));
        assert!(prompt.contains("getUser(id: string)"));
        assert!(prompt.contains("\"reachedEnd\""));
    }
}
