use crate::ValueKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The simulator's reconstruction of one hypothetical run of an example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTrace {
    pub example_id: String,
    pub entry_point: String,
    pub execution_steps: Vec<ExecutionStep>,
    pub variables_accessed: BTreeMap<String, VariableSummary>,
    pub potential_issues: Vec<PotentialIssue>,
    pub confidence_score: f64,
    /// Ids of the steps on the single most likely path, in execution order
    pub execution_path: Vec<String>,
    pub reached_end: bool,
    /// Wall-clock cost in milliseconds
    pub simulation_duration: u64,
}

/// What a step does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOperation {
    Call,
    Declaration,
    Assignment,
    Branch,
    Loop,
    Return,
    Throw,
    Try,
    Catch,
    Break,
    Continue,
    Expression,
}

/// One inferred operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    /// `step-N`, numbered from 1 in emission order
    pub id: String,
    pub operation: StepOperation,
    /// The source excerpt the step models
    pub construct: String,
    /// The function the step runs in
    pub function: String,
    pub line: usize,
    pub call_depth: usize,
    /// Whether the step lies on the most likely path
    pub on_path: bool,
    /// False for code that can never run
    pub reachable: bool,
    /// Whether an enclosing `try` handles errors raised here
    pub guarded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reads: Vec<VariableRead>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub writes: Vec<VariableWrite>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call: Option<CallInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<ControlInfo>,
    /// Kind of the value produced, for calls, returns and writes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ValueKind>,
}

/// What a name was bound to when a step read it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum BindingState {
    Local { kind: ValueKind },
    Parameter { kind: ValueKind },
    /// A required parameter the caller did not supply
    Missing,
    Function,
    Import,
    Module,
    Global,
    Unbound,
}

impl BindingState {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Local { kind } | Self::Parameter { kind } => *kind,
            Self::Missing => ValueKind::Undefined,
            Self::Function => ValueKind::Function,
            Self::Import | Self::Module | Self::Global | Self::Unbound => ValueKind::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Parameter { .. } => "parameter",
            Self::Missing => "missing",
            Self::Function => "function",
            Self::Import => "import",
            Self::Module => "module",
            Self::Global => "global",
            Self::Unbound => "unbound",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableRead {
    pub name: String,
    pub state: BindingState,
    pub dereferenced: bool,
    /// Whether an enclosing condition already tested the name
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableWrite {
    pub name: String,
    pub kind: ValueKind,
    /// True for declarations, false for reassignments
    pub declared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    /// The kind held before a reassignment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<ValueKind>,
    /// The name is a parameter of the enclosing function
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parameter: bool,
}

impl VariableWrite {
    pub fn label(&self) -> &'static str {
        if self.parameter { "parameter" } else { "local" }
    }
}

/// How a call site was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallResolution {
    /// Resolved to a declaration and descended into
    Resolved,
    /// The entry point, invoked directly with arguments the example never supplies
    Entry,
    /// Resolved, but the frame was not entered (off-path or depth limit)
    NotEntered,
    /// Resolved to a function already on the call stack
    Recursive,
    /// Provided by the runtime, an import or an implicit constructor
    Builtin,
    /// A method or callable whose target depends on runtime values
    Dynamic,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInfo {
    pub callee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    pub resolution: CallResolution,
    /// Qualified name of the resolved declaration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub arguments: Vec<ValueKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterSpec>,
    pub awaited: bool,
    pub is_async: bool,
    /// Whether the target can raise an error it does not handle
    pub can_throw: bool,
}

/// The caller-visible shape of one parameter of a resolved target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    pub optional: bool,
    pub variadic: bool,
}

/// The decision taken at a branch or loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlInfo {
    pub condition: String,
    /// Index of the arm taken; `None` means the implicit fall-through (or no iteration)
    pub taken: Option<usize>,
    pub arms: usize,
    pub has_else: bool,
    /// Whether the condition was decided from a literal
    pub resolved: bool,
    /// Loops only: the loop can never exit
    pub infinite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    NullReference,
    TypeMismatch,
    UndefinedVariable,
    UnreachableCode,
    MissingErrorHandling,
    InfiniteLoop,
    ExecutionLimit,
    SimulationError,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLocation {
    pub function: String,
    pub line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PotentialIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    pub location: IssueLocation,
    pub message: String,
}

impl PotentialIssue {
    pub fn new(
        issue_type: IssueType,
        severity: Severity,
        location: IssueLocation,
        message: impl Into<String>,
    ) -> Self {
        Self {
            issue_type,
            severity,
            location,
            message: message.into(),
        }
    }

    /// An issue pinned to a step.
    pub fn at(
        step: &ExecutionStep,
        issue_type: IssueType,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            issue_type,
            severity,
            IssueLocation {
                function: step.function.clone(),
                line: step.line,
                step_id: Some(step.id.clone()),
            },
            message,
        )
    }
}

/// Last known state of one variable across the trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSummary {
    pub kind: ValueKind,
    pub binding: String,
    pub reads: usize,
    pub writes: usize,
    pub first_step: String,
    pub last_step: String,
}

impl ExecutionTrace {
    /// A trace with no steps and zero confidence.
    ///
    /// # Examples
    ///
    /// ```
    /// use documcp::ExecutionTrace;
    ///
    /// let trace = ExecutionTrace::empty("example-1", "main");
    /// assert_eq!(trace.confidence_score, 0.0);
    /// assert!(trace.execution_steps.is_empty());
    /// assert!(!trace.reached_end);
    /// ```
    pub fn empty(example_id: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            example_id: example_id.into(),
            entry_point: entry_point.into(),
            execution_steps: Vec::new(),
            variables_accessed: BTreeMap::new(),
            potential_issues: Vec::new(),
            confidence_score: 0.0,
            execution_path: Vec::new(),
            reached_end: false,
            simulation_duration: 0,
        }
    }

    /// An empty trace carrying a single `simulation-error` issue.
    pub fn failed(
        example_id: impl Into<String>,
        entry_point: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut trace = Self::empty(example_id, entry_point);
        trace.potential_issues.push(PotentialIssue::new(
            IssueType::SimulationError,
            Severity::Error,
            IssueLocation {
                function: trace.entry_point.clone(),
                line: 0,
                step_id: None,
            },
            message,
        ));
        trace
    }

    pub fn count_severity(&self, severity: Severity) -> usize {
        self.potential_issues
            .iter()
            .filter(|i| i.severity == severity)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.count_severity(Severity::Error) > 0
    }

    pub fn step(&self, id: &str) -> Option<&ExecutionStep> {
        self.execution_steps.iter().find(|s| s.id == id)
    }

    /// Steps on the most likely path, in order.
    pub fn path_steps(&self) -> impl Iterator<Item = &ExecutionStep> {
        self.execution_steps.iter().filter(|s| s.on_path)
    }
}

/// Summarize every variable a step reads or writes; the last write decides the kind.
pub(crate) fn summarize_variables(steps: &[ExecutionStep]) -> BTreeMap<String, VariableSummary> {
    let mut variables: BTreeMap<String, VariableSummary> = BTreeMap::new();
    let mut touch = |name: &str, step: &ExecutionStep, kind: ValueKind, binding: &str, write| {
        let entry = variables
            .entry(name.to_string())
            .or_insert_with(|| VariableSummary {
                kind,
                binding: binding.to_string(),
                reads: 0,
                writes: 0,
                first_step: step.id.clone(),
                last_step: step.id.clone(),
            });
        entry.last_step = step.id.clone();
        if write {
            entry.writes += 1;
            entry.kind = kind;
            entry.binding = binding.to_string();
        } else {
            entry.reads += 1;
            if entry.writes == 0 {
                entry.kind = kind;
                entry.binding = binding.to_string();
            }
        }
    };
    for step in steps {
        for read in &step.reads {
            touch(&read.name, step, read.state.kind(), read.state.label(), false);
        }
        for write in &step.writes {
            touch(&write.name, step, write.kind, write.label(), true);
        }
    }
    variables
}
