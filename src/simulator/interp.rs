use super::{
    BindingState, CallInfo, CallResolution, ControlInfo, ExecutionStep, IssueLocation, IssueType,
    ParameterSpec, Penalties, PotentialIssue, RawTrace, Severity, StepOperation, TraceContext,
    VariableRead, VariableWrite,
};
use crate::analyzer::AnalyzerRules;
use crate::{
    Block, CallSite, FunctionModel, LanguageType, SimulationOptions, StaticModel, Statement,
    StatementKind, ValueHint, ValueKind, literal_truth,
};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Name of the frame that runs the example's own statements.
pub(crate) const DRIVER: &str = "<example>";

pub(crate) fn run(ctx: &TraceContext<'_>) -> RawTrace {
    Interpreter::new(ctx).run(ctx.entry_point)
}

#[derive(Debug, Clone, Copy)]
struct Mode {
    on_path: bool,
    reachable: bool,
}

impl Mode {
    const PATH: Mode = Mode {
        on_path: true,
        reachable: true,
    };

    fn off_path(self) -> Mode {
        Mode {
            on_path: false,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Flow {
    Normal,
    Return(ValueKind),
    Throw,
    Break,
    Continue,
    /// An endless loop with no way out
    Diverge,
    /// A callee raised (`true`) or never returned (`false`)
    Escaped(bool),
    /// A budget ran out
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Budget {
    Steps,
    Time,
}

enum Entry<'m> {
    Function(&'m FunctionModel),
    Unresolved(String),
    Missing,
}

#[derive(Debug, Clone)]
struct Frame {
    function: String,
    owner: Option<String>,
    depth: usize,
    bindings: HashMap<String, BindingState>,
    /// Variables known to hold an instance of a declared type
    instances: HashMap<String, String>,
    /// Names already tested by an enclosing condition
    checked: HashSet<String>,
    try_depth: usize,
}

impl Frame {
    fn new(function: impl Into<String>, owner: Option<String>, depth: usize) -> Self {
        Self {
            function: function.into(),
            owner,
            depth,
            bindings: HashMap::new(),
            instances: HashMap::new(),
            checked: HashSet::new(),
            try_depth: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct CallResult {
    kind: ValueKind,
    owner: Option<String>,
}

struct Interpreter<'a> {
    example: &'a StaticModel,
    implementation: &'a StaticModel,
    self_simulation: bool,
    rules: AnalyzerRules,
    options: &'a SimulationOptions,
    deadline: Instant,
    steps: Vec<ExecutionStep>,
    issues: Vec<PotentialIssue>,
    stack: Vec<String>,
    entered: HashSet<String>,
    results: HashMap<String, CallResult>,
    unresolved: HashSet<String>,
    dynamic: HashSet<String>,
    ambiguous_branches: usize,
    halted: Option<Budget>,
}

impl<'a> Interpreter<'a> {
    fn new(ctx: &TraceContext<'a>) -> Self {
        Self {
            example: ctx.example,
            implementation: ctx.implementation,
            self_simulation: ctx.self_simulation,
            rules: AnalyzerRules::for_language(ctx.implementation.language),
            options: ctx.options,
            deadline: ctx.deadline,
            steps: Vec::new(),
            issues: Vec::new(),
            stack: Vec::new(),
            entered: HashSet::new(),
            results: HashMap::new(),
            unresolved: HashSet::new(),
            dynamic: HashSet::new(),
            ambiguous_branches: 0,
            halted: None,
        }
    }

    fn models(&self) -> [&'a StaticModel; 2] {
        [self.implementation, self.example]
    }

    fn run(mut self, explicit: Option<&str>) -> RawTrace {
        let entry = self.resolve_entry(explicit);
        let partial = self.partial_sources();

        let (driver, driver_name) = match self.example.find_function("main") {
            Some(main) if self.example.top_level.statements.is_empty() => (&main.body, "main"),
            _ => (&self.example.top_level, DRIVER),
        };
        let mut frame = Frame::new(driver_name, None, 0);
        let mut flow = self.exec_block(driver, &mut frame, Mode::PATH);

        let mut unresolved_entry = false;
        let entry_point = match entry {
            Entry::Function(function) => {
                let name = function.qualified_name();
                let finished = matches!(flow, Flow::Normal | Flow::Return(_));
                if finished && !self.entered.contains(&name) {
                    flow = self.invoke_entry(function, &frame);
                }
                name
            }
            Entry::Unresolved(name) => {
                unresolved_entry = true;
                self.report_unresolved_entry(&name);
                name
            }
            Entry::Missing => driver_name.to_string(),
        };

        if matches!(flow, Flow::Throw | Flow::Escaped(true)) {
            let location = self.last_location(&entry_point);
            self.issues.push(PotentialIssue::new(
                IssueType::MissingErrorHandling,
                Severity::Warning,
                location,
                "Execution ends with an error that nothing catches",
            ));
        }

        let reached_end = self.halted.is_none()
            && matches!(flow, Flow::Normal | Flow::Return(_) | Flow::Break | Flow::Continue)
            && !unresolved_entry
            && !self.steps.is_empty();

        RawTrace {
            entry_point,
            penalties: Penalties {
                unresolved_calls: self.unresolved.len(),
                ambiguous_branches: self.ambiguous_branches,
                dynamic_dispatch: self.dynamic.len(),
                missing_implementation: usize::from(unresolved_entry),
                partial_parse: partial,
                static_fallback: false,
            },
            steps: self.steps,
            issues: self.issues,
            reached_end,
            reported_confidence: None,
            unresolved_entry,
        }
    }

    /// Count partial sources and note each one as an issue.
    fn partial_sources(&mut self) -> usize {
        let mut sources = vec![("example", self.example)];
        if !self.self_simulation {
            sources.push(("implementation", self.implementation));
        }
        let mut count = 0;
        for (label, model) in sources {
            if model.is_partial() {
                count += 1;
                self.issues.push(PotentialIssue::new(
                    IssueType::Other,
                    Severity::Info,
                    IssueLocation {
                        function: DRIVER.to_string(),
                        line: 0,
                        step_id: None,
                    },
                    format!(
                        "The {} has {} syntax error region(s); the trace is based on a partial model",
                        label, model.parse_errors
                    ),
                ));
            }
        }
        count
    }

    fn resolve_entry(&self, explicit: Option<&str>) -> Entry<'a> {
        if let Some(name) = explicit {
            return self
                .models()
                .into_iter()
                .find_map(|m| m.find_function(name))
                .map(Entry::Function)
                .unwrap_or_else(|| Entry::Unresolved(name.to_string()));
        }

        let mut calls = self.example.top_level.call_sites();
        for function in &self.example.functions {
            calls.extend(function.summary.calls.iter().cloned());
        }
        let candidates: Vec<&CallSite> = calls
            .iter()
            .filter(|c| {
                c.receiver.as_deref().is_none_or(|r| {
                    !self.is_external(receiver_root(r))
                        || self.qualified_function(r, &c.callee).is_some()
                })
            })
            .collect();

        // a plain call beats a constructor call
        for constructors in [false, true] {
            for call in &candidates {
                if let Some(function) = self.implementation.resolve_call(call) {
                    if function.is_constructor() == constructors {
                        return Entry::Function(function);
                    }
                }
            }
        }
        for call in &candidates {
            if call.receiver.is_some()
                || self.rules.is_global(&call.callee)
                || self.rules.is_panic_call(&call.callee)
                || self.models().iter().any(|m| m.imports_name(&call.callee))
            {
                continue;
            }
            return match self.example.find_function(&call.callee) {
                Some(function) => Entry::Function(function),
                None => Entry::Unresolved(call.callee.clone()),
            };
        }

        let functions = &self.implementation.functions;
        functions
            .iter()
            .find(|f| f.exported && f.owner.is_none())
            .or_else(|| functions.iter().find(|f| f.exported))
            .or_else(|| functions.first())
            .map(Entry::Function)
            .unwrap_or(Entry::Missing)
    }

    fn report_unresolved_entry(&mut self, name: &str) {
        let step = self.steps.iter().find(|s| {
            s.call
                .as_ref()
                .is_some_and(|c| c.callee == name && c.resolution == CallResolution::Unresolved)
        });
        let location = match step {
            Some(step) => IssueLocation {
                function: step.function.clone(),
                line: step.line,
                step_id: Some(step.id.clone()),
            },
            None => IssueLocation {
                function: DRIVER.to_string(),
                line: 0,
                step_id: None,
            },
        };
        self.issues.push(PotentialIssue::new(
            IssueType::UndefinedVariable,
            Severity::Error,
            location,
            format!("Entry point `{}` is not declared in the implementation", name),
        ));
    }

    fn last_location(&self, fallback: &str) -> IssueLocation {
        match self.steps.iter().rev().find(|s| s.on_path) {
            Some(step) => IssueLocation {
                function: step.function.clone(),
                line: step.line,
                step_id: Some(step.id.clone()),
            },
            None => IssueLocation {
                function: fallback.to_string(),
                line: 0,
                step_id: None,
            },
        }
    }

    fn invoke_entry(&mut self, function: &'a FunctionModel, driver: &Frame) -> Flow {
        let mut step = self.new_step(
            driver,
            Mode::PATH,
            StepOperation::Call,
            function.line,
            format!("{}(...)", function.qualified_name()),
            Vec::new(),
        );
        step.call = Some(self.call_info(
            &function.name,
            function.owner.clone(),
            CallResolution::Entry,
            Some(function),
            Vec::new(),
            false,
        ));
        if !self.push(step) {
            return Flow::Halt;
        }
        let index = self.steps.len() - 1;
        let (flow, returned) = self.enter(function, &[], true, driver, Mode::PATH);
        if let Some(kind) = returned {
            self.steps[index].value = Some(kind);
        }
        flow
    }

    fn halt(&mut self, budget: Budget) {
        if self.halted.is_some() {
            return;
        }
        self.halted = Some(budget);
        let message = match budget {
            Budget::Steps => format!(
                "step budget exceeded: stopped after {} steps",
                self.options.max_steps
            ),
            Budget::Time => format!(
                "time budget exceeded: stopped after {} ms",
                self.options.timeout_ms
            ),
        };
        let location = self.last_location(DRIVER);
        self.issues.push(PotentialIssue::new(
            IssueType::ExecutionLimit,
            Severity::Info,
            location,
            message,
        ));
    }

    /// Record a step; false once a budget is exhausted.
    fn push(&mut self, mut step: ExecutionStep) -> bool {
        if self.halted.is_some() {
            return false;
        }
        if self.steps.len() >= self.options.max_steps {
            self.halt(Budget::Steps);
            return false;
        }
        if Instant::now() >= self.deadline {
            self.halt(Budget::Time);
            return false;
        }
        step.id = format!("step-{}", self.steps.len() + 1);
        self.steps.push(step);
        true
    }

    fn new_step(
        &self,
        frame: &Frame,
        mode: Mode,
        operation: StepOperation,
        line: usize,
        construct: String,
        reads: Vec<VariableRead>,
    ) -> ExecutionStep {
        ExecutionStep {
            id: String::new(),
            operation,
            construct,
            function: frame.function.clone(),
            line,
            call_depth: frame.depth,
            on_path: mode.on_path,
            reachable: mode.reachable,
            guarded: frame.try_depth > 0,
            reads,
            writes: Vec::new(),
            call: None,
            branch: None,
            value: None,
        }
    }

    fn step(
        &self,
        frame: &Frame,
        mode: Mode,
        operation: StepOperation,
        statement: &Statement,
    ) -> ExecutionStep {
        let reads = statement
            .reads
            .iter()
            .map(|read| VariableRead {
                name: read.name.clone(),
                state: self.lookup(frame, &read.name),
                dereferenced: read.dereferenced,
                checked: frame.checked.contains(&read.name),
            })
            .collect();
        self.new_step(
            frame,
            mode,
            operation,
            statement.line,
            statement.text.clone(),
            reads,
        )
    }

    fn lookup(&self, frame: &Frame, name: &str) -> BindingState {
        if let Some(state) = frame.bindings.get(name) {
            return state.clone();
        }
        if self.rules.is_self_word(name) {
            return BindingState::Global;
        }
        let models = self.models();
        if models
            .iter()
            .any(|m| m.find_function(name).is_some() || m.is_owner(name))
        {
            return BindingState::Function;
        }
        if models
            .iter()
            .any(|m| m.imports_name(name) || m.is_package(name))
        {
            return BindingState::Import;
        }
        if models.iter().any(|m| m.declares(name)) {
            return BindingState::Module;
        }
        if self.rules.is_global(name) {
            return BindingState::Global;
        }
        BindingState::Unbound
    }

    fn is_external(&self, root: &str) -> bool {
        self.rules.is_global(root)
            || self
                .models()
                .iter()
                .any(|m| m.imports_name(root) || m.is_package(root))
    }

    /// A free function of the implementation called through a module or
    /// package qualifier, as in `calc.add(1, 2)`.
    fn qualified_function(&self, receiver: &str, callee: &str) -> Option<&'a FunctionModel> {
        let root = receiver_root(receiver);
        let qualifier = self
            .models()
            .iter()
            .any(|m| m.imports_name(root) || m.is_package(root));
        if !qualifier {
            return None;
        }
        self.implementation
            .functions
            .iter()
            .find(|f| f.owner.is_none() && f.name == callee)
    }

    fn eval(&self, hint: &ValueHint, frame: &Frame) -> ValueKind {
        match hint {
            ValueHint::Literal(kind) => *kind,
            ValueHint::Identifier(name) => self.lookup(frame, name).kind(),
            ValueHint::Call(callee) => self
                .results
                .get(callee)
                .map(|r| r.kind)
                .unwrap_or(ValueKind::Unknown),
            ValueHint::Expression => ValueKind::Unknown,
        }
    }

    /// Kind of a variable declared without an initialiser.
    fn uninitialized(&self, type_hint: Option<&str>) -> ValueKind {
        match self.implementation.language {
            LanguageType::TypeScript | LanguageType::Python => ValueKind::Undefined,
            LanguageType::Rust => ValueKind::Unknown,
            LanguageType::Go => match type_hint.map(str::trim) {
                Some(hint)
                    if hint.starts_with('*')
                        || hint.starts_with("map[")
                        || hint.starts_with("interface")
                        || hint == "error" =>
                {
                    ValueKind::Null
                }
                Some(hint) => ValueKind::from_type_hint(hint).unwrap_or(ValueKind::Unknown),
                None => ValueKind::Unknown,
            },
        }
    }

    /// Kind produced by falling off the end of a function.
    fn fallthrough_kind(&self, function: &FunctionModel) -> ValueKind {
        if function.is_constructor() {
            return ValueKind::Object;
        }
        if let Some(kind) = function
            .return_type
            .as_deref()
            .and_then(ValueKind::from_type_hint)
        {
            return kind;
        }
        match self.implementation.language {
            LanguageType::TypeScript => ValueKind::Undefined,
            LanguageType::Python => ValueKind::Null,
            LanguageType::Rust | LanguageType::Go => ValueKind::Unknown,
        }
    }

    fn declared_owner(&self, type_hint: &str) -> Option<String> {
        let name = type_hint
            .trim()
            .trim_start_matches(['*', '&'])
            .trim_start_matches("mut ")
            .split(['<', '[', ' ', '|'])
            .next()
            .unwrap_or_default();
        self.models()
            .iter()
            .any(|m| m.is_owner(name) || m.declares(name))
            .then(|| name.to_string())
            .filter(|n| !n.is_empty())
    }

    /// What a call produces when its body is not traced.
    fn static_result(&self, target: Option<&FunctionModel>, site: &CallSite) -> CallResult {
        let Some(function) = target else {
            // a class without an explicit constructor
            let owner = self
                .models()
                .iter()
                .any(|m| m.is_owner(&site.callee))
                .then(|| site.callee.clone());
            let kind = if owner.is_some() {
                ValueKind::Object
            } else {
                ValueKind::Unknown
            };
            return CallResult { kind, owner };
        };
        if function.is_constructor() {
            return CallResult {
                kind: ValueKind::Object,
                owner: function.owner.clone(),
            };
        }
        let owner = function
            .return_type
            .as_deref()
            .and_then(|hint| self.declared_owner(hint));
        let promised = function.is_async
            && !site.awaited
            && matches!(
                self.implementation.language,
                LanguageType::TypeScript | LanguageType::Python
            );
        let kind = if promised {
            ValueKind::Object
        } else if owner.is_some() {
            ValueKind::Object
        } else {
            function
                .return_type
                .as_deref()
                .and_then(ValueKind::from_type_hint)
                .unwrap_or(ValueKind::Unknown)
        };
        CallResult { kind, owner }
    }

    fn receiver_owner(&self, receiver: &str, frame: &Frame) -> Option<String> {
        if self.rules.is_self_word(receiver) {
            return frame.owner.clone();
        }
        if let Some(owner) = frame.instances.get(receiver) {
            return Some(owner.clone());
        }
        self.models()
            .iter()
            .any(|m| m.is_owner(receiver))
            .then(|| receiver.to_string())
    }

    fn resolve(&self, site: &CallSite, frame: &Frame) -> (CallResolution, Option<&'a FunctionModel>) {
        let models = self.models();
        let Some(receiver) = site.receiver.as_deref() else {
            let plain = models.into_iter().find_map(|m| {
                m.functions
                    .iter()
                    .find(|f| f.owner.is_none() && f.name == site.callee)
                    .or_else(|| m.find_constructor(&site.callee))
            });
            if let Some(state) = frame.bindings.get(&site.callee) {
                // a local holding a lambda we know is still that lambda
                return match (state.kind(), plain) {
                    (ValueKind::Function, Some(function)) => (CallResolution::Resolved, Some(function)),
                    _ => (CallResolution::Dynamic, None),
                };
            }
            if let Some(function) = plain {
                return (CallResolution::Resolved, Some(function));
            }
            if self.rules.is_global(&site.callee)
                || self.rules.is_panic_call(&site.callee)
                || models
                    .iter()
                    .any(|m| m.imports_name(&site.callee) || m.is_owner(&site.callee))
            {
                return (CallResolution::Builtin, None);
            }
            return (CallResolution::Unresolved, None);
        };

        if let Some(owner) = self.receiver_owner(receiver, frame) {
            let method = models.into_iter().find_map(|m| {
                m.functions
                    .iter()
                    .find(|f| f.name == site.callee && f.owner.as_deref() == Some(owner.as_str()))
            });
            if let Some(method) = method {
                return (CallResolution::Resolved, Some(method));
            }
        }
        if let Some(function) = self.qualified_function(receiver, &site.callee) {
            return (CallResolution::Resolved, Some(function));
        }
        if self.is_external(receiver_root(receiver)) {
            return (CallResolution::Builtin, None);
        }
        // receiver of unknown type: go by the method name
        let own_field = self.rules.is_self_word(receiver_root(receiver));
        let mut candidates: Vec<&'a FunctionModel> = Vec::new();
        for model in models {
            for function in &model.functions {
                let seen = candidates
                    .iter()
                    .any(|c| c.qualified_name() == function.qualified_name());
                // `this.items.get()` is not a call to our own `get`
                let own = own_field && function.owner.is_some() && function.owner == frame.owner;
                if function.owner.is_some() && function.name == site.callee && !seen && !own {
                    candidates.push(function);
                }
            }
        }
        match candidates.as_slice() {
            [] => (CallResolution::Builtin, None),
            [only] => (CallResolution::Resolved, Some(*only)),
            _ => (CallResolution::Dynamic, None),
        }
    }

    fn call_info(
        &self,
        callee: &str,
        receiver: Option<String>,
        resolution: CallResolution,
        target: Option<&FunctionModel>,
        arguments: Vec<ValueKind>,
        awaited: bool,
    ) -> CallInfo {
        CallInfo {
            callee: callee.to_string(),
            receiver,
            resolution,
            target: target.map(FunctionModel::qualified_name),
            arguments,
            parameters: target
                .map(|t| {
                    t.parameters
                        .iter()
                        .filter(|p| !p.is_self)
                        .map(|p| ParameterSpec {
                            name: p.name.clone(),
                            type_hint: p.type_hint.clone(),
                            optional: p.optional || p.has_default,
                            variadic: p.variadic,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            awaited,
            is_async: target.is_some_and(|t| t.is_async),
            can_throw: target.is_some_and(|t| t.summary.can_throw),
        }
    }

    fn exec_block(&mut self, block: &'a Block, frame: &mut Frame, mode: Mode) -> Flow {
        for name in &block.bindings {
            frame.bindings.insert(
                name.clone(),
                BindingState::Local {
                    kind: ValueKind::Unknown,
                },
            );
        }
        let mut outcome = Flow::Normal;
        for statement in &block.statements {
            if outcome != Flow::Normal {
                if !self.dead(statement, frame) {
                    return Flow::Halt;
                }
                continue;
            }
            let flow = self.exec(statement, frame, mode);
            match flow {
                Flow::Halt | Flow::Escaped(_) => return flow,
                _ => outcome = flow,
            }
        }
        outcome
    }

    /// Record a statement that can never run.
    fn dead(&mut self, statement: &Statement, frame: &Frame) -> bool {
        let operation = operation_of(&statement.kind);
        let mut step = self.step(
            frame,
            Mode {
                on_path: false,
                reachable: false,
            },
            operation,
            statement,
        );
        if let StatementKind::Call(site) = &statement.kind {
            let (resolution, target) = match self.resolve(site, frame) {
                (_, Some(function)) => (CallResolution::NotEntered, Some(function)),
                (resolution, None) => (resolution, None),
            };
            let arguments = site.arguments.iter().map(|a| self.eval(a, frame)).collect();
            step.call = Some(self.call_info(
                &site.callee,
                site.receiver.clone(),
                resolution,
                target,
                arguments,
                site.awaited,
            ));
        }
        self.push(step)
    }

    fn exec(&mut self, statement: &'a Statement, frame: &mut Frame, mode: Mode) -> Flow {
        if self.halted.is_some() {
            return Flow::Halt;
        }
        match &statement.kind {
            StatementKind::Call(site) => self.call(statement, site, frame, mode),
            StatementKind::Declaration {
                names,
                value,
                type_hint,
            } => self.declare(statement, names, value.as_ref(), type_hint.as_deref(), frame, mode),
            StatementKind::Assignment { target, value } => {
                self.assign(statement, target, value.as_ref(), frame, mode)
            }
            StatementKind::Expression => {
                let step = self.step(frame, mode, StepOperation::Expression, statement);
                self.advance(step, Flow::Normal)
            }
            StatementKind::Branch {
                condition,
                arms,
                has_else,
            } => self.branch(statement, condition, arms, *has_else, frame, mode),
            StatementKind::Loop {
                header,
                condition,
                body,
            } => self.repeat(statement, header, condition.as_deref(), body, frame, mode),
            StatementKind::Return { value } => {
                let kind = match value {
                    Some(hint) => self.eval(hint, frame),
                    None => match self.implementation.language {
                        LanguageType::TypeScript => ValueKind::Undefined,
                        LanguageType::Python => ValueKind::Null,
                        _ => ValueKind::Unknown,
                    },
                };
                let mut step = self.step(frame, mode, StepOperation::Return, statement);
                step.value = Some(kind);
                self.advance(step, Flow::Return(kind))
            }
            StatementKind::Throw { value } => {
                let mut step = self.step(frame, mode, StepOperation::Throw, statement);
                step.value = value.as_ref().map(|hint| self.eval(hint, frame));
                self.advance(step, Flow::Throw)
            }
            StatementKind::Break => {
                let step = self.step(frame, mode, StepOperation::Break, statement);
                self.advance(step, Flow::Break)
            }
            StatementKind::Continue => {
                let step = self.step(frame, mode, StepOperation::Continue, statement);
                self.advance(step, Flow::Continue)
            }
            StatementKind::Try {
                body,
                handler,
                finalizer,
            } => self.attempt(statement, body, handler.as_ref(), finalizer.as_ref(), frame, mode),
        }
    }

    fn advance(&mut self, step: ExecutionStep, flow: Flow) -> Flow {
        if self.push(step) { flow } else { Flow::Halt }
    }

    fn call(&mut self, statement: &Statement, site: &CallSite, frame: &mut Frame, mode: Mode) -> Flow {
        let (mut resolution, target) = self.resolve(site, frame);
        if let Some(function) = target {
            if self.stack.contains(&function.qualified_name()) {
                resolution = CallResolution::Recursive;
            } else if !mode.on_path || frame.depth + 1 > self.options.max_depth {
                resolution = CallResolution::NotEntered;
            }
        }
        match resolution {
            CallResolution::Unresolved => {
                self.unresolved.insert(site.callee.clone());
            }
            CallResolution::Dynamic => {
                self.dynamic.insert(site.callee.clone());
            }
            _ => {}
        }

        let arguments: Vec<ValueKind> = site
            .arguments
            .iter()
            .map(|a| self.eval(a, frame))
            .collect();
        let mut result = self.static_result(target, site);
        let mut step = self.step(frame, mode, StepOperation::Call, statement);
        step.call = Some(self.call_info(
            &site.callee,
            site.receiver.clone(),
            resolution,
            target,
            arguments.clone(),
            site.awaited,
        ));
        step.value = Some(result.kind);
        if !self.push(step) {
            return Flow::Halt;
        }
        let index = self.steps.len() - 1;

        let mut flow = Flow::Normal;
        if let (CallResolution::Resolved, Some(function)) = (resolution, target) {
            let (outcome, returned) = self.enter(function, &arguments, false, frame, mode);
            flow = outcome;
            if let Some(kind) = returned.filter(|_| !function.is_constructor()) {
                result.kind = kind;
                self.steps[index].value = Some(kind);
            }
        }
        self.results.insert(site.callee.clone(), result);
        flow
    }

    /// Descend into a function body; returns the flow seen by the caller and the returned kind.
    fn enter(
        &mut self,
        function: &'a FunctionModel,
        arguments: &[ValueKind],
        direct: bool,
        caller: &Frame,
        mode: Mode,
    ) -> (Flow, Option<ValueKind>) {
        let name = function.qualified_name();
        self.entered.insert(name.clone());
        let mut frame = Frame::new(name.clone(), function.owner.clone(), caller.depth + 1);
        frame.try_depth = caller.try_depth;

        let mut supplied = arguments.iter();
        for parameter in &function.parameters {
            if parameter.is_self {
                frame.bindings.insert(
                    parameter.name.clone(),
                    BindingState::Local {
                        kind: ValueKind::Object,
                    },
                );
                if let Some(owner) = &function.owner {
                    frame.instances.insert(parameter.name.clone(), owner.clone());
                }
                continue;
            }
            let declared = parameter
                .type_hint
                .as_deref()
                .and_then(ValueKind::from_type_hint)
                .unwrap_or(ValueKind::Unknown);
            let state = if parameter.variadic {
                supplied.by_ref().for_each(drop);
                BindingState::Parameter {
                    kind: ValueKind::Array,
                }
            } else {
                match supplied.next() {
                    Some(kind) => BindingState::Parameter { kind: *kind },
                    None if direct || parameter.has_default => {
                        BindingState::Parameter { kind: declared }
                    }
                    None if parameter.optional => BindingState::Parameter {
                        kind: ValueKind::Undefined,
                    },
                    None => BindingState::Missing,
                }
            };
            if let Some(owner) = parameter
                .type_hint
                .as_deref()
                .and_then(|hint| self.declared_owner(hint))
            {
                frame.instances.insert(parameter.name.clone(), owner);
            }
            frame.bindings.insert(parameter.name.clone(), state);
        }

        self.stack.push(name);
        let flow = self.exec_block(&function.body, &mut frame, mode);
        self.stack.pop();

        match flow {
            Flow::Return(kind) => (Flow::Normal, Some(kind)),
            Flow::Normal | Flow::Break | Flow::Continue => {
                (Flow::Normal, Some(self.fallthrough_kind(function)))
            }
            Flow::Throw | Flow::Escaped(true) => (Flow::Escaped(true), None),
            Flow::Diverge | Flow::Escaped(false) => (Flow::Escaped(false), None),
            Flow::Halt => (Flow::Halt, None),
        }
    }

    fn declare(
        &mut self,
        statement: &Statement,
        names: &[String],
        value: Option<&ValueHint>,
        type_hint: Option<&str>,
        frame: &mut Frame,
        mode: Mode,
    ) -> Flow {
        let kind = match value {
            Some(hint) => self.eval(hint, frame),
            None => self.uninitialized(type_hint),
        };
        let owner = self.value_owner(value, type_hint);
        let mut step = self.step(frame, mode, StepOperation::Declaration, statement);
        step.value = Some(kind);
        let single = names.len() == 1;
        // `limit = limit + 1` in Python rebinds the parameter
        let rebinds = self.rules.assignment_declares
            && single
            && matches!(
                frame.bindings.get(&names[0]),
                Some(BindingState::Parameter { .. } | BindingState::Missing)
            );
        for name in names {
            let bound = if single { kind } else { ValueKind::Unknown };
            let state = if rebinds {
                BindingState::Parameter { kind: bound }
            } else {
                BindingState::Local { kind: bound }
            };
            frame.bindings.insert(name.clone(), state);
            frame.checked.remove(name);
            match owner.as_ref().filter(|_| single) {
                Some(owner) => frame.instances.insert(name.clone(), owner.clone()),
                None => frame.instances.remove(name),
            };
            step.writes.push(VariableWrite {
                name: name.clone(),
                kind: bound,
                declared: true,
                type_hint: type_hint.filter(|_| single).map(str::to_string),
                previous: None,
                parameter: rebinds,
            });
        }
        self.advance(step, Flow::Normal)
    }

    fn value_owner(&self, value: Option<&ValueHint>, type_hint: Option<&str>) -> Option<String> {
        match value {
            Some(ValueHint::Call(callee)) => self.results.get(callee).and_then(|r| r.owner.clone()),
            _ => type_hint.and_then(|hint| self.declared_owner(hint)),
        }
    }

    fn assign(
        &mut self,
        statement: &Statement,
        target: &str,
        value: Option<&ValueHint>,
        frame: &mut Frame,
        mode: Mode,
    ) -> Flow {
        let mut step = self.step(frame, mode, StepOperation::Assignment, statement);
        let evaluated = value.map(|hint| self.eval(hint, frame));
        if !is_plain_name(target) {
            step.value = evaluated;
            return self.advance(step, Flow::Normal);
        }
        let previous = self.lookup(frame, target);
        let prior = match previous {
            BindingState::Local { kind } | BindingState::Parameter { kind } => Some(kind),
            BindingState::Missing => Some(ValueKind::Undefined),
            _ => None,
        };
        // compound assignments keep the kind they had
        let kind = evaluated
            .or(prior)
            .unwrap_or(ValueKind::Unknown);
        let parameter = matches!(
            previous,
            BindingState::Parameter { .. } | BindingState::Missing
        );
        let state = if parameter {
            BindingState::Parameter { kind }
        } else {
            BindingState::Local { kind }
        };
        frame.bindings.insert(target.to_string(), state);
        frame.checked.remove(target);
        match self.value_owner(value, None) {
            Some(owner) => frame.instances.insert(target.to_string(), owner),
            None => frame.instances.remove(target),
        };
        step.value = Some(kind);
        step.writes.push(VariableWrite {
            name: target.to_string(),
            kind,
            declared: false,
            type_hint: None,
            previous: prior,
            parameter,
        });
        self.advance(step, Flow::Normal)
    }

    fn branch(
        &mut self,
        statement: &Statement,
        condition: &str,
        arms: &'a [Block],
        has_else: bool,
        frame: &mut Frame,
        mode: Mode,
    ) -> Flow {
        let literal = literal_truth(condition);
        let taken = match literal {
            Some(true) => (!arms.is_empty()).then_some(0),
            Some(false) if arms.len() > 1 => likely_arm(&arms[1..], has_else).map(|i| i + 1),
            Some(false) => None,
            None => likely_arm(arms, has_else),
        };
        let mut step = self.step(frame, mode, StepOperation::Branch, statement);
        step.branch = Some(ControlInfo {
            condition: condition.to_string(),
            taken,
            arms: arms.len(),
            has_else,
            resolved: literal.is_some(),
            infinite: false,
        });
        if !self.push(step) {
            return Flow::Halt;
        }
        if literal.is_none() && mode.on_path {
            self.ambiguous_branches += 1;
        }
        for read in &statement.reads {
            frame.checked.insert(read.name.clone());
        }

        let mut flow = Flow::Normal;
        for (index, arm) in arms.iter().enumerate() {
            let outcome = if Some(index) == taken {
                let outcome = self.exec_block(arm, frame, mode);
                flow = outcome;
                outcome
            } else {
                let dead = match literal {
                    Some(true) => index > 0,
                    Some(false) => index == 0,
                    None => false,
                };
                let arm_mode = Mode {
                    on_path: false,
                    reachable: mode.reachable && !dead,
                };
                let mut scratch = frame.clone();
                self.exec_block(arm, &mut scratch, arm_mode)
            };
            if outcome == Flow::Halt {
                return Flow::Halt;
            }
        }
        flow
    }

    fn repeat(
        &mut self,
        statement: &Statement,
        header: &str,
        condition: Option<&str>,
        body: &'a Block,
        frame: &mut Frame,
        mode: Mode,
    ) -> Flow {
        let literal = condition.and_then(literal_truth);
        let endless = condition.is_none() || literal == Some(true);
        let infinite = endless && !body.has_exit();
        let never = literal == Some(false);

        let mut step = self.step(frame, mode, StepOperation::Loop, statement);
        step.branch = Some(ControlInfo {
            condition: condition.unwrap_or(header).to_string(),
            taken: (!never).then_some(0),
            arms: 1,
            has_else: false,
            resolved: literal.is_some() || condition.is_none(),
            infinite,
        });
        if !self.push(step) {
            return Flow::Halt;
        }

        if never {
            let mut scratch = frame.clone();
            let dead = Mode {
                on_path: false,
                reachable: false,
            };
            return match self.exec_block(body, &mut scratch, dead) {
                Flow::Halt => Flow::Halt,
                _ => Flow::Normal,
            };
        }
        // one representative iteration
        match self.exec_block(body, frame, mode) {
            Flow::Normal | Flow::Break | Flow::Continue if infinite => Flow::Diverge,
            Flow::Normal | Flow::Break | Flow::Continue => Flow::Normal,
            other => other,
        }
    }

    fn attempt(
        &mut self,
        statement: &Statement,
        body: &'a Block,
        handler: Option<&'a Block>,
        finalizer: Option<&'a Block>,
        frame: &mut Frame,
        mode: Mode,
    ) -> Flow {
        let step = self.step(frame, mode, StepOperation::Try, statement);
        if !self.push(step) {
            return Flow::Halt;
        }
        frame.try_depth += 1;
        let outcome = self.exec_block(body, frame, mode);
        frame.try_depth -= 1;
        if outcome == Flow::Halt {
            return Flow::Halt;
        }

        let raised = matches!(outcome, Flow::Throw | Flow::Escaped(true));
        let mut flow = outcome;
        if let Some(handler) = handler {
            let handler_mode = if raised { mode } else { mode.off_path() };
            let step = self.new_step(
                frame,
                handler_mode,
                StepOperation::Catch,
                handler.line,
                "catch".to_string(),
                Vec::new(),
            );
            if !self.push(step) {
                return Flow::Halt;
            }
            if raised {
                flow = self.exec_block(handler, frame, mode);
            } else {
                let mut scratch = frame.clone();
                if self.exec_block(handler, &mut scratch, handler_mode) == Flow::Halt {
                    return Flow::Halt;
                }
            }
        }
        if let Some(finalizer) = finalizer {
            match self.exec_block(finalizer, frame, mode) {
                Flow::Normal => {}
                other => flow = other,
            }
        }
        flow
    }
}

/// Index of the arm most likely taken: the first that can fall through.
///
/// `None` stands for the implicit fall-through past a branch without `else`.
fn likely_arm(arms: &[Block], has_else: bool) -> Option<usize> {
    match arms.iter().position(|arm| !arm.terminates()) {
        Some(index) => Some(index),
        None if has_else && !arms.is_empty() => Some(0),
        None => None,
    }
}

fn operation_of(kind: &StatementKind) -> StepOperation {
    match kind {
        StatementKind::Call(_) => StepOperation::Call,
        StatementKind::Declaration { .. } => StepOperation::Declaration,
        StatementKind::Assignment { .. } => StepOperation::Assignment,
        StatementKind::Expression => StepOperation::Expression,
        StatementKind::Branch { .. } => StepOperation::Branch,
        StatementKind::Loop { .. } => StepOperation::Loop,
        StatementKind::Return { .. } => StepOperation::Return,
        StatementKind::Throw { .. } => StepOperation::Throw,
        StatementKind::Break => StepOperation::Break,
        StatementKind::Continue => StepOperation::Continue,
        StatementKind::Try { .. } => StepOperation::Try,
    }
}

/// The leading identifier of a receiver expression (`this` in `this.repo.items`).
fn receiver_root(receiver: &str) -> &str {
    receiver
        .split(['.', '(', '[', ':', '?'])
        .next()
        .unwrap_or(receiver)
        .trim()
}

fn is_plain_name(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
