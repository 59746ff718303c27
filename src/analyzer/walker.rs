use super::rules::ExportStyle;
use super::{
    AnalyzerRules, Block, CallSite, FunctionModel, IdentifierRead, LanguageType, ParameterModel,
    StaticModel, Statement, StatementKind, ValueHint, ValueKind,
};
use tree_sitter::{Node, Tree};

const EXCERPT_LEN: usize = 80;

/// Fields whose identifiers are bindings, labels or types rather than reads.
const NON_READ_FIELDS: &[&str] = &[
    "pattern",
    "name",
    "type",
    "type_arguments",
    "type_parameters",
    "parameters",
    "parameter",
    "alias",
    "label",
    "return_type",
];

/// Identifier kinds that only appear inside destructuring patterns.
const PATTERN_IDENTIFIER_KINDS: &[&str] = &[
    "shorthand_property_identifier_pattern",
    "shorthand_field_identifier",
];

#[derive(Debug, Clone, Copy)]
struct Scope<'a> {
    owner: Option<&'a str>,
    exported: bool,
    top: bool,
}

impl Scope<'_> {
    fn module() -> Self {
        Self {
            owner: None,
            exported: false,
            top: true,
        }
    }

    fn body() -> Self {
        Self {
            owner: None,
            exported: false,
            top: false,
        }
    }
}

/// Builds a [`StaticModel`] from a parsed tree using one language's rule table.
pub(crate) fn build_model(tree: &Tree, source: &str, language: LanguageType) -> StaticModel {
    let root = tree.root_node();
    let mut walker = Walker {
        source,
        rules: AnalyzerRules::for_language(language),
        model: StaticModel::new(language),
    };
    if root.has_error() {
        walker.model.parse_errors = count_errors(root).max(1);
    }
    let top_level = walker.block(root, Scope::module(), false);
    walker.model.top_level = top_level;
    walker.model.package = package_name(root, source);
    walker.model
}

fn package_name(root: Node, source: &str) -> Option<String> {
    let mut cursor = root.walk();
    let clause = root
        .named_children(&mut cursor)
        .find(|c| c.kind() == "package_clause")?;
    let name = clause.named_child(0)?;
    name.utf8_text(source.as_bytes()).ok().map(str::to_string)
}

fn count_errors(root: Node) -> usize {
    let mut count = 0;
    let mut stack = vec![root];
    let mut cursor = root.walk();
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            count += 1;
            continue;
        }
        if node.has_error() {
            stack.extend(node.children(&mut cursor));
        }
    }
    count
}

fn line(node: Node) -> usize {
    node.start_position().row + 1
}

fn excerpt(text: &str) -> String {
    let first = text.lines().next().unwrap_or("").trim();
    if first.chars().count() <= EXCERPT_LEN {
        return first.to_string();
    }
    let cut: String = first.chars().take(EXCERPT_LEN).collect();
    format!("{}...", cut.trim_end())
}

fn clean_type(text: &str) -> String {
    text.trim()
        .trim_start_matches(':')
        .trim_start_matches("->")
        .trim()
        .to_string()
}

/// The bare type name of `&mut Foo<T>`, `*Foo` or `crate::Foo`.
fn base_type_name(text: &str) -> &str {
    let text = text
        .trim()
        .trim_start_matches('&')
        .trim_start_matches('*')
        .trim_start_matches("mut ")
        .trim();
    let text = text.split('<').next().unwrap_or(text);
    text.rsplit("::").next().unwrap_or(text).trim()
}

fn push_read(reads: &mut Vec<IdentifierRead>, name: &str, dereferenced: bool) {
    if let Some(existing) = reads.iter_mut().find(|r| r.name == name) {
        existing.dereferenced |= dereferenced;
        return;
    }
    reads.push(IdentifierRead {
        name: name.to_string(),
        dereferenced,
    });
}

fn has_child_kind(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == kind);
    found
}

struct Walker<'a> {
    source: &'a str,
    rules: AnalyzerRules,
    model: StaticModel,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node) -> &'a str {
        self.source.get(node.byte_range()).unwrap_or("")
    }

    fn is_comment(&self, node: Node) -> bool {
        self.rules.is(self.rules.comment_kinds, node.kind())
    }

    fn make(&self, node: Node, kind: StatementKind, reads: Vec<IdentifierRead>) -> Statement {
        Statement {
            kind,
            line: line(node),
            text: excerpt(self.text(node)),
            reads,
        }
    }

    fn declare(&mut self, scope: Scope, names: &[String]) {
        if !scope.top {
            return;
        }
        for name in names {
            if !self.model.declarations.contains(name) {
                self.model.declarations.push(name.clone());
            }
        }
    }

    fn block(&mut self, node: Node, scope: Scope<'a>, tail_returns: bool) -> Block {
        let mut block = Block::new(line(node));
        let mut cursor = node.walk();
        let children: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|c| !self.is_comment(*c))
            .collect();
        let last = children.len().checked_sub(1);
        for (i, child) in children.into_iter().enumerate() {
            if tail_returns && Some(i) == last && self.is_tail_expression(child) {
                self.value_calls(child, &mut block.statements);
                let mut reads = Vec::new();
                self.reads(child, &mut reads);
                let value = Some(self.hint(child));
                block
                    .statements
                    .push(self.make(child, StatementKind::Return { value }, reads));
            } else {
                self.statement(child, scope, &mut block.statements);
            }
        }
        block
    }

    /// A trailing expression that is the value of the enclosing function.
    fn is_tail_expression(&self, node: Node) -> bool {
        let r = &self.rules;
        let kind = node.kind();
        let structural = [
            r.expression_statement_kinds,
            r.declaration_kinds,
            r.function_kinds,
            r.class_kinds,
            r.type_kinds,
            r.module_kinds,
            r.branch_kinds,
            r.switch_kinds,
            r.loop_kinds,
            r.return_kinds,
            r.break_kinds,
            r.continue_kinds,
            r.skip_kinds,
            r.import_kinds,
            r.block_kinds,
            r.passthrough_kinds,
        ];
        if structural.iter().any(|kinds| r.is(kinds, kind)) {
            return false;
        }
        self.panic_call(self.unwrap_expr(node)).is_none()
    }

    /// A block for one arm of a compound statement.
    fn arm(&mut self, node: Option<Node>, scope: Scope<'a>) -> Block {
        let Some(node) = node else {
            return Block::default();
        };
        if self.rules.is(self.rules.block_kinds, node.kind()) {
            return self.block(node, scope, false);
        }
        let mut block = Block::new(line(node));
        self.statement(node, scope, &mut block.statements);
        block
    }

    fn statement(&mut self, node: Node, scope: Scope<'a>, out: &mut Vec<Statement>) {
        let r = self.rules;
        let kind = node.kind();
        if !node.is_named() || r.is(r.comment_kinds, kind) || r.is(r.skip_kinds, kind) {
            return;
        }
        if node.is_error() {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.named_children(&mut cursor).collect();
            for child in children {
                self.statement(child, scope, out);
            }
            return;
        }

        if r.is(r.import_kinds, kind) {
            self.imports(node);
        } else if r.is(r.export_kinds, kind) {
            self.export(node, scope, out);
        } else if r.is(r.decorator_kinds, kind) {
            if let Some(definition) = node.child_by_field_name("definition") {
                self.statement(definition, scope, out);
            }
        } else if r.is(r.function_kinds, kind) {
            if let Some(name) = self.function(node, scope) {
                let names = vec![name];
                self.declare(scope, &names);
                if !scope.top {
                    let value = Some(ValueHint::Literal(ValueKind::Function));
                    let declaration = StatementKind::Declaration {
                        names,
                        value,
                        type_hint: None,
                    };
                    out.push(self.make(node, declaration, Vec::new()));
                }
            }
        } else if r.is(r.class_kinds, kind) {
            self.class(node, scope);
        } else if r.is(r.type_kinds, kind) {
            let names = self.type_names(node);
            self.declare(scope, &names);
        } else if r.is(r.module_kinds, kind) {
            if let Some(name) = node.child_by_field_name("name") {
                let names = [self.text(name).to_string()];
                self.declare(scope, &names);
            }
            if let Some(body) = node.child_by_field_name("body") {
                // items only; statements in a nested module never run on their own
                self.block(body, scope, false);
            }
        } else if r.is(r.block_kinds, kind)
            || r.is(r.passthrough_kinds, kind)
            || r.is(r.expression_statement_kinds, kind)
        {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.named_children(&mut cursor).collect();
            for child in children {
                self.statement(child, scope, out);
            }
        } else if r.is(r.branch_kinds, kind) {
            self.branch(node, scope, out);
        } else if r.is(r.switch_kinds, kind) {
            self.switch(node, scope, out);
        } else if r.is(r.loop_kinds, kind) {
            self.loop_statement(node, scope, out);
        } else if r.is(r.return_kinds, kind) {
            let (value, reads) = self.exit_value(node, out);
            out.push(self.make(node, StatementKind::Return { value }, reads));
        } else if r.is(r.throw_kinds, kind) {
            let (value, reads) = self.exit_value(node, out);
            out.push(self.make(node, StatementKind::Throw { value }, reads));
        } else if r.is(r.break_kinds, kind) {
            out.push(self.make(node, StatementKind::Break, Vec::new()));
        } else if r.is(r.continue_kinds, kind) {
            out.push(self.make(node, StatementKind::Continue, Vec::new()));
        } else if r.is(r.try_kinds, kind) {
            self.try_statement(node, scope, out);
        } else if r.is(r.declaration_kinds, kind) {
            self.declaration(node, scope, out);
        } else if r.is(r.assignment_kinds, kind) {
            self.assignment(node, scope, out);
        } else if kind == "as_pattern" {
            self.alias_binding(node, scope, out);
        } else {
            self.expression(node, scope, out);
        }
    }

    fn export(&mut self, node: Node, scope: Scope<'a>, out: &mut Vec<Statement>) {
        let exported = Scope {
            exported: true,
            ..scope
        };
        if let Some(declaration) = node.child_by_field_name("declaration") {
            self.statement(declaration, exported, out);
            return;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            let r = self.rules;
            let kind = child.kind();
            if r.is(r.function_kinds, kind)
                || r.is(r.class_kinds, kind)
                || r.is(r.declaration_kinds, kind)
            {
                self.statement(child, exported, out);
            }
        }
    }

    fn is_exported(&self, node: Node, name: &str, scope: Scope) -> bool {
        match self.rules.export_style {
            ExportStyle::Keyword => {
                scope.exported
                    || node
                        .parent()
                        .is_some_and(|p| self.rules.is(self.rules.export_kinds, p.kind()))
            }
            ExportStyle::VisibilityModifier => {
                scope.exported || has_child_kind(node, "visibility_modifier")
            }
            ExportStyle::Underscore | ExportStyle::Capitalized => {
                (scope.top || scope.owner.is_some()) && self.rules.is_exported_name(name)
            }
        }
    }

    fn is_async(&self, node: Node) -> bool {
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).any(|c| {
            c.kind() == "async"
                || (c.kind() == "function_modifiers" && self.text(c).contains("async"))
        });
        found
    }

    /// Registers a named function declaration and returns its name.
    fn function(&mut self, node: Node, scope: Scope<'a>) -> Option<String> {
        let name = self.text(node.child_by_field_name("name")?).to_string();
        let owner = scope.owner.or_else(|| self.receiver_type(node));
        let exported = self.is_exported(node, &name, scope);
        self.register_function(name.clone(), node, owner, exported);
        Some(name)
    }

    /// The receiver type of a Go method.
    fn receiver_type(&self, node: Node) -> Option<&'a str> {
        let receiver = node.child_by_field_name("receiver")?;
        let mut cursor = receiver.walk();
        let param = receiver.named_children(&mut cursor).next()?;
        let ty = param.child_by_field_name("type")?;
        Some(base_type_name(self.text(ty)))
    }

    fn register_function(&mut self, name: String, node: Node, owner: Option<&str>, exported: bool) {
        let index = self.model.functions.len();
        let mut parameters = Vec::new();
        if let Some(receiver) = node.child_by_field_name("receiver") {
            self.parameters(receiver, false, &mut parameters);
            for param in parameters.iter_mut() {
                param.is_self = true;
            }
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            self.parameters(params, owner.is_some(), &mut parameters);
        } else if let Some(param) = node.child_by_field_name("parameter") {
            self.parameters_from(param, owner.is_some(), &mut parameters);
        }
        let return_type = node
            .child_by_field_name("return_type")
            .or_else(|| node.child_by_field_name("result"))
            .map(|n| clean_type(self.text(n)));

        let is_async = self.is_async(node);
        self.model.functions.push(FunctionModel {
            name,
            owner: owner.map(str::to_string),
            parameters,
            return_type,
            exported,
            is_async,
            line: line(node),
            body: Block::new(line(node)),
            summary: Default::default(),
        });

        // nested declarations are pushed while walking, so the slot is filled afterwards
        if let Some(body_node) = node.child_by_field_name("body") {
            let body = self.function_body(body_node);
            let summary = body.summarize();
            let function = &mut self.model.functions[index];
            function.body = body;
            function.summary = summary;
        }
    }

    fn function_body(&mut self, body: Node) -> Block {
        if self.rules.is(self.rules.block_kinds, body.kind()) {
            let tail_returns = self.rules.implicit_return;
            return self.block(body, Scope::body(), tail_returns);
        }
        // expression-bodied lambda
        let mut block = Block::new(line(body));
        self.value_calls(body, &mut block.statements);
        let mut reads = Vec::new();
        self.reads(body, &mut reads);
        let value = Some(self.hint(body));
        block
            .statements
            .push(self.make(body, StatementKind::Return { value }, reads));
        block
    }

    fn parameters(&self, list: Node, method: bool, out: &mut Vec<ParameterModel>) {
        let mut cursor = list.walk();
        for param in list.named_children(&mut cursor) {
            if !self.is_comment(param) {
                self.parameters_from(param, method, out);
            }
        }
    }

    fn parameters_from(&self, param: Node, method: bool, out: &mut Vec<ParameterModel>) {
        let r = &self.rules;
        let kind = param.kind();
        if r.is(r.self_param_kinds, kind) {
            out.push(ParameterModel {
                name: "self".to_string(),
                type_hint: None,
                optional: false,
                has_default: false,
                variadic: false,
                is_self: true,
            });
            return;
        }
        let type_hint = param
            .child_by_field_name("type")
            .map(|t| clean_type(self.text(t)));
        let has_default = param.child_by_field_name("value").is_some()
            || param.child_by_field_name("default").is_some();
        let optional = has_default || r.is(r.optional_param_kinds, kind);
        let variadic = r.is(r.variadic_param_kinds, kind)
            || param
                .child_by_field_name("pattern")
                .is_some_and(|p| r.is(r.variadic_param_kinds, p.kind()));
        let mut names = self.parameter_names(param);
        if names.is_empty() {
            names.push("_".to_string());
        }
        for name in names {
            let is_self = method && out.is_empty() && r.is_self_word(&name);
            out.push(ParameterModel {
                name,
                type_hint: type_hint.clone(),
                optional,
                has_default,
                variadic,
                is_self,
            });
        }
    }

    fn parameter_names(&self, param: Node) -> Vec<String> {
        if self.rules.is(self.rules.identifier_kinds, param.kind()) {
            return vec![self.text(param).to_string()];
        }
        let mut cursor = param.walk();
        let named: Vec<String> = param
            .children_by_field_name("name", &mut cursor)
            .map(|n| self.text(n).to_string())
            .collect();
        if !named.is_empty() {
            return named;
        }
        if let Some(pattern) = param.child_by_field_name("pattern") {
            return self.pattern_names(pattern);
        }
        let mut cursor = param.walk();
        let first = param
            .named_children(&mut cursor)
            .find(|c| self.rules.is(self.rules.identifier_kinds, c.kind()))
            .map(|n| vec![self.text(n).to_string()]);
        first.unwrap_or_default()
    }

    /// Names bound by a pattern: `x`, `{ a, b }`, `(x, y)`, `Some(user)`.
    fn pattern_names(&self, node: Node) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_pattern_names(node, &mut names);
        names
    }

    fn collect_pattern_names(&self, node: Node, names: &mut Vec<String>) {
        let kind = node.kind();
        if self.rules.is(self.rules.identifier_kinds, kind) || PATTERN_IDENTIFIER_KINDS.contains(&kind)
        {
            let name = self.text(node);
            // enum variants and constructors in patterns are not bindings
            let variant = self.rules.export_style == ExportStyle::VisibilityModifier
                && name.chars().next().is_some_and(char::is_uppercase);
            if !variant && name != "_" && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
            return;
        }
        if matches!(kind, "scoped_identifier" | "dotted_name" | "type_identifier") {
            return;
        }
        let mut cursor = node.walk();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                let skipped = matches!(cursor.field_name(), Some("type") | Some("value"));
                if child.is_named() && !skipped {
                    self.collect_pattern_names(child, names);
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }
    }

    fn class(&mut self, node: Node, scope: Scope<'a>) {
        let is_impl = node.kind() == "impl_item";
        let owner = if is_impl {
            node.child_by_field_name("type")
                .map(|t| base_type_name(self.text(t)))
        } else {
            node.child_by_field_name("name").map(|n| self.text(n))
        };
        let Some(owner) = owner else {
            return;
        };
        if !is_impl {
            self.declare(scope, &[owner.to_string()]);
        }
        let exported = match self.rules.export_style {
            ExportStyle::Keyword => self.is_exported(node, owner, scope),
            // trait methods are as visible as the trait itself
            ExportStyle::VisibilityModifier => {
                (is_impl && node.child_by_field_name("trait").is_some())
                    || has_child_kind(node, "visibility_modifier")
            }
            ExportStyle::Underscore | ExportStyle::Capitalized => {
                self.rules.is_exported_name(owner)
            }
        };
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let member_scope = Scope {
            owner: Some(owner),
            exported,
            top: false,
        };
        let mut cursor = body.walk();
        let members: Vec<Node> = body.named_children(&mut cursor).collect();
        for member in members {
            let member = if self.rules.is(self.rules.decorator_kinds, member.kind()) {
                match member.child_by_field_name("definition") {
                    Some(definition) => definition,
                    None => continue,
                }
            } else {
                member
            };
            if self.rules.is(self.rules.function_kinds, member.kind()) {
                self.function(member, member_scope);
            } else if let (Some(name), Some(value)) = (
                member.child_by_field_name("name"),
                member.child_by_field_name("value"),
            ) {
                // arrow-function class fields
                if self.rules.is(self.rules.lambda_kinds, value.kind()) {
                    let name = self.text(name).to_string();
                    self.register_function(name, value, Some(owner), exported);
                }
            }
        }
    }

    fn type_names(&self, node: Node) -> Vec<String> {
        if let Some(name) = node.child_by_field_name("name") {
            return vec![self.text(name).to_string()];
        }
        let mut cursor = node.walk();
        let names = node
            .named_children(&mut cursor)
            .filter_map(|c| c.child_by_field_name("name"))
            .map(|n| self.text(n).to_string())
            .collect();
        names
    }

    fn imports(&mut self, node: Node) {
        let mut names = Vec::new();
        let mut cursor = node.walk();
        let fields: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        if !fields.is_empty() {
            for field in fields {
                self.import_names(field, &mut names);
            }
        } else if let Some(argument) = node.child_by_field_name("argument") {
            self.import_names(argument, &mut names);
        } else {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.named_children(&mut cursor).collect();
            for child in children {
                if node.child_by_field_name("source") != Some(child) {
                    self.import_names(child, &mut names);
                }
            }
        }
        for name in names {
            if !self.model.imports.contains(&name) {
                self.model.imports.push(name);
            }
        }
    }

    fn import_names(&self, node: Node, names: &mut Vec<String>) {
        match node.kind() {
            "identifier" => names.push(self.text(node).to_string()),
            "import_specifier" => {
                let bound = node
                    .child_by_field_name("alias")
                    .or_else(|| node.child_by_field_name("name"));
                if let Some(bound) = bound {
                    names.push(self.text(bound).to_string());
                }
            }
            "aliased_import" | "use_as_clause" => {
                if let Some(alias) = node.child_by_field_name("alias") {
                    names.push(self.text(alias).to_string());
                }
            }
            "dotted_name" => {
                if let Some(first) = node.named_child(0) {
                    names.push(self.text(first).to_string());
                }
            }
            "scoped_identifier" => {
                if let Some(name) = node.child_by_field_name("name") {
                    names.push(self.text(name).to_string());
                }
            }
            "scoped_use_list" => {
                if let Some(list) = node.child_by_field_name("list") {
                    self.import_names(list, names);
                }
            }
            "import_spec" => {
                let alias = node
                    .child_by_field_name("name")
                    .map(|n| self.text(n))
                    .filter(|n| *n != "_" && *n != ".");
                let path = node.child_by_field_name("path").map(|p| {
                    let path = self.text(p).trim_matches(|c| c == '"' || c == '`');
                    path.rsplit('/').next().unwrap_or(path)
                });
                if let Some(name) = alias.or(path) {
                    names.push(name.to_string());
                }
            }
            _ => {
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    self.import_names(child, names);
                }
            }
        }
    }

    fn branch(&mut self, node: Node, scope: Scope<'a>, out: &mut Vec<Statement>) {
        if let Some(initializer) = node.child_by_field_name("initializer") {
            self.statement(initializer, scope, out);
        }
        let mut reads = Vec::new();
        let condition_node = node.child_by_field_name("condition");
        let condition = condition_node
            .map(|c| self.text(c).trim().to_string())
            .unwrap_or_default();
        let mut first = self.arm(node.child_by_field_name("consequence"), scope);
        if let Some(c) = condition_node {
            self.value_calls(c, out);
            self.reads(c, &mut reads);
            first.bindings.extend(self.condition_bindings(c));
        }
        let mut arms = vec![first];
        let mut has_else = false;
        self.alternatives(node, scope, &mut arms, &mut has_else, &mut reads, out);
        let kind = StatementKind::Branch {
            condition,
            arms,
            has_else,
        };
        out.push(self.make(node, kind, reads));
    }

    fn alternatives(
        &mut self,
        node: Node,
        scope: Scope<'a>,
        arms: &mut Vec<Block>,
        has_else: &mut bool,
        reads: &mut Vec<IdentifierRead>,
        out: &mut Vec<Statement>,
    ) {
        let mut cursor = node.walk();
        let alternatives: Vec<Node> = node
            .children_by_field_name("alternative", &mut cursor)
            .collect();
        for alternative in alternatives {
            let target = if self.rules.is(self.rules.else_kinds, alternative.kind()) {
                let mut cursor = alternative.walk();
                let first = alternative
                    .named_children(&mut cursor)
                    .find(|c| !self.is_comment(*c));
                alternative.child_by_field_name("body").or(first)
            } else {
                Some(alternative)
            };
            let Some(target) = target else {
                continue;
            };
            if target.child_by_field_name("consequence").is_some() {
                let mut arm = self.arm(target.child_by_field_name("consequence"), scope);
                if let Some(c) = target.child_by_field_name("condition") {
                    self.value_calls(c, out);
                    self.reads(c, reads);
                    arm.bindings.extend(self.condition_bindings(c));
                }
                arms.push(arm);
                self.alternatives(target, scope, arms, has_else, reads, out);
            } else {
                arms.push(self.arm(Some(target), scope));
                *has_else = true;
            }
        }
    }

    /// Names bound by `if let` style conditions.
    fn condition_bindings(&self, condition: Node) -> Vec<String> {
        let mut names = Vec::new();
        if condition.kind() == "let_condition" {
            if let Some(pattern) = condition.child_by_field_name("pattern") {
                names.extend(self.pattern_names(pattern));
            }
        }
        let mut cursor = condition.walk();
        for child in condition.named_children(&mut cursor) {
            if child.kind() == "let_condition" {
                names.extend(self.condition_bindings(child));
            }
        }
        names
    }

    fn switch(&mut self, node: Node, scope: Scope<'a>, out: &mut Vec<Statement>) {
        let subject = node
            .child_by_field_name("value")
            .or_else(|| node.child_by_field_name("subject"))
            .or_else(|| node.child_by_field_name("condition"));
        let mut reads = Vec::new();
        let condition = match subject {
            Some(s) => {
                self.value_calls(s, out);
                self.reads(s, &mut reads);
                self.text(s).trim().to_string()
            }
            None => String::new(),
        };
        let container = node.child_by_field_name("body").unwrap_or(node);
        let mut has_else = self.rules.exhaustive_switch;
        let mut arms = Vec::new();
        let mut cursor = container.walk();
        let cases: Vec<Node> = container
            .named_children(&mut cursor)
            .filter(|c| self.rules.is(self.rules.case_kinds, c.kind()))
            .collect();
        for case in cases {
            if self.rules.is(self.rules.default_case_kinds, case.kind()) {
                has_else = true;
            }
            let mut patterns = Vec::new();
            if let Some(pattern) = case.child_by_field_name("pattern") {
                patterns.push(pattern);
            }
            let mut case_cursor = case.walk();
            patterns.extend(
                case.named_children(&mut case_cursor)
                    .filter(|c| c.kind() == "case_pattern"),
            );
            let mut arm = self.case_body(case, scope);
            if self.rules.case_body_field.is_some() {
                for pattern in patterns {
                    if self.text(pattern).trim() == "_" {
                        has_else = true;
                    }
                    arm.bindings.extend(self.pattern_names(pattern));
                }
            }
            arms.push(arm);
        }
        let kind = StatementKind::Branch {
            condition,
            arms,
            has_else,
        };
        out.push(self.make(node, kind, reads));
    }

    fn case_body(&mut self, case: Node, scope: Scope<'a>) -> Block {
        if let Some(field) = self.rules.case_body_field {
            return self.arm(case.child_by_field_name(field), scope);
        }
        let mut block = Block::new(line(case));
        let mut cursor = case.walk();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                let label = matches!(
                    cursor.field_name(),
                    Some("value") | Some("type") | Some("pattern") | Some("guard") | Some("communication")
                );
                if child.is_named() && !label {
                    self.statement(child, scope, &mut block.statements);
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }
        // a trailing `break` only leaves the switch
        if block
            .statements
            .last()
            .is_some_and(|s| matches!(s.kind, StatementKind::Break))
        {
            block.statements.pop();
        }
        block
    }

    fn loop_statement(&mut self, node: Node, scope: Scope<'a>, out: &mut Vec<Statement>) {
        let header = excerpt(self.text(node));
        let mut reads = Vec::new();
        let mut bindings = Vec::new();
        let mut condition: Option<String> = None;
        let mut conditional = node.kind() != "loop_expression";

        let mut clauses = vec![node];
        let mut cursor = node.walk();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                match child.kind() {
                    "for_clause" | "range_clause" => clauses.push(child),
                    _ if child.is_named()
                        && cursor.field_name().is_none()
                        && !self.is_comment(child)
                        && node.kind() == "for_statement"
                        && !self.rules.is(self.rules.block_kinds, child.kind()) =>
                    {
                        // `for cond {}`
                        condition = Some(self.text(child).trim().to_string());
                        self.value_calls(child, out);
                        self.reads(child, &mut reads);
                    }
                    _ => {}
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }
        if node.kind() == "for_statement" && clauses.len() == 1 && condition.is_none() {
            conditional = node.child_by_field_name("condition").is_some()
                || node.child_by_field_name("initializer").is_some()
                || self.rules.export_style != ExportStyle::Capitalized;
        }

        for clause in clauses {
            if let Some(initializer) = clause.child_by_field_name("initializer") {
                self.statement(initializer, scope, out);
                bindings.extend(self.declared_names(initializer));
            }
            if let Some(c) = clause.child_by_field_name("condition") {
                let text = self.text(c).trim().trim_end_matches(';').trim();
                if !text.is_empty() {
                    condition = Some(text.to_string());
                    self.value_calls(c, out);
                    self.reads(c, &mut reads);
                }
                bindings.extend(self.condition_bindings(c));
            }
            for field in ["right", "value"] {
                if let Some(iterable) = clause.child_by_field_name(field) {
                    condition = Some(self.text(iterable).trim().to_string());
                    self.value_calls(iterable, out);
                    self.reads(iterable, &mut reads);
                }
            }
            for field in ["left", "pattern"] {
                if let Some(target) = clause.child_by_field_name(field) {
                    bindings.extend(self.pattern_names(target));
                }
            }
        }
        // a header with no visible condition still counts as conditional unless it is `loop`/`for {}`
        if condition.is_none() && conditional {
            let explicit_empty = node
                .child_by_field_name("condition")
                .is_some_and(|c| self.text(c).trim().trim_end_matches(';').trim().is_empty());
            if !explicit_empty {
                condition = Some(header.clone());
            }
        }

        let mut body = self.arm(node.child_by_field_name("body"), scope);
        body.bindings.extend(bindings);
        let kind = StatementKind::Loop {
            header,
            condition,
            body,
        };
        out.push(self.make(node, kind, reads));
    }

    fn declared_names(&self, node: Node) -> Vec<String> {
        let mut declarators = Vec::new();
        self.declarators(node, &mut declarators);
        declarators
            .into_iter()
            .flat_map(|d| self.declarator_names(d))
            .collect()
    }

    fn exit_value(
        &mut self,
        node: Node,
        out: &mut Vec<Statement>,
    ) -> (Option<ValueHint>, Vec<IdentifierRead>) {
        let mut reads = Vec::new();
        let mut cursor = node.walk();
        let value = node
            .named_children(&mut cursor)
            .find(|c| !self.is_comment(*c) && c.kind() != "label");
        let Some(value) = value else {
            return (None, reads);
        };
        self.value_calls(value, out);
        self.reads(value, &mut reads);
        (Some(self.hint(value)), reads)
    }

    fn try_statement(&mut self, node: Node, scope: Scope<'a>, out: &mut Vec<Statement>) {
        let mut body = self.arm(node.child_by_field_name("body"), scope);
        let mut handler = None;
        let mut finalizer = None;
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            let kind = child.kind();
            if self.rules.is(self.rules.handler_kinds, kind) {
                if handler.is_none() {
                    handler = Some(self.handler(child, scope));
                }
            } else if self.rules.is(self.rules.finally_kinds, kind) {
                let inner = child
                    .child_by_field_name("body")
                    .or_else(|| self.first_block(child));
                finalizer = Some(self.arm(inner, scope));
            } else if self.rules.is(self.rules.else_kinds, kind) {
                // runs after the body when nothing was raised
                let inner = child
                    .child_by_field_name("body")
                    .or_else(|| self.first_block(child));
                let tail = self.arm(inner, scope);
                body.statements.extend(tail.statements);
            }
        }
        let kind = StatementKind::Try {
            body,
            handler,
            finalizer,
        };
        out.push(self.make(node, kind, Vec::new()));
    }

    fn first_block<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        let mut cursor = node.walk();
        let found = node
            .named_children(&mut cursor)
            .find(|c| self.rules.is(self.rules.block_kinds, c.kind()));
        found
    }

    fn handler(&mut self, clause: Node, scope: Scope<'a>) -> Block {
        let body = clause
            .child_by_field_name("body")
            .or_else(|| self.first_block(clause));
        let mut block = self.arm(body, scope);
        if let Some(parameter) = clause.child_by_field_name("parameter") {
            block.bindings.extend(self.pattern_names(parameter));
        }
        let mut after_as = false;
        let mut cursor = clause.walk();
        for child in clause.children(&mut cursor) {
            match child.kind() {
                "as" => after_as = true,
                "as_pattern" => {
                    if let Some(alias) = child.child_by_field_name("alias") {
                        block.bindings.extend(self.pattern_names(alias));
                    }
                }
                kind if after_as && self.rules.is(self.rules.identifier_kinds, kind) => {
                    block.bindings.push(self.text(child).to_string());
                    after_as = false;
                }
                _ => {}
            }
        }
        block
    }

    fn declarators<'t>(&self, node: Node<'t>, out: &mut Vec<Node<'t>>) {
        if node.child_by_field_name("name").is_some()
            || node.child_by_field_name("pattern").is_some()
            || node.child_by_field_name("left").is_some()
        {
            out.push(node);
            return;
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if !self.is_comment(child) {
                self.declarators(child, out);
            }
        }
    }

    fn declarator_names(&self, declarator: Node) -> Vec<String> {
        let mut cursor = declarator.walk();
        let mut names: Vec<String> = Vec::new();
        for name in declarator.children_by_field_name("name", &mut cursor) {
            names.extend(self.pattern_names(name));
        }
        if names.is_empty() {
            let target = declarator
                .child_by_field_name("pattern")
                .or_else(|| declarator.child_by_field_name("left"));
            if let Some(target) = target {
                names = self.pattern_names(target);
            }
        }
        names
    }

    fn declaration(&mut self, node: Node, scope: Scope<'a>, out: &mut Vec<Statement>) {
        let mut declarators = Vec::new();
        self.declarators(node, &mut declarators);
        for declarator in declarators {
            let names = self.declarator_names(declarator);
            if names.is_empty() {
                continue;
            }
            self.declare(scope, &names);
            let type_hint = declarator
                .child_by_field_name("type")
                .map(|t| clean_type(self.text(t)));
            let value = declarator
                .child_by_field_name("value")
                .or_else(|| declarator.child_by_field_name("right"));
            let mut reads = Vec::new();
            let hint = match value {
                Some(v) if names.len() == 1 && self.rules.is(self.rules.lambda_kinds, v.kind()) => {
                    let exported = self.is_exported(node, &names[0], scope);
                    self.register_function(names[0].clone(), v, None, exported);
                    Some(ValueHint::Literal(ValueKind::Function))
                }
                Some(v) => {
                    self.value_calls(v, out);
                    self.reads(v, &mut reads);
                    Some(self.hint(v))
                }
                None => None,
            };
            let kind = StatementKind::Declaration {
                names,
                value: hint,
                type_hint,
            };
            out.push(self.make(declarator, kind, reads));
        }
    }

    fn assignment(&mut self, node: Node, scope: Scope<'a>, out: &mut Vec<Statement>) {
        let left = node.child_by_field_name("left");
        let right = node.child_by_field_name("right");
        if let Some(r) = right {
            self.value_calls(r, out);
        }
        if let Some(l) = left {
            self.value_calls(l, out);
        }
        let Some(target) = left.or_else(|| node.named_child(0)) else {
            return;
        };
        let mut reads = Vec::new();
        if let Some(r) = right {
            self.reads(r, &mut reads);
        }
        let is_identifier = self.rules.is(self.rules.identifier_kinds, target.kind());
        if !is_identifier {
            // `a.b = x` reads `a`
            self.reads(target, &mut reads);
        }
        let operator = node
            .child_by_field_name("operator")
            .map(|o| self.text(o))
            .unwrap_or("=");
        let compound = (right.is_none() && left.is_none())
            || operator != "="
            || node.kind().contains("augmented")
            || node.kind().contains("compound");
        if compound && is_identifier {
            push_read(&mut reads, self.text(target), false);
        }
        let value = match right {
            Some(r) if compound => {
                let hint = self.hint(r);
                match hint {
                    ValueHint::Literal(ValueKind::String) => Some(hint),
                    _ => Some(ValueHint::Expression),
                }
            }
            Some(r) => Some(self.hint(r)),
            None if compound => Some(ValueHint::Literal(ValueKind::Number)),
            None => None,
        };

        let declares = self.rules.assignment_declares && !compound && node.kind() == "assignment";
        if declares {
            let names = self.pattern_names(target);
            let bare = names.len() == 1 && is_identifier;
            if bare || matches!(target.kind(), "pattern_list" | "tuple_pattern" | "list_pattern") {
                self.declare(scope, &names);
                let type_hint = node
                    .child_by_field_name("type")
                    .map(|t| clean_type(self.text(t)));
                let kind = StatementKind::Declaration {
                    names,
                    value,
                    type_hint,
                };
                out.push(self.make(node, kind, reads));
                return;
            }
        }
        let kind = StatementKind::Assignment {
            target: self.text(target).trim().to_string(),
            value,
        };
        out.push(self.make(node, kind, reads));
    }

    /// `with open(path) as f` binds `f` to the context value.
    fn alias_binding(&mut self, node: Node, scope: Scope<'a>, out: &mut Vec<Statement>) {
        let Some(alias) = node.child_by_field_name("alias") else {
            self.expression(node, scope, out);
            return;
        };
        let names = self.pattern_names(alias);
        let mut reads = Vec::new();
        let mut cursor = node.walk();
        let value = node
            .named_children(&mut cursor)
            .find(|c| *c != alias && !self.is_comment(*c));
        let value = value.map(|v| {
            self.value_calls(v, out);
            self.reads(v, &mut reads);
            self.hint(v)
        });
        let kind = StatementKind::Declaration {
            names,
            value,
            type_hint: None,
        };
        out.push(self.make(node, kind, reads));
    }

    fn expression(&mut self, node: Node, scope: Scope<'a>, out: &mut Vec<Statement>) {
        let inner = self.unwrap_expr(node);
        if self.rules.is(self.rules.assignment_kinds, inner.kind()) {
            self.assignment(inner, scope, out);
            return;
        }
        if let Some(site) = self.panic_call(inner) {
            let mut reads = Vec::new();
            let mut value = None;
            if let Some(args) = inner.child_by_field_name("arguments") {
                self.value_calls(args, out);
                self.reads(args, &mut reads);
                let mut cursor = args.walk();
                value = args
                    .named_children(&mut cursor)
                    .find(|c| !self.is_comment(*c))
                    .map(|a| self.hint(a));
            }
            let value = value.or(Some(ValueHint::Call(site.callee)));
            out.push(self.make(node, StatementKind::Throw { value }, reads));
            return;
        }
        let before = out.len();
        self.value_calls(node, out);
        if self.rules.is(self.rules.call_kinds, inner.kind()) {
            return;
        }
        let mut reads = Vec::new();
        self.reads(node, &mut reads);
        let literal = self.rules.literal_kind(inner.kind()).is_some();
        if !reads.is_empty() || (out.len() == before && !literal) {
            out.push(self.make(node, StatementKind::Expression, reads));
        }
    }

    /// Strips parentheses, `await`, `?` and non-null assertions.
    fn unwrap_expr<'t>(&self, mut node: Node<'t>) -> Node<'t> {
        loop {
            let kind = node.kind();
            let wrapper = self.rules.is(self.rules.await_kinds, kind)
                || matches!(
                    kind,
                    "parenthesized_expression" | "try_expression" | "non_null_expression"
                );
            if !wrapper {
                return node;
            }
            let mut cursor = node.walk();
            let inner = node
                .named_children(&mut cursor)
                .find(|c| !self.is_comment(*c));
            match inner {
                Some(inner) => node = inner,
                None => return node,
            }
        }
    }

    /// The call site if the node is a call to a panicking builtin.
    fn panic_call(&self, node: Node) -> Option<CallSite> {
        if !self.rules.is(self.rules.call_kinds, node.kind()) {
            return None;
        }
        let site = self.call_site(node)?;
        if site.receiver.is_none() && self.rules.is_panic_call(&site.callee) {
            Some(site)
        } else {
            None
        }
    }

    fn call_site(&self, node: Node) -> Option<CallSite> {
        let (callee, receiver) = if node.kind() == "macro_invocation" {
            let name = node.child_by_field_name("macro")?;
            let name = name.child_by_field_name("name").unwrap_or(name);
            (format!("{}!", self.text(name)), None)
        } else {
            let target = node
                .child_by_field_name("function")
                .or_else(|| node.child_by_field_name("constructor"))?;
            self.callee_of(target)
        };
        let mut arguments = Vec::new();
        if let Some(args) = node.child_by_field_name("arguments") {
            let mut cursor = args.walk();
            for arg in args.named_children(&mut cursor) {
                if self.is_comment(arg) {
                    continue;
                }
                let arg = arg.child_by_field_name("value").unwrap_or(arg);
                arguments.push(self.hint(arg));
            }
        }
        let awaited = node
            .parent()
            .is_some_and(|p| self.rules.is(self.rules.await_kinds, p.kind()));
        Some(CallSite {
            callee,
            receiver,
            arguments,
            awaited,
            line: line(node),
        })
    }

    fn callee_of(&self, target: Node) -> (String, Option<String>) {
        if target.kind() == "generic_function" {
            if let Some(function) = target.child_by_field_name("function") {
                return self.callee_of(function);
            }
        }
        if let Some(member) = self.rules.member(target.kind()).filter(|m| !m.computed) {
            if let Some(property) = target.child_by_field_name(member.property) {
                let receiver = target
                    .child_by_field_name(member.object)
                    .map(|o| self.text(o).trim().to_string());
                return (self.text(property).to_string(), receiver);
            }
        }
        (self.text(target).trim().to_string(), None)
    }

    /// Emits one call statement per call inside `node`, innermost first.
    fn value_calls(&self, node: Node, out: &mut Vec<Statement>) {
        let r = &self.rules;
        let kind = node.kind();
        if r.is(r.lambda_kinds, kind) || r.is(r.function_kinds, kind) || r.is(r.class_kinds, kind)
        {
            return;
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.value_calls(child, out);
        }
        if !r.is(r.call_kinds, kind) {
            return;
        }
        let Some(site) = self.call_site(node) else {
            return;
        };
        let mut reads = Vec::new();
        let target = node
            .child_by_field_name("function")
            .or_else(|| node.child_by_field_name("constructor"));
        if let Some(target) = target {
            if !r.is(r.identifier_kinds, target.kind()) {
                self.reads(target, &mut reads);
            }
        }
        if let Some(args) = node.child_by_field_name("arguments") {
            self.reads(args, &mut reads);
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "token_tree" {
                self.reads(child, &mut reads);
            }
        }
        out.push(self.make(node, StatementKind::Call(site), reads));
    }

    fn reads(&self, node: Node, out: &mut Vec<IdentifierRead>) {
        self.collect_reads(node, false, out);
    }

    fn collect_reads(&self, node: Node, deref: bool, out: &mut Vec<IdentifierRead>) {
        let r = &self.rules;
        let kind = node.kind();
        if r.is(r.identifier_kinds, kind) {
            push_read(out, self.text(node), deref);
            return;
        }
        if r.is(r.call_kinds, kind)
            || r.is(r.lambda_kinds, kind)
            || r.is(r.function_kinds, kind)
            || r.is(r.class_kinds, kind)
        {
            return;
        }
        if let Some(member) = r.member(kind) {
            if let Some(object) = node.child_by_field_name(member.object) {
                let optional = has_child_kind(node, "optional_chain")
                    || self.text(node).contains("?.");
                self.collect_reads(object, member.dereferences && !optional, out);
            }
            if member.computed {
                if let Some(property) = node.child_by_field_name(member.property) {
                    self.collect_reads(property, false, out);
                }
            }
            return;
        }
        // `Name: value` in a Go composite literal: the key is a field, not a variable
        if kind == "keyed_element" {
            if let Some(value) = node.named_child(node.named_child_count().saturating_sub(1)) {
                self.collect_reads(value, false, out);
            }
            return;
        }
        let mut cursor = node.walk();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                let skipped = cursor
                    .field_name()
                    .is_some_and(|f| NON_READ_FIELDS.contains(&f));
                if child.is_named() && !skipped {
                    self.collect_reads(child, false, out);
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }
    }

    fn hint(&self, node: Node) -> ValueHint {
        let node = self.unwrap_expr(node);
        let kind = node.kind();
        if kind == "expression_list" {
            if let Some(first) = node.named_child(0) {
                return self.hint(first);
            }
        }
        if kind == "composite_literal" {
            let list = node
                .child_by_field_name("type")
                .is_some_and(|t| matches!(t.kind(), "slice_type" | "array_type"));
            if list {
                return ValueHint::Literal(ValueKind::Array);
            }
        }
        if let Some(literal) = self.rules.literal_kind(kind) {
            return ValueHint::Literal(literal);
        }
        if self.rules.is(self.rules.lambda_kinds, kind) {
            return ValueHint::Literal(ValueKind::Function);
        }
        if self.rules.is(self.rules.identifier_kinds, kind) {
            return ValueHint::Identifier(self.text(node).to_string());
        }
        if self.rules.is(self.rules.call_kinds, kind) {
            return match self.call_site(node) {
                Some(site) => ValueHint::Call(site.callee),
                None => ValueHint::Expression,
            };
        }
        match kind {
            "comparison_operator" | "not_operator" => ValueHint::Literal(ValueKind::Boolean),
            "binary_expression" | "unary_expression" => {
                let operator = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o))
                    .unwrap_or("");
                match operator {
                    "==" | "===" | "!=" | "!==" | "<" | ">" | "<=" | ">=" | "!" | "instanceof" => {
                        ValueHint::Literal(ValueKind::Boolean)
                    }
                    "-" | "*" | "/" | "%" | "**" => ValueHint::Literal(ValueKind::Number),
                    _ => ValueHint::Expression,
                }
            }
            _ => ValueHint::Expression,
        }
    }
}
