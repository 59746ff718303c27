use super::{LanguageType, ValueKind};

/// How a language marks a declaration as visible outside its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStyle {
    /// An `export` statement wraps the declaration
    Keyword,
    /// Names without a leading underscore are public
    Underscore,
    /// A `pub` visibility modifier precedes the item
    VisibilityModifier,
    /// Names starting with an uppercase letter are exported
    Capitalized,
}

/// A member access node and the fields holding its object and property.
#[derive(Debug, Clone, Copy)]
pub struct MemberKind {
    pub kind: &'static str,
    pub object: &'static str,
    pub property: &'static str,
    /// The property is an arbitrary expression (`a[i]`) rather than a name
    pub computed: bool,
    /// Accessing the property dereferences the object
    pub dereferences: bool,
}

/// Tree-sitter node kinds and naming conventions for one language.
///
/// The walker is generic; everything language specific lives in these tables.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerRules {
    pub function_kinds: &'static [&'static str],
    pub lambda_kinds: &'static [&'static str],
    pub class_kinds: &'static [&'static str],
    pub type_kinds: &'static [&'static str],
    pub module_kinds: &'static [&'static str],
    pub call_kinds: &'static [&'static str],
    pub member_kinds: &'static [MemberKind],
    pub await_kinds: &'static [&'static str],
    pub branch_kinds: &'static [&'static str],
    pub else_kinds: &'static [&'static str],
    pub switch_kinds: &'static [&'static str],
    pub case_kinds: &'static [&'static str],
    pub default_case_kinds: &'static [&'static str],
    pub case_body_field: Option<&'static str>,
    pub exhaustive_switch: bool,
    pub loop_kinds: &'static [&'static str],
    pub return_kinds: &'static [&'static str],
    pub throw_kinds: &'static [&'static str],
    pub break_kinds: &'static [&'static str],
    pub continue_kinds: &'static [&'static str],
    pub try_kinds: &'static [&'static str],
    pub handler_kinds: &'static [&'static str],
    pub finally_kinds: &'static [&'static str],
    pub declaration_kinds: &'static [&'static str],
    pub assignment_kinds: &'static [&'static str],
    pub assignment_declares: bool,
    pub expression_statement_kinds: &'static [&'static str],
    pub passthrough_kinds: &'static [&'static str],
    pub block_kinds: &'static [&'static str],
    pub import_kinds: &'static [&'static str],
    pub export_kinds: &'static [&'static str],
    pub decorator_kinds: &'static [&'static str],
    pub identifier_kinds: &'static [&'static str],
    pub comment_kinds: &'static [&'static str],
    pub skip_kinds: &'static [&'static str],
    pub self_param_kinds: &'static [&'static str],
    pub variadic_param_kinds: &'static [&'static str],
    pub optional_param_kinds: &'static [&'static str],
    pub literals: &'static [(&'static str, ValueKind)],
    pub globals: &'static [&'static str],
    pub self_words: &'static [&'static str],
    pub export_style: ExportStyle,
    pub panic_calls: &'static [&'static str],
    pub panicking_methods: &'static [&'static str],
    pub implicit_return: bool,
    pub enforces_type_hints: bool,
}

const TS_RULES: AnalyzerRules = AnalyzerRules {
    function_kinds: &[
        "function_declaration",
        "generator_function_declaration",
        "method_definition",
    ],
    lambda_kinds: &[
        "arrow_function",
        "function_expression",
        "function",
        "generator_function",
    ],
    class_kinds: &["class_declaration", "abstract_class_declaration"],
    type_kinds: &[
        "interface_declaration",
        "type_alias_declaration",
        "enum_declaration",
    ],
    module_kinds: &[],
    call_kinds: &["call_expression", "new_expression"],
    member_kinds: &[
        MemberKind {
            kind: "member_expression",
            object: "object",
            property: "property",
            computed: false,
            dereferences: true,
        },
        MemberKind {
            kind: "subscript_expression",
            object: "object",
            property: "index",
            computed: true,
            dereferences: true,
        },
    ],
    await_kinds: &["await_expression"],
    branch_kinds: &["if_statement"],
    else_kinds: &["else_clause"],
    switch_kinds: &["switch_statement"],
    case_kinds: &["switch_case", "switch_default"],
    default_case_kinds: &["switch_default"],
    case_body_field: None,
    exhaustive_switch: false,
    loop_kinds: &[
        "for_statement",
        "for_in_statement",
        "while_statement",
        "do_statement",
    ],
    return_kinds: &["return_statement"],
    throw_kinds: &["throw_statement"],
    break_kinds: &["break_statement"],
    continue_kinds: &["continue_statement"],
    try_kinds: &["try_statement"],
    handler_kinds: &["catch_clause"],
    finally_kinds: &["finally_clause"],
    declaration_kinds: &["lexical_declaration", "variable_declaration"],
    assignment_kinds: &[
        "assignment_expression",
        "augmented_assignment_expression",
    ],
    assignment_declares: false,
    expression_statement_kinds: &["expression_statement"],
    passthrough_kinds: &["labeled_statement"],
    block_kinds: &["statement_block"],
    import_kinds: &["import_statement"],
    export_kinds: &["export_statement"],
    decorator_kinds: &[],
    identifier_kinds: &["identifier", "shorthand_property_identifier"],
    comment_kinds: &["comment"],
    skip_kinds: &[
        "empty_statement",
        "debugger_statement",
        "ambient_declaration",
        "hash_bang_line",
    ],
    self_param_kinds: &[],
    variadic_param_kinds: &["rest_pattern"],
    optional_param_kinds: &["optional_parameter"],
    literals: &[
        ("number", ValueKind::Number),
        ("string", ValueKind::String),
        ("template_string", ValueKind::String),
        ("true", ValueKind::Boolean),
        ("false", ValueKind::Boolean),
        ("null", ValueKind::Null),
        ("undefined", ValueKind::Undefined),
        ("array", ValueKind::Array),
        ("object", ValueKind::Object),
        ("regex", ValueKind::Object),
        ("arrow_function", ValueKind::Function),
        ("function_expression", ValueKind::Function),
        ("function", ValueKind::Function),
    ],
    globals: &[
        "console",
        "Math",
        "JSON",
        "Object",
        "Array",
        "String",
        "Number",
        "Boolean",
        "Promise",
        "Error",
        "TypeError",
        "RangeError",
        "Date",
        "Map",
        "Set",
        "WeakMap",
        "RegExp",
        "Symbol",
        "BigInt",
        "parseInt",
        "parseFloat",
        "isNaN",
        "setTimeout",
        "clearTimeout",
        "setInterval",
        "structuredClone",
        "require",
        "module",
        "exports",
        "process",
        "window",
        "document",
        "globalThis",
        "fetch",
        "NaN",
        "Infinity",
        "undefined",
    ],
    self_words: &["this", "super"],
    export_style: ExportStyle::Keyword,
    panic_calls: &[],
    panicking_methods: &[],
    implicit_return: false,
    enforces_type_hints: true,
};

const PYTHON_RULES: AnalyzerRules = AnalyzerRules {
    function_kinds: &["function_definition"],
    lambda_kinds: &["lambda"],
    class_kinds: &["class_definition"],
    type_kinds: &[],
    module_kinds: &[],
    call_kinds: &["call"],
    member_kinds: &[
        MemberKind {
            kind: "attribute",
            object: "object",
            property: "attribute",
            computed: false,
            dereferences: true,
        },
        MemberKind {
            kind: "subscript",
            object: "value",
            property: "subscript",
            computed: true,
            dereferences: true,
        },
    ],
    await_kinds: &["await"],
    branch_kinds: &["if_statement"],
    else_kinds: &["else_clause"],
    switch_kinds: &["match_statement"],
    case_kinds: &["case_clause"],
    default_case_kinds: &[],
    case_body_field: Some("consequence"),
    exhaustive_switch: false,
    loop_kinds: &["for_statement", "while_statement"],
    return_kinds: &["return_statement"],
    throw_kinds: &["raise_statement"],
    break_kinds: &["break_statement"],
    continue_kinds: &["continue_statement"],
    try_kinds: &["try_statement"],
    handler_kinds: &["except_clause", "except_group_clause"],
    finally_kinds: &["finally_clause"],
    declaration_kinds: &[],
    assignment_kinds: &["assignment", "augmented_assignment"],
    assignment_declares: true,
    expression_statement_kinds: &["expression_statement"],
    passthrough_kinds: &["with_statement", "with_clause", "with_item"],
    block_kinds: &["block"],
    import_kinds: &[
        "import_statement",
        "import_from_statement",
        "future_import_statement",
    ],
    export_kinds: &[],
    decorator_kinds: &["decorated_definition"],
    identifier_kinds: &["identifier"],
    comment_kinds: &["comment"],
    skip_kinds: &[
        "pass_statement",
        "global_statement",
        "nonlocal_statement",
        "assert_statement",
    ],
    self_param_kinds: &[],
    variadic_param_kinds: &["list_splat_pattern", "dictionary_splat_pattern"],
    optional_param_kinds: &[],
    literals: &[
        ("integer", ValueKind::Number),
        ("float", ValueKind::Number),
        ("string", ValueKind::String),
        ("concatenated_string", ValueKind::String),
        ("true", ValueKind::Boolean),
        ("false", ValueKind::Boolean),
        ("none", ValueKind::Null),
        ("list", ValueKind::Array),
        ("tuple", ValueKind::Array),
        ("list_comprehension", ValueKind::Array),
        ("dictionary", ValueKind::Object),
        ("dictionary_comprehension", ValueKind::Object),
        ("set", ValueKind::Object),
        ("lambda", ValueKind::Function),
    ],
    globals: &[
        "print",
        "len",
        "range",
        "str",
        "int",
        "float",
        "bool",
        "list",
        "dict",
        "set",
        "tuple",
        "object",
        "isinstance",
        "type",
        "super",
        "open",
        "enumerate",
        "zip",
        "map",
        "filter",
        "sorted",
        "reversed",
        "sum",
        "min",
        "max",
        "abs",
        "any",
        "all",
        "repr",
        "round",
        "iter",
        "next",
        "getattr",
        "setattr",
        "hasattr",
        "id",
        "input",
        "Exception",
        "ValueError",
        "TypeError",
        "KeyError",
        "IndexError",
        "RuntimeError",
        "AttributeError",
        "ZeroDivisionError",
        "NotImplementedError",
        "__name__",
        "__file__",
    ],
    self_words: &["self", "cls"],
    export_style: ExportStyle::Underscore,
    panic_calls: &[],
    panicking_methods: &[],
    implicit_return: false,
    enforces_type_hints: false,
};

const RUST_RULES: AnalyzerRules = AnalyzerRules {
    function_kinds: &["function_item"],
    lambda_kinds: &["closure_expression"],
    class_kinds: &["impl_item", "trait_item"],
    type_kinds: &["struct_item", "enum_item", "type_item", "union_item"],
    module_kinds: &["mod_item"],
    call_kinds: &["call_expression", "macro_invocation"],
    member_kinds: &[
        MemberKind {
            kind: "field_expression",
            object: "value",
            property: "field",
            computed: false,
            dereferences: true,
        },
        MemberKind {
            kind: "scoped_identifier",
            object: "path",
            property: "name",
            computed: false,
            dereferences: false,
        },
    ],
    await_kinds: &["await_expression"],
    branch_kinds: &["if_expression"],
    else_kinds: &["else_clause"],
    switch_kinds: &["match_expression"],
    case_kinds: &["match_arm"],
    default_case_kinds: &[],
    case_body_field: Some("value"),
    exhaustive_switch: true,
    loop_kinds: &["loop_expression", "while_expression", "for_expression"],
    return_kinds: &["return_expression"],
    throw_kinds: &[],
    break_kinds: &["break_expression"],
    continue_kinds: &["continue_expression"],
    try_kinds: &[],
    handler_kinds: &[],
    finally_kinds: &[],
    declaration_kinds: &["let_declaration", "const_item", "static_item"],
    assignment_kinds: &["assignment_expression", "compound_assignment_expr"],
    assignment_declares: false,
    expression_statement_kinds: &["expression_statement"],
    passthrough_kinds: &["unsafe_block", "async_block"],
    block_kinds: &["block"],
    import_kinds: &["use_declaration", "extern_crate_declaration"],
    export_kinds: &[],
    decorator_kinds: &[],
    identifier_kinds: &["identifier"],
    comment_kinds: &["line_comment", "block_comment"],
    skip_kinds: &[
        "attribute_item",
        "inner_attribute_item",
        "empty_statement",
        "macro_definition",
        "function_signature_item",
        "associated_type",
    ],
    self_param_kinds: &["self_parameter"],
    variadic_param_kinds: &["variadic_parameter"],
    optional_param_kinds: &[],
    literals: &[
        ("integer_literal", ValueKind::Number),
        ("float_literal", ValueKind::Number),
        ("string_literal", ValueKind::String),
        ("raw_string_literal", ValueKind::String),
        ("char_literal", ValueKind::String),
        ("boolean_literal", ValueKind::Boolean),
        ("array_expression", ValueKind::Array),
        ("struct_expression", ValueKind::Object),
        ("tuple_expression", ValueKind::Object),
        ("closure_expression", ValueKind::Function),
    ],
    globals: &[
        "Some", "None", "Ok", "Err", "Vec", "String", "Box", "Rc", "Arc", "Option", "Result",
        "HashMap", "HashSet", "BTreeMap", "Default", "Self", "std", "core", "drop",
    ],
    self_words: &["self", "Self"],
    export_style: ExportStyle::VisibilityModifier,
    panic_calls: &["panic", "unreachable", "todo", "unimplemented"],
    panicking_methods: &["unwrap", "expect"],
    implicit_return: true,
    enforces_type_hints: true,
};

const GO_RULES: AnalyzerRules = AnalyzerRules {
    function_kinds: &["function_declaration", "method_declaration"],
    lambda_kinds: &["func_literal"],
    class_kinds: &[],
    type_kinds: &["type_declaration"],
    module_kinds: &[],
    call_kinds: &["call_expression"],
    member_kinds: &[
        MemberKind {
            kind: "selector_expression",
            object: "operand",
            property: "field",
            computed: false,
            dereferences: true,
        },
        MemberKind {
            kind: "index_expression",
            object: "operand",
            property: "index",
            computed: true,
            dereferences: true,
        },
    ],
    await_kinds: &[],
    branch_kinds: &["if_statement"],
    else_kinds: &[],
    switch_kinds: &[
        "expression_switch_statement",
        "type_switch_statement",
        "select_statement",
    ],
    case_kinds: &[
        "expression_case",
        "type_case",
        "default_case",
        "communication_case",
    ],
    default_case_kinds: &["default_case"],
    case_body_field: None,
    exhaustive_switch: false,
    loop_kinds: &["for_statement"],
    return_kinds: &["return_statement"],
    throw_kinds: &[],
    break_kinds: &["break_statement"],
    continue_kinds: &["continue_statement"],
    try_kinds: &[],
    handler_kinds: &[],
    finally_kinds: &[],
    declaration_kinds: &[
        "var_declaration",
        "const_declaration",
        "short_var_declaration",
    ],
    assignment_kinds: &["assignment_statement", "inc_statement", "dec_statement"],
    assignment_declares: false,
    expression_statement_kinds: &["expression_statement"],
    passthrough_kinds: &["defer_statement", "go_statement", "labeled_statement"],
    block_kinds: &["block"],
    import_kinds: &["import_declaration"],
    export_kinds: &[],
    decorator_kinds: &[],
    identifier_kinds: &["identifier"],
    comment_kinds: &["comment"],
    skip_kinds: &["package_clause", "empty_statement", "fallthrough_statement"],
    self_param_kinds: &[],
    variadic_param_kinds: &["variadic_parameter_declaration"],
    optional_param_kinds: &[],
    literals: &[
        ("int_literal", ValueKind::Number),
        ("float_literal", ValueKind::Number),
        ("imaginary_literal", ValueKind::Number),
        ("rune_literal", ValueKind::Number),
        ("interpreted_string_literal", ValueKind::String),
        ("raw_string_literal", ValueKind::String),
        ("true", ValueKind::Boolean),
        ("false", ValueKind::Boolean),
        ("nil", ValueKind::Null),
        ("composite_literal", ValueKind::Object),
        ("func_literal", ValueKind::Function),
    ],
    globals: &[
        "fmt", "errors", "strings", "strconv", "os", "time", "sort", "math", "len", "cap",
        "append", "make", "new", "panic", "recover", "copy", "delete", "close", "print",
        "println", "min", "max", "error", "string", "int", "int64", "float64", "bool", "byte",
        "rune", "iota", "true", "false", "nil",
    ],
    self_words: &[],
    export_style: ExportStyle::Capitalized,
    panic_calls: &["panic"],
    panicking_methods: &[],
    implicit_return: false,
    enforces_type_hints: true,
};

impl AnalyzerRules {
    #[inline(always)]
    pub fn for_language(lang: LanguageType) -> Self {
        match lang {
            LanguageType::TypeScript => TS_RULES,
            LanguageType::Python => PYTHON_RULES,
            LanguageType::Rust => RUST_RULES,
            LanguageType::Go => GO_RULES,
        }
    }

    pub fn is(&self, kinds: &[&str], kind: &str) -> bool {
        kinds.contains(&kind)
    }

    pub fn member(&self, kind: &str) -> Option<MemberKind> {
        self.member_kinds.iter().find(|m| m.kind == kind).copied()
    }

    pub fn literal_kind(&self, kind: &str) -> Option<ValueKind> {
        self.literals
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| *v)
    }

    /// Whether a name is provided by the language runtime or prelude.
    pub fn is_global(&self, name: &str) -> bool {
        name.ends_with('!') || self.globals.contains(&name)
    }

    pub fn is_self_word(&self, name: &str) -> bool {
        self.self_words.contains(&name)
    }

    pub fn is_panic_call(&self, callee: &str) -> bool {
        self.panic_calls
            .contains(&callee.trim_end_matches('!'))
    }

    /// Whether a plain name counts as exported under this language's convention.
    pub fn is_exported_name(&self, name: &str) -> bool {
        match self.export_style {
            ExportStyle::Underscore => {
                !name.starts_with('_') || (name.starts_with("__") && name.ends_with("__"))
            }
            ExportStyle::Capitalized => name.chars().next().is_some_and(char::is_uppercase),
            ExportStyle::Keyword | ExportStyle::VisibilityModifier => false,
        }
    }
}
