use serde::Serialize;
use std::fmt::Write as _;

/// One input parameter of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterDefinition {
    pub name: &'static str,
    /// JSON type of the value
    pub kind: &'static str,
    pub required: bool,
    pub description: &'static str,
}

/// Static description of a callable tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [ParameterDefinition],
}

pub const SIMULATE_EXECUTION: &str = "simulate_execution";
pub const BATCH_SIMULATE_EXECUTION: &str = "batch_simulate_execution";

const fn param(
    name: &'static str,
    kind: &'static str,
    required: bool,
    description: &'static str,
) -> ParameterDefinition {
    ParameterDefinition {
        name,
        kind,
        required,
        description,
    }
}

const SIMULATE_PARAMETERS: &[ParameterDefinition] = &[
    param("exampleCode", "string", true, "The documentation example to trace"),
    param(
        "implementationCode",
        "string",
        false,
        "Source the example calls into; the example is traced against itself when neither this nor implementationPath is given",
    ),
    param(
        "implementationPath",
        "string",
        false,
        "Path to the implementation file; an unreadable path fails the call",
    ),
    param(
        "entryPoint",
        "string",
        false,
        "Function to start from; detected from the first call in the example when omitted",
    ),
    param(
        "expectedBehavior",
        "string",
        false,
        "Plain-text description of what the example should do, used for validation",
    ),
    param(
        "language",
        "string",
        false,
        "typescript, javascript, python, rust or go; detected when omitted",
    ),
    param("exampleId", "string", false, "Identifier echoed back in the trace"),
    param("options", "object", false, "Per-call simulation options, see below"),
];

const BATCH_PARAMETERS: &[ParameterDefinition] = &[
    param(
        "examples",
        "array",
        true,
        "Examples to simulate in order; each takes the simulate_execution parameters",
    ),
    param(
        "globalOptions",
        "object",
        false,
        "Options applied to every example; per-example options win",
    ),
];

const OPTION_PARAMETERS: &[ParameterDefinition] = &[
    param("maxDepth", "integer", false, "Call frames to descend into (default 10)"),
    param("maxSteps", "integer", false, "Steps recorded before the trace halts (default 100)"),
    param("timeoutMs", "integer", false, "Wall-clock budget in milliseconds (default 30000)"),
    param("includeCallGraph", "boolean", false, "Build a call graph for the entry point (default true)"),
    param("detectNullRefs", "boolean", false, "Report null and undefined references (default true)"),
    param("detectTypeMismatches", "boolean", false, "Report argument and assignment type mismatches (default true)"),
    param("detectUnreachableCode", "boolean", false, "Report dead code and endless loops (default true)"),
    param("confidenceThreshold", "number", false, "Confidence below which results are flagged as shaky (default 0.7)"),
];

const TOOLS: &[ToolDefinition] = &[
    ToolDefinition {
        name: SIMULATE_EXECUTION,
        description: "Simulate running a documentation example against its implementation without executing it. Returns the inferred execution trace, likely runtime issues, a confidence score, an optional call graph and validation against the expected behaviour.",
        parameters: SIMULATE_PARAMETERS,
    },
    ToolDefinition {
        name: BATCH_SIMULATE_EXECUTION,
        description: "Simulate several documentation examples one after another and report per-example results plus pass/fail totals and the average confidence.",
        parameters: BATCH_PARAMETERS,
    },
];

/// The tools this server exposes, passed explicitly to whoever needs them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolRegistry {
    tools: &'static [ToolDefinition],
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self { tools: TOOLS }
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tools(&self) -> &'static [ToolDefinition] {
        self.tools
    }

    pub fn get(&self, name: &str) -> Option<&'static ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn option_parameters(&self) -> &'static [ParameterDefinition] {
        OPTION_PARAMETERS
    }

    /// Short server instructions listing every tool.
    pub fn instructions(&self) -> String {
        let mut text = String::from(
            "DocuMCP traces documentation examples against their implementation without running them.",
        );
        for tool in self.tools {
            let _ = write!(text, "\n- {}: {}", tool.name, tool.description);
        }
        text
    }

    /// Markdown reference of every tool and its parameters.
    pub fn render_markdown(&self) -> String {
        let mut output = String::from("# DocuMCP tools\n");
        for tool in self.tools {
            let _ = write!(output, "\n## {}\n\n{}\n\n", tool.name, tool.description);
            render_table(&mut output, tool.parameters);
        }
        output.push_str("\n## options\n\n");
        render_table(&mut output, OPTION_PARAMETERS);
        output
    }
}

fn render_table(output: &mut String, parameters: &[ParameterDefinition]) {
    output.push_str("| Parameter | Type | Required | Description |\n");
    output.push_str("|-----------|------|----------|-------------|\n");
    for p in parameters {
        let _ = writeln!(
            output,
            "| `{}` | {} | {} | {} |",
            p.name,
            p.kind,
            if p.required { "yes" } else { "no" },
            p.description
        );
    }
}
