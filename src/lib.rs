//! # DocuMCP
//!
//! `documcp` checks documentation examples by simulating them. Given an
//! example and the code it calls into, it reconstructs a plausible execution
//! trace without running anything, flags likely runtime problems, builds a
//! call graph and scores how far the trace can be trusted.
//!
//! ## Features
//!
//! - **Multi-language Support**: TypeScript/JavaScript, Python, Rust and Go,
//!   parsed with tree-sitter
//! - **Two Strategies**: a deterministic static tracer, and an optional
//!   LLM-assisted tracer (`llm` feature) that falls back to the static one
//! - **Issue Detection**: null references, type mismatches, undefined names,
//!   unreachable code, missing error handling and endless loops
//! - **Validation**: compare a trace against a plain-text expected behaviour
//! - **MCP Tools**: `simulate_execution` and `batch_simulate_execution`
//!   served over stdio (`mcp` feature)
//!
//! ## Quick Start
//!
//! ```rust
//! use documcp::{Config, SimulateExecutionRequest, ToolContext};
//!
//! # fn main() -> documcp::Result<()> {
//! let runtime = tokio::runtime::Runtime::new()?;
//! let tools = ToolContext::new(Config::default())?;
//!
//! let response = runtime.block_on(tools.simulate_execution(SimulateExecutionRequest {
//!     example_code: "const total = add(1, 2);".to_string(),
//!     implementation_code: Some(
//!         "export function add(a: number, b: number): number { return a + b; }".to_string(),
//!     ),
//!     ..Default::default()
//! }));
//!
//! assert!(response.success);
//! assert_eq!(response.trace.entry_point, "add");
//! println!("{}", response.summary);
//! # Ok(())
//! # }
//! ```
//!
//! ## Using the Simulator Directly
//!
//! ```rust
//! use documcp::{ExecutionSimulator, SimulationInput, SimulationOptions};
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let simulator = ExecutionSimulator::new(SimulationOptions::default(), None);
//! let input = SimulationInput::new("value = double(4)\n")
//!     .with_implementation("def double(x: int) -> int:\n    return x * 2\n");
//! let trace = runtime.block_on(simulator.simulate(&input));
//!
//! assert!(trace.reached_end);
//! assert!((0.0..=1.0).contains(&trace.confidence_score));
//! ```
//!
//! ## Error Handling
//!
//! Library entry points return [`Result`]. The tool façade never fails: every
//! problem is reported inside the response.
//!
//! ```rust
//! use documcp::{Error, StaticAnalyzer};
//!
//! let result = StaticAnalyzer::parse_language("cobol");
//! assert!(matches!(result, Err(Error::UnsupportedLanguage(_))));
//! ```

mod analyzer;
mod config;
mod error;
mod llm;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod registry;
pub mod simulator;
mod tools;

pub use analyzer::*;
pub use config::{Config, LlmSettings};
pub use error::{Error, Result};
#[cfg(feature = "llm")]
pub use llm::OpenAiCompatibleBackend;
pub use llm::{LlmBackend, backend_from_settings};
pub use registry::ToolRegistry;
pub use simulator::{
    BehaviorMatcher, CallGraph, CallGraphBuilder, CallGraphEdge, CallGraphNode, CallInfo,
    CallResolution, ExampleValidationResult, ExecutionSimulator, ExecutionStep, ExecutionTrace,
    IssueType, KeywordMatcher, PotentialIssue, PreparedSimulation, Severity, SimulationInput,
    SimulationOptions, SimulationOverrides, StepOperation, TraceStrategy, Validator,
};
pub use tools::*;
