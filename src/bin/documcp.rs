use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use documcp::{
    BatchSimulateRequest, Config, SimulateExecutionRequest, SimulateExecutionResponse,
    SimulationOverrides, ToolContext,
};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(
    name = "documcp",
    about = "Simulate documentation examples against their implementation",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate one example
    Simulate(SimulateArgs),
    /// Simulate every example listed in a JSON manifest
    Batch {
        /// JSON file holding `{"examples": [...], "globalOptions": {...}}`
        manifest: PathBuf,
    },
    /// Print the tool reference as markdown
    Tools,
}

#[derive(clap::Args, Debug)]
struct SimulateArgs {
    /// File holding the example code
    example: PathBuf,

    /// Implementation file the example calls into
    #[clap(short, long)]
    implementation: Option<PathBuf>,

    /// Function to start from
    #[clap(short, long)]
    entry_point: Option<String>,

    /// Expected behaviour to validate against
    #[clap(long)]
    expected: Option<String>,

    /// typescript, javascript, python, rust or go
    #[clap(short, long)]
    language: Option<String>,

    #[clap(long)]
    max_steps: Option<usize>,

    #[clap(long)]
    max_depth: Option<usize>,

    #[clap(long)]
    timeout_ms: Option<u64>,

    /// Skip the call graph
    #[clap(long)]
    no_call_graph: bool,

    /// Print the full response as JSON
    #[clap(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let tools = ToolContext::new(config)?;

    match cli.command {
        Command::Simulate(args) => {
            let json = args.json;
            let request = simulate_request(args)?;
            let response = tools.simulate_execution(request).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
            if !response.success {
                std::process::exit(1);
            }
        }
        Command::Batch { manifest } => {
            let content = fs::read_to_string(&manifest)
                .with_context(|| format!("failed to read {}", manifest.display()))?;
            let request: BatchSimulateRequest = serde_json::from_str(&content)
                .with_context(|| format!("invalid manifest {}", manifest.display()))?;
            let response = tools.batch_simulate_execution(request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if !response.success {
                std::process::exit(1);
            }
        }
        Command::Tools => {
            println!("{}", tools.registry().render_markdown());
        }
    }

    Ok(())
}

fn simulate_request(args: SimulateArgs) -> Result<SimulateExecutionRequest> {
    let example_code = fs::read_to_string(&args.example)
        .with_context(|| format!("failed to read {}", args.example.display()))?;
    let options = SimulationOverrides {
        max_steps: args.max_steps,
        max_depth: args.max_depth,
        timeout_ms: args.timeout_ms,
        include_call_graph: args.no_call_graph.then_some(false),
        ..Default::default()
    };
    Ok(SimulateExecutionRequest {
        example_code,
        implementation_path: args.implementation.map(|p| p.display().to_string()),
        entry_point: args.entry_point,
        expected_behavior: args.expected,
        language: args.language,
        example_id: args
            .example
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned()),
        options: Some(options),
        ..Default::default()
    })
}

fn print_response(response: &SimulateExecutionResponse) {
    println!("{}", response.summary);
    let trace = &response.trace;
    if !trace.execution_path.is_empty() {
        println!("\nPath:");
        for id in &trace.execution_path {
            if let Some(step) = trace.step(id) {
                println!(
                    "  {:>8}  {:indent$}{:?} {} (line {})",
                    step.id,
                    "",
                    step.operation,
                    step.construct,
                    step.line,
                    indent = step.call_depth * 2
                );
            }
        }
    }
    if !trace.potential_issues.is_empty() {
        println!("\nIssues:");
        for issue in &trace.potential_issues {
            println!(
                "  [{:?}] {} ({}:{})",
                issue.severity, issue.message, issue.location.function, issue.location.line
            );
        }
    }
    if let Some(graph) = &response.call_graph {
        println!(
            "\nCall graph: {} node(s), {} edge(s)",
            graph.nodes.len(),
            graph.edges.len()
        );
    }
    println!("\nRecommendations:");
    for recommendation in &response.recommendations {
        println!("  - {}", recommendation);
    }
}
