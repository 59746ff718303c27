use crate::registry::{BATCH_SIMULATE_EXECUTION, SIMULATE_EXECUTION};
use crate::{BatchSimulateRequest, Config, SimulateExecutionRequest, ToolContext};
use rmcp::{
    Error as McpError, ServerHandler,
    model::{CallToolResult, Content, ErrorCode, ServerCapabilities, ServerInfo},
    tool,
};
use serde::Serialize;
use tracing::info;

/// DocuMCP MCP server implementation
#[derive(Debug, Clone)]
pub struct DocuMcp {
    ctx: ToolContext,
}

/// Helper function to create an internal error
fn internal_error(message: impl Into<String>) -> McpError {
    McpError::new(ErrorCode::INTERNAL_ERROR, message.into(), None)
}

fn json_result(value: &impl Serialize) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| internal_error(format!("Failed to serialize result: {}", e)))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

#[tool(tool_box)]
impl DocuMcp {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    /// Build the server from environment configuration.
    pub fn try_new() -> crate::Result<Self> {
        let config = Config::from_env()?;
        Ok(Self::new(ToolContext::new(config)?))
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    #[tool(
        description = "Simulate running a documentation example against its implementation without executing it. Returns the inferred execution trace, likely runtime issues, a confidence score, an optional call graph and validation against the expected behaviour."
    )]
    async fn simulate_execution(
        &self,
        #[tool(aggr)] req: SimulateExecutionRequest,
    ) -> Result<CallToolResult, McpError> {
        info!("{} called", SIMULATE_EXECUTION);
        let response = self.ctx.simulate_execution(req).await;
        json_result(&response)
    }

    #[tool(
        description = "Simulate several documentation examples one after another and report per-example results plus pass/fail totals and the average confidence."
    )]
    async fn batch_simulate_execution(
        &self,
        #[tool(aggr)] req: BatchSimulateRequest,
    ) -> Result<CallToolResult, McpError> {
        info!(
            "{} called with {} example(s)",
            BATCH_SIMULATE_EXECUTION,
            req.examples.len()
        );
        let response = self.ctx.batch_simulate_execution(req).await;
        json_result(&response)
    }
}

#[tool(tool_box)]
impl ServerHandler for DocuMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(self.ctx.registry().instructions()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> DocuMcp {
        DocuMcp::new(ToolContext::with_backend(Config::default(), None))
    }

    #[test]
    fn test_info_lists_tools() {
        let info = server().get_info();
        let instructions = info.instructions.unwrap();
        assert!(instructions.contains(SIMULATE_EXECUTION));
        assert!(instructions.contains(BATCH_SIMULATE_EXECUTION));
    }

    #[tokio::test]
    async fn test_empty_batch_returns_report() {
        let result = server()
            .batch_simulate_execution(BatchSimulateRequest::default())
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.content.len(), 1);
    }

    #[tokio::test]
    async fn test_simulate_returns_json() {
        let request = SimulateExecutionRequest {
            example_code: "const total = add(1, 2);".to_string(),
            implementation_code: Some(
                "export function add(a: number, b: number): number { return a + b; }".to_string(),
            ),
            ..Default::default()
        };
        let result = server().simulate_execution(request).await.unwrap();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.content.len(), 1);
    }
}
