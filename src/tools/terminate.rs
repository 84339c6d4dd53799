//! Built-in tool that ends the interaction.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolError, ToolResult};

/// Name the executor watches for to finish a run.
pub const TERMINATE_TOOL: &str = "terminate";

/// Ends the run once the request is met or the agent cannot proceed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminate;

#[async_trait]
impl Tool for Terminate {
    fn name(&self) -> &str {
        TERMINATE_TOOL
    }

    fn description(&self) -> &str {
        "Terminate the interaction when the request is met OR if the assistant cannot proceed further with the task. When you have finished all the tasks, call this tool to end the work."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "The finish status of the interaction.",
                    "enum": ["success", "failure"]
                }
            },
            "required": ["status"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult<String> {
        let status = args
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::invalid_arguments(TERMINATE_TOOL, "missing 'status'"))?;
        Ok(format!(
            "The interaction has been completed with status: {}",
            status
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_terminate_reports_status() {
        let out = Terminate.execute(json!({"status": "success"})).await.unwrap();
        assert_eq!(out, "The interaction has been completed with status: success");
    }

    #[tokio::test]
    async fn test_terminate_requires_status() {
        let err = Terminate.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn test_definition_is_valid() {
        assert!(Terminate.definition().validate().is_ok());
    }
}
