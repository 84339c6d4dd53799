//! Tools the agent can call.
//!
//! Tools implement [`Tool`] and are resolved by name through a
//! [`ToolRegistry`]. The built-in [`Terminate`] tool ends a run.

mod error;
mod registry;
mod terminate;

pub use error::{ToolError, ToolResult};
pub use registry::ToolRegistry;
pub use terminate::{Terminate, TERMINATE_TOOL};

use crate::provider::ToolDefinition;
use async_trait::async_trait;

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to call the tool
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object
    fn parameters(&self) -> serde_json::Value;

    /// Run the tool with already-parsed arguments.
    ///
    /// Failures are reported back to the model as tool results, never abort a run.
    async fn execute(&self, args: serde_json::Value) -> ToolResult<String>;

    /// Schema advertised to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}
