//! Error types for tools and the tool registry.

use thiserror::Error;

/// Errors that can occur while resolving or running a tool.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    /// The requested tool was not found.
    #[error("Tool '{0}' not found")]
    NotFound(String),

    /// A tool with the same name is already registered.
    #[error("Tool '{0}' already registered")]
    Conflict(String),

    /// The tool name is invalid (empty or contains invalid characters).
    #[error("Invalid tool name '{0}': must be non-empty and contain only alphanumeric characters, underscores, or hyphens")]
    InvalidName(String),

    /// The model sent arguments the tool cannot use.
    #[error("Invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    /// The tool ran and failed.
    #[error("Error executing '{tool}': {message}")]
    Execution { tool: String, message: String },
}

impl ToolError {
    pub fn invalid_arguments(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;
