//! Model provider transport.
//!
//! This module provides the [`ChatTransport`] trait the agent executor talks
//! to, the provider-agnostic message types, bounded retry, and an
//! OpenAI-compatible HTTP implementation.

pub mod error;
pub mod openai;
pub mod retry;
pub mod traits;
pub mod types;

// Re-export main types
pub use error::{ProviderError, ProviderResult};
pub use openai::OpenAiTransport;
pub use retry::RetryPolicy;
pub use traits::{ChatStream, ChatTransport};
pub use types::{
    ChatRequest, ChatResponse, FunctionCall, Message, Role, StreamChunk, ToolCall, ToolChoice,
    ToolDefinition, Usage,
};
