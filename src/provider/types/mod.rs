//! Provider-agnostic request and message types.

pub mod message;
pub mod request;
pub mod tools;

pub use message::{FunctionCall, Message, Role, ToolCall};
pub use request::{ChatRequest, ChatResponse, StreamChunk, Usage};
pub use tools::{ToolChoice, ToolDefinition};
