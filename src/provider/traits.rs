//! Transport abstraction for chat completion providers.
//!
//! The agent executor talks to models only through [`ChatTransport`]. A single
//! transport serves every configured provider; [`ChatRequest::provider`] names
//! the one the router picked for the turn.

use crate::provider::error::ProviderResult;
use crate::provider::types::{ChatRequest, ChatResponse, StreamChunk};
use futures_util::Stream;
use std::pin::Pin;

/// Stream of answer fragments
pub type ChatStream = Pin<Box<dyn Stream<Item = ProviderResult<StreamChunk>> + Send>>;

/// Core trait every model transport implements.
///
/// Implementations own retries for transient failures. A
/// [`ProviderError::TokenLimitExceeded`](crate::provider::ProviderError::TokenLimitExceeded)
/// is returned as is so the caller can shrink the conversation.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the request and wait for the complete answer
    async fn chat_completion(&self, request: ChatRequest) -> ProviderResult<ChatResponse>;

    /// Send the request and stream the answer as it is generated
    async fn chat_completion_stream(&self, request: ChatRequest) -> ProviderResult<ChatStream>;
}
