//! Errors that end a run.

use thiserror::Error;

use crate::provider::ProviderError;
use crate::router::RouterError;

/// Failure that moves the executor to `ERROR`.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Router(#[from] RouterError),

    /// The stream ended before the provider signalled completion
    #[error("Stream ended unexpectedly")]
    StreamIncomplete,
}

impl AgentError {
    pub fn is_token_limit(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_token_limit())
    }
}
