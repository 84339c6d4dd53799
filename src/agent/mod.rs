//! Tool-calling agent.
//!
//! [`AgentExecutor`] runs one command through the think/act loop against the
//! provider the router picks for each step. The blocking variant returns when
//! the run ends; the streaming variant additionally reports [`AgentEvent`]s
//! while model output arrives, reassembling fragmented tool calls with a
//! [`StreamAccumulator`].

mod error;
mod events;
mod executor;
mod memory;
mod state;
mod streaming;

pub use error::AgentError;
pub use events::AgentEvent;
pub use executor::{AgentExecutor, ExecutorConfig};
pub use memory::{Memory, TRUNCATION_NOTICE};
pub use state::{AgentState, ExecutionResult, FinishReason, FALLBACK_OUTPUT};
pub use streaming::StreamAccumulator;
