//! Multi-tenant session layer.
//!
//! A [`SessionStore`] holds workspaces and their sessions. Every session owns
//! a [`CommandQueue`] that lets at most one command run at a time, and
//! [`AgentService`] drives those queues with an [`AgentExecutor`](crate::agent::AgentExecutor).

mod error;
mod queue;
mod service;
mod store;

pub use error::{QueueError, SessionError, SessionResult};
pub use queue::{Command, CommandQueue, CommandStatus, EnqueueOutcome, QueueStatus};
pub use service::{AgentService, EnqueueReceipt, KnowledgeSource, ReceiptStatus, ServiceEvent};
pub use store::{Session, SessionInfo, SessionStore, Workspace, DEFAULT_WORKSPACE};
