//! Inbound service facade.
//!
//! [`AgentService`] accepts messages for `(workspace, session)` pairs,
//! queues them per session and drives each session's queue on its own tokio
//! task. Progress is published on a broadcast channel of [`ServiceEvent`]s.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::agent::{
    AgentEvent, AgentExecutor, AgentState, ExecutionResult, ExecutorConfig, FinishReason, Memory,
    FALLBACK_OUTPUT,
};
use crate::config::{Configuration, EnvironmentLoader};
use crate::observability::Logger;
use crate::provider::{Message, OpenAiTransport};
use crate::router::ProviderRouter;
use crate::tools::ToolRegistry;

use super::queue::{Command, EnqueueOutcome, QueueStatus};
use super::store::{Session, SessionInfo, SessionStore, Workspace};
use super::{SessionError, SessionResult};

const EVENT_CAPACITY: usize = 256;
const AGENT_EVENT_BUFFER: usize = 64;

/// Supplies workspace knowledge relevant to a message.
#[async_trait::async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn get_context(
        &self,
        message: &str,
        workspace_id: &str,
    ) -> anyhow::Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Queued,
    Processing,
}

/// Answer to [`AgentService::enqueue_or_run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueReceipt {
    pub session_id: String,
    pub command_id: String,
    pub status: ReceiptStatus,
    /// 1-based position among pending commands, when queued
    pub queue_position: Option<usize>,
}

/// Published on the service's broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    CommandQueued {
        workspace_id: String,
        session_id: String,
        command_id: String,
        position: usize,
    },
    CommandStarted {
        workspace_id: String,
        session_id: String,
        command_id: String,
    },
    /// Agent event of a streaming run, unchanged
    Agent {
        workspace_id: String,
        session_id: String,
        command_id: String,
        event: AgentEvent,
    },
    /// Sent after the queue has moved past the command
    CommandFinished {
        workspace_id: String,
        session_id: String,
        command_id: String,
        result: ExecutionResult,
    },
}

#[derive(Clone)]
pub struct AgentService {
    store: Arc<SessionStore>,
    executor: Arc<AgentExecutor>,
    knowledge: Option<Arc<dyn KnowledgeSource>>,
    events: broadcast::Sender<ServiceEvent>,
    streaming: bool,
}

impl AgentService {
    pub fn new(store: Arc<SessionStore>, executor: Arc<AgentExecutor>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            executor,
            knowledge: None,
            events,
            streaming: false,
        }
    }

    /// Build the whole stack from configuration: HTTP transport, router,
    /// tool registry with `terminate`, and an optional run log.
    pub fn from_config(config: &Configuration, env: &EnvironmentLoader) -> anyhow::Result<Self> {
        let transport = OpenAiTransport::from_config(config, env)
            .context("Failed to create provider transport")?;
        let router =
            ProviderRouter::from_config(config).context("Failed to create provider router")?;

        let mut executor = AgentExecutor::new(
            ExecutorConfig::from(&config.agent),
            Arc::new(transport),
            Arc::new(router),
            ToolRegistry::with_terminate(),
        );
        if let Some(log_file) = &config.logging.log_file {
            let logger = Logger::new(
                Some(std::path::Path::new(log_file)),
                Some(&config.logging.log_level),
            )
            .context("Failed to create run logger")?;
            executor = executor.with_logger(Arc::new(logger));
        }

        Ok(Self::new(Arc::new(SessionStore::new()), Arc::new(executor))
            .with_streaming(config.agent.streaming))
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeSource>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Stream model output and forward agent events to subscribers.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn executor(&self) -> &Arc<AgentExecutor> {
        &self.executor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ServiceEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn session(&self, workspace_id: &str, session_id: &str) -> SessionResult<Arc<Session>> {
        self.store
            .session(workspace_id, session_id)
            .ok_or_else(|| SessionError::SessionNotFound {
                workspace_id: workspace_id.to_string(),
                session_id: session_id.to_string(),
            })
    }

    /// Queue `text` on the session, creating the session if needed, and start
    /// processing when the session is idle.
    ///
    /// Must be called within a Tokio runtime.
    pub fn enqueue_or_run(
        &self,
        workspace_id: &str,
        session_id: Option<&str>,
        text: &str,
        priority: Option<i32>,
    ) -> EnqueueReceipt {
        let (session, _) = self.store.get_or_create_session(workspace_id, session_id);
        let session_id = session.id().to_string();

        match session.queue().enqueue_or_start(text, priority.unwrap_or(0)) {
            EnqueueOutcome::Started(command) => {
                let receipt = EnqueueReceipt {
                    session_id,
                    command_id: command.id.clone(),
                    status: ReceiptStatus::Processing,
                    queue_position: None,
                };
                self.spawn_driver(session, command);
                receipt
            }
            EnqueueOutcome::Queued {
                command,
                position,
                started,
            } => {
                if let Some(head) = started {
                    self.spawn_driver(session.clone(), head);
                }
                tracing::info!(
                    workspace_id,
                    session_id = %session_id,
                    command_id = %command.id,
                    position,
                    "Session busy, command queued"
                );
                self.emit(ServiceEvent::CommandQueued {
                    workspace_id: workspace_id.to_string(),
                    session_id: session_id.clone(),
                    command_id: command.id.clone(),
                    position,
                });
                EnqueueReceipt {
                    session_id,
                    command_id: command.id,
                    status: ReceiptStatus::Queued,
                    queue_position: Some(position),
                }
            }
        }
    }

    fn spawn_driver(&self, session: Arc<Session>, command: Command) {
        let service = self.clone();
        tokio::spawn(async move { service.drive(session, command).await });
    }

    /// Run commands until the session's queue is empty.
    async fn drive(self, session: Arc<Session>, mut command: Command) {
        loop {
            self.emit(ServiceEvent::CommandStarted {
                workspace_id: session.workspace_id().to_string(),
                session_id: session.id().to_string(),
                command_id: command.id.clone(),
            });

            let result = self.process(&session, &command).await;
            let next = session
                .queue()
                .complete_and_next(&command.id, result.is_success());

            tracing::info!(
                workspace_id = %session.workspace_id(),
                session_id = %session.id(),
                command_id = %command.id,
                state = %result.state,
                steps = result.steps,
                "Command finished"
            );
            self.emit(ServiceEvent::CommandFinished {
                workspace_id: session.workspace_id().to_string(),
                session_id: session.id().to_string(),
                command_id: command.id.clone(),
                result,
            });

            match next {
                Some(next) => command = next,
                None => break,
            }
        }
    }

    /// Run one command with the session's memory checked out. A panic inside
    /// the run fails the command; the memory is checked back in either way.
    async fn process(&self, session: &Session, command: &Command) -> ExecutionResult {
        let mut memory = session.checkout_memory();
        let outcome = AssertUnwindSafe(self.execute(session, command, &mut memory))
            .catch_unwind()
            .await;
        session.checkin_memory(memory);

        outcome.unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            tracing::error!(
                workspace_id = %session.workspace_id(),
                session_id = %session.id(),
                command_id = %command.id,
                "Command panicked: {}",
                message
            );
            ExecutionResult {
                state: AgentState::Error,
                reason: FinishReason::Failed,
                output: FALLBACK_OUTPUT.to_string(),
                steps: 0,
                provider: None,
                error: Some(format!("Command panicked: {}", message)),
            }
        })
    }

    async fn execute(
        &self,
        session: &Session,
        command: &Command,
        memory: &mut Memory,
    ) -> ExecutionResult {
        let workspace_id = session.workspace_id();

        if let Some(context) = self.knowledge_context(&command.text, workspace_id).await {
            memory.push(Message::system(format!(
                "Relevant knowledge for this workspace:\n{}",
                context
            )));
        }

        if self.streaming {
            let (tx, mut rx) = mpsc::channel(AGENT_EVENT_BUFFER);
            let events = self.events.clone();
            let workspace = workspace_id.to_string();
            let session_id = session.id().to_string();
            let command_id = command.id.clone();
            let forwarder = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    let _ = events.send(ServiceEvent::Agent {
                        workspace_id: workspace.clone(),
                        session_id: session_id.clone(),
                        command_id: command_id.clone(),
                        event,
                    });
                }
            });

            let result = self
                .executor
                .run_streaming(memory, &command.text, workspace_id, tx)
                .await;
            if let Err(e) = forwarder.await {
                tracing::warn!("Agent event forwarder failed: {}", e);
            }
            result
        } else {
            self.executor
                .run(memory, &command.text, workspace_id)
                .await
        }
    }

    async fn knowledge_context(&self, message: &str, workspace_id: &str) -> Option<String> {
        let knowledge = self.knowledge.as_ref()?;
        match knowledge.get_context(message, workspace_id).await {
            Ok(Some(context)) if !context.trim().is_empty() => Some(context),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(workspace_id, "Knowledge lookup failed: {:#}", e);
                None
            }
        }
    }

    /// Create a session (or return an existing one) and return its id.
    pub fn create_session(&self, workspace_id: &str, session_id: Option<&str>) -> String {
        let (session, _) = self.store.get_or_create_session(workspace_id, session_id);
        session.id().to_string()
    }

    pub fn get_queue_status(
        &self,
        workspace_id: &str,
        session_id: &str,
    ) -> SessionResult<QueueStatus> {
        Ok(self.session(workspace_id, session_id)?.queue().status_snapshot())
    }

    /// Cancel a pending command. Returns `false` for unknown or processing
    /// commands.
    pub fn cancel_command(
        &self,
        workspace_id: &str,
        session_id: &str,
        command_id: &str,
    ) -> SessionResult<bool> {
        let cancelled = self
            .session(workspace_id, session_id)?
            .queue()
            .cancel(command_id);
        if cancelled {
            tracing::info!(workspace_id, session_id, command_id, "Cancelled command");
        }
        Ok(cancelled)
    }

    pub fn session_messages(
        &self,
        workspace_id: &str,
        session_id: &str,
    ) -> SessionResult<Vec<Message>> {
        Ok(self.session(workspace_id, session_id)?.messages())
    }

    pub fn delete_session(&self, workspace_id: &str, session_id: &str) -> SessionResult<()> {
        self.store.delete_session(workspace_id, session_id)
    }

    pub fn delete_workspace(&self, workspace_id: &str) -> SessionResult<usize> {
        self.store.delete_workspace(workspace_id)
    }

    pub fn list_sessions(&self, workspace_id: &str) -> Vec<SessionInfo> {
        self.store.list_sessions(workspace_id)
    }

    pub fn list_workspaces(&self) -> Vec<Workspace> {
        self.store.list_workspaces()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
