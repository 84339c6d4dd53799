//! Workspace and session registry.
//!
//! Workspaces and sessions live in two flat maps keyed by id and by
//! `(workspace_id, session_id)`. Each [`Session`] owns its command queue and
//! its conversation memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::Memory;
use crate::provider::Message;

use super::queue::CommandQueue;
use super::{SessionError, SessionResult};

/// Workspace that cannot be deleted.
pub const DEFAULT_WORKSPACE: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub session_count: usize,
}

impl Workspace {
    fn new(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            created_at: now,
            last_activity: now,
            session_count: 0,
        }
    }
}

/// Serializable summary of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub workspace_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
    pub processing: bool,
    pub pending_commands: usize,
}

#[derive(Debug)]
struct SessionState {
    last_activity: DateTime<Utc>,
    message_count: usize,
    /// `None` while a run has the memory checked out
    memory: Option<Memory>,
}

/// One conversation inside a workspace.
#[derive(Debug)]
pub struct Session {
    id: String,
    workspace_id: String,
    created_at: DateTime<Utc>,
    queue: CommandQueue,
    state: Mutex<SessionState>,
}

impl Session {
    fn new(workspace_id: &str, id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            workspace_id: workspace_id.to_string(),
            created_at: now,
            queue: CommandQueue::new(id),
            state: Mutex::new(SessionState {
                last_activity: now,
                message_count: 0,
                memory: Some(Memory::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.lock().last_activity
    }

    pub fn touch(&self) {
        self.lock().last_activity = Utc::now();
    }

    pub fn info(&self) -> SessionInfo {
        let (last_activity, message_count) = {
            let state = self.lock();
            (state.last_activity, state.message_count)
        };
        SessionInfo {
            id: self.id.clone(),
            workspace_id: self.workspace_id.clone(),
            created_at: self.created_at,
            last_activity,
            message_count,
            processing: self.queue.is_processing(),
            pending_commands: self.queue.pending_count(),
        }
    }

    /// Take the memory for the duration of a run.
    ///
    /// The queue runs one command per session at a time, so the memory is
    /// normally present; if it is not, the run starts from an empty one.
    pub fn checkout_memory(&self) -> Memory {
        self.lock().memory.take().unwrap_or_else(|| {
            tracing::warn!(session_id = %self.id, "Memory already checked out, starting empty");
            Memory::new()
        })
    }

    pub fn checkin_memory(&self, memory: Memory) {
        let mut state = self.lock();
        state.message_count = memory.len();
        state.last_activity = Utc::now();
        state.memory = Some(memory);
    }

    /// Copy of the conversation, empty while a run has it checked out.
    pub fn messages(&self) -> Vec<Message> {
        self.lock()
            .memory
            .as_ref()
            .map(|m| m.messages().to_vec())
            .unwrap_or_default()
    }
}

type SessionKey = (String, String);

fn key(workspace_id: &str, session_id: &str) -> SessionKey {
    (workspace_id.to_string(), session_id.to_string())
}

/// In-memory registry of workspaces and their sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    workspaces: RwLock<HashMap<String, Workspace>>,
    sessions: RwLock<HashMap<SessionKey, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a workspace, creating it on first use.
    pub fn get_or_create_workspace(&self, workspace_id: &str) -> Workspace {
        let mut workspaces = self
            .workspaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        workspaces
            .entry(workspace_id.to_string())
            .or_insert_with(|| {
                tracing::info!(workspace_id, "Created workspace");
                Workspace::new(workspace_id)
            })
            .clone()
    }

    pub fn workspace(&self, workspace_id: &str) -> Option<Workspace> {
        self.workspaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(workspace_id)
            .cloned()
    }

    fn touch_workspace(&self, workspace_id: &str, session_delta: isize) {
        let mut workspaces = self
            .workspaces
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(ws) = workspaces.get_mut(workspace_id) {
            ws.last_activity = Utc::now();
            ws.session_count = ws.session_count.saturating_add_signed(session_delta);
        }
    }

    /// Look up a session, creating it (and its workspace) if needed. A
    /// missing id gets a fresh UUID. Returns the session and whether it was
    /// created by this call.
    pub fn get_or_create_session(
        &self,
        workspace_id: &str,
        session_id: Option<&str>,
    ) -> (Arc<Session>, bool) {
        self.get_or_create_workspace(workspace_id);
        let session_id = session_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let (session, created) = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            match sessions.get(&key(workspace_id, &session_id)) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let session = Arc::new(Session::new(workspace_id, &session_id));
                    sessions.insert(key(workspace_id, &session_id), session.clone());
                    (session, true)
                }
            }
        };

        session.touch();
        self.touch_workspace(workspace_id, if created { 1 } else { 0 });
        if created {
            tracing::info!(workspace_id, session_id = %session_id, "Created session");
        }
        (session, created)
    }

    pub fn session(&self, workspace_id: &str, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key(workspace_id, session_id))
            .cloned()
    }

    pub fn delete_session(&self, workspace_id: &str, session_id: &str) -> SessionResult<()> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key(workspace_id, session_id));
        match removed {
            Some(_) => {
                self.touch_workspace(workspace_id, -1);
                tracing::info!(workspace_id, session_id, "Deleted session");
                Ok(())
            }
            None => Err(SessionError::SessionNotFound {
                workspace_id: workspace_id.to_string(),
                session_id: session_id.to_string(),
            }),
        }
    }

    /// Delete a workspace and every session in it. Returns the number of
    /// sessions removed.
    pub fn delete_workspace(&self, workspace_id: &str) -> SessionResult<usize> {
        if workspace_id == DEFAULT_WORKSPACE {
            return Err(SessionError::ProtectedWorkspace(workspace_id.to_string()));
        }
        let removed = self
            .workspaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(workspace_id);
        if removed.is_none() {
            return Err(SessionError::WorkspaceNotFound(workspace_id.to_string()));
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|(ws, _), _| ws != workspace_id);
        let count = before - sessions.len();
        tracing::info!(workspace_id, sessions = count, "Deleted workspace");
        Ok(count)
    }

    /// Sessions of a workspace, most recently active first.
    pub fn list_sessions(&self, workspace_id: &str) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((ws, _), _)| ws == workspace_id)
            .map(|(_, s)| s.clone())
            .collect();

        let mut infos: Vec<SessionInfo> = sessions.iter().map(|s| s.info()).collect();
        infos.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        infos
    }

    /// Workspaces, most recently active first.
    pub fn list_workspaces(&self) -> Vec<Workspace> {
        let mut workspaces: Vec<Workspace> = self
            .workspaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        workspaces.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        workspaces
    }
}
