use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session '{session_id}' not found in workspace '{workspace_id}'")]
    SessionNotFound {
        workspace_id: String,
        session_id: String,
    },

    #[error("Workspace '{0}' not found")]
    WorkspaceNotFound(String),

    #[error("Workspace '{0}' is protected and cannot be deleted")]
    ProtectedWorkspace(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Command '{command_id}' is not the processing command")]
    StaleCompletion { command_id: String },
}

pub type SessionResult<T> = Result<T, SessionError>;
