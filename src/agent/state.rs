//! Executor state machine and run results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Output returned when a run produced no plain assistant answer.
pub const FALLBACK_OUTPUT: &str = "Task completed without a final response.";

/// Executor state. Moves only forward: `Idle -> Running -> Finished | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Idle,
    Running,
    Finished,
    Error,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model answered without calling a tool
    Completed,
    /// The terminate tool was called or named
    Terminated,
    MaxStepsReached,
    /// Transport, routing or token-limit failure
    Failed,
}

/// Result of one command run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub state: AgentState,
    pub reason: FinishReason,
    /// Last plain assistant answer of this run, or [`FALLBACK_OUTPUT`]
    pub output: String,
    /// Think/act steps executed
    pub steps: u32,
    /// Provider used for the last model call
    pub provider: Option<String>,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.state == AgentState::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!AgentState::Idle.is_terminal());
        assert!(!AgentState::Running.is_terminal());
        assert!(AgentState::Finished.is_terminal());
        assert!(AgentState::Error.is_terminal());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&AgentState::Finished).unwrap(),
            "\"FINISHED\""
        );
        assert_eq!(AgentState::Error.to_string(), "ERROR");
        assert_eq!(
            serde_json::to_string(&FinishReason::MaxStepsReached).unwrap(),
            "\"max_steps_reached\""
        );
    }
}
