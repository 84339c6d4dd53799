//! Events emitted while a run streams.

use serde::{Deserialize, Serialize};

use super::state::AgentState;

/// Progress of a streaming run, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A think/act step started
    Step { step: u32, max_steps: u32 },
    Status { state: AgentState },
    /// Answer text fragment
    Content { text: String },
    /// Raw tool-call fragment as received from the provider
    ToolCallFragment {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    Error { message: String },
    /// Final output of the run, always the last event
    Final { output: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(AgentEvent::Step {
            step: 1,
            max_steps: 30,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "step", "step": 1, "max_steps": 30}));

        let json = serde_json::to_value(AgentEvent::Status {
            state: AgentState::Running,
        })
        .unwrap();
        assert_eq!(json["state"], "RUNNING");
    }
}
