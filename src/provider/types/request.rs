//! Chat completion requests, responses and stream chunks.

use super::message::Message;
use super::tools::{ToolChoice, ToolDefinition};
use serde::{Deserialize, Serialize};

/// A chat completion request addressed to one configured provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Id of the provider the router selected
    pub provider: String,
    /// Model to use (None = provider default)
    pub model: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub max_tokens: Option<u32>,
    /// Temperature for sampling (0.0 = deterministic, 2.0 = very random)
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(provider: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            provider: provider.into(),
            model: None,
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Validate the request
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                anyhow::bail!("Temperature must be between 0.0 and 2.0");
            }
        }

        if self.max_tokens == Some(0) {
            anyhow::bail!("Max tokens must be greater than 0");
        }

        if self.messages.is_empty() {
            anyhow::bail!("Request must contain at least one message");
        }

        for tool in &self.tools {
            tool.validate()?;
        }

        Ok(())
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// A complete (non-streaming) answer.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Assistant message, possibly carrying tool calls
    pub message: Message,
    pub usage: Option<Usage>,
}

/// One fragment of a streamed answer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text delta
    Content(String),
    /// Partial tool call. Fragments sharing an `index` belong to the same call;
    /// `name` and `arguments` pieces are appended in arrival order.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    /// End of stream
    Done { usage: Option<Usage> },
}
