//! Tool schemas and the tool-choice policy sent with each request.

use serde::{Deserialize, Serialize};

/// Tool schema advertised to the model.
///
/// Name, description and a JSON Schema for the parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Check that the parameters are an object schema with a `type` field.
    pub fn validate(&self) -> anyhow::Result<()> {
        let Some(obj) = self.parameters.as_object() else {
            anyhow::bail!("Tool '{}' parameters must be a JSON object (schema)", self.name);
        };
        if !obj.contains_key("type") {
            anyhow::bail!("Tool '{}' parameters schema must have 'type' field", self.name);
        }
        Ok(())
    }

    /// OpenAI `tools[]` entry.
    pub fn to_openai(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Tool choice option for controlling model tool usage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// Let the model decide whether to use tools
    #[default]
    Auto,
    /// Force the model to use a tool
    Required,
    /// Prevent the model from using tools
    None,
    /// Force a specific tool to be used
    Specific { name: String },
}

impl ToolChoice {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Auto => "auto",
            Self::Required => "required",
            Self::None => "none",
            Self::Specific { .. } => "specific",
        }
    }

    /// Parse the configured policy. Anything other than `auto`, `required`
    /// or `none` names a specific tool.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "" | "auto" => Self::Auto,
            "required" => Self::Required,
            "none" => Self::None,
            _ => Self::Specific {
                name: value.trim().to_string(),
            },
        }
    }

    /// OpenAI `tool_choice` value.
    pub fn to_openai(&self) -> serde_json::Value {
        match self {
            Self::Specific { name } => serde_json::json!({
                "type": "function",
                "function": { "name": name }
            }),
            other => serde_json::Value::String(other.as_str().to_string()),
        }
    }
}
