//! TOML configuration parsing and management.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub agent: AgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Model providers available to the router
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Routing rules keyed by context type (`code_generation`, `general_chat`, ...)
    #[serde(default)]
    pub routing: HashMap<String, RoutingRuleConfig>,
}

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    /// Upper bound on think/act iterations per command
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// System prompt sent ahead of the conversation on every request
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Instruction appended as a user message before each think step
    #[serde(default)]
    pub next_step_prompt: Option<String>,
    /// Tool choice policy: "auto", "required" or "none"
    #[serde(default = "default_tool_choice")]
    pub tool_choice: String,
    /// Run commands with the streaming executor
    #[serde(default)]
    pub streaming: bool,
    /// Number of recent messages kept when memory is truncated after a token-limit error
    #[serde(default = "default_keep_recent")]
    pub truncate_keep_recent: usize,
}

fn default_max_steps() -> u32 {
    30
}

fn default_tool_choice() -> String {
    "auto".to_string()
}

fn default_keep_recent() -> usize {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Markdown interaction log. No file log when unset.
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            log_level: default_log_level(),
        }
    }
}

/// Execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Transport retries after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay of the exponential backoff between transport retries
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

/// A configured model provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Full chat-completions URL
    pub endpoint: String,
    /// API key, `${ENV_VAR}` placeholders are resolved by [`super::EnvironmentLoader`]
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_provider_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub cost_per_token: f64,
    /// Requests per minute
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_provider_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_rate_limit() -> u32 {
    60
}

fn default_timeout() -> u64 {
    30
}

fn default_enabled() -> bool {
    true
}

/// Routing rule for one context type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRuleConfig {
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    pub confidence_threshold: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Configuration {
    /// Check cross references between providers and routing rules.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_steps == 0 {
            bail!("agent.max_steps must be greater than 0");
        }

        let mut ids = HashSet::new();
        for provider in &self.providers {
            if !ids.insert(provider.id.as_str()) {
                bail!("Duplicate provider id '{}'", provider.id);
            }
        }

        for (context, rule) in &self.routing {
            if !(0.0..=1.0).contains(&rule.confidence_threshold) {
                bail!(
                    "Routing rule '{}' has confidence_threshold {} outside [0, 1]",
                    context,
                    rule.confidence_threshold
                );
            }
            for provider in std::iter::once(&rule.primary).chain(rule.fallbacks.iter()) {
                if !ids.contains(provider.as_str()) {
                    bail!(
                        "Routing rule '{}' references unknown provider '{}'",
                        context,
                        provider
                    );
                }
            }
        }

        Ok(())
    }

    /// Look up a provider by id.
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }
}

/// Loads and manages TOML configuration.
#[derive(Debug)]
pub struct ConfigurationLoader {
    pub config_path: PathBuf,
    pub config: Configuration,
}

impl ConfigurationLoader {
    /// Initialize configuration loader.
    ///
    /// # Arguments
    /// * `config_path` - Path to TOML config file. If None, uses `config/ouds.toml`
    ///   when present and the built-in defaults otherwise.
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config_path = config_path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("config/ouds.toml"));

        let config = if config_path.exists() {
            Self::load_config(&config_path)?
        } else {
            Self::get_default_config()
        };

        config
            .validate()
            .with_context(|| format!("Invalid configuration: {}", config_path.display()))?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Create a configuration loader from a pre-parsed Configuration.
    pub fn from_config(config: Configuration) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config_path: PathBuf::from("config/ouds.toml"),
            config,
        })
    }

    /// Load configuration from TOML file.
    fn load_config(path: &Path) -> Result<Configuration> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    /// Get default configuration.
    ///
    /// Three providers and four routing rules, mirroring the stock deployment.
    pub fn get_default_config() -> Configuration {
        let provider = |id: &str, name: &str, endpoint: &str, key: &str, model: &str, cost: f64, rate: u32| {
            ProviderConfig {
                id: id.to_string(),
                name: name.to_string(),
                endpoint: endpoint.to_string(),
                api_key: key.to_string(),
                model: model.to_string(),
                max_tokens: 4096,
                temperature: 0.7,
                cost_per_token: cost,
                rate_limit: rate,
                timeout: 30,
                enabled: true,
            }
        };

        let rule = |primary: &str, fallbacks: &[&str], threshold: f64, retries: u32| {
            RoutingRuleConfig {
                primary: primary.to_string(),
                fallbacks: fallbacks.iter().map(|f| f.to_string()).collect(),
                confidence_threshold: threshold,
                max_retries: retries,
            }
        };

        let mut routing = HashMap::new();
        routing.insert(
            "code_generation".to_string(),
            rule(
                "anthropic_claude_sonnet",
                &["openai_gpt4", "openai_gpt4_turbo"],
                0.8,
                3,
            ),
        );
        routing.insert(
            "data_analysis".to_string(),
            rule(
                "openai_gpt4",
                &["anthropic_claude_sonnet", "openai_gpt4_turbo"],
                0.7,
                3,
            ),
        );
        routing.insert(
            "creative_writing".to_string(),
            rule(
                "anthropic_claude_sonnet",
                &["openai_gpt4_turbo", "openai_gpt4"],
                0.9,
                2,
            ),
        );
        routing.insert(
            "general_chat".to_string(),
            rule(
                "openai_gpt4_turbo",
                &["anthropic_claude_sonnet", "openai_gpt4"],
                0.6,
                3,
            ),
        );

        Configuration {
            agent: AgentConfig {
                name: "ouds".to_string(),
                max_steps: default_max_steps(),
                system_prompt: None,
                next_step_prompt: None,
                tool_choice: default_tool_choice(),
                streaming: false,
                truncate_keep_recent: default_keep_recent(),
            },
            logging: LoggingConfig::default(),
            execution: ExecutionConfig::default(),
            providers: vec![
                provider(
                    "openai_gpt4",
                    "GPT-4",
                    "https://api.openai.com/v1/chat/completions",
                    "${OPENAI_API_KEY}",
                    "gpt-4",
                    0.00003,
                    60,
                ),
                provider(
                    "openai_gpt4_turbo",
                    "GPT-4 Turbo",
                    "https://api.openai.com/v1/chat/completions",
                    "${OPENAI_API_KEY}",
                    "gpt-4-turbo-preview",
                    0.00001,
                    100,
                ),
                provider(
                    "anthropic_claude_sonnet",
                    "Claude 3.5 Sonnet",
                    "https://api.anthropic.com/v1/chat/completions",
                    "${ANTHROPIC_API_KEY}",
                    "claude-3-5-sonnet-20241022",
                    0.000015,
                    50,
                ),
            ],
            routing,
        }
    }

    /// Get configuration value by dot-notation key.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match key {
            "agent.name" => Some(self.config.agent.name.clone()),
            "agent.tool_choice" => Some(self.config.agent.tool_choice.clone()),
            "agent.system_prompt" => self.config.agent.system_prompt.clone(),
            "agent.next_step_prompt" => self.config.agent.next_step_prompt.clone(),
            "logging.log_file" => self.config.logging.log_file.clone(),
            "logging.log_level" => Some(self.config.logging.log_level.clone()),
            _ => None,
        }
    }

    /// Get numeric configuration value.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match key {
            "agent.max_steps" => Some(self.config.agent.max_steps as u64),
            "agent.truncate_keep_recent" => Some(self.config.agent.truncate_keep_recent as u64),
            "execution.max_retries" => Some(self.config.execution.max_retries as u64),
            "execution.retry_base_delay_ms" => Some(self.config.execution.retry_base_delay_ms),
            _ => None,
        }
    }

    /// Get boolean configuration value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match key {
            "agent.streaming" => Some(self.config.agent.streaming),
            _ => None,
        }
    }
}
