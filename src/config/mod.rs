//! Configuration management for the orchestration service.
//!
//! This module provides configuration loading through TOML files and
//! environment variable management via `.env` files.
//!
//! # Example
//!
//! ```no_run
//! use ouds::config::{ConfigurationLoader, EnvironmentLoader};
//! use std::path::Path;
//!
//! // Load environment variables
//! let env = EnvironmentLoader::new(Some(Path::new(".env")));
//!
//! // Load configuration from TOML
//! let config_loader = ConfigurationLoader::new(Some(Path::new("config/ouds.toml"))).unwrap();
//! let config = &config_loader.config;
//!
//! println!("Max steps: {}", config.agent.max_steps);
//! for provider in &config.providers {
//!     println!("{} -> {}", provider.id, env.resolve(&provider.api_key).len());
//! }
//! ```

pub mod config;
pub mod environment;

// Re-export main types for convenience
pub use self::config::{
    AgentConfig, Configuration, ConfigurationLoader, ExecutionConfig, LoggingConfig,
    ProviderConfig, RoutingRuleConfig,
};
pub use self::environment::EnvironmentLoader;
