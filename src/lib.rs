//! OUDS - Multi-tenant agent orchestration
//!
//! OUDS provides a set of feature-gated modules for serving a tool-calling
//! LLM agent to many isolated workspaces and sessions:
//!
//! - **`config`** - TOML configuration and environment loading
//! - **`observability`** - Tracing setup and markdown run logs
//! - **`provider`** - OpenAI-compatible chat transport, streaming and retries
//! - **`tools`** - Tool trait, registry and the built-in `terminate` tool
//! - **`router`** - Context classification and confidence-based provider selection
//! - **`agent`** - The think/act executor, blocking and streaming
//! - **`session`** - Workspace/session registry, per-session command queues and the service facade
//!
//! # Features
//!
//! Enable the features you need in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! ouds = { version = "0.3", features = ["router"] }
//! # Or enable everything:
//! ouds = { version = "0.3", features = ["all"] }
//! ```
//!
//! # Example: Running the service
//!
//! ```ignore
//! use ouds::config::{ConfigurationLoader, EnvironmentLoader};
//! use ouds::session::AgentService;
//! use std::path::Path;
//!
//! let env = EnvironmentLoader::new(None);
//! let loader = ConfigurationLoader::new(Some(Path::new("config/ouds.toml")))?;
//! ouds::observability::init_tracing(Some(&loader.config.logging.log_level));
//!
//! let service = AgentService::from_config(&loader.config, &env)?;
//! let mut events = service.subscribe();
//!
//! let receipt = service.enqueue_or_run("acme", None, "write a sorting function in rust", None);
//! println!("{} is {:?}", receipt.command_id, receipt.status);
//! while let Ok(event) = events.recv().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```
//!
//! # Example: Routing only
//!
//! ```ignore
//! use ouds::config::ConfigurationLoader;
//! use ouds::router::ProviderRouter;
//!
//! let config = ConfigurationLoader::get_default_config();
//! let router = ProviderRouter::from_config(&config)?;
//! let selection = router.route("analyze this dataset", &[], "default")?;
//! println!("{} ({:.2})", selection.provider, selection.confidence);
//! ```

/// Configuration management (enabled with the `config` feature)
#[cfg(feature = "config")]
pub mod config;

/// Observability utilities (enabled with the `observability` feature)
#[cfg(feature = "observability")]
pub mod observability;

/// Chat transport abstraction (enabled with the `provider` feature)
#[cfg(feature = "provider")]
pub mod provider;

/// Tool registry (enabled with the `tools` feature)
#[cfg(feature = "tools")]
pub mod tools;

/// Provider routing (enabled with the `router` feature)
#[cfg(feature = "router")]
pub mod router;

/// Agent executor (enabled with the `agent` feature)
#[cfg(feature = "agent")]
pub mod agent;

/// Sessions, queues and the service facade (enabled with the `session` feature)
#[cfg(feature = "session")]
pub mod session;

/// Prelude module for convenient imports
pub mod prelude {
    #[cfg(feature = "config")]
    pub use crate::config::{Configuration, ConfigurationLoader, EnvironmentLoader};

    #[cfg(feature = "observability")]
    pub use crate::observability::Logger;

    #[cfg(feature = "provider")]
    pub use crate::provider::{
        ChatRequest, ChatResponse, ChatTransport, Message, ProviderError, Role, StreamChunk,
        ToolCall, ToolChoice, ToolDefinition,
    };

    #[cfg(feature = "tools")]
    pub use crate::tools::{Tool, ToolError, ToolRegistry};

    #[cfg(feature = "router")]
    pub use crate::router::{ContextType, ProviderRouter, RouterError, Selection};

    #[cfg(feature = "agent")]
    pub use crate::agent::{
        AgentEvent, AgentExecutor, AgentState, ExecutionResult, ExecutorConfig, Memory,
    };

    #[cfg(feature = "session")]
    pub use crate::session::{
        AgentService, CommandQueue, EnqueueReceipt, KnowledgeSource, ServiceEvent, SessionStore,
    };
}
