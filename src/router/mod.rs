//! Provider routing.
//!
//! Classifies each message into a [`ContextType`], picks a provider for it from
//! the configured routing rules and keeps rolling [`ProviderMetrics`] that feed
//! back into later selections.
//!
//! # Example
//!
//! ```no_run
//! use ouds::config::ConfigurationLoader;
//! use ouds::router::ProviderRouter;
//!
//! let config = ConfigurationLoader::get_default_config();
//! let router = ProviderRouter::from_config(&config).unwrap();
//!
//! let selection = router.route("write a function that parses CSV", &[], "default").unwrap();
//! println!("{} ({:.2})", selection.provider, selection.confidence);
//!
//! router.record_outcome(&selection.provider, true, 1200, 350);
//! ```

mod context;
mod metrics;
mod router;

pub use context::{classify, ContextType};
pub use metrics::ProviderMetrics;
pub use router::{
    ProviderRouter, ProviderStats, RoutingRule, Selection, BEST_AVAILABLE_CONFIDENCE,
};

use thiserror::Error;

/// Errors raised while building a router or selecting a provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    /// No provider is enabled, nothing can serve the request
    #[error("No provider is enabled")]
    NoProviderEnabled,

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("Duplicate provider '{0}'")]
    DuplicateProvider(String),

    #[error("Unknown context type '{0}'")]
    UnknownContext(String),
}

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;
