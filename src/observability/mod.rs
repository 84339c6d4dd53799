//! Observability utilities for the orchestration service.
//!
//! Structured console logging goes through `tracing`; [`init_tracing`] installs a
//! `tracing-subscriber` formatter for binaries and tests that want one. The
//! [`Logger`] keeps a markdown transcript of agent runs.
//!
//! # Example
//!
//! ```no_run
//! use ouds::observability::{init_tracing, Logger};
//! use std::collections::HashMap;
//!
//! init_tracing(Some("debug"));
//!
//! let logger = Logger::new(None, Some("DEBUG")).unwrap();
//! logger.log_run_start("default", "summarize the report", &HashMap::new()).unwrap();
//! logger.log_completion("FINISHED", "Here is the summary").unwrap();
//! ```

pub mod logger;

pub use logger::Logger;

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `level` (default `info`) is used.
/// Calling it twice is harmless, the second install is ignored.
pub fn init_tracing(level: Option<&str>) {
    let fallback = level.unwrap_or("info").to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
