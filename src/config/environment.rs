//! Environment variable loading and placeholder resolution.

use regex::{Captures, Regex};
use std::env;
use std::path::Path;
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

/// Loads environment variables from a .env file and resolves `${VAR}` placeholders.
#[derive(Debug, Clone)]
pub struct EnvironmentLoader {
    env_file: Option<String>,
}

impl EnvironmentLoader {
    /// Initialize the environment loader.
    ///
    /// # Arguments
    /// * `env_file` - Path to .env file. Only an explicitly provided file is loaded.
    pub fn new(env_file: Option<&Path>) -> Self {
        if let Some(path) = env_file {
            if path.exists() {
                if let Err(e) = dotenv::from_path(path) {
                    tracing::warn!("Failed to load .env file {}: {}", path.display(), e);
                }
            }
        }

        Self {
            env_file: env_file.map(|p| p.to_string_lossy().to_string()),
        }
    }

    /// The .env file this loader was created with, if any.
    pub fn env_file(&self) -> Option<&str> {
        self.env_file.as_deref()
    }

    /// Replace every `${VAR}` in `value` with the variable's value.
    ///
    /// Unset variables resolve to an empty string.
    pub fn resolve(&self, value: &str) -> String {
        placeholder_pattern()
            .replace_all(value, |caps: &Captures| env::var(&caps[1]).unwrap_or_default())
            .into_owned()
    }

    /// Default provider override from `OUDS_DEFAULT_PROVIDER`.
    pub fn default_provider(&self) -> Option<String> {
        env::var("OUDS_DEFAULT_PROVIDER").ok()
    }
}

impl Default for EnvironmentLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_placeholders() {
        env::set_var("OUDS_TEST_KEY_A", "secret");
        let loader = EnvironmentLoader::default();
        assert_eq!(loader.resolve("${OUDS_TEST_KEY_A}"), "secret");
        assert_eq!(loader.resolve("Bearer ${OUDS_TEST_KEY_A}!"), "Bearer secret!");
        assert_eq!(loader.resolve("plain"), "plain");
        env::remove_var("OUDS_TEST_KEY_A");
    }

    #[test]
    fn test_unset_placeholder_is_empty() {
        let loader = EnvironmentLoader::default();
        assert_eq!(loader.resolve("${OUDS_TEST_DEFINITELY_UNSET}"), "");
    }

    #[test]
    fn test_env_file_loading() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "OUDS_TEST_FROM_DOTENV=loaded").unwrap();

        let loader = EnvironmentLoader::new(Some(file.path()));
        assert!(loader.env_file().is_some());
        assert_eq!(loader.resolve("${OUDS_TEST_FROM_DOTENV}"), "loaded");
        env::remove_var("OUDS_TEST_FROM_DOTENV");
    }
}
