use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

/// Coordinator settings, loadable from TOML.
///
/// ```toml
/// [rollback]
/// limit = "unbounded"
///
/// [rollback.backoff]
/// strategy = "exponential"
/// initial_ms = 100
/// max_ms = 5000
/// multiplier = 2
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SagaConfig {
    /// Policy used by `rollback_with_unbounded_retries`; its limit is
    /// ignored there, its backoff is not.
    pub rollback: RetryPolicy,
}

impl SagaConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if `content` is not a valid configuration.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_toml_file(path)
    }
}

/// Reads and parses a TOML file into `T`.
///
/// # Errors
///
/// Returns `ConfigError::Read` if the file cannot be read and
/// `ConfigError::Parse` if its content does not describe a `T`.
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{Backoff, RetryLimit};

    #[test]
    fn empty_config_uses_defaults() -> Result<(), ConfigError> {
        let config = SagaConfig::from_toml_str("")?;

        assert_eq!(config.rollback.limit, RetryLimit::Unbounded);
        assert_eq!(config.rollback.backoff, Backoff::default());
        Ok(())
    }

    #[test]
    fn rollback_section_overrides_backoff() -> Result<(), ConfigError> {
        let config = SagaConfig::from_toml_str(
            r#"
            [rollback.backoff]
            strategy = "none"
            "#,
        )?;

        assert_eq!(config.rollback.backoff, Backoff::None);
        Ok(())
    }

    #[test]
    fn invalid_config_is_a_parse_error() {
        let err = SagaConfig::from_toml_str("rollback = 3").expect_err("wrong shape");

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = SagaConfig::load(Path::new("/nonexistent/txsaga.toml")).expect_err("no file");

        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
