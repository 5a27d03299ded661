use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building, loading or validating a [`DetectionConfig`](crate::DetectionConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("failed to access config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[cfg(feature = "serde")]
    #[error("invalid TOML configuration: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[cfg(feature = "serde")]
    #[error("failed to serialize configuration as TOML: {0}")]
    TomlWrite(#[from] toml::ser::Error),
    #[cfg(feature = "serde")]
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn out_of_range(key: &'static str, value: impl ToString, expected: &'static str) -> Self {
        ConfigError::OutOfRange {
            key,
            value: value.to_string(),
            expected,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
