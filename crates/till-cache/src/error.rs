//! Cache error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The network request failed before a response arrived.
    #[error("Network error: {0}")]
    Network(String),

    /// The cache storage could not be read or written.
    #[error("Cache storage error: {0}")]
    Storage(String),

    /// A precache asset could not be fetched during install.
    #[error("Install failed for {path}: {reason}")]
    InstallFailed { path: String, reason: String },

    /// The manifest could not be loaded or is invalid.
    #[error("Invalid cache manifest: {0}")]
    Manifest(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Network(err.to_string())
    }
}

impl From<url::ParseError> for CacheError {
    fn from(err: url::ParseError) -> Self {
        CacheError::Manifest(err.to_string())
    }
}

impl From<toml::de::Error> for CacheError {
    fn from(err: toml::de::Error) -> Self {
        CacheError::Manifest(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Manifest(err.to_string())
    }
}
