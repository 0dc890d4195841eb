//! Error types for the rebalancer.

use std::path::PathBuf;

use allocbook::ValidationError;

/// All errors that can occur during a rebalancer run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("input file error: {0}")]
    Input(String),

    #[error("failed to read input file {path}: {source}")]
    InputRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse input JSON: {0}")]
    InputParse(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

impl Error {
    /// True for errors caused by rejected portfolio input rather than I/O.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::Input(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
