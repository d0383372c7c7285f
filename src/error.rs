// src/error.rs

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegressError>;

#[derive(Debug, Error)]
pub enum RegressError {
    #[error("I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed artifact {context}: {details}")]
    Artifact { context: String, details: String },

    #[error("git: {0}")]
    Git(#[from] git2::Error),

    #[error("invalid configuration: {details}")]
    Config { details: String },

    #[error("failed to launch {binary}: {source}")]
    Launch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{binary} did not finish within {timeout:?}")]
    Timeout { binary: PathBuf, timeout: Duration },

    #[error("cook of {spec} failed: {details}")]
    Cook { spec: String, details: String },
}

impl RegressError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io { path: path.as_ref().to_path_buf(), source }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json { context: context.into(), source }
    }
}
