use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("media engine exited with status {status:?}: {stderr}")]
    Transform { status: Option<i32>, stderr: String },
    #[error("media engine timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to start media engine {binary}: {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

impl EngineError {
    /// Diagnostic text reported by the engine itself, when there is any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            EngineError::Transform { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
