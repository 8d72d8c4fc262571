use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;

/// Position in the fixed four-stage variant sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    MetadataStrip,
    Preset,
    SaturationBoost,
    HashPerturbation,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::MetadataStrip => "metadata-strip",
            Stage::Preset => "preset",
            Stage::SaturationBoost => "saturation-boost",
            Stage::HashPerturbation => "hash-perturbation",
            Stage::Publish => "publish",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Engine {
        stage: Stage,
        #[source]
        source: EngineError,
    },
    #[error("{stage} stage failed at {path}: {source}")]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Engine { stage, .. } | PipelineError::Io { stage, .. } => *stage,
        }
    }

    /// Engine diagnostics when the failure came from a transform invocation.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            PipelineError::Engine { source, .. } => source.diagnostics(),
            PipelineError::Io { .. } => None,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
