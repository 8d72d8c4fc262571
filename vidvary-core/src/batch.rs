use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::archive::{write_zip, ArchiveError, ARCHIVE_NAME};
use crate::pipeline::{PipelineError, PipelineResult, Preset, VariantOutput, VariantPipeline};

#[derive(Debug)]
pub struct VariantFailure {
    pub preset: Preset,
    pub error: PipelineError,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("only {succeeded} of {expected} variants were produced")]
    Incomplete {
        succeeded: usize,
        expected: usize,
        failures: Vec<VariantFailure>,
    },
    #[error("failed to package variants: {0}")]
    Archive(#[from] ArchiveError),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type BatchResult<T> = Result<T, BatchError>;

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub archive_path: PathBuf,
    pub archive_size_bytes: u64,
    pub variants: Vec<VariantOutput>,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}

/// Runs every preset against the same input and packages the results.
#[derive(Clone)]
pub struct BatchOrchestrator {
    pipeline: VariantPipeline,
    parallel: bool,
}

impl BatchOrchestrator {
    pub fn new(pipeline: VariantPipeline) -> Self {
        Self {
            pipeline,
            parallel: false,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub async fn run(&self, input: &Path, output_dir: &Path) -> BatchResult<BatchReport> {
        let started = Instant::now();
        fs::create_dir_all(output_dir)
            .await
            .map_err(|source| BatchError::Io {
                source,
                path: output_dir.to_path_buf(),
            })?;

        let jobs: Vec<(Preset, PathBuf)> = Preset::ALL
            .into_iter()
            .map(|preset| (preset, output_dir.join(preset.output_file_name())))
            .collect();

        let outcomes = if self.parallel {
            join_all(jobs.iter().map(|(preset, output)| self.run_one(input, output, *preset)))
                .await
        } else {
            let mut outcomes = Vec::with_capacity(jobs.len());
            for (preset, output) in &jobs {
                outcomes.push(self.run_one(input, output, *preset).await);
            }
            outcomes
        };

        let mut variants = Vec::new();
        let mut failures = Vec::new();
        for (preset, outcome) in outcomes {
            match outcome {
                Ok(variant) => variants.push(variant),
                Err(error) => {
                    warn!(
                        preset = preset.name(),
                        stage = %error.stage(),
                        diagnostics = error.diagnostics().unwrap_or(""),
                        error = %error,
                        "variant failed"
                    );
                    failures.push(VariantFailure { preset, error });
                }
            }
        }

        if !failures.is_empty() {
            discard(&variants).await;
            return Err(BatchError::Incomplete {
                succeeded: variants.len(),
                expected: jobs.len(),
                failures,
            });
        }

        let archive_path = output_dir.join(ARCHIVE_NAME);
        let entries: Vec<PathBuf> = variants.iter().map(|v| v.path.clone()).collect();
        let destination = archive_path.clone();
        let archive_size_bytes = tokio::task::spawn_blocking(move || write_zip(&entries, &destination))
            .await
            .unwrap_or_else(|join| {
                Err(ArchiveError::Io {
                    source: std::io::Error::new(std::io::ErrorKind::Other, join),
                    path: PathBuf::from(ARCHIVE_NAME),
                })
            })?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            archive = %archive_path.display(),
            archive_size_bytes,
            variants = variants.len(),
            elapsed_ms,
            "variant batch packaged"
        );
        Ok(BatchReport {
            archive_path,
            archive_size_bytes,
            variants,
            elapsed_ms,
            completed_at: Utc::now(),
        })
    }

    async fn run_one(
        &self,
        input: &Path,
        output: &Path,
        preset: Preset,
    ) -> (Preset, PipelineResult<VariantOutput>) {
        let outcome = self
            .pipeline
            .produce_variant(input, output, Some(preset))
            .await;
        (preset, outcome)
    }
}

/// Successful variants of an incomplete batch are never offered on their own.
async fn discard(variants: &[VariantOutput]) {
    for variant in variants {
        if let Err(err) = fs::remove_file(&variant.path).await {
            warn!(path = %variant.path.display(), error = %err, "failed to discard variant");
        }
    }
}
