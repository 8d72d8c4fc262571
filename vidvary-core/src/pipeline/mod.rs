mod error;
mod perturb;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use hex::encode as hex_encode;
use sha2::{Digest, Sha256};
use tempfile::TempPath;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::PipelineSection;
use crate::engine::{publish, staging_path, FilterStep, MediaEngine};

pub use error::{PipelineError, PipelineResult, Stage};
pub use perturb::{append_random_suffix, append_suffix_with};
pub use types::{Preset, VariantOutput};

/// Produces one output variant from an input video.
///
/// Every stage runs against a hidden working file next to the output; the
/// canonical output path is only written once all stages have succeeded.
#[derive(Clone)]
pub struct VariantPipeline {
    engine: Arc<dyn MediaEngine>,
    saturation_boost: f64,
    suffix_len: usize,
}

impl VariantPipeline {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self::from_config(engine, &PipelineSection::default())
    }

    pub fn from_config(engine: Arc<dyn MediaEngine>, section: &PipelineSection) -> Self {
        Self {
            engine,
            saturation_boost: section.saturation_boost,
            suffix_len: section.hash_suffix_bytes,
        }
    }

    pub fn with_saturation_boost(mut self, factor: f64) -> Self {
        self.saturation_boost = factor;
        self
    }

    pub fn with_suffix_len(mut self, len: usize) -> Self {
        self.suffix_len = len;
        self
    }

    /// Filter stages run for `preset`, in order. Hash perturbation is not an
    /// engine stage and is not listed.
    pub fn plan(&self, preset: Option<Preset>) -> Vec<(Stage, Vec<FilterStep>)> {
        let mut stages = vec![(Stage::MetadataStrip, vec![FilterStep::StripMetadata])];
        if let Some(preset) = preset {
            stages.push((Stage::Preset, preset.steps().to_vec()));
        }
        stages.push((
            Stage::SaturationBoost,
            vec![FilterStep::Saturation {
                factor: self.saturation_boost,
            }],
        ));
        stages
    }

    /// Runs the variant for an integer preset code; unknown codes skip the
    /// preset stage.
    pub async fn produce_variant_code(
        &self,
        input: &Path,
        output: &Path,
        code: u8,
    ) -> PipelineResult<VariantOutput> {
        let preset = Preset::from_code(code);
        if preset.is_none() {
            warn!(code, "unknown preset code, preset stage will be skipped");
        }
        self.produce_variant(input, output, preset).await
    }

    pub async fn produce_variant(
        &self,
        input: &Path,
        output: &Path,
        preset: Option<Preset>,
    ) -> PipelineResult<VariantOutput> {
        let started = Instant::now();
        let working = staging_path(output).map_err(|source| PipelineError::Io {
            stage: Stage::MetadataStrip,
            path: output.to_path_buf(),
            source,
        })?;

        let mut current: &Path = input;
        for (stage, filters) in self.plan(preset) {
            debug!(%stage, output = %output.display(), "running stage");
            self.engine
                .apply_filters(current, &working, &filters)
                .await
                .map_err(|source| PipelineError::Engine { stage, source })?;
            current = &*working;
        }

        self.perturb(&working).await?;

        let (size_bytes, sha256) = checksum(&working).await?;

        publish(working, output).map_err(|source| PipelineError::Io {
            stage: Stage::Publish,
            path: output.to_path_buf(),
            source,
        })?;

        info!(
            preset = preset.map(Preset::name).unwrap_or("none"),
            output = %output.display(),
            size_bytes,
            sha256 = %sha256,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "variant produced"
        );
        Ok(VariantOutput::new(
            preset,
            output.to_path_buf(),
            size_bytes,
            sha256,
        ))
    }

    async fn perturb(&self, working: &TempPath) -> PipelineResult<()> {
        let path: PathBuf = working.to_path_buf();
        let len = self.suffix_len;
        let target = path.clone();
        tokio::task::spawn_blocking(move || append_random_suffix(&target, len).map(|_| ()))
            .await
            .unwrap_or_else(|join| Err(std::io::Error::new(std::io::ErrorKind::Other, join)))
            .map_err(|source| PipelineError::Io {
                stage: Stage::HashPerturbation,
                path,
                source,
            })
    }
}

async fn checksum(path: &Path) -> PipelineResult<(u64, String)> {
    let bytes = fs::read(path).await.map_err(|source| PipelineError::Io {
        stage: Stage::Publish,
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok((bytes.len() as u64, hex_encode(hasher.finalize())))
}
