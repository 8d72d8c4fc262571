mod error;
mod filter;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::EngineSection;

pub use error::{EngineError, EngineResult};
pub use filter::{FilterChain, FilterStep};

/// Applies filter steps to a media file.
///
/// Implementations must be all-or-nothing: `output` is either fully
/// replaced or left exactly as it was. `input` and `output` may be the
/// same path.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn apply_filters(
        &self,
        input: &Path,
        output: &Path,
        filters: &[FilterStep],
    ) -> EngineResult<()>;
}

/// Runs the `ffmpeg` binary as a subprocess, one invocation per call.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    binary: PathBuf,
    log_level: String,
    video_codec: String,
    audio_codec: String,
    timeout: Duration,
}

impl FfmpegEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        let defaults = EngineSection::default();
        let timeout = defaults.timeout();
        Self {
            binary: binary.into(),
            log_level: defaults.log_level,
            video_codec: defaults.video_codec,
            audio_codec: defaults.audio_codec,
            timeout,
        }
    }

    pub fn from_config(section: &EngineSection) -> Self {
        Self {
            binary: PathBuf::from(&section.binary),
            log_level: section.log_level.clone(),
            video_codec: section.video_codec.clone(),
            audio_codec: section.audio_codec.clone(),
            timeout: section.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_codecs(mut self, video: impl Into<String>, audio: impl Into<String>) -> Self {
        self.video_codec = video.into();
        self.audio_codec = audio.into();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// First line of `<binary> -version`.
    pub async fn version(&self) -> EngineResult<String> {
        let mut command = Command::new(&self.binary);
        command
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .arg("-hide_banner")
            .arg("-version");
        let output = self.execute(command).await?;
        let stdout = String::from_utf8_lossy(&output);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    pub fn build_args(&self, input: &Path, output: &Path, chain: &FilterChain) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            self.log_level.clone().into(),
            "-y".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "0:a?".into(),
        ];
        if let Some(graph) = chain.video_graph() {
            args.push("-vf".into());
            args.push(graph.into());
        }
        if let Some(graph) = chain.audio_graph() {
            args.push("-af".into());
            args.push(graph.into());
        }
        if chain.strip_metadata {
            args.extend(
                ["-map_metadata", "-1", "-map_chapters", "-1"]
                    .into_iter()
                    .map(OsString::from),
            );
        }
        args.extend(
            [
                "-c:v",
                self.video_codec.as_str(),
                "-c:a",
                self.audio_codec.as_str(),
                "-movflags",
                "+faststart",
                "-f",
                "mp4",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(output.as_os_str().to_owned());
        args
    }

    async fn execute(&self, mut command: Command) -> EngineResult<Vec<u8>> {
        let binary = self.binary.display().to_string();
        match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(output.stdout),
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                warn!(binary = %binary, status = ?output.status.code(), "media engine returned non-zero status");
                Err(EngineError::Transform {
                    status: output.status.code(),
                    stderr,
                })
            }
            Ok(Err(source)) => Err(EngineError::Spawn { binary, source }),
            Err(_) => {
                warn!(binary = %binary, timeout = ?self.timeout, "media engine timed out");
                Err(EngineError::Timeout(self.timeout))
            }
        }
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::from_config(&EngineSection::default())
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn apply_filters(
        &self,
        input: &Path,
        output: &Path,
        filters: &[FilterStep],
    ) -> EngineResult<()> {
        let chain = FilterChain::build(filters)?;
        let staged = staging_path(output).map_err(|source| EngineError::Io {
            source,
            path: output.to_path_buf(),
        })?;
        let args = self.build_args(input, &staged, &chain);

        let mut command = Command::new(&self.binary);
        command.kill_on_drop(true).stdin(Stdio::null()).args(&args);

        let started = Instant::now();
        self.execute(command).await?;
        debug!(
            input = %input.display(),
            output = %output.display(),
            filters = filters.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "media engine invocation finished"
        );
        publish(staged, output).map_err(|source| EngineError::Io {
            source,
            path: output.to_path_buf(),
        })
    }
}

/// Reserves a hidden sibling of `target` that is removed when dropped.
pub(crate) fn staging_path(target: &Path) -> std::io::Result<TempPath> {
    let dir = parent_dir(target);
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let suffix = target
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(&suffix)
        .tempfile_in(dir)
        .map(|file| file.into_temp_path())
}

/// Renames a staged file over `target`.
pub(crate) fn publish(staged: TempPath, target: &Path) -> std::io::Result<()> {
    staged.persist(target).map_err(|err| err.error)
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
