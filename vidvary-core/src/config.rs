use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::engine::FilterStep;
use crate::error::{ConfigError, Result};

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct VidvaryConfig {
    pub engine: EngineSection,
    pub pipeline: PipelineSection,
    pub upload: UploadSection,
    pub server: ServerSection,
}

impl VidvaryConfig {
    /// Rejects values the pipeline cannot honour before any request is served.
    pub fn validate(&self) -> Result<()> {
        if self.engine.binary.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "engine.binary",
                reason: "must not be empty".to_string(),
            });
        }
        if self.engine.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.timeout_seconds",
                reason: "must be greater than zero".to_string(),
            });
        }
        FilterStep::Saturation {
            factor: self.pipeline.saturation_boost,
        }
        .validate()
        .map_err(|err| ConfigError::Invalid {
            field: "pipeline.saturation_boost",
            reason: err.to_string(),
        })?;
        if self.pipeline.hash_suffix_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "pipeline.hash_suffix_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.upload.allowed_extensions.is_empty() {
            return Err(ConfigError::Invalid {
                field: "upload.allowed_extensions",
                reason: "at least one extension is required".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub binary: String,
    pub log_level: String,
    pub timeout_seconds: u64,
    pub video_codec: String,
    pub audio_codec: String,
}

impl EngineSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            log_level: "error".to_string(),
            timeout_seconds: 600,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub saturation_boost: f64,
    pub hash_suffix_bytes: usize,
    pub parallel: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            saturation_boost: 1.1,
            hash_suffix_bytes: 10,
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadSection {
    pub allowed_extensions: Vec<String>,
    pub max_bytes: u64,
    pub workspace_dir: Option<PathBuf>,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["mp4".to_string(), "avi".to_string(), "mov".to_string()],
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            workspace_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<VidvaryConfig> {
    let config: VidvaryConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
