pub mod archive;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod upload;
pub mod workspace;

pub use archive::{write_zip, ArchiveError, ARCHIVE_MIME, ARCHIVE_NAME};
pub use batch::{BatchError, BatchOrchestrator, BatchReport, BatchResult, VariantFailure};
pub use config::{load_config, VidvaryConfig};
pub use engine::{EngineError, EngineResult, FfmpegEngine, FilterStep, MediaEngine};
pub use error::{ConfigError, Result};
pub use pipeline::{
    PipelineError, PipelineResult, Preset, Stage, VariantOutput, VariantPipeline,
};
pub use service::{ArchiveDownload, ServiceError, ServiceResult, VariationService, GENERIC_FAILURE};
pub use upload::{UploadError, UploadPolicy};
pub use workspace::RequestWorkspace;
