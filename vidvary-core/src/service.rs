use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::archive::{ARCHIVE_MIME, ARCHIVE_NAME};
use crate::batch::{BatchError, BatchOrchestrator, BatchReport};
use crate::config::VidvaryConfig;
use crate::engine::MediaEngine;
use crate::pipeline::VariantPipeline;
use crate::upload::{UploadError, UploadPolicy};
use crate::workspace::RequestWorkspace;

pub const GENERIC_FAILURE: &str =
    "An error occurred while processing the video. Please try again.";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("workspace error at {path}: {source}")]
    Workspace {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error(transparent)]
    Batch(#[from] BatchError),
}

impl ServiceError {
    /// Messages safe to show to whoever uploaded the file, most specific first.
    pub fn user_messages(&self) -> Vec<String> {
        match self {
            ServiceError::Upload(err) => vec![err.to_string()],
            ServiceError::Batch(BatchError::Incomplete { failures, .. }) => {
                let mut messages: Vec<String> = failures
                    .iter()
                    .filter_map(|failure| failure.error.diagnostics())
                    .map(|stderr| {
                        format!("An error occurred while processing the video: {stderr}")
                    })
                    .collect();
                messages.push(GENERIC_FAILURE.to_string());
                messages
            }
            _ => vec![GENERIC_FAILURE.to_string()],
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, ServiceError::Upload(_))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone)]
pub struct ArchiveDownload {
    pub file_name: &'static str,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
    pub report: BatchReport,
}

/// Upload in, archive out. Every request gets its own workspace, discarded
/// before the call returns.
#[derive(Clone)]
pub struct VariationService {
    orchestrator: BatchOrchestrator,
    policy: UploadPolicy,
    workspace_root: Option<PathBuf>,
}

impl VariationService {
    pub fn new(orchestrator: BatchOrchestrator, policy: UploadPolicy) -> Self {
        Self {
            orchestrator,
            policy,
            workspace_root: None,
        }
    }

    pub fn from_config(config: &VidvaryConfig, engine: Arc<dyn MediaEngine>) -> Self {
        let pipeline = VariantPipeline::from_config(engine, &config.pipeline);
        let orchestrator = BatchOrchestrator::new(pipeline).with_parallel(config.pipeline.parallel);
        Self::new(orchestrator, UploadPolicy::from_config(&config.upload))
            .with_workspace_root(config.upload.workspace_dir.clone())
    }

    pub fn with_workspace_root(mut self, root: Option<PathBuf>) -> Self {
        self.workspace_root = root;
        self
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub async fn process_upload(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> ServiceResult<ArchiveDownload> {
        self.policy.validate(file_name, bytes.len() as u64)?;

        let workspace = RequestWorkspace::create(self.workspace_root.as_deref()).map_err(
            |source| ServiceError::Workspace {
                source,
                path: self
                    .workspace_root
                    .clone()
                    .unwrap_or_else(std::env::temp_dir),
            },
        )?;
        info!(file_name, size_bytes = bytes.len(), workspace = %workspace.path().display(), "processing upload");

        let result = self.process_in(&workspace, bytes).await;
        workspace.close();
        if let Err(err) = &result {
            warn!(file_name, error = %err, "upload processing failed");
        }
        result
    }

    async fn process_in(
        &self,
        workspace: &RequestWorkspace,
        bytes: &[u8],
    ) -> ServiceResult<ArchiveDownload> {
        let input = workspace
            .write_input(bytes)
            .await
            .map_err(|source| ServiceError::Workspace {
                source,
                path: workspace.input_path().to_path_buf(),
            })?;
        let report = self.orchestrator.run(input, workspace.output_dir()).await?;
        let archive = fs::read(&report.archive_path)
            .await
            .map_err(|source| ServiceError::Workspace {
                source,
                path: report.archive_path.clone(),
            })?;
        Ok(ArchiveDownload {
            file_name: ARCHIVE_NAME,
            content_type: ARCHIVE_MIME,
            bytes: archive,
            report,
        })
    }
}
