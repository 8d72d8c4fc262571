use std::path::Path;

use thiserror::Error;

use crate::config::UploadSection;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("uploaded file {file_name} has no extension")]
    MissingExtension { file_name: String },
    #[error("unsupported file type .{extension}; expected one of: {allowed}")]
    UnsupportedExtension { extension: String, allowed: String },
    #[error("uploaded file is empty")]
    Empty,
    #[error("uploaded file is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Accepts uploads by extension and size only; content is never inspected.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    allowed_extensions: Vec<String>,
    max_bytes: u64,
}

impl UploadPolicy {
    pub fn new<I, S>(allowed_extensions: I, max_bytes: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_bytes,
        }
    }

    pub fn from_config(section: &UploadSection) -> Self {
        Self::new(&section.allowed_extensions, section.max_bytes)
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    pub fn validate(&self, file_name: &str, size: u64) -> UploadResult<()> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| UploadError::MissingExtension {
                file_name: file_name.to_string(),
            })?;
        if !self.allowed_extensions.iter().any(|ext| *ext == extension) {
            return Err(UploadError::UnsupportedExtension {
                extension,
                allowed: self.allowed_extensions.join(", "),
            });
        }
        if size == 0 {
            return Err(UploadError::Empty);
        }
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::from_config(&UploadSection::default())
    }
}
