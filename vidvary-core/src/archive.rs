use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::engine::{publish, staging_path};

pub const ARCHIVE_NAME: &str = "video_variations.zip";
pub const ARCHIVE_MIME: &str = "application/zip";

const ZIP32_LIMIT: u64 = 0xFFFF_FFFF;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive entry {path} has no usable file name")]
    InvalidEntryName { path: PathBuf },
    #[error("duplicate archive entry {0}")]
    DuplicateEntry(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: io::Error,
        path: PathBuf,
    },
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Base file name used as the archive entry; directory components are dropped.
pub fn entry_name(path: &Path) -> ArchiveResult<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .ok_or_else(|| ArchiveError::InvalidEntryName {
            path: path.to_path_buf(),
        })
}

/// Writes a zip with one entry per file and returns the archive size.
///
/// The archive appears at `destination` only once it is complete.
pub fn write_zip(entries: &[PathBuf], destination: &Path) -> ArchiveResult<u64> {
    let mut names = HashSet::new();
    let mut named = Vec::with_capacity(entries.len());
    for path in entries {
        let name = entry_name(path)?;
        if !names.insert(name.clone()) {
            return Err(ArchiveError::DuplicateEntry(name));
        }
        named.push((name, path));
    }

    let staged = staging_path(destination).map_err(io_error(destination))?;
    let file = File::create(&staged).map_err(io_error(&staged))?;
    let mut zip = ZipWriter::new(file);

    for (name, path) in named {
        let mut source = File::open(path).map_err(io_error(path))?;
        let size = source.metadata().map_err(io_error(path))?.len();
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644)
            .large_file(size >= ZIP32_LIMIT);
        zip.start_file(name, options)?;
        io::copy(&mut source, &mut zip).map_err(io_error(path))?;
    }

    let file = zip.finish()?;
    file.sync_all().map_err(io_error(&staged))?;
    let size = file.metadata().map_err(io_error(&staged))?.len();
    drop(file);
    publish(staged, destination).map_err(io_error(destination))?;
    Ok(size)
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError {
    let path = path.to_path_buf();
    move |source| ArchiveError::Io { source, path }
}
