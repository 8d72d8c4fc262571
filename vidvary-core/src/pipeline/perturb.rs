//! Checksum perturbation by appending random trailing bytes.
//!
//! The target is never modified in place: its content is copied to a hidden
//! sibling, the suffix is appended there, and the sibling is renamed over the
//! target once everything is flushed to disk.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use rand::RngCore;

use crate::engine::{parent_dir, publish};

pub fn append_random_suffix(path: &Path, len: usize) -> io::Result<Vec<u8>> {
    let mut suffix = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut suffix);
    append_suffix_with(path, |file| file.write_all(&suffix))?;
    Ok(suffix)
}

/// Copies `path` to a staging file, lets `write` append to it, then
/// atomically replaces `path`. On any error `path` is left untouched.
pub fn append_suffix_with<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let mut source = File::open(path)?;
    let staged = tempfile::Builder::new()
        .prefix(".perturb.")
        .tempfile_in(parent_dir(path))?;
    let (mut file, staged_path) = staged.into_parts();
    io::copy(&mut source, &mut file)?;
    write(&mut file)?;
    file.sync_all()?;
    drop(file);
    publish(staged_path, path)
}
