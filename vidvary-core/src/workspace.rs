use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, warn};

pub const INPUT_FILE_NAME: &str = "input_video";

/// Temporary directory owning every file of a single request.
///
/// Dropping the workspace removes the directory and everything in it.
#[derive(Debug)]
pub struct RequestWorkspace {
    dir: TempDir,
    input: PathBuf,
}

impl RequestWorkspace {
    pub fn create(base: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vidvary-");
        let dir = match base {
            Some(base) => {
                std::fs::create_dir_all(base)?;
                builder.tempdir_in(base)?
            }
            None => builder.tempdir()?,
        };
        let input = dir.path().join(INPUT_FILE_NAME);
        debug!(path = %dir.path().display(), "request workspace created");
        Ok(Self { dir, input })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_path(&self) -> &Path {
        &self.input
    }

    pub fn output_dir(&self) -> &Path {
        self.dir.path()
    }

    pub async fn write_input(&self, bytes: &[u8]) -> io::Result<&Path> {
        fs::write(&self.input, bytes).await?;
        Ok(&self.input)
    }

    /// Removes the workspace now; removal errors are logged, not returned.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(err) = self.dir.close() {
            warn!(path = %path.display(), error = %err, "failed to clean request workspace");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn input_lands_inside_workspace() {
        let base = TempDir::new().unwrap();
        let workspace = RequestWorkspace::create(Some(base.path())).unwrap();
        let input = workspace.write_input(b"upload").await.unwrap().to_path_buf();
        assert_eq!(input.parent(), Some(workspace.path()));
        assert_eq!(input.file_name().unwrap(), INPUT_FILE_NAME);
        assert_eq!(std::fs::read(&input).unwrap(), b"upload");
    }

    #[tokio::test]
    async fn drop_and_close_remove_everything() {
        let base = TempDir::new().unwrap();
        let dropped = RequestWorkspace::create(Some(base.path())).unwrap();
        dropped.write_input(b"a").await.unwrap();
        let dropped_path = dropped.path().to_path_buf();
        drop(dropped);
        assert!(!dropped_path.exists());

        let closed = RequestWorkspace::create(Some(base.path())).unwrap();
        std::fs::write(closed.output_dir().join("output_video_1.mp4"), b"v").unwrap();
        let closed_path = closed.path().to_path_buf();
        closed.close();
        assert!(!closed_path.exists());
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[test]
    fn creates_missing_base_directory() {
        let base = TempDir::new().unwrap();
        let nested = base.path().join("spool/requests");
        let workspace = RequestWorkspace::create(Some(&nested)).unwrap();
        assert!(workspace.path().starts_with(&nested));
    }
}
