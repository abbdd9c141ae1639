use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Upload written to the staging directory for the lifetime of one request.
///
/// The file is removed when the guard drops, including during unwinding, so no
/// exit path of the pipeline can leave it behind. Names are generated, never
/// taken from the client, so concurrent uploads cannot collide.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub async fn write(dir: &Path, extension: &str, payload: &[u8]) -> std::io::Result<Self> {
        let staged = Self {
            path: dir.join(format!("{}.{}", Uuid::new_v4(), extension)),
        };

        // guard exists before the file so a failed write is cleaned up too
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged.path)
            .await?;
        file.write_all(payload).await?;
        file.flush().await?;

        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl Drop for StagedFile {
    // Blocking unlink on the worker thread. Callers rely on the file being gone
    // once the guard has dropped, and unwinding may happen with no runtime to
    // hand the work to.
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed staged file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to remove staged file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
