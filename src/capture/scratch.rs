//! # Scratch Accumulator
//!
//! Append-only file holding the encoded container bytes of one in-progress
//! capture. The path is unique to its session, so no two captures ever
//! write to the same artifact.

use crate::error::CaptureError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct ScratchArtifact {
    path: PathBuf,
    bytes_written: u64,
}

impl ScratchArtifact {
    /// Reserve an artifact at `path`. Nothing touches the disk until the
    /// first append.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            bytes_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Append `bytes` and flush them to stable storage.
    ///
    /// The append is not considered done until `sync_all` returns, so a
    /// capture acknowledged to the client survives a crash.
    pub async fn append(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| CaptureError::storage(&self.path, e))?;

        file.write_all(bytes)
            .await
            .map_err(|e| CaptureError::storage(&self.path, e))?;
        file.sync_all()
            .await
            .map_err(|e| CaptureError::storage(&self.path, e))?;

        self.bytes_written += bytes.len() as u64;
        debug!(
            path = %self.path.display(),
            appended = bytes.len(),
            total = self.bytes_written,
            "Appended to scratch artifact"
        );
        Ok(())
    }

    /// Delete the artifact. A file that was never written is not an error.
    pub async fn discard(self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Discarded scratch artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to discard scratch artifact"
            ),
        }
    }
}
