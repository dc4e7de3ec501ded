//! # Capture Store
//!
//! Owns the two directories the protocol touches:
//! - **output dir**: committed captures, `<name>.wav`
//! - **scratch dir**: in-progress captures, `<connection>-<sequence>.part`
//!
//! The scratch dir should sit on the same volume as the output dir; only
//! then is a commit a single atomic rename.

use crate::config::StorageConfig;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Extension of committed captures.
pub const CAPTURE_EXTENSION: &str = "wav";

/// Extension of scratch artifacts.
pub const SCRATCH_EXTENSION: &str = "part";

#[derive(Debug, Clone)]
pub struct CaptureStore {
    output_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl CaptureStore {
    pub fn new(output_dir: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.output_dir.clone(), config.scratch_dir())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Prepare the directories once per process start.
    ///
    /// With `clean` set, the output directory is deleted recursively and
    /// recreated, so the process starts from an empty namespace. A separate
    /// scratch dir is cleaned the same way; stale `.part` files from a
    /// previous run are never committable anyway.
    pub async fn prepare(&self, clean: bool) -> io::Result<()> {
        if clean {
            remove_dir_if_exists(&self.output_dir).await?;
            if !self.scratch_dir.starts_with(&self.output_dir) {
                remove_dir_if_exists(&self.scratch_dir).await?;
            }
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        info!(
            output_dir = %self.output_dir.display(),
            scratch_dir = %self.scratch_dir.display(),
            clean,
            "Capture storage ready"
        );
        Ok(())
    }

    /// Scratch location for one session of one connection.
    pub fn scratch_path(&self, connection_id: Uuid, sequence: u64) -> PathBuf {
        self.scratch_dir.join(format!(
            "{}-{}.{}",
            connection_id, sequence, SCRATCH_EXTENSION
        ))
    }

    /// Final location for a capture named `name`. The name must already be
    /// validated by the committer.
    pub fn final_path(&self, name: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", name, CAPTURE_EXTENSION))
    }

    /// Names (without extension) of every committed capture, sorted.
    pub async fn committed_captures(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.output_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CAPTURE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Number of in-progress scratch artifacts.
    pub async fn pending_scratch_count(&self) -> io::Result<usize> {
        let mut count = 0;
        let mut entries = tokio::fs::read_dir(&self.scratch_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().and_then(|ext| ext.to_str()) == Some(SCRATCH_EXTENSION) {
                count += 1;
            }
        }

        Ok(count)
    }
}

async fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            info!(path = %path.display(), "Removed previous capture directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not clear capture directory");
            Err(e)
        }
    }
}

/// Store rooted in a unique temp directory; the directory goes away on drop.
#[cfg(test)]
pub(crate) struct TempStore {
    root: PathBuf,
    store: CaptureStore,
}

#[cfg(test)]
impl TempStore {
    pub(crate) fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
impl std::ops::Deref for TempStore {
    type Target = CaptureStore;

    fn deref(&self) -> &CaptureStore {
        &self.store
    }
}

#[cfg(test)]
impl Drop for TempStore {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

#[cfg(test)]
pub(crate) async fn temp_store() -> TempStore {
    let root = std::env::temp_dir().join(format!("wav-capture-test-{}", Uuid::new_v4()));
    let output_dir = root.join("data");
    let store = CaptureStore::new(output_dir.clone(), output_dir.join(".scratch"));
    store.prepare(true).await.unwrap();
    TempStore { root, store }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_clears_previous_output() {
        let store = temp_store().await;
        let stale = store.final_path("old");
        tokio::fs::write(&stale, b"stale").await.unwrap();
        assert_eq!(store.committed_captures().await.unwrap(), vec!["old"]);

        store.prepare(true).await.unwrap();
        assert!(!stale.exists());
        assert!(store.scratch_dir().is_dir());
        assert!(store.committed_captures().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_without_clean_keeps_files() {
        let store = temp_store().await;
        tokio::fs::write(store.final_path("keep"), b"x").await.unwrap();

        store.prepare(false).await.unwrap();
        assert_eq!(store.committed_captures().await.unwrap(), vec!["keep"]);
    }

    #[tokio::test]
    async fn test_scratch_paths_are_unique() {
        let store = temp_store().await;
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_ne!(store.scratch_path(a, 0), store.scratch_path(a, 1));
        assert_ne!(store.scratch_path(a, 0), store.scratch_path(b, 0));
        assert!(store.scratch_path(a, 0).starts_with(store.scratch_dir()));
    }

    #[tokio::test]
    async fn test_committed_captures_ignores_scratch_and_other_files() {
        let store = temp_store().await;
        tokio::fs::write(store.final_path("b"), b"x").await.unwrap();
        tokio::fs::write(store.final_path("a"), b"x").await.unwrap();
        tokio::fs::write(store.output_dir().join("notes.txt"), b"x").await.unwrap();
        tokio::fs::write(store.scratch_path(Uuid::new_v4(), 0), b"x").await.unwrap();

        assert_eq!(store.committed_captures().await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.pending_scratch_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_temp_store_removes_its_directory() {
        let store = temp_store().await;
        let root = store.root().to_path_buf();
        tokio::fs::write(store.final_path("take1"), b"x").await.unwrap();
        tokio::fs::write(store.scratch_path(Uuid::new_v4(), 0), b"x").await.unwrap();
        assert!(root.is_dir());

        drop(store);
        assert!(!root.exists());
    }
}
