//! # Session Commit
//!
//! Moves a finished scratch artifact to `<output-dir>/<name>.wav` with one
//! `rename`, replacing any capture already stored under that name. Readers
//! observe either the previous file or the new one, never a partial write,
//! as long as scratch and output share a volume.
//!
//! The client's name is used verbatim. It is only checked, never rewritten:
//! a name that would resolve outside the output directory is refused.

use crate::capture::scratch::ScratchArtifact;
use crate::capture::store::CaptureStore;
use crate::error::CaptureError;
use std::path::PathBuf;
use tracing::{info, warn};

/// Refuse names that are empty or could address another directory.
pub fn validate_name(name: &str) -> Result<(), CaptureError> {
    if name.is_empty() {
        return Err(CaptureError::CommitFailure(
            "capture name is empty".to_string(),
        ));
    }
    if name == "." || name == ".." {
        return Err(CaptureError::CommitFailure(format!(
            "'{}' is not a valid capture name",
            name
        )));
    }
    if let Some(bad) = name.chars().find(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(CaptureError::CommitFailure(format!(
            "capture name contains forbidden character {:?}",
            bad
        )));
    }
    Ok(())
}

/// Commit `scratch` under `name`.
///
/// The artifact is consumed either way. On failure it is deleted, since the
/// session it belonged to is over.
pub async fn commit(
    store: &CaptureStore,
    scratch: ScratchArtifact,
    name: &str,
) -> Result<PathBuf, CaptureError> {
    if let Err(e) = validate_name(name) {
        scratch.discard().await;
        return Err(e);
    }

    let destination = store.final_path(name);
    match tokio::fs::rename(scratch.path(), &destination).await {
        Ok(()) => {
            info!(
                name = %name,
                file = %destination.display(),
                bytes = scratch.bytes_written(),
                "Capture committed"
            );
            Ok(destination)
        }
        Err(e) => {
            warn!(
                name = %name,
                scratch = %scratch.path().display(),
                error = %e,
                "Rename failed"
            );
            let err = CaptureError::CommitFailure(format!(
                "could not move {} to {}: {}",
                scratch.path().display(),
                destination.display(),
                e
            ));
            scratch.discard().await;
            Err(err)
        }
    }
}
