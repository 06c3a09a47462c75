//! Copying artifacts from legacy run directories into the canonical tree.

use crate::error::{MigrateError, Result};
use crate::persistence;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// What happened to one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferOutcome {
    Copied { bytes: u64 },
    Skipped,
}

impl TransferOutcome {
    pub fn copied(&self) -> bool {
        matches!(self, Self::Copied { .. })
    }
}

/// Copy `src` to `dest` unless `dest` already exists. `refresh` forces the copy.
///
/// `kind` names the artifact in logs and in the error raised when `src` is missing.
pub fn copy_artifact(
    kind: &'static str,
    src: &Path,
    dest: &Path,
    refresh: bool,
) -> Result<TransferOutcome> {
    if dest.exists() && !refresh {
        info!("transferred {kind} found at {}, skipping...", dest.display());
        return Ok(TransferOutcome::Skipped);
    }
    if !src.is_file() {
        return Err(MigrateError::missing(kind, src));
    }
    info!("copying {kind}: {} -> {}", src.display(), dest.display());
    let bytes = persistence::atomic_copy(src, dest)?;
    Ok(TransferOutcome::Copied { bytes })
}
