//! Canonical on-disk layout.
//!
//! ```text
//! <save_dir>/log/<key>/<timestamp>/info.log
//! <save_dir>/log/<key>/<timestamp>/info.log.backup
//! <save_dir>/log/<key>/<timestamp>/evaluation.json
//! <save_dir>/models/<key>/<timestamp>/config.json
//! <save_dir>/models/<key>/<timestamp>/model_best.pth
//! <save_dir>/models/<key>/<timestamp>/checkpoint-epoch<N>.pth
//! ```

use std::path::PathBuf;

pub const LOG_FILE: &str = "info.log";
pub const BACKUP_SUFFIX: &str = ".backup";
pub const EVALUATION_MARKER: &str = "evaluation.json";
pub const CONFIG_FILE: &str = "config.json";
pub const BEST_MODEL_FILE: &str = "model_best.pth";

/// File name of the checkpoint saved at `epoch`.
pub fn epoch_checkpoint_name(epoch: u32) -> String {
    format!("checkpoint-epoch{epoch}.pth")
}

#[derive(Debug, Clone)]
pub struct CanonicalLayout {
    root: PathBuf,
}

impl CanonicalLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn run(&self, key: &str, timestamp: &str) -> RunPaths {
        RunPaths {
            log_dir: self.root.join("log").join(key).join(timestamp),
            models_dir: self.root.join("models").join(key).join(timestamp),
        }
    }
}

/// Paths of one experiment run inside the canonical tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub log_dir: PathBuf,
    pub models_dir: PathBuf,
}

impl RunPaths {
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE)
    }

    pub fn backup_log(&self) -> PathBuf {
        self.log_dir.join(format!("{LOG_FILE}{BACKUP_SUFFIX}"))
    }

    pub fn evaluation_marker(&self) -> PathBuf {
        self.log_dir.join(EVALUATION_MARKER)
    }

    pub fn config(&self) -> PathBuf {
        self.models_dir.join(CONFIG_FILE)
    }

    pub fn best_model(&self) -> PathBuf {
        self.models_dir.join(BEST_MODEL_FILE)
    }

    pub fn epoch_checkpoint(&self, epoch: u32) -> PathBuf {
        self.models_dir.join(epoch_checkpoint_name(epoch))
    }
}
