//! Read-only inspection of migration progress.

use super::{MigrationStage, Migrator, Task};
use crate::error::Result;
use crate::layout::RunPaths;
use crate::manifest::{CheckpointMap, ExperimentList};
use crate::text_log::PROVENANCE_PREFIX;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub task: Task,
    pub key: String,
    pub timestamp: String,
    pub stage: MigrationStage,
}

impl Migrator {
    /// Stage reached by every listed experiment. Nothing is written.
    pub fn status(
        &self,
        task: Task,
        experiments: &ExperimentList,
        checkpoints: &CheckpointMap,
    ) -> Result<Vec<StatusEntry>> {
        experiments
            .keys()
            .iter()
            .map(|key| -> Result<StatusEntry> {
                let (timestamp, stage) = match task {
                    Task::Modernize => {
                        let timestamp = checkpoints.get(key)?.run_timestamp()?;
                        let stage = self.modernize_stage(&self.layout.run(key, &timestamp));
                        (timestamp, stage)
                    }
                    Task::Standardize => {
                        let (entry, epoch) = checkpoints.get_with_epoch(key)?;
                        let run = self.layout.run(key, &entry.timestamp);
                        (entry.timestamp.clone(), self.standardize_stage(&run, epoch))
                    }
                };
                Ok(StatusEntry {
                    task,
                    key: key.clone(),
                    timestamp,
                    stage,
                })
            })
            .collect()
    }

    pub(super) fn modernize_stage(&self, run: &RunPaths) -> MigrationStage {
        MigrationStage::from_checks(
            run.config().is_file() && run.best_model().is_file(),
            run.log_file().is_file(),
            run.evaluation_marker().is_file(),
        )
    }

    // The models tree is populated before standardization. A rewritten log has
    // its original kept as backup and opens with the provenance line.
    pub(super) fn standardize_stage(&self, run: &RunPaths, epoch: u32) -> MigrationStage {
        MigrationStage::from_checks(
            run.config().is_file() && run.epoch_checkpoint(epoch).is_file(),
            run.backup_log().is_file() && is_normalized(&run.log_file()),
            run.evaluation_marker().is_file(),
        )
    }
}

/// Whether the log at `path` was written by the normalizer.
pub(super) fn is_normalized(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    BufReader::new(file)
        .lines()
        .next()
        .and_then(|line| line.ok())
        .is_some_and(|line| line.contains(PROVENANCE_PREFIX))
}
