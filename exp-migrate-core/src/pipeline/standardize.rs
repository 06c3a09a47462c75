//! Legacy text logs -> canonical log format.

use super::status::is_normalized;
use super::{ExperimentReport, MigrationReport, Migrator, Task};
use crate::error::{MigrateError, Result};
use crate::evaluation::EvaluationRequest;
use crate::manifest::{CheckpointMap, ExperimentList};
use crate::persistence;
use crate::text_log::LogNormalizer;
use tracing::info;

impl Migrator {
    /// Rewrite each experiment's `info.log` in the canonical format, keeping the
    /// original as `info.log.backup`, and re-evaluate the planned checkpoint.
    pub async fn standardize(
        &self,
        experiments: &ExperimentList,
        checkpoints: &CheckpointMap,
    ) -> Result<MigrationReport> {
        let mut report = MigrationReport::new(Task::Standardize);
        for key in experiments.keys() {
            report
                .experiments
                .push(self.standardize_one(key, checkpoints).await?);
        }
        Ok(report)
    }

    async fn standardize_one(
        &self,
        key: &str,
        checkpoints: &CheckpointMap,
    ) -> Result<ExperimentReport> {
        let (entry, epoch) = checkpoints.get_with_epoch(key)?;
        let run = self.layout.run(key, &entry.timestamp);
        info!(experiment = key, epoch, "standardizing {}", run.log_dir.display());

        let config_path = run.config();
        let model_path = run.epoch_checkpoint(epoch);
        let log_path = run.log_file();
        let backup = run.backup_log();
        if !config_path.is_file() {
            return Err(MigrateError::missing("config", config_path));
        }
        if !model_path.is_file() {
            return Err(MigrateError::missing("checkpoint", model_path));
        }
        if !log_path.is_file() && !backup.is_file() {
            return Err(MigrateError::missing("log", log_path));
        }

        // A backup next to a log that was never rewritten means an earlier run
        // stopped in between; normalize again from the backup.
        let lines = if self.refresh || !backup.exists() || !is_normalized(&log_path) {
            // The backup, once taken, always holds the untouched legacy log.
            let original = if backup.exists() { &backup } else { &log_path };
            let legacy = std::fs::read_to_string(original)?;
            let config_text = std::fs::read_to_string(&config_path)?;
            let experiment = run
                .log_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| entry.timestamp.clone());
            let normalizer = LogNormalizer::new(self.config.normalizer.clone());
            let lines = normalizer.normalize(&legacy, &config_text, epoch, &experiment)?;

            if !backup.exists() {
                persistence::atomic_copy(&log_path, &backup)?;
            }
            Some(lines)
        } else {
            info!("standardized log found at {}, skipping...", log_path.display());
            None
        };

        let request = EvaluationRequest::new(config_path, model_path, &self.config.evaluation);
        let (log, evaluation) = self
            .write_and_evaluate(&run, lines.as_deref(), &request)
            .await?;

        Ok(ExperimentReport {
            key: key.to_string(),
            timestamp: entry.timestamp.clone(),
            config: None,
            checkpoint: None,
            log,
            rows_written: lines.map_or(0, |l| l.len()),
            evaluation,
            stage: self.standardize_stage(&run, epoch),
        })
    }
}
