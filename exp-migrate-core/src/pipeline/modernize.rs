//! Event-stream runs -> canonical layout.

use super::{ExperimentReport, MigrationReport, Migrator, Task};
use crate::error::Result;
use crate::event_stream::EventStreamDecoder;
use crate::evaluation::EvaluationRequest;
use crate::layout::{BEST_MODEL_FILE, CONFIG_FILE};
use crate::manifest::{CheckpointMap, ExperimentList};
use crate::transfer::copy_artifact;
use std::path::PathBuf;
use tracing::info;

impl Migrator {
    /// Copy config and best checkpoint from each legacy run directory, rebuild
    /// `info.log` from the run's event stream, and re-evaluate.
    pub async fn modernize(
        &self,
        experiments: &ExperimentList,
        checkpoints: &CheckpointMap,
    ) -> Result<MigrationReport> {
        let mut report = MigrationReport::new(Task::Modernize);
        for key in experiments.keys() {
            report
                .experiments
                .push(self.modernize_one(key, checkpoints).await?);
        }
        Ok(report)
    }

    async fn modernize_one(
        &self,
        key: &str,
        checkpoints: &CheckpointMap,
    ) -> Result<ExperimentReport> {
        let entry = checkpoints.get(key)?;
        let source = PathBuf::from(&entry.timestamp);
        let timestamp = entry.run_timestamp()?;
        let run = self.layout.run(key, &timestamp);
        info!(experiment = key, "modernizing {}", source.display());

        let config = copy_artifact(
            "config",
            &source.join(CONFIG_FILE),
            &run.config(),
            self.refresh,
        )?;
        let checkpoint = copy_artifact(
            "checkpoint",
            &source.join(BEST_MODEL_FILE),
            &run.best_model(),
            self.refresh,
        )?;

        let log_file = run.log_file();
        let lines = if self.refresh || !log_file.exists() {
            let decoder = EventStreamDecoder::new(self.config.event_stream.clone());
            let decoded = decoder.decode_dir(&source)?;
            info!(
                experiment = key,
                "parsed {} summaries into {} rows",
                decoded.records_read,
                decoded.rows.len()
            );
            Some(decoded.lines())
        } else {
            info!("generated log found at {}, skipping...", log_file.display());
            None
        };

        // The source run's checkpoint is evaluated, matching the copy just made.
        let request = EvaluationRequest::new(
            run.config(),
            source.join(BEST_MODEL_FILE),
            &self.config.evaluation,
        );
        let (log, evaluation) = self
            .write_and_evaluate(&run, lines.as_deref(), &request)
            .await?;

        Ok(ExperimentReport {
            key: key.to_string(),
            stage: self.modernize_stage(&run),
            timestamp,
            config: Some(config),
            checkpoint: Some(checkpoint),
            log,
            rows_written: lines.map_or(0, |l| l.len()),
            evaluation,
        })
    }
}
