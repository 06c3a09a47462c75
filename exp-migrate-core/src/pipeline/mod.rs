//! Migration pipelines.
//!
//! Experiments are processed one at a time, in manifest order. Each one moves
//! through the stages of [`MigrationStage`]; a stage that is already satisfied
//! on disk is skipped unless the migrator was built with `refresh`, so the
//! whole run can be repeated safely.

mod modernize;
mod report;
mod standardize;
mod status;

pub use report::{ExperimentReport, MigrationReport, MigrationStage, StepOutcome, Task};
pub use status::StatusEntry;

use crate::config::MigrateConfig;
use crate::error::Result;
use crate::evaluation::{CommandEvaluator, EvaluationMarker, EvaluationRequest, Evaluator};
use crate::layout::{CanonicalLayout, RunPaths};
use crate::run_log::RunLogger;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

pub struct Migrator {
    config: MigrateConfig,
    layout: CanonicalLayout,
    evaluator: Option<Arc<dyn Evaluator>>,
    refresh: bool,
    console_level: Option<LevelFilter>,
}

impl Migrator {
    /// Build a migrator writing under `config.paths.save_dir`. The evaluator is
    /// a [`CommandEvaluator`] unless evaluation is disabled in the config.
    pub fn new(config: MigrateConfig) -> Self {
        let evaluator: Option<Arc<dyn Evaluator>> = config
            .evaluation
            .enabled
            .then(|| {
                Arc::new(CommandEvaluator::from_config(&config.evaluation)) as Arc<dyn Evaluator>
            });
        Self {
            layout: CanonicalLayout::new(&config.paths.save_dir),
            config,
            evaluator,
            refresh: false,
            console_level: None,
        }
    }

    /// Replace the evaluator; `None` disables evaluation.
    pub fn with_evaluator(mut self, evaluator: Option<Arc<dyn Evaluator>>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Regenerate every stage even when its output already exists.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Mirror per-run log output to stderr at this level.
    pub fn with_console_level(mut self, level: Option<LevelFilter>) -> Self {
        self.console_level = level;
        self
    }

    pub fn layout(&self) -> &CanonicalLayout {
        &self.layout
    }

    /// Write regenerated log `lines` (if any) and run the evaluation when due.
    ///
    /// Evaluation is due when the log was regenerated or no evaluation marker
    /// exists yet. Returns the log and evaluation outcomes.
    async fn write_and_evaluate(
        &self,
        run: &RunPaths,
        lines: Option<&[String]>,
        request: &EvaluationRequest,
    ) -> Result<(StepOutcome, StepOutcome)> {
        let marker = run.evaluation_marker();
        let log_outcome = if lines.is_some() {
            StepOutcome::Done
        } else {
            StepOutcome::Skipped
        };
        let due = lines.is_some() || !marker.exists();
        let evaluator = match &self.evaluator {
            Some(_) if !due => return Ok((log_outcome, StepOutcome::Skipped)),
            None if lines.is_none() => return Ok((log_outcome, StepOutcome::Disabled)),
            other => other.clone(),
        };

        if lines.is_some() {
            remove_if_exists(&run.log_file())?;
            remove_if_exists(&marker)?;
        }
        let logger = RunLogger::open(&run.log_dir, self.console_level)?;
        if let Some(lines) = lines {
            logger.write_rows(lines);
        }

        let Some(evaluator) = evaluator else {
            return Ok((log_outcome, StepOutcome::Disabled));
        };
        logger.scope(evaluator.evaluate(request)).await?;
        EvaluationMarker::for_request(request).write(&marker)?;
        info!(
            checkpoint = %request.checkpoint.display(),
            "evaluation recorded at {}",
            marker.display()
        );
        Ok((log_outcome, StepOutcome::Done))
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
