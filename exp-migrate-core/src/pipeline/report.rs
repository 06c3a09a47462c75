//! Per-experiment outcomes and migration stages.

use crate::transfer::TransferOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which conversion a run performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Event-stream runs -> canonical layout.
    Modernize,
    /// Legacy text logs -> canonical log format.
    Standardize,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Task::Modernize => "modernize",
            Task::Standardize => "standardize",
        })
    }
}

/// How far an experiment has progressed. Stages only move forward; each one
/// implies all earlier ones are satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage {
    NotMigrated,
    /// Config and checkpoint are present in the canonical models tree.
    ArtifactsCopied,
    /// The canonical log has been generated.
    LogGenerated,
    /// Evaluation has run against the recovered checkpoint.
    Complete,
}

impl MigrationStage {
    /// Highest stage whose preconditions all hold.
    pub fn from_checks(artifacts: bool, log: bool, evaluated: bool) -> Self {
        match (artifacts, log, evaluated) {
            (false, _, _) => Self::NotMigrated,
            (true, false, _) => Self::ArtifactsCopied,
            (true, true, false) => Self::LogGenerated,
            (true, true, true) => Self::Complete,
        }
    }
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotMigrated => "not migrated",
            Self::ArtifactsCopied => "artifacts copied",
            Self::LogGenerated => "log generated",
            Self::Complete => "complete",
        };
        f.pad(s)
    }
}

/// Outcome of the log and evaluation transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Done,
    Skipped,
    Disabled,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Disabled => "disabled",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub key: String,
    pub timestamp: String,
    /// `None` when the task does not transfer artifacts (`standardize`).
    pub config: Option<TransferOutcome>,
    pub checkpoint: Option<TransferOutcome>,
    pub log: StepOutcome,
    pub rows_written: usize,
    pub evaluation: StepOutcome,
    pub stage: MigrationStage,
}

impl ExperimentReport {
    /// True when nothing was written for this experiment.
    pub fn is_noop(&self) -> bool {
        let copied = [self.config, self.checkpoint]
            .iter()
            .flatten()
            .any(TransferOutcome::copied);
        !copied && self.log != StepOutcome::Done && self.evaluation != StepOutcome::Done
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub task: Task,
    pub experiments: Vec<ExperimentReport>,
}

impl MigrationReport {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            experiments: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.experiments.iter().all(ExperimentReport::is_noop)
    }

    pub fn count_at(&self, stage: MigrationStage) -> usize {
        self.experiments.iter().filter(|e| e.stage == stage).count()
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} summary ({} experiments):", self.task, self.experiments.len())?;
        for exp in &self.experiments {
            writeln!(
                f,
                "  {:<32} {:<24} log: {:<8} rows: {:<5} eval: {:<8} -> {}",
                exp.key, exp.timestamp, exp.log, exp.rows_written, exp.evaluation, exp.stage
            )?;
        }
        Ok(())
    }
}
