//! # exp-migrate-core: legacy experiment artifact migration
//!
//! Converts experiments recorded by two obsolete logging formats into the
//! canonical layout expected by downstream tooling:
//!
//! - **modernize**: runs that only left a binary event stream get their config
//!   and best checkpoint copied into the canonical tree and an `info.log`
//!   rebuilt from the stream's scalar summaries.
//! - **standardize**: runs with an older text log get it truncated at the
//!   planned final checkpoint and prefixed with their configuration.
//!
//! Both re-run the external evaluation routine against the recovered
//! checkpoint. Every step is skipped when its output already exists, unless
//! a refresh is requested.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod event_stream;
pub mod layout;
pub mod manifest;
pub mod persistence;
pub mod pipeline;
pub mod run_log;
pub mod text_log;
pub mod transfer;

// Re-exports
pub use config::{MigrateConfig, load_config};
pub use error::{MigrateError, Result};
pub use evaluation::{CommandEvaluator, EvaluationRequest, Evaluator};
pub use layout::CanonicalLayout;
pub use manifest::{CheckpointEntry, CheckpointMap, ExperimentList};
pub use pipeline::{
    ExperimentReport, MigrationReport, MigrationStage, Migrator, StatusEntry, StepOutcome, Task,
};
