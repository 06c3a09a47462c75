//! CLI subcommand handlers.

use crate::{Commands, TaskArg};
use anyhow::Context;
use exp_migrate_core::{
    CheckpointMap, ExperimentList, MigrateConfig, MigrationReport, MigrationStage, Migrator,
    StatusEntry, Task,
};
use std::path::Path;
use tracing_subscriber::filter::LevelFilter;

/// Flags shared by every subcommand that are not part of the configuration.
pub struct RunOptions {
    pub refresh: bool,
    pub only: Vec<String>,
    pub console_level: LevelFilter,
}

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    config: MigrateConfig,
    options: &RunOptions,
) -> anyhow::Result<()> {
    match command {
        Commands::Modernize => {
            let (experiments, checkpoints) = load_inputs(
                &config.paths.deprecated_experiments,
                &config.paths.checkpoints,
            )?;
            let experiments = experiments.restrict(&options.only)?;
            let report = migrator(config, options)
                .modernize(&experiments, &checkpoints)
                .await?;
            print_report(&report);
            Ok(())
        }
        Commands::Standardize => {
            let (experiments, checkpoints) = load_inputs(
                &config.paths.non_standard_experiments,
                &config.paths.checkpoints,
            )?;
            let experiments = experiments.restrict(&options.only)?;
            let report = migrator(config, options)
                .standardize(&experiments, &checkpoints)
                .await?;
            print_report(&report);
            Ok(())
        }
        Commands::Status { task } => handle_status(task, config, options),
    }
}

fn migrator(config: MigrateConfig, options: &RunOptions) -> Migrator {
    Migrator::new(config)
        .with_refresh(options.refresh)
        .with_console_level(Some(options.console_level))
}

fn load_inputs(list: &Path, checkpoints: &Path) -> anyhow::Result<(ExperimentList, CheckpointMap)> {
    let experiments = ExperimentList::load(list)
        .with_context(|| format!("failed to load experiment list {}", list.display()))?;
    let checkpoints = CheckpointMap::load(checkpoints)
        .with_context(|| format!("failed to load checkpoint map {}", checkpoints.display()))?;
    Ok((experiments, checkpoints))
}

fn print_report(report: &MigrationReport) {
    tracing::info!(
        task = %report.task,
        experiments = report.experiments.len(),
        complete = report.count_at(MigrationStage::Complete),
        "Migration finished"
    );
    if report.is_noop() {
        println!("Nothing to do: every {} output already exists.", report.task);
    }
    print!("{report}");
}

fn handle_status(
    task: Option<TaskArg>,
    config: MigrateConfig,
    options: &RunOptions,
) -> anyhow::Result<()> {
    let tasks: &[(Task, &Path)] = &[
        (Task::Modernize, &config.paths.deprecated_experiments),
        (Task::Standardize, &config.paths.non_standard_experiments),
    ];
    let selected: Vec<(Task, &Path)> = tasks
        .iter()
        .copied()
        .filter(|(t, _)| task.is_none_or(|arg| arg.task() == *t))
        .collect();

    let checkpoints = CheckpointMap::load(&config.paths.checkpoints).with_context(|| {
        format!(
            "failed to load checkpoint map {}",
            config.paths.checkpoints.display()
        )
    })?;
    let migrator = Migrator::new(config.clone());

    let mut entries = Vec::new();
    for (task, list) in selected {
        let experiments = ExperimentList::load(list)
            .with_context(|| format!("failed to load experiment list {}", list.display()))?;
        let experiments = only_listed(experiments, &options.only);
        entries.extend(migrator.status(task, &experiments, &checkpoints)?);
    }
    print_status(&entries);
    Ok(())
}

// Unlike a migration run, status tolerates keys absent from one of the lists.
fn only_listed(experiments: ExperimentList, only: &[String]) -> ExperimentList {
    if only.is_empty() {
        return experiments;
    }
    ExperimentList::new(
        experiments
            .keys()
            .iter()
            .filter(|k| only.contains(k))
            .cloned()
            .collect(),
    )
}

fn print_status(entries: &[StatusEntry]) {
    if entries.is_empty() {
        println!("No experiments listed.");
        return;
    }
    for entry in entries {
        println!(
            "  {:<12} {:<32} {:<24} {}",
            entry.task, entry.key, entry.timestamp, entry.stage
        );
    }
}

impl TaskArg {
    fn task(self) -> Task {
        match self {
            Self::Modernize => Task::Modernize,
            Self::Standardize => Task::Standardize,
        }
    }
}
