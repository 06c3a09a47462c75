//! exp-migrate: migrate legacy experiment artifacts into the canonical layout.

mod commands;

use anyhow::Context;
use clap::Parser;
use exp_migrate_core::MigrateConfig;
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Migrate legacy experiments (event-stream and old text-log runs) into the
/// canonical log/models layout and re-run their evaluation.
#[derive(Parser, Debug)]
#[command(name = "exp-migrate", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (default: ./exp-migrate.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Canonical output root
    #[arg(long, global = true)]
    save_dir: Option<PathBuf>,

    /// Deprecated-experiment list (event-stream runs)
    #[arg(long, global = true)]
    dep_exps: Option<PathBuf>,

    /// Non-standard-experiment list (old text-log runs)
    #[arg(long, global = true)]
    non_std_exps: Option<PathBuf>,

    /// Checkpoint-location map
    #[arg(long, global = true)]
    ckpts_path: Option<PathBuf>,

    /// Regenerate every output even if it already exists
    #[arg(long, global = true)]
    refresh: bool,

    /// Device selector exported to the evaluator as CUDA_VISIBLE_DEVICES
    #[arg(long, global = true)]
    device: Option<String>,

    /// Skip evaluation re-invocation
    #[arg(long, global = true)]
    no_eval: bool,

    /// Restrict the run to these experiment keys
    #[arg(long, global = true, num_args = 1..)]
    only: Vec<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Rebuild logs of event-stream runs and copy their artifacts
    Modernize,
    /// Rewrite old text logs in the canonical format
    Standardize,
    /// Show the migration stage of every listed experiment
    Status {
        /// Only inspect one task (default: both)
        #[arg(long, value_enum)]
        task: Option<TaskArg>,
    },
}

impl Commands {
    /// Directory of the JSON run log. `status` only reads the tree, so it gets none.
    fn json_log_dir(&self, config: &MigrateConfig) -> Option<PathBuf> {
        match self {
            Commands::Modernize | Commands::Standardize => {
                Some(config.paths.save_dir.join(".exp-migrate").join("logs"))
            }
            Commands::Status { .. } => None,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TaskArg {
    Modernize,
    Standardize,
}

impl Cli {
    fn level(&self) -> LevelFilter {
        match self.verbose {
            0 if self.quiet => LevelFilter::ERROR,
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// Fold command-line overrides into the loaded configuration.
    fn apply_overrides(&self, config: &mut MigrateConfig) {
        if let Some(dir) = &self.save_dir {
            config.paths.save_dir = dir.clone();
        }
        if let Some(path) = &self.dep_exps {
            config.paths.deprecated_experiments = path.clone();
        }
        if let Some(path) = &self.non_std_exps {
            config.paths.non_standard_experiments = path.clone();
        }
        if let Some(path) = &self.ckpts_path {
            config.paths.checkpoints = path.clone();
        }
        if let Some(device) = &self.device {
            config.evaluation.visible_devices = Some(device.clone());
        }
        if self.no_eval {
            config.evaluation.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if let Some(path) = &cli.config {
        anyhow::ensure!(path.is_file(), "config file not found: {}", path.display());
    }
    let mut config = exp_migrate_core::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    let level = cli.level();

    // Human-readable layer for stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(level.to_string()));

    // JSON file layer for structured logging, only for commands that write
    let (json_layer, _guard) = match cli.command.json_log_dir(&config) {
        Some(log_dir) => {
            let _ = std::fs::create_dir_all(&log_dir);
            let file_appender = tracing_appender::rolling::daily(&log_dir, "exp-migrate.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let options = commands::RunOptions {
        refresh: cli.refresh,
        only: cli.only,
        console_level: level,
    };
    commands::handle_command(cli.command, config, &options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "exp-migrate",
            "modernize",
            "--refresh",
            "--device",
            "1",
            "--only",
            "celeba",
            "aflw",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Modernize));
        assert!(cli.refresh);
        assert_eq!(cli.device.as_deref(), Some("1"));
        assert_eq!(cli.only, vec!["celeba".to_string(), "aflw".to_string()]);
    }

    #[test]
    fn test_status_task_selector() {
        let cli = Cli::try_parse_from(["exp-migrate", "status", "--task", "standardize"]).unwrap();
        match cli.command {
            Commands::Status { task } => assert_eq!(task, Some(TaskArg::Standardize)),
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["exp-migrate", "status", "--task", "both"]).is_err());
    }

    #[test]
    fn test_status_gets_no_json_log() {
        let mut config = MigrateConfig::default();
        config.paths.save_dir = PathBuf::from("/data/saved");

        let status = Cli::try_parse_from(["exp-migrate", "status"]).unwrap();
        assert_eq!(status.command.json_log_dir(&config), None);

        for task in ["modernize", "standardize"] {
            let cli = Cli::try_parse_from(["exp-migrate", task]).unwrap();
            assert_eq!(
                cli.command.json_log_dir(&config),
                Some(PathBuf::from("/data/saved/.exp-migrate/logs"))
            );
        }
    }

    #[test]
    fn test_requires_subcommand() {
        assert!(Cli::try_parse_from(["exp-migrate", "--refresh"]).is_err());
    }

    #[test]
    fn test_verbosity_levels() {
        let parse = |args: &[&str]| {
            let mut full = vec!["exp-migrate"];
            full.extend_from_slice(args);
            full.push("status");
            Cli::try_parse_from(full).unwrap().level()
        };
        assert_eq!(parse(&[]), LevelFilter::INFO);
        assert_eq!(parse(&["-q"]), LevelFilter::ERROR);
        assert_eq!(parse(&["-v"]), LevelFilter::DEBUG);
        assert_eq!(parse(&["-vv"]), LevelFilter::TRACE);
    }

    #[test]
    fn test_overrides_win_over_config() {
        let cli = Cli::try_parse_from([
            "exp-migrate",
            "--save-dir",
            "/tmp/out",
            "--ckpts-path",
            "ckpts.json",
            "--device",
            "2",
            "--no-eval",
            "standardize",
        ])
        .unwrap();
        let mut config = MigrateConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.paths.save_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.paths.checkpoints, PathBuf::from("ckpts.json"));
        assert_eq!(
            config.paths.deprecated_experiments,
            MigrateConfig::default().paths.deprecated_experiments
        );
        assert_eq!(config.evaluation.visible_devices.as_deref(), Some("2"));
        assert!(!config.evaluation.enabled);
    }
}
