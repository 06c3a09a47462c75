//! Configuration for exp-migrate.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment.
//! CLI flags are applied on top by the binary. The config file is
//! `exp-migrate.toml` in the working directory unless an explicit path is given.

use crate::error::{MigrateError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-level config file.
pub const CONFIG_FILE_NAME: &str = "exp-migrate.toml";

/// Prefix for environment overrides (`EXP_MIGRATE_PATHS__SAVE_DIR`, ...).
pub const ENV_PREFIX: &str = "EXP_MIGRATE_";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrateConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub event_stream: EventStreamConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// Input manifests and the canonical output root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the canonical `log/` and `models/` trees.
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
    /// Experiments recorded with event-stream files (`modernize`).
    #[serde(default = "default_deprecated_experiments")]
    pub deprecated_experiments: PathBuf,
    /// Experiments recorded with the older text log format (`standardize`).
    #[serde(default = "default_non_standard_experiments")]
    pub non_standard_experiments: PathBuf,
    /// Experiment name -> `{timestamp, epoch}` map.
    #[serde(default = "default_checkpoints")]
    pub checkpoints: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            deprecated_experiments: default_deprecated_experiments(),
            non_standard_experiments: default_non_standard_experiments(),
            checkpoints: default_checkpoints(),
        }
    }
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("data/saved")
}

fn default_deprecated_experiments() -> PathBuf {
    PathBuf::from("misc/experiments-deprecated.json")
}

fn default_non_standard_experiments() -> PathBuf {
    PathBuf::from("misc/experiments-non-standard.json")
}

fn default_checkpoints() -> PathBuf {
    PathBuf::from("misc/server-checkpoints.json")
}

/// Event-stream decoding limits and subsampling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStreamConfig {
    /// File name prefix used to locate the stream inside a run directory.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Maximum number of records read from one stream.
    #[serde(default = "default_record_limit")]
    pub record_limit: usize,
    /// The dominant metric is only emitted on steps that are multiples of this.
    #[serde(default = "default_subsample_every")]
    pub subsample_every: i64,
    /// Tag of the high-frequency metric that gets subsampled.
    #[serde(default = "default_dominant_tag")]
    pub dominant_tag: String,
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            file_prefix: default_file_prefix(),
            record_limit: default_record_limit(),
            subsample_every: default_subsample_every(),
            dominant_tag: default_dominant_tag(),
        }
    }
}

fn default_file_prefix() -> String {
    "events.out.tfevents.".to_string()
}

fn default_record_limit() -> usize {
    1000
}

fn default_subsample_every() -> i64 {
    2000
}

fn default_dominant_tag() -> String {
    "train/loss".to_string()
}

/// Markers used to truncate legacy text logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Token that must share the line with the checkpoint file name.
    #[serde(default = "default_context_marker")]
    pub context_marker: String,
    /// A line containing this right after the checkpoint line is kept.
    #[serde(default = "default_timing_marker")]
    pub timing_marker: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            context_marker: default_context_marker(),
            timing_marker: default_timing_marker(),
        }
    }
}

fn default_context_marker() -> String {
    "trainer".to_string()
}

fn default_timing_marker() -> String {
    "Training took".to_string()
}

/// External evaluation routine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Disable to stop each experiment once its log is written.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Program to execute.
    #[serde(default = "default_program")]
    pub program: String,
    /// Leading arguments, before the generated `--config`/`--resume` flags.
    #[serde(default = "default_program_args")]
    pub args: Vec<String>,
    /// Value passed as `--device`.
    #[serde(default = "default_device", deserialize_with = "deserialize_device")]
    pub device: String,
    /// Exported as `CUDA_VISIBLE_DEVICES` to the evaluator when set.
    #[serde(default, deserialize_with = "deserialize_visible_devices")]
    pub visible_devices: Option<String>,
    /// Run the reduced evaluation split.
    #[serde(default = "default_true")]
    pub mini_eval: bool,
    /// Directory the evaluator is started in (defaults to the current one).
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Per-experiment evaluation timeout (seconds).
    #[serde(default = "default_eval_timeout")]
    pub timeout_secs: u64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_program(),
            args: default_program_args(),
            device: default_device(),
            visible_devices: None,
            mini_eval: true,
            working_dir: None,
            timeout_secs: default_eval_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_program_args() -> Vec<String> {
    vec!["test_matching.py".to_string()]
}

fn default_device() -> String {
    "0".to_string()
}

fn default_eval_timeout() -> u64 {
    3600
}

// A lone GPU index from the environment (`..__VISIBLE_DEVICES=2`) arrives as a
// number; lists like "2,3" stay strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum DeviceSelector {
    Index(u64),
    List(String),
}

impl From<DeviceSelector> for String {
    fn from(selector: DeviceSelector) -> Self {
        match selector {
            DeviceSelector::Index(i) => i.to_string(),
            DeviceSelector::List(s) => s,
        }
    }
}

fn deserialize_device<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    DeviceSelector::deserialize(deserializer).map(String::from)
}

fn deserialize_visible_devices<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<DeviceSelector>::deserialize(deserializer)?.map(String::from))
}

impl MigrateConfig {
    /// Reject values that would make a pipeline silently misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.event_stream.record_limit == 0 {
            return Err(MigrateError::config("event_stream.record_limit must be > 0"));
        }
        if self.event_stream.subsample_every <= 0 {
            return Err(MigrateError::config(
                "event_stream.subsample_every must be > 0",
            ));
        }
        if self.normalizer.context_marker.is_empty() {
            return Err(MigrateError::config("normalizer.context_marker is empty"));
        }
        if self.evaluation.enabled && self.evaluation.program.trim().is_empty() {
            return Err(MigrateError::config("evaluation.program is empty"));
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `EXP_MIGRATE_`, `__` separates sections)
/// 2. `explicit` config file, or `<workspace>/exp-migrate.toml` when none is given
/// 3. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> std::result::Result<MigrateConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(MigrateConfig::default()));

    match (explicit, workspace) {
        (Some(path), _) => figment = figment.merge(Toml::file(path)),
        (None, Some(ws)) => {
            let ws_config = ws.join(CONFIG_FILE_NAME);
            if ws_config.exists() {
                figment = figment.merge(Toml::file(&ws_config));
            }
        }
        (None, None) => {}
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MigrateConfig::default();
        assert_eq!(config.paths.save_dir, PathBuf::from("data/saved"));
        assert_eq!(config.event_stream.record_limit, 1000);
        assert_eq!(config.event_stream.subsample_every, 2000);
        assert_eq!(config.event_stream.dominant_tag, "train/loss");
        assert_eq!(config.normalizer.context_marker, "trainer");
        assert_eq!(config.normalizer.timing_marker, "Training took");
        assert!(config.evaluation.enabled);
        assert!(config.evaluation.mini_eval);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_defaults() {
        figment::Jail::expect_with(|jail| {
            let config = load_config(Some(jail.directory()), None).map_err(|e| *e)?;
            assert_eq!(
                config.paths.checkpoints,
                PathBuf::from("misc/server-checkpoints.json")
            );
            assert_eq!(config.evaluation.visible_devices, None);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_from_workspace() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE_NAME,
                r#"
[paths]
save_dir = "/archive/saved"

[event_stream]
record_limit = 50

[evaluation]
program = "/opt/venv/bin/python"
args = ["-m", "eval.matching"]
device = 3
"#,
            )?;

            let config = load_config(Some(jail.directory()), None).map_err(|e| *e)?;
            assert_eq!(config.paths.save_dir, PathBuf::from("/archive/saved"));
            assert_eq!(config.event_stream.record_limit, 50);
            // Unset keys keep their defaults.
            assert_eq!(config.event_stream.subsample_every, 2000);
            assert_eq!(config.evaluation.args, vec!["-m", "eval.matching"]);
            assert_eq!(config.evaluation.device, "3");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE_NAME,
                "[paths]\nsave_dir = \"/from/file\"\n\n[evaluation]\ndevice = \"1\"\n",
            )?;
            jail.set_env("EXP_MIGRATE_PATHS__SAVE_DIR", "/from/env");
            jail.set_env("EXP_MIGRATE_EVALUATION__DEVICE", "3");
            jail.set_env("EXP_MIGRATE_EVALUATION__VISIBLE_DEVICES", "2");
            jail.set_env("EXP_MIGRATE_EVENT_STREAM__RECORD_LIMIT", "250");

            let config = load_config(Some(jail.directory()), None).map_err(|e| *e)?;
            assert_eq!(config.paths.save_dir, PathBuf::from("/from/env"));
            assert_eq!(config.evaluation.device, "3");
            assert_eq!(config.evaluation.visible_devices.as_deref(), Some("2"));
            assert_eq!(config.event_stream.record_limit, 250);
            Ok(())
        });
    }

    #[test]
    fn test_env_device_list_stays_text() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("EXP_MIGRATE_EVALUATION__VISIBLE_DEVICES", "2,3");
            let config = load_config(Some(jail.directory()), None).map_err(|e| *e)?;
            assert_eq!(config.evaluation.visible_devices.as_deref(), Some("2,3"));
            assert_eq!(config.evaluation.device, "0");
            Ok(())
        });
    }

    #[test]
    fn test_explicit_config_wins_over_workspace() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE_NAME, "[normalizer]\ncontext_marker = \"workspace\"\n")?;
            jail.create_file("other.toml", "[normalizer]\ncontext_marker = \"explicit\"\n")?;
            let explicit = jail.directory().join("other.toml");

            let config =
                load_config(Some(jail.directory()), Some(&explicit)).map_err(|e| *e)?;
            assert_eq!(config.normalizer.context_marker, "explicit");
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = MigrateConfig::default();
        config.event_stream.record_limit = 0;
        assert!(matches!(config.validate(), Err(MigrateError::Config(_))));

        let mut config = MigrateConfig::default();
        config.event_stream.subsample_every = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ignores_program_when_disabled() {
        let mut config = MigrateConfig::default();
        config.evaluation.program = String::new();
        assert!(config.validate().is_err());
        config.evaluation.enabled = false;
        assert!(config.validate().is_ok());
    }
}
