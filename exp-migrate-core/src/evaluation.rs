//! Re-invocation of the external evaluation routine.
//!
//! The metric computation lives outside this crate. [`CommandEvaluator`] runs
//! it as a subprocess and forwards its output into the current subscriber, so
//! inside a [`RunLogger`](crate::run_log::RunLogger) scope the evaluator's
//! output lands in the run's canonical log.

use crate::config::EvaluationConfig;
use crate::error::{MigrateError, Result};
use crate::persistence;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One evaluation of a recovered checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub config: PathBuf,
    pub checkpoint: PathBuf,
    pub device: String,
    pub mini_eval: bool,
}

impl EvaluationRequest {
    pub fn new(config: PathBuf, checkpoint: PathBuf, settings: &EvaluationConfig) -> Self {
        Self {
            config,
            checkpoint,
            device: settings.device.clone(),
            mini_eval: settings.mini_eval,
        }
    }

    /// Flags understood by the evaluation entry point.
    pub fn to_args(&self) -> Vec<OsString> {
        vec![
            "--config".into(),
            self.config.clone().into_os_string(),
            "--resume".into(),
            self.checkpoint.clone().into_os_string(),
            "--device".into(),
            self.device.clone().into(),
            "--mini_eval".into(),
            if self.mini_eval { "1" } else { "0" }.into(),
        ]
    }
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<()>;
}

/// Runs the evaluation routine as a subprocess.
pub struct CommandEvaluator {
    program: PathBuf,
    leading_args: Vec<String>,
    visible_devices: Option<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandEvaluator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            visible_devices: None,
            working_dir: None,
            timeout: Duration::from_secs(3600),
        }
    }

    pub fn from_config(config: &EvaluationConfig) -> Self {
        let evaluator = Self::new(&config.program)
            .with_args(config.args.clone())
            .with_visible_devices(config.visible_devices.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs));
        match &config.working_dir {
            Some(dir) => evaluator.with_working_dir(dir),
            None => evaluator,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    pub fn with_visible_devices(mut self, devices: Option<String>) -> Self {
        self.visible_devices = devices;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, request: &EvaluationRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(request.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(devices) = &self.visible_devices {
            cmd.env("CUDA_VISIBLE_DEVICES", devices);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl Evaluator for CommandEvaluator {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<()> {
        debug!(
            program = %self.program.display(),
            checkpoint = %request.checkpoint.display(),
            "Running evaluation"
        );
        let mut child = self.command(request).spawn().map_err(|e| {
            MigrateError::evaluation(format!(
                "failed to spawn {}: {e}",
                self.program.display()
            ))
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            let (_, _, status) = tokio::join!(
                forward_lines(stdout, "stdout"),
                forward_lines(stderr, "stderr"),
                child.wait()
            );
            status
        };

        let status = match tokio::time::timeout(self.timeout, run).await {
            Ok(status) => status?,
            Err(_) => {
                return Err(MigrateError::Timeout(format!(
                    "evaluation of {} timed out after {}s",
                    request.checkpoint.display(),
                    self.timeout.as_secs()
                )));
            }
        };

        if !status.success() {
            return Err(MigrateError::evaluation(format!(
                "evaluation of {} failed ({status})",
                request.checkpoint.display()
            )));
        }
        info!("evaluation of {} finished", request.checkpoint.display());
        Ok(())
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: Option<R>, stream: &'static str) {
    let Some(reader) = reader else {
        return;
    };
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!("{line}"),
            Ok(None) => break,
            Err(e) => {
                warn!(stream, "stopped reading evaluator output: {e}");
                break;
            }
        }
    }
}

/// Written next to the canonical log once an evaluation has succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMarker {
    pub config: PathBuf,
    pub checkpoint: PathBuf,
    pub completed_at: DateTime<Utc>,
}

impl EvaluationMarker {
    pub fn for_request(request: &EvaluationRequest) -> Self {
        Self {
            config: request.config.clone(),
            checkpoint: request.checkpoint.clone(),
            completed_at: Utc::now(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        Ok(persistence::atomic_write_json(path, self)?)
    }
}
