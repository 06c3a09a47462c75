//! Per-run canonical log.
//!
//! A migrated experiment's `info.log` is written by a scoped `tracing`
//! subscriber: every event emitted while the scope is active (generated rows,
//! evaluator output, pipeline messages) is appended to the run's log file and,
//! optionally, mirrored to stderr.

use crate::error::{MigrateError, Result};
use crate::layout::LOG_FILE;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::Dispatch;
use tracing::instrument::WithSubscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;

/// Target used for the lines that make up the migrated log body.
pub const ROW_TARGET: &str = "migrated";

pub struct RunLogger {
    path: PathBuf,
    dispatch: Dispatch,
}

impl RunLogger {
    /// Bind a logger to `<log_dir>/info.log`, creating the directory.
    /// Lines are appended to an existing file.
    pub fn open(log_dir: &Path, mirror: Option<LevelFilter>) -> Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(LOG_FILE)
            .build(log_dir)
            .map_err(|e| MigrateError::Io(std::io::Error::other(e)))?;

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(appender)
            .with_ansi(false)
            .with_target(false)
            .with_filter(LevelFilter::INFO);
        let stderr_layer = mirror.map(|level| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(level)
        });

        let subscriber = tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer);

        Ok(Self {
            path: log_dir.join(LOG_FILE),
            dispatch: Dispatch::new(subscriber),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with this logger as the default subscriber.
    pub fn scope_sync<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    /// Drive `fut` with this logger as the default subscriber.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        fut.with_subscriber(self.dispatch.clone()).await
    }

    /// Append `lines` as log rows, in order.
    pub fn write_rows(&self, lines: &[String]) {
        self.scope_sync(|| {
            for line in lines {
                tracing::info!(target: ROW_TARGET, "{line}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_rows_are_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let logger = RunLogger::open(&dir.path().join("log/exp/ts"), None).unwrap();
        logger.write_rows(&["first row".into(), "second row".into()]);

        let lines = read_lines(logger.path());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("first row"));
        assert!(lines[1].ends_with("second row"));
        assert!(lines[0].contains("INFO"));
        assert!(!lines[0].contains('\u{1b}'), "log file must not contain ANSI escapes");
    }

    #[test]
    fn test_debug_events_are_not_captured() {
        let dir = tempfile::tempdir().unwrap();
        let logger = RunLogger::open(dir.path(), None).unwrap();
        logger.scope_sync(|| {
            tracing::debug!("noise");
            tracing::warn!("kept");
        });
        let lines = read_lines(logger.path());
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("kept"));
    }

    #[test]
    fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        RunLogger::open(dir.path(), None)
            .unwrap()
            .write_rows(&["one".into()]);
        RunLogger::open(dir.path(), None)
            .unwrap()
            .write_rows(&["two".into()]);
        let lines = read_lines(&dir.path().join(LOG_FILE));
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn test_async_scope_captures_events() {
        let dir = tempfile::tempdir().unwrap();
        let logger = RunLogger::open(dir.path(), None).unwrap();
        logger
            .scope(async {
                tokio::task::yield_now().await;
                tracing::info!("from the future");
            })
            .await;
        let lines = read_lines(logger.path());
        assert!(lines[0].ends_with("from the future"));
    }
}
