//! Normalization of second-generation text logs.
//!
//! These logs lack the configuration header of the canonical format and some
//! runs kept training for a few epochs past their planned stop. The excess is
//! cut at the line announcing the planned checkpoint; the checkpoints written
//! afterwards are ignored rather than evaluated.

use crate::config::NormalizerConfig;
use crate::error::{MigrateError, Result};
use crate::layout::epoch_checkpoint_name;

/// Start of the first line of every normalized log.
pub const PROVENANCE_PREFIX: &str = "This log was generated from an existing log";

pub struct LogNormalizer {
    config: NormalizerConfig,
}

impl LogNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Index of the single line announcing `checkpoint-epoch<epoch>.pth`.
    pub fn marker_line(&self, log: &[&str], epoch: u32) -> Result<usize> {
        let tag = epoch_checkpoint_name(epoch);
        let hits: Vec<usize> = log
            .iter()
            .enumerate()
            .filter(|(_, line)| line.contains(&tag) && line.contains(&self.config.context_marker))
            .map(|(i, _)| i)
            .collect();
        match hits.as_slice() {
            [pos] => Ok(*pos),
            [] => Err(MigrateError::MarkerNotFound { tag }),
            _ => Err(MigrateError::AmbiguousMarker {
                tag,
                count: hits.len(),
            }),
        }
    }

    /// Build the canonical log for a legacy `log`.
    ///
    /// `experiment` is the run's timestamp directory name and goes into the
    /// provenance line. The result is the provenance line, the verbatim config
    /// lines, then the legacy log up to the marker line (plus the following
    /// line when it is a timing summary).
    pub fn normalize(
        &self,
        log: &str,
        config_text: &str,
        epoch: u32,
        experiment: &str,
    ) -> Result<Vec<String>> {
        let lines: Vec<&str> = log.lines().collect();
        let pos = self.marker_line(&lines, epoch)?;
        let keep_timing = lines
            .get(pos + 1)
            .is_some_and(|next| next.contains(&self.config.timing_marker));
        let end = pos + 1 + usize::from(keep_timing);

        let mut out = Vec::with_capacity(2 + end);
        out.push(format!("{PROVENANCE_PREFIX} for experiment {experiment}"));
        out.push("Launching experiment with config:".to_string());
        out.extend(config_text.lines().map(str::to_string));
        out.extend(lines[..end].iter().map(|l| l.to_string()));
        Ok(out)
    }
}

impl Default for LogNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}
