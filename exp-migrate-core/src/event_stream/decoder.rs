//! Turns a legacy event stream into canonical log rows.

use super::proto::{Event, summary_value::Kind};
use super::record::{RecordError, RecordReader};
use crate::config::EventStreamConfig;
use crate::error::{MigrateError, Result};
use chrono::{DateTime, Utc};
use prost::Message;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d:%Hh%Mm%Ss";

/// A scalar summary kept by the subsampling policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarRow {
    pub wall_time: f64,
    pub step: i64,
    pub values: Vec<(String, f32)>,
}

impl fmt::Display for ScalarRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = DateTime::<Utc>::from_timestamp(self.wall_time.floor() as i64, 0)
            .unwrap_or_default()
            .format(TIMESTAMP_FORMAT);
        let values = self
            .values
            .iter()
            .map(|(tag, v)| format!("{tag}: {}", format_value(*v)))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{ts} step: {}, {values}", self.step)
    }
}

// Widened to f64 and printed as the shortest round-trip decimal, always with a
// fractional part (`1.0`, `0.10000000149011612`). Exponents carry a sign and at
// least two digits (`9.999999747378752e-06`, `1e+16`), as earlier logs did.
fn format_value(v: f32) -> String {
    let v = f64::from(v);
    if v.is_nan() {
        return "nan".to_string();
    }
    let repr = format!("{v:?}");
    match repr.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => repr,
    }
}

/// Everything recovered from one stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    pub source: PathBuf,
    pub rows: Vec<ScalarRow>,
    pub records_read: usize,
    /// Reading stopped at the record cap.
    pub capped: bool,
    /// Reading stopped at a corrupted record.
    pub truncated: bool,
}

impl DecodedLog {
    pub fn provenance(&self) -> String {
        let name = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("This log was generated from tensorboard file {name}")
    }

    /// Canonical log lines: provenance first, then one line per row.
    pub fn lines(&self) -> Vec<String> {
        std::iter::once(self.provenance())
            .chain(self.rows.iter().map(ToString::to_string))
            .collect()
    }
}

pub struct EventStreamDecoder {
    config: EventStreamConfig,
}

impl EventStreamDecoder {
    pub fn new(config: EventStreamConfig) -> Self {
        Self { config }
    }

    /// Find the single event-stream file directly inside `dir`.
    pub fn locate(&self, dir: &Path) -> Result<PathBuf> {
        if !dir.is_dir() {
            return Err(MigrateError::missing("run directory", dir));
        }
        let mut found = Vec::new();
        for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| MigrateError::Io(e.into()))?;
            if entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(&self.config.file_prefix)
            {
                found.push(entry.into_path());
            }
        }
        match found.len() {
            1 => Ok(found.remove(0)),
            count => Err(MigrateError::EventFileCount {
                dir: dir.to_path_buf(),
                count,
            }),
        }
    }

    /// Locate and decode the stream of a legacy run directory.
    pub fn decode_dir(&self, dir: &Path) -> Result<DecodedLog> {
        let path = self.locate(dir)?;
        self.decode_file(&path)
    }

    pub fn decode_file(&self, path: &Path) -> Result<DecodedLog> {
        let file = File::open(path)?;
        self.decode_reader(BufReader::new(file), path)
    }

    /// Decode records from `reader`; `source` names the stream in rows and errors.
    pub fn decode_reader<R: Read>(&self, reader: R, source: &Path) -> Result<DecodedLog> {
        let mut log = DecodedLog {
            source: source.to_path_buf(),
            rows: Vec::new(),
            records_read: 0,
            capped: false,
            truncated: false,
        };

        for record in RecordReader::new(reader) {
            if log.records_read >= self.config.record_limit {
                log.capped = true;
                break;
            }
            log.records_read += 1;

            let event = match record.and_then(|payload| Ok(Event::decode(payload.as_slice())?)) {
                Ok(event) => event,
                Err(e) => {
                    warn_corrupted(source, log.records_read, &e);
                    log.truncated = true;
                    break;
                }
            };

            if let Some(row) = self.scalar_row(&event, source, log.records_read)? {
                log.rows.push(row);
            }
        }

        debug!(
            source = %source.display(),
            records = log.records_read,
            rows = log.rows.len(),
            capped = log.capped,
            "Parsed event stream"
        );
        Ok(log)
    }

    fn scalar_row(
        &self,
        event: &Event,
        source: &Path,
        index: usize,
    ) -> Result<Option<ScalarRow>> {
        let Some(first) = event.summary.as_ref().and_then(|s| s.value.first()) else {
            return Ok(None);
        };
        let values = match &first.kind {
            Some(Kind::SimpleValue(_)) => event
                .summary
                .iter()
                .flat_map(|s| s.value.iter())
                .map(|v| match &v.kind {
                    Some(Kind::SimpleValue(x)) => Ok((v.tag.clone(), *x)),
                    other => Err(unexpected(source, index, &v.tag, other.as_ref())),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(Kind::Image(_)) => return Ok(None),
            other => return Err(unexpected(source, index, &first.tag, other.as_ref())),
        };

        let on_period = event.step.rem_euclid(self.config.subsample_every) == 0;
        if !on_period && first.tag == self.config.dominant_tag {
            return Ok(None);
        }
        Ok(Some(ScalarRow {
            wall_time: event.wall_time,
            step: event.step,
            values,
        }))
    }
}

fn unexpected(source: &Path, index: usize, tag: &str, kind: Option<&Kind>) -> MigrateError {
    MigrateError::UnexpectedRecord {
        file: source.to_path_buf(),
        index,
        tag: tag.to_string(),
        kind: kind.map_or("empty", Kind::name),
    }
}

fn warn_corrupted(source: &Path, index: usize, err: &RecordError) {
    warn!(
        source = %source.display(),
        record = index,
        "{err}; could not parse any further information"
    );
}
