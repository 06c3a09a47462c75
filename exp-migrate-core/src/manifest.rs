//! Experiment manifests.
//!
//! Two kinds of JSON file drive a migration: an experiment list naming the keys
//! to process, and a checkpoint map resolving each key to its run timestamp and
//! target epoch.

use crate::error::{MigrateError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Ordered experiment keys.
///
/// The file may be a JSON array of names or an object keyed by name (values are
/// ignored and keys iterate in sorted order).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExperimentList {
    keys: Vec<String>,
}

impl<'de> Deserialize<'de> for ExperimentList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Keys(Vec<String>),
            Map(serde_json::Map<String, serde_json::Value>),
        }

        let keys = match Raw::deserialize(deserializer)? {
            Raw::Keys(keys) => keys,
            Raw::Map(map) => map.into_iter().map(|(k, _)| k).collect(),
        };
        Ok(Self { keys })
    }
}

impl ExperimentList {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_manifest(path, "experiment list")
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Keep only the keys listed in `only`. An empty filter keeps everything.
    /// Unknown names in the filter are an error so typos don't pass silently.
    pub fn restrict(self, only: &[String]) -> Result<Self> {
        if only.is_empty() {
            return Ok(self);
        }
        if let Some(unknown) = only.iter().find(|k| !self.keys.contains(k)) {
            return Err(MigrateError::manifest(format!(
                "experiment '{unknown}' is not listed in the manifest"
            )));
        }
        let keys = self.keys.into_iter().filter(|k| only.contains(k)).collect();
        Ok(Self { keys })
    }
}

/// Where one experiment's artifacts live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    /// Legacy run directory (modernize) or canonical timestamp directory name (standardize).
    pub timestamp: String,
    /// Epoch of the checkpoint the run was meant to stop at.
    #[serde(default, deserialize_with = "deserialize_epoch")]
    pub epoch: Option<u32>,
}

impl CheckpointEntry {
    /// Final path component of `timestamp`, the run's timestamp directory name.
    pub fn run_timestamp(&self) -> Result<String> {
        Path::new(&self.timestamp)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                MigrateError::manifest(format!(
                    "timestamp '{}' has no final path component",
                    self.timestamp
                ))
            })
    }
}

// Older maps wrote epochs as strings ("100"); accept both.
fn deserialize_epoch<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid epoch '{s}'"))),
    }
}

/// Experiment name -> checkpoint location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointMap {
    entries: BTreeMap<String, CheckpointEntry>,
}

impl CheckpointMap {
    pub fn load(path: &Path) -> Result<Self> {
        load_manifest(path, "checkpoint map")
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: CheckpointEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn get(&self, key: &str) -> Result<&CheckpointEntry> {
        self.entries
            .get(key)
            .ok_or_else(|| MigrateError::manifest(format!("no checkpoint entry for '{key}'")))
    }

    /// The entry for `key` together with its required epoch.
    pub fn get_with_epoch(&self, key: &str) -> Result<(&CheckpointEntry, u32)> {
        let entry = self.get(key)?;
        let epoch = entry
            .epoch
            .ok_or_else(|| MigrateError::manifest(format!("no epoch recorded for '{key}'")))?;
        Ok((entry, epoch))
    }
}

fn load_manifest<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MigrateError::manifest(format!("failed to read {what} {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        MigrateError::manifest(format!("failed to parse {what} {}: {e}", path.display()))
    })
}
