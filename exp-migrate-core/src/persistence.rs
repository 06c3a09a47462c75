//! Atomic file writes and copies.
//!
//! Destinations are written to a `.tmp` sibling and renamed into place, so an
//! interrupted run never leaves a partial file that the skip-if-present checks
//! would mistake for a finished artifact.

use std::io;
use std::path::{Path, PathBuf};

/// Atomically write JSON data to a file, creating parent directories.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file, creating parent directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(path);
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Atomically copy `src` to `dest` byte-for-byte. Returns the number of bytes copied.
pub fn atomic_copy(src: &Path, dest: &Path) -> io::Result<u64> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(dest);
    let bytes = std::fs::copy(src, &tmp)?;
    std::fs::rename(&tmp, dest)?;
    Ok(bytes)
}

/// Load and deserialize JSON from a file. Returns `Ok(None)` if the file doesn't exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

// `model_best.pth` -> `model_best.pth.tmp`; keeps the original extension so two
// artifacts in one directory never share a temp name.
fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Marker {
        checkpoint: String,
        epoch: u32,
    }

    #[test]
    fn test_atomic_write_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evaluation.json");
        let data = Marker {
            checkpoint: "checkpoint-epoch100.pth".into(),
            epoch: 100,
        };

        atomic_write_json(&path, &data).unwrap();
        let loaded: Option<Marker> = load_json(&path).unwrap();
        assert_eq!(loaded, Some(data));
        assert!(!dir.path().join("evaluation.json.tmp").exists());
    }

    #[test]
    fn test_atomic_copy_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("model_best.pth");
        std::fs::write(&src, [0u8, 1, 2, 3, 255]).unwrap();
        let dest = dir.path().join("models").join("exp").join("model_best.pth");

        let bytes = atomic_copy(&src, &dest).unwrap();
        assert_eq!(bytes, 5);
        assert_eq!(std::fs::read(&dest).unwrap(), vec![0u8, 1, 2, 3, 255]);
    }

    #[test]
    fn test_load_json_missing_file() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Marker> = load_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_tmp_sibling_keeps_extension() {
        let tmp = tmp_sibling(Path::new("/a/b/config.json"));
        assert_eq!(tmp, PathBuf::from("/a/b/config.json.tmp"));
    }
}
