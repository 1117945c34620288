//! JSON file helpers shared by the driver, the workers and the merger.
//!
//! Every file another process may read is published with [`write_json_atomic`]:
//! the bytes go to a temporary file in the destination directory, are synced, and the file is renamed into place.
//! A reader therefore sees either the previous state or the complete new file, never a prefix.
use std::{
    fs,
    io::{ErrorKind, Write},
    path::Path,
};

use serde::{Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;
use tracing::trace;

use crate::error::CoreError;

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CoreError> {
    let bytes = fs::read(path).map_err(|e| CoreError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| CoreError::json(path, e))
}

/// Pretty JSON with a trailing newline. Deterministic for a given value.
pub fn to_json_bytes<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<Vec<u8>, CoreError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| CoreError::json(path, e))?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CoreError> {
    let bytes = to_json_bytes(path, value)?;
    write_atomic(path, &bytes)
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CoreError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| CoreError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CoreError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| CoreError::io(path, e.error))?;

    trace!(target: "vqa.core.fsio", path = %path.display(), bytes = bytes.len(), "published");
    Ok(())
}

/// Remove a file, treating "already gone" as success.
pub fn remove_if_exists(path: &Path) -> Result<(), CoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");

        write_json_atomic(&path, &vec![1, 2]).unwrap();
        write_json_atomic(&path, &vec![3]).unwrap();

        let back: Vec<i32> = read_json(&path).unwrap();
        assert_eq!(back, vec![3]);

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn read_reports_missing_and_malformed_files() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(read_json::<Vec<i32>>(&missing), Err(CoreError::Io { .. })));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, b"[1, 2").unwrap();
        assert!(matches!(read_json::<Vec<i32>>(&broken), Err(CoreError::Json { .. })));
    }

    #[test]
    fn remove_if_exists_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.json");
        fs::write(&path, b"{}").unwrap();

        remove_if_exists(&path).unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.exists());
    }
}
