//! Filesystem checkpoint store.
//!
//! Layout under the output root:
//!
//! ```text
//! {unit}/done              unit fully attempted
//! {unit}/error             unit-level failure detail
//! {unit}/{item}.json.gz    extraction artifact (gzip JSON)
//! {unit}/{item}.error      item-level failure detail
//! ```
//!
//! Presence or absence of these files is the whole resume state. Every write
//! goes through a temp file in the same directory followed by `fsync` and
//! rename, so a crash never leaves a partially written marker or artifact
//! under its final name.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::types::{CheckpointMarker, ItemRef};

const DONE_MARKER: &str = "done";
const ERROR_MARKER: &str = "error";
const ARTIFACT_SUFFIX: &str = ".json.gz";
const ITEM_ERROR_SUFFIX: &str = ".error";

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode artifact {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode artifact {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The blocking task running a store operation panicked or was cancelled.
    #[error("Checkpoint task failed: {0}")]
    Task(String),
}

impl CheckpointError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Counts over a whole output root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub units: usize,
    pub units_done: usize,
    pub units_errored: usize,
    pub artifacts: usize,
    pub item_errors: usize,
}

/// Durable per-unit and per-item markers rooted at one directory.
///
/// No locking: a unit is owned by exactly one worker for the duration of a
/// dispatch, so writers never race on the same key.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn unit_dir(&self, unit: &str) -> PathBuf {
        self.root.join(unit)
    }

    pub fn artifact_path(&self, unit: &str, item: &ItemRef) -> PathBuf {
        self.unit_dir(unit).join(format!("{}{ARTIFACT_SUFFIX}", item.id))
    }

    pub fn item_error_path(&self, unit: &str, item: &ItemRef) -> PathBuf {
        self.unit_dir(unit).join(format!("{}{ITEM_ERROR_SUFFIX}", item.id))
    }

    /// Create the unit directory if needed.
    pub fn ensure_unit_dir(&self, unit: &str) -> Result<PathBuf, CheckpointError> {
        let dir = self.unit_dir(unit);
        fs::create_dir_all(&dir).map_err(|e| CheckpointError::io(&dir, e))?;
        Ok(dir)
    }

    pub fn is_unit_done(&self, unit: &str) -> bool {
        self.unit_dir(unit).join(DONE_MARKER).is_file()
    }

    /// Write the `done` marker. Idempotent.
    pub fn mark_unit_done(&self, unit: &str) -> Result<(), CheckpointError> {
        let dir = self.ensure_unit_dir(unit)?;
        write_atomic(&dir.join(DONE_MARKER), b"")
    }

    /// Write (or overwrite) the unit `error` marker. Does not set `done`.
    pub fn mark_unit_error(&self, unit: &str, detail: &str) -> Result<(), CheckpointError> {
        let dir = self.ensure_unit_dir(unit)?;
        write_atomic(&dir.join(ERROR_MARKER), detail.as_bytes())
    }

    /// Detail of the unit error marker, if present.
    pub fn unit_error(&self, unit: &str) -> Option<String> {
        fs::read_to_string(self.unit_dir(unit).join(ERROR_MARKER)).ok()
    }

    /// Markers currently present for `unit`.
    pub fn unit_markers(&self, unit: &str) -> Vec<CheckpointMarker> {
        let mut markers = Vec::new();
        if self.is_unit_done(unit) {
            markers.push(CheckpointMarker::Done);
        }
        if let Some(detail) = self.unit_error(unit) {
            markers.push(CheckpointMarker::Error(detail));
        }
        markers
    }

    pub fn has_artifact(&self, unit: &str, item: &ItemRef) -> bool {
        self.artifact_path(unit, item).is_file()
    }

    /// Persist `payload` as the artifact for `item`, clearing any earlier
    /// item error marker.
    pub fn write_artifact<T: Serialize>(
        &self,
        unit: &str,
        item: &ItemRef,
        payload: &T,
    ) -> Result<PathBuf, CheckpointError> {
        let dir = self.ensure_unit_dir(unit)?;
        let path = self.artifact_path(unit, item);

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| CheckpointError::io(&dir, e))?;
        {
            let mut encoder = GzEncoder::new(tmp.as_file_mut(), Compression::default());
            serde_json::to_writer(&mut encoder, payload).map_err(|e| CheckpointError::Encode {
                path: path.clone(),
                source: e,
            })?;
            encoder.finish().map_err(|e| CheckpointError::io(&path, e))?;
        }
        persist(tmp, &path)?;

        // A stale failure from an earlier run no longer applies.
        let error_path = self.item_error_path(unit, item);
        match fs::remove_file(&error_path) {
            Ok(()) => tracing::debug!(unit, item = %item.id, "Cleared stale item error"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(CheckpointError::io(&error_path, e)),
        }
        Ok(path)
    }

    /// Read back an artifact written by [`write_artifact`](Self::write_artifact).
    pub fn read_artifact<T: DeserializeOwned>(
        &self,
        unit: &str,
        item: &ItemRef,
    ) -> Result<T, CheckpointError> {
        let path = self.artifact_path(unit, item);
        let file = File::open(&path).map_err(|e| CheckpointError::io(&path, e))?;
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))
            .map_err(|e| CheckpointError::Decode { path, source: e })
    }

    /// Record an item failure. Never creates an artifact.
    pub fn mark_item_error(
        &self,
        unit: &str,
        item: &ItemRef,
        detail: &str,
    ) -> Result<(), CheckpointError> {
        self.ensure_unit_dir(unit)?;
        write_atomic(&self.item_error_path(unit, item), detail.as_bytes())
    }

    pub fn item_error(&self, unit: &str, item: &ItemRef) -> Option<String> {
        fs::read_to_string(self.item_error_path(unit, item)).ok()
    }

    /// Walk the output root and count markers.
    pub fn summary(&self) -> Result<StoreSummary, CheckpointError> {
        let mut summary = StoreSummary::default();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(summary),
            Err(e) => return Err(CheckpointError::io(&self.root, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| CheckpointError::io(&self.root, e))?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            summary.units += 1;
            for file in fs::read_dir(&dir).map_err(|e| CheckpointError::io(&dir, e))? {
                let file = file.map_err(|e| CheckpointError::io(&dir, e))?;
                let name = file.file_name();
                let name = name.to_string_lossy();
                if name == DONE_MARKER {
                    summary.units_done += 1;
                } else if name == ERROR_MARKER {
                    summary.units_errored += 1;
                } else if name.ends_with(ARTIFACT_SUFFIX) {
                    summary.artifacts += 1;
                } else if name.ends_with(ITEM_ERROR_SUFFIX) {
                    summary.item_errors += 1;
                }
            }
        }
        Ok(summary)
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CheckpointError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CheckpointError::io(dir, e))?;
    tmp.write_all(contents)
        .map_err(|e| CheckpointError::io(path, e))?;
    persist(tmp, path)
}

fn persist(tmp: NamedTempFile, path: &Path) -> Result<(), CheckpointError> {
    tmp.as_file()
        .sync_all()
        .map_err(|e| CheckpointError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| CheckpointError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        steps: Vec<u32>,
    }

    fn item(id: &str) -> ItemRef {
        ItemRef::new(id, format!("/host/{id}.thy"), format!("/afp/{id}.thy"))
    }

    #[test]
    fn fresh_store_has_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        assert!(!store.is_unit_done("Foo"));
        assert!(!store.has_artifact("Foo", &item("a")));
        assert!(store.unit_markers("Foo").is_empty());
    }

    #[test]
    fn mark_done_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        store.mark_unit_done("Foo").unwrap();
        store.mark_unit_done("Foo").unwrap();
        assert!(store.is_unit_done("Foo"));
        assert_eq!(store.unit_markers("Foo"), vec![CheckpointMarker::Done]);
    }

    #[test]
    fn unit_error_overwrites_and_does_not_set_done() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        store.mark_unit_error("Foo", "first").unwrap();
        store.mark_unit_error("Foo", "second").unwrap();
        assert!(!store.is_unit_done("Foo"));
        assert_eq!(store.unit_error("Foo").as_deref(), Some("second"));
    }

    #[test]
    fn artifact_written_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let it = item("Sub.Bar");
        let payload = Payload {
            name: "Bar".into(),
            steps: vec![1, 2, 3],
        };

        let path = store.write_artifact("Foo", &it, &payload).unwrap();
        assert_eq!(path, tmp.path().join("Foo").join("Sub.Bar.json.gz"));
        assert!(store.has_artifact("Foo", &it));

        let back: Payload = store.read_artifact("Foo", &it).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn artifact_is_gzip() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let path = store
            .write_artifact("Foo", &item("a"), &serde_json::json!({"x": 1}))
            .unwrap();
        let bytes = fs::read(path).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        store
            .write_artifact("Foo", &item("a"), &serde_json::json!({}))
            .unwrap();
        store.mark_unit_done("Foo").unwrap();
        let names: Vec<String> = fs::read_dir(tmp.path().join("Foo"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {names:?}");
    }

    #[test]
    fn item_error_is_not_an_artifact() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let it = item("a");
        store.mark_item_error("Foo", &it, "not_found: a.thy").unwrap();
        assert!(!store.has_artifact("Foo", &it));
        assert_eq!(store.item_error("Foo", &it).as_deref(), Some("not_found: a.thy"));
    }

    #[test]
    fn artifact_clears_earlier_item_error() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let it = item("b");
        store.mark_item_error("Foo", &it, "not_found: b.thy").unwrap();

        store
            .write_artifact("Foo", &it, &serde_json::json!({"ok": true}))
            .unwrap();
        assert!(store.has_artifact("Foo", &it));
        assert_eq!(store.item_error("Foo", &it), None);
        assert_eq!(store.summary().unwrap().item_errors, 0);
    }

    #[test]
    fn read_missing_artifact_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        let err = store.read_artifact::<Payload>("Foo", &item("a")).unwrap_err();
        assert!(matches!(err, CheckpointError::Io { .. }));
    }

    #[test]
    fn summary_counts_markers() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path());
        store
            .write_artifact("Foo", &item("a"), &serde_json::json!({}))
            .unwrap();
        store.mark_item_error("Foo", &item("b"), "boom").unwrap();
        store.mark_unit_done("Foo").unwrap();
        store.mark_unit_error("Bar", "refused").unwrap();
        store.mark_unit_done("Bar").unwrap();
        store.ensure_unit_dir("Baz").unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(
            summary,
            StoreSummary {
                units: 3,
                units_done: 2,
                units_errored: 1,
                artifacts: 1,
                item_errors: 1,
            }
        );
    }

    #[test]
    fn summary_of_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = CheckpointStore::new(tmp.path().join("nope"));
        assert_eq!(store.summary().unwrap(), StoreSummary::default());
    }
}
