//! JSON file state store.

use std::io::Write;
use std::path::Path;

use tracing::debug;

use super::{StateStore, ensure_parent, is_unset};
use crate::error::{StoreError, StoreResult};
use crate::types::Snapshot;

/// Persists the snapshot as pretty-printed JSON.
///
/// Writes go to a temporary file in the target's directory which is then
/// renamed over the target, so readers only ever see a complete file.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStateStore;

impl FileStateStore {
    pub fn new() -> Self {
        Self
    }
}

impl StateStore for FileStateStore {
    fn save(&self, path: &Path, snapshot: &Snapshot) -> StoreResult<()> {
        if is_unset(path) {
            return Ok(());
        }
        let data = serde_json::to_vec_pretty(snapshot).map_err(map_err!(Serialize))?;
        let dir = ensure_parent(path)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".tally-state-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

        debug!(?path, bytes = data.len(), "state file written");
        Ok(())
    }

    fn load(&self, path: &Path) -> StoreResult<Snapshot> {
        if is_unset(path) {
            return Ok(Snapshot::default());
        }
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "no state file yet");
                return Ok(Snapshot::default());
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&data).map_err(map_err!(Deserialize))?;
        debug!(
            ?path,
            gauges = snapshot.gauges.len(),
            counters = snapshot.counters.len(),
            "state file loaded"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        let mut snap = Snapshot::default();
        snap.gauges.insert("x".to_string(), 1.5);
        snap.gauges.insert("Alloc".to_string(), 123456.0);
        snap.counters.insert("y".to_string(), 2);
        snap
    }

    #[test]
    fn save_then_load_returns_saved_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        FileStateStore.save(&path, &sample()).unwrap();
        assert_eq!(FileStateStore.load(&path).unwrap(), sample());
    }

    #[test]
    fn file_is_pretty_printed_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        FileStateStore.save(&path, &sample()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"gauges\": {"));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["gauges"]["x"], 1.5);
        assert_eq!(value["counters"]["y"], 2);
    }

    #[test]
    fn repeated_save_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        FileStateStore.save(&path, &sample()).unwrap();
        let first = std::fs::read(&path).unwrap();

        let reloaded = FileStateStore.load(&path).unwrap();
        FileStateStore.save(&path, &reloaded).unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn empty_path_is_noop() {
        FileStateStore.save(Path::new(""), &sample()).unwrap();
        assert_eq!(FileStateStore.load(Path::new("")).unwrap(), Snapshot::default());
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snap = FileStateStore.load(&dir.path().join("absent.json")).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, b"{\"gauges\": {\"x\": ").unwrap();

        let err = FileStateStore.load(&path).unwrap_err();
        assert!(matches!(err, StoreError::Deserialize(_)));
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/metrics.json");
        FileStateStore.save(&path, &sample()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn save_replaces_file_instead_of_rewriting_it() {
        use std::io::Read;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        FileStateStore.save(&path, &sample()).unwrap();
        let before = std::fs::read(&path).unwrap();

        // A reader that opened the previous file keeps seeing it whole.
        let mut reader = std::fs::File::open(&path).unwrap();

        let mut next = Snapshot::default();
        next.counters.insert("y".to_string(), 99);
        FileStateStore.save(&path, &next).unwrap();

        let mut seen = Vec::new();
        reader.read_to_end(&mut seen).unwrap();
        assert_eq!(seen, before);
        assert_eq!(FileStateStore.load(&path).unwrap(), next);
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        FileStateStore.save(&path, &sample()).unwrap();
        FileStateStore.save(&path, &Snapshot::default()).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["metrics.json".to_string()]);
    }

    #[test]
    fn stray_temp_file_does_not_affect_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        FileStateStore.save(&path, &sample()).unwrap();

        // Debris of a save that died before its rename.
        let mut debris = tempfile::Builder::new()
            .prefix(".tally-state-")
            .suffix(".tmp")
            .tempfile_in(dir.path())
            .unwrap();
        debris.write_all(b"{\"gauges\": {\"x\": 9").unwrap();
        let (_file, _debris_path) = debris.keep().unwrap();

        assert_eq!(FileStateStore.load(&path).unwrap(), sample());
    }
}
