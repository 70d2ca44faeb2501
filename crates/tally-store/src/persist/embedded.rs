//! Embedded redb state store.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableError};
use tracing::debug;

use super::{StateStore, ensure_parent, is_unset};
use crate::error::{StoreError, StoreResult};
use crate::tables::{COUNTERS, GAUGES};
use crate::types::Snapshot;

/// Persists the snapshot into a redb database file.
///
/// Each save drops and refills both tables inside a single write
/// transaction; an interrupted save is rolled back by redb on next open.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedbStateStore;

impl RedbStateStore {
    pub fn new() -> Self {
        Self
    }
}

impl StateStore for RedbStateStore {
    fn save(&self, path: &Path, snapshot: &Snapshot) -> StoreResult<()> {
        if is_unset(path) {
            return Ok(());
        }
        ensure_parent(path)?;
        let db = Database::create(path).map_err(map_err!(Open))?;
        let txn = db.begin_write().map_err(map_err!(Transaction))?;
        {
            txn.delete_table(GAUGES).map_err(map_err!(Table))?;
            txn.delete_table(COUNTERS).map_err(map_err!(Table))?;

            let mut gauges = txn.open_table(GAUGES).map_err(map_err!(Table))?;
            for (name, value) in &snapshot.gauges {
                gauges
                    .insert(name.as_str(), *value)
                    .map_err(map_err!(Write))?;
            }
            let mut counters = txn.open_table(COUNTERS).map_err(map_err!(Table))?;
            for (name, value) in &snapshot.counters {
                counters
                    .insert(name.as_str(), *value)
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(?path, "state database written");
        Ok(())
    }

    fn load(&self, path: &Path) -> StoreResult<Snapshot> {
        if is_unset(path) || !path.exists() {
            return Ok(Snapshot::default());
        }
        let db = Database::open(path).map_err(map_err!(Open))?;
        let txn = db.begin_read().map_err(map_err!(Transaction))?;
        let mut snapshot = Snapshot::default();

        match txn.open_table(GAUGES) {
            Ok(table) => {
                for entry in table.iter().map_err(map_err!(Read))? {
                    let (name, value) = entry.map_err(map_err!(Read))?;
                    snapshot.gauges.insert(name.value().to_string(), value.value());
                }
            }
            Err(TableError::TableDoesNotExist(_)) => {}
            Err(e) => return Err(StoreError::Table(e.to_string())),
        }

        match txn.open_table(COUNTERS) {
            Ok(table) => {
                for entry in table.iter().map_err(map_err!(Read))? {
                    let (name, value) = entry.map_err(map_err!(Read))?;
                    snapshot.counters.insert(name.value().to_string(), value.value());
                }
            }
            Err(TableError::TableDoesNotExist(_)) => {}
            Err(e) => return Err(StoreError::Table(e.to_string())),
        }

        debug!(?path, "state database loaded");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        let mut snap = Snapshot::default();
        snap.gauges.insert("x".to_string(), 1.5);
        snap.counters.insert("y".to_string(), 2);
        snap.counters.insert("neg".to_string(), -7);
        snap
    }

    #[test]
    fn save_then_load_returns_saved_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");

        RedbStateStore.save(&path, &sample()).unwrap();
        assert_eq!(RedbStateStore.load(&path).unwrap(), sample());
    }

    #[test]
    fn save_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        RedbStateStore.save(&path, &sample()).unwrap();

        let mut next = Snapshot::default();
        next.gauges.insert("z".to_string(), 3.0);
        RedbStateStore.save(&path, &next).unwrap();

        assert_eq!(RedbStateStore.load(&path).unwrap(), next);
    }

    #[test]
    fn missing_database_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snap = RedbStateStore.load(&dir.path().join("absent.redb")).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn empty_path_is_noop() {
        RedbStateStore.save(Path::new(""), &sample()).unwrap();
        assert!(RedbStateStore.load(Path::new("")).unwrap().is_empty());
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        std::fs::write(&path, b"definitely not a redb file").unwrap();

        assert!(RedbStateStore.load(&path).is_err());
    }
}
