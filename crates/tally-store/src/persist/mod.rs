//! Durable state adapters.
//!
//! A [`StateStore`] writes a full [`Snapshot`] to a durable medium and reads
//! it back. The service only sees the trait, so the medium can be swapped
//! without touching the persistence policy.

use std::path::Path;

use crate::error::StoreResult;
use crate::types::Snapshot;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| $crate::error::StoreError::$variant(e.to_string())
    };
}

mod embedded;
mod file;

pub use self::embedded::RedbStateStore;
pub use self::file::FileStateStore;

/// Save and load the complete metric state.
///
/// Contract shared by all implementations:
/// - `save` with an empty path is a successful no-op;
/// - a save is all-or-nothing: an interrupted save leaves the previous
///   state readable at `path`;
/// - `load` of a path that does not exist yields an empty snapshot;
/// - `load` of unreadable or malformed content is an error.
pub trait StateStore: Send + Sync {
    fn save(&self, path: &Path, snapshot: &Snapshot) -> StoreResult<()>;

    fn load(&self, path: &Path) -> StoreResult<Snapshot>;
}

fn is_unset(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

/// Create the parent directory of `path` and return it (`.` when bare).
fn ensure_parent(path: &Path) -> StoreResult<&Path> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir)?;
            Ok(dir)
        }
        _ => Ok(Path::new(".")),
    }
}
