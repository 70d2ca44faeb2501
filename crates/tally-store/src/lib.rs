//! tally-store — storage layer for the Tally metrics service.
//!
//! Holds the authoritative gauge and counter values and their durable
//! snapshots.
//!
//! # Architecture
//!
//! ```text
//! Storage (capability trait)
//!   ├── MemStorage  ← RwLock-guarded maps, lives for the process
//!   └── PgStorage   ← upsert-per-call PostgreSQL tables
//!
//! StateStore (persistence adapter trait)
//!   ├── FileStateStore  ← pretty JSON, temp file + atomic rename
//!   └── RedbStateStore  ← embedded redb, one write transaction per save
//! ```
//!
//! Both traits are object safe; the service layer holds `Arc<dyn Storage>`
//! and `Arc<dyn StateStore>` and never branches on the concrete backend.

pub mod error;
pub mod memory;
pub mod persist;
pub mod postgres;
pub mod storage;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use memory::MemStorage;
pub use persist::{FileStateStore, RedbStateStore, StateStore};
pub use postgres::PgStorage;
pub use storage::{HealthCheck, Storage, StorageFuture};
pub use types::*;
