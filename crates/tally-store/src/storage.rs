//! The storage capability interface.
//!
//! Methods return boxed futures so the trait stays object safe and the
//! service can hold an `Arc<dyn Storage>` chosen once at startup.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::StoreResult;
use crate::types::Snapshot;

/// Boxed future alias for storage operations.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Authoritative store of current gauge and counter values.
///
/// Implementations must make counter accumulation linearizable per name:
/// concurrent `add_counter` calls on one name never lose an update.
pub trait Storage: Send + Sync {
    /// Replace the value of a gauge.
    fn set_gauge<'a>(&'a self, name: &'a str, value: f64) -> StorageFuture<'a, ()>;

    /// Add `delta` to a counter (absent counters start at zero) and return
    /// the new total.
    fn add_counter<'a>(&'a self, name: &'a str, delta: i64) -> StorageFuture<'a, i64>;

    /// Overwrite a counter with an absolute value. Used by state restore.
    fn set_counter<'a>(&'a self, name: &'a str, value: i64) -> StorageFuture<'a, ()>;

    /// Current gauge value, `None` if the name was never written.
    fn get_gauge<'a>(&'a self, name: &'a str) -> StorageFuture<'a, Option<f64>>;

    /// Current counter value, `None` if the name was never written.
    fn get_counter<'a>(&'a self, name: &'a str) -> StorageFuture<'a, Option<i64>>;

    /// Copy of all gauges. Mutating the result never affects the store.
    fn list_gauges(&self) -> StorageFuture<'_, BTreeMap<String, f64>>;

    /// Copy of all counters. Mutating the result never affects the store.
    fn list_counters(&self) -> StorageFuture<'_, BTreeMap<String, i64>>;

    /// Both maps as they were at one real instant.
    fn snapshot(&self) -> StorageFuture<'_, Snapshot>;
}

/// Connectivity probe for backends that talk to an external service.
pub trait HealthCheck: Send + Sync {
    /// Resolve to `Ok(())` if the backend is reachable.
    fn ping(&self) -> StorageFuture<'_, ()>;
}
