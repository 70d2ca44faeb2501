//! In-memory storage backend.
//!
//! One [`Snapshot`] behind a tokio `RwLock`: writers take the exclusive
//! lock for the whole read-modify-write, readers and snapshot copies take
//! the shared lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::storage::{Storage, StorageFuture};
use crate::types::Snapshot;

/// Process-lifetime metric store. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemStorage {
    state: Arc<RwLock<Snapshot>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemStorage {
    fn set_gauge<'a>(&'a self, name: &'a str, value: f64) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.gauges.insert(name.to_string(), value);
            Ok(())
        })
    }

    fn add_counter<'a>(&'a self, name: &'a str, delta: i64) -> StorageFuture<'a, i64> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let current = state.counters.get(name).copied().unwrap_or(0);
            let total = current
                .checked_add(delta)
                .ok_or_else(|| StoreError::Write(format!("counter {name:?} overflows i64")))?;
            state.counters.insert(name.to_string(), total);
            Ok(total)
        })
    }

    fn set_counter<'a>(&'a self, name: &'a str, value: i64) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.counters.insert(name.to_string(), value);
            Ok(())
        })
    }

    fn get_gauge<'a>(&'a self, name: &'a str) -> StorageFuture<'a, Option<f64>> {
        Box::pin(async move { Ok(self.state.read().await.gauges.get(name).copied()) })
    }

    fn get_counter<'a>(&'a self, name: &'a str) -> StorageFuture<'a, Option<i64>> {
        Box::pin(async move { Ok(self.state.read().await.counters.get(name).copied()) })
    }

    fn list_gauges(&self) -> StorageFuture<'_, BTreeMap<String, f64>> {
        Box::pin(async move { Ok(self.state.read().await.gauges.clone()) })
    }

    fn list_counters(&self) -> StorageFuture<'_, BTreeMap<String, i64>> {
        Box::pin(async move { Ok(self.state.read().await.counters.clone()) })
    }

    fn snapshot(&self) -> StorageFuture<'_, Snapshot> {
        Box::pin(async move { Ok(self.state.read().await.clone()) })
    }
}
