//! MetricsService — validation, update semantics, and persistence policy.
//!
//! The service holds the storage backend and the durable state adapter as
//! trait objects. Persistence is configured through `&mut self` before the
//! service is shared, so the policy is read-only once requests are flowing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tally_store::{
    FileStateStore, MetricEnvelope, MetricKind, Snapshot, StateStore, Storage,
};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{ServiceError, ServiceResult};
use crate::value;

/// How a restored counter is applied to the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    /// Counters are set to the persisted totals, whatever the backend
    /// already holds.
    #[default]
    Replace,
    /// Counters are replayed as deltas on top of the backend's values.
    /// Equivalent to `Replace` only when the backend starts empty.
    Accumulate,
}

/// Where and how often the metric state is persisted.
#[derive(Debug, Clone, Default)]
pub struct PersistenceConfig {
    /// Target of the durable snapshot. Empty disables persistence.
    pub file_path: PathBuf,
    /// Zero saves after every accepted update; otherwise the autosave period.
    pub store_interval: Duration,
    /// Load the durable snapshot on boot.
    pub restore: bool,
    pub restore_mode: RestoreMode,
}

impl PersistenceConfig {
    pub fn is_enabled(&self) -> bool {
        !self.file_path.as_os_str().is_empty()
    }

    /// Save synchronously after every update.
    pub fn is_write_through(&self) -> bool {
        self.is_enabled() && self.store_interval.is_zero()
    }
}

/// Ingestion and query core shared by all request handlers.
pub struct MetricsService {
    storage: Arc<dyn Storage>,
    state_store: Arc<dyn StateStore>,
    persistence: PersistenceConfig,
    /// Serialises saves so two writers never race on the same target.
    save_lock: Mutex<()>,
}

impl MetricsService {
    /// Create a service over `storage` with persistence disabled and the
    /// JSON file adapter selected.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            state_store: Arc::new(FileStateStore::new()),
            persistence: PersistenceConfig::default(),
            save_lock: Mutex::new(()),
        }
    }

    /// Use a different durable medium for snapshots.
    pub fn with_state_store(mut self, state_store: Arc<dyn StateStore>) -> Self {
        self.state_store = state_store;
        self
    }

    /// Set the persistence policy. Call once, before sharing the service.
    pub fn configure_persistence(&mut self, config: PersistenceConfig) {
        info!(
            path = ?config.file_path,
            interval_secs = config.store_interval.as_secs(),
            restore = config.restore,
            restore_mode = ?config.restore_mode,
            "persistence configured"
        );
        self.persistence = config;
    }

    pub fn persistence(&self) -> &PersistenceConfig {
        &self.persistence
    }

    // ── Updates ────────────────────────────────────────────────────

    /// Apply a textual update: `raw` is a decimal float for gauges and a
    /// signed decimal integer delta for counters.
    pub async fn update_metric(&self, kind: &str, name: &str, raw: &str) -> ServiceResult<()> {
        let kind = parse_kind(kind)?;
        require_name(name)?;
        match kind {
            MetricKind::Gauge => {
                let value = value::parse_gauge(raw)?;
                self.storage.set_gauge(name, value).await?;
            }
            MetricKind::Counter => {
                let delta = value::parse_counter(raw)?;
                self.storage.add_counter(name, delta).await?;
            }
        }
        debug!(%kind, %name, raw, "metric updated");
        self.after_write().await;
        Ok(())
    }

    /// Apply a JSON envelope update and return the metric's value after the
    /// update (the accumulated total for counters).
    pub async fn update_envelope(&self, metric: &MetricEnvelope) -> ServiceResult<MetricEnvelope> {
        let kind = parse_kind(&metric.kind)?;
        require_id(&metric.id)?;
        let name = metric.id.as_str();
        let updated = match kind {
            MetricKind::Gauge => {
                let value = metric
                    .value
                    .ok_or_else(|| ServiceError::BadValue("gauge without value".to_string()))?;
                let value = value::check_gauge(value)?;
                self.storage.set_gauge(name, value).await?;
                MetricEnvelope::gauge(name, value)
            }
            MetricKind::Counter => {
                let delta = metric
                    .delta
                    .ok_or_else(|| ServiceError::BadValue("counter without delta".to_string()))?;
                let total = self.storage.add_counter(name, delta).await?;
                MetricEnvelope::counter(name, total)
            }
        };
        debug!(%kind, %name, "metric updated from envelope");
        self.after_write().await;
        Ok(updated)
    }

    /// Write-through save. The update itself already succeeded, so a
    /// failure here is logged rather than returned.
    async fn after_write(&self) {
        if !self.persistence.is_write_through() {
            return;
        }
        if let Err(e) = self.save_state().await {
            error!(error = %e, "write-through save failed");
        }
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Formatted current value, `None` when the name is absent for `kind`.
    pub async fn get_metric(&self, kind: &str, name: &str) -> ServiceResult<Option<String>> {
        let formatted = match parse_kind(kind)? {
            MetricKind::Gauge => self.storage.get_gauge(name).await?.map(value::format_gauge),
            MetricKind::Counter => self
                .storage
                .get_counter(name)
                .await?
                .map(value::format_counter),
        };
        Ok(formatted)
    }

    /// Current value as an envelope, `None` when the name is absent.
    pub async fn get_envelope(
        &self,
        query: &MetricEnvelope,
    ) -> ServiceResult<Option<MetricEnvelope>> {
        let kind = parse_kind(&query.kind)?;
        require_id(&query.id)?;
        let name = query.id.as_str();
        let found = match kind {
            MetricKind::Gauge => self
                .storage
                .get_gauge(name)
                .await?
                .map(|v| MetricEnvelope::gauge(name, v)),
            MetricKind::Counter => self
                .storage
                .get_counter(name)
                .await?
                .map(|d| MetricEnvelope::counter(name, d)),
        };
        Ok(found)
    }

    pub async fn list_gauges(&self) -> ServiceResult<BTreeMap<String, f64>> {
        Ok(self.storage.list_gauges().await?)
    }

    pub async fn list_counters(&self) -> ServiceResult<BTreeMap<String, i64>> {
        Ok(self.storage.list_counters().await?)
    }

    pub async fn snapshot(&self) -> ServiceResult<Snapshot> {
        Ok(self.storage.snapshot().await?)
    }

    // ── Persistence ────────────────────────────────────────────────

    /// Load the durable snapshot into storage if restore is enabled.
    ///
    /// Must complete before any client traffic is accepted. A corrupt
    /// snapshot is returned as an error so startup can halt instead of
    /// serving without its history.
    pub async fn restore_state(&self) -> ServiceResult<()> {
        if !self.persistence.restore || !self.persistence.is_enabled() {
            return Ok(());
        }
        let path = &self.persistence.file_path;
        let snapshot = self.state_store.load(path).map_err(ServiceError::Persist)?;

        for (name, value) in &snapshot.gauges {
            self.storage.set_gauge(name, *value).await?;
        }
        for (name, value) in &snapshot.counters {
            match self.persistence.restore_mode {
                RestoreMode::Replace => self.storage.set_counter(name, *value).await?,
                RestoreMode::Accumulate => {
                    self.storage.add_counter(name, *value).await?;
                }
            }
        }

        info!(
            ?path,
            gauges = snapshot.gauges.len(),
            counters = snapshot.counters.len(),
            "metric state restored"
        );
        Ok(())
    }

    /// Write the current snapshot to the durable store. No-op when
    /// persistence is disabled.
    pub async fn save_state(&self) -> ServiceResult<()> {
        if !self.persistence.is_enabled() {
            return Ok(());
        }
        let _guard = self.save_lock.lock().await;
        let snapshot = self.storage.snapshot().await?;
        self.state_store
            .save(&self.persistence.file_path, &snapshot)
            .map_err(ServiceError::Persist)?;
        debug!(
            gauges = snapshot.gauges.len(),
            counters = snapshot.counters.len(),
            "metric state saved"
        );
        Ok(())
    }

    /// Spawn the periodic save loop.
    ///
    /// Returns `None` when the policy has no timer (persistence disabled or
    /// write-through). The task exits once `shutdown` changes or its sender
    /// is dropped; the final flush is the caller's job.
    pub fn start_autosave<F>(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
        on_error: F,
    ) -> Option<JoinHandle<()>>
    where
        F: Fn(ServiceError) + Send + Sync + 'static,
    {
        if !self.persistence.is_enabled() || self.persistence.is_write_through() {
            return None;
        }
        let service = Arc::clone(self);
        Some(tokio::spawn(async move {
            service.run_autosave(shutdown, on_error).await;
        }))
    }

    /// Save every `store_interval` until shutdown. Failed saves go to
    /// `on_error` and the loop carries on.
    pub async fn run_autosave<F>(&self, mut shutdown: watch::Receiver<bool>, on_error: F)
    where
        F: Fn(ServiceError) + Send + Sync,
    {
        let interval = self.persistence.store_interval;
        info!(interval_secs = interval.as_secs(), "autosave started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.save_state().await {
                        on_error(e);
                    }
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }
        info!("autosave stopped");
    }
}

fn parse_kind(kind: &str) -> ServiceResult<MetricKind> {
    kind.parse()
        .map_err(|_| ServiceError::BadKind(kind.to_string()))
}

fn require_name(name: &str) -> ServiceResult<()> {
    if name.is_empty() {
        Err(ServiceError::MissingName)
    } else {
        Ok(())
    }
}

fn require_id(id: &str) -> ServiceResult<()> {
    if id.is_empty() {
        Err(ServiceError::BadValue("missing metric id".to_string()))
    } else {
        Ok(())
    }
}
