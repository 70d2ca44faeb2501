//! tally-service — the metrics ingestion core.
//!
//! Turns raw textual or JSON metric updates into typed storage mutations
//! and owns the persistence policy around them.
//!
//! # Architecture
//!
//! ```text
//! MetricsService
//!   ├── update_metric() / update_envelope()  ← text and JSON ingestion
//!   ├── get_metric() / get_envelope()        ← text and JSON queries
//!   ├── restore_state()                      ← once, before serving
//!   ├── save_state()                         ← write-through, timer, shutdown
//!   └── start_autosave()                     → periodic save loop
//! ```

pub mod error;
pub mod service;
pub mod value;

pub use error::{ServiceError, ServiceResult};
pub use service::{MetricsService, PersistenceConfig, RestoreMode};
