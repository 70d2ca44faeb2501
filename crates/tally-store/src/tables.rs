//! redb table definitions for the embedded state snapshot.
//!
//! Both tables are keyed by metric name and replaced wholesale on every save.

use redb::TableDefinition;

/// Gauge values keyed by metric name.
pub const GAUGES: TableDefinition<&str, f64> = TableDefinition::new("gauges");

/// Counter totals keyed by metric name.
pub const COUNTERS: TableDefinition<&str, i64> = TableDefinition::new("counters");
