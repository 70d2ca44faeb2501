//! Domain types shared by the storage, service and transport layers.
//!
//! The persisted form of the whole metric state is a [`Snapshot`]; the wire
//! form of a single metric is a [`MetricEnvelope`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of a metric. Unique within its kind, case-sensitive, non-empty.
pub type MetricName = String;

// ── Kind ───────────────────────────────────────────────────────────

/// The two metric namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Last-write-wins floating point value.
    Gauge,
    /// Accumulating signed integer; updates add a delta.
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a metric type string is neither `gauge` nor `counter`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown metric type: {0:?}")]
pub struct UnknownKind(pub String);

impl FromStr for MetricKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(Self::Gauge),
            "counter" => Ok(Self::Counter),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

// ── Wire envelope ──────────────────────────────────────────────────

/// JSON representation of one metric, used by both update and query
/// requests and their responses.
///
/// `kind` stays a plain string so that an unrecognised type reaches the
/// service and is reported as a bad kind rather than a decode failure.
/// Exactly one of `value` / `delta` is set on responses; the other is
/// omitted from the output entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricEnvelope {
    #[serde(default)]
    pub id: MetricName,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricEnvelope {
    /// Envelope carrying a gauge value.
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge.to_string(),
            delta: None,
            value: Some(value),
        }
    }

    /// Envelope carrying a counter delta (or, in responses, the total).
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter.to_string(),
            delta: Some(delta),
            value: None,
        }
    }
}

// ── Snapshot ───────────────────────────────────────────────────────

/// Full copy of all gauges and counters taken at a single instant.
///
/// This is also the durable record format:
/// `{"gauges": {name: float}, "counters": {name: int}}`. Ordered maps keep
/// the serialized output stable, so saving an unchanged state twice yields
/// identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub gauges: BTreeMap<MetricName, f64>,
    #[serde(default)]
    pub counters: BTreeMap<MetricName, i64>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_known_names() {
        assert_eq!("gauge".parse::<MetricKind>(), Ok(MetricKind::Gauge));
        assert_eq!("counter".parse::<MetricKind>(), Ok(MetricKind::Counter));
    }

    #[test]
    fn kind_is_case_sensitive() {
        assert_eq!(
            "Gauge".parse::<MetricKind>(),
            Err(UnknownKind("Gauge".to_string()))
        );
        assert!("timer".parse::<MetricKind>().is_err());
    }

    #[test]
    fn envelope_omits_unused_field() {
        let json = serde_json::to_string(&MetricEnvelope::gauge("t", 1.5)).unwrap();
        assert_eq!(json, r#"{"id":"t","type":"gauge","value":1.5}"#);

        let json = serde_json::to_string(&MetricEnvelope::counter("c", -3)).unwrap();
        assert_eq!(json, r#"{"id":"c","type":"counter","delta":-3}"#);
    }

    #[test]
    fn envelope_decodes_with_missing_fields() {
        let env: MetricEnvelope = serde_json::from_str(r#"{"type":"gauge"}"#).unwrap();
        assert!(env.id.is_empty());
        assert_eq!(env.kind, "gauge");
        assert_eq!(env.value, None);
        assert_eq!(env.delta, None);
    }

    #[test]
    fn snapshot_decodes_partial_record() {
        let snap: Snapshot = serde_json::from_str(r#"{"gauges":{"x":1.5}}"#).unwrap();
        assert_eq!(snap.gauges.get("x"), Some(&1.5));
        assert!(snap.counters.is_empty());
    }
}
