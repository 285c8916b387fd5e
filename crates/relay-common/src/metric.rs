//! Payload types for metric-report events.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Event kind emitted by the platform when an application reports metrics.
pub const EVENT_TYPE_METRIC_REPORT: &str = "metric.report.v1";

/// The four series kinds a collector can be provisioned as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricType {
    /// Parses a wire-format type string (`counter` | `gauge` | `histogram`
    /// | `summary`). Returns `None` for anything else; the caller decides
    /// how an unknown kind fails.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "counter" => Some(MetricType::Counter),
            "gauge" => Some(MetricType::Gauge),
            "histogram" => Some(MetricType::Histogram),
            "summary" => Some(MetricType::Summary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of one metric-report event: an ordered batch of observations.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricEventData {
    #[serde(default)]
    pub metrics: Vec<MetricObservation>,
}

/// A single observation within a metric-report event.
///
/// The type stays a raw string here: an unknown kind must fail that one
/// observation at collector creation, not the whole batch at decode.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricObservation {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub ty: String,

    #[serde(default)]
    pub value: f64,

    /// Label name → label value. A `BTreeMap` so the derived label-name
    /// list is deterministic.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Epoch milliseconds at which the observation was taken. Absent means
    /// "now" — the staleness filter only applies when this is set.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl MetricObservation {
    /// Attribute keys in deterministic order. This is the label-name set
    /// used for a previously-unseen metric that has no schema entry.
    pub fn label_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types() {
        assert_eq!(MetricType::parse("counter"), Some(MetricType::Counter));
        assert_eq!(MetricType::parse("gauge"), Some(MetricType::Gauge));
        assert_eq!(MetricType::parse("histogram"), Some(MetricType::Histogram));
        assert_eq!(MetricType::parse("summary"), Some(MetricType::Summary));
        assert_eq!(MetricType::parse("bogus"), None);
        assert_eq!(MetricType::parse("Counter"), None);
    }

    #[test]
    fn type_round_trips_through_display() {
        for ty in [
            MetricType::Counter,
            MetricType::Gauge,
            MetricType::Histogram,
            MetricType::Summary,
        ] {
            assert_eq!(MetricType::parse(&ty.to_string()), Some(ty));
        }
    }

    #[test]
    fn decodes_observation_batch() {
        let raw = r#"{
            "metrics": [
                {
                    "name": "req_count",
                    "type": "counter",
                    "value": 1.0,
                    "attributes": {"route": "/x", "namespace": "orders"},
                    "timestamp": 1718000000000
                },
                {"name": "queue_depth", "type": "gauge", "value": 42}
            ]
        }"#;

        let data: MetricEventData = serde_json::from_str(raw).unwrap();
        assert_eq!(data.metrics.len(), 2);
        assert_eq!(data.metrics[0].ty, "counter");
        assert_eq!(data.metrics[0].timestamp, Some(1_718_000_000_000));
        assert_eq!(data.metrics[1].timestamp, None);
    }

    #[test]
    fn label_names_are_sorted() {
        let raw = r#"{"name": "m", "type": "counter",
                      "attributes": {"zeta": "1", "alpha": "2", "mid": "3"}}"#;
        let obs: MetricObservation = serde_json::from_str(raw).unwrap();
        assert_eq!(obs.label_names(), vec!["alpha", "mid", "zeta"]);
    }
}
