//! The agent's own instruments.
//!
//! Every pipeline stage updates these: event receipt, per-observation
//! handling, and recovered panics. One explicit struct registered on the
//! shared exposition registry at startup — no globals, so tests get
//! isolated instances.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::registry::options::SummaryOpts;
use crate::registry::summary::SummaryVec;

/// Millisecond ladder for the agent's own latency histograms.
const DURATION_MS_BUCKETS: &[f64] = &[
    1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0,
];

/// Quantile objectives for the agent's own latency summaries.
const DURATION_OBJECTIVES: &[(f64, f64)] = &[(0.5, 0.05), (0.9, 0.01), (0.99, 0.001)];

/// Self-observability instruments, registered once at startup.
pub struct AgentMetrics {
    /// Recovered panics by scene.
    pub panic_total: IntCounterVec,

    /// Event receipt outcomes, keyed by kind, schema, and error.
    pub event_receive_total: IntCounterVec,
    pub event_receive_duration_ms: HistogramVec,
    pub event_receive_duration_ms_summary: SummaryVec,

    /// Per-observation handling outcomes.
    pub metric_handle_total: IntCounterVec,
    pub metric_handle_duration_ms: HistogramVec,
    pub metric_handle_duration_ms_summary: SummaryVec,
}

impl AgentMetrics {
    /// Builds the instrument set and registers it on `exposition`.
    pub fn register(exposition: &Registry) -> Result<Self, prometheus::Error> {
        let panic_total = IntCounterVec::new(
            Opts::new("panic_total", "Recovered panics by scene").namespace("relay"),
            &["scene"],
        )?;

        let event_receive_total = IntCounterVec::new(
            Opts::new("event_receive_total", "Inbound event outcomes").namespace("relay"),
            &["event_name", "schema", "is_error", "error_msg"],
        )?;
        let event_receive_duration_ms = HistogramVec::new(
            HistogramOpts::new("event_receive_duration_ms", "Inbound event receipt latency")
                .namespace("relay")
                .buckets(DURATION_MS_BUCKETS.to_vec()),
            &["event_name", "schema"],
        )?;
        let event_receive_duration_ms_summary = SummaryVec::new(
            SummaryOpts::new(
                "relay_event_receive_duration_ms_summary",
                "Inbound event receipt latency",
            )
            .objectives(DURATION_OBJECTIVES.to_vec()),
            &["event_name", "schema"],
        )?;

        let metric_handle_total = IntCounterVec::new(
            Opts::new("metric_handle_total", "Per-observation handling outcomes")
                .namespace("relay"),
            &[
                "tenant_id",
                "tenant_type",
                "namespace",
                "metric_name",
                "metric_type",
                "is_error",
                "error_msg",
                "is_discard",
            ],
        )?;
        let metric_handle_duration_ms = HistogramVec::new(
            HistogramOpts::new("metric_handle_duration_ms", "Per-observation handling latency")
                .namespace("relay")
                .buckets(DURATION_MS_BUCKETS.to_vec()),
            &[
                "tenant_id",
                "tenant_type",
                "namespace",
                "metric_name",
                "metric_type",
            ],
        )?;
        let metric_handle_duration_ms_summary = SummaryVec::new(
            SummaryOpts::new(
                "relay_metric_handle_duration_ms_summary",
                "Per-observation handling latency",
            )
            .objectives(DURATION_OBJECTIVES.to_vec()),
            &[
                "tenant_id",
                "tenant_type",
                "namespace",
                "metric_name",
                "metric_type",
            ],
        )?;

        exposition.register(Box::new(panic_total.clone()))?;
        exposition.register(Box::new(event_receive_total.clone()))?;
        exposition.register(Box::new(event_receive_duration_ms.clone()))?;
        exposition.register(Box::new(event_receive_duration_ms_summary.clone()))?;
        exposition.register(Box::new(metric_handle_total.clone()))?;
        exposition.register(Box::new(metric_handle_duration_ms.clone()))?;
        exposition.register(Box::new(metric_handle_duration_ms_summary.clone()))?;

        Ok(Self {
            panic_total,
            event_receive_total,
            event_receive_duration_ms,
            event_receive_duration_ms_summary,
            metric_handle_total,
            metric_handle_duration_ms,
            metric_handle_duration_ms_summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_on_a_fresh_registry() {
        let exposition = Registry::new();
        let metrics = AgentMetrics::register(&exposition).unwrap();

        metrics.panic_total.with_label_values(&["test"]).inc();
        metrics
            .event_receive_duration_ms_summary
            .with_label_values(&["metric.report.v1", "2.0"])
            .observe(3.0);

        let families = exposition.gather();
        assert!(families.iter().any(|f| f.get_name() == "relay_panic_total"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "relay_event_receive_duration_ms_summary"));
    }

    #[test]
    fn double_registration_is_rejected() {
        let exposition = Registry::new();
        AgentMetrics::register(&exposition).unwrap();
        assert!(AgentMetrics::register(&exposition).is_err());
    }
}
