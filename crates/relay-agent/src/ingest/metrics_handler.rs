//! Business handler for metric-report events.
//!
//! Each validated event carries an ordered batch of observations. Items
//! are processed in sequence order but independently: a stale item is
//! discarded, a failing item is logged and counted, and in both cases the
//! loop continues with the next observation.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use relay_common::{EventEnvelope, MetricEventData, MetricObservation};

use super::{BizHandler, IngestError};
use crate::observability::AgentMetrics;
use crate::registry::{CollectorRegistry, RegistryError};

/// Observations older than this relative to processing time are discarded.
pub const STALENESS_WINDOW_MS: i64 = 15 * 60 * 1000;

pub struct MetricsBizHandler {
    registry: Arc<CollectorRegistry>,
    metrics: Arc<AgentMetrics>,
    data: MetricEventData,
}

impl MetricsBizHandler {
    pub fn new(registry: Arc<CollectorRegistry>, metrics: Arc<AgentMetrics>) -> Self {
        Self {
            registry,
            metrics,
            data: MetricEventData::default(),
        }
    }

    /// Handles one observation, recording the per-item outcome in the
    /// agent's own instruments. An error here never aborts sibling items.
    fn handle_observation(&self, observation: &MetricObservation) -> Result<(), RegistryError> {
        let started = Instant::now();
        let result = self.record(observation);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let attributes = &observation.attributes;
        let tenant_id = attributes.get("tenant_id").map(String::as_str).unwrap_or("");
        let tenant_type = attributes
            .get("tenant_type")
            .map(String::as_str)
            .unwrap_or("");
        let namespace = attributes.get("namespace").map(String::as_str).unwrap_or("");

        let (is_error, error_msg, is_discard) = match &result {
            Ok(discarded) => ("false", String::from("-"), if *discarded { "true" } else { "false" }),
            Err(e) => ("true", e.to_string(), "false"),
        };

        if result.is_ok() {
            let duration_labels = [
                tenant_id,
                tenant_type,
                namespace,
                observation.name.as_str(),
                observation.ty.as_str(),
            ];
            self.metrics
                .metric_handle_duration_ms
                .with_label_values(&duration_labels)
                .observe(elapsed_ms);
            self.metrics
                .metric_handle_duration_ms_summary
                .with_label_values(&duration_labels)
                .observe(elapsed_ms);
        }
        self.metrics
            .metric_handle_total
            .with_label_values(&[
                tenant_id,
                tenant_type,
                namespace,
                &observation.name,
                &observation.ty,
                is_error,
                &error_msg,
                is_discard,
            ])
            .inc();

        result.map(|_| ())
    }

    /// Records one observation. Returns `Ok(true)` when the item was
    /// discarded as stale.
    fn record(&self, observation: &MetricObservation) -> Result<bool, RegistryError> {
        if let Some(timestamp) = observation.timestamp {
            if timestamp > 0 && Utc::now().timestamp_millis() - timestamp > STALENESS_WINDOW_MS {
                warn!(
                    metric = %observation.name,
                    timestamp,
                    "stale observation discarded"
                );
                return Ok(true);
            }
        }

        let handle = self.registry.get_or_create(
            &observation.name,
            &observation.ty,
            &observation.label_names(),
        )?;
        handle.collect(&observation.attributes, observation.value)?;
        Ok(false)
    }
}

#[async_trait]
impl BizHandler for MetricsBizHandler {
    fn unmarshal(&mut self, envelope: &EventEnvelope) -> Result<(), IngestError> {
        self.data = serde_json::from_str(envelope.event.get())?;
        Ok(())
    }

    fn validate(&self) -> Result<(), IngestError> {
        if self.data.metrics.is_empty() {
            return Err(IngestError::Validation(
                "metrics collection is empty".to_owned(),
            ));
        }
        for observation in &self.data.metrics {
            if observation.name.is_empty() {
                return Err(IngestError::Validation(
                    "observation is missing a name".to_owned(),
                ));
            }
            if observation.ty.is_empty() {
                return Err(IngestError::Validation(format!(
                    "observation {:?} is missing a type",
                    observation.name
                )));
            }
        }
        Ok(())
    }

    async fn handle(self: Box<Self>) -> Result<(), IngestError> {
        for observation in &self.data.metrics {
            if let Err(e) = self.handle_observation(observation) {
                warn!(
                    metric = %observation.name,
                    metric_type = %observation.ty,
                    error = %e,
                    "observation dropped"
                );
            }
        }
        Ok(())
    }
}
