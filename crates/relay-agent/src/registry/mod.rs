//! Dynamic collector registry.
//!
//! Maps a metric name to a typed, labeled time-series object, provisioning
//! the object on first use and registering it with the shared exposition
//! registry. Schema-declared names can also be provisioned eagerly at
//! startup. One reader-writer lock guards the whole name→handle map;
//! per-series mutation relies on the underlying vec's own thread safety.
//!
//! A cache hit deliberately does not re-validate the caller's requested
//! type or label set against the stored handle; a shape mismatch surfaces
//! at the recording step as [`RegistryError::LabelMismatch`].

pub mod options;
pub mod summary;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use prometheus::{CounterVec, GaugeVec, HistogramVec, Registry};
use thiserror::Error;
use tracing::info;

use relay_common::MetricType;

use crate::config::MetricsConfig;
use options::{resolve_opts, ResolvedOpts};
use summary::SummaryVec;

/// Errors surfaced by the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Unknown metric type string on a first-use request. Nothing is
    /// cached for the name.
    #[error("invalid metric type: {0}")]
    UnsupportedType(String),

    /// The exposition layer refused the new series (name collision or
    /// invalid shape). Surfaced to the caller, not retried, not cached.
    #[error("registration failed for {name}: {source}")]
    Registration {
        name: String,
        #[source]
        source: prometheus::Error,
    },

    /// The caller's attribute keys do not match the handle's fixed label
    /// set. Callers treat this as a counted soft failure.
    #[error("label set mismatch for {name}: {detail}")]
    LabelMismatch { name: String, detail: String },
}

/// A registered time-series object. Type and label-name set are fixed at
/// creation and never altered; handles live for the process lifetime.
pub struct CollectorHandle {
    name: String,
    ty: MetricType,
    series: SeriesVec,
}

/// Closed variant over the four concrete series kinds; one `match` drives
/// both construction and recording.
enum SeriesVec {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
    Summary(SummaryVec),
}

impl CollectorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> MetricType {
        self.ty
    }

    /// Records one observation into the series selected by `attributes`:
    /// counters add, gauges set, histograms and summaries observe.
    pub fn collect(
        &self,
        attributes: &BTreeMap<String, String>,
        value: f64,
    ) -> Result<(), RegistryError> {
        let labels: HashMap<&str, &str> = attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        match &self.series {
            SeriesVec::Counter(vec) => vec
                .get_metric_with(&labels)
                .map_err(|e| self.mismatch(e))?
                .inc_by(value),
            SeriesVec::Gauge(vec) => vec
                .get_metric_with(&labels)
                .map_err(|e| self.mismatch(e))?
                .set(value),
            SeriesVec::Histogram(vec) => vec
                .get_metric_with(&labels)
                .map_err(|e| self.mismatch(e))?
                .observe(value),
            SeriesVec::Summary(vec) => vec
                .get_metric_with(&labels)
                .map_err(|e| self.mismatch(e))?
                .observe(value),
        }
        Ok(())
    }

    fn mismatch(&self, source: prometheus::Error) -> RegistryError {
        RegistryError::LabelMismatch {
            name: self.name.clone(),
            detail: source.to_string(),
        }
    }
}

/// Name→handle cache over the shared exposition registry.
pub struct CollectorRegistry {
    collectors: RwLock<HashMap<String, Arc<CollectorHandle>>>,
    exposition: Registry,
    metrics_cfg: Arc<MetricsConfig>,
}

impl CollectorRegistry {
    pub fn new(exposition: Registry, metrics_cfg: Arc<MetricsConfig>) -> Self {
        Self {
            collectors: RwLock::new(HashMap::new()),
            exposition,
            metrics_cfg,
        }
    }

    /// Provisions every schema-declared collector up front. A failure here
    /// is a startup failure, not a runtime soft error.
    pub fn eager_register(&self) -> Result<(), RegistryError> {
        for (name, schema) in &self.metrics_cfg.schema {
            let labels = self.metrics_cfg.resolved_labels(schema);
            self.get_or_create(name, &schema.ty, &labels)?;
        }
        Ok(())
    }

    /// Returns the handle for `name`, creating it on first use.
    ///
    /// Concurrent first-use collapses to exactly one creator; losers read
    /// the winner's entry. The requested type and label set only matter on
    /// a miss — an existing handle is returned as-is.
    pub fn get_or_create(
        &self,
        name: &str,
        ty: &str,
        label_names: &[String],
    ) -> Result<Arc<CollectorHandle>, RegistryError> {
        if let Some(handle) = self.collectors.read().get(name) {
            return Ok(handle.clone());
        }

        let mut collectors = self.collectors.write();
        // Re-check under the exclusive lock.
        if let Some(handle) = collectors.get(name) {
            return Ok(handle.clone());
        }

        let parsed = MetricType::parse(ty)
            .ok_or_else(|| RegistryError::UnsupportedType(ty.to_owned()))?;
        let handle = Arc::new(self.create(name, parsed, label_names)?);
        collectors.insert(name.to_owned(), handle.clone());
        Ok(handle)
    }

    fn create(
        &self,
        name: &str,
        ty: MetricType,
        label_names: &[String],
    ) -> Result<CollectorHandle, RegistryError> {
        let schema = self.metrics_cfg.schema.get(name);
        let label_refs: Vec<&str> = label_names.iter().map(String::as_str).collect();
        let registration = |source| RegistryError::Registration {
            name: name.to_owned(),
            source,
        };

        let series = match resolve_opts(name, ty, schema) {
            ResolvedOpts::Counter(opts) => {
                let vec = CounterVec::new(opts, &label_refs).map_err(registration)?;
                self.exposition
                    .register(Box::new(vec.clone()))
                    .map_err(registration)?;
                SeriesVec::Counter(vec)
            }
            ResolvedOpts::Gauge(opts) => {
                let vec = GaugeVec::new(opts, &label_refs).map_err(registration)?;
                self.exposition
                    .register(Box::new(vec.clone()))
                    .map_err(registration)?;
                SeriesVec::Gauge(vec)
            }
            ResolvedOpts::Histogram(opts) => {
                let vec = HistogramVec::new(opts, &label_refs).map_err(registration)?;
                self.exposition
                    .register(Box::new(vec.clone()))
                    .map_err(registration)?;
                SeriesVec::Histogram(vec)
            }
            ResolvedOpts::Summary(opts) => {
                let vec = SummaryVec::new(opts, &label_refs).map_err(registration)?;
                self.exposition
                    .register(Box::new(vec.clone()))
                    .map_err(registration)?;
                SeriesVec::Summary(vec)
            }
        };

        info!(metric = name, metric_type = %ty, labels = ?label_names, "provisioned collector");
        Ok(CollectorHandle {
            name: name.to_owned(),
            ty,
            series,
        })
    }
}
