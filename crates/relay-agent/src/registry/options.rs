//! Option resolution for dynamically created collectors.
//!
//! Each metric type starts from its own defaults; if a static schema entry
//! exists for the name, every field the entry explicitly sets is overlaid
//! onto the defaults, field by field. Schema fields are `Option`s, so an
//! explicitly-set value (including zero) is honored while an absent field
//! keeps the default.

use std::time::Duration;

use prometheus::{HistogramOpts, Opts};

use relay_common::MetricType;

use crate::config::MetricSchema;

/// Tuning accepted by [`super::summary::SummaryVec`].
///
/// Zero-valued window fields fall back to the conventional summary
/// defaults at construction (10 minute window, 5 age buckets, 500 samples
/// per bucket); an empty objectives list stays empty and yields
/// count/sum-only output.
#[derive(Debug, Clone, Default)]
pub struct SummaryOpts {
    pub name: String,
    pub help: String,
    /// `(quantile, allowed_error)` pairs reported at scrape.
    pub objectives: Vec<(f64, f64)>,
    pub max_age: Duration,
    pub age_buckets: u32,
    pub buf_cap: usize,
}

impl SummaryOpts {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            ..Default::default()
        }
    }

    pub fn objectives(mut self, objectives: Vec<(f64, f64)>) -> Self {
        self.objectives = objectives;
        self
    }
}

/// Fully resolved construction options for one collector.
#[derive(Debug, Clone)]
pub enum ResolvedOpts {
    Counter(Opts),
    Gauge(Opts),
    Histogram(HistogramOpts),
    Summary(SummaryOpts),
}

/// Resolves construction options for `name`: type defaults overlaid with
/// the schema entry when one exists.
pub fn resolve_opts(name: &str, ty: MetricType, schema: Option<&MetricSchema>) -> ResolvedOpts {
    // The exposition layer rejects empty help text, so absent help gets a
    // generated line.
    let help = schema
        .and_then(|s| s.help.clone())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| format!("Application-reported {ty} {name}"));

    match ty {
        MetricType::Counter => ResolvedOpts::Counter(Opts::new(name, help)),
        MetricType::Gauge => ResolvedOpts::Gauge(Opts::new(name, help)),
        MetricType::Histogram => {
            let buckets = schema
                .and_then(|s| s.buckets.clone())
                .unwrap_or_else(|| prometheus::DEFAULT_BUCKETS.to_vec());
            ResolvedOpts::Histogram(HistogramOpts::new(name, help).buckets(buckets))
        }
        MetricType::Summary => {
            let mut opts = SummaryOpts::new(name, help);
            if let Some(schema) = schema {
                if let Some(objectives) = &schema.objectives {
                    opts.objectives = objectives.clone();
                }
                if let Some(max_age_secs) = schema.max_age_secs {
                    opts.max_age = Duration::from_secs(max_age_secs);
                }
                if let Some(age_buckets) = schema.age_buckets {
                    opts.age_buckets = age_buckets;
                }
                if let Some(buf_cap) = schema.buf_cap {
                    opts.buf_cap = buf_cap;
                }
            }
            ResolvedOpts::Summary(opts)
        }
    }
}
