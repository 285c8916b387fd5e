//! Summary series with sliding-window quantiles.
//!
//! The exposition crate has no summary collector, so this module provides
//! one: a labeled vec of summary children, each keeping lifetime count/sum
//! plus a rotating window of sample buckets from which quantiles are
//! computed at scrape time by nearest rank. Registered through
//! `prometheus::core::Collector` like any built-in vec.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use prometheus::core::{Collector, Desc};
use prometheus::proto;

use super::options::SummaryOpts;

/// Quantile window when `max_age` is zero.
const DEF_MAX_AGE: Duration = Duration::from_secs(10 * 60);
/// Rotating buckets when `age_buckets` is zero.
const DEF_AGE_BUCKETS: u32 = 5;
/// Samples retained per bucket when `buf_cap` is zero.
const DEF_BUF_CAP: usize = 500;

/// A labeled family of summary series. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SummaryVec {
    core: Arc<SummaryVecCore>,
}

struct SummaryVecCore {
    desc: Desc,
    objectives: Vec<(f64, f64)>,
    max_age: Duration,
    age_buckets: u32,
    buf_cap: usize,
    children: RwLock<HashMap<Vec<String>, Arc<SummaryChild>>>,
}

impl SummaryVec {
    /// Builds a summary vec from resolved options. Zero-valued window
    /// fields fall back to the conventional defaults.
    pub fn new(opts: SummaryOpts, label_names: &[&str]) -> prometheus::Result<SummaryVec> {
        for &(quantile, error) in &opts.objectives {
            if !(0.0..=1.0).contains(&quantile) || !(0.0..=1.0).contains(&error) {
                return Err(prometheus::Error::Msg(format!(
                    "objective ({quantile}, {error}) outside [0, 1]"
                )));
            }
        }

        let desc = Desc::new(
            opts.name,
            opts.help,
            label_names.iter().map(|s| (*s).to_owned()).collect(),
            HashMap::new(),
        )?;

        let max_age = if opts.max_age.is_zero() {
            DEF_MAX_AGE
        } else {
            opts.max_age
        };
        let age_buckets = if opts.age_buckets == 0 {
            DEF_AGE_BUCKETS
        } else {
            opts.age_buckets
        };
        let buf_cap = if opts.buf_cap == 0 {
            DEF_BUF_CAP
        } else {
            opts.buf_cap
        };

        let mut objectives = opts.objectives;
        objectives.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(SummaryVec {
            core: Arc::new(SummaryVecCore {
                desc,
                objectives,
                max_age,
                age_buckets,
                buf_cap,
                children: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Returns the child selected by a label-name → value map, mirroring
    /// the error semantics of the built-in vec types so callers can treat
    /// all four kinds uniformly.
    pub fn get_metric_with(
        &self,
        labels: &HashMap<&str, &str>,
    ) -> prometheus::Result<Arc<SummaryChild>> {
        let expect = self.core.desc.variable_labels.len();
        if labels.len() != expect {
            return Err(prometheus::Error::InconsistentCardinality {
                expect,
                got: labels.len(),
            });
        }

        let mut values = Vec::with_capacity(expect);
        for name in &self.core.desc.variable_labels {
            match labels.get(name.as_str()) {
                Some(value) => values.push((*value).to_owned()),
                None => {
                    return Err(prometheus::Error::Msg(format!(
                        "label name {name} missing in label map"
                    )))
                }
            }
        }

        Ok(self.child_for(values))
    }

    /// Returns the child selected by label values in declaration order.
    pub fn get_metric_with_label_values(
        &self,
        values: &[&str],
    ) -> prometheus::Result<Arc<SummaryChild>> {
        let expect = self.core.desc.variable_labels.len();
        if values.len() != expect {
            return Err(prometheus::Error::InconsistentCardinality {
                expect,
                got: values.len(),
            });
        }
        Ok(self.child_for(values.iter().map(|v| (*v).to_owned()).collect()))
    }

    /// Panicking variant of [`get_metric_with_label_values`], matching the
    /// convenience API of the built-in vec types.
    ///
    /// [`get_metric_with_label_values`]: SummaryVec::get_metric_with_label_values
    pub fn with_label_values(&self, values: &[&str]) -> Arc<SummaryChild> {
        self.get_metric_with_label_values(values)
            .expect("label cardinality mismatch")
    }

    fn child_for(&self, values: Vec<String>) -> Arc<SummaryChild> {
        if let Some(child) = self.core.children.read().get(&values) {
            return child.clone();
        }

        let mut children = self.core.children.write();
        // Re-check: another recorder may have created the child while we
        // waited for the exclusive lock.
        if let Some(child) = children.get(&values) {
            return child.clone();
        }

        let rotate_every = self.core.max_age / self.core.age_buckets;
        let child = Arc::new(SummaryChild {
            label_values: values.clone(),
            window: Mutex::new(SummaryWindow::new(
                self.core.age_buckets as usize,
                self.core.buf_cap,
                rotate_every,
            )),
        });
        children.insert(values, child.clone());
        child
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.core.desc]
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let children = self.core.children.read();
        let mut sorted: Vec<_> = children.values().collect();
        sorted.sort_by(|a, b| a.label_values.cmp(&b.label_values));

        let mut family = proto::MetricFamily::default();
        family.set_name(self.core.desc.fq_name.clone());
        family.set_help(self.core.desc.help.clone());
        family.set_field_type(proto::MetricType::SUMMARY);

        for child in sorted {
            let mut metric = proto::Metric::default();
            for (name, value) in self
                .core
                .desc
                .variable_labels
                .iter()
                .zip(&child.label_values)
            {
                let mut pair = proto::LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value.clone());
                metric.mut_label().push(pair);
            }

            let mut window = child.window.lock();
            window.rotate(Instant::now());
            let mut summary = proto::Summary::default();
            summary.set_sample_count(window.count);
            summary.set_sample_sum(window.sum);
            for &(quantile, _) in &self.core.objectives {
                let mut proto_quantile = proto::Quantile::default();
                proto_quantile.set_quantile(quantile);
                proto_quantile.set_value(window.quantile(quantile));
                summary.mut_quantile().push(proto_quantile);
            }
            drop(window);

            metric.set_summary(summary);
            family.mut_metric().push(metric);
        }

        vec![family]
    }
}

/// One labeled summary series.
pub struct SummaryChild {
    label_values: Vec<String>,
    window: Mutex<SummaryWindow>,
}

impl SummaryChild {
    /// Records one observation.
    pub fn observe(&self, value: f64) {
        let mut window = self.window.lock();
        window.rotate(Instant::now());
        window.observe(value);
    }

    #[cfg(test)]
    pub(crate) fn quantile(&self, quantile: f64) -> f64 {
        let mut window = self.window.lock();
        window.rotate(Instant::now());
        window.quantile(quantile)
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> u64 {
        self.window.lock().count
    }
}

/// Windowed summary state. `count`/`sum` are lifetime totals; only the
/// quantile window rotates.
struct SummaryWindow {
    count: u64,
    sum: f64,
    buckets: VecDeque<SampleBucket>,
    buf_cap: usize,
    rotate_every: Duration,
    last_rotate: Instant,
}

impl SummaryWindow {
    fn new(age_buckets: usize, buf_cap: usize, rotate_every: Duration) -> Self {
        let mut buckets = VecDeque::with_capacity(age_buckets);
        for _ in 0..age_buckets {
            buckets.push_back(SampleBucket::new());
        }
        Self {
            count: 0,
            sum: 0.0,
            buckets,
            buf_cap,
            rotate_every,
            last_rotate: Instant::now(),
        }
    }

    fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        let cap = self.buf_cap;
        if let Some(bucket) = self.buckets.front_mut() {
            bucket.push(value, cap);
        }
    }

    /// Ages out buckets that have fallen off the window. Called from both
    /// the observe and the scrape path so an idle series still decays.
    fn rotate(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_rotate);
        let periods = (elapsed.as_nanos() / self.rotate_every.as_nanos().max(1)) as usize;
        if periods == 0 {
            return;
        }

        if periods >= self.buckets.len() {
            for bucket in &mut self.buckets {
                bucket.clear();
            }
            self.last_rotate = now;
            return;
        }

        for _ in 0..periods {
            let mut oldest = self.buckets.pop_back().unwrap_or_else(SampleBucket::new);
            oldest.clear();
            self.buckets.push_front(oldest);
            self.last_rotate += self.rotate_every;
        }
    }

    /// Nearest-rank quantile over the merged window. NaN when the window
    /// holds no samples, matching the conventional summary output.
    fn quantile(&self, quantile: f64) -> f64 {
        let mut samples: Vec<f64> = self
            .buckets
            .iter()
            .flat_map(|bucket| bucket.samples.iter().copied())
            .collect();
        if samples.is_empty() {
            return f64::NAN;
        }
        samples.sort_by(f64::total_cmp);

        let rank = (quantile * samples.len() as f64).ceil() as usize;
        samples[rank.clamp(1, samples.len()) - 1]
    }
}

/// A fixed-capacity sample buffer; past capacity, new samples overwrite
/// the oldest in ring order.
struct SampleBucket {
    samples: Vec<f64>,
    write_idx: usize,
}

impl SampleBucket {
    fn new() -> Self {
        Self {
            samples: Vec::new(),
            write_idx: 0,
        }
    }

    fn push(&mut self, value: f64, cap: usize) {
        if self.samples.len() < cap {
            self.samples.push(value);
        } else {
            self.samples[self.write_idx] = value;
            self.write_idx = (self.write_idx + 1) % cap;
        }
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.write_idx = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_opts(name: &str) -> SummaryOpts {
        SummaryOpts::new(name, "test summary")
            .objectives(vec![(0.5, 0.05), (0.9, 0.01), (0.99, 0.001)])
    }

    #[test]
    fn zero_opts_fall_back_to_defaults() {
        let vec = SummaryVec::new(SummaryOpts::new("s", "help"), &[]).unwrap();
        assert_eq!(vec.core.max_age, DEF_MAX_AGE);
        assert_eq!(vec.core.age_buckets, DEF_AGE_BUCKETS);
        assert_eq!(vec.core.buf_cap, DEF_BUF_CAP);
        assert!(vec.core.objectives.is_empty());
    }

    #[test]
    fn rejects_out_of_range_objectives() {
        let opts = SummaryOpts::new("s", "help").objectives(vec![(1.5, 0.05)]);
        assert!(SummaryVec::new(opts, &[]).is_err());
    }

    #[test]
    fn observes_and_reports_quantiles() {
        let vec = SummaryVec::new(quick_opts("rpc_ms"), &["method"]).unwrap();
        let child = vec.with_label_values(&["get"]);
        for i in 1..=100 {
            child.observe(f64::from(i));
        }

        assert_eq!(child.count(), 100);
        assert_eq!(child.quantile(0.5), 50.0);
        assert_eq!(child.quantile(0.9), 90.0);
        assert_eq!(child.quantile(0.99), 99.0);
    }

    #[test]
    fn empty_window_reports_nan() {
        let vec = SummaryVec::new(quick_opts("rpc_ms"), &[]).unwrap();
        let child = vec.with_label_values(&[]);
        assert!(child.quantile(0.5).is_nan());
    }

    #[test]
    fn cardinality_mismatch_is_rejected() {
        let vec = SummaryVec::new(quick_opts("rpc_ms"), &["method"]).unwrap();
        assert!(matches!(
            vec.get_metric_with_label_values(&["a", "b"]),
            Err(prometheus::Error::InconsistentCardinality { expect: 1, got: 2 })
        ));

        let labels: HashMap<&str, &str> = [("verb", "get")].into_iter().collect();
        assert!(vec.get_metric_with(&labels).is_err());
    }

    #[test]
    fn window_rotation_ages_out_samples() {
        let opts = SummaryOpts {
            name: "rpc_ms".to_owned(),
            help: "test summary".to_owned(),
            objectives: vec![(0.5, 0.05)],
            max_age: Duration::from_millis(80),
            age_buckets: 2,
            buf_cap: 16,
        };
        let vec = SummaryVec::new(opts, &[]).unwrap();
        let child = vec.with_label_values(&[]);

        child.observe(42.0);
        assert_eq!(child.quantile(0.5), 42.0);

        std::thread::sleep(Duration::from_millis(120));
        // Window has passed: the quantile decays, lifetime count does not.
        assert!(child.quantile(0.5).is_nan());
        assert_eq!(child.count(), 1);
    }

    #[test]
    fn buf_cap_bounds_retained_samples() {
        let opts = SummaryOpts {
            name: "rpc_ms".to_owned(),
            help: "test summary".to_owned(),
            objectives: vec![(0.5, 0.05)],
            max_age: Duration::from_secs(60),
            age_buckets: 1,
            buf_cap: 4,
        };
        let vec = SummaryVec::new(opts, &[]).unwrap();
        let child = vec.with_label_values(&[]);

        for i in 1..=100 {
            child.observe(f64::from(i));
        }
        let window = child.window.lock();
        assert_eq!(window.buckets.front().unwrap().samples.len(), 4);
        assert_eq!(window.count, 100);
    }

    #[test]
    fn scrape_carries_labels_count_sum_and_quantiles() {
        let vec = SummaryVec::new(quick_opts("rpc_ms"), &["method"]).unwrap();
        vec.with_label_values(&["get"]).observe(10.0);
        vec.with_label_values(&["get"]).observe(30.0);

        let families = vec.collect();
        assert_eq!(families.len(), 1);
        let family = &families[0];
        assert_eq!(family.get_name(), "rpc_ms");
        assert_eq!(family.get_field_type(), proto::MetricType::SUMMARY);

        let metric = &family.get_metric()[0];
        assert_eq!(metric.get_label()[0].get_name(), "method");
        assert_eq!(metric.get_label()[0].get_value(), "get");
        let summary = metric.get_summary();
        assert_eq!(summary.get_sample_count(), 2);
        assert_eq!(summary.get_sample_sum(), 40.0);
        assert_eq!(summary.get_quantile().len(), 3);
    }
}
