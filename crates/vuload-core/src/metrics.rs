//! Metrics registry shared by all virtual users
//!
//! Three aggregator kinds are supported:
//!
//! - **Counter:** monotonically increasing sum of numeric samples
//! - **Rate:** fraction of boolean samples that are `true`
//! - **Trend:** full distribution of numeric samples (min, max, avg, percentiles)
//!
//! Metrics are identified by name plus an optional tag set. A tagged handle
//! writes each sample into its own series *and* into the untagged parent, so
//! `http_req_duration{step=login}` is a sub-metric of `http_req_duration`.
//!
//! The registry has an explicit lifecycle: created at run start, written
//! concurrently during the run, then [`MetricsRegistry::freeze`]d and read
//! through a [`MetricsSnapshot`].
//!
//! # Percentiles
//!
//! Percentiles use linear interpolation between the closest ranks:
//! `rank = p / 100 * (n - 1)`. For samples `[100, 200, 300, 400]` this gives
//! `p(50) = 250` and `p(95) = 385`.

use crate::error::{LoadError, LoadResult, ThresholdParseError};
use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Metric identity: name plus tag set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    name: String,
    tags: BTreeMap<String, String>,
}

impl MetricKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }

    /// The untagged parent of a sub-metric.
    pub fn parent(&self) -> MetricKey {
        MetricKey::new(self.name.clone())
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tags.is_empty() {
            return f.pad(&self.name);
        }
        let selector = self
            .tags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        f.pad(&format!("{}{{{selector}}}", self.name))
    }
}

impl FromStr for MetricKey {
    type Err = ThresholdParseError;

    /// Parses `name` or `name{key=value,...}`. `key:value` is accepted too.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ThresholdParseError::InvalidMetricKey(raw.to_string());
        let raw_trimmed = raw.trim();

        let (name, selector) = match raw_trimmed.find('{') {
            Some(open) => {
                let selector = raw_trimmed[open + 1..]
                    .strip_suffix('}')
                    .ok_or_else(invalid)?;
                (&raw_trimmed[..open], Some(selector))
            }
            None => (raw_trimmed, None),
        };

        let name_ok = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !name_ok {
            return Err(invalid());
        }

        let mut key = MetricKey::new(name);
        if let Some(selector) = selector {
            for pair in selector.split(',').filter(|p| !p.trim().is_empty()) {
                let (k, v) = pair
                    .split_once('=')
                    .or_else(|| pair.split_once(':'))
                    .ok_or_else(invalid)?;
                let (k, v) = (k.trim(), v.trim());
                if k.is_empty() || v.is_empty() {
                    return Err(invalid());
                }
                key.tags.insert(k.to_string(), v.to_string());
            }
        }

        Ok(key)
    }
}

impl Serialize for MetricKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Aggregator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Rate => "rate",
            Self::Trend => "trend",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct CounterSeries {
    sum: Mutex<f64>,
}

#[derive(Debug, Default)]
struct RateState {
    passes: u64,
    total: u64,
}

#[derive(Debug, Default)]
struct RateSeries {
    state: Mutex<RateState>,
}

#[derive(Debug, Default)]
struct TrendSeries {
    samples: Mutex<Vec<f64>>,
}

#[derive(Debug, Clone)]
enum Series {
    Counter(Arc<CounterSeries>),
    Rate(Arc<RateSeries>),
    Trend(Arc<TrendSeries>),
}

impl Series {
    fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Arc::default()),
            MetricKind::Rate => Self::Rate(Arc::default()),
            MetricKind::Trend => Self::Trend(Arc::default()),
        }
    }

    fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Rate(_) => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }

    fn snapshot(&self) -> MetricValue {
        match self {
            Self::Counter(c) => MetricValue::Counter {
                value: *c.sum.lock(),
            },
            Self::Rate(r) => {
                let state = r.state.lock();
                MetricValue::Rate(RateSnapshot::new(state.passes, state.total))
            }
            Self::Trend(t) => {
                // Copy under the lock, sort outside it.
                let samples = t.samples.lock().clone();
                MetricValue::Trend(TrendSnapshot::from_samples(samples))
            }
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    series: RwLock<HashMap<MetricKey, Series>>,
    frozen: AtomicBool,
    dropped: AtomicU64,
}

impl RegistryInner {
    /// Returns false (and counts the sample as dropped) once frozen.
    fn accepts_samples(&self) -> bool {
        if !self.frozen.load(Ordering::Acquire) {
            return true;
        }
        if self.dropped.fetch_add(1, Ordering::Relaxed) == 0 {
            tracing::debug!("metrics registry is frozen, dropping late samples");
        }
        false
    }
}

/// Process-wide registry of named metrics.
///
/// Cloning is cheap and every clone refers to the same metrics. All writes
/// are internally synchronized; callers never lock.
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    inner: Arc<RegistryInner>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a counter.
    pub fn counter(&self, name: &str) -> LoadResult<Counter> {
        self.counter_with_key(MetricKey::new(name))
    }

    /// Get or create a rate.
    pub fn rate(&self, name: &str) -> LoadResult<Rate> {
        self.rate_with_key(MetricKey::new(name))
    }

    /// Get or create a trend.
    pub fn trend(&self, name: &str) -> LoadResult<Trend> {
        self.trend_with_key(MetricKey::new(name))
    }

    pub fn counter_with_key(&self, key: MetricKey) -> LoadResult<Counter> {
        let series = self
            .resolve(key, MetricKind::Counter)?
            .into_iter()
            .filter_map(|s| match s {
                Series::Counter(c) => Some(c),
                _ => None,
            })
            .collect();
        Ok(Counter {
            series,
            registry: Arc::clone(&self.inner),
        })
    }

    pub fn rate_with_key(&self, key: MetricKey) -> LoadResult<Rate> {
        let series = self
            .resolve(key, MetricKind::Rate)?
            .into_iter()
            .filter_map(|s| match s {
                Series::Rate(r) => Some(r),
                _ => None,
            })
            .collect();
        Ok(Rate {
            series,
            registry: Arc::clone(&self.inner),
        })
    }

    pub fn trend_with_key(&self, key: MetricKey) -> LoadResult<Trend> {
        let series = self
            .resolve(key, MetricKind::Trend)?
            .into_iter()
            .filter_map(|s| match s {
                Series::Trend(t) => Some(t),
                _ => None,
            })
            .collect();
        Ok(Trend {
            series,
            registry: Arc::clone(&self.inner),
        })
    }

    /// Series a handle for `key` writes to: the key itself first, then its
    /// untagged parent when `key` is tagged.
    fn resolve(&self, key: MetricKey, kind: MetricKind) -> LoadResult<Vec<Series>> {
        let mut keys = vec![key.clone()];
        if key.is_tagged() {
            keys.push(key.parent());
        }

        let mut series = self.inner.series.write();
        // Nothing is inserted unless every key accepts this kind.
        for k in &keys {
            if let Some(existing) = series.get(k) {
                if existing.kind() != kind {
                    return Err(LoadError::MetricKindMismatch {
                        name: k.to_string(),
                        existing: existing.kind().as_str(),
                        requested: kind.as_str(),
                    });
                }
            }
        }

        Ok(keys
            .into_iter()
            .map(|k| series.entry(k).or_insert_with(|| Series::new(kind)).clone())
            .collect())
    }

    /// Stop accepting samples. Idempotent.
    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    /// Samples rejected because they arrived after [`freeze`](Self::freeze).
    pub fn dropped_samples(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Consistent per-metric view of everything recorded so far.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let series = self.inner.series.read();
        let metrics = series
            .iter()
            .map(|(key, s)| (key.clone(), s.snapshot()))
            .collect();
        MetricsSnapshot { metrics }
    }
}

/// Handle to a counter metric.
#[derive(Debug, Clone)]
pub struct Counter {
    series: Vec<Arc<CounterSeries>>,
    registry: Arc<RegistryInner>,
}

impl Counter {
    /// Add a non-negative, finite amount. Other samples are ignored.
    pub fn add(&self, n: f64) {
        if !n.is_finite() || n < 0.0 {
            tracing::debug!(sample = n, "ignoring invalid counter sample");
            return;
        }
        if !self.registry.accepts_samples() {
            return;
        }
        for series in &self.series {
            *series.sum.lock() += n;
        }
    }

    pub fn value(&self) -> f64 {
        self.series.first().map(|s| *s.sum.lock()).unwrap_or(0.0)
    }
}

/// Handle to a rate metric.
#[derive(Debug, Clone)]
pub struct Rate {
    series: Vec<Arc<RateSeries>>,
    registry: Arc<RegistryInner>,
}

impl Rate {
    pub fn add(&self, sample: bool) {
        if !self.registry.accepts_samples() {
            return;
        }
        for series in &self.series {
            let mut state = series.state.lock();
            state.total += 1;
            if sample {
                state.passes += 1;
            }
        }
    }

    /// Fraction of `true` samples (0.0 when empty).
    pub fn rate(&self) -> f64 {
        self.snapshot().rate
    }

    pub fn snapshot(&self) -> RateSnapshot {
        self.series
            .first()
            .map(|s| {
                let state = s.state.lock();
                RateSnapshot::new(state.passes, state.total)
            })
            .unwrap_or_else(|| RateSnapshot::new(0, 0))
    }
}

/// Handle to a trend metric.
#[derive(Debug, Clone)]
pub struct Trend {
    series: Vec<Arc<TrendSeries>>,
    registry: Arc<RegistryInner>,
}

impl Trend {
    /// Record a finite sample. NaN and infinities are ignored.
    pub fn add(&self, sample: f64) {
        if !sample.is_finite() {
            tracing::debug!(sample, "ignoring non-finite trend sample");
            return;
        }
        if !self.registry.accepts_samples() {
            return;
        }
        for series in &self.series {
            series.samples.lock().push(sample);
        }
    }

    /// Record a duration in milliseconds.
    pub fn add_duration(&self, elapsed: std::time::Duration) {
        self.add(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn snapshot(&self) -> TrendSnapshot {
        let samples = self
            .series
            .first()
            .map(|s| s.samples.lock().clone())
            .unwrap_or_default();
        TrendSnapshot::from_samples(samples)
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.snapshot().percentile(p)
    }

    pub fn avg(&self) -> Option<f64> {
        let snapshot = self.snapshot();
        (snapshot.count > 0).then_some(snapshot.avg)
    }

    pub fn count(&self) -> usize {
        self.series.first().map(|s| s.samples.lock().len()).unwrap_or(0)
    }
}

/// Final state of a rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateSnapshot {
    pub rate: f64,
    pub passes: u64,
    pub fails: u64,
}

impl RateSnapshot {
    fn new(passes: u64, total: u64) -> Self {
        let rate = if total == 0 {
            0.0
        } else {
            passes as f64 / total as f64
        };
        Self {
            rate,
            passes,
            fails: total - passes,
        }
    }

    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }
}

/// Distribution summary of a trend. Statistics are 0.0 when `count == 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSnapshot {
    #[serde(skip)]
    sorted: Vec<f64>,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl TrendSnapshot {
    fn from_samples(mut samples: Vec<f64>) -> Self {
        samples.sort_by(|a, b| a.total_cmp(b));
        let count = samples.len();
        let sum: f64 = samples.iter().sum();
        let at = |p: f64| percentile(&samples, p).unwrap_or(0.0);

        Self {
            count,
            min: samples.first().copied().unwrap_or(0.0),
            max: samples.last().copied().unwrap_or(0.0),
            avg: if count == 0 { 0.0 } else { sum / count as f64 },
            med: at(50.0),
            p90: at(90.0),
            p95: at(95.0),
            p99: at(99.0),
            sorted: samples,
        }
    }

    /// Percentile `p` (0-100) by linear interpolation; `None` without samples.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        percentile(&self.sorted, p)
    }
}

/// Linear interpolation between closest ranks over sorted samples.
fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Aggregate value of one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricValue {
    Counter { value: f64 },
    Rate(RateSnapshot),
    Trend(TrendSnapshot),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Counter { .. } => MetricKind::Counter,
            Self::Rate(_) => MetricKind::Rate,
            Self::Trend(_) => MetricKind::Trend,
        }
    }
}

/// Read-only view over every metric of a registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricsSnapshot {
    metrics: BTreeMap<MetricKey, MetricValue>,
}

impl MetricsSnapshot {
    pub fn get(&self, key: &MetricKey) -> Option<&MetricValue> {
        self.metrics.get(key)
    }

    pub fn by_name(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(&MetricKey::new(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricKey, &MetricValue)> {
        self.metrics.iter()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn counter_value(&self, name: &str) -> Option<f64> {
        match self.by_name(name)? {
            MetricValue::Counter { value } => Some(*value),
            _ => None,
        }
    }
}
