use std::collections::{BTreeMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

/// Number of most recent observations kept per operation for percentiles.
pub const SAMPLE_WINDOW: usize = 1024;

/// Latency summary for one named operation.
///
/// Count, mean, min, max and standard deviation cover every observation.
/// Percentiles are taken over the last [`SAMPLE_WINDOW`] observations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OpStats {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
    // Welford accumulators, in seconds.
    mean_secs: f64,
    m2: f64,
    recent: VecDeque<Duration>,
}

impl OpStats {
    fn observe(&mut self, elapsed: Duration) {
        if self.count == 0 || elapsed < self.min {
            self.min = elapsed;
        }
        if elapsed > self.max {
            self.max = elapsed;
        }
        self.count += 1;
        self.total += elapsed;

        let x = elapsed.as_secs_f64();
        let delta = x - self.mean_secs;
        self.mean_secs += delta / self.count as f64;
        self.m2 += delta * (x - self.mean_secs);

        if self.recent.len() == SAMPLE_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(elapsed);
    }

    pub fn mean(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total / n,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.count as f64),
        }
    }

    /// Sample standard deviation; zero below two observations.
    pub fn std_dev(&self) -> Duration {
        if self.count < 2 {
            return Duration::ZERO;
        }
        let variance = self.m2 / (self.count - 1) as f64;
        Duration::from_secs_f64(variance.max(0.0).sqrt())
    }

    /// Linearly interpolated quantile `q` in `[0, 1]` over the recent window.
    pub fn percentile(&self, q: f64) -> Duration {
        if self.recent.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<Duration> = self.recent.iter().copied().collect();
        sorted.sort_unstable();

        let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let (lo, hi) = (sorted[lower].as_secs_f64(), sorted[upper].as_secs_f64());
        Duration::from_secs_f64(lo + (hi - lo) * (rank - lower as f64))
    }
}

/// Per-operation latency recorder.
///
/// Every store operation issued through a [`RecordGateway`] and every
/// processing stage is timed here. Each observation is also emitted as a
/// `debug!` event so raw timings can be collected from logs.
///
/// [`RecordGateway`]: crate::gateway::RecordGateway
#[derive(Debug, Default)]
pub struct OpMetrics {
    ops: Mutex<BTreeMap<&'static str, OpStats>>,
}

impl OpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, op: &'static str, elapsed: Duration) {
        debug!(op, elapsed_us = elapsed.as_micros() as u64, "timing");
        if let Ok(mut ops) = self.ops.lock() {
            ops.entry(op).or_default().observe(elapsed);
        }
    }

    /// Copy of the current statistics, keyed by operation name.
    pub fn snapshot(&self) -> BTreeMap<&'static str, OpStats> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    pub fn get(&self, op: &str) -> Option<OpStats> {
        self.ops.lock().ok().and_then(|ops| ops.get(op).cloned())
    }

    /// Fixed-width table in milliseconds: count, mean, std, min, quartiles, max.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{:<20} {:>8} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
            "operation", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
        );
        for (op, stats) in self.snapshot() {
            let _ = writeln!(
                out,
                "{:<20} {:>8} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>9.3} {:>9.3}",
                op,
                stats.count,
                ms(stats.mean()),
                ms(stats.std_dev()),
                ms(stats.min),
                ms(stats.percentile(0.25)),
                ms(stats.percentile(0.50)),
                ms(stats.percentile(0.75)),
                ms(stats.max)
            );
        }
        out
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
