//! Decision counters and latency percentiles with Prometheus text export

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::time::Duration;

/// Latency samples kept for percentile estimates
const LATENCY_WINDOW: usize = 10_000;

/// Point-in-time view of the rule context counters
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Decisions returned, computed or cached
    pub total_requests: u64,
    pub allowed_decisions: u64,
    pub denied_decisions: u64,

    /// Decisions that fell through to the default effect
    pub default_decisions: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,

    /// Guards that failed at runtime; the rule was skipped
    pub guard_failures: u64,

    pub index_swaps: u64,

    /// Rule changes refused while the previous index kept serving
    pub rejected_reloads: u64,

    /// Latency percentiles over the recent window
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_p999_ms: f64,
    pub avg_latency_ms: f64,

    /// Requests rejected with an error instead of a decision
    pub error_count: u64,
}

impl EngineMetrics {
    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache_hits, self.cache_hits + self.cache_misses)
    }

    pub fn allow_rate(&self) -> f64 {
        ratio(self.allowed_decisions, self.total_requests)
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Sliding window of decision latencies in milliseconds
#[derive(Debug, Default)]
struct LatencyWindow {
    samples: VecDeque<f64>,
}

impl LatencyWindow {
    fn push(&mut self, ms: f64) {
        if self.samples.len() == LATENCY_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(ms);
    }

    /// Fill the latency fields of `metrics`
    fn summarize(&self, metrics: &mut EngineMetrics) {
        if self.samples.is_empty() {
            return;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let at = |q: f64| {
            let idx = ((sorted.len() as f64) * q) as usize;
            sorted[idx.min(sorted.len() - 1)]
        };
        metrics.latency_p50_ms = at(0.50);
        metrics.latency_p90_ms = at(0.90);
        metrics.latency_p95_ms = at(0.95);
        metrics.latency_p99_ms = at(0.99);
        metrics.latency_p999_ms = at(0.999);
        metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
    }
}

/// Collector shared by the rule context
///
/// Counters sit behind one `RwLock`; latency samples have their own lock so
/// percentile work never blocks counter updates.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: RwLock<EngineMetrics>,
    latency: Mutex<LatencyWindow>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.counters.write().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.counters.write().cache_misses += 1;
    }

    /// Count a decision; `defaulted` when no rule applied
    pub fn record_decision(&self, allowed: bool, defaulted: bool) {
        let mut counters = self.counters.write();
        counters.total_requests += 1;
        if allowed {
            counters.allowed_decisions += 1;
        } else {
            counters.denied_decisions += 1;
        }
        if defaulted {
            counters.default_decisions += 1;
        }
    }

    pub fn record_guard_failure(&self) {
        self.counters.write().guard_failures += 1;
    }

    pub fn record_index_swap(&self) {
        self.counters.write().index_swaps += 1;
    }

    pub fn record_rejected_reload(&self) {
        self.counters.write().rejected_reloads += 1;
    }

    pub fn record_latency(&self, latency: Duration) {
        self.latency.lock().push(latency.as_secs_f64() * 1000.0);
    }

    pub fn record_error(&self) {
        self.counters.write().error_count += 1;
    }

    /// Counters plus percentiles over the current latency window
    pub fn get_metrics(&self) -> EngineMetrics {
        let mut metrics = self.counters.read().clone();
        self.latency.lock().summarize(&mut metrics);
        metrics
    }

    pub fn reset(&self) {
        *self.counters.write() = EngineMetrics::default();
        self.latency.lock().samples.clear();
    }

    /// Prometheus text exposition format
    pub fn export_prometheus(&self) -> String {
        let m = self.get_metrics();
        let counters: [(&str, &str, u64); 10] = [
            ("abac_decisions_total", "Authorization decisions returned", m.total_requests),
            ("abac_allowed_total", "ALLOW decisions", m.allowed_decisions),
            ("abac_denied_total", "DENY decisions", m.denied_decisions),
            ("abac_default_decisions_total", "Decisions with no applicable rule", m.default_decisions),
            ("abac_cache_hits_total", "Decision cache hits", m.cache_hits),
            ("abac_cache_misses_total", "Decision cache misses", m.cache_misses),
            ("abac_guard_failures_total", "Guards that failed at runtime", m.guard_failures),
            ("abac_index_swaps_total", "Rule index swaps", m.index_swaps),
            ("abac_rejected_reloads_total", "Rejected rule changes", m.rejected_reloads),
            ("abac_errors_total", "Requests rejected with an error", m.error_count),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            // Writing to a String cannot fail
            let _ = writeln!(out, "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n");
        }

        let name = "abac_decision_latency_seconds";
        let _ = writeln!(out, "# HELP {name} Decision latency percentiles");
        let _ = writeln!(out, "# TYPE {name} summary");
        for (quantile, ms) in [
            ("0.5", m.latency_p50_ms),
            ("0.9", m.latency_p90_ms),
            ("0.95", m.latency_p95_ms),
            ("0.99", m.latency_p99_ms),
            ("0.999", m.latency_p999_ms),
        ] {
            let _ = writeln!(out, "{name}{{quantile=\"{quantile}\"}} {}", ms / 1000.0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_decision() {
        let collector = MetricsCollector::new();

        collector.record_decision(true, false);
        collector.record_decision(false, true);
        collector.record_decision(true, false);

        let metrics = collector.get_metrics();
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.allowed_decisions, 2);
        assert_eq!(metrics.denied_decisions, 1);
        assert_eq!(metrics.default_decisions, 1);
        assert!((metrics.allow_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_cache_hit_rate() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.get_metrics().cache_hit_rate(), 0.0);

        collector.record_cache_hit();
        collector.record_cache_hit();
        collector.record_cache_miss();
        assert!((collector.get_metrics().cache_hit_rate() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_latency_percentiles() {
        let collector = MetricsCollector::new();
        for ms in [5, 10, 15] {
            collector.record_latency(Duration::from_millis(ms));
        }

        let metrics = collector.get_metrics();
        assert!((metrics.avg_latency_ms - 10.0).abs() < 1.0);
        assert!((metrics.latency_p50_ms - 10.0).abs() < 1.0);
        assert!((metrics.latency_p99_ms - 15.0).abs() < 1.0);
    }

    #[test]
    fn test_latency_window_is_bounded() {
        let mut window = LatencyWindow::default();
        for i in 0..(LATENCY_WINDOW + 50) {
            window.push(i as f64);
        }
        assert_eq!(window.samples.len(), LATENCY_WINDOW);
        assert_eq!(window.samples.front().copied(), Some(50.0));
    }

    #[test]
    fn test_prometheus_export() {
        let collector = MetricsCollector::new();
        collector.record_decision(true, false);
        collector.record_index_swap();
        collector.record_latency(Duration::from_millis(5));

        let text = collector.export_prometheus();
        assert!(text.contains("# TYPE abac_decisions_total counter"));
        assert!(text.contains("abac_decisions_total 1\n"));
        assert!(text.contains("abac_allowed_total 1\n"));
        assert!(text.contains("abac_index_swaps_total 1\n"));
        assert!(text.contains("abac_decision_latency_seconds{quantile=\"0.5\"} 0.005"));
    }

    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new();
        collector.record_decision(true, false);
        collector.record_guard_failure();
        collector.record_latency(Duration::from_millis(3));

        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.total_requests, 0);
        assert_eq!(metrics.guard_failures, 0);
        assert_eq!(metrics.avg_latency_ms, 0.0);
    }
}
