//! Atomic request/error/latency counters, sampled by a periodic logger
//! owned by the controller.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    inference_ns_sum: AtomicU64,
    inference_count: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inference(&self, duration: std::time::Duration) {
        self.inference_ns_sum
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        self.inference_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let count = self.inference_count.load(Ordering::Relaxed);
        let ns_sum = self.inference_ns_sum.load(Ordering::Relaxed);
        StatsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            avg_latency_ms: if count == 0 {
                0.0
            } else {
                (ns_sum as f64 / count as f64) / 1_000_000.0
            },
            inference_count: count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSnapshot {
    pub requests_total: u64,
    pub errors_total: u64,
    pub avg_latency_ms: f64,
    pub inference_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn avg_latency_is_zero_with_no_samples() {
        let stats = Stats::new();
        assert_eq!(stats.snapshot().avg_latency_ms, 0.0);
    }

    #[test]
    fn avg_latency_averages_recorded_durations() {
        let stats = Stats::new();
        stats.record_inference(Duration::from_millis(100));
        stats.record_inference(Duration::from_millis(300));
        let snap = stats.snapshot();
        assert_eq!(snap.inference_count, 2);
        assert!((snap.avg_latency_ms - 200.0).abs() < 0.001);
    }

    #[test]
    fn counters_increment_independently() {
        let stats = Stats::new();
        stats.record_request();
        stats.record_request();
        stats.record_error();
        let snap = stats.snapshot();
        assert_eq!(snap.requests_total, 2);
        assert_eq!(snap.errors_total, 1);
    }
}
