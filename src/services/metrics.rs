//! Counters for the status endpoint

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

pub struct MetricsService {
    words_generated: AtomicUsize,
    runs_completed: AtomicUsize,
    rank_requests: AtomicUsize,
    total_rank_latency_us: AtomicU64,
    start_time: Instant,
}

impl MetricsService {
    pub fn new() -> Self {
        Self {
            words_generated: AtomicUsize::new(0),
            runs_completed: AtomicUsize::new(0),
            rank_requests: AtomicUsize::new(0),
            total_rank_latency_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_words(&self, count: usize) {
        self.words_generated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_run(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rank(&self, latency_us: u64) {
        self.rank_requests.fetch_add(1, Ordering::Relaxed);
        self.total_rank_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> MetricsStats {
        let words = self.words_generated.load(Ordering::Relaxed);
        let runs = self.runs_completed.load(Ordering::Relaxed);
        let ranks = self.rank_requests.load(Ordering::Relaxed);
        let total_latency = self.total_rank_latency_us.load(Ordering::Relaxed);

        MetricsStats {
            words_generated: words,
            runs_completed: runs,
            rank_requests: ranks,
            avg_rank_latency_us: if ranks > 0 {
                total_latency / ranks as u64
            } else {
                0
            },
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsStats {
    pub words_generated: usize,
    pub runs_completed: usize,
    pub rank_requests: usize,
    pub avg_rank_latency_us: u64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsService::new();
        metrics.record_words(3);
        metrics.record_words(2);
        metrics.record_run();
        metrics.record_rank(100);
        metrics.record_rank(300);

        let stats = metrics.get_stats();
        assert_eq!(stats.words_generated, 5);
        assert_eq!(stats.runs_completed, 1);
        assert_eq!(stats.rank_requests, 2);
        assert_eq!(stats.avg_rank_latency_us, 200);
    }

    #[test]
    fn test_average_latency_with_no_requests_is_zero() {
        let stats = MetricsService::new().get_stats();
        assert_eq!(stats.avg_rank_latency_us, 0);
    }
}
