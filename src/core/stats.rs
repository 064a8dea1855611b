use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use serde::{Serialize, Deserialize};

/// Sink for per-query and per-reindex measurements
pub trait QueryMetrics: Send + Sync {
    /// One latency timer and one result counter per executed query
    fn record_query(&self, index: &str, latency: Duration, results: usize);

    /// One counter per document reindex outcome
    fn record_reindex(&self, index: &str, success: bool);
}

/// Discards everything
pub struct NoopMetrics;

impl QueryMetrics for NoopMetrics {
    fn record_query(&self, _index: &str, _latency: Duration, _results: usize) {}

    fn record_reindex(&self, _index: &str, _success: bool) {}
}

/// Process-local counters
#[derive(Default)]
pub struct IndexMetrics {
    pub queries: AtomicU64,
    pub query_results: AtomicU64,
    pub query_latency_micros: AtomicU64,
    pub reindex_success: AtomicU64,
    pub reindex_failure: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub queries: u64,
    pub query_results: u64,
    pub avg_query_latency_ms: f64,
    pub reindex_success: u64,
    pub reindex_failure: u64,
}

impl IndexMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let queries = self.queries.load(Ordering::Relaxed);
        let latency = self.query_latency_micros.load(Ordering::Relaxed);
        let avg_query_latency_ms = if queries == 0 {
            0.0
        } else {
            latency as f64 / queries as f64 / 1000.0
        };

        MetricsSnapshot {
            queries,
            query_results: self.query_results.load(Ordering::Relaxed),
            avg_query_latency_ms,
            reindex_success: self.reindex_success.load(Ordering::Relaxed),
            reindex_failure: self.reindex_failure.load(Ordering::Relaxed),
        }
    }
}

impl QueryMetrics for IndexMetrics {
    fn record_query(&self, _index: &str, latency: Duration, results: usize) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.query_results.fetch_add(results as u64, Ordering::Relaxed);
        self.query_latency_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    fn record_reindex(&self, _index: &str, success: bool) {
        if success {
            self.reindex_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reindex_failure.fetch_add(1, Ordering::Relaxed);
        }
    }
}
