use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;
use crate::prometheus_metrics::PrometheusMetrics;
use crate::types::{SearchResult, StopReason};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    // Search outcomes
    pub total_searches: u64,
    pub found: u64,
    pub exhausted: u64,
    pub budget_exhausted: u64,

    // Work done
    pub candidates_tested: u64,
    pub chunk_retries: u64,
    pub average_time_ms: f64,
    pub min_time_ms: u64,
    pub max_time_ms: u64,

    // Errors
    pub configuration_errors: u64,
    pub encoding_errors: u64,
    pub worker_errors: u64,
    pub network_errors: u64,

    pub uptime_seconds: u64,
    pub last_found_nonce: Option<u64>,
    pub hashes_per_second: f64,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_searches: AtomicU64,
    found: AtomicU64,
    exhausted: AtomicU64,
    budget_exhausted: AtomicU64,
    candidates_tested: AtomicU64,
    chunk_retries: AtomicU64,
    configuration_errors: AtomicU64,
    encoding_errors: AtomicU64,
    worker_errors: AtomicU64,
    network_errors: AtomicU64,

    start_time: Option<Instant>,
    last_found_nonce: Mutex<Option<u64>>,

    // Timing
    total_time_ms: AtomicU64,
    total_time_us: AtomicU64,
    min_time_ms: AtomicU64,
    max_time_ms: AtomicU64,

    prometheus: Option<Arc<PrometheusMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            min_time_ms: AtomicU64::new(u64::MAX),
            ..Self::default()
        }
    }

    /// Mirror every recorded event into a Prometheus registry.
    pub fn with_prometheus(mut self, prometheus: Arc<PrometheusMetrics>) -> Self {
        self.prometheus = Some(prometheus);
        self
    }

    pub fn record_search(&self, result: &SearchResult) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
        match result.stop {
            StopReason::Found => {
                self.found.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut last) = self.last_found_nonce.lock() {
                    *last = result.nonce;
                }
            }
            StopReason::Exhausted => {
                self.exhausted.fetch_add(1, Ordering::Relaxed);
            }
            StopReason::BudgetExhausted => {
                self.budget_exhausted.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.candidates_tested.fetch_add(result.tested, Ordering::Relaxed);

        let time_ms = result.elapsed.as_millis() as u64;
        self.total_time_ms.fetch_add(time_ms, Ordering::Relaxed);
        self.total_time_us
            .fetch_add(result.elapsed.as_micros() as u64, Ordering::Relaxed);
        self.min_time_ms.fetch_min(time_ms, Ordering::Relaxed);
        self.max_time_ms.fetch_max(time_ms, Ordering::Relaxed);

        if let Some(prom) = &self.prometheus {
            prom.record_search(result);
        }
    }

    pub fn record_retries(&self, retries: u64) {
        if retries == 0 {
            return;
        }
        self.chunk_retries.fetch_add(retries, Ordering::Relaxed);
        if let Some(prom) = &self.prometheus {
            prom.record_retries(retries);
        }
    }

    pub fn record_error(&self, error_type: ErrorType) {
        match error_type {
            ErrorType::Configuration => self.configuration_errors.fetch_add(1, Ordering::Relaxed),
            ErrorType::Encoding => self.encoding_errors.fetch_add(1, Ordering::Relaxed),
            ErrorType::Worker => self.worker_errors.fetch_add(1, Ordering::Relaxed),
            ErrorType::Network => self.network_errors.fetch_add(1, Ordering::Relaxed),
        };
        if let Some(prom) = &self.prometheus {
            prom.record_error(error_type);
        }
    }

    pub fn get_metrics(&self) -> Metrics {
        let total_searches = self.total_searches.load(Ordering::Relaxed);
        let candidates_tested = self.candidates_tested.load(Ordering::Relaxed);
        let total_time_ms = self.total_time_ms.load(Ordering::Relaxed);
        let total_time_us = self.total_time_us.load(Ordering::Relaxed);
        let min_time_ms = self.min_time_ms.load(Ordering::Relaxed);

        let average_time_ms = if total_searches > 0 {
            total_time_ms as f64 / total_searches as f64
        } else {
            0.0
        };

        let hashes_per_second = if total_time_us > 0 {
            candidates_tested as f64 * 1_000_000.0 / total_time_us as f64
        } else {
            0.0
        };

        let last_found_nonce = self.last_found_nonce.lock().map(|n| *n).unwrap_or(None);

        Metrics {
            total_searches,
            found: self.found.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            budget_exhausted: self.budget_exhausted.load(Ordering::Relaxed),
            candidates_tested,
            chunk_retries: self.chunk_retries.load(Ordering::Relaxed),
            average_time_ms,
            min_time_ms: if min_time_ms == u64::MAX { 0 } else { min_time_ms },
            max_time_ms: self.max_time_ms.load(Ordering::Relaxed),
            configuration_errors: self.configuration_errors.load(Ordering::Relaxed),
            encoding_errors: self.encoding_errors.load(Ordering::Relaxed),
            worker_errors: self.worker_errors.load(Ordering::Relaxed),
            network_errors: self.network_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.map_or(0, |t| t.elapsed().as_secs()),
            last_found_nonce,
            hashes_per_second,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Configuration,
    Encoding,
    Worker,
    Network,
}

impl From<&SearchError> for ErrorType {
    fn from(err: &SearchError) -> Self {
        match err {
            SearchError::Configuration(_) => ErrorType::Configuration,
            SearchError::Encoding(_) => ErrorType::Encoding,
            SearchError::RetriesExhausted { .. } | SearchError::Aborted(_) => ErrorType::Worker,
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorType::Configuration => write!(f, "configuration"),
            ErrorType::Encoding => write!(f, "encoding"),
            ErrorType::Worker => write!(f, "worker"),
            ErrorType::Network => write!(f, "network"),
        }
    }
}
