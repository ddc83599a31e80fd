use std::fmt;

use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, gauge::Gauge, histogram::Histogram},
    registry::Registry,
};
use crate::metrics::{ErrorType, Metrics};
use crate::types::{SearchResult, StopReason};

pub struct PrometheusMetrics {
    registry: Registry,

    // Counters
    searches_found: Counter,
    searches_exhausted: Counter,
    searches_budget_exhausted: Counter,
    candidates_tested: Counter,
    chunk_retries: Counter,
    configuration_errors: Counter,
    encoding_errors: Counter,
    worker_errors: Counter,
    network_errors: Counter,

    // Gauges
    uptime_seconds: Gauge<i64>,
    hashes_per_second: Gauge<i64>,

    // Histograms
    search_duration_ms: Histogram,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let searches_found = Counter::default();
        let searches_exhausted = Counter::default();
        let searches_budget_exhausted = Counter::default();
        let candidates_tested = Counter::default();
        let chunk_retries = Counter::default();
        let configuration_errors = Counter::default();
        let encoding_errors = Counter::default();
        let worker_errors = Counter::default();
        let network_errors = Counter::default();

        let uptime_seconds = Gauge::default();
        let hashes_per_second = Gauge::default();

        let search_duration_ms = Histogram::new(
            [1.0, 10.0, 100.0, 500.0, 1000.0, 5000.0, 30000.0, 120000.0].into_iter()
        );

        registry.register(
            "mini_miner_searches_found",
            "Searches that returned a nonce",
            searches_found.clone(),
        );
        registry.register(
            "mini_miner_searches_exhausted",
            "Searches that tested the whole nonce space without a hit",
            searches_exhausted.clone(),
        );
        registry.register(
            "mini_miner_searches_budget_exhausted",
            "Searches stopped by an attempt or time budget",
            searches_budget_exhausted.clone(),
        );
        registry.register(
            "mini_miner_candidates_tested",
            "Candidates encoded, hashed and tested",
            candidates_tested.clone(),
        );
        registry.register(
            "mini_miner_chunk_retries",
            "Chunks requeued after a transient candidate failure",
            chunk_retries.clone(),
        );
        registry.register(
            "mini_miner_configuration_errors",
            "Searches rejected before starting",
            configuration_errors.clone(),
        );
        registry.register(
            "mini_miner_encoding_errors",
            "Payloads that could not be canonically encoded",
            encoding_errors.clone(),
        );
        registry.register(
            "mini_miner_worker_errors",
            "Searches aborted by worker failures",
            worker_errors.clone(),
        );
        registry.register(
            "mini_miner_network_errors",
            "Failed requests to the challenge service",
            network_errors.clone(),
        );
        registry.register(
            "mini_miner_uptime_seconds",
            "Process uptime in seconds",
            uptime_seconds.clone(),
        );
        registry.register(
            "mini_miner_hashes_per_second",
            "Average candidates tested per second across searches",
            hashes_per_second.clone(),
        );
        registry.register(
            "mini_miner_search_duration_ms",
            "Duration of searches in milliseconds",
            search_duration_ms.clone(),
        );

        Self {
            registry,
            searches_found,
            searches_exhausted,
            searches_budget_exhausted,
            candidates_tested,
            chunk_retries,
            configuration_errors,
            encoding_errors,
            worker_errors,
            network_errors,
            uptime_seconds,
            hashes_per_second,
            search_duration_ms,
        }
    }

    pub fn update_from_metrics(&self, metrics: &Metrics) {
        self.uptime_seconds.set(metrics.uptime_seconds as i64);
        self.hashes_per_second.set(metrics.hashes_per_second as i64);
    }

    pub fn record_search(&self, result: &SearchResult) {
        match result.stop {
            StopReason::Found => self.searches_found.inc(),
            StopReason::Exhausted => self.searches_exhausted.inc(),
            StopReason::BudgetExhausted => self.searches_budget_exhausted.inc(),
        };
        self.candidates_tested.inc_by(result.tested);
        self.search_duration_ms
            .observe(result.elapsed.as_secs_f64() * 1000.0);
    }

    pub fn record_retries(&self, retries: u64) {
        self.chunk_retries.inc_by(retries);
    }

    pub fn record_error(&self, error_type: ErrorType) {
        match error_type {
            ErrorType::Configuration => self.configuration_errors.inc(),
            ErrorType::Encoding => self.encoding_errors.inc(),
            ErrorType::Worker => self.worker_errors.inc(),
            ErrorType::Network => self.network_errors.inc(),
        };
    }

    pub fn export_metrics(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusMetrics")
            .field("searches_found", &self.searches_found.get())
            .field("candidates_tested", &self.candidates_tested.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use crate::metrics::MetricsCollector;

    #[test]
    fn exports_recorded_searches() {
        let prom = Arc::new(PrometheusMetrics::new());
        let collector = MetricsCollector::new().with_prometheus(Arc::clone(&prom));
        collector.record_search(&SearchResult {
            nonce: Some(3),
            stop: StopReason::Found,
            tested: 42,
            elapsed: Duration::from_millis(5),
        });
        collector.record_error(ErrorType::Network);
        prom.update_from_metrics(&collector.get_metrics());

        let text = prom.export_metrics().unwrap();
        assert!(text.contains("mini_miner_searches_found_total 1"));
        assert!(text.contains("mini_miner_candidates_tested_total 42"));
        assert!(text.contains("mini_miner_network_errors_total 1"));
        assert!(text.contains("mini_miner_search_duration_ms_count 1"));
    }
}
