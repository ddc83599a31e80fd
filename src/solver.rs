use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregator::{Aggregator, WinnerSlot};
use crate::difficulty::{Difficulty, satisfies};
use crate::digest::{Digest, Digester, HashAlgorithm};
use crate::encoding::{self, CandidateEncoder, CandidateTemplate, KeyOrder};
use crate::error::{ConfigurationError, SearchError};
use crate::metrics::{ErrorType, MetricsCollector};
use crate::pool::{MAX_WORKERS, NonceSpace, WorkerPool};
use crate::types::{Budget, Payload, SearchResult, StopReason};

/// Shared stop flag, checked by every worker between candidates.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Worker threads per search.
    pub workers: usize,
    /// Nonces claimed by a worker at a time.
    pub chunk_size: u64,
    /// Times a chunk is requeued after transient failures before giving up.
    pub max_retries: u32,
    pub hash: HashAlgorithm,
    pub key_order: KeyOrder,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().clamp(1, MAX_WORKERS),
            chunk_size: 4096,
            max_retries: 3,
            hash: HashAlgorithm::Sha256,
            key_order: KeyOrder::Sorted,
        }
    }
}

impl SolverConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigurationError::InvalidWorkers {
                got: self.workers,
                max: MAX_WORKERS,
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigurationError::InvalidChunkSize);
        }
        Ok(())
    }
}

/// Parallel nonce search.
pub struct Solver {
    config: SolverConfig,
    digester: Box<dyn Digester>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Solver {
    pub fn new(config: SolverConfig) -> Self {
        let digester = config.hash.digester();
        Self {
            config,
            digester,
            metrics: None,
        }
    }

    /// Replace the hash function chosen by the config.
    pub fn with_digester(mut self, digester: impl Digester + 'static) -> Self {
        self.digester = Box::new(digester);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Find a nonce in `[1, 2^difficulty]` whose candidate digest has
    /// `difficulty` leading zero bits.
    ///
    /// The first nonce reported by any worker wins. If several nonces are
    /// valid, which one is returned depends on scheduling and can differ
    /// between runs; every returned nonce is valid.
    ///
    /// Besides configuration and encoding errors, this fails with
    /// [`SearchError::RetriesExhausted`] when a candidate keeps failing
    /// transiently after `max_retries` requeues of its chunk.
    pub fn solve(
        &self,
        difficulty: u32,
        payload: &Payload,
        budget: Budget,
    ) -> Result<SearchResult, SearchError> {
        let result = Difficulty::new(difficulty)
            .map_err(SearchError::from)
            .and_then(|d| {
                let template = CandidateTemplate::new(payload, self.config.key_order)?;
                Ok((d, template))
            });
        match result {
            Ok((d, template)) => self.search(d, &template, budget),
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Run the search with a caller-provided encoder.
    pub fn search(
        &self,
        difficulty: Difficulty,
        encoder: &dyn CandidateEncoder,
        budget: Budget,
    ) -> Result<SearchResult, SearchError> {
        if let Err(e) = self.config.validate() {
            let e = SearchError::from(e);
            self.record_failure(&e);
            return Err(e);
        }

        let started = Instant::now();
        let space = NonceSpace::new(difficulty, budget.max_attempts);
        let shortened = space.end < difficulty.space_end();
        let deadline = budget.timeout.map(|t| started + t);
        let workers = self.config.workers;

        info!(
            target: "mini_miner::solver",
            %difficulty,
            space = space.len(),
            workers,
            chunk_size = self.config.chunk_size,
            "starting nonce search"
        );

        let cancel = CancelToken::new();
        let winner = WinnerSlot::new();
        let pool = WorkerPool::new(
            difficulty,
            space,
            self.config.chunk_size,
            self.config.max_retries,
            encoder,
            self.digester.as_ref(),
            &winner,
            cancel.clone(),
        );
        let (tx, rx) = crossbeam_channel::bounded(workers * 2);

        let collected = thread::scope(|s| {
            let started_workers = pool.spawn(s, workers, tx)?;
            Ok::<_, SearchError>(Aggregator::new(&cancel, deadline, started_workers).collect(&rx))
        });
        let collected = match collected {
            Ok(c) => c,
            Err(e) => {
                self.record_failure(&e);
                return Err(e);
            }
        };
        let elapsed = started.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.record_retries(pool.retries());
        }

        let stop = match (collected.winner, collected.error) {
            (Some(_), _) => StopReason::Found,
            (None, Some(e)) => {
                self.record_failure(&e);
                return Err(e);
            }
            (None, None) if collected.timed_out || shortened => StopReason::BudgetExhausted,
            (None, None) => StopReason::Exhausted,
        };
        let result = SearchResult {
            nonce: collected.winner,
            stop,
            tested: collected.tested,
            elapsed,
        };

        match result.nonce {
            Some(nonce) => info!(
                target: "mini_miner::solver",
                nonce,
                tested = result.tested,
                elapsed_ms = elapsed.as_millis() as u64,
                hashrate = result.hashrate(),
                "nonce found"
            ),
            None => info!(
                target: "mini_miner::solver",
                ?stop,
                tested = result.tested,
                elapsed_ms = elapsed.as_millis() as u64,
                "no nonce found"
            ),
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_search(&result);
        }
        Ok(result)
    }

    /// Digest of the candidate for `nonce`, as the verifier computes it.
    pub fn digest_of(&self, payload: &Payload, nonce: u64) -> Result<Digest, SearchError> {
        let bytes = encoding::encode(payload, nonce, self.config.key_order)?;
        debug!(target: "mini_miner::solver", nonce, len = bytes.len(), "encoded candidate");
        Ok(self.digester.digest(&bytes))
    }

    /// Check a nonce without searching.
    pub fn verify(
        &self,
        difficulty: u32,
        payload: &Payload,
        nonce: u64,
    ) -> Result<bool, SearchError> {
        let difficulty = Difficulty::new(difficulty)?;
        Ok(satisfies(&self.digest_of(payload, nonce)?, difficulty))
    }

    /// [`Solver::solve`] on the blocking thread pool.
    pub async fn solve_async(
        self: Arc<Self>,
        difficulty: u32,
        payload: Payload,
        budget: Budget,
    ) -> Result<SearchResult, SearchError> {
        tokio::task::spawn_blocking(move || self.solve(difficulty, &payload, budget))
            .await
            .map_err(|e| SearchError::Aborted(e.to_string()))?
    }

    fn record_failure(&self, err: &SearchError) {
        if let Some(metrics) = &self.metrics {
            metrics.record_error(ErrorType::from(err));
        }
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

/// Search with the default configuration and no budget.
pub fn solve(difficulty: u32, payload: &Payload) -> Result<SearchResult, SearchError> {
    Solver::default().solve(difficulty, payload, Budget::unlimited())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cancel_is_idempotent() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn config_validation() {
        assert!(SolverConfig::default().validate().is_ok());
        assert_eq!(
            SolverConfig::with_workers(0).validate(),
            Err(ConfigurationError::InvalidWorkers { got: 0, max: MAX_WORKERS })
        );
        let cfg = SolverConfig {
            chunk_size: 0,
            ..SolverConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigurationError::InvalidChunkSize));
    }

    #[test]
    fn difficulty_zero_single_worker_returns_one() {
        let payload = Payload::from_value(json!({"data": [["a", 1]]})).unwrap();
        let solver = Solver::new(SolverConfig::with_workers(1));
        let result = solver.solve(0, &payload, Budget::unlimited()).unwrap();
        assert_eq!(result.nonce, Some(1));
        assert_eq!(result.stop, StopReason::Found);
        assert_eq!(result.tested, 1);
    }

    #[test]
    fn found_nonce_verifies() {
        let payload = Payload::from_value(json!({"nonce": null, "data": [["x", 2], ["y", 3]]})).unwrap();
        let solver = Solver::new(SolverConfig::with_workers(4));
        let result = solver.solve(8, &payload, Budget::unlimited()).unwrap();
        // 256 candidates at 1/256 each: a miss is possible, a wrong hit is not
        if let Some(nonce) = result.nonce {
            assert!(solver.verify(8, &payload, nonce).unwrap());
            assert!(crate::difficulty::leading_zero_bits(&solver.digest_of(&payload, nonce).unwrap()) >= 8);
        } else {
            assert_eq!(result.stop, StopReason::Exhausted);
            assert_eq!(result.tested, 256);
        }
    }

    #[test]
    fn rejects_oversized_difficulty_before_search() {
        let payload = Payload::default();
        let err = Solver::default()
            .solve(257, &payload, Budget::unlimited())
            .unwrap_err();
        assert!(matches!(
            err,
            SearchError::Configuration(ConfigurationError::DifficultyTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn solve_async_runs_on_blocking_pool() {
        let payload = Payload::from_value(json!({"data": []})).unwrap();
        let solver = Arc::new(Solver::new(SolverConfig::with_workers(2)));
        let result = solver.solve_async(0, payload, Budget::unlimited()).await.unwrap();
        assert_eq!(result.nonce, Some(1));
    }
}
