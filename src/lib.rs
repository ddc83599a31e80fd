//! Parallel proof-of-work nonce search.
//!
//! Given a difficulty `d` and a JSON payload, find a nonce `n` in
//! `[1, 2^d]` such that the SHA-256 digest of the canonical encoding of the
//! payload with `"nonce": n` merged in starts with `d` zero bits.
//!
//! ```no_run
//! use mini_miner::{Budget, Payload, Solver, SolverConfig};
//!
//! let payload = Payload::from_value(serde_json::json!({"data": [["a", 1]]}))?;
//! let result = Solver::new(SolverConfig::default()).solve(12, &payload, Budget::unlimited())?;
//! if let Some(nonce) = result.nonce {
//!     println!("nonce = {nonce}");
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod types;
pub mod error;
pub mod digest;
pub mod difficulty;
pub mod encoding;
pub mod pool;
pub mod aggregator;
pub mod solver;
pub mod config;
pub mod metrics;
pub mod prometheus_metrics;
pub mod error_handling;
pub mod client;

pub use difficulty::{Difficulty, leading_zero_bits, satisfies};
pub use encoding::{CandidateEncoder, CandidateTemplate, KeyOrder, encode};
pub use error::{CandidateError, ConfigurationError, EncodingError, SearchError};
pub use solver::{CancelToken, Solver, SolverConfig, solve};
pub use types::{Budget, Outcome, Payload, SearchResult, StopReason};
