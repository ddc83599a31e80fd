//! Winner selection and the report stream consumer.
//!
//! The winning nonce is the first one to be claimed on the [`WinnerSlot`],
//! which is the first one the aggregator observes. When more than one
//! nonce in the space is valid the choice depends on thread scheduling and
//! is not reproducible between runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use crate::error::SearchError;
use crate::solver::CancelToken;
use crate::types::Outcome;

/// Message from a worker to the aggregator. Each worker sends at most one
/// `Found` or `Failed`, then exactly one `Done`.
#[derive(Debug)]
pub enum Report {
    Found(Outcome),
    Failed(SearchError),
    Done { worker: usize, tested: u64 },
}

/// Single-winner slot; `0` means empty since nonce 0 is never searched.
#[derive(Debug, Default)]
pub struct WinnerSlot(AtomicU64);

impl WinnerSlot {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// First write wins. Returns `true` only for the caller that stored `nonce`.
    pub fn try_claim(&self, nonce: u64) -> bool {
        debug_assert!(nonce != 0);
        self.0
            .compare_exchange(0, nonce, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            n => Some(n),
        }
    }
}

/// What the aggregator saw once every worker finished.
#[derive(Debug, Default)]
pub struct Collected {
    pub winner: Option<u64>,
    pub tested: u64,
    pub timed_out: bool,
    pub error: Option<SearchError>,
}

pub struct Aggregator<'a> {
    cancel: &'a CancelToken,
    deadline: Option<Instant>,
    workers: usize,
}

impl<'a> Aggregator<'a> {
    pub fn new(cancel: &'a CancelToken, deadline: Option<Instant>, workers: usize) -> Self {
        Self {
            cancel,
            deadline,
            workers,
        }
    }

    /// Consume reports until all workers are done.
    ///
    /// The first `Found` or `Failed` cancels the remaining workers; reports
    /// are still drained afterwards so no worker is left blocked on a send.
    pub fn collect(&self, reports: &Receiver<Report>) -> Collected {
        let mut out = Collected::default();
        let mut done = 0;

        while done < self.workers {
            let waiting_on_deadline = self.deadline.filter(|_| !self.cancel.is_cancelled());
            let report = match waiting_on_deadline {
                Some(deadline) => match reports.recv_deadline(deadline) {
                    Ok(r) => r,
                    Err(RecvTimeoutError::Timeout) => {
                        debug!(target: "mini_miner::aggregator", "search deadline reached");
                        out.timed_out = true;
                        self.cancel.cancel();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match reports.recv() {
                    Ok(r) => r,
                    Err(_) => break,
                },
            };

            match report {
                Report::Found(outcome) if outcome.valid => {
                    self.cancel.cancel();
                    if out.winner.is_none() {
                        out.winner = Some(outcome.nonce);
                    } else {
                        warn!(
                            target: "mini_miner::aggregator",
                            nonce = outcome.nonce,
                            "ignoring second winner report"
                        );
                    }
                }
                Report::Found(_) => {}
                Report::Failed(err) => {
                    self.cancel.cancel();
                    if out.error.is_none() {
                        out.error = Some(err);
                    }
                }
                Report::Done { worker, tested } => {
                    debug!(target: "mini_miner::aggregator", worker, tested, "worker finished");
                    out.tested += tested;
                    done += 1;
                }
            }
        }

        if done < self.workers {
            warn!(
                target: "mini_miner::aggregator",
                finished = done,
                expected = self.workers,
                "report channel closed early"
            );
        }
        out
    }
}
