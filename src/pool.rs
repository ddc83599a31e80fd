//! Bounded worker pool over the nonce space `[1, 2^d]`.
//!
//! Workers claim contiguous chunks from a shared cursor, so every nonce is
//! handed out exactly once. Chunks that hit a transient failure go back on a
//! retry queue with the failed nonce first; workers drain that queue before
//! claiming fresh chunks.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, Scope};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::aggregator::{Report, WinnerSlot};
use crate::difficulty::{Difficulty, satisfies};
use crate::digest::Digester;
use crate::encoding::CandidateEncoder;
use crate::error::{CandidateError, SearchError};
use crate::solver::CancelToken;
use crate::types::Outcome;

pub const MAX_WORKERS: usize = 256;

/// Inclusive range of nonces to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceSpace {
    pub start: u64,
    pub end: u64,
}

impl NonceSpace {
    /// `[1, 2^d]`, shortened to `[1, max_attempts]` when that is smaller.
    pub fn new(difficulty: Difficulty, max_attempts: Option<u64>) -> Self {
        let full = difficulty.space_end();
        let end = max_attempts.map_or(full, |max| max.min(full));
        Self { start: 1, end }
    }

    pub fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start).saturating_add(1)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hands out non-overlapping chunks of a [`NonceSpace`].
#[derive(Debug)]
pub struct ChunkCursor {
    next: AtomicU64,
    end: u64,
    chunk_size: u64,
}

/// Stored in `next` once the chunk ending at `u64::MAX` is handed out.
const CURSOR_DONE: u64 = 0;

impl ChunkCursor {
    pub fn new(space: NonceSpace, chunk_size: u64) -> Self {
        let start = if space.is_empty() { CURSOR_DONE } else { space.start };
        Self {
            next: AtomicU64::new(start),
            end: space.end,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn claim(&self) -> Option<RangeInclusive<u64>> {
        let mut start = self.next.load(Ordering::Relaxed);
        loop {
            if start == CURSOR_DONE || start > self.end {
                return None;
            }
            let last = start.saturating_add(self.chunk_size - 1).min(self.end);
            let next = last.checked_add(1).unwrap_or(CURSOR_DONE);
            match self
                .next
                .compare_exchange_weak(start, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Some(start..=last),
                Err(current) => start = current,
            }
        }
    }
}

#[derive(Debug, Clone)]
struct RetryChunk {
    range: RangeInclusive<u64>,
    attempt: u32,
}

/// Shared state for one search; workers borrow it for the thread scope.
pub struct WorkerPool<'a> {
    difficulty: Difficulty,
    encoder: &'a dyn CandidateEncoder,
    digester: &'a dyn Digester,
    winner: &'a WinnerSlot,
    cancel: CancelToken,
    cursor: ChunkCursor,
    retry_tx: Sender<RetryChunk>,
    retry_rx: Receiver<RetryChunk>,
    max_retries: u32,
    retries: AtomicU64,
}

impl<'a> WorkerPool<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        difficulty: Difficulty,
        space: NonceSpace,
        chunk_size: u64,
        max_retries: u32,
        encoder: &'a dyn CandidateEncoder,
        digester: &'a dyn Digester,
        winner: &'a WinnerSlot,
        cancel: CancelToken,
    ) -> Self {
        let (retry_tx, retry_rx) = crossbeam_channel::unbounded();
        Self {
            difficulty,
            encoder,
            digester,
            winner,
            cancel,
            cursor: ChunkCursor::new(space, chunk_size),
            retry_tx,
            retry_rx,
            max_retries,
            retries: AtomicU64::new(0),
        }
    }

    /// Number of chunk retries scheduled so far.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Start up to `workers` threads inside `scope`. Returns how many started.
    ///
    /// A thread that fails to spawn is skipped; its share of the space is
    /// picked up by the others since chunks are claimed on demand.
    pub fn spawn<'scope>(
        &'scope self,
        scope: &'scope Scope<'scope, '_>,
        workers: usize,
        reports: Sender<Report>,
    ) -> Result<usize, SearchError> {
        let mut started = 0;
        for id in 0..workers {
            let reports = reports.clone();
            let spawned = thread::Builder::new()
                .name(format!("nonce-worker-{id}"))
                .spawn_scoped(scope, move || self.run_worker(id, &reports));
            match spawned {
                Ok(_) => started += 1,
                Err(e) => warn!(target: "mini_miner::pool", worker = id, error = %e, "failed to spawn worker"),
            }
        }
        if started == 0 {
            self.cancel.cancel();
            return Err(SearchError::Aborted("no worker thread could be started".into()));
        }
        Ok(started)
    }

    fn next_chunk(&self) -> Option<RetryChunk> {
        if let Ok(chunk) = self.retry_rx.try_recv() {
            return Some(chunk);
        }
        self.cursor.claim().map(|range| RetryChunk { range, attempt: 0 })
    }

    fn run_worker(&self, id: usize, reports: &Sender<Report>) {
        let mut buf = Vec::with_capacity(256);
        let mut tested = 0u64;

        'work: while !self.cancel.is_cancelled() {
            let Some(RetryChunk { range, attempt }) = self.next_chunk() else {
                break;
            };
            trace!(target: "mini_miner::pool", worker = id, start = range.start(), end = range.end(), attempt, "claimed chunk");
            let end = *range.end();

            for nonce in range {
                if self.cancel.is_cancelled() {
                    break 'work;
                }
                match self.encoder.encode_into(nonce, &mut buf) {
                    Ok(()) => {}
                    Err(CandidateError::Transient(reason)) => {
                        if attempt >= self.max_retries {
                            let _ = reports.send(Report::Failed(SearchError::RetriesExhausted {
                                start: nonce,
                                end,
                                attempts: attempt + 1,
                                reason,
                            }));
                            break 'work;
                        }
                        warn!(target: "mini_miner::pool", worker = id, nonce, attempt, %reason, "requeueing chunk");
                        self.retries.fetch_add(1, Ordering::Relaxed);
                        let _ = self.retry_tx.send(RetryChunk {
                            range: nonce..=end,
                            attempt: attempt + 1,
                        });
                        continue 'work;
                    }
                    Err(CandidateError::Encoding(e)) => {
                        let _ = reports.send(Report::Failed(e.into()));
                        break 'work;
                    }
                }

                tested += 1;
                let digest = self.digester.digest(&buf);
                if satisfies(&digest, self.difficulty) && self.winner.try_claim(nonce) {
                    self.cancel.cancel();
                    debug!(target: "mini_miner::pool", worker = id, nonce, digest = %hex::encode(digest), "found nonce");
                    let _ = reports.send(Report::Found(Outcome { nonce, valid: true }));
                    break 'work;
                }
            }
        }

        let _ = reports.send(Report::Done { worker: id, tested });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn space_bounds() {
        let d = Difficulty::new(4).unwrap();
        assert_eq!(NonceSpace::new(d, None), NonceSpace { start: 1, end: 16 });
        assert_eq!(NonceSpace::new(d, Some(5)).end, 5);
        assert_eq!(NonceSpace::new(d, Some(100)).end, 16);
        assert!(NonceSpace::new(d, Some(0)).is_empty());
        assert_eq!(NonceSpace::new(Difficulty::ZERO, None).len(), 1);
        assert_eq!(
            NonceSpace::new(Difficulty::new(64).unwrap(), None).len(),
            u64::MAX
        );
    }

    #[test]
    fn cursor_covers_space_once() {
        let cursor = ChunkCursor::new(NonceSpace { start: 1, end: 100 }, 7);
        let mut seen = Vec::new();
        while let Some(r) = cursor.claim() {
            seen.extend(r);
        }
        assert_eq!(seen, (1..=100).collect::<Vec<_>>());
        assert!(cursor.claim().is_none());
    }

    #[test]
    fn cursor_concurrent_claims_disjoint() {
        let cursor = ChunkCursor::new(NonceSpace { start: 1, end: 10_000 }, 13);
        let all: Vec<u64> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        let mut mine = Vec::new();
                        while let Some(r) = cursor.claim() {
                            mine.extend(r);
                        }
                        mine
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 10_000);
        assert_eq!(unique.len(), 10_000);
    }

    #[test]
    fn cursor_stops_at_u64_max() {
        let cursor = ChunkCursor::new(
            NonceSpace {
                start: u64::MAX - 4,
                end: u64::MAX,
            },
            3,
        );
        assert_eq!(cursor.claim(), Some(u64::MAX - 4..=u64::MAX - 2));
        assert_eq!(cursor.claim(), Some(u64::MAX - 1..=u64::MAX));
        assert_eq!(cursor.claim(), None);
    }

    #[test]
    fn empty_space_yields_nothing() {
        let cursor = ChunkCursor::new(NonceSpace { start: 1, end: 0 }, 10);
        assert_eq!(cursor.claim(), None);
    }
}
