//! Merges candidates from both transports into the canonical snapshot.
//!
//! Candidates arrive over one queue and are applied strictly in arrival
//! order by a single task:
//!
//! 1. Unknown states are rejected.
//! 2. The message count never goes backwards within a session; a lower,
//!    zero or missing count is replaced by the held one. Only a
//!    `disconnected` candidate resets it.
//! 3. Fields that do not belong to the candidate's phase are cleared.
//! 4. The result replaces the canonical snapshot unless it is identical.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::models::{
    CandidateSnapshot, CandidateSource, ConnectionPhase, StatusSnapshot, UnknownPhase,
};

/// A candidate tagged with the transport that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedCandidate {
    pub source: CandidateSource,
    pub candidate: CandidateSnapshot,
}

impl SourcedCandidate {
    pub fn push(candidate: CandidateSnapshot) -> Self {
        Self {
            source: CandidateSource::Push,
            candidate,
        }
    }

    pub fn poll(candidate: CandidateSnapshot) -> Self {
        Self {
            source: CandidateSource::Poll,
            candidate,
        }
    }
}

/// Sending half of the candidate queue, shared by both drivers.
pub type CandidateSender = mpsc::Sender<SourcedCandidate>;

/// Why a candidate was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error(transparent)]
    UnknownState(#[from] UnknownPhase),
}

/// Result of applying an accepted candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The canonical snapshot was replaced
    Published(StatusSnapshot),
    /// The candidate matched the current snapshot
    Unchanged,
}

/// Running counters kept by the reconciler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerStats {
    /// Candidates that replaced the canonical snapshot
    pub accepted: u64,
    /// Candidates dropped as malformed
    pub rejected: u64,
    /// Valid candidates identical to the canonical snapshot
    pub suppressed: u64,
}

impl ReconcilerStats {
    pub fn total(&self) -> u64 {
        self.accepted + self.rejected + self.suppressed
    }
}

/// Reconciliation state machine.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    current: StatusSnapshot,
    stats: ReconcilerStats,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already published snapshot.
    pub fn with_snapshot(current: StatusSnapshot) -> Self {
        Self {
            current,
            stats: ReconcilerStats::default(),
        }
    }

    pub fn current(&self) -> &StatusSnapshot {
        &self.current
    }

    pub fn stats(&self) -> ReconcilerStats {
        self.stats
    }

    /// Apply one candidate.
    pub fn apply(&mut self, candidate: CandidateSnapshot) -> Result<Outcome, Rejection> {
        let phase = match candidate.phase() {
            Ok(phase) => phase,
            Err(e) => {
                self.stats.rejected += 1;
                return Err(e.into());
            }
        };

        let mut next = StatusSnapshot::scoped(phase, candidate);

        let held = self.current.message_count;
        if phase != ConnectionPhase::Disconnected && next.message_count < held {
            tracing::trace!(
                incoming = next.message_count,
                held,
                "Carrying message count forward"
            );
            next.message_count = held;
        }

        if next == self.current {
            self.stats.suppressed += 1;
            return Ok(Outcome::Unchanged);
        }

        if !self.current.phase.can_transition_to(phase) {
            tracing::debug!(
                from = %self.current.phase,
                to = %phase,
                "Unexpected state transition"
            );
        }

        self.current = next.clone();
        self.stats.accepted += 1;
        Ok(Outcome::Published(next))
    }
}

/// Spawn the reconciler task.
///
/// Runs until every sender of the candidate queue is dropped or the task is
/// aborted. The initial state is whatever `snapshot_tx` currently holds.
pub fn spawn_reconciler(
    mut candidates: mpsc::Receiver<SourcedCandidate>,
    snapshot_tx: Arc<watch::Sender<StatusSnapshot>>,
    stats_tx: Arc<watch::Sender<ReconcilerStats>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reconciler = Reconciler::with_snapshot(snapshot_tx.borrow().clone());
        tracing::debug!(phase = %reconciler.current().phase, "Reconciler started");

        while let Some(SourcedCandidate { source, candidate }) = candidates.recv().await {
            let previous = reconciler.current().phase;

            match reconciler.apply(candidate) {
                Ok(Outcome::Published(snapshot)) => {
                    if snapshot.phase != previous {
                        tracing::info!(
                            source = source.as_str(),
                            from = %previous,
                            to = %snapshot.phase,
                            "Connection state changed"
                        );
                    } else {
                        tracing::debug!(
                            source = source.as_str(),
                            phase = %snapshot.phase,
                            messages = snapshot.message_count,
                            "Snapshot updated"
                        );
                    }
                    snapshot_tx.send_replace(snapshot);
                }
                Ok(Outcome::Unchanged) => {
                    tracing::trace!(source = source.as_str(), "Duplicate snapshot suppressed");
                }
                Err(rejection) => {
                    tracing::warn!(
                        source = source.as_str(),
                        error = %rejection,
                        "Rejected candidate snapshot"
                    );
                }
            }

            stats_tx.send_replace(reconciler.stats());
        }

        tracing::debug!("Reconciler stopped");
    })
}
