//! Poll driver: fetches the status snapshot on a phase-dependent timer.
//!
//! The first poll fires immediately. After that the interval follows the
//! cadence class of the canonical snapshot; when the class changes, the
//! next poll is rescheduled one new interval from the change.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::reconciler::{CandidateSender, SourcedCandidate};
use crate::api::LinkApiClient;
use crate::config::clamp_interval;
use crate::models::{Cadence, StatusSnapshot};

/// Intervals for each cadence class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub fast: Duration,
    pub slow: Duration,
}

impl PollSchedule {
    pub fn new(fast: Duration, slow: Duration) -> Self {
        Self {
            fast: clamp_interval(fast),
            slow: clamp_interval(slow),
        }
    }

    pub fn interval(&self, cadence: Cadence) -> Duration {
        let interval = match cadence {
            Cadence::Fast => self.fast,
            Cadence::Slow => self.slow,
        };
        clamp_interval(interval)
    }
}

/// Spawn the poll driver.
///
/// Fetch failures are logged and the schedule continues. The task ends when
/// the candidate queue or the snapshot channel closes, or when aborted.
pub fn spawn_poll_driver(
    api: LinkApiClient,
    candidates: CandidateSender,
    mut snapshots: watch::Receiver<StatusSnapshot>,
    schedule: PollSchedule,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cadence = snapshots.borrow_and_update().phase.cadence();
        tracing::info!(
            url = %api.endpoints().status,
            "Poll driver started (fast: {:?}, slow: {:?})",
            schedule.fast,
            schedule.slow
        );

        let mut next_poll = Instant::now();

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_poll) => {
                    if !poll_once(&api, &candidates).await {
                        tracing::debug!("Candidate queue closed, stopping poll driver");
                        break;
                    }
                    next_poll = Instant::now() + schedule.interval(cadence);
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Snapshot channel closed, stopping poll driver");
                        break;
                    }
                    let latest = snapshots.borrow_and_update().phase.cadence();
                    if latest != cadence {
                        cadence = latest;
                        next_poll = Instant::now() + schedule.interval(cadence);
                        tracing::debug!(
                            "Poll cadence now {:?}, next poll in {:?}",
                            cadence,
                            schedule.interval(cadence)
                        );
                    }
                }
            }
        }
    })
}

/// Fetch one snapshot. Returns false once nobody consumes candidates.
async fn poll_once(api: &LinkApiClient, candidates: &CandidateSender) -> bool {
    match api.fetch_status().await {
        Ok(candidate) => {
            tracing::trace!(state = %candidate.state, "Poll candidate");
            candidates
                .send(SourcedCandidate::poll(candidate))
                .await
                .is_ok()
        }
        Err(e) if e.is_transport() => {
            tracing::debug!("Status poll failed: {}", e);
            true
        }
        Err(e) => {
            tracing::warn!("Discarding malformed status response: {}", e);
            true
        }
    }
}
