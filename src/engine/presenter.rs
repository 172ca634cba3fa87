//! Presentation adapter: UI-facing values derived from the canonical snapshot.
//!
//! Nothing here feeds back into the reconciler or the drivers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::clamp_interval;
use crate::models::{ConnectionPhase, StatusSnapshot};

/// What a connect surface displays besides the snapshot itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresentationView {
    pub phase: ConnectionPhase,
    /// Time since the session started, whole seconds
    pub elapsed: Duration,
    /// Current advisory hint, only in phases that show hints
    pub hint: Option<String>,
    pub status_label: String,
}

/// Elapsed session time at `now`.
///
/// Zero when the phase does not track elapsed time, when no start time is
/// known, or when the start time lies in the future.
pub fn elapsed_for(snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Duration {
    if !snapshot.phase.tracks_elapsed() {
        return Duration::ZERO;
    }
    snapshot
        .session_started_at
        .and_then(|started| (now - started).to_std().ok())
        .map(|elapsed| Duration::from_secs(elapsed.as_secs()))
        .unwrap_or(Duration::ZERO)
}

/// One-line status description for a snapshot.
pub fn status_label(snapshot: &StatusSnapshot) -> String {
    match snapshot.phase {
        ConnectionPhase::Disconnected => "Not connected".to_string(),
        ConnectionPhase::Initializing => "Starting session".to_string(),
        ConnectionPhase::QrReady => "Scan the QR code with your phone".to_string(),
        ConnectionPhase::Connecting => "Connecting".to_string(),
        ConnectionPhase::Authenticating => "Authenticating".to_string(),
        ConnectionPhase::LoadingChats => match &snapshot.progress_text {
            Some(text) if !text.trim().is_empty() => {
                format!("Loading chats ({}%): {}", snapshot.progress_percent, text.trim())
            }
            _ => format!("Loading chats ({}%)", snapshot.progress_percent),
        },
        ConnectionPhase::Connected => {
            let who = match &snapshot.account {
                Some(account) if !account.display_name.is_empty() => {
                    if account.phone_identifier.is_empty() {
                        format!("Connected as {}", account.display_name)
                    } else {
                        format!(
                            "Connected as {} ({})",
                            account.display_name, account.phone_identifier
                        )
                    }
                }
                Some(account) if !account.phone_identifier.is_empty() => {
                    format!("Connected as {}", account.phone_identifier)
                }
                _ => "Connected".to_string(),
            };
            match snapshot.message_count {
                0 => who,
                1 => format!("{}, 1 message", who),
                n => format!("{}, {} messages", who, n),
            }
        }
        ConnectionPhase::Error => match &snapshot.error_detail {
            Some(detail) if !detail.trim().is_empty() => format!("Error: {}", detail.trim()),
            _ => "Error".to_string(),
        },
    }
}

/// Cycles through hints while active; restarts from the first hint each
/// time it becomes active again.
#[derive(Debug, Clone)]
pub struct HintRotation {
    hints: Vec<String>,
    index: usize,
    active: bool,
}

impl HintRotation {
    pub fn new(hints: Vec<String>) -> Self {
        Self {
            hints,
            index: 0,
            active: false,
        }
    }

    /// Switch activity. Returns true when the rotation just became active.
    pub fn set_active(&mut self, active: bool) -> bool {
        let started = active && !self.active;
        if !active {
            self.index = 0;
        }
        self.active = active;
        started
    }

    pub fn advance(&mut self) {
        if self.active && !self.hints.is_empty() {
            self.index = (self.index + 1) % self.hints.len();
        }
    }

    pub fn current(&self) -> Option<&str> {
        if !self.active {
            return None;
        }
        self.hints.get(self.index).map(String::as_str)
    }
}

fn build_view(snapshot: &StatusSnapshot, hints: &HintRotation) -> PresentationView {
    PresentationView {
        phase: snapshot.phase,
        elapsed: elapsed_for(snapshot, Utc::now()),
        hint: hints.current().map(str::to_string),
        status_label: status_label(snapshot),
    }
}

/// Spawn the presentation task.
///
/// Recomputes elapsed time every `elapsed_tick` and rotates hints every
/// `hint_interval`. A view is only re-published when it changed.
pub fn spawn_presenter(
    mut snapshots: watch::Receiver<StatusSnapshot>,
    view_tx: Arc<watch::Sender<PresentationView>>,
    hints: Vec<String>,
    hint_interval: Duration,
    elapsed_tick: Duration,
) -> JoinHandle<()> {
    let hint_interval = clamp_interval(hint_interval);
    let elapsed_tick = clamp_interval(elapsed_tick);

    tokio::spawn(async move {
        let mut snapshot = snapshots.borrow_and_update().clone();
        let mut rotation = HintRotation::new(hints);
        rotation.set_active(snapshot.phase.shows_hints());

        let mut elapsed_timer = tokio::time::interval(elapsed_tick);
        elapsed_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut hint_timer =
            tokio::time::interval_at(Instant::now() + hint_interval, hint_interval);
        hint_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let publish = |snapshot: &StatusSnapshot, rotation: &HintRotation| {
            let view = build_view(snapshot, rotation);
            view_tx.send_if_modified(|current| {
                if *current == view {
                    false
                } else {
                    *current = view;
                    true
                }
            });
        };

        publish(&snapshot, &rotation);

        loop {
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    snapshot = snapshots.borrow_and_update().clone();
                    if rotation.set_active(snapshot.phase.shows_hints()) {
                        hint_timer.reset();
                    }
                    publish(&snapshot, &rotation);
                }
                _ = elapsed_timer.tick() => publish(&snapshot, &rotation),
                _ = hint_timer.tick() => {
                    rotation.advance();
                    publish(&snapshot, &rotation);
                }
            }
        }

        tracing::debug!("Presenter stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Account;
    use chrono::TimeZone;

    fn at(phase: ConnectionPhase) -> StatusSnapshot {
        StatusSnapshot {
            phase,
            ..StatusSnapshot::default()
        }
    }

    fn hints() -> Vec<String> {
        vec!["first".to_string(), "second".to_string(), "third".to_string()]
    }

    #[test]
    fn test_elapsed_while_pairing() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut snapshot = at(ConnectionPhase::QrReady);
        snapshot.session_started_at = Some(now - chrono::Duration::milliseconds(95_500));

        assert_eq!(elapsed_for(&snapshot, now), Duration::from_secs(95));
    }

    #[test]
    fn test_elapsed_zero_when_settled() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        for phase in [
            ConnectionPhase::Connected,
            ConnectionPhase::Disconnected,
            ConnectionPhase::Error,
        ] {
            let mut snapshot = at(phase);
            snapshot.session_started_at = Some(now - chrono::Duration::seconds(30));
            assert_eq!(elapsed_for(&snapshot, now), Duration::ZERO);
        }
    }

    #[test]
    fn test_elapsed_zero_without_or_future_start() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut snapshot = at(ConnectionPhase::LoadingChats);
        assert_eq!(elapsed_for(&snapshot, now), Duration::ZERO);

        snapshot.session_started_at = Some(now + chrono::Duration::seconds(5));
        assert_eq!(elapsed_for(&snapshot, now), Duration::ZERO);
    }

    #[test]
    fn test_status_labels() {
        let mut loading = at(ConnectionPhase::LoadingChats);
        loading.progress_percent = 42;
        assert_eq!(status_label(&loading), "Loading chats (42%)");
        loading.progress_text = Some("Syncing archived chats".to_string());
        assert_eq!(
            status_label(&loading),
            "Loading chats (42%): Syncing archived chats"
        );

        let mut connected = at(ConnectionPhase::Connected);
        assert_eq!(status_label(&connected), "Connected");
        connected.account = Some(Account {
            display_name: "Ana".to_string(),
            phone_identifier: "+1555".to_string(),
        });
        connected.message_count = 40;
        assert_eq!(status_label(&connected), "Connected as Ana (+1555), 40 messages");

        let mut error = at(ConnectionPhase::Error);
        assert_eq!(status_label(&error), "Error");
        error.error_detail = Some("session expired".to_string());
        assert_eq!(status_label(&error), "Error: session expired");

        assert_eq!(status_label(&at(ConnectionPhase::Disconnected)), "Not connected");
    }

    #[test]
    fn test_hint_rotation() {
        let mut rotation = HintRotation::new(hints());
        assert_eq!(rotation.current(), None);

        assert!(rotation.set_active(true));
        assert!(!rotation.set_active(true));
        assert_eq!(rotation.current(), Some("first"));
        rotation.advance();
        rotation.advance();
        assert_eq!(rotation.current(), Some("third"));
        rotation.advance();
        assert_eq!(rotation.current(), Some("first"));
        rotation.advance();

        rotation.set_active(false);
        assert_eq!(rotation.current(), None);
        rotation.set_active(true);
        assert_eq!(rotation.current(), Some("first"));
    }

    #[test]
    fn test_hint_rotation_without_hints() {
        let mut rotation = HintRotation::new(Vec::new());
        rotation.set_active(true);
        rotation.advance();
        assert_eq!(rotation.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hints_rotate_only_in_hint_phases() {
        let (snapshot_tx, snapshot_rx) = watch::channel(at(ConnectionPhase::Initializing));
        let (view_tx, view_rx) = watch::channel(PresentationView::default());
        let handle = spawn_presenter(
            snapshot_rx,
            Arc::new(view_tx),
            hints(),
            Duration::from_secs(4),
            Duration::from_secs(1),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(view_rx.borrow().hint.as_deref(), Some("first"));
        assert_eq!(view_rx.borrow().status_label, "Starting session");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(view_rx.borrow().hint.as_deref(), Some("second"));

        snapshot_tx.send_replace(at(ConnectionPhase::Authenticating));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(view_rx.borrow().hint, None);
        assert_eq!(view_rx.borrow().phase, ConnectionPhase::Authenticating);

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(view_rx.borrow().hint, None);

        snapshot_tx.send_replace(at(ConnectionPhase::LoadingChats));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(view_rx.borrow().hint.as_deref(), Some("first"));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timers_keep_presenter_alive() {
        let (snapshot_tx, snapshot_rx) = watch::channel(at(ConnectionPhase::Initializing));
        let (view_tx, view_rx) = watch::channel(PresentationView::default());
        let handle = spawn_presenter(
            snapshot_rx,
            Arc::new(view_tx),
            hints(),
            Duration::ZERO,
            Duration::ZERO,
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        snapshot_tx.send_replace(at(ConnectionPhase::Authenticating));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(view_rx.borrow().phase, ConnectionPhase::Authenticating);
        assert!(!handle.is_finished());

        handle.abort();
    }
}
