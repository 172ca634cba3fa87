//! QR code artifact manager.
//!
//! Turns the code payload of `qr_ready` snapshots into a live artifact
//! handle. At most one handle is live: the previous one is released before
//! its successor is issued, and leaving `qr_ready` releases it at once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::api::{ApiError, LinkApiClient};
use crate::config::clamp_interval;
use crate::models::StatusSnapshot;
use crate::traits::{ArtifactContent, ArtifactError, ArtifactHandle, ArtifactStore};

#[derive(Debug, Default)]
struct SlotState {
    current: Option<ArtifactHandle>,
    closed: bool,
}

/// Owner of the single live artifact.
///
/// Shared between the manager task and the engine so shutdown can release
/// the outstanding handle without waiting on the task. Once closed, the
/// slot refuses to issue.
#[derive(Clone)]
pub struct ArtifactSlot {
    state: Arc<Mutex<SlotState>>,
    store: Arc<dyn ArtifactStore>,
    publisher: Arc<watch::Sender<Option<ArtifactHandle>>>,
}

impl std::fmt::Debug for ArtifactSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactSlot")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ArtifactSlot {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        publisher: Arc<watch::Sender<Option<ArtifactHandle>>>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState::default())),
            store,
            publisher,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the current handle, then issue one for `content`.
    ///
    /// Empty content is refused before anything is released.
    pub fn replace(
        &self,
        payload_key: &str,
        content: ArtifactContent,
    ) -> Result<ArtifactHandle, ArtifactError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ArtifactError::Closed);
        }
        if content.is_empty() {
            return Err(ArtifactError::EmptyContent {
                payload_key: payload_key.to_string(),
            });
        }

        if let Some(previous) = state.current.take() {
            self.store.release(&previous);
        }

        match self.store.issue(payload_key, content) {
            Ok(handle) => {
                state.current = Some(handle.clone());
                self.publisher.send_replace(Some(handle.clone()));
                Ok(handle)
            }
            Err(e) => {
                self.publisher.send_replace(None);
                Err(e)
            }
        }
    }

    /// Release the current handle, if any. Returns whether one was live.
    pub fn clear(&self) -> bool {
        let mut state = self.lock();
        self.release_locked(&mut state)
    }

    /// Release the current handle and refuse further issues.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        if self.release_locked(&mut state) {
            tracing::debug!("Released QR artifact on shutdown");
        }
    }

    fn release_locked(&self, state: &mut SlotState) -> bool {
        match state.current.take() {
            Some(handle) => {
                self.store.release(&handle);
                self.publisher.send_replace(None);
                true
            }
            None => false,
        }
    }

    /// Payload the live handle was produced from.
    pub fn current_key(&self) -> Option<String> {
        self.lock().current.as_ref().map(|h| h.payload_key.clone())
    }

    pub fn current(&self) -> Option<ArtifactHandle> {
        self.lock().current.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Whether the payload embeds the image itself.
pub fn is_inline_payload(payload: &str) -> bool {
    payload.trim_start().starts_with("data:")
}

/// Image fetch for a reference payload, dropped when the payload goes away.
struct PendingFetch {
    payload: String,
    fetch: BoxFuture<'static, Result<ArtifactContent, ApiError>>,
}

struct ArtifactManager {
    api: LinkApiClient,
    slot: ArtifactSlot,
    snapshots: watch::Receiver<StatusSnapshot>,
    refresh_interval: Duration,
    retry_delay: Duration,
    refresh_at: Option<Instant>,
    pending: Option<PendingFetch>,
}

impl ArtifactManager {
    fn on_snapshot(&mut self) {
        let payload = self
            .snapshots
            .borrow_and_update()
            .qr_payload()
            .map(str::to_string);

        // A fetch for any other payload is stale now
        if self.pending.as_ref().map(|p| p.payload.as_str()) != payload.as_deref() {
            self.pending = None;
        }

        match payload {
            None => {
                self.refresh_at = None;
                if self.slot.clear() {
                    tracing::info!("Released QR artifact");
                }
            }
            Some(payload) if self.slot.current_key().as_deref() == Some(payload.as_str()) => {}
            Some(_) if self.pending.is_some() => {}
            Some(payload) => self.produce(&payload),
        }
    }

    fn on_refresh(&mut self) {
        self.refresh_at = None;
        let payload = self.snapshots.borrow().qr_payload().map(str::to_string);
        if let Some(payload) = payload {
            tracing::debug!("Refreshing QR artifact");
            self.produce(&payload);
        }
    }

    fn produce(&mut self, payload: &str) {
        if is_inline_payload(payload) {
            self.refresh_at = None;
            self.pending = None;
            self.issue(payload, ArtifactContent::Inline(payload.trim().to_string()));
            return;
        }

        let api = self.api.clone();
        let reference = payload.to_string();
        self.refresh_at = None;
        self.pending = Some(PendingFetch {
            payload: payload.to_string(),
            fetch: Box::pin(async move { api.fetch_qr_image(&reference).await }),
        });
    }

    fn on_fetched(&mut self, payload: String, result: Result<ArtifactContent, ApiError>) {
        if self.snapshots.borrow().qr_payload() != Some(payload.as_str()) {
            tracing::debug!("Discarding QR image for superseded payload");
            return;
        }

        match result {
            Ok(content) => {
                self.refresh_at = Some(Instant::now() + self.refresh_interval);
                self.issue(&payload, content);
            }
            Err(e) if self.slot.current_key().as_deref() == Some(payload.as_str()) => {
                tracing::warn!("Failed to refresh QR image, keeping current artifact: {}", e);
                self.refresh_at = Some(Instant::now() + self.retry_delay);
            }
            Err(e) => {
                // The previous code has been rotated out by the server
                if self.slot.clear() {
                    tracing::info!("Released superseded QR artifact");
                }
                tracing::warn!("Failed to fetch QR image: {}", e);
                self.refresh_at = Some(Instant::now() + self.retry_delay);
            }
        }
    }

    fn issue(&self, payload: &str, content: ArtifactContent) {
        match self.slot.replace(payload, content) {
            Ok(handle) => tracing::info!(address = %handle.address, "Issued QR artifact"),
            Err(ArtifactError::Closed) => tracing::debug!("Artifact slot closed"),
            Err(e) => tracing::warn!("Could not issue QR artifact: {}", e),
        }
    }
}

/// Spawn the artifact manager.
///
/// Handles the current snapshot immediately, then every change. Referenced
/// images are re-fetched every `refresh_interval` while the payload stays
/// displayed; a failed fetch is retried after `retry_delay`. An in-flight
/// fetch never delays a release.
pub fn spawn_artifact_manager(
    api: LinkApiClient,
    slot: ArtifactSlot,
    snapshots: watch::Receiver<StatusSnapshot>,
    refresh_interval: Duration,
    retry_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut manager = ArtifactManager {
            api,
            slot,
            snapshots,
            refresh_interval: clamp_interval(refresh_interval),
            retry_delay: clamp_interval(retry_delay),
            refresh_at: None,
            pending: None,
        };
        tracing::debug!("Artifact manager started (refresh: {:?})", refresh_interval);

        manager.on_snapshot();

        loop {
            let refresh_at = manager.refresh_at;
            tokio::select! {
                changed = manager.snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    manager.on_snapshot();
                }
                (payload, result) = await_pending(&mut manager.pending) => {
                    manager.pending = None;
                    manager.on_fetched(payload, result);
                }
                _ = sleep_until_opt(refresh_at) => manager.on_refresh(),
            }
        }

        manager.pending = None;
        manager.slot.clear();
        tracing::debug!("Artifact manager stopped");
    })
}

async fn await_pending(
    pending: &mut Option<PendingFetch>,
) -> (String, Result<ArtifactContent, ApiError>) {
    match pending {
        Some(pending) => {
            let result = (&mut pending.fetch).await;
            (pending.payload.clone(), result)
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
