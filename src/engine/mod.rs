//! Link engine: one owned instance that keeps the connection state in sync.
//!
//! [`LinkEngine`] owns every task (push driver, poll driver, reconciler,
//! artifact manager, presenter) and the artifact slot. UI surfaces
//! subscribe to its watch channels; none of them can mutate engine state.
//!
//! # Example
//!
//! ```ignore
//! use linkwatch::{EngineConfig, LinkEngine};
//!
//! let mut engine = LinkEngine::from_config(EngineConfig::from_env());
//! engine.start()?;
//!
//! let mut snapshots = engine.subscribe_snapshots();
//! while snapshots.changed().await.is_ok() {
//!     println!("{}", snapshots.borrow().phase);
//! }
//! ```

pub mod artifact;
pub mod poll;
pub mod presenter;
pub mod push;
pub mod reconciler;

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::adapters::{MemoryArtifactStore, ReqwestHttpClient};
use crate::api::{LinkApiClient, LinkCommand};
use crate::config::EngineConfig;
use crate::models::StatusSnapshot;
use crate::traits::{ArtifactHandle, ArtifactStore, HttpClient};

pub use artifact::{spawn_artifact_manager, ArtifactSlot};
pub use poll::{spawn_poll_driver, PollSchedule};
pub use presenter::{spawn_presenter, status_label, PresentationView};
pub use push::{spawn_push_driver, PushConnectionState};
pub use reconciler::{
    spawn_reconciler, Outcome, Reconciler, ReconcilerStats, Rejection, SourcedCandidate,
};

/// Errors from engine lifecycle calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("engine has been shut down")]
    ShutDown,
    #[error("engine is not running")]
    NotRunning,
    #[error("no Tokio runtime available to run the engine")]
    NoRuntime,
}

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Running,
    Stopped,
}

struct EngineTasks {
    reconciler: JoinHandle<()>,
    presenter: JoinHandle<()>,
    artifacts: JoinHandle<()>,
    push: JoinHandle<()>,
    poll: JoinHandle<()>,
}

/// The connection-state synchronization engine.
pub struct LinkEngine {
    config: EngineConfig,
    api: LinkApiClient,
    snapshot_tx: Arc<watch::Sender<StatusSnapshot>>,
    stats_tx: Arc<watch::Sender<ReconcilerStats>>,
    artifact_tx: Arc<watch::Sender<Option<ArtifactHandle>>>,
    view_tx: Arc<watch::Sender<PresentationView>>,
    push_state_tx: Arc<watch::Sender<PushConnectionState>>,
    slot: ArtifactSlot,
    lifecycle: Lifecycle,
    tasks: Option<EngineTasks>,
    commands: Mutex<Vec<JoinHandle<()>>>,
    stopping: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for LinkEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkEngine")
            .field("base_url", &self.config.base_url)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl LinkEngine {
    /// Create an engine over the given HTTP client and artifact store.
    ///
    /// Nothing runs until [`LinkEngine::start`].
    pub fn new(
        config: EngineConfig,
        http: Arc<dyn HttpClient>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let api = LinkApiClient::new(http, config.endpoints());
        let (snapshot_tx, _) = watch::channel(StatusSnapshot::default());
        let (stats_tx, _) = watch::channel(ReconcilerStats::default());
        let (artifact_tx, _) = watch::channel(None);
        let (view_tx, _) = watch::channel(PresentationView {
            status_label: status_label(&StatusSnapshot::default()),
            ..PresentationView::default()
        });
        let (push_state_tx, _) = watch::channel(PushConnectionState::Stopped);
        let artifact_tx = Arc::new(artifact_tx);
        let slot = ArtifactSlot::new(store, artifact_tx.clone());

        Self {
            config,
            api,
            snapshot_tx: Arc::new(snapshot_tx),
            stats_tx: Arc::new(stats_tx),
            artifact_tx,
            view_tx: Arc::new(view_tx),
            push_state_tx: Arc::new(push_state_tx),
            slot,
            lifecycle: Lifecycle::Created,
            tasks: None,
            commands: Mutex::new(Vec::new()),
            stopping: Vec::new(),
        }
    }

    /// Engine backed by reqwest and an in-memory artifact store.
    pub fn from_config(config: EngineConfig) -> Self {
        Self::new(
            config,
            Arc::new(ReqwestHttpClient::new()),
            Arc::new(MemoryArtifactStore::new()),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    /// Spawn every engine task on the current Tokio runtime.
    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.lifecycle {
            Lifecycle::Running => return Err(EngineError::AlreadyRunning),
            Lifecycle::Stopped => return Err(EngineError::ShutDown),
            Lifecycle::Created => {}
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(EngineError::NoRuntime);
        }

        let config = &self.config;
        let (candidate_tx, candidate_rx) =
            mpsc::channel::<SourcedCandidate>(config.candidate_queue_capacity.max(1));

        // Consumers first so the first candidates find their subscribers
        let reconciler = spawn_reconciler(
            candidate_rx,
            self.snapshot_tx.clone(),
            self.stats_tx.clone(),
        );
        let presenter = spawn_presenter(
            self.snapshot_tx.subscribe(),
            self.view_tx.clone(),
            config.hints.clone(),
            config.hint_interval,
            config.elapsed_tick,
        );
        let artifacts = spawn_artifact_manager(
            self.api.clone(),
            self.slot.clone(),
            self.snapshot_tx.subscribe(),
            config.qr_refresh_interval,
            config.qr_retry_delay,
        );

        self.push_state_tx.send_replace(PushConnectionState::Connecting);
        let push = spawn_push_driver(
            self.api.clone(),
            candidate_tx.clone(),
            self.push_state_tx.clone(),
            config.push_retry_delay,
        );
        let poll = spawn_poll_driver(
            self.api.clone(),
            candidate_tx,
            self.snapshot_tx.subscribe(),
            PollSchedule::new(config.poll_fast_interval, config.poll_slow_interval),
        );

        self.tasks = Some(EngineTasks {
            reconciler,
            presenter,
            artifacts,
            push,
            poll,
        });
        self.lifecycle = Lifecycle::Running;
        tracing::info!(base_url = %config.base_url, "Link engine started");
        Ok(())
    }

    /// Stop every task and release the outstanding artifact.
    ///
    /// Order: poll, push, artifact, presenter, reconciler. Safe to call more
    /// than once; called on drop.
    pub fn shutdown(&mut self) {
        if self.lifecycle == Lifecycle::Stopped {
            return;
        }
        self.lifecycle = Lifecycle::Stopped;

        let commands: Vec<_> = self
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for command in &commands {
            command.abort();
        }
        self.stopping.extend(commands);

        if let Some(tasks) = self.tasks.take() {
            tasks.poll.abort();
            tasks.push.abort();
            self.push_state_tx.send_replace(PushConnectionState::Stopped);

            tasks.artifacts.abort();
            self.slot.close();

            tasks.presenter.abort();
            tasks.reconciler.abort();

            self.stopping.extend([
                tasks.poll,
                tasks.push,
                tasks.artifacts,
                tasks.presenter,
                tasks.reconciler,
            ]);
            tracing::info!("Link engine stopped");
        } else {
            self.slot.close();
        }
    }

    /// Wait until every aborted task has finished unwinding.
    pub async fn wait_stopped(&mut self) {
        for handle in self.stopping.drain(..) {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::warn!("Engine task failed during shutdown: {}", e);
                }
            }
        }
    }

    /// Whether every spawned task has finished.
    pub fn tasks_finished(&self) -> bool {
        self.tasks.is_none() && self.stopping.iter().all(JoinHandle::is_finished)
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_artifacts(&self) -> watch::Receiver<Option<ArtifactHandle>> {
        self.artifact_tx.subscribe()
    }

    pub fn subscribe_presentation(&self) -> watch::Receiver<PresentationView> {
        self.view_tx.subscribe()
    }

    pub fn subscribe_push_state(&self) -> watch::Receiver<PushConnectionState> {
        self.push_state_tx.subscribe()
    }

    pub fn current_snapshot(&self) -> StatusSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn current_artifact(&self) -> Option<ArtifactHandle> {
        self.slot.current()
    }

    pub fn reconciler_stats(&self) -> ReconcilerStats {
        *self.stats_tx.borrow()
    }

    /// Ask the backend to start linking. The effect shows up in snapshots.
    pub fn request_connect(&self) -> Result<(), EngineError> {
        self.send_command(LinkCommand::Connect)
    }

    pub fn request_disconnect(&self) -> Result<(), EngineError> {
        self.send_command(LinkCommand::Disconnect)
    }

    pub fn request_logout(&self) -> Result<(), EngineError> {
        self.send_command(LinkCommand::Logout)
    }

    fn send_command(&self, command: LinkCommand) -> Result<(), EngineError> {
        if self.lifecycle != Lifecycle::Running {
            return Err(EngineError::NotRunning);
        }

        let api = self.api.clone();
        let handle = tokio::spawn(async move {
            match api.send_command(command).await {
                Ok(()) => tracing::info!(command = %command, "Link command accepted"),
                Err(e) => tracing::warn!(command = %command, "Link command failed: {}", e),
            }
        });

        let mut commands = self.commands.lock().unwrap_or_else(PoisonError::into_inner);
        commands.retain(|h| !h.is_finished());
        commands.push(handle);
        Ok(())
    }
}

impl Drop for LinkEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockHttpClient, MockResponse};
    use std::time::Duration;

    const STATUS_URL: &str = "http://backend/api/whatsapp/status";
    const STREAM_URL: &str = "http://backend/api/whatsapp/status/stream";

    fn engine() -> (MockHttpClient, MemoryArtifactStore, LinkEngine) {
        let mock = MockHttpClient::new();
        mock.set_response(STATUS_URL, MockResponse::json(r#"{"state":"disconnected"}"#));
        mock.set_response(STREAM_URL, MockResponse::LiveStream);
        let store = MemoryArtifactStore::new();
        let engine = LinkEngine::new(
            EngineConfig::default().with_base_url("http://backend"),
            Arc::new(mock.clone()),
            Arc::new(store.clone()),
        );
        (mock, store, engine)
    }

    #[test]
    fn test_start_requires_runtime() {
        let (_mock, _store, mut engine) = engine();
        assert_eq!(engine.start(), Err(EngineError::NoRuntime));
        assert_eq!(engine.lifecycle(), Lifecycle::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_transitions() {
        let (_mock, _store, mut engine) = engine();
        assert_eq!(engine.request_connect(), Err(EngineError::NotRunning));

        engine.start().unwrap();
        assert!(engine.is_running());
        assert_eq!(engine.start(), Err(EngineError::AlreadyRunning));

        engine.shutdown();
        engine.shutdown();
        assert_eq!(engine.lifecycle(), Lifecycle::Stopped);
        assert_eq!(engine.start(), Err(EngineError::ShutDown));

        engine.wait_stopped().await;
        assert!(engine.tasks_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_connect_posts_command() {
        let (mock, _store, mut engine) = engine();
        mock.set_response(
            "http://backend/api/whatsapp/connect",
            MockResponse::json(r#"{"ok":true}"#),
        );
        engine.start().unwrap();

        engine.request_connect().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let posts = mock.requests_to("http://backend/api/whatsapp/connect");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].method, "POST");

        engine.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_stopped_push_state() {
        let (_mock, _store, mut engine) = engine();
        let push_state = engine.subscribe_push_state();
        engine.start().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*push_state.borrow(), PushConnectionState::Connected);

        engine.shutdown();
        assert_eq!(*push_state.borrow(), PushConnectionState::Stopped);
    }
}
