//! Common utilities for linkwatch integration tests.
//!
//! ```ignore
//! mod common;
//! use common::*;
//!
//! let backend = MockBackend::new().with_status(r#"{"state":"connected"}"#).build();
//! let harness = EngineHarness::start(backend);
//! ```

#![allow(dead_code)]

pub mod mocks;

pub use mocks::*;

use std::sync::Arc;
use std::time::Duration;

use linkwatch::{EngineConfig, LinkEngine};

/// Engine config pointing at the mock backend with default timers.
pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_base_url(BASE_URL)
}

/// A running engine wired to a mock backend and an in-memory store.
pub struct EngineHarness {
    pub backend: MockHttpClient,
    pub store: MemoryArtifactStore,
    pub engine: LinkEngine,
}

impl EngineHarness {
    pub fn start(backend: MockHttpClient) -> Self {
        Self::start_with_config(backend, test_config())
    }

    pub fn start_with_config(backend: MockHttpClient, config: EngineConfig) -> Self {
        let store = MemoryArtifactStore::new();
        let mut engine = LinkEngine::new(
            config,
            Arc::new(backend.clone()),
            Arc::new(store.clone()),
        );
        engine.start().expect("engine should start inside a runtime");
        Self {
            backend,
            store,
            engine,
        }
    }

    /// The push stream the engine is currently reading.
    pub fn push_stream(&self) -> MockStreamHandle {
        self.backend
            .latest_stream()
            .expect("push driver should have opened a stream")
    }
}

/// Let spawned tasks run; advances the paused clock by a few milliseconds.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

/// Advance the paused clock.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}
