//! Concrete implementations of trait abstractions.
//!
//! # Adapters
//!
//! - [`ReqwestHttpClient`] - HTTP client using reqwest
//! - [`MemoryArtifactStore`] - In-process QR artifact registry
//!
//! # Mock Implementations
//!
//! The [`mock`] submodule provides a scripted [`mock::MockHttpClient`] whose
//! SSE bodies can be fed and closed by tests.

pub mod memory_artifacts;
pub mod mock;
pub mod reqwest_http;

pub use memory_artifacts::{ArtifactEvent, MemoryArtifactStore};
pub use mock::{MockHttpClient, MockResponse, MockStreamHandle};
pub use reqwest_http::ReqwestHttpClient;
