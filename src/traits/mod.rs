//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`HttpClient`] - HTTP client operations (GET, POST, streaming GET)
//! - [`ArtifactStore`] - Issuing and releasing locally addressable QR artifacts

pub mod artifact_store;
pub mod http;

pub use artifact_store::{ArtifactContent, ArtifactError, ArtifactHandle, ArtifactStore};
pub use http::{ByteStream, Headers, HttpClient, HttpError, Response};
