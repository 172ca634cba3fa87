//! linkwatch - connection-state synchronization for a messaging-account link
//!
//! Follows the link state of a backend over a Server-Sent Events stream and
//! periodic polling, reconciles both into one canonical snapshot, manages the
//! QR code artifact shown while pairing, and derives UI-facing values.

pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod logging;
pub mod models;
pub mod sse;
pub mod traits;

pub use config::EngineConfig;
pub use engine::{LinkEngine, PresentationView, PushConnectionState, ReconcilerStats};
pub use models::{CandidateSnapshot, ConnectionPhase, StatusSnapshot};
