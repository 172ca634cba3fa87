//! SSE event types and definitions
//!
//! Contains the SseEvent enum with the events the status stream can carry.

use crate::models::CandidateSnapshot;

/// Represents a parsed SSE line
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// Event type declaration (e.g., "event: status")
    Event(String),
    /// Data payload (e.g., "data: {\"state\": \"qr_ready\"}")
    Data(String),
    /// Empty line - signals end of event
    Empty,
    /// Comment line (starts with ':')
    Comment(String),
}

/// Typed SSE events from the status stream
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// Snapshot-shaped status update
    Status(CandidateSnapshot),
    /// Heartbeat/keepalive
    Ping,
    /// Event type this client does not consume
    Ignored { event_type: String },
}

impl SseEvent {
    /// Returns the event type name as a string for debugging purposes.
    pub fn event_type_name(&self) -> &str {
        match self {
            SseEvent::Status(_) => "status",
            SseEvent::Ping => "ping",
            SseEvent::Ignored { event_type } => event_type,
        }
    }
}

/// Errors that can occur during SSE parsing
#[derive(Debug, Clone, PartialEq)]
pub enum SseParseError {
    /// Invalid JSON in data payload
    InvalidJson {
        event_type: String,
        source: String,
    },
    /// Missing data for event
    MissingData {
        event_type: String,
    },
    /// A line grew past the decoder's limit without a newline
    LineTooLong {
        limit: usize,
    },
}

impl std::fmt::Display for SseParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SseParseError::InvalidJson { event_type, source } => {
                write!(f, "Invalid JSON for event '{}': {}", event_type, source)
            }
            SseParseError::MissingData { event_type } => {
                write!(f, "Missing data for event type: {}", event_type)
            }
            SseParseError::LineTooLong { limit } => {
                write!(f, "SSE line exceeds {} bytes", limit)
            }
        }
    }
}

impl std::error::Error for SseParseError {}
