use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State of the remote account link, as reported by the backend.
///
/// The set is closed: any other value on the wire is a malformed candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// No session; the only state where counters legitimately reset
    #[default]
    Disconnected,
    /// Backend is starting a new link attempt
    Initializing,
    /// A scannable code is available and waiting to be scanned
    QrReady,
    /// Resuming a previously linked session
    Connecting,
    /// Code was scanned, credentials are being exchanged
    Authenticating,
    /// Linked, initial chat history is being loaded
    LoadingChats,
    /// Fully linked and idle
    Connected,
    /// Protocol-level failure reported by the backend
    Error,
}

/// Poll cadence class for a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Transitional phases need fresh data
    Fast,
    /// Stable phases
    Slow,
}

impl ConnectionPhase {
    pub const ALL: [ConnectionPhase; 8] = [
        ConnectionPhase::Disconnected,
        ConnectionPhase::Initializing,
        ConnectionPhase::QrReady,
        ConnectionPhase::Connecting,
        ConnectionPhase::Authenticating,
        ConnectionPhase::LoadingChats,
        ConnectionPhase::Connected,
        ConnectionPhase::Error,
    ];

    /// Wire name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Initializing => "initializing",
            ConnectionPhase::QrReady => "qr_ready",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Authenticating => "authenticating",
            ConnectionPhase::LoadingChats => "loading_chats",
            ConnectionPhase::Connected => "connected",
            ConnectionPhase::Error => "error",
        }
    }

    /// Whether the phase is expected to resolve on its own.
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ConnectionPhase::Initializing
                | ConnectionPhase::QrReady
                | ConnectionPhase::Connecting
                | ConnectionPhase::Authenticating
                | ConnectionPhase::LoadingChats
        )
    }

    pub fn cadence(&self) -> Cadence {
        if self.is_transitional() {
            Cadence::Fast
        } else {
            Cadence::Slow
        }
    }

    /// Phases that carry a running session clock.
    pub fn tracks_elapsed(&self) -> bool {
        !matches!(
            self,
            ConnectionPhase::Connected | ConnectionPhase::Disconnected | ConnectionPhase::Error
        )
    }

    /// Phases during which advisory hints rotate.
    pub fn shows_hints(&self) -> bool {
        matches!(
            self,
            ConnectionPhase::Initializing | ConnectionPhase::QrReady | ConnectionPhase::LoadingChats
        )
    }

    /// Whether `next` is a transition the backend protocol is known to make.
    ///
    /// Used for diagnostics only; unexpected transitions are still applied.
    pub fn can_transition_to(&self, next: ConnectionPhase) -> bool {
        use ConnectionPhase::*;

        if *self == next {
            return true;
        }
        match (self, next) {
            (Error, Disconnected) | (Error, Initializing) => true,
            (Error, _) => false,
            (Disconnected, Error) => false,
            (_, Error) => true,
            (Disconnected, Initializing) | (Disconnected, Connecting) => true,
            (Initializing, QrReady) | (Initializing, Connecting) => true,
            (QrReady, Authenticating) => true,
            (Connecting, Authenticating)
            | (Connecting, LoadingChats)
            | (Connecting, Connected) => true,
            (Authenticating, LoadingChats) | (Authenticating, Connected) => true,
            (LoadingChats, Connected) => true,
            (_, Disconnected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a state string is not part of the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown connection state: {0:?}")]
pub struct UnknownPhase(pub String);

impl FromStr for ConnectionPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ConnectionPhase::ALL
            .iter()
            .copied()
            .find(|phase| phase.as_str() == normalized)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}
