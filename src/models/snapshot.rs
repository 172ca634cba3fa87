use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::phase::{ConnectionPhase, UnknownPhase};

/// Linked account identity, valid only while connected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Account {
    #[serde(default, alias = "name", alias = "pushname")]
    pub display_name: String,
    #[serde(default, alias = "phone", alias = "phone_number")]
    pub phone_identifier: String,
}

/// Which transport produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Push,
    Poll,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::Push => "push",
            CandidateSource::Poll => "poll",
        }
    }
}

/// Unvalidated snapshot proposal as it arrives on the wire.
///
/// Both the status endpoint and the push stream emit this shape. `state` is
/// kept as a raw string so an unknown value reaches the reconciler and is
/// rejected there rather than failing deserialization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    #[serde(alias = "status")]
    pub state: String,
    #[serde(default, alias = "qr", alias = "qr_code")]
    pub code_payload: Option<String>,
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default, alias = "messages_count")]
    pub message_count: Option<u64>,
    #[serde(default, alias = "error")]
    pub error_detail: Option<String>,
    #[serde(default, alias = "progress")]
    pub progress_percent: Option<u32>,
    #[serde(default)]
    pub progress_text: Option<String>,
    #[serde(
        default,
        alias = "started_at",
        deserialize_with = "deserialize_timestamp"
    )]
    pub session_started_at: Option<DateTime<Utc>>,
}

impl CandidateSnapshot {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            ..Self::default()
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.message_count = Some(count);
        self
    }

    pub fn with_code(mut self, payload: impl Into<String>) -> Self {
        self.code_payload = Some(payload.into());
        self
    }

    pub fn with_account(mut self, display_name: &str, phone_identifier: &str) -> Self {
        self.account = Some(Account {
            display_name: display_name.to_string(),
            phone_identifier: phone_identifier.to_string(),
        });
        self
    }

    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    pub fn with_progress(mut self, percent: u32, text: Option<&str>) -> Self {
        self.progress_percent = Some(percent);
        self.progress_text = text.map(str::to_string);
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.session_started_at = Some(started_at);
        self
    }

    /// Decode a status payload, bare or wrapped as
    /// `{"type": "status", "data": {...}}`.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_str(data)?)
    }

    /// Same as [`CandidateSnapshot::from_json`] over raw bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_slice(data)?)
    }

    fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let has_state = value.get("state").is_some() || value.get("status").is_some();
        let body = match value.get("data") {
            Some(inner) if !has_state && inner.is_object() => inner.clone(),
            _ => value,
        };
        serde_json::from_value(body)
    }

    /// Parse the raw state string against the closed phase set.
    pub fn phase(&self) -> Result<ConnectionPhase, UnknownPhase> {
        self.state.parse()
    }
}

/// Canonical connection state at one instant.
///
/// Built only by the reconciler and never mutated after publication; a newer
/// snapshot replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StatusSnapshot {
    pub phase: ConnectionPhase,
    pub code_payload: Option<String>,
    pub account: Option<Account>,
    pub message_count: u64,
    pub error_detail: Option<String>,
    pub progress_percent: u8,
    pub progress_text: Option<String>,
    pub session_started_at: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    /// Build a snapshot from a candidate whose phase is already known,
    /// dropping every field that is not meaningful for that phase.
    pub fn scoped(phase: ConnectionPhase, candidate: CandidateSnapshot) -> Self {
        let mut snapshot = Self {
            phase,
            code_payload: candidate.code_payload.filter(|p| !p.trim().is_empty()),
            account: candidate.account,
            message_count: candidate.message_count.unwrap_or(0),
            error_detail: candidate.error_detail,
            progress_percent: candidate.progress_percent.unwrap_or(0).min(100) as u8,
            progress_text: candidate.progress_text,
            session_started_at: candidate.session_started_at,
        };
        snapshot.clear_out_of_scope();
        snapshot
    }

    fn clear_out_of_scope(&mut self) {
        if self.phase != ConnectionPhase::QrReady {
            self.code_payload = None;
        }
        if self.phase != ConnectionPhase::Connected {
            self.account = None;
        }
        if self.phase != ConnectionPhase::Error {
            self.error_detail = None;
        }
        if self.phase != ConnectionPhase::LoadingChats {
            self.progress_percent = 0;
            self.progress_text = None;
        }
        if matches!(
            self.phase,
            ConnectionPhase::Disconnected | ConnectionPhase::Error
        ) {
            self.session_started_at = None;
        }
        if self.phase == ConnectionPhase::Disconnected {
            self.message_count = 0;
        }
    }

    /// Code payload carried by this snapshot, if the phase allows one.
    pub fn qr_payload(&self) -> Option<&str> {
        match self.phase {
            ConnectionPhase::QrReady => self.code_payload.as_deref(),
            _ => None,
        }
    }
}

/// Accepts an RFC 3339 string, Unix milliseconds, or null.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Millis(i64),
    }

    match Option::<RawTimestamp>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
        Some(RawTimestamp::Millis(ms)) => Ok(Utc.timestamp_millis_opt(ms).single()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_from_full_json() {
        let json = r#"{
            "state": "loading_chats",
            "message_count": 12,
            "progress_percent": 40,
            "progress_text": "Syncing chats",
            "session_started_at": "2026-01-01T10:00:00Z"
        }"#;
        let candidate = CandidateSnapshot::from_json(json).unwrap();
        assert_eq!(candidate.state, "loading_chats");
        assert_eq!(candidate.message_count, Some(12));
        assert_eq!(candidate.progress_percent, Some(40));
        assert_eq!(
            candidate.session_started_at,
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_candidate_accepts_aliases() {
        let json = r#"{
            "status": "qr_ready",
            "qr": "data:image/png;base64,AAAA",
            "messages_count": 3,
            "started_at": 1767261600000
        }"#;
        let candidate = CandidateSnapshot::from_json(json).unwrap();
        assert_eq!(candidate.state, "qr_ready");
        assert_eq!(candidate.code_payload.as_deref(), Some("data:image/png;base64,AAAA"));
        assert_eq!(candidate.message_count, Some(3));
        assert_eq!(
            candidate.session_started_at,
            Some(Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_candidate_unwraps_envelope() {
        let wrapped = r#"{"type":"status","data":{"state":"connected","message_count":7}}"#;
        let candidate = CandidateSnapshot::from_slice(wrapped.as_bytes()).unwrap();
        assert_eq!(candidate, CandidateSnapshot::new("connected").with_count(7));

        // Bare snapshots decode as before
        let bare = CandidateSnapshot::from_json(r#"{"state":"disconnected"}"#).unwrap();
        assert_eq!(bare.state, "disconnected");
        assert!(CandidateSnapshot::from_json(r#"{"type":"status","data":"x"}"#).is_err());
    }

    #[test]
    fn test_candidate_account_aliases() {
        let json = r#"{"state":"connected","account":{"name":"Ana","phone":"+351900000000"}}"#;
        let candidate = CandidateSnapshot::from_json(json).unwrap();
        assert_eq!(
            candidate.account,
            Some(Account {
                display_name: "Ana".to_string(),
                phone_identifier: "+351900000000".to_string(),
            })
        );
    }

    #[test]
    fn test_candidate_requires_state() {
        assert!(CandidateSnapshot::from_json(r#"{"message_count":1}"#).is_err());
    }

    #[test]
    fn test_candidate_keeps_unknown_state_for_reconciler() {
        let candidate = CandidateSnapshot::from_json(r#"{"state":"pairing"}"#).unwrap();
        assert!(candidate.phase().is_err());
    }

    #[test]
    fn test_scoped_connected_drops_code_payload() {
        let candidate = CandidateSnapshot::new("connected")
            .with_code("stale")
            .with_error("old failure")
            .with_progress(80, Some("almost"))
            .with_account("Ana", "+1555")
            .with_count(7);
        let snapshot = StatusSnapshot::scoped(ConnectionPhase::Connected, candidate);

        assert_eq!(snapshot.code_payload, None);
        assert_eq!(snapshot.error_detail, None);
        assert_eq!(snapshot.progress_percent, 0);
        assert_eq!(snapshot.progress_text, None);
        assert_eq!(snapshot.message_count, 7);
        assert!(snapshot.account.is_some());
    }

    #[test]
    fn test_scoped_qr_ready_drops_account() {
        let candidate = CandidateSnapshot::new("qr_ready")
            .with_code("ref-1")
            .with_account("Ana", "+1555");
        let snapshot = StatusSnapshot::scoped(ConnectionPhase::QrReady, candidate);
        assert_eq!(snapshot.qr_payload(), Some("ref-1"));
        assert_eq!(snapshot.account, None);
    }

    #[test]
    fn test_scoped_blank_payload_is_absent() {
        let candidate = CandidateSnapshot::new("qr_ready").with_code("   ");
        let snapshot = StatusSnapshot::scoped(ConnectionPhase::QrReady, candidate);
        assert_eq!(snapshot.code_payload, None);
    }

    #[test]
    fn test_scoped_error_keeps_detail_only() {
        let candidate = CandidateSnapshot::new("error")
            .with_error("session expired")
            .with_started_at(Utc::now());
        let snapshot = StatusSnapshot::scoped(ConnectionPhase::Error, candidate);
        assert_eq!(snapshot.error_detail.as_deref(), Some("session expired"));
        assert_eq!(snapshot.session_started_at, None);
    }

    #[test]
    fn test_scoped_progress_is_clamped() {
        let candidate = CandidateSnapshot::new("loading_chats").with_progress(250, None);
        let snapshot = StatusSnapshot::scoped(ConnectionPhase::LoadingChats, candidate);
        assert_eq!(snapshot.progress_percent, 100);
    }

    #[test]
    fn test_scoped_disconnected_resets_count() {
        let candidate = CandidateSnapshot::new("disconnected").with_count(99);
        let snapshot = StatusSnapshot::scoped(ConnectionPhase::Disconnected, candidate);
        assert_eq!(snapshot.message_count, 0);
    }
}
