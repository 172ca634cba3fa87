//! SSE stream parsing logic
//!
//! Contains the stateful SseParser for accumulating lines and emitting events,
//! as well as the core parsing functions.

use crate::models::CandidateSnapshot;
use crate::sse::events::{SseEvent, SseLine, SseParseError};

/// Parse a single SSE line into its component type
pub fn parse_sse_line(line: &str) -> SseLine {
    if line.is_empty() {
        return SseLine::Empty;
    }

    if let Some(stripped) = line.strip_prefix(':') {
        return SseLine::Comment(stripped.trim().to_string());
    }

    if let Some(rest) = line.strip_prefix("event:") {
        return SseLine::Event(rest.trim().to_string());
    }

    if let Some(rest) = line.strip_prefix("data:") {
        return SseLine::Data(rest.trim().to_string());
    }

    // Unknown line format (id:, retry:, ...) - treat as comment
    SseLine::Comment(line.to_string())
}

/// Parse SSE event type and data into a typed SseEvent
pub fn parse_sse_event(event_type: &str, data: &str) -> Result<SseEvent, SseParseError> {
    match event_type {
        "status" | "state" | "snapshot" | "message" | "status_update" => {
            parse_status_event(event_type, data)
        }
        "ping" | "heartbeat" | "keepalive" => Ok(SseEvent::Ping),
        // Ignore unknown events instead of erroring (more resilient)
        other => Ok(SseEvent::Ignored {
            event_type: other.to_string(),
        }),
    }
}

fn parse_status_event(event_type: &str, data: &str) -> Result<SseEvent, SseParseError> {
    CandidateSnapshot::from_json(data)
        .map(SseEvent::Status)
        .map_err(|e| SseParseError::InvalidJson {
            event_type: event_type.to_string(),
            source: e.to_string(),
        })
}

/// Stateful SSE parser that accumulates lines and emits complete events
#[derive(Debug, Default)]
pub struct SseParser {
    /// Current event type being accumulated
    current_event_type: Option<String>,
    /// Accumulated data lines (SSE allows multiple data: lines)
    data_buffer: Vec<String>,
}

impl SseParser {
    /// Create a new SSE parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a line to the parser, potentially returning a complete event
    ///
    /// Returns:
    /// - `Ok(Some(event))` - A complete event was parsed
    /// - `Ok(None)` - Line was consumed but event is incomplete
    /// - `Err(error)` - Parse error occurred
    pub fn feed_line(&mut self, line: &str) -> Result<Option<SseEvent>, SseParseError> {
        match parse_sse_line(line) {
            SseLine::Event(event_type) => {
                self.current_event_type = Some(event_type);
                Ok(None)
            }
            SseLine::Data(data) => {
                self.data_buffer.push(data);
                Ok(None)
            }
            SseLine::Empty => self.try_emit_event(),
            SseLine::Comment(_) => Ok(None),
        }
    }

    /// Try to emit a complete event from accumulated state
    fn try_emit_event(&mut self) -> Result<Option<SseEvent>, SseParseError> {
        if self.current_event_type.is_none() && self.data_buffer.is_empty() {
            return Ok(None);
        }

        let mut event_type = self.current_event_type.take();
        let data = self.data_buffer.join("\n");
        self.data_buffer.clear();

        // Without an explicit event line, take the type from the JSON "type"
        // field: data: {"type":"status","data":{...}}
        if event_type.is_none() && !data.is_empty() {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&data) {
                if let Some(t) = json.get("type").and_then(|v| v.as_str()) {
                    event_type = Some(t.to_string());
                }
            }
        }

        match event_type {
            Some(et) => {
                if data.is_empty() && matches!(et.as_str(), "ping" | "heartbeat" | "keepalive") {
                    Ok(Some(SseEvent::Ping))
                } else if data.is_empty() {
                    Err(SseParseError::MissingData { event_type: et })
                } else {
                    parse_sse_event(&et, &data).map(Some)
                }
            }
            // Data without event type - the stream's default event is a status update
            None => parse_sse_event("status", &data).map(Some),
        }
    }

    /// Reset the parser state
    pub fn reset(&mut self) {
        self.current_event_type = None;
        self.data_buffer.clear();
    }
}
