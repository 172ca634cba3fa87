//! SSE (Server-Sent Events) stream parser
//!
//! Parses the SSE format emitted by the status stream endpoint.
//! SSE format consists of:
//! - `event: <type>` - event type line
//! - `data: <json>` - data payload line
//! - Empty line - signals end of event
//! - Lines starting with `:` - comments (ignored)
//!
//! # Module structure
//! - `events` - Event type definitions (SseEvent enum, SseLine, SseParseError)
//! - `parser` - Parsing logic (SseParser, parse_sse_line, parse_sse_event)
//! - `stream` - Turns a chunked byte stream into a stream of events

mod events;
mod parser;
mod stream;

pub use events::{SseEvent, SseLine, SseParseError};
pub use parser::{parse_sse_event, parse_sse_line, SseParser};
pub use stream::{decode_event_stream, SseStreamItem};
