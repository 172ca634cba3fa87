//! Byte-stream to SSE event decoding.

use bytes::Bytes;
use futures::Stream;
use futures_util::stream;
use futures_util::StreamExt;

use super::{SseEvent, SseParseError, SseParser};
use crate::traits::HttpError;

/// One item produced while decoding a live SSE body.
///
/// Malformed events do not end the stream; transport errors do (the
/// underlying body yields nothing after an error).
#[derive(Debug, Clone, PartialEq)]
pub enum SseStreamItem {
    Event(SseEvent),
    Malformed(SseParseError),
    Transport(HttpError),
}

/// Longest line the decoder buffers; inline QR data URIs stay well below it.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

struct DecodeState<S> {
    bytes_stream: S,
    parser: SseParser,
    buffer: Vec<u8>,
    max_line: usize,
    /// Dropping the rest of an oversized line
    skipping: bool,
    finished: bool,
}

/// Decode a chunked SSE body into parsed events.
///
/// Lines may be split across chunks; bytes are buffered until a newline
/// arrives so multi-byte characters are never cut in half. A line longer
/// than [`MAX_LINE_BYTES`] is reported as malformed and skipped along with
/// the event it belonged to.
pub fn decode_event_stream<S>(bytes_stream: S) -> impl Stream<Item = SseStreamItem> + Send
where
    S: Stream<Item = Result<Bytes, HttpError>> + Send + Unpin,
{
    decode_event_stream_with_limit(bytes_stream, MAX_LINE_BYTES)
}

fn decode_event_stream_with_limit<S>(
    bytes_stream: S,
    max_line: usize,
) -> impl Stream<Item = SseStreamItem> + Send
where
    S: Stream<Item = Result<Bytes, HttpError>> + Send + Unpin,
{
    let state = DecodeState {
        bytes_stream,
        parser: SseParser::new(),
        buffer: Vec::new(),
        max_line,
        skipping: false,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(newline_pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = state.buffer.drain(..=newline_pos).collect();
                if state.skipping {
                    state.skipping = false;
                    continue;
                }
                let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
                let line = line.trim_end_matches('\r');

                match state.parser.feed_line(line) {
                    Ok(Some(event)) => return Some((SseStreamItem::Event(event), state)),
                    Ok(None) => continue,
                    Err(e) => return Some((SseStreamItem::Malformed(e), state)),
                }
            }

            if state.buffer.len() > state.max_line {
                state.buffer.clear();
                state.parser.reset();
                if !state.skipping {
                    state.skipping = true;
                    let limit = state.max_line;
                    return Some((
                        SseStreamItem::Malformed(SseParseError::LineTooLong { limit }),
                        state,
                    ));
                }
            }

            if state.finished {
                return None;
            }

            match state.bytes_stream.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((SseStreamItem::Transport(e), state));
                }
                None => {
                    state.finished = true;
                    // Flush a trailing event that was not terminated by a blank line
                    if !state.buffer.is_empty() {
                        state.buffer.push(b'\n');
                    }
                    state.buffer.extend_from_slice(b"\n");
                }
            }
        }
    })
}
