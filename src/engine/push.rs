//! Push driver: follows the SSE status stream.
//!
//! One connection at a time. When the stream fails or the server closes it,
//! the stream is dropped and a new attempt starts after a fixed delay,
//! indefinitely.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::reconciler::{CandidateSender, SourcedCandidate};
use crate::api::{LinkApiClient, StatusStream};
use crate::config::clamp_interval;
use crate::sse::{SseEvent, SseStreamItem};
use crate::traits::HttpError;

/// Transport state of the push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushConnectionState {
    /// First connection attempt in progress
    #[default]
    Connecting,
    /// Stream is open and being read
    Connected,
    /// Waiting to retry after a failure or close
    Reconnecting { attempt: u32 },
    /// Driver is not running
    Stopped,
}

impl std::fmt::Display for PushConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushConnectionState::Connecting => write!(f, "connecting"),
            PushConnectionState::Connected => write!(f, "connected"),
            PushConnectionState::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {})", attempt)
            }
            PushConnectionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// How a stream stopped producing events.
#[derive(Debug)]
enum StreamEnd {
    /// Server closed the body
    Closed,
    /// Transport failure while reading
    Failed(HttpError),
    /// Nobody is consuming candidates any more
    ReceiverGone,
}

/// Spawn the push driver.
///
/// Aborting the returned handle drops the open stream and any pending
/// retry sleep.
pub fn spawn_push_driver(
    api: LinkApiClient,
    candidates: CandidateSender,
    state_tx: Arc<watch::Sender<PushConnectionState>>,
    retry_delay: Duration,
) -> JoinHandle<()> {
    let retry_delay = clamp_interval(retry_delay);

    tokio::spawn(async move {
        tracing::info!(
            url = %api.endpoints().status_stream,
            "Push driver started (retry delay: {:?})",
            retry_delay
        );

        let mut attempt: u32 = 0;

        loop {
            match api.open_status_stream().await {
                Ok(stream) => {
                    if attempt > 0 {
                        tracing::info!("Push stream reconnected after {} attempt(s)", attempt);
                    } else {
                        tracing::debug!("Push stream connected");
                    }
                    attempt = 0;
                    state_tx.send_replace(PushConnectionState::Connected);

                    match forward_events(stream, &candidates).await {
                        StreamEnd::ReceiverGone => {
                            tracing::debug!("Candidate queue closed, stopping push driver");
                            break;
                        }
                        StreamEnd::Closed => tracing::info!("Push stream closed by server"),
                        StreamEnd::Failed(e) => tracing::warn!("Push stream failed: {}", e),
                    }
                }
                Err(e) => tracing::warn!("Failed to open push stream: {}", e),
            }

            attempt = attempt.saturating_add(1);
            state_tx.send_replace(PushConnectionState::Reconnecting { attempt });
            tracing::debug!("Retrying push stream in {:?}", retry_delay);
            tokio::time::sleep(retry_delay).await;
        }

        state_tx.send_replace(PushConnectionState::Stopped);
    })
}

/// Read one stream to its end. The stream is dropped before returning.
async fn forward_events(mut stream: StatusStream, candidates: &CandidateSender) -> StreamEnd {
    while let Some(item) = stream.next().await {
        match item {
            SseStreamItem::Event(SseEvent::Status(candidate)) => {
                tracing::trace!(state = %candidate.state, "Push candidate");
                if candidates
                    .send(SourcedCandidate::push(candidate))
                    .await
                    .is_err()
                {
                    return StreamEnd::ReceiverGone;
                }
            }
            SseStreamItem::Event(SseEvent::Ping) => tracing::trace!("Push keepalive"),
            SseStreamItem::Event(SseEvent::Ignored { event_type }) => {
                tracing::debug!(event_type = %event_type, "Ignoring push event");
            }
            SseStreamItem::Malformed(e) => {
                tracing::warn!("Dropping malformed push event: {}", e);
            }
            SseStreamItem::Transport(e) => return StreamEnd::Failed(e),
        }
    }
    StreamEnd::Closed
}
