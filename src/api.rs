//! Backend API client for the messaging-account link.
//!
//! Wraps an [`HttpClient`] with the link endpoints: the status snapshot, the
//! SSE status stream, QR image fetches and the account commands.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

use crate::config::Endpoints;
use crate::models::CandidateSnapshot;
use crate::sse::{decode_event_stream, SseParseError, SseStreamItem};
use crate::traits::{ArtifactContent, Headers, HttpClient, HttpError, Response};

/// Decoded SSE status stream. Dropping it closes the connection.
pub type StatusStream = Pin<Box<dyn Stream<Item = SseStreamItem> + Send>>;

/// Error type for backend API operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request could not be completed
    #[error("HTTP error: {0}")]
    Http(HttpError),
    /// Server answered with a non-success status
    #[error("Server error ({status}): {message}")]
    Status { status: u16, message: String },
    /// Response body was not the expected JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// SSE body was malformed
    #[error("SSE parse error: {0}")]
    Stream(#[from] SseParseError),
}

impl ApiError {
    /// Transport failures are retried silently; everything else is
    /// malformed data.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Http(_) | ApiError::Status { .. })
    }

    fn from_response(response: &Response) -> Self {
        ApiError::Status {
            status: response.status,
            message: response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string()),
        }
    }
}

impl From<HttpError> for ApiError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::ServerError { status, message } => ApiError::Status { status, message },
            other => ApiError::Http(other),
        }
    }
}

/// An account command sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand {
    Connect,
    Disconnect,
    Logout,
}

impl LinkCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkCommand::Connect => "connect",
            LinkCommand::Disconnect => "disconnect",
            LinkCommand::Logout => "logout",
        }
    }
}

impl std::fmt::Display for LinkCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client for the link endpoints.
///
/// Cheap to clone; clones share the underlying HTTP client.
#[derive(Clone)]
pub struct LinkApiClient {
    http: Arc<dyn HttpClient>,
    endpoints: Endpoints,
}

impl std::fmt::Debug for LinkApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkApiClient")
            .field("base_url", &self.endpoints.base_url())
            .finish_non_exhaustive()
    }
}

impl LinkApiClient {
    pub fn new(http: Arc<dyn HttpClient>, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Fetch the current status snapshot.
    pub async fn fetch_status(&self) -> Result<CandidateSnapshot, ApiError> {
        let response = self.http.get(&self.endpoints.status, &json_headers()).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(&response));
        }
        Ok(CandidateSnapshot::from_slice(&response.body)?)
    }

    /// Open the SSE status stream.
    ///
    /// Returns once the server has accepted the request; events are decoded
    /// as the body arrives.
    pub async fn open_status_stream(&self) -> Result<StatusStream, ApiError> {
        let bytes = self
            .http
            .get_stream(&self.endpoints.status_stream, &Headers::new())
            .await?;
        Ok(Box::pin(decode_event_stream(bytes)))
    }

    /// Fetch the QR image a reference payload points at.
    pub async fn fetch_qr_image(&self, reference: &str) -> Result<ArtifactContent, ApiError> {
        let url = self.endpoints.qr_image(reference);
        let response = self.http.get(&url, &Headers::new()).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(&response));
        }
        Ok(ArtifactContent::Fetched {
            content_type: response.content_type().map(str::to_string),
            bytes: response.body,
        })
    }

    /// Send an account command. Its effect shows up in later snapshots.
    pub async fn send_command(&self, command: LinkCommand) -> Result<(), ApiError> {
        let url = match command {
            LinkCommand::Connect => &self.endpoints.connect,
            LinkCommand::Disconnect => &self.endpoints.disconnect,
            LinkCommand::Logout => &self.endpoints.logout,
        };
        let response = self.http.post(url, "{}", &json_headers()).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(&response));
        }
        Ok(())
    }
}

fn json_headers() -> Headers {
    let mut headers = Headers::new();
    headers.insert("accept".to_string(), "application/json".to_string());
    headers
}
