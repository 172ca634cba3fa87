//! Mock configurations for engine integration tests.
//!
//! Re-exports the mocks from `linkwatch::adapters` and adds a builder for a
//! scripted backend.

pub use linkwatch::adapters::mock::{MockHttpClient, MockResponse, MockStreamHandle};
pub use linkwatch::adapters::{ArtifactEvent, MemoryArtifactStore};
pub use linkwatch::traits::{ArtifactStore, HttpError, Response};

use bytes::Bytes;

pub const BASE_URL: &str = "http://backend";
pub const STATUS_URL: &str = "http://backend/api/whatsapp/status";
pub const STREAM_URL: &str = "http://backend/api/whatsapp/status/stream";
pub const QR_URL_PREFIX: &str = "http://backend/api/whatsapp/qr/";

/// Builder for a scripted backend.
pub struct MockBackend {
    client: MockHttpClient,
}

impl MockBackend {
    /// Backend whose status endpoint answers `disconnected` and whose push
    /// stream stays open until the test closes it.
    pub fn new() -> Self {
        let client = MockHttpClient::new();
        client.set_response(STATUS_URL, MockResponse::json(r#"{"state":"disconnected"}"#));
        client.set_response(STREAM_URL, MockResponse::LiveStream);
        Self { client }
    }

    /// Fixed status endpoint body.
    pub fn with_status(self, json: &str) -> Self {
        self.client.set_response(STATUS_URL, MockResponse::json(json));
        self
    }

    /// Status endpoint failing at transport level.
    pub fn with_status_unreachable(self) -> Self {
        self.client.set_response(
            STATUS_URL,
            MockResponse::Error(HttpError::ConnectionFailed("refused".to_string())),
        );
        self
    }

    /// PNG body for a QR reference.
    pub fn with_qr_image(self, reference: &str, body: &'static [u8]) -> Self {
        self.client.set_response(
            &format!("{}{}", QR_URL_PREFIX, reference),
            MockResponse::bytes(body, "image/png"),
        );
        self
    }

    /// Accept every command with an empty JSON body.
    #[allow(dead_code)]
    pub fn accepting_commands(self) -> Self {
        self.client.set_default_response(MockResponse::Success(Response::new(
            200,
            Bytes::from_static(b"{}"),
        )));
        self
    }

    pub fn build(self) -> MockHttpClient {
        self.client
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}
