//! Mock HTTP client for testing.
//!
//! Provides a configurable mock HTTP client that returns scripted responses,
//! records requests, and serves SSE bodies that tests can feed and close
//! while a driver is reading them.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::traits::{ByteStream, Headers, HttpClient, HttpError, Response};

/// A recorded HTTP request for verification in tests.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method (GET or POST)
    pub method: String,
    /// Request URL
    pub url: String,
    /// Request headers
    pub headers: Headers,
    /// Request body (for POST requests)
    pub body: Option<String>,
}

/// Configuration for a mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a successful response
    Success(Response),
    /// Return an error
    Error(HttpError),
    /// Return a finite stream of bytes; the stream ends after the last chunk
    Stream(Vec<Bytes>),
    /// Return an open stream controlled through [`MockStreamHandle`]
    LiveStream,
    /// Wait, then answer with the inner response
    Delayed(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// 200 response with a JSON body.
    pub fn json(body: &str) -> Self {
        let mut headers = Headers::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        MockResponse::Success(Response::with_headers(
            200,
            headers,
            Bytes::from(body.to_string()),
        ))
    }

    /// 200 response with a binary body and content type.
    pub fn bytes(body: &'static [u8], content_type: &str) -> Self {
        let mut headers = Headers::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        MockResponse::Success(Response::with_headers(
            200,
            headers,
            Bytes::from_static(body),
        ))
    }

    /// This response, answered after `delay`.
    pub fn delayed(self, delay: Duration) -> Self {
        MockResponse::Delayed(delay, Box::new(self))
    }
}

/// Test-side control of one live stream served by the mock.
#[derive(Debug, Clone)]
pub struct MockStreamHandle {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<Result<Bytes, HttpError>>>>>,
}

impl MockStreamHandle {
    /// Push a raw chunk. Returns false if the stream is closed or dropped.
    pub fn send_chunk(&self, chunk: impl Into<Bytes>) -> bool {
        match self.sender.lock().unwrap().as_ref() {
            Some(tx) => tx.send(Ok(chunk.into())).is_ok(),
            None => false,
        }
    }

    /// Push one complete `status` SSE event with the given JSON body.
    pub fn send_status(&self, json: &str) -> bool {
        self.send_chunk(format!("event: status\ndata: {}\n\n", json))
    }

    /// Deliver a transport error; the stream ends afterwards.
    pub fn fail(&self, error: HttpError) {
        if let Some(tx) = self.sender.lock().unwrap().take() {
            let _ = tx.send(Err(error));
        }
    }

    /// End the stream as if the server closed the connection.
    pub fn close(&self) {
        self.sender.lock().unwrap().take();
    }

    /// Whether the test side can still send on this stream.
    pub fn is_open(&self) -> bool {
        self.sender
            .lock()
            .unwrap()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }
}

/// Stream wrapper counting connections that are still held by a reader.
struct TrackedStream {
    inner: ByteStream,
    active: Arc<AtomicUsize>,
}

impl TrackedStream {
    fn new(inner: ByteStream, active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self { inner, active }
    }
}

impl Stream for TrackedStream {
    type Item = Result<Bytes, HttpError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock HTTP client for testing.
///
/// # Example
///
/// ```ignore
/// use linkwatch::adapters::mock::{MockHttpClient, MockResponse};
///
/// let client = MockHttpClient::new();
/// client.set_response(
///     "http://backend/api/whatsapp/status",
///     MockResponse::json(r#"{"state":"connected","message_count":40}"#),
/// );
/// client.set_response("http://backend/api/whatsapp/status/stream", MockResponse::LiveStream);
///
/// // ... start a driver, then:
/// let stream = client.stream_handles()[0].clone();
/// stream.send_status(r#"{"state":"qr_ready","qr":"ref-1"}"#);
/// stream.close();
/// ```
#[derive(Debug, Clone)]
pub struct MockHttpClient {
    /// Configured responses by URL (exact, then prefix)
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    /// One-shot responses consumed in order before the configured response
    queued: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
    /// Default response when no specific match
    default_response: Arc<Mutex<Option<MockResponse>>>,
    /// Recorded requests for verification
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    /// Handles of live streams in the order they were opened
    streams: Arc<Mutex<Vec<MockStreamHandle>>>,
    /// Streams currently held by a reader
    active_streams: Arc<AtomicUsize>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            queued: Arc::new(Mutex::new(HashMap::new())),
            default_response: Arc::new(Mutex::new(None)),
            requests: Arc::new(Mutex::new(Vec::new())),
            streams: Arc::new(Mutex::new(Vec::new())),
            active_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the response for a URL (matched exactly, then as a prefix).
    pub fn set_response(&self, url: &str, response: MockResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Queue a one-shot response for an exact URL.
    pub fn push_response(&self, url: &str, response: MockResponse) {
        self.queued
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// Set a default response for URLs without specific matches.
    pub fn set_default_response(&self, response: MockResponse) {
        *self.default_response.lock().unwrap() = Some(response);
    }

    /// Get all recorded requests.
    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded requests for one exact URL.
    pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
        self.get_requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }

    /// Clear all recorded requests.
    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    /// Handles of every live stream opened so far.
    pub fn stream_handles(&self) -> Vec<MockStreamHandle> {
        self.streams.lock().unwrap().clone()
    }

    /// Most recently opened live stream.
    pub fn latest_stream(&self) -> Option<MockStreamHandle> {
        self.streams.lock().unwrap().last().cloned()
    }

    /// Number of streams (live or finite) still held by a reader.
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }

    fn record_request(&self, method: &str, url: &str, headers: &Headers, body: Option<String>) {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: headers.clone(),
            body,
        });
    }

    fn get_response(&self, url: &str) -> Option<MockResponse> {
        if let Some(queue) = self.queued.lock().unwrap().get_mut(url) {
            if let Some(response) = queue.pop_front() {
                return Some(response);
            }
        }

        let responses = self.responses.lock().unwrap();
        if let Some(response) = responses.get(url) {
            return Some(response.clone());
        }

        // Longest prefix wins so "/status" does not shadow "/status/stream"
        let prefixed = responses
            .iter()
            .filter(|(pattern, _)| url.starts_with(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, response)| response.clone());
        if prefixed.is_some() {
            return prefixed;
        }

        self.default_response.lock().unwrap().clone()
    }

    /// Scripted response for `url`, after any configured delay.
    async fn resolve(&self, url: &str) -> Option<MockResponse> {
        let mut response = self.get_response(url);
        loop {
            match response {
                Some(MockResponse::Delayed(delay, inner)) => {
                    tokio::time::sleep(delay).await;
                    response = Some(*inner);
                }
                other => return other,
            }
        }
    }

    async fn buffered(&self, url: &str) -> Result<Response, HttpError> {
        match self.resolve(url).await {
            Some(MockResponse::Success(response)) => Ok(response),
            Some(MockResponse::Error(err)) => Err(err),
            Some(MockResponse::Stream(_))
            | Some(MockResponse::LiveStream)
            | Some(MockResponse::Delayed(..)) => Err(HttpError::Other(
                "Stream response on non-stream request".to_string(),
            )),
            None => Err(HttpError::Other(format!("No mock response for URL: {}", url))),
        }
    }

    fn open_live_stream(&self) -> ByteStream {
        let (tx, rx) = mpsc::unbounded_channel::<Result<Bytes, HttpError>>();
        self.streams.lock().unwrap().push(MockStreamHandle {
            sender: Arc::new(Mutex::new(Some(tx))),
        });

        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record_request("GET", url, headers, None);
        self.buffered(url).await
    }

    async fn post(&self, url: &str, body: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record_request("POST", url, headers, Some(body.to_string()));
        self.buffered(url).await
    }

    async fn get_stream(&self, url: &str, headers: &Headers) -> Result<ByteStream, HttpError> {
        self.record_request("GET", url, headers, None);

        let inner: ByteStream = match self.resolve(url).await {
            Some(MockResponse::Stream(chunks)) => {
                Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)))
            }
            Some(MockResponse::LiveStream) => self.open_live_stream(),
            Some(MockResponse::Success(response)) if !response.is_success() => {
                return Err(HttpError::ServerError {
                    status: response.status,
                    message: response.text().unwrap_or_default(),
                })
            }
            Some(MockResponse::Success(_)) | Some(MockResponse::Delayed(..)) => {
                return Err(HttpError::Other(
                    "Non-stream response on stream request".to_string(),
                ))
            }
            Some(MockResponse::Error(err)) => return Err(err),
            None => return Err(HttpError::Other(format!("No mock response for URL: {}", url))),
        };

        Ok(Box::pin(TrackedStream::new(
            inner,
            self.active_streams.clone(),
        )))
    }
}
