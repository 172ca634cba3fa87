//! Mock implementations for testing.
//!
//! - [`MockHttpClient`] - HTTP client with scripted responses and live SSE bodies

pub mod http;

pub use http::{MockHttpClient, MockResponse, MockStreamHandle, RecordedRequest};
