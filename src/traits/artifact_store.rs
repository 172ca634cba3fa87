//! QR artifact store trait abstraction.
//!
//! A store turns a QR payload into a locally addressable handle and takes it
//! back when the code is no longer valid. The artifact manager is the only
//! caller; it guarantees a handle is released before its successor is issued.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// What a handle points at.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    /// Payload already embeds the image (a `data:` URI); used as-is
    Inline(String),
    /// Image bytes fetched from the backend by reference
    Fetched {
        bytes: Bytes,
        content_type: Option<String>,
    },
}

impl ArtifactContent {
    /// Raw image bytes, decoding base64 `data:` URIs when needed.
    ///
    /// Returns `None` for inline payloads that are not base64 data URIs.
    pub fn image_bytes(&self) -> Option<Bytes> {
        match self {
            ArtifactContent::Fetched { bytes, .. } => Some(bytes.clone()),
            ArtifactContent::Inline(uri) => {
                let (meta, data) = uri.strip_prefix("data:")?.split_once(',')?;
                if !meta.ends_with(";base64") {
                    return None;
                }
                STANDARD.decode(data.trim()).ok().map(Bytes::from)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ArtifactContent::Inline(uri) => uri.trim().is_empty(),
            ArtifactContent::Fetched { bytes, .. } => bytes.is_empty(),
        }
    }
}

/// A live, locally addressable QR artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactHandle {
    pub id: Uuid,
    /// Address UI surfaces use to display the artifact (`artifact://<id>`)
    pub address: String,
    /// The snapshot payload this artifact was produced from
    pub payload_key: String,
    pub content: ArtifactContent,
    pub issued_at: DateTime<Utc>,
}

impl ArtifactHandle {
    pub fn new(payload_key: &str, content: ArtifactContent) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            address: format!("artifact://{}", id),
            payload_key: payload_key.to_string(),
            content,
            issued_at: Utc::now(),
        }
    }
}

/// Errors raised when a store cannot issue a handle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact content for {payload_key:?} is empty")]
    EmptyContent { payload_key: String },
    #[error("artifact store is closed")]
    Closed,
}

/// Trait for issuing and releasing QR artifacts.
///
/// Operations are synchronous so release can run from a non-async
/// shutdown path.
pub trait ArtifactStore: Send + Sync {
    /// Register content and return its handle.
    fn issue(
        &self,
        payload_key: &str,
        content: ArtifactContent,
    ) -> Result<ArtifactHandle, ArtifactError>;

    /// Release a previously issued handle. Releasing twice is a no-op.
    fn release(&self, handle: &ArtifactHandle);

    /// Number of handles issued and not yet released.
    fn live_count(&self) -> usize;
}
