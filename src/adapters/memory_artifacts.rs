//! In-process artifact store.
//!
//! Keeps issued QR artifacts in a map keyed by id so UI surfaces can resolve
//! `artifact://<id>` addresses. Every issue and release is appended to a
//! ledger that tests and diagnostics can inspect.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::traits::{ArtifactContent, ArtifactError, ArtifactHandle, ArtifactStore};

/// One entry of the store's ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactEvent {
    Issued(Uuid),
    Released(Uuid),
}

#[derive(Debug, Default)]
struct StoreInner {
    live: HashMap<Uuid, ArtifactHandle>,
    ledger: Vec<ArtifactEvent>,
    max_live: usize,
}

/// Thread-safe in-memory [`ArtifactStore`].
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A poisoned registry is still structurally valid
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a live artifact by the address handed to UI surfaces.
    pub fn resolve(&self, address: &str) -> Option<ArtifactHandle> {
        let id = address.strip_prefix("artifact://")?;
        let id = Uuid::parse_str(id).ok()?;
        self.lock().live.get(&id).cloned()
    }

    /// Every issue and release in order.
    pub fn ledger(&self) -> Vec<ArtifactEvent> {
        self.lock().ledger.clone()
    }

    pub fn issued_count(&self) -> usize {
        self.count(|e| matches!(e, ArtifactEvent::Issued(_)))
    }

    pub fn released_count(&self) -> usize {
        self.count(|e| matches!(e, ArtifactEvent::Released(_)))
    }

    /// Highest number of simultaneously live artifacts observed.
    pub fn max_live(&self) -> usize {
        self.lock().max_live
    }

    fn count(&self, predicate: impl Fn(&ArtifactEvent) -> bool) -> usize {
        self.lock().ledger.iter().filter(|e| predicate(e)).count()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn issue(
        &self,
        payload_key: &str,
        content: ArtifactContent,
    ) -> Result<ArtifactHandle, ArtifactError> {
        if content.is_empty() {
            return Err(ArtifactError::EmptyContent {
                payload_key: payload_key.to_string(),
            });
        }

        let handle = ArtifactHandle::new(payload_key, content);
        let mut inner = self.lock();
        inner.live.insert(handle.id, handle.clone());
        inner.ledger.push(ArtifactEvent::Issued(handle.id));
        inner.max_live = inner.max_live.max(inner.live.len());
        tracing::debug!(id = %handle.id, payload = payload_key, "Issued QR artifact");
        Ok(handle)
    }

    fn release(&self, handle: &ArtifactHandle) {
        let mut inner = self.lock();
        if inner.live.remove(&handle.id).is_some() {
            inner.ledger.push(ArtifactEvent::Released(handle.id));
            tracing::debug!(id = %handle.id, "Released QR artifact");
        }
    }

    fn live_count(&self) -> usize {
        self.lock().live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(uri: &str) -> ArtifactContent {
        ArtifactContent::Inline(uri.to_string())
    }

    #[test]
    fn test_issue_and_resolve() {
        let store = MemoryArtifactStore::new();
        let handle = store.issue("ref-1", inline("data:,a")).unwrap();

        assert_eq!(store.live_count(), 1);
        assert_eq!(store.resolve(&handle.address), Some(handle.clone()));
        assert_eq!(store.resolve("artifact://not-a-uuid"), None);
        assert_eq!(store.resolve("http://elsewhere"), None);
    }

    #[test]
    fn test_release_is_idempotent() {
        let store = MemoryArtifactStore::new();
        let handle = store.issue("ref-1", inline("data:,a")).unwrap();

        store.release(&handle);
        store.release(&handle);

        assert_eq!(store.live_count(), 0);
        assert_eq!(store.released_count(), 1);
        assert_eq!(store.resolve(&handle.address), None);
    }

    #[test]
    fn test_empty_content_is_rejected() {
        let store = MemoryArtifactStore::new();
        let result = store.issue("ref-1", inline(""));

        assert_eq!(
            result,
            Err(ArtifactError::EmptyContent {
                payload_key: "ref-1".to_string()
            })
        );
        assert!(store.ledger().is_empty());
    }

    #[test]
    fn test_ledger_and_max_live() {
        let store = MemoryArtifactStore::new();
        let a = store.issue("ref-1", inline("data:,a")).unwrap();
        store.release(&a);
        let b = store.issue("ref-2", inline("data:,b")).unwrap();

        assert_eq!(
            store.ledger(),
            vec![
                ArtifactEvent::Issued(a.id),
                ArtifactEvent::Released(a.id),
                ArtifactEvent::Issued(b.id),
            ]
        );
        assert_eq!(store.max_live(), 1);

        let _c = store.issue("ref-3", inline("data:,c")).unwrap();
        assert_eq!(store.max_live(), 2);
    }

    #[test]
    fn test_clones_share_registry() {
        let store = MemoryArtifactStore::new();
        let clone = store.clone();
        let handle = store.issue("ref-1", inline("data:,a")).unwrap();

        assert_eq!(clone.live_count(), 1);
        clone.release(&handle);
        assert_eq!(store.live_count(), 0);
    }
}
