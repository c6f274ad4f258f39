use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use url::Url;

use super::pending::PendingTable;
use crate::document::DocumentFingerprint;
use crate::error::BridgeResult;
use crate::model::AnalysisResult;

#[derive(Debug, Clone)]
struct Stored {
    fingerprint: DocumentFingerprint,
    result: Arc<AnalysisResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Epoch {
    generation: u64,
    document: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: DashMap<Url, Stored>,
    current: DashMap<Url, DocumentFingerprint>,
    epochs: DashMap<Url, u64>,
    generation: AtomicU64,
    pending: Arc<PendingTable<DocumentFingerprint, Arc<AnalysisResult>>>,
}

impl Inner {
    fn epoch(&self, uri: &Url) -> Epoch {
        Epoch {
            generation: self.generation.load(Ordering::SeqCst),
            document: self.epochs.get(uri).map(|e| *e).unwrap_or(0),
        }
    }

    fn bump(&self, uri: &Url) {
        *self.epochs.entry(uri.clone()).or_insert(0) += 1;
    }

    // The entry lock is held across the checks so a concurrent invalidate either
    // sees the stored entry and removes it, or moves the epoch before we look.
    fn store_if_current(&self, fingerprint: &DocumentFingerprint, started: Epoch, result: &Arc<AnalysisResult>) -> bool {
        let uri = fingerprint.uri();
        let slot = self.entries.entry(uri.clone());
        if self.epoch(uri) != started {
            debug!(target: "pike::cache", "discarding analysis of {} (invalidated while in flight)", uri);
            return false;
        }
        if let Some(current) = self.current.get(uri) {
            if *current != *fingerprint {
                debug!(target: "pike::cache", "discarding superseded analysis of {}", uri);
                return false;
            }
        }
        slot.insert(Stored {
            fingerprint: fingerprint.clone(),
            result: Arc::clone(result),
        });
        true
    }
}

/// Latest analysis result per document, keyed by content fingerprint.
///
/// Cheap to clone; every clone shares the same entries. Concurrent requests for
/// the same fingerprint run a single computation. A result that arrives after its
/// document was edited, closed or invalidated is handed to its awaiters but not kept.
#[derive(Debug, Clone, Default)]
pub struct AnalysisCache {
    inner: Arc<Inner>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for exactly this fingerprint.
    pub fn get(&self, fingerprint: &DocumentFingerprint) -> Option<Arc<AnalysisResult>> {
        let stored = self.inner.entries.get(fingerprint.uri())?;
        (stored.fingerprint == *fingerprint).then(|| Arc::clone(&stored.result))
    }

    /// Most recent stored result for a document, whatever its fingerprint.
    pub fn latest(&self, uri: &Url) -> Option<(DocumentFingerprint, Arc<AnalysisResult>)> {
        let stored = self.inner.entries.get(uri)?;
        Some((stored.fingerprint.clone(), Arc::clone(&stored.result)))
    }

    /// Return the cached result, join a running computation, or start `compute`.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: DocumentFingerprint,
        compute: F,
    ) -> BridgeResult<Arc<AnalysisResult>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BridgeResult<AnalysisResult>> + Send + 'static,
    {
        if let Some(hit) = self.get(&fingerprint) {
            return Ok(hit);
        }

        let started = self.inner.epoch(fingerprint.uri());
        let inner = Arc::clone(&self.inner);
        let key = fingerprint.clone();
        let flight = self.inner.pending.join_or_spawn_unless(
            fingerprint.clone(),
            || self.get(&fingerprint),
            move || {
                let work = compute();
                async move {
                    let result = Arc::new(work.await?);
                    inner.store_if_current(&key, started, &result);
                    Ok(result)
                }
            },
        );
        flight.await
    }

    /// Record the editor's current fingerprint for an open document.
    pub fn track(&self, fingerprint: DocumentFingerprint) {
        self.inner.current.insert(fingerprint.uri().clone(), fingerprint);
    }

    pub fn current(&self, uri: &Url) -> Option<DocumentFingerprint> {
        self.inner.current.get(uri).map(|fp| fp.clone())
    }

    pub fn is_pending(&self, fingerprint: &DocumentFingerprint) -> bool {
        self.inner.pending.is_pending(fingerprint)
    }

    /// The document closed: later analyses of it use stat fingerprints.
    pub fn close(&self, uri: &Url) {
        self.forget(uri);
        debug!(target: "pike::cache", "closed {}", uri);
    }

    /// Drop every entry for `uri`, whatever the fingerprint form.
    pub fn invalidate(&self, uri: &Url) {
        self.forget(uri);
        debug!(target: "pike::cache", "invalidated {}", uri);
    }

    fn forget(&self, uri: &Url) {
        self.inner.bump(uri);
        self.inner.entries.remove(uri);
        self.inner.current.remove(uri);
    }

    pub fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.entries.clear();
        self.inner.current.clear();
    }

    /// Every stored result, sorted by uri.
    pub fn settled(&self) -> Vec<(Url, Arc<AnalysisResult>)> {
        let mut all: Vec<(Url, Arc<AnalysisResult>)> = self
            .inner
            .entries
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(&e.value().result)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn uris(&self) -> Vec<Url> {
        self.settled().into_iter().map(|(uri, _)| uri).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}
