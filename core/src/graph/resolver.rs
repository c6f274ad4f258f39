use std::hash::Hash;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;
use url::Url;

use super::resolve::{match_module_path, ImportProber};
use crate::bridge::AnalysisBridge;
use crate::cache::{AnalysisCache, PendingTable, TtlCache};
use crate::clock::SharedClock;
use crate::config::CoreConfig;
use crate::document::{content_hash, DocumentStore};
use crate::error::BridgeResult;
use crate::model::{CircularCheckResult, ImportEdge, ImportKind, WaterfallSymbolSet};

/// Declared dependencies of one content state of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSet {
    pub content_hash: u64,
    pub edges: Vec<ImportEdge>,
}

impl ImportSet {
    /// Resolved dependency files, in declaration order, without duplicates.
    pub fn resolved_uris(&self) -> Vec<Url> {
        let mut out: Vec<Url> = Vec::new();
        for uri in self.edges.iter().filter_map(ImportEdge::resolved_uri) {
            if !out.contains(&uri) {
                out.push(uri);
            }
        }
        out
    }
}

/// A derived result plus every file that fed into it.
#[derive(Debug, Clone)]
pub(super) struct Derived<T> {
    pub value: T,
    pub content_hash: u64,
    pub files: Vec<Url>,
}

impl<T> Derived<T> {
    fn depends_on(&self, uri: &Url) -> bool {
        self.files.contains(uri)
    }
}

/// Invalidation epochs of the files a computation read, taken before each read.
#[derive(Debug, Clone)]
pub(super) struct ReadSet {
    generation: u64,
    files: Vec<(Url, u64)>,
}

impl ReadSet {
    pub fn record(&mut self, inner: &GraphInner, uri: &Url) {
        if !self.files.iter().any(|(seen, _)| seen == uri) {
            self.files.push((uri.clone(), inner.epoch(uri)));
        }
    }

    pub fn files(&self) -> Vec<Url> {
        self.files.iter().map(|(uri, _)| uri.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GraphLimits {
    pub import_ttl: Duration,
    pub waterfall_ttl: Duration,
    pub circular_ttl: Duration,
    pub waterfall_max_depth: usize,
}

impl GraphLimits {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            import_ttl: config.import_cache_ttl,
            waterfall_ttl: config.waterfall_cache_ttl,
            circular_ttl: config.circular_cache_ttl,
            waterfall_max_depth: config.waterfall_max_depth,
        }
    }
}

pub(super) struct GraphInner {
    pub bridge: Arc<AnalysisBridge>,
    pub documents: Arc<DocumentStore>,
    pub analyses: AnalysisCache,
    pub prober: ImportProber,
    pub limits: GraphLimits,
    pub imports: TtlCache<Url, Arc<ImportSet>>,
    pub import_flights: Arc<PendingTable<(Url, u64), Arc<ImportSet>>>,
    pub waterfall: TtlCache<(Url, usize), Derived<Arc<WaterfallSymbolSet>>>,
    pub waterfall_flights: Arc<PendingTable<(Url, usize, u64), Arc<WaterfallSymbolSet>>>,
    pub circular: TtlCache<Url, Derived<CircularCheckResult>>,
    pub circular_flights: Arc<PendingTable<(Url, u64), CircularCheckResult>>,
    epochs: DashMap<Url, u64>,
    generation: AtomicU64,
}

impl GraphInner {
    fn epoch(&self, uri: &Url) -> u64 {
        self.epochs.get(uri).map(|e| *e).unwrap_or(0)
    }

    pub fn start_reads(&self) -> ReadSet {
        ReadSet {
            generation: self.generation.load(Ordering::SeqCst),
            files: Vec::new(),
        }
    }

    fn unchanged(&self, reads: &ReadSet) -> bool {
        self.generation.load(Ordering::SeqCst) == reads.generation
            && reads.files.iter().all(|(uri, epoch)| self.epoch(uri) == *epoch)
    }

    /// Store `value` unless one of the files it read was invalidated meanwhile.
    ///
    /// Invalidation bumps epochs before it removes entries, so an insert racing
    /// with it is either removed by it or rolled back by the second check.
    pub fn store_if_unchanged<K, V>(&self, cache: &TtlCache<K, V>, key: K, value: V, reads: &ReadSet) -> bool
    where
        K: Eq + Hash + Clone,
        V: Clone,
    {
        if !self.unchanged(reads) {
            return false;
        }
        cache.insert(key.clone(), value);
        if !self.unchanged(reads) {
            cache.remove(&key);
            return false;
        }
        true
    }
}

/// Dependency edges, their resolution, cycle checks and transitive symbols.
///
/// Cheap to clone. Derived results are cached briefly and are only reused while
/// the source text they were computed from is unchanged.
#[derive(Clone)]
pub struct ModuleGraphResolver {
    pub(super) inner: Arc<GraphInner>,
}

impl std::fmt::Debug for ModuleGraphResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleGraphResolver")
            .field("imports", &self.inner.imports.len())
            .field("waterfall", &self.inner.waterfall.len())
            .field("circular", &self.inner.circular.len())
            .finish()
    }
}

impl ModuleGraphResolver {
    pub fn new(
        bridge: Arc<AnalysisBridge>,
        documents: Arc<DocumentStore>,
        analyses: AnalysisCache,
        prober: ImportProber,
        limits: GraphLimits,
        clock: SharedClock,
    ) -> Self {
        Self {
            inner: Arc::new(GraphInner {
                bridge,
                documents,
                analyses,
                prober,
                imports: TtlCache::new(limits.import_ttl, Arc::clone(&clock)),
                import_flights: PendingTable::new(),
                waterfall: TtlCache::new(limits.waterfall_ttl, Arc::clone(&clock)),
                waterfall_flights: PendingTable::new(),
                circular: TtlCache::new(limits.circular_ttl, clock),
                circular_flights: PendingTable::new(),
                epochs: DashMap::new(),
                generation: AtomicU64::new(0),
                limits,
            }),
        }
    }

    pub fn limits(&self) -> GraphLimits {
        self.inner.limits
    }

    /// Declared dependencies of `uri`, each resolved where possible, cached under `uri`.
    pub async fn extract_imports(&self, uri: &Url, content: &str) -> BridgeResult<Arc<ImportSet>> {
        let hash = content_hash(content);
        if let Some(set) = self.inner.imports.get(uri).filter(|s| s.content_hash == hash) {
            return Ok(set);
        }
        let mut reads = self.inner.start_reads();
        reads.record(&self.inner, uri);
        let set = self.import_flight(uri, content, hash).await?;
        if !self.inner.store_if_unchanged(&self.inner.imports, uri.clone(), Arc::clone(&set), &reads) {
            debug!(target: "pike::graph", "discarding imports of {} (invalidated while in flight)", uri);
        }
        Ok(set)
    }

    /// Imports of a file reached through another document's graph walk.
    ///
    /// Reads a settled entry for the same content, otherwise computes without storing.
    pub(super) async fn dependency_imports(&self, uri: &Url, content: &str) -> BridgeResult<Arc<ImportSet>> {
        let hash = content_hash(content);
        if let Some(set) = self.inner.imports.get(uri).filter(|s| s.content_hash == hash) {
            return Ok(set);
        }
        self.import_flight(uri, content, hash).await
    }

    async fn import_flight(&self, uri: &Url, content: &str, hash: u64) -> BridgeResult<Arc<ImportSet>> {
        let inner = Arc::clone(&self.inner);
        let key_uri = uri.clone();
        let source = content.to_string();
        let flight = self.inner.import_flights.join_or_spawn((uri.clone(), hash), move || async move {
            let filename = filename_of(&key_uri);
            let mut edges = inner.bridge.extract_imports(&source, &filename).await?;
            let current = key_uri.to_file_path().ok();
            for edge in edges.iter_mut().filter(|e| e.resolved_path.is_none()) {
                edge.resolved_path = current
                    .as_deref()
                    .and_then(|path| inner.prober.resolve(edge.kind, &edge.declared_target, path));
            }
            debug!(target: "pike::graph", "{} declares {} imports", key_uri, edges.len());
            Ok(Arc::new(ImportSet {
                content_hash: hash,
                edges,
            }))
        });
        flight.await
    }

    /// Import set cached for `uri`, whatever content it came from. Never computes.
    pub fn cached_imports(&self, uri: &Url) -> Option<Arc<ImportSet>> {
        self.inner.imports.get(uri)
    }

    /// Local lookup of one import target. Never fails; unresolvable targets are `None`.
    pub fn resolve_import_target(&self, kind: ImportKind, target: &str, current: &Url) -> Option<PathBuf> {
        let path = current.to_file_path().ok()?;
        self.inner.prober.resolve(kind, target, &path)
    }

    /// Ask the analysis process, falling back to local lookup if it cannot answer.
    pub async fn resolve_via_runtime(&self, kind: ImportKind, target: &str, current: &Url) -> Option<PathBuf> {
        let path = current.to_file_path().ok()?;
        match self.inner.bridge.resolve_import(kind, target, &path).await {
            Ok(Some(resolved)) => Some(resolved),
            Ok(None) => self.inner.prober.resolve(kind, target, &path),
            Err(err) => {
                debug!(target: "pike::graph", "runtime lookup of '{}' failed ({}), probing locally", target, err);
                self.inner.prober.resolve(kind, target, &path)
            }
        }
    }

    /// Known document whose path ends with the module named by `target`.
    pub fn resolve_module_path<'a>(&self, target: &str, candidates: &'a [Url]) -> Option<&'a Url> {
        match_module_path(target, candidates)
    }

    /// Drop everything derived from `uri`, including results of other documents that read it.
    pub fn invalidate(&self, uri: &Url) {
        *self.inner.epochs.entry(uri.clone()).or_insert(0) += 1;
        self.inner.imports.remove(uri);
        self.inner
            .waterfall
            .retain(|(root, _), derived| root != uri && !derived.depends_on(uri));
        self.inner
            .circular
            .retain(|root, derived| root != uri && !derived.depends_on(uri));
    }

    pub fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.imports.clear();
        self.inner.waterfall.clear();
        self.inner.circular.clear();
    }
}

pub(crate) fn filename_of(uri: &Url) -> String {
    uri.to_file_path()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| uri.to_string())
}
