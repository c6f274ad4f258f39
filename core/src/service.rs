use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use url::Url;

use crate::bridge::{AnalysisBridge, BridgeStatus, Launcher, ProcessLauncher};
use crate::cache::{AnalysisCache, TagCatalogCache};
use crate::clock::{system_clock, SharedClock};
use crate::config::CoreConfig;
use crate::document::{DocumentFingerprint, DocumentStore, TextChange};
use crate::error::{BridgeError, BridgeResult};
use crate::graph::{filename_of, GraphLimits, ImportProber, ImportSet, ModuleGraphResolver};
use crate::hierarchy::{HierarchyItem, HierarchyLimits, HierarchyResolver, IncomingCall, OutgoingCall};
use crate::model::{
    AnalysisResult, CircularCheckResult, IntrospectionResult, Position, StdlibSymbol, WaterfallSymbolSet,
};
use crate::workspace::FsWorkspaceScanner;

/// Everything one language server instance needs, built once and shared by reference.
pub struct AnalysisService {
    config: CoreConfig,
    clock: SharedClock,
    documents: Arc<DocumentStore>,
    bridge: Arc<AnalysisBridge>,
    analyses: AnalysisCache,
    graph: ModuleGraphResolver,
    hierarchy: HierarchyResolver,
    scanner: Arc<FsWorkspaceScanner>,
    tag_catalogs: TagCatalogCache,
    starts: tokio::sync::Mutex<StartHistory>,
    shut_down: AtomicBool,
}

/// Recent restarts after crashes, and the last start that never came up.
#[derive(Debug, Default)]
struct StartHistory {
    restarts: VecDeque<Instant>,
    failed: Option<(Instant, BridgeError)>,
}

impl std::fmt::Debug for AnalysisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisService")
            .field("bridge", &self.bridge)
            .field("analyses", &self.analyses.len())
            .finish_non_exhaustive()
    }
}

impl AnalysisService {
    pub fn new(config: CoreConfig) -> Self {
        let launcher = Arc::new(ProcessLauncher::from_config(&config));
        Self::with_launcher(config, launcher, system_clock())
    }

    pub fn with_launcher(config: CoreConfig, launcher: Arc<dyn Launcher>, clock: SharedClock) -> Self {
        let documents = Arc::new(DocumentStore::new());
        let bridge = Arc::new(AnalysisBridge::new(
            launcher,
            config.startup_timeout,
            config.request_timeout,
        ));
        let analyses = AnalysisCache::new();
        let graph = ModuleGraphResolver::new(
            Arc::clone(&bridge),
            Arc::clone(&documents),
            analyses.clone(),
            ImportProber::from_config(&config),
            GraphLimits::from_config(&config),
            Arc::clone(&clock),
        );
        let scanner = Arc::new(FsWorkspaceScanner::new(
            Vec::new(),
            config.glob_cache_ttl,
            Arc::clone(&clock),
        ));
        let hierarchy = HierarchyResolver::new(analyses.clone(), graph.clone(), HierarchyLimits::from_config(&config))
            .with_scanner(scanner.clone());
        let tag_catalogs = TagCatalogCache::new(config.tag_catalog_ttl, Arc::clone(&clock));

        Self {
            config,
            clock,
            documents,
            bridge,
            analyses,
            graph,
            hierarchy,
            scanner,
            tag_catalogs,
            starts: tokio::sync::Mutex::new(StartHistory::default()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn bridge(&self) -> &Arc<AnalysisBridge> {
        &self.bridge
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.analyses
    }

    pub fn graph(&self) -> &ModuleGraphResolver {
        &self.graph
    }

    pub fn hierarchy(&self) -> &HierarchyResolver {
        &self.hierarchy
    }

    pub fn scanner(&self) -> &Arc<FsWorkspaceScanner> {
        &self.scanner
    }

    pub fn tag_catalogs(&self) -> &TagCatalogCache {
        &self.tag_catalogs
    }

    pub fn open(&self, uri: Url, version: i32, text: &str) -> DocumentFingerprint {
        let fingerprint = self.documents.open(uri.clone(), version, text);
        self.analyses.track(fingerprint.clone());
        self.graph.invalidate(&uri);
        fingerprint
    }

    /// Apply editor edits. `None` when the document was never opened.
    pub fn change(&self, uri: &Url, version: i32, changes: &[TextChange]) -> Option<DocumentFingerprint> {
        let fingerprint = self.documents.change(uri, version, changes)?;
        self.analyses.track(fingerprint.clone());
        self.graph.invalidate(uri);
        Some(fingerprint)
    }

    /// Saving does not change an open document's fingerprint, but other files may now resolve against it.
    pub fn save(&self, uri: &Url) {
        self.graph.invalidate(uri);
    }

    pub fn close(&self, uri: &Url) {
        self.documents.close(uri);
        self.analyses.close(uri);
        self.graph.invalidate(uri);
    }

    /// The file changed outside the editor (external save, checkout, creation or deletion).
    pub fn file_changed_on_disk(&self, uri: &Url) {
        self.analyses.invalidate(uri);
        if let Some(fingerprint) = self.documents.fingerprint(uri) {
            self.analyses.track(fingerprint);
        }
        self.graph.invalidate(uri);
        if let Ok(path) = uri.to_file_path() {
            for root in self.scanner.roots() {
                if path.starts_with(&root) {
                    self.scanner.invalidate(&root);
                }
            }
        }
    }

    /// Start the analysis process if needed, refusing to restart a process that keeps crashing.
    ///
    /// A start that fails is answered from memory until `restart_window` has passed.
    pub async fn ensure_started(&self) -> BridgeResult<()> {
        if self.bridge.status().is_running() {
            return Ok(());
        }
        let mut history = self.starts.lock().await;
        let status = self.bridge.status();
        match status {
            BridgeStatus::Idle | BridgeStatus::Busy { .. } => return Ok(()),
            BridgeStatus::Stopped if self.shut_down.load(Ordering::SeqCst) => {
                return Err(BridgeError::ProcessTerminated);
            }
            _ => {}
        }

        let now = self.clock.now();
        let window = self.config.restart_window;
        if let Some((at, err)) = &history.failed {
            if now.saturating_duration_since(*at) < window {
                return Err(err.clone());
            }
            info!("retrying analysis process start");
            history.failed = None;
        }

        if matches!(status, BridgeStatus::Crashed) {
            while history
                .restarts
                .front()
                .is_some_and(|at| now.saturating_duration_since(*at) >= window)
            {
                history.restarts.pop_front();
            }
            if history.restarts.len() >= self.config.max_restarts {
                warn!(
                    "analysis process crashed {} times within {:?}; not restarting",
                    history.restarts.len(),
                    window
                );
                return Err(BridgeError::ProcessUnavailable(format!(
                    "analysis process crashed {} times within {:?}",
                    history.restarts.len(),
                    window
                )));
            }
            history.restarts.push_back(now);
            info!("restarting analysis process after crash");
        }

        match self.bridge.start().await {
            Err(err @ BridgeError::ProcessUnavailable(_)) => {
                warn!("analysis process did not start ({}); retrying after {:?}", err, window);
                history.failed = Some((now, err.clone()));
                Err(err)
            }
            started => started,
        }
    }

    /// Start the process ahead of the first request.
    pub async fn prewarm(&self) -> BridgeResult<()> {
        let started = Instant::now();
        self.ensure_started().await?;
        info!("analysis process warm after {:?}", started.elapsed());
        Ok(())
    }

    /// Stop the process for good. Later calls are no-ops.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.bridge.stop().await;
    }

    /// Analysis of the current content of `uri`: the open text, or the file on disk.
    ///
    /// `Ok(None)` when the document is neither open nor readable.
    pub async fn analyze(&self, uri: &Url) -> BridgeResult<Option<Arc<AnalysisResult>>> {
        let Some(snapshot) = self.documents.read(uri).await else {
            return Ok(None);
        };
        if let Some(hit) = self.analyses.get(&snapshot.fingerprint) {
            return Ok(Some(hit));
        }
        self.ensure_started().await?;
        let bridge = Arc::clone(&self.bridge);
        let filename = filename_of(uri);
        let text = Arc::clone(&snapshot.text);
        let result = self
            .analyses
            .get_or_compute(snapshot.fingerprint, move || async move {
                bridge.compile(&text, &filename).await
            })
            .await?;
        Ok(Some(result))
    }

    pub async fn imports(&self, uri: &Url) -> BridgeResult<Option<Arc<ImportSet>>> {
        let Some(snapshot) = self.documents.read(uri).await else {
            return Ok(None);
        };
        self.ensure_started().await?;
        self.graph.extract_imports(uri, &snapshot.text).await.map(Some)
    }

    /// Transitive symbols of `uri`; `max_depth` defaults to the configured bound.
    pub async fn waterfall(&self, uri: &Url, max_depth: Option<usize>) -> BridgeResult<Option<Arc<WaterfallSymbolSet>>> {
        let Some(snapshot) = self.documents.read(uri).await else {
            return Ok(None);
        };
        self.ensure_started().await?;
        let depth = max_depth.unwrap_or(self.config.waterfall_max_depth);
        self.graph
            .get_waterfall_symbols(uri, &snapshot.text, depth)
            .await
            .map(Some)
    }

    pub async fn circular(&self, uri: &Url) -> BridgeResult<Option<CircularCheckResult>> {
        let Some(snapshot) = self.documents.read(uri).await else {
            return Ok(None);
        };
        self.ensure_started().await?;
        self.graph
            .check_circular_dependencies(uri, &snapshot.text)
            .await
            .map(Some)
    }

    pub async fn introspect(&self, uri: &Url) -> BridgeResult<Option<IntrospectionResult>> {
        let Some(snapshot) = self.documents.read(uri).await else {
            return Ok(None);
        };
        self.ensure_started().await?;
        self.bridge
            .introspect(&snapshot.text, &filename_of(uri))
            .await
            .map(Some)
    }

    pub async fn resolve_stdlib_symbol(&self, path: &str) -> BridgeResult<Option<StdlibSymbol>> {
        if path.trim().is_empty() {
            return Ok(None);
        }
        self.ensure_started().await?;
        self.bridge.resolve_stdlib_symbol(path).await
    }

    /// Analyze `uri` (and learn its imports) so hierarchy queries can start from it.
    pub async fn prepare_hierarchy(&self, uri: &Url, position: Position) -> BridgeResult<Option<HierarchyItem>> {
        if self.analyze(uri).await?.is_none() {
            return Ok(None);
        }
        self.learn_imports(uri).await;
        Ok(self.hierarchy.prepare(uri, position))
    }

    pub async fn outgoing_calls(&self, item: &HierarchyItem) -> Vec<OutgoingCall> {
        self.learn_imports(&item.uri).await;
        self.hierarchy.outgoing_calls(item)
    }

    pub fn incoming_calls(&self, item: &HierarchyItem) -> Vec<IncomingCall> {
        self.hierarchy.incoming_calls(item)
    }

    pub async fn supertypes(&self, item: &HierarchyItem) -> Vec<HierarchyItem> {
        if !self.scanner.roots().is_empty() {
            self.scanner.scan().await;
        }
        self.hierarchy.supertypes(item)
    }

    pub fn subtypes(&self, item: &HierarchyItem) -> Vec<HierarchyItem> {
        self.hierarchy.subtypes(item)
    }

    /// Point the workspace scanner at new roots and list them.
    pub async fn scan_workspace(&self, roots: Vec<PathBuf>) -> usize {
        self.scanner.set_roots(roots);
        self.scanner.scan().await
    }

    // Import edges only feed lookups; failing to learn them leaves fewer candidates.
    async fn learn_imports(&self, uri: &Url) {
        if self.graph.cached_imports(uri).is_some() {
            return;
        }
        if let Err(err) = self.imports(uri).await {
            warn!("cannot read imports of {}: {}", uri, err);
        }
    }
}
