use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use pike_lsp_core::{AnalysisService, CoreConfig};
use tower_lsp::lsp_types::Url;
use tower_lsp::Client;

/// Editor-side bookkeeping for an open document. The text itself lives in the core document store.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Document {
    pub(crate) version: i32,
    pub(crate) debounce_seq: u64,
}

/// Primary LSP server state shared across handlers.
pub(crate) struct PikeLanguageServer {
    pub(crate) client: Client,
    pub(crate) documents: Arc<DashMap<Url, Document>>,
    pub(crate) config: Mutex<CoreConfig>,
    pub(crate) workspace_roots: Mutex<Vec<PathBuf>>,
    service: OnceCell<Arc<AnalysisService>>,
}

impl PikeLanguageServer {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            documents: Arc::new(DashMap::new()),
            config: Mutex::new(CoreConfig::from_env()),
            workspace_roots: Mutex::new(Vec::new()),
            service: OnceCell::new(),
        }
    }

    /// The analysis service, built from the configuration known at first use.
    pub(crate) fn service(&self) -> &Arc<AnalysisService> {
        self.service
            .get_or_init(|| Arc::new(AnalysisService::new(self.config.lock().clone())))
    }

    pub(crate) fn service_started(&self) -> bool {
        self.service.get().is_some()
    }

    /// Record a new editor version and return the debounce sequence it was assigned.
    pub(crate) fn bump(&self, uri: &Url, version: i32) -> u64 {
        let mut entry = self.documents.entry(uri.clone()).or_default();
        entry.version = version;
        entry.debounce_seq = entry.debounce_seq.wrapping_add(1);
        entry.debounce_seq
    }
}
