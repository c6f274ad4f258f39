use std::sync::Arc;

use pike_lsp_core::BridgeEvent;
use tokio::sync::broadcast::error::RecvError;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::LanguageServer;
use tracing::{info, warn};

use super::{
    convert::{
        from_call_item, from_lsp_position, from_type_item, to_call_item, to_document_link, to_document_symbol,
        to_incoming_call, to_lsp_range, to_outgoing_call, to_text_change, to_type_item,
    },
    state::PikeLanguageServer,
};

const OPEN_DEBOUNCE_MS: u64 = 150;
const CHANGE_DEBOUNCE_MS: u64 = 250;

#[tower_lsp::async_trait]
impl LanguageServer for PikeLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        #[allow(deprecated)]
        let root_uri = params.root_uri.clone();
        info!("Pike Language Server initializing with params: {:?}", root_uri);

        let mut roots: Vec<_> = params
            .workspace_folders
            .unwrap_or_default()
            .into_iter()
            .filter_map(|f| f.uri.to_file_path().ok())
            .collect();
        if roots.is_empty() {
            roots.extend(root_uri.and_then(|u| u.to_file_path().ok()));
        }
        *self.workspace_roots.lock() = roots;

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::INCREMENTAL),
                    save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                    ..Default::default()
                })),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                document_link_provider: Some(DocumentLinkOptions {
                    resolve_provider: Some(false),
                    work_done_progress_options: Default::default(),
                }),
                call_hierarchy_provider: Some(CallHierarchyServerCapability::Simple(true)),
                // Type hierarchy is registered dynamically once the client is initialized.
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "Pike Language Server".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!("Pike Language Server initialized");
        self.load_config().await;

        let registration = Registration {
            id: "pike-type-hierarchy".to_string(),
            method: "textDocument/prepareTypeHierarchy".to_string(),
            register_options: None,
        };
        if let Err(e) = self.client.register_capability(vec![registration]).await {
            warn!("client refused type hierarchy registration: {e}");
        }

        self.watch_bridge();

        let service = Arc::clone(self.service());
        let client = self.client.clone();
        let roots = self.workspace_roots.lock().clone();
        tokio::spawn(async move {
            if let Err(e) = service.prewarm().await {
                warn!("analysis process failed to start: {e}");
                client
                    .show_message(MessageType::ERROR, format!("Pike analysis unavailable: {e}"))
                    .await;
                return;
            }
            let files = service.scan_workspace(roots).await;
            info!("workspace scan found {} Pike files", files);
        });

        let _ = self
            .client
            .log_message(MessageType::INFO, "Pike Language Server started")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Pike Language Server shutting down");
        self.service().shutdown().await;
        Ok(())
    }

    async fn did_change_configuration(&self, _params: DidChangeConfigurationParams) {
        self.load_config().await;
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        self.service().open(doc.uri.clone(), doc.version, &doc.text);
        self.bump(&doc.uri, doc.version);
        self.schedule_diagnostics(doc.uri, doc.version, OPEN_DEBOUNCE_MS);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        let changes: Vec<_> = params.content_changes.into_iter().map(to_text_change).collect();

        if self.service().change(&uri, version, &changes).is_none() {
            warn!("change for unopened document {}", uri);
            return;
        }
        self.bump(&uri, version);
        self.schedule_diagnostics(uri, version, CHANGE_DEBOUNCE_MS);
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        self.service().save(&uri);
        let version = self.documents.get(&uri).map(|d| d.version);
        if let Some(version) = version {
            self.schedule_diagnostics(uri, version, 0);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.service().close(&uri);
        self.documents.remove(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        for change in params.changes {
            self.service().file_changed_on_disk(&change.uri);
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = from_lsp_position(params.text_document_position_params.position);

        let analysis = match self.service().analyze(uri).await {
            Ok(Some(analysis)) => analysis,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("hover on {} failed: {}", uri, e);
                return Ok(None);
            }
        };
        let Some(symbol) = analysis.innermost_at(position, |s| s.selection_range.contains(position)) else {
            return Ok(None);
        };
        let detail = match &symbol.kind {
            pike_lsp_core::model::SymbolKind::Function { signature: Some(sig), .. }
            | pike_lsp_core::model::SymbolKind::Method { signature: Some(sig), .. } => sig.clone(),
            other => format!("{} {}", other.label(), symbol.name),
        };
        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: format!("```pike\n{}\n```", detail),
            }),
            range: Some(to_lsp_range(symbol.selection_range)),
        }))
    }

    async fn document_symbol(&self, params: DocumentSymbolParams) -> Result<Option<DocumentSymbolResponse>> {
        let uri = &params.text_document.uri;
        match self.service().analyze(uri).await {
            Ok(Some(analysis)) if !analysis.symbols.is_empty() => Ok(Some(DocumentSymbolResponse::Nested(
                analysis.symbols.iter().map(to_document_symbol).collect(),
            ))),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("document symbols for {} failed: {}", uri, e);
                Ok(None)
            }
        }
    }

    async fn document_link(&self, params: DocumentLinkParams) -> Result<Option<Vec<DocumentLink>>> {
        let uri = &params.text_document.uri;
        match self.service().imports(uri).await {
            Ok(Some(imports)) => Ok(Some(imports.edges.iter().filter_map(to_document_link).collect())),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("document links for {} failed: {}", uri, e);
                Ok(None)
            }
        }
    }

    async fn prepare_call_hierarchy(&self, params: CallHierarchyPrepareParams) -> Result<Option<Vec<CallHierarchyItem>>> {
        let pos = params.text_document_position_params;
        let item = self.prepare_item(&pos.text_document.uri, pos.position).await;
        Ok(item.map(|item| vec![to_call_item(&item)]))
    }

    async fn incoming_calls(
        &self,
        params: CallHierarchyIncomingCallsParams,
    ) -> Result<Option<Vec<CallHierarchyIncomingCall>>> {
        let item = from_call_item(&params.item);
        let calls = self.service().incoming_calls(&item);
        Ok(Some(calls.iter().map(to_incoming_call).collect()))
    }

    async fn outgoing_calls(
        &self,
        params: CallHierarchyOutgoingCallsParams,
    ) -> Result<Option<Vec<CallHierarchyOutgoingCall>>> {
        let item = from_call_item(&params.item);
        let calls = self.service().outgoing_calls(&item).await;
        Ok(Some(calls.iter().map(to_outgoing_call).collect()))
    }

    async fn prepare_type_hierarchy(&self, params: TypeHierarchyPrepareParams) -> Result<Option<Vec<TypeHierarchyItem>>> {
        let pos = params.text_document_position_params;
        let item = self.prepare_item(&pos.text_document.uri, pos.position).await;
        Ok(item.map(|item| vec![to_type_item(&item)]))
    }

    async fn supertypes(&self, params: TypeHierarchySupertypesParams) -> Result<Option<Vec<TypeHierarchyItem>>> {
        let item = from_type_item(&params.item);
        let parents = self.service().supertypes(&item).await;
        Ok(Some(parents.iter().map(to_type_item).collect()))
    }

    async fn subtypes(&self, params: TypeHierarchySubtypesParams) -> Result<Option<Vec<TypeHierarchyItem>>> {
        let item = from_type_item(&params.item);
        let children = self.service().subtypes(&item);
        Ok(Some(children.iter().map(to_type_item).collect()))
    }
}

impl PikeLanguageServer {
    async fn prepare_item(&self, uri: &Url, position: Position) -> Option<pike_lsp_core::HierarchyItem> {
        match self.service().prepare_hierarchy(uri, from_lsp_position(position)).await {
            Ok(item) => item,
            Err(e) => {
                warn!("hierarchy preparation on {} failed: {}", uri, e);
                None
            }
        }
    }

    /// Surface process crashes to the user once. Restarting stays lazy, on the next request.
    fn watch_bridge(&self) {
        let mut events = self.service().bridge().subscribe();
        let client = self.client.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(BridgeEvent::Crashed { exit_code }) => {
                        warn!("analysis process crashed with exit code {:?}", exit_code);
                        client
                            .show_message(
                                MessageType::WARNING,
                                "Pike analysis process crashed; it will restart on the next request",
                            )
                            .await;
                    }
                    Ok(BridgeEvent::Started { pid }) => info!("analysis process started (pid {:?})", pid),
                    Ok(BridgeEvent::Stopped) => {}
                    Err(RecvError::Lagged(missed)) => warn!("missed {} bridge events", missed),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}
