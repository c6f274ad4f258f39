use std::sync::Arc;

use dashmap::DashMap;
use pike_lsp_core::{AnalysisService, BridgeError};
use tokio::time::{sleep, Duration};
use tower_lsp::lsp_types::{request::WorkDoneProgressCreate, *};
use tracing::{debug, warn};

use super::convert::{to_diagnostic, unavailable_diagnostic};
use super::state::{Document, PikeLanguageServer};

/// Diagnostics for the current content of `uri`. Transport failures become a single warning.
pub(crate) async fn collect_diagnostics(service: &AnalysisService, uri: &Url) -> Vec<Diagnostic> {
    match service.analyze(uri).await {
        Ok(Some(analysis)) => analysis.diagnostics.iter().map(to_diagnostic).collect(),
        Ok(None) => Vec::new(),
        Err(err) => {
            warn!("analysis of {} failed: {}", uri, err);
            vec![unavailable_diagnostic(&describe(&err))]
        }
    }
}

fn describe(err: &BridgeError) -> String {
    match err {
        BridgeError::ProcessCrashed { .. } => "the analysis process crashed; it restarts on the next request".to_string(),
        other => other.to_string(),
    }
}

impl PikeLanguageServer {
    /// Publish diagnostics for `uri` after `delay_ms`, unless a newer edit arrives first.
    pub(crate) fn schedule_diagnostics(&self, uri: Url, scheduled_version: i32, delay_ms: u64) {
        let documents = self.documents.clone();
        let client = self.client.clone();
        let service = Arc::clone(self.service());
        let seq = documents.get(&uri).map(|d| d.debounce_seq);
        tokio::spawn(async move {
            sleep(Duration::from_millis(delay_ms)).await;

            let is_current = |documents: &DashMap<Url, Document>| {
                documents
                    .get(&uri)
                    .is_some_and(|d| d.version == scheduled_version && Some(d.debounce_seq) == seq)
            };
            if !is_current(&documents) {
                debug!("skipping stale diagnostics for {} v{}", uri, scheduled_version);
                return;
            }

            let token = NumberOrString::String(format!("pike:diag:{}", uri));
            let _ = client
                .send_request::<WorkDoneProgressCreate>(WorkDoneProgressCreateParams { token: token.clone() })
                .await;
            let _ = client
                .send_notification::<notification::Progress>(ProgressParams {
                    token: token.clone(),
                    value: ProgressParamsValue::WorkDone(WorkDoneProgress::Begin(WorkDoneProgressBegin {
                        title: "Pike: Checking".to_string(),
                        cancellable: Some(false),
                        message: Some(uri.to_string()),
                        percentage: None,
                    })),
                })
                .await;

            let diagnostics = collect_diagnostics(&service, &uri).await;

            // The document may have moved on while the process was busy.
            if is_current(&documents) {
                client
                    .publish_diagnostics(uri.clone(), diagnostics, Some(scheduled_version))
                    .await;
            }

            let _ = client
                .send_notification::<notification::Progress>(ProgressParams {
                    token,
                    value: ProgressParamsValue::WorkDone(WorkDoneProgress::End(WorkDoneProgressEnd {
                        message: Some("Checking complete".to_string()),
                    })),
                })
                .await;
        });
    }
}
