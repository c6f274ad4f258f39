use anyhow::Context;
use pike_lsp_core::config::CoreConfigSection;
use tower_lsp::lsp_types::ConfigurationItem;
use tracing::{info, warn};

use super::state::PikeLanguageServer;

pub(crate) const CONFIG_SECTION: &str = "pike";

impl PikeLanguageServer {
    /// Pull the `pike` section from the client and merge it over the environment defaults.
    pub(crate) async fn load_config(&self) {
        match self.fetch_config_section().await {
            Ok(Some(section)) => {
                if self.service_started() {
                    info!("pike configuration changed; process settings apply after a server restart");
                }
                self.config.lock().merge(section);
            }
            Ok(None) => {}
            Err(e) => warn!("ignoring pike configuration: {e:#}"),
        }
    }

    async fn fetch_config_section(&self) -> anyhow::Result<Option<CoreConfigSection>> {
        let items = vec![ConfigurationItem {
            scope_uri: None,
            section: Some(CONFIG_SECTION.to_string()),
        }];
        let values = self
            .client
            .configuration(items)
            .await
            .context("workspace/configuration request failed")?;
        let Some(value) = values.into_iter().next().filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let section = serde_json::from_value::<CoreConfigSection>(value).context("malformed `pike` section")?;
        Ok(Some(section))
    }
}
