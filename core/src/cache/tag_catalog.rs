use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ttl::TtlCache;
use super::CacheStats;
use crate::bridge::AnalysisBridge;
use crate::clock::SharedClock;

pub const DEFAULT_TAG_CATALOG_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagAttribute {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

/// One template tag a server instance knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Vec<TagAttribute>,
}

pub type TagCatalog = Arc<Vec<TagInfo>>;

/// Tag catalogs per (analysis process id, server name).
///
/// Keying by process id means a restarted process never sees catalogs
/// gathered by its predecessor.
#[derive(Debug)]
pub struct TagCatalogCache {
    entries: TtlCache<(u32, String), TagCatalog>,
}

impl TagCatalogCache {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: TtlCache::new(ttl, clock),
        }
    }

    pub fn get(&self, pid: u32, server: &str) -> Option<TagCatalog> {
        self.entries.get(&(pid, server.to_string()))
    }

    pub fn set(&self, pid: u32, server: &str, catalog: Vec<TagInfo>) -> TagCatalog {
        let catalog = Arc::new(catalog);
        self.entries.insert((pid, server.to_string()), Arc::clone(&catalog));
        catalog
    }

    /// Catalog for the bridge's running process; nothing when no process is running.
    pub fn get_for(&self, bridge: &AnalysisBridge, server: &str) -> Option<TagCatalog> {
        self.get(bridge.pid()?, server)
    }

    pub fn set_for(&self, bridge: &AnalysisBridge, server: &str, catalog: Vec<TagInfo>) -> Option<TagCatalog> {
        Some(self.set(bridge.pid()?, server, catalog))
    }

    pub fn invalidate(&self, pid: u32, server: &str) {
        self.entries.remove(&(pid, server.to_string()));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let mut keys: Vec<String> = self
            .entries
            .keys()
            .into_iter()
            .map(|(pid, server)| format!("{}:{}", pid, server))
            .collect();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
        }
    }
}
