use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Environment variable exported to the analysis process for alternate library roots.
pub const MODULE_PATH_ENV: &str = "PIKE_PROGRAM_PATH";
pub const RUNTIME_PATH_ENV: &str = "PIKE_LSP_PIKE";
pub const ANALYZER_SCRIPT_ENV: &str = "PIKE_LSP_ANALYZER";

/// Knobs consumed by the bridge, the caches and the graph traversals.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    pub pike_path: PathBuf,
    pub analyzer_script: Option<PathBuf>,
    pub module_path_override: Option<PathBuf>,
    pub include_paths: Vec<PathBuf>,
    pub module_paths: Vec<PathBuf>,
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
    pub import_cache_ttl: Duration,
    pub waterfall_cache_ttl: Duration,
    pub circular_cache_ttl: Duration,
    pub glob_cache_ttl: Duration,
    pub tag_catalog_ttl: Duration,
    pub waterfall_max_depth: usize,
    pub hierarchy_max_depth: usize,
    pub hierarchy_max_items: usize,
    pub max_restarts: usize,
    pub restart_window: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            pike_path: PathBuf::from("pike"),
            analyzer_script: None,
            module_path_override: None,
            include_paths: Vec::new(),
            module_paths: Vec::new(),
            startup_timeout: Duration::from_millis(10_000),
            request_timeout: Duration::from_millis(30_000),
            import_cache_ttl: Duration::from_millis(5_000),
            waterfall_cache_ttl: Duration::from_millis(5_000),
            circular_cache_ttl: Duration::from_millis(5_000),
            glob_cache_ttl: Duration::from_secs(30),
            tag_catalog_ttl: Duration::from_secs(300),
            waterfall_max_depth: 5,
            hierarchy_max_depth: 10,
            hierarchy_max_items: 100,
            max_restarts: 3,
            restart_window: Duration::from_secs(60),
        }
    }
}

/// Editor-supplied settings; every field is optional and only overrides what it names.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfigSection {
    #[serde(default)]
    pub pike_path: Option<PathBuf>,
    #[serde(default)]
    pub analyzer_script: Option<PathBuf>,
    #[serde(default)]
    pub module_path_override: Option<PathBuf>,
    #[serde(default)]
    pub include_paths: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub module_paths: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub startup_timeout_ms: Option<u64>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub import_cache_ttl_ms: Option<u64>,
    #[serde(default)]
    pub waterfall_cache_ttl_ms: Option<u64>,
    #[serde(default)]
    pub circular_cache_ttl_ms: Option<u64>,
    #[serde(default)]
    pub glob_cache_ttl_secs: Option<u64>,
    #[serde(default)]
    pub tag_catalog_ttl_secs: Option<u64>,
    #[serde(default)]
    pub waterfall_max_depth: Option<usize>,
    #[serde(default)]
    pub hierarchy_max_depth: Option<usize>,
    #[serde(default)]
    pub hierarchy_max_items: Option<usize>,
    #[serde(default)]
    pub max_restarts: Option<usize>,
    #[serde(default)]
    pub restart_window_secs: Option<u64>,
}

impl CoreConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup(MODULE_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            config.module_path_override = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(RUNTIME_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            config.pike_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ANALYZER_SCRIPT_ENV).filter(|v| !v.trim().is_empty()) {
            config.analyzer_script = Some(PathBuf::from(path));
        }
        config
    }

    /// Apply an editor configuration section. Zero-valued numeric knobs are ignored.
    pub fn merge(&mut self, section: CoreConfigSection) {
        if let Some(v) = section.pike_path {
            self.pike_path = v;
        }
        if let Some(v) = section.analyzer_script {
            self.analyzer_script = Some(v);
        }
        if let Some(v) = section.module_path_override {
            self.module_path_override = Some(v);
        }
        if let Some(v) = section.include_paths {
            self.include_paths = v;
        }
        if let Some(v) = section.module_paths {
            self.module_paths = v;
        }
        if let Some(v) = section.startup_timeout_ms.filter(|v| *v > 0) {
            self.startup_timeout = Duration::from_millis(v);
        }
        if let Some(v) = section.request_timeout_ms.filter(|v| *v > 0) {
            self.request_timeout = Duration::from_millis(v);
        }
        if let Some(v) = section.import_cache_ttl_ms.filter(|v| *v > 0) {
            self.import_cache_ttl = Duration::from_millis(v);
        }
        if let Some(v) = section.waterfall_cache_ttl_ms.filter(|v| *v > 0) {
            self.waterfall_cache_ttl = Duration::from_millis(v);
        }
        if let Some(v) = section.circular_cache_ttl_ms.filter(|v| *v > 0) {
            self.circular_cache_ttl = Duration::from_millis(v);
        }
        if let Some(v) = section.glob_cache_ttl_secs.filter(|v| *v > 0) {
            self.glob_cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = section.tag_catalog_ttl_secs.filter(|v| *v > 0) {
            self.tag_catalog_ttl = Duration::from_secs(v);
        }
        if let Some(v) = section.waterfall_max_depth.filter(|v| *v > 0) {
            self.waterfall_max_depth = v;
        }
        if let Some(v) = section.hierarchy_max_depth.filter(|v| *v > 0) {
            self.hierarchy_max_depth = v;
        }
        if let Some(v) = section.hierarchy_max_items.filter(|v| *v > 0) {
            self.hierarchy_max_items = v;
        }
        if let Some(v) = section.max_restarts {
            self.max_restarts = v;
        }
        if let Some(v) = section.restart_window_secs.filter(|v| *v > 0) {
            self.restart_window = Duration::from_secs(v);
        }
    }

    /// Roots probed for identifier-style imports, in priority order after the current directory.
    pub fn module_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if let Some(over) = &self.module_path_override {
            roots.push(over.clone());
        }
        roots.extend(self.module_paths.iter().cloned());
        roots
    }
}
