use std::path::{Path, PathBuf};
use std::time::Duration;

use super::ttl::TtlCache;
use super::CacheStats;
use crate::clock::SharedClock;

pub const DEFAULT_GLOB_TTL: Duration = Duration::from_secs(30);

/// File listings keyed by the pattern that produced them and the root it ran under.
#[derive(Debug)]
pub struct GlobCache<T: Clone> {
    entries: TtlCache<(String, PathBuf), T>,
}

impl<T: Clone> GlobCache<T> {
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: TtlCache::new(ttl, clock),
        }
    }

    pub fn get(&self, pattern: &str, cwd: &Path) -> Option<T> {
        self.entries.get(&(pattern.to_string(), cwd.to_path_buf()))
    }

    pub fn insert(&self, pattern: &str, cwd: &Path, files: T) {
        self.entries.insert((pattern.to_string(), cwd.to_path_buf()), files);
    }

    /// Forget every pattern cached for `cwd`.
    pub fn invalidate(&self, cwd: &Path) {
        self.entries.retain(|(_, root), _| root != cwd);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let mut keys: Vec<String> = self
            .entries
            .keys()
            .into_iter()
            .map(|(pattern, cwd)| format!("{}:{}", pattern, cwd.display()))
            .collect();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
        }
    }
}
