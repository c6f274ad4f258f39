use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use url::Url;
use walkdir::{DirEntry, WalkDir};

use crate::cache::GlobCache;
use crate::clock::SharedClock;

const SOURCE_PATTERN: &str = "**/*.{pike,pmod,h}";
const SOURCE_EXTENSIONS: &[&str] = &["pike", "pmod", "h"];
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "build", "dist"];

/// Source files of the workspace that the editor has not opened or analyzed yet.
pub trait WorkspaceScanner: Send + Sync + std::fmt::Debug {
    /// False until the first scan completed; callers then see no candidates.
    fn is_ready(&self) -> bool;

    fn uncached_files(&self, cached: &[Url]) -> Vec<Url>;
}

/// Recursive listing of the workspace roots, refreshed at most once per glob TTL.
#[derive(Debug)]
pub struct FsWorkspaceScanner {
    roots: RwLock<Vec<PathBuf>>,
    listings: GlobCache<Arc<Vec<PathBuf>>>,
    files: RwLock<Arc<Vec<PathBuf>>>,
    ready: AtomicBool,
}

impl FsWorkspaceScanner {
    pub fn new(roots: Vec<PathBuf>, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            roots: RwLock::new(roots),
            listings: GlobCache::new(ttl, clock),
            files: RwLock::new(Arc::new(Vec::new())),
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_roots(&self, roots: Vec<PathBuf>) {
        *self.roots.write() = roots;
        self.listings.clear();
    }

    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots.read().clone()
    }

    /// List every root whose cached listing expired. Returns the number of files known.
    pub async fn scan(&self) -> usize {
        let roots = self.roots();
        let mut all: Vec<PathBuf> = Vec::new();
        for root in &roots {
            let listing = match self.listings.get(SOURCE_PATTERN, root) {
                Some(listing) => listing,
                None => {
                    let dir = root.clone();
                    let listing = match tokio::task::spawn_blocking(move || list_sources(&dir)).await {
                        Ok(files) => Arc::new(files),
                        Err(err) => {
                            warn!("workspace scan of {} failed: {}", root.display(), err);
                            continue;
                        }
                    };
                    debug!("scanned {}: {} source files", root.display(), listing.len());
                    self.listings.insert(SOURCE_PATTERN, root, Arc::clone(&listing));
                    listing
                }
            };
            all.extend(listing.iter().cloned());
        }
        all.sort();
        all.dedup();
        let count = all.len();
        *self.files.write() = Arc::new(all);
        if !self.ready.swap(true, Ordering::SeqCst) {
            info!("workspace scan ready: {} source files", count);
        }
        count
    }

    /// Forget the listing of `root` so the next scan walks it again.
    pub fn invalidate(&self, root: &Path) {
        self.listings.invalidate(root);
    }

    pub fn files(&self) -> Arc<Vec<PathBuf>> {
        Arc::clone(&self.files.read())
    }
}

impl WorkspaceScanner for FsWorkspaceScanner {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn uncached_files(&self, cached: &[Url]) -> Vec<Url> {
        if !self.is_ready() {
            return Vec::new();
        }
        self.files()
            .iter()
            .filter_map(|path| Url::from_file_path(path).ok())
            .filter(|uri| !cached.contains(uri))
            .collect()
    }
}

fn list_sources(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
        })
        .map(DirEntry::into_path)
        .collect();
    files.sort();
    files
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}
