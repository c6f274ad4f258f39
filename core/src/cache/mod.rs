//! Caches shared by the analysis flows.
//!
//! [`AnalysisCache`] carries the consistency contract: one computation per
//! fingerprint, never a stale store. The TTL caches beside it are plain
//! time-bounded memos.

mod analysis;
mod glob;
mod pending;
mod tag_catalog;
mod ttl;

pub use analysis::AnalysisCache;
pub use glob::{GlobCache, DEFAULT_GLOB_TTL};
pub use pending::{Flight, PendingTable};
pub use tag_catalog::{TagAttribute, TagCatalog, TagCatalogCache, TagInfo, DEFAULT_TAG_CATALOG_TTL};
pub use ttl::{CacheEntry, TtlCache};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}
