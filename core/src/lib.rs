pub mod bridge;
pub mod cache;
pub mod clock;
pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod model;
pub mod service;
pub mod workspace;

pub use bridge::{AnalysisBridge, BridgeEvent, BridgeStatus};
pub use cache::AnalysisCache;
pub use config::CoreConfig;
pub use document::{DocumentFingerprint, DocumentStore, TextChange};
pub use error::{BridgeError, BridgeResult};
pub use graph::ModuleGraphResolver;
pub use hierarchy::{HierarchyItem, HierarchyResolver};
pub use service::AnalysisService;

// Fake analysis process shared by the test modules
#[cfg(test)]
mod testing;

#[cfg(test)]
mod document_test;
