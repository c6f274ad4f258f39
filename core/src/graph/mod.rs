//! Cross-file import graph: edge extraction, target resolution, cycle checks
//! and the transitive ("waterfall") symbol set.

mod resolve;
mod resolver;
mod traversal;

pub use resolve::{match_module_path, ImportProber};
pub use resolver::{GraphLimits, ImportSet, ModuleGraphResolver};
pub(crate) use resolver::filename_of;
