//! Call and type hierarchies assembled from settled per-document analyses.
//!
//! Nothing here triggers analysis. Cross-file answers only use documents that
//! are already in the [`AnalysisCache`], plus workspace files the scanner knows
//! about for type parents. A name that cannot be pinned to a defining file is
//! left out instead of being attributed to the file that mentions it.

mod calls;
mod types;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use url::Url;

use crate::cache::AnalysisCache;
use crate::config::CoreConfig;
use crate::graph::ModuleGraphResolver;
use crate::model::{AnalysisResult, Position, Range, Symbol, SymbolKind};
use crate::workspace::WorkspaceScanner;

pub use calls::{CallDirection, CallTree, CallTreeNode, IncomingCall, OutgoingCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Function,
    Method,
    Class,
    Module,
    /// A whole file standing in for the program it defines.
    Program,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HierarchyItem {
    pub name: String,
    pub kind: ItemKind,
    pub uri: Url,
    pub range: Range,
    pub selection_range: Range,
    pub detail: Option<String>,
}

impl HierarchyItem {
    pub fn from_symbol(uri: &Url, symbol: &Symbol) -> Option<Self> {
        let (kind, detail) = match &symbol.kind {
            SymbolKind::Function { signature, .. } => (ItemKind::Function, signature.clone()),
            SymbolKind::Method { signature, .. } => (ItemKind::Method, signature.clone()),
            SymbolKind::Class { .. } => (ItemKind::Class, None),
            SymbolKind::Module { .. } => (ItemKind::Module, None),
            SymbolKind::Enum { .. }
            | SymbolKind::Variable { .. }
            | SymbolKind::Constant { .. }
            | SymbolKind::Typedef { .. }
            | SymbolKind::Inherit { .. } => return None,
        };
        Some(Self {
            name: symbol.name.clone(),
            kind,
            uri: uri.clone(),
            range: symbol.range,
            selection_range: symbol.selection_range,
            detail,
        })
    }

    /// The file itself, as the program it compiles to.
    pub fn program(uri: &Url) -> Self {
        let name = uri
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(|file| file.rsplit_once('.').map_or(file, |(stem, _)| stem).to_string())
            .unwrap_or_else(|| uri.to_string());
        Self {
            name,
            kind: ItemKind::Program,
            uri: uri.clone(),
            range: Range::default(),
            selection_range: Range::default(),
            detail: Some(uri.path().to_string()),
        }
    }

    fn key(&self) -> (Url, Position, String) {
        (self.uri.clone(), self.selection_range.start, self.name.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyLimits {
    pub max_depth: usize,
    pub max_items: usize,
}

impl HierarchyLimits {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            max_depth: config.hierarchy_max_depth,
            max_items: config.hierarchy_max_items,
        }
    }
}

impl Default for HierarchyLimits {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_items: 100,
        }
    }
}

#[derive(Debug)]
pub struct HierarchyResolver {
    analyses: AnalysisCache,
    graph: ModuleGraphResolver,
    scanner: RwLock<Option<Arc<dyn WorkspaceScanner>>>,
    limits: HierarchyLimits,
}

impl HierarchyResolver {
    pub fn new(analyses: AnalysisCache, graph: ModuleGraphResolver, limits: HierarchyLimits) -> Self {
        Self {
            analyses,
            graph,
            scanner: RwLock::new(None),
            limits,
        }
    }

    pub fn with_scanner(self, scanner: Arc<dyn WorkspaceScanner>) -> Self {
        *self.scanner.write() = Some(scanner);
        self
    }

    pub fn set_scanner(&self, scanner: Arc<dyn WorkspaceScanner>) {
        *self.scanner.write() = Some(scanner);
    }

    pub fn limits(&self) -> HierarchyLimits {
        self.limits
    }

    /// Innermost function, method, class or module at `position` in an analyzed document.
    pub fn prepare(&self, uri: &Url, position: Position) -> Option<HierarchyItem> {
        let (_, result) = self.analyses.latest(uri)?;
        let symbol = result.innermost_at(position, |s| {
            (s.is_callable() || s.is_type()) && !s.is_declaration_only()
        })?;
        HierarchyItem::from_symbol(uri, symbol)
    }

    fn scanner(&self) -> Option<Arc<dyn WorkspaceScanner>> {
        self.scanner.read().clone()
    }

    /// The symbol an item was made from, if its document is still analyzed the same way.
    fn symbol_of<'a>(result: &'a AnalysisResult, item: &HierarchyItem) -> Option<&'a Symbol> {
        result
            .walk()
            .find(|s| s.name == item.name && s.selection_range == item.selection_range)
    }
}

/// Positions where a symbol is declared rather than used.
fn declaration_sites(result: &AnalysisResult) -> HashSet<Position> {
    result.walk().map(|s| s.selection_range.start).collect()
}
