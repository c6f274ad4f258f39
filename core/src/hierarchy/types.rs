use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::{HierarchyItem, HierarchyResolver, ItemKind};
use crate::graph::match_module_path;
use crate::model::{AnalysisResult, ImportKind, Symbol, SymbolKind};

impl HierarchyResolver {
    /// Classes and programs `item` inherits from.
    pub fn supertypes(&self, item: &HierarchyItem) -> Vec<HierarchyItem> {
        let Some((_, result)) = self.analyses.latest(&item.uri) else {
            return Vec::new();
        };
        let targets = inherit_targets(&result, item);
        let settled = self.analyses.settled();
        let cached: Vec<Url> = settled.iter().map(|(uri, _)| uri.clone()).collect();

        let mut parents: Vec<HierarchyItem> = Vec::new();
        for target in targets {
            let Some(parent) = self.resolve_parent(&target, item, &result, &settled, &cached) else {
                debug!(target: "pike::hierarchy", "no definition found for parent '{}' of {}", target, item.name);
                continue;
            };
            if !parents.contains(&parent) {
                parents.push(parent);
            }
            if parents.len() >= self.limits.max_items {
                break;
            }
        }
        parents
    }

    fn resolve_parent(
        &self,
        target: &str,
        item: &HierarchyItem,
        result: &AnalysisResult,
        settled: &[(Url, Arc<AnalysisResult>)],
        cached: &[Url],
    ) -> Option<HierarchyItem> {
        let class_name = target.rsplit('.').next().unwrap_or(target);

        if let Some(local) = find_class(result, class_name) {
            if local.selection_range != item.selection_range {
                return HierarchyItem::from_symbol(&item.uri, local);
            }
        }

        if let Some(path) = self.graph.resolve_import_target(ImportKind::Inherit, target, &item.uri) {
            if let Ok(uri) = Url::from_file_path(&path) {
                return Some(HierarchyItem::program(&uri));
            }
        }

        let in_cache = settled
            .iter()
            .filter(|(uri, _)| *uri != item.uri)
            .find_map(|(uri, other)| find_class(other, class_name).and_then(|c| HierarchyItem::from_symbol(uri, c)));
        if in_cache.is_some() {
            return in_cache;
        }

        if let Some(uri) = match_module_path(target, cached) {
            return Some(HierarchyItem::program(uri));
        }

        let scanner = self.scanner()?;
        if !scanner.is_ready() {
            return None;
        }
        let uncached = scanner.uncached_files(cached);
        match_module_path(target, &uncached).map(HierarchyItem::program)
    }

    /// Classes and programs in analyzed documents that inherit `item`.
    pub fn subtypes(&self, item: &HierarchyItem) -> Vec<HierarchyItem> {
        let mut children: Vec<HierarchyItem> = Vec::new();
        for (uri, result) in self.analyses.settled() {
            for (owner, target) in inherit_edges(&result) {
                if !names_item(&target, item) {
                    continue;
                }
                let child = match owner {
                    Some(class) => HierarchyItem::from_symbol(&uri, class),
                    None => Some(HierarchyItem::program(&uri)),
                };
                let Some(child) = child else { continue };
                if child.uri == item.uri && child.selection_range == item.selection_range && child.name == item.name {
                    continue;
                }
                if !children.contains(&child) {
                    children.push(child);
                }
                if children.len() >= self.limits.max_items {
                    return children;
                }
            }
        }
        children
    }
}

fn find_class<'a>(result: &'a AnalysisResult, name: &str) -> Option<&'a Symbol> {
    result.walk().find(|s| s.is_type() && s.name == name)
}

/// Inherit targets declared directly by `item` (or at top level, for a program).
fn inherit_targets(result: &AnalysisResult, item: &HierarchyItem) -> Vec<String> {
    let members: &[Symbol] = match item.kind {
        ItemKind::Program => &result.symbols,
        _ => match HierarchyResolver::symbol_of(result, item) {
            Some(symbol) => symbol.children(),
            None => return Vec::new(),
        },
    };
    members
        .iter()
        .filter_map(|s| match &s.kind {
            SymbolKind::Inherit { target } => Some(target.clone()),
            _ => None,
        })
        .collect()
}

/// Every inherit edge in a document with the class that declares it (`None` at top level).
fn inherit_edges(result: &AnalysisResult) -> Vec<(Option<&Symbol>, String)> {
    let mut edges = Vec::new();
    let mut stack: Vec<(Option<&Symbol>, &Symbol)> = result.symbols.iter().rev().map(|s| (None, s)).collect();
    while let Some((owner, symbol)) = stack.pop() {
        match &symbol.kind {
            SymbolKind::Inherit { target } => edges.push((owner, target.clone())),
            _ => {
                let next_owner = if symbol.is_type() { Some(symbol) } else { owner };
                stack.extend(symbol.children().iter().rev().map(|c| (next_owner, c)));
            }
        }
    }
    edges
}

fn names_item(target: &str, item: &HierarchyItem) -> bool {
    match item.kind {
        ItemKind::Program => match_module_path(target, [&item.uri]).is_some(),
        _ => target == item.name || target.rsplit('.').next() == Some(item.name.as_str()),
    }
}
