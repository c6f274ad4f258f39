use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::{declaration_sites, HierarchyItem, HierarchyResolver};
use crate::model::{AnalysisResult, Position, Range, Symbol};

/// A callee of the item the query started from, with the call sites inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingCall {
    pub to: HierarchyItem,
    pub from_ranges: Vec<Range>,
}

/// A caller of the item the query started from, with its call sites.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCall {
    pub from: HierarchyItem,
    pub from_ranges: Vec<Range>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallTreeNode {
    pub item: HierarchyItem,
    pub parent: Option<usize>,
    pub depth: usize,
    pub call_sites: Vec<Range>,
    /// Already expanded elsewhere in the tree; listed but not expanded again.
    pub repeated: bool,
}

/// Breadth-first expansion of a call hierarchy; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallTree {
    pub nodes: Vec<CallTreeNode>,
    /// Expansion stopped at the item limit.
    pub truncated: bool,
}

impl CallTree {
    pub fn children(&self, index: usize) -> impl Iterator<Item = (usize, &CallTreeNode)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.parent == Some(index))
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }
}

impl HierarchyResolver {
    /// Functions called from inside `item`, each located in the file that defines it.
    pub fn outgoing_calls(&self, item: &HierarchyItem) -> Vec<OutgoingCall> {
        let Some((_, result)) = self.analyses.latest(&item.uri) else {
            return Vec::new();
        };
        let declared = declaration_sites(&result);

        let mut sites: Vec<(Position, &str)> = result
            .symbol_positions
            .iter()
            .flat_map(|(name, positions)| positions.iter().map(move |p| (*p, name.as_str())))
            .filter(|(pos, _)| item.range.contains(*pos) && !declared.contains(pos))
            .collect();
        sites.sort();

        let mut calls: Vec<OutgoingCall> = Vec::new();
        let mut slot: HashMap<(Url, Position, String), usize> = HashMap::new();
        for (pos, name) in sites {
            let Some(callee) = self.resolve_callable(name, &item.uri, &result) else {
                continue;
            };
            let call_site = Range::at(pos, name.encode_utf16().count() as u32);
            match slot.get(&callee.key()) {
                Some(&idx) => calls[idx].from_ranges.push(call_site),
                None => {
                    if calls.len() >= self.limits.max_items {
                        break;
                    }
                    slot.insert(callee.key(), calls.len());
                    calls.push(OutgoingCall {
                        to: callee,
                        from_ranges: vec![call_site],
                    });
                }
            }
        }
        calls
    }

    /// Functions whose bodies call `item`, across every analyzed document.
    pub fn incoming_calls(&self, item: &HierarchyItem) -> Vec<IncomingCall> {
        let mut calls: Vec<IncomingCall> = Vec::new();
        let mut slot: HashMap<(Url, Position, String), usize> = HashMap::new();

        'documents: for (uri, result) in self.analyses.settled() {
            let positions = result.occurrences(&item.name);
            if positions.is_empty() {
                continue;
            }
            // Every occurrence in one file resolves the same way.
            let Some(target) = self.resolve_callable(&item.name, &uri, &result) else {
                continue;
            };
            if target.key() != item.key() {
                continue;
            }
            let declared = declaration_sites(&result);
            for pos in positions.iter().filter(|p| !declared.contains(*p)) {
                let Some(caller) = result
                    .innermost_at(*pos, |s| s.is_callable() && !s.is_declaration_only())
                    .and_then(|s| HierarchyItem::from_symbol(&uri, s))
                else {
                    continue;
                };
                let call_site = Range::at(*pos, item.name.encode_utf16().count() as u32);
                match slot.get(&caller.key()) {
                    Some(&idx) => calls[idx].from_ranges.push(call_site),
                    None => {
                        if calls.len() >= self.limits.max_items {
                            break 'documents;
                        }
                        slot.insert(caller.key(), calls.len());
                        calls.push(IncomingCall {
                            from: caller,
                            from_ranges: vec![call_site],
                        });
                    }
                }
            }
        }
        calls
    }

    /// Expand calls from `root` level by level, up to `depth` levels and the item limit.
    ///
    /// Each item is expanded at most once, so recursion ends the branch it closes.
    pub fn call_tree(&self, root: &HierarchyItem, direction: CallDirection, depth: usize) -> CallTree {
        let depth = depth.min(self.limits.max_depth);
        let mut tree = CallTree {
            nodes: vec![CallTreeNode {
                item: root.clone(),
                parent: None,
                depth: 0,
                call_sites: Vec::new(),
                repeated: false,
            }],
            truncated: false,
        };
        let mut expanded: HashSet<(Url, Position, String)> = HashSet::from([root.key()]);
        let mut frontier: VecDeque<usize> = VecDeque::from([0]);

        while let Some(index) = frontier.pop_front() {
            let level = tree.nodes[index].depth;
            if level >= depth {
                continue;
            }
            let item = tree.nodes[index].item.clone();
            let children: Vec<(HierarchyItem, Vec<Range>)> = match direction {
                CallDirection::Outgoing => self
                    .outgoing_calls(&item)
                    .into_iter()
                    .map(|c| (c.to, c.from_ranges))
                    .collect(),
                CallDirection::Incoming => self
                    .incoming_calls(&item)
                    .into_iter()
                    .map(|c| (c.from, c.from_ranges))
                    .collect(),
            };
            for (child, call_sites) in children {
                if tree.nodes.len() >= self.limits.max_items {
                    tree.truncated = true;
                    debug!(target: "pike::hierarchy", "call tree of {} truncated at {} items", root.name, tree.nodes.len());
                    return tree;
                }
                let repeated = !expanded.insert(child.key());
                tree.nodes.push(CallTreeNode {
                    item: child,
                    parent: Some(index),
                    depth: level + 1,
                    call_sites,
                    repeated,
                });
                if !repeated {
                    frontier.push_back(tree.nodes.len() - 1);
                }
            }
        }
        tree
    }

    /// The callable `name` refers to when used in `uri`.
    ///
    /// Local definitions win, then the file's resolved imports, then the first
    /// other analyzed document (by uri) that defines it.
    pub(super) fn resolve_callable(&self, name: &str, uri: &Url, result: &AnalysisResult) -> Option<HierarchyItem> {
        if let Some(local) = result.find_definition(name) {
            return callable_item(uri, local);
        }

        if let Some(imports) = self.graph.cached_imports(uri) {
            for dep in imports.resolved_uris() {
                let Some((_, dep_result)) = self.analyses.latest(&dep) else {
                    continue;
                };
                if let Some(found) = defining_item(&dep, &dep_result, name) {
                    return Some(found);
                }
            }
        }

        self.analyses
            .settled()
            .into_iter()
            .filter(|(other, _)| other != uri)
            .find_map(|(other, other_result)| defining_item(&other, &other_result, name))
    }
}

fn callable_item(uri: &Url, symbol: &Symbol) -> Option<HierarchyItem> {
    symbol
        .is_callable()
        .then(|| HierarchyItem::from_symbol(uri, symbol))
        .flatten()
}

fn defining_item(uri: &Url, result: &Arc<AnalysisResult>, name: &str) -> Option<HierarchyItem> {
    result
        .find_definition(name)
        .and_then(|symbol| callable_item(uri, symbol))
}
