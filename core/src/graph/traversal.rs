use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;
use url::Url;

use super::resolver::{filename_of, Derived, GraphInner, ModuleGraphResolver, ReadSet};
use crate::document::{content_hash, DocumentSnapshot};
use crate::error::BridgeResult;
use crate::model::{CircularCheckResult, Symbol, SymbolKind, WaterfallSymbol, WaterfallSymbolSet};

impl ModuleGraphResolver {
    /// Symbols visible to `uri` through its dependencies, up to `max_depth` edges away.
    ///
    /// A cached set is reused only for the same depth and the same source text.
    pub async fn get_waterfall_symbols(
        &self,
        uri: &Url,
        content: &str,
        max_depth: usize,
    ) -> BridgeResult<Arc<WaterfallSymbolSet>> {
        let hash = content_hash(content);
        let key = (uri.clone(), max_depth);
        if let Some(hit) = self.inner.waterfall.get(&key).filter(|d| d.content_hash == hash) {
            return Ok(hit.value);
        }

        let resolver = self.clone();
        let root = uri.clone();
        let source: Arc<str> = Arc::from(content);
        let flight = self
            .inner
            .waterfall_flights
            .join_or_spawn((uri.clone(), max_depth, hash), move || async move {
                let (set, reads) = resolver.walk_waterfall(&root, source, max_depth).await?;
                let set = Arc::new(set);
                let derived = Derived {
                    value: Arc::clone(&set),
                    content_hash: hash,
                    files: reads.files(),
                };
                let inner = &resolver.inner;
                if !inner.store_if_unchanged(&inner.waterfall, (root.clone(), max_depth), derived, &reads) {
                    debug!(target: "pike::graph", "discarding waterfall of {} (a dependency changed)", root);
                }
                Ok(set)
            });
        flight.await
    }

    async fn walk_waterfall(
        &self,
        root: &Url,
        source: Arc<str>,
        max_depth: usize,
    ) -> BridgeResult<(WaterfallSymbolSet, ReadSet)> {
        let hash = content_hash(&source);
        let mut reads = self.inner.start_reads();
        reads.record(&self.inner, root);
        let mut visited: HashSet<Url> = HashSet::from([root.clone()]);
        let mut names: HashSet<String> = HashSet::new();
        let mut symbols = Vec::new();
        let mut frontier: VecDeque<(Url, Arc<str>, usize)> = VecDeque::from([(root.clone(), source, 0)]);

        while let Some((file, text, depth)) = frontier.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let lookup = if &file == root {
                self.extract_imports(&file, &text).await
            } else {
                self.dependency_imports(&file, &text).await
            };
            let imports = match lookup {
                Ok(imports) => imports,
                Err(err) if &file == root || err.is_process_failure() => return Err(err),
                Err(err) => {
                    debug!(target: "pike::graph", "skipping imports of {}: {}", file, err);
                    continue;
                }
            };
            for edge in &imports.edges {
                let Some(dep) = edge.resolved_uri() else { continue };
                if !visited.insert(dep.clone()) {
                    continue;
                }
                reads.record(&self.inner, &dep);
                let Some(snapshot) = self.inner.documents.read(&dep).await else {
                    continue;
                };
                for symbol in symbols_of(&self.inner, &snapshot).await? {
                    if matches!(symbol.kind, SymbolKind::Inherit { .. }) || !names.insert(symbol.name.clone()) {
                        continue;
                    }
                    symbols.push(WaterfallSymbol {
                        symbol,
                        source: dep.clone(),
                        depth: depth + 1,
                        via: edge.kind,
                    });
                }
                frontier.push_back((dep, Arc::clone(&snapshot.text), depth + 1));
            }
        }

        debug!(target: "pike::graph", "waterfall of {} at depth {}: {} symbols", root, max_depth, symbols.len());
        Ok((
            WaterfallSymbolSet {
                content_hash: hash,
                depth: max_depth,
                symbols,
            },
            reads,
        ))
    }

    /// Walk the import graph from `uri` and report the first cycle found, as a path.
    pub async fn check_circular_dependencies(&self, uri: &Url, content: &str) -> BridgeResult<CircularCheckResult> {
        let hash = content_hash(content);
        if let Some(hit) = self.inner.circular.get(uri).filter(|d| d.content_hash == hash) {
            return Ok(hit.value);
        }

        let resolver = self.clone();
        let root = uri.clone();
        let source: Arc<str> = Arc::from(content);
        let flight = self
            .inner
            .circular_flights
            .join_or_spawn((uri.clone(), hash), move || async move {
                let (result, reads) = resolver.find_cycle(&root, &source).await?;
                let derived = Derived {
                    value: result.clone(),
                    content_hash: hash,
                    files: reads.files(),
                };
                let inner = &resolver.inner;
                if !inner.store_if_unchanged(&inner.circular, root.clone(), derived, &reads) {
                    debug!(target: "pike::graph", "discarding cycle check of {} (a dependency changed)", root);
                }
                Ok(result)
            });
        flight.await
    }

    async fn find_cycle(&self, root: &Url, source: &str) -> BridgeResult<(CircularCheckResult, ReadSet)> {
        struct Frame {
            file: Url,
            deps: Vec<Url>,
            next: usize,
        }

        let mut reads = self.inner.start_reads();
        reads.record(&self.inner, root);
        let root_deps = self.extract_imports(root, source).await?.resolved_uris();
        let mut finished: HashSet<Url> = HashSet::new();
        let mut stack = vec![Frame {
            file: root.clone(),
            deps: root_deps,
            next: 0,
        }];

        loop {
            let Some(top) = stack.last_mut() else { break };
            if top.next == top.deps.len() {
                finished.insert(top.file.clone());
                stack.pop();
                continue;
            }
            let dep = top.deps[top.next].clone();
            top.next += 1;

            if let Some(at) = stack.iter().position(|f| f.file == dep) {
                let mut path: Vec<Url> = stack[at..].iter().map(|f| f.file.clone()).collect();
                path.push(dep);
                debug!(target: "pike::graph", "import cycle from {}: {} files", root, path.len() - 1);
                return Ok((CircularCheckResult::Cycle { path }, reads));
            }
            if finished.contains(&dep) {
                continue;
            }

            reads.record(&self.inner, &dep);
            let Some(snapshot) = self.inner.documents.read(&dep).await else {
                finished.insert(dep);
                continue;
            };
            let deps = match self.dependency_imports(&dep, &snapshot.text).await {
                Ok(imports) => imports.resolved_uris(),
                Err(err) if err.is_process_failure() => return Err(err),
                Err(err) => {
                    debug!(target: "pike::graph", "skipping imports of {}: {}", dep, err);
                    Vec::new()
                }
            };
            stack.push(Frame {
                file: dep,
                deps,
                next: 0,
            });
        }
        Ok((CircularCheckResult::NoCycle, reads))
    }
}

/// Top-level symbols of a dependency: the settled analysis when it matches, else a parse.
async fn symbols_of(inner: &GraphInner, snapshot: &DocumentSnapshot) -> BridgeResult<Vec<Symbol>> {
    if let Some(result) = inner.analyses.get(&snapshot.fingerprint) {
        return Ok(result.symbols.clone());
    }
    match inner.bridge.parse(&snapshot.text, &filename_of(&snapshot.uri)).await {
        Ok(symbols) => Ok(symbols),
        Err(err) if err.is_process_failure() => Err(err),
        Err(err) => {
            debug!(target: "pike::graph", "cannot parse {}: {}", snapshot.uri, err);
            Ok(Vec::new())
        }
    }
}
