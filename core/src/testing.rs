//! Scripted stand-in for the analysis process, attached through the launcher seam.
//!
//! It answers every bridge operation from a line-oriented regex scan of Pike-like
//! source, which is enough structure for the caches and resolvers to work on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, WriteHalf};
use tokio::io::DuplexStream;

use crate::bridge::message::{SourceParams, WireRequest, WireResponse};
use crate::bridge::{AnalysisBridge, Connection, Launcher};
use crate::error::{BridgeError, BridgeResult};
use crate::model::{
    AnalysisResult, CircularCheckResult, Diagnostic, ImportEdge, ImportKind, Position, Range, Severity, Symbol,
    SymbolKind, SymbolMetadata,
};

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\s*)(extern\s+)?(?:(?:static|public|private|protected|local|final|inline)\s+)*([A-Za-z_][\w.]*)\s+([A-Za-z_]\w*)\s*\(([^)]*)\)\s*(\{|;)?",
    )
    .unwrap()
});
static CLASS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)class\s+([A-Za-z_]\w*)\s*(\{)?").unwrap());
static INHERIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^(\s*)inherit\s+"?([\w./]+)"?\s*;"#).unwrap());
static INCLUDE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^(\s*)#include\s+["<]([^">]+)[">]"#).unwrap());
static IMPORT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)import\s+([\w.]+)\s*;").unwrap());
static VARIABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(int|float|string|mapping|array|multiset|object|mixed)\b[^(=;]*?\b([A-Za-z_]\w*)\s*(=|;)").unwrap()
});
static WARNING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*#warning\s+(.*)$").unwrap());
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_]\w*").unwrap());
static STRING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""[^"]*""#).unwrap());

const KEYWORDS: &[&str] = &[
    "void", "int", "float", "string", "mapping", "array", "multiset", "object", "mixed", "program", "function",
    "class", "inherit", "import", "include", "extern", "return", "if", "else", "while", "for", "foreach", "do",
    "switch", "case", "break", "continue", "static", "public", "private", "protected", "local", "final", "inline",
    "constant", "typedef", "enum", "catch", "warning",
];

const NOT_A_TYPE: &[&str] = &["return", "else", "if", "while", "for", "foreach", "switch", "case", "catch", "new"];

#[derive(Default)]
struct FakeState {
    counts: DashMap<String, usize>,
    delays: DashMap<String, Duration>,
    failures: DashMap<String, (i64, String)>,
    exit_on: Mutex<Option<String>>,
    silent_health: AtomicBool,
    refuse_launch: AtomicBool,
    launches: AtomicUsize,
    stdlib: DashMap<String, Value>,
}

/// Fake analysis process. Cloning shares the scripted behavior and counters.
#[derive(Clone, Default)]
pub(crate) struct FakeAnalyzer {
    state: Arc<FakeState>,
}

impl std::fmt::Debug for FakeAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeAnalyzer")
            .field("launches", &self.launches())
            .finish()
    }
}

impl FakeAnalyzer {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.stdlib.insert(
            "Stdio.File".to_string(),
            json!({ "path": "Stdio.File", "kind": "class", "version": "8.0" }),
        );
        fake
    }

    /// A bridge wired to this fake with short timeouts.
    pub fn bridge(&self) -> Arc<AnalysisBridge> {
        Arc::new(AnalysisBridge::new(
            Arc::new(self.clone()),
            Duration::from_secs(2),
            Duration::from_secs(5),
        ))
    }

    pub async fn started_bridge(&self) -> Arc<AnalysisBridge> {
        let bridge = self.bridge();
        bridge.start().await.expect("fake bridge starts");
        bridge
    }

    pub fn count(&self, method: &str) -> usize {
        self.state.counts.get(method).map(|c| *c).unwrap_or(0)
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn delay(&self, method: &str, by: Duration) {
        self.state.delays.insert(method.to_string(), by);
    }

    pub fn fail(&self, method: &str, code: i64, message: &str) {
        self.state
            .failures
            .insert(method.to_string(), (code, message.to_string()));
    }

    pub fn succeed(&self, method: &str) {
        self.state.failures.remove(method);
    }

    /// Drop the connection, without answering, when `method` arrives.
    pub fn exit_on(&self, method: &str) {
        *self.state.exit_on.lock() = Some(method.to_string());
    }

    pub fn stay_alive(&self) {
        *self.state.exit_on.lock() = None;
    }

    pub fn silent_health(&self, silent: bool) {
        self.state.silent_health.store(silent, Ordering::SeqCst);
    }

    pub fn refuse_launch(&self, refuse: bool) {
        self.state.refuse_launch.store(refuse, Ordering::SeqCst);
    }
}

impl Launcher for FakeAnalyzer {
    fn launch(&self) -> BridgeResult<Connection> {
        if self.state.refuse_launch.load(Ordering::SeqCst) {
            return Err(BridgeError::ProcessUnavailable("fake runtime not found".to_string()));
        }
        let n = self.state.launches.fetch_add(1, Ordering::SeqCst) + 1;
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        tokio::spawn(serve(Arc::clone(&self.state), server));
        Ok(Connection {
            reader: Box::new(client_read),
            writer: Box::new(client_write),
            child: None,
            pid: Some(40_000 + n as u32),
        })
    }
}

type SharedWriter = Arc<tokio::sync::Mutex<Option<WriteHalf<DuplexStream>>>>;

async fn serve(state: Arc<FakeState>, stream: DuplexStream) {
    let (read, write) = tokio::io::split(stream);
    let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(Some(write)));
    write_line(&writer, r#"{"message":"fake analyzer ready"}"#).await;
    write_line(&writer, "banner: not json").await;

    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(request) = serde_json::from_str::<WireRequest>(&line) else {
            continue;
        };
        *state.counts.entry(request.method.clone()).or_insert(0) += 1;

        let exit = state.exit_on.lock().as_deref() == Some(request.method.as_str());
        if exit {
            writer.lock().await.take();
            return;
        }
        if request.method == "health" && state.silent_health.load(Ordering::SeqCst) {
            continue;
        }

        let state = Arc::clone(&state);
        let writer = Arc::clone(&writer);
        tokio::spawn(async move {
            let delay = state.delays.get(&request.method).map(|d| *d);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let failure = state.failures.get(&request.method).map(|f| f.clone());
            let response = match failure {
                Some((code, message)) => WireResponse::err(request.id, code, message),
                None => match answer(&state, &request) {
                    Ok(result) => WireResponse::ok(request.id, result),
                    Err(message) => WireResponse::err(request.id, -32602, message),
                },
            };
            if let Ok(text) = serde_json::to_string(&response) {
                write_line(&writer, &text).await;
            }
        });
    }
}

async fn write_line(writer: &SharedWriter, line: &str) {
    let mut guard = writer.lock().await;
    if let Some(w) = guard.as_mut() {
        let _ = w.write_all(line.as_bytes()).await;
        let _ = w.write_all(b"\n").await;
        let _ = w.flush().await;
    }
}

fn answer(state: &FakeState, request: &WireRequest) -> Result<Value, String> {
    let source = || -> Result<SourceParams, String> {
        serde_json::from_value(request.params.clone()).map_err(|e| e.to_string())
    };
    let value = match request.method.as_str() {
        "health" => json!({ "version": "fake-8.0" }),
        "parse" => json!({ "symbols": scan(&source()?.source).symbols }),
        "compile" => serde_json::to_value(scan(&source()?.source)).map_err(|e| e.to_string())?,
        "introspect" => {
            let result = scan(&source()?.source);
            let symbols: Vec<SymbolMetadata> = result
                .symbols
                .iter()
                .filter(|s| !matches!(s.kind, SymbolKind::Inherit { .. }))
                .map(|s| SymbolMetadata {
                    name: s.name.clone(),
                    kind: s.kind.label().to_string(),
                    type_signature: match &s.kind {
                        SymbolKind::Function { signature, .. } | SymbolKind::Method { signature, .. } => {
                            signature.clone()
                        }
                        _ => None,
                    },
                    documentation: None,
                })
                .collect();
            let inherits: Vec<String> = result
                .walk()
                .filter_map(|s| match &s.kind {
                    SymbolKind::Inherit { target } => Some(target.clone()),
                    _ => None,
                })
                .collect();
            json!({ "symbols": symbols, "inherits": inherits })
        }
        "extract_imports" => json!({ "imports": scan_imports(&source()?.source) }),
        "resolve_import" => {
            let target = request.params["target"].as_str().unwrap_or_default();
            let current = request.params["current_file"].as_str().unwrap_or_default();
            json!({ "resolved_path": resolve_relative(target, Path::new(current)) })
        }
        "check_circular" => serde_json::to_value(CircularCheckResult::NoCycle).map_err(|e| e.to_string())?,
        "get_waterfall_symbols" => json!({ "symbols": [] }),
        "resolve_stdlib_symbol" => {
            let path = request.params["path"].as_str().unwrap_or_default();
            json!({ "symbol": state.stdlib.get(path).map(|v| v.clone()) })
        }
        other => return Err(format!("unknown method {other}")),
    };
    Ok(value)
}

fn resolve_relative(target: &str, current: &Path) -> Option<PathBuf> {
    let candidate = current.parent()?.join(target);
    candidate.is_file().then_some(candidate)
}

fn clean(line: &str) -> String {
    let code = line.split("//").next().unwrap_or_default();
    STRING_RE
        .replace_all(code, |caps: &regex::Captures<'_>| " ".repeat(caps[0].len()))
        .into_owned()
}

struct Node {
    symbol: Symbol,
    parent: Option<usize>,
}

/// Symbols, diagnostics and the identifier index of a Pike-like source text.
pub(crate) fn scan(source: &str) -> AnalysisResult {
    let mut nodes: Vec<Node> = Vec::new();
    let mut open: Vec<(usize, usize)> = Vec::new();
    let mut depth = 0usize;
    let mut positions: HashMap<String, Vec<Position>> = HashMap::new();
    let mut diagnostics = Vec::new();
    let mut last = Position::default();

    for (line_no, raw) in source.lines().enumerate() {
        let line_no = line_no as u32;
        last = Position::new(line_no, raw.len() as u32);
        let parent = open.last().map(|(idx, _)| *idx);

        if let Some(caps) = WARNING_RE.captures(raw) {
            diagnostics.push(Diagnostic {
                range: Range::at(Position::new(line_no, 0), raw.len() as u32),
                severity: Severity::Warning,
                message: caps[1].trim().to_string(),
            });
            continue;
        }
        let line = clean(raw);

        let mut opens_at: Option<usize> = None;
        if let Some(caps) = CLASS_RE.captures(&line) {
            let name = caps.get(2).map(|m| (m.as_str(), m.start())).unwrap_or_default();
            opens_at = caps.get(3).map(|m| m.start());
            nodes.push(node(
                name,
                line_no,
                caps[1].len(),
                SymbolKind::Class { children: Vec::new() },
                parent,
            ));
        } else if let Some(caps) = INHERIT_RE.captures(raw) {
            let target = caps[2].to_string();
            let start = caps.get(2).map(|m| m.start()).unwrap_or_default();
            let mut n = node((&target, start), line_no, caps[1].len(), SymbolKind::Inherit { target: target.clone() }, parent);
            n.symbol.range.end = Position::new(line_no, raw.trim_end().len() as u32);
            nodes.push(n);
        } else if let Some(caps) = FUNCTION_RE.captures(&line).filter(|c| !NOT_A_TYPE.contains(&&c[3])) {
            let is_extern = caps.get(2).is_some();
            let name = caps.get(4).map(|m| (m.as_str(), m.start())).unwrap_or_default();
            let signature = format!("{} {}({})", &caps[3], name.0, caps[5].trim());
            let in_class = parent.is_some_and(|p| matches!(nodes[p].symbol.kind, SymbolKind::Class { .. }));
            let kind = if in_class && !is_extern {
                SymbolKind::Method {
                    signature: Some(signature),
                    children: Vec::new(),
                }
            } else {
                SymbolKind::Function {
                    signature: Some(signature),
                    is_extern,
                    children: Vec::new(),
                }
            };
            let terminator = caps.get(6);
            opens_at = terminator.filter(|m| m.as_str() == "{").map(|m| m.start());
            let mut n = node(name, line_no, caps[1].len(), kind, parent);
            if let Some(t) = terminator.filter(|m| m.as_str() == ";") {
                n.symbol.range.end = Position::new(line_no, t.end() as u32);
            }
            nodes.push(n);
        } else if let Some(caps) = VARIABLE_RE.captures(&line).filter(|_| parent.is_none()) {
            let name = caps.get(3).map(|m| (m.as_str(), m.start())).unwrap_or_default();
            let mut n = node(
                name,
                line_no,
                caps[1].len(),
                SymbolKind::Variable {
                    type_name: Some(caps[2].to_string()),
                },
                parent,
            );
            n.symbol.range.end = Position::new(line_no, line.trim_end().len() as u32);
            nodes.push(n);
        }

        for m in IDENT_RE.find_iter(&line) {
            if KEYWORDS.contains(&m.as_str()) {
                continue;
            }
            positions
                .entry(m.as_str().to_string())
                .or_default()
                .push(Position::new(line_no, m.start() as u32));
        }

        for (col, ch) in line.char_indices() {
            match ch {
                '{' => {
                    depth += 1;
                    if opens_at == Some(col) {
                        open.push((nodes.len() - 1, depth));
                    }
                }
                '}' => {
                    if let Some(&(idx, d)) = open.last() {
                        if d == depth {
                            nodes[idx].symbol.range.end = Position::new(line_no, col as u32 + 1);
                            open.pop();
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            }
        }
    }

    for (idx, _) in open.drain(..) {
        nodes[idx].symbol.range.end = last;
        diagnostics.push(Diagnostic {
            range: Range::new(last, last),
            severity: Severity::Error,
            message: format!("missing '}}' for '{}'", nodes[idx].symbol.name),
        });
    }

    AnalysisResult {
        symbols: assemble(nodes),
        diagnostics,
        symbol_positions: positions,
    }
    .normalized()
}

fn node(name: (&str, usize), line: u32, indent: usize, kind: SymbolKind, parent: Option<usize>) -> Node {
    let start = Position::new(line, indent as u32);
    let selection = Range::at(Position::new(line, name.1 as u32), name.0.len() as u32);
    Node {
        symbol: Symbol {
            name: name.0.to_string(),
            range: Range::new(start, selection.end),
            selection_range: selection,
            kind,
        },
        parent,
    }
}

// Children always come after their parent, so folding back to front keeps source order.
fn assemble(nodes: Vec<Node>) -> Vec<Symbol> {
    let parents: Vec<Option<usize>> = nodes.iter().map(|n| n.parent).collect();
    let mut slots: Vec<Option<Symbol>> = nodes.into_iter().map(|n| Some(n.symbol)).collect();
    let mut roots = Vec::new();
    for idx in (0..slots.len()).rev() {
        let Some(symbol) = slots[idx].take() else { continue };
        match parents[idx] {
            Some(p) => {
                if let Some(parent) = slots[p].as_mut() {
                    if let SymbolKind::Function { children, .. }
                    | SymbolKind::Method { children, .. }
                    | SymbolKind::Class { children }
                    | SymbolKind::Module { children }
                    | SymbolKind::Enum { children } = &mut parent.kind
                    {
                        children.insert(0, symbol);
                    }
                }
            }
            None => roots.push(symbol),
        }
    }
    roots.reverse();
    roots
}

/// Declared dependencies, unresolved.
pub(crate) fn scan_imports(source: &str) -> Vec<ImportEdge> {
    let mut edges = Vec::new();
    for (line_no, line) in source.lines().enumerate() {
        let line_no = line_no as u32;
        let (kind, caps) = if let Some(caps) = INCLUDE_RE.captures(line) {
            (ImportKind::Include, caps)
        } else if let Some(caps) = INHERIT_RE.captures(line) {
            (ImportKind::Inherit, caps)
        } else if let Some(caps) = IMPORT_RE.captures(line) {
            (ImportKind::Import, caps)
        } else {
            continue;
        };
        let Some(target) = caps.get(2) else { continue };
        edges.push(ImportEdge {
            kind,
            declared_target: target.as_str().to_string(),
            resolved_path: None,
            range: Some(Range::at(
                Position::new(line_no, target.start() as u32),
                target.as_str().len() as u32,
            )),
        });
    }
    edges
}
