//! Data shapes exchanged with the analysis process and handed to consumers.
//!
//! Everything here is immutable once produced: a new edit yields a new
//! [`AnalysisResult`] under a new fingerprint rather than a mutation of the old one.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// Zero-based line/character position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Single-line range covering `len` characters from `start`.
    pub fn at(start: Position, len: u32) -> Self {
        Self {
            start,
            end: Position::new(start.line, start.character + len),
        }
    }

    /// Inclusive on both ends, matching how editors place a cursor on a closing brace.
    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos <= self.end
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        self.contains(other.start) && self.contains(other.end)
    }
}

/// Kind-specific payload of a [`Symbol`]; each variant carries only what is meaningful for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SymbolKind {
    Function {
        #[serde(default)]
        signature: Option<String>,
        /// Declaration only (`extern void f();`); never a definition site.
        #[serde(default)]
        is_extern: bool,
        #[serde(default)]
        children: Vec<Symbol>,
    },
    Method {
        #[serde(default)]
        signature: Option<String>,
        #[serde(default)]
        children: Vec<Symbol>,
    },
    Class {
        #[serde(default)]
        children: Vec<Symbol>,
    },
    Module {
        #[serde(default)]
        children: Vec<Symbol>,
    },
    Enum {
        #[serde(default)]
        children: Vec<Symbol>,
    },
    Variable {
        #[serde(default)]
        type_name: Option<String>,
    },
    Constant {
        #[serde(default)]
        type_name: Option<String>,
    },
    Typedef {
        #[serde(default)]
        type_name: Option<String>,
    },
    /// `inherit Target;` edge declared inside a class or program.
    Inherit { target: String },
}

impl SymbolKind {
    pub fn label(&self) -> &'static str {
        match self {
            SymbolKind::Function { .. } => "function",
            SymbolKind::Method { .. } => "method",
            SymbolKind::Class { .. } => "class",
            SymbolKind::Module { .. } => "module",
            SymbolKind::Enum { .. } => "enum",
            SymbolKind::Variable { .. } => "variable",
            SymbolKind::Constant { .. } => "constant",
            SymbolKind::Typedef { .. } => "typedef",
            SymbolKind::Inherit { .. } => "inherit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub range: Range,
    pub selection_range: Range,
    #[serde(flatten)]
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn children(&self) -> &[Symbol] {
        match &self.kind {
            SymbolKind::Function { children, .. }
            | SymbolKind::Method { children, .. }
            | SymbolKind::Class { children }
            | SymbolKind::Module { children }
            | SymbolKind::Enum { children } => children,
            SymbolKind::Variable { .. }
            | SymbolKind::Constant { .. }
            | SymbolKind::Typedef { .. }
            | SymbolKind::Inherit { .. } => &[],
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<Symbol>> {
        match &mut self.kind {
            SymbolKind::Function { children, .. }
            | SymbolKind::Method { children, .. }
            | SymbolKind::Class { children }
            | SymbolKind::Module { children }
            | SymbolKind::Enum { children } => Some(children),
            SymbolKind::Variable { .. }
            | SymbolKind::Constant { .. }
            | SymbolKind::Typedef { .. }
            | SymbolKind::Inherit { .. } => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self.kind, SymbolKind::Function { .. } | SymbolKind::Method { .. })
    }

    pub fn is_type(&self) -> bool {
        matches!(self.kind, SymbolKind::Class { .. } | SymbolKind::Module { .. })
    }

    /// Declarations that make a name available without defining it.
    pub fn is_declaration_only(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Function { is_extern: true, .. } | SymbolKind::Inherit { .. }
        )
    }

    /// Enforce `selection_range ⊆ range` on this symbol and all descendants.
    pub fn normalized(mut self) -> Self {
        let mut stack: Vec<&mut Symbol> = vec![&mut self];
        while let Some(sym) = stack.pop() {
            if !sym.range.contains_range(&sym.selection_range) {
                sym.selection_range = Range::new(sym.range.start, sym.range.start);
            }
            if let Some(children) = sym.children_mut() {
                stack.extend(children.iter_mut());
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: Severity,
    pub message: String,
}

/// Output of one analysis of one content state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    /// Every occurrence of every identifier, used for reference and call-site lookup.
    #[serde(default)]
    pub symbol_positions: HashMap<String, Vec<Position>>,
}

impl AnalysisResult {
    pub fn normalized(mut self) -> Self {
        self.symbols = self.symbols.into_iter().map(Symbol::normalized).collect();
        self
    }

    /// Pre-order walk over the symbol forest, without recursion.
    pub fn walk(&self) -> SymbolWalk<'_> {
        SymbolWalk {
            stack: self.symbols.iter().rev().collect(),
        }
    }

    /// First definition (not an `extern` declaration or inherit edge) carrying `name`.
    pub fn find_definition(&self, name: &str) -> Option<&Symbol> {
        self.walk()
            .find(|sym| sym.name == name && !sym.is_declaration_only())
    }

    pub fn defines(&self, name: &str) -> bool {
        self.find_definition(name).is_some()
    }

    /// Innermost symbol whose defining range contains `pos` and that satisfies `accept`.
    pub fn innermost_at(&self, pos: Position, accept: impl Fn(&Symbol) -> bool) -> Option<&Symbol> {
        let mut best: Option<&Symbol> = None;
        let mut level: &[Symbol] = &self.symbols;
        loop {
            let Some(hit) = level.iter().find(|sym| sym.range.contains(pos)) else {
                break;
            };
            if accept(hit) {
                best = Some(hit);
            }
            level = hit.children();
        }
        best
    }

    pub fn occurrences(&self, name: &str) -> &[Position] {
        self.symbol_positions
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

pub struct SymbolWalk<'a> {
    stack: Vec<&'a Symbol>,
}

impl<'a> Iterator for SymbolWalk<'a> {
    type Item = &'a Symbol;

    fn next(&mut self) -> Option<Self::Item> {
        let sym = self.stack.pop()?;
        self.stack.extend(sym.children().iter().rev());
        Some(sym)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    Include,
    Import,
    Inherit,
    Require,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Include => "include",
            ImportKind::Import => "import",
            ImportKind::Inherit => "inherit",
            ImportKind::Require => "require",
        }
    }
}

/// A declared dependency; `resolved_path` is `None` when the target could not be located.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportEdge {
    pub kind: ImportKind,
    pub declared_target: String,
    #[serde(default)]
    pub resolved_path: Option<PathBuf>,
    #[serde(default)]
    pub range: Option<Range>,
}

impl ImportEdge {
    pub fn resolved_uri(&self) -> Option<Url> {
        self.resolved_path
            .as_ref()
            .and_then(|p| Url::from_file_path(p).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallSymbol {
    pub symbol: Symbol,
    pub source: Url,
    /// Number of edges between the requesting document and `source`.
    pub depth: usize,
    pub via: ImportKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallSymbolSet {
    pub content_hash: u64,
    pub depth: usize,
    pub symbols: Vec<WaterfallSymbol>,
}

impl WaterfallSymbolSet {
    pub fn get(&self, name: &str) -> Option<&WaterfallSymbol> {
        self.symbols.iter().find(|s| s.symbol.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CircularCheckResult {
    NoCycle,
    /// Files along the cycle; the first and last entries are the same file.
    Cycle { path: Vec<Url> },
}

impl CircularCheckResult {
    pub fn has_cycle(&self) -> bool {
        matches!(self, CircularCheckResult::Cycle { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetadata {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub type_signature: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionResult {
    #[serde(default)]
    pub symbols: Vec<SymbolMetadata>,
    #[serde(default)]
    pub inherits: Vec<String>,
}

/// Entry of the runtime's versioned standard-library index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdlibSymbol {
    pub path: String,
    pub kind: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}
