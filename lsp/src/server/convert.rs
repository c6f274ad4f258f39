use pike_lsp_core::hierarchy::{IncomingCall, ItemKind, OutgoingCall};
use pike_lsp_core::model::{self, ImportEdge, Severity, Symbol};
use pike_lsp_core::{HierarchyItem, TextChange};
use serde_json::{json, Value};
use tower_lsp::lsp_types::{
    self as lsp, CallHierarchyIncomingCall, CallHierarchyItem, CallHierarchyOutgoingCall, DiagnosticSeverity,
    DocumentLink, DocumentSymbol, SymbolKind, TextDocumentContentChangeEvent, TypeHierarchyItem,
};

pub(crate) const DIAGNOSTIC_SOURCE: &str = "pike";

pub(crate) fn to_lsp_position(pos: model::Position) -> lsp::Position {
    lsp::Position::new(pos.line, pos.character)
}

pub(crate) fn from_lsp_position(pos: lsp::Position) -> model::Position {
    model::Position::new(pos.line, pos.character)
}

pub(crate) fn to_lsp_range(range: model::Range) -> lsp::Range {
    lsp::Range::new(to_lsp_position(range.start), to_lsp_position(range.end))
}

pub(crate) fn from_lsp_range(range: lsp::Range) -> model::Range {
    model::Range::new(from_lsp_position(range.start), from_lsp_position(range.end))
}

pub(crate) fn to_text_change(change: TextDocumentContentChangeEvent) -> TextChange {
    TextChange {
        range: change.range.map(from_lsp_range),
        text: change.text,
    }
}

pub(crate) fn to_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Information => DiagnosticSeverity::INFORMATION,
        Severity::Hint => DiagnosticSeverity::HINT,
    }
}

pub(crate) fn to_diagnostic(diag: &model::Diagnostic) -> lsp::Diagnostic {
    lsp::Diagnostic {
        range: to_lsp_range(diag.range),
        severity: Some(to_severity(diag.severity)),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: diag.message.clone(),
        ..Default::default()
    }
}

/// Stand-in diagnostic when the analysis process cannot answer at all.
pub(crate) fn unavailable_diagnostic(reason: &str) -> lsp::Diagnostic {
    lsp::Diagnostic {
        range: lsp::Range::default(),
        severity: Some(DiagnosticSeverity::WARNING),
        source: Some(DIAGNOSTIC_SOURCE.to_string()),
        message: format!("Pike analysis unavailable: {reason}"),
        ..Default::default()
    }
}

pub(crate) fn to_symbol_kind(kind: &model::SymbolKind) -> SymbolKind {
    match kind {
        model::SymbolKind::Function { .. } => SymbolKind::FUNCTION,
        model::SymbolKind::Method { .. } => SymbolKind::METHOD,
        model::SymbolKind::Class { .. } => SymbolKind::CLASS,
        model::SymbolKind::Module { .. } => SymbolKind::MODULE,
        model::SymbolKind::Enum { .. } => SymbolKind::ENUM,
        model::SymbolKind::Variable { .. } => SymbolKind::VARIABLE,
        model::SymbolKind::Constant { .. } => SymbolKind::CONSTANT,
        model::SymbolKind::Typedef { .. } => SymbolKind::TYPE_PARAMETER,
        model::SymbolKind::Inherit { .. } => SymbolKind::NAMESPACE,
    }
}

fn symbol_detail(kind: &model::SymbolKind) -> Option<String> {
    match kind {
        model::SymbolKind::Function { signature, .. } | model::SymbolKind::Method { signature, .. } => {
            signature.clone()
        }
        model::SymbolKind::Variable { type_name }
        | model::SymbolKind::Constant { type_name }
        | model::SymbolKind::Typedef { type_name } => type_name.clone(),
        model::SymbolKind::Inherit { target } => Some(format!("inherit {target}")),
        model::SymbolKind::Class { .. } | model::SymbolKind::Module { .. } | model::SymbolKind::Enum { .. } => None,
    }
}

#[allow(deprecated)]
pub(crate) fn to_document_symbol(symbol: &Symbol) -> DocumentSymbol {
    let children: Vec<DocumentSymbol> = symbol.children().iter().map(to_document_symbol).collect();
    DocumentSymbol {
        name: symbol.name.clone(),
        detail: symbol_detail(&symbol.kind),
        kind: to_symbol_kind(&symbol.kind),
        tags: None,
        deprecated: None,
        range: to_lsp_range(symbol.range),
        selection_range: to_lsp_range(symbol.selection_range),
        children: if children.is_empty() { None } else { Some(children) },
    }
}

/// A link per resolved import edge. Edges without a location or a target produce nothing.
pub(crate) fn to_document_link(edge: &ImportEdge) -> Option<DocumentLink> {
    let range = edge.range?;
    let target = edge.resolved_uri()?;
    Some(DocumentLink {
        range: to_lsp_range(range),
        target: Some(target),
        tooltip: Some(format!("{} {}", edge.kind.as_str(), edge.declared_target)),
        data: None,
    })
}

fn item_kind_label(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Function => "function",
        ItemKind::Method => "method",
        ItemKind::Class => "class",
        ItemKind::Module => "module",
        ItemKind::Program => "program",
    }
}

fn item_kind_from_label(label: &str) -> Option<ItemKind> {
    Some(match label {
        "function" => ItemKind::Function,
        "method" => ItemKind::Method,
        "class" => ItemKind::Class,
        "module" => ItemKind::Module,
        "program" => ItemKind::Program,
        _ => return None,
    })
}

fn item_symbol_kind(kind: ItemKind) -> SymbolKind {
    match kind {
        ItemKind::Function => SymbolKind::FUNCTION,
        ItemKind::Method => SymbolKind::METHOD,
        ItemKind::Class => SymbolKind::CLASS,
        ItemKind::Module => SymbolKind::MODULE,
        ItemKind::Program => SymbolKind::FILE,
    }
}

// Editors echo `data` back on follow-up hierarchy requests, which is how the
// program/class distinction survives the round trip.
fn item_data(kind: ItemKind) -> Value {
    json!({ "kind": item_kind_label(kind) })
}

fn kind_from_data(data: Option<&Value>, fallback: SymbolKind) -> ItemKind {
    let labelled = data
        .and_then(|d| d.get("kind"))
        .and_then(Value::as_str)
        .and_then(item_kind_from_label);
    labelled.unwrap_or(match fallback {
        SymbolKind::METHOD => ItemKind::Method,
        SymbolKind::CLASS => ItemKind::Class,
        SymbolKind::MODULE => ItemKind::Module,
        SymbolKind::FILE => ItemKind::Program,
        _ => ItemKind::Function,
    })
}

pub(crate) fn to_call_item(item: &HierarchyItem) -> CallHierarchyItem {
    CallHierarchyItem {
        name: item.name.clone(),
        kind: item_symbol_kind(item.kind),
        tags: None,
        detail: item.detail.clone(),
        uri: item.uri.clone(),
        range: to_lsp_range(item.range),
        selection_range: to_lsp_range(item.selection_range),
        data: Some(item_data(item.kind)),
    }
}

pub(crate) fn from_call_item(item: &CallHierarchyItem) -> HierarchyItem {
    HierarchyItem {
        name: item.name.clone(),
        kind: kind_from_data(item.data.as_ref(), item.kind),
        uri: item.uri.clone(),
        range: from_lsp_range(item.range),
        selection_range: from_lsp_range(item.selection_range),
        detail: item.detail.clone(),
    }
}

pub(crate) fn to_type_item(item: &HierarchyItem) -> TypeHierarchyItem {
    TypeHierarchyItem {
        name: item.name.clone(),
        kind: item_symbol_kind(item.kind),
        tags: None,
        detail: item.detail.clone(),
        uri: item.uri.clone(),
        range: to_lsp_range(item.range),
        selection_range: to_lsp_range(item.selection_range),
        data: Some(item_data(item.kind)),
    }
}

pub(crate) fn from_type_item(item: &TypeHierarchyItem) -> HierarchyItem {
    HierarchyItem {
        name: item.name.clone(),
        kind: kind_from_data(item.data.as_ref(), item.kind),
        uri: item.uri.clone(),
        range: from_lsp_range(item.range),
        selection_range: from_lsp_range(item.selection_range),
        detail: item.detail.clone(),
    }
}

pub(crate) fn to_incoming_call(call: &IncomingCall) -> CallHierarchyIncomingCall {
    CallHierarchyIncomingCall {
        from: to_call_item(&call.from),
        from_ranges: call.from_ranges.iter().copied().map(to_lsp_range).collect(),
    }
}

pub(crate) fn to_outgoing_call(call: &OutgoingCall) -> CallHierarchyOutgoingCall {
    CallHierarchyOutgoingCall {
        to: to_call_item(&call.to),
        from_ranges: call.from_ranges.iter().copied().map(to_lsp_range).collect(),
    }
}
