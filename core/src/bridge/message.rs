use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{
    AnalysisResult, CircularCheckResult, ImportEdge, ImportKind, IntrospectionResult, StdlibSymbol, Symbol,
    WaterfallSymbol,
};

/// Operations understood by the analysis process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Health,
    Parse,
    Compile,
    Introspect,
    ExtractImports,
    ResolveImport,
    CheckCircular,
    GetWaterfallSymbols,
    ResolveStdlibSymbol,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Health,
        Operation::Parse,
        Operation::Compile,
        Operation::Introspect,
        Operation::ExtractImports,
        Operation::ResolveImport,
        Operation::CheckCircular,
        Operation::GetWaterfallSymbols,
        Operation::ResolveStdlibSymbol,
    ];

    pub fn method(&self) -> &'static str {
        match self {
            Operation::Health => "health",
            Operation::Parse => "parse",
            Operation::Compile => "compile",
            Operation::Introspect => "introspect",
            Operation::ExtractImports => "extract_imports",
            Operation::ResolveImport => "resolve_import",
            Operation::CheckCircular => "check_circular",
            Operation::GetWaterfallSymbols => "get_waterfall_symbols",
            Operation::ResolveStdlibSymbol => "resolve_stdlib_symbol",
        }
    }

    pub fn from_method(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.method() == method)
    }
}

/// One outbound line. The id is echoed back by the process and is the only correlation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// One inbound line: a response (id set) or a log notification (id absent).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WireResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn err(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            error: Some(WireError {
                code,
                message: message.into(),
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceParams {
    pub source: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveImportParams {
    pub kind: ImportKind,
    pub target: String,
    pub current_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallParams {
    pub source: String,
    pub filename: String,
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdlibParams {
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthInfo {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseReply {
    #[serde(default)]
    pub symbols: Vec<Symbol>,
}

pub type CompileReply = AnalysisResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractImportsReply {
    #[serde(default)]
    pub imports: Vec<ImportEdge>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveImportReply {
    #[serde(default)]
    pub resolved_path: Option<PathBuf>,
}

pub type CheckCircularReply = CircularCheckResult;

pub type IntrospectReply = IntrospectionResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaterfallReply {
    #[serde(default)]
    pub symbols: Vec<WaterfallSymbol>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StdlibReply {
    #[serde(default)]
    pub symbol: Option<StdlibSymbol>,
}
