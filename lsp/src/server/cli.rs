use std::path::{Component, Path};

use anyhow::Context;
use pike_lsp_core::model::Severity;
use pike_lsp_core::{AnalysisService, CoreConfig};
use tower_lsp::lsp_types::Url;

const USAGE: &str = "Usage: pike-lsp --analyze [--errors-only] <relative-file-path>\n  --analyze <file>     : Full analysis with JSON output\n  --errors-only        : Show only errors in simple format";

/// One-shot `--analyze` mode. `Ok(None)` when the binary should run as a language server.
pub(crate) async fn try_cli_analyze() -> anyhow::Result<Option<String>> {
    let args: Vec<String> = std::env::args().collect();
    analyze_args(&args).await
}

pub(crate) async fn analyze_args(args: &[String]) -> anyhow::Result<Option<String>> {
    let Some(i) = args.iter().position(|a| a == "--analyze") else {
        return Ok(None);
    };
    let path = args[i + 1..]
        .iter()
        .find(|a| !a.starts_with("--"))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!(USAGE))?;
    let errors_only = args.iter().any(|a| a == "--errors-only");

    let content = read_file_content(&path)?;
    let absolute = std::fs::canonicalize(&path).with_context(|| format!("Failed to resolve '{}'", path))?;
    let uri = Url::from_file_path(&absolute).map_err(|_| anyhow::anyhow!("Not a file path: {}", absolute.display()))?;

    let service = AnalysisService::new(CoreConfig::from_env());
    service.open(uri.clone(), 0, &content);
    let output = render(&service, &uri, errors_only).await;
    service.shutdown().await;
    output.map(Some)
}

async fn render(service: &AnalysisService, uri: &Url, errors_only: bool) -> anyhow::Result<String> {
    let analysis = service
        .analyze(uri)
        .await
        .context("analysis failed")?
        .ok_or_else(|| anyhow::anyhow!("Nothing to analyze at {}", uri))?;

    if errors_only {
        let errors: Vec<String> = analysis
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| {
                format!(
                    "Line {}:{}: {}",
                    d.range.start.line + 1,
                    d.range.start.character + 1,
                    d.message
                )
            })
            .collect();
        if errors.is_empty() {
            return Ok("No errors found".to_string());
        }
        return Ok(errors.join("\n"));
    }

    let imports = service.imports(uri).await.context("import extraction failed")?;
    let output = serde_json::json!({
        "diagnostics": analysis.diagnostics,
        "symbols": analysis.symbols,
        "imports": imports.map(|set| set.edges.clone()).unwrap_or_default(),
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

pub(crate) fn is_safe_path(path: &str) -> bool {
    let path = Path::new(path);

    if path.as_os_str().is_empty() {
        return false;
    }
    if path.is_absolute() {
        return false;
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return false;
    }

    let s = path.to_string_lossy();
    let suspicious = ['\0', '\n', '\r', '\t'];
    if s.chars().any(|c| suspicious.contains(&c)) {
        return false;
    }
    // Windows drive prefix such as `C:`
    if s.len() >= 2 && s.as_bytes()[1] == b':' {
        return false;
    }
    true
}

pub(crate) fn read_file_content(path: &str) -> anyhow::Result<String> {
    if !is_safe_path(path) {
        return Err(anyhow::anyhow!("Unsafe file path: {}", path));
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read file '{}'", path))
}
