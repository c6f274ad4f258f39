use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::config::CoreConfig;
use crate::model::ImportKind;

const SOURCE_EXTENSIONS: &[&str] = &["pike", "pmod", "h", "c"];
const MODULE_ENTRY: &str = "module.pmod";

/// Filesystem lookup of import targets, following the language's search rules.
///
/// Quoted targets (`#include "x.h"`, `inherit "base.pike"`) are paths relative
/// to the current file, then to the include paths. Identifier targets
/// (`Foo`, `Foo.Bar`) are modules looked up under the current directory and
/// then each module root.
#[derive(Debug, Clone, Default)]
pub struct ImportProber {
    include_paths: Vec<PathBuf>,
    module_roots: Vec<PathBuf>,
}

impl ImportProber {
    pub fn new(include_paths: Vec<PathBuf>, module_roots: Vec<PathBuf>) -> Self {
        Self {
            include_paths,
            module_roots,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.include_paths.clone(), config.module_roots())
    }

    /// Concrete file for `target` as declared in `current_file`, or `None`.
    pub fn resolve(&self, kind: ImportKind, target: &str, current_file: &Path) -> Option<PathBuf> {
        let target = unquote(target);
        if target.is_empty() {
            return None;
        }
        let current_dir = current_file.parent()?;
        if kind == ImportKind::Include || is_path_like(target) {
            self.resolve_path(kind, target, current_dir)
        } else {
            self.resolve_module(target, current_dir)
        }
    }

    fn resolve_path(&self, kind: ImportKind, target: &str, current_dir: &Path) -> Option<PathBuf> {
        let target = Path::new(target);
        if target.is_absolute() {
            return target.is_file().then(|| normalize(target));
        }
        let extra = if kind == ImportKind::Include {
            &self.include_paths
        } else {
            &self.module_roots
        };
        std::iter::once(current_dir)
            .chain(extra.iter().map(PathBuf::as_path))
            .map(|dir| normalize(&dir.join(target)))
            .find(|candidate| candidate.is_file())
    }

    fn resolve_module(&self, target: &str, current_dir: &Path) -> Option<PathBuf> {
        let segments: Vec<&str> = target.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        let (last, parents) = segments.split_last()?;
        std::iter::once(current_dir)
            .chain(self.module_roots.iter().map(PathBuf::as_path))
            .find_map(|root| {
                let mut base = root.to_path_buf();
                for parent in parents {
                    base.push(format!("{parent}.pmod"));
                }
                [
                    base.join(format!("{last}.pmod")),
                    base.join(format!("{last}.pike")),
                    base.join(format!("{last}.pmod")).join(MODULE_ENTRY),
                ]
                .into_iter()
                .find(|candidate| candidate.is_file())
            })
    }
}

/// First candidate whose path ends with the segments of `target`.
///
/// Matching is per whole segment: `Foo.Bar` matches `.../Foo.pmod/Bar.pike`
/// but not `.../FooBar.pike`. An empty target matches nothing.
pub fn match_module_path<'a>(target: &str, candidates: impl IntoIterator<Item = &'a Url>) -> Option<&'a Url> {
    let wanted = target_segments(target)?;
    candidates.into_iter().find(|uri| {
        let have = uri_segments(uri);
        have.len() >= wanted.len() && have[have.len() - wanted.len()..] == wanted[..]
    })
}

fn target_segments(target: &str) -> Option<Vec<String>> {
    let target = unquote(target);
    let raw: Vec<&str> = if is_path_like(target) {
        target
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .collect()
    } else {
        target.split('.').collect()
    };
    if raw.is_empty() || raw.iter().any(|s| s.is_empty()) {
        return None;
    }
    let mut segments: Vec<String> = raw.into_iter().map(strip_extension).collect();
    if segments.last().map(String::as_str) == Some("module") && target.ends_with(MODULE_ENTRY) {
        segments.pop();
    }
    (!segments.is_empty()).then_some(segments)
}

fn uri_segments(uri: &Url) -> Vec<String> {
    let mut segments: Vec<String> = match uri.to_file_path() {
        Ok(path) => path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect(),
        Err(()) => uri
            .path_segments()
            .map(|it| it.filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default(),
    };
    if segments.last().map(String::as_str) == Some(MODULE_ENTRY) {
        segments.pop();
    }
    segments.into_iter().map(|s| strip_extension(&s)).collect()
}

fn strip_extension(segment: &str) -> String {
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && SOURCE_EXTENSIONS.contains(&ext) => stem.to_string(),
        _ => segment.to_string(),
    }
}

fn unquote(target: &str) -> &str {
    let t = target.trim();
    t.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| t.strip_prefix('<').and_then(|s| s.strip_suffix('>')))
        .unwrap_or(t)
}

fn is_path_like(target: &str) -> bool {
    target.contains('/')
        || target.contains('\\')
        || target
            .rsplit_once('.')
            .is_some_and(|(_, ext)| SOURCE_EXTENSIONS.contains(&ext))
}

// Lexical `.`/`..` folding; the file may not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
