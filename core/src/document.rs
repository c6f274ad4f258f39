use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use ropey::Rope;
use twox_hash::XxHash64;
use url::Url;

use crate::model::{Position, Range};

/// Identity of one content state of one document.
///
/// Open documents are keyed by the editor's edit version, closed ones by what
/// the filesystem reports. The two forms never compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentFingerprint {
    Versioned { uri: Url, version: i32 },
    Stat { uri: Url, size: u64, modified: SystemTime },
}

impl DocumentFingerprint {
    pub fn versioned(uri: Url, version: i32) -> Self {
        DocumentFingerprint::Versioned { uri, version }
    }

    pub fn uri(&self) -> &Url {
        match self {
            DocumentFingerprint::Versioned { uri, .. } | DocumentFingerprint::Stat { uri, .. } => uri,
        }
    }

    /// Stat-based fingerprint for an on-disk file; `None` when the file cannot be stat'ed.
    pub async fn from_disk(uri: &Url) -> Option<Self> {
        let path = uri.to_file_path().ok()?;
        let meta = tokio::fs::metadata(&path).await.ok()?;
        Some(DocumentFingerprint::Stat {
            uri: uri.clone(),
            size: meta.len(),
            modified: meta.modified().ok()?,
        })
    }
}

/// Fast, order-sensitive, deterministic fingerprint of document text.
pub fn content_hash(content: &str) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    content.hash(&mut hasher);
    hasher.finish()
}

/// Incremental (`range` set) or full-text (`range` absent) edit.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChange {
    pub range: Option<Range>,
    pub text: String,
}

/// Text of an open document as last reported by the editor.
#[derive(Debug, Clone)]
pub struct OpenDocument {
    pub text: Rope,
    pub version: i32,
}

/// Text and fingerprint of one document, whether open or read from disk.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub uri: Url,
    pub text: Arc<str>,
    pub fingerprint: DocumentFingerprint,
}

impl DocumentSnapshot {
    pub fn content_hash(&self) -> u64 {
        content_hash(&self.text)
    }
}

/// Open-document overlay over the filesystem.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<Url, OpenDocument>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, uri: Url, version: i32, text: &str) -> DocumentFingerprint {
        self.documents.insert(
            uri.clone(),
            OpenDocument {
                text: Rope::from_str(text),
                version,
            },
        );
        DocumentFingerprint::versioned(uri, version)
    }

    /// Apply editor changes in order. Returns `None` if the document is not open.
    pub fn change(&self, uri: &Url, version: i32, changes: &[TextChange]) -> Option<DocumentFingerprint> {
        let mut doc = self.documents.get_mut(uri)?;
        for change in changes {
            apply_change(&mut doc.text, change);
        }
        doc.version = version;
        Some(DocumentFingerprint::versioned(uri.clone(), version))
    }

    pub fn close(&self, uri: &Url) -> bool {
        self.documents.remove(uri).is_some()
    }

    pub fn is_open(&self, uri: &Url) -> bool {
        self.documents.contains_key(uri)
    }

    pub fn open_uris(&self) -> Vec<Url> {
        let mut uris: Vec<Url> = self.documents.iter().map(|e| e.key().clone()).collect();
        uris.sort();
        uris
    }

    pub fn fingerprint(&self, uri: &Url) -> Option<DocumentFingerprint> {
        let doc = self.documents.get(uri)?;
        Some(DocumentFingerprint::versioned(uri.clone(), doc.version))
    }

    /// Snapshot of an open document without touching the filesystem.
    pub fn snapshot(&self, uri: &Url) -> Option<DocumentSnapshot> {
        let doc = self.documents.get(uri)?;
        Some(DocumentSnapshot {
            uri: uri.clone(),
            text: Arc::from(doc.text.to_string()),
            fingerprint: DocumentFingerprint::versioned(uri.clone(), doc.version),
        })
    }

    /// Open text if the editor has the document, otherwise the file on disk.
    pub async fn read(&self, uri: &Url) -> Option<DocumentSnapshot> {
        if let Some(snapshot) = self.snapshot(uri) {
            return Some(snapshot);
        }
        let path: PathBuf = uri.to_file_path().ok()?;
        let fingerprint = DocumentFingerprint::from_disk(uri).await?;
        let text = tokio::fs::read_to_string(&path).await.ok()?;
        Some(DocumentSnapshot {
            uri: uri.clone(),
            text: Arc::from(text),
            fingerprint,
        })
    }
}

// Convert a UTF-16 position to a rope char index, clamped to the end of the line.
pub(crate) fn position_to_char_idx(text: &Rope, pos: Position) -> usize {
    let line_idx = pos.line as usize;
    if line_idx >= text.len_lines() {
        return text.len_chars();
    }
    let line_start_char = text.line_to_char(line_idx);
    let line_slice = text.line(line_idx);
    let target_utf16 = pos.character as usize;

    if let Some(s) = line_slice.as_str() {
        if s.is_ascii() {
            let content = s.trim_end_matches(['\n', '\r']);
            return line_start_char + target_utf16.min(content.len());
        }
    }

    let mut seen_utf16 = 0usize;
    let mut chars_in_line = 0usize;
    for ch in line_slice.chars() {
        if ch == '\n' || ch == '\r' {
            break;
        }
        let u16_len = ch.len_utf16();
        if seen_utf16 + u16_len > target_utf16 {
            break;
        }
        seen_utf16 += u16_len;
        chars_in_line += 1;
        if seen_utf16 == target_utf16 {
            break;
        }
    }
    line_start_char + chars_in_line
}

fn apply_change(text: &mut Rope, change: &TextChange) {
    let Some(range) = change.range else {
        *text = Rope::from_str(&change.text);
        return;
    };
    let start = position_to_char_idx(text, range.start);
    let end = position_to_char_idx(text, range.end);
    let (s, e) = if start <= end { (start, end) } else { (end, start) };
    if s != e {
        text.remove(s..e);
    }
    if !change.text.is_empty() {
        text.insert(s, &change.text);
    }
}
