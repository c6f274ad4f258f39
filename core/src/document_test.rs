#[cfg(test)]
mod tests {
    use url::Url;

    use crate::document::{content_hash, DocumentFingerprint, DocumentStore, TextChange};
    use crate::model::{Position, Range};

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///work/{name}")).unwrap()
    }

    fn edit(start: (u32, u32), end: (u32, u32), text: &str) -> TextChange {
        TextChange {
            range: Some(Range::new(Position::new(start.0, start.1), Position::new(end.0, end.1))),
            text: text.to_string(),
        }
    }

    fn text_of(store: &DocumentStore, uri: &Url) -> String {
        store.snapshot(uri).unwrap().text.to_string()
    }

    #[test]
    fn test_incremental_edits_use_utf16_columns() {
        let store = DocumentStore::new();
        let doc = uri("a.pike");
        store.open(doc.clone(), 1, "héllo 😀 world\nint x;\n");

        // The emoji spans two UTF-16 code units.
        store.change(&doc, 2, &[edit((0, 6), (0, 8), "x")]).unwrap();
        assert_eq!(text_of(&store, &doc), "héllo x world\nint x;\n");

        store
            .change(&doc, 3, &[edit((1, 4), (1, 5), "yy"), edit((0, 0), (0, 0), "// top\n")])
            .unwrap();
        assert_eq!(text_of(&store, &doc), "// top\nhéllo x world\nint yy;\n");
    }

    #[test]
    fn test_positions_past_line_end_are_clamped() {
        let store = DocumentStore::new();
        let doc = uri("a.pike");
        store.open(doc.clone(), 1, "abc\ndef");

        store.change(&doc, 2, &[edit((0, 1), (0, 99), "Z")]).unwrap();
        assert_eq!(text_of(&store, &doc), "aZ\ndef");

        store.change(&doc, 3, &[edit((9, 0), (9, 0), "!")]).unwrap();
        assert_eq!(text_of(&store, &doc), "aZ\ndef!");
    }

    #[test]
    fn test_full_text_change_replaces_document() {
        let store = DocumentStore::new();
        let doc = uri("a.pike");
        store.open(doc.clone(), 1, "old");
        let fp = store
            .change(
                &doc,
                7,
                &[TextChange {
                    range: None,
                    text: "new text".to_string(),
                }],
            )
            .unwrap();
        assert_eq!(fp, DocumentFingerprint::versioned(doc.clone(), 7));
        assert_eq!(text_of(&store, &doc), "new text");
        assert_eq!(store.fingerprint(&doc), Some(fp));
    }

    #[test]
    fn test_change_to_unopened_document_is_ignored() {
        let store = DocumentStore::new();
        assert!(store.change(&uri("ghost.pike"), 2, &[edit((0, 0), (0, 0), "x")]).is_none());
        assert!(!store.is_open(&uri("ghost.pike")));
    }

    #[test]
    fn test_fingerprint_identity() {
        let a = uri("a.pike");
        assert_eq!(DocumentFingerprint::versioned(a.clone(), 1), DocumentFingerprint::versioned(a.clone(), 1));
        assert_ne!(DocumentFingerprint::versioned(a.clone(), 1), DocumentFingerprint::versioned(a.clone(), 2));
        assert_ne!(DocumentFingerprint::versioned(a.clone(), 1), DocumentFingerprint::versioned(uri("b.pike"), 1));

        let stat = DocumentFingerprint::Stat {
            uri: a.clone(),
            size: 1,
            modified: std::time::SystemTime::UNIX_EPOCH,
        };
        assert_ne!(stat, DocumentFingerprint::versioned(a.clone(), 1));
        assert_eq!(stat.uri(), &a);
    }

    #[test]
    fn test_content_hash_is_deterministic_and_order_sensitive() {
        assert_eq!(content_hash("int a; int b;"), content_hash("int a; int b;"));
        assert_ne!(content_hash("int a; int b;"), content_hash("int b; int a;"));
        assert_ne!(content_hash(""), content_hash(" "));
    }

    #[tokio::test]
    async fn test_read_prefers_open_text_and_falls_back_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.pike");
        std::fs::write(&path, "int on_disk;\n").unwrap();
        let doc = Url::from_file_path(&path).unwrap();
        let store = DocumentStore::new();

        let from_disk = store.read(&doc).await.unwrap();
        assert_eq!(&*from_disk.text, "int on_disk;\n");
        assert!(matches!(
            from_disk.fingerprint,
            DocumentFingerprint::Stat { size: 13, .. }
        ));
        assert_eq!(from_disk.content_hash(), content_hash("int on_disk;\n"));

        store.open(doc.clone(), 4, "int in_editor;\n");
        let open = store.read(&doc).await.unwrap();
        assert_eq!(&*open.text, "int in_editor;\n");
        assert_eq!(open.fingerprint, DocumentFingerprint::versioned(doc.clone(), 4));

        assert!(store.close(&doc));
        assert!(!store.close(&doc));
        assert_eq!(store.read(&doc).await.unwrap().fingerprint, from_disk.fingerprint);

        assert!(store.read(&Url::from_file_path(dir.path().join("missing.pike")).unwrap()).await.is_none());
        assert!(store.read(&Url::parse("untitled:Untitled-1").unwrap()).await.is_none());
    }

    #[test]
    fn test_open_uris_are_sorted() {
        let store = DocumentStore::new();
        store.open(uri("b.pike"), 1, "");
        store.open(uri("a.pike"), 1, "");
        assert_eq!(store.open_uris(), vec![uri("a.pike"), uri("b.pike")]);
    }
}
