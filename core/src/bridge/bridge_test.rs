#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::bridge::{locate_executable, AnalysisBridge, BridgeEvent, BridgeStatus, Launcher, ProcessLauncher};
    use crate::document::content_hash;
    use crate::error::BridgeError;
    use crate::model::{CircularCheckResult, ImportKind};
    use crate::testing::FakeAnalyzer;

    const FILE_A: &str = "void alpha() {\n  beta();\n}\n";
    const FILE_B: &str = "int beta() { return 1; }\n";

    #[tokio::test]
    async fn test_requests_before_start_fail_with_not_started() {
        let fake = FakeAnalyzer::new();
        let bridge = fake.bridge();
        assert_eq!(bridge.status(), BridgeStatus::NotStarted);
        assert_eq!(bridge.pid(), None);
        let err = bridge.parse(FILE_A, "/a.pike").await.unwrap_err();
        assert_eq!(err, BridgeError::NotStarted);
        assert_eq!(fake.launches(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_starts_launch_once() {
        let fake = FakeAnalyzer::new();
        let bridge = fake.bridge();
        let (a, b) = tokio::join!(bridge.start(), bridge.start());
        a.unwrap();
        b.unwrap();
        bridge.start().await.unwrap();

        assert_eq!(fake.launches(), 1);
        assert_eq!(fake.count("health"), 1);
        assert_eq!(bridge.status(), BridgeStatus::Idle);
        assert!(bridge.pid().is_some());
    }

    #[tokio::test]
    async fn test_started_event_carries_pid() {
        let fake = FakeAnalyzer::new();
        let bridge = fake.bridge();
        let mut events = bridge.subscribe();
        bridge.start().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), BridgeEvent::Started { pid: bridge.pid() });
    }

    #[tokio::test]
    async fn test_responses_are_matched_by_id_not_arrival_order() {
        let fake = FakeAnalyzer::new();
        fake.delay("compile", Duration::from_millis(150));
        let bridge = fake.started_bridge().await;

        let slow = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.compile(FILE_A, "/a.pike").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bridge.status(), BridgeStatus::Busy { in_flight: 1 });

        let fast = bridge.parse(FILE_B, "/b.pike").await.unwrap();
        assert!(!slow.is_finished());
        assert_eq!(fast.len(), 1);
        assert_eq!(fast[0].name, "beta");

        let compiled = slow.await.unwrap().unwrap();
        assert_eq!(compiled.symbols.len(), 1);
        assert_eq!(compiled.symbols[0].name, "alpha");
        assert_eq!(bridge.status(), BridgeStatus::Idle);
    }

    #[tokio::test]
    async fn test_structured_error_becomes_request_failed() {
        let fake = FakeAnalyzer::new();
        fake.fail("introspect", 7, "no such program");
        let bridge = fake.started_bridge().await;

        let err = bridge.introspect(FILE_A, "/a.pike").await.unwrap_err();
        assert_eq!(
            err,
            BridgeError::RequestFailed {
                code: 7,
                message: "no such program".to_string()
            }
        );
        assert!(!err.is_process_failure());
        assert_eq!(bridge.status(), BridgeStatus::Idle);

        fake.succeed("introspect");
        let introspected = bridge.introspect(FILE_A, "/a.pike").await.unwrap();
        assert_eq!(introspected.symbols[0].name, "alpha");
        assert_eq!(fake.count("introspect"), 2);
    }

    #[tokio::test]
    async fn test_slow_request_times_out_and_process_stays_usable() {
        let fake = FakeAnalyzer::new();
        fake.delay("parse", Duration::from_millis(500));
        let bridge = AnalysisBridge::new(
            Arc::new(fake.clone()),
            Duration::from_secs(2),
            Duration::from_millis(100),
        );
        bridge.start().await.unwrap();

        let err = bridge.parse(FILE_A, "/a.pike").await.unwrap_err();
        assert!(matches!(err, BridgeError::RequestTimeout { ref method, .. } if method == "parse"));
        assert!(err.is_retryable());

        let compiled = bridge.compile(FILE_B, "/b.pike").await.unwrap();
        assert_eq!(compiled.symbols[0].name, "beta");
        assert!(bridge.status().is_running());
    }

    #[tokio::test]
    async fn test_crash_rejects_pending_and_does_not_restart() {
        let fake = FakeAnalyzer::new();
        fake.delay("parse", Duration::from_millis(300));
        let bridge = fake.started_bridge().await;
        let mut events = bridge.subscribe();

        let pending = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.parse(FILE_A, "/a.pike").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        fake.exit_on("compile");
        let err = bridge.compile(FILE_B, "/b.pike").await.unwrap_err();
        assert!(matches!(err, BridgeError::ProcessCrashed { .. }));
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::ProcessCrashed { .. }));

        assert_eq!(events.recv().await.unwrap(), BridgeEvent::Crashed { exit_code: None });
        assert_eq!(bridge.status(), BridgeStatus::Crashed);
        let err = bridge.parse(FILE_A, "/a.pike").await.unwrap_err();
        assert!(matches!(err, BridgeError::ProcessCrashed { .. }));
        assert_eq!(fake.launches(), 1);

        fake.stay_alive();
        bridge.start().await.unwrap();
        assert_eq!(fake.launches(), 2);
        assert_eq!(bridge.parse(FILE_B, "/b.pike").await.unwrap()[0].name, "beta");
    }

    #[tokio::test]
    async fn test_stop_rejects_pending_with_terminated_and_is_repeatable() {
        let fake = FakeAnalyzer::new();
        fake.delay("compile", Duration::from_secs(1));
        let bridge = fake.started_bridge().await;
        let mut events = bridge.subscribe();

        let pending = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.compile(FILE_A, "/a.pike").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        bridge.stop().await;
        bridge.stop().await;

        assert_eq!(pending.await.unwrap().unwrap_err(), BridgeError::ProcessTerminated);
        assert_eq!(bridge.status(), BridgeStatus::Stopped);
        assert_eq!(events.recv().await.unwrap(), BridgeEvent::Stopped);
        assert!(events.try_recv().is_err());
        assert_eq!(
            bridge.parse(FILE_A, "/a.pike").await.unwrap_err(),
            BridgeError::ProcessTerminated
        );
    }

    #[tokio::test]
    async fn test_missing_runtime_is_process_unavailable() {
        let fake = FakeAnalyzer::new();
        fake.refuse_launch(true);
        let bridge = fake.bridge();
        let err = bridge.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::ProcessUnavailable(_)));
        assert_eq!(bridge.status(), BridgeStatus::NotStarted);

        let err = ProcessLauncher::new("/definitely/not/here/pike").launch().unwrap_err();
        assert!(matches!(err, BridgeError::ProcessUnavailable(_)));
    }

    #[tokio::test]
    async fn test_process_without_health_answer_is_unavailable() {
        let fake = FakeAnalyzer::new();
        fake.silent_health(true);
        let bridge = AnalysisBridge::new(
            Arc::new(fake.clone()),
            Duration::from_millis(100),
            Duration::from_secs(1),
        );
        let err = bridge.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::ProcessUnavailable(_)));
        assert_eq!(bridge.status(), BridgeStatus::NotStarted);

        fake.silent_health(false);
        bridge.start().await.unwrap();
        assert_eq!(fake.launches(), 2);
    }

    #[tokio::test]
    async fn test_typed_operations() {
        let fake = FakeAnalyzer::new();
        let bridge = fake.started_bridge().await;
        let source = "#include \"defs.h\"\ninherit Animal;\nvoid alpha() {}\n";

        let imports = bridge.extract_imports(source, "/w/a.pike").await.unwrap();
        let kinds: Vec<ImportKind> = imports.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ImportKind::Include, ImportKind::Inherit]);
        assert_eq!(imports[0].declared_target, "defs.h");

        let info = bridge.introspect(source, "/w/a.pike").await.unwrap();
        assert_eq!(info.inherits, vec!["Animal".to_string()]);
        assert!(info.symbols.iter().any(|s| s.name == "alpha" && s.kind == "function"));

        let waterfall = bridge.get_waterfall_symbols(source, "/w/a.pike", 3).await.unwrap();
        assert_eq!(waterfall.content_hash, content_hash(source));
        assert_eq!(waterfall.depth, 3);

        assert_eq!(
            bridge.check_circular(source, "/w/a.pike").await.unwrap(),
            CircularCheckResult::NoCycle
        );
        assert_eq!(
            bridge
                .resolve_import(ImportKind::Include, "missing.h", Path::new("/w/a.pike"))
                .await
                .unwrap(),
            None
        );

        let file = bridge.resolve_stdlib_symbol("Stdio.File").await.unwrap().unwrap();
        assert_eq!(file.kind, "class");
        assert!(bridge.resolve_stdlib_symbol("Stdio.Nope").await.unwrap().is_none());
        assert_eq!(bridge.health().await.unwrap().version.as_deref(), Some("fake-8.0"));
    }

    #[test]
    fn test_locate_executable_searches_path() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("pike");
        std::fs::write(&exe, "").unwrap();

        let search = std::env::join_paths([dir.path()]).unwrap();
        assert_eq!(locate_executable(Path::new("pike"), Some(search.as_os_str())), Some(exe.clone()));
        assert_eq!(locate_executable(Path::new("pike9"), Some(search.as_os_str())), None);
        assert_eq!(locate_executable(Path::new("pike"), None), None);
        assert_eq!(locate_executable(&exe, None), Some(exe));
        assert_eq!(locate_executable(Path::new(""), Some(search.as_os_str())), None);
    }
}
