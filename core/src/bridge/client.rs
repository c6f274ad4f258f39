use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::launcher::{BoxedReader, BoxedWriter, Launcher, ProcessLauncher};
use super::message::*;
use crate::config::CoreConfig;
use crate::document::content_hash;
use crate::error::{BridgeError, BridgeResult};
use crate::model::{
    AnalysisResult, CircularCheckResult, ImportEdge, ImportKind, IntrospectionResult, StdlibSymbol, Symbol,
    WaterfallSymbolSet,
};

const REAP_GRACE: Duration = Duration::from_millis(500);

/// Observable state of the bridge, distinguishing "not yet started" from "started but busy".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    NotStarted,
    Starting,
    Idle,
    Busy { in_flight: usize },
    Crashed,
    Stopped,
}

impl BridgeStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, BridgeStatus::Idle | BridgeStatus::Busy { .. })
    }
}

/// Lifecycle notifications. A crash is reported here; restarting is up to the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Started { pid: Option<u32> },
    Crashed { exit_code: Option<i32> },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotStarted,
    Starting,
    Running,
    Crashed { exit_code: Option<i32> },
    Stopped,
}

type Reply = oneshot::Sender<BridgeResult<Value>>;

/// One connection to one process instance. Replaced wholesale on restart.
struct Channel {
    writer: tokio::sync::Mutex<BoxedWriter>,
    child: tokio::sync::Mutex<Option<Child>>,
    pending: DashMap<u64, Reply>,
    pid: Option<u32>,
    closing: AtomicBool,
    dead: AtomicBool,
}

impl Channel {
    fn new(writer: BoxedWriter, child: Option<Child>, pid: Option<u32>) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
            child: tokio::sync::Mutex::new(child),
            pending: DashMap::new(),
            pid,
            closing: AtomicBool::new(false),
            dead: AtomicBool::new(false),
        }
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }

    /// Reject every outstanding request and refuse new ones.
    fn fail_all(&self, err: BridgeError) {
        self.dead.store(true, Ordering::SeqCst);
        let ids: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, reply)) = self.pending.remove(&id) {
                let _ = reply.send(Err(err.clone()));
            }
        }
    }

    async fn kill(&self) {
        let mut child = self.child.lock().await;
        if let Some(child) = child.as_mut() {
            let _ = child.start_kill();
            let _ = tokio::time::timeout(REAP_GRACE, child.wait()).await;
        }
        *child = None;
    }

    async fn reap(&self) -> Option<i32> {
        let mut child = self.child.lock().await;
        let status = tokio::time::timeout(REAP_GRACE, child.as_mut()?.wait())
            .await
            .ok()?
            .ok()?;
        *child = None;
        status.code()
    }
}

struct Shared {
    phase: Mutex<Phase>,
    active: Mutex<Option<Arc<Channel>>>,
    events: broadcast::Sender<BridgeEvent>,
}

impl Shared {
    fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    fn emit(&self, event: BridgeEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

#[derive(Default)]
struct Lifecycle {
    channel: Option<Arc<Channel>>,
    reader: Option<JoinHandle<()>>,
}

/// Typed async client for the external analysis process.
///
/// One process per bridge. Requests are multiplexed over the process's stdio
/// and matched to responses by id, so concurrent callers may be answered in any
/// order. The bridge never restarts on its own: after a crash every request
/// fails until someone calls [`AnalysisBridge::start`] again.
pub struct AnalysisBridge {
    launcher: Arc<dyn Launcher>,
    startup_timeout: Duration,
    request_timeout: Duration,
    next_id: AtomicU64,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AnalysisBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisBridge")
            .field("launcher", &self.launcher)
            .field("status", &self.status())
            .finish()
    }
}

impl AnalysisBridge {
    pub fn new(launcher: Arc<dyn Launcher>, startup_timeout: Duration, request_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            launcher,
            startup_timeout,
            request_timeout,
            next_id: AtomicU64::new(1),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
            shared: Arc::new(Shared {
                phase: Mutex::new(Phase::NotStarted),
                active: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(
            Arc::new(ProcessLauncher::from_config(config)),
            config.startup_timeout,
            config.request_timeout,
        )
    }

    pub fn status(&self) -> BridgeStatus {
        match self.shared.phase() {
            Phase::NotStarted => BridgeStatus::NotStarted,
            Phase::Starting => BridgeStatus::Starting,
            Phase::Crashed { .. } => BridgeStatus::Crashed,
            Phase::Stopped => BridgeStatus::Stopped,
            Phase::Running => {
                let in_flight = self
                    .shared
                    .active
                    .lock()
                    .as_ref()
                    .map(|c| c.pending.len())
                    .unwrap_or(0);
                if in_flight == 0 {
                    BridgeStatus::Idle
                } else {
                    BridgeStatus::Busy { in_flight }
                }
            }
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.shared.active.lock().as_ref().and_then(|c| c.pid)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.shared.events.subscribe()
    }

    /// Launch the process and wait for its first health response.
    ///
    /// A no-op when already running; concurrent callers wait for the same startup.
    pub async fn start(&self) -> BridgeResult<()> {
        let mut life = self.lifecycle.lock().await;
        if self.shared.phase() == Phase::Running {
            return Ok(());
        }
        *self.shared.phase.lock() = Phase::Starting;

        // Leftovers from a crashed instance.
        if let Some(reader) = life.reader.take() {
            reader.abort();
        }
        if let Some(old) = life.channel.take() {
            old.closing.store(true, Ordering::SeqCst);
            old.kill().await;
        }

        let conn = match self.launcher.launch() {
            Ok(conn) => conn,
            Err(err) => {
                *self.shared.phase.lock() = Phase::NotStarted;
                warn!(target: "pike::bridge", "launch failed: {}", err);
                return Err(match err {
                    BridgeError::ProcessUnavailable(msg) => BridgeError::ProcessUnavailable(msg),
                    other => BridgeError::ProcessUnavailable(other.to_string()),
                });
            }
        };

        let channel = Arc::new(Channel::new(conn.writer, conn.child, conn.pid));
        let reader = tokio::spawn(read_loop(conn.reader, Arc::clone(&self.shared), Arc::clone(&channel)));
        life.channel = Some(Arc::clone(&channel));
        life.reader = Some(reader);

        match self
            .send(&channel, Operation::Health, Value::Object(Default::default()), self.startup_timeout)
            .await
        {
            Ok(_) => {
                *self.shared.active.lock() = Some(Arc::clone(&channel));
                *self.shared.phase.lock() = Phase::Running;
                info!(target: "pike::bridge", "analysis process ready (pid {:?})", channel.pid);
                self.shared.emit(BridgeEvent::Started { pid: channel.pid });
                Ok(())
            }
            Err(err) => {
                channel.closing.store(true, Ordering::SeqCst);
                channel.fail_all(BridgeError::ProcessTerminated);
                channel.kill().await;
                if let Some(reader) = life.reader.take() {
                    reader.abort();
                }
                life.channel = None;
                *self.shared.phase.lock() = Phase::NotStarted;
                warn!(target: "pike::bridge", "analysis process failed its health probe: {}", err);
                Err(BridgeError::ProcessUnavailable(format!("no health response: {err}")))
            }
        }
    }

    /// Terminate the process. Outstanding requests fail with `ProcessTerminated`.
    /// Safe to call any number of times.
    pub async fn stop(&self) {
        let mut life = self.lifecycle.lock().await;
        self.shared.active.lock().take();
        let had_channel = life.channel.is_some();
        if let Some(channel) = life.channel.take() {
            channel.closing.store(true, Ordering::SeqCst);
            channel.fail_all(BridgeError::ProcessTerminated);
            channel.kill().await;
        }
        if let Some(reader) = life.reader.take() {
            reader.abort();
        }
        let previous = std::mem::replace(&mut *self.shared.phase.lock(), Phase::Stopped);
        if had_channel && previous != Phase::Stopped {
            info!(target: "pike::bridge", "analysis process stopped");
            self.shared.emit(BridgeEvent::Stopped);
        }
    }

    /// Send one operation and decode its typed result.
    pub async fn request<P, R>(&self, op: Operation, params: P) -> BridgeResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let channel = self.active_channel()?;
        let params = serde_json::to_value(params)
            .map_err(|e| BridgeError::Internal(format!("cannot encode {} params: {e}", op.method())))?;
        let value = self.send(&channel, op, params, self.request_timeout).await?;
        serde_json::from_value(value)
            .map_err(|e| BridgeError::Protocol(format!("unexpected {} result: {e}", op.method())))
    }

    fn active_channel(&self) -> BridgeResult<Arc<Channel>> {
        if let Some(channel) = self.shared.active.lock().clone() {
            return Ok(channel);
        }
        Err(match self.shared.phase() {
            Phase::Crashed { exit_code } => BridgeError::ProcessCrashed { exit_code },
            Phase::Stopped => BridgeError::ProcessTerminated,
            Phase::NotStarted | Phase::Starting | Phase::Running => BridgeError::NotStarted,
        })
    }

    async fn send(&self, channel: &Channel, op: Operation, params: Value, limit: Duration) -> BridgeResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&WireRequest {
            id,
            method: op.method().to_string(),
            params,
        })
        .map_err(|e| BridgeError::Internal(format!("cannot encode request: {e}")))?;

        let (tx, rx) = oneshot::channel();
        channel.pending.insert(id, tx);
        if channel.dead.load(Ordering::SeqCst) {
            channel.pending.remove(&id);
            return Err(self.channel_gone(channel));
        }

        if let Err(err) = channel.write_line(&line).await {
            channel.pending.remove(&id);
            debug!(target: "pike::bridge", "write of request {} failed: {}", id, err);
            return Err(self.channel_gone(channel));
        }
        debug!(target: "pike::bridge", "-> {} #{}", op.method(), id);

        match tokio::time::timeout(limit, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(self.channel_gone(channel)),
            Err(_) => {
                channel.pending.remove(&id);
                warn!(target: "pike::bridge", "{} #{} timed out after {:?}", op.method(), id, limit);
                Err(BridgeError::RequestTimeout {
                    method: op.method().to_string(),
                    after: limit,
                })
            }
        }
    }

    fn channel_gone(&self, channel: &Channel) -> BridgeError {
        if channel.closing.load(Ordering::SeqCst) {
            return BridgeError::ProcessTerminated;
        }
        match self.shared.phase() {
            Phase::Crashed { exit_code } => BridgeError::ProcessCrashed { exit_code },
            _ => BridgeError::ProcessCrashed { exit_code: None },
        }
    }

    pub async fn health(&self) -> BridgeResult<HealthInfo> {
        self.request(Operation::Health, Value::Object(Default::default())).await
    }

    /// Symbols only, without type checking.
    pub async fn parse(&self, source: &str, filename: &str) -> BridgeResult<Vec<Symbol>> {
        let reply: ParseReply = self.request(Operation::Parse, source_params(source, filename)).await?;
        Ok(reply.symbols.into_iter().map(Symbol::normalized).collect())
    }

    pub async fn compile(&self, source: &str, filename: &str) -> BridgeResult<AnalysisResult> {
        let reply: CompileReply = self.request(Operation::Compile, source_params(source, filename)).await?;
        Ok(reply.normalized())
    }

    pub async fn introspect(&self, source: &str, filename: &str) -> BridgeResult<IntrospectionResult> {
        let reply: IntrospectReply = self
            .request(Operation::Introspect, source_params(source, filename))
            .await?;
        Ok(reply)
    }

    pub async fn extract_imports(&self, source: &str, filename: &str) -> BridgeResult<Vec<ImportEdge>> {
        let reply: ExtractImportsReply = self
            .request(Operation::ExtractImports, source_params(source, filename))
            .await?;
        Ok(reply.imports)
    }

    pub async fn resolve_import(
        &self,
        kind: ImportKind,
        target: &str,
        current_file: &Path,
    ) -> BridgeResult<Option<std::path::PathBuf>> {
        let params = ResolveImportParams {
            kind,
            target: target.to_string(),
            current_file: current_file.to_string_lossy().into_owned(),
        };
        let reply: ResolveImportReply = self.request(Operation::ResolveImport, params).await?;
        Ok(reply.resolved_path)
    }

    pub async fn check_circular(&self, source: &str, filename: &str) -> BridgeResult<CircularCheckResult> {
        let reply: CheckCircularReply = self
            .request(Operation::CheckCircular, source_params(source, filename))
            .await?;
        Ok(reply)
    }

    /// Transitive symbols as computed by the process itself.
    pub async fn get_waterfall_symbols(
        &self,
        source: &str,
        filename: &str,
        max_depth: usize,
    ) -> BridgeResult<WaterfallSymbolSet> {
        let params = WaterfallParams {
            source: source.to_string(),
            filename: filename.to_string(),
            max_depth,
        };
        let reply: WaterfallReply = self.request(Operation::GetWaterfallSymbols, params).await?;
        Ok(WaterfallSymbolSet {
            content_hash: content_hash(source),
            depth: max_depth,
            symbols: reply.symbols,
        })
    }

    pub async fn resolve_stdlib_symbol(&self, path: &str) -> BridgeResult<Option<StdlibSymbol>> {
        let params = StdlibParams { path: path.to_string() };
        let reply: StdlibReply = self.request(Operation::ResolveStdlibSymbol, params).await?;
        Ok(reply.symbol)
    }
}

fn source_params(source: &str, filename: &str) -> SourceParams {
    SourceParams {
        source: source.to_string(),
        filename: filename.to_string(),
    }
}

async fn read_loop(reader: BoxedReader, shared: Arc<Shared>, channel: Arc<Channel>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => dispatch(&channel, &line),
            Ok(None) => break,
            Err(err) => {
                warn!(target: "pike::bridge", "read from analysis process failed: {}", err);
                break;
            }
        }
    }
    on_disconnect(&shared, &channel).await;
}

fn dispatch(channel: &Channel, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    let message: WireResponse = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(err) => {
            debug!(target: "pike::bridge", "skipping unparseable line ({}): {}", err, line);
            return;
        }
    };
    let Some(id) = message.id else {
        if let Some(text) = message.message {
            debug!(target: "pike::bridge", "process: {}", text);
        }
        return;
    };
    let Some((_, reply)) = channel.pending.remove(&id) else {
        debug!(target: "pike::bridge", "response #{} has no waiting request", id);
        return;
    };
    let outcome = match (message.error, message.result) {
        (Some(err), _) => Err(BridgeError::RequestFailed {
            code: err.code,
            message: err.message,
        }),
        (None, result) => Ok(result.unwrap_or(Value::Null)),
    };
    let _ = reply.send(outcome);
}

async fn on_disconnect(shared: &Shared, channel: &Arc<Channel>) {
    if channel.closing.load(Ordering::SeqCst) {
        channel.fail_all(BridgeError::ProcessTerminated);
        return;
    }

    let exit_code = channel.reap().await;
    let was_running = {
        let mut active = shared.active.lock();
        let current = active.as_ref().is_some_and(|c| Arc::ptr_eq(c, channel));
        if current {
            active.take();
            *shared.phase.lock() = Phase::Crashed { exit_code };
        }
        current
    };
    channel.fail_all(BridgeError::ProcessCrashed { exit_code });

    if was_running {
        warn!(target: "pike::bridge", "analysis process exited unexpectedly (exit code {:?})", exit_code);
        shared.emit(BridgeEvent::Crashed { exit_code });
    }
}
