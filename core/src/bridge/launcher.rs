use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::config::{CoreConfig, MODULE_PATH_ENV};
use crate::error::{BridgeError, BridgeResult};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Byte streams of a freshly launched analysis process.
pub struct Connection {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub child: Option<Child>,
    pub pid: Option<u32>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("pid", &self.pid).finish_non_exhaustive()
    }
}

/// Starts one analysis process. Called once per bridge start.
pub trait Launcher: Send + Sync + fmt::Debug {
    fn launch(&self) -> BridgeResult<Connection>;
}

/// Launches the Pike runtime with the analyzer program on piped stdio.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    runtime: PathBuf,
    analyzer_script: Option<PathBuf>,
    module_path: Option<PathBuf>,
}

impl ProcessLauncher {
    pub fn new(runtime: impl Into<PathBuf>) -> Self {
        Self {
            runtime: runtime.into(),
            analyzer_script: None,
            module_path: None,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            runtime: config.pike_path.clone(),
            analyzer_script: config.analyzer_script.clone(),
            module_path: config.module_path_override.clone(),
        }
    }

    pub fn with_analyzer_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.analyzer_script = Some(script.into());
        self
    }

    pub fn with_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_path = Some(path.into());
        self
    }

    /// Absolute runtime path, searching `PATH` for bare executable names.
    pub fn locate_runtime(&self) -> Option<PathBuf> {
        locate_executable(&self.runtime, std::env::var_os("PATH").as_deref())
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self) -> BridgeResult<Connection> {
        let runtime = self.locate_runtime().ok_or_else(|| {
            BridgeError::ProcessUnavailable(format!("Pike runtime '{}' not found", self.runtime.display()))
        })?;

        let mut command = Command::new(&runtime);
        if let Some(script) = &self.analyzer_script {
            command.arg(script);
        }
        if let Some(module_path) = &self.module_path {
            command.env(MODULE_PATH_ENV, module_path);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| BridgeError::ProcessUnavailable(format!("failed to spawn '{}': {e}", runtime.display())))?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::ProcessUnavailable("analysis process has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::ProcessUnavailable("analysis process has no stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "pike::bridge::stderr", "{}", line);
                }
            });
        }

        info!(target: "pike::bridge", "launched {} (pid {:?})", runtime.display(), pid);
        Ok(Connection {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
            pid,
        })
    }
}

pub(crate) fn locate_executable(program: &Path, search_path: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    if program.as_os_str().is_empty() {
        return None;
    }
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }
    let search_path = search_path?;
    for dir in std::env::split_paths(search_path) {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}
