use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the analysis process bridge and everything layered on top of it.
///
/// Semantic non-findings (an import that cannot be located, a callee defined
/// nowhere, a stdlib path that does not exist) are never represented here; they
/// are `None` or empty collections at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The runtime could not be located or the process died before answering its health probe.
    #[error("analysis process unavailable: {0}")]
    ProcessUnavailable(String),

    #[error("analysis process has not been started")]
    NotStarted,

    #[error("analysis process crashed (exit code {exit_code:?})")]
    ProcessCrashed { exit_code: Option<i32> },

    #[error("analysis process was terminated")]
    ProcessTerminated,

    #[error("request '{method}' timed out after {after:?}")]
    RequestTimeout { method: String, after: Duration },

    /// Structured error returned by the analysis process itself.
    #[error("request failed ({code}): {message}")]
    RequestFailed { code: i64, message: String },

    #[error("malformed message from analysis process: {0}")]
    Protocol(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Transport-level failures after which the process has to be started again.
    pub fn is_process_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::ProcessUnavailable(_)
                | BridgeError::NotStarted
                | BridgeError::ProcessCrashed { .. }
                | BridgeError::ProcessTerminated
        )
    }

    /// Whether retrying the same request later may succeed without a restart.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::RequestTimeout { .. })
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
