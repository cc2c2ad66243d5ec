use serde::{Deserialize, Serialize};
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use thiserror::Error;


/// Errors raised by the pool itself (never by the jobs it runs)
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("job id must be hashable, got {0}")]
    UnhashableId(&'static str),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    #[error("join failed: {0}")]
    JoinFailed(String),

    #[error("worker {0} is already started")]
    AlreadyStarted(usize),

    #[error("queue is closed")]
    QueueClosed,

    #[error("queue operation timed out")]
    Timeout,
}


/// Structured failure of a single job
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct JobError {
    pub kind: String,
    pub message: String,
    pub trace: Option<String>,
}

impl JobError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: None,
        }
    }

    /// Plain error with the generic `error` kind
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("error", message)
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Converts a payload caught by `catch_unwind` into a `panic` error.
    /// The trace is only filled when backtraces are enabled via `RUST_BACKTRACE`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        let error = Self::new("panic", message);
        let backtrace = Backtrace::capture();
        match backtrace.status() {
            BacktraceStatus::Captured => error.with_trace(backtrace.to_string()),
            _ => error,
        }
    }
}

impl From<String> for JobError {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

impl From<&str> for JobError {
    fn from(message: &str) -> Self {
        Self::msg(message)
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        Self::new("serde_json", err.to_string())
    }
}
