//! Outcome normalization
//!
//! Every way a resource can fail (a reported fault, a premature close, an
//! abnormal process exit) is folded into one [`CompletionError`] so callers
//! handle a single error type.

use crate::state::RawOutcome;
use settle_core::Fault;
use std::fmt;
use std::io;

/// Exit code of a normally terminated process.
pub const NORMAL_EXIT: i32 = 0;

/// Broad category of a completion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The resource reported a fault.
    StreamError,
    /// The resource closed before its tracked sides finished.
    PrematureClose,
    /// A process terminated with a non-normal code or by a signal.
    ProcessExit,
    /// A connection-oriented stream fault (refused, reset, ...).
    ConnectionError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::StreamError => "stream error",
            ErrorKind::PrematureClose => "premature close",
            ErrorKind::ProcessExit => "process exit",
            ErrorKind::ConnectionError => "connection error",
        };
        f.write_str(name)
    }
}

/// The single error type delivered to completion callbacks.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct CompletionError {
    kind: ErrorKind,
    exit_code: Option<i32>,
    signal: Option<String>,
    message: String,
    #[source]
    fault: Option<Fault>,
}

impl CompletionError {
    /// A close that arrived while tracked work was still pending.
    pub fn premature_close(exit_code: Option<i32>) -> Self {
        Self {
            kind: ErrorKind::PrematureClose,
            exit_code,
            signal: None,
            message: format!("premature close with error code: {}", describe_code(exit_code)),
            fault: None,
        }
    }

    /// A process that terminated abnormally.
    pub fn process_exit(code: Option<i32>, signal: Option<String>) -> Self {
        let message = match (code, &signal) {
            (Some(code), _) => format!("exited with error code: {}", code),
            (None, Some(signal)) => format!("exited due to signal: {}", signal),
            (None, None) => "exited abnormally without an exit code".to_string(),
        };
        Self {
            kind: ErrorKind::ProcessExit,
            exit_code: code,
            signal,
            message,
            fault: None,
        }
    }

    /// A fault reported by the resource.
    ///
    /// Connection-oriented I/O faults become [`ErrorKind::ConnectionError`].
    pub fn from_fault(fault: Fault) -> Self {
        let kind = match fault.io_kind() {
            Some(kind) if is_connection_kind(kind) => ErrorKind::ConnectionError,
            _ => ErrorKind::StreamError,
        };
        let message = match &fault {
            Fault::Message(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self {
            kind,
            exit_code: None,
            signal: None,
            message,
            fault: Some(fault),
        }
    }

    /// Category of the failure.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Exit code carried by the failure, if any.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Terminating signal name of a process exit, if any.
    pub fn signal(&self) -> Option<&str> {
        self.signal.as_deref()
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The fault reported by the resource, if any.
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// I/O error kind of the underlying fault, if any.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        self.fault.as_ref().and_then(Fault::io_kind)
    }

    /// Raw OS error code of the underlying fault, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        self.fault.as_ref().and_then(Fault::raw_os_error)
    }

    /// Whether the resource itself reported a fault (connection faults included).
    pub fn is_stream_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::StreamError | ErrorKind::ConnectionError
        )
    }

    /// Whether this is a connection-oriented fault.
    pub fn is_connection_error(&self) -> bool {
        self.kind == ErrorKind::ConnectionError
    }

    /// Whether the resource closed early.
    pub fn is_premature_close(&self) -> bool {
        self.kind == ErrorKind::PrematureClose
    }

    /// Whether a process exited abnormally.
    pub fn is_process_exit(&self) -> bool {
        self.kind == ErrorKind::ProcessExit
    }
}

impl From<Fault> for CompletionError {
    fn from(fault: Fault) -> Self {
        Self::from_fault(fault)
    }
}

/// Turn a raw outcome into the value handed to the caller.
pub fn normalize(outcome: RawOutcome) -> Result<(), CompletionError> {
    match outcome {
        RawOutcome::Success => Ok(()),
        RawOutcome::Fault(fault) => Err(CompletionError::from_fault(fault)),
        RawOutcome::PrematureClose { exit_code } => {
            Err(CompletionError::premature_close(exit_code))
        }
        RawOutcome::Exit {
            code: Some(NORMAL_EXIT),
            ..
        } => Ok(()),
        RawOutcome::Exit { code, signal } => Err(CompletionError::process_exit(code, signal)),
    }
}

fn is_connection_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable
    )
}

fn describe_code(code: Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |code| code.to_string())
}
