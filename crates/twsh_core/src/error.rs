//! Error taxonomy for the execution engine.
//!
//! Every failure the engine can report is one of these kinds, and each kind
//! knows the exit status it turns into at a command boundary. Errors inside
//! a single command are local: they set `$?` and the shell moves on, unless
//! `errexit` escalates them.

use twsh_hal::HalError;

/// Result type for all engine operations.
pub type ShellResult<T> = Result<T, ShellError>;

/// Categories of engine failure, per the execution-engine contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Command lookup failed (exit 127).
    CommandNotFound,
    /// Found but not runnable (exit 126).
    PermissionDenied,
    NotExecutable,
    /// A redirection could not be established; the command is aborted but
    /// the shell continues.
    RedirectionFailure,
    /// fork(2) failed; resource exhaustion, command aborted.
    ForkFailure,
    /// A child died from signal N; status is 128+N.
    SignalDeath(i32),
    /// Bad `%` job specification.
    JobSpecInvalid,
    /// `local`/`return` used outside a function, `break` outside a loop.
    ScopeViolation,
    /// Malformed builtin usage.
    UsageError,
    /// Unset variable under `nounset`, bad expansion input.
    ExpansionError,
    /// AST nesting exceeded the documented evaluation ceiling.
    EvalDepthExceeded,
    /// Underlying I/O failure.
    Io,
    /// Invariant breakage inside the engine itself; fatal.
    Internal,
}

/// Engine error: a kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ShellError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ShellError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn command_not_found(name: &str) -> Self {
        Self::new(ErrorKind::CommandNotFound, format!("{name}: command not found"))
    }

    pub fn not_executable(name: &str) -> Self {
        Self::new(ErrorKind::NotExecutable, format!("{name}: cannot execute"))
    }

    pub fn permission_denied(name: &str) -> Self {
        Self::new(ErrorKind::PermissionDenied, format!("{name}: permission denied"))
    }

    pub fn redirection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RedirectionFailure, message)
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UsageError, message)
    }

    pub fn job_spec(spec: &str) -> Self {
        Self::new(ErrorKind::JobSpecInvalid, format!("{spec}: no such job"))
    }

    pub fn scope(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ScopeViolation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// The exit status this error produces when it surfaces at a command
    /// boundary.
    pub fn exit_status(&self) -> i32 {
        match self.kind {
            ErrorKind::CommandNotFound => 127,
            ErrorKind::PermissionDenied | ErrorKind::NotExecutable => 126,
            ErrorKind::SignalDeath(sig) => 128 + sig,
            ErrorKind::UsageError | ErrorKind::JobSpecInvalid => 2,
            ErrorKind::RedirectionFailure
            | ErrorKind::ForkFailure
            | ErrorKind::ScopeViolation
            | ErrorKind::ExpansionError
            | ErrorKind::EvalDepthExceeded
            | ErrorKind::Io
            | ErrorKind::Internal => 1,
        }
    }

    /// Fatal errors abort the shell process itself instead of the current
    /// command (spec'd: fork-level resource exhaustion is not fatal, but a
    /// corrupted engine invariant is).
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::Internal)
    }
}

impl From<std::io::Error> for ShellError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

impl From<HalError> for ShellError {
    fn from(err: HalError) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}
