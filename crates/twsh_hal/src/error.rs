//! Error type for the platform abstraction layer.

use nix::errno::Errno;

/// Result type for all HAL operations.
pub type HalResult<T> = Result<T, HalError>;

/// Errors raised by the platform layer. The `Sys` variant keeps the raw
/// `errno` so callers can map it onto shell exit statuses (126/127, …).
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("{op}: {errno}")]
    Sys { op: &'static str, errno: Errno },

    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown signal: {0}")]
    UnknownSignal(String),
}

impl HalError {
    pub fn sys(op: &'static str, errno: Errno) -> Self {
        Self::Sys { op, errno }
    }

    pub fn io(op: &'static str, source: std::io::Error) -> Self {
        Self::Io { op, source }
    }

    /// The underlying `errno`, when there is one.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::Sys { errno, .. } => Some(*errno),
            Self::Io { source, .. } => source.raw_os_error().map(Errno::from_i32),
            Self::UnknownSignal(_) => None,
        }
    }
}
