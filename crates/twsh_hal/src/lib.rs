//! Platform abstraction layer for Tidewater Shell.
//!
//! Owns every POSIX syscall the shell makes: fork/exec, process groups,
//! waiting, signals, terminal ownership, and fd plumbing. The execution
//! engine (`twsh_core`) consumes these typed wrappers and stays free of raw
//! `nix`/`libc` calls.

pub mod error;
pub mod pipe;
pub mod process;
pub mod signal;
pub mod terminal;

pub use error::{HalError, HalResult};
pub use process::{Forked, WaitEvent};

// Re-exported so the engine can name pids, signals, and errnos without
// importing nix.
pub use nix::errno::Errno;
pub use nix::sys::signal::Signal;
pub use nix::unistd::Pid;
