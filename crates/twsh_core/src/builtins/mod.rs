//! Engine-coupled builtins.
//!
//! These are the builtins that must run in the calling process to do their
//! job: they mutate the `ExecutionContext` directly (`cd`, `export`,
//! `local`, `trap`, the job-control commands). The contract is
//! `fn(args, ctx, io) -> exit status`, with `args` excluding the command
//! name and `io` carrying the command's current stdin/stdout/stderr.

mod bg;
mod cd;
mod fg;
mod jobs;
mod kill;
mod misc;
mod set;
mod trap;
mod wait;

use crate::context::ExecutionContext;
use crate::error::ShellResult;
use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Write};
use std::rc::Rc;
use twsh_hal::pipe;

/// I/O bundle handed to a builtin: duplicates of the command's current
/// descriptors, so redirections applied around the builtin are honored.
pub struct BuiltinIo {
    pub stdin: Box<dyn Read>,
    pub stdout: Box<dyn Write>,
    pub stderr: Box<dyn Write>,
}

impl BuiltinIo {
    /// Capture the process's current fds 0/1/2.
    pub fn from_process() -> ShellResult<Self> {
        let stdin = File::from(pipe::duplicate_above(0, 10)?);
        let stdout = File::from(pipe::duplicate_above(1, 10)?);
        let stderr = File::from(pipe::duplicate_above(2, 10)?);
        Ok(Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        })
    }

    /// In-memory io for tests: returns the bundle plus handles to inspect
    /// what the builtin wrote.
    pub fn capture() -> (Self, SharedBuffer, SharedBuffer) {
        let stdout = SharedBuffer::default();
        let stderr = SharedBuffer::default();
        let io = Self {
            stdin: Box::new(std::io::empty()),
            stdout: Box::new(stdout.clone()),
            stderr: Box::new(stderr.clone()),
        };
        (io, stdout, stderr)
    }
}

/// Cheaply cloneable byte sink used by `BuiltinIo::capture`.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub type BuiltinFn = fn(&[String], &mut ExecutionContext, &mut BuiltinIo) -> ShellResult<i32>;

/// Builtin dispatch table.
pub fn lookup(name: &str) -> Option<BuiltinFn> {
    Some(match name {
        ":" | "true" => misc::succeed,
        "false" => misc::fail,
        "echo" => misc::echo,
        "pwd" => cd::pwd,
        "cd" => cd::cd,
        "set" => set::set,
        "export" => set::export,
        "unset" => set::unset,
        "shift" => set::shift,
        "local" => set::local,
        "trap" => trap::trap,
        "jobs" => jobs::jobs,
        "disown" => jobs::disown,
        "fg" => fg::fg,
        "bg" => bg::bg,
        "wait" => wait::wait,
        "kill" => kill::kill,
        _ => return None,
    })
}

/// Whether `name` resolves to engine logic rather than an external binary —
/// includes the control-flow words the executor intercepts itself.
pub fn is_builtin(name: &str) -> bool {
    lookup(name).is_some()
        || matches!(name, "break" | "continue" | "return" | "exit" | "exec")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_the_engine_builtins() {
        for name in ["cd", "jobs", "fg", "bg", "wait", "trap", "local", "set"] {
            assert!(lookup(name).is_some(), "{name} missing from dispatch");
        }
        assert!(lookup("ls").is_none());
        assert!(is_builtin("exit"));
        assert!(!is_builtin("grep"));
    }
}
