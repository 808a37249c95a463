//! Controlling-terminal ownership.
//!
//! Exactly one process group owns the terminal at a time; the engine hands
//! it to a foreground job and takes it back when the job stops or finishes.
//! The raw `tcsetpgrp`/`tcgetpgrp` calls go through libc directly.

use crate::error::{HalError, HalResult};
use nix::errno::Errno;
use nix::unistd::Pid;

const TERM_FD: libc::c_int = libc::STDIN_FILENO;

pub fn stdin_is_tty() -> bool {
    // Safety: isatty only inspects the descriptor.
    unsafe { libc::isatty(TERM_FD) == 1 }
}

/// Hand the controlling terminal to `pgid`.
pub fn give_terminal_to(pgid: Pid) -> HalResult<()> {
    // Safety: plain syscall; the shell ignores SIGTTOU so this cannot stop us.
    let rc = unsafe { libc::tcsetpgrp(TERM_FD, pgid.as_raw()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(HalError::sys("tcsetpgrp", Errno::last()))
    }
}

/// Make the shell the leader of its own process group, as an interactive
/// shell must be before it can parcel out the terminal.
pub fn adopt_own_process_group() -> HalResult<Pid> {
    let pid = nix::unistd::getpid();
    match nix::unistd::setpgid(pid, pid) {
        Ok(()) | Err(Errno::EPERM) => Ok(nix::unistd::getpgrp()),
        Err(errno) => Err(HalError::sys("setpgid", errno)),
    }
}
