//! Pipes and file-descriptor plumbing.

use crate::error::{HalError, HalResult};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg};
use nix::unistd;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

/// Create a close-on-exec pipe; `(read_end, write_end)`.
pub fn create_pipe() -> HalResult<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // Safety: fds points at a live two-element array.
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(HalError::sys("pipe", Errno::last()));
    }
    // Safety: both descriptors were just returned by pipe() and are owned here.
    let (read_end, write_end) = unsafe {
        (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))
    };
    set_cloexec(&read_end)?;
    set_cloexec(&write_end)?;
    Ok((read_end, write_end))
}

fn set_cloexec(fd: &OwnedFd) -> HalResult<()> {
    use std::os::fd::AsRawFd;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(nix::fcntl::FdFlag::FD_CLOEXEC))
        .map(|_| ())
        .map_err(|errno| HalError::sys("fcntl", errno))
}

/// Duplicate `fd` to a close-on-exec descriptor numbered `min` or above.
/// This is how the redirection guard parks original descriptors out of the
/// way of user-visible fd numbers.
pub fn duplicate_above(fd: RawFd, min: RawFd) -> HalResult<OwnedFd> {
    let new = fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(min))
        .map_err(|errno| HalError::sys("fcntl", errno))?;
    // Safety: F_DUPFD_CLOEXEC returned a fresh descriptor we now own.
    Ok(unsafe { OwnedFd::from_raw_fd(new) })
}

/// dup2: make `dst` refer to the same file as `src`. The duplicate does not
/// inherit close-on-exec, which is exactly what redirection wants.
pub fn replace_fd(src: RawFd, dst: RawFd) -> HalResult<()> {
    unistd::dup2(src, dst)
        .map(|_| ())
        .map_err(|errno| HalError::sys("dup2", errno))
}

pub fn close_fd(fd: RawFd) -> HalResult<()> {
    unistd::close(fd).map_err(|errno| HalError::sys("close", errno))
}

/// Whether `fd` currently refers to an open description.
pub fn fd_is_open(fd: RawFd) -> bool {
    fcntl(fd, FcntlArg::F_GETFD).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;

    #[test]
    fn pipe_carries_bytes() {
        let (r, w) = create_pipe().unwrap();
        let mut wf = std::fs::File::from(w);
        wf.write_all(b"ping").unwrap();
        drop(wf);
        let mut rf = std::fs::File::from(r);
        let mut buf = String::new();
        rf.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "ping");
    }

    #[test]
    fn duplicate_lands_at_or_above_minimum() {
        let (r, _w) = create_pipe().unwrap();
        let dup = duplicate_above(r.as_raw_fd(), 10).unwrap();
        assert!(dup.as_raw_fd() >= 10);
        assert!(fd_is_open(dup.as_raw_fd()));
    }
}
