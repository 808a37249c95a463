//! Signal dispositions and deferred delivery.
//!
//! Handlers installed here never touch shell state: they only flip atomic
//! flags that the main loop polls at its safe points (flag-and-poll, per the
//! job-table consistency requirement). Everything else — trap lookup, job
//! table updates — happens synchronously in the shell's single thread.

use crate::error::{HalError, HalResult};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// One bit per signal number, set from the handler, drained by the main loop.
static PENDING: AtomicU64 = AtomicU64::new(0);
static SIGCHLD_PENDING: AtomicBool = AtomicBool::new(false);

extern "C" fn note_signal(signum: libc::c_int) {
    if signum == libc::SIGCHLD {
        SIGCHLD_PENDING.store(true, Ordering::Relaxed);
    }
    if (1..64).contains(&signum) {
        PENDING.fetch_or(1u64 << signum, Ordering::Relaxed);
    }
}

fn install(signal: Signal, handler: SigHandler) -> HalResult<()> {
    let action = SigAction::new(handler, SaFlags::SA_RESTART, SigSet::empty());
    // Safety: note_signal is async-signal-safe (atomic stores only).
    unsafe { sigaction(signal, &action) }
        .map(|_| ())
        .map_err(|errno| HalError::sys("sigaction", errno))
}

/// Route `signal` through the pending-flag mechanism.
pub fn catch(signal: Signal) -> HalResult<()> {
    install(signal, SigHandler::Handler(note_signal))
}

pub fn ignore(signal: Signal) -> HalResult<()> {
    install(signal, SigHandler::SigIgn)
}

pub fn restore_default(signal: Signal) -> HalResult<()> {
    install(signal, SigHandler::SigDfl)
}

/// Drain and return the signals flagged since the last call, lowest number
/// first. SIGCHLD is reported through `take_child_pending` instead.
pub fn take_pending() -> Vec<Signal> {
    let bits = PENDING.swap(0, Ordering::Relaxed);
    if bits == 0 {
        return Vec::new();
    }
    (1..64)
        .filter(|n| bits & (1u64 << n) != 0)
        .filter(|n| *n != libc::SIGCHLD as u64)
        .filter_map(|n| Signal::try_from(n as i32).ok())
        .collect()
}

/// True once per SIGCHLD burst; clears the flag.
pub fn take_child_pending() -> bool {
    SIGCHLD_PENDING.swap(false, Ordering::Relaxed)
}

/// Arrange for SIGCHLD to be noted (never handled inline).
pub fn watch_children() -> HalResult<()> {
    catch(Signal::SIGCHLD)
}

/// Dispositions for an interactive shell: keyboard and job-control signals
/// must not kill or stop the shell itself. SIGINT is routed through the
/// pending flags so traps and line-abort still observe it.
pub fn protect_interactive_shell() -> HalResult<()> {
    catch(Signal::SIGINT)?;
    ignore(Signal::SIGQUIT)?;
    ignore(Signal::SIGTSTP)?;
    ignore(Signal::SIGTTIN)?;
    ignore(Signal::SIGTTOU)?;
    Ok(())
}

/// Reset dispositions in a forked child before it execs or runs command
/// logic; children take the default fate for keyboard signals.
pub fn reset_for_child() {
    for signal in [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGCHLD,
    ] {
        let _ = restore_default(signal);
    }
}

/// Resolve a user-supplied signal spec: `INT`, `SIGINT`, or a number.
pub fn parse_signal(spec: &str) -> HalResult<Signal> {
    if let Ok(n) = spec.parse::<i32>() {
        return Signal::try_from(n).map_err(|_| HalError::UnknownSignal(spec.to_string()));
    }
    let upper = spec.to_ascii_uppercase();
    let name = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    };
    Signal::from_str(&name).map_err(|_| HalError::UnknownSignal(spec.to_string()))
}

/// Canonical short name (`INT`, `TERM`, …) for messages and `trap -p`.
pub fn signal_name(signal: Signal) -> String {
    format!("{signal:?}").trim_start_matches("SIG").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_numbers() {
        assert_eq!(parse_signal("INT").unwrap(), Signal::SIGINT);
        assert_eq!(parse_signal("SIGTERM").unwrap(), Signal::SIGTERM);
        assert_eq!(parse_signal("9").unwrap(), Signal::SIGKILL);
        assert!(parse_signal("NOTASIGNAL").is_err());
    }

    #[test]
    fn short_names_round_trip() {
        assert_eq!(signal_name(Signal::SIGINT), "INT");
        assert_eq!(signal_name(Signal::SIGUSR1), "USR1");
    }

    #[test]
    fn pending_flags_drain_once() {
        note_signal(libc::SIGUSR2);
        let first = take_pending();
        assert!(first.contains(&Signal::SIGUSR2));
        assert!(take_pending().is_empty());
    }
}
