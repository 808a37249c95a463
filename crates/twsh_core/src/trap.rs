//! Trap registration and deferred dispatch.
//!
//! `trap cmd SIG…` stores handler text here; asynchronous signals only set
//! HAL pending flags, and the executor drains them at safe points between
//! commands. EXIT / ERR / DEBUG are pseudo-traps the executor fires
//! directly at the matching lifecycle moment.

use crate::error::{ShellError, ShellResult};
use std::collections::HashMap;
use twsh_hal::{signal as hal_signal, Signal};

/// What a trap can name: a real signal or one of the pseudo-signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapSignal {
    Exit,
    Err,
    Debug,
    Sig(Signal),
}

impl TrapSignal {
    /// Parse a spec as the `trap` builtin accepts it: `EXIT`, `0`, `ERR`,
    /// `DEBUG`, `INT`, `SIGINT`, or a signal number.
    pub fn parse(spec: &str) -> ShellResult<Self> {
        match spec.to_ascii_uppercase().as_str() {
            "EXIT" | "0" => Ok(Self::Exit),
            "ERR" => Ok(Self::Err),
            "DEBUG" => Ok(Self::Debug),
            other => hal_signal::parse_signal(other)
                .map(Self::Sig)
                .map_err(|_| ShellError::usage(format!("trap: {spec}: invalid signal specification"))),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Exit => "EXIT".to_string(),
            Self::Err => "ERR".to_string(),
            Self::Debug => "DEBUG".to_string(),
            Self::Sig(sig) => hal_signal::signal_name(*sig),
        }
    }
}

/// Registered disposition for one trap signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapAction {
    Default,
    Ignore,
    Command(String),
}

/// The trap table plus the bookkeeping for one-shot EXIT delivery.
#[derive(Debug, Clone, Default)]
pub struct TrapTable {
    handlers: HashMap<TrapSignal, TrapAction>,
    exit_trap_fired: bool,
}

impl TrapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a disposition and align the OS handler for real signals.
    /// `interactive` decides what "default" means for keyboard signals: an
    /// interactive shell keeps protecting itself rather than reverting to
    /// SIG_DFL.
    pub fn set(&mut self, signal: TrapSignal, action: TrapAction, interactive: bool) -> ShellResult<()> {
        if let TrapSignal::Sig(sig) = signal {
            match &action {
                TrapAction::Command(_) => hal_signal::catch(sig)?,
                TrapAction::Ignore => hal_signal::ignore(sig)?,
                TrapAction::Default => restore_baseline(sig, interactive)?,
            }
        }
        match action {
            TrapAction::Default => {
                self.handlers.remove(&signal);
            }
            other => {
                self.handlers.insert(signal, other);
            }
        }
        Ok(())
    }

    pub fn get(&self, signal: TrapSignal) -> &TrapAction {
        self.handlers.get(&signal).unwrap_or(&TrapAction::Default)
    }

    /// Handler text if (and only if) a command trap is registered.
    pub fn command_for(&self, signal: TrapSignal) -> Option<&str> {
        match self.handlers.get(&signal) {
            Some(TrapAction::Command(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Registered traps in a stable order, for `trap -p`.
    pub fn registered(&self) -> Vec<(TrapSignal, &TrapAction)> {
        let mut entries: Vec<_> = self.handlers.iter().map(|(s, a)| (*s, a)).collect();
        entries.sort_by_key(|(s, _)| s.name());
        entries
    }

    /// Take the EXIT trap's command, at most once per shell lifetime —
    /// every termination path funnels through this.
    pub fn take_exit_trap(&mut self) -> Option<String> {
        if self.exit_trap_fired {
            return None;
        }
        self.exit_trap_fired = true;
        match self.handlers.get(&TrapSignal::Exit) {
            Some(TrapAction::Command(text)) => Some(text.clone()),
            _ => None,
        }
    }
}

/// What "default disposition" means for this shell instance.
fn restore_baseline(sig: Signal, interactive: bool) -> ShellResult<()> {
    if interactive {
        match sig {
            Signal::SIGINT => return Ok(hal_signal::catch(sig)?),
            Signal::SIGQUIT | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU => {
                return Ok(hal_signal::ignore(sig)?)
            }
            _ => {}
        }
    }
    if sig == Signal::SIGCHLD {
        // Child reaping always stays routed through the pending flag.
        return Ok(hal_signal::watch_children()?);
    }
    Ok(hal_signal::restore_default(sig)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_pseudo_and_real_signals() {
        assert_eq!(TrapSignal::parse("EXIT").unwrap(), TrapSignal::Exit);
        assert_eq!(TrapSignal::parse("0").unwrap(), TrapSignal::Exit);
        assert_eq!(TrapSignal::parse("debug").unwrap(), TrapSignal::Debug);
        assert_eq!(
            TrapSignal::parse("INT").unwrap(),
            TrapSignal::Sig(Signal::SIGINT)
        );
        assert!(TrapSignal::parse("BOGUS").is_err());
    }

    #[test]
    fn exit_trap_fires_exactly_once() {
        let mut traps = TrapTable::new();
        traps
            .set(
                TrapSignal::Exit,
                TrapAction::Command("echo bye".into()),
                false,
            )
            .unwrap();
        assert_eq!(traps.take_exit_trap().as_deref(), Some("echo bye"));
        assert_eq!(traps.take_exit_trap(), None);
    }

    #[test]
    fn default_unregisters_a_handler() {
        let mut traps = TrapTable::new();
        traps
            .set(TrapSignal::Err, TrapAction::Command("log".into()), false)
            .unwrap();
        assert!(traps.command_for(TrapSignal::Err).is_some());
        traps.set(TrapSignal::Err, TrapAction::Default, false).unwrap();
        assert!(traps.command_for(TrapSignal::Err).is_none());
        assert_eq!(*traps.get(TrapSignal::Err), TrapAction::Default);
    }
}
