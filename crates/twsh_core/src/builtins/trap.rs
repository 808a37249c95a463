//! The `trap` builtin.

use super::BuiltinIo;
use crate::context::ExecutionContext;
use crate::error::{ShellError, ShellResult};
use crate::trap::{TrapAction, TrapSignal};
use std::io::Write;
use twsh_hal::{signal as hal_signal, Signal};

/// `trap [-lp] [action signal…]`.
///
/// `trap - SIG` resets to the default disposition, `trap '' SIG` ignores,
/// anything else registers command text to run when the signal is taken.
pub fn trap(args: &[String], ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    match args.first().map(String::as_str) {
        None | Some("-p") => {
            for (signal, action) in ctx.traps.registered() {
                match action {
                    TrapAction::Command(text) => {
                        writeln!(io.stdout, "trap -- '{text}' {}", signal.name())?
                    }
                    TrapAction::Ignore => writeln!(io.stdout, "trap -- '' {}", signal.name())?,
                    TrapAction::Default => {}
                }
            }
            Ok(0)
        }
        Some("-l") => {
            for signal in Signal::iterator() {
                write!(io.stdout, "{:>2}) {}  ", signal as i32, hal_signal::signal_name(signal))?;
            }
            writeln!(io.stdout)?;
            Ok(0)
        }
        Some(action_word) => {
            if args.len() < 2 {
                return Err(ShellError::usage("trap: usage: trap [-lp] action signal…"));
            }
            let action = match action_word {
                "-" => TrapAction::Default,
                "" => TrapAction::Ignore,
                text => TrapAction::Command(text.to_string()),
            };
            for spec in &args[1..] {
                let signal = TrapSignal::parse(spec)?;
                ctx.traps.set(signal, action.clone(), ctx.interactive)?;
            }
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_list_and_reset() {
        let mut ctx = ExecutionContext::new(false);
        let (mut io, _out, _err) = BuiltinIo::capture();
        trap(
            &["echo bye".to_string(), "EXIT".to_string()],
            &mut ctx,
            &mut io,
        )
        .unwrap();
        assert_eq!(
            ctx.traps.command_for(TrapSignal::Exit),
            Some("echo bye")
        );

        let (mut io, out, _err) = BuiltinIo::capture();
        trap(&[], &mut ctx, &mut io).unwrap();
        assert!(out.contents().contains("trap -- 'echo bye' EXIT"));

        let (mut io, _out, _err) = BuiltinIo::capture();
        trap(&["-".to_string(), "EXIT".to_string()], &mut ctx, &mut io).unwrap();
        assert_eq!(ctx.traps.command_for(TrapSignal::Exit), None);
    }

    #[test]
    fn empty_action_ignores() {
        let mut ctx = ExecutionContext::new(false);
        let (mut io, _out, _err) = BuiltinIo::capture();
        trap(&["".to_string(), "USR1".to_string()], &mut ctx, &mut io).unwrap();
        assert_eq!(
            *ctx.traps.get(TrapSignal::Sig(Signal::SIGUSR1)),
            TrapAction::Ignore
        );
    }

    #[test]
    fn missing_signal_is_usage_error() {
        let mut ctx = ExecutionContext::new(false);
        let (mut io, _out, _err) = BuiltinIo::capture();
        assert!(trap(&["echo hi".to_string()], &mut ctx, &mut io).is_err());
    }
}
