//! The `kill` builtin, job-spec aware.

use super::BuiltinIo;
use crate::context::ExecutionContext;
use crate::error::{ShellError, ShellResult};
use std::io::Write;
use twsh_hal::{process, signal as hal_signal, Pid, Signal};

/// `kill [-s SIG | -SIG] target…` where targets are pids or `%` job specs.
pub fn kill(args: &[String], ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    let mut signal = Signal::SIGTERM;
    let mut targets: Vec<&str> = Vec::new();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-l" => {
                for sig in Signal::iterator() {
                    write!(io.stdout, "{:>2}) {}  ", sig as i32, hal_signal::signal_name(sig))?;
                }
                writeln!(io.stdout)?;
                return Ok(0);
            }
            "-s" => {
                let Some(name) = iter.next() else {
                    return Err(ShellError::usage("kill: -s requires a signal name"));
                };
                signal = hal_signal::parse_signal(name)
                    .map_err(|_| ShellError::usage(format!("kill: {name}: invalid signal")))?;
            }
            flag if flag.starts_with('-') && flag.len() > 1 => {
                signal = hal_signal::parse_signal(&flag[1..])
                    .map_err(|_| ShellError::usage(format!("kill: {flag}: invalid signal")))?;
            }
            target => targets.push(target),
        }
    }

    if targets.is_empty() {
        return Err(ShellError::usage("kill: usage: kill [-s SIG] pid|%job …"));
    }

    let mut status = 0;
    for target in targets {
        let result = if target.starts_with('%') {
            match ctx.jobs.resolve(target).and_then(|id| {
                ctx.jobs
                    .get(id)
                    .map(|j| j.pgid)
                    .ok_or_else(|| ShellError::job_spec(target))
            }) {
                Ok(pgid) => process::kill_group(pgid, signal).map_err(Into::into),
                Err(err) => Err(err),
            }
        } else {
            match target.parse::<i32>() {
                Ok(pid) => process::kill_process(Pid::from_raw(pid), signal).map_err(Into::into),
                Err(_) => Err(ShellError::usage(format!(
                    "kill: {target}: arguments must be pids or job specs"
                ))),
            }
        };
        if let Err(err) = result {
            writeln!(io.stderr, "kill: {err}")?;
            status = 1;
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_signal_and_missing_targets() {
        let mut ctx = ExecutionContext::new(false);
        let (mut io, _out, _err) = BuiltinIo::capture();
        assert!(kill(&["-NOTASIG".to_string(), "1".to_string()], &mut ctx, &mut io).is_err());
        assert!(kill(&[], &mut ctx, &mut io).is_err());
    }

    #[test]
    fn unknown_job_spec_reports_and_fails() {
        let mut ctx = ExecutionContext::new(false);
        let (mut io, _out, err) = BuiltinIo::capture();
        let status = kill(&["%7".to_string()], &mut ctx, &mut io).unwrap();
        assert_eq!(status, 1);
        assert!(err.contents().contains("no such job"));
    }
}
