//! The `bg` builtin: resume a stopped job in the background.

use super::BuiltinIo;
use crate::context::ExecutionContext;
use crate::error::{ShellError, ShellResult};
use std::io::Write;
use twsh_hal::{process, Signal};

pub fn bg(args: &[String], ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    let id = match args.first() {
        Some(spec) => ctx.jobs.resolve(spec)?,
        None => ctx.jobs.resolve("%+")?,
    };

    let Some(job) = ctx.jobs.get(id) else {
        return Err(ShellError::job_spec(&format!("%{id}")));
    };
    let (pgid, stopped, command) = (job.pgid, job.is_stopped(), job.command.clone());
    if !stopped {
        return Err(ShellError::usage(format!("bg: job {id} already in background")));
    }

    process::kill_group(pgid, Signal::SIGCONT)?;
    if let Some(job) = ctx.jobs.get_mut(id) {
        job.continue_all(false);
    }
    writeln!(io.stdout, "[{id}]{} {command} &", ctx.jobs.marker(id))?;
    Ok(0)
}
