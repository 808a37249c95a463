//! The `fg` builtin: move a job to the foreground and wait for it.

use super::BuiltinIo;
use crate::context::ExecutionContext;
use crate::error::ShellResult;
use crate::pipeline;
use std::io::Write;
use twsh_hal::{process, Signal};

pub fn fg(args: &[String], ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    let id = match args.first() {
        Some(spec) => ctx.jobs.resolve(spec)?,
        None => ctx.jobs.resolve("%+")?,
    };

    let Some(job) = ctx.jobs.get(id) else {
        return Err(crate::error::ShellError::job_spec(&format!("%{id}")));
    };
    let (pgid, was_stopped, command) = (job.pgid, job.is_stopped(), job.command.clone());

    writeln!(io.stdout, "{command}")?;

    if was_stopped {
        process::kill_group(pgid, Signal::SIGCONT)?;
    }
    if let Some(job) = ctx.jobs.get_mut(id) {
        job.continue_all(true);
    }

    pipeline::wait_for_foreground_job(ctx, id)
}
