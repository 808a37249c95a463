//! The `wait` builtin.

use super::BuiltinIo;
use crate::context::ExecutionContext;
use crate::error::ShellResult;
use crate::job::JobId;
use crate::pipeline;
use std::io::Write;
use twsh_hal::Pid;

/// `wait [jobspec|pid…]`: block until the named jobs (or every job) reach a
/// terminal state. Returns the last awaited job's status, 0 when waiting
/// for everything.
pub fn wait(args: &[String], ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    if args.is_empty() {
        let ids: Vec<JobId> = ctx.jobs.iter().map(|j| j.id).collect();
        for id in ids {
            pipeline::wait_for_job_members(ctx, id)?;
            settle(ctx, id);
        }
        return Ok(0);
    }

    let mut status = 0;
    for arg in args {
        let id = if arg.starts_with('%') {
            match ctx.jobs.resolve(arg) {
                Ok(id) => id,
                Err(err) => {
                    writeln!(io.stderr, "wait: {err}")?;
                    status = 127;
                    continue;
                }
            }
        } else {
            let pid = match arg.parse::<i32>() {
                Ok(pid) => Pid::from_raw(pid),
                Err(_) => {
                    writeln!(io.stderr, "wait: {arg}: not a pid or valid job spec")?;
                    status = 2;
                    continue;
                }
            };
            match ctx.jobs.find_by_pid(pid) {
                Some(id) => id,
                None => {
                    writeln!(io.stderr, "wait: pid {arg} is not a child of this shell")?;
                    status = 127;
                    continue;
                }
            }
        };

        pipeline::wait_for_job_members(ctx, id)?;
        if let Some(job) = ctx.jobs.get(id) {
            status = job.exit_status(ctx.options.pipefail);
        }
        settle(ctx, id);
    }
    Ok(status)
}

/// Drop a job that finished while being awaited; an explicit `wait` is an
/// acknowledgment, no Done notification is owed afterwards.
fn settle(ctx: &mut ExecutionContext, id: JobId) {
    if ctx.jobs.get(id).is_some_and(|j| j.is_done()) {
        ctx.jobs.remove(id);
    }
}
