//! Pipeline and process orchestration.
//!
//! Forks pipeline stages, wires the pipes, assigns the shared process
//! group, hands the pid set to the job table as one Job, and waits (or
//! doesn't, for `&`). The in-process rule for single builtin/function
//! commands lives in the executor; by the time control reaches here every
//! stage runs in a forked child.

use crate::context::ExecutionContext;
use crate::error::{ErrorKind, ShellError, ShellResult};
use crate::executor::Executor;
use crate::job::{JobId, JobState};
use std::os::fd::{AsRawFd, OwnedFd};
use twsh_hal::{pipe, process, signal, terminal, Forked, Pid, Signal, WaitEvent};
use twsh_parser::ast::AstNode;

/// Launch `stages` as one job. Returns the job's exit status for foreground
/// runs, or 0 immediately for background ones.
pub(crate) fn run_pipeline(
    executor: &mut Executor,
    ctx: &mut ExecutionContext,
    stages: &[&AstNode],
    background: bool,
    command_text: String,
) -> ShellResult<i32> {
    debug_assert!(!stages.is_empty());
    tracing::debug!(stages = stages.len(), background, %command_text, "launch pipeline");

    // Pipe pair between stage i and i+1.
    let mut pipes: Vec<(OwnedFd, OwnedFd)> = Vec::new();
    for _ in 1..stages.len() {
        pipes.push(pipe::create_pipe()?);
    }

    let mut pids: Vec<Pid> = Vec::new();
    let mut pgid: Option<Pid> = None;

    for (index, stage) in stages.iter().enumerate() {
        let stdin_fd = if index > 0 {
            Some(pipes[index - 1].0.as_raw_fd())
        } else {
            None
        };
        let stdout_fd = if index < stages.len() - 1 {
            Some(pipes[index].1.as_raw_fd())
        } else {
            None
        };

        match process::fork() {
            Ok(Forked::Child) => {
                child_setup(ctx, pgid, background, stdin_fd, stdout_fd, &pipes);
                // Never returns.
                executor.run_stage_in_child(stage, ctx);
            }
            Ok(Forked::Parent { child }) => {
                let group = pgid.unwrap_or(child);
                // Mirror the child's setpgid to close the race.
                let _ = process::set_process_group(child, group);
                pgid = Some(group);
                pids.push(child);
            }
            Err(err) => {
                // Resource exhaustion: the command is aborted, the shell
                // survives. Stages already launched are still collected.
                eprintln!("twsh: fork: {err}");
                if pids.is_empty() {
                    return Err(ShellError::new(ErrorKind::ForkFailure, err.to_string()));
                }
                break;
            }
        }
    }

    // Parent must drop its pipe ends or readers never see EOF.
    drop(pipes);

    let Some(pgid) = pgid else {
        return Err(ShellError::internal("pipeline launched zero stages"));
    };
    let state = if background {
        JobState::Background
    } else {
        JobState::Foreground
    };
    let job_id = ctx.jobs.create(pgid, &pids, command_text, state);

    if background {
        // `&` returns immediately; `$!` tracks the last stage.
        ctx.last_bg_pid = pids.last().copied();
        if ctx.interactive {
            eprintln!("[{job_id}] {}", pids.last().copied().map(Pid::as_raw).unwrap_or(0));
        }
        return Ok(0);
    }

    wait_for_foreground_job(ctx, job_id)
}

/// Child-side setup between fork and stage logic: process group, default
/// signal dispositions, pipe wiring.
fn child_setup(
    ctx: &mut ExecutionContext,
    pgid: Option<Pid>,
    background: bool,
    stdin_fd: Option<i32>,
    stdout_fd: Option<i32>,
    pipes: &[(OwnedFd, OwnedFd)],
) {
    signal::reset_for_child();
    let own = Pid::from_raw(0);
    let group = pgid.unwrap_or(own);
    let _ = process::set_process_group(own, group);

    // First stage of an interactive foreground job claims the terminal from
    // the child side too; whichever of parent/child runs first wins.
    if ctx.interactive && ctx.options.monitor && !background && pgid.is_none() {
        let _ = terminal::give_terminal_to(process::current_process_group());
    }

    if let Some(fd) = stdin_fd {
        let _ = pipe::replace_fd(fd, 0);
    }
    if let Some(fd) = stdout_fd {
        let _ = pipe::replace_fd(fd, 1);
    }
    // Close every pipe end inherited from the parent; the dup2'd copies on
    // 0/1 survive.
    for (read_end, write_end) in pipes {
        let _ = pipe::close_fd(read_end.as_raw_fd());
        let _ = pipe::close_fd(write_end.as_raw_fd());
    }

    // The child is an ordinary non-interactive context from here on.
    ctx.interactive = false;
    ctx.options.monitor = false;
}

/// Block until every member of `job_id` is Done or Stopped. No terminal
/// handling: this is the raw wait used by both foreground execution and the
/// `wait` builtin.
pub(crate) fn wait_for_job_members(
    ctx: &mut ExecutionContext,
    job_id: JobId,
) -> ShellResult<()> {
    let Some(job) = ctx.jobs.get(job_id) else {
        return Ok(());
    };
    let pgid = job.pgid;

    loop {
        let settled = {
            let Some(job) = ctx.jobs.get(job_id) else { break };
            job.is_done() || job.is_stopped()
        };
        if settled {
            break;
        }
        match process::wait_process_group(pgid, true) {
            Ok(Some(event)) => {
                if let Some(job) = ctx.jobs.get_mut(job_id) {
                    job.apply_wait_event(event);
                }
            }
            Ok(None) => {
                // ECHILD: everything already reaped. Whatever we did not
                // observe is treated as exited.
                tracing::warn!(job = job_id, "wait returned no children");
                if let Some(job) = ctx.jobs.get_mut(job_id) {
                    let missing: Vec<Pid> = job
                        .processes
                        .iter()
                        .filter(|p| !p.status.is_terminal())
                        .map(|p| p.pid)
                        .collect();
                    for pid in missing {
                        job.apply_wait_event(WaitEvent::Exited { pid, status: 0 });
                    }
                }
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Block until every member of the job is Done or Stopped, then settle
/// terminal ownership and compute the combined status.
pub(crate) fn wait_for_foreground_job(
    ctx: &mut ExecutionContext,
    job_id: JobId,
) -> ShellResult<i32> {
    let Some(job) = ctx.jobs.get(job_id) else {
        return Err(ShellError::internal(format!("job {job_id} vanished")));
    };
    let pgid = job.pgid;

    if ctx.interactive && ctx.options.monitor {
        let _ = terminal::give_terminal_to(pgid);
    }

    let waited = wait_for_job_members(ctx, job_id);
    reclaim_terminal(ctx)?;
    waited?;

    let Some(job) = ctx.jobs.get(job_id) else {
        return Ok(0);
    };

    if job.is_stopped() {
        // Job keeps its table entry; report like bash does after ^Z.
        let line = format!(
            "[{}]{}  Stopped                 {}",
            job.id,
            ctx.jobs.marker(job_id),
            job.command
        );
        eprintln!("\r{line}");
        if let Some(job) = ctx.jobs.get_mut(job_id) {
            job.acknowledge();
        }
        return Ok(128 + Signal::SIGTSTP as i32);
    }

    let status = job.exit_status(ctx.options.pipefail);
    report_signal_death(job);
    ctx.jobs.remove(job_id);
    Ok(status)
}

/// Print the customary one-liner when a foreground job dies from a signal
/// other than SIGINT or SIGPIPE.
fn report_signal_death(job: &crate::job::Job) {
    use crate::job::ProcessStatus;
    if let Some(last) = job.processes.last() {
        if let ProcessStatus::Signaled(sig) = last.status {
            if sig != Signal::SIGINT as i32 && sig != Signal::SIGPIPE as i32 {
                let name = Signal::try_from(sig)
                    .map(signal::signal_name)
                    .unwrap_or_else(|_| format!("signal {sig}"));
                eprintln!("{name}: {}", job.command);
            }
        }
    }
}

fn reclaim_terminal(ctx: &ExecutionContext) -> ShellResult<()> {
    if ctx.interactive && ctx.options.monitor {
        terminal::give_terminal_to(ctx.shell_pgid)?;
    }
    Ok(())
}
