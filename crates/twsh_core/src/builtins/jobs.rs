//! `jobs` and `disown`.

use super::BuiltinIo;
use crate::context::ExecutionContext;
use crate::error::ShellResult;
use std::io::Write;

/// `jobs [-lp] [jobspec…]`.
pub fn jobs(args: &[String], ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    // Fold in any state changes first so the listing is fresh.
    ctx.jobs.reap();

    let mut show_pids = false;
    let mut pgid_only = false;
    let mut specs = Vec::new();
    for arg in args {
        match arg.as_str() {
            "-l" => show_pids = true,
            "-p" => pgid_only = true,
            spec => specs.push(spec),
        }
    }

    let selected: Vec<u32> = if specs.is_empty() {
        ctx.jobs.iter().map(|j| j.id).collect()
    } else {
        let mut ids = Vec::new();
        for spec in specs {
            ids.push(ctx.jobs.resolve(spec)?);
        }
        ids
    };

    for id in selected {
        let marker = ctx.jobs.marker(id);
        let Some(job) = ctx.jobs.get(id) else { continue };
        if pgid_only {
            writeln!(io.stdout, "{}", job.pgid.as_raw())?;
            continue;
        }
        if show_pids {
            let pids: Vec<String> = job
                .processes
                .iter()
                .map(|p| p.pid.as_raw().to_string())
                .collect();
            writeln!(
                io.stdout,
                "[{}]{} {} {:<10} {}",
                job.id,
                marker,
                pids.join(" "),
                job.state.to_string(),
                job.command
            )?;
        } else {
            writeln!(
                io.stdout,
                "[{}]{}  {:<10} {}",
                job.id,
                marker,
                job.state.to_string(),
                job.command
            )?;
        }
    }
    Ok(0)
}

/// `disown [jobspec…]` — drop jobs from the table without signaling them.
pub fn disown(args: &[String], ctx: &mut ExecutionContext, _io: &mut BuiltinIo) -> ShellResult<i32> {
    if args.is_empty() {
        if let Some(id) = ctx.jobs.current_id() {
            ctx.jobs.remove(id);
        }
        return Ok(0);
    }
    for spec in args {
        let id = ctx.jobs.resolve(spec)?;
        ctx.jobs.remove(id);
    }
    Ok(0)
}
