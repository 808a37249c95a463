//! The `twsh` binary: read, parse, execute.
//!
//! The loop body is also the job-control notification point: before each
//! prompt the shell reaps children flagged by SIGCHLD, reports Done/Stopped
//! jobs, and runs any queued trap handlers. The process exits with the last
//! command's status, after firing the EXIT trap exactly once.

use anyhow::Context;
use std::io::{self, BufRead, Write};
use twsh_core::{ExecutionContext, Executor, Outcome};
use twsh_hal::{signal, terminal};
use twsh_parser::ParseError;

fn main() {
    init_logging();

    let interactive = terminal::stdin_is_tty();
    let mut ctx = match setup(interactive) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("twsh: {err:#}");
            std::process::exit(1);
        }
    };

    let mut executor = Executor::new();
    let status = repl(&mut executor, &mut ctx, interactive);
    executor.run_exit_trap(&mut ctx);
    std::process::exit(status & 0xff);
}

fn setup(interactive: bool) -> anyhow::Result<ExecutionContext> {
    signal::watch_children().context("installing SIGCHLD watcher")?;
    let mut ctx = ExecutionContext::new(interactive);
    if interactive {
        let pgid = terminal::adopt_own_process_group().context("claiming a process group")?;
        ctx.shell_pgid = pgid;
        signal::protect_interactive_shell().context("setting signal dispositions")?;
        let _ = terminal::give_terminal_to(ctx.shell_pgid);
        tracing::debug!(pgid = pgid.as_raw(), "interactive session");
    }
    Ok(ctx)
}

fn repl(executor: &mut Executor, ctx: &mut ExecutionContext, interactive: bool) -> i32 {
    let stdin = io::stdin();
    // Accumulates lines until the parser stops reporting Incomplete, so
    // multi-line constructs work at the prompt.
    let mut pending = String::new();

    loop {
        // Notification point: fold in child state changes, report them, and
        // run queued traps before touching the next command.
        signal::take_child_pending();
        ctx.jobs.reap();
        for line in ctx.jobs.take_notifications() {
            eprintln!("{line}");
        }
        if let Some(Outcome::Exit(code)) = executor.run_pending_traps(ctx) {
            return code;
        }

        if interactive {
            let prompt = if pending.is_empty() { "twsh$ " } else { "> " };
            eprint!("{prompt}");
            let _ = io::stderr().flush();
        }

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                if !pending.trim().is_empty() {
                    eprintln!("twsh: syntax error: unexpected end of file");
                    ctx.set_last_status(2);
                }
                return ctx.last_status;
            }
            Ok(_) => {}
            Err(err) => {
                eprintln!("twsh: read error: {err}");
                return 1;
            }
        }

        pending.push_str(&line);
        if pending.trim().is_empty() {
            pending.clear();
            continue;
        }

        match twsh_parser::parse(&pending) {
            Err(ParseError::Incomplete) => continue,
            Err(err) => {
                eprintln!("twsh: {err}");
                ctx.set_last_status(2);
                pending.clear();
            }
            Ok(ast) => {
                pending.clear();
                if let Outcome::Exit(code) = executor.run(&ast, ctx) {
                    return code;
                }
            }
        }
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("TWSH_LOG").unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
