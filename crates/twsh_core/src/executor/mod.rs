//! AST executor.
//!
//! Visits AST nodes, drives control flow, and composes the scope, redirect,
//! trap, pipeline, and job components. Control flow (break/continue/return/
//! exit) is an explicit `Outcome` value returned from every execution call
//! and matched at each loop and function boundary — there are no hidden
//! control paths.

mod pattern;

use crate::builtins::{self, BuiltinIo};
use crate::context::ExecutionContext;
use crate::error::{ErrorKind, ShellError, ShellResult};
use crate::expand::{BasicExpander, WordExpander};
use crate::pipeline;
use crate::redirect::{self, RedirScope};
use crate::trap::TrapSignal;
use std::io::Write;
use std::rc::Rc;
use twsh_hal::{process, signal as hal_signal};
use twsh_parser::ast::{AndOrOp, Assignment, AstNode, Redirect};

pub use pattern::pattern_matches;

/// Evaluation nesting ceiling; exceeding it aborts the current top-level
/// command instead of overflowing the host stack.
const MAX_EVAL_DEPTH: usize = 1000;

/// Result of executing a node. `Normal` carries the exit status; the other
/// variants ride up the tree until a loop, function boundary, or the top
/// level consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Normal(i32),
    Break(u32),
    Continue(u32),
    Return(i32),
    /// The whole shell should terminate with this status.
    Exit(i32),
}

impl Outcome {
    pub fn code(&self) -> i32 {
        match self {
            Outcome::Normal(code) | Outcome::Return(code) | Outcome::Exit(code) => *code,
            Outcome::Break(_) | Outcome::Continue(_) => 0,
        }
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, Outcome::Normal(_))
    }
}

/// Condition evaluation either yields a status or a control-flow outcome
/// that must keep propagating.
enum CondResult {
    Status(i32),
    Flow(Outcome),
}

/// The executor: holds the expansion seam and the little bits of dynamic
/// state (nesting depths) that are not shell-wide.
pub struct Executor {
    pub(crate) expander: Box<dyn WordExpander>,
    depth: usize,
    /// Number of enclosing loop constructs at the current point.
    loop_depth: usize,
    /// Non-zero inside `if`/`while` conditions, `&&`/`||` non-final
    /// elements, and `!` pipelines: errexit and the ERR trap are suspended.
    condition_depth: usize,
    /// True while a trap handler body runs; suppresses recursive traps.
    in_trap: bool,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self::with_expander(Box::new(BasicExpander))
    }

    /// Plug in an external expansion engine.
    pub fn with_expander(expander: Box<dyn WordExpander>) -> Self {
        Self {
            expander,
            depth: 0,
            loop_depth: 0,
            condition_depth: 0,
            in_trap: false,
        }
    }

    /// Top-level entry: execute one parsed input, converting errors and
    /// stray control flow into a final `Normal`/`Exit`.
    pub fn run(&mut self, node: &AstNode, ctx: &mut ExecutionContext) -> Outcome {
        if let Some(exit) = self.run_pending_traps(ctx) {
            return exit;
        }
        match self.execute(node, ctx) {
            Ok(Outcome::Break(_)) | Ok(Outcome::Continue(_)) | Ok(Outcome::Return(_)) => {
                Outcome::Normal(ctx.last_status)
            }
            Ok(outcome) => outcome,
            Err(err) if err.is_fatal() => {
                eprintln!("twsh: fatal: {err}");
                Outcome::Exit(err.exit_status())
            }
            Err(err) => {
                eprintln!("twsh: {err}");
                ctx.set_last_status(err.exit_status());
                Outcome::Normal(ctx.last_status)
            }
        }
    }

    /// Execute one node. Exhaustive over the node kinds.
    pub fn execute(&mut self, node: &AstNode, ctx: &mut ExecutionContext) -> ShellResult<Outcome> {
        self.depth += 1;
        if self.depth > MAX_EVAL_DEPTH {
            self.depth -= 1;
            return Err(ShellError::new(
                ErrorKind::EvalDepthExceeded,
                format!("expression recursion level exceeded ({MAX_EVAL_DEPTH})"),
            ));
        }
        let result = self.dispatch(node, ctx);
        self.depth -= 1;
        result
    }

    fn dispatch(&mut self, node: &AstNode, ctx: &mut ExecutionContext) -> ShellResult<Outcome> {
        match node {
            AstNode::Sequence(items) => {
                let mut last = Outcome::Normal(ctx.last_status);
                for item in items {
                    if let Some(exit) = self.run_pending_traps(ctx) {
                        return Ok(exit);
                    }
                    if item.background {
                        let status = match self.launch_background(&item.node, ctx) {
                            Ok(status) => status,
                            Err(err) if err.is_fatal() => return Err(err),
                            Err(err) => {
                                eprintln!("twsh: {err}");
                                err.exit_status()
                            }
                        };
                        ctx.set_last_status(status);
                        last = Outcome::Normal(ctx.last_status);
                    } else {
                        match self.execute(&item.node, ctx)? {
                            Outcome::Normal(status) => last = Outcome::Normal(status),
                            other => return Ok(other),
                        }
                    }
                }
                Ok(last)
            }

            AstNode::AndOr { first, rest } => {
                let total = rest.len();
                let outcome = self.execute_element(first, total > 0, ctx)?;
                let mut status = match outcome {
                    Outcome::Normal(status) => status,
                    other => return Ok(other),
                };
                for (index, (op, element)) in rest.iter().enumerate() {
                    let take = match op {
                        AndOrOp::And => status == 0,
                        AndOrOp::Or => status != 0,
                    };
                    if !take {
                        continue;
                    }
                    let outcome = self.execute_element(element, index + 1 < total, ctx)?;
                    status = match outcome {
                        Outcome::Normal(status) => status,
                        other => return Ok(other),
                    };
                }
                Ok(Outcome::Normal(status))
            }

            AstNode::Pipeline { stages, negated } => self.execute_pipeline(node, stages, *negated, ctx),

            AstNode::SimpleCommand { .. } => self.execute_simple(node, ctx),

            AstNode::If { arms, else_branch } => {
                for (condition, body) in arms {
                    match self.eval_condition(condition, ctx)? {
                        CondResult::Flow(outcome) => return Ok(outcome),
                        CondResult::Status(0) => return self.execute(body, ctx),
                        CondResult::Status(_) => {}
                    }
                }
                if let Some(else_branch) = else_branch {
                    return self.execute(else_branch, ctx);
                }
                ctx.set_last_status(0);
                Ok(Outcome::Normal(0))
            }

            AstNode::While { condition, body, until } => {
                self.loop_depth += 1;
                let result = self.run_while(condition, body, *until, ctx);
                self.loop_depth -= 1;
                result
            }

            AstNode::For { variable, words, body } => {
                let values = match words {
                    Some(words) => self.expander.expand_words(words, ctx)?,
                    None => ctx.positional.clone(),
                };
                self.loop_depth += 1;
                let result = self.run_for(variable, &values, body, ctx);
                self.loop_depth -= 1;
                result
            }

            AstNode::Case { subject, arms } => {
                let subject = self.expander.expand_to_string(subject, ctx)?;
                for arm in arms {
                    for pattern in &arm.patterns {
                        let pattern = self.expander.expand_to_string(pattern, ctx)?;
                        if pattern_matches(&pattern, &subject) {
                            return self.execute(&arm.body, ctx);
                        }
                    }
                }
                ctx.set_last_status(0);
                Ok(Outcome::Normal(0))
            }

            AstNode::FunctionDef { name, body } => {
                ctx.functions.insert(name.clone(), Rc::new((**body).clone()));
                ctx.set_last_status(0);
                Ok(Outcome::Normal(0))
            }

            AstNode::Subshell(_) => {
                // Isolated child; all state mutations die with it.
                let status =
                    pipeline::run_pipeline(self, ctx, &[node], false, node.to_string())?;
                ctx.set_last_status(status);
                if let Some(outcome) = self.after_command(ctx, status) {
                    return Ok(outcome);
                }
                Ok(Outcome::Normal(ctx.last_status))
            }

            AstNode::BraceGroup(body) => self.execute(body, ctx),

            AstNode::Redirected { node, redirects } => {
                let result = self.execute_redirected(node, redirects, ctx);
                match result {
                    Ok(outcome) => Ok(outcome),
                    Err(err) if err.is_fatal() => Err(err),
                    Err(err) => {
                        eprintln!("twsh: {err}");
                        ctx.set_last_status(err.exit_status());
                        Ok(Outcome::Normal(ctx.last_status))
                    }
                }
            }
        }
    }

    fn execute_redirected(
        &mut self,
        node: &AstNode,
        redirects: &[Redirect],
        ctx: &mut ExecutionContext,
    ) -> ShellResult<Outcome> {
        let specs = redirect::resolve(redirects, self.expander.as_ref(), ctx)?;
        let _guard = redirect::apply(&specs, RedirScope::Command)?;
        self.execute(node, ctx)
    }

    /// Run an and-or element, marking non-final positions as conditions.
    fn execute_element(
        &mut self,
        node: &AstNode,
        is_condition: bool,
        ctx: &mut ExecutionContext,
    ) -> ShellResult<Outcome> {
        if !is_condition {
            return self.execute(node, ctx);
        }
        self.condition_depth += 1;
        let result = self.execute(node, ctx);
        self.condition_depth -= 1;
        result
    }

    fn eval_condition(
        &mut self,
        node: &AstNode,
        ctx: &mut ExecutionContext,
    ) -> ShellResult<CondResult> {
        self.condition_depth += 1;
        let result = self.execute(node, ctx);
        self.condition_depth -= 1;
        Ok(match result? {
            Outcome::Normal(status) => CondResult::Status(status),
            other => CondResult::Flow(other),
        })
    }

    fn run_while(
        &mut self,
        condition: &AstNode,
        body: &AstNode,
        until: bool,
        ctx: &mut ExecutionContext,
    ) -> ShellResult<Outcome> {
        let mut last_status = 0;
        loop {
            let status = match self.eval_condition(condition, ctx)? {
                CondResult::Status(status) => status,
                CondResult::Flow(outcome) => return Ok(self.consume_loop_flow(outcome)),
            };
            let proceed = if until { status != 0 } else { status == 0 };
            if !proceed {
                break;
            }
            match self.execute(body, ctx)? {
                Outcome::Normal(status) => last_status = status,
                Outcome::Break(n) => {
                    if n <= 1 || self.loop_depth == 1 {
                        last_status = 0;
                        break;
                    }
                    return Ok(Outcome::Break(n - 1));
                }
                Outcome::Continue(n) => {
                    if n <= 1 || self.loop_depth == 1 {
                        continue;
                    }
                    return Ok(Outcome::Continue(n - 1));
                }
                other => return Ok(other),
            }
        }
        ctx.set_last_status(last_status);
        Ok(Outcome::Normal(last_status))
    }

    fn run_for(
        &mut self,
        variable: &str,
        values: &[String],
        body: &AstNode,
        ctx: &mut ExecutionContext,
    ) -> ShellResult<Outcome> {
        let mut last_status = 0;
        for value in values {
            ctx.scopes.set_variable(variable, value, false);
            match self.execute(body, ctx)? {
                Outcome::Normal(status) => last_status = status,
                Outcome::Break(n) => {
                    if n <= 1 || self.loop_depth == 1 {
                        last_status = 0;
                        break;
                    }
                    return Ok(Outcome::Break(n - 1));
                }
                Outcome::Continue(n) => {
                    if n <= 1 || self.loop_depth == 1 {
                        continue;
                    }
                    return Ok(Outcome::Continue(n - 1));
                }
                other => return Ok(other),
            }
        }
        ctx.set_last_status(last_status);
        Ok(Outcome::Normal(last_status))
    }

    /// A control-flow outcome surfacing from a loop *condition* terminates
    /// or restarts this loop.
    fn consume_loop_flow(&self, outcome: Outcome) -> Outcome {
        match outcome {
            Outcome::Break(n) if n <= 1 || self.loop_depth == 1 => Outcome::Normal(0),
            Outcome::Break(n) => Outcome::Break(n - 1),
            Outcome::Continue(n) if n <= 1 || self.loop_depth == 1 => Outcome::Normal(0),
            Outcome::Continue(n) => Outcome::Continue(n - 1),
            other => other,
        }
    }

    fn execute_pipeline(
        &mut self,
        node: &AstNode,
        stages: &[AstNode],
        negated: bool,
        ctx: &mut ExecutionContext,
    ) -> ShellResult<Outcome> {
        if negated {
            self.condition_depth += 1;
        }
        let result = if stages.len() == 1 {
            // `! cmd` runs in the current shell like any other single
            // command; only the status is complemented.
            self.execute(&stages[0], ctx)
        } else {
            let stage_refs: Vec<&AstNode> = stages.iter().collect();
            pipeline::run_pipeline(self, ctx, &stage_refs, false, node.to_string())
                .map(Outcome::Normal)
        };
        if negated {
            self.condition_depth -= 1;
        }

        match result {
            Ok(Outcome::Normal(mut status)) => {
                if negated {
                    status = i32::from(status == 0);
                }
                ctx.set_last_status(status);
                if !negated {
                    if let Some(outcome) = self.after_command(ctx, status) {
                        return Ok(outcome);
                    }
                }
                Ok(Outcome::Normal(ctx.last_status))
            }
            Ok(other) => Ok(other),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                eprintln!("twsh: {err}");
                let status = if negated {
                    i32::from(err.exit_status() == 0)
                } else {
                    err.exit_status()
                };
                ctx.set_last_status(status);
                Ok(Outcome::Normal(ctx.last_status))
            }
        }
    }

    /// `cmd &`: the whole item becomes one background job, and the shell
    /// does not wait.
    fn launch_background(
        &mut self,
        node: &AstNode,
        ctx: &mut ExecutionContext,
    ) -> ShellResult<i32> {
        let text = node.to_string();
        match node {
            AstNode::Pipeline { stages, .. } => {
                let stage_refs: Vec<&AstNode> = stages.iter().collect();
                pipeline::run_pipeline(self, ctx, &stage_refs, true, text)
            }
            other => pipeline::run_pipeline(self, ctx, &[other], true, text),
        }
    }

    // ---- simple commands ---------------------------------------------

    fn execute_simple(&mut self, node: &AstNode, ctx: &mut ExecutionContext) -> ShellResult<Outcome> {
        if let Some(exit) = self.fire_debug_trap(ctx) {
            return Ok(exit);
        }

        let result = self.execute_simple_inner(node, ctx);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                eprintln!("twsh: {err}");
                Outcome::Normal(err.exit_status())
            }
        };

        match outcome {
            Outcome::Normal(status) => {
                ctx.set_last_status(status);
                let status = ctx.last_status;
                if let Some(escalated) = self.after_command(ctx, status) {
                    return Ok(escalated);
                }
                Ok(Outcome::Normal(status))
            }
            other => Ok(other),
        }
    }

    fn execute_simple_inner(
        &mut self,
        node: &AstNode,
        ctx: &mut ExecutionContext,
    ) -> ShellResult<Outcome> {
        let AstNode::SimpleCommand { assignments, words, redirects } = node else {
            return Err(ShellError::internal("execute_simple on non-command node"));
        };

        let argv = self.expander.expand_words(words, ctx)?;

        if argv.is_empty() {
            // Assignments only. Redirections are still performed (and then
            // reverted), matching `>file` with no command.
            let specs = redirect::resolve(redirects, self.expander.as_ref(), ctx)?;
            let _guard = redirect::apply(&specs, RedirScope::Command)?;
            self.apply_assignments(assignments, false, ctx)?;
            return Ok(Outcome::Normal(0));
        }

        if ctx.options.xtrace {
            eprintln!("+ {}", argv.join(" "));
        }

        let name = argv[0].as_str();

        if let Some(outcome) = self.control_flow_builtin(name, &argv[1..], ctx)? {
            return Ok(outcome);
        }

        if name == "exec" {
            return self.execute_exec(&argv[1..], redirects, ctx);
        }

        if let Some(body) = ctx.functions.get(name).cloned() {
            let specs = redirect::resolve(redirects, self.expander.as_ref(), ctx)?;
            let _guard = redirect::apply(&specs, RedirScope::Command)?;
            return self.call_function(name, &body, &argv[1..], ctx);
        }

        if let Some(builtin) = builtins::lookup(name) {
            let specs = redirect::resolve(redirects, self.expander.as_ref(), ctx)?;
            let _guard = redirect::apply(&specs, RedirScope::Command)?;
            let saved = self.apply_assignments(assignments, true, ctx)?;
            let mut io = BuiltinIo::from_process()?;
            let result = builtin(&argv[1..], ctx, &mut io);
            drop(io);
            restore_assignments(saved, ctx);
            let status = match result {
                Ok(status) => status,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    eprintln!("twsh: {err}");
                    err.exit_status()
                }
            };
            return Ok(Outcome::Normal(status));
        }

        // External command: a one-stage foreground pipeline, forked and
        // tracked as a job like any other.
        let status = pipeline::run_pipeline(self, ctx, &[node], false, node.to_string())?;
        Ok(Outcome::Normal(status))
    }

    /// break / continue / return / exit, intercepted ahead of builtin
    /// lookup because they produce control-flow outcomes, not statuses.
    fn control_flow_builtin(
        &mut self,
        name: &str,
        args: &[String],
        ctx: &mut ExecutionContext,
    ) -> ShellResult<Option<Outcome>> {
        let outcome = match name {
            "break" | "continue" => {
                let count = parse_loop_count(name, args)?;
                if self.loop_depth == 0 {
                    return Err(ShellError::scope(format!(
                        "{name}: only meaningful in a `for', `while', or `until' loop"
                    )));
                }
                if name == "break" {
                    Outcome::Break(count)
                } else {
                    Outcome::Continue(count)
                }
            }
            "return" => {
                if !ctx.scopes.in_function() {
                    return Err(ShellError::scope(
                        "return: can only `return' from a function",
                    ));
                }
                let code = parse_status_arg("return", args, ctx.last_status)?;
                Outcome::Return(code & 0xff)
            }
            "exit" => {
                let code = parse_status_arg("exit", args, ctx.last_status)?;
                Outcome::Exit(code & 0xff)
            }
            _ => return Ok(None),
        };
        Ok(Some(outcome))
    }

    /// The `exec` builtin: with no command its redirections become
    /// persistent; with one, the shell process image is replaced.
    fn execute_exec(
        &mut self,
        args: &[String],
        redirects: &[Redirect],
        ctx: &mut ExecutionContext,
    ) -> ShellResult<Outcome> {
        let specs = redirect::resolve(redirects, self.expander.as_ref(), ctx)?;
        redirect::apply(&specs, RedirScope::Persistent)?;
        if args.is_empty() {
            return Ok(Outcome::Normal(0));
        }
        for (name, value) in ctx.child_env() {
            std::env::set_var(name, value);
        }
        let err = process::exec(args);
        Err(map_exec_error(&args[0], err))
    }

    fn call_function(
        &mut self,
        name: &str,
        body: &AstNode,
        args: &[String],
        ctx: &mut ExecutionContext,
    ) -> ShellResult<Outcome> {
        tracing::debug!(function = name, args = args.len(), "function call");
        ctx.scopes.push_scope(name);
        let saved_positional = std::mem::replace(&mut ctx.positional, args.to_vec());
        // A fresh loop context: break inside the function cannot reach
        // loops outside it.
        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);

        let result = self.execute(body, ctx);

        self.loop_depth = saved_loop_depth;
        ctx.positional = saved_positional;
        ctx.scopes.pop_scope()?;

        match result? {
            Outcome::Return(code) => {
                ctx.set_last_status(code);
                Ok(Outcome::Normal(code))
            }
            other => Ok(other),
        }
    }

    /// Apply assignments; with `temporary` the previous values are returned
    /// for restoration after a builtin finishes.
    fn apply_assignments(
        &mut self,
        assignments: &[Assignment],
        temporary: bool,
        ctx: &mut ExecutionContext,
    ) -> ShellResult<Vec<(String, Option<String>)>> {
        let mut saved = Vec::new();
        for assignment in assignments {
            let value = self.expander.expand_to_string(&assignment.value, ctx)?;
            if temporary {
                saved.push((
                    assignment.name.clone(),
                    ctx.get_var(&assignment.name).map(str::to_string),
                ));
            }
            ctx.scopes.set_variable(&assignment.name, &value, false);
        }
        Ok(saved)
    }

    // ---- traps --------------------------------------------------------

    /// Drain pending asynchronous signals and run their handlers. Returns
    /// `Some(Exit)` if a handler asked the shell to exit.
    pub fn run_pending_traps(&mut self, ctx: &mut ExecutionContext) -> Option<Outcome> {
        if self.in_trap {
            return None;
        }
        for sig in hal_signal::take_pending() {
            if let Some(text) = ctx.traps.command_for(TrapSignal::Sig(sig)).map(str::to_string) {
                tracing::debug!(signal = ?sig, "running trap");
                if let Some(exit) = self.run_trap_command(&text, ctx) {
                    return Some(exit);
                }
            }
        }
        None
    }

    fn fire_debug_trap(&mut self, ctx: &mut ExecutionContext) -> Option<Outcome> {
        if self.in_trap {
            return None;
        }
        let text = ctx.traps.command_for(TrapSignal::Debug)?.to_string();
        self.run_trap_command(&text, ctx)
    }

    /// Run ERR / errexit escalation for a finished command.
    fn after_command(&mut self, ctx: &mut ExecutionContext, status: i32) -> Option<Outcome> {
        if status == 0 || self.condition_depth > 0 || self.in_trap {
            return None;
        }
        if let Some(text) = ctx.traps.command_for(TrapSignal::Err).map(str::to_string) {
            if let Some(exit) = self.run_trap_command(&text, ctx) {
                return Some(exit);
            }
        }
        if ctx.options.errexit {
            tracing::debug!(status, "errexit");
            return Some(Outcome::Exit(status));
        }
        None
    }

    /// Execute a trap handler body. `$?` is preserved around it; only an
    /// explicit `exit` escapes.
    fn run_trap_command(&mut self, text: &str, ctx: &mut ExecutionContext) -> Option<Outcome> {
        let saved_status = ctx.last_status;
        let ast = match twsh_parser::parse(text) {
            Ok(ast) => ast,
            Err(err) => {
                eprintln!("twsh: trap: {err}");
                return None;
            }
        };
        let was_in_trap = std::mem::replace(&mut self.in_trap, true);
        let result = self.execute(&ast, ctx);
        self.in_trap = was_in_trap;
        ctx.set_last_status(saved_status);
        match result {
            Ok(Outcome::Exit(code)) => Some(Outcome::Exit(code)),
            Ok(_) => None,
            Err(err) => {
                eprintln!("twsh: trap: {err}");
                None
            }
        }
    }

    /// Run the EXIT trap, exactly once, on any termination path.
    pub fn run_exit_trap(&mut self, ctx: &mut ExecutionContext) {
        if let Some(text) = ctx.traps.take_exit_trap() {
            let _ = self.run_trap_command(&text, ctx);
        }
    }

    // ---- child-side stage execution -----------------------------------

    /// Entry point for a forked pipeline stage; never returns.
    pub(crate) fn run_stage_in_child(
        &mut self,
        node: &AstNode,
        ctx: &mut ExecutionContext,
    ) -> ! {
        let status = match node {
            AstNode::SimpleCommand { .. } => self.run_leaf_in_child(node, ctx),
            // A subshell stage just runs its body; the fork already
            // provided the isolation.
            AstNode::Subshell(body) => self.child_status(body, ctx),
            other => self.child_status(other, ctx),
        };
        let _ = std::io::stdout().flush();
        process::exit_now(status & 0xff);
    }

    fn child_status(&mut self, node: &AstNode, ctx: &mut ExecutionContext) -> i32 {
        match self.execute(node, ctx) {
            Ok(outcome) => outcome.code(),
            Err(err) => {
                eprintln!("twsh: {err}");
                err.exit_status()
            }
        }
    }

    /// Run one simple command in a forked child: builtins and functions
    /// replay their logic against the child's private context; external
    /// commands exec.
    fn run_leaf_in_child(&mut self, node: &AstNode, ctx: &mut ExecutionContext) -> i32 {
        let AstNode::SimpleCommand { assignments, words, redirects } = node else {
            return 1;
        };

        let argv = match self.expander.expand_words(words, ctx) {
            Ok(argv) => argv,
            Err(err) => {
                eprintln!("twsh: {err}");
                return err.exit_status();
            }
        };

        let specs = match redirect::resolve(redirects, self.expander.as_ref(), ctx) {
            Ok(specs) => specs,
            Err(err) => {
                eprintln!("twsh: {err}");
                return err.exit_status();
            }
        };
        if let Err(err) = redirect::apply(&specs, RedirScope::Persistent) {
            eprintln!("twsh: {err}");
            return err.exit_status();
        }

        if argv.is_empty() {
            return match self.apply_assignments(assignments, false, ctx) {
                Ok(_) => 0,
                Err(err) => {
                    eprintln!("twsh: {err}");
                    err.exit_status()
                }
            };
        }

        let name = argv[0].as_str();

        match self.control_flow_builtin(name, &argv[1..], ctx) {
            Ok(Some(outcome)) => return outcome.code(),
            Ok(None) => {}
            Err(err) => {
                eprintln!("twsh: {err}");
                return err.exit_status();
            }
        }

        if let Some(body) = ctx.functions.get(name).cloned() {
            return match self.call_function(name, &body, &argv[1..], ctx) {
                Ok(outcome) => outcome.code(),
                Err(err) => {
                    eprintln!("twsh: {err}");
                    err.exit_status()
                }
            };
        }

        if let Some(builtin) = builtins::lookup(name) {
            let mut io = match BuiltinIo::from_process() {
                Ok(io) => io,
                Err(err) => {
                    eprintln!("twsh: {err}");
                    return err.exit_status();
                }
            };
            return match builtin(&argv[1..], ctx, &mut io) {
                Ok(status) => status,
                Err(err) => {
                    eprintln!("twsh: {err}");
                    err.exit_status()
                }
            };
        }

        // External: export the environment and replace the image.
        for (name, value) in ctx.child_env() {
            std::env::set_var(name, value);
        }
        for assignment in assignments {
            match self.expander.expand_to_string(&assignment.value, ctx) {
                Ok(value) => std::env::set_var(&assignment.name, value),
                Err(err) => {
                    eprintln!("twsh: {err}");
                    return err.exit_status();
                }
            }
        }
        let err = map_exec_error(name, process::exec(&argv));
        eprintln!("twsh: {err}");
        err.exit_status()
    }
}

fn restore_assignments(saved: Vec<(String, Option<String>)>, ctx: &mut ExecutionContext) {
    for (name, value) in saved {
        match value {
            Some(value) => ctx.scopes.set_variable(&name, &value, false),
            None => ctx.scopes.unset(&name),
        }
    }
}

fn map_exec_error(name: &str, err: twsh_hal::HalError) -> ShellError {
    use twsh_hal::Errno;
    match err.errno() {
        Some(Errno::ENOENT) => ShellError::command_not_found(name),
        Some(Errno::EACCES) => ShellError::permission_denied(name),
        _ => ShellError::not_executable(name),
    }
}

fn parse_loop_count(name: &str, args: &[String]) -> ShellResult<u32> {
    match args.first() {
        None => Ok(1),
        Some(arg) => match arg.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(n),
            _ => Err(ShellError::usage(format!(
                "{name}: {arg}: loop count out of range"
            ))),
        },
    }
}

fn parse_status_arg(name: &str, args: &[String], default: i32) -> ShellResult<i32> {
    match args.first() {
        None => Ok(default),
        Some(arg) => arg
            .parse::<i32>()
            .map_err(|_| ShellError::usage(format!("{name}: {arg}: numeric argument required"))),
    }
}
