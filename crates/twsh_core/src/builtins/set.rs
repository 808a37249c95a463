//! Variable and option builtins: `set`, `export`, `unset`, `shift`, `local`.

use super::BuiltinIo;
use crate::context::ExecutionContext;
use crate::error::{ShellError, ShellResult};
use std::io::Write;

/// `set [-+flags] [-+o name] [--] [args…]`. Remaining operands replace the
/// positional parameters.
pub fn set(args: &[String], ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    if args.is_empty() {
        let mut vars: Vec<(String, String)> = ctx
            .scopes
            .visible()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        vars.sort();
        for (name, value) in vars {
            writeln!(io.stdout, "{name}={value}")?;
        }
        return Ok(0);
    }

    let mut rest = args.iter().peekable();
    loop {
        let Some(arg) = rest.peek().map(|s| s.to_string()) else { break };
        let on = match arg.chars().next() {
            Some('-') => true,
            Some('+') => false,
            _ => break,
        };
        rest.next();
        let arg = arg.as_str();
        if arg == "--" {
            break;
        }
        if arg == "-o" || arg == "+o" {
            match rest.next() {
                Some(name) => ctx.options.set_named(name, on)?,
                None => {
                    for (name, enabled) in ctx.options.listing() {
                        let state = if enabled { "on" } else { "off" };
                        writeln!(io.stdout, "{name:<16}{state}")?;
                    }
                }
            }
            continue;
        }
        for flag in arg.chars().skip(1) {
            ctx.options.set_flag(flag, on)?;
        }
    }

    let remaining: Vec<String> = rest.cloned().collect();
    if !remaining.is_empty() {
        ctx.positional = remaining;
    }
    Ok(0)
}

pub fn export(args: &[String], ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    if args.is_empty() {
        let mut names: Vec<&String> = ctx.exported.iter().collect();
        names.sort();
        for name in names {
            match ctx.get_var(name) {
                Some(value) => writeln!(io.stdout, "export {name}={value}")?,
                None => writeln!(io.stdout, "export {name}")?,
            }
        }
        return Ok(0);
    }
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => {
                ctx.set_var(name, value);
                ctx.export(name);
            }
            None => ctx.export(arg),
        }
    }
    Ok(0)
}

/// `unset name…` removes variables; `unset -f name…` removes functions.
pub fn unset(args: &[String], ctx: &mut ExecutionContext, _io: &mut BuiltinIo) -> ShellResult<i32> {
    let (functions, names) = match args.first().map(String::as_str) {
        Some("-f") => (true, &args[1..]),
        Some("-v") => (false, &args[1..]),
        _ => (false, args),
    };
    for name in names {
        if functions {
            ctx.functions.remove(name);
        } else {
            ctx.scopes.unset(name);
            ctx.exported.remove(name);
        }
    }
    Ok(0)
}

pub fn shift(args: &[String], ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    let count = match args.first() {
        None => 1,
        Some(arg) => arg
            .parse::<usize>()
            .map_err(|_| ShellError::usage(format!("shift: {arg}: numeric argument required")))?,
    };
    if count > ctx.positional.len() {
        writeln!(io.stderr, "shift: {count}: shift count out of range")?;
        return Ok(1);
    }
    ctx.positional.drain(..count);
    Ok(0)
}

/// `local name[=value]…` — only valid inside a function.
pub fn local(args: &[String], ctx: &mut ExecutionContext, _io: &mut BuiltinIo) -> ShellResult<i32> {
    if !ctx.scopes.in_function() {
        return Err(ShellError::scope("local: can only be used in a function"));
    }
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => ctx.scopes.create_local(name, value)?,
            None => ctx.scopes.create_local(arg, "")?,
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(false)
    }

    #[test]
    fn set_flags_toggle_options() {
        let mut ctx = ctx();
        let (mut io, _out, _err) = BuiltinIo::capture();
        set(&["-eu".to_string()], &mut ctx, &mut io).unwrap();
        assert!(ctx.options.errexit);
        assert!(ctx.options.nounset);
        set(&["+e".to_string()], &mut ctx, &mut io).unwrap();
        assert!(!ctx.options.errexit);
    }

    #[test]
    fn set_o_pipefail() {
        let mut ctx = ctx();
        let (mut io, _out, _err) = BuiltinIo::capture();
        set(
            &["-o".to_string(), "pipefail".to_string()],
            &mut ctx,
            &mut io,
        )
        .unwrap();
        assert!(ctx.options.pipefail);
    }

    #[test]
    fn set_replaces_positional_parameters() {
        let mut ctx = ctx();
        let (mut io, _out, _err) = BuiltinIo::capture();
        set(
            &["a".to_string(), "b".to_string(), "c".to_string()],
            &mut ctx,
            &mut io,
        )
        .unwrap();
        assert_eq!(ctx.positional, vec!["a", "b", "c"]);
    }

    #[test]
    fn shift_drops_leading_parameters() {
        let mut ctx = ctx();
        ctx.positional = vec!["a".into(), "b".into(), "c".into()];
        let (mut io, _out, _err) = BuiltinIo::capture();
        shift(&["2".to_string()], &mut ctx, &mut io).unwrap();
        assert_eq!(ctx.positional, vec!["c"]);
        assert_eq!(shift(&["5".to_string()], &mut ctx, &mut io).unwrap(), 1);
    }

    #[test]
    fn export_marks_and_assigns() {
        let mut ctx = ctx();
        let (mut io, _out, _err) = BuiltinIo::capture();
        export(&["FOO=bar".to_string()], &mut ctx, &mut io).unwrap();
        assert_eq!(ctx.get_var("FOO"), Some("bar"));
        assert!(ctx.exported.contains("FOO"));
    }

    #[test]
    fn local_outside_function_is_an_error() {
        let mut ctx = ctx();
        let (mut io, _out, _err) = BuiltinIo::capture();
        assert!(local(&["x=1".to_string()], &mut ctx, &mut io).is_err());
    }
}
