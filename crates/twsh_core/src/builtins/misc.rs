//! `:`/`true`, `false`, and `echo`.

use super::BuiltinIo;
use crate::context::ExecutionContext;
use crate::error::ShellResult;
use std::io::Write;

pub fn succeed(_args: &[String], _ctx: &mut ExecutionContext, _io: &mut BuiltinIo) -> ShellResult<i32> {
    Ok(0)
}

pub fn fail(_args: &[String], _ctx: &mut ExecutionContext, _io: &mut BuiltinIo) -> ShellResult<i32> {
    Ok(1)
}

pub fn echo(args: &[String], _ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    let (args, newline) = match args.first().map(String::as_str) {
        Some("-n") => (&args[1..], false),
        _ => (args, true),
    };
    let line = args.join(" ");
    if newline {
        writeln!(io.stdout, "{line}")?;
    } else {
        write!(io.stdout, "{line}")?;
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_joins_and_terminates() {
        let mut ctx = ExecutionContext::new(false);
        let (mut io, out, _err) = BuiltinIo::capture();
        let args = vec!["hello".to_string(), "world".to_string()];
        assert_eq!(echo(&args, &mut ctx, &mut io).unwrap(), 0);
        assert_eq!(out.contents(), "hello world\n");
    }

    #[test]
    fn echo_n_suppresses_newline() {
        let mut ctx = ExecutionContext::new(false);
        let (mut io, out, _err) = BuiltinIo::capture();
        let args = vec!["-n".to_string(), "x".to_string()];
        echo(&args, &mut ctx, &mut io).unwrap();
        assert_eq!(out.contents(), "x");
    }
}
