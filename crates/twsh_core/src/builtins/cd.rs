//! Working-directory builtins: `cd` and `pwd`.

use super::BuiltinIo;
use crate::context::ExecutionContext;
use crate::error::{ShellError, ShellResult};
use std::io::Write;
use std::path::PathBuf;

pub fn cd(args: &[String], ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    let (target, echo_target) = match args.first().map(String::as_str) {
        None => match ctx.get_var("HOME") {
            Some(home) => (PathBuf::from(home), false),
            None => return Err(ShellError::usage("cd: HOME not set")),
        },
        Some("-") => match ctx.get_var("OLDPWD") {
            Some(prev) => (PathBuf::from(prev), true),
            None => return Err(ShellError::usage("cd: OLDPWD not set")),
        },
        Some(path) => (PathBuf::from(path), false),
    };

    let previous = std::env::current_dir().ok();
    if let Err(err) = std::env::set_current_dir(&target) {
        writeln!(io.stderr, "cd: {}: {err}", target.display())?;
        return Ok(1);
    }
    if echo_target {
        writeln!(io.stdout, "{}", target.display())?;
    }

    if let Some(previous) = previous {
        ctx.set_var("OLDPWD", &previous.to_string_lossy());
    }
    if let Ok(now) = std::env::current_dir() {
        ctx.set_var("PWD", &now.to_string_lossy());
    }
    Ok(0)
}

pub fn pwd(_args: &[String], _ctx: &mut ExecutionContext, io: &mut BuiltinIo) -> ShellResult<i32> {
    let dir = std::env::current_dir()?;
    writeln!(io.stdout, "{}", dir.display())?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cd_to_missing_directory_fails_without_moving() {
        let mut ctx = ExecutionContext::new(false);
        let before = std::env::current_dir().unwrap();
        let (mut io, _out, err) = BuiltinIo::capture();
        let args = vec!["/definitely/not/a/real/path".to_string()];
        assert_eq!(cd(&args, &mut ctx, &mut io).unwrap(), 1);
        assert!(err.contents().contains("cd:"));
        assert_eq!(std::env::current_dir().unwrap(), before);
    }
}
