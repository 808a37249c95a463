//! Redirection and file-descriptor management.
//!
//! Redirections resolve in two steps: `resolve` expands targets into
//! concrete `RedirectionSpec`s, then `apply` performs the remaps. Command
//! scope returns a guard that restores every affected descriptor when
//! dropped — on success, failure, or panic — while Persistent scope (the
//! bare `exec` builtin) leaves the remap in place for the rest of the
//! process lifetime.

use crate::context::ExecutionContext;
use crate::error::{ShellError, ShellResult};
use crate::expand::WordExpander;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use twsh_hal::pipe;
use twsh_parser::ast::{QuoteKind, Redirect, RedirectOp, Word};

// Heredocs beyond a pipe's guaranteed capacity spill to a temp file so the
// shell never blocks writing them.
const HEREDOC_PIPE_MAX: usize = 60 * 1024;

/// A fully resolved redirection: target fd plus the action to take on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectionSpec {
    pub fd: RawFd,
    pub action: RedirAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirAction {
    ReadFile(String),
    WriteFile {
        path: String,
        append: bool,
        /// Refuse to truncate an existing file (noclobber, unless `>|`).
        exclusive: bool,
    },
    /// `n<&m` / `n>&m`.
    Duplicate(RawFd),
    /// `n>&-` / `n<&-`.
    Close,
    /// Heredoc / here-string content, already expanded.
    Feed(String),
}

/// Scope of an `apply`: Command redirections are reverted afterwards,
/// Persistent ones become part of the process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirScope {
    Command,
    Persistent,
}

/// Expand redirection targets against the current context. Applied in list
/// order, so later entries for the same fd override earlier ones.
pub fn resolve(
    redirects: &[Redirect],
    expander: &dyn WordExpander,
    ctx: &ExecutionContext,
) -> ShellResult<Vec<RedirectionSpec>> {
    let mut specs = Vec::with_capacity(redirects.len());
    for redirect in redirects {
        let default_fd = match redirect.op {
            RedirectOp::Input
            | RedirectOp::DupInput
            | RedirectOp::Heredoc { .. }
            | RedirectOp::HereString => 0,
            _ => 1,
        };
        let fd = redirect.fd.unwrap_or(default_fd);

        let action = match redirect.op {
            RedirectOp::Input => {
                RedirAction::ReadFile(expander.expand_to_string(&redirect.target, ctx)?)
            }
            RedirectOp::Output { clobber } => RedirAction::WriteFile {
                path: expander.expand_to_string(&redirect.target, ctx)?,
                append: false,
                exclusive: ctx.options.noclobber && !clobber,
            },
            RedirectOp::Append => RedirAction::WriteFile {
                path: expander.expand_to_string(&redirect.target, ctx)?,
                append: true,
                exclusive: false,
            },
            RedirectOp::DupInput | RedirectOp::DupOutput => {
                let target = expander.expand_to_string(&redirect.target, ctx)?;
                if target == "-" {
                    RedirAction::Close
                } else {
                    let src: RawFd = target.parse().map_err(|_| {
                        ShellError::redirection(format!("{target}: ambiguous redirect"))
                    })?;
                    RedirAction::Duplicate(src)
                }
            }
            RedirectOp::Heredoc { expand } => {
                let body = if expand {
                    let word = Word::new(redirect.target.text.clone(), QuoteKind::Double);
                    expander.expand_to_string(&word, ctx)?
                } else {
                    redirect.target.text.clone()
                };
                RedirAction::Feed(body)
            }
            RedirectOp::HereString => {
                let mut body = expander.expand_to_string(&redirect.target, ctx)?;
                body.push('\n');
                RedirAction::Feed(body)
            }
        };
        specs.push(RedirectionSpec { fd, action });
    }
    Ok(specs)
}

/// Restores the saved descriptor states on drop, in reverse application
/// order.
#[derive(Debug)]
pub struct RedirectionGuard {
    saved: Vec<(RawFd, Option<OwnedFd>)>,
}

impl Drop for RedirectionGuard {
    fn drop(&mut self) {
        while let Some((fd, saved)) = self.saved.pop() {
            match saved {
                Some(original) => {
                    if let Err(err) = pipe::replace_fd(original.as_raw_fd(), fd) {
                        tracing::warn!(fd, %err, "failed to restore descriptor");
                    }
                    // `original` drops here, closing the parked copy.
                }
                None => {
                    let _ = pipe::close_fd(fd);
                }
            }
        }
    }
}

/// Apply resolved redirections. Command scope returns a guard; Persistent
/// returns `None` and the remaps stay.
pub fn apply(
    specs: &[RedirectionSpec],
    scope: RedirScope,
) -> ShellResult<Option<RedirectionGuard>> {
    let mut guard = match scope {
        RedirScope::Command => Some(RedirectionGuard { saved: Vec::new() }),
        RedirScope::Persistent => None,
    };

    for spec in specs {
        if let Some(guard) = guard.as_mut() {
            let saved = if pipe::fd_is_open(spec.fd) {
                Some(pipe::duplicate_above(spec.fd, 10)?)
            } else {
                None
            };
            guard.saved.push((spec.fd, saved));
        }
        // On error the partially filled guard drops at the `?`, restoring
        // whatever was already remapped.
        apply_one(spec)?;
    }
    Ok(guard)
}

fn apply_one(spec: &RedirectionSpec) -> ShellResult<()> {
    match &spec.action {
        RedirAction::ReadFile(path) => {
            let file = File::open(path)
                .map_err(|err| ShellError::redirection(format!("{path}: {err}")))?;
            pipe::replace_fd(file.as_raw_fd(), spec.fd)?;
        }
        RedirAction::WriteFile { path, append, exclusive } => {
            let mut options = OpenOptions::new();
            options.write(true).create(true);
            if *append {
                options.append(true);
            } else if *exclusive {
                options.create_new(true);
            } else {
                options.truncate(true);
            }
            let file = options.open(path).map_err(|err| {
                if *exclusive && err.kind() == std::io::ErrorKind::AlreadyExists {
                    ShellError::redirection(format!("{path}: cannot overwrite existing file"))
                } else {
                    ShellError::redirection(format!("{path}: {err}"))
                }
            })?;
            pipe::replace_fd(file.as_raw_fd(), spec.fd)?;
        }
        RedirAction::Duplicate(src) => {
            if !pipe::fd_is_open(*src) {
                return Err(ShellError::redirection(format!(
                    "{src}: bad file descriptor"
                )));
            }
            pipe::replace_fd(*src, spec.fd)?;
        }
        RedirAction::Close => {
            let _ = pipe::close_fd(spec.fd);
        }
        RedirAction::Feed(content) => {
            let source = materialize(content)?;
            pipe::replace_fd(source.as_raw_fd(), spec.fd)?;
        }
    }
    Ok(())
}

/// Buffer heredoc content where a child can read it: a pre-filled pipe for
/// ordinary sizes, a temp file for anything that could block the writer.
fn materialize(content: &str) -> ShellResult<OwnedFd> {
    if content.len() <= HEREDOC_PIPE_MAX {
        let (read_end, write_end) = pipe::create_pipe()?;
        let mut writer = File::from(write_end);
        writer
            .write_all(content.as_bytes())
            .map_err(|err| ShellError::redirection(format!("here-document: {err}")))?;
        drop(writer);
        Ok(read_end)
    } else {
        let mut file = tempfile::tempfile()
            .map_err(|err| ShellError::redirection(format!("here-document: {err}")))?;
        file.write_all(content.as_bytes())
            .map_err(|err| ShellError::redirection(format!("here-document: {err}")))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|err| ShellError::redirection(format!("here-document: {err}")))?;
        Ok(OwnedFd::from(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::BasicExpander;
    use std::io::Read;

    fn resolve_one(redirect: Redirect) -> RedirectionSpec {
        let ctx = ExecutionContext::new(false);
        resolve(&[redirect], &BasicExpander, &ctx)
            .unwrap()
            .pop()
            .unwrap()
    }

    #[test]
    fn default_fds_follow_the_operator() {
        let spec = resolve_one(Redirect {
            fd: None,
            op: RedirectOp::Input,
            target: Word::bare("/dev/null"),
        });
        assert_eq!(spec.fd, 0);

        let spec = resolve_one(Redirect {
            fd: None,
            op: RedirectOp::Append,
            target: Word::bare("/dev/null"),
        });
        assert_eq!(spec.fd, 1);
    }

    #[test]
    fn dup_dash_means_close() {
        let spec = resolve_one(Redirect {
            fd: Some(2),
            op: RedirectOp::DupOutput,
            target: Word::bare("-"),
        });
        assert_eq!(spec.action, RedirAction::Close);
    }

    #[test]
    fn non_numeric_dup_target_is_an_error() {
        let ctx = ExecutionContext::new(false);
        let err = resolve(
            &[Redirect {
                fd: Some(2),
                op: RedirectOp::DupOutput,
                target: Word::bare("file.txt"),
            }],
            &BasicExpander,
            &ctx,
        )
        .unwrap_err();
        assert!(err.message.contains("ambiguous redirect"));
    }

    #[test]
    fn heredoc_expansion_respects_quoted_delimiter() {
        let mut ctx = ExecutionContext::new(false);
        ctx.set_var("W", "expanded");
        let expanded = resolve(
            &[Redirect {
                fd: None,
                op: RedirectOp::Heredoc { expand: true },
                target: Word::bare("$W\n"),
            }],
            &BasicExpander,
            &ctx,
        )
        .unwrap();
        assert_eq!(expanded[0].action, RedirAction::Feed("expanded\n".into()));

        let literal = resolve(
            &[Redirect {
                fd: None,
                op: RedirectOp::Heredoc { expand: false },
                target: Word::bare("$W\n"),
            }],
            &BasicExpander,
            &ctx,
        )
        .unwrap();
        assert_eq!(literal[0].action, RedirAction::Feed("$W\n".into()));
    }

    #[test]
    fn command_scope_restores_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let spec = RedirectionSpec {
            fd: 31,
            action: RedirAction::WriteFile {
                path: path.to_string_lossy().into_owned(),
                append: false,
                exclusive: false,
            },
        };
        assert!(!pipe::fd_is_open(31));
        {
            let guard = apply(std::slice::from_ref(&spec), RedirScope::Command).unwrap();
            assert!(pipe::fd_is_open(31));
            drop(guard);
        }
        assert!(!pipe::fd_is_open(31));
    }

    #[test]
    fn persistent_scope_leaves_the_remap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let spec = RedirectionSpec {
            fd: 32,
            action: RedirAction::WriteFile {
                path: path.to_string_lossy().into_owned(),
                append: false,
                exclusive: false,
            },
        };
        let guard = apply(std::slice::from_ref(&spec), RedirScope::Persistent).unwrap();
        assert!(guard.is_none());
        assert!(pipe::fd_is_open(32));
        pipe::close_fd(32).unwrap();
    }

    #[test]
    fn noclobber_refuses_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.txt");
        std::fs::write(&path, "original").unwrap();
        let spec = RedirectionSpec {
            fd: 33,
            action: RedirAction::WriteFile {
                path: path.to_string_lossy().into_owned(),
                append: false,
                exclusive: true,
            },
        };
        let err = apply(std::slice::from_ref(&spec), RedirScope::Command).unwrap_err();
        assert!(err.message.contains("cannot overwrite"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
        assert!(!pipe::fd_is_open(33));
    }

    #[test]
    fn heredoc_feed_is_readable_from_the_fd() {
        let spec = RedirectionSpec {
            fd: 34,
            action: RedirAction::Feed("hello heredoc\n".into()),
        };
        let guard = apply(std::slice::from_ref(&spec), RedirScope::Command).unwrap();
        let dup = pipe::duplicate_above(34, 40).unwrap();
        let mut reader = File::from(dup);
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello heredoc\n");
        drop(guard);
    }
}
