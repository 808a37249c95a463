//! Word expansion seam.
//!
//! The executor consumes expansion through the `WordExpander` trait; the
//! full expansion engine (globs, command substitution, arithmetic) is an
//! external collaborator that plugs in here. `BasicExpander` implements the
//! parameter forms the engine itself needs: `$name`, `${name}`, the special
//! parameters, tilde, and IFS field splitting for unquoted words.

use crate::context::ExecutionContext;
use crate::error::{ErrorKind, ShellError, ShellResult};
use twsh_hal::process;
use twsh_parser::ast::{QuoteKind, Word};

/// Resolves word nodes into final argv strings.
pub trait WordExpander {
    /// Expand into zero or more argv words (field splitting applies).
    fn expand_word(&self, word: &Word, ctx: &ExecutionContext) -> ShellResult<Vec<String>>;

    /// Expand into exactly one string: redirection targets, case subjects,
    /// assignment values. No field splitting.
    fn expand_to_string(&self, word: &Word, ctx: &ExecutionContext) -> ShellResult<String>;

    /// Expand a list of words into a flat argv.
    fn expand_words(&self, words: &[Word], ctx: &ExecutionContext) -> ShellResult<Vec<String>> {
        let mut argv = Vec::new();
        for word in words {
            argv.extend(self.expand_word(word, ctx)?);
        }
        Ok(argv)
    }
}

/// The engine's built-in parameter expander.
#[derive(Debug, Default)]
pub struct BasicExpander;

impl WordExpander for BasicExpander {
    fn expand_word(&self, word: &Word, ctx: &ExecutionContext) -> ShellResult<Vec<String>> {
        match word.quote {
            QuoteKind::Single => Ok(vec![word.text.clone()]),
            QuoteKind::Double => {
                // "$@" alone expands to one word per positional parameter.
                if word.text == "$@" {
                    return Ok(ctx.positional.clone());
                }
                Ok(vec![substitute(&word.text, ctx)?])
            }
            QuoteKind::Unquoted => {
                if word.text == "$@" {
                    return Ok(ctx.positional.clone());
                }
                let text = tilde(&word.text, ctx);
                let expanded = substitute(&text, ctx)?;
                Ok(split_fields(&expanded))
            }
        }
    }

    fn expand_to_string(&self, word: &Word, ctx: &ExecutionContext) -> ShellResult<String> {
        match word.quote {
            QuoteKind::Single => Ok(word.text.clone()),
            QuoteKind::Double => substitute(&word.text, ctx),
            QuoteKind::Unquoted => substitute(&tilde(&word.text, ctx), ctx),
        }
    }
}

fn tilde(text: &str, ctx: &ExecutionContext) -> String {
    if let Some(rest) = text.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            if let Some(home) = ctx.get_var("HOME") {
                return format!("{home}{rest}");
            }
        }
    }
    text.to_string()
}

/// Substitute `$`-forms in `text`.
fn substitute(text: &str, ctx: &ExecutionContext) -> ShellResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('{') => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => {
                            return Err(ShellError::new(
                                ErrorKind::ExpansionError,
                                "unterminated ${…}",
                            ))
                        }
                    }
                }
                out.push_str(&lookup(&name, ctx)?);
            }
            Some(c) if c.is_ascii_alphabetic() || *c == '_' => {
                let mut name = String::new();
                while let Some(c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&lookup(&name, ctx)?);
            }
            Some(c) if "?!$#@*0123456789".contains(*c) => {
                let name = c.to_string();
                chars.next();
                out.push_str(&lookup(&name, ctx)?);
            }
            _ => out.push('$'),
        }
    }
    Ok(out)
}

/// Resolve one parameter name, honoring `nounset` for plain variables.
fn lookup(name: &str, ctx: &ExecutionContext) -> ShellResult<String> {
    let value = match name {
        "?" => Some(ctx.last_status.to_string()),
        "!" => Some(
            ctx.last_bg_pid
                .map(|pid| pid.as_raw().to_string())
                .unwrap_or_default(),
        ),
        "$" => Some(process::current_pid().as_raw().to_string()),
        "#" => Some(ctx.positional.len().to_string()),
        "0" => Some(ctx.shell_name.clone()),
        "@" | "*" => Some(ctx.positional.join(" ")),
        _ if name.chars().all(|c| c.is_ascii_digit()) => {
            let n: usize = name
                .parse()
                .map_err(|_| ShellError::new(ErrorKind::ExpansionError, "bad positional index"))?;
            Some(ctx.positional.get(n - 1).cloned().unwrap_or_default())
        }
        _ => ctx.get_var(name).map(str::to_string),
    };

    match value {
        Some(v) => Ok(v),
        None if ctx.options.nounset => Err(ShellError::new(
            ErrorKind::ExpansionError,
            format!("{name}: unbound variable"),
        )),
        None => Ok(String::new()),
    }
}

fn split_fields(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(false);
        ctx.set_var("NAME", "world");
        ctx.positional = vec!["one".into(), "two".into()];
        ctx.set_last_status(42);
        ctx
    }

    fn expand(word: Word, ctx: &ExecutionContext) -> Vec<String> {
        BasicExpander.expand_word(&word, ctx).unwrap()
    }

    #[test]
    fn plain_and_braced_variables() {
        let ctx = ctx();
        assert_eq!(
            expand(Word::bare("hello-$NAME"), &ctx),
            vec!["hello-world"]
        );
        assert_eq!(expand(Word::bare("${NAME}ly"), &ctx), vec!["worldly"]);
    }

    #[test]
    fn single_quotes_suppress_expansion() {
        let ctx = ctx();
        assert_eq!(
            expand(Word::new("$NAME", QuoteKind::Single), &ctx),
            vec!["$NAME"]
        );
    }

    #[test]
    fn special_parameters() {
        let ctx = ctx();
        assert_eq!(expand(Word::bare("$?"), &ctx), vec!["42"]);
        assert_eq!(expand(Word::bare("$#"), &ctx), vec!["2"]);
        assert_eq!(expand(Word::bare("$1"), &ctx), vec!["one"]);
    }

    #[test]
    fn unset_variable_expands_empty_and_drops_the_field() {
        let ctx = ctx();
        assert!(expand(Word::bare("$MISSING"), &ctx).is_empty());
        assert_eq!(
            expand(Word::new("$MISSING", QuoteKind::Double), &ctx),
            vec![""]
        );
    }

    #[test]
    fn nounset_makes_unset_variables_an_error() {
        let mut ctx = ctx();
        ctx.options.nounset = true;
        assert!(BasicExpander
            .expand_word(&Word::bare("$MISSING"), &ctx)
            .is_err());
        // $? and friends are always set.
        assert!(BasicExpander.expand_word(&Word::bare("$?"), &ctx).is_ok());
    }

    #[test]
    fn unquoted_expansion_field_splits() {
        let mut ctx = ctx();
        ctx.set_var("WORDS", "a b  c");
        assert_eq!(expand(Word::bare("$WORDS"), &ctx), vec!["a", "b", "c"]);
        assert_eq!(
            expand(Word::new("$WORDS", QuoteKind::Double), &ctx),
            vec!["a b  c"]
        );
    }

    #[test]
    fn at_sign_expands_per_positional() {
        let ctx = ctx();
        assert_eq!(expand(Word::bare("$@"), &ctx), vec!["one", "two"]);
        assert_eq!(
            expand(Word::new("$@", QuoteKind::Double), &ctx),
            vec!["one", "two"]
        );
    }

    #[test]
    fn dollar_without_name_stays_literal() {
        let ctx = ctx();
        assert_eq!(expand(Word::bare("a$-b"), &ctx), vec!["a$-b"]);
    }
}
