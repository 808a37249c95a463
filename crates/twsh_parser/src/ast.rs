//! Abstract syntax tree for Tidewater Shell.
//!
//! The tree is immutable once parsed. The execution engine borrows nodes and
//! never mutates them; ownership stays with whoever called `parse`.

use std::fmt;

/// Quoting class of a word, recorded so expansion can honor single-quote
/// suppression without re-lexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    /// Bare word, subject to full expansion and field splitting.
    Unquoted,
    /// Single-quoted: fully literal.
    Single,
    /// Double-quoted: parameter expansion without field splitting.
    Double,
}

/// A word as produced by the lexer, expansion still pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub quote: QuoteKind,
}

impl Word {
    pub fn new(text: impl Into<String>, quote: QuoteKind) -> Self {
        Self { text: text.into(), quote }
    }

    /// Bare unquoted word, the common case in tests.
    pub fn bare(text: impl Into<String>) -> Self {
        Self::new(text, QuoteKind::Unquoted)
    }
}

/// `name=value` prefix assignment on a simple command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub value: Word,
}

/// Redirection operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    /// `< file`
    Input,
    /// `> file` (or `>| file` when `clobber` forces truncation past noclobber)
    Output { clobber: bool },
    /// `>> file`
    Append,
    /// `<& n` / `<& -`
    DupInput,
    /// `>& n` / `>& -`
    DupOutput,
    /// `<< delim`; `expand` is false when the delimiter was quoted
    Heredoc { expand: bool },
    /// `<<< word`
    HereString,
}

/// One redirection as written, target unexpanded. For heredocs the target
/// word carries the collected body, not a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Explicit fd number (`2> file`), or None for the operator default.
    pub fd: Option<i32>,
    pub op: RedirectOp,
    pub target: Word,
}

/// `&&` / `||` connective in an and-or list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AndOrOp {
    And,
    Or,
}

/// One element of a command list, with its separator recorded: `cmd ;` runs
/// synchronously, `cmd &` is launched as a background job.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub node: AstNode,
    pub background: bool,
}

/// One `pattern) body ;;` arm of a case statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    pub patterns: Vec<Word>,
    pub body: AstNode,
}

/// Shell syntax tree. Closed set: the executor dispatches exhaustively, so
/// adding a variant is a compile-time-checked change everywhere it matters.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    /// `a; b; c &` — children run left to right.
    Sequence(Vec<ListItem>),
    /// `a && b || c` — left to right with short-circuit.
    AndOr {
        first: Box<AstNode>,
        rest: Vec<(AndOrOp, AstNode)>,
    },
    /// `a | b | c`, possibly `!`-negated. Single-stage pipelines are emitted
    /// as a bare command unless negated.
    Pipeline {
        stages: Vec<AstNode>,
        negated: bool,
    },
    /// One command invocation with its assignments and redirections.
    SimpleCommand {
        assignments: Vec<Assignment>,
        words: Vec<Word>,
        redirects: Vec<Redirect>,
    },
    /// `if c; then b; elif c2; then b2; else e; fi` — arms hold each
    /// condition/body pair in order.
    If {
        arms: Vec<(AstNode, AstNode)>,
        else_branch: Option<Box<AstNode>>,
    },
    /// `while`/`until` loop; `until` inverts the condition test.
    While {
        condition: Box<AstNode>,
        body: Box<AstNode>,
        until: bool,
    },
    /// `for name in words; do …; done`. `words: None` iterates the
    /// positional parameters.
    For {
        variable: String,
        words: Option<Vec<Word>>,
        body: Box<AstNode>,
    },
    Case {
        subject: Word,
        arms: Vec<CaseArm>,
    },
    /// `name() { … }` — registers a callable, body executed on invocation.
    FunctionDef {
        name: String,
        body: Box<AstNode>,
    },
    /// `( … )` — isolated child process; state changes invisible outside.
    Subshell(Box<AstNode>),
    /// `{ …; }` — current process, no isolation.
    BraceGroup(Box<AstNode>),
    /// A compound command with trailing redirections, e.g. `{ …; } > f`.
    Redirected {
        node: Box<AstNode>,
        redirects: Vec<Redirect>,
    },
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quote {
            QuoteKind::Unquoted => write!(f, "{}", self.text),
            QuoteKind::Single => write!(f, "'{}'", self.text),
            QuoteKind::Double => write!(f, "\"{}\"", self.text),
        }
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(fd) = self.fd {
            write!(f, "{fd}")?;
        }
        match self.op {
            RedirectOp::Input => write!(f, "< {}", self.target),
            RedirectOp::Output { clobber: false } => write!(f, "> {}", self.target),
            RedirectOp::Output { clobber: true } => write!(f, ">| {}", self.target),
            RedirectOp::Append => write!(f, ">> {}", self.target),
            RedirectOp::DupInput => write!(f, "<&{}", self.target.text),
            RedirectOp::DupOutput => write!(f, ">&{}", self.target.text),
            RedirectOp::Heredoc { .. } => write!(f, "<< EOF"),
            RedirectOp::HereString => write!(f, "<<< {}", self.target),
        }
    }
}

// Rendered text is what the job table stores as the job's originating
// command, so it favors readability over round-tripping.
impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstNode::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", item.node)?;
                    if item.background {
                        write!(f, " &")?;
                    }
                }
                Ok(())
            }
            AstNode::AndOr { first, rest } => {
                write!(f, "{first}")?;
                for (op, node) in rest {
                    let sep = match op {
                        AndOrOp::And => "&&",
                        AndOrOp::Or => "||",
                    };
                    write!(f, " {sep} {node}")?;
                }
                Ok(())
            }
            AstNode::Pipeline { stages, negated } => {
                if *negated {
                    write!(f, "! ")?;
                }
                for (i, stage) in stages.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{stage}")?;
                }
                Ok(())
            }
            AstNode::SimpleCommand { assignments, words, redirects } => {
                let mut first = true;
                for a in assignments {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{}={}", a.name, a.value)?;
                    first = false;
                }
                for w in words {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{w}")?;
                    first = false;
                }
                for r in redirects {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{r}")?;
                    first = false;
                }
                Ok(())
            }
            AstNode::If { .. } => write!(f, "if …"),
            AstNode::While { until: false, .. } => write!(f, "while …"),
            AstNode::While { until: true, .. } => write!(f, "until …"),
            AstNode::For { variable, .. } => write!(f, "for {variable} …"),
            AstNode::Case { subject, .. } => write!(f, "case {subject} …"),
            AstNode::FunctionDef { name, .. } => write!(f, "{name}()"),
            AstNode::Subshell(inner) => write!(f, "( {inner} )"),
            AstNode::BraceGroup(inner) => write!(f, "{{ {inner}; }}"),
            AstNode::Redirected { node, redirects } => {
                write!(f, "{node}")?;
                for r in redirects {
                    write!(f, " {r}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_pipeline_text() {
        let node = AstNode::Pipeline {
            stages: vec![
                AstNode::SimpleCommand {
                    assignments: vec![],
                    words: vec![Word::bare("sort")],
                    redirects: vec![],
                },
                AstNode::SimpleCommand {
                    assignments: vec![],
                    words: vec![Word::bare("uniq"), Word::bare("-c")],
                    redirects: vec![],
                },
            ],
            negated: false,
        };
        assert_eq!(node.to_string(), "sort | uniq -c");
    }

    #[test]
    fn display_marks_background_items() {
        let node = AstNode::Sequence(vec![ListItem {
            node: AstNode::SimpleCommand {
                assignments: vec![],
                words: vec![Word::bare("sleep"), Word::bare("5")],
                redirects: vec![],
            },
            background: true,
        }]);
        assert_eq!(node.to_string(), "sleep 5 &");
    }
}
