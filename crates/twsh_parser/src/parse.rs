//! Recursive-descent parser turning a token stream into the AST.
//!
//! The grammar is the POSIX command language subset the engine executes:
//! lists, and-or chains, pipelines, compound commands, function definitions,
//! and redirections. Reserved words are only special in command position.

use crate::ast::{
    AndOrOp, Assignment, AstNode, CaseArm, ListItem, QuoteKind, Redirect, RedirectOp, Word,
};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::ParseError;

/// Parse one complete input (possibly spanning several lines).
pub fn parse(input: &str) -> Result<AstNode, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_program()
}

// Words that terminate an inner list rather than starting a command.
const LIST_TERMINATORS: &[&str] = &[
    "then", "elif", "else", "fi", "do", "done", "esac", "}",
];

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn bump(&mut self) -> Option<TokenKind> {
        let t = self.tokens.get(self.pos).map(|t| t.kind.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_newlines(&mut self) {
        while matches!(self.peek(), Some(TokenKind::Newline)) {
            self.pos += 1;
        }
    }

    /// True when the next token is the given unquoted word.
    fn at_word(&self, text: &str) -> bool {
        matches!(self.peek(), Some(TokenKind::Word(w, QuoteKind::Unquoted)) if w == text)
    }

    fn expect_word(&mut self, text: &str) -> Result<(), ParseError> {
        if self.at_word(text) {
            self.pos += 1;
            Ok(())
        } else {
            match self.peek() {
                None => Err(ParseError::Incomplete),
                Some(t) => Err(ParseError::Syntax(format!(
                    "expected `{text}`, found {t:?}"
                ))),
            }
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        match self.peek() {
            Some(t) if t == kind => {
                self.pos += 1;
                Ok(())
            }
            None => Err(ParseError::Incomplete),
            Some(t) => Err(ParseError::Syntax(format!(
                "expected {kind:?}, found {t:?}"
            ))),
        }
    }

    fn parse_program(&mut self) -> Result<AstNode, ParseError> {
        let node = self.parse_list()?;
        self.eat_newlines();
        match self.peek() {
            None => Ok(node),
            Some(t) => Err(ParseError::Syntax(format!("unexpected token {t:?}"))),
        }
    }

    /// Parse a command list up to (not including) a terminator: a list
    /// terminator word, `)`, `;;`, or end of input.
    fn parse_list(&mut self) -> Result<AstNode, ParseError> {
        let mut items = Vec::new();

        loop {
            self.eat_newlines();
            match self.peek() {
                None | Some(TokenKind::RParen) | Some(TokenKind::DSemi) => break,
                Some(TokenKind::Word(w, QuoteKind::Unquoted))
                    if LIST_TERMINATORS.contains(&w.as_str()) =>
                {
                    break
                }
                _ => {}
            }

            let node = self.parse_and_or()?;
            let background = match self.peek() {
                Some(TokenKind::Amp) => {
                    self.pos += 1;
                    true
                }
                Some(TokenKind::Semi) => {
                    self.pos += 1;
                    false
                }
                Some(TokenKind::Newline) => false,
                _ => false,
            };
            items.push(ListItem { node, background });
        }

        if items.is_empty() {
            return Err(match self.peek() {
                None => ParseError::Incomplete,
                Some(t) => ParseError::Syntax(format!("expected a command, found {t:?}")),
            });
        }
        if items.len() == 1 && !items[0].background {
            Ok(items.remove(0).node)
        } else {
            Ok(AstNode::Sequence(items))
        }
    }

    fn parse_and_or(&mut self) -> Result<AstNode, ParseError> {
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();

        loop {
            let op = match self.peek() {
                Some(TokenKind::AndIf) => AndOrOp::And,
                Some(TokenKind::OrIf) => AndOrOp::Or,
                _ => break,
            };
            self.pos += 1;
            self.eat_newlines();
            rest.push((op, self.parse_pipeline()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(AstNode::AndOr {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_pipeline(&mut self) -> Result<AstNode, ParseError> {
        let negated = if self.at_word("!") {
            self.pos += 1;
            true
        } else {
            false
        };

        let mut stages = vec![self.parse_command()?];
        while matches!(self.peek(), Some(TokenKind::Pipe)) {
            self.pos += 1;
            self.eat_newlines();
            stages.push(self.parse_command()?);
        }

        if stages.len() == 1 && !negated {
            Ok(stages.remove(0))
        } else {
            Ok(AstNode::Pipeline { stages, negated })
        }
    }

    fn parse_command(&mut self) -> Result<AstNode, ParseError> {
        match self.peek() {
            Some(TokenKind::LParen) => {
                self.pos += 1;
                let body = self.parse_list()?;
                self.expect(&TokenKind::RParen)?;
                self.with_trailing_redirects(AstNode::Subshell(Box::new(body)))
            }
            Some(TokenKind::Word(w, QuoteKind::Unquoted)) => match w.as_str() {
                "{" => {
                    self.pos += 1;
                    let body = self.parse_list()?;
                    self.expect_word("}")?;
                    self.with_trailing_redirects(AstNode::BraceGroup(Box::new(body)))
                }
                "if" => {
                    let node = self.parse_if()?;
                    self.with_trailing_redirects(node)
                }
                "while" => {
                    let node = self.parse_while(false)?;
                    self.with_trailing_redirects(node)
                }
                "until" => {
                    let node = self.parse_while(true)?;
                    self.with_trailing_redirects(node)
                }
                "for" => {
                    let node = self.parse_for()?;
                    self.with_trailing_redirects(node)
                }
                "case" => {
                    let node = self.parse_case()?;
                    self.with_trailing_redirects(node)
                }
                "function" => {
                    self.pos += 1;
                    self.parse_function_def()
                }
                _ if self.is_function_def() => self.parse_function_def(),
                _ => self.parse_simple_command(),
            },
            _ => self.parse_simple_command(),
        }
    }

    /// Look ahead for `name ( )` starting a function definition.
    fn is_function_def(&self) -> bool {
        match (self.peek(), self.tokens.get(self.pos + 1), self.tokens.get(self.pos + 2)) {
            (
                Some(TokenKind::Word(name, QuoteKind::Unquoted)),
                Some(Token { kind: TokenKind::LParen }),
                Some(Token { kind: TokenKind::RParen }),
            ) => is_identifier(name),
            _ => false,
        }
    }

    fn parse_function_def(&mut self) -> Result<AstNode, ParseError> {
        let name = match self.bump() {
            Some(TokenKind::Word(n, QuoteKind::Unquoted)) if is_identifier(&n) => n,
            Some(t) => {
                return Err(ParseError::Syntax(format!("invalid function name: {t:?}")))
            }
            None => return Err(ParseError::Incomplete),
        };
        // `function name { … }` makes the parens optional.
        if matches!(self.peek(), Some(TokenKind::LParen)) {
            self.pos += 1;
            self.expect(&TokenKind::RParen)?;
        }
        self.eat_newlines();
        let body = self.parse_command()?;
        Ok(AstNode::FunctionDef {
            name,
            body: Box::new(body),
        })
    }

    fn parse_if(&mut self) -> Result<AstNode, ParseError> {
        self.expect_word("if")?;
        let mut arms = Vec::new();

        let cond = self.parse_list()?;
        self.expect_word("then")?;
        let body = self.parse_list()?;
        arms.push((cond, body));

        let mut else_branch = None;
        loop {
            if self.at_word("elif") {
                self.pos += 1;
                let cond = self.parse_list()?;
                self.expect_word("then")?;
                let body = self.parse_list()?;
                arms.push((cond, body));
            } else if self.at_word("else") {
                self.pos += 1;
                else_branch = Some(Box::new(self.parse_list()?));
                break;
            } else {
                break;
            }
        }
        self.expect_word("fi")?;
        Ok(AstNode::If { arms, else_branch })
    }

    fn parse_while(&mut self, until: bool) -> Result<AstNode, ParseError> {
        self.pos += 1; // while / until
        let condition = self.parse_list()?;
        self.expect_word("do")?;
        let body = self.parse_list()?;
        self.expect_word("done")?;
        Ok(AstNode::While {
            condition: Box::new(condition),
            body: Box::new(body),
            until,
        })
    }

    fn parse_for(&mut self) -> Result<AstNode, ParseError> {
        self.expect_word("for")?;
        let variable = match self.bump() {
            Some(TokenKind::Word(n, QuoteKind::Unquoted)) if is_identifier(&n) => n,
            Some(t) => {
                return Err(ParseError::Syntax(format!(
                    "invalid for-loop variable: {t:?}"
                )))
            }
            None => return Err(ParseError::Incomplete),
        };
        self.eat_newlines();

        let words = if self.at_word("in") {
            self.pos += 1;
            let mut words = Vec::new();
            while let Some(TokenKind::Word(text, quote)) = self.peek() {
                // `do` after a separator ends the word list, but only
                // separators end it; `for i in do` would be a word.
                words.push(Word::new(text.clone(), *quote));
                self.pos += 1;
            }
            Some(words)
        } else {
            None
        };

        if matches!(self.peek(), Some(TokenKind::Semi)) {
            self.pos += 1;
        }
        self.eat_newlines();
        self.expect_word("do")?;
        let body = self.parse_list()?;
        self.expect_word("done")?;
        Ok(AstNode::For {
            variable,
            words,
            body: Box::new(body),
        })
    }

    fn parse_case(&mut self) -> Result<AstNode, ParseError> {
        self.expect_word("case")?;
        let subject = match self.bump() {
            Some(TokenKind::Word(text, quote)) => Word::new(text, quote),
            Some(t) => return Err(ParseError::Syntax(format!("expected word, found {t:?}"))),
            None => return Err(ParseError::Incomplete),
        };
        self.eat_newlines();
        self.expect_word("in")?;
        self.eat_newlines();

        let mut arms = Vec::new();
        while !self.at_word("esac") {
            if self.peek().is_none() {
                return Err(ParseError::Incomplete);
            }
            if matches!(self.peek(), Some(TokenKind::LParen)) {
                self.pos += 1;
            }
            let mut patterns = Vec::new();
            loop {
                match self.bump() {
                    Some(TokenKind::Word(text, quote)) => {
                        patterns.push(Word::new(text, quote))
                    }
                    Some(t) => {
                        return Err(ParseError::Syntax(format!(
                            "expected case pattern, found {t:?}"
                        )))
                    }
                    None => return Err(ParseError::Incomplete),
                }
                match self.peek() {
                    Some(TokenKind::Pipe) => {
                        self.pos += 1;
                    }
                    _ => break,
                }
            }
            self.expect(&TokenKind::RParen)?;
            self.eat_newlines();

            // An arm body may be empty: `pat) ;;`
            let body = if matches!(self.peek(), Some(TokenKind::DSemi)) || self.at_word("esac") {
                AstNode::Sequence(Vec::new())
            } else {
                self.parse_list()?
            };
            arms.push(CaseArm { patterns, body });

            if matches!(self.peek(), Some(TokenKind::DSemi)) {
                self.pos += 1;
            }
            self.eat_newlines();
        }
        self.expect_word("esac")?;
        Ok(AstNode::Case { subject, arms })
    }

    fn with_trailing_redirects(&mut self, node: AstNode) -> Result<AstNode, ParseError> {
        let mut redirects = Vec::new();
        while let Some(redirect) = self.try_parse_redirect()? {
            redirects.push(redirect);
        }
        if redirects.is_empty() {
            Ok(node)
        } else {
            Ok(AstNode::Redirected {
                node: Box::new(node),
                redirects,
            })
        }
    }

    /// Parse a redirection if one starts here, including a leading io-number.
    fn try_parse_redirect(&mut self) -> Result<Option<Redirect>, ParseError> {
        let fd = match self.peek() {
            Some(TokenKind::IoNumber(n)) => {
                let n = *n;
                // Only consume the number if a redirect operator follows.
                match self.tokens.get(self.pos + 1).map(|t| &t.kind) {
                    Some(
                        TokenKind::Less
                        | TokenKind::Great
                        | TokenKind::DGreat
                        | TokenKind::LessAnd
                        | TokenKind::GreatAnd
                        | TokenKind::Clobber
                        | TokenKind::TLess
                        | TokenKind::Heredoc { .. },
                    ) => {
                        self.pos += 1;
                        Some(n)
                    }
                    _ => return Ok(None),
                }
            }
            _ => None,
        };

        let op = match self.peek() {
            Some(TokenKind::Less) => RedirectOp::Input,
            Some(TokenKind::Great) => RedirectOp::Output { clobber: false },
            Some(TokenKind::Clobber) => RedirectOp::Output { clobber: true },
            Some(TokenKind::DGreat) => RedirectOp::Append,
            Some(TokenKind::LessAnd) => RedirectOp::DupInput,
            Some(TokenKind::GreatAnd) => RedirectOp::DupOutput,
            Some(TokenKind::TLess) => RedirectOp::HereString,
            Some(TokenKind::Heredoc { body, expand }) => {
                let redirect = Redirect {
                    fd,
                    op: RedirectOp::Heredoc { expand: *expand },
                    target: Word::new(body.clone(), QuoteKind::Unquoted),
                };
                self.pos += 1;
                return Ok(Some(redirect));
            }
            _ => {
                if fd.is_some() {
                    return Err(ParseError::Syntax(
                        "io number without redirection operator".into(),
                    ));
                }
                return Ok(None);
            }
        };
        self.pos += 1;

        let target = match self.bump() {
            Some(TokenKind::Word(text, quote)) => Word::new(text, quote),
            Some(t) => {
                return Err(ParseError::Syntax(format!(
                    "expected redirection target, found {t:?}"
                )))
            }
            None => return Err(ParseError::Incomplete),
        };
        Ok(Some(Redirect { fd, op, target }))
    }

    fn parse_simple_command(&mut self) -> Result<AstNode, ParseError> {
        let mut assignments = Vec::new();
        let mut words: Vec<Word> = Vec::new();
        let mut redirects = Vec::new();

        loop {
            if let Some(redirect) = self.try_parse_redirect()? {
                redirects.push(redirect);
                continue;
            }
            match self.peek() {
                Some(TokenKind::Word(text, quote)) => {
                    let (text, quote) = (text.clone(), *quote);
                    if words.is_empty() && quote != QuoteKind::Single {
                        if let Some((name, value)) = split_assignment(&text) {
                            self.pos += 1;
                            assignments.push(Assignment {
                                name: name.to_string(),
                                value: Word::new(value, quote),
                            });
                            continue;
                        }
                    }
                    self.pos += 1;
                    words.push(Word::new(text, quote));
                }
                _ => break,
            }
        }

        if assignments.is_empty() && words.is_empty() && redirects.is_empty() {
            return Err(match self.peek() {
                None => ParseError::Incomplete,
                Some(t) => ParseError::Syntax(format!("expected a command, found {t:?}")),
            });
        }
        Ok(AstNode::SimpleCommand {
            assignments,
            words,
            redirects,
        })
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split `name=value` when `name` is a valid identifier.
fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let eq = text.find('=')?;
    let (name, rest) = text.split_at(eq);
    if is_identifier(name) {
        Some((name, &rest[1..]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> AstNode {
        parse(input).unwrap_or_else(|e| panic!("parse failed for {input:?}: {e}"))
    }

    #[test]
    fn simple_command_with_args() {
        match parse_ok("echo hello world") {
            AstNode::SimpleCommand { words, .. } => {
                let texts: Vec<_> = words.iter().map(|w| w.text.as_str()).collect();
                assert_eq!(texts, vec!["echo", "hello", "world"]);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn pipeline_has_stages_in_order() {
        match parse_ok("a | b | c") {
            AstNode::Pipeline { stages, negated } => {
                assert_eq!(stages.len(), 3);
                assert!(!negated);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn negated_single_command_stays_a_pipeline() {
        match parse_ok("! true") {
            AstNode::Pipeline { stages, negated } => {
                assert_eq!(stages.len(), 1);
                assert!(negated);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn and_or_chain() {
        match parse_ok("a && b || c") {
            AstNode::AndOr { rest, .. } => {
                assert_eq!(rest[0].0, AndOrOp::And);
                assert_eq!(rest[1].0, AndOrOp::Or);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn background_item_marked() {
        match parse_ok("sleep 5 &") {
            AstNode::Sequence(items) => {
                assert_eq!(items.len(), 1);
                assert!(items[0].background);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn prefix_assignments_split_from_words() {
        match parse_ok("FOO=bar BAZ=qux env") {
            AstNode::SimpleCommand { assignments, words, .. } => {
                assert_eq!(assignments.len(), 2);
                assert_eq!(assignments[0].name, "FOO");
                assert_eq!(assignments[0].value.text, "bar");
                assert_eq!(words.len(), 1);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn if_elif_else() {
        match parse_ok("if a; then b; elif c; then d; else e; fi") {
            AstNode::If { arms, else_branch } => {
                assert_eq!(arms.len(), 2);
                assert!(else_branch.is_some());
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn while_and_until() {
        assert!(matches!(
            parse_ok("while a; do b; done"),
            AstNode::While { until: false, .. }
        ));
        assert!(matches!(
            parse_ok("until a; do b; done"),
            AstNode::While { until: true, .. }
        ));
    }

    #[test]
    fn for_loop_words() {
        match parse_ok("for i in 1 2 3; do echo $i; done") {
            AstNode::For { variable, words, .. } => {
                assert_eq!(variable, "i");
                assert_eq!(words.unwrap().len(), 3);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn for_without_in_iterates_positionals() {
        match parse_ok("for arg; do echo $arg; done") {
            AstNode::For { words, .. } => assert!(words.is_none()),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn case_with_two_arms() {
        match parse_ok("case $x in a|b) echo ab ;; *) echo other ;; esac") {
            AstNode::Case { arms, .. } => {
                assert_eq!(arms.len(), 2);
                assert_eq!(arms[0].patterns.len(), 2);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn function_definition_forms() {
        assert!(matches!(
            parse_ok("f() { echo hi; }"),
            AstNode::FunctionDef { .. }
        ));
        assert!(matches!(
            parse_ok("function f { echo hi; }"),
            AstNode::FunctionDef { .. }
        ));
    }

    #[test]
    fn subshell_and_brace_group() {
        assert!(matches!(parse_ok("(a; b)"), AstNode::Subshell(_)));
        assert!(matches!(parse_ok("{ a; b; }"), AstNode::BraceGroup(_)));
    }

    #[test]
    fn compound_redirect_wraps_node() {
        match parse_ok("{ echo hi; } > out.txt") {
            AstNode::Redirected { node, redirects } => {
                assert!(matches!(*node, AstNode::BraceGroup(_)));
                assert_eq!(redirects.len(), 1);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn redirect_fd_and_kinds() {
        match parse_ok("cmd < in > out 2>> log") {
            AstNode::SimpleCommand { redirects, .. } => {
                assert_eq!(redirects.len(), 3);
                assert_eq!(redirects[0].op, RedirectOp::Input);
                assert_eq!(redirects[1].op, RedirectOp::Output { clobber: false });
                assert_eq!(redirects[2].fd, Some(2));
                assert_eq!(redirects[2].op, RedirectOp::Append);
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn dup_redirect_target_is_fd() {
        match parse_ok("cmd 2>&1") {
            AstNode::SimpleCommand { redirects, .. } => {
                assert_eq!(redirects[0].fd, Some(2));
                assert_eq!(redirects[0].op, RedirectOp::DupOutput);
                assert_eq!(redirects[0].target.text, "1");
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn heredoc_becomes_stdin_redirect() {
        match parse_ok("cat <<EOF\nhello\nEOF\n") {
            AstNode::SimpleCommand { redirects, .. } => {
                assert_eq!(redirects.len(), 1);
                assert!(matches!(
                    redirects[0].op,
                    RedirectOp::Heredoc { expand: true }
                ));
                assert_eq!(redirects[0].target.text, "hello\n");
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn incomplete_constructs_ask_for_more_input() {
        assert_eq!(parse("if true; then echo hi"), Err(ParseError::Incomplete));
        assert_eq!(parse("while true; do"), Err(ParseError::Incomplete));
        assert_eq!(parse("( echo hi"), Err(ParseError::Incomplete));
    }

    #[test]
    fn stray_terminator_is_a_syntax_error() {
        assert!(matches!(parse("fi"), Err(ParseError::Syntax(_))));
        assert!(matches!(parse("a ; then"), Err(ParseError::Syntax(_))));
    }
}
