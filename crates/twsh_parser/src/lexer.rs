//! Hand-written tokenizer for shell input.
//!
//! Quoting and escapes are resolved here; the parser only ever sees finished
//! words tagged with their quoting class. Heredoc bodies are collected by the
//! lexer as well, so a heredoc reaches the parser as a single token.

use crate::ast::QuoteKind;
use crate::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A word with quoting already resolved.
    Word(String, QuoteKind),
    /// Digits directly in front of a redirection operator (`2>`).
    IoNumber(i32),
    /// A heredoc with its collected body; `expand` is false for a quoted
    /// delimiter.
    Heredoc { body: String, expand: bool },
    Pipe,      // |
    AndIf,     // &&
    OrIf,      // ||
    Amp,       // &
    Semi,      // ;
    DSemi,     // ;;
    Less,      // <
    Great,     // >
    DGreat,    // >>
    LessAnd,   // <&
    GreatAnd,  // >&
    Clobber,   // >|
    TLess,     // <<<
    LParen,    // (
    RParen,    // )
    Newline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
}

impl Token {
    fn new(kind: TokenKind) -> Self {
        Self { kind }
    }
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
    /// Heredocs opened on the current line: token index, delimiter, strip-tabs.
    pending_heredocs: Vec<(usize, String, bool)>,
}

/// Tokenize a complete input string.
///
/// Returns `ParseError::Incomplete` when the input ends inside a quoted
/// string or before a heredoc delimiter, so an interactive caller can read a
/// continuation line and retry.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        src: input.as_bytes(),
        pos: 0,
        tokens: Vec::new(),
        pending_heredocs: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn run(&mut self) -> Result<(), ParseError> {
        while let Some(c) = self.peek() {
            match c {
                b' ' | b'\t' | b'\r' => {
                    self.pos += 1;
                }
                b'\n' => {
                    self.pos += 1;
                    self.collect_heredoc_bodies()?;
                    self.tokens.push(Token::new(TokenKind::Newline));
                }
                b'#' => {
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.pos += 1;
                    }
                }
                b'|' => {
                    self.pos += 1;
                    if self.peek() == Some(b'|') {
                        self.pos += 1;
                        self.tokens.push(Token::new(TokenKind::OrIf));
                    } else {
                        self.tokens.push(Token::new(TokenKind::Pipe));
                    }
                }
                b'&' => {
                    self.pos += 1;
                    if self.peek() == Some(b'&') {
                        self.pos += 1;
                        self.tokens.push(Token::new(TokenKind::AndIf));
                    } else {
                        self.tokens.push(Token::new(TokenKind::Amp));
                    }
                }
                b';' => {
                    self.pos += 1;
                    if self.peek() == Some(b';') {
                        self.pos += 1;
                        self.tokens.push(Token::new(TokenKind::DSemi));
                    } else {
                        self.tokens.push(Token::new(TokenKind::Semi));
                    }
                }
                b'(' => {
                    self.pos += 1;
                    self.tokens.push(Token::new(TokenKind::LParen));
                }
                b')' => {
                    self.pos += 1;
                    self.tokens.push(Token::new(TokenKind::RParen));
                }
                b'<' => self.lex_less()?,
                b'>' => self.lex_great(),
                _ => self.lex_word()?,
            }
        }
        // A trailing line without '\n' can still own heredoc bodies that
        // never arrived.
        self.collect_heredoc_bodies()?;
        Ok(())
    }

    fn lex_less(&mut self) -> Result<(), ParseError> {
        self.pos += 1; // consume '<'
        match self.peek() {
            Some(b'<') => {
                self.pos += 1;
                if self.peek() == Some(b'<') {
                    self.pos += 1;
                    self.tokens.push(Token::new(TokenKind::TLess));
                } else {
                    let strip_tabs = if self.peek() == Some(b'-') {
                        self.pos += 1;
                        true
                    } else {
                        false
                    };
                    self.open_heredoc(strip_tabs)?;
                }
            }
            Some(b'&') => {
                self.pos += 1;
                self.tokens.push(Token::new(TokenKind::LessAnd));
            }
            _ => self.tokens.push(Token::new(TokenKind::Less)),
        }
        Ok(())
    }

    fn lex_great(&mut self) {
        self.pos += 1; // consume '>'
        match self.peek() {
            Some(b'>') => {
                self.pos += 1;
                self.tokens.push(Token::new(TokenKind::DGreat));
            }
            Some(b'&') => {
                self.pos += 1;
                self.tokens.push(Token::new(TokenKind::GreatAnd));
            }
            Some(b'|') => {
                self.pos += 1;
                self.tokens.push(Token::new(TokenKind::Clobber));
            }
            _ => self.tokens.push(Token::new(TokenKind::Great)),
        }
    }

    /// Read the delimiter word after `<<` and register the heredoc; the body
    /// is filled in when the line ends.
    fn open_heredoc(&mut self, strip_tabs: bool) -> Result<(), ParseError> {
        while self.peek() == Some(b' ') || self.peek() == Some(b'\t') {
            self.pos += 1;
        }
        let (delim, quote) = self.read_word_text()?;
        if delim.is_empty() {
            return Err(ParseError::Syntax("missing heredoc delimiter".into()));
        }
        let expand = quote == QuoteKind::Unquoted;
        self.tokens.push(Token::new(TokenKind::Heredoc {
            body: String::new(),
            expand,
        }));
        self.pending_heredocs
            .push((self.tokens.len() - 1, delim, strip_tabs));
        Ok(())
    }

    /// Consume heredoc bodies queued on the line that just ended, in opening
    /// order.
    fn collect_heredoc_bodies(&mut self) -> Result<(), ParseError> {
        let pending = std::mem::take(&mut self.pending_heredocs);
        for (token_idx, delim, strip_tabs) in pending {
            let mut body = String::new();
            loop {
                if self.pos >= self.src.len() {
                    return Err(ParseError::Incomplete);
                }
                let line_start = self.pos;
                while self.peek().is_some_and(|c| c != b'\n') {
                    self.pos += 1;
                }
                let mut line = std::str::from_utf8(&self.src[line_start..self.pos])
                    .map_err(|_| ParseError::Syntax("heredoc body is not valid UTF-8".into()))?;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
                if strip_tabs {
                    line = line.trim_start_matches('\t');
                }
                if line == delim {
                    break;
                }
                body.push_str(line);
                body.push('\n');
            }
            if let TokenKind::Heredoc { body: slot, .. } = &mut self.tokens[token_idx].kind {
                *slot = body;
            }
        }
        Ok(())
    }

    fn lex_word(&mut self) -> Result<(), ParseError> {
        // IO number: digits glued to a redirection operator.
        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let start = self.pos;
            let mut end = self.pos;
            while self.src.get(end).is_some_and(|c| c.is_ascii_digit()) {
                end += 1;
            }
            if matches!(self.src.get(end), Some(b'<') | Some(b'>')) {
                let text: String = self.src[start..end].iter().map(|b| *b as char).collect();
                if let Ok(n) = text.parse::<i32>() {
                    self.pos = end;
                    self.tokens.push(Token::new(TokenKind::IoNumber(n)));
                    return Ok(());
                }
            }
        }

        let (text, quote) = self.read_word_text()?;
        self.tokens.push(Token::new(TokenKind::Word(text, quote)));
        Ok(())
    }

    /// Read one word: adjacent unquoted/quoted segments merge into a single
    /// word. The resulting quote class is Single only if every segment was
    /// single-quoted; Double if any quoting appeared at all.
    fn read_word_text(&mut self) -> Result<(String, QuoteKind), ParseError> {
        // Accumulate bytes and convert once: words can carry multi-byte
        // UTF-8 and every split point here is ASCII.
        let mut bytes = Vec::new();
        let mut saw_single = false;
        let mut saw_other = false;
        let mut saw_plain = false;

        loop {
            match self.peek() {
                Some(b'\'') => {
                    self.pos += 1;
                    saw_single = true;
                    loop {
                        match self.bump() {
                            Some(b'\'') => break,
                            Some(c) => bytes.push(c),
                            None => return Err(ParseError::Incomplete),
                        }
                    }
                }
                Some(b'"') => {
                    self.pos += 1;
                    saw_other = true;
                    loop {
                        match self.bump() {
                            Some(b'"') => break,
                            Some(b'\\') => match self.bump() {
                                // Inside double quotes a backslash only
                                // escapes these.
                                Some(c @ (b'"' | b'\\' | b'$' | b'`')) => bytes.push(c),
                                Some(c) => {
                                    bytes.push(b'\\');
                                    bytes.push(c);
                                }
                                None => return Err(ParseError::Incomplete),
                            },
                            Some(c) => bytes.push(c),
                            None => return Err(ParseError::Incomplete),
                        }
                    }
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.bump() {
                        Some(b'\n') => {} // line continuation
                        Some(c) => {
                            saw_other = true; // escaped chars stay literal
                            bytes.push(c);
                        }
                        None => return Err(ParseError::Incomplete),
                    }
                }
                Some(c) if is_word_byte(c) => {
                    self.pos += 1;
                    saw_plain = true;
                    bytes.push(c);
                }
                _ => break,
            }
        }

        let text = String::from_utf8(bytes)
            .map_err(|_| ParseError::Syntax("word is not valid UTF-8".into()))?;

        // A word is Single only when single quotes covered all of it;
        // any plain or double-quoted segment leaves expansion enabled.
        let quote = if saw_single && !saw_other && !saw_plain {
            QuoteKind::Single
        } else if saw_single || saw_other {
            QuoteKind::Double
        } else {
            QuoteKind::Unquoted
        };
        Ok((text, quote))
    }
}

// '#' is a word byte: it only opens a comment at the start of a token,
// which the main loop checks before word lexing begins.
fn is_word_byte(c: u8) -> bool {
    !matches!(
        c,
        b' ' | b'\t' | b'\r' | b'\n' | b'|' | b'&' | b';' | b'<' | b'>' | b'(' | b')' | b'\'' | b'"' | b'\\'
    )
}
