// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// Tokenizer for protocol buffer text format, structured after the
// equation lexer: a single character of lookahead over CharIndices.

use std::str::CharIndices;

use lazy_static::lazy_static;
use regex::Regex;

use self::Token::*;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LexErrorCode {
    UnrecognizedToken,
    UnclosedString,
    BadEscape,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexError {
    pub start: usize,
    pub end: usize,
    pub code: LexErrorCode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token<'input> {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LAngle,
    RAngle,
    Colon,
    Comma,
    Semicolon,
    Ident(&'input str),
    Num(&'input str),
    /// A quoted string with escapes already resolved.
    Str(String),
}

fn error<T>(code: LexErrorCode, start: usize, end: usize) -> Result<T, LexError> {
    Err(LexError { start, end, code })
}

pub type Spanned<T> = (usize, T, usize);

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let mut t = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
        };
        t.bump();
        t
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.bump_n(1)
    }

    fn bump_n(&mut self, n: usize) -> Option<(usize, char)> {
        assert!(n > 0);
        self.lookahead = self.chars.nth(n - 1);
        self.lookahead
    }

    fn take_while<F>(&mut self, mut keep_going: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        loop {
            match self.lookahead {
                None => {
                    return None;
                }
                Some((idx1, c)) => {
                    if !keep_going(c) {
                        return Some(idx1);
                    } else {
                        self.bump();
                    }
                }
            }
        }
    }

    fn identifier(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        let end = self
            .take_while(is_identifier_continue)
            .unwrap_or(self.text.len());
        (idx0, Ident(&self.text[idx0..end]), end)
    }

    fn number(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, LexError> {
        lazy_static! {
            static ref NUMBER_RE: Regex = Regex::new(
                r"^[-+]?(0[xX][0-9a-fA-F]+|(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?[fF]?|inf(inity)?|nan)"
            )
            .unwrap();
        }

        match NUMBER_RE.find(&self.text[idx0..]) {
            Some(m) if m.end() > 0 => {
                let end = idx0 + m.end();
                let n = self.text[idx0..end].chars().count();
                self.bump_n(n);
                Ok((idx0, Num(&self.text[idx0..end]), end))
            }
            _ => {
                self.bump();
                error(LexErrorCode::UnrecognizedToken, idx0, idx0 + 1)
            }
        }
    }

    fn string(&mut self, idx0: usize, quote: char) -> Result<Spanned<Token<'input>>, LexError> {
        // eat the opening quote
        self.bump();

        let mut s = String::new();
        loop {
            match self.lookahead {
                None | Some((_, '\n')) => {
                    return error(LexErrorCode::UnclosedString, idx0, self.text.len());
                }
                Some((idx1, c)) if c == quote => {
                    self.bump();
                    return Ok((idx0, Str(s), idx1 + 1));
                }
                Some((idx1, '\\')) => {
                    let escaped = match self.bump() {
                        Some((_, 'n')) => '\n',
                        Some((_, 't')) => '\t',
                        Some((_, 'r')) => '\r',
                        Some((_, '0')) => '\0',
                        Some((_, c @ ('\\' | '\'' | '"'))) => c,
                        _ => return error(LexErrorCode::BadEscape, idx1, idx1 + 2),
                    };
                    s.push(escaped);
                    self.bump();
                }
                Some((_, c)) => {
                    s.push(c);
                    self.bump();
                }
            }
        }
    }

    fn skip_comment(&mut self) {
        self.take_while(|c| c != '\n');
    }

    #[allow(clippy::unnecessary_wraps)]
    fn consume(
        &mut self,
        i: usize,
        tok: Token<'input>,
        len: usize,
    ) -> Option<Result<Spanned<Token<'input>>, LexError>> {
        self.bump();
        Some(Ok((i, tok, i + len)))
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.lookahead {
                Some((i, '{')) => self.consume(i, LBrace, 1),
                Some((i, '}')) => self.consume(i, RBrace, 1),
                Some((i, '[')) => self.consume(i, LBracket, 1),
                Some((i, ']')) => self.consume(i, RBracket, 1),
                Some((i, '<')) => self.consume(i, LAngle, 1),
                Some((i, '>')) => self.consume(i, RAngle, 1),
                Some((i, ':')) => self.consume(i, Colon, 1),
                Some((i, ',')) => self.consume(i, Comma, 1),
                Some((i, ';')) => self.consume(i, Semicolon, 1),
                Some((_, '#')) => {
                    self.skip_comment();
                    continue;
                }
                Some((i, c @ ('"' | '\''))) => Some(self.string(i, c)),
                Some((i, c)) if is_identifier_start(c) => Some(Ok(self.identifier(i))),
                Some((i, c)) if is_number_start(c) => Some(self.number(i)),
                Some((_, c)) if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                Some((i, _)) => {
                    self.bump(); // eat whatever is killing us
                    let end = match self.lookahead {
                        Some((end, _)) => end,
                        None => self.text.len(),
                    };
                    Some(error(LexErrorCode::UnrecognizedToken, i, end))
                }
                None => None,
            };
        }
    }
}

fn is_number_start(c: char) -> bool {
    c.is_ascii_digit() || c == '.' || c == '-' || c == '+'
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}
