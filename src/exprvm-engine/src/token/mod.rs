// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// derived from both the LALRPOP whitespace tokenizer, and LALRPOP's
// internal tokenizer

use std::str::CharIndices;

use lazy_static::lazy_static;
use unicode_xid::UnicodeXID;

use self::Token::*;
use crate::common::ErrorCode::*;
use crate::common::{EquationError, ErrorCode};


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'input> {
    Assign,
    Eq,
    Neq,
    Not,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Xor,
    Plus,
    Minus,
    Mul,
    Div,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Ident(&'input str),
    Num(&'input str),
}

fn error<T>(code: ErrorCode, start: usize, end: usize) -> Result<T, EquationError> {
    Err(EquationError {
        start: start as u16,
        end: end as u16,
        code,
    })
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
        if n == 0 {
            return self.lookahead;
        }
        self.lookahead = self.chars.nth(n - 1);
        self.lookahead
    }

    fn take_while<F>(&mut self, mut keep_going: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        self.take_until(|c| !keep_going(c))
    }

    fn take_until<F>(&mut self, mut terminate: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        loop {
            match self.lookahead {
                None => {
                    return None;
                }
                Some((idx1, c)) => {
                    if terminate(c) {
                        return Some(idx1);
                    } else {
                        self.bump();
                    }
                }
            }
        }
    }

    fn identifier(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        match self.take_while(is_identifier_continue) {
            Some(end) => (idx0, Ident(&self.text[idx0..end]), end),
            None => (idx0, Ident(&self.text[idx0..]), self.text.len()),
        }
    }

    fn number(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, EquationError> {
        use regex::Regex;

        lazy_static! {
            static ref NUMBER_RE: Regex = Regex::new(r"^\d*(\.\d*)?([eE][-+]?\d+)?").unwrap();
        }

        let len = NUMBER_RE
            .find(&self.text[idx0..])
            .map(|m| m.end())
            .unwrap_or(0);
        let end = idx0 + len;
        let lit = &self.text[idx0..end];

        // a lone '.' matches the pattern but is not a number
        if !lit.chars().any(|c| c.is_ascii_digit()) {
            self.bump();
            return error(InvalidToken, idx0, idx0 + 1);
        }

        self.bump_n(lit.chars().count());

        Ok((idx0, Num(lit), end))
    }

    fn quoted_identifier(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, EquationError> {
        // eat the opening '"'
        self.bump();

        match self.take_until(|c| c == '"') {
            Some(idx1) => {
                // eat the trailing '"'
                self.bump();
                let name = &self.text[idx0 + 1..idx1];
                // postfix lines are whitespace separated, so names can't hold any
                if name.is_empty() {
                    return error(InvalidToken, idx0, idx1 + 1);
                }
                if let Some((i, c)) = name.char_indices().find(|(_, c)| c.is_whitespace()) {
                    let start = idx0 + 1 + i;
                    return error(InvalidToken, start, start + c.len_utf8());
                }
                Ok((idx0, Ident(name), idx1 + 1))
            }
            None => error(UnclosedQuotedIdent, idx0, self.text.len()),
        }
    }

    fn line_comment(&mut self) {
        self.take_until(|c| c == '\n');
    }

    fn block_comment(&mut self, idx0: usize) -> Result<(), EquationError> {
        let mut star = false;
        loop {
            match self.bump() {
                Some((_, '/')) if star => {
                    self.bump();
                    return Ok(());
                }
                Some((_, c)) => star = c == '*',
                None => return error(UnclosedComment, idx0, self.text.len()),
            }
        }
    }

    #[allow(clippy::unnecessary_wraps)]
    fn consume(
        &mut self,
        i: usize,
        tok: Token<'input>,
        len: usize,
    ) -> Option<Result<Spanned<Token<'input>>, EquationError>> {
        self.bump();
        Some(Ok((i, tok, i + len)))
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, EquationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.lookahead {
                Some((i, '/')) => {
                    match self.bump() {
                        Some((_, '/')) => {
                            self.line_comment();
                            continue;
                        }
                        Some((_, '*')) => match self.block_comment(i) {
                            Ok(()) => continue,
                            Err(err) => Some(Err(err)),
                        },
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Div, i + 1))),
                    }
                }
                Some((i, '=')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Eq, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Assign, i + 1))),
                    }
                }
                Some((i, '!')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Neq, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Not, i + 1))),
                    }
                }
                Some((i, '<')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Lte, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Lt, i + 1))),
                    }
                }
                Some((i, '>')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Gte, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Gt, i + 1))),
                    }
                }
                Some((i, '&')) => {
                    match self.bump() {
                        Some((_, '&')) => self.consume(i, And, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, And, i + 1))),
                    }
                }
                Some((i, '|')) => {
                    match self.bump() {
                        Some((_, '|')) => self.consume(i, Or, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Or, i + 1))),
                    }
                }
                Some((i, '^')) => self.consume(i, Xor, 1),
                Some((i, '-')) => self.consume(i, Minus, 1),
                Some((i, '+')) => self.consume(i, Plus, 1),
                Some((i, '*')) => self.consume(i, Mul, 1),
                Some((i, '(')) => self.consume(i, LParen, 1),
                Some((i, ')')) => self.consume(i, RParen, 1),
                Some((i, ',')) => self.consume(i, Comma, 1),
                Some((i, ';')) => self.consume(i, Semicolon, 1),
                Some((i, '"')) => Some(self.quoted_identifier(i)),
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
                    Some(error(UnrecognizedToken, i, end))
                }
                None => None,
            };
        }
    }
}

fn is_number_start(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn is_identifier_start(c: char) -> bool {
    UnicodeXID::is_xid_start(c) || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c) || c == '.'
}
