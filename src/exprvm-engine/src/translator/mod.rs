// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written recursive descent translator from infix assignments to
//! postfix stack-machine text.
//!
//! The parser recognizes the grammar and fires semantic [`Action`]s at
//! fixed points; the actions own all of the output, using a stack of
//! pending operators and a stack of pending typecast targets.

use tracing::debug;

use crate::common::{EquationError, EquationResult, ErrorCode};
use crate::eqn_err;
use crate::token::{Lexer, Spanned, Token};

#[cfg(test)]
mod tests;

/// TokenKind discriminant for peek comparisons without payload matching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
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
    Ident,
    Num,
}

impl<'a> From<&Token<'a>> for TokenKind {
    fn from(token: &Token<'a>) -> Self {
        match token {
            Token::Assign => TokenKind::Assign,
            Token::Eq => TokenKind::Eq,
            Token::Neq => TokenKind::Neq,
            Token::Not => TokenKind::Not,
            Token::Lt => TokenKind::Lt,
            Token::Lte => TokenKind::Lte,
            Token::Gt => TokenKind::Gt,
            Token::Gte => TokenKind::Gte,
            Token::And => TokenKind::And,
            Token::Or => TokenKind::Or,
            Token::Xor => TokenKind::Xor,
            Token::Plus => TokenKind::Plus,
            Token::Minus => TokenKind::Minus,
            Token::Mul => TokenKind::Mul,
            Token::Div => TokenKind::Div,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
            Token::Comma => TokenKind::Comma,
            Token::Semicolon => TokenKind::Semicolon,
            Token::Ident(_) => TokenKind::Ident,
            Token::Num(_) => TokenKind::Num,
        }
    }
}

impl TokenKind {
    /// Whether a token of this kind can begin a `call` production.
    fn starts_operand(self) -> bool {
        matches!(self, TokenKind::Ident | TokenKind::Num | TokenKind::LParen)
    }
}

/// A pending operator: a binary operator, a prefix sign, or the name of
/// a function whose arguments are still being translated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PendingOp<'input> {
    Binary(&'static str),
    Prefix(TokenKind),
    Function(&'input str),
}

/// Semantic actions fired by the parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action<'input> {
    StoreAssignment(&'input str),
    PopAssignment,
    PushOperator(PendingOp<'input>),
    PopOperator,
    PopOperatorAlternate,
    PushTypecast(&'input str),
    PopTypecast,
    AddOperand(Token<'input>),
    AddOperandTypecast(&'input str),
}

#[derive(Debug, Default)]
struct Emitter<'input> {
    output: String,
    operators: Vec<PendingOp<'input>>,
    typecasts: Vec<&'input str>,
    target: Option<&'input str>,
}

impl<'input> Emitter<'input> {
    fn line(&mut self, parts: &[&str]) {
        self.output.push_str(&parts.join(" "));
        self.output.push('\n');
    }

    fn execute(&mut self, action: Action<'input>) {
        match action {
            Action::StoreAssignment(name) => self.target = Some(name),
            Action::PopAssignment => {
                if let Some(name) = self.target.take() {
                    self.line(&["WRITE", name]);
                }
            }
            Action::PushOperator(op) => self.operators.push(op),
            Action::PopOperator => match self.operators.pop() {
                Some(PendingOp::Binary(name)) => self.line(&[name]),
                Some(PendingOp::Function(name)) => {
                    let name = name.to_uppercase();
                    self.line(&[name.as_str()]);
                }
                Some(PendingOp::Prefix(_)) | None => {}
            },
            Action::PopOperatorAlternate => match self.operators.pop() {
                Some(PendingOp::Prefix(TokenKind::Minus)) => self.line(&["NEG"]),
                Some(PendingOp::Prefix(TokenKind::Not)) => self.line(&["NOT"]),
                // a prefix plus is the identity
                _ => {}
            },
            Action::PushTypecast(ty) => self.typecasts.push(ty),
            Action::PopTypecast => {
                if let Some(ty) = self.typecasts.pop() {
                    self.line(&["CAST", ty]);
                }
            }
            Action::AddOperand(Token::Ident(name)) => self.line(&["READ", name]),
            Action::AddOperand(Token::Num(lit)) => self.line(&["CONST", lit]),
            Action::AddOperand(_) => {}
            Action::AddOperandTypecast(lit) => {
                if let Some(ty) = self.typecasts.pop() {
                    self.line(&["CONST", ty, lit]);
                }
            }
        }
    }
}

struct Parser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
    emitter: Emitter<'input>,
}

impl<'input> Parser<'input> {
    fn new(lexer: Lexer<'input>) -> EquationResult<Self> {
        let tokens = lexer.collect::<EquationResult<Vec<_>>>()?;
        Ok(Parser {
            tokens,
            pos: 0,
            emitter: Emitter::default(),
        })
    }

    fn peek(&self) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek_kind_at(0)
    }

    fn peek_kind_at(&self, ahead: usize) -> Option<TokenKind> {
        self.tokens
            .get(self.pos + ahead)
            .map(|(_, tok, _)| TokenKind::from(tok))
    }

    fn advance(&mut self) -> Option<Spanned<Token<'input>>> {
        let tok = self.tokens.get(self.pos).copied();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn unexpected(&self) -> EquationError {
        match self.peek() {
            Some((start, _, end)) => EquationError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::UnrecognizedToken,
            },
            None => {
                let pos = self.eof_position();
                EquationError {
                    start: pos as u16,
                    end: (pos + 1) as u16,
                    code: ErrorCode::UnrecognizedEof,
                }
            }
        }
    }

    fn expect(&mut self, expected: TokenKind) -> EquationResult<Spanned<Token<'input>>> {
        if self.peek_kind() == Some(expected) {
            self.advance().ok_or_else(|| self.unexpected())
        } else {
            Err(self.unexpected())
        }
    }

    fn eof_position(&self) -> usize {
        self.tokens.last().map(|(_, _, end)| *end).unwrap_or(0)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn act(&mut self, action: Action<'input>) {
        self.emitter.execute(action);
    }

    /// program := assign+
    fn parse_program(&mut self) -> EquationResult<()> {
        if self.is_at_end() {
            return eqn_err!(EmptyEquation, 0, 0);
        }
        while !self.is_at_end() {
            self.parse_assign()?;
        }
        Ok(())
    }

    /// assign := IDENT '=' logical (';' | ',')
    fn parse_assign(&mut self) -> EquationResult<()> {
        let (_, target, _) = self.expect(TokenKind::Ident)?;
        if let Token::Ident(name) = target {
            self.act(Action::StoreAssignment(name));
        }
        self.expect(TokenKind::Assign)?;
        self.parse_logical()?;
        match self.peek_kind() {
            Some(TokenKind::Semicolon | TokenKind::Comma) => {
                self.advance();
            }
            // a complete expression followed by something that cannot extend it
            Some(_) => {
                let err = self.unexpected();
                return eqn_err!(ExtraToken, err.start, err.end);
            }
            None => return Err(self.unexpected()),
        }
        self.act(Action::PopAssignment);
        Ok(())
    }

    /// Parses `next (op next)*` left-associatively, where `op_name` maps
    /// the operators of this precedence level to their opcode names.
    fn parse_binary(
        &mut self,
        next: fn(&mut Self) -> EquationResult<()>,
        op_name: fn(TokenKind) -> Option<&'static str>,
    ) -> EquationResult<()> {
        next(self)?;
        while let Some(name) = self.peek_kind().and_then(op_name) {
            self.advance();
            self.act(Action::PushOperator(PendingOp::Binary(name)));
            next(self)?;
            self.act(Action::PopOperator);
        }
        Ok(())
    }

    fn parse_logical(&mut self) -> EquationResult<()> {
        self.parse_binary(Self::parse_compare, |kind| match kind {
            TokenKind::And => Some("AND"),
            TokenKind::Or => Some("OR"),
            TokenKind::Xor => Some("XOR"),
            _ => None,
        })
    }

    fn parse_compare(&mut self) -> EquationResult<()> {
        self.parse_binary(Self::parse_additive, |kind| match kind {
            TokenKind::Gt => Some("GT"),
            TokenKind::Lt => Some("LT"),
            TokenKind::Gte => Some("GTE"),
            TokenKind::Lte => Some("LTE"),
            TokenKind::Eq => Some("EQ"),
            TokenKind::Neq => Some("NEQ"),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> EquationResult<()> {
        self.parse_binary(Self::parse_mult, |kind| match kind {
            TokenKind::Plus => Some("SUM"),
            TokenKind::Minus => Some("SUB"),
            _ => None,
        })
    }

    fn parse_mult(&mut self) -> EquationResult<()> {
        self.parse_binary(Self::parse_unary, |kind| match kind {
            TokenKind::Mul => Some("MUL"),
            TokenKind::Div => Some("DIV"),
            _ => None,
        })
    }

    /// unary := ('+' | '-' | '!') cast | cast
    fn parse_unary(&mut self) -> EquationResult<()> {
        match self.peek_kind() {
            Some(kind @ (TokenKind::Plus | TokenKind::Minus | TokenKind::Not)) => {
                self.advance();
                self.act(Action::PushOperator(PendingOp::Prefix(kind)));
                self.parse_cast()?;
                self.act(Action::PopOperatorAlternate);
                Ok(())
            }
            _ => self.parse_cast(),
        }
    }

    /// True when the next tokens are `( IDENT )` followed by something
    /// that can start an operand.
    fn at_typecast(&self) -> bool {
        self.peek_kind() == Some(TokenKind::LParen)
            && self.peek_kind_at(1) == Some(TokenKind::Ident)
            && self.peek_kind_at(2) == Some(TokenKind::RParen)
            && self
                .peek_kind_at(3)
                .is_some_and(|kind| kind.starts_operand())
    }

    /// cast := '(' IDENT ')' NUMBER | '(' IDENT ')' call | NUMBER | call
    fn parse_cast(&mut self) -> EquationResult<()> {
        if self.at_typecast() {
            self.advance();
            if let Some((_, Token::Ident(ty), _)) = self.advance() {
                self.act(Action::PushTypecast(ty));
            }
            self.advance();
            if let Some((_, Token::Num(lit), _)) = self.peek().copied() {
                self.advance();
                self.act(Action::AddOperandTypecast(lit));
            } else {
                self.parse_call()?;
                self.act(Action::PopTypecast);
            }
            return Ok(());
        }

        if let Some((_, tok @ Token::Num(_), _)) = self.peek().copied() {
            self.advance();
            self.act(Action::AddOperand(tok));
            return Ok(());
        }
        self.parse_call()
    }

    /// call := IDENT '(' logical (',' logical)* ')' | '(' logical ')' | IDENT
    fn parse_call(&mut self) -> EquationResult<()> {
        match self.peek_kind() {
            Some(TokenKind::Ident) => {
                let Some((_, tok, _)) = self.advance() else {
                    return Err(self.unexpected());
                };
                if self.peek_kind() != Some(TokenKind::LParen) {
                    self.act(Action::AddOperand(tok));
                    return Ok(());
                }
                if let Token::Ident(name) = tok {
                    self.act(Action::PushOperator(PendingOp::Function(name)));
                }
                self.advance();
                self.parse_logical()?;
                while self.peek_kind() == Some(TokenKind::Comma) {
                    self.advance();
                    self.parse_logical()?;
                }
                self.expect(TokenKind::RParen)?;
                self.act(Action::PopOperator);
                Ok(())
            }
            Some(TokenKind::LParen) => {
                self.advance();
                self.parse_logical()?;
                self.expect(TokenKind::RParen)?;
                Ok(())
            }
            _ => Err(self.unexpected()),
        }
    }
}

/// Translates one or more infix assignments into postfix text, one
/// instruction per line. No output is produced for invalid input.
pub fn translate(infix: &str) -> EquationResult<String> {
    let mut parser = Parser::new(Lexer::new(infix))?;
    parser.parse_program()?;
    let output = parser.emitter.output;
    debug!(lines = output.lines().count(), "translated expression");
    Ok(output)
}
