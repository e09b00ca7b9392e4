// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    Generic,
    // lexing and translation
    InvalidToken,
    UnrecognizedEof,
    UnrecognizedToken,
    ExtraToken,
    UnclosedComment,
    UnclosedQuotedIdent,
    EmptyEquation,
    // variables and type binding
    MissingName,
    UnknownVariable,
    DuplicateTypeBinding,
    BadType,
    ExternalMemoryTooSmall,
    // compilation
    BadInstruction,
    BadLiteral,
    UnknownOpcode,
    UnsupportedOperation,
    UnsupportedCast,
    MismatchedDimensions,
    IncompatibleWrite,
    UntypedVariable,
    IncompleteSequence,
    StackTooDeep,
    EmptyProgram,
    AllocationFailed,
    BadConfig,
    // execution
    StackOverflow,
    StackUnderflow,
    IntegerOverflow,
    DivideByZero,
    NotFinite,
    OutOfRange,
    MissingDebugSink,
    TraceWrite,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            Generic => "generic",
            InvalidToken => "invalid_token",
            UnrecognizedEof => "unrecognized_eof",
            UnrecognizedToken => "unrecognized_token",
            ExtraToken => "extra_token",
            UnclosedComment => "unclosed_comment",
            UnclosedQuotedIdent => "unclosed_quoted_ident",
            EmptyEquation => "empty_equation",
            MissingName => "missing_name",
            UnknownVariable => "unknown_variable",
            DuplicateTypeBinding => "duplicate_type_binding",
            BadType => "bad_type",
            ExternalMemoryTooSmall => "external_memory_too_small",
            BadInstruction => "bad_instruction",
            BadLiteral => "bad_literal",
            UnknownOpcode => "unknown_opcode",
            UnsupportedOperation => "unsupported_operation",
            UnsupportedCast => "unsupported_cast",
            MismatchedDimensions => "mismatched_dimensions",
            IncompatibleWrite => "incompatible_write",
            UntypedVariable => "untyped_variable",
            IncompleteSequence => "incomplete_sequence",
            StackTooDeep => "stack_too_deep",
            EmptyProgram => "empty_program",
            AllocationFailed => "allocation_failed",
            BadConfig => "bad_config",
            StackOverflow => "stack_overflow",
            StackUnderflow => "stack_underflow",
            IntegerOverflow => "integer_overflow",
            DivideByZero => "divide_by_zero",
            NotFinite => "not_finite",
            OutOfRange => "out_of_range",
            MissingDebugSink => "missing_debug_sink",
            TraceWrite => "trace_write",
        };

        write!(f, "{name}")
    }
}

/// A syntax error positioned in the infix source, as byte offsets.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EquationError {
    pub start: u16,
    pub end: u16,
    pub code: ErrorCode,
}

impl fmt::Display for EquationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

impl error::Error for EquationError {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Variable,
    Compile,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl From<EquationError> for Error {
    fn from(err: EquationError) -> Self {
        Error {
            kind: ErrorKind::Syntax,
            code: err.code,
            details: Some(format!("at {}..{}", err.start, err.end)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Variable => "VariableError",
            ErrorKind::Compile => "CompileError",
            ErrorKind::Runtime => "RuntimeError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;
pub type EquationResult<T> = result::Result<T, EquationError>;

#[macro_export]
macro_rules! eqn_err(
    ($code:tt, $start:expr, $end:expr) => {{
        use $crate::common::{EquationError, ErrorCode};
        Err(EquationError{ start: ($start) as u16, end: ($end) as u16, code: ErrorCode::$code})
    }}
);

#[macro_export]
macro_rules! var_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Variable, ErrorCode::$code, Some($str)))
    }};
}

#[macro_export]
macro_rules! compile_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Compile, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Compile, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! runtime_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Runtime, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Runtime, ErrorCode::$code, None))
    }};
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Compile,
        ErrorCode::UnknownOpcode,
        Some("MEAN".to_string()),
    );
    assert_eq!("CompileError{unknown_opcode: MEAN}", format!("{err}"));

    let err = Error::new(ErrorKind::Runtime, ErrorCode::MissingDebugSink, None);
    assert_eq!("RuntimeError{missing_debug_sink}", format!("{err}"));
}

#[test]
fn test_equation_error_into_error() {
    let eqn = EquationError {
        start: 3,
        end: 5,
        code: ErrorCode::UnrecognizedToken,
    };
    assert_eq!("3:5:unrecognized_token", format!("{eqn}"));

    let err: Error = eqn.into();
    assert_eq!(ErrorKind::Syntax, err.kind);
    assert_eq!(ErrorCode::UnrecognizedToken, err.code);
    assert_eq!(Some("at 3..5".to_string()), err.get_details());
}
