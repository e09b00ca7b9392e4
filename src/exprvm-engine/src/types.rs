// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The type registry: scalar kinds, matrix types and the conversions
//! allowed between them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{Error, ErrorCode, ErrorKind};

/// Extra cost charged for implicit conversions that can lose precision,
/// so they are only picked when nothing exact is reachable.
const LOSSY_PENALTY: u32 = 100;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScalarKind {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ScalarKind {
    /// Every kind, in registration order: narrow before wide, integers
    /// before floats.
    pub const ALL: [ScalarKind; 11] = [
        ScalarKind::Bool,
        ScalarKind::U8,
        ScalarKind::I8,
        ScalarKind::U16,
        ScalarKind::I16,
        ScalarKind::U32,
        ScalarKind::I32,
        ScalarKind::U64,
        ScalarKind::I64,
        ScalarKind::F32,
        ScalarKind::F64,
    ];

    pub fn name(self) -> &'static str {
        use ScalarKind::*;
        match self {
            Bool => "bool",
            U8 => "uint8",
            I8 => "int8",
            U16 => "uint16",
            I16 => "int16",
            U32 => "uint32",
            I32 => "int32",
            U64 => "uint64",
            I64 => "int64",
            F32 => "float32",
            F64 => "float64",
        }
    }

    pub fn from_name(name: &str) -> Option<ScalarKind> {
        use ScalarKind::*;
        let kind = match name {
            "bool" | "boolean" => Bool,
            "uint8" | "char" => U8,
            "int8" => I8,
            "uint16" => U16,
            "int16" => I16,
            "uint32" => U32,
            "int32" => I32,
            "uint64" => U64,
            "int64" => I64,
            "float32" | "float" => F32,
            "float64" | "double" => F64,
            _ => return None,
        };
        Some(kind)
    }

    /// Storage size in bytes.
    pub fn size(self) -> usize {
        use ScalarKind::*;
        match self {
            Bool | U8 | I8 => 1,
            U16 | I16 => 2,
            U32 | I32 | F32 => 4,
            U64 | I64 | F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }

    pub fn is_signed(self) -> bool {
        use ScalarKind::*;
        matches!(self, I8 | I16 | I32 | I64 | F32 | F64)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float() && self != ScalarKind::Bool
    }

    pub fn is_numeric(self) -> bool {
        self != ScalarKind::Bool
    }

    /// Bits of magnitude an integer kind carries (or a float kind can
    /// represent exactly, for its mantissa).
    fn precision(self) -> u32 {
        use ScalarKind::*;
        match self {
            Bool => 1,
            U8 => 8,
            I8 => 7,
            U16 => 16,
            I16 => 15,
            U32 => 32,
            I32 => 31,
            U64 => 64,
            I64 => 63,
            F32 => 24,
            F64 => 53,
        }
    }

    /// Whether every value of `self` is representable in `to`. The
    /// implicit conversions the compiler may insert are exactly these,
    /// plus the lossy 64-bit integer to float64 edge.
    pub fn widens_to(self, to: ScalarKind) -> bool {
        use ScalarKind::*;
        if self == to {
            return true;
        }
        match (self, to) {
            (Bool, _) => true,
            (_, Bool) => false,
            (F32, F64) => true,
            (F32 | F64, _) => false,
            (_, F32 | F64) => self.precision() <= to.precision(),
            _ => {
                // integer to integer: unsigned sources fit wider signed
                // targets too, signed sources only fit signed targets
                (to.is_signed() || !self.is_signed()) && self.precision() <= to.precision()
            }
        }
    }

    /// The cost of implicitly converting `self` to `to`, or `None` when
    /// the compiler may not insert that conversion.
    pub fn widening_cost(self, to: ScalarKind) -> Option<u32> {
        if self == to {
            return Some(0);
        }
        let base = 2 * to.size() as u32 + to.is_float() as u32;
        if self.widens_to(to) {
            Some(base)
        } else if matches!(self, ScalarKind::I64 | ScalarKind::U64) && to == ScalarKind::F64 {
            Some(base + LOSSY_PENALTY)
        } else {
            None
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ScalarKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScalarKind::from_name(s).ok_or_else(|| {
            Error::new(
                ErrorKind::Variable,
                ErrorCode::BadType,
                Some(format!("unknown type name '{s}'")),
            )
        })
    }
}

impl TryFrom<String> for ScalarKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ScalarKind> for String {
    fn from(kind: ScalarKind) -> Self {
        kind.name().to_owned()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Type {
    Void,
    Scalar(ScalarKind),
    Matrix {
        kind: ScalarKind,
        rows: u32,
        cols: u32,
    },
}

impl Type {
    pub fn matrix(kind: ScalarKind, rows: u32, cols: u32) -> Type {
        Type::Matrix { kind, rows, cols }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self, Type::Matrix { .. })
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Type::Void => None,
            Type::Scalar(kind) | Type::Matrix { kind, .. } => Some(*kind),
        }
    }

    /// (rows, cols); scalars are 1x1.
    pub fn dims(&self) -> (u32, u32) {
        match self {
            Type::Matrix { rows, cols, .. } => (*rows, *cols),
            _ => (1, 1),
        }
    }

    /// Number of scalar elements.
    pub fn len(&self) -> usize {
        match self {
            Type::Void => 0,
            Type::Scalar(_) => 1,
            Type::Matrix { rows, cols, .. } => *rows as usize * *cols as usize,
        }
    }

    /// Storage size in bytes.
    pub fn size(&self) -> usize {
        self.scalar_kind().map(|k| k.size()).unwrap_or(0) * self.len()
    }

    /// A type is legal for a variable when it is a scalar, or a matrix
    /// with both dimensions non-zero.
    pub fn is_valid(&self) -> bool {
        match self {
            Type::Void => false,
            Type::Scalar(_) => true,
            Type::Matrix { rows, cols, .. } => *rows > 0 && *cols > 0,
        }
    }

    /// Whether an explicit `CAST` from `self` to `to` is registered.
    pub fn converts_to(&self, to: &Type) -> bool {
        match (self, to) {
            (Type::Scalar(_), Type::Scalar(_)) => true,
            (Type::Matrix { .. }, Type::Matrix { .. }) => self == to,
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Scalar(kind) => write!(f, "{kind}"),
            Type::Matrix { kind, rows, cols } => write!(f, "{kind}[{rows}][{cols}]"),
        }
    }
}

impl FromStr for Type {
    type Err = Error;

    /// Parses `float64`, `int8`, ... and `float64[3][2]` style matrix types.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad_type = || {
            Error::new(
                ErrorKind::Variable,
                ErrorCode::BadType,
                Some(format!("unknown type '{s}'")),
            )
        };
        let s = s.trim();
        if s == "void" {
            return Ok(Type::Void);
        }
        let Some(open) = s.find('[') else {
            return Ok(Type::Scalar(s.parse()?));
        };

        let kind: ScalarKind = s[..open].parse()?;
        let mut dims = Vec::with_capacity(2);
        for part in s[open..].split_terminator(']') {
            let n = part
                .strip_prefix('[')
                .and_then(|n| n.trim().parse::<u32>().ok())
                .ok_or_else(bad_type)?;
            dims.push(n);
        }
        if !s.ends_with(']') {
            return Err(bad_type());
        }
        let ty = match dims.as_slice() {
            [n] => Type::matrix(kind, 1, *n),
            [rows, cols] => Type::matrix(kind, *rows, *cols),
            _ => return Err(bad_type()),
        };
        if !ty.is_valid() {
            return Err(bad_type());
        }
        Ok(ty)
    }
}

impl TryFrom<String> for Type {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Type> for String {
    fn from(ty: Type) -> Self {
        ty.to_string()
    }
}

impl From<ScalarKind> for Type {
    fn from(kind: ScalarKind) -> Self {
        Type::Scalar(kind)
    }
}
