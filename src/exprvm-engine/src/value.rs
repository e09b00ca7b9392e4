// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

use crate::types::ScalarKind;

/// A single scalar of one of the supported kinds. Values cross the API
/// boundary in this form; inside the VM they live as raw 64-bit words or
/// little-endian bytes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
}

/// Applies `$body` to the payload of any variant, binding it as `$x`.
macro_rules! with_value {
    ($v:expr, |$x:ident| $body:expr) => {
        match $v {
            Value::Bool($x) => $body,
            Value::U8($x) => $body,
            Value::I8($x) => $body,
            Value::U16($x) => $body,
            Value::I16($x) => $body,
            Value::U32($x) => $body,
            Value::I32($x) => $body,
            Value::U64($x) => $body,
            Value::I64($x) => $body,
            Value::F32($x) => $body,
            Value::F64($x) => $body,
        }
    };
}

impl Value {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Value::Bool(_) => ScalarKind::Bool,
            Value::U8(_) => ScalarKind::U8,
            Value::I8(_) => ScalarKind::I8,
            Value::U16(_) => ScalarKind::U16,
            Value::I16(_) => ScalarKind::I16,
            Value::U32(_) => ScalarKind::U32,
            Value::I32(_) => ScalarKind::I32,
            Value::U64(_) => ScalarKind::U64,
            Value::I64(_) => ScalarKind::I64,
            Value::F32(_) => ScalarKind::F32,
            Value::F64(_) => ScalarKind::F64,
        }
    }

    pub fn zero(kind: ScalarKind) -> Value {
        Value::from_word(kind, 0)
    }

    /// The value as a stack word. Signed integers are sign extended,
    /// floats keep their bit pattern.
    pub fn to_word(self) -> u64 {
        match self {
            Value::Bool(x) => x as u64,
            Value::U8(x) => x as u64,
            Value::I8(x) => x as u64,
            Value::U16(x) => x as u64,
            Value::I16(x) => x as u64,
            Value::U32(x) => x as u64,
            Value::I32(x) => x as u64,
            Value::U64(x) => x,
            Value::I64(x) => x as u64,
            Value::F32(x) => x.to_bits() as u64,
            Value::F64(x) => x.to_bits(),
        }
    }

    pub fn from_word(kind: ScalarKind, w: u64) -> Value {
        match kind {
            ScalarKind::Bool => Value::Bool(w != 0),
            ScalarKind::U8 => Value::U8(w as u8),
            ScalarKind::I8 => Value::I8(w as i8),
            ScalarKind::U16 => Value::U16(w as u16),
            ScalarKind::I16 => Value::I16(w as i16),
            ScalarKind::U32 => Value::U32(w as u32),
            ScalarKind::I32 => Value::I32(w as i32),
            ScalarKind::U64 => Value::U64(w),
            ScalarKind::I64 => Value::I64(w as i64),
            ScalarKind::F32 => Value::F32(f32::from_bits(w as u32)),
            ScalarKind::F64 => Value::F64(f64::from_bits(w)),
        }
    }

    /// Writes the little-endian representation into the first
    /// `kind().size()` bytes of `buf`.
    pub fn store(self, buf: &mut [u8]) {
        match self {
            Value::Bool(x) => buf[0] = x as u8,
            Value::U8(x) => buf[0] = x,
            Value::I8(x) => buf[..1].copy_from_slice(&x.to_le_bytes()),
            Value::U16(x) => buf[..2].copy_from_slice(&x.to_le_bytes()),
            Value::I16(x) => buf[..2].copy_from_slice(&x.to_le_bytes()),
            Value::U32(x) => buf[..4].copy_from_slice(&x.to_le_bytes()),
            Value::I32(x) => buf[..4].copy_from_slice(&x.to_le_bytes()),
            Value::U64(x) => buf[..8].copy_from_slice(&x.to_le_bytes()),
            Value::I64(x) => buf[..8].copy_from_slice(&x.to_le_bytes()),
            Value::F32(x) => buf[..4].copy_from_slice(&x.to_le_bytes()),
            Value::F64(x) => buf[..8].copy_from_slice(&x.to_le_bytes()),
        }
    }

    pub fn load(kind: ScalarKind, buf: &[u8]) -> Value {
        let mut word = [0u8; 8];
        let size = kind.size();
        word[..size].copy_from_slice(&buf[..size]);
        Value::from_word(kind, u64::from_le_bytes(word))
    }

    /// Parses a literal as written in postfix text into `kind`. Integer
    /// kinds accept integral float syntax ("2.0", "1e3") when the value
    /// is exactly representable.
    pub fn parse(kind: ScalarKind, text: &str) -> Option<Value> {
        let text = text.trim();
        match kind {
            ScalarKind::F32 => return text.parse().ok().map(Value::F32),
            ScalarKind::F64 => return text.parse().ok().map(Value::F64),
            ScalarKind::Bool => {
                let v: f64 = match text {
                    "true" => 1.0,
                    "false" => 0.0,
                    _ => text.parse().ok()?,
                };
                return Some(Value::Bool(v != 0.0));
            }
            _ => {}
        }

        let n: i128 = match text.parse::<i128>() {
            Ok(n) => n,
            Err(_) => {
                let v: f64 = text.parse().ok()?;
                if !v.is_finite() || v.fract() != 0.0 {
                    return None;
                }
                v as i128
            }
        };
        Value::from_i128(kind, n)
    }

    /// The integral payload, for integer and boolean kinds.
    pub fn to_i128(self) -> Option<i128> {
        match self {
            Value::Bool(x) => Some(x as i128),
            Value::U8(x) => Some(x as i128),
            Value::I8(x) => Some(x as i128),
            Value::U16(x) => Some(x as i128),
            Value::I16(x) => Some(x as i128),
            Value::U32(x) => Some(x as i128),
            Value::I32(x) => Some(x as i128),
            Value::U64(x) => Some(x as i128),
            Value::I64(x) => Some(x as i128),
            Value::F32(_) | Value::F64(_) => None,
        }
    }

    /// Builds an integer or boolean value, or `None` when `n` does not
    /// fit `kind`.
    pub fn from_i128(kind: ScalarKind, n: i128) -> Option<Value> {
        let v = match kind {
            ScalarKind::Bool => Value::Bool(n != 0),
            ScalarKind::U8 => Value::U8(u8::try_from(n).ok()?),
            ScalarKind::I8 => Value::I8(i8::try_from(n).ok()?),
            ScalarKind::U16 => Value::U16(u16::try_from(n).ok()?),
            ScalarKind::I16 => Value::I16(i16::try_from(n).ok()?),
            ScalarKind::U32 => Value::U32(u32::try_from(n).ok()?),
            ScalarKind::I32 => Value::I32(i32::try_from(n).ok()?),
            ScalarKind::U64 => Value::U64(u64::try_from(n).ok()?),
            ScalarKind::I64 => Value::I64(i64::try_from(n).ok()?),
            ScalarKind::F32 => Value::F32(n as f32),
            ScalarKind::F64 => Value::F64(n as f64),
        };
        Some(v)
    }

    pub fn as_f64(self) -> f64 {
        with_value!(self, |x| x.as_f64())
    }

    pub fn is_truthy(self) -> bool {
        match self {
            Value::F32(x) => x != 0.0,
            Value::F64(x) => x != 0.0,
            other => other.to_word() != 0,
        }
    }
}

trait AsF64 {
    fn as_f64(self) -> f64;
}

macro_rules! impl_as_f64 {
    ($($t:ty),*) => {
        $(impl AsF64 for $t {
            fn as_f64(self) -> f64 {
                self as f64
            }
        })*
    };
}

impl_as_f64!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl AsF64 for bool {
    fn as_f64(self) -> f64 {
        self as u8 as f64
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(x) => write!(f, "{}", *x as u8),
            _ => with_value!(self, |x| write!(f, "{x}")),
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::F64(x)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Value::F32(x)
    }
}

impl From<i8> for Value {
    fn from(x: i8) -> Self {
        Value::I8(x)
    }
}

impl From<i32> for Value {
    fn from(x: i32) -> Self {
        Value::I32(x)
    }
}

impl From<u8> for Value {
    fn from(x: u8) -> Self {
        Value::U8(x)
    }
}

impl From<bool> for Value {
    fn from(x: bool) -> Self {
        Value::Bool(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_roundtrip_sign() {
        let v = Value::I8(-5);
        assert_eq!(v, Value::from_word(ScalarKind::I8, v.to_word()));
        assert_eq!(u64::MAX - 4, v.to_word());
        let v = Value::F32(-1.5);
        assert_eq!(v, Value::from_word(ScalarKind::F32, v.to_word()));
    }

    #[test]
    fn test_store_load_bytes() {
        let mut buf = [0u8; 8];
        Value::I16(-300).store(&mut buf);
        assert_eq!(Value::I16(-300), Value::load(ScalarKind::I16, &buf));
        // only two bytes were touched
        assert_eq!(&[0u8; 6], &buf[2..]);

        Value::F64(6.674e-11).store(&mut buf);
        assert_eq!(Value::F64(6.674e-11), Value::load(ScalarKind::F64, &buf));
    }

    #[test]
    fn test_parse() {
        assert_eq!(Some(Value::F64(2.0)), Value::parse(ScalarKind::F64, "2"));
        assert_eq!(Some(Value::F32(0.99)), Value::parse(ScalarKind::F32, "0.99"));
        assert_eq!(Some(Value::I8(31)), Value::parse(ScalarKind::I8, "31"));
        assert_eq!(Some(Value::I32(1000)), Value::parse(ScalarKind::I32, "1e3"));
        assert_eq!(Some(Value::U8(2)), Value::parse(ScalarKind::U8, "2.0"));
        assert_eq!(None, Value::parse(ScalarKind::I8, "300"));
        assert_eq!(None, Value::parse(ScalarKind::U8, "-1"));
        assert_eq!(None, Value::parse(ScalarKind::I32, "0.5"));
        assert_eq!(None, Value::parse(ScalarKind::F64, "abc"));
        assert_eq!(Some(Value::Bool(true)), Value::parse(ScalarKind::Bool, "1"));
        assert_eq!(Some(Value::Bool(false)), Value::parse(ScalarKind::Bool, "false"));
    }

    #[test]
    fn test_display() {
        assert_eq!("31", Value::I8(31).to_string());
        assert_eq!("1", Value::Bool(true).to_string());
        assert_eq!("0.5", Value::F64(0.5).to_string());
    }

    #[test]
    fn test_as_f64_and_truthy() {
        assert_eq!(-3.0, Value::I16(-3).as_f64());
        assert_eq!(1.0, Value::Bool(true).as_f64());
        assert!(Value::F64(0.1).is_truthy());
        assert!(!Value::F32(0.0).is_truthy());
        assert!(Value::I8(-1).is_truthy());
        assert!(!Value::U64(0).is_truthy());
    }
}
