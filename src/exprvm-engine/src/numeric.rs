// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Numeric kernels shared by every execution mode. `checked` selects
//! between the safe semantics (report a fault) and the fast semantics
//! (wrap, saturate, or produce zero).

use std::fmt;

use crate::bytecode::{ArithOp, CmpOp, LogicOp, Op1};
use crate::common::ErrorCode;
use crate::types::ScalarKind;
use crate::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Fault {
    StackOverflow,
    StackUnderflow,
    IntegerOverflow,
    DivideByZero,
    NotFinite,
    OutOfRange,
    /// an operand kind the kernel has no implementation for
    BadOperand,
}

impl Fault {
    pub(crate) fn code(self) -> ErrorCode {
        match self {
            Fault::StackOverflow => ErrorCode::StackOverflow,
            Fault::StackUnderflow => ErrorCode::StackUnderflow,
            Fault::IntegerOverflow => ErrorCode::IntegerOverflow,
            Fault::DivideByZero => ErrorCode::DivideByZero,
            Fault::NotFinite => ErrorCode::NotFinite,
            Fault::OutOfRange => ErrorCode::OutOfRange,
            Fault::BadOperand => ErrorCode::UnsupportedOperation,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

type FaultResult<T> = Result<T, Fault>;

macro_rules! int_arith {
    ($op:expr, $a:expr, $b:expr, $checked:expr) => {{
        let (a, b) = ($a, $b);
        if $checked {
            let r = match $op {
                ArithOp::Sum => a.checked_add(b),
                ArithOp::Sub => a.checked_sub(b),
                ArithOp::Mul => a.checked_mul(b),
                ArithOp::Div if b == 0 => return Err(Fault::DivideByZero),
                ArithOp::Div => a.checked_div(b),
                ArithOp::Pow => match u32::try_from(b) {
                    Ok(e) => a.checked_pow(e),
                    Err(_) => return Err(Fault::OutOfRange),
                },
                ArithOp::Min => Some(a.min(b)),
                ArithOp::Max => Some(a.max(b)),
            };
            r.ok_or(Fault::IntegerOverflow)?
        } else {
            match $op {
                ArithOp::Sum => a.wrapping_add(b),
                ArithOp::Sub => a.wrapping_sub(b),
                ArithOp::Mul => a.wrapping_mul(b),
                ArithOp::Div if b == 0 => 0,
                ArithOp::Div => a.wrapping_div(b),
                ArithOp::Pow => match u32::try_from(b) {
                    Ok(e) => a.wrapping_pow(e),
                    Err(_) => 0,
                },
                ArithOp::Min => a.min(b),
                ArithOp::Max => a.max(b),
            }
        }
    }};
}

macro_rules! float_arith {
    ($op:expr, $a:expr, $b:expr, $checked:expr) => {{
        let (a, b) = ($a, $b);
        if $checked && $op == ArithOp::Div && b == 0.0 {
            return Err(Fault::DivideByZero);
        }
        let r = match $op {
            ArithOp::Sum => a + b,
            ArithOp::Sub => a - b,
            ArithOp::Mul => a * b,
            ArithOp::Div => a / b,
            ArithOp::Pow => a.powf(b),
            ArithOp::Min => a.min(b),
            ArithOp::Max => a.max(b),
        };
        if $checked && !r.is_finite() {
            return Err(Fault::NotFinite);
        }
        r
    }};
}

pub(crate) fn arith(op: ArithOp, l: Value, r: Value, checked: bool) -> FaultResult<Value> {
    use Value::*;
    let v = match (l, r) {
        (U8(a), U8(b)) => U8(int_arith!(op, a, b, checked)),
        (I8(a), I8(b)) => I8(int_arith!(op, a, b, checked)),
        (U16(a), U16(b)) => U16(int_arith!(op, a, b, checked)),
        (I16(a), I16(b)) => I16(int_arith!(op, a, b, checked)),
        (U32(a), U32(b)) => U32(int_arith!(op, a, b, checked)),
        (I32(a), I32(b)) => I32(int_arith!(op, a, b, checked)),
        (U64(a), U64(b)) => U64(int_arith!(op, a, b, checked)),
        (I64(a), I64(b)) => I64(int_arith!(op, a, b, checked)),
        (F32(a), F32(b)) => F32(float_arith!(op, a, b, checked)),
        (F64(a), F64(b)) => F64(float_arith!(op, a, b, checked)),
        _ => return Err(Fault::BadOperand),
    };
    Ok(v)
}

macro_rules! compare {
    ($op:expr, $a:expr, $b:expr) => {{
        let (a, b) = ($a, $b);
        match $op {
            CmpOp::Eq => a == b,
            CmpOp::Neq => a != b,
            CmpOp::Gt => a > b,
            CmpOp::Lt => a < b,
            CmpOp::Gte => a >= b,
            CmpOp::Lte => a <= b,
        }
    }};
}

pub(crate) fn compare(op: CmpOp, l: Value, r: Value) -> FaultResult<Value> {
    use Value::*;
    let result = match (l, r) {
        (Bool(a), Bool(b)) => compare!(op, a, b),
        (U8(a), U8(b)) => compare!(op, a, b),
        (I8(a), I8(b)) => compare!(op, a, b),
        (U16(a), U16(b)) => compare!(op, a, b),
        (I16(a), I16(b)) => compare!(op, a, b),
        (U32(a), U32(b)) => compare!(op, a, b),
        (I32(a), I32(b)) => compare!(op, a, b),
        (U64(a), U64(b)) => compare!(op, a, b),
        (I64(a), I64(b)) => compare!(op, a, b),
        (F32(a), F32(b)) => compare!(op, a, b),
        (F64(a), F64(b)) => compare!(op, a, b),
        _ => return Err(Fault::BadOperand),
    };
    Ok(Bool(result))
}

pub(crate) fn logic(op: LogicOp, l: Value, r: Value) -> Value {
    let (a, b) = (l.is_truthy(), r.is_truthy());
    Value::Bool(match op {
        LogicOp::And => a && b,
        LogicOp::Or => a || b,
        LogicOp::Xor => a ^ b,
    })
}

macro_rules! signed_unary {
    ($v:expr, $checked:expr, $checked_fn:ident, $wrapping_fn:ident, $float_fn:expr) => {{
        use Value::*;
        let v = match $v {
            I8(a) if $checked => I8(a.$checked_fn().ok_or(Fault::IntegerOverflow)?),
            I16(a) if $checked => I16(a.$checked_fn().ok_or(Fault::IntegerOverflow)?),
            I32(a) if $checked => I32(a.$checked_fn().ok_or(Fault::IntegerOverflow)?),
            I64(a) if $checked => I64(a.$checked_fn().ok_or(Fault::IntegerOverflow)?),
            I8(a) => I8(a.$wrapping_fn()),
            I16(a) => I16(a.$wrapping_fn()),
            I32(a) => I32(a.$wrapping_fn()),
            I64(a) => I64(a.$wrapping_fn()),
            F32(a) => F32($float_fn(a as f64) as f32),
            F64(a) => F64($float_fn(a)),
            _ => return Err(Fault::BadOperand),
        };
        Ok(v)
    }};
}

fn factorial(v: Value, checked: bool) -> FaultResult<Value> {
    let kind = v.kind();
    let Some(n) = v.to_i128().filter(|_| kind.is_integer()) else {
        return Err(Fault::BadOperand);
    };
    if n < 0 {
        return if checked {
            Err(Fault::OutOfRange)
        } else {
            Ok(Value::zero(kind))
        };
    }
    if checked {
        let mut product: i128 = 1;
        for i in 2..=n {
            product = product.checked_mul(i).ok_or(Fault::IntegerOverflow)?;
        }
        Value::from_i128(kind, product).ok_or(Fault::IntegerOverflow)
    } else {
        // every product past 66! has at least 64 factors of two, so the
        // wrapped result is zero from there on
        let mut product: u64 = 1;
        for i in 2..=n.min(66) {
            product = product.wrapping_mul(i as u64);
        }
        Ok(Value::from_word(kind, product))
    }
}

fn math(op: Op1, x: f64) -> f64 {
    match op {
        Op1::Sin => x.sin(),
        Op1::Cos => x.cos(),
        Op1::Tan => x.tan(),
        Op1::Asin => x.asin(),
        Op1::Acos => x.acos(),
        Op1::Atan => x.atan(),
        Op1::Exp => x.exp(),
        Op1::Log => x.ln(),
        Op1::Log10 => x.log10(),
        Op1::Sqrt => x.sqrt(),
        Op1::Neg => -x,
        Op1::Abs => x.abs(),
        // not a floating point function
        Op1::Not | Op1::Fact => f64::NAN,
    }
}

pub(crate) fn unary(op: Op1, v: Value, checked: bool) -> FaultResult<Value> {
    let result = match op {
        Op1::Not => return Ok(Value::Bool(!v.is_truthy())),
        Op1::Fact => return factorial(v, checked),
        Op1::Neg => signed_unary!(v, checked, checked_neg, wrapping_neg, |a: f64| -a)?,
        Op1::Abs => signed_unary!(v, checked, checked_abs, wrapping_abs, f64::abs)?,
        _ => match v {
            Value::F32(a) => Value::F32(math(op, a as f64) as f32),
            Value::F64(a) => Value::F64(math(op, a)),
            _ => return Err(Fault::BadOperand),
        },
    };
    if checked {
        check_finite(result)?;
    }
    Ok(result)
}

fn check_finite(v: Value) -> FaultResult<()> {
    match v {
        Value::F32(x) if !x.is_finite() => Err(Fault::NotFinite),
        Value::F64(x) if !x.is_finite() => Err(Fault::NotFinite),
        _ => Ok(()),
    }
}

/// Float to integer conversion with the saturating semantics of `as`.
fn saturate(to: ScalarKind, x: f64) -> Value {
    match to {
        ScalarKind::Bool => Value::Bool(x != 0.0),
        ScalarKind::U8 => Value::U8(x as u8),
        ScalarKind::I8 => Value::I8(x as i8),
        ScalarKind::U16 => Value::U16(x as u16),
        ScalarKind::I16 => Value::I16(x as i16),
        ScalarKind::U32 => Value::U32(x as u32),
        ScalarKind::I32 => Value::I32(x as i32),
        ScalarKind::U64 => Value::U64(x as u64),
        ScalarKind::I64 => Value::I64(x as i64),
        ScalarKind::F32 => Value::F32(x as f32),
        ScalarKind::F64 => Value::F64(x),
    }
}

pub(crate) fn cast(v: Value, to: ScalarKind, checked: bool) -> FaultResult<Value> {
    if v.kind() == to {
        return Ok(v);
    }
    match v.to_i128() {
        Some(n) => match Value::from_i128(to, n) {
            Some(result) => Ok(result),
            None if checked => Err(Fault::OutOfRange),
            // truncate to the low bits, as `as` does between integers
            None => Ok(Value::from_word(to, n as u64)),
        },
        None => {
            let x = v.as_f64();
            if !checked {
                return Ok(saturate(to, x));
            }
            if !x.is_finite() {
                return Err(Fault::NotFinite);
            }
            match to {
                ScalarKind::Bool => Ok(Value::Bool(x != 0.0)),
                ScalarKind::F32 if x.abs() > f32::MAX as f64 => Err(Fault::OutOfRange),
                ScalarKind::F32 => Ok(Value::F32(x as f32)),
                ScalarKind::F64 => Ok(Value::F64(x)),
                _ => {
                    let t = x.trunc();
                    if t.abs() >= 2f64.powi(64) {
                        return Err(Fault::OutOfRange);
                    }
                    Value::from_i128(to, t as i128).ok_or(Fault::OutOfRange)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Value::*;

    #[test]
    fn test_int_arith_checked() {
        assert_eq!(Ok(I8(31)), arith(ArithOp::Sum, I8(30), I8(1), true));
        assert_eq!(
            Err(Fault::IntegerOverflow),
            arith(ArithOp::Sum, I8(127), I8(1), true)
        );
        assert_eq!(
            Err(Fault::DivideByZero),
            arith(ArithOp::Div, U16(4), U16(0), true)
        );
        assert_eq!(Ok(I32(-3)), arith(ArithOp::Div, I32(-7), I32(2), true));
        assert_eq!(Ok(U8(8)), arith(ArithOp::Pow, U8(2), U8(3), true));
        assert_eq!(
            Err(Fault::OutOfRange),
            arith(ArithOp::Pow, I8(2), I8(-1), true)
        );
    }

    #[test]
    fn test_int_arith_fast() {
        assert_eq!(Ok(I8(-128)), arith(ArithOp::Sum, I8(127), I8(1), false));
        assert_eq!(Ok(U16(0)), arith(ArithOp::Div, U16(4), U16(0), false));
        assert_eq!(Ok(U8(255)), arith(ArithOp::Sub, U8(0), U8(1), false));
    }

    #[test]
    fn test_float_arith() {
        assert_eq!(Ok(F64(2.5)), arith(ArithOp::Div, F64(5.0), F64(2.0), true));
        assert_eq!(
            Err(Fault::DivideByZero),
            arith(ArithOp::Div, F64(1.0), F64(0.0), true)
        );
        assert_eq!(
            Ok(F64(f64::INFINITY)),
            arith(ArithOp::Div, F64(1.0), F64(0.0), false)
        );
        assert_eq!(
            Err(Fault::NotFinite),
            arith(ArithOp::Mul, F32(f32::MAX), F32(2.0), true)
        );
        assert_eq!(Ok(F64(1.0)), arith(ArithOp::Min, F64(1.0), F64(3.0), true));
        assert_eq!(Err(Fault::BadOperand), arith(ArithOp::Sum, F64(1.0), F32(1.0), true));
    }

    #[test]
    fn test_compare_and_logic() {
        assert_eq!(Ok(Bool(true)), compare(CmpOp::Gt, F64(2.0), F64(1.0)));
        assert_eq!(Ok(Bool(false)), compare(CmpOp::Eq, I8(2), I8(1)));
        assert_eq!(Ok(Bool(true)), compare(CmpOp::Lte, U64(1), U64(1)));
        assert_eq!(Bool(true), logic(LogicOp::Xor, F64(0.0), F64(3.0)));
        assert_eq!(Bool(false), logic(LogicOp::And, Bool(true), Bool(false)));
        assert_eq!(Bool(true), logic(LogicOp::Or, I32(0), I32(-1)));
    }

    #[test]
    fn test_unary() {
        assert_eq!(Ok(F64(-2.0)), unary(Op1::Neg, F64(2.0), true));
        assert_eq!(
            Err(Fault::IntegerOverflow),
            unary(Op1::Neg, I8(-128), true)
        );
        assert_eq!(Ok(I8(-128)), unary(Op1::Neg, I8(-128), false));
        assert_eq!(Ok(I16(5)), unary(Op1::Abs, I16(-5), true));
        assert_eq!(Ok(Bool(true)), unary(Op1::Not, F64(0.0), true));
        assert_eq!(Err(Fault::NotFinite), unary(Op1::Sqrt, F64(-1.0), true));
        assert_eq!(Ok(F64(0.0)), unary(Op1::Sin, F64(0.0), true));
        assert_eq!(Err(Fault::BadOperand), unary(Op1::Sin, I32(1), true));
        assert_eq!(Err(Fault::BadOperand), unary(Op1::Neg, U8(1), true));
    }

    #[test]
    fn test_factorial() {
        assert_eq!(Ok(U32(120)), unary(Op1::Fact, U32(5), true));
        assert_eq!(Ok(I8(1)), unary(Op1::Fact, I8(0), true));
        assert_eq!(Err(Fault::IntegerOverflow), unary(Op1::Fact, U8(6), true));
        assert_eq!(Err(Fault::OutOfRange), unary(Op1::Fact, I16(-1), true));
        assert_eq!(Ok(U64(0)), unary(Op1::Fact, U64(u64::MAX), false));
        assert_eq!(Err(Fault::BadOperand), unary(Op1::Fact, F64(3.0), true));
    }

    #[test]
    fn test_cast() {
        assert_eq!(Ok(F64(31.0)), cast(I8(31), ScalarKind::F64, true));
        assert_eq!(Ok(I8(31)), cast(F64(31.9), ScalarKind::I8, true));
        assert_eq!(Err(Fault::OutOfRange), cast(F64(300.0), ScalarKind::I8, true));
        assert_eq!(Ok(I8(127)), cast(F64(300.0), ScalarKind::I8, false));
        assert_eq!(Err(Fault::OutOfRange), cast(I32(-1), ScalarKind::U32, true));
        assert_eq!(Ok(U32(u32::MAX)), cast(I32(-1), ScalarKind::U32, false));
        assert_eq!(Ok(Bool(true)), cast(F32(0.5), ScalarKind::Bool, true));
        assert_eq!(Err(Fault::NotFinite), cast(F64(f64::NAN), ScalarKind::I32, true));
        assert_eq!(Err(Fault::OutOfRange), cast(F64(1e300), ScalarKind::F32, true));
        assert_eq!(Ok(U8(1)), cast(Bool(true), ScalarKind::U8, true));
    }
}
