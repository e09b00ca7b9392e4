// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The operator table and overload resolution.
//!
//! Every scalar overload is homogeneous: all operands share one kind,
//! so resolution only has to pick that kind. When no overload matches
//! exactly, the operands are widened to the cheapest reachable kind.

use std::collections::HashMap;

use lazy_static::lazy_static;
use smallvec::SmallVec;

use crate::bytecode::{ArithOp, CmpOp, LogicOp, MatrixOp, Op1, Opcode};
use crate::common::Result;
use crate::compile_err;
use crate::types::{ScalarKind, Type};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Kernel {
    Arith(ArithOp),
    Compare(CmpOp),
    Logic(LogicOp),
    Unary(Op1),
}

impl Kernel {
    pub(crate) fn opcode(self, kind: ScalarKind) -> Opcode {
        match self {
            Kernel::Arith(op) => Opcode::Arith { op, kind },
            Kernel::Compare(op) => Opcode::Compare { op, kind },
            Kernel::Logic(op) => Opcode::Logic { op, kind },
            Kernel::Unary(op) => Opcode::Op1 { op, kind },
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Overload {
    kind: ScalarKind,
    output: ScalarKind,
}

struct Operator {
    arity: usize,
    kernel: Kernel,
    /// in registration order
    overloads: Vec<Overload>,
}

const SIGNED: [ScalarKind; 6] = [
    ScalarKind::I8,
    ScalarKind::I16,
    ScalarKind::I32,
    ScalarKind::I64,
    ScalarKind::F32,
    ScalarKind::F64,
];
const FLOATS: [ScalarKind; 2] = [ScalarKind::F32, ScalarKind::F64];

fn same_kind(kinds: &[ScalarKind]) -> Vec<Overload> {
    kinds
        .iter()
        .map(|&kind| Overload { kind, output: kind })
        .collect()
}

fn to_bool(kinds: &[ScalarKind]) -> Vec<Overload> {
    kinds
        .iter()
        .map(|&kind| Overload {
            kind,
            output: ScalarKind::Bool,
        })
        .collect()
}

lazy_static! {
    static ref OPERATORS: HashMap<&'static str, Operator> = {
        let numeric: Vec<ScalarKind> = ScalarKind::ALL
            .iter()
            .copied()
            .filter(|k| k.is_numeric())
            .collect();
        let integers: Vec<ScalarKind> = ScalarKind::ALL
            .iter()
            .copied()
            .filter(|k| k.is_integer())
            .collect();

        let mut ops = HashMap::new();
        let mut register = |name: &'static str, arity: usize, kernel: Kernel, overloads| {
            ops.insert(
                name,
                Operator {
                    arity,
                    kernel,
                    overloads,
                },
            );
        };

        for (name, op) in [
            ("SUM", ArithOp::Sum),
            ("ADD", ArithOp::Sum),
            ("SUB", ArithOp::Sub),
            ("MUL", ArithOp::Mul),
            ("DIV", ArithOp::Div),
            ("MIN", ArithOp::Min),
            ("MAX", ArithOp::Max),
        ] {
            register(name, 2, Kernel::Arith(op), same_kind(&numeric));
        }
        register("POW", 2, Kernel::Arith(ArithOp::Pow), same_kind(&FLOATS));

        for (name, op) in [
            ("EQ", CmpOp::Eq),
            ("NEQ", CmpOp::Neq),
            ("GT", CmpOp::Gt),
            ("LT", CmpOp::Lt),
            ("GTE", CmpOp::Gte),
            ("LTE", CmpOp::Lte),
        ] {
            register(name, 2, Kernel::Compare(op), to_bool(&ScalarKind::ALL));
        }
        for (name, op) in [
            ("AND", LogicOp::And),
            ("OR", LogicOp::Or),
            ("XOR", LogicOp::Xor),
        ] {
            register(name, 2, Kernel::Logic(op), to_bool(&ScalarKind::ALL));
        }

        register("NOT", 1, Kernel::Unary(Op1::Not), to_bool(&ScalarKind::ALL));
        register("NEG", 1, Kernel::Unary(Op1::Neg), same_kind(&SIGNED));
        register("ABS", 1, Kernel::Unary(Op1::Abs), same_kind(&SIGNED));
        register("FACT", 1, Kernel::Unary(Op1::Fact), same_kind(&integers));
        for op in [
            Op1::Sin,
            Op1::Cos,
            Op1::Tan,
            Op1::Asin,
            Op1::Acos,
            Op1::Atan,
            Op1::Exp,
            Op1::Log,
            Op1::Log10,
            Op1::Sqrt,
        ] {
            register(op.name(), 1, Kernel::Unary(op), same_kind(&FLOATS));
        }

        ops
    };
}

/// A widening cast the compiler emits before the operator, converting
/// the operand `depth` slots below the top of the stack.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct WideningCast {
    pub depth: u8,
    pub from: ScalarKind,
    pub to: ScalarKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Resolved {
    Scalar { kernel: Kernel, kind: ScalarKind },
    Matrix(MatrixOp),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Resolution {
    pub resolved: Resolved,
    pub casts: SmallVec<[WideningCast; 2]>,
    /// operand types after the casts
    pub inputs: SmallVec<[Type; 2]>,
    pub output: Type,
}

/// The number of operands `name` takes, or `None` for an unknown opcode.
pub(crate) fn arity(name: &str) -> Option<usize> {
    OPERATORS.get(name).map(|op| op.arity)
}

fn type_list(operands: &[Type]) -> String {
    let types: Vec<String> = operands.iter().map(|t| t.to_string()).collect();
    types.join(", ")
}

/// Resolves `name` applied to `operands` (bottom of the stack first) to
/// a kernel. The caller checks the arity against the simulated stack.
pub(crate) fn resolve(name: &str, operands: &[Type], implicit_casts: bool) -> Result<Resolution> {
    let Some(op) = OPERATORS.get(name) else {
        return compile_err!(UnknownOpcode, name.to_owned());
    };
    if operands.len() != op.arity {
        return compile_err!(
            StackUnderflow,
            format!("{name} takes {} operands, got {}", op.arity, operands.len())
        );
    }

    if operands.iter().any(|t| t.is_matrix()) {
        return resolve_matrix(name, op, operands, implicit_casts);
    }

    let mut kinds: SmallVec<[ScalarKind; 2]> = SmallVec::new();
    for t in operands {
        match t.scalar_kind() {
            Some(kind) => kinds.push(kind),
            None => {
                return compile_err!(
                    UnsupportedOperation,
                    format!("{name}({})", type_list(operands))
                );
            }
        }
    }

    // (number of casts, total widening cost)
    let mut best: Option<((usize, u32), Overload)> = None;
    for overload in op.overloads.iter() {
        let mut casts = 0;
        let mut cost = 0;
        let mut reachable = true;
        for &kind in kinds.iter() {
            if kind == overload.kind {
                continue;
            }
            match kind.widening_cost(overload.kind) {
                Some(c) if implicit_casts => {
                    casts += 1;
                    cost += c;
                }
                _ => {
                    reachable = false;
                    break;
                }
            }
        }
        if !reachable {
            continue;
        }
        let score = (casts, cost);
        if best.is_none_or(|(best_score, _)| score < best_score) {
            best = Some((score, *overload));
        }
    }

    let Some((_, overload)) = best else {
        return compile_err!(
            UnsupportedOperation,
            format!("{name}({})", type_list(operands))
        );
    };

    let n = kinds.len();
    let casts = kinds
        .iter()
        .enumerate()
        .filter(|(_, kind)| **kind != overload.kind)
        .map(|(i, &from)| WideningCast {
            depth: (n - 1 - i) as u8,
            from,
            to: overload.kind,
        })
        .collect();

    Ok(Resolution {
        resolved: Resolved::Scalar {
            kernel: op.kernel,
            kind: overload.kind,
        },
        casts,
        inputs: (0..n).map(|_| Type::Scalar(overload.kind)).collect(),
        output: Type::Scalar(overload.output),
    })
}

fn resolve_matrix(
    name: &str,
    op: &Operator,
    operands: &[Type],
    implicit_casts: bool,
) -> Result<Resolution> {
    let unsupported = || {
        compile_err!(
            UnsupportedOperation,
            format!("{name}({})", type_list(operands))
        )
    };
    let element_kind = |t: &Type| t.scalar_kind().filter(|k| k.is_float());

    let (Kernel::Arith(arith), [a, b]) = (op.kernel, operands) else {
        return unsupported();
    };
    let (Some(ka), Some(kb)) = (a.scalar_kind(), b.scalar_kind()) else {
        return unsupported();
    };

    let mut casts: SmallVec<[WideningCast; 2]> = SmallVec::new();
    let mut inputs: SmallVec<[Type; 2]> = SmallVec::new();
    let (matrix_op, output) = match (arith, a, b) {
        (ArithOp::Sum | ArithOp::Sub, Type::Matrix { .. }, Type::Matrix { .. }) => {
            if element_kind(a).is_none() || ka != kb {
                return unsupported();
            }
            if a.dims() != b.dims() {
                return compile_err!(
                    MismatchedDimensions,
                    format!("{name}({})", type_list(operands))
                );
            }
            let op = if arith == ArithOp::Sum {
                MatrixOp::Sum
            } else {
                MatrixOp::Sub
            };
            inputs.extend([*a, *b]);
            (op, *a)
        }
        (ArithOp::Mul, Type::Matrix { rows, .. }, Type::Matrix { cols, .. }) => {
            if element_kind(a).is_none() || ka != kb {
                return unsupported();
            }
            if a.dims().1 != b.dims().0 {
                return compile_err!(
                    MismatchedDimensions,
                    format!("{name}({})", type_list(operands))
                );
            }
            inputs.extend([*a, *b]);
            (MatrixOp::Product, Type::matrix(ka, *rows, *cols))
        }
        (ArithOp::Mul, Type::Scalar(s), Type::Matrix { .. })
        | (ArithOp::Mul, Type::Matrix { .. }, Type::Scalar(s)) => {
            let (matrix, scalar_depth, op) = if a.is_matrix() {
                (a, 0, MatrixOp::ScaleRight)
            } else {
                (b, 1, MatrixOp::ScaleLeft)
            };
            let Some(elem) = element_kind(matrix) else {
                return unsupported();
            };
            if *s != elem {
                match s.widening_cost(elem) {
                    Some(_) if implicit_casts => casts.push(WideningCast {
                        depth: scalar_depth,
                        from: *s,
                        to: elem,
                    }),
                    _ => return unsupported(),
                }
            }
            if a.is_matrix() {
                inputs.extend([*a, Type::Scalar(elem)]);
            } else {
                inputs.extend([Type::Scalar(elem), *b]);
            }
            (op, *matrix)
        }
        _ => return unsupported(),
    };

    Ok(Resolution {
        resolved: Resolved::Matrix(matrix_op),
        casts,
        inputs,
        output,
    })
}
