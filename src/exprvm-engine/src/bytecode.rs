// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::types::{ScalarKind, Type};
use crate::value::Value;

pub type ByteOffset = u32;
pub type BindingId = u16; // Index into the external bindings table
pub type MatrixId = u16; // Index into the matrix table (variables and temps)

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ArithOp {
    Sum,
    Sub,
    Mul,
    Div,
    Pow,
    Min,
    Max,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum CmpOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum LogicOp {
    And,
    Or,
    Xor,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Op1 {
    Neg,
    Not,
    Abs,
    Fact,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Exp,
    Log,
    Log10,
    Sqrt,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum MatrixOp {
    Sum,
    Sub,
    /// matrix x matrix
    Product,
    /// scalar x matrix
    ScaleLeft,
    /// matrix x scalar
    ScaleRight,
}

impl ArithOp {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ArithOp::Sum => "SUM",
            ArithOp::Sub => "SUB",
            ArithOp::Mul => "MUL",
            ArithOp::Div => "DIV",
            ArithOp::Pow => "POW",
            ArithOp::Min => "MIN",
            ArithOp::Max => "MAX",
        }
    }
}

impl CmpOp {
    pub(crate) fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "EQ",
            CmpOp::Neq => "NEQ",
            CmpOp::Gt => "GT",
            CmpOp::Lt => "LT",
            CmpOp::Gte => "GTE",
            CmpOp::Lte => "LTE",
        }
    }
}

impl LogicOp {
    pub(crate) fn name(self) -> &'static str {
        match self {
            LogicOp::And => "AND",
            LogicOp::Or => "OR",
            LogicOp::Xor => "XOR",
        }
    }
}

impl Op1 {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Op1::Neg => "NEG",
            Op1::Not => "NOT",
            Op1::Abs => "ABS",
            Op1::Fact => "FACT",
            Op1::Sin => "SIN",
            Op1::Cos => "COS",
            Op1::Tan => "TAN",
            Op1::Asin => "ASIN",
            Op1::Acos => "ACOS",
            Op1::Atan => "ATAN",
            Op1::Exp => "EXP",
            Op1::Log => "LOG",
            Op1::Log10 => "LOG10",
            Op1::Sqrt => "SQRT",
        }
    }
}

impl MatrixOp {
    pub(crate) fn name(self) -> &'static str {
        match self {
            MatrixOp::Sum => "SUM",
            MatrixOp::Sub => "SUB",
            MatrixOp::Product | MatrixOp::ScaleLeft | MatrixOp::ScaleRight => "MUL",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Opcode {
    // === CONSTANTS & VARIABLES ===
    LoadConstant {
        off: ByteOffset,
        kind: ScalarKind,
    },
    LoadVar {
        off: ByteOffset,
        kind: ScalarKind,
    },
    LoadExternal {
        binding: BindingId,
        kind: ScalarKind,
    },
    LoadMatrix {
        id: MatrixId,
    },

    // === ASSIGNMENT ===
    AssignVar {
        off: ByteOffset,
        kind: ScalarKind,
    },
    AssignExternal {
        binding: BindingId,
        kind: ScalarKind,
    },
    AssignMatrix {
        id: MatrixId,
    },

    // === CONVERSION ===
    /// Converts the stack slot `depth` below the top in place.
    Cast {
        from: ScalarKind,
        to: ScalarKind,
        depth: u8,
        implicit: bool,
    },

    // === ARITHMETIC & LOGIC ===
    Arith {
        op: ArithOp,
        kind: ScalarKind,
    },
    Compare {
        op: CmpOp,
        kind: ScalarKind,
    },
    Logic {
        op: LogicOp,
        kind: ScalarKind,
    },
    Op1 {
        op: Op1,
        kind: ScalarKind,
    },

    // === MATRICES ===
    Matrix {
        op: MatrixOp,
        dst: MatrixId,
    },
    /// Copies the matrix the slot `depth` below the top refers to into
    /// `dst` and makes the slot refer to `dst`.
    CopyMatrix {
        depth: u16,
        dst: MatrixId,
    },
}

impl Opcode {
    /// The postfix instruction name this opcode was compiled from.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Opcode::LoadConstant { .. } => "CONST",
            Opcode::LoadVar { .. } | Opcode::LoadExternal { .. } | Opcode::LoadMatrix { .. } => {
                "READ"
            }
            Opcode::AssignVar { .. }
            | Opcode::AssignExternal { .. }
            | Opcode::AssignMatrix { .. } => "WRITE",
            Opcode::Cast { .. } => "CAST",
            Opcode::Arith { op, .. } => op.name(),
            Opcode::Compare { op, .. } => op.name(),
            Opcode::Logic { op, .. } => op.name(),
            Opcode::Op1 { op, .. } => op.name(),
            Opcode::Matrix { op, .. } => op.name(),
            Opcode::CopyMatrix { .. } => "COPY",
        }
    }
}

/// The types an instruction consumes from and produces on the stack,
/// kept alongside the code for decompilation and debug traces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Signature {
    /// 1-based line of the postfix instruction this was compiled from
    pub line: u32,
    pub inputs: SmallVec<[Type; 2]>,
    pub output: Option<Type>,
}

impl Signature {
    pub(crate) fn new(line: u32, inputs: &[Type], output: Option<Type>) -> Self {
        Signature {
            line,
            inputs: inputs.iter().copied().collect(),
            output,
        }
    }
}

/// A constant as it was written in the postfix text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Literal {
    pub text: String,
    /// the type name as the CONST line spelled it, if it had one
    pub type_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ByteCode {
    pub(crate) constants: Vec<u8>,
    pub(crate) literals: HashMap<ByteOffset, Literal>,
    /// instruction index to the opcode or type name as the postfix line
    /// spelled it, where the opcode alone does not say
    pub(crate) spellings: HashMap<usize, String>,
    pub(crate) code: Vec<Opcode>,
    pub(crate) signatures: Vec<Signature>,
}

#[derive(Debug, Default)]
pub(crate) struct ByteCodeBuilder {
    bytecode: ByteCode,
}

impl ByteCodeBuilder {
    /// Appends a constant to the pool and returns its byte offset. Every
    /// CONST line gets its own slot so its source text can be recovered.
    pub(crate) fn push_constant(&mut self, value: Value, literal: Literal) -> ByteOffset {
        let off = self.bytecode.constants.len();
        let size = value.kind().size();
        self.bytecode.constants.resize(off + size, 0);
        value.store(&mut self.bytecode.constants[off..]);
        let off = off as ByteOffset;
        self.bytecode.literals.insert(off, literal);
        off
    }

    pub(crate) fn push_opcode(&mut self, op: Opcode, signature: Signature) {
        self.bytecode.code.push(op);
        self.bytecode.signatures.push(signature);
    }

    /// Like `push_opcode`, remembering how the source line spelled it.
    pub(crate) fn push_spelled(&mut self, op: Opcode, signature: Signature, spelling: &str) {
        let pc = self.bytecode.code.len();
        self.bytecode.spellings.insert(pc, spelling.to_owned());
        self.push_opcode(op, signature);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bytecode.code.is_empty()
    }

    pub(crate) fn constants_size(&self) -> usize {
        self.bytecode.constants.len()
    }

    pub(crate) fn finish(self) -> ByteCode {
        self.bytecode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_pool_layout() {
        let mut bytecode = ByteCodeBuilder::default();
        let literal = |text: &str| Literal {
            text: text.to_owned(),
            type_name: None,
        };
        let a = bytecode.push_constant(Value::I8(31), literal("31"));
        let b = bytecode.push_constant(Value::F64(2.0), literal("2"));
        let c = bytecode.push_constant(Value::F64(2.0), literal("2.0"));
        let d = bytecode.push_constant(Value::U16(7), literal("7"));

        assert_eq!(0, a);
        assert_eq!(1, b);
        assert_eq!(9, c);
        assert_eq!(17, d);
        assert_eq!(19, bytecode.constants_size());

        let bytecode = bytecode.finish();
        assert_eq!(
            Value::F64(2.0),
            Value::load(ScalarKind::F64, &bytecode.constants[b as usize..])
        );
        assert_eq!("2.0", bytecode.literals[&c].text);
    }

    #[test]
    fn test_push_opcode_keeps_signatures_aligned() {
        let mut bytecode = ByteCodeBuilder::default();
        let f64_ty = Type::Scalar(ScalarKind::F64);
        bytecode.push_opcode(
            Opcode::LoadVar {
                off: 0,
                kind: ScalarKind::F64,
            },
            Signature::new(1, &[], Some(f64_ty)),
        );
        bytecode.push_opcode(
            Opcode::Op1 {
                op: Op1::Sin,
                kind: ScalarKind::F64,
            },
            Signature::new(2, &[f64_ty], Some(f64_ty)),
        );
        bytecode.push_spelled(
            Opcode::Cast {
                from: ScalarKind::F64,
                to: ScalarKind::F32,
                depth: 0,
                implicit: false,
            },
            Signature::new(3, &[f64_ty], Some(Type::Scalar(ScalarKind::F32))),
            "float",
        );
        let bytecode = bytecode.finish();
        assert_eq!(bytecode.code.len(), bytecode.signatures.len());
        assert_eq!("READ", bytecode.code[0].name());
        assert_eq!("SIN", bytecode.code[1].name());
        assert_eq!(None, bytecode.spellings.get(&1));
        assert_eq!(Some("float"), bytecode.spellings.get(&2).map(String::as_str));
    }

    #[test]
    fn test_opcode_size() {
        use std::mem::size_of;
        let size = size_of::<Opcode>();
        assert!(size <= 8, "Opcode size {} exceeds 8 bytes", size);
    }
}
