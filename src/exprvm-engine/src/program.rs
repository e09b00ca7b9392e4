// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::fmt::Write;

use crate::bytecode::{ByteCode, Literal, Opcode, Signature};
use crate::memory::{ExternalBinding, MatrixStorage};
use crate::types::Type;
use crate::variable::{Location, VariableInfo, Variables};

/// A matrix variable or temporary. Owned storage is allocated per
/// [`crate::Vm`]; an external slot uses the caller's cells.
#[derive(Clone, Debug)]
pub(crate) struct MatrixSlot {
    pub ty: Type,
    pub external: Option<ExternalBinding>,
}

impl MatrixSlot {
    pub(crate) fn storage(&self) -> MatrixStorage {
        match self.external {
            Some(ref binding) => MatrixStorage::External(binding.clone()),
            None => MatrixStorage::owned(self.ty.len()),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Sizes {
    /// bytes in the constant pool
    pub constants: usize,
    /// bytes in the variable area
    pub variables: usize,
    /// number of instructions
    pub code: usize,
    /// stack slots needed to execute
    pub max_stack_depth: usize,
}

impl fmt::Display for Sizes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "constants: {} bytes, variables: {} bytes, code: {} instructions, max stack depth: {}",
            self.constants, self.variables, self.code, self.max_stack_depth
        )
    }
}

/// A compiled program. Immutable once built; every execution state
/// lives in a [`crate::Vm`].
#[derive(Clone, Debug)]
pub struct Program {
    pub(crate) variables: Variables,
    pub(crate) bytecode: ByteCode,
    pub(crate) matrices: Vec<MatrixSlot>,
    pub(crate) bindings: Vec<ExternalBinding>,
    pub(crate) sizes: Sizes,
}

impl Program {
    pub fn inputs(&self) -> &[VariableInfo] {
        self.variables.inputs()
    }

    pub fn outputs(&self) -> &[VariableInfo] {
        self.variables.outputs()
    }

    pub fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.get(name)
    }

    pub fn sizes(&self) -> Sizes {
        self.sizes
    }

    fn variable_at(&self, loc: Location) -> Option<&VariableInfo> {
        self.outputs()
            .iter()
            .chain(self.inputs().iter())
            .find(|v| v.location() == Some(loc))
    }

    fn literal(&self, off: u32) -> Option<&Literal> {
        self.bytecode.literals.get(&off)
    }

    fn spelling(&self, pc: usize) -> Option<&str> {
        self.bytecode.spellings.get(&pc).map(String::as_str)
    }

    /// The postfix line instruction `pc` was compiled from.
    pub(crate) fn describe(&self, pc: usize, op: &Opcode, out: &mut dyn fmt::Write) -> fmt::Result {
        let name = self.spelling(pc).unwrap_or(op.name());
        match *op {
            Opcode::LoadConstant { off, kind } => match self.literal(off) {
                Some(Literal {
                    text,
                    type_name: Some(type_name),
                }) => write!(out, "{name} {type_name} {text}"),
                Some(Literal {
                    text,
                    type_name: None,
                }) => write!(out, "{name} {text}"),
                None => write!(out, "{name} {kind} ?"),
            },
            Opcode::Cast { to, .. } => match self.spelling(pc) {
                Some(type_name) => write!(out, "CAST {type_name}"),
                None => write!(out, "{name} {to}"),
            },
            _ => match load_store_location(op).and_then(|loc| self.variable_at(loc)) {
                Some(var) => write!(out, "{name} {}", var.name()),
                None => write!(out, "{name}"),
            },
        }
    }

    pub(crate) fn signature(&self, pc: usize) -> Option<&Signature> {
        self.bytecode.signatures.get(pc)
    }
}

/// The variable location a load or store addresses.
fn load_store_location(op: &Opcode) -> Option<Location> {
    match *op {
        Opcode::LoadConstant { off, .. } => Some(Location::Constant(off)),
        Opcode::LoadVar { off, .. } | Opcode::AssignVar { off, .. } => {
            Some(Location::Variable(off))
        }
        Opcode::LoadExternal { binding, .. } | Opcode::AssignExternal { binding, .. } => {
            Some(Location::External(binding))
        }
        Opcode::LoadMatrix { id } | Opcode::AssignMatrix { id } => Some(Location::Matrix(id)),
        _ => None,
    }
}

fn write_types(out: &mut String, types: impl Iterator<Item = Type>) {
    out.push('(');
    for (i, ty) in types.enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{ty}");
    }
    out.push(')');
}

/// Rebuilds postfix text from compiled code, with opcode and type names
/// spelled as they were in the source. Casts and matrix copies the
/// compiler inserted are only listed, together with each instruction's
/// operand and result types, when `show_types` is set.
pub fn decompile(program: &Program, show_types: bool) -> String {
    let mut out = String::new();
    for (pc, op) in program.bytecode.code.iter().enumerate() {
        let inserted = matches!(
            op,
            Opcode::Cast { implicit: true, .. } | Opcode::CopyMatrix { .. }
        );
        if inserted && !show_types {
            continue;
        }
        let _ = program.describe(pc, op, &mut out);
        if show_types {
            if let Some(sig) = program.signature(pc) {
                out.push(' ');
                write_types(&mut out, sig.inputs.iter().copied());
                out.push_str(" => ");
                write_types(&mut out, sig.output.iter().copied());
            }
        }
        out.push('\n');
    }
    out
}
