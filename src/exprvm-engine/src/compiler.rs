// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Binds postfix text to variable storage and resolves every
//! instruction to a typed opcode, in a single forward pass over a
//! simulated stack of types.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::bytecode::{
    BindingId, ByteCodeBuilder, ByteOffset, Literal, MatrixId, Opcode, Signature,
};
use crate::common::{Error, ErrorCode, ErrorKind, Result};
use crate::memory::ExternalBinding;
use crate::operators::{self, Resolved};
use crate::postfix::{self, Instruction};
use crate::program::{MatrixSlot, Program, Sizes};
use crate::types::{ScalarKind, Type};
use crate::value::Value;
use crate::variable::{Location, VariableInfo, Variables};
use crate::{compile_err, var_err};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// type of a CONST without a type name
    pub default_literal_type: ScalarKind,
    /// whether operator resolution may widen operands
    pub implicit_casts: bool,
    pub max_stack_depth: Option<usize>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            default_literal_type: ScalarKind::F64,
            implicit_casts: true,
            max_stack_depth: None,
        }
    }
}

impl CompileOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Compile, ErrorCode::BadConfig, Some(err.to_string()))
        })
    }
}

/// Where compiled code keeps its variables.
#[derive(Debug, Default)]
struct Layout {
    variables_size: usize,
    matrices: Vec<MatrixSlot>,
    bindings: Vec<ExternalBinding>,
}

impl Layout {
    fn push_matrix(&mut self, ty: Type, external: Option<ExternalBinding>) -> Result<MatrixId> {
        let Ok(id) = MatrixId::try_from(self.matrices.len()) else {
            return compile_err!(AllocationFailed, "too many matrices".to_owned());
        };
        self.matrices.push(MatrixSlot { ty, external });
        Ok(id)
    }

    fn allocate(&mut self, var: &mut VariableInfo) -> Result<Location> {
        if let Some(loc) = var.location {
            return Ok(loc);
        }
        let ty = var.ty();
        let loc = if ty.is_matrix() {
            Location::Matrix(self.push_matrix(ty, var.external().cloned())?)
        } else if let Some(binding) = var.external() {
            let Ok(id) = BindingId::try_from(self.bindings.len()) else {
                return compile_err!(AllocationFailed, "too many external bindings".to_owned());
            };
            self.bindings.push(binding.clone());
            Location::External(id)
        } else {
            let end = self.variables_size + ty.size();
            let Ok(off) = ByteOffset::try_from(self.variables_size) else {
                return compile_err!(AllocationFailed, format!("variable area full at {}", var.name()));
            };
            if ByteOffset::try_from(end).is_err() {
                return compile_err!(AllocationFailed, format!("variable area full at {}", var.name()));
            }
            self.variables_size = end;
            Location::Variable(off)
        };
        trace!(name = var.name(), ?loc, "allocated");
        var.location = Some(loc);
        Ok(loc)
    }
}

struct Compiler<'a> {
    options: &'a CompileOptions,
    variables: Variables,
    layout: Layout,
    code: ByteCodeBuilder,
    /// simulated stack of operand types
    stack: Vec<Type>,
    /// the matrix variable each stack slot still refers to, if any
    sources: Vec<Option<MatrixId>>,
    max_depth: usize,
    line: u32,
}

fn scalar_kind(ty: Type, what: &str) -> Result<ScalarKind> {
    match ty {
        Type::Scalar(kind) => Ok(kind),
        _ => compile_err!(UnsupportedOperation, format!("{what} of {ty}")),
    }
}

impl<'a> Compiler<'a> {
    fn new(variables: Variables, options: &'a CompileOptions) -> Self {
        Compiler {
            options,
            variables,
            layout: Layout::default(),
            code: ByteCodeBuilder::default(),
            stack: Vec::new(),
            sources: Vec::new(),
            max_depth: 0,
            line: 0,
        }
    }

    fn at_line(&self, details: impl std::fmt::Display) -> String {
        format!("line {}: {}", self.line, details)
    }

    fn emit(&mut self, op: Opcode, inputs: &[Type], output: Option<Type>) {
        trace!(line = self.line, ?op, "emit");
        self.code
            .push_opcode(op, Signature::new(self.line, inputs, output));
    }

    /// Emits `op` for a source line that named it `spelling`.
    fn emit_spelled(&mut self, op: Opcode, inputs: &[Type], output: Option<Type>, spelling: &str) {
        trace!(line = self.line, ?op, spelling, "emit");
        self.code
            .push_spelled(op, Signature::new(self.line, inputs, output), spelling);
    }

    fn push(&mut self, ty: Type, source: Option<MatrixId>) -> Result<()> {
        self.stack.push(ty);
        self.sources.push(source);
        self.max_depth = self.max_depth.max(self.stack.len());
        if let Some(limit) = self.options.max_stack_depth {
            if self.stack.len() > limit {
                return compile_err!(
                    StackTooDeep,
                    self.at_line(format!("stack depth {} exceeds {limit}", self.stack.len()))
                );
            }
        }
        Ok(())
    }

    fn pop(&mut self, what: &str) -> Result<(Type, Option<MatrixId>)> {
        match (self.stack.pop(), self.sources.pop()) {
            (Some(ty), Some(source)) => Ok((ty, source)),
            _ => compile_err!(StackUnderflow, self.at_line(what)),
        }
    }

    fn truncate(&mut self, len: usize) {
        self.stack.truncate(len);
        self.sources.truncate(len);
    }

    /// Before matrix `id` is overwritten, gives every stack slot that
    /// still refers to it a copy of its current value. The value being
    /// written is still on the runtime stack, one slot above the
    /// simulated one.
    fn detach(&mut self, id: MatrixId) -> Result<()> {
        for i in 0..self.sources.len() {
            if self.sources[i] != Some(id) {
                continue;
            }
            let Ok(depth) = u16::try_from(self.stack.len() - i) else {
                return compile_err!(StackTooDeep, self.at_line("matrix copy out of reach"));
            };
            let ty = self.stack[i];
            let dst = self.layout.push_matrix(ty, None)?;
            self.emit(Opcode::CopyMatrix { depth, dst }, &[ty], Some(ty));
            self.sources[i] = None;
        }
        Ok(())
    }

    fn instruction(&mut self, inst: Instruction) -> Result<()> {
        match inst {
            Instruction::Read(name) => self.read(name),
            Instruction::Write(name) => self.write(name),
            Instruction::Const { type_name, literal } => self.constant(type_name, literal),
            Instruction::Cast(type_name) => self.cast(type_name),
            Instruction::Op(name) => self.operator(name),
        }
    }

    fn read(&mut self, name: &str) -> Result<()> {
        let Some(var) = self.variables.get_mut(name) else {
            return var_err!(UnknownVariable, name.to_owned());
        };
        let ty = var.ty();
        if ty.is_void() {
            return compile_err!(UntypedVariable, format!("line {}: {name}", self.line));
        }
        let loc = self.layout.allocate(var)?;
        let source = match loc {
            Location::Matrix(id) => Some(id),
            _ => None,
        };
        let op = match loc {
            Location::Matrix(id) => Opcode::LoadMatrix { id },
            Location::Variable(off) => Opcode::LoadVar {
                off,
                kind: scalar_kind(ty, "READ")?,
            },
            Location::External(binding) => Opcode::LoadExternal {
                binding,
                kind: scalar_kind(ty, "READ")?,
            },
            Location::Constant(off) => Opcode::LoadConstant {
                off,
                kind: scalar_kind(ty, "READ")?,
            },
        };
        self.emit(op, &[], Some(ty));
        self.push(ty, source)
    }

    fn constant(&mut self, type_name: Option<&str>, literal: &str) -> Result<()> {
        let kind = match type_name {
            Some(type_name) => match ScalarKind::from_name(type_name) {
                Some(kind) => kind,
                None => {
                    return compile_err!(
                        BadType,
                        self.at_line(format!("unknown type '{type_name}'"))
                    );
                }
            },
            None => self.options.default_literal_type,
        };
        let Some(value) = Value::parse(kind, literal) else {
            return compile_err!(BadLiteral, self.at_line(format!("{literal} as {kind}")));
        };
        let off = self.code.push_constant(
            value,
            Literal {
                text: literal.to_owned(),
                type_name: type_name.map(str::to_owned),
            },
        );
        let ty = Type::Scalar(kind);
        self.emit(Opcode::LoadConstant { off, kind }, &[], Some(ty));
        self.push(ty, None)
    }

    fn write(&mut self, name: &str) -> Result<()> {
        let (from, _) = self.pop(&format!("WRITE {name}"))?;
        let line = self.line;
        let Some(var) = self.variables.get_mut(name) else {
            return var_err!(UnknownVariable, name.to_owned());
        };
        if var.ty().is_void() {
            var.infer_type(from)?;
        }
        let to = var.ty();
        let loc = self.layout.allocate(var)?;

        if from != to {
            match (from, to) {
                (Type::Scalar(from_kind), Type::Scalar(to_kind)) => {
                    let cast = Opcode::Cast {
                        from: from_kind,
                        to: to_kind,
                        depth: 0,
                        implicit: true,
                    };
                    self.emit(cast, &[from], Some(to));
                }
                _ => {
                    return compile_err!(
                        IncompatibleWrite,
                        format!("line {line}: {from} into {name}: {to}")
                    );
                }
            }
        }

        let op = match loc {
            Location::Matrix(id) => {
                self.detach(id)?;
                Opcode::AssignMatrix { id }
            }
            Location::Variable(off) => Opcode::AssignVar {
                off,
                kind: scalar_kind(to, "WRITE")?,
            },
            Location::External(binding) => Opcode::AssignExternal {
                binding,
                kind: scalar_kind(to, "WRITE")?,
            },
            Location::Constant(_) => {
                return compile_err!(BadInstruction, self.at_line(format!("WRITE {name}")));
            }
        };
        self.emit(op, &[to], None);
        Ok(())
    }

    fn cast(&mut self, type_name: &str) -> Result<()> {
        let to: Type = match type_name.parse() {
            Ok(ty) => ty,
            Err(_) => {
                return compile_err!(BadType, self.at_line(format!("unknown type '{type_name}'")));
            }
        };
        let (from, source) = self.pop(&format!("CAST {type_name}"))?;
        if !from.converts_to(&to) {
            return compile_err!(UnsupportedCast, self.at_line(format!("{from} to {to}")));
        }
        let (Some(from_kind), Some(to_kind)) = (from.scalar_kind(), to.scalar_kind()) else {
            return compile_err!(UnsupportedCast, self.at_line(format!("{from} to {to}")));
        };
        let op = Opcode::Cast {
            from: from_kind,
            to: to_kind,
            depth: 0,
            implicit: false,
        };
        self.emit_spelled(op, &[from], Some(to), type_name);
        // a matrix cast changes nothing, so the slot keeps its source
        self.push(to, source)
    }

    fn operator(&mut self, name: &str) -> Result<()> {
        let Some(arity) = operators::arity(name) else {
            return compile_err!(UnknownOpcode, self.at_line(name));
        };
        if self.stack.len() < arity {
            return compile_err!(
                StackUnderflow,
                self.at_line(format!(
                    "{name} takes {arity} operands, {} on the stack",
                    self.stack.len()
                ))
            );
        }
        let base = self.stack.len() - arity;
        let resolution = operators::resolve(name, &self.stack[base..], self.options.implicit_casts)
            .map_err(|err| Error {
                details: err.details.map(|d| self.at_line(d)),
                ..err
            })?;

        for cast in resolution.casts.iter() {
            let from = Type::Scalar(cast.from);
            let to = Type::Scalar(cast.to);
            let op = Opcode::Cast {
                from: cast.from,
                to: cast.to,
                depth: cast.depth,
                implicit: true,
            };
            self.emit(op, &[from], Some(to));
            let slot = self.stack.len() - 1 - cast.depth as usize;
            self.stack[slot] = to;
        }

        let op = match resolution.resolved {
            Resolved::Scalar { kernel, kind } => kernel.opcode(kind),
            Resolved::Matrix(op) => {
                let dst = self.layout.push_matrix(resolution.output, None)?;
                Opcode::Matrix { op, dst }
            }
        };
        if name == op.name() {
            self.emit(op, &resolution.inputs, Some(resolution.output));
        } else {
            self.emit_spelled(op, &resolution.inputs, Some(resolution.output), name);
        }
        self.truncate(base);
        self.push(resolution.output, None)
    }

    fn finish(mut self) -> Result<Program> {
        if self.code.is_empty() {
            return compile_err!(EmptyProgram);
        }
        if !self.stack.is_empty() {
            let types: Vec<String> = self.stack.iter().map(|t| t.to_string()).collect();
            return compile_err!(
                IncompleteSequence,
                format!("{} values left on the stack: {}", types.len(), types.join(", "))
            );
        }

        // variables the code never touches still get a home
        for var in self.variables.iter_mut() {
            if var.ty().is_void() {
                return compile_err!(UntypedVariable, var.name().to_owned());
            }
            self.layout.allocate(var)?;
        }

        let constants = self.code.constants_size();
        let bytecode = self.code.finish();
        let sizes = Sizes {
            constants,
            variables: self.layout.variables_size,
            code: bytecode.code.len(),
            max_stack_depth: self.max_depth,
        };
        debug!(
            constants = sizes.constants,
            variables = sizes.variables,
            code = sizes.code,
            max_stack_depth = sizes.max_stack_depth,
            "compiled program"
        );

        Ok(Program {
            variables: self.variables,
            bytecode,
            matrices: self.layout.matrices,
            bindings: self.layout.bindings,
            sizes,
        })
    }
}

/// Compiles postfix text against `variables`, whose types must already
/// be bound for every name that is read before it is written.
pub fn compile(postfix: &str, variables: Variables, options: &CompileOptions) -> Result<Program> {
    let mut compiler = Compiler::new(variables, options);
    for (line, inst) in postfix::instructions(postfix) {
        compiler.line = line as u32;
        compiler.instruction(inst?)?;
    }
    compiler.finish()
}
