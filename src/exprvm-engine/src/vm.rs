// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::bytecode::{ArithOp, MatrixId, MatrixOp, Opcode};
use crate::common::{Error, ErrorCode, ErrorKind, Result};
use crate::memory::MatrixStorage;
use crate::numeric::{self, Fault};
use crate::program::Program;
use crate::types::{ScalarKind, Type};
use crate::value::Value;
use crate::variable::Location;
use crate::{runtime_err, var_err};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// no stack or numeric checks
    #[default]
    Fast,
    /// stack and numeric checks on every instruction
    Safe,
    /// safe checks plus a trace of every instruction
    Debug,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ExecutionMode::Fast => "fast",
            ExecutionMode::Safe => "safe",
            ExecutionMode::Debug => "debug",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fast" => Ok(ExecutionMode::Fast),
            "safe" => Ok(ExecutionMode::Safe),
            "debug" => Ok(ExecutionMode::Debug),
            _ => Err(Error::new(
                ErrorKind::Runtime,
                ErrorCode::Generic,
                Some(format!("unknown execution mode '{s}'")),
            )),
        }
    }
}

/// Fixed capacity stack of 64-bit words. A matrix operand is one word
/// holding its matrix id.
#[derive(Clone, Debug)]
struct Stack {
    data: Box<[u64]>,
    top: usize,
}

impl Stack {
    fn new(capacity: usize) -> Self {
        Stack {
            data: vec![0; capacity].into_boxed_slice(),
            top: 0,
        }
    }

    #[inline(always)]
    fn reset(&mut self) {
        self.top = 0;
    }

    #[inline(always)]
    fn push<const CHECKED: bool>(&mut self, word: u64) -> std::result::Result<(), Fault> {
        if CHECKED && self.top >= self.data.len() {
            return Err(Fault::StackOverflow);
        }
        self.data[self.top] = word;
        self.top += 1;
        Ok(())
    }

    #[inline(always)]
    fn pop<const CHECKED: bool>(&mut self) -> std::result::Result<u64, Fault> {
        if CHECKED && self.top == 0 {
            return Err(Fault::StackUnderflow);
        }
        self.top -= 1;
        Ok(self.data[self.top])
    }

    /// The index of the slot `depth` below the top.
    #[inline(always)]
    fn slot<const CHECKED: bool>(&self, depth: usize) -> std::result::Result<usize, Fault> {
        if CHECKED && self.top <= depth {
            return Err(Fault::StackUnderflow);
        }
        Ok(self.top - 1 - depth)
    }
}

type StepResult = std::result::Result<(), Fault>;

/// Executes a compiled [`Program`]. The variable area, matrix storage and
/// stack are allocated once, here; executing never allocates outside of
/// debug tracing.
#[derive(Clone, Debug)]
pub struct Vm {
    program: Program,
    vars: Box<[u8]>,
    stack: Stack,
    matrices: Vec<MatrixStorage>,
}

impl Vm {
    pub fn new(program: Program) -> Vm {
        let sizes = program.sizes();
        let matrices = program.matrices.iter().map(|slot| slot.storage()).collect();
        Vm {
            vars: vec![0; sizes.variables].into_boxed_slice(),
            stack: Stack::new(sizes.max_stack_depth),
            matrices,
            program,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Runs the program once. Debug mode writes its trace to `debug_sink`
    /// and fails without one; the other modes ignore it.
    pub fn execute(
        &mut self,
        mode: ExecutionMode,
        debug_sink: Option<&mut dyn fmt::Write>,
    ) -> Result<()> {
        match mode {
            ExecutionMode::Fast => self.run::<false>(None),
            ExecutionMode::Safe => self.run::<true>(None),
            ExecutionMode::Debug => match debug_sink {
                Some(sink) => self.run::<true>(Some(sink)),
                None => runtime_err!(MissingDebugSink),
            },
        }
    }

    fn run<const CHECKED: bool>(&mut self, mut trace: Option<&mut dyn fmt::Write>) -> Result<()> {
        let Vm {
            program,
            vars,
            stack,
            matrices,
        } = self;
        let program: &Program = program;
        stack.reset();

        if let Some(sink) = trace.as_deref_mut() {
            writeln!(
                sink,
                "[line]-[stackPtr]-[codePtr]::[CODE] stack-in => stack-out"
            )
            .map_err(trace_error)?;
        }

        for (pc, op) in program.bytecode.code.iter().enumerate() {
            if let Some(sink) = trace.as_deref_mut() {
                trace_inputs(sink, program, pc, op, stack, matrices).map_err(trace_error)?;
            }
            let result = step::<CHECKED>(op, program, vars, stack, matrices);
            if let Some(sink) = trace.as_deref_mut() {
                trace_output(sink, program, pc, op, stack, matrices, result.is_err())
                    .map_err(trace_error)?;
            }
            if let Err(fault) = result {
                debug!(pc, instruction = op.name(), %fault, "execution failed");
                return Err(Error::new(
                    ErrorKind::Runtime,
                    fault.code(),
                    Some(format!("instruction {pc} ({}): {fault}", op.name())),
                ));
            }
        }

        if let Some(sink) = trace {
            writeln!(
                sink,
                "{} - {} :: END",
                stack.top,
                program.bytecode.code.len()
            )
            .map_err(trace_error)?;
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<(Type, Location)> {
        let Some(var) = self.program.variable(name) else {
            return var_err!(UnknownVariable, name.to_owned());
        };
        match var.location() {
            Some(loc) => Ok((var.ty(), loc)),
            None => var_err!(UnknownVariable, format!("{name} has no storage")),
        }
    }

    /// Stores `value` into a scalar variable, converting it to the
    /// variable's type. The conversion must not lose range.
    pub fn set_value(&mut self, name: &str, value: Value) -> Result<()> {
        let (ty, loc) = self.lookup(name)?;
        let Type::Scalar(kind) = ty else {
            return var_err!(BadType, format!("{name} is {ty}, not a scalar"));
        };
        let value = convert(name, value, kind)?;
        match loc {
            Location::Variable(off) => value.store(&mut self.vars[off as usize..]),
            Location::External(binding) => {
                self.program.bindings[binding as usize].set(0, value.to_word())
            }
            Location::Constant(_) | Location::Matrix(_) => {
                return var_err!(BadType, format!("{name} is not writable"));
            }
        }
        Ok(())
    }

    pub fn value(&self, name: &str) -> Result<Value> {
        let (ty, loc) = self.lookup(name)?;
        let Type::Scalar(kind) = ty else {
            return var_err!(BadType, format!("{name} is {ty}, not a scalar"));
        };
        match loc {
            Location::Variable(off) => Ok(Value::load(kind, &self.vars[off as usize..])),
            Location::External(binding) => Ok(Value::from_word(
                kind,
                self.program.bindings[binding as usize].get(0),
            )),
            Location::Constant(_) | Location::Matrix(_) => {
                var_err!(BadType, format!("{name} is not a scalar"))
            }
        }
    }

    /// Stores the elements of a matrix variable, in row-major order.
    pub fn set_matrix(&mut self, name: &str, values: &[f64]) -> Result<()> {
        let (ty, loc) = self.lookup(name)?;
        let (Type::Matrix { kind, .. }, Location::Matrix(id)) = (ty, loc) else {
            return var_err!(BadType, format!("{name} is {ty}, not a matrix"));
        };
        if values.len() != ty.len() {
            return Err(Error::new(
                ErrorKind::Variable,
                ErrorCode::MismatchedDimensions,
                Some(format!("{name} is {ty}, got {} values", values.len())),
            ));
        }
        for (i, x) in values.iter().enumerate() {
            let word = convert(name, Value::F64(*x), kind)?.to_word();
            self.matrices[id as usize].set(i, word);
        }
        Ok(())
    }

    /// The elements of a matrix variable, in row-major order.
    pub fn matrix(&self, name: &str) -> Result<Vec<f64>> {
        let (ty, loc) = self.lookup(name)?;
        let (Type::Matrix { kind, .. }, Location::Matrix(id)) = (ty, loc) else {
            return var_err!(BadType, format!("{name} is {ty}, not a matrix"));
        };
        let storage = &self.matrices[id as usize];
        Ok((0..ty.len())
            .map(|i| Value::from_word(kind, storage.get(i)).as_f64())
            .collect())
    }
}

fn convert(name: &str, value: Value, kind: ScalarKind) -> Result<Value> {
    numeric::cast(value, kind, true).map_err(|fault| {
        Error::new(
            ErrorKind::Variable,
            fault.code(),
            Some(format!("{value} does not fit {name}: {kind}")),
        )
    })
}

fn trace_error(_: fmt::Error) -> Error {
    Error::new(ErrorKind::Runtime, ErrorCode::TraceWrite, None)
}

#[inline(always)]
fn step<const CHECKED: bool>(
    op: &Opcode,
    program: &Program,
    vars: &mut [u8],
    stack: &mut Stack,
    matrices: &mut [MatrixStorage],
) -> StepResult {
    match *op {
        Opcode::LoadConstant { off, kind } => {
            let value = Value::load(kind, &program.bytecode.constants[off as usize..]);
            stack.push::<CHECKED>(value.to_word())
        }
        Opcode::LoadVar { off, kind } => {
            let value = Value::load(kind, &vars[off as usize..]);
            stack.push::<CHECKED>(value.to_word())
        }
        Opcode::LoadExternal { binding, kind } => {
            // normalize whatever the caller left in the cell
            let word = program.bindings[binding as usize].get(0);
            stack.push::<CHECKED>(Value::from_word(kind, word).to_word())
        }
        Opcode::LoadMatrix { id } => stack.push::<CHECKED>(id as u64),
        Opcode::AssignVar { off, kind } => {
            let word = stack.pop::<CHECKED>()?;
            Value::from_word(kind, word).store(&mut vars[off as usize..]);
            Ok(())
        }
        Opcode::AssignExternal { binding, .. } => {
            let word = stack.pop::<CHECKED>()?;
            program.bindings[binding as usize].set(0, word);
            Ok(())
        }
        Opcode::AssignMatrix { id } => {
            let src = stack.pop::<CHECKED>()? as usize;
            copy_matrix(program, matrices, src, id as usize);
            Ok(())
        }
        Opcode::CopyMatrix { depth, dst } => {
            let slot = stack.slot::<CHECKED>(depth as usize)?;
            copy_matrix(program, matrices, stack.data[slot] as usize, dst as usize);
            stack.data[slot] = dst as u64;
            Ok(())
        }
        Opcode::Cast { from, to, depth, .. } => {
            if from != to {
                let slot = stack.slot::<CHECKED>(depth as usize)?;
                let value = Value::from_word(from, stack.data[slot]);
                stack.data[slot] = numeric::cast(value, to, CHECKED)?.to_word();
            }
            Ok(())
        }
        Opcode::Arith { op, kind } => {
            let r = Value::from_word(kind, stack.pop::<CHECKED>()?);
            let l = Value::from_word(kind, stack.pop::<CHECKED>()?);
            let result = numeric::arith(op, l, r, CHECKED)?;
            stack.push::<CHECKED>(result.to_word())
        }
        Opcode::Compare { op, kind } => {
            let r = Value::from_word(kind, stack.pop::<CHECKED>()?);
            let l = Value::from_word(kind, stack.pop::<CHECKED>()?);
            let result = numeric::compare(op, l, r)?;
            stack.push::<CHECKED>(result.to_word())
        }
        Opcode::Logic { op, kind } => {
            let r = Value::from_word(kind, stack.pop::<CHECKED>()?);
            let l = Value::from_word(kind, stack.pop::<CHECKED>()?);
            stack.push::<CHECKED>(numeric::logic(op, l, r).to_word())
        }
        Opcode::Op1 { op, kind } => {
            let x = Value::from_word(kind, stack.pop::<CHECKED>()?);
            let result = numeric::unary(op, x, CHECKED)?;
            stack.push::<CHECKED>(result.to_word())
        }
        Opcode::Matrix { op, dst } => matrix_op::<CHECKED>(op, dst, program, stack, matrices),
    }
}

fn copy_matrix(program: &Program, matrices: &mut [MatrixStorage], src: usize, dst: usize) {
    if src == dst {
        return;
    }
    for i in 0..program.matrices[dst].ty.len() {
        let word = matrices[src].get(i);
        matrices[dst].set(i, word);
    }
}

fn matrix_op<const CHECKED: bool>(
    op: MatrixOp,
    dst: MatrixId,
    program: &Program,
    stack: &mut Stack,
    matrices: &mut [MatrixStorage],
) -> StepResult {
    let dst = dst as usize;
    let ty = program.matrices[dst].ty;
    let Some(kind) = ty.scalar_kind() else {
        return Err(Fault::BadOperand);
    };
    let b = stack.pop::<CHECKED>()?;
    let a = stack.pop::<CHECKED>()?;
    let elem = |storage: &MatrixStorage, i: usize| Value::from_word(kind, storage.get(i));

    match op {
        MatrixOp::Sum | MatrixOp::Sub => {
            let arith = if op == MatrixOp::Sum {
                ArithOp::Sum
            } else {
                ArithOp::Sub
            };
            let (a, b) = (a as usize, b as usize);
            for i in 0..ty.len() {
                let r = numeric::arith(arith, elem(&matrices[a], i), elem(&matrices[b], i), CHECKED)?;
                matrices[dst].set(i, r.to_word());
            }
        }
        MatrixOp::ScaleLeft | MatrixOp::ScaleRight => {
            let (scalar, m) = if op == MatrixOp::ScaleLeft {
                (a, b as usize)
            } else {
                (b, a as usize)
            };
            let scalar = Value::from_word(kind, scalar);
            for i in 0..ty.len() {
                let r = numeric::arith(ArithOp::Mul, elem(&matrices[m], i), scalar, CHECKED)?;
                matrices[dst].set(i, r.to_word());
            }
        }
        MatrixOp::Product => {
            let (a, b) = (a as usize, b as usize);
            let (rows, cols) = ty.dims();
            let (rows, cols) = (rows as usize, cols as usize);
            let inner = program.matrices[a].ty.dims().1 as usize;
            for i in 0..rows {
                for j in 0..cols {
                    let mut acc = Value::zero(kind);
                    for t in 0..inner {
                        let x = elem(&matrices[a], i * inner + t);
                        let y = elem(&matrices[b], t * cols + j);
                        let p = numeric::arith(ArithOp::Mul, x, y, CHECKED)?;
                        acc = numeric::arith(ArithOp::Sum, acc, p, CHECKED)?;
                    }
                    matrices[dst].set(i * cols + j, acc.to_word());
                }
            }
        }
    }
    stack.push::<CHECKED>(dst as u64)
}

fn write_slot(
    out: &mut dyn fmt::Write,
    ty: Type,
    word: u64,
    matrices: &[MatrixStorage],
) -> fmt::Result {
    match ty {
        Type::Scalar(kind) => write!(out, "({kind}){}", Value::from_word(kind, word)),
        Type::Matrix { kind, .. } => {
            write!(out, "({ty})[")?;
            if let Some(storage) = matrices.get(word as usize) {
                for i in 0..ty.len() {
                    if i > 0 {
                        write!(out, " ")?;
                    }
                    write!(out, "{}", Value::from_word(kind, storage.get(i)))?;
                }
            }
            write!(out, "]")
        }
        Type::Void => Ok(()),
    }
}

/// The stack index of the slot an in-place instruction rewrites.
fn in_place_slot(op: &Opcode, stack: &Stack) -> Option<usize> {
    match *op {
        Opcode::Cast { depth, .. } => stack.top.checked_sub(1 + depth as usize),
        Opcode::CopyMatrix { depth, .. } => stack.top.checked_sub(1 + depth as usize),
        _ => None,
    }
}

fn trace_inputs(
    out: &mut dyn fmt::Write,
    program: &Program,
    pc: usize,
    op: &Opcode,
    stack: &Stack,
    matrices: &[MatrixStorage],
) -> fmt::Result {
    let Some(sig) = program.signature(pc) else {
        return Ok(());
    };
    write!(out, "{} - {} - {} :: ", sig.line, stack.top, pc)?;
    program.describe(pc, op, out)?;
    write!(out, " (")?;
    let first = match in_place_slot(op, stack) {
        Some(slot) => Some(slot),
        None if matches!(op, Opcode::Cast { .. } | Opcode::CopyMatrix { .. }) => None,
        None => stack.top.checked_sub(sig.inputs.len()),
    };
    if let Some(first) = first {
        for (i, ty) in sig.inputs.iter().enumerate() {
            if i > 0 {
                write!(out, ",")?;
            }
            if let Some(word) = stack.data.get(first + i) {
                write_slot(out, *ty, *word, matrices)?;
            }
        }
    }
    write!(out, ")")
}

fn trace_output(
    out: &mut dyn fmt::Write,
    program: &Program,
    pc: usize,
    op: &Opcode,
    stack: &Stack,
    matrices: &[MatrixStorage],
    failed: bool,
) -> fmt::Result {
    write!(out, " => (")?;
    let output = program.signature(pc).and_then(|sig| sig.output);
    if let (Some(ty), false) = (output, failed) {
        let slot = in_place_slot(op, stack).or_else(|| stack.top.checked_sub(1));
        if let Some(word) = slot.and_then(|slot| stack.data.get(slot)) {
            write_slot(out, ty, *word, matrices)?;
        }
    }
    write!(out, ")")?;
    if failed {
        write!(out, " <ERROR>")?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, compile};
    use crate::memory::{ExternalBinding, SharedMemory};
    use crate::program::decompile;
    use crate::variable::discover_variables;
    use float_cmp::approx_eq;
    use ScalarKind::*;

    fn build(postfix: &str, types: &[(&str, Type)]) -> Vm {
        let mut vars = discover_variables(postfix).unwrap();
        for (name, ty) in types {
            vars.bind(name, *ty, None).unwrap();
        }
        Vm::new(compile(postfix, vars, &CompileOptions::default()).unwrap())
    }

    #[test]
    fn test_execute_arithmetic() {
        let mut vm = build(
            "READ a\nREAD b\nSUM\nCONST 2\nMUL\nWRITE c\n",
            &[("a", Type::Scalar(F64)), ("b", Type::Scalar(F64))],
        );
        vm.set_value("a", Value::F64(1.5)).unwrap();
        vm.set_value("b", Value::F64(2.0)).unwrap();
        for mode in [ExecutionMode::Fast, ExecutionMode::Safe] {
            vm.execute(mode, None).unwrap();
            assert_eq!(Value::F64(7.0), vm.value("c").unwrap());
        }
    }

    #[test]
    fn test_fast_wraps_safe_faults() {
        let mut vm = build(
            "READ a\nREAD b\nSUM\nWRITE c\n",
            &[("a", Type::Scalar(I8)), ("b", Type::Scalar(I8))],
        );
        vm.set_value("a", Value::I8(127)).unwrap();
        vm.set_value("b", Value::I8(1)).unwrap();

        vm.execute(ExecutionMode::Fast, None).unwrap();
        assert_eq!(Value::I8(-128), vm.value("c").unwrap());

        let err = vm.execute(ExecutionMode::Safe, None).unwrap_err();
        assert_eq!(ErrorKind::Runtime, err.kind);
        assert_eq!(ErrorCode::IntegerOverflow, err.code);
        assert_eq!(
            Some("instruction 2 (SUM): integer_overflow".to_owned()),
            err.get_details()
        );
    }

    #[test]
    fn test_division_by_zero() {
        let mut vm = build(
            "READ a\nREAD b\nDIV\nWRITE c\n",
            &[("a", Type::Scalar(I32)), ("b", Type::Scalar(I32))],
        );
        vm.set_value("a", Value::I32(7)).unwrap();
        vm.execute(ExecutionMode::Fast, None).unwrap();
        assert_eq!(Value::I32(0), vm.value("c").unwrap());
        let err = vm.execute(ExecutionMode::Safe, None).unwrap_err();
        assert_eq!(ErrorCode::DivideByZero, err.code);
    }

    #[test]
    fn test_write_casts() {
        let mut vm = build(
            "READ x\nCAST int8\nWRITE small\nREAD x\nCAST bool\nWRITE flag\n",
            &[("x", Type::Scalar(F64))],
        );
        vm.set_value("x", Value::F64(300.0)).unwrap();
        vm.execute(ExecutionMode::Fast, None).unwrap();
        assert_eq!(Value::I8(127), vm.value("small").unwrap());
        assert_eq!(Value::Bool(true), vm.value("flag").unwrap());

        let err = vm.execute(ExecutionMode::Safe, None).unwrap_err();
        assert_eq!(ErrorCode::OutOfRange, err.code);

        vm.set_value("x", Value::F64(-2.5)).unwrap();
        vm.execute(ExecutionMode::Safe, None).unwrap();
        assert_eq!(Value::I8(-2), vm.value("small").unwrap());
    }

    #[test]
    fn test_set_value_converts() {
        let mut vm = build("READ n\nWRITE m\n", &[("n", Type::Scalar(I8))]);
        vm.set_value("n", Value::F64(31.0)).unwrap();
        assert_eq!(Value::I8(31), vm.value("n").unwrap());

        let err = vm.set_value("n", Value::F64(1000.0)).unwrap_err();
        assert_eq!(ErrorKind::Variable, err.kind);
        assert_eq!(ErrorCode::OutOfRange, err.code);

        let err = vm.set_value("nope", Value::F64(1.0)).unwrap_err();
        assert_eq!(ErrorCode::UnknownVariable, err.code);
    }

    #[test]
    fn test_debug_trace() {
        let mut vm = build("READ a\nREAD b\nSUM\nWRITE c\n", &[
            ("a", Type::Scalar(F64)),
            ("b", Type::Scalar(F32)),
        ]);
        vm.set_value("a", Value::F64(1.5)).unwrap();
        vm.set_value("b", Value::F32(2.0)).unwrap();

        let mut trace = String::new();
        vm.execute(ExecutionMode::Debug, Some(&mut trace)).unwrap();
        let expected = "\
[line]-[stackPtr]-[codePtr]::[CODE] stack-in => stack-out
1 - 0 - 0 :: READ a () => ((float64)1.5)
2 - 1 - 1 :: READ b () => ((float32)2)
3 - 2 - 2 :: CAST float64 ((float32)2) => ((float64)2)
3 - 2 - 3 :: SUM ((float64)1.5,(float64)2) => ((float64)3.5)
4 - 1 - 4 :: WRITE c ((float64)3.5) => ()
0 - 5 :: END
";
        assert_eq!(expected, trace);

        let err = vm.execute(ExecutionMode::Debug, None).unwrap_err();
        assert_eq!(ErrorCode::MissingDebugSink, err.code);
    }

    #[test]
    fn test_debug_trace_marks_failure() {
        let mut vm = build(
            "READ a\nREAD b\nDIV\nWRITE c\n",
            &[("a", Type::Scalar(U8)), ("b", Type::Scalar(U8))],
        );
        let mut trace = String::new();
        let err = vm
            .execute(ExecutionMode::Debug, Some(&mut trace))
            .unwrap_err();
        assert_eq!(ErrorCode::DivideByZero, err.code);
        assert!(trace.contains("3 - 2 - 2 :: DIV ((uint8)0,(uint8)0) => () <ERROR>\n"));
        assert!(!trace.contains("END"));
    }

    #[test]
    fn test_external_memory() {
        let memory = SharedMemory::new(3);
        let postfix = "READ x\nCONST 2\nMUL\nWRITE y\n";
        let mut vars = discover_variables(postfix).unwrap();
        vars.bind("x", Type::Scalar(F64), Some(ExternalBinding::new(memory.clone(), 0)))
            .unwrap();
        vars.bind("y", Type::Scalar(F64), Some(ExternalBinding::new(memory.clone(), 2)))
            .unwrap();
        let mut vm = Vm::new(compile(postfix, vars, &CompileOptions::default()).unwrap());

        memory.store_f64(0, 21.0);
        vm.execute(ExecutionMode::Safe, None).unwrap();
        assert_eq!(Some(42.0), memory.load_f64(2));
        assert_eq!(Value::F64(42.0), vm.value("y").unwrap());

        vm.set_value("x", Value::F64(0.5)).unwrap();
        vm.execute(ExecutionMode::Fast, None).unwrap();
        assert_eq!(Some(1.0), memory.load_f64(2));
    }

    #[test]
    fn test_matrices() {
        let a = Type::matrix(F64, 2, 3);
        let b = Type::matrix(F64, 3, 2);
        let mut vm = build(
            "READ A\nREAD B\nMUL\nREAD k\nMUL\nWRITE C\nREAD A\nREAD A\nSUM\nWRITE D\n",
            &[("A", a), ("B", b), ("k", Type::Scalar(F64))],
        );
        vm.set_matrix("A", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        vm.set_matrix("B", &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        vm.set_value("k", Value::F64(0.5)).unwrap();
        vm.execute(ExecutionMode::Safe, None).unwrap();

        let c = vm.matrix("C").unwrap();
        let expected = [29.0, 32.0, 69.5, 77.0];
        for (x, y) in c.iter().zip(expected.iter()) {
            assert!(approx_eq!(f64, *x, *y), "{x} != {y}");
        }
        assert_eq!(vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0], vm.matrix("D").unwrap());

        let err = vm.set_matrix("A", &[1.0]).unwrap_err();
        assert_eq!(ErrorCode::MismatchedDimensions, err.code);
        let err = vm.matrix("k").unwrap_err();
        assert_eq!(ErrorCode::BadType, err.code);
    }

    #[test]
    fn test_matrix_write_keeps_earlier_reads() {
        let postfix = "READ X\nREAD A\nWRITE X\nWRITE Y\n";
        let m = Type::matrix(F64, 1, 2);
        let mut vm = build(postfix, &[("X", m), ("A", m)]);
        assert_eq!(postfix, decompile(vm.program(), false));

        for mode in [ExecutionMode::Fast, ExecutionMode::Safe] {
            vm.set_matrix("X", &[1.0, 2.0]).unwrap();
            vm.set_matrix("A", &[7.0, 8.0]).unwrap();
            vm.execute(mode, None).unwrap();
            assert_eq!(vec![7.0, 8.0], vm.matrix("X").unwrap(), "{mode}");
            assert_eq!(vec![1.0, 2.0], vm.matrix("Y").unwrap(), "{mode}");
        }

        // matches the scalar program
        let s = Type::Scalar(F64);
        let mut scalar = build(postfix, &[("X", s), ("A", s)]);
        scalar.set_value("X", Value::F64(1.0)).unwrap();
        scalar.set_value("A", Value::F64(7.0)).unwrap();
        scalar.execute(ExecutionMode::Safe, None).unwrap();
        assert_eq!(Value::F64(1.0), scalar.value("Y").unwrap());

        vm.set_matrix("X", &[1.0, 2.0]).unwrap();
        let mut trace = String::new();
        vm.execute(ExecutionMode::Debug, Some(&mut trace)).unwrap();
        assert!(
            trace.contains(
                "3 - 2 - 2 :: COPY ((float64[1][2])[1 2]) => ((float64[1][2])[1 2])\n"
            ),
            "{trace}"
        );
        assert_eq!(vec![1.0, 2.0], vm.matrix("Y").unwrap());
    }

    #[test]
    fn test_spelled_names_in_trace() {
        let mut vm = build(
            "READ a\nCAST float\nREAD a\nCAST float\nADD\nWRITE b\n",
            &[("a", Type::Scalar(F64))],
        );
        vm.set_value("a", Value::F64(0.5)).unwrap();
        let mut trace = String::new();
        vm.execute(ExecutionMode::Debug, Some(&mut trace)).unwrap();
        assert!(trace.contains("2 - 1 - 1 :: CAST float ((float64)0.5) => ((float32)0.5)\n"), "{trace}");
        assert!(trace.contains(":: ADD ((float32)0.5,(float32)0.5) => ((float32)1)\n"), "{trace}");
        assert_eq!(Value::F32(1.0), vm.value("b").unwrap());
    }

    #[test]
    fn test_vm_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Vm>();
        assert_send::<Program>();
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(Ok(ExecutionMode::Debug), "debug".parse::<ExecutionMode>().map_err(|e| e.code));
        assert!("slow".parse::<ExecutionMode>().is_err());
        assert_eq!("safe", ExecutionMode::Safe.to_string());
    }
}
