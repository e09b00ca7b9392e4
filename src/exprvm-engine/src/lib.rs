// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Translates infix expressions into a line-oriented postfix form, and
//! compiles that postfix form into typed bytecode for a small stack VM.
//!
//! ```text
//! infix --translate--> postfix --discover_variables--> Variables
//!                              (bind types)
//!       postfix + Variables --compile--> Program --Vm::new--> Vm
//! ```

#![forbid(unsafe_code)]

pub mod common;
mod token;
mod translator;

mod bytecode;
mod compiler;
mod memory;
mod numeric;
mod operators;
mod postfix;
mod program;
mod types;
mod value;
mod variable;
mod vm;

pub use self::common::{EquationError, EquationResult, Error, ErrorCode, ErrorKind, Result};
pub use self::compiler::{CompileOptions, compile};
pub use self::memory::{ExternalBinding, SharedMemory};
pub use self::program::{Program, Sizes, decompile};
pub use self::translator::translate;
pub use self::types::{ScalarKind, Type};
pub use self::value::Value;
pub use self::variable::{Location, VariableInfo, Variables, discover_variables};
pub use self::vm::{ExecutionMode, Vm};
