// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use tracing::debug;

use crate::bytecode::{BindingId, ByteOffset, MatrixId};
use crate::common::Result;
use crate::memory::ExternalBinding;
use crate::types::Type;
use crate::var_err;

/// Where a value lives once the compiler has allocated it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    /// byte offset into the constant pool
    Constant(ByteOffset),
    /// byte offset into the variable area
    Variable(ByteOffset),
    /// index into the program's external bindings
    External(BindingId),
    /// index into the program's matrix table
    Matrix(MatrixId),
}

#[derive(Clone, Debug)]
pub struct VariableInfo {
    name: String,
    ty: Type,
    pub(crate) location: Option<Location>,
    external: Option<ExternalBinding>,
}

impl VariableInfo {
    pub fn new(name: &str) -> Self {
        VariableInfo {
            name: name.to_owned(),
            ty: Type::Void,
            location: None,
            external: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn external(&self) -> Option<&ExternalBinding> {
        self.external.as_ref()
    }

    /// (rows, cols), (1, 1) for scalars.
    pub fn dimensions(&self) -> (u32, u32) {
        self.ty.dims()
    }

    /// Fixes the variable's type, and optionally binds it to caller-owned
    /// memory. A type can be bound exactly once.
    pub fn bind_type(&mut self, ty: Type, external: Option<ExternalBinding>) -> Result<()> {
        if !self.ty.is_void() {
            return var_err!(
                DuplicateTypeBinding,
                format!("{} is already {}", self.name, self.ty)
            );
        }
        if !ty.is_valid() {
            return var_err!(BadType, format!("{} cannot be {}", self.name, ty));
        }
        if let Some(ref binding) = external {
            binding.check_len(&self.name, ty.len())?;
        }
        self.ty = ty;
        self.external = external;
        Ok(())
    }

    /// Type inference on first write.
    pub(crate) fn infer_type(&mut self, ty: Type) -> Result<()> {
        debug!(name = %self.name, %ty, "inferred variable type");
        self.bind_type(ty, None)
    }
}

/// The variables a postfix program references, split by direction. A
/// name appears in at most one of the two lists.
#[derive(Clone, Debug, Default)]
pub struct Variables {
    pub(crate) inputs: Vec<VariableInfo>,
    pub(crate) outputs: Vec<VariableInfo>,
}

impl Variables {
    pub fn inputs(&self) -> &[VariableInfo] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[VariableInfo] {
        &self.outputs
    }

    /// Looks a name up in the outputs first, then the inputs.
    pub fn get(&self, name: &str) -> Option<&VariableInfo> {
        self.outputs
            .iter()
            .chain(self.inputs.iter())
            .find(|v| v.name == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut VariableInfo> {
        self.outputs
            .iter_mut()
            .chain(self.inputs.iter_mut())
            .find(|v| v.name == name)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut VariableInfo> {
        self.inputs.iter_mut().chain(self.outputs.iter_mut())
    }

    pub fn bind(&mut self, name: &str, ty: Type, external: Option<ExternalBinding>) -> Result<()> {
        match self.get_mut(name) {
            Some(var) => var.bind_type(ty, external),
            None => var_err!(UnknownVariable, name.to_owned()),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Scans postfix text for the identifiers it reads and writes. Names are
/// listed in order of first appearance; a name that is read before it is
/// first written is an output.
pub fn discover_variables(postfix: &str) -> Result<Variables> {
    let mut vars = Variables::default();

    for (i, line) in postfix.lines().enumerate() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("READ") => {
                if let Some(name) = tokens.next() {
                    if !vars.contains(name) {
                        vars.inputs.push(VariableInfo::new(name));
                    }
                }
            }
            Some("WRITE") => {
                let Some(name) = tokens.next() else {
                    return var_err!(MissingName, format!("line {}: WRITE", i + 1));
                };
                if vars.outputs.iter().any(|v| v.name == name) {
                    continue;
                }
                match vars.inputs.iter().position(|v| v.name == name) {
                    Some(pos) => {
                        let var = vars.inputs.remove(pos);
                        vars.outputs.push(var);
                    }
                    None => vars.outputs.push(VariableInfo::new(name)),
                }
            }
            _ => {}
        }
    }

    debug!(
        inputs = vars.inputs.len(),
        outputs = vars.outputs.len(),
        "discovered variables"
    );
    Ok(vars)
}
