// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Memory the evaluator shares with its caller.
//!
//! A scalar bound to external memory occupies one 64-bit cell holding
//! its stack-word representation; a matrix occupies `rows * cols`
//! consecutive cells in row-major order. Cells are accessed with relaxed
//! atomics, so a producer thread can update inputs between executions
//! without locking.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::Result;
use crate::var_err;

/// A cloneable handle to a fixed array of 64-bit cells.
#[derive(Clone, Debug)]
pub struct SharedMemory {
    cells: Arc<[AtomicU64]>,
}

impl SharedMemory {
    pub fn new(len: usize) -> Self {
        SharedMemory {
            cells: (0..len).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns `None` when `index` is outside the memory.
    pub fn load(&self, index: usize) -> Option<u64> {
        self.cells.get(index).map(|c| c.load(Ordering::Relaxed))
    }

    /// Returns false when `index` is outside the memory.
    pub fn store(&self, index: usize, word: u64) -> bool {
        match self.cells.get(index) {
            Some(cell) => {
                cell.store(word, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn load_f64(&self, index: usize) -> Option<f64> {
        self.load(index).map(f64::from_bits)
    }

    pub fn store_f64(&self, index: usize, value: f64) -> bool {
        self.store(index, value.to_bits())
    }

    /// Whether `self` and `other` are handles to the same cells.
    pub fn same(&self, other: &SharedMemory) -> bool {
        Arc::ptr_eq(&self.cells, &other.cells)
    }
}

/// A variable's storage supplied by the caller: a cell range starting at
/// `offset`. The evaluator reads and writes it but never owns it.
#[derive(Clone, Debug)]
pub struct ExternalBinding {
    memory: SharedMemory,
    offset: usize,
}

impl ExternalBinding {
    pub fn new(memory: SharedMemory, offset: usize) -> Self {
        ExternalBinding { memory, offset }
    }

    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Checks that `cells` cells starting at the offset lie inside the
    /// memory, for a variable named `name`.
    pub(crate) fn check_len(&self, name: &str, cells: usize) -> Result<()> {
        let end = self.offset.checked_add(cells);
        match end {
            Some(end) if end <= self.memory.len() => Ok(()),
            _ => var_err!(
                ExternalMemoryTooSmall,
                format!(
                    "{name} needs cells {}..{} but the memory has {}",
                    self.offset,
                    self.offset.saturating_add(cells),
                    self.memory.len()
                )
            ),
        }
    }

    #[inline]
    pub(crate) fn get(&self, i: usize) -> u64 {
        self.memory.load(self.offset + i).unwrap_or(0)
    }

    #[inline]
    pub(crate) fn set(&self, i: usize, word: u64) {
        self.memory.store(self.offset + i, word);
    }
}

/// Backing storage for a matrix: owned by the program, or the caller's.
#[derive(Clone, Debug)]
pub(crate) enum MatrixStorage {
    Owned(Box<[u64]>),
    External(ExternalBinding),
}

impl MatrixStorage {
    pub(crate) fn owned(len: usize) -> Self {
        MatrixStorage::Owned(vec![0; len].into_boxed_slice())
    }

    #[inline]
    pub(crate) fn get(&self, i: usize) -> u64 {
        match self {
            MatrixStorage::Owned(cells) => cells.get(i).copied().unwrap_or(0),
            MatrixStorage::External(binding) => binding.get(i),
        }
    }

    #[inline]
    pub(crate) fn set(&mut self, i: usize, word: u64) {
        match self {
            MatrixStorage::Owned(cells) => {
                if let Some(cell) = cells.get_mut(i) {
                    *cell = word;
                }
            }
            MatrixStorage::External(binding) => binding.set(i, word),
        }
    }
}
