// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Verifies that fast and safe execution perform zero heap allocations,
//! for scalar code, matrix code and external bindings alike.
//!
//! Uses a custom global allocator that counts allocations per-thread.
//! Since integration tests compile as their own binary, the
//! #[global_allocator] here does not affect other test binaries.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use exprvm_engine::{
    CompileOptions, ExecutionMode, ExternalBinding, ScalarKind, SharedMemory, Type, Value, Vm,
    compile, discover_variables, translate,
};

// ---------------------------------------------------------------------------
// Per-thread counting allocator
// ---------------------------------------------------------------------------

thread_local! {
    static TRACKING: Cell<bool> = const { Cell::new(false) };
    static ALLOC_COUNT: Cell<usize> = const { Cell::new(0) };
}

struct CountingAllocator;

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        TRACKING.with(|t| {
            if t.get() {
                ALLOC_COUNT.with(|c| c.set(c.get() + 1));
            }
        });
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static A: CountingAllocator = CountingAllocator;

fn start_tracking() {
    ALLOC_COUNT.with(|c| c.set(0));
    TRACKING.with(|t| t.set(true));
}

fn stop_tracking() -> usize {
    TRACKING.with(|t| t.set(false));
    ALLOC_COUNT.with(|c| c.get())
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn build(infix: &str, types: &[(&str, Type, Option<ExternalBinding>)]) -> Vm {
    let postfix = translate(infix).unwrap();
    let mut vars = discover_variables(&postfix).unwrap();
    for (name, ty, external) in types {
        vars.bind(name, *ty, external.clone()).unwrap();
    }
    Vm::new(compile(&postfix, vars, &CompileOptions::default()).unwrap())
}

fn count_allocations(vm: &mut Vm, mode: ExecutionMode) -> usize {
    // warm up outside the measured region
    vm.execute(mode, None).unwrap();

    start_tracking();
    for _ in 0..100 {
        vm.execute(mode, None).unwrap();
    }
    stop_tracking()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn scalar_execution_zero_allocations() {
    let f64_ty = Type::Scalar(ScalarKind::F64);
    let mut vm = build(
        "F = G*((m1*m2)/pow(d, 2)); n = (int8)F > 0;",
        &[
            ("G", f64_ty, None),
            ("m1", f64_ty, None),
            ("m2", f64_ty, None),
            ("d", f64_ty, None),
        ],
    );
    vm.set_value("G", Value::F64(6.674e-11)).unwrap();
    vm.set_value("m1", Value::F64(1.0)).unwrap();
    vm.set_value("m2", Value::F64(2.0)).unwrap();
    vm.set_value("d", Value::F64(0.5)).unwrap();

    for mode in [ExecutionMode::Fast, ExecutionMode::Safe] {
        let allocs = count_allocations(&mut vm, mode);
        assert_eq!(
            allocs, 0,
            "{mode} execution should perform zero heap allocations, got {allocs}"
        );
    }
}

#[test]
fn matrix_execution_zero_allocations() {
    let m = Type::matrix(ScalarKind::F64, 3, 3);
    let mut vm = build(
        "C = A * B - A * 2;",
        &[("A", m, None), ("B", m, None)],
    );
    vm.set_matrix("A", &[1.0; 9]).unwrap();
    vm.set_matrix("B", &[0.5; 9]).unwrap();

    for mode in [ExecutionMode::Fast, ExecutionMode::Safe] {
        let allocs = count_allocations(&mut vm, mode);
        assert_eq!(
            allocs, 0,
            "{mode} matrix execution should perform zero heap allocations, got {allocs}"
        );
    }
}

#[test]
fn external_execution_zero_allocations() {
    let memory = SharedMemory::new(2);
    let f64_ty = Type::Scalar(ScalarKind::F64);
    let mut vm = build(
        "y = sqrt(x) + 1;",
        &[
            ("x", f64_ty, Some(ExternalBinding::new(memory.clone(), 0))),
            ("y", f64_ty, Some(ExternalBinding::new(memory.clone(), 1))),
        ],
    );
    memory.store_f64(0, 16.0);

    for mode in [ExecutionMode::Fast, ExecutionMode::Safe] {
        let allocs = count_allocations(&mut vm, mode);
        assert_eq!(allocs, 0, "{mode}: got {allocs} allocations");
    }
    assert_eq!(Some(5.0), memory.load_f64(1));
}
