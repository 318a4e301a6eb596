//! The ahead-of-time compiled call path: opaque body symbols invoked through
//! type trampolines inside the fault guard.

use std::sync::Arc;

use skiff_exec::vm::fault;
use skiff_exec::{
    instantiate, invoke_export, ExecutionContext, Executor, FuncInstance, NoImports, Store, Symbol,
    Trap, Value,
};
use skiff_wasm::model::{FuncType, ValType};

type BodyFn = fn(&mut ExecutionContext, &[Value], &mut [Value]);

/// Test trampoline for bodies of shape `fn(ctx, args, rets)`.
fn trampoline(ctx: &mut ExecutionContext, sym: Symbol, args: &[Value], rets: &mut [Value]) {
    let body: BodyFn = unsafe { std::mem::transmute(sym.as_ptr()) };
    body(ctx, args, rets);
}

fn symbol(f: BodyFn) -> Symbol {
    Symbol::new(f as *const ())
}

fn i32_binary_type() -> FuncType {
    FuncType {
        params: vec![ValType::I32, ValType::I32],
        results: vec![ValType::I32],
    }
}

#[test]
fn compiled_function_returns_results() {
    fn add(_: &mut ExecutionContext, args: &[Value], rets: &mut [Value]) {
        rets[0] = Value::I32(args[0].as_i32().wrapping_add(args[1].as_i32()));
    }

    let mut store = Store::new();
    let mut exec = Executor::new();
    let addr = store.alloc_func(FuncInstance::compiled(
        i32_binary_type(),
        None,
        symbol(add),
        trampoline,
    ));
    let out = exec
        .invoke(
            &mut store,
            addr,
            &[Value::I32(2), Value::I32(3)],
            &[ValType::I32, ValType::I32],
        )
        .unwrap();
    assert_eq!(out, vec![Value::I32(5)]);
    assert_eq!(exec.value_stack_depth(), 0);
}

#[test]
fn compiled_fault_surfaces_as_trap() {
    fn faulting(_: &mut ExecutionContext, _: &[Value], _: &mut [Value]) {
        fault::raise(Trap::MemoryOutOfBounds);
    }

    let mut store = Store::new();
    let mut exec = Executor::new();
    let ty = FuncType {
        params: vec![],
        results: vec![ValType::I32],
    };
    let addr = store.alloc_func(FuncInstance::compiled(ty, None, symbol(faulting), trampoline));

    let err = exec.invoke(&mut store, addr, &[], &[]).unwrap_err();
    assert_eq!(err, Trap::MemoryOutOfBounds);
    // No results were pushed; the executor is clean for the next call.
    assert_eq!(exec.value_stack_depth(), 0);
    assert_eq!(exec.frame_depth(), 0);
}

#[test]
fn compiled_termination_is_silent_but_fatal() {
    fn terminated(_: &mut ExecutionContext, _: &[Value], _: &mut [Value]) {
        fault::raise(Trap::Terminated);
    }

    let mut store = Store::new();
    let mut exec = Executor::new();
    let ty = FuncType::default();
    let addr = store.alloc_func(FuncInstance::compiled(
        ty,
        None,
        symbol(terminated),
        trampoline,
    ));
    let err = exec.invoke(&mut store, addr, &[], &[]).unwrap_err();
    assert_eq!(err, Trap::Terminated);
}

#[test]
fn execution_context_carries_memory_and_globals() {
    fn read_ctx(ctx: &mut ExecutionContext, _: &[Value], rets: &mut [Value]) {
        assert!(!ctx.memory.is_null());
        assert_eq!(ctx.globals_len, 1);
        let mem_byte = unsafe { *ctx.memory };
        let global = unsafe { (**ctx.globals).as_i32() };
        rets[0] = Value::I32(mem_byte as i32 + global);
    }

    let bytes = wat::parse_str(
        r#"(module
             (memory 1)
             (data (i32.const 0) "\2a")
             (global (mut i32) (i32.const 3)))"#,
    )
    .unwrap();
    let module = skiff_wasm::parse(&bytes).unwrap();
    skiff_wasm::validate(&module).unwrap();

    let mut store = Store::new();
    let mut exec = Executor::new();
    let inst = instantiate(&mut exec, &mut store, Arc::new(module), &NoImports).unwrap();

    let ty = FuncType {
        params: vec![],
        results: vec![ValType::I32],
    };
    let addr = store.alloc_func(FuncInstance::compiled(
        ty,
        Some(inst),
        symbol(read_ctx),
        trampoline,
    ));
    let out = exec.invoke(&mut store, addr, &[], &[]).unwrap();
    assert_eq!(out, vec![Value::I32(42 + 3)]);
}

#[test]
fn bytecode_calls_compiled_through_a_table() {
    fn seven(_: &mut ExecutionContext, _: &[Value], rets: &mut [Value]) {
        rets[0] = Value::I32(7);
    }

    let bytes = wat::parse_str(
        r#"(module
             (type $give (func (result i32)))
             (table (export "tab") 1 funcref)
             (func (export "call0") (result i32)
               i32.const 0
               call_indirect (type $give)
               i32.const 1
               i32.add))"#,
    )
    .unwrap();
    let module = skiff_wasm::parse(&bytes).unwrap();
    skiff_wasm::validate(&module).unwrap();

    let mut store = Store::new();
    let mut exec = Executor::new();
    let inst = instantiate(&mut exec, &mut store, Arc::new(module), &NoImports).unwrap();

    let ty = FuncType {
        params: vec![],
        results: vec![ValType::I32],
    };
    let compiled = store.alloc_func(FuncInstance::compiled(ty, None, symbol(seven), trampoline));

    let tab_addr = match store
        .get_module(inst.0)
        .unwrap()
        .resolve_export("tab")
        .unwrap()
    {
        skiff_exec::RuntimeExportDesc::Table(a) => a,
        other => panic!("unexpected export: {other:?}"),
    };
    store
        .get_table_mut(tab_addr)
        .unwrap()
        .set(0, Some(compiled))
        .unwrap();

    // The compiled callee returns into the middle of the bytecode body.
    let out = invoke_export(&mut exec, &mut store, inst, "call0", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(8)]);
}
