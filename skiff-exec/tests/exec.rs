//! End-to-end execution tests: parse a text module, instantiate it, and run
//! exported functions through the interpreter.

use std::sync::Arc;

use skiff_exec::{
    host_fn, instantiate, invoke_export, Executor, HostFunc, ImportResolver, InstanceHandle,
    MemoryInstance, NoImports, Statistics, Store, Trap, Value,
};
use skiff_wasm::model::{FuncType, GlobalType, Limits, MemoryType, TableType};

fn setup(src: &str) -> (Executor, Store, InstanceHandle) {
    setup_with(src, Executor::new(), &NoImports)
}

fn setup_with(
    src: &str,
    mut exec: Executor,
    resolver: &impl ImportResolver,
) -> (Executor, Store, InstanceHandle) {
    let bytes = wat::parse_str(src).unwrap();
    let module = skiff_wasm::parse(&bytes).unwrap();
    skiff_wasm::validate(&module).unwrap();
    let mut store = Store::new();
    let handle = instantiate(&mut exec, &mut store, Arc::new(module), resolver).unwrap();
    (exec, store, handle)
}

#[test]
fn identity() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func (export "id") (param i32) (result i32)
               local.get 0))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "id", &[Value::I32(42)]).unwrap();
    assert_eq!(out, vec![Value::I32(42)]);
    assert_eq!(exec.value_stack_depth(), 0);
    assert_eq!(exec.frame_depth(), 0);
}

#[test]
fn loop_sum() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func (export "sum") (result i32)
               (local $acc i32) (local $i i32)
               (loop $l
                 local.get $acc
                 local.get $i
                 i32.add
                 local.set $acc
                 local.get $i
                 i32.const 1
                 i32.add
                 local.tee $i
                 i32.const 10
                 i32.lt_s
                 br_if $l)
               local.get $acc))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "sum", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(45)]);
    assert_eq!(exec.value_stack_depth(), 0);
}

#[test]
fn loop_with_parameter() {
    // The loop label transports its parameter on every back edge.
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func (export "count10") (result i32) (local i32)
               i32.const 0
               (loop $l (param i32) (result i32)
                 i32.const 1
                 i32.add
                 local.tee 0
                 local.get 0
                 i32.const 10
                 i32.lt_s
                 br_if $l)))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "count10", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(10)]);
}

#[test]
fn indirect_call_type_mismatch() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (type $take (func (param i32)))
             (table 1 funcref)
             (elem (i32.const 0) $give)
             (func $give (result i32) i32.const 1)
             (func (export "bad")
               i32.const 7
               i32.const 0
               call_indirect (type $take)))"#,
    );
    let err = invoke_export(&mut exec, &mut store, inst, "bad", &[]).unwrap_err();
    assert_eq!(err, Trap::IndirectCallTypeMismatch);
    assert_eq!(exec.value_stack_depth(), 0);
}

#[test]
fn indirect_call_success_and_slot_errors() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (type $give (func (result i32)))
             (table 2 funcref)
             (elem (i32.const 0) $nine)
             (func $nine (result i32) i32.const 9)
             (func (export "call") (param i32) (result i32)
               local.get 0
               call_indirect (type $give)))"#,
    );
    let ok = invoke_export(&mut exec, &mut store, inst, "call", &[Value::I32(0)]).unwrap();
    assert_eq!(ok, vec![Value::I32(9)]);

    // Slot 1 holds a null reference.
    let null = invoke_export(&mut exec, &mut store, inst, "call", &[Value::I32(1)]).unwrap_err();
    assert_eq!(null, Trap::UninitializedElement);

    // Index 2 is past the table.
    let oob = invoke_export(&mut exec, &mut store, inst, "call", &[Value::I32(2)]).unwrap_err();
    assert_eq!(oob, Trap::UndefinedElement);
}

#[test]
fn out_of_bounds_load_then_recovery() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (memory 0)
             (func (export "oob") (result i32)
               i32.const 0
               i32.load)
             (func (export "ok") (result i32)
               i32.const 5))"#,
    );
    let err = invoke_export(&mut exec, &mut store, inst, "oob", &[]).unwrap_err();
    assert_eq!(err, Trap::MemoryOutOfBounds);
    assert_eq!(exec.value_stack_depth(), 0);
    assert_eq!(exec.frame_depth(), 0);

    // The trap preserved the store; a different export still runs.
    let out = invoke_export(&mut exec, &mut store, inst, "ok", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(5)]);
}

struct OneHost {
    f: std::sync::Arc<dyn HostFunc>,
}

impl ImportResolver for OneHost {
    fn resolve_func(
        &self,
        _: &str,
        _: &str,
        _: &FuncType,
    ) -> Option<std::sync::Arc<dyn HostFunc>> {
        Some(self.f.clone())
    }
    fn resolve_table(&self, _: &str, _: &str, _: &TableType) -> Option<usize> {
        None
    }
    fn resolve_memory(&self, _: &str, _: &str, _: &MemoryType) -> Option<usize> {
        None
    }
    fn resolve_global(&self, _: &str, _: &str, _: &GlobalType) -> Option<usize> {
        None
    }
}

#[test]
fn host_cost_exceeded() {
    let resolver = OneHost {
        f: host_fn(11, |_, _, _| Ok(())),
    };
    let exec = Executor::new().with_statistics(Statistics::with_cost_limit(10));
    let (mut exec, mut store, inst) = setup_with(
        r#"(module
             (import "env" "tick" (func $tick))
             (func (export "go") call $tick))"#,
        exec,
        &resolver,
    );
    let err = invoke_export(&mut exec, &mut store, inst, "go", &[]).unwrap_err();
    assert_eq!(err, Trap::CostLimitExceeded);
    // The gate fired before the host timer ever started.
    assert_eq!(exec.statistics().unwrap().host_starts(), 0);
    assert_eq!(exec.value_stack_depth(), 0);
}

#[test]
fn host_cost_within_limit() {
    let resolver = OneHost {
        f: host_fn(11, |_, _, rets| {
            rets[0] = Value::I32(30);
            Ok(())
        }),
    };
    let exec = Executor::new().with_statistics(Statistics::with_cost_limit(1000));
    let (mut exec, mut store, inst) = setup_with(
        r#"(module
             (import "env" "thirty" (func $thirty (result i32)))
             (func (export "go") (result i32)
               call $thirty
               i32.const 3
               i32.add))"#,
        exec,
        &resolver,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "go", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(33)]);
    let stats = exec.statistics().unwrap();
    assert_eq!(stats.host_starts(), 1);
    assert!(stats.cost() > 11);
}

#[test]
fn host_sees_module_memory() {
    let resolver = OneHost {
        f: host_fn(0, |mem, _, _| {
            mem.ok_or(Trap::ExecutionFailed)?
                .store_u8(0, 42)
                .map_err(|_| Trap::MemoryOutOfBounds)
        }),
    };
    let (mut exec, mut store, inst) = setup_with(
        r#"(module
             (import "env" "poke" (func $poke))
             (memory 1)
             (func (export "go") (result i32)
               call $poke
               i32.const 0
               i32.load8_u))"#,
        Executor::new(),
        &resolver,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "go", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(42)]);
}

#[test]
fn host_failure_propagates() {
    let resolver = OneHost {
        f: host_fn(0, |_, _, _| Err(Trap::ExecutionFailed)),
    };
    let (mut exec, mut store, inst) = setup_with(
        r#"(module
             (import "env" "fail" (func $fail))
             (func (export "go") call $fail))"#,
        Executor::new(),
        &resolver,
    );
    let err = invoke_export(&mut exec, &mut store, inst, "go", &[]).unwrap_err();
    assert_eq!(err, Trap::ExecutionFailed);
}

#[test]
fn tail_call_returns_callee_result() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func $b (result i32) i32.const 7)
             (func (export "a") (result i32) return_call $b))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "a", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(7)]);
    assert_eq!(exec.value_stack_depth(), 0);
}

#[test]
fn tail_call_does_not_grow_the_frame_stack() {
    // 100k self tail calls: far past the frame ceiling unless each call
    // replaces the caller's frame in situ.
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func $down (export "down") (param i32) (result i32)
               local.get 0
               i32.eqz
               if (result i32)
                 i32.const 1
               else
                 local.get 0
                 i32.const 1
                 i32.sub
                 return_call $down
               end))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "down", &[Value::I32(100_000)]).unwrap();
    assert_eq!(out, vec![Value::I32(1)]);
}

#[test]
fn plain_recursion_hits_the_frame_ceiling() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func $down (export "down") (param i32) (result i32)
               local.get 0
               i32.eqz
               if (result i32)
                 i32.const 1
               else
                 local.get 0
                 i32.const 1
                 i32.sub
                 call $down
               end))"#,
    );
    let err =
        invoke_export(&mut exec, &mut store, inst, "down", &[Value::I32(100_000)]).unwrap_err();
    assert_eq!(err, Trap::StackOverflow);
    // The executor recovered and shallow recursion still works.
    let out = invoke_export(&mut exec, &mut store, inst, "down", &[Value::I32(5)]).unwrap();
    assert_eq!(out, vec![Value::I32(1)]);
}

#[test]
fn br_table_dispatch() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func (export "classify") (param i32) (result i32)
               block $b2
                 block $b1
                   block $b0
                     local.get 0
                     br_table $b0 $b1 $b2
                   end
                   i32.const 100
                   return
                 end
                 i32.const 101
                 return
               end
               i32.const 102))"#,
    );
    for (input, expect) in [(0, 100), (1, 101), (2, 102), (99, 102)] {
        let out =
            invoke_export(&mut exec, &mut store, inst, "classify", &[Value::I32(input)]).unwrap();
        assert_eq!(out, vec![Value::I32(expect)], "input {input}");
    }
}

#[test]
fn if_else_branches() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func (export "pick") (param i32) (result i32)
               local.get 0
               if (result i32)
                 i32.const 1
               else
                 i32.const 2
               end))"#,
    );
    let t = invoke_export(&mut exec, &mut store, inst, "pick", &[Value::I32(5)]).unwrap();
    assert_eq!(t, vec![Value::I32(1)]);
    let f = invoke_export(&mut exec, &mut store, inst, "pick", &[Value::I32(0)]).unwrap();
    assert_eq!(f, vec![Value::I32(2)]);
}

#[test]
fn branch_past_outermost_label_returns() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func (export "early") (result i32)
               block
                 i32.const 41
                 drop
                 i32.const 7
                 br 1
               end
               i32.const 0))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "early", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(7)]);
}

#[test]
fn globals_persist_across_invocations() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (global $g (mut i32) (i32.const 10))
             (func (export "bump") (result i32)
               global.get $g
               i32.const 1
               i32.add
               global.set $g
               global.get $g))"#,
    );
    let a = invoke_export(&mut exec, &mut store, inst, "bump", &[]).unwrap();
    assert_eq!(a, vec![Value::I32(11)]);
    let b = invoke_export(&mut exec, &mut store, inst, "bump", &[]).unwrap();
    assert_eq!(b, vec![Value::I32(12)]);
}

#[test]
fn start_function_runs_at_instantiation() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (global $g (mut i32) (i32.const 0))
             (func $init
               i32.const 5
               global.set $g)
             (start $init)
             (func (export "get") (result i32)
               global.get $g))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "get", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(5)]);
}

#[test]
fn active_data_segment_applied() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (memory 1)
             (data (i32.const 8) "hi")
             (func (export "h") (result i32)
               i32.const 8
               i32.load8_u))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "h", &[]).unwrap();
    assert_eq!(out, vec![Value::I32('h' as i32)]);
}

#[test]
fn memory_init_and_data_drop() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (memory 1)
             (data $d "abc")
             (func (export "go") (result i32)
               i32.const 10
               i32.const 0
               i32.const 3
               memory.init $d
               i32.const 11
               i32.load8_u)
             (func (export "after_drop")
               data.drop $d
               i32.const 0
               i32.const 0
               i32.const 1
               memory.init $d))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "go", &[]).unwrap();
    assert_eq!(out, vec![Value::I32('b' as i32)]);

    // Dropped segment has length zero: any nonzero init traps.
    let err = invoke_export(&mut exec, &mut store, inst, "after_drop", &[]).unwrap_err();
    assert_eq!(err, Trap::MemoryOutOfBounds);
}

#[test]
fn memory_init_out_of_bounds_is_all_or_nothing() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (memory 1)
             (data $d "abc")
             (func (export "bad")
               i32.const 65534
               i32.const 0
               i32.const 3
               memory.init $d)
             (func (export "peek") (result i32)
               i32.const 65534
               i32.load8_u))"#,
    );
    let err = invoke_export(&mut exec, &mut store, inst, "bad", &[]).unwrap_err();
    assert_eq!(err, Trap::MemoryOutOfBounds);
    let out = invoke_export(&mut exec, &mut store, inst, "peek", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(0)]);
}

#[test]
fn table_init_and_elem_drop() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (type $give (func (result i32)))
             (table 4 funcref)
             (func $nine (result i32) i32.const 9)
             (elem $e func $nine)
             (func (export "use") (result i32)
               i32.const 0
               i32.const 0
               i32.const 1
               table.init $e
               i32.const 0
               call_indirect (type $give))
             (func (export "after_drop")
               elem.drop $e
               i32.const 0
               i32.const 0
               i32.const 1
               table.init $e))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "use", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(9)]);

    let err = invoke_export(&mut exec, &mut store, inst, "after_drop", &[]).unwrap_err();
    assert_eq!(err, Trap::TableOutOfBounds);
}

#[test]
fn memory_grow_and_size() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (memory 1 3)
             (func (export "grow") (param i32) (result i32)
               local.get 0
               memory.grow)
             (func (export "size") (result i32)
               memory.size))"#,
    );
    let g = invoke_export(&mut exec, &mut store, inst, "grow", &[Value::I32(1)]).unwrap();
    assert_eq!(g, vec![Value::I32(1)]);
    let s = invoke_export(&mut exec, &mut store, inst, "size", &[]).unwrap();
    assert_eq!(s, vec![Value::I32(2)]);
    // Past the declared max: grow reports -1.
    let fail = invoke_export(&mut exec, &mut store, inst, "grow", &[Value::I32(5)]).unwrap();
    assert_eq!(fail, vec![Value::I32(-1)]);
}

#[test]
fn division_traps() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func (export "div") (param i32 i32) (result i32)
               local.get 0
               local.get 1
               i32.div_s))"#,
    );
    let ok = invoke_export(
        &mut exec,
        &mut store,
        inst,
        "div",
        &[Value::I32(7), Value::I32(2)],
    )
    .unwrap();
    assert_eq!(ok, vec![Value::I32(3)]);

    let zero = invoke_export(
        &mut exec,
        &mut store,
        inst,
        "div",
        &[Value::I32(7), Value::I32(0)],
    )
    .unwrap_err();
    assert_eq!(zero, Trap::DivideByZero);

    let ovf = invoke_export(
        &mut exec,
        &mut store,
        inst,
        "div",
        &[Value::I32(i32::MIN), Value::I32(-1)],
    )
    .unwrap_err();
    assert_eq!(ovf, Trap::IntegerOverflow);
}

#[test]
fn trunc_traps() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func (export "t") (param f32) (result i32)
               local.get 0
               i32.trunc_f32_s))"#,
    );
    let ok = invoke_export(
        &mut exec,
        &mut store,
        inst,
        "t",
        &[Value::from_f32(42.7)],
    )
    .unwrap();
    assert_eq!(ok, vec![Value::I32(42)]);

    let nan = invoke_export(
        &mut exec,
        &mut store,
        inst,
        "t",
        &[Value::from_f32(f32::NAN)],
    )
    .unwrap_err();
    assert_eq!(nan, Trap::InvalidConversionToInteger);

    let ovf = invoke_export(
        &mut exec,
        &mut store,
        inst,
        "t",
        &[Value::from_f32(3.0e9)],
    )
    .unwrap_err();
    assert_eq!(ovf, Trap::IntegerOverflow);
}

#[test]
fn float_arithmetic() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func (export "hyp") (param f64 f64) (result f64)
               local.get 0
               local.get 0
               f64.mul
               local.get 1
               local.get 1
               f64.mul
               f64.add
               f64.sqrt))"#,
    );
    let out = invoke_export(
        &mut exec,
        &mut store,
        inst,
        "hyp",
        &[Value::from_f64(3.0), Value::from_f64(4.0)],
    )
    .unwrap();
    assert_eq!(out, vec![Value::from_f64(5.0)]);
}

#[test]
fn unreachable_traps() {
    let (mut exec, mut store, inst) = setup(
        r#"(module (func (export "boom") unreachable))"#,
    );
    let err = invoke_export(&mut exec, &mut store, inst, "boom", &[]).unwrap_err();
    assert_eq!(err, Trap::Unreachable);
}

#[test]
fn argument_signature_checked() {
    let (mut exec, mut store, inst) = setup(
        r#"(module (func (export "id") (param i32) (result i32) local.get 0))"#,
    );
    let wrong_count = invoke_export(&mut exec, &mut store, inst, "id", &[]).unwrap_err();
    assert_eq!(wrong_count, Trap::TypeMismatch);
    let wrong_type =
        invoke_export(&mut exec, &mut store, inst, "id", &[Value::I64(1)]).unwrap_err();
    assert_eq!(wrong_type, Trap::TypeMismatch);
    let missing = invoke_export(&mut exec, &mut store, inst, "nope", &[]).unwrap_err();
    assert_eq!(missing, Trap::FunctionNotFound);
}

#[test]
fn imported_memory_is_shared() {
    struct MemImport {
        addr: usize,
    }
    impl ImportResolver for MemImport {
        fn resolve_func(
            &self,
            _: &str,
            _: &str,
            _: &FuncType,
        ) -> Option<std::sync::Arc<dyn HostFunc>> {
            None
        }
        fn resolve_table(&self, _: &str, _: &str, _: &TableType) -> Option<usize> {
            None
        }
        fn resolve_memory(&self, _: &str, _: &str, _: &MemoryType) -> Option<usize> {
            Some(self.addr)
        }
        fn resolve_global(&self, _: &str, _: &str, _: &GlobalType) -> Option<usize> {
            None
        }
    }

    let bytes = wat::parse_str(
        r#"(module
             (import "env" "mem" (memory 1))
             (func (export "peek") (param i32) (result i32)
               local.get 0
               i32.load8_u))"#,
    )
    .unwrap();
    let module = skiff_wasm::parse(&bytes).unwrap();
    skiff_wasm::validate(&module).unwrap();

    let mut store = Store::new();
    let addr = store.alloc_memory(MemoryInstance::new(&MemoryType {
        limits: Limits { min: 1, max: None },
    }));
    store.get_memory_mut(addr).unwrap().store_u8(3, 77).unwrap();

    let mut exec = Executor::new();
    let inst = instantiate(&mut exec, &mut store, Arc::new(module), &MemImport { addr }).unwrap();
    let out = invoke_export(&mut exec, &mut store, inst, "peek", &[Value::I32(3)]).unwrap();
    assert_eq!(out, vec![Value::I32(77)]);
}

#[test]
fn interrupt_terminates_execution() {
    let exec = Executor::new();
    let interrupt = exec.interrupt_handle();
    let resolver = OneHost {
        f: host_fn(0, move |_, _, _| {
            interrupt.terminate();
            Ok(())
        }),
    };
    let (mut exec, mut store, inst) = setup_with(
        r#"(module
             (import "env" "kill" (func $kill))
             (func (export "go") (result i32)
               call $kill
               i32.const 5))"#,
        exec,
        &resolver,
    );
    let err = invoke_export(&mut exec, &mut store, inst, "go", &[]).unwrap_err();
    assert_eq!(err, Trap::Terminated);

    // invoke re-arms the handle at entry, so the executor is not stuck; the
    // host fires the interrupt again and the result is the same.
    let again = invoke_export(&mut exec, &mut store, inst, "go", &[]);
    assert_eq!(again.unwrap_err(), Trap::Terminated);
}

#[test]
fn v128_lane_arithmetic() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func (export "vadd") (result v128)
               v128.const i32x4 1 2 3 4
               v128.const i32x4 5 6 7 8
               i32x4.add))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "vadd", &[]).unwrap();
    let mut expect = [0u8; 16];
    for (lane, v) in [6u32, 8, 10, 12].iter().enumerate() {
        expect[lane * 4..lane * 4 + 4].copy_from_slice(&v.to_le_bytes());
    }
    assert_eq!(out, vec![Value::V128(u128::from_le_bytes(expect))]);
}

#[test]
fn ref_func_and_table_ops() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (type $give (func (result i32)))
             (table 2 funcref)
             (func $nine (result i32) i32.const 9)
             (elem declare func $nine)
             (func (export "install_and_call") (result i32)
               i32.const 0
               ref.func $nine
               table.set 0
               i32.const 0
               call_indirect (type $give))
             (func (export "slot_is_null") (param i32) (result i32)
               local.get 0
               table.get 0
               ref.is_null))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "install_and_call", &[]).unwrap();
    assert_eq!(out, vec![Value::I32(9)]);
    let filled =
        invoke_export(&mut exec, &mut store, inst, "slot_is_null", &[Value::I32(0)]).unwrap();
    assert_eq!(filled, vec![Value::I32(0)]);
    let empty =
        invoke_export(&mut exec, &mut store, inst, "slot_is_null", &[Value::I32(1)]).unwrap();
    assert_eq!(empty, vec![Value::I32(1)]);
}

#[test]
fn sign_extension_ops() {
    let (mut exec, mut store, inst) = setup(
        r#"(module
             (func (export "ext8") (param i32) (result i32)
               local.get 0
               i32.extend8_s))"#,
    );
    let out = invoke_export(&mut exec, &mut store, inst, "ext8", &[Value::I32(0xFF)]).unwrap();
    assert_eq!(out, vec![Value::I32(-1)]);
}
