use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use skiff_exec::{instantiate, invoke_export, Executor, NoImports, Store, Value};

const LOOP_SUM: &str = r#"(module
  (func (export "sum") (param i32) (result i32)
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
      local.get 0
      i32.lt_s
      br_if $l)
    local.get $acc))"#;

fn bench_loop_sum(c: &mut Criterion) {
    let bytes = wat::parse_str(LOOP_SUM).unwrap();
    let module = Arc::new(skiff_wasm::parse(&bytes).unwrap());
    skiff_wasm::validate(&module).unwrap();

    let mut group = c.benchmark_group("dispatch_loop_sum");
    for &n in &[1_000i32, 10_000, 100_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut store = Store::new();
            let mut exec = Executor::new();
            let inst = instantiate(&mut exec, &mut store, module.clone(), &NoImports).unwrap();
            b.iter(|| {
                let out =
                    invoke_export(&mut exec, &mut store, inst, "sum", &[Value::I32(n)]).unwrap();
                black_box(out);
            })
        });
    }
    group.finish();
}

fn bench_call_entry(c: &mut Criterion) {
    let src = r#"(module
      (func $leaf (param i32) (result i32) local.get 0)
      (func (export "chain") (param i32) (result i32)
        (local $i i32)
        (loop $l
          local.get 0
          call $leaf
          drop
          local.get $i
          i32.const 1
          i32.add
          local.tee $i
          local.get 0
          i32.lt_s
          br_if $l)
        local.get $i))"#;
    let bytes = wat::parse_str(src).unwrap();
    let module = Arc::new(skiff_wasm::parse(&bytes).unwrap());
    skiff_wasm::validate(&module).unwrap();

    c.bench_function("call_entry_chain_10k", |b| {
        let mut store = Store::new();
        let mut exec = Executor::new();
        let inst = instantiate(&mut exec, &mut store, module.clone(), &NoImports).unwrap();
        b.iter(|| {
            let out =
                invoke_export(&mut exec, &mut store, inst, "chain", &[Value::I32(10_000)]).unwrap();
            black_box(out);
        })
    });
}

criterion_group!(benches, bench_loop_sum, bench_call_entry);
criterion_main!(benches);
