//! skiff-exec: the WebAssembly execution engine.
//!
//! Takes validated [`skiff_wasm::Module`] IR, instantiates it into a
//! [`Store`], and runs exported functions on an [`Executor`] — a stack-based
//! interpreter with host, ahead-of-time compiled, and bytecode call paths.

pub mod error;
pub mod host;
pub mod runtime;
pub mod stats;
pub mod values;
pub mod vm;

use std::collections::HashMap;
use std::sync::Arc;

use skiff_wasm::binary::{cursor::Cursor, leb128};
use skiff_wasm::model::{
    DataMode, ElementMode, ExportDesc, Expr, ImportDesc, Module, ValType,
};

pub use error::{LinkError, Trap};
pub use host::{host_fn, HostFunc, ImportResolver, NoImports};
pub use runtime::{
    DataInstance, ElementInstance, FuncBody, FuncInstance, GlobalInstance, InstanceHandle,
    MemoryInstance, ModuleInstance, RuntimeExportDesc, Store, TableInstance,
};
pub use stats::Statistics;
pub use values::Value;
pub use vm::{Config, ExecutionContext, Executor, InterruptHandle, Symbol, Trampoline};

/// Evaluate a constant initializer expression: a numeric or reference
/// constant, or `global.get` of an imported immutable global.
fn eval_const_expr(
    expr: &Expr,
    store: &Store,
    globals: &[usize],
    funcs: &[usize],
) -> Result<Value, LinkError> {
    let mut cur = Cursor::new(&expr.body);
    let op = cur.read_u8().map_err(|_| LinkError::ConstExpr("empty"))?;
    let value = match op {
        0x41 => {
            let v = leb128::read_sleb_i32(&mut cur)
                .map_err(|_| LinkError::ConstExpr("bad i32.const"))?;
            Value::I32(v)
        }
        0x42 => {
            let v = leb128::read_sleb_i64(&mut cur)
                .map_err(|_| LinkError::ConstExpr("bad i64.const"))?;
            Value::I64(v)
        }
        0x43 => {
            let bits = cur
                .read_u32_le()
                .map_err(|_| LinkError::ConstExpr("bad f32.const"))?;
            Value::F32(bits)
        }
        0x44 => {
            let bits = cur
                .read_u64_le()
                .map_err(|_| LinkError::ConstExpr("bad f64.const"))?;
            Value::F64(bits)
        }
        0x23 => {
            // global.get: only imported immutable globals may appear.
            let idx = leb128::read_uleb_u32(&mut cur)
                .map_err(|_| LinkError::ConstExpr("bad global.get index"))?;
            let addr = *globals
                .get(idx as usize)
                .ok_or(LinkError::BadIndex("global.get in initializer"))?;
            let g = store
                .get_global(addr)
                .ok_or(LinkError::BadIndex("global address"))?;
            if g.ty().mutable {
                return Err(LinkError::ConstExpr("global.get of mutable global"));
            }
            g.get()
        }
        0xD0 => {
            // ref.null rt
            let rt = cur
                .read_u8()
                .map_err(|_| LinkError::ConstExpr("bad ref.null"))?;
            match rt {
                0x70 => Value::FuncRef(None),
                0x6F => Value::ExternRef(None),
                _ => return Err(LinkError::ConstExpr("bad ref.null type")),
            }
        }
        0xD2 => {
            let idx = leb128::read_uleb_u32(&mut cur)
                .map_err(|_| LinkError::ConstExpr("bad ref.func index"))?;
            let addr = *funcs
                .get(idx as usize)
                .ok_or(LinkError::BadIndex("ref.func in initializer"))?;
            Value::FuncRef(Some(addr))
        }
        0xFD => {
            let sub = leb128::read_uleb_u32(&mut cur)
                .map_err(|_| LinkError::ConstExpr("bad v128 opcode"))?;
            if sub != 12 {
                return Err(LinkError::ConstExpr("unsupported v128 initializer"));
            }
            let v = cur
                .read_u128_le()
                .map_err(|_| LinkError::ConstExpr("bad v128.const"))?;
            Value::V128(v)
        }
        _ => return Err(LinkError::ConstExpr("unsupported opcode")),
    };
    match cur.read_u8() {
        Ok(0x0B) => Ok(value),
        _ => Err(LinkError::ConstExpr("missing end")),
    }
}

fn value_matches(ty: ValType, v: Value) -> bool {
    v.ty() == ty
}

/// Instantiate a validated module: resolve imports, allocate definitions,
/// evaluate initializers, apply active segments (bounds-checked before any
/// write), build exports, and run the start function on `exec`.
pub fn instantiate(
    exec: &mut Executor,
    store: &mut Store,
    module_ir: Arc<Module>,
    resolver: &impl ImportResolver,
) -> Result<InstanceHandle, LinkError> {
    let handle = store.alloc_module_ir(module_ir.clone());
    let module = module_ir;

    // Index spaces built locally, committed to the instance at the end.
    let mut funcs: Vec<usize> = Vec::with_capacity(module.total_funcs() as usize);
    let mut tables: Vec<usize> = Vec::with_capacity(module.total_tables() as usize);
    let mut memories: Vec<usize> = Vec::with_capacity(module.total_memories() as usize);
    let mut globals: Vec<usize> = Vec::with_capacity(module.total_globals() as usize);

    // 1) Resolve imports.
    for imp in &module.imports {
        match &imp.desc {
            ImportDesc::Func(type_idx) => {
                let fty = module
                    .types
                    .get(*type_idx as usize)
                    .ok_or(LinkError::BadIndex("import type index"))?
                    .clone();
                let callable = resolver
                    .resolve_func(&imp.module, &imp.name, &fty)
                    .ok_or_else(|| LinkError::UnresolvedImport {
                        module: imp.module.clone(),
                        name: imp.name.clone(),
                    })?;
                // The importing module is the host function's frame module,
                // so a host body sees this module's memory.
                let addr = store.alloc_func(FuncInstance::host(fty, Some(handle), callable));
                funcs.push(addr);
            }
            ImportDesc::Table(tt) => {
                let addr = resolver
                    .resolve_table(&imp.module, &imp.name, tt)
                    .ok_or_else(|| LinkError::UnresolvedImport {
                        module: imp.module.clone(),
                        name: imp.name.clone(),
                    })?;
                let t = store.get_table(addr).ok_or(LinkError::ImportMismatch {
                    context: "table import",
                    expected: "existing table".to_string(),
                    found: "invalid address".to_string(),
                })?;
                if t.size() < tt.limits.min {
                    return Err(LinkError::ImportMismatch {
                        context: "table import limits",
                        expected: format!("size >= {}", tt.limits.min),
                        found: format!("size {}", t.size()),
                    });
                }
                tables.push(addr);
            }
            ImportDesc::Memory(mt) => {
                let addr = resolver
                    .resolve_memory(&imp.module, &imp.name, mt)
                    .ok_or_else(|| LinkError::UnresolvedImport {
                        module: imp.module.clone(),
                        name: imp.name.clone(),
                    })?;
                let m = store.get_memory(addr).ok_or(LinkError::ImportMismatch {
                    context: "memory import",
                    expected: "existing memory".to_string(),
                    found: "invalid address".to_string(),
                })?;
                if m.size_pages() < mt.limits.min {
                    return Err(LinkError::ImportMismatch {
                        context: "memory import limits",
                        expected: format!("pages >= {}", mt.limits.min),
                        found: format!("pages {}", m.size_pages()),
                    });
                }
                memories.push(addr);
            }
            ImportDesc::Global(gt) => {
                let addr = resolver
                    .resolve_global(&imp.module, &imp.name, gt)
                    .ok_or_else(|| LinkError::UnresolvedImport {
                        module: imp.module.clone(),
                        name: imp.name.clone(),
                    })?;
                let g = store.get_global(addr).ok_or(LinkError::ImportMismatch {
                    context: "global import",
                    expected: "existing global".to_string(),
                    found: "invalid address".to_string(),
                })?;
                if g.ty() != gt {
                    return Err(LinkError::ImportMismatch {
                        context: "global import type",
                        expected: format!("{gt:?}"),
                        found: format!("{:?}", g.ty()),
                    });
                }
                globals.push(addr);
            }
        }
    }

    // 2) Define module functions.
    for (def_index, type_idx) in module.func_type_indices.iter().enumerate() {
        let fty = module
            .types
            .get(*type_idx as usize)
            .ok_or(LinkError::BadIndex("function type index"))?
            .clone();
        let body = module
            .codes
            .get(def_index)
            .ok_or(LinkError::BadIndex("code body"))?;
        let addr = store.alloc_func(FuncInstance::bytecode(
            fty,
            handle,
            body.locals.clone(),
            body.code.clone(),
        ));
        funcs.push(addr);
    }

    // 3) Define tables and memories.
    for tt in &module.tables {
        tables.push(store.alloc_table(TableInstance::new(tt)));
    }
    for mt in &module.memories {
        memories.push(store.alloc_memory(MemoryInstance::new(mt)));
    }

    // 4) Define globals (initializers may reference imported globals only).
    for glob in &module.globals {
        let init = eval_const_expr(&glob.init, store, &globals, &funcs)?;
        if !value_matches(glob.ty.val_type, init) {
            return Err(LinkError::ImportMismatch {
                context: "global initializer",
                expected: format!("{:?}", glob.ty.val_type),
                found: format!("{:?}", init.ty()),
            });
        }
        globals.push(store.alloc_global(GlobalInstance::new(glob.ty, init)));
    }

    // 5) Element segments: apply active ones (bounds-checked before any
    // write), then allocate the runtime instances. Active segments are
    // dropped after application; passive ones stay for table.init.
    let mut elems: Vec<usize> = Vec::with_capacity(module.elements.len());
    for seg in &module.elements {
        let refs: Vec<Option<usize>> = seg
            .init
            .iter()
            .map(|&fidx| {
                funcs
                    .get(fidx as usize)
                    .copied()
                    .map(Some)
                    .ok_or(LinkError::BadIndex("element function index"))
            })
            .collect::<Result<_, _>>()?;

        match &seg.mode {
            ElementMode::Active { table, offset } => {
                let taddr = *tables
                    .get(*table as usize)
                    .ok_or(LinkError::BadIndex("element table index"))?;
                let base = match eval_const_expr(offset, store, &globals, &funcs)? {
                    Value::I32(v) => v as u32,
                    _ => return Err(LinkError::ConstExpr("element offset not i32")),
                };
                let t = store
                    .get_table_mut(taddr)
                    .ok_or(LinkError::BadIndex("table address"))?;
                t.init(base, &refs).map_err(|_| LinkError::ElemOutOfBounds)?;
                elems.push(store.alloc_element(ElementInstance::new(seg.elem_type, Vec::new())));
            }
            ElementMode::Passive => {
                elems.push(store.alloc_element(ElementInstance::new(seg.elem_type, refs)));
            }
            // Declarative segments only make their functions referenceable;
            // the runtime instance starts out dropped.
            ElementMode::Declared => {
                elems.push(store.alloc_element(ElementInstance::new(seg.elem_type, Vec::new())));
            }
        }
    }

    // 6) Data segments, same shape as elements.
    let mut datas: Vec<usize> = Vec::with_capacity(module.data.len());
    for seg in &module.data {
        match &seg.mode {
            DataMode::Active { memory, offset } => {
                let maddr = *memories
                    .get(*memory as usize)
                    .ok_or(LinkError::BadIndex("data memory index"))?;
                let base = match eval_const_expr(offset, store, &globals, &funcs)? {
                    Value::I32(v) => v as u32,
                    _ => return Err(LinkError::ConstExpr("data offset not i32")),
                };
                let m = store
                    .get_memory_mut(maddr)
                    .ok_or(LinkError::BadIndex("memory address"))?;
                m.init(base, &seg.init)
                    .map_err(|_| LinkError::DataOutOfBounds)?;
                datas.push(store.alloc_data(DataInstance::new(Vec::new())));
            }
            DataMode::Passive => {
                datas.push(store.alloc_data(DataInstance::new(seg.init.clone())));
            }
        }
    }

    // 7) Exports.
    let mut exports: HashMap<String, RuntimeExportDesc> = HashMap::new();
    for ex in &module.exports {
        let desc = match ex.desc {
            ExportDesc::Func(i) => RuntimeExportDesc::Func(
                *funcs
                    .get(i as usize)
                    .ok_or(LinkError::BadIndex("export function"))?,
            ),
            ExportDesc::Table(i) => RuntimeExportDesc::Table(
                *tables
                    .get(i as usize)
                    .ok_or(LinkError::BadIndex("export table"))?,
            ),
            ExportDesc::Memory(i) => RuntimeExportDesc::Memory(
                *memories
                    .get(i as usize)
                    .ok_or(LinkError::BadIndex("export memory"))?,
            ),
            ExportDesc::Global(i) => RuntimeExportDesc::Global(
                *globals
                    .get(i as usize)
                    .ok_or(LinkError::BadIndex("export global"))?,
            ),
        };
        exports.insert(ex.name.clone(), desc);
    }

    // 8) Commit the instance and run the start function.
    let start_addr = match module.start {
        Some(idx) => Some(
            *funcs
                .get(idx as usize)
                .ok_or(LinkError::BadIndex("start function"))?,
        ),
        None => None,
    };
    {
        let inst = store
            .get_module_mut(handle.0)
            .expect("module just allocated");
        inst.funcs = funcs;
        inst.tables = tables;
        inst.memories = memories;
        inst.globals = globals;
        inst.elems = elems;
        inst.datas = datas;
        inst.exports = exports;
    }

    if let Some(addr) = start_addr {
        exec.invoke(store, addr, &[], &[])
            .map_err(LinkError::StartTrap)?;
    }

    Ok(handle)
}

/// Invoke an exported function by name.
pub fn invoke_export(
    exec: &mut Executor,
    store: &mut Store,
    instance: InstanceHandle,
    export_name: &str,
    args: &[Value],
) -> Result<Vec<Value>, Trap> {
    let module_inst = store
        .get_module(instance.0)
        .ok_or(Trap::FunctionNotFound)?;
    let func_addr = match module_inst.resolve_export(export_name) {
        Some(RuntimeExportDesc::Func(addr)) => addr,
        _ => return Err(Trap::FunctionNotFound),
    };
    let arg_types: Vec<ValType> = args.iter().map(|v| v.ty()).collect();
    exec.invoke(store, func_addr, args, &arg_types)
}
