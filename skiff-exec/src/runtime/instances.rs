//! Function and module instance records.

use std::collections::HashMap;
use std::sync::Arc;

use skiff_wasm::model::{FuncType, LocalDecl, Module};
use skiff_wasm::Instr;

use crate::host::HostFunc;
use crate::vm::context::{Symbol, Trampoline};
use super::InstanceHandle;

/// The three body kinds a function instance can have.
///
/// Call entry is a cold branch over this sum; the compiled case keeps its
/// symbol and trampoline directly so invocation is a plain call.
#[derive(Clone)]
pub enum FuncBody {
    /// Implemented outside Wasm; charged its declared cost per call.
    Host { callable: Arc<dyn HostFunc> },
    /// Ahead-of-time compiled body: an opaque body symbol plus the
    /// type-specific trampoline that knows how to call it.
    Compiled {
        body: Symbol,
        trampoline: Trampoline,
    },
    /// Interpreted body: run-length-encoded local declarations and the
    /// decoded instruction sequence.
    Bytecode {
        locals: Vec<LocalDecl>,
        code: Arc<[Instr]>,
    },
}

/// One function in the store.
#[derive(Clone)]
pub struct FuncInstance {
    ty: FuncType,
    /// Owning module instance; None only for functions registered without a
    /// module context.
    module: Option<InstanceHandle>,
    body: FuncBody,
}

impl FuncInstance {
    pub fn host(ty: FuncType, module: Option<InstanceHandle>, callable: Arc<dyn HostFunc>) -> Self {
        Self {
            ty,
            module,
            body: FuncBody::Host { callable },
        }
    }

    pub fn compiled(
        ty: FuncType,
        module: Option<InstanceHandle>,
        body: Symbol,
        trampoline: Trampoline,
    ) -> Self {
        Self {
            ty,
            module,
            body: FuncBody::Compiled { body, trampoline },
        }
    }

    pub fn bytecode(
        ty: FuncType,
        module: InstanceHandle,
        locals: Vec<LocalDecl>,
        code: Arc<[Instr]>,
    ) -> Self {
        Self {
            ty,
            module: Some(module),
            body: FuncBody::Bytecode { locals, code },
        }
    }

    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    pub fn module_handle(&self) -> Option<InstanceHandle> {
        self.module
    }

    pub fn body(&self) -> &FuncBody {
        &self.body
    }
}

impl std::fmt::Debug for FuncInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.body {
            FuncBody::Host { .. } => "host",
            FuncBody::Compiled { .. } => "compiled",
            FuncBody::Bytecode { .. } => "bytecode",
        };
        f.debug_struct("FuncInstance")
            .field("ty", &self.ty)
            .field("module", &self.module)
            .field("kind", &kind)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeExportDesc {
    Func(usize),
    Table(usize),
    Memory(usize),
    Global(usize),
}

/// A module instance records the store addresses of its imported and defined
/// items for all six index spaces, plus export bindings.
#[derive(Debug, Clone, Default)]
pub struct ModuleInstance {
    /// Store addresses, imports first, then definitions, in module order.
    pub funcs: Vec<usize>,
    pub tables: Vec<usize>,
    pub memories: Vec<usize>,
    pub globals: Vec<usize>,
    pub elems: Vec<usize>,
    pub datas: Vec<usize>,

    /// Exports by name (runtime addresses).
    pub exports: HashMap<String, RuntimeExportDesc>,

    /// Parse-time IR, kept for type lookups at runtime.
    pub module_ir: Arc<Module>,
}

impl ModuleInstance {
    pub fn resolve_export(&self, name: &str) -> Option<RuntimeExportDesc> {
        self.exports.get(name).copied()
    }

    /// Function type by type index.
    pub fn func_type(&self, type_idx: u32) -> Option<&FuncType> {
        self.module_ir.types.get(type_idx as usize)
    }

    pub fn func_addr(&self, idx: u32) -> Option<usize> {
        self.funcs.get(idx as usize).copied()
    }

    pub fn table_addr(&self, idx: u32) -> Option<usize> {
        self.tables.get(idx as usize).copied()
    }

    pub fn mem_addr(&self, idx: u32) -> Option<usize> {
        self.memories.get(idx as usize).copied()
    }

    pub fn global_addr(&self, idx: u32) -> Option<usize> {
        self.globals.get(idx as usize).copied()
    }

    pub fn elem_addr(&self, idx: u32) -> Option<usize> {
        self.elems.get(idx as usize).copied()
    }

    pub fn data_addr(&self, idx: u32) -> Option<usize> {
        self.datas.get(idx as usize).copied()
    }
}
