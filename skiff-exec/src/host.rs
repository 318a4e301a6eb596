//! Host function contract and import resolution.

use std::sync::Arc;

use skiff_wasm::model::{FuncType, GlobalType, MemoryType, TableType};

use crate::error::Trap;
use crate::runtime::MemoryInstance;
use crate::values::Value;

/// A function implemented outside Wasm.
///
/// `run` receives memory index 0 of the frame's module (if any), the popped
/// argument values in declaration order, and a result slice sized to the
/// function's return arity. `cost` is charged against the statistics cost
/// ceiling before the call runs.
pub trait HostFunc: Send + Sync {
    fn run(
        &self,
        memory: Option<&mut MemoryInstance>,
        args: &[Value],
        rets: &mut [Value],
    ) -> Result<(), Trap>;

    fn cost(&self) -> u64 {
        0
    }
}

struct FnHost<F> {
    f: F,
    cost: u64,
}

impl<F> HostFunc for FnHost<F>
where
    F: Fn(Option<&mut MemoryInstance>, &[Value], &mut [Value]) -> Result<(), Trap> + Send + Sync,
{
    fn run(
        &self,
        memory: Option<&mut MemoryInstance>,
        args: &[Value],
        rets: &mut [Value],
    ) -> Result<(), Trap> {
        (self.f)(memory, args, rets)
    }

    fn cost(&self) -> u64 {
        self.cost
    }
}

/// Wrap a closure as a host function with a declared per-call cost.
pub fn host_fn<F>(cost: u64, f: F) -> Arc<dyn HostFunc>
where
    F: Fn(Option<&mut MemoryInstance>, &[Value], &mut [Value]) -> Result<(), Trap>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnHost { f, cost })
}

/// Host import resolver. Provides host callables for imported functions and
/// pre-allocated store addresses for imported tables, memories, and globals.
pub trait ImportResolver {
    fn resolve_func(&self, module: &str, name: &str, ty: &FuncType) -> Option<Arc<dyn HostFunc>>;
    fn resolve_table(&self, module: &str, name: &str, tt: &TableType) -> Option<usize>;
    fn resolve_memory(&self, module: &str, name: &str, mt: &MemoryType) -> Option<usize>;
    fn resolve_global(&self, module: &str, name: &str, gt: &GlobalType) -> Option<usize>;
}

/// Resolver for modules without imports; every lookup fails.
pub struct NoImports;

impl ImportResolver for NoImports {
    fn resolve_func(&self, _: &str, _: &str, _: &FuncType) -> Option<Arc<dyn HostFunc>> {
        None
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
