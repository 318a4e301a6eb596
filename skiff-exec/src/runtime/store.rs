//! Central store for all runtime instances allocated by the engine.
//!
//! Indirection is always module-local index -> store address -> instance;
//! the address is the index into the per-kind vector here.

use std::sync::Arc;

use skiff_wasm::model::Module;

use super::{
    data::DataInstance, element::ElementInstance, global::GlobalInstance,
    instances::{FuncInstance, ModuleInstance}, memory::MemoryInstance, table::TableInstance,
    InstanceHandle,
};

#[derive(Debug, Default)]
pub struct Store {
    pub funcs: Vec<FuncInstance>,
    pub tables: Vec<TableInstance>,
    pub mems: Vec<MemoryInstance>,
    pub globals: Vec<GlobalInstance>,
    pub elems: Vec<ElementInstance>,
    pub datas: Vec<DataInstance>,
    pub modules: Vec<ModuleInstance>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_func(&mut self, f: FuncInstance) -> usize {
        let addr = self.funcs.len();
        self.funcs.push(f);
        addr
    }

    pub fn alloc_table(&mut self, t: TableInstance) -> usize {
        let addr = self.tables.len();
        self.tables.push(t);
        addr
    }

    pub fn alloc_memory(&mut self, m: MemoryInstance) -> usize {
        let addr = self.mems.len();
        self.mems.push(m);
        addr
    }

    pub fn alloc_global(&mut self, g: GlobalInstance) -> usize {
        let addr = self.globals.len();
        self.globals.push(g);
        addr
    }

    pub fn alloc_element(&mut self, e: ElementInstance) -> usize {
        let addr = self.elems.len();
        self.elems.push(e);
        addr
    }

    pub fn alloc_data(&mut self, d: DataInstance) -> usize {
        let addr = self.datas.len();
        self.datas.push(d);
        addr
    }

    /// Allocate a ModuleInstance with only the IR set; index spaces are
    /// committed by the instantiation driver.
    pub fn alloc_module_ir(&mut self, module_ir: Arc<Module>) -> InstanceHandle {
        let mut m = ModuleInstance::default();
        m.module_ir = module_ir;
        let idx = self.modules.len();
        self.modules.push(m);
        InstanceHandle(idx)
    }

    pub fn get_module(&self, idx: usize) -> Option<&ModuleInstance> {
        self.modules.get(idx)
    }

    pub fn get_module_mut(&mut self, idx: usize) -> Option<&mut ModuleInstance> {
        self.modules.get_mut(idx)
    }

    pub fn get_func(&self, addr: usize) -> Option<&FuncInstance> {
        self.funcs.get(addr)
    }

    pub fn get_table(&self, addr: usize) -> Option<&TableInstance> {
        self.tables.get(addr)
    }

    pub fn get_table_mut(&mut self, addr: usize) -> Option<&mut TableInstance> {
        self.tables.get_mut(addr)
    }

    pub fn get_memory(&self, addr: usize) -> Option<&MemoryInstance> {
        self.mems.get(addr)
    }

    pub fn get_memory_mut(&mut self, addr: usize) -> Option<&mut MemoryInstance> {
        self.mems.get_mut(addr)
    }

    pub fn get_global(&self, addr: usize) -> Option<&GlobalInstance> {
        self.globals.get(addr)
    }

    pub fn get_global_mut(&mut self, addr: usize) -> Option<&mut GlobalInstance> {
        self.globals.get_mut(addr)
    }

    pub fn get_element(&self, addr: usize) -> Option<&ElementInstance> {
        self.elems.get(addr)
    }

    pub fn get_element_mut(&mut self, addr: usize) -> Option<&mut ElementInstance> {
        self.elems.get_mut(addr)
    }

    pub fn get_data(&self, addr: usize) -> Option<&DataInstance> {
        self.datas.get(addr)
    }

    pub fn get_data_mut(&mut self, addr: usize) -> Option<&mut DataInstance> {
        self.datas.get_mut(addr)
    }
}
