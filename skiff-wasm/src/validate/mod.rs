//! Structural module validation.
//!
//! Checks index-space and shape invariants: type indices in range, limits
//! well-formed, export names unique, start signature, segment references.
//! Full instruction typing is left to an upstream type checker; the engine
//! trusts modules that passed validation.

use std::collections::HashSet;

use crate::code::Instr;
use crate::error::ValidationError;
use crate::model::{
    DataMode, ElementMode, ExportDesc, FuncIdx, FuncType, ImportDesc, Module, TypeIdx,
};

type VResult<T> = Result<T, ValidationError>;

struct TypeEnv<'a> {
    m: &'a Module,
    /// Type indices of imported functions, in import order.
    func_import_types: Vec<TypeIdx>,
}

impl<'a> TypeEnv<'a> {
    fn new(m: &'a Module) -> VResult<Self> {
        let mut func_import_types = Vec::with_capacity(m.imported_funcs as usize);
        for imp in &m.imports {
            if let ImportDesc::Func(tidx) = imp.desc {
                func_import_types.push(tidx);
            }
        }
        if func_import_types.len() as u32 != m.imported_funcs {
            return Err(ValidationError::Malformed(
                "imported function count mismatch",
            ));
        }
        Ok(Self {
            m,
            func_import_types,
        })
    }

    /// Resolve an absolute function index to its declared type index.
    fn func_type_idx(&self, fidx: FuncIdx) -> VResult<TypeIdx> {
        if fidx < self.m.imported_funcs {
            self.func_import_types
                .get(fidx as usize)
                .copied()
                .ok_or(ValidationError::UnknownFunction(fidx))
        } else {
            let def_i = (fidx - self.m.imported_funcs) as usize;
            self.m
                .func_type_indices
                .get(def_i)
                .copied()
                .ok_or(ValidationError::UnknownFunction(fidx))
        }
    }

    fn func_type(&self, fidx: FuncIdx) -> VResult<&'a FuncType> {
        let tidx = self.func_type_idx(fidx)?;
        self.m
            .types
            .get(tidx as usize)
            .ok_or(ValidationError::UnknownType(tidx))
    }
}

fn check_limits(min: u32, max: Option<u32>, context: &'static str) -> VResult<()> {
    if let Some(max) = max {
        if max < min {
            return Err(ValidationError::LimitsMalformed { context, min, max });
        }
    }
    Ok(())
}

pub fn validate_module(m: &Module) -> VResult<()> {
    let env = TypeEnv::new(m)?;

    /* Type indices of declared functions */
    for &tidx in &m.func_type_indices {
        if (tidx as usize) >= m.types.len() {
            return Err(ValidationError::UnknownType(tidx));
        }
    }
    for imp in &m.imports {
        if let ImportDesc::Func(tidx) = imp.desc {
            if (tidx as usize) >= m.types.len() {
                return Err(ValidationError::UnknownType(tidx));
            }
        }
    }

    /* Tables */
    for tt in &m.tables {
        check_limits(tt.limits.min, tt.limits.max, "table")?;
    }

    /* Memories */
    if m.memories.len() > 1 {
        return Err(ValidationError::MultipleMemories);
    }
    for mt in &m.memories {
        check_limits(mt.limits.min, mt.limits.max, "memory")?;
    }

    /* Exports */
    let mut export_names = HashSet::new();
    for ex in &m.exports {
        if !export_names.insert(ex.name.as_str()) {
            return Err(ValidationError::DuplicateExport(ex.name.clone()));
        }
        match ex.desc {
            ExportDesc::Func(f) => {
                if f >= env.m.total_funcs() {
                    return Err(ValidationError::UnknownFunction(f));
                }
            }
            ExportDesc::Table(t) => {
                if t >= env.m.total_tables() {
                    return Err(ValidationError::UnknownTable(t));
                }
            }
            ExportDesc::Memory(mem) => {
                if mem >= env.m.total_memories() {
                    return Err(ValidationError::UnknownMemory(mem));
                }
            }
            ExportDesc::Global(g) => {
                if g >= env.m.total_globals() {
                    return Err(ValidationError::UnknownGlobal(g));
                }
            }
        }
    }

    /* Start function */
    if let Some(start_idx) = m.start {
        if start_idx >= env.m.total_funcs() {
            return Err(ValidationError::UnknownFunction(start_idx));
        }
        let fty = env.func_type(start_idx)?;
        if !fty.params.is_empty() || !fty.results.is_empty() {
            return Err(ValidationError::StartSignature);
        }
    }

    /* Element segments */
    for seg in &m.elements {
        if let ElementMode::Active { table, .. } = seg.mode {
            if table >= env.m.total_tables() {
                return Err(ValidationError::UnknownTable(table));
            }
        }
        for &func_idx in &seg.init {
            if func_idx >= env.m.total_funcs() {
                return Err(ValidationError::UnknownFunction(func_idx));
            }
        }
    }

    /* Code bodies */
    if m.func_type_indices.len() != m.codes.len() {
        return Err(ValidationError::FunctionCodeMismatch);
    }
    for code in &m.codes {
        if !matches!(code.code.last(), Some(Instr::End)) {
            return Err(ValidationError::Malformed(
                "function body missing terminating end",
            ));
        }
    }

    /* Data segments */
    for seg in &m.data {
        if let DataMode::Active { memory, .. } = seg.mode {
            if memory >= env.m.total_memories() {
                return Err(ValidationError::UnknownMemory(memory));
            }
        }
    }
    if let Some(count) = m.data_count {
        if count as usize != m.data.len() {
            return Err(ValidationError::DataCountMismatch);
        }
    }

    Ok(())
}
