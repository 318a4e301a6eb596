//! Module-level IR: module structure, initializer expressions, function
//! bodies, element and data segments.

use std::sync::Arc;

use super::types::{
    Export, FuncIdx, FuncType, GlobalType, Import, MemIdx, MemoryType, RefType, TableIdx,
    TableType, TypeIdx, ValType,
};
use crate::code::Instr;

/// Local declarations inside a function body, run-length encoded as
/// (count, valtype) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDecl {
    pub count: u32,
    pub val_type: ValType,
}

/// Raw constant expression (byte sequence ending with `end`) used in
/// initializers: global inits and active segment offsets. Evaluated at
/// instantiation time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Expr {
    pub body: Vec<u8>,
}

/// Code body of a defined function: local declarations and the decoded
/// instruction sequence (branch targets resolved, terminated by `end`).
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBody {
    pub locals: Vec<LocalDecl>,
    pub code: Arc<[Instr]>,
}

impl Default for CodeBody {
    fn default() -> Self {
        Self {
            locals: Vec::new(),
            code: Arc::from(Vec::new()),
        }
    }
}

/// Global with type and initializer expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: Expr,
}

/// Element segment placement.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementMode {
    /// Initializes a table slice at instantiation, then the segment is
    /// dropped.
    Active { table: TableIdx, offset: Expr },
    /// Kept alive for `table.init` until an explicit `elem.drop`.
    Passive,
    /// Only declares its functions as referenceable (`ref.func`); dropped
    /// immediately at instantiation.
    Declared,
}

/// Element segment: a vector of function indices and a placement mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSegment {
    pub mode: ElementMode,
    pub elem_type: RefType,
    pub init: Vec<FuncIdx>,
}

/// Data segment placement.
#[derive(Debug, Clone, PartialEq)]
pub enum DataMode {
    Active { memory: MemIdx, offset: Expr },
    Passive,
}

/// Data segment: raw bytes and a placement mode.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    pub mode: DataMode,
    pub init: Vec<u8>,
}

/// The parse-time module IR (pre-validation, pre-instantiation).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type indices for each defined (non-imported) function, in order.
    pub func_type_indices: Vec<TypeIdx>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,

    pub exports: Vec<Export>,
    pub start: Option<FuncIdx>,

    pub elements: Vec<ElementSegment>,
    /// Code bodies for defined functions (length equals func_type_indices).
    pub codes: Vec<CodeBody>,
    pub data: Vec<DataSegment>,
    /// Declared data segment count from the DataCount section, if present.
    pub data_count: Option<u32>,

    // Precomputed import counts for index space arithmetic.
    pub imported_funcs: u32,
    pub imported_tables: u32,
    pub imported_memories: u32,
    pub imported_globals: u32,
}

impl Module {
    /// Total counts including imports for each index space.
    pub fn total_funcs(&self) -> u32 {
        self.imported_funcs + (self.func_type_indices.len() as u32)
    }
    pub fn total_tables(&self) -> u32 {
        self.imported_tables + (self.tables.len() as u32)
    }
    pub fn total_memories(&self) -> u32 {
        self.imported_memories + (self.memories.len() as u32)
    }
    pub fn total_globals(&self) -> u32 {
        self.imported_globals + (self.globals.len() as u32)
    }
}
