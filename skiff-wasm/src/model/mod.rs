//! Public model/IR surface.

pub mod module;
pub mod types;

pub use module::{
    CodeBody, DataMode, DataSegment, ElementMode, ElementSegment, Expr, Global, LocalDecl, Module,
};
pub use types::{
    BlockType, Export, ExportDesc, FuncIdx, FuncType, GlobalIdx, GlobalType, Import, ImportDesc,
    Limits, MemIdx, MemoryType, RefType, TableIdx, TableType, TypeIdx, ValType,
};
