//! Crate-level error types for the module side.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Binary(#[from] crate::binary::BinaryReadError),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unknown type index {0}")]
    UnknownType(u32),

    #[error("unknown function index {0}")]
    UnknownFunction(u32),

    #[error("unknown table index {0}")]
    UnknownTable(u32),

    #[error("unknown memory index {0}")]
    UnknownMemory(u32),

    #[error("unknown global index {0}")]
    UnknownGlobal(u32),

    #[error("limits malformed ({context}): max {max} < min {min}")]
    LimitsMalformed {
        context: &'static str,
        min: u32,
        max: u32,
    },

    #[error("duplicate export name {0:?}")]
    DuplicateExport(String),

    #[error("multiple memories are not supported")]
    MultipleMemories,

    #[error("start function must have type [] -> []")]
    StartSignature,

    #[error("function and code section lengths disagree")]
    FunctionCodeMismatch,

    #[error("data count section disagrees with data section")]
    DataCountMismatch,

    #[error("malformed module: {0}")]
    Malformed(&'static str),
}
