//! skiff-wasm: WebAssembly binary decoding, module IR, and structural validation.
//!
//! This crate is the module side of the engine: it turns `.wasm` bytes into a
//! [`Module`] IR (function bodies pre-decoded into structured instruction
//! sequences with branch targets resolved) and performs structural validation.
//! Execution lives in the sibling `skiff-exec` crate.

pub mod binary;
pub mod code;
pub mod error;
pub mod model;
pub mod validate;

pub use code::{Instr, MemArg};
pub use model::{BlockType, FuncType, Module, RefType, ValType};

/// Parse a Wasm binary into a Module IR.
///
/// Low-level binary errors are translated into crate-level [`error::ParseError`]
/// via the From impl.
pub fn parse(bytes: &[u8]) -> Result<Module, error::ParseError> {
    let module = binary::sections::parse_module_from_bytes(bytes)?;
    Ok(module)
}

/// Validate a parsed Module.
///
/// Structural checks only (index spaces, limits, export uniqueness, start
/// signature, segment shapes). Instruction typing is the concern of a full
/// validator; the execution engine trusts input that passed here plus an
/// upstream type checker.
pub fn validate(m: &Module) -> Result<(), error::ValidationError> {
    validate::validate_module(m)
}
