//! Binary reading utilities: cursor, LEB128 decoding, vector/name helpers,
//! and the section-level module parser.
//!
//! This layer reports errors with its own [`BinaryReadError`]; the public API
//! wraps them into `ParseError`.

pub mod cursor;
pub mod leb128;
pub mod reader;
pub mod sections;

use thiserror::Error;

/// Result alias for binary reading operations.
pub type Result<T> = core::result::Result<T, BinaryReadError>;

/// Errors that can occur while reading a Wasm binary stream.
#[derive(Debug, Error)]
pub enum BinaryReadError {
    #[error("unexpected EOF at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("LEB128 value overflows {target_bits} bits at offset {offset}")]
    Leb128Overflow { target_bits: u8, offset: usize },

    #[error("LEB128 encoding longer than {limit} bytes at offset {offset}")]
    Leb128TooLong { limit: u8, offset: usize },

    #[error("invalid UTF-8 name at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("unknown opcode 0x{opcode:02X} at offset {offset}")]
    UnknownOpcode { opcode: u32, offset: usize },

    #[error("malformed binary at offset {offset}: {msg}")]
    Malformed { offset: usize, msg: &'static str },
}
