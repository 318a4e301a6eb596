//! Runtime error types: traps and link errors.

use thiserror::Error;

/// Abrupt termination of an invocation.
///
/// Every fallible engine operation returns this; errors unwind the
/// dispatcher to the outermost entry, which logs once and surfaces them to
/// the embedder. Traps preserve store consistency; the VM stays usable for
/// subsequent invocations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    // Validation-class: should not occur after validation.
    #[error("type mismatch")]
    TypeMismatch,
    #[error("undefined element")]
    UndefinedElement,
    #[error("uninitialized element")]
    UninitializedElement,
    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,
    #[error("function not found")]
    FunctionNotFound,

    // Trap-class: Wasm traps.
    #[error("out of bounds memory access")]
    MemoryOutOfBounds,
    #[error("out of bounds table access")]
    TableOutOfBounds,
    #[error("integer divide by zero")]
    DivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,
    #[error("illegal instruction")]
    IllegalInstruction,
    #[error("call stack exhausted")]
    StackOverflow,
    #[error("unreachable executed")]
    Unreachable,

    // Resource-class.
    #[error("cost limit exceeded")]
    CostLimitExceeded,

    // Lifecycle-class.
    #[error("execution terminated")]
    Terminated,
    #[error("host function failed")]
    ExecutionFailed,
}

/// Errors raised while instantiating and linking a module.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("unresolved import: {module}.{name}")]
    UnresolvedImport { module: String, name: String },

    #[error("import type mismatch ({context}): expected {expected}, found {found}")]
    ImportMismatch {
        context: &'static str,
        expected: String,
        found: String,
    },

    #[error("element segment initialization out of bounds")]
    ElemOutOfBounds,

    #[error("data segment initialization out of bounds")]
    DataOutOfBounds,

    #[error("unsupported constant expression: {0}")]
    ConstExpr(&'static str),

    #[error("invalid index in module: {0}")]
    BadIndex(&'static str),

    #[error("trap while running start function")]
    StartTrap(#[source] Trap),
}
