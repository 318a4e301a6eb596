//! Execution context shared with compiled code.

use crate::runtime::Store;
use crate::values::Value;

/// The per-executor context a compiled body dereferences instead of making
/// engine calls: the current store, the base address of memory 0 of the
/// callee's module, and a table of pointers to that module's global values.
///
/// Call entry refreshes the fields immediately before every compiled call
/// (see the call-entry path), so they are valid exactly for the duration of
/// the guarded trampoline invocation. The engine is single-threaded per
/// executor; the context is owned by the executor and never shared across
/// threads.
#[repr(C)]
#[derive(Debug)]
pub struct ExecutionContext {
    pub store: *mut Store,
    /// Base of memory index 0, or null when the module has no memory.
    pub memory: *mut u8,
    /// Pointer table into the module's globals, in index order.
    pub globals: *mut *mut Value,
    /// Number of entries behind `globals`.
    pub globals_len: usize,
}

impl ExecutionContext {
    pub(crate) fn empty() -> Self {
        Self {
            store: std::ptr::null_mut(),
            memory: std::ptr::null_mut(),
            globals: std::ptr::null_mut(),
            globals_len: 0,
        }
    }
}

/// Opaque compiled-code symbol. The engine never inspects it; the matching
/// trampoline knows what it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol(*const ());

impl Symbol {
    pub fn new(ptr: *const ()) -> Self {
        Self(ptr)
    }

    pub fn as_ptr(self) -> *const () {
        self.0
    }
}

/// Function-type trampoline: invokes a compiled body symbol with the popped
/// arguments and a result buffer sized to the function's return arity.
///
/// The trampoline runs inside a fault scope; it reports traps through
/// [`crate::vm::fault::raise`] rather than returning an error.
pub type Trampoline = fn(&mut ExecutionContext, Symbol, &[Value], &mut [Value]);
