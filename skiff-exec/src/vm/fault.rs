//! Scoped fault guard for compiled code.
//!
//! The native backend is consumed as opaque callables, so faults are carried
//! on an unwinding channel rather than hardware signals: a guarded body
//! reports a fault with [`raise`], which performs a non-local exit that the
//! innermost [`scope`] catches and turns into its trap code. `Ok` is the
//! success sentinel. Panics that are not fault signals pass through
//! untouched. At most one fault can be in flight per thread, and nesting is
//! supported — the innermost scope wins.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Trap;

/// Unwind payload distinguishing engine faults from foreign panics.
struct FaultSignal(Trap);

/// Report a fault from inside a guarded body. Does not return.
///
/// Goes through `resume_unwind` so the process panic hook stays quiet; the
/// fault is expected and handled by the enclosing scope.
pub fn raise(code: Trap) -> ! {
    panic::resume_unwind(Box::new(FaultSignal(code)))
}

/// Run `f` under a fault guard.
///
/// Returns `Ok` with the body's value if no fault fired, or the trap code
/// passed to [`raise`]. Foreign panics are re-raised.
pub fn scope<R>(f: impl FnOnce() -> R) -> Result<R, Trap> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => Ok(v),
        Err(payload) => match payload.downcast::<FaultSignal>() {
            Ok(sig) => Err(sig.0),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

/// Shared flag for asynchronous termination.
///
/// The dispatch loop polls it between instructions and unwinds with
/// `Terminated`; guarded compiled code may observe it and [`raise`] the same
/// code. Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination of the current execution.
    pub fn terminate(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Re-arm the handle for the next invocation.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_sentinel() {
        let r = scope(|| 7);
        assert_eq!(r.unwrap(), 7);
    }

    #[test]
    fn raise_yields_code() {
        let r: Result<(), Trap> = scope(|| raise(Trap::DivideByZero));
        assert_eq!(r.unwrap_err(), Trap::DivideByZero);
    }

    #[test]
    fn innermost_scope_wins() {
        let outer = scope(|| {
            let inner: Result<(), Trap> = scope(|| raise(Trap::MemoryOutOfBounds));
            assert_eq!(inner.unwrap_err(), Trap::MemoryOutOfBounds);
            42
        });
        assert_eq!(outer.unwrap(), 42);
    }

    #[test]
    fn foreign_panic_passes_through() {
        let caught = std::panic::catch_unwind(|| {
            let _ = scope(|| panic!("not a fault"));
        });
        assert!(caught.is_err());
    }

    #[test]
    fn interrupt_handle_shared() {
        let h = InterruptHandle::new();
        let h2 = h.clone();
        assert!(!h.is_set());
        h2.terminate();
        assert!(h.is_set());
        h.clear();
        assert!(!h2.is_set());
    }
}
