//! The execution core: program counter, multiplexed stack, call entry,
//! branch engine, fault guard, and the dispatch loop.

pub mod context;
pub mod executor;
pub mod fault;
mod interpreter;
pub mod stack;

pub use context::{ExecutionContext, Symbol, Trampoline};
pub use executor::{Config, Executor};
pub use fault::InterruptHandle;
pub use stack::{Frame, Label, StackManager};

use std::sync::Arc;

use skiff_wasm::Instr;

/// Program counter: a handle to a decoded instruction sequence plus an index
/// into it.
///
/// The dispatch loop fetches the instruction at the index and then
/// increments, so every continuation stored in a label is the index of the
/// *next* instruction to execute. A zero-length sentinel sequence marks
/// "return to the embedder": the outermost call's back-pc points at it and
/// the loop stops when the pc reaches it.
#[derive(Clone)]
pub struct Pc {
    code: Arc<[Instr]>,
    idx: usize,
}

impl Pc {
    /// Start of a function body.
    pub fn new(code: Arc<[Instr]>) -> Self {
        Self { code, idx: 0 }
    }

    /// The sentinel continuation handed to the outermost call.
    pub fn end_sentinel() -> Self {
        Self {
            code: Arc::from(Vec::new()),
            idx: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.idx
    }

    pub fn code(&self) -> &Arc<[Instr]> {
        &self.code
    }

    /// True once the pc has run off the end of its sequence. Validated
    /// function bodies end with `end`, so this only holds for the sentinel.
    pub fn at_end(&self) -> bool {
        self.idx >= self.code.len()
    }

    /// The instruction under the pc, if any.
    pub fn instr(&self) -> Option<&Instr> {
        self.code.get(self.idx)
    }

    pub fn advance(&mut self) {
        self.idx += 1;
    }

    pub fn jump(&mut self, idx: usize) {
        self.idx = idx;
    }

    /// Same sequence, different index.
    pub fn with_index(&self, idx: usize) -> Self {
        Self {
            code: self.code.clone(),
            idx,
        }
    }

    /// The position one past this one.
    pub fn next(&self) -> Self {
        self.with_index(self.idx + 1)
    }
}

impl std::fmt::Debug for Pc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pc({}/{})", self.idx, self.code.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_at_end() {
        let pc = Pc::end_sentinel();
        assert!(pc.at_end());
        assert!(pc.instr().is_none());
    }

    #[test]
    fn advance_and_jump() {
        let code: Arc<[Instr]> = Arc::from(vec![Instr::Nop, Instr::Nop, Instr::End]);
        let mut pc = Pc::new(code);
        assert_eq!(pc.index(), 0);
        pc.advance();
        assert_eq!(pc.index(), 1);
        pc.jump(2);
        assert!(matches!(pc.instr(), Some(Instr::End)));
        pc.advance();
        assert!(pc.at_end());
    }
}
