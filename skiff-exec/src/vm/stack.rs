//! The multiplexed execution stack: operand values, control labels, and
//! call frames in one manager.
//!
//! The three stacks grow and shrink in lockstep: entering a call pushes a
//! frame whose bases snapshot the other two stacks, and popping a frame
//! removes every label and value above those bases. A distinguished dummy
//! frame sits at the bottom during an invocation; instance lookups from it
//! resolve to nothing.

use smallvec::SmallVec;

use crate::error::Trap;
use crate::runtime::InstanceHandle;
use crate::values::Value;
use crate::vm::Pc;

/// Activation record for one function call.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Owning module of the callee; None marks the dummy frame.
    module: Option<InstanceHandle>,
    args_n: u32,
    rets_n: u32,
    tail_call: bool,
    /// Value stack size at entry minus the argument count: the callee's
    /// arguments and locals live directly above this base.
    vbase: usize,
    /// Label stack size at entry.
    lbase: usize,
}

impl Frame {
    pub fn module(&self) -> Option<InstanceHandle> {
        self.module
    }

    pub fn rets_n(&self) -> u32 {
        self.rets_n
    }

    pub fn is_tail_call(&self) -> bool {
        self.tail_call
    }
}

/// Control marker for a block, loop, if, or function body.
#[derive(Debug, Clone)]
pub struct Label {
    params: u32,
    /// Branch arity: how many values a branch to this label transports.
    results: u32,
    /// Where execution resumes when the label is popped by a branch.
    cont: Pc,
    /// Set for loops: the position of the loop instruction itself, used to
    /// rebuild the label when a branch re-enters the loop.
    loop_head: Option<Pc>,
    /// Value stack size at entry minus the parameter count.
    vbase: usize,
}

impl Label {
    pub fn params(&self) -> u32 {
        self.params
    }

    pub fn results(&self) -> u32 {
        self.results
    }

    pub fn cont(&self) -> &Pc {
        &self.cont
    }

    pub fn loop_head(&self) -> Option<&Pc> {
        self.loop_head.as_ref()
    }

    pub fn vbase(&self) -> usize {
        self.vbase
    }
}

/// Stack depths captured before an invocation, restored on unwind.
#[derive(Debug, Clone, Copy)]
pub struct StackSnapshot {
    values: usize,
    labels: usize,
    frames: usize,
}

#[derive(Debug)]
pub struct StackManager {
    values: Vec<Value>,
    labels: Vec<Label>,
    frames: Vec<Frame>,
    max_frames: usize,
}

impl StackManager {
    pub fn new(max_frames: usize) -> Self {
        Self {
            values: Vec::with_capacity(256),
            labels: Vec::with_capacity(64),
            frames: Vec::with_capacity(32),
            max_frames,
        }
    }

    pub fn value_depth(&self) -> usize {
        self.values.len()
    }

    pub fn label_depth(&self) -> usize {
        self.labels.len()
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /* ===== Value stack ===== */

    pub fn push(&mut self, v: Value) {
        self.values.push(v);
    }

    pub fn pop(&mut self) -> Result<Value, Trap> {
        self.values.pop().ok_or(Trap::TypeMismatch)
    }

    /// Pop the top `n` values, preserving push order (first pushed first).
    pub fn pop_top_n(&mut self, n: u32) -> Result<SmallVec<[Value; 8]>, Trap> {
        let n = n as usize;
        let start = self.values.len().checked_sub(n).ok_or(Trap::TypeMismatch)?;
        Ok(self.values.drain(start..).collect())
    }

    /// Frame-relative local slot: arguments first, then declared locals.
    pub fn local(&self, idx: u32) -> Result<Value, Trap> {
        let frame = self.frames.last().ok_or(Trap::TypeMismatch)?;
        self.values
            .get(frame.vbase + idx as usize)
            .copied()
            .ok_or(Trap::TypeMismatch)
    }

    pub fn set_local(&mut self, idx: u32, v: Value) -> Result<(), Trap> {
        let frame = self.frames.last().ok_or(Trap::TypeMismatch)?;
        let slot = self
            .values
            .get_mut(frame.vbase + idx as usize)
            .ok_or(Trap::TypeMismatch)?;
        *slot = v;
        Ok(())
    }

    /* ===== Frame stack ===== */

    /// Sentinel bottom frame for an invocation; lookups from it yield none.
    pub fn push_dummy_frame(&mut self) {
        self.frames.push(Frame {
            module: None,
            args_n: 0,
            rets_n: 0,
            tail_call: false,
            vbase: self.values.len(),
            lbase: self.labels.len(),
        });
    }

    /// Record a call frame. The top `args_n` values become the callee's
    /// argument region. A tail call replaces the caller's frame in situ: the
    /// caller's frame and labels are removed and its value region is rebased
    /// so the arguments are the sole survivors.
    pub fn push_frame(
        &mut self,
        module: Option<InstanceHandle>,
        args_n: u32,
        rets_n: u32,
        tail_call: bool,
    ) -> Result<(), Trap> {
        if tail_call {
            let caller = self.frames.pop().ok_or(Trap::TypeMismatch)?;
            self.labels.truncate(caller.lbase);
            let args_start = self
                .values
                .len()
                .checked_sub(args_n as usize)
                .ok_or(Trap::TypeMismatch)?;
            self.values.drain(caller.vbase..args_start);
        } else if self.frames.len() >= self.max_frames {
            return Err(Trap::StackOverflow);
        }

        let vbase = self
            .values
            .len()
            .checked_sub(args_n as usize)
            .ok_or(Trap::TypeMismatch)?;
        self.frames.push(Frame {
            module,
            args_n,
            rets_n,
            tail_call,
            vbase,
            lbase: self.labels.len(),
        });
        Ok(())
    }

    /// Drop the current frame, every label above it, and every value between
    /// the frame's base and its return results. Returns the caller's saved
    /// continuation, held in the deepest label popped.
    pub fn pop_frame(&mut self) -> Result<Pc, Trap> {
        let frame = self.frames.pop().ok_or(Trap::TypeMismatch)?;
        let cont = self
            .labels
            .get(frame.lbase)
            .map(|l| l.cont.clone())
            .ok_or(Trap::TypeMismatch)?;
        self.labels.truncate(frame.lbase);

        let keep_from = self
            .values
            .len()
            .checked_sub(frame.rets_n as usize)
            .ok_or(Trap::TypeMismatch)?;
        debug_assert!(keep_from >= frame.vbase, "results below frame base");
        self.values.drain(frame.vbase..keep_from);
        Ok(cont)
    }

    pub fn top_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn is_top_dummy_frame(&self) -> bool {
        self.frames.last().map_or(true, |f| f.module.is_none())
    }

    /// Module of the current frame; None from the dummy frame.
    pub fn module_handle(&self) -> Option<InstanceHandle> {
        self.frames.last().and_then(|f| f.module)
    }

    /* ===== Label stack ===== */

    /// Record a label whose value base is the current size minus the
    /// parameter arity. `loop_head` is set when entering a loop.
    pub fn push_label(&mut self, params: u32, results: u32, cont: Pc, loop_head: Option<Pc>) {
        let vbase = self.values.len() - params as usize;
        self.labels.push(Label {
            params,
            results,
            cont,
            loop_head,
            vbase,
        });
    }

    /// Drop the top `n` labels for a branch. The value stack keeps the
    /// target label's branch-arity values on top and is truncated down to
    /// the label's base underneath them. Returns the target's continuation.
    pub fn pop_label(&mut self, n: usize) -> Result<Pc, Trap> {
        if n == 0 {
            return Err(Trap::TypeMismatch);
        }
        let idx = self.labels.len().checked_sub(n).ok_or(Trap::TypeMismatch)?;
        let target = self.labels[idx].clone();
        let keep_from = self
            .values
            .len()
            .checked_sub(target.results as usize)
            .ok_or(Trap::TypeMismatch)?;
        if keep_from < target.vbase {
            return Err(Trap::TypeMismatch);
        }
        self.values.drain(target.vbase..keep_from);
        self.labels.truncate(idx);
        Ok(target.cont)
    }

    /// Pop one label without touching values: the `end` of a block, where
    /// validation guarantees exactly the result arity sits above the base.
    pub fn leave_label(&mut self) -> Result<(), Trap> {
        self.labels.pop().map(|_| ()).ok_or(Trap::TypeMismatch)
    }

    /// Peek the (n+1)th-from-top label without mutating anything.
    pub fn label_with_count(&self, n: usize) -> Result<&Label, Trap> {
        let idx = self
            .labels
            .len()
            .checked_sub(n + 1)
            .ok_or(Trap::TypeMismatch)?;
        Ok(&self.labels[idx])
    }

    /// Labels belonging to the current frame; the deepest one is the
    /// function-entry label.
    pub fn labels_in_frame(&self) -> usize {
        match self.frames.last() {
            Some(f) => self.labels.len() - f.lbase,
            None => self.labels.len(),
        }
    }

    /// The current function's return continuation, held in its deepest
    /// label. Used by tail calls to carry the caller's continuation into the
    /// replacement frame.
    pub fn frame_return_cont(&self) -> Result<Pc, Trap> {
        let frame = self.frames.last().ok_or(Trap::TypeMismatch)?;
        self.labels
            .get(frame.lbase)
            .map(|l| l.cont.clone())
            .ok_or(Trap::TypeMismatch)
    }

    /* ===== Unwinding ===== */

    pub fn snapshot(&self) -> StackSnapshot {
        StackSnapshot {
            values: self.values.len(),
            labels: self.labels.len(),
            frames: self.frames.len(),
        }
    }

    /// Restore the depths captured by [`snapshot`]. Used on both normal
    /// completion (dropping the dummy frame) and trap unwind, so a trapped
    /// invocation leaves the manager exactly as it found it.
    pub fn unwind_to(&mut self, s: &StackSnapshot) {
        self.values.truncate(s.values);
        self.labels.truncate(s.labels);
        self.frames.truncate(s.frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn mgr() -> StackManager {
        StackManager::new(64)
    }

    fn pc() -> Pc {
        Pc::end_sentinel()
    }

    fn handle() -> Option<InstanceHandle> {
        Some(InstanceHandle(0))
    }

    #[test]
    fn pop_top_n_preserves_order() {
        let mut s = mgr();
        s.push(Value::I32(1));
        s.push(Value::I32(2));
        s.push(Value::I32(3));
        let top = s.pop_top_n(2).unwrap();
        assert_eq!(&top[..], &[Value::I32(2), Value::I32(3)]);
        assert_eq!(s.value_depth(), 1);
    }

    #[test]
    fn pop_top_zero_is_noop() {
        let mut s = mgr();
        s.push(Value::I32(1));
        let top = s.pop_top_n(0).unwrap();
        assert!(top.is_empty());
        assert_eq!(s.value_depth(), 1);
    }

    #[test]
    fn frame_round_trip() {
        let mut s = mgr();
        s.push_dummy_frame();
        s.push(Value::I32(10)); // argument
        s.push_frame(handle(), 1, 1, false).unwrap();
        s.push_label(0, 1, pc(), None);
        let labels_at_entry = s.label_depth();

        // Body produces one result above the argument.
        s.push(Value::I32(42));
        let _ = s.pop_frame().unwrap();

        // Result replaced the argument; labels back to the entry depth.
        assert_eq!(s.value_depth(), 1);
        assert_eq!(s.pop().unwrap(), Value::I32(42));
        assert_eq!(s.label_depth(), labels_at_entry - 1);
        assert!(s.is_top_dummy_frame());
    }

    #[test]
    fn pop_frame_drops_locals_and_inner_labels() {
        let mut s = mgr();
        s.push_dummy_frame();
        s.push(Value::I32(1));
        s.push(Value::I32(2));
        s.push_frame(handle(), 2, 1, false).unwrap();
        // Locals pushed after the arguments.
        s.push(Value::I64(0));
        s.push_label(0, 1, pc(), None);
        // Some leftover operands plus a nested block label.
        s.push(Value::I32(9));
        s.push_label(0, 0, pc(), None);
        s.push(Value::I32(7)); // the result

        let _ = s.pop_frame().unwrap();
        assert_eq!(s.value_depth(), 1);
        assert_eq!(s.pop().unwrap(), Value::I32(7));
        assert_eq!(s.label_depth(), 0);
    }

    #[test]
    fn label_round_trip_restores_depth() {
        let mut s = mgr();
        s.push(Value::I32(5));
        let before = s.value_depth();
        // params == results == 1: branch transports the value unchanged.
        s.push_label(1, 1, pc(), None);
        let cont = s.pop_label(1).unwrap();
        assert!(cont.at_end());
        assert_eq!(s.value_depth(), before);
        assert_eq!(s.pop().unwrap(), Value::I32(5));
    }

    #[test]
    fn pop_label_truncates_to_base_plus_results() {
        let mut s = mgr();
        s.push_label(0, 1, pc(), None);
        let base = s.label_with_count(0).unwrap().vbase();
        // Junk operands below the branch value.
        s.push(Value::I32(1));
        s.push(Value::I32(2));
        s.push(Value::I32(3));
        s.pop_label(1).unwrap();
        assert_eq!(s.value_depth(), base + 1);
        assert_eq!(s.pop().unwrap(), Value::I32(3));
    }

    #[test]
    fn label_with_count_peeks_from_top() {
        let mut s = mgr();
        s.push_label(0, 0, pc(), None);
        s.push_label(0, 1, pc(), None);
        assert_eq!(s.label_with_count(0).unwrap().results(), 1);
        assert_eq!(s.label_with_count(1).unwrap().results(), 0);
        assert_eq!(s.label_depth(), 2);
    }

    #[test]
    fn tail_call_replaces_frame() {
        let mut s = mgr();
        s.push_dummy_frame();
        s.push(Value::I32(1));
        s.push_frame(handle(), 1, 1, false).unwrap();
        s.push_label(0, 1, pc(), None);
        // Caller locals and junk.
        s.push(Value::I64(0));
        s.push(Value::I32(99));
        // The tail callee's single argument on top.
        s.push(Value::I32(7));

        let frames_before = s.frame_depth();
        s.push_frame(handle(), 1, 1, true).unwrap();

        assert_eq!(s.frame_depth(), frames_before);
        // Only the argument survived above the replaced frame's base.
        assert_eq!(s.value_depth(), 1);
        assert_eq!(s.local(0).unwrap(), Value::I32(7));
        assert_eq!(s.label_depth(), 0);
    }

    #[test]
    fn frame_depth_ceiling() {
        let mut s = StackManager::new(2);
        s.push_dummy_frame();
        s.push_frame(handle(), 0, 0, false).unwrap();
        assert_eq!(
            s.push_frame(handle(), 0, 0, false).unwrap_err(),
            Trap::StackOverflow
        );
    }

    #[test]
    fn locals_are_frame_relative() {
        let mut s = mgr();
        s.push_dummy_frame();
        s.push(Value::I32(11));
        s.push(Value::I32(22));
        s.push_frame(handle(), 2, 0, false).unwrap();
        assert_eq!(s.local(0).unwrap(), Value::I32(11));
        assert_eq!(s.local(1).unwrap(), Value::I32(22));
        s.set_local(0, Value::I32(33)).unwrap();
        assert_eq!(s.local(0).unwrap(), Value::I32(33));
        assert!(s.local(2).is_err());
    }

    #[test]
    fn loop_head_kept_on_label() {
        let mut s = mgr();
        let code: Arc<[skiff_wasm::Instr]> = Arc::from(vec![
            skiff_wasm::Instr::Loop {
                ty: skiff_wasm::BlockType::Empty,
                end: 1,
            },
            skiff_wasm::Instr::End,
        ]);
        let head = Pc::new(code);
        s.push_label(0, 0, head.next(), Some(head.clone()));
        let l = s.label_with_count(0).unwrap();
        assert_eq!(l.loop_head().unwrap().index(), 0);
        assert_eq!(l.cont().index(), 1);
    }

    #[test]
    fn unwind_restores_all_depths() {
        let mut s = mgr();
        s.push(Value::I32(1));
        let snap = s.snapshot();
        s.push_dummy_frame();
        s.push(Value::I32(2));
        s.push_frame(handle(), 1, 0, false).unwrap();
        s.push_label(0, 0, pc(), None);
        s.unwind_to(&snap);
        assert_eq!(s.value_depth(), 1);
        assert_eq!(s.label_depth(), 0);
        assert_eq!(s.frame_depth(), 0);
    }
}
