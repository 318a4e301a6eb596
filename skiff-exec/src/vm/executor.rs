//! The executor: call entry, branch engine, block arity, instance
//! resolvers, and the outermost invoke boundary. The per-opcode dispatch
//! loop lives in the sibling interpreter module.

use smallvec::{smallvec, SmallVec};

use skiff_wasm::model::{BlockType, ValType};
use skiff_wasm::Instr;

use crate::error::Trap;
use crate::runtime::{
    DataInstance, ElementInstance, FuncBody, GlobalInstance, InstanceHandle, MemoryInstance, Store,
    TableInstance,
};
use crate::stats::Statistics;
use crate::values::Value;
use crate::vm::context::ExecutionContext;
use crate::vm::fault::{self, InterruptHandle};
use crate::vm::stack::StackManager;
use crate::vm::Pc;

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Call-frame ceiling; exceeding it traps with `StackOverflow`.
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
        }
    }
}

/// A single-threaded execution engine over a store.
///
/// One executor runs one invocation at a time; concurrent Wasm execution
/// requires independent executor/store pairs.
pub struct Executor {
    pub(crate) stack: StackManager,
    pub(crate) stats: Option<Statistics>,
    pub(crate) interrupt: InterruptHandle,
    pub(crate) ctx: ExecutionContext,
    globals_scratch: Vec<*mut Value>,
}

impl Executor {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            stack: StackManager::new(config.max_call_depth),
            stats: None,
            interrupt: InterruptHandle::new(),
            ctx: ExecutionContext::empty(),
            globals_scratch: Vec::new(),
        }
    }

    /// Enable statistics collection (cost metering and timers).
    pub fn with_statistics(mut self, stats: Statistics) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn statistics(&self) -> Option<&Statistics> {
        self.stats.as_ref()
    }

    pub fn statistics_mut(&mut self) -> Option<&mut Statistics> {
        self.stats.as_mut()
    }

    /// A handle that asynchronously terminates the running invocation.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Current operand stack depth; zero between invocations.
    pub fn value_stack_depth(&self) -> usize {
        self.stack.value_depth()
    }

    /// Current call-frame depth (including the dummy frame while running).
    pub fn frame_depth(&self) -> usize {
        self.stack.frame_depth()
    }

    /* ===== Dispatcher entry ===== */

    /// Execute one function end to end: check the provided arguments against
    /// the function type, run to completion, and return the results. All
    /// errors unwind to here; the stacks are restored so the executor stays
    /// usable after a trap.
    pub fn invoke(
        &mut self,
        store: &mut Store,
        func_addr: usize,
        args: &[Value],
        arg_types: &[ValType],
    ) -> Result<Vec<Value>, Trap> {
        let func = store.get_func(func_addr).ok_or(Trap::FunctionNotFound)?;
        let ty = func.ty();
        if args.len() != ty.params.len()
            || arg_types.len() != ty.params.len()
            || arg_types.iter().zip(&ty.params).any(|(a, p)| a != p)
        {
            tracing::error!(
                expected = ?ty.params,
                provided = ?arg_types,
                "argument signature mismatch"
            );
            return Err(Trap::TypeMismatch);
        }
        let rets_n = ty.results.len() as u32;

        let snapshot = self.stack.snapshot();
        self.stack.push_dummy_frame();
        for a in args {
            self.stack.push(*a);
        }
        self.interrupt.clear();
        if let Some(stats) = self.stats.as_mut() {
            stats.start_record_wasm();
        }

        let result = self
            .enter_function(store, func_addr, Pc::end_sentinel(), false)
            .and_then(|pc| self.run(store, pc));

        if let Some(stats) = self.stats.as_mut() {
            stats.stop_record_wasm();
        }

        match result {
            Ok(()) => {
                let rets = self.stack.pop_top_n(rets_n)?;
                self.stack.unwind_to(&snapshot);
                Ok(rets.into_vec())
            }
            Err(trap) => {
                tracing::error!(%trap, func_addr, "invocation trapped");
                self.stack.unwind_to(&snapshot);
                Err(trap)
            }
        }
    }

    /* ===== Call entry ===== */

    /// The single entry point for every call site: direct calls, indirect
    /// calls, tail calls, and exported invocations. `back_pc` is the
    /// position after the calling instruction. Returns the next pc to
    /// execute.
    pub fn enter_function(
        &mut self,
        store: &mut Store,
        func_addr: usize,
        back_pc: Pc,
        is_tail_call: bool,
    ) -> Result<Pc, Trap> {
        let func = store
            .get_func(func_addr)
            .cloned()
            .ok_or(Trap::FunctionNotFound)?;
        let args_n = func.ty().params.len() as u32;
        let rets_n = func.ty().results.len() as u32;

        self.stack
            .push_frame(func.module_handle(), args_n, rets_n, is_tail_call)?;

        match func.body() {
            FuncBody::Host { callable } => {
                // A host body has no instructions to iterate; this label
                // exists so the pop_frame below yields back_pc.
                self.stack.push_label(0, rets_n, back_pc, None);

                // Memory index 0 through the current frame; None from a
                // dummy frame or a module without memory.
                let mem_addr = self.memory_addr_by_idx(store, 0);

                if let Some(stats) = self.stats.as_mut() {
                    if !stats.add_cost(callable.cost()) {
                        tracing::error!(cost = callable.cost(), "host call cost exceeds limit");
                        return Err(Trap::CostLimitExceeded);
                    }
                    stats.stop_record_wasm();
                    stats.start_record_host();
                }

                let args = self.stack.pop_top_n(args_n)?;
                let mut rets: SmallVec<[Value; 8]> = smallvec![Value::I32(0); rets_n as usize];
                let memory = match mem_addr {
                    Some(addr) => store.get_memory_mut(addr),
                    None => None,
                };
                let result = callable.run(memory, &args, &mut rets);

                if let Some(stats) = self.stats.as_mut() {
                    stats.stop_record_host();
                    stats.start_record_wasm();
                }

                if let Err(code) = result {
                    // Only the generic failure is annotated here; other
                    // codes are logged once at the invoke boundary.
                    if code == Trap::ExecutionFailed {
                        tracing::error!("host function reported failure");
                    }
                    return Err(code);
                }

                for r in rets {
                    self.stack.push(r);
                }
                self.stack.pop_frame()
            }

            FuncBody::Compiled { body, trampoline } => {
                // Same label shape as the host case: compiled bodies are not
                // iterated, so control continues at back_pc after pop_frame.
                self.stack.push_label(0, rets_n, back_pc, None);

                let args = self.stack.pop_top_n(args_n)?;
                let mut rets: SmallVec<[Value; 8]> = smallvec![Value::I32(0); rets_n as usize];

                self.refresh_execution_context(store, func.module_handle());

                let tramp = *trampoline;
                let sym = *body;
                let ctx = &mut self.ctx;
                let guarded = fault::scope(|| tramp(ctx, sym, &args, &mut rets));
                if let Err(code) = guarded {
                    if code != Trap::Terminated {
                        tracing::error!(%code, "compiled function trapped");
                    }
                    return Err(code);
                }

                for r in rets {
                    self.stack.push(r);
                }
                self.stack.pop_frame()
            }

            FuncBody::Bytecode { locals, code } => {
                // Locals become zero-valued operands directly above the
                // arguments, in slot order.
                for decl in locals {
                    for _ in 0..decl.count {
                        self.stack.push(Value::default_for(decl.val_type));
                    }
                }
                // Continuations name the next instruction to execute, so
                // back_pc is stored as-is.
                self.stack.push_label(0, rets_n, back_pc, None);
                Ok(Pc::new(code.clone()))
            }
        }
    }

    /* ===== Branch engine ===== */

    /// `br count`. Pops count + 1 labels and either jumps to the target's
    /// continuation (block/if) or rebuilds the loop label and re-enters the
    /// loop from its first body instruction. A branch that reaches the
    /// function's deepest label is a return.
    pub fn branch_to_label(&mut self, store: &Store, count: u32, pc: &mut Pc) -> Result<(), Trap> {
        if count as usize + 1 >= self.stack.labels_in_frame() {
            *pc = self.stack.pop_frame()?;
            return Ok(());
        }

        let target = self.stack.label_with_count(count as usize)?;
        let loop_head = target.loop_head().cloned();

        *pc = self.stack.pop_label(count as usize + 1)?;

        if let Some(head) = loop_head {
            // Loops re-consume their parameters each iteration, so the fresh
            // label's branch arity is the parameter count.
            let ty = match head.instr() {
                Some(Instr::Loop { ty, .. }) => *ty,
                _ => return Err(Trap::IllegalInstruction),
            };
            let (params, _) = self.block_arity(store, ty)?;
            let body = head.next();
            self.stack
                .push_label(params, params, body.clone(), Some(head));
            *pc = body;
        }
        Ok(())
    }

    /// Decode a block type into (parameter count, result count) against the
    /// current frame's module.
    pub fn block_arity(&self, store: &Store, ty: BlockType) -> Result<(u32, u32), Trap> {
        Ok(match ty {
            BlockType::Empty => (0, 0),
            BlockType::Value(_) => (0, 1),
            BlockType::Func(idx) => {
                let handle = self.stack.module_handle().ok_or(Trap::TypeMismatch)?;
                let fty = store
                    .get_module(handle.0)
                    .and_then(|inst| inst.func_type(idx))
                    .ok_or(Trap::TypeMismatch)?;
                (fty.params.len() as u32, fty.results.len() as u32)
            }
        })
    }

    /* ===== Instance resolvers ===== */
    //
    // Each performs the same walk: nothing from a dummy frame, then
    // module-local index -> store address -> instance, yielding None at
    // every miss. Resolution never traps; callers map None to the relevant
    // error.

    pub fn table_addr_by_idx(&self, store: &Store, idx: u32) -> Option<usize> {
        if self.stack.is_top_dummy_frame() {
            return None;
        }
        store
            .get_module(self.stack.module_handle()?.0)?
            .table_addr(idx)
    }

    pub fn table_by_idx<'s>(&self, store: &'s Store, idx: u32) -> Option<&'s TableInstance> {
        store.get_table(self.table_addr_by_idx(store, idx)?)
    }

    pub fn memory_addr_by_idx(&self, store: &Store, idx: u32) -> Option<usize> {
        if self.stack.is_top_dummy_frame() {
            return None;
        }
        store
            .get_module(self.stack.module_handle()?.0)?
            .mem_addr(idx)
    }

    pub fn memory_by_idx<'s>(&self, store: &'s Store, idx: u32) -> Option<&'s MemoryInstance> {
        store.get_memory(self.memory_addr_by_idx(store, idx)?)
    }

    pub fn global_addr_by_idx(&self, store: &Store, idx: u32) -> Option<usize> {
        if self.stack.is_top_dummy_frame() {
            return None;
        }
        store
            .get_module(self.stack.module_handle()?.0)?
            .global_addr(idx)
    }

    pub fn global_by_idx<'s>(&self, store: &'s Store, idx: u32) -> Option<&'s GlobalInstance> {
        store.get_global(self.global_addr_by_idx(store, idx)?)
    }

    pub fn element_addr_by_idx(&self, store: &Store, idx: u32) -> Option<usize> {
        if self.stack.is_top_dummy_frame() {
            return None;
        }
        store
            .get_module(self.stack.module_handle()?.0)?
            .elem_addr(idx)
    }

    pub fn element_by_idx<'s>(&self, store: &'s Store, idx: u32) -> Option<&'s ElementInstance> {
        store.get_element(self.element_addr_by_idx(store, idx)?)
    }

    pub fn data_addr_by_idx(&self, store: &Store, idx: u32) -> Option<usize> {
        if self.stack.is_top_dummy_frame() {
            return None;
        }
        store
            .get_module(self.stack.module_handle()?.0)?
            .data_addr(idx)
    }

    pub fn data_by_idx<'s>(&self, store: &'s Store, idx: u32) -> Option<&'s DataInstance> {
        store.get_data(self.data_addr_by_idx(store, idx)?)
    }

    /// Function address in the current frame's module.
    pub(crate) fn func_addr_by_idx(&self, store: &Store, idx: u32) -> Result<usize, Trap> {
        self.stack
            .module_handle()
            .and_then(|h| store.get_module(h.0))
            .and_then(|inst| inst.func_addr(idx))
            .ok_or(Trap::FunctionNotFound)
    }

    /* ===== Compiled-code context ===== */

    /// Point the execution context at the callee module's memory base and
    /// globals, so compiled code dereferences them without engine calls.
    /// Valid until the next refresh; compiled entry refreshes every call.
    fn refresh_execution_context(&mut self, store: &mut Store, module: Option<InstanceHandle>) {
        let (mem_addr, glob_addrs) = match module.and_then(|h| store.get_module(h.0)) {
            Some(inst) => (inst.memories.first().copied(), inst.globals.clone()),
            None => (None, Vec::new()),
        };

        self.globals_scratch.clear();
        for addr in glob_addrs {
            let ptr = store
                .get_global_mut(addr)
                .map(|g| g.value_ptr())
                .unwrap_or(std::ptr::null_mut());
            self.globals_scratch.push(ptr);
        }

        self.ctx.memory = mem_addr
            .and_then(|a| store.get_memory_mut(a))
            .map(|m| m.data_mut().as_mut_ptr())
            .unwrap_or(std::ptr::null_mut());
        self.ctx.globals = self.globals_scratch.as_mut_ptr();
        self.ctx.globals_len = self.globals_scratch.len();
        self.ctx.store = store as *mut Store;
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}
