//! The dispatch loop: fetch, advance, execute, until control returns to the
//! sentinel continuation of the outermost call.

use skiff_wasm::model::RefType;
use skiff_wasm::{Instr, MemArg};

use crate::error::Trap;
use crate::runtime::{MemoryInstance, Store};
use crate::values::Value;
use crate::vm::executor::Executor;
use crate::vm::stack::StackManager;
use crate::vm::Pc;

impl Executor {
    /// Run from `pc` until the program counter reaches the end sentinel with
    /// only the dummy frame left.
    pub(crate) fn run(&mut self, store: &mut Store, mut pc: Pc) -> Result<(), Trap> {
        loop {
            if pc.at_end() {
                if self.stack.is_top_dummy_frame() {
                    return Ok(());
                }
                return Err(Trap::IllegalInstruction);
            }
            if self.interrupt.is_set() {
                return Err(Trap::Terminated);
            }
            if let Some(stats) = self.stats.as_mut() {
                stats.count_instr();
                if !stats.add_cost(1) {
                    return Err(Trap::CostLimitExceeded);
                }
            }

            let code = pc.code().clone();
            let instr = &code[pc.index()];
            pc.advance();

            match instr {
                /* ===== Control ===== */
                Instr::Unreachable => return Err(Trap::Unreachable),
                Instr::Nop => {}

                Instr::Block { ty, end } => {
                    let (params, results) = self.block_arity(store, *ty)?;
                    let cont = pc.with_index(*end as usize + 1);
                    self.stack.push_label(params, results, cont, None);
                }
                Instr::Loop { ty, .. } => {
                    // Branch arity of a loop label is its parameter count;
                    // the label keeps the loop head for reconstruction.
                    let (params, _) = self.block_arity(store, *ty)?;
                    let head = pc.with_index(pc.index() - 1);
                    self.stack.push_label(params, params, pc.clone(), Some(head));
                }
                Instr::If { ty, else_at, end } => {
                    let cond = self.stack.pop()?.as_i32();
                    let (params, results) = self.block_arity(store, *ty)?;
                    let cont = pc.with_index(*end as usize + 1);
                    self.stack.push_label(params, results, cont, None);
                    if cond == 0 {
                        match else_at {
                            Some(e) => pc.jump(*e as usize + 1),
                            // No else: run the end, which pops the label.
                            None => pc.jump(*end as usize),
                        }
                    }
                }
                Instr::Else { end } => {
                    // Fallthrough from the then-branch: skip to the end.
                    pc.jump(*end as usize);
                }
                Instr::End => {
                    if self.stack.labels_in_frame() <= 1 {
                        pc = self.stack.pop_frame()?;
                    } else {
                        self.stack.leave_label()?;
                    }
                }

                Instr::Br(l) => self.branch_to_label(store, *l, &mut pc)?,
                Instr::BrIf(l) => {
                    if self.stack.pop()?.as_i32() != 0 {
                        self.branch_to_label(store, *l, &mut pc)?;
                    }
                }
                Instr::BrTable { targets, default } => {
                    let i = self.stack.pop()?.as_i32() as usize;
                    let l = targets.get(i).copied().unwrap_or(*default);
                    self.branch_to_label(store, l, &mut pc)?;
                }
                Instr::Return => pc = self.stack.pop_frame()?,

                Instr::Call(f) => {
                    let faddr = self.func_addr_by_idx(store, *f)?;
                    pc = self.enter_function(store, faddr, pc.clone(), false)?;
                }
                Instr::CallIndirect { type_idx, table } => {
                    let faddr = self.resolve_indirect(store, *type_idx, *table)?;
                    pc = self.enter_function(store, faddr, pc.clone(), false)?;
                }
                Instr::ReturnCall(f) => {
                    let back = self.stack.frame_return_cont()?;
                    let faddr = self.func_addr_by_idx(store, *f)?;
                    pc = self.enter_function(store, faddr, back, true)?;
                }
                Instr::ReturnCallIndirect { type_idx, table } => {
                    let back = self.stack.frame_return_cont()?;
                    let faddr = self.resolve_indirect(store, *type_idx, *table)?;
                    pc = self.enter_function(store, faddr, back, true)?;
                }

                /* ===== Reference ===== */
                Instr::RefNull(rt) => self.stack.push(match rt {
                    RefType::FuncRef => Value::FuncRef(None),
                    RefType::ExternRef => Value::ExternRef(None),
                }),
                Instr::RefIsNull => {
                    let v = self.stack.pop()?;
                    self.stack.push(Value::I32(v.is_null_ref() as i32));
                }
                Instr::RefFunc(f) => {
                    let faddr = self.func_addr_by_idx(store, *f)?;
                    self.stack.push(Value::FuncRef(Some(faddr)));
                }

                /* ===== Parametric ===== */
                Instr::Drop => {
                    self.stack.pop()?;
                }
                Instr::Select | Instr::SelectT(_) => {
                    let cond = self.stack.pop()?.as_i32();
                    let v2 = self.stack.pop()?;
                    let v1 = self.stack.pop()?;
                    debug_assert_eq!(
                        std::mem::discriminant(&v1),
                        std::mem::discriminant(&v2),
                        "select operand types diverge"
                    );
                    self.stack.push(if cond != 0 { v1 } else { v2 });
                }

                /* ===== Variables ===== */
                Instr::LocalGet(i) => {
                    let v = self.stack.local(*i)?;
                    self.stack.push(v);
                }
                Instr::LocalSet(i) => {
                    let v = self.stack.pop()?;
                    self.stack.set_local(*i, v)?;
                }
                Instr::LocalTee(i) => {
                    let v = self.stack.pop()?;
                    self.stack.set_local(*i, v)?;
                    self.stack.push(v);
                }
                Instr::GlobalGet(i) => {
                    let v = self
                        .global_by_idx(store, *i)
                        .ok_or(Trap::TypeMismatch)?
                        .get();
                    self.stack.push(v);
                }
                Instr::GlobalSet(i) => {
                    let v = self.stack.pop()?;
                    let addr = self.global_addr_by_idx(store, *i).ok_or(Trap::TypeMismatch)?;
                    store
                        .get_global_mut(addr)
                        .ok_or(Trap::TypeMismatch)?
                        .set(v)
                        .map_err(|_| Trap::TypeMismatch)?;
                }

                /* ===== Tables ===== */
                Instr::TableGet(t) => {
                    let i = self.stack.pop()?.as_i32() as u32;
                    let tab = self.table_by_idx(store, *t).ok_or(Trap::UndefinedElement)?;
                    let slot = tab.get(i).ok_or(Trap::TableOutOfBounds)?;
                    let v = match tab.elem_type() {
                        RefType::FuncRef => Value::FuncRef(slot),
                        RefType::ExternRef => Value::ExternRef(slot),
                    };
                    self.stack.push(v);
                }
                Instr::TableSet(t) => {
                    let v = self.stack.pop()?;
                    let i = self.stack.pop()?.as_i32() as u32;
                    let addr = self.table_addr_by_idx(store, *t).ok_or(Trap::UndefinedElement)?;
                    store
                        .get_table_mut(addr)
                        .ok_or(Trap::UndefinedElement)?
                        .set(i, v.as_ref())
                        .map_err(|_| Trap::TableOutOfBounds)?;
                }
                Instr::TableSize(t) => {
                    let size = self.table_by_idx(store, *t).ok_or(Trap::UndefinedElement)?.size();
                    self.stack.push(Value::I32(size as i32));
                }
                Instr::TableGrow(t) => {
                    let n = self.stack.pop()?.as_i32() as u32;
                    let init = self.stack.pop()?.as_ref();
                    let addr = self.table_addr_by_idx(store, *t).ok_or(Trap::UndefinedElement)?;
                    let prev = store
                        .get_table_mut(addr)
                        .ok_or(Trap::UndefinedElement)?
                        .grow(n, init);
                    self.stack
                        .push(Value::I32(prev.map(|p| p as i32).unwrap_or(-1)));
                }
                Instr::TableFill(t) => {
                    let n = self.stack.pop()?.as_i32() as u32;
                    let v = self.stack.pop()?.as_ref();
                    let d = self.stack.pop()?.as_i32() as u32;
                    let addr = self.table_addr_by_idx(store, *t).ok_or(Trap::UndefinedElement)?;
                    store
                        .get_table_mut(addr)
                        .ok_or(Trap::UndefinedElement)?
                        .fill(d, v, n)
                        .map_err(|_| Trap::TableOutOfBounds)?;
                }
                Instr::TableInit { elem, table } => {
                    let n = self.stack.pop()?.as_i32() as u32;
                    let s = self.stack.pop()?.as_i32() as u32;
                    let d = self.stack.pop()?.as_i32() as u32;
                    let eaddr = self
                        .element_addr_by_idx(store, *elem)
                        .ok_or(Trap::UndefinedElement)?;
                    let taddr = self
                        .table_addr_by_idx(store, *table)
                        .ok_or(Trap::UndefinedElement)?;
                    // Whole source range checked before any slot is written.
                    let refs = {
                        let seg = store.get_element(eaddr).ok_or(Trap::UndefinedElement)?;
                        let start = s as usize;
                        let end = start.checked_add(n as usize).ok_or(Trap::TableOutOfBounds)?;
                        if end > seg.refs().len() {
                            return Err(Trap::TableOutOfBounds);
                        }
                        seg.refs()[start..end].to_vec()
                    };
                    store
                        .get_table_mut(taddr)
                        .ok_or(Trap::UndefinedElement)?
                        .init(d, &refs)
                        .map_err(|_| Trap::TableOutOfBounds)?;
                }
                Instr::ElemDrop(e) => {
                    let addr = self
                        .element_addr_by_idx(store, *e)
                        .ok_or(Trap::UndefinedElement)?;
                    store
                        .get_element_mut(addr)
                        .ok_or(Trap::UndefinedElement)?
                        .drop_refs();
                }
                Instr::TableCopy { dst, src } => {
                    let n = self.stack.pop()?.as_i32() as u32;
                    let s = self.stack.pop()?.as_i32() as u32;
                    let d = self.stack.pop()?.as_i32() as u32;
                    let saddr = self.table_addr_by_idx(store, *src).ok_or(Trap::UndefinedElement)?;
                    let daddr = self.table_addr_by_idx(store, *dst).ok_or(Trap::UndefinedElement)?;
                    let slots = store
                        .get_table(saddr)
                        .ok_or(Trap::UndefinedElement)?
                        .slots(s, n)
                        .map_err(|_| Trap::TableOutOfBounds)?;
                    store
                        .get_table_mut(daddr)
                        .ok_or(Trap::UndefinedElement)?
                        .init(d, &slots)
                        .map_err(|_| Trap::TableOutOfBounds)?;
                }

                /* ===== Memory loads ===== */
                Instr::I32Load(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u32(a).map_err(oob)?;
                    self.stack.push(Value::I32(v as i32));
                }
                Instr::I64Load(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u64(a).map_err(oob)?;
                    self.stack.push(Value::I64(v as i64));
                }
                Instr::F32Load(m) => {
                    let a = self.effective_addr(*m)?;
                    let bits = self.mem(store)?.load_u32(a).map_err(oob)?;
                    self.stack.push(Value::F32(bits));
                }
                Instr::F64Load(m) => {
                    let a = self.effective_addr(*m)?;
                    let bits = self.mem(store)?.load_u64(a).map_err(oob)?;
                    self.stack.push(Value::F64(bits));
                }
                Instr::I32Load8S(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u8(a).map_err(oob)?;
                    self.stack.push(Value::I32((v as i8) as i32));
                }
                Instr::I32Load8U(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u8(a).map_err(oob)?;
                    self.stack.push(Value::I32(v as i32));
                }
                Instr::I32Load16S(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u16(a).map_err(oob)?;
                    self.stack.push(Value::I32((v as i16) as i32));
                }
                Instr::I32Load16U(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u16(a).map_err(oob)?;
                    self.stack.push(Value::I32(v as i32));
                }
                Instr::I64Load8S(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u8(a).map_err(oob)?;
                    self.stack.push(Value::I64((v as i8) as i64));
                }
                Instr::I64Load8U(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u8(a).map_err(oob)?;
                    self.stack.push(Value::I64(v as i64));
                }
                Instr::I64Load16S(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u16(a).map_err(oob)?;
                    self.stack.push(Value::I64((v as i16) as i64));
                }
                Instr::I64Load16U(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u16(a).map_err(oob)?;
                    self.stack.push(Value::I64(v as i64));
                }
                Instr::I64Load32S(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u32(a).map_err(oob)?;
                    self.stack.push(Value::I64((v as i32) as i64));
                }
                Instr::I64Load32U(m) => {
                    let a = self.effective_addr(*m)?;
                    let v = self.mem(store)?.load_u32(a).map_err(oob)?;
                    self.stack.push(Value::I64(v as i64));
                }

                /* ===== Memory stores ===== */
                Instr::I32Store(m) => {
                    let v = self.stack.pop()?.as_i32() as u32;
                    let a = self.effective_addr(*m)?;
                    self.mem_mut(store)?.store_u32(a, v).map_err(oob)?;
                }
                Instr::I64Store(m) => {
                    let v = self.stack.pop()?.as_i64() as u64;
                    let a = self.effective_addr(*m)?;
                    self.mem_mut(store)?.store_u64(a, v).map_err(oob)?;
                }
                Instr::F32Store(m) => {
                    let bits = self.stack.pop()?.as_f32_bits();
                    let a = self.effective_addr(*m)?;
                    self.mem_mut(store)?.store_u32(a, bits).map_err(oob)?;
                }
                Instr::F64Store(m) => {
                    let bits = self.stack.pop()?.as_f64_bits();
                    let a = self.effective_addr(*m)?;
                    self.mem_mut(store)?.store_u64(a, bits).map_err(oob)?;
                }
                Instr::I32Store8(m) => {
                    let v = self.stack.pop()?.as_i32() as u32;
                    let a = self.effective_addr(*m)?;
                    self.mem_mut(store)?.store_u8(a, v as u8).map_err(oob)?;
                }
                Instr::I32Store16(m) => {
                    let v = self.stack.pop()?.as_i32() as u32;
                    let a = self.effective_addr(*m)?;
                    self.mem_mut(store)?.store_u16(a, v as u16).map_err(oob)?;
                }
                Instr::I64Store8(m) => {
                    let v = self.stack.pop()?.as_i64() as u64;
                    let a = self.effective_addr(*m)?;
                    self.mem_mut(store)?.store_u8(a, v as u8).map_err(oob)?;
                }
                Instr::I64Store16(m) => {
                    let v = self.stack.pop()?.as_i64() as u64;
                    let a = self.effective_addr(*m)?;
                    self.mem_mut(store)?.store_u16(a, v as u16).map_err(oob)?;
                }
                Instr::I64Store32(m) => {
                    let v = self.stack.pop()?.as_i64() as u64;
                    let a = self.effective_addr(*m)?;
                    self.mem_mut(store)?.store_u32(a, v as u32).map_err(oob)?;
                }

                Instr::MemorySize => {
                    let pages = self.mem(store)?.size_pages();
                    self.stack.push(Value::I32(pages as i32));
                }
                Instr::MemoryGrow => {
                    let delta = self.stack.pop()?.as_i32() as u32;
                    let prev = self.mem_mut(store)?.grow(delta);
                    self.stack
                        .push(Value::I32(prev.map(|p| p as i32).unwrap_or(-1)));
                }
                Instr::MemoryInit(d_idx) => {
                    let n = self.stack.pop()?.as_i32() as u32;
                    let s = self.stack.pop()?.as_i32() as u32;
                    let d = self.stack.pop()?.as_i32() as u32;
                    let daddr = self
                        .data_addr_by_idx(store, *d_idx)
                        .ok_or(Trap::MemoryOutOfBounds)?;
                    // Whole source range checked before any byte is written.
                    let bytes = {
                        let seg = store.get_data(daddr).ok_or(Trap::MemoryOutOfBounds)?;
                        let start = s as usize;
                        let end = start
                            .checked_add(n as usize)
                            .ok_or(Trap::MemoryOutOfBounds)?;
                        if end > seg.bytes().len() {
                            return Err(Trap::MemoryOutOfBounds);
                        }
                        seg.bytes()[start..end].to_vec()
                    };
                    self.mem_mut(store)?.init(d, &bytes).map_err(oob)?;
                }
                Instr::DataDrop(d_idx) => {
                    let addr = self
                        .data_addr_by_idx(store, *d_idx)
                        .ok_or(Trap::MemoryOutOfBounds)?;
                    store
                        .get_data_mut(addr)
                        .ok_or(Trap::MemoryOutOfBounds)?
                        .drop_bytes();
                }
                Instr::MemoryCopy => {
                    let n = self.stack.pop()?.as_i32() as u32;
                    let s = self.stack.pop()?.as_i32() as u32;
                    let d = self.stack.pop()?.as_i32() as u32;
                    self.mem_mut(store)?.copy_within(d, s, n).map_err(oob)?;
                }
                Instr::MemoryFill => {
                    let n = self.stack.pop()?.as_i32() as u32;
                    let v = self.stack.pop()?.as_i32() as u8;
                    let d = self.stack.pop()?.as_i32() as u32;
                    self.mem_mut(store)?.fill(d, v, n).map_err(oob)?;
                }

                /* ===== Constants ===== */
                Instr::I32Const(v) => self.stack.push(Value::I32(*v)),
                Instr::I64Const(v) => self.stack.push(Value::I64(*v)),
                Instr::F32Const(bits) => self.stack.push(Value::F32(*bits)),
                Instr::F64Const(bits) => self.stack.push(Value::F64(*bits)),
                Instr::V128Const(v) => self.stack.push(Value::V128(*v)),

                /* ===== i32 comparisons ===== */
                Instr::I32Eqz => {
                    let v = self.stack.pop()?.as_i32();
                    self.stack.push(Value::I32((v == 0) as i32));
                }
                Instr::I32Eq => cmp_i32(&mut self.stack, |a, b| a == b)?,
                Instr::I32Ne => cmp_i32(&mut self.stack, |a, b| a != b)?,
                Instr::I32LtS => cmp_i32(&mut self.stack, |a, b| a < b)?,
                Instr::I32LtU => cmp_u32(&mut self.stack, |a, b| a < b)?,
                Instr::I32GtS => cmp_i32(&mut self.stack, |a, b| a > b)?,
                Instr::I32GtU => cmp_u32(&mut self.stack, |a, b| a > b)?,
                Instr::I32LeS => cmp_i32(&mut self.stack, |a, b| a <= b)?,
                Instr::I32LeU => cmp_u32(&mut self.stack, |a, b| a <= b)?,
                Instr::I32GeS => cmp_i32(&mut self.stack, |a, b| a >= b)?,
                Instr::I32GeU => cmp_u32(&mut self.stack, |a, b| a >= b)?,

                /* ===== i64 comparisons ===== */
                Instr::I64Eqz => {
                    let v = self.stack.pop()?.as_i64();
                    self.stack.push(Value::I32((v == 0) as i32));
                }
                Instr::I64Eq => cmp_i64(&mut self.stack, |a, b| a == b)?,
                Instr::I64Ne => cmp_i64(&mut self.stack, |a, b| a != b)?,
                Instr::I64LtS => cmp_i64(&mut self.stack, |a, b| a < b)?,
                Instr::I64LtU => cmp_u64(&mut self.stack, |a, b| a < b)?,
                Instr::I64GtS => cmp_i64(&mut self.stack, |a, b| a > b)?,
                Instr::I64GtU => cmp_u64(&mut self.stack, |a, b| a > b)?,
                Instr::I64LeS => cmp_i64(&mut self.stack, |a, b| a <= b)?,
                Instr::I64LeU => cmp_u64(&mut self.stack, |a, b| a <= b)?,
                Instr::I64GeS => cmp_i64(&mut self.stack, |a, b| a >= b)?,
                Instr::I64GeU => cmp_u64(&mut self.stack, |a, b| a >= b)?,

                /* ===== float comparisons ===== */
                Instr::F32Eq => cmp_f32(&mut self.stack, |a, b| a == b)?,
                Instr::F32Ne => cmp_f32(&mut self.stack, |a, b| a != b)?,
                Instr::F32Lt => cmp_f32(&mut self.stack, |a, b| a < b)?,
                Instr::F32Gt => cmp_f32(&mut self.stack, |a, b| a > b)?,
                Instr::F32Le => cmp_f32(&mut self.stack, |a, b| a <= b)?,
                Instr::F32Ge => cmp_f32(&mut self.stack, |a, b| a >= b)?,
                Instr::F64Eq => cmp_f64(&mut self.stack, |a, b| a == b)?,
                Instr::F64Ne => cmp_f64(&mut self.stack, |a, b| a != b)?,
                Instr::F64Lt => cmp_f64(&mut self.stack, |a, b| a < b)?,
                Instr::F64Gt => cmp_f64(&mut self.stack, |a, b| a > b)?,
                Instr::F64Le => cmp_f64(&mut self.stack, |a, b| a <= b)?,
                Instr::F64Ge => cmp_f64(&mut self.stack, |a, b| a >= b)?,

                /* ===== i32 arithmetic ===== */
                Instr::I32Clz => unop_i32(&mut self.stack, |a| a.leading_zeros() as i32)?,
                Instr::I32Ctz => unop_i32(&mut self.stack, |a| a.trailing_zeros() as i32)?,
                Instr::I32Popcnt => unop_i32(&mut self.stack, |a| a.count_ones() as i32)?,
                Instr::I32Add => binop_i32(&mut self.stack, |a, b| Ok(a.wrapping_add(b)))?,
                Instr::I32Sub => binop_i32(&mut self.stack, |a, b| Ok(a.wrapping_sub(b)))?,
                Instr::I32Mul => binop_i32(&mut self.stack, |a, b| Ok(a.wrapping_mul(b)))?,
                Instr::I32DivS => binop_i32(&mut self.stack, |a, b| {
                    if b == 0 {
                        return Err(Trap::DivideByZero);
                    }
                    if a == i32::MIN && b == -1 {
                        return Err(Trap::IntegerOverflow);
                    }
                    Ok(a / b)
                })?,
                Instr::I32DivU => binop_i32(&mut self.stack, |a, b| {
                    let (a, b) = (a as u32, b as u32);
                    if b == 0 {
                        return Err(Trap::DivideByZero);
                    }
                    Ok((a / b) as i32)
                })?,
                Instr::I32RemS => binop_i32(&mut self.stack, |a, b| {
                    if b == 0 {
                        return Err(Trap::DivideByZero);
                    }
                    Ok(a.wrapping_rem(b))
                })?,
                Instr::I32RemU => binop_i32(&mut self.stack, |a, b| {
                    let (a, b) = (a as u32, b as u32);
                    if b == 0 {
                        return Err(Trap::DivideByZero);
                    }
                    Ok((a % b) as i32)
                })?,
                Instr::I32And => binop_i32(&mut self.stack, |a, b| Ok(a & b))?,
                Instr::I32Or => binop_i32(&mut self.stack, |a, b| Ok(a | b))?,
                Instr::I32Xor => binop_i32(&mut self.stack, |a, b| Ok(a ^ b))?,
                Instr::I32Shl => binop_i32(&mut self.stack, |a, b| Ok(a.wrapping_shl(b as u32)))?,
                Instr::I32ShrS => binop_i32(&mut self.stack, |a, b| Ok(a.wrapping_shr(b as u32)))?,
                Instr::I32ShrU => {
                    binop_i32(&mut self.stack, |a, b| {
                        Ok(((a as u32).wrapping_shr(b as u32)) as i32)
                    })?
                }
                Instr::I32Rotl => binop_i32(&mut self.stack, |a, b| Ok(a.rotate_left(b as u32 & 31)))?,
                Instr::I32Rotr => {
                    binop_i32(&mut self.stack, |a, b| Ok(a.rotate_right(b as u32 & 31)))?
                }

                /* ===== i64 arithmetic ===== */
                Instr::I64Clz => unop_i64(&mut self.stack, |a| a.leading_zeros() as i64)?,
                Instr::I64Ctz => unop_i64(&mut self.stack, |a| a.trailing_zeros() as i64)?,
                Instr::I64Popcnt => unop_i64(&mut self.stack, |a| a.count_ones() as i64)?,
                Instr::I64Add => binop_i64(&mut self.stack, |a, b| Ok(a.wrapping_add(b)))?,
                Instr::I64Sub => binop_i64(&mut self.stack, |a, b| Ok(a.wrapping_sub(b)))?,
                Instr::I64Mul => binop_i64(&mut self.stack, |a, b| Ok(a.wrapping_mul(b)))?,
                Instr::I64DivS => binop_i64(&mut self.stack, |a, b| {
                    if b == 0 {
                        return Err(Trap::DivideByZero);
                    }
                    if a == i64::MIN && b == -1 {
                        return Err(Trap::IntegerOverflow);
                    }
                    Ok(a / b)
                })?,
                Instr::I64DivU => binop_i64(&mut self.stack, |a, b| {
                    let (a, b) = (a as u64, b as u64);
                    if b == 0 {
                        return Err(Trap::DivideByZero);
                    }
                    Ok((a / b) as i64)
                })?,
                Instr::I64RemS => binop_i64(&mut self.stack, |a, b| {
                    if b == 0 {
                        return Err(Trap::DivideByZero);
                    }
                    Ok(a.wrapping_rem(b))
                })?,
                Instr::I64RemU => binop_i64(&mut self.stack, |a, b| {
                    let (a, b) = (a as u64, b as u64);
                    if b == 0 {
                        return Err(Trap::DivideByZero);
                    }
                    Ok((a % b) as i64)
                })?,
                Instr::I64And => binop_i64(&mut self.stack, |a, b| Ok(a & b))?,
                Instr::I64Or => binop_i64(&mut self.stack, |a, b| Ok(a | b))?,
                Instr::I64Xor => binop_i64(&mut self.stack, |a, b| Ok(a ^ b))?,
                Instr::I64Shl => binop_i64(&mut self.stack, |a, b| Ok(a.wrapping_shl(b as u32)))?,
                Instr::I64ShrS => binop_i64(&mut self.stack, |a, b| Ok(a.wrapping_shr(b as u32)))?,
                Instr::I64ShrU => {
                    binop_i64(&mut self.stack, |a, b| {
                        Ok(((a as u64).wrapping_shr(b as u32)) as i64)
                    })?
                }
                Instr::I64Rotl => {
                    binop_i64(&mut self.stack, |a, b| Ok(a.rotate_left(b as u32 & 63)))?
                }
                Instr::I64Rotr => {
                    binop_i64(&mut self.stack, |a, b| Ok(a.rotate_right(b as u32 & 63)))?
                }

                /* ===== f32 arithmetic ===== */
                Instr::F32Abs => unop_f32(&mut self.stack, f32::abs)?,
                Instr::F32Neg => unop_f32(&mut self.stack, |a| -a)?,
                Instr::F32Ceil => unop_f32(&mut self.stack, f32::ceil)?,
                Instr::F32Floor => unop_f32(&mut self.stack, f32::floor)?,
                Instr::F32Trunc => unop_f32(&mut self.stack, f32::trunc)?,
                Instr::F32Nearest => unop_f32(&mut self.stack, f32::round_ties_even)?,
                Instr::F32Sqrt => unop_f32(&mut self.stack, f32::sqrt)?,
                Instr::F32Add => binop_f32(&mut self.stack, |a, b| a + b)?,
                Instr::F32Sub => binop_f32(&mut self.stack, |a, b| a - b)?,
                Instr::F32Mul => binop_f32(&mut self.stack, |a, b| a * b)?,
                Instr::F32Div => binop_f32(&mut self.stack, |a, b| a / b)?,
                Instr::F32Min => binop_f32(&mut self.stack, fmin32)?,
                Instr::F32Max => binop_f32(&mut self.stack, fmax32)?,
                Instr::F32Copysign => binop_f32(&mut self.stack, f32::copysign)?,

                /* ===== f64 arithmetic ===== */
                Instr::F64Abs => unop_f64(&mut self.stack, f64::abs)?,
                Instr::F64Neg => unop_f64(&mut self.stack, |a| -a)?,
                Instr::F64Ceil => unop_f64(&mut self.stack, f64::ceil)?,
                Instr::F64Floor => unop_f64(&mut self.stack, f64::floor)?,
                Instr::F64Trunc => unop_f64(&mut self.stack, f64::trunc)?,
                Instr::F64Nearest => unop_f64(&mut self.stack, f64::round_ties_even)?,
                Instr::F64Sqrt => unop_f64(&mut self.stack, f64::sqrt)?,
                Instr::F64Add => binop_f64(&mut self.stack, |a, b| a + b)?,
                Instr::F64Sub => binop_f64(&mut self.stack, |a, b| a - b)?,
                Instr::F64Mul => binop_f64(&mut self.stack, |a, b| a * b)?,
                Instr::F64Div => binop_f64(&mut self.stack, |a, b| a / b)?,
                Instr::F64Min => binop_f64(&mut self.stack, fmin64)?,
                Instr::F64Max => binop_f64(&mut self.stack, fmax64)?,
                Instr::F64Copysign => binop_f64(&mut self.stack, f64::copysign)?,

                /* ===== Conversions ===== */
                Instr::I32WrapI64 => {
                    let v = self.stack.pop()?.as_i64();
                    self.stack.push(Value::I32(v as i32));
                }
                Instr::I32TruncF32S => {
                    let v = self.stack.pop()?.as_f32();
                    self.stack.push(Value::I32(trunc_f32_i32(v)?));
                }
                Instr::I32TruncF32U => {
                    let v = self.stack.pop()?.as_f32();
                    self.stack.push(Value::I32(trunc_f32_u32(v)? as i32));
                }
                Instr::I32TruncF64S => {
                    let v = self.stack.pop()?.as_f64();
                    self.stack.push(Value::I32(trunc_f64_i32(v)?));
                }
                Instr::I32TruncF64U => {
                    let v = self.stack.pop()?.as_f64();
                    self.stack.push(Value::I32(trunc_f64_u32(v)? as i32));
                }
                Instr::I64ExtendI32S => {
                    let v = self.stack.pop()?.as_i32();
                    self.stack.push(Value::I64(v as i64));
                }
                Instr::I64ExtendI32U => {
                    let v = self.stack.pop()?.as_i32();
                    self.stack.push(Value::I64(v as u32 as i64));
                }
                Instr::I64TruncF32S => {
                    let v = self.stack.pop()?.as_f32();
                    self.stack.push(Value::I64(trunc_f32_i64(v)?));
                }
                Instr::I64TruncF32U => {
                    let v = self.stack.pop()?.as_f32();
                    self.stack.push(Value::I64(trunc_f32_u64(v)? as i64));
                }
                Instr::I64TruncF64S => {
                    let v = self.stack.pop()?.as_f64();
                    self.stack.push(Value::I64(trunc_f64_i64(v)?));
                }
                Instr::I64TruncF64U => {
                    let v = self.stack.pop()?.as_f64();
                    self.stack.push(Value::I64(trunc_f64_u64(v)? as i64));
                }
                Instr::F32ConvertI32S => {
                    let v = self.stack.pop()?.as_i32();
                    self.stack.push(Value::from_f32(v as f32));
                }
                Instr::F32ConvertI32U => {
                    let v = self.stack.pop()?.as_i32();
                    self.stack.push(Value::from_f32(v as u32 as f32));
                }
                Instr::F32ConvertI64S => {
                    let v = self.stack.pop()?.as_i64();
                    self.stack.push(Value::from_f32(v as f32));
                }
                Instr::F32ConvertI64U => {
                    let v = self.stack.pop()?.as_i64();
                    self.stack.push(Value::from_f32(v as u64 as f32));
                }
                Instr::F32DemoteF64 => {
                    let v = self.stack.pop()?.as_f64();
                    self.stack.push(Value::from_f32(v as f32));
                }
                Instr::F64ConvertI32S => {
                    let v = self.stack.pop()?.as_i32();
                    self.stack.push(Value::from_f64(v as f64));
                }
                Instr::F64ConvertI32U => {
                    let v = self.stack.pop()?.as_i32();
                    self.stack.push(Value::from_f64(v as u32 as f64));
                }
                Instr::F64ConvertI64S => {
                    let v = self.stack.pop()?.as_i64();
                    self.stack.push(Value::from_f64(v as f64));
                }
                Instr::F64ConvertI64U => {
                    let v = self.stack.pop()?.as_i64();
                    self.stack.push(Value::from_f64(v as u64 as f64));
                }
                Instr::F64PromoteF32 => {
                    let v = self.stack.pop()?.as_f32();
                    self.stack.push(Value::from_f64(v as f64));
                }
                Instr::I32ReinterpretF32 => {
                    let bits = self.stack.pop()?.as_f32_bits();
                    self.stack.push(Value::I32(bits as i32));
                }
                Instr::I64ReinterpretF64 => {
                    let bits = self.stack.pop()?.as_f64_bits();
                    self.stack.push(Value::I64(bits as i64));
                }
                Instr::F32ReinterpretI32 => {
                    let v = self.stack.pop()?.as_i32();
                    self.stack.push(Value::F32(v as u32));
                }
                Instr::F64ReinterpretI64 => {
                    let v = self.stack.pop()?.as_i64();
                    self.stack.push(Value::F64(v as u64));
                }

                /* ===== Sign extension ===== */
                Instr::I32Extend8S => unop_i32(&mut self.stack, |a| (a as i8) as i32)?,
                Instr::I32Extend16S => unop_i32(&mut self.stack, |a| (a as i16) as i32)?,
                Instr::I64Extend8S => unop_i64(&mut self.stack, |a| (a as i8) as i64)?,
                Instr::I64Extend16S => unop_i64(&mut self.stack, |a| (a as i16) as i64)?,
                Instr::I64Extend32S => unop_i64(&mut self.stack, |a| (a as i32) as i64)?,

                /* ===== Saturating truncation ===== */
                Instr::I32TruncSatF32S => {
                    let v = self.stack.pop()?.as_f32();
                    self.stack.push(Value::I32(v as i32));
                }
                Instr::I32TruncSatF32U => {
                    let v = self.stack.pop()?.as_f32();
                    self.stack.push(Value::I32((v as u32) as i32));
                }
                Instr::I32TruncSatF64S => {
                    let v = self.stack.pop()?.as_f64();
                    self.stack.push(Value::I32(v as i32));
                }
                Instr::I32TruncSatF64U => {
                    let v = self.stack.pop()?.as_f64();
                    self.stack.push(Value::I32((v as u32) as i32));
                }
                Instr::I64TruncSatF32S => {
                    let v = self.stack.pop()?.as_f32();
                    self.stack.push(Value::I64(v as i64));
                }
                Instr::I64TruncSatF32U => {
                    let v = self.stack.pop()?.as_f32();
                    self.stack.push(Value::I64((v as u64) as i64));
                }
                Instr::I64TruncSatF64S => {
                    let v = self.stack.pop()?.as_f64();
                    self.stack.push(Value::I64(v as i64));
                }
                Instr::I64TruncSatF64U => {
                    let v = self.stack.pop()?.as_f64();
                    self.stack.push(Value::I64((v as u64) as i64));
                }

                /* ===== v128 ===== */
                Instr::V128Not => {
                    let v = self.stack.pop()?.as_v128();
                    self.stack.push(Value::V128(!v));
                }
                Instr::V128And => v128_bitop(&mut self.stack, |a, b| a & b)?,
                Instr::V128Or => v128_bitop(&mut self.stack, |a, b| a | b)?,
                Instr::V128Xor => v128_bitop(&mut self.stack, |a, b| a ^ b)?,
                Instr::I32x4Add => v128_lanes4(&mut self.stack, u32::wrapping_add)?,
                Instr::I32x4Sub => v128_lanes4(&mut self.stack, u32::wrapping_sub)?,
                Instr::I32x4Mul => v128_lanes4(&mut self.stack, u32::wrapping_mul)?,
                Instr::I64x2Add => v128_lanes2(&mut self.stack, u64::wrapping_add)?,
                Instr::I64x2Sub => v128_lanes2(&mut self.stack, u64::wrapping_sub)?,
            }
        }
    }

    /// call_indirect / return_call_indirect: table slot to function address,
    /// with the type check against the expected signature.
    fn resolve_indirect(&mut self, store: &Store, type_idx: u32, table: u32) -> Result<usize, Trap> {
        let i = self.stack.pop()?.as_i32() as u32;
        let tab = self
            .table_by_idx(store, table)
            .ok_or(Trap::UndefinedElement)?;
        let slot = tab.get(i).ok_or(Trap::UndefinedElement)?;
        let faddr = slot.ok_or(Trap::UninitializedElement)?;

        let expected = self
            .stack
            .module_handle()
            .and_then(|h| store.get_module(h.0))
            .and_then(|inst| inst.func_type(type_idx))
            .ok_or(Trap::TypeMismatch)?;
        let actual = store.get_func(faddr).ok_or(Trap::FunctionNotFound)?.ty();
        if actual != expected {
            return Err(Trap::IndirectCallTypeMismatch);
        }
        Ok(faddr)
    }

    /// Pop the base address and add the static offset (33-bit, no wrap).
    fn effective_addr(&mut self, m: MemArg) -> Result<u32, Trap> {
        let base = self.stack.pop()?.as_i32() as u32;
        let ea = base as u64 + m.offset as u64;
        if ea > u32::MAX as u64 {
            return Err(Trap::MemoryOutOfBounds);
        }
        Ok(ea as u32)
    }

    fn mem<'s>(&self, store: &'s Store) -> Result<&'s MemoryInstance, Trap> {
        self.memory_by_idx(store, 0).ok_or(Trap::MemoryOutOfBounds)
    }

    fn mem_mut<'s>(&self, store: &'s mut Store) -> Result<&'s mut MemoryInstance, Trap> {
        let addr = self
            .memory_addr_by_idx(store, 0)
            .ok_or(Trap::MemoryOutOfBounds)?;
        store.get_memory_mut(addr).ok_or(Trap::MemoryOutOfBounds)
    }
}

fn oob<E>(_: E) -> Trap {
    Trap::MemoryOutOfBounds
}

/* ===== Numeric helpers ===== */

fn binop_i32<F>(st: &mut StackManager, f: F) -> Result<(), Trap>
where
    F: FnOnce(i32, i32) -> Result<i32, Trap>,
{
    let rhs = st.pop()?.as_i32();
    let lhs = st.pop()?.as_i32();
    st.push(Value::I32(f(lhs, rhs)?));
    Ok(())
}

fn binop_i64<F>(st: &mut StackManager, f: F) -> Result<(), Trap>
where
    F: FnOnce(i64, i64) -> Result<i64, Trap>,
{
    let rhs = st.pop()?.as_i64();
    let lhs = st.pop()?.as_i64();
    st.push(Value::I64(f(lhs, rhs)?));
    Ok(())
}

fn unop_i32<F: FnOnce(i32) -> i32>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let v = st.pop()?.as_i32();
    st.push(Value::I32(f(v)));
    Ok(())
}

fn unop_i64<F: FnOnce(i64) -> i64>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let v = st.pop()?.as_i64();
    st.push(Value::I64(f(v)));
    Ok(())
}

fn cmp_i32<F: FnOnce(i32, i32) -> bool>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let rhs = st.pop()?.as_i32();
    let lhs = st.pop()?.as_i32();
    st.push(Value::I32(f(lhs, rhs) as i32));
    Ok(())
}

fn cmp_u32<F: FnOnce(u32, u32) -> bool>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let rhs = st.pop()?.as_i32() as u32;
    let lhs = st.pop()?.as_i32() as u32;
    st.push(Value::I32(f(lhs, rhs) as i32));
    Ok(())
}

fn cmp_i64<F: FnOnce(i64, i64) -> bool>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let rhs = st.pop()?.as_i64();
    let lhs = st.pop()?.as_i64();
    st.push(Value::I32(f(lhs, rhs) as i32));
    Ok(())
}

fn cmp_u64<F: FnOnce(u64, u64) -> bool>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let rhs = st.pop()?.as_i64() as u64;
    let lhs = st.pop()?.as_i64() as u64;
    st.push(Value::I32(f(lhs, rhs) as i32));
    Ok(())
}

fn cmp_f32<F: FnOnce(f32, f32) -> bool>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let rhs = st.pop()?.as_f32();
    let lhs = st.pop()?.as_f32();
    st.push(Value::I32(f(lhs, rhs) as i32));
    Ok(())
}

fn cmp_f64<F: FnOnce(f64, f64) -> bool>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let rhs = st.pop()?.as_f64();
    let lhs = st.pop()?.as_f64();
    st.push(Value::I32(f(lhs, rhs) as i32));
    Ok(())
}

fn binop_f32<F: FnOnce(f32, f32) -> f32>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let rhs = st.pop()?.as_f32();
    let lhs = st.pop()?.as_f32();
    st.push(Value::from_f32(f(lhs, rhs)));
    Ok(())
}

fn binop_f64<F: FnOnce(f64, f64) -> f64>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let rhs = st.pop()?.as_f64();
    let lhs = st.pop()?.as_f64();
    st.push(Value::from_f64(f(lhs, rhs)));
    Ok(())
}

fn unop_f32<F: FnOnce(f32) -> f32>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let v = st.pop()?.as_f32();
    st.push(Value::from_f32(f(v)));
    Ok(())
}

fn unop_f64<F: FnOnce(f64) -> f64>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let v = st.pop()?.as_f64();
    st.push(Value::from_f64(f(v)));
    Ok(())
}

// Wasm min/max: NaN if either operand is NaN; min prefers -0, max prefers +0.

fn fmin32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        if a.is_sign_negative() { a } else { b }
    } else if a < b {
        a
    } else {
        b
    }
}

fn fmax32(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else if a == b {
        if a.is_sign_positive() { a } else { b }
    } else if a > b {
        a
    } else {
        b
    }
}

fn fmin64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_negative() { a } else { b }
    } else if a < b {
        a
    } else {
        b
    }
}

fn fmax64(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_positive() { a } else { b }
    } else if a > b {
        a
    } else {
        b
    }
}

// Trapping float-to-int truncations: NaN is an invalid conversion, a value
// outside the target range is an overflow.

fn trunc_f32_i32(x: f32) -> Result<i32, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = x.trunc();
    if t >= 2_147_483_648.0_f32 || t < -2_147_483_648.0_f32 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as i32)
}

fn trunc_f32_u32(x: f32) -> Result<u32, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = x.trunc();
    if t >= 4_294_967_296.0_f32 || t < 0.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as u32)
}

fn trunc_f64_i32(x: f64) -> Result<i32, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = x.trunc();
    if t >= 2_147_483_648.0_f64 || t < -2_147_483_648.0_f64 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as i32)
}

fn trunc_f64_u32(x: f64) -> Result<u32, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = x.trunc();
    if t >= 4_294_967_296.0_f64 || t < 0.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as u32)
}

fn trunc_f32_i64(x: f32) -> Result<i64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = x.trunc();
    if t >= 9_223_372_036_854_775_808.0_f32 || t < -9_223_372_036_854_775_808.0_f32 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as i64)
}

fn trunc_f32_u64(x: f32) -> Result<u64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = x.trunc();
    if t >= 18_446_744_073_709_551_616.0_f32 || t < 0.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as u64)
}

fn trunc_f64_i64(x: f64) -> Result<i64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = x.trunc();
    if t >= 9_223_372_036_854_775_808.0_f64 || t < -9_223_372_036_854_775_808.0_f64 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as i64)
}

fn trunc_f64_u64(x: f64) -> Result<u64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = x.trunc();
    if t >= 18_446_744_073_709_551_616.0_f64 || t < 0.0 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as u64)
}

/* ===== v128 helpers ===== */

fn v128_bitop<F: FnOnce(u128, u128) -> u128>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let rhs = st.pop()?.as_v128();
    let lhs = st.pop()?.as_v128();
    st.push(Value::V128(f(lhs, rhs)));
    Ok(())
}

fn v128_lanes4<F: Fn(u32, u32) -> u32>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let rhs = st.pop()?.as_v128().to_le_bytes();
    let lhs = st.pop()?.as_v128().to_le_bytes();
    let mut out = [0u8; 16];
    for lane in 0..4 {
        let i = lane * 4;
        let a = u32::from_le_bytes([lhs[i], lhs[i + 1], lhs[i + 2], lhs[i + 3]]);
        let b = u32::from_le_bytes([rhs[i], rhs[i + 1], rhs[i + 2], rhs[i + 3]]);
        out[i..i + 4].copy_from_slice(&f(a, b).to_le_bytes());
    }
    st.push(Value::V128(u128::from_le_bytes(out)));
    Ok(())
}

fn v128_lanes2<F: Fn(u64, u64) -> u64>(st: &mut StackManager, f: F) -> Result<(), Trap> {
    let rhs = st.pop()?.as_v128().to_le_bytes();
    let lhs = st.pop()?.as_v128().to_le_bytes();
    let mut out = [0u8; 16];
    for lane in 0..2 {
        let i = lane * 8;
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        a.copy_from_slice(&lhs[i..i + 8]);
        b.copy_from_slice(&rhs[i..i + 8]);
        let r = f(u64::from_le_bytes(a), u64::from_le_bytes(b));
        out[i..i + 8].copy_from_slice(&r.to_le_bytes());
    }
    st.push(Value::V128(u128::from_le_bytes(out)));
    Ok(())
}
