//! Decoded instruction sequences.
//!
//! Function bodies are decoded once at parse time into a flat `Vec<Instr>`
//! with the jump targets of structured control (`end`, `else`) resolved by a
//! single forward pass, so the interpreter never has to scan for matching
//! delimiters. Targets are indices into the same sequence: `end` holds the
//! index of the matching `End` instruction, `else_at` the index of the `Else`.

use std::sync::Arc;

use crate::binary::{cursor::Cursor, leb128, reader::read_vec, BinaryReadError, Result};
use crate::model::{BlockType, RefType, ValType};

/// Memory access immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

/// One decoded instruction.
///
/// Float constants carry raw IEEE-754 bits so NaN payloads survive decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    // Control
    Unreachable,
    Nop,
    Block { ty: BlockType, end: u32 },
    Loop { ty: BlockType, end: u32 },
    If { ty: BlockType, else_at: Option<u32>, end: u32 },
    Else { end: u32 },
    End,
    Br(u32),
    BrIf(u32),
    BrTable { targets: Arc<[u32]>, default: u32 },
    Return,
    Call(u32),
    CallIndirect { type_idx: u32, table: u32 },
    ReturnCall(u32),
    ReturnCallIndirect { type_idx: u32, table: u32 },

    // Reference
    RefNull(RefType),
    RefIsNull,
    RefFunc(u32),

    // Parametric
    Drop,
    Select,
    SelectT(Arc<[ValType]>),

    // Variable
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    // Table
    TableGet(u32),
    TableSet(u32),
    TableInit { elem: u32, table: u32 },
    ElemDrop(u32),
    TableCopy { dst: u32, src: u32 },
    TableGrow(u32),
    TableSize(u32),
    TableFill(u32),

    // Memory
    I32Load(MemArg),
    I64Load(MemArg),
    F32Load(MemArg),
    F64Load(MemArg),
    I32Load8S(MemArg),
    I32Load8U(MemArg),
    I32Load16S(MemArg),
    I32Load16U(MemArg),
    I64Load8S(MemArg),
    I64Load8U(MemArg),
    I64Load16S(MemArg),
    I64Load16U(MemArg),
    I64Load32S(MemArg),
    I64Load32U(MemArg),
    I32Store(MemArg),
    I64Store(MemArg),
    F32Store(MemArg),
    F64Store(MemArg),
    I32Store8(MemArg),
    I32Store16(MemArg),
    I64Store8(MemArg),
    I64Store16(MemArg),
    I64Store32(MemArg),
    MemorySize,
    MemoryGrow,
    MemoryInit(u32),
    DataDrop(u32),
    MemoryCopy,
    MemoryFill,

    // Constants
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),
    V128Const(u128),

    // i32 comparisons
    I32Eqz,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,

    // i64 comparisons
    I64Eqz,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,

    // f32 comparisons
    F32Eq,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,

    // f64 comparisons
    F64Eq,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,

    // i32 arithmetic
    I32Clz,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,

    // i64 arithmetic
    I64Clz,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,

    // f32 arithmetic
    F32Abs,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,

    // f64 arithmetic
    F64Abs,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,

    // Conversions
    I32WrapI64,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,

    // Sign extension
    I32Extend8S,
    I32Extend16S,
    I64Extend8S,
    I64Extend16S,
    I64Extend32S,

    // Saturating truncation (0xFC 0..=7)
    I32TruncSatF32S,
    I32TruncSatF32U,
    I32TruncSatF64S,
    I32TruncSatF64U,
    I64TruncSatF32S,
    I64TruncSatF32U,
    I64TruncSatF64S,
    I64TruncSatF64U,

    // SIMD subset (0xFD)
    V128Not,
    V128And,
    V128Or,
    V128Xor,
    I32x4Add,
    I32x4Sub,
    I32x4Mul,
    I64x2Add,
    I64x2Sub,
}

/// Read a block type immediate: 0x40 (empty), a valtype byte, or a positive
/// SLEB33 type index — all sharing one signed encoding space.
pub fn read_block_type(cur: &mut Cursor) -> Result<BlockType> {
    let v = leb128::read_sleb_i33(cur)?;
    if v >= 0 {
        return Ok(BlockType::Func(v as u32));
    }
    let b = (v & 0x7F) as u8;
    if b == 0x40 {
        return Ok(BlockType::Empty);
    }
    match ValType::from_byte(b) {
        Some(vt) => Ok(BlockType::Value(vt)),
        None => Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "invalid block type",
        }),
    }
}

fn read_ref_type(cur: &mut Cursor) -> Result<RefType> {
    let b = cur.read_u8()?;
    match b {
        0x70 => Ok(RefType::FuncRef),
        0x6F => Ok(RefType::ExternRef),
        _ => Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "invalid reference type",
        }),
    }
}

fn read_memarg(cur: &mut Cursor) -> Result<MemArg> {
    let align = leb128::read_uleb_u32(cur)?;
    let offset = leb128::read_uleb_u32(cur)?;
    Ok(MemArg { align, offset })
}

/// Expect the single-byte zero index that memory instructions carry.
fn read_zero_byte(cur: &mut Cursor) -> Result<()> {
    let b = cur.read_u8()?;
    if b != 0x00 {
        return Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "nonzero memory index",
        });
    }
    Ok(())
}

/// Open control construct during decoding, pointing back at the instruction
/// whose jump targets still need patching.
enum Open {
    Func,
    Block(usize),
    Loop(usize),
    If(usize),
    IfElse(usize, usize),
}

/// Decode one function body (the instruction stream after the local
/// declarations) into a flat sequence with resolved jump targets. The final
/// `End` that closes the function stays in the sequence; the cursor is left
/// just past it.
pub fn decode_func_body(cur: &mut Cursor) -> Result<Arc<[Instr]>> {
    let mut code: Vec<Instr> = Vec::new();
    let mut open: Vec<Open> = vec![Open::Func];

    loop {
        let at = code.len() as u32;
        let instr = read_instr(cur)?;

        match &instr {
            Instr::Block { .. } => open.push(Open::Block(code.len())),
            Instr::Loop { .. } => open.push(Open::Loop(code.len())),
            Instr::If { .. } => open.push(Open::If(code.len())),
            Instr::Else { .. } => match open.pop() {
                Some(Open::If(i)) => {
                    if let Instr::If { else_at, .. } = &mut code[i] {
                        *else_at = Some(at);
                    }
                    open.push(Open::IfElse(i, code.len()));
                }
                _ => {
                    return Err(BinaryReadError::Malformed {
                        offset: cur.offset(),
                        msg: "else without matching if",
                    })
                }
            },
            Instr::End => match open.pop() {
                Some(Open::Func) => {
                    code.push(instr);
                    return Ok(Arc::from(code));
                }
                Some(Open::Block(i)) | Some(Open::Loop(i)) => {
                    match &mut code[i] {
                        Instr::Block { end, .. } | Instr::Loop { end, .. } => *end = at,
                        _ => unreachable!("open entry points at a structured instruction"),
                    }
                }
                Some(Open::If(i)) => {
                    if let Instr::If { end, .. } = &mut code[i] {
                        *end = at;
                    }
                }
                Some(Open::IfElse(i, j)) => {
                    if let Instr::If { end, .. } = &mut code[i] {
                        *end = at;
                    }
                    if let Instr::Else { end } = &mut code[j] {
                        *end = at;
                    }
                }
                None => {
                    return Err(BinaryReadError::Malformed {
                        offset: cur.offset(),
                        msg: "unbalanced end",
                    })
                }
            },
            _ => {}
        }

        code.push(instr);
    }
}

/// Read one instruction with its immediates. Jump targets of structured
/// instructions are zeroed here and patched by [`decode_func_body`].
fn read_instr(cur: &mut Cursor) -> Result<Instr> {
    let op = cur.read_u8()?;
    Ok(match op {
        0x00 => Instr::Unreachable,
        0x01 => Instr::Nop,
        0x02 => Instr::Block {
            ty: read_block_type(cur)?,
            end: 0,
        },
        0x03 => Instr::Loop {
            ty: read_block_type(cur)?,
            end: 0,
        },
        0x04 => Instr::If {
            ty: read_block_type(cur)?,
            else_at: None,
            end: 0,
        },
        0x05 => Instr::Else { end: 0 },
        0x0B => Instr::End,
        0x0C => Instr::Br(leb128::read_uleb_u32(cur)?),
        0x0D => Instr::BrIf(leb128::read_uleb_u32(cur)?),
        0x0E => {
            let targets = read_vec(cur, leb128::read_uleb_u32)?;
            let default = leb128::read_uleb_u32(cur)?;
            Instr::BrTable {
                targets: Arc::from(targets),
                default,
            }
        }
        0x0F => Instr::Return,
        0x10 => Instr::Call(leb128::read_uleb_u32(cur)?),
        0x11 => {
            let type_idx = leb128::read_uleb_u32(cur)?;
            let table = leb128::read_uleb_u32(cur)?;
            Instr::CallIndirect { type_idx, table }
        }
        0x12 => Instr::ReturnCall(leb128::read_uleb_u32(cur)?),
        0x13 => {
            let type_idx = leb128::read_uleb_u32(cur)?;
            let table = leb128::read_uleb_u32(cur)?;
            Instr::ReturnCallIndirect { type_idx, table }
        }
        0x1A => Instr::Drop,
        0x1B => Instr::Select,
        0x1C => {
            let tys = read_vec(cur, |c| {
                let b = c.read_u8()?;
                ValType::from_byte(b).ok_or(BinaryReadError::Malformed {
                    offset: c.offset(),
                    msg: "invalid valtype in select",
                })
            })?;
            Instr::SelectT(Arc::from(tys))
        }
        0x20 => Instr::LocalGet(leb128::read_uleb_u32(cur)?),
        0x21 => Instr::LocalSet(leb128::read_uleb_u32(cur)?),
        0x22 => Instr::LocalTee(leb128::read_uleb_u32(cur)?),
        0x23 => Instr::GlobalGet(leb128::read_uleb_u32(cur)?),
        0x24 => Instr::GlobalSet(leb128::read_uleb_u32(cur)?),
        0x25 => Instr::TableGet(leb128::read_uleb_u32(cur)?),
        0x26 => Instr::TableSet(leb128::read_uleb_u32(cur)?),

        0x28 => Instr::I32Load(read_memarg(cur)?),
        0x29 => Instr::I64Load(read_memarg(cur)?),
        0x2A => Instr::F32Load(read_memarg(cur)?),
        0x2B => Instr::F64Load(read_memarg(cur)?),
        0x2C => Instr::I32Load8S(read_memarg(cur)?),
        0x2D => Instr::I32Load8U(read_memarg(cur)?),
        0x2E => Instr::I32Load16S(read_memarg(cur)?),
        0x2F => Instr::I32Load16U(read_memarg(cur)?),
        0x30 => Instr::I64Load8S(read_memarg(cur)?),
        0x31 => Instr::I64Load8U(read_memarg(cur)?),
        0x32 => Instr::I64Load16S(read_memarg(cur)?),
        0x33 => Instr::I64Load16U(read_memarg(cur)?),
        0x34 => Instr::I64Load32S(read_memarg(cur)?),
        0x35 => Instr::I64Load32U(read_memarg(cur)?),
        0x36 => Instr::I32Store(read_memarg(cur)?),
        0x37 => Instr::I64Store(read_memarg(cur)?),
        0x38 => Instr::F32Store(read_memarg(cur)?),
        0x39 => Instr::F64Store(read_memarg(cur)?),
        0x3A => Instr::I32Store8(read_memarg(cur)?),
        0x3B => Instr::I32Store16(read_memarg(cur)?),
        0x3C => Instr::I64Store8(read_memarg(cur)?),
        0x3D => Instr::I64Store16(read_memarg(cur)?),
        0x3E => Instr::I64Store32(read_memarg(cur)?),
        0x3F => {
            read_zero_byte(cur)?;
            Instr::MemorySize
        }
        0x40 => {
            read_zero_byte(cur)?;
            Instr::MemoryGrow
        }

        0x41 => Instr::I32Const(leb128::read_sleb_i32(cur)?),
        0x42 => Instr::I64Const(leb128::read_sleb_i64(cur)?),
        0x43 => Instr::F32Const(cur.read_u32_le()?),
        0x44 => Instr::F64Const(cur.read_u64_le()?),

        0x45 => Instr::I32Eqz,
        0x46 => Instr::I32Eq,
        0x47 => Instr::I32Ne,
        0x48 => Instr::I32LtS,
        0x49 => Instr::I32LtU,
        0x4A => Instr::I32GtS,
        0x4B => Instr::I32GtU,
        0x4C => Instr::I32LeS,
        0x4D => Instr::I32LeU,
        0x4E => Instr::I32GeS,
        0x4F => Instr::I32GeU,

        0x50 => Instr::I64Eqz,
        0x51 => Instr::I64Eq,
        0x52 => Instr::I64Ne,
        0x53 => Instr::I64LtS,
        0x54 => Instr::I64LtU,
        0x55 => Instr::I64GtS,
        0x56 => Instr::I64GtU,
        0x57 => Instr::I64LeS,
        0x58 => Instr::I64LeU,
        0x59 => Instr::I64GeS,
        0x5A => Instr::I64GeU,

        0x5B => Instr::F32Eq,
        0x5C => Instr::F32Ne,
        0x5D => Instr::F32Lt,
        0x5E => Instr::F32Gt,
        0x5F => Instr::F32Le,
        0x60 => Instr::F32Ge,

        0x61 => Instr::F64Eq,
        0x62 => Instr::F64Ne,
        0x63 => Instr::F64Lt,
        0x64 => Instr::F64Gt,
        0x65 => Instr::F64Le,
        0x66 => Instr::F64Ge,

        0x67 => Instr::I32Clz,
        0x68 => Instr::I32Ctz,
        0x69 => Instr::I32Popcnt,
        0x6A => Instr::I32Add,
        0x6B => Instr::I32Sub,
        0x6C => Instr::I32Mul,
        0x6D => Instr::I32DivS,
        0x6E => Instr::I32DivU,
        0x6F => Instr::I32RemS,
        0x70 => Instr::I32RemU,
        0x71 => Instr::I32And,
        0x72 => Instr::I32Or,
        0x73 => Instr::I32Xor,
        0x74 => Instr::I32Shl,
        0x75 => Instr::I32ShrS,
        0x76 => Instr::I32ShrU,
        0x77 => Instr::I32Rotl,
        0x78 => Instr::I32Rotr,

        0x79 => Instr::I64Clz,
        0x7A => Instr::I64Ctz,
        0x7B => Instr::I64Popcnt,
        0x7C => Instr::I64Add,
        0x7D => Instr::I64Sub,
        0x7E => Instr::I64Mul,
        0x7F => Instr::I64DivS,
        0x80 => Instr::I64DivU,
        0x81 => Instr::I64RemS,
        0x82 => Instr::I64RemU,
        0x83 => Instr::I64And,
        0x84 => Instr::I64Or,
        0x85 => Instr::I64Xor,
        0x86 => Instr::I64Shl,
        0x87 => Instr::I64ShrS,
        0x88 => Instr::I64ShrU,
        0x89 => Instr::I64Rotl,
        0x8A => Instr::I64Rotr,

        0x8B => Instr::F32Abs,
        0x8C => Instr::F32Neg,
        0x8D => Instr::F32Ceil,
        0x8E => Instr::F32Floor,
        0x8F => Instr::F32Trunc,
        0x90 => Instr::F32Nearest,
        0x91 => Instr::F32Sqrt,
        0x92 => Instr::F32Add,
        0x93 => Instr::F32Sub,
        0x94 => Instr::F32Mul,
        0x95 => Instr::F32Div,
        0x96 => Instr::F32Min,
        0x97 => Instr::F32Max,
        0x98 => Instr::F32Copysign,

        0x99 => Instr::F64Abs,
        0x9A => Instr::F64Neg,
        0x9B => Instr::F64Ceil,
        0x9C => Instr::F64Floor,
        0x9D => Instr::F64Trunc,
        0x9E => Instr::F64Nearest,
        0x9F => Instr::F64Sqrt,
        0xA0 => Instr::F64Add,
        0xA1 => Instr::F64Sub,
        0xA2 => Instr::F64Mul,
        0xA3 => Instr::F64Div,
        0xA4 => Instr::F64Min,
        0xA5 => Instr::F64Max,
        0xA6 => Instr::F64Copysign,

        0xA7 => Instr::I32WrapI64,
        0xA8 => Instr::I32TruncF32S,
        0xA9 => Instr::I32TruncF32U,
        0xAA => Instr::I32TruncF64S,
        0xAB => Instr::I32TruncF64U,
        0xAC => Instr::I64ExtendI32S,
        0xAD => Instr::I64ExtendI32U,
        0xAE => Instr::I64TruncF32S,
        0xAF => Instr::I64TruncF32U,
        0xB0 => Instr::I64TruncF64S,
        0xB1 => Instr::I64TruncF64U,
        0xB2 => Instr::F32ConvertI32S,
        0xB3 => Instr::F32ConvertI32U,
        0xB4 => Instr::F32ConvertI64S,
        0xB5 => Instr::F32ConvertI64U,
        0xB6 => Instr::F32DemoteF64,
        0xB7 => Instr::F64ConvertI32S,
        0xB8 => Instr::F64ConvertI32U,
        0xB9 => Instr::F64ConvertI64S,
        0xBA => Instr::F64ConvertI64U,
        0xBB => Instr::F64PromoteF32,
        0xBC => Instr::I32ReinterpretF32,
        0xBD => Instr::I64ReinterpretF64,
        0xBE => Instr::F32ReinterpretI32,
        0xBF => Instr::F64ReinterpretI64,

        0xC0 => Instr::I32Extend8S,
        0xC1 => Instr::I32Extend16S,
        0xC2 => Instr::I64Extend8S,
        0xC3 => Instr::I64Extend16S,
        0xC4 => Instr::I64Extend32S,

        0xD0 => Instr::RefNull(read_ref_type(cur)?),
        0xD1 => Instr::RefIsNull,
        0xD2 => Instr::RefFunc(leb128::read_uleb_u32(cur)?),

        0xFC => {
            let sub = leb128::read_uleb_u32(cur)?;
            match sub {
                0 => Instr::I32TruncSatF32S,
                1 => Instr::I32TruncSatF32U,
                2 => Instr::I32TruncSatF64S,
                3 => Instr::I32TruncSatF64U,
                4 => Instr::I64TruncSatF32S,
                5 => Instr::I64TruncSatF32U,
                6 => Instr::I64TruncSatF64S,
                7 => Instr::I64TruncSatF64U,
                8 => {
                    let data = leb128::read_uleb_u32(cur)?;
                    read_zero_byte(cur)?;
                    Instr::MemoryInit(data)
                }
                9 => Instr::DataDrop(leb128::read_uleb_u32(cur)?),
                10 => {
                    read_zero_byte(cur)?;
                    read_zero_byte(cur)?;
                    Instr::MemoryCopy
                }
                11 => {
                    read_zero_byte(cur)?;
                    Instr::MemoryFill
                }
                12 => {
                    let elem = leb128::read_uleb_u32(cur)?;
                    let table = leb128::read_uleb_u32(cur)?;
                    Instr::TableInit { elem, table }
                }
                13 => Instr::ElemDrop(leb128::read_uleb_u32(cur)?),
                14 => {
                    let dst = leb128::read_uleb_u32(cur)?;
                    let src = leb128::read_uleb_u32(cur)?;
                    Instr::TableCopy { dst, src }
                }
                15 => Instr::TableGrow(leb128::read_uleb_u32(cur)?),
                16 => Instr::TableSize(leb128::read_uleb_u32(cur)?),
                17 => Instr::TableFill(leb128::read_uleb_u32(cur)?),
                other => {
                    return Err(BinaryReadError::UnknownOpcode {
                        opcode: 0xFC00 | other,
                        offset: cur.offset(),
                    })
                }
            }
        }

        0xFD => {
            let sub = leb128::read_uleb_u32(cur)?;
            match sub {
                12 => Instr::V128Const(cur.read_u128_le()?),
                77 => Instr::V128Not,
                78 => Instr::V128And,
                80 => Instr::V128Or,
                81 => Instr::V128Xor,
                174 => Instr::I32x4Add,
                177 => Instr::I32x4Sub,
                181 => Instr::I32x4Mul,
                206 => Instr::I64x2Add,
                209 => Instr::I64x2Sub,
                other => {
                    return Err(BinaryReadError::UnknownOpcode {
                        opcode: 0xFD_0000 | other,
                        offset: cur.offset(),
                    })
                }
            }
        }

        other => {
            return Err(BinaryReadError::UnknownOpcode {
                opcode: other as u32,
                offset: cur.offset(),
            })
        }
    })
}
