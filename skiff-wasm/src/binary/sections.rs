//! Section identifiers, headers, payload decoders, and the top-level module
//! parser.

use super::{
    cursor::Cursor,
    leb128,
    reader::{read_byte_vec, read_name, read_vec},
    BinaryReadError, Result,
};
use crate::code;
use crate::model::{
    CodeBody, DataMode, DataSegment, ElementMode, ElementSegment, Export, ExportDesc, Expr,
    FuncIdx, FuncType, Global, GlobalType, Import, ImportDesc, Limits, LocalDecl, MemoryType,
    Module, RefType, TableType, ValType,
};

/// Standard section identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionId {
    Custom = 0,
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
    DataCount = 12,
}

impl SectionId {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => SectionId::Custom,
            1 => SectionId::Type,
            2 => SectionId::Import,
            3 => SectionId::Function,
            4 => SectionId::Table,
            5 => SectionId::Memory,
            6 => SectionId::Global,
            7 => SectionId::Export,
            8 => SectionId::Start,
            9 => SectionId::Element,
            10 => SectionId::Code,
            11 => SectionId::Data,
            12 => SectionId::DataCount,
            _ => return None,
        })
    }

    /// Position in the required section ordering. DataCount sits between
    /// Element and Code.
    fn ordering_key(self) -> u8 {
        match self {
            SectionId::DataCount => 9,
            SectionId::Code => 10,
            SectionId::Data => 11,
            other => other as u8,
        }
    }
}

/// Section id, payload length, and payload start offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub id: SectionId,
    pub payload_len: u32,
    pub payload_offset: usize,
}

pub fn read_section_header(cur: &mut Cursor) -> Result<SectionHeader> {
    let id_byte = cur.read_u8()?;
    let id = SectionId::from_byte(id_byte).ok_or(BinaryReadError::Malformed {
        offset: cur.offset(),
        msg: "unknown section id",
    })?;
    let payload_len = leb128::read_uleb_u32(cur)?;
    let payload_offset = cur.offset();
    Ok(SectionHeader {
        id,
        payload_len,
        payload_offset,
    })
}

/* ---------- Type decoding helpers ---------- */

fn read_val_type(cur: &mut Cursor) -> Result<ValType> {
    let b = cur.read_u8()?;
    ValType::from_byte(b).ok_or(BinaryReadError::Malformed {
        offset: cur.offset(),
        msg: "invalid valtype",
    })
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

fn read_limits(cur: &mut Cursor) -> Result<Limits> {
    let tag = cur.read_u8()?;
    match tag {
        0x00 => {
            let min = leb128::read_uleb_u32(cur)?;
            Ok(Limits { min, max: None })
        }
        0x01 => {
            let min = leb128::read_uleb_u32(cur)?;
            let max = leb128::read_uleb_u32(cur)?;
            if max < min {
                return Err(BinaryReadError::Malformed {
                    offset: cur.offset(),
                    msg: "limits max < min",
                });
            }
            Ok(Limits {
                min,
                max: Some(max),
            })
        }
        _ => Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "invalid limits tag",
        }),
    }
}

fn read_func_type(cur: &mut Cursor) -> Result<FuncType> {
    let form = cur.read_u8()?;
    if form != 0x60 {
        return Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "expected functype (0x60)",
        });
    }
    let params = read_vec(cur, read_val_type)?;
    let results = read_vec(cur, read_val_type)?;
    Ok(FuncType { params, results })
}

fn read_table_type(cur: &mut Cursor) -> Result<TableType> {
    let elem = read_ref_type(cur)?;
    let limits = read_limits(cur)?;
    Ok(TableType { elem, limits })
}

fn read_memory_type(cur: &mut Cursor) -> Result<MemoryType> {
    let limits = read_limits(cur)?;
    Ok(MemoryType { limits })
}

fn read_global_type(cur: &mut Cursor) -> Result<GlobalType> {
    let val_type = read_val_type(cur)?;
    let mutable = match cur.read_u8()? {
        0x00 => false,
        0x01 => true,
        _ => {
            return Err(BinaryReadError::Malformed {
                offset: cur.offset(),
                msg: "invalid global mutability",
            })
        }
    };
    Ok(GlobalType { val_type, mutable })
}

/// Read an initializer expression as raw bytes up to and including the
/// terminating `end`. Only the single-instruction constant forms are
/// accepted (numeric/reference/v128 constants and `global.get`); the
/// instantiation layer evaluates the bytes later. Scanning for a bare 0x0B
/// would misfire whenever a constant's payload contains that byte, so the
/// immediates are walked opcode-aware.
fn read_expr(cur: &mut Cursor) -> Result<Expr> {
    let start = cur.offset();
    let op = cur.read_u8()?;
    match op {
        0x41 => {
            leb128::read_sleb_i32(cur)?;
        }
        0x42 => {
            leb128::read_sleb_i64(cur)?;
        }
        0x43 => cur.skip(4)?,
        0x44 => cur.skip(8)?,
        // global.get / ref.func index
        0x23 | 0xD2 => {
            leb128::read_uleb_u32(cur)?;
        }
        // ref.null type byte
        0xD0 => cur.skip(1)?,
        0xFD => {
            let sub = leb128::read_uleb_u32(cur)?;
            if sub != 12 {
                return Err(BinaryReadError::Malformed {
                    offset: cur.offset(),
                    msg: "unsupported v128 initializer",
                });
            }
            cur.skip(16)?;
        }
        _ => {
            return Err(BinaryReadError::Malformed {
                offset: cur.offset(),
                msg: "unsupported opcode in initializer",
            })
        }
    }
    if cur.read_u8()? != 0x0B {
        return Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "initializer missing end",
        });
    }
    Ok(Expr {
        body: cur.consumed_since(start).to_vec(),
    })
}

/* ---------- Section readers ---------- */

fn read_type_section(cur: &mut Cursor) -> Result<Vec<FuncType>> {
    read_vec(cur, read_func_type)
}

fn read_import_section(cur: &mut Cursor) -> Result<(Vec<Import>, u32, u32, u32, u32)> {
    let mut funcs = 0u32;
    let mut tables = 0u32;
    let mut mems = 0u32;
    let mut globals = 0u32;

    let imports = read_vec(cur, |c| {
        let module = read_name(c)?;
        let name = read_name(c)?;
        let desc = match c.read_u8()? {
            0x00 => {
                funcs += 1;
                ImportDesc::Func(leb128::read_uleb_u32(c)?)
            }
            0x01 => {
                tables += 1;
                ImportDesc::Table(read_table_type(c)?)
            }
            0x02 => {
                mems += 1;
                ImportDesc::Memory(read_memory_type(c)?)
            }
            0x03 => {
                globals += 1;
                ImportDesc::Global(read_global_type(c)?)
            }
            _ => {
                return Err(BinaryReadError::Malformed {
                    offset: c.offset(),
                    msg: "invalid import desc tag",
                })
            }
        };
        Ok(Import { module, name, desc })
    })?;
    Ok((imports, funcs, tables, mems, globals))
}

fn read_function_section(cur: &mut Cursor) -> Result<Vec<u32>> {
    read_vec(cur, leb128::read_uleb_u32)
}

fn read_table_section(cur: &mut Cursor) -> Result<Vec<TableType>> {
    read_vec(cur, read_table_type)
}

fn read_memory_section(cur: &mut Cursor) -> Result<Vec<MemoryType>> {
    read_vec(cur, read_memory_type)
}

fn read_global_section(cur: &mut Cursor) -> Result<Vec<Global>> {
    read_vec(cur, |c| {
        let ty = read_global_type(c)?;
        let init = read_expr(c)?;
        Ok(Global { ty, init })
    })
}

fn read_export_section(cur: &mut Cursor) -> Result<Vec<Export>> {
    read_vec(cur, |c| {
        let name = read_name(c)?;
        let desc = match c.read_u8()? {
            0x00 => ExportDesc::Func(leb128::read_uleb_u32(c)?),
            0x01 => ExportDesc::Table(leb128::read_uleb_u32(c)?),
            0x02 => ExportDesc::Memory(leb128::read_uleb_u32(c)?),
            0x03 => ExportDesc::Global(leb128::read_uleb_u32(c)?),
            _ => {
                return Err(BinaryReadError::Malformed {
                    offset: c.offset(),
                    msg: "invalid export desc tag",
                })
            }
        };
        Ok(Export { name, desc })
    })
}

fn read_start_section(cur: &mut Cursor) -> Result<FuncIdx> {
    leb128::read_uleb_u32(cur)
}

/// Element segments, flags 0 (active, funcidx vector, table 0), 1 (passive,
/// elemkind + funcidx vector), and 3 (declared). The remaining encodings
/// carry expression-style element lists and are rejected.
fn read_element_section(cur: &mut Cursor) -> Result<Vec<ElementSegment>> {
    fn read_elem_kind(c: &mut Cursor) -> Result<()> {
        if c.read_u8()? != 0x00 {
            return Err(BinaryReadError::Malformed {
                offset: c.offset(),
                msg: "unsupported elemkind",
            });
        }
        Ok(())
    }

    read_vec(cur, |c| {
        let flags = leb128::read_uleb_u32(c)?;
        let mode = match flags {
            0 => {
                let offset = read_expr(c)?;
                ElementMode::Active { table: 0, offset }
            }
            1 => {
                read_elem_kind(c)?;
                ElementMode::Passive
            }
            3 => {
                read_elem_kind(c)?;
                ElementMode::Declared
            }
            _ => {
                return Err(BinaryReadError::Malformed {
                    offset: c.offset(),
                    msg: "unsupported element segment flags",
                })
            }
        };
        let init = read_vec(c, leb128::read_uleb_u32)?;
        Ok(ElementSegment {
            mode,
            elem_type: RefType::FuncRef,
            init,
        })
    })
}

fn read_code_section(cur: &mut Cursor) -> Result<Vec<CodeBody>> {
    let count = leb128::read_uleb_u32(cur)? as usize;
    let mut out = Vec::with_capacity(count.min(1 << 16));
    for _ in 0..count {
        let body_size = leb128::read_uleb_u32(cur)? as usize;
        let body_bytes = cur.read_bytes(body_size)?;
        let mut sub = Cursor::new(body_bytes);

        let local_groups = leb128::read_uleb_u32(&mut sub)? as usize;
        let mut locals = Vec::with_capacity(local_groups.min(1 << 10));
        for _ in 0..local_groups {
            let count = leb128::read_uleb_u32(&mut sub)?;
            let val_type = read_val_type(&mut sub)?;
            locals.push(LocalDecl { count, val_type });
        }

        let code = code::decode_func_body(&mut sub)?;
        if !sub.is_eof() {
            return Err(BinaryReadError::Malformed {
                offset: sub.offset(),
                msg: "trailing bytes after function body",
            });
        }
        out.push(CodeBody { locals, code });
    }
    Ok(out)
}

/// Data segments, flags 0 (active, memory 0) and 1 (passive).
fn read_data_section(cur: &mut Cursor) -> Result<Vec<DataSegment>> {
    read_vec(cur, |c| {
        let flags = leb128::read_uleb_u32(c)?;
        match flags {
            0 => {
                let offset = read_expr(c)?;
                let init = read_byte_vec(c)?;
                Ok(DataSegment {
                    mode: DataMode::Active { memory: 0, offset },
                    init,
                })
            }
            1 => {
                let init = read_byte_vec(c)?;
                Ok(DataSegment {
                    mode: DataMode::Passive,
                    init,
                })
            }
            _ => Err(BinaryReadError::Malformed {
                offset: c.offset(),
                msg: "unsupported data segment flags",
            }),
        }
    })
}

/* ---------- Top-level module parser ---------- */

fn ensure_fully_consumed(cur: &Cursor) -> Result<()> {
    if cur.remaining() != 0 {
        return Err(BinaryReadError::Malformed {
            offset: cur.offset(),
            msg: "section payload not fully consumed",
        });
    }
    Ok(())
}

/// Parse a complete module from raw bytes into the IR Module.
pub fn parse_module_from_bytes(bytes: &[u8]) -> Result<Module> {
    let mut cur = Cursor::new(bytes);

    // Magic "\0asm" and version 1.
    let magic = cur.read_u32_le()?;
    if magic != 0x6D73_6100 {
        return Err(BinaryReadError::Malformed {
            offset: 0,
            msg: "bad magic header",
        });
    }
    let version = cur.read_u32_le()?;
    if version != 0x0000_0001 {
        return Err(BinaryReadError::Malformed {
            offset: 4,
            msg: "unsupported version",
        });
    }

    let mut module = Module::default();
    let mut seen = [false; 13];
    let mut last_order_key: u8 = 0;

    while !cur.is_eof() {
        let header = read_section_header(&mut cur)?;
        let payload = cur.read_bytes(header.payload_len as usize)?;
        let mut pcur = Cursor::new(payload);

        if header.id == SectionId::Custom {
            // Custom sections are skipped wholesale; a name that fails to
            // parse is tolerated.
            let _ = read_name(&mut pcur);
            continue;
        }

        let key = header.id.ordering_key();
        if key < last_order_key {
            return Err(BinaryReadError::Malformed {
                offset: header.payload_offset,
                msg: "section out of order",
            });
        }
        last_order_key = key;

        let idx = header.id as usize;
        if seen[idx] {
            return Err(BinaryReadError::Malformed {
                offset: header.payload_offset,
                msg: "duplicate standard section",
            });
        }
        seen[idx] = true;

        match header.id {
            SectionId::Custom => unreachable!("handled above"),
            SectionId::Type => module.types = read_type_section(&mut pcur)?,
            SectionId::Import => {
                let (imports, f, t, m, g) = read_import_section(&mut pcur)?;
                module.imports = imports;
                module.imported_funcs = f;
                module.imported_tables = t;
                module.imported_memories = m;
                module.imported_globals = g;
            }
            SectionId::Function => module.func_type_indices = read_function_section(&mut pcur)?,
            SectionId::Table => module.tables = read_table_section(&mut pcur)?,
            SectionId::Memory => {
                module.memories = read_memory_section(&mut pcur)?;
                if module.memories.len() > 1 {
                    return Err(BinaryReadError::Malformed {
                        offset: header.payload_offset,
                        msg: "multiple memories not supported",
                    });
                }
            }
            SectionId::Global => module.globals = read_global_section(&mut pcur)?,
            SectionId::Export => module.exports = read_export_section(&mut pcur)?,
            SectionId::Start => module.start = Some(read_start_section(&mut pcur)?),
            SectionId::Element => module.elements = read_element_section(&mut pcur)?,
            SectionId::DataCount => {
                module.data_count = Some(leb128::read_uleb_u32(&mut pcur)?);
            }
            SectionId::Code => module.codes = read_code_section(&mut pcur)?,
            SectionId::Data => module.data = read_data_section(&mut pcur)?,
        }

        ensure_fully_consumed(&pcur)?;
    }

    // Cross-section consistency; deep checks belong to the validator.
    if module.func_type_indices.len() != module.codes.len() {
        return Err(BinaryReadError::Malformed {
            offset: 0,
            msg: "function and code section length mismatch",
        });
    }

    Ok(module)
}
