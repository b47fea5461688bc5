//! `code_item`, its try/catch tables, and `debug_info_item`.

use log::warn;

use crate::dex::error::DexError;
use crate::dex::items::{DexItem, Relocations};
use crate::dex::{read_sleb128, read_u1, read_u2, read_u4, read_uleb128, read_uleb128p1, read_x, write_u2, write_u4, write_x};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTypeAddrPair {
    pub type_idx: u32,
    /// Handler address in code units.
    pub addr: u32,
}

impl EncodedTypeAddrPair {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedTypeAddrPair, DexError> {
        let type_idx = read_uleb128(bytes, ix)?;
        let addr = read_uleb128(bytes, ix)?;
        Ok(EncodedTypeAddrPair { type_idx, addr })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryItem {
    /// First covered code unit.
    pub start_addr: u32,
    pub insn_count: u16,
    /// Byte offset of the handler from the start of the handler list.
    pub handler_off: u16,
}

impl TryItem {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<TryItem, DexError> {
        Ok(TryItem {
            start_addr: read_u4(bytes, ix)?,
            insn_count: read_u2(bytes, ix)?,
            handler_off: read_u2(bytes, ix)?,
        })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        write_u4(bytes, self.start_addr) + write_u2(bytes, self.insn_count) + write_u2(bytes, self.handler_off)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCatchHandler {
    /// Byte offset from the start of the handler list.
    pub offset: u16,
    /// Raw `size`: non-positive when a catch-all follows the typed handlers.
    pub size: i32,
    pub handlers: Vec<EncodedTypeAddrPair>,
    pub catch_all_addr: Option<u32>,
}

impl EncodedCatchHandler {
    fn read(bytes: &[u8], ix: &mut usize, offset: u16) -> Result<EncodedCatchHandler, DexError> {
        let size = read_sleb128(bytes, ix)?;
        let count = size.unsigned_abs() as usize;
        if count > bytes.len().saturating_sub(*ix) {
            fail!("encoded_catch_handler size {} overruns the file", size);
        }
        let mut handlers = Vec::with_capacity(count);
        for _ in 0..count {
            handlers.push(EncodedTypeAddrPair::read(bytes, ix)?);
        }
        let catch_all_addr = if size <= 0 { Some(read_uleb128(bytes, ix)?) } else { None };
        Ok(EncodedCatchHandler { offset, size, handlers, catch_all_addr })
    }
}

/// `encoded_catch_handler_list`, parsed and kept raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCatchHandlerList {
    pub handlers: Vec<EncodedCatchHandler>,
    pub raw: Vec<u8>,
}

impl EncodedCatchHandlerList {
    pub fn handler_at(&self, offset: u16) -> Option<&EncodedCatchHandler> {
        self.handlers.iter().find(|h| h.offset == offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub tries_size: u16,
    pub debug_info_off: u32,
    /// The instruction stream, `insns_size * 2` bytes.
    pub insns: Vec<u8>,
    pub padding: u16,
    pub tries: Vec<TryItem>,
    pub handlers: Option<EncodedCatchHandlerList>,
}

impl CodeItem {
    /// Length of the instruction stream in code units.
    pub fn insns_size(&self) -> u32 {
        (self.insns.len() / 2) as u32
    }

    /// The handler a try block points at.
    pub fn handler_for(&self, t: &TryItem) -> Option<&EncodedCatchHandler> {
        self.handlers.as_ref().and_then(|h| h.handler_at(t.handler_off))
    }
}

impl DexItem for CodeItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        let code_item_start = *ix;
        let registers_size = read_u2(bytes, ix)?;
        let ins_size = read_u2(bytes, ix)?;
        let outs_size = read_u2(bytes, ix)?;
        let tries_size = read_u2(bytes, ix)?;
        let debug_info_off = read_u4(bytes, ix)?;
        let insns_size = read_u4(bytes, ix)?;
        let insns = read_x(bytes, ix, (insns_size as usize).saturating_mul(2))?;

        let mut padding = 0;
        let mut tries = Vec::new();
        let mut handlers = None;

        if tries_size > 0 {
            if insns_size & 1 != 0 {
                padding = read_u2(bytes, ix)?;
                if padding != 0 {
                    warn!(
                        "[codeitem] non-zero padding 0x{:04x} at 0x{:x} (code_item_start=0x{:x})",
                        padding,
                        *ix - 2,
                        code_item_start
                    );
                }
            }
            for _ in 0..tries_size {
                tries.push(TryItem::read(bytes, ix)?);
            }

            let list_start = *ix;
            let handlers_size = read_uleb128(bytes, ix)? as usize;
            if handlers_size > bytes.len().saturating_sub(*ix) {
                fail!("encoded_catch_handler_list size {} is implausibly large", handlers_size);
            }
            let mut parsed = Vec::with_capacity(handlers_size);
            for i in 0..handlers_size {
                let entry = *ix;
                let offset = (entry - list_start) as u16;
                let handler = EncodedCatchHandler::read(bytes, ix, offset).map_err(|e| {
                    DexError::with_context(
                        e,
                        format!(
                            "EncodedCatchHandler #{}/{} at 0x{:x} (code_item_start=0x{:x})",
                            i + 1,
                            handlers_size,
                            entry,
                            code_item_start
                        ),
                    )
                })?;
                parsed.push(handler);
            }
            for (ti, t) in tries.iter().enumerate() {
                if !parsed.iter().any(|h| h.offset == t.handler_off) {
                    warn!(
                        "[codeitem] try #{} handler_off 0x{:x} matches no handler (code_item_start=0x{:x})",
                        ti, t.handler_off, code_item_start
                    );
                }
            }
            handlers = Some(EncodedCatchHandlerList { handlers: parsed, raw: bytes[list_start..*ix].to_vec() });
        }

        Ok(CodeItem { registers_size, ins_size, outs_size, tries_size, debug_info_off, insns, padding, tries, handlers })
    }

    fn write(&self, bytes: &mut Vec<u8>, reloc: &Relocations) -> usize {
        let mut c = 0;
        c += write_u2(bytes, self.registers_size);
        c += write_u2(bytes, self.ins_size);
        c += write_u2(bytes, self.outs_size);
        c += write_u2(bytes, self.tries.len() as u16);
        c += write_u4(bytes, reloc.get(self.debug_info_off));
        c += write_u4(bytes, self.insns_size());
        c += write_x(bytes, &self.insns);
        if !self.tries.is_empty() {
            if self.insns_size() & 1 != 0 {
                c += write_u2(bytes, self.padding);
            }
            for t in &self.tries {
                c += t.write(bytes);
            }
            if let Some(h) = &self.handlers {
                c += write_x(bytes, &h.raw);
            }
        }
        c
    }
}

/// One opcode of the debug info state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOp {
    EndSequence,
    AdvancePc(u32),
    AdvanceLine(i32),
    StartLocal { register: u32, name_idx: i32, type_idx: i32 },
    StartLocalExtended { register: u32, name_idx: i32, type_idx: i32, sig_idx: i32 },
    EndLocal(u32),
    RestartLocal(u32),
    SetPrologueEnd,
    SetEpilogueBegin,
    SetFile(i32),
    /// Special opcodes (0x0a..=0xff) advance both line and address.
    Special(u8),
}

pub const DBG_FIRST_SPECIAL: u8 = 0x0a;
pub const DBG_LINE_BASE: i32 = -4;
pub const DBG_LINE_RANGE: i32 = 15;

impl DebugOp {
    /// Line and address deltas of a special opcode.
    pub fn special_deltas(op: u8) -> (i32, u32) {
        let adjusted = op.saturating_sub(DBG_FIRST_SPECIAL) as i32;
        (DBG_LINE_BASE + adjusted % DBG_LINE_RANGE, (adjusted / DBG_LINE_RANGE) as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugInfoItem {
    pub line_start: u32,
    /// String indexes, -1 where a parameter has no name.
    pub parameter_names: Vec<i32>,
    pub ops: Vec<DebugOp>,
    pub raw: Vec<u8>,
}

impl DebugInfoItem {
    /// `(address, line)` pairs emitted by the state machine.
    pub fn line_table(&self) -> Vec<(u32, i64)> {
        let mut address = 0u32;
        let mut line = self.line_start as i64;
        let mut rows = Vec::new();
        for op in &self.ops {
            match op {
                DebugOp::AdvancePc(d) => address = address.wrapping_add(*d),
                DebugOp::AdvanceLine(d) => line += *d as i64,
                DebugOp::Special(code) => {
                    let (dl, da) = DebugOp::special_deltas(*code);
                    line += dl as i64;
                    address = address.wrapping_add(da);
                    rows.push((address, line));
                }
                _ => {}
            }
        }
        rows
    }
}

impl DexItem for DebugInfoItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        let start = *ix;
        let line_start = read_uleb128(bytes, ix)?;
        let parameters_size = read_uleb128(bytes, ix)?;
        if parameters_size as usize > bytes.len().saturating_sub(*ix) {
            fail!("debug_info_item parameters_size {} overruns the file", parameters_size);
        }
        let mut parameter_names = Vec::with_capacity(parameters_size as usize);
        for _ in 0..parameters_size {
            parameter_names.push(read_uleb128p1(bytes, ix)?);
        }

        let mut ops = Vec::new();
        loop {
            let opcode = read_u1(bytes, ix)?;
            let op = match opcode {
                0x00 => DebugOp::EndSequence,
                0x01 => DebugOp::AdvancePc(read_uleb128(bytes, ix)?),
                0x02 => DebugOp::AdvanceLine(read_sleb128(bytes, ix)?),
                0x03 => DebugOp::StartLocal {
                    register: read_uleb128(bytes, ix)?,
                    name_idx: read_uleb128p1(bytes, ix)?,
                    type_idx: read_uleb128p1(bytes, ix)?,
                },
                0x04 => DebugOp::StartLocalExtended {
                    register: read_uleb128(bytes, ix)?,
                    name_idx: read_uleb128p1(bytes, ix)?,
                    type_idx: read_uleb128p1(bytes, ix)?,
                    sig_idx: read_uleb128p1(bytes, ix)?,
                },
                0x05 => DebugOp::EndLocal(read_uleb128(bytes, ix)?),
                0x06 => DebugOp::RestartLocal(read_uleb128(bytes, ix)?),
                0x07 => DebugOp::SetPrologueEnd,
                0x08 => DebugOp::SetEpilogueBegin,
                0x09 => DebugOp::SetFile(read_uleb128p1(bytes, ix)?),
                special => DebugOp::Special(special),
            };
            let end = op == DebugOp::EndSequence;
            ops.push(op);
            if end {
                break;
            }
        }

        Ok(DebugInfoItem { line_start, parameter_names, ops, raw: bytes[start..*ix].to_vec() })
    }

    fn write(&self, bytes: &mut Vec<u8>, _reloc: &Relocations) -> usize {
        write_x(bytes, &self.raw)
    }
}
