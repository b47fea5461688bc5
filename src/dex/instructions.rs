//! Decoding of single Dalvik instructions.
//!
//! [`decode_one`] reads one instruction (or payload pseudo-instruction) at a
//! byte offset inside a method's `insns` array. Operands keep raw pool
//! indexes; they are resolved to text through a [`ClassManager`] only when
//! rendered.

use std::fmt::Write as _;

use log::warn;

use crate::dex::class_manager::ClassManager;
use crate::dex::error::{DexError, ErrorKind};
use crate::dex::opcode_format::{Format, Opcode, ReferenceType};
use crate::dex::opcodes::OpcodeTable;
use crate::dex::{read_u2, read_u4};

pub const PACKED_SWITCH_IDENT: u16 = 0x0100;
pub const SPARSE_SWITCH_IDENT: u16 = 0x0200;
pub const FILL_ARRAY_DATA_IDENT: u16 = 0x0300;

/// One rendered operand of an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Register(u16),
    Literal(i64),
    /// An index whose meaning the DEX file does not describe (vtable slots,
    /// inline method numbers, verification error kinds).
    Raw(u32),
    /// Branch offset in 16-bit code units, relative to the instruction.
    Offset(i32),
    /// A pool reference with its resolved display string.
    Kind(ReferenceType, u32, String),
}

/// Decoded content of a payload pseudo-instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    PackedSwitch { first_key: i32, targets: Vec<i32> },
    SparseSwitch { keys: Vec<i32>, targets: Vec<i32> },
    FillArrayData { element_width: u16, size: u32, data: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct Instruction {
    opcode: &'static Opcode,
    op_value: u16,
    length: usize,
    registers: Vec<u16>,
    literal: Option<i64>,
    ref_kind: Option<u32>,
    ref_kind2: Option<u32>,
    ref_off: Option<i32>,
    payload: Option<Payload>,
}

impl Instruction {
    fn new(opcode: &'static Opcode, op_value: u16, length: usize) -> Self {
        Instruction {
            opcode,
            op_value,
            length,
            registers: Vec::new(),
            literal: None,
            ref_kind: None,
            ref_kind2: None,
            ref_off: None,
            payload: None,
        }
    }

    pub fn get_op_value(&self) -> u16 {
        self.op_value
    }

    pub fn get_name(&self) -> &'static str {
        self.opcode.name
    }

    /// Length in bytes.
    pub fn get_length(&self) -> usize {
        self.length
    }

    pub fn get_format(&self) -> Format {
        self.opcode.format
    }

    pub fn opcode(&self) -> &'static Opcode {
        self.opcode
    }

    /// Raw pool index carried by the instruction, if any.
    pub fn get_ref_kind(&self) -> Option<u32> {
        self.ref_kind
    }

    /// Proto index of `invoke-polymorphic`.
    pub fn get_ref_kind2(&self) -> Option<u32> {
        self.ref_kind2
    }

    pub fn get_ref_type(&self) -> ReferenceType {
        self.opcode.reference_type
    }

    /// Branch or payload offset in code units.
    pub fn get_ref_off(&self) -> Option<i32> {
        self.ref_off
    }

    pub fn get_literal(&self) -> Option<i64> {
        self.literal
    }

    pub fn get_registers(&self) -> &[u16] {
        &self.registers
    }

    pub fn is_payload(&self) -> bool {
        self.payload.is_some()
    }

    pub fn get_payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Case targets of a switch payload, in code units relative to the switch.
    pub fn get_targets(&self) -> &[i32] {
        match &self.payload {
            Some(Payload::PackedSwitch { targets, .. }) | Some(Payload::SparseSwitch { targets, .. }) => targets,
            _ => &[],
        }
    }

    /// Case keys of a switch payload. Packed switches yield consecutive keys.
    pub fn get_keys(&self) -> Vec<i32> {
        match &self.payload {
            Some(Payload::PackedSwitch { first_key, targets }) => {
                (0..targets.len() as i32).map(|i| first_key.wrapping_add(i)).collect()
            }
            Some(Payload::SparseSwitch { keys, .. }) => keys.clone(),
            _ => Vec::new(),
        }
    }

    /// Raw element bytes of a fill-array-data payload.
    pub fn get_data(&self) -> &[u8] {
        match &self.payload {
            Some(Payload::FillArrayData { data, .. }) => data,
            _ => &[],
        }
    }

    pub fn get_operands(&self, cm: &ClassManager) -> Vec<Operand> {
        let mut ops: Vec<Operand> = self.registers.iter().map(|r| Operand::Register(*r)).collect();
        match self.opcode.format {
            Format::Format20bc | Format::Format40sc => {
                if let Some(l) = self.literal {
                    ops.push(Operand::Literal(l));
                }
                if let Some(k) = self.ref_kind {
                    ops.push(Operand::Raw(k));
                }
                return ops;
            }
            _ => {}
        }
        if let Some(l) = self.literal {
            ops.push(Operand::Literal(l));
        }
        if let Some(k) = self.ref_kind {
            match self.opcode.reference_type {
                ReferenceType::None | ReferenceType::Offset => ops.push(Operand::Raw(k)),
                rt => ops.push(Operand::Kind(rt, k, cm.get_kind_string(rt, k))),
            }
        }
        if let (Some(k), Some(rt)) = (self.ref_kind2, self.opcode.reference_type2) {
            ops.push(Operand::Kind(rt, k, cm.get_kind_string(rt, k)));
        }
        if let Some(off) = self.ref_off {
            ops.push(Operand::Offset(off));
        }
        ops
    }

    /// Operands rendered as text, e.g. `v0, v1, Lfoo;->bar()V`.
    pub fn get_output(&self, cm: &ClassManager) -> String {
        if let Some(payload) = &self.payload {
            return match payload {
                Payload::PackedSwitch { first_key, targets } => {
                    let t: Vec<String> = targets.iter().map(|t| signed_hex(*t)).collect();
                    format!("{} [{}]", first_key, t.join(", "))
                }
                Payload::SparseSwitch { keys, targets } => {
                    let t: Vec<String> = keys.iter().zip(targets).map(|(k, t)| format!("{}: {}", k, signed_hex(*t))).collect();
                    format!("[{}]", t.join(", "))
                }
                Payload::FillArrayData { element_width, size, data } => {
                    let mut s = format!("width {} size {} [", element_width, size);
                    for (i, b) in data.iter().enumerate() {
                        if i > 0 {
                            s.push(' ');
                        }
                        let _ = write!(s, "{:02x}", b);
                    }
                    s.push(']');
                    s
                }
            };
        }

        let parts: Vec<String> = self
            .get_operands(cm)
            .into_iter()
            .map(|op| match op {
                Operand::Register(r) => format!("v{}", r),
                Operand::Literal(l) => l.to_string(),
                Operand::Raw(k) => format!("[0x{:x}]", k),
                Operand::Offset(o) => signed_hex(o),
                Operand::Kind(ReferenceType::String, _, s) => format!("\"{}\"", s),
                Operand::Kind(_, _, s) => s,
            })
            .collect();
        parts.join(", ")
    }

    pub fn show_buff(&self, cm: &ClassManager) -> String {
        let out = self.get_output(cm);
        if out.is_empty() {
            self.get_name().to_string()
        } else {
            format!("{} {}", self.get_name(), out)
        }
    }
}

fn signed_hex(v: i32) -> String {
    if v < 0 {
        format!("-{:x}", (v as i64).unsigned_abs())
    } else {
        format!("+{:x}", v)
    }
}

struct Units<'a> {
    bytes: &'a [u8],
    start: usize,
}

impl Units<'_> {
    fn u(&self, n: usize) -> Result<u16, DexError> {
        let mut ix = self.start + n * 2;
        read_u2(self.bytes, &mut ix)
    }

    fn u32_at(&self, n: usize) -> Result<u32, DexError> {
        let mut ix = self.start + n * 2;
        read_u4(self.bytes, &mut ix)
    }
}

/// Decodes the instruction starting at byte offset `ix` of `bytes`.
///
/// Every failure, truncation included, is reported as
/// [`ErrorKind::InvalidInstruction`].
pub fn decode_one(table: &OpcodeTable, bytes: &[u8], ix: usize) -> Result<Instruction, DexError> {
    decode_inner(table, bytes, ix).map_err(|e| {
        if e.kind() == ErrorKind::InvalidInstruction {
            e
        } else {
            DexError::with_context(e.into_kind(ErrorKind::InvalidInstruction), format!("instruction at 0x{:x}", ix))
        }
    })
}

fn decode_inner(table: &OpcodeTable, bytes: &[u8], ix: usize) -> Result<Instruction, DexError> {
    let units = Units { bytes, start: ix };
    let unit = units.u(0)?;
    let low = unit & 0xff;

    if (low == 0x00 || low == 0xff) && unit > 0xff {
        if let Some(opcode) = table.get(unit) {
            return if opcode.format.is_payload_format() {
                decode_payload(opcode, &units, unit)
            } else {
                decode_format(opcode, &units, unit)
            };
        }
    }

    match table.get(low) {
        Some(opcode) if !opcode.format.is_payload_format() => decode_format(opcode, &units, low),
        _ => Err(DexError::invalid_instruction(&format!(
            "Invalid opcode 0x{:02x} (unit 0x{:04x}) at 0x{:x}",
            low, unit, ix
        ))),
    }
}

fn decode_format(opcode: &'static Opcode, units: &Units, op_value: u16) -> Result<Instruction, DexError> {
    use Format::*;

    let length = opcode.format.size().unwrap_or(2);
    if units.bytes.len() < units.start + length {
        return Err(DexError::invalid_instruction(&format!(
            "Truncated {} at 0x{:x}: need {} bytes, {} available",
            opcode.name,
            units.start,
            length,
            units.bytes.len().saturating_sub(units.start)
        )));
    }

    let mut ins = Instruction::new(opcode, op_value, length);
    let u0 = units.u(0)?;
    let aa = u0 >> 8;
    let a = (u0 >> 8) & 0xf;
    let b = u0 >> 12;

    match opcode.format {
        Format10x => {}
        Format12x => ins.registers = vec![a, b],
        Format11n => {
            ins.registers = vec![a];
            ins.literal = Some((((b as u8) << 4) as i8 >> 4) as i64);
        }
        Format11x => ins.registers = vec![aa],
        Format10t => ins.ref_off = Some((aa as u8) as i8 as i32),
        Format20t => ins.ref_off = Some(units.u(1)? as i16 as i32),
        Format20bc => {
            ins.literal = Some(aa as i64);
            ins.ref_kind = Some(units.u(1)? as u32);
        }
        Format22x => ins.registers = vec![aa, units.u(1)?],
        Format21t => {
            ins.registers = vec![aa];
            ins.ref_off = Some(units.u(1)? as i16 as i32);
        }
        Format21s => {
            ins.registers = vec![aa];
            ins.literal = Some(units.u(1)? as i16 as i64);
        }
        Format21ih => {
            ins.registers = vec![aa];
            ins.literal = Some((((units.u(1)? as u32) << 16) as i32) as i64);
        }
        Format21lh => {
            ins.registers = vec![aa];
            ins.literal = Some(((units.u(1)? as u64) << 48) as i64);
        }
        Format21c => {
            ins.registers = vec![aa];
            ins.ref_kind = Some(units.u(1)? as u32);
        }
        Format23x => {
            let u1 = units.u(1)?;
            ins.registers = vec![aa, u1 & 0xff, u1 >> 8];
        }
        Format22b => {
            let u1 = units.u(1)?;
            ins.registers = vec![aa, u1 & 0xff];
            ins.literal = Some(((u1 >> 8) as u8) as i8 as i64);
        }
        Format22t => {
            ins.registers = vec![a, b];
            ins.ref_off = Some(units.u(1)? as i16 as i32);
        }
        Format22s => {
            ins.registers = vec![a, b];
            ins.literal = Some(units.u(1)? as i16 as i64);
        }
        Format22c | Format22cs => {
            ins.registers = vec![a, b];
            ins.ref_kind = Some(units.u(1)? as u32);
        }
        Format30t => ins.ref_off = Some(units.u32_at(1)? as i32),
        Format32x => ins.registers = vec![units.u(1)?, units.u(2)?],
        Format31i => {
            ins.registers = vec![aa];
            ins.literal = Some(units.u32_at(1)? as i32 as i64);
        }
        Format31t => {
            ins.registers = vec![aa];
            ins.ref_off = Some(units.u32_at(1)? as i32);
        }
        Format31c => {
            ins.registers = vec![aa];
            ins.ref_kind = Some(units.u32_at(1)?);
        }
        Format35c | Format35ms | Format35mi | Format45cc => {
            let count = b as usize;
            if count > 5 {
                if opcode.format == Format45cc {
                    return Err(DexError::invalid_instruction(&format!(
                        "{} at 0x{:x} has register count {} (max 5)",
                        opcode.name, units.start, count
                    )));
                }
                warn!("{} at 0x{:x} claims {} registers, keeping 5", opcode.name, units.start, count);
            }
            let u2 = units.u(2)?;
            let all = [u2 & 0xf, (u2 >> 4) & 0xf, (u2 >> 8) & 0xf, u2 >> 12, a];
            ins.registers = all[..count.min(5)].to_vec();
            ins.ref_kind = Some(units.u(1)? as u32);
            if opcode.format == Format45cc {
                ins.ref_kind2 = Some(units.u(3)? as u32);
            }
        }
        Format3rc | Format3rms | Format3rmi | Format4rcc => {
            let count = aa;
            if opcode.format == Format4rcc && count > 5 {
                return Err(DexError::invalid_instruction(&format!(
                    "{} at 0x{:x} has register count {} (max 5)",
                    opcode.name, units.start, count
                )));
            }
            let first = units.u(2)?;
            ins.registers = (0..count).map(|i| first.wrapping_add(i)).collect();
            ins.ref_kind = Some(units.u(1)? as u32);
            if opcode.format == Format4rcc {
                ins.ref_kind2 = Some(units.u(3)? as u32);
            }
        }
        Format51l => {
            ins.registers = vec![aa];
            let lo = units.u32_at(1)? as u64;
            let hi = units.u32_at(3)? as u64;
            ins.literal = Some((lo | (hi << 32)) as i64);
        }
        Format41c => {
            ins.ref_kind = Some(units.u32_at(1)?);
            ins.registers = vec![units.u(3)?];
        }
        Format40sc => {
            ins.ref_kind = Some(units.u32_at(1)?);
            ins.literal = Some(units.u(3)? as i64);
        }
        Format52c => {
            ins.ref_kind = Some(units.u32_at(1)?);
            ins.registers = vec![units.u(3)?, units.u(4)?];
        }
        Format5rc => {
            ins.ref_kind = Some(units.u32_at(1)?);
            let count = units.u(3)?;
            let first = units.u(4)?;
            ins.registers = (0..count).map(|i| first.wrapping_add(i)).collect();
        }
        ArrayPayload | PackedSwitchPayload | SparseSwitchPayload => {
            return Err(DexError::invalid_instruction("payload decoded as a regular instruction"));
        }
    }
    Ok(ins)
}

/// Byte length of a payload from its header, without decoding its body.
pub fn payload_length(ident: u16, size_field: u32, element_width: u32) -> usize {
    match ident {
        PACKED_SWITCH_IDENT => ((size_field as usize) * 2 + 4) * 2,
        SPARSE_SWITCH_IDENT => ((size_field as usize) * 4 + 2) * 2,
        _ => (((size_field as usize) * (element_width as usize) + 1) / 2 + 4) * 2,
    }
}

fn decode_payload(opcode: &'static Opcode, units: &Units, ident: u16) -> Result<Instruction, DexError> {
    let size = units.u(1)?;
    match ident {
        PACKED_SWITCH_IDENT => {
            let first_key = units.u32_at(2)? as i32;
            let mut targets = Vec::with_capacity(size as usize);
            for i in 0..size as usize {
                targets.push(units.u32_at(4 + i * 2)? as i32);
            }
            let mut ins = Instruction::new(opcode, ident, payload_length(ident, size as u32, 0));
            ins.payload = Some(Payload::PackedSwitch { first_key, targets });
            Ok(ins)
        }
        SPARSE_SWITCH_IDENT => {
            let n = size as usize;
            let mut keys = Vec::with_capacity(n);
            let mut targets = Vec::with_capacity(n);
            for i in 0..n {
                keys.push(units.u32_at(2 + i * 2)? as i32);
            }
            for i in 0..n {
                targets.push(units.u32_at(2 + (n + i) * 2)? as i32);
            }
            let mut ins = Instruction::new(opcode, ident, payload_length(ident, size as u32, 0));
            ins.payload = Some(Payload::SparseSwitch { keys, targets });
            Ok(ins)
        }
        _ => {
            let element_width = size;
            let count = units.u32_at(2)?;
            let data_len = (count as usize)
                .checked_mul(element_width as usize)
                .ok_or_else(|| DexError::invalid_instruction("fill-array-data payload size overflows"))?;
            let data_start = units.start + 8;
            if units.bytes.len() < data_start + data_len {
                return Err(DexError::invalid_instruction(&format!(
                    "Truncated fill-array-data payload at 0x{:x}",
                    units.start
                )));
            }
            let data = units.bytes[data_start..data_start + data_len].to_vec();
            let mut ins = Instruction::new(opcode, ident, payload_length(ident, count, element_width as u32));
            ins.payload = Some(Payload::FillArrayData { element_width, size: count, data });
            Ok(ins)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t28() -> std::sync::Arc<OpcodeTable> {
        OpcodeTable::new(28, false)
    }

    #[test]
    fn nop_decodes()
    {
        let ins = decode_one(&t28(), &[0x00, 0x00], 0).unwrap();
        assert_eq!(ins.get_op_value(), 0x00);
        assert_eq!(ins.get_name(), "nop");
        assert_eq!(ins.get_length(), 2);
        assert_eq!(ins.get_format(), Format::Format10x);
    }

    #[test]
    fn const_high16_shifts_left()
    {
        let ins = decode_one(&t28(), &[0x15, 0x00, 0x42, 0x11], 0).unwrap();
        assert_eq!(ins.get_literal(), Some(0x11420000));
        assert_eq!(ins.get_registers(), &[0]);

        let wide = decode_one(&t28(), &[0x19, 0x03, 0x42, 0x11], 0).unwrap();
        assert_eq!(wide.get_literal(), Some(0x1142_0000_0000_0000));
    }

    #[test]
    fn nibble_and_byte_literals_sign_extend()
    {
        // const/4 v1, #-1
        let ins = decode_one(&t28(), &[0x12, 0xf1], 0).unwrap();
        assert_eq!(ins.get_registers(), &[1]);
        assert_eq!(ins.get_literal(), Some(-1));

        // add-int/lit8 v0, v1, #-2
        let ins = decode_one(&t28(), &[0xd8, 0x00, 0x01, 0xfe], 0).unwrap();
        assert_eq!(ins.get_registers(), &[0, 1]);
        assert_eq!(ins.get_literal(), Some(-2));
    }

    #[test]
    fn invoke_registers_in_order()
    {
        // invoke-virtual {v1, v2, v3}, method@0x0005
        let ins = decode_one(&t28(), &[0x6e, 0x30, 0x05, 0x00, 0x21, 0x03], 0).unwrap();
        assert_eq!(ins.get_registers(), &[1, 2, 3]);
        assert_eq!(ins.get_ref_kind(), Some(5));
        assert_eq!(ins.get_length(), 6);

        // invoke-static/range {v4 .. v6}, method@0x0102
        let ins = decode_one(&t28(), &[0x77, 0x03, 0x02, 0x01, 0x04, 0x00], 0).unwrap();
        assert_eq!(ins.get_registers(), &[4, 5, 6]);
        assert_eq!(ins.get_ref_kind(), Some(0x102));
    }

    #[test]
    fn invoke_polymorphic_with_six_registers_is_rejected()
    {
        let bytes = [0xfa, 0x60, 0x01, 0x00, 0x10, 0x32, 0x02, 0x00];
        let e = decode_one(&t28(), &bytes, 0).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidInstruction);

        let ok = [0xfa, 0x20, 0x01, 0x00, 0x10, 0x00, 0x02, 0x00];
        let ins = decode_one(&t28(), &ok, 0).unwrap();
        assert_eq!(ins.get_registers(), &[0, 1]);
        assert_eq!(ins.get_ref_kind2(), Some(2));
    }

    #[test]
    fn unused_opcodes_fail_whatever_follows()
    {
        let table = t28();
        for op in table.unused_opcodes() {
            for tail in [[0u8; 9], [0xffu8; 9]] {
                let mut bytes = vec![op];
                bytes.extend_from_slice(&tail);
                let e = decode_one(&table, &bytes, 0).unwrap_err();
                assert_eq!(e.kind(), ErrorKind::InvalidInstruction, "opcode 0x{:02x}", op);
            }
        }
    }

    #[test]
    fn lengths_follow_formats()
    {
        let table = t28();
        for value in 0u16..=0xff {
            if let Some(op) = table.get(value) {
                let mut bytes = vec![value as u8, 0x01];
                bytes.extend_from_slice(&[0u8; 8]);
                let ins = decode_one(&table, &bytes, 0).unwrap();
                assert_eq!(Some(ins.get_length()), op.format.size(), "{}", op.name);
            }
        }
    }

    #[test]
    fn truncated_instruction_is_invalid()
    {
        let e = decode_one(&t28(), &[0x14, 0x00, 0x01], 0).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidInstruction);
    }

    #[test]
    fn jumbo_needs_odex()
    {
        // invoke-virtual/jumbo {v1 .. v2}, method@0x10000
        let bytes = [0xff, 0x22, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x01, 0x00];
        let odex = OpcodeTable::for_dex_version(36, true);
        let ins = decode_one(&odex, &bytes, 0).unwrap();
        assert_eq!(ins.get_name(), "invoke-virtual/jumbo");
        assert_eq!(ins.get_ref_kind(), Some(0x10000));
        assert_eq!(ins.get_registers(), &[1, 2]);
        assert_eq!(ins.get_length(), 10);

        let plain = OpcodeTable::for_dex_version(35, false);
        assert!(decode_one(&plain, &bytes, 0).is_err());
    }

    #[test]
    fn const_class_jumbo_is_the_bare_escape()
    {
        // const-class/jumbo v3, type@0x10001; the unit is 0x00ff itself
        let bytes = [0xff, 0x00, 0x01, 0x00, 0x01, 0x00, 0x03, 0x00];
        let odex = OpcodeTable::for_dex_version(36, true);
        let ins = decode_one(&odex, &bytes, 0).unwrap();
        assert_eq!(ins.get_name(), "const-class/jumbo");
        assert_eq!(ins.get_ref_kind(), Some(0x10001));
        assert_eq!(ins.get_registers(), &[3]);
        assert_eq!(ins.get_length(), 8);

        // 0xff is const-method-type from API 28 on
        let ins = decode_one(&t28(), &[0xff, 0x03, 0x01, 0x00], 0).unwrap();
        assert_eq!(ins.get_name(), "const-method-type");
    }

    #[test]
    fn payloads()
    {
        let table = t28();
        // packed-switch-payload: 2 targets, first key 10
        let packed = [0x00, 0x01, 0x02, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00];
        let ins = decode_one(&table, &packed, 0).unwrap();
        assert_eq!(ins.get_length(), 16);
        assert_eq!(ins.get_targets(), &[5, 8]);
        assert_eq!(ins.get_keys(), vec![10, 11]);

        // sparse-switch-payload: keys [-1, 7], targets [3, 9]
        let mut sparse = vec![0x00, 0x02, 0x02, 0x00];
        for v in [-1i32, 7, 3, 9] {
            sparse.extend_from_slice(&v.to_le_bytes());
        }
        let ins = decode_one(&table, &sparse, 0).unwrap();
        assert_eq!(ins.get_length(), 20);
        assert_eq!(ins.get_keys(), vec![-1, 7]);
        assert_eq!(ins.get_targets(), &[3, 9]);

        // fill-array-data-payload: 3 one-byte elements, padded to 4 units + 2
        let array = [0x00, 0x03, 0x01, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x00];
        let ins = decode_one(&table, &array, 0).unwrap();
        assert_eq!(ins.get_length(), 12);
        assert_eq!(ins.get_data(), &[1, 2, 3]);
    }

    #[test]
    fn signed_hex_offsets()
    {
        assert_eq!(signed_hex(5), "+5");
        assert_eq!(signed_hex(-0x10), "-10");
        assert_eq!(signed_hex(i32::MIN), "-80000000");
    }
}
