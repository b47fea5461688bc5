//! Fixed-layout id items and the small data items that reference them.
//!
//! Every item keeps the raw indexes and offsets it was read with. Offsets are
//! translated through [`Relocations`] when an item is written back.

use std::collections::HashMap;

use crate::dex::encoded_values::{read_encoded_array, EncodedValue};
use crate::dex::error::DexError;
use crate::dex::{mutf8, read_u2, read_u4, read_uleb128, write_u1, write_u2, write_u4, write_uleb128, write_x};

pub const NO_INDEX: u32 = 0xffff_ffff;

/// Old offset to new offset, filled in while a file is laid out again.
/// Offset 0 means "absent" and always maps to itself, as do offsets that
/// were never recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relocations {
    map: HashMap<u32, u32>,
}

impl Relocations {
    pub fn identity() -> Self {
        Relocations::default()
    }

    pub fn get(&self, old: u32) -> u32 {
        if old == 0 {
            return 0;
        }
        self.map.get(&old).copied().unwrap_or(old)
    }

    pub(crate) fn insert(&mut self, old: u32, new: u32) {
        self.map.insert(old, new);
    }
}

/// A section entry that can be read at a cursor and written back.
pub trait DexItem: Sized {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError>;
    fn write(&self, bytes: &mut Vec<u8>, reloc: &Relocations) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringIdItem {
    pub string_data_off: u32,
}

impl DexItem for StringIdItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        Ok(StringIdItem { string_data_off: read_u4(bytes, ix)? })
    }

    fn write(&self, bytes: &mut Vec<u8>, reloc: &Relocations) -> usize {
        write_u4(bytes, reloc.get(self.string_data_off))
    }
}

/// `string_data_item`: the ULEB128 UTF-16 length, the MUTF-8 bytes and a
/// trailing NUL. `data` excludes the terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringDataItem {
    pub utf16_size: u32,
    pub data: Vec<u8>,
    pub value: String,
}

impl StringDataItem {
    pub fn new(s: &str) -> Self {
        StringDataItem { utf16_size: mutf8::utf16_len(s), data: mutf8::encode(s), value: s.to_string() }
    }
}

impl DexItem for StringDataItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        let utf16_size = read_uleb128(bytes, ix)?;
        let start = *ix;
        let len = match bytes.get(start..).and_then(|rest| rest.iter().position(|b| *b == 0)) {
            Some(len) => len,
            None => return Err(DexError::eof(&format!("Unterminated string_data_item at 0x{:x}", start))),
        };
        let data = bytes[start..start + len].to_vec();
        *ix = start + len + 1;
        let value = mutf8::decode(&data);
        Ok(StringDataItem { utf16_size, data, value })
    }

    fn write(&self, bytes: &mut Vec<u8>, _reloc: &Relocations) -> usize {
        write_uleb128(bytes, self.utf16_size) + write_x(bytes, &self.data) + write_u1(bytes, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeIdItem {
    pub descriptor_idx: u32,
}

impl DexItem for TypeIdItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        Ok(TypeIdItem { descriptor_idx: read_u4(bytes, ix)? })
    }

    fn write(&self, bytes: &mut Vec<u8>, _reloc: &Relocations) -> usize {
        write_u4(bytes, self.descriptor_idx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtoIdItem {
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    pub parameters_off: u32,
}

impl DexItem for ProtoIdItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        Ok(ProtoIdItem {
            shorty_idx: read_u4(bytes, ix)?,
            return_type_idx: read_u4(bytes, ix)?,
            parameters_off: read_u4(bytes, ix)?,
        })
    }

    fn write(&self, bytes: &mut Vec<u8>, reloc: &Relocations) -> usize {
        write_u4(bytes, self.shorty_idx)
            + write_u4(bytes, self.return_type_idx)
            + write_u4(bytes, reloc.get(self.parameters_off))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldIdItem {
    pub class_idx: u16,
    pub type_idx: u16,
    pub name_idx: u32,
}

impl DexItem for FieldIdItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        Ok(FieldIdItem {
            class_idx: read_u2(bytes, ix)?,
            type_idx: read_u2(bytes, ix)?,
            name_idx: read_u4(bytes, ix)?,
        })
    }

    fn write(&self, bytes: &mut Vec<u8>, _reloc: &Relocations) -> usize {
        write_u2(bytes, self.class_idx) + write_u2(bytes, self.type_idx) + write_u4(bytes, self.name_idx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodIdItem {
    pub class_idx: u16,
    pub proto_idx: u16,
    pub name_idx: u32,
}

impl DexItem for MethodIdItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        Ok(MethodIdItem {
            class_idx: read_u2(bytes, ix)?,
            proto_idx: read_u2(bytes, ix)?,
            name_idx: read_u4(bytes, ix)?,
        })
    }

    fn write(&self, bytes: &mut Vec<u8>, _reloc: &Relocations) -> usize {
        write_u2(bytes, self.class_idx) + write_u2(bytes, self.proto_idx) + write_u4(bytes, self.name_idx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassDefItem {
    pub class_idx: u32,
    pub access_flags: u32,
    pub superclass_idx: u32,
    pub interfaces_off: u32,
    pub source_file_idx: u32,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
}

impl DexItem for ClassDefItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        Ok(ClassDefItem {
            class_idx: read_u4(bytes, ix)?,
            access_flags: read_u4(bytes, ix)?,
            superclass_idx: read_u4(bytes, ix)?,
            interfaces_off: read_u4(bytes, ix)?,
            source_file_idx: read_u4(bytes, ix)?,
            annotations_off: read_u4(bytes, ix)?,
            class_data_off: read_u4(bytes, ix)?,
            static_values_off: read_u4(bytes, ix)?,
        })
    }

    fn write(&self, bytes: &mut Vec<u8>, reloc: &Relocations) -> usize {
        let mut c = 0;
        c += write_u4(bytes, self.class_idx);
        c += write_u4(bytes, self.access_flags);
        c += write_u4(bytes, self.superclass_idx);
        c += write_u4(bytes, reloc.get(self.interfaces_off));
        c += write_u4(bytes, self.source_file_idx);
        c += write_u4(bytes, reloc.get(self.annotations_off));
        c += write_u4(bytes, reloc.get(self.class_data_off));
        c += write_u4(bytes, reloc.get(self.static_values_off));
        c
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSiteIdItem {
    pub call_site_off: u32,
}

impl DexItem for CallSiteIdItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        Ok(CallSiteIdItem { call_site_off: read_u4(bytes, ix)? })
    }

    fn write(&self, bytes: &mut Vec<u8>, reloc: &Relocations) -> usize {
        write_u4(bytes, reloc.get(self.call_site_off))
    }
}

/// Kinds of `method_handle_item`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodHandleType {
    StaticPut,
    StaticGet,
    InstancePut,
    InstanceGet,
    InvokeStatic,
    InvokeInstance,
    InvokeConstructor,
    InvokeDirect,
    InvokeInterface,
    Unknown(u16),
}

impl MethodHandleType {
    pub fn from_u16(v: u16) -> Self {
        match v {
            0 => MethodHandleType::StaticPut,
            1 => MethodHandleType::StaticGet,
            2 => MethodHandleType::InstancePut,
            3 => MethodHandleType::InstanceGet,
            4 => MethodHandleType::InvokeStatic,
            5 => MethodHandleType::InvokeInstance,
            6 => MethodHandleType::InvokeConstructor,
            7 => MethodHandleType::InvokeDirect,
            8 => MethodHandleType::InvokeInterface,
            other => MethodHandleType::Unknown(other),
        }
    }

    pub fn is_field_accessor(self) -> bool {
        matches!(
            self,
            MethodHandleType::StaticPut
                | MethodHandleType::StaticGet
                | MethodHandleType::InstancePut
                | MethodHandleType::InstanceGet
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            MethodHandleType::StaticPut => "static-put",
            MethodHandleType::StaticGet => "static-get",
            MethodHandleType::InstancePut => "instance-put",
            MethodHandleType::InstanceGet => "instance-get",
            MethodHandleType::InvokeStatic => "invoke-static",
            MethodHandleType::InvokeInstance => "invoke-instance",
            MethodHandleType::InvokeConstructor => "invoke-constructor",
            MethodHandleType::InvokeDirect => "invoke-direct",
            MethodHandleType::InvokeInterface => "invoke-interface",
            MethodHandleType::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodHandleItem {
    pub method_handle_type: u16,
    pub unused1: u16,
    pub field_or_method_id: u16,
    pub unused2: u16,
}

impl MethodHandleItem {
    pub fn handle_type(&self) -> MethodHandleType {
        MethodHandleType::from_u16(self.method_handle_type)
    }
}

impl DexItem for MethodHandleItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        Ok(MethodHandleItem {
            method_handle_type: read_u2(bytes, ix)?,
            unused1: read_u2(bytes, ix)?,
            field_or_method_id: read_u2(bytes, ix)?,
            unused2: read_u2(bytes, ix)?,
        })
    }

    fn write(&self, bytes: &mut Vec<u8>, _reloc: &Relocations) -> usize {
        write_u2(bytes, self.method_handle_type)
            + write_u2(bytes, self.unused1)
            + write_u2(bytes, self.field_or_method_id)
            + write_u2(bytes, self.unused2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeList {
    pub list: Vec<u16>,
}

impl DexItem for TypeList {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        let size = read_u4(bytes, ix)? as usize;
        if size.saturating_mul(2) > bytes.len().saturating_sub(*ix) {
            return Err(DexError::eof(&format!("type_list of {} entries overruns the file", size)));
        }
        let mut list = Vec::with_capacity(size);
        for _ in 0..size {
            list.push(read_u2(bytes, ix)?);
        }
        Ok(TypeList { list })
    }

    fn write(&self, bytes: &mut Vec<u8>, _reloc: &Relocations) -> usize {
        let mut c = write_u4(bytes, self.list.len() as u32);
        for t in &self.list {
            c += write_u2(bytes, *t);
        }
        c
    }
}

/// `encoded_array_item`, parsed for lookups and kept raw for writing.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArrayItem {
    pub values: Vec<EncodedValue>,
    pub raw: Vec<u8>,
}

impl DexItem for EncodedArrayItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        let start = *ix;
        let values = read_encoded_array(bytes, ix)?;
        Ok(EncodedArrayItem { values, raw: bytes[start..*ix].to_vec() })
    }

    fn write(&self, bytes: &mut Vec<u8>, _reloc: &Relocations) -> usize {
        write_x(bytes, &self.raw)
    }
}
