//! `class_data_item`: the fields and methods a class defines.

use bitflags::bitflags;

use crate::dex::error::DexError;
use crate::dex::items::{DexItem, Relocations};
use crate::dex::{read_uleb128, write_uleb128};

bitflags! {
    /// `access_flags` bits shared by classes, fields and methods.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const VOLATILE = 0x40;
        const BRIDGE = 0x40;
        const TRANSIENT = 0x80;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const STRICT = 0x800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

/// Which kind of member the access flags belong to; a few bits are
/// overloaded between fields and methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTarget {
    Class,
    Field,
    Method,
}

/// Space-separated names of the set bits, e.g. `"public static final"`.
pub fn access_flags_string(flags: u32, target: FlagTarget) -> String {
    let mut names = Vec::new();
    let table: &[(u32, &str)] = &[
        (0x1, "public"),
        (0x2, "private"),
        (0x4, "protected"),
        (0x8, "static"),
        (0x10, "final"),
    ];
    for (bit, name) in table {
        if flags & bit != 0 {
            names.push(*name);
        }
    }
    let overloaded: &[(u32, &str)] = match target {
        FlagTarget::Field => &[(0x40, "volatile"), (0x80, "transient")],
        FlagTarget::Method => &[(0x20, "synchronized"), (0x40, "bridge"), (0x80, "varargs")],
        FlagTarget::Class => &[],
    };
    for (bit, name) in overloaded {
        if flags & bit != 0 {
            names.push(*name);
        }
    }
    let rest: &[(u32, &str)] = &[
        (0x100, "native"),
        (0x200, "interface"),
        (0x400, "abstract"),
        (0x800, "strictfp"),
        (0x1000, "synthetic"),
        (0x2000, "annotation"),
        (0x4000, "enum"),
        (0x10000, "constructor"),
        (0x20000, "declared-synchronized"),
    ];
    for (bit, name) in rest {
        if flags & bit != 0 {
            names.push(*name);
        }
    }
    names.join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedField {
    /// Absolute index into `field_ids`.
    pub field_idx: u32,
    pub access_flags: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedMethod {
    /// Absolute index into `method_ids`.
    pub method_idx: u32,
    pub access_flags: u32,
    /// Offset of the `code_item`, 0 for abstract and native methods.
    pub code_off: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassDataItem {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

fn read_fields(bytes: &[u8], ix: &mut usize, count: u32) -> Result<Vec<EncodedField>, DexError> {
    let mut previous = 0u32;
    let mut v = Vec::with_capacity((count as usize).min(4096));
    for _ in 0..count {
        previous = previous.wrapping_add(read_uleb128(bytes, ix)?);
        v.push(EncodedField { field_idx: previous, access_flags: read_uleb128(bytes, ix)? });
    }
    Ok(v)
}

fn read_methods(bytes: &[u8], ix: &mut usize, count: u32) -> Result<Vec<EncodedMethod>, DexError> {
    let mut previous = 0u32;
    let mut v = Vec::with_capacity((count as usize).min(4096));
    for _ in 0..count {
        previous = previous.wrapping_add(read_uleb128(bytes, ix)?);
        let access_flags = read_uleb128(bytes, ix)?;
        let code_off = read_uleb128(bytes, ix)?;
        v.push(EncodedMethod { method_idx: previous, access_flags, code_off });
    }
    Ok(v)
}

fn write_fields(bytes: &mut Vec<u8>, fields: &[EncodedField]) -> usize {
    let mut c = 0;
    let mut previous = 0u32;
    for f in fields {
        c += write_uleb128(bytes, f.field_idx.wrapping_sub(previous));
        previous = f.field_idx;
        c += write_uleb128(bytes, f.access_flags);
    }
    c
}

fn write_methods(bytes: &mut Vec<u8>, methods: &[EncodedMethod], reloc: &Relocations) -> usize {
    let mut c = 0;
    let mut previous = 0u32;
    for m in methods {
        c += write_uleb128(bytes, m.method_idx.wrapping_sub(previous));
        previous = m.method_idx;
        c += write_uleb128(bytes, m.access_flags);
        c += write_uleb128(bytes, reloc.get(m.code_off));
    }
    c
}

impl ClassDataItem {
    pub fn fields(&self) -> impl Iterator<Item = &EncodedField> {
        self.static_fields.iter().chain(self.instance_fields.iter())
    }

    pub fn methods(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.direct_methods.iter().chain(self.virtual_methods.iter())
    }

    /// Number of members, in the order hidden API flags list them.
    pub fn member_count(&self) -> usize {
        self.static_fields.len() + self.instance_fields.len() + self.direct_methods.len() + self.virtual_methods.len()
    }
}

impl DexItem for ClassDataItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<Self, DexError> {
        let static_fields_size = read_uleb128(bytes, ix)?;
        let instance_fields_size = read_uleb128(bytes, ix)?;
        let direct_methods_size = read_uleb128(bytes, ix)?;
        let virtual_methods_size = read_uleb128(bytes, ix)?;

        let remaining = bytes.len().saturating_sub(*ix) as u64;
        let minimum = 2 * (static_fields_size as u64 + instance_fields_size as u64)
            + 3 * (direct_methods_size as u64 + virtual_methods_size as u64);
        if minimum > remaining {
            fail!("class_data_item member counts exceed the remaining 0x{:x} bytes", remaining);
        }

        let static_fields = read_fields(bytes, ix, static_fields_size)?;
        let instance_fields = read_fields(bytes, ix, instance_fields_size)?;
        let direct_methods = read_methods(bytes, ix, direct_methods_size)?;
        let virtual_methods = read_methods(bytes, ix, virtual_methods_size)?;

        Ok(ClassDataItem { static_fields, instance_fields, direct_methods, virtual_methods })
    }

    fn write(&self, bytes: &mut Vec<u8>, reloc: &Relocations) -> usize {
        let mut c = 0;
        c += write_uleb128(bytes, self.static_fields.len() as u32);
        c += write_uleb128(bytes, self.instance_fields.len() as u32);
        c += write_uleb128(bytes, self.direct_methods.len() as u32);
        c += write_uleb128(bytes, self.virtual_methods.len() as u32);
        c += write_fields(bytes, &self.static_fields);
        c += write_fields(bytes, &self.instance_fields);
        c += write_methods(bytes, &self.direct_methods, reloc);
        c += write_methods(bytes, &self.virtual_methods, reloc);
        c
    }
}
