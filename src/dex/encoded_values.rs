//! `encoded_value`, `encoded_array` and `encoded_annotation`.

use crate::dex::class_manager::ClassManager;
use crate::dex::error::DexError;
use crate::dex::opcode_format::ReferenceType;
use crate::dex::{read_u1, read_uleb128, write_u1, write_uleb128, write_x};

pub const VALUE_BYTE: u8 = 0x00;
pub const VALUE_SHORT: u8 = 0x02;
pub const VALUE_CHAR: u8 = 0x03;
pub const VALUE_INT: u8 = 0x04;
pub const VALUE_LONG: u8 = 0x06;
pub const VALUE_FLOAT: u8 = 0x10;
pub const VALUE_DOUBLE: u8 = 0x11;
pub const VALUE_METHOD_TYPE: u8 = 0x15;
pub const VALUE_METHOD_HANDLE: u8 = 0x16;
pub const VALUE_STRING: u8 = 0x17;
pub const VALUE_TYPE: u8 = 0x18;
pub const VALUE_FIELD: u8 = 0x19;
pub const VALUE_METHOD: u8 = 0x1a;
pub const VALUE_ENUM: u8 = 0x1b;
pub const VALUE_ARRAY: u8 = 0x1c;
pub const VALUE_ANNOTATION: u8 = 0x1d;
pub const VALUE_NULL: u8 = 0x1e;
pub const VALUE_BOOLEAN: u8 = 0x1f;

#[derive(Debug, PartialEq, Clone)]
pub struct EncodedAnnotation {
    pub type_idx: u32,
    pub elements: Vec<AnnotationElement>,
}

impl EncodedAnnotation {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedAnnotation, DexError> {
        let type_idx = read_uleb128(bytes, ix)?;
        let size = read_uleb128(bytes, ix)? as usize;
        let mut elements = Vec::with_capacity(size.min(1024));
        for _ in 0..size {
            elements.push(AnnotationElement::read(bytes, ix)?);
        }
        Ok(EncodedAnnotation { type_idx, elements })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_uleb128(bytes, self.type_idx);
        c += write_uleb128(bytes, self.elements.len() as u32);
        for element in &self.elements {
            c += element.write(bytes);
        }
        c
    }

    pub fn to_string(&self, cm: &ClassManager) -> String {
        let elements: Vec<String> = self
            .elements
            .iter()
            .map(|e| format!("{}={}", cm.get_string(e.name_idx), e.value.to_string(cm)))
            .collect();
        format!("{}({})", cm.get_type(self.type_idx), elements.join(", "))
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct AnnotationElement {
    pub name_idx: u32,
    pub value: EncodedValue,
}

impl AnnotationElement {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationElement, DexError> {
        let name_idx = read_uleb128(bytes, ix)?;
        let value = EncodedValue::read(bytes, ix)?;
        Ok(AnnotationElement { name_idx, value })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        write_uleb128(bytes, self.name_idx) + self.value.write(bytes)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum EncodedValue {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    MethodType(u32),
    MethodHandle(u32),
    String(u32),
    Type(u32),
    Field(u32),
    Method(u32),
    Enum(u32),
    Array(Vec<EncodedValue>),
    Annotation(EncodedAnnotation),
    Null,
    Boolean(bool),
}

impl EncodedValue {
    pub fn as_annotation(&self) -> Option<&EncodedAnnotation> {
        match self {
            EncodedValue::Annotation(ann) => Some(ann),
            _ => None,
        }
    }

    /// Renders the value with pool indexes resolved through `cm`.
    pub fn to_string(&self, cm: &ClassManager) -> String {
        match self {
            EncodedValue::Byte(x) => x.to_string(),
            EncodedValue::Short(x) => x.to_string(),
            EncodedValue::Char(x) => match char::from_u32(*x as u32) {
                Some(c) if !c.is_control() => format!("'{}'", c),
                _ => format!("'\\u{:04x}'", x),
            },
            EncodedValue::Int(x) => x.to_string(),
            EncodedValue::Long(x) => x.to_string(),
            EncodedValue::Float(x) => x.to_string(),
            EncodedValue::Double(x) => x.to_string(),
            EncodedValue::MethodType(x) => cm.get_kind_string(ReferenceType::MethodProto, *x),
            EncodedValue::MethodHandle(x) => cm.get_kind_string(ReferenceType::MethodHandle, *x),
            EncodedValue::String(x) => format!("\"{}\"", cm.get_string(*x)),
            EncodedValue::Type(x) => cm.get_type(*x),
            EncodedValue::Field(x) | EncodedValue::Enum(x) => cm.get_kind_string(ReferenceType::Field, *x),
            EncodedValue::Method(x) => cm.get_kind_string(ReferenceType::Method, *x),
            EncodedValue::Array(v) => {
                let parts: Vec<String> = v.iter().map(|i| i.to_string(cm)).collect();
                format!("{{{}}}", parts.join(", "))
            }
            EncodedValue::Annotation(ea) => ea.to_string(cm),
            EncodedValue::Null => "null".to_string(),
            EncodedValue::Boolean(b) => b.to_string(),
        }
    }

    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedValue, DexError> {
        let header_byte = read_u1(bytes, ix)?;
        let value_arg = header_byte >> 5;
        let value_type = header_byte & 0x1f;
        let size = value_arg as usize + 1;

        let value = match value_type {
            VALUE_BYTE => EncodedValue::Byte(read_signed(bytes, ix, 1)? as i8),
            VALUE_SHORT => EncodedValue::Short(read_signed(bytes, ix, size.min(2))? as i16),
            VALUE_CHAR => EncodedValue::Char(read_unsigned(bytes, ix, size.min(2))? as u16),
            VALUE_INT => EncodedValue::Int(read_signed(bytes, ix, size.min(4))? as i32),
            VALUE_LONG => EncodedValue::Long(read_signed(bytes, ix, size)?),
            VALUE_FLOAT => {
                let raw = read_unsigned(bytes, ix, size.min(4))? as u32;
                EncodedValue::Float(f32::from_bits(raw << (8 * (4 - size.min(4)))))
            }
            VALUE_DOUBLE => {
                let raw = read_unsigned(bytes, ix, size)?;
                EncodedValue::Double(f64::from_bits(raw << (8 * (8 - size))))
            }
            VALUE_METHOD_TYPE => EncodedValue::MethodType(read_index(bytes, ix, size)?),
            VALUE_METHOD_HANDLE => EncodedValue::MethodHandle(read_index(bytes, ix, size)?),
            VALUE_STRING => EncodedValue::String(read_index(bytes, ix, size)?),
            VALUE_TYPE => EncodedValue::Type(read_index(bytes, ix, size)?),
            VALUE_FIELD => EncodedValue::Field(read_index(bytes, ix, size)?),
            VALUE_METHOD => EncodedValue::Method(read_index(bytes, ix, size)?),
            VALUE_ENUM => EncodedValue::Enum(read_index(bytes, ix, size)?),
            VALUE_ARRAY => EncodedValue::Array(read_encoded_array(bytes, ix)?),
            VALUE_ANNOTATION => EncodedValue::Annotation(EncodedAnnotation::read(bytes, ix)?),
            VALUE_NULL => EncodedValue::Null,
            VALUE_BOOLEAN => EncodedValue::Boolean(value_arg != 0),
            other => fail!("Unknown encoded_value type 0x{:02x} at 0x{:x}", other, *ix - 1),
        };
        Ok(value)
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        match self {
            EncodedValue::Byte(v) => write_u1(bytes, VALUE_BYTE) + write_u1(bytes, *v as u8),
            EncodedValue::Short(v) => write_signed(bytes, VALUE_SHORT, *v as i64),
            EncodedValue::Char(v) => write_unsigned(bytes, VALUE_CHAR, *v as u64),
            EncodedValue::Int(v) => write_signed(bytes, VALUE_INT, *v as i64),
            EncodedValue::Long(v) => write_signed(bytes, VALUE_LONG, *v),
            EncodedValue::Float(v) => write_right_zero_extended(bytes, VALUE_FLOAT, (v.to_bits() as u64) << 32),
            EncodedValue::Double(v) => write_right_zero_extended(bytes, VALUE_DOUBLE, v.to_bits()),
            EncodedValue::MethodType(v) => write_unsigned(bytes, VALUE_METHOD_TYPE, *v as u64),
            EncodedValue::MethodHandle(v) => write_unsigned(bytes, VALUE_METHOD_HANDLE, *v as u64),
            EncodedValue::String(v) => write_unsigned(bytes, VALUE_STRING, *v as u64),
            EncodedValue::Type(v) => write_unsigned(bytes, VALUE_TYPE, *v as u64),
            EncodedValue::Field(v) => write_unsigned(bytes, VALUE_FIELD, *v as u64),
            EncodedValue::Method(v) => write_unsigned(bytes, VALUE_METHOD, *v as u64),
            EncodedValue::Enum(v) => write_unsigned(bytes, VALUE_ENUM, *v as u64),
            EncodedValue::Array(values) => write_u1(bytes, VALUE_ARRAY) + write_encoded_array(values, bytes),
            EncodedValue::Annotation(a) => write_u1(bytes, VALUE_ANNOTATION) + a.write(bytes),
            EncodedValue::Null => write_u1(bytes, VALUE_NULL),
            EncodedValue::Boolean(b) => write_u1(bytes, VALUE_BOOLEAN | ((*b as u8) << 5)),
        }
    }
}

fn read_unsigned(bytes: &[u8], ix: &mut usize, size: usize) -> Result<u64, DexError> {
    let mut result = 0u64;
    for i in 0..size.min(8) {
        result |= (read_u1(bytes, ix)? as u64) << (8 * i);
    }
    Ok(result)
}

fn read_signed(bytes: &[u8], ix: &mut usize, size: usize) -> Result<i64, DexError> {
    let size = size.min(8);
    let raw = read_unsigned(bytes, ix, size)?;
    let shift = 64 - 8 * size as u32;
    Ok(((raw << shift) as i64) >> shift)
}

fn read_index(bytes: &[u8], ix: &mut usize, size: usize) -> Result<u32, DexError> {
    Ok(read_unsigned(bytes, ix, size.min(4))? as u32)
}

fn write_with_header(bytes: &mut Vec<u8>, value_type: u8, payload: &[u8]) -> usize {
    write_u1(bytes, (((payload.len() - 1) as u8) << 5) | value_type) + write_x(bytes, payload)
}

fn write_signed(bytes: &mut Vec<u8>, value_type: u8, v: i64) -> usize {
    let mut size = 8;
    while size > 1 {
        let shift = 64 - 8 * (size - 1) as u32;
        if ((v << shift) >> shift) != v {
            break;
        }
        size -= 1;
    }
    write_with_header(bytes, value_type, &v.to_le_bytes()[..size])
}

fn write_unsigned(bytes: &mut Vec<u8>, value_type: u8, v: u64) -> usize {
    let size = ((64 - v.leading_zeros() as usize) + 7) / 8;
    write_with_header(bytes, value_type, &v.to_le_bytes()[..size.max(1)])
}

/// Floats are stored as their high-order bytes, dropping trailing zeros.
fn write_right_zero_extended(bytes: &mut Vec<u8>, value_type: u8, bits: u64) -> usize {
    let full = bits.to_le_bytes();
    let skip = ((bits.trailing_zeros() / 8) as usize).min(7);
    let keep = if value_type == VALUE_FLOAT { 4 - skip.saturating_sub(4).min(3) } else { 8 - skip };
    write_with_header(bytes, value_type, &full[8 - keep..])
}

pub fn write_encoded_array(values: &[EncodedValue], bytes: &mut Vec<u8>) -> usize {
    let mut c = write_uleb128(bytes, values.len() as u32);
    for value in values {
        c += value.write(bytes);
    }
    c
}

pub fn read_encoded_array(bytes: &[u8], ix: &mut usize) -> Result<Vec<EncodedValue>, DexError> {
    let size = read_uleb128(bytes, ix)? as usize;
    let mut values = Vec::with_capacity(size.min(1024));
    for _ in 0..size {
        values.push(EncodedValue::read(bytes, ix)?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reads_as(bytes: &[u8], expected: EncodedValue) {
        let mut ix = 0;
        let v = EncodedValue::read(bytes, &mut ix).unwrap();
        assert_eq!(v, expected);
        assert_eq!(ix, bytes.len());
        let mut out = vec![];
        assert_eq!(v.write(&mut out), bytes.len());
        assert_eq!(out, bytes);
    }

    #[test]
    fn integers_are_sign_extended()
    {
        reads_as(&[0x00, 0x7f], EncodedValue::Byte(127));
        reads_as(&[0x22, 0x34, 0x12], EncodedValue::Short(0x1234));
        reads_as(&[0x04, 0xff], EncodedValue::Int(-1));
        reads_as(&[0x24, 0x00, 0x80], EncodedValue::Int(-0x8000));
        reads_as(&[0x64, 0x78, 0x56, 0x34, 0x12], EncodedValue::Int(0x12345678));
        reads_as(&[0x26, 0xff, 0x7f], EncodedValue::Long(0x7fff));
    }

    #[test]
    fn indexes_are_zero_extended()
    {
        reads_as(&[0x03, 0xe9], EncodedValue::Char(0xe9));
        reads_as(&[0x17, 0x80], EncodedValue::String(0x80));
        reads_as(&[0x58, 0x00, 0x00, 0x01], EncodedValue::Type(0x10000));
    }

    #[test]
    fn floats_keep_high_bytes()
    {
        // 1.0f = 0x3f800000
        reads_as(&[0x30, 0x80, 0x3f], EncodedValue::Float(1.0));
        // 2.0 = 0x4000000000000000
        reads_as(&[0x11, 0x40], EncodedValue::Double(2.0));
        reads_as(&[0x10, 0x00], EncodedValue::Float(0.0));
    }

    #[test]
    fn constants_and_nesting()
    {
        reads_as(&[0x1e], EncodedValue::Null);
        reads_as(&[0x3f], EncodedValue::Boolean(true));
        reads_as(&[0x1f], EncodedValue::Boolean(false));
        reads_as(
            &[0x1c, 0x02, 0x1e, 0x04, 0x05],
            EncodedValue::Array(vec![EncodedValue::Null, EncodedValue::Int(5)]),
        );
    }

    #[test]
    fn annotation_elements()
    {
        let annotation = EncodedAnnotation {
            type_idx: 1,
            elements: vec![
                AnnotationElement { name_idx: 2, value: EncodedValue::Boolean(true) },
                AnnotationElement { name_idx: 3, value: EncodedValue::Int(42) },
            ],
        };
        let mut bytes = vec![];
        annotation.write(&mut bytes);
        assert_eq!(bytes, vec![0x01, 0x02, 0x02, 0x3f, 0x03, 0x04, 0x2a]);
        let mut ix = 0;
        assert_eq!(EncodedAnnotation::read(&bytes, &mut ix).unwrap(), annotation);
    }

    #[test]
    fn unknown_value_type_fails()
    {
        let mut ix = 0;
        assert!(EncodedValue::read(&[0x01, 0x00], &mut ix).is_err());
    }
}
