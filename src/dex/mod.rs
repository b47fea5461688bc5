#[macro_use]
pub mod error;

pub mod annotations;
pub mod class_data;
pub mod class_manager;
pub mod code;
pub mod dex_file;
pub mod disassembler;
pub mod encoded_values;
pub mod header;
pub mod hidden_api;
pub mod instructions;
pub mod items;
pub mod leb;
pub mod map_list;
pub mod mutf8;
pub mod odex;
pub mod opcode_format;
pub mod opcodes;
mod writer;

pub use crate::dex::class_manager::ClassManager;
pub use crate::dex::dex_file::{ClassDef, DexFile, Field, Method};
pub use crate::dex::error::{DexError, ErrorKind};
pub use crate::dex::instructions::{Instruction, Operand};
pub use crate::dex::odex::OdexFile;

use crate::dex::leb::{decode_sleb128, decode_uleb128, decode_uleb128p1, encode_sleb128, encode_uleb128, encode_uleb128p1};

// Basic type reading and writing
pub(crate) fn read_u1(bytes: &[u8], ix: &mut usize) -> Result<u8, DexError>
{
    if bytes.len() < *ix + 1
    {
        return Err(DexError::eof(&format!("Unexpected end of stream reading u1 at index {}", *ix)));
    }
    let result = bytes[*ix];
    *ix += 1;
    Ok(result)
}

pub(crate) fn read_u2(bytes: &[u8], ix: &mut usize) -> Result<u16, DexError>
{
    if bytes.len() < *ix + 2
    {
        return Err(DexError::eof(&format!("Unexpected end of stream reading u2 at index {}", *ix)));
    }
    let result = ((bytes[*ix + 1] as u16) << 8) | (bytes[*ix] as u16);
    *ix += 2;
    Ok(result)
}

pub(crate) fn read_u4(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    if bytes.len() < *ix + 4
    {
        return Err(DexError::eof(&format!("Unexpected end of stream reading u4 at index {}", *ix)));
    }
    let result =
        ((bytes[*ix + 3] as u32) << 24) | ((bytes[*ix + 2] as u32) << 16) | ((bytes[*ix + 1] as u32) << 8) | (bytes[*ix] as u32);
    *ix += 4;
    Ok(result)
}

fn leb_slice<'a>(bytes: &'a [u8], ix: usize, what: &str) -> Result<&'a [u8], DexError>
{
    if ix >= bytes.len()
    {
        return Err(DexError::eof(&format!("Unexpected end of stream reading {} at index {}", what, ix)));
    }
    Ok(&bytes[ix..])
}

pub(crate) fn read_uleb128(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    let (val, size) = decode_uleb128(leb_slice(bytes, *ix, "uleb128")?);
    *ix += size;
    Ok(val)
}

pub(crate) fn read_uleb128p1(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    let (val, size) = decode_uleb128p1(leb_slice(bytes, *ix, "uleb128p1")?);
    *ix += size;
    Ok(val)
}

pub(crate) fn read_sleb128(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    let (val, size) = decode_sleb128(leb_slice(bytes, *ix, "sleb128")?);
    *ix += size;
    Ok(val)
}

pub(crate) fn read_x(bytes: &[u8], ix: &mut usize, length: usize) -> Result<Vec<u8>, DexError>
{
    if bytes.len() >= *ix && bytes.len() - *ix >= length
    {
        let mut v = Vec::with_capacity(length + 1);
        v.extend_from_slice(&bytes[*ix..*ix + length]);
        *ix += length;
        Ok(v)
    }
    else
    {
        Err(DexError::eof("buffer too short for array read"))
    }
}

pub(crate) fn write_u1(buffer: &mut Vec<u8>, val: u8) -> usize
{
    buffer.push(val);
    1
}

pub(crate) fn write_u2(buffer: &mut Vec<u8>, val: u16) -> usize
{
    buffer.push(val as u8);
    buffer.push((val >> 8) as u8);
    2
}

pub(crate) fn write_u4(buffer: &mut Vec<u8>, val: u32) -> usize
{
    for i in 0..4
    {
        buffer.push((val >> (i * 8)) as u8);
    }
    4
}

pub(crate) fn write_uleb128(buffer: &mut Vec<u8>, val: u32) -> usize
{
    let encoded = encode_uleb128(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

pub(crate) fn write_uleb128p1(buffer: &mut Vec<u8>, val: i32) -> usize
{
    let encoded = encode_uleb128p1(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

pub(crate) fn write_sleb128(buffer: &mut Vec<u8>, val: i32) -> usize
{
    let encoded = encode_sleb128(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

pub(crate) fn write_x(buffer: &mut Vec<u8>, val: &[u8]) -> usize
{
    let len = val.len();
    buffer.extend(val);
    len
}

/// Pads `buffer` with zero bytes up to the next multiple of `align`.
pub(crate) fn pad_to(buffer: &mut Vec<u8>, align: usize) -> usize
{
    let mut c = 0;
    while buffer.len() % align != 0
    {
        c += write_u1(buffer, 0);
    }
    c
}
