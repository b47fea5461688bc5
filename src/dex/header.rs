//! The fixed 0x70 byte `header_item`.

use adler32::RollingAdler32;
use log::{debug, warn};
use nom::bytes::complete::take;
use nom::number::complete::le_u32;
use nom::sequence::tuple;
use nom::IResult;
use sha1::{Digest, Sha1};

use crate::dex::error::DexError;
use crate::dex::{write_u4, write_x};

pub const HEADER_SIZE: u32 = 0x70;
pub const ENDIAN_CONSTANT: u32 = 0x12345678;
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;
pub const MAX_TYPE_IDS: u32 = 65535;
pub const MAX_PROTO_IDS: u32 = 65535;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 8],
    pub checksum: u32,
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

/// Parses `dex\n03X\0` (X in 5..=9) or the optimized `dey\n03X\0` (X in 5..=7).
/// Returns the magic bytes and whether the file is optimized.
pub fn parse_magic(magic: &[u8]) -> Result<(u32, bool), DexError>
{
    if magic.len() < 8
    {
        return Err(DexError::new("Not enough bytes for magic"));
    }
    let odex = match &magic[0..4]
    {
        b"dex\n" => false,
        b"dey\n" => true,
        _ => return Err(DexError::new("Invalid magic value")),
    };
    if magic[4] != b'0' || magic[5] != b'3' || magic[7] != 0
    {
        return Err(DexError::new("Invalid magic value"));
    }
    let version = match magic[6]
    {
        d @ b'5'..=b'9' if !odex => 30 + (d - b'0') as u32,
        d @ b'5'..=b'7' if odex => 30 + (d - b'0') as u32,
        _ => fail!("Unsupported dex version {:?}", String::from_utf8_lossy(&magic[4..7])),
    };
    Ok((version, odex))
}

fn header_parser(input: &[u8]) -> IResult<&[u8], Header>
{
    let (input, magic) = take(8usize)(input)?;
    let (input, checksum) = le_u32(input)?;
    let (input, signature) = take(20usize)(input)?;
    let (input, (file_size, header_size, endian_tag)) = tuple((le_u32, le_u32, le_u32))(input)?;
    let (input, (link_size, link_off, map_off)) = tuple((le_u32, le_u32, le_u32))(input)?;
    let (input, (string_ids_size, string_ids_off, type_ids_size, type_ids_off)) =
        tuple((le_u32, le_u32, le_u32, le_u32))(input)?;
    let (input, (proto_ids_size, proto_ids_off, field_ids_size, field_ids_off)) =
        tuple((le_u32, le_u32, le_u32, le_u32))(input)?;
    let (input, (method_ids_size, method_ids_off, class_defs_size, class_defs_off)) =
        tuple((le_u32, le_u32, le_u32, le_u32))(input)?;
    let (input, (data_size, data_off)) = tuple((le_u32, le_u32))(input)?;

    let mut m = [0u8; 8];
    m.copy_from_slice(magic);
    let mut s = [0u8; 20];
    s.copy_from_slice(signature);

    Ok((
        input,
        Header {
            magic: m,
            checksum,
            signature: s,
            file_size,
            header_size,
            endian_tag,
            link_size,
            link_off,
            map_off,
            string_ids_size,
            string_ids_off,
            type_ids_size,
            type_ids_off,
            proto_ids_size,
            proto_ids_off,
            field_ids_size,
            field_ids_off,
            method_ids_size,
            method_ids_off,
            class_defs_size,
            class_defs_off,
            data_size,
            data_off,
        },
    ))
}

impl Header
{
    /// Parses and validates the header at the start of `bytes`. Checksum and
    /// signature are not checked here, see [`verify_checksum`].
    pub fn read(bytes: &[u8]) -> Result<Header, DexError>
    {
        if bytes.len() < HEADER_SIZE as usize
        {
            return Err(DexError::new("Not enough bytes for header"));
        }
        parse_magic(&bytes[0..8])?;

        let (_, header) = header_parser(bytes).map_err(|e| DexError::new(&format!("Malformed header: {:?}", e)))?;

        match header.endian_tag
        {
            ENDIAN_CONSTANT => {}
            REVERSE_ENDIAN_CONSTANT => fail!("Unsupported byte-swapped endian tag 0x{:08x}", header.endian_tag),
            other => fail!("Wrong endian tag 0x{:08x}", other),
        }
        if header.header_size != HEADER_SIZE
        {
            fail!("Wrong header size 0x{:x}", header.header_size);
        }
        if header.type_ids_size > MAX_TYPE_IDS
        {
            fail!("type_ids_size {} exceeds {}", header.type_ids_size, MAX_TYPE_IDS);
        }
        if header.proto_ids_size > MAX_PROTO_IDS
        {
            fail!("proto_ids_size {} exceeds {}", header.proto_ids_size, MAX_PROTO_IDS);
        }
        if header.file_size as usize != bytes.len()
        {
            warn!("header file_size 0x{:x} differs from buffer length 0x{:x}", header.file_size, bytes.len());
        }
        if header.link_size != 0
        {
            debug!("dex has a non-empty link section (0x{:x} bytes)", header.link_size);
        }

        Ok(header)
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        let mut c = 0;
        c += write_x(bytes, &self.magic);
        c += write_u4(bytes, self.checksum);
        c += write_x(bytes, &self.signature);
        for v in [
            self.file_size,
            self.header_size,
            self.endian_tag,
            self.link_size,
            self.link_off,
            self.map_off,
            self.string_ids_size,
            self.string_ids_off,
            self.type_ids_size,
            self.type_ids_off,
            self.proto_ids_size,
            self.proto_ids_off,
            self.field_ids_size,
            self.field_ids_off,
            self.method_ids_size,
            self.method_ids_off,
            self.class_defs_size,
            self.class_defs_off,
            self.data_size,
            self.data_off,
        ]
        {
            c += write_u4(bytes, v);
        }
        c
    }

    /// Numeric format version taken from the magic, 35 to 39.
    pub fn version(&self) -> u32
    {
        parse_magic(&self.magic).map(|(v, _)| v).unwrap_or(35)
    }

    pub fn is_odex(&self) -> bool
    {
        &self.magic[0..4] == b"dey\n"
    }
}

/// Adler-32 over everything after the checksum field.
pub fn compute_checksum(bytes: &[u8]) -> u32
{
    if bytes.len() < 12
    {
        return 1;
    }
    RollingAdler32::from_buffer(&bytes[12..]).hash()
}

/// SHA-1 over everything after the signature field.
pub fn compute_signature(bytes: &[u8]) -> [u8; 20]
{
    let mut hasher = Sha1::new();
    if bytes.len() > 32
    {
        hasher.update(&bytes[32..]);
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

pub fn verify_checksum(header: &Header, bytes: &[u8]) -> Result<(), DexError>
{
    let computed = compute_checksum(bytes);
    if computed != header.checksum
    {
        fail!("Checksum mismatch: header 0x{:08x}, computed 0x{:08x}", header.checksum, computed);
    }
    Ok(())
}

/// Returns true when the stored signature matches.
pub fn check_signature(header: &Header, bytes: &[u8]) -> bool
{
    compute_signature(bytes) == header.signature
}

/// Patches the signature then the checksum of a serialized file in place.
pub fn fix_checksums(bytes: &mut [u8])
{
    if bytes.len() < HEADER_SIZE as usize
    {
        return;
    }
    let signature = compute_signature(bytes);
    bytes[12..32].copy_from_slice(&signature);
    let checksum = compute_checksum(bytes);
    bytes[8..12].copy_from_slice(&checksum.to_le_bytes());
}
