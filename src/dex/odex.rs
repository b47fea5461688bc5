//! Optimized DEX container: a 40 byte pre-header, the embedded DEX, a
//! dependency block and an opaque auxiliary block.

use log::{debug, warn};
use nom::bytes::complete::take;
use nom::number::complete::le_u32;
use nom::sequence::tuple;
use nom::IResult;

use crate::config::Config;
use crate::dex::dex_file::DexFile;
use crate::dex::error::DexError;
use crate::dex::header::parse_magic;
use crate::dex::{pad_to, read_u4, read_uleb128, read_x, write_u4, write_uleb128, write_x};

pub const ODEX_HEADER_SIZE: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdexHeader {
    pub magic: [u8; 8],
    pub dex_offset: u32,
    pub dex_length: u32,
    pub deps_offset: u32,
    pub deps_length: u32,
    pub aux_offset: u32,
    pub aux_length: u32,
    pub flags: u32,
    pub padding: u32,
}

fn odex_header_parser(input: &[u8]) -> IResult<&[u8], OdexHeader> {
    let (input, magic) = take(8usize)(input)?;
    let (input, (dex_offset, dex_length, deps_offset, deps_length)) = tuple((le_u32, le_u32, le_u32, le_u32))(input)?;
    let (input, (aux_offset, aux_length, flags, padding)) = tuple((le_u32, le_u32, le_u32, le_u32))(input)?;
    let mut m = [0u8; 8];
    m.copy_from_slice(magic);
    Ok((
        input,
        OdexHeader { magic: m, dex_offset, dex_length, deps_offset, deps_length, aux_offset, aux_length, flags, padding },
    ))
}

impl OdexHeader {
    pub fn read(bytes: &[u8]) -> Result<OdexHeader, DexError> {
        if bytes.len() < ODEX_HEADER_SIZE {
            return Err(DexError::eof("Not enough bytes for odex header"));
        }
        let (version, odex) = parse_magic(&bytes[0..8])?;
        if !odex {
            fail!("Not an optimized dex file (version {})", version);
        }
        let (_, header) =
            odex_header_parser(bytes).map_err(|e| DexError::new(&format!("Malformed odex header: {:?}", e)))?;
        Ok(header)
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_x(bytes, &self.magic);
        for v in [
            self.dex_offset,
            self.dex_length,
            self.deps_offset,
            self.deps_length,
            self.aux_offset,
            self.aux_length,
            self.flags,
            self.padding,
        ] {
            c += write_u4(bytes, v);
        }
        c
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdexDependency {
    /// Name bytes as stored, including any trailing NUL.
    pub name: Vec<u8>,
    pub checksum: [u8; 20],
}

impl OdexDependency {
    pub fn name(&self) -> String {
        let end = self.name.iter().position(|b| *b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OdexDependencies {
    pub modification_time: u32,
    pub crc: u32,
    pub dalvik_build: u32,
    pub dependencies: Vec<OdexDependency>,
}

impl OdexDependencies {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<OdexDependencies, DexError> {
        let modification_time = read_u4(bytes, ix)?;
        let crc = read_u4(bytes, ix)?;
        let dalvik_build = read_u4(bytes, ix)?;
        let count = read_u4(bytes, ix)?;
        // each entry takes at least a length byte and a checksum
        if (count as usize).saturating_mul(21) > bytes.len().saturating_sub(*ix) {
            fail!("{} odex dependencies overrun the file", count);
        }
        let mut dependencies = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let len = read_uleb128(bytes, ix)? as usize;
            let name = read_x(bytes, ix, len)?;
            let mut checksum = [0u8; 20];
            checksum.copy_from_slice(&read_x(bytes, ix, 20)?);
            dependencies.push(OdexDependency { name, checksum });
        }
        Ok(OdexDependencies { modification_time, crc, dalvik_build, dependencies })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_u4(bytes, self.modification_time);
        c += write_u4(bytes, self.crc);
        c += write_u4(bytes, self.dalvik_build);
        c += write_u4(bytes, self.dependencies.len() as u32);
        for d in &self.dependencies {
            c += write_uleb128(bytes, d.name.len() as u32);
            c += write_x(bytes, &d.name);
            c += write_x(bytes, &d.checksum);
        }
        c
    }
}

#[derive(Debug)]
pub struct OdexFile {
    pub header: OdexHeader,
    pub dex: DexFile,
    pub dependencies: OdexDependencies,
    pub aux: Vec<u8>,
}

fn slice_at<'a>(bytes: &'a [u8], offset: u32, length: u32, what: &str) -> Result<&'a [u8], DexError> {
    let start = offset as usize;
    let end = start.saturating_add(length as usize);
    match bytes.get(start..end) {
        Some(s) => Ok(s),
        None => Err(DexError::eof(&format!("odex {} 0x{:x}+0x{:x} lies outside the file", what, offset, length))),
    }
}

impl OdexFile {
    pub fn load(bytes: &[u8]) -> Result<OdexFile, DexError> {
        OdexFile::load_with_config(bytes, &Config::default())
    }

    pub fn load_with_config(bytes: &[u8], config: &Config) -> Result<OdexFile, DexError> {
        let header = OdexHeader::read(bytes)?;
        let dex_bytes = slice_at(bytes, header.dex_offset, header.dex_length, "dex")?;
        let dex = DexFile::load_inner(dex_bytes, config, true).map_err(|e| err!(e, "embedded dex"))?;

        let dependencies = if header.deps_length > 0 {
            let deps = slice_at(bytes, header.deps_offset, header.deps_length, "dependencies")?;
            let mut ix = 0;
            let d = OdexDependencies::read(deps, &mut ix).map_err(|e| err!(e, "odex dependencies"))?;
            if ix != deps.len() {
                warn!("odex dependency block has 0x{:x} trailing bytes", deps.len() - ix);
            }
            d
        } else {
            OdexDependencies::default()
        };

        let aux = if header.aux_length > 0 {
            slice_at(bytes, header.aux_offset, header.aux_length, "aux")?.to_vec()
        } else {
            Vec::new()
        };
        debug!("odex with {} dependencies, 0x{:x} aux bytes", dependencies.dependencies.len(), aux.len());

        Ok(OdexFile { header, dex, dependencies, aux })
    }

    /// Rebuilds the container around a freshly saved DEX. Blocks are placed
    /// back to back on 8 byte boundaries.
    pub fn save(&self) -> Result<Vec<u8>, DexError> {
        let dex = self.dex.save()?;
        let mut out = vec![0u8; ODEX_HEADER_SIZE];
        pad_to(&mut out, 8);
        while out.len() < self.header.dex_offset as usize {
            out.push(0);
        }

        let mut header = self.header.clone();
        header.dex_offset = out.len() as u32;
        header.dex_length = dex.len() as u32;
        write_x(&mut out, &dex);

        pad_to(&mut out, 8);
        header.deps_offset = out.len() as u32;
        header.deps_length = self.dependencies.write(&mut out) as u32;

        pad_to(&mut out, 8);
        header.aux_offset = out.len() as u32;
        header.aux_length = write_x(&mut out, &self.aux) as u32;

        let mut encoded = Vec::with_capacity(ODEX_HEADER_SIZE);
        header.write(&mut encoded);
        out[..ODEX_HEADER_SIZE].copy_from_slice(&encoded);
        Ok(out)
    }
}
