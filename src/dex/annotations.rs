//! Annotation structures:
//! - annotations_directory_item
//! - annotation_set_item
//! - annotation_set_ref_list
//! - annotation_item (wraps EncodedAnnotation)

use crate::dex::encoded_values::EncodedAnnotation;
use crate::dex::error::DexError;
use crate::dex::items::{DexItem, Relocations};
use crate::dex::{read_u1, read_u4, write_u4, write_x};

pub const VISIBILITY_BUILD: u8 = 0x00;
pub const VISIBILITY_RUNTIME: u8 = 0x01;
pub const VISIBILITY_SYSTEM: u8 = 0x02;

/// annotation_item
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationItem {
    pub visibility: u8,
    pub annotation: EncodedAnnotation,
    pub raw: Vec<u8>,
}

impl AnnotationItem {
    pub fn visibility_name(&self) -> &'static str {
        match self.visibility {
            VISIBILITY_BUILD => "build",
            VISIBILITY_RUNTIME => "runtime",
            VISIBILITY_SYSTEM => "system",
            _ => "unknown",
        }
    }
}

impl DexItem for AnnotationItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationItem, DexError> {
        let start = *ix;
        let visibility = read_u1(bytes, ix)?;
        let annotation = EncodedAnnotation::read(bytes, ix)?;
        Ok(AnnotationItem { visibility, annotation, raw: bytes[start..*ix].to_vec() })
    }

    fn write(&self, bytes: &mut Vec<u8>, _reloc: &Relocations) -> usize {
        write_x(bytes, &self.raw)
    }
}

fn read_offsets(bytes: &[u8], ix: &mut usize) -> Result<Vec<u32>, DexError> {
    let size = read_u4(bytes, ix)? as usize;
    if size.saturating_mul(4) > bytes.len().saturating_sub(*ix) {
        return Err(DexError::eof(&format!("offset list of {} entries overruns the file", size)));
    }
    let mut entries = Vec::with_capacity(size);
    for _ in 0..size {
        entries.push(read_u4(bytes, ix)?);
    }
    Ok(entries)
}

fn write_offsets(bytes: &mut Vec<u8>, offsets: &[u32], reloc: &Relocations) -> usize {
    let mut c = write_u4(bytes, offsets.len() as u32);
    for off in offsets {
        c += write_u4(bytes, reloc.get(*off));
    }
    c
}

/// annotation_set_item: offsets of `annotation_item`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSetItem {
    pub entries: Vec<u32>,
}

impl DexItem for AnnotationSetItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationSetItem, DexError> {
        Ok(AnnotationSetItem { entries: read_offsets(bytes, ix)? })
    }

    fn write(&self, bytes: &mut Vec<u8>, reloc: &Relocations) -> usize {
        write_offsets(bytes, &self.entries, reloc)
    }
}

/// annotation_set_ref_list: offsets of `annotation_set_item`s, one per
/// parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSetRefList {
    pub list: Vec<u32>,
}

impl DexItem for AnnotationSetRefList {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationSetRefList, DexError> {
        Ok(AnnotationSetRefList { list: read_offsets(bytes, ix)? })
    }

    fn write(&self, bytes: &mut Vec<u8>, reloc: &Relocations) -> usize {
        write_offsets(bytes, &self.list, reloc)
    }
}

/// One `(member index, annotations offset)` entry of a directory. Used for
/// field, method and parameter annotations alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberAnnotations {
    pub idx: u32,
    pub annotations_off: u32,
}

impl MemberAnnotations {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<MemberAnnotations, DexError> {
        Ok(MemberAnnotations { idx: read_u4(bytes, ix)?, annotations_off: read_u4(bytes, ix)? })
    }

    fn write(&self, bytes: &mut Vec<u8>, reloc: &Relocations) -> usize {
        write_u4(bytes, self.idx) + write_u4(bytes, reloc.get(self.annotations_off))
    }
}

/// annotations_directory_item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationsDirectoryItem {
    /// Offset to the class `annotation_set_item`, 0 if none.
    pub class_annotations_off: u32,
    pub field_annotations: Vec<MemberAnnotations>,
    pub method_annotations: Vec<MemberAnnotations>,
    pub parameter_annotations: Vec<MemberAnnotations>,
}

impl DexItem for AnnotationsDirectoryItem {
    fn read(bytes: &[u8], ix: &mut usize) -> Result<AnnotationsDirectoryItem, DexError> {
        let class_annotations_off = read_u4(bytes, ix)?;
        let fields_size = read_u4(bytes, ix)? as usize;
        let methods_size = read_u4(bytes, ix)? as usize;
        let parameters_size = read_u4(bytes, ix)? as usize;
        let total = fields_size.saturating_add(methods_size).saturating_add(parameters_size);
        if total.saturating_mul(8) > bytes.len().saturating_sub(*ix) {
            fail!("annotations_directory_item with {} entries overruns the file", total);
        }

        let mut read_n = |n: usize| -> Result<Vec<MemberAnnotations>, DexError> {
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(MemberAnnotations::read(bytes, ix)?);
            }
            Ok(v)
        };
        let field_annotations = read_n(fields_size)?;
        let method_annotations = read_n(methods_size)?;
        let parameter_annotations = read_n(parameters_size)?;

        Ok(AnnotationsDirectoryItem { class_annotations_off, field_annotations, method_annotations, parameter_annotations })
    }

    fn write(&self, bytes: &mut Vec<u8>, reloc: &Relocations) -> usize {
        let mut c = 0;
        c += write_u4(bytes, reloc.get(self.class_annotations_off));
        c += write_u4(bytes, self.field_annotations.len() as u32);
        c += write_u4(bytes, self.method_annotations.len() as u32);
        c += write_u4(bytes, self.parameter_annotations.len() as u32);
        for entry in self.field_annotations.iter().chain(&self.method_annotations).chain(&self.parameter_annotations) {
            c += entry.write(bytes, reloc);
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::encoded_values::{AnnotationElement, EncodedValue};

    #[test]
    fn annotation_item_keeps_raw()
    {
        let mut buf = vec![VISIBILITY_RUNTIME];
        EncodedAnnotation {
            type_idx: 3,
            elements: vec![AnnotationElement { name_idx: 1, value: EncodedValue::Int(7) }],
        }
        .write(&mut buf);
        let mut ix = 0;
        let item = AnnotationItem::read(&buf, &mut ix).unwrap();
        assert_eq!(ix, buf.len());
        assert_eq!(item.visibility_name(), "runtime");
        assert_eq!(item.annotation.type_idx, 3);
        let mut out = vec![];
        item.write(&mut out, &Relocations::identity());
        assert_eq!(out, buf);
    }

    #[test]
    fn set_offsets_are_relocated()
    {
        let set = AnnotationSetItem { entries: vec![0x10, 0x20] };
        let mut reloc = Relocations::identity();
        reloc.insert(0x20, 0x24);
        let mut buf = vec![];
        set.write(&mut buf, &reloc);
        let mut ix = 0;
        assert_eq!(AnnotationSetItem::read(&buf, &mut ix).unwrap().entries, vec![0x10, 0x24]);
    }

    #[test]
    fn directory_roundtrip()
    {
        let dir = AnnotationsDirectoryItem {
            class_annotations_off: 0x1000,
            field_annotations: vec![MemberAnnotations { idx: 1, annotations_off: 0x2000 }],
            method_annotations: vec![MemberAnnotations { idx: 2, annotations_off: 0x3000 }],
            parameter_annotations: vec![MemberAnnotations { idx: 3, annotations_off: 0x4000 }],
        };
        let mut buf = vec![];
        assert_eq!(dir.write(&mut buf, &Relocations::identity()), 40);
        let mut ix = 0;
        assert_eq!(AnnotationsDirectoryItem::read(&buf, &mut ix).unwrap(), dir);
        assert_eq!(ix, buf.len());
    }

    #[test]
    fn truncated_directory_fails()
    {
        let mut buf = vec![];
        for v in [0u32, 1000, 0, 0] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        let mut ix = 0;
        assert!(AnnotationsDirectoryItem::read(&buf, &mut ix).is_err());
    }
}
