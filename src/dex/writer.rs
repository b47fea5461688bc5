//! Re-serialization of a loaded [`ClassManager`].
//!
//! Sections are emitted in their original file order. Each pass writes every
//! item through the relocation table of the previous pass and records where
//! the item landed; passes repeat until no offset moves. Unknown sections,
//! hidden API data and link data are copied verbatim.

use std::collections::HashMap;

use log::{debug, trace};

use crate::dex::class_manager::{ClassManager, Section};
use crate::dex::error::DexError;
use crate::dex::header::{self, HEADER_SIZE};
use crate::dex::items::{DexItem, Relocations};
use crate::dex::map_list::{ItemType, MapItem, MapList};
use crate::dex::{pad_to, write_x};

const MAX_PASSES: usize = 8;

struct Layout {
    bytes: Vec<u8>,
    reloc: Relocations,
    map: MapList,
    link_off: u32,
}

pub(crate) fn save(cm: &ClassManager) -> Result<Vec<u8>, DexError> {
    let mut reloc = Relocations::identity();
    let mut map = cm.map_list.clone();
    for pass in 0..MAX_PASSES {
        let layout = lay_out(cm, &reloc, &map)?;
        let stable = layout.reloc == reloc && layout.map == map;
        reloc = layout.reloc;
        map = layout.map;
        if stable {
            let mut bytes = layout.bytes;
            patch_header(cm, &mut bytes, &map, &reloc, layout.link_off);
            header::fix_checksums(&mut bytes);
            debug!("saved 0x{:x} bytes after {} layout passes", bytes.len(), pass + 1);
            return Ok(bytes);
        }
        trace!("layout pass {} moved offsets", pass);
    }
    fail!("Offsets did not settle after {} layout passes", MAX_PASSES)
}

fn write_items<T: DexItem>(
    out: &mut Vec<u8>,
    section: &Section<T>,
    kind: ItemType,
    reloc: &Relocations,
    next: &mut Relocations,
) -> u32 {
    for (old, item) in section.entries() {
        pad_to(out, kind.alignment());
        next.insert(old, out.len() as u32);
        item.write(out, reloc);
    }
    section.len() as u32
}

/// Writes the items of one known section; returns how many were written.
fn write_section(cm: &ClassManager, kind: ItemType, out: &mut Vec<u8>, reloc: &Relocations, next: &mut Relocations) -> u32 {
    match kind {
        ItemType::StringId => write_items(out, &cm.string_ids, kind, reloc, next),
        ItemType::StringData => write_items(out, &cm.string_data, kind, reloc, next),
        ItemType::TypeId => write_items(out, &cm.type_ids, kind, reloc, next),
        ItemType::ProtoId => write_items(out, &cm.proto_ids, kind, reloc, next),
        ItemType::FieldId => write_items(out, &cm.field_ids, kind, reloc, next),
        ItemType::MethodId => write_items(out, &cm.method_ids, kind, reloc, next),
        ItemType::ClassDef => write_items(out, &cm.class_defs, kind, reloc, next),
        ItemType::CallSiteId => write_items(out, &cm.call_site_ids, kind, reloc, next),
        ItemType::MethodHandle => write_items(out, &cm.method_handles, kind, reloc, next),
        ItemType::TypeList => write_items(out, &cm.type_lists, kind, reloc, next),
        ItemType::AnnotationSetRefList => write_items(out, &cm.annotation_set_ref_lists, kind, reloc, next),
        ItemType::AnnotationSetItem => write_items(out, &cm.annotation_sets, kind, reloc, next),
        ItemType::AnnotationItem => write_items(out, &cm.annotation_items, kind, reloc, next),
        ItemType::ClassData => write_items(out, &cm.class_data, kind, reloc, next),
        ItemType::Code => write_items(out, &cm.code_items, kind, reloc, next),
        ItemType::DebugInfo => write_items(out, &cm.debug_infos, kind, reloc, next),
        ItemType::EncodedArray => write_items(out, &cm.encoded_arrays, kind, reloc, next),
        ItemType::AnnotationsDirectory => write_items(out, &cm.annotations_directories, kind, reloc, next),
        ItemType::HiddenApiClassData => match &cm.hidden_api {
            Some((_, h)) => {
                write_x(out, &h.raw);
                1
            }
            None => 0,
        },
        ItemType::Header | ItemType::MapList => 0,
    }
}

fn lay_out(cm: &ClassManager, reloc: &Relocations, previous_map: &MapList) -> Result<Layout, DexError> {
    let mut out = Vec::with_capacity(cm.header.file_size as usize);
    let mut next = Relocations::identity();
    let mut placed: HashMap<(u16, u32), (u32, u32)> = HashMap::new();

    out.resize(HEADER_SIZE as usize, 0);
    for mi in cm.map_list.in_file_order() {
        let kind = mi.item_type();
        if kind == Some(ItemType::Header) {
            placed.insert((mi.type_code, mi.offset), (0, mi.size));
            continue;
        }
        pad_to(&mut out, kind.map(|k| k.alignment()).unwrap_or(4));
        let start = out.len() as u32;
        let size = match kind {
            Some(ItemType::MapList) => {
                previous_map.write(&mut out);
                mi.size
            }
            Some(k) => write_section(cm, k, &mut out, reloc, &mut next),
            None => {
                match cm.raw_sections.iter().find(|r| r.map_item == mi) {
                    Some(raw) => {
                        write_x(&mut out, &raw.data);
                    }
                    None => fail!("Lost the bytes of section 0x{:04x} at 0x{:x}", mi.type_code, mi.offset),
                }
                mi.size
            }
        };
        if mi.offset != 0 {
            next.insert(mi.offset, start);
        }
        placed.insert((mi.type_code, mi.offset), (start, size));
    }

    let mut link_off = 0;
    if !cm.link_data.is_empty() {
        pad_to(&mut out, 4);
        link_off = out.len() as u32;
        write_x(&mut out, &cm.link_data);
    }

    let items = cm
        .map_list
        .items
        .iter()
        .map(|i| {
            let (offset, size) = placed.get(&(i.type_code, i.offset)).copied().unwrap_or((i.offset, i.size));
            MapItem { type_code: i.type_code, unused: i.unused, size, offset }
        })
        .collect();

    Ok(Layout { bytes: out, reloc: next, map: MapList { items }, link_off })
}

fn patch_header(cm: &ClassManager, bytes: &mut [u8], map: &MapList, reloc: &Relocations, link_off: u32) {
    let mut h = cm.header.clone();
    let start_of = |kind: ItemType, old: u32| -> u32 {
        if old == 0 {
            return 0;
        }
        map.get(kind).map(|m| m.offset).unwrap_or_else(|| reloc.get(old))
    };

    h.string_ids_off = start_of(ItemType::StringId, h.string_ids_off);
    h.type_ids_off = start_of(ItemType::TypeId, h.type_ids_off);
    h.proto_ids_off = start_of(ItemType::ProtoId, h.proto_ids_off);
    h.field_ids_off = start_of(ItemType::FieldId, h.field_ids_off);
    h.method_ids_off = start_of(ItemType::MethodId, h.method_ids_off);
    h.class_defs_off = start_of(ItemType::ClassDef, h.class_defs_off);
    h.map_off = start_of(ItemType::MapList, h.map_off);
    h.data_off = reloc.get(h.data_off);
    h.link_off = link_off;

    let grown = bytes.len() as i64 - cm.header.file_size as i64;
    h.data_size = (cm.header.data_size as i64 + grown).max(0) as u32;
    h.file_size = bytes.len() as u32;

    let mut encoded = Vec::with_capacity(HEADER_SIZE as usize);
    h.write(&mut encoded);
    bytes[..encoded.len()].copy_from_slice(&encoded);
}
