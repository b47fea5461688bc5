//! Section loader and index resolver.
//!
//! [`ClassManager::load`] reads the header and the map list, orders the
//! present sections by their dependencies and parses each one into a typed
//! [`Section`]. Every item is also registered by file offset so fields that
//! hold offsets (`class_data_off`, `code_off`, ...) resolve in O(1).
//!
//! Lookups never fail: an out-of-range index logs a warning and yields a
//! placeholder such as `"AG:ITI: invalid type"`.

use std::collections::HashMap;

use log::{debug, error, warn};

use crate::config::Config;
use crate::dex::annotations::{AnnotationItem, AnnotationSetItem, AnnotationSetRefList, AnnotationsDirectoryItem};
use crate::dex::class_data::ClassDataItem;
use crate::dex::code::{CodeItem, DebugInfoItem};
use crate::dex::error::DexError;
use crate::dex::header::{self, Header};
use crate::dex::hidden_api::HiddenApiClassData;
use crate::dex::items::{
    CallSiteIdItem, ClassDefItem, DexItem, EncodedArrayItem, FieldIdItem, MethodHandleItem, MethodIdItem, ProtoIdItem,
    StringDataItem, StringIdItem, TypeIdItem, TypeList,
};
use crate::dex::map_list::{load_order, ItemType, MapItem, MapList};
use crate::dex::mutf8;
use crate::dex::opcode_format::ReferenceType;

pub const INVALID_STRING: &str = "AG:IS: invalid string";
pub const INVALID_TYPE: &str = "AG:ITI: invalid type";
pub const INVALID_PROTO_PARAMS: &str = "AG:IPI: invalid params";
pub const INVALID_PROTO_RETURN: &str = "AG:IPI: invalid return type";
pub const INVALID_FIELD: &str = "AG:IFI: invalid field";
pub const INVALID_METHOD: &str = "AG:IMI: invalid method";

/// Items of one kind in file order, with the offset each was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Section<T> {
    items: Vec<T>,
    offsets: Vec<u32>,
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Section { items: Vec::new(), offsets: Vec::new() }
    }
}

impl<T> Section<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.items.get(idx)
    }

    pub fn offset(&self, idx: usize) -> Option<u32> {
        self.offsets.get(idx).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// `(offset, item)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &T)> {
        self.offsets.iter().copied().zip(self.items.iter())
    }

    fn push(&mut self, offset: u32, item: T) {
        self.offsets.push(offset);
        self.items.push(item);
    }
}

/// Result of [`ClassManager::resolve`] and [`ClassManager::resolve_by_offset`].
#[derive(Debug, Clone, Copy)]
pub enum Item<'a> {
    StringId(&'a StringIdItem),
    StringData(&'a StringDataItem),
    TypeId(&'a TypeIdItem),
    ProtoId(&'a ProtoIdItem),
    FieldId(&'a FieldIdItem),
    MethodId(&'a MethodIdItem),
    ClassDef(&'a ClassDefItem),
    CallSiteId(&'a CallSiteIdItem),
    MethodHandle(&'a MethodHandleItem),
    TypeList(&'a TypeList),
    AnnotationSetRefList(&'a AnnotationSetRefList),
    AnnotationSet(&'a AnnotationSetItem),
    Annotation(&'a AnnotationItem),
    ClassData(&'a ClassDataItem),
    Code(&'a CodeItem),
    DebugInfo(&'a DebugInfoItem),
    EncodedArray(&'a EncodedArrayItem),
    AnnotationsDirectory(&'a AnnotationsDirectoryItem),
    HiddenApi(&'a HiddenApiClassData),
    /// Placeholder for an index or offset that points nowhere.
    Invalid,
}

impl Item<'_> {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Item::Invalid)
    }
}

/// A section whose map type is not known; kept so it can be written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    pub map_item: MapItem,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ClassManager {
    pub(crate) header: Header,
    pub(crate) map_list: MapList,

    pub(crate) string_ids: Section<StringIdItem>,
    pub(crate) string_data: Section<StringDataItem>,
    pub(crate) type_ids: Section<TypeIdItem>,
    pub(crate) proto_ids: Section<ProtoIdItem>,
    pub(crate) field_ids: Section<FieldIdItem>,
    pub(crate) method_ids: Section<MethodIdItem>,
    pub(crate) class_defs: Section<ClassDefItem>,
    pub(crate) call_site_ids: Section<CallSiteIdItem>,
    pub(crate) method_handles: Section<MethodHandleItem>,
    pub(crate) type_lists: Section<TypeList>,
    pub(crate) annotation_set_ref_lists: Section<AnnotationSetRefList>,
    pub(crate) annotation_sets: Section<AnnotationSetItem>,
    pub(crate) annotation_items: Section<AnnotationItem>,
    pub(crate) class_data: Section<ClassDataItem>,
    pub(crate) code_items: Section<CodeItem>,
    pub(crate) debug_infos: Section<DebugInfoItem>,
    pub(crate) encoded_arrays: Section<EncodedArrayItem>,
    pub(crate) annotations_directories: Section<AnnotationsDirectoryItem>,
    pub(crate) hidden_api: Option<(u32, HiddenApiClassData)>,
    pub(crate) raw_sections: Vec<RawSection>,
    pub(crate) link_data: Vec<u8>,

    offset_index: HashMap<u32, (ItemType, usize)>,
    hook_strings: HashMap<u32, String>,
    recode_ascii: bool,
}

fn align(ix: usize, alignment: usize) -> usize {
    (ix + alignment - 1) / alignment * alignment
}

/// Sections whose items are parsed best-effort: a failing item is logged and
/// ends the section instead of the load.
fn is_lenient(t: ItemType) -> bool {
    matches!(
        t,
        ItemType::ClassData
            | ItemType::Code
            | ItemType::DebugInfo
            | ItemType::AnnotationItem
            | ItemType::AnnotationSetItem
            | ItemType::AnnotationSetRefList
            | ItemType::AnnotationsDirectory
            | ItemType::EncodedArray
    )
}

fn read_section<T: DexItem>(
    bytes: &[u8],
    map_item: &MapItem,
    t: ItemType,
    index: &mut HashMap<u32, (ItemType, usize)>,
) -> Result<Section<T>, DexError> {
    let mut section = Section::default();
    let mut ix = map_item.offset as usize;
    for i in 0..map_item.size as usize {
        ix = align(ix, t.alignment());
        let offset = ix as u32;
        match T::read(bytes, &mut ix) {
            Ok(item) => {
                index.insert(offset, (t, i));
                section.push(offset, item);
            }
            Err(e) if is_lenient(t) => {
                error!("[loader] {} #{} at 0x{:x} skipped with the rest of its section: {}", t.name(), i, offset, e);
                break;
            }
            Err(e) => return Err(err!(e, "{} #{} at 0x{:x}", t.name(), i, offset)),
        }
    }
    debug!("[loader] {} items of {} at 0x{:x}", section.len(), t.name(), map_item.offset);
    Ok(section)
}

impl ClassManager {
    pub fn load(bytes: &[u8], config: &Config) -> Result<ClassManager, DexError> {
        let header = Header::read(bytes)?;
        if config.verify_checksum {
            header::verify_checksum(&header, bytes)?;
        }
        if !header::check_signature(&header, bytes) {
            if config.verify_signature {
                fail!("SHA-1 signature mismatch");
            }
            warn!("SHA-1 signature mismatch, continuing");
        }
        if header.map_off == 0 {
            fail!("File has no map_list");
        }
        let map_list = MapList::read(bytes, header.map_off).map_err(|e| err!(e, "map_list"))?;

        let mut cm = ClassManager {
            header,
            map_list,
            string_ids: Section::default(),
            string_data: Section::default(),
            type_ids: Section::default(),
            proto_ids: Section::default(),
            field_ids: Section::default(),
            method_ids: Section::default(),
            class_defs: Section::default(),
            call_site_ids: Section::default(),
            method_handles: Section::default(),
            type_lists: Section::default(),
            annotation_set_ref_lists: Section::default(),
            annotation_sets: Section::default(),
            annotation_items: Section::default(),
            class_data: Section::default(),
            code_items: Section::default(),
            debug_infos: Section::default(),
            encoded_arrays: Section::default(),
            annotations_directories: Section::default(),
            hidden_api: None,
            raw_sections: Vec::new(),
            link_data: Vec::new(),
            offset_index: HashMap::new(),
            hook_strings: HashMap::new(),
            recode_ascii: config.recode_ascii_strings,
        };

        for t in load_order(&cm.map_list.present_types())? {
            let map_item = match cm.map_list.get(t) {
                Some(m) => m.clone(),
                None => continue,
            };
            cm.load_section(bytes, t, &map_item)?;
        }

        let unknown: Vec<MapItem> = cm.map_list.items.iter().filter(|i| i.item_type().is_none()).cloned().collect();
        for map_item in unknown {
            let start = map_item.offset as usize;
            let end = cm.next_section_offset(map_item.offset, bytes.len());
            if start > end {
                fail!("Unknown section 0x{:04x} at 0x{:x} lies outside the file", map_item.type_code, start);
            }
            cm.raw_sections.push(RawSection { data: bytes[start..end].to_vec(), map_item });
        }

        if cm.header.link_size > 0 {
            let start = cm.header.link_off as usize;
            let end = start.saturating_add(cm.header.link_size as usize);
            match bytes.get(start..end) {
                Some(link) => cm.link_data = link.to_vec(),
                None => warn!("link section 0x{:x}+0x{:x} lies outside the file", start, cm.header.link_size),
            }
        }

        Ok(cm)
    }

    fn load_section(&mut self, bytes: &[u8], t: ItemType, m: &MapItem) -> Result<(), DexError> {
        let index = &mut self.offset_index;
        match t {
            ItemType::Header | ItemType::MapList => {}
            ItemType::StringId => self.string_ids = read_section(bytes, m, t, index)?,
            ItemType::StringData => self.string_data = read_section(bytes, m, t, index)?,
            ItemType::TypeId => self.type_ids = read_section(bytes, m, t, index)?,
            ItemType::ProtoId => self.proto_ids = read_section(bytes, m, t, index)?,
            ItemType::FieldId => self.field_ids = read_section(bytes, m, t, index)?,
            ItemType::MethodId => self.method_ids = read_section(bytes, m, t, index)?,
            ItemType::ClassDef => self.class_defs = read_section(bytes, m, t, index)?,
            ItemType::CallSiteId => self.call_site_ids = read_section(bytes, m, t, index)?,
            ItemType::MethodHandle => self.method_handles = read_section(bytes, m, t, index)?,
            ItemType::TypeList => self.type_lists = read_section(bytes, m, t, index)?,
            ItemType::AnnotationSetRefList => self.annotation_set_ref_lists = read_section(bytes, m, t, index)?,
            ItemType::AnnotationSetItem => self.annotation_sets = read_section(bytes, m, t, index)?,
            ItemType::AnnotationItem => self.annotation_items = read_section(bytes, m, t, index)?,
            ItemType::ClassData => self.class_data = read_section(bytes, m, t, index)?,
            ItemType::Code => self.code_items = read_section(bytes, m, t, index)?,
            ItemType::DebugInfo => self.debug_infos = read_section(bytes, m, t, index)?,
            ItemType::EncodedArray => self.encoded_arrays = read_section(bytes, m, t, index)?,
            ItemType::AnnotationsDirectory => self.annotations_directories = read_section(bytes, m, t, index)?,
            ItemType::HiddenApiClassData => {
                let counts: Vec<usize> = self
                    .class_defs
                    .iter()
                    .map(|cd| self.get_class_data(cd.class_data_off).map(|d| d.member_count()).unwrap_or(0))
                    .collect();
                match HiddenApiClassData::read(bytes, m.offset as usize, &counts) {
                    Ok(h) => {
                        self.offset_index.insert(m.offset, (t, 0));
                        self.hidden_api = Some((m.offset, h));
                    }
                    Err(e) => error!("[loader] hiddenapi_class_data_item at 0x{:x} skipped: {}", m.offset, e),
                }
            }
        }
        Ok(())
    }

    /// Start of the first section after `offset`, or `default` if none.
    fn next_section_offset(&self, offset: u32, default: usize) -> usize {
        self.map_list
            .items
            .iter()
            .map(|i| i.offset)
            .filter(|o| *o > offset)
            .min()
            .map(|o| o as usize)
            .unwrap_or(default)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn map_list(&self) -> &MapList {
        &self.map_list
    }

    pub fn string_ids(&self) -> &Section<StringIdItem> {
        &self.string_ids
    }

    pub fn type_ids(&self) -> &Section<TypeIdItem> {
        &self.type_ids
    }

    pub fn proto_ids(&self) -> &Section<ProtoIdItem> {
        &self.proto_ids
    }

    pub fn field_ids(&self) -> &Section<FieldIdItem> {
        &self.field_ids
    }

    pub fn method_ids(&self) -> &Section<MethodIdItem> {
        &self.method_ids
    }

    pub fn class_defs(&self) -> &Section<ClassDefItem> {
        &self.class_defs
    }

    pub fn call_site_ids(&self) -> &Section<CallSiteIdItem> {
        &self.call_site_ids
    }

    pub fn method_handles(&self) -> &Section<MethodHandleItem> {
        &self.method_handles
    }

    pub fn code_items(&self) -> &Section<CodeItem> {
        &self.code_items
    }

    pub fn hidden_api(&self) -> Option<&HiddenApiClassData> {
        self.hidden_api.as_ref().map(|(_, h)| h)
    }

    pub fn raw_sections(&self) -> &[RawSection] {
        &self.raw_sections
    }

    pub fn link_data(&self) -> &[u8] {
        &self.link_data
    }

    /// Item `idx` of section `kind`.
    pub fn resolve(&self, kind: ItemType, idx: usize) -> Item<'_> {
        let item = match kind {
            ItemType::StringId => self.string_ids.get(idx).map(Item::StringId),
            ItemType::StringData => self.string_data.get(idx).map(Item::StringData),
            ItemType::TypeId => self.type_ids.get(idx).map(Item::TypeId),
            ItemType::ProtoId => self.proto_ids.get(idx).map(Item::ProtoId),
            ItemType::FieldId => self.field_ids.get(idx).map(Item::FieldId),
            ItemType::MethodId => self.method_ids.get(idx).map(Item::MethodId),
            ItemType::ClassDef => self.class_defs.get(idx).map(Item::ClassDef),
            ItemType::CallSiteId => self.call_site_ids.get(idx).map(Item::CallSiteId),
            ItemType::MethodHandle => self.method_handles.get(idx).map(Item::MethodHandle),
            ItemType::TypeList => self.type_lists.get(idx).map(Item::TypeList),
            ItemType::AnnotationSetRefList => self.annotation_set_ref_lists.get(idx).map(Item::AnnotationSetRefList),
            ItemType::AnnotationSetItem => self.annotation_sets.get(idx).map(Item::AnnotationSet),
            ItemType::AnnotationItem => self.annotation_items.get(idx).map(Item::Annotation),
            ItemType::ClassData => self.class_data.get(idx).map(Item::ClassData),
            ItemType::Code => self.code_items.get(idx).map(Item::Code),
            ItemType::DebugInfo => self.debug_infos.get(idx).map(Item::DebugInfo),
            ItemType::EncodedArray => self.encoded_arrays.get(idx).map(Item::EncodedArray),
            ItemType::AnnotationsDirectory => self.annotations_directories.get(idx).map(Item::AnnotationsDirectory),
            ItemType::HiddenApiClassData => match idx {
                0 => self.hidden_api().map(Item::HiddenApi),
                _ => None,
            },
            ItemType::Header | ItemType::MapList => None,
        };
        item.unwrap_or_else(|| {
            warn!("[resolver] no {} at index {}", kind.name(), idx);
            Item::Invalid
        })
    }

    /// The item that starts at file offset `offset`.
    pub fn resolve_by_offset(&self, offset: u32) -> Item<'_> {
        match self.offset_index.get(&offset) {
            Some((kind, idx)) => self.resolve(*kind, *idx),
            None => {
                warn!("[resolver] no item at offset 0x{:x}", offset);
                Item::Invalid
            }
        }
    }

    fn index_at(&self, kind: ItemType, offset: u32) -> Option<usize> {
        if offset == 0 {
            return None;
        }
        match self.offset_index.get(&offset) {
            Some((k, idx)) if *k == kind => Some(*idx),
            _ => {
                warn!("[resolver] no {} at offset 0x{:x}", kind.name(), offset);
                None
            }
        }
    }

    pub fn get_class_data(&self, offset: u32) -> Option<&ClassDataItem> {
        self.index_at(ItemType::ClassData, offset).and_then(|i| self.class_data.get(i))
    }

    pub fn get_code(&self, offset: u32) -> Option<&CodeItem> {
        self.index_at(ItemType::Code, offset).and_then(|i| self.code_items.get(i))
    }

    pub fn get_debug_info(&self, offset: u32) -> Option<&DebugInfoItem> {
        self.index_at(ItemType::DebugInfo, offset).and_then(|i| self.debug_infos.get(i))
    }

    pub fn get_encoded_array(&self, offset: u32) -> Option<&EncodedArrayItem> {
        self.index_at(ItemType::EncodedArray, offset).and_then(|i| self.encoded_arrays.get(i))
    }

    pub fn get_annotations_directory(&self, offset: u32) -> Option<&AnnotationsDirectoryItem> {
        self.index_at(ItemType::AnnotationsDirectory, offset)
            .and_then(|i| self.annotations_directories.get(i))
    }

    pub fn get_annotation_set(&self, offset: u32) -> Option<&AnnotationSetItem> {
        self.index_at(ItemType::AnnotationSetItem, offset).and_then(|i| self.annotation_sets.get(i))
    }

    pub fn get_annotation_set_ref_list(&self, offset: u32) -> Option<&AnnotationSetRefList> {
        self.index_at(ItemType::AnnotationSetRefList, offset)
            .and_then(|i| self.annotation_set_ref_lists.get(i))
    }

    pub fn get_annotation_item(&self, offset: u32) -> Option<&AnnotationItem> {
        self.index_at(ItemType::AnnotationItem, offset).and_then(|i| self.annotation_items.get(i))
    }

    fn string_data_for(&self, idx: u32) -> Option<&StringDataItem> {
        let id = self.string_ids.get(idx as usize)?;
        let data_idx = self.index_at(ItemType::StringData, id.string_data_off)?;
        self.string_data.get(data_idx)
    }

    /// String `idx` as stored in the file, ignoring hooks.
    pub fn get_raw_string(&self, idx: u32) -> String {
        match self.string_data_for(idx) {
            Some(s) => s.value.clone(),
            None => {
                warn!("[resolver] invalid string index {}", idx);
                INVALID_STRING.to_string()
            }
        }
    }

    /// String `idx`, or its hook if one was set.
    pub fn get_string(&self, idx: u32) -> String {
        if let Some(hooked) = self.hook_strings.get(&idx) {
            return hooked.clone();
        }
        let s = self.get_raw_string(idx);
        if self.recode_ascii {
            mutf8::escape_non_ascii(&s)
        } else {
            s
        }
    }

    pub fn set_hook_string(&mut self, idx: u32, value: &str) {
        self.hook_strings.insert(idx, value.to_string());
    }

    pub fn is_hooked(&self, idx: u32) -> bool {
        self.hook_strings.contains_key(&idx)
    }

    pub fn get_type_ref(&self, idx: u32) -> Option<&TypeIdItem> {
        self.type_ids.get(idx as usize)
    }

    /// Descriptor of type `idx`, e.g. `Ljava/lang/Object;`.
    pub fn get_type(&self, idx: u32) -> String {
        match self.get_type_ref(idx) {
            Some(t) => self.get_string(t.descriptor_idx),
            None => {
                warn!("[resolver] invalid type index {}", idx);
                INVALID_TYPE.to_string()
            }
        }
    }

    /// Type descriptors of the `type_list` at `offset`; empty for 0.
    pub fn get_type_list(&self, offset: u32) -> Vec<String> {
        match self.index_at(ItemType::TypeList, offset).and_then(|i| self.type_lists.get(i)) {
            Some(list) => list.list.iter().map(|t| self.get_type(*t as u32)).collect(),
            None => Vec::new(),
        }
    }

    pub fn get_proto_ref(&self, idx: u32) -> Option<&ProtoIdItem> {
        self.proto_ids.get(idx as usize)
    }

    /// `("(I Ljava/lang/String;)", "V")` for proto `idx`. Parameter types are
    /// separated by a space.
    pub fn get_proto(&self, idx: u32) -> (String, String) {
        match self.get_proto_ref(idx) {
            Some(p) => (
                format!("({})", self.get_type_list(p.parameters_off).join(" ")),
                self.get_type(p.return_type_idx),
            ),
            None => {
                warn!("[resolver] invalid proto index {}", idx);
                (INVALID_PROTO_PARAMS.to_string(), INVALID_PROTO_RETURN.to_string())
            }
        }
    }

    pub fn get_proto_descriptor(&self, idx: u32) -> String {
        let (params, ret) = self.get_proto(idx);
        params + &ret
    }

    pub fn get_field_ref(&self, idx: u32) -> Option<&FieldIdItem> {
        self.field_ids.get(idx as usize)
    }

    /// `(class, type, name)` of field `idx`.
    pub fn get_field(&self, idx: u32) -> (String, String, String) {
        match self.get_field_ref(idx) {
            Some(f) => (self.get_type(f.class_idx as u32), self.get_type(f.type_idx as u32), self.get_string(f.name_idx)),
            None => {
                warn!("[resolver] invalid field index {}", idx);
                (INVALID_FIELD.to_string(), INVALID_FIELD.to_string(), INVALID_FIELD.to_string())
            }
        }
    }

    pub fn get_method_ref(&self, idx: u32) -> Option<&MethodIdItem> {
        self.method_ids.get(idx as usize)
    }

    /// `(class, name, descriptor)` of method `idx`.
    pub fn get_method(&self, idx: u32) -> (String, String, String) {
        match self.get_method_ref(idx) {
            Some(m) => (
                self.get_type(m.class_idx as u32),
                self.get_string(m.name_idx),
                self.get_proto_descriptor(m.proto_idx as u32),
            ),
            None => {
                warn!("[resolver] invalid method index {}", idx);
                (INVALID_METHOD.to_string(), INVALID_METHOD.to_string(), INVALID_METHOD.to_string())
            }
        }
    }

    /// Readable form of an instruction's pool reference.
    pub fn get_kind_string(&self, kind: ReferenceType, idx: u32) -> String {
        match kind {
            ReferenceType::String => self.get_string(idx),
            ReferenceType::Type => self.get_type(idx),
            ReferenceType::Field => {
                let (class, ty, name) = self.get_field(idx);
                format!("{}->{} {}", class, name, ty)
            }
            ReferenceType::Method => {
                let (class, name, descriptor) = self.get_method(idx);
                format!("{}->{}{}", class, name, descriptor)
            }
            ReferenceType::MethodProto => self.get_proto_descriptor(idx),
            ReferenceType::CallSite => self.call_site_string(idx),
            ReferenceType::MethodHandle => self.method_handle_string(idx),
            ReferenceType::None | ReferenceType::Offset => format!("0x{:x}", idx),
        }
    }

    fn call_site_string(&self, idx: u32) -> String {
        let values = self
            .call_site_ids
            .get(idx as usize)
            .and_then(|cs| self.get_encoded_array(cs.call_site_off));
        match values {
            Some(array) => {
                let parts: Vec<String> = array.values.iter().map(|v| v.to_string(self)).collect();
                format!("call_site_{}({})", idx, parts.join(", "))
            }
            None => {
                warn!("[resolver] invalid call site index {}", idx);
                format!("call_site_{}", idx)
            }
        }
    }

    fn method_handle_string(&self, idx: u32) -> String {
        match self.method_handles.get(idx as usize) {
            Some(mh) => {
                let t = mh.handle_type();
                let target = if t.is_field_accessor() {
                    self.get_kind_string(ReferenceType::Field, mh.field_or_method_id as u32)
                } else {
                    self.get_kind_string(ReferenceType::Method, mh.field_or_method_id as u32)
                };
                format!("{}@{}", t.name(), target)
            }
            None => {
                warn!("[resolver] invalid method handle index {}", idx);
                format!("method_handle_{}", idx)
            }
        }
    }
}
