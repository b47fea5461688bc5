//! The `map_list` directory and the fixed dependency graph between section
//! kinds.

use std::collections::HashSet;

use log::{trace, warn};

use crate::dex::error::DexError;
use crate::dex::{read_u2, read_u4, write_u2, write_u4};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemType {
    Header,
    StringId,
    TypeId,
    ProtoId,
    FieldId,
    MethodId,
    ClassDef,
    CallSiteId,
    MethodHandle,
    MapList,
    TypeList,
    AnnotationSetRefList,
    AnnotationSetItem,
    ClassData,
    Code,
    StringData,
    DebugInfo,
    AnnotationItem,
    EncodedArray,
    AnnotationsDirectory,
    HiddenApiClassData,
}

impl ItemType {
    pub const ALL: [ItemType; 21] = [
        ItemType::Header,
        ItemType::StringId,
        ItemType::TypeId,
        ItemType::ProtoId,
        ItemType::FieldId,
        ItemType::MethodId,
        ItemType::ClassDef,
        ItemType::CallSiteId,
        ItemType::MethodHandle,
        ItemType::MapList,
        ItemType::TypeList,
        ItemType::AnnotationSetRefList,
        ItemType::AnnotationSetItem,
        ItemType::ClassData,
        ItemType::Code,
        ItemType::StringData,
        ItemType::DebugInfo,
        ItemType::AnnotationItem,
        ItemType::EncodedArray,
        ItemType::AnnotationsDirectory,
        ItemType::HiddenApiClassData,
    ];

    pub fn from_code(code: u16) -> Option<ItemType> {
        ItemType::ALL.iter().copied().find(|t| t.code() == code)
    }

    pub fn code(self) -> u16 {
        match self {
            ItemType::Header => 0x0000,
            ItemType::StringId => 0x0001,
            ItemType::TypeId => 0x0002,
            ItemType::ProtoId => 0x0003,
            ItemType::FieldId => 0x0004,
            ItemType::MethodId => 0x0005,
            ItemType::ClassDef => 0x0006,
            ItemType::CallSiteId => 0x0007,
            ItemType::MethodHandle => 0x0008,
            ItemType::MapList => 0x1000,
            ItemType::TypeList => 0x1001,
            ItemType::AnnotationSetRefList => 0x1002,
            ItemType::AnnotationSetItem => 0x1003,
            ItemType::ClassData => 0x2000,
            ItemType::Code => 0x2001,
            ItemType::StringData => 0x2002,
            ItemType::DebugInfo => 0x2003,
            ItemType::AnnotationItem => 0x2004,
            ItemType::EncodedArray => 0x2005,
            ItemType::AnnotationsDirectory => 0x2006,
            ItemType::HiddenApiClassData => 0xf000,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ItemType::Header => "TYPE_HEADER_ITEM",
            ItemType::StringId => "TYPE_STRING_ID_ITEM",
            ItemType::TypeId => "TYPE_TYPE_ID_ITEM",
            ItemType::ProtoId => "TYPE_PROTO_ID_ITEM",
            ItemType::FieldId => "TYPE_FIELD_ID_ITEM",
            ItemType::MethodId => "TYPE_METHOD_ID_ITEM",
            ItemType::ClassDef => "TYPE_CLASS_DEF_ITEM",
            ItemType::CallSiteId => "TYPE_CALL_SITE_ID_ITEM",
            ItemType::MethodHandle => "TYPE_METHOD_HANDLE_ITEM",
            ItemType::MapList => "TYPE_MAP_LIST",
            ItemType::TypeList => "TYPE_TYPE_LIST",
            ItemType::AnnotationSetRefList => "TYPE_ANNOTATION_SET_REF_LIST",
            ItemType::AnnotationSetItem => "TYPE_ANNOTATION_SET_ITEM",
            ItemType::ClassData => "TYPE_CLASS_DATA_ITEM",
            ItemType::Code => "TYPE_CODE_ITEM",
            ItemType::StringData => "TYPE_STRING_DATA_ITEM",
            ItemType::DebugInfo => "TYPE_DEBUG_INFO_ITEM",
            ItemType::AnnotationItem => "TYPE_ANNOTATION_ITEM",
            ItemType::EncodedArray => "TYPE_ENCODED_ARRAY_ITEM",
            ItemType::AnnotationsDirectory => "TYPE_ANNOTATIONS_DIRECTORY_ITEM",
            ItemType::HiddenApiClassData => "TYPE_HIDDENAPI_CLASS_DATA_ITEM",
        }
    }

    /// Kinds whose items must be available before this kind can be resolved.
    pub fn dependencies(self) -> &'static [ItemType] {
        use ItemType::*;
        match self {
            StringId => &[StringData],
            TypeId => &[StringId],
            ProtoId => &[StringId, TypeId, TypeList],
            FieldId => &[StringId, TypeId],
            MethodId => &[StringId, TypeId, ProtoId],
            ClassDef => &[TypeId, TypeList, StringId, DebugInfo, AnnotationsDirectory, ClassData, EncodedArray],
            CallSiteId => &[EncodedArray],
            MethodHandle => &[FieldId, MethodId],
            TypeList => &[TypeId],
            AnnotationSetRefList => &[AnnotationSetItem],
            AnnotationSetItem => &[AnnotationItem],
            ClassData => &[FieldId, MethodId],
            Code => &[DebugInfo, TypeId],
            DebugInfo => &[StringId, TypeId],
            AnnotationItem => &[ProtoId],
            AnnotationsDirectory => &[FieldId, MethodId, AnnotationSetItem],
            HiddenApiClassData => &[ClassDef],
            Header | MapList | StringData | EncodedArray => &[],
        }
    }

    /// Byte alignment of each item of this kind.
    pub fn alignment(self) -> usize {
        match self {
            ItemType::StringData
            | ItemType::AnnotationItem
            | ItemType::ClassData
            | ItemType::StringId
            | ItemType::DebugInfo
            | ItemType::EncodedArray => 1,
            _ => 4,
        }
    }
}

/// One valid load order over `present`, computed with Kahn's algorithm.
/// Dependencies on kinds absent from the file are treated as satisfied.
pub fn load_order(present: &[ItemType]) -> Result<Vec<ItemType>, DexError> {
    let present_set: HashSet<ItemType> = present.iter().copied().collect();
    let mut pending: Vec<ItemType> = Vec::new();
    for t in present {
        if !pending.contains(t) {
            pending.push(*t);
        }
    }
    let mut done: HashSet<ItemType> = HashSet::new();
    let mut order = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let ready = pending.iter().position(|t| {
            t.dependencies()
                .iter()
                .all(|d| done.contains(d) || !present_set.contains(d))
        });
        match ready {
            Some(pos) => {
                let t = pending.remove(pos);
                done.insert(t);
                order.push(t);
            }
            None => fail!("Cycle in section dependencies among {:?}", pending),
        }
    }
    trace!("section load order: {:?}", order);
    Ok(order)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapItem {
    pub type_code: u16,
    pub unused: u16,
    pub size: u32,
    pub offset: u32,
}

impl MapItem {
    pub fn item_type(&self) -> Option<ItemType> {
        ItemType::from_code(self.type_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MapList {
    pub items: Vec<MapItem>,
}

impl MapList {
    pub fn read(bytes: &[u8], offset: u32) -> Result<MapList, DexError> {
        let mut ix = offset as usize;
        let size = read_u4(bytes, &mut ix)?;
        if (size as usize).saturating_mul(12) > bytes.len() {
            fail!("map_list size {} does not fit in the file", size);
        }
        let mut items = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let item = MapItem {
                type_code: read_u2(bytes, &mut ix)?,
                unused: read_u2(bytes, &mut ix)?,
                size: read_u4(bytes, &mut ix)?,
                offset: read_u4(bytes, &mut ix)?,
            };
            if item.item_type().is_none() {
                warn!("unknown map item type 0x{:04x} at 0x{:x}", item.type_code, item.offset);
            }
            items.push(item);
        }
        Ok(MapList { items })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = write_u4(bytes, self.items.len() as u32);
        for item in &self.items {
            c += write_u2(bytes, item.type_code);
            c += write_u2(bytes, item.unused);
            c += write_u4(bytes, item.size);
            c += write_u4(bytes, item.offset);
        }
        c
    }

    pub fn get(&self, t: ItemType) -> Option<&MapItem> {
        self.items.iter().find(|i| i.type_code == t.code())
    }

    pub fn present_types(&self) -> Vec<ItemType> {
        self.items.iter().filter_map(|i| i.item_type()).collect()
    }

    /// Items sorted by file offset.
    pub fn in_file_order(&self) -> Vec<MapItem> {
        let mut v = self.items.clone();
        v.sort_by_key(|i| i.offset);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[ItemType], t: ItemType) -> usize {
        order.iter().position(|x| *x == t).unwrap()
    }

    #[test]
    fn codes_roundtrip()
    {
        for t in ItemType::ALL {
            assert_eq!(ItemType::from_code(t.code()), Some(t));
        }
        assert_eq!(ItemType::from_code(0x1234), None);
        assert_eq!(ItemType::ClassData.name(), "TYPE_CLASS_DATA_ITEM");
    }

    #[test]
    fn load_order_respects_dependencies()
    {
        let order = load_order(&ItemType::ALL).unwrap();
        assert_eq!(order.len(), ItemType::ALL.len());
        for t in &order {
            for d in t.dependencies() {
                assert!(position(&order, *d) < position(&order, *t), "{:?} before {:?}", d, t);
            }
        }
    }

    #[test]
    fn missing_kinds_do_not_block()
    {
        let order = load_order(&[ItemType::ClassDef, ItemType::TypeId, ItemType::StringId]).unwrap();
        assert_eq!(order, vec![ItemType::StringId, ItemType::TypeId, ItemType::ClassDef]);
    }

    #[test]
    fn alignment_rules()
    {
        assert_eq!(ItemType::StringData.alignment(), 1);
        assert_eq!(ItemType::ClassData.alignment(), 1);
        assert_eq!(ItemType::Code.alignment(), 4);
        assert_eq!(ItemType::TypeList.alignment(), 4);
    }

    #[test]
    fn map_list_roundtrip()
    {
        let map = MapList {
            items: vec![
                MapItem { type_code: 0, unused: 0, size: 1, offset: 0 },
                MapItem { type_code: 0x1000, unused: 0, size: 1, offset: 0x80 },
            ],
        };
        let mut bytes = vec![0u8; 4];
        map.write(&mut bytes);
        let read = MapList::read(&bytes, 4).unwrap();
        assert_eq!(read, map);
        assert_eq!(read.get(ItemType::MapList).map(|i| i.offset), Some(0x80));
    }
}
