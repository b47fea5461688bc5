//! Small DEX assembler for tests. Produces complete images with sorted
//! pools, a map list and valid checksums.

use std::collections::{BTreeMap, BTreeSet};

use crate::dex::header::{self, Header, ENDIAN_CONSTANT, HEADER_SIZE};
use crate::dex::map_list::{ItemType, MapItem, MapList};
use crate::dex::mutf8;
use crate::dex::{pad_to, write_sleb128, write_u2, write_u4, write_uleb128, write_x};

pub const ACC_PUBLIC: u32 = 0x1;
pub const ACC_PRIVATE: u32 = 0x2;
pub const ACC_STATIC: u32 = 0x8;
pub const ACC_FINAL: u32 = 0x10;
pub const ACC_NATIVE: u32 = 0x100;
pub const ACC_ABSTRACT: u32 = 0x400;
pub const ACC_CONSTRUCTOR: u32 = 0x10000;

const NO_INDEX: u32 = 0xffff_ffff;

/// One code unit; pool references are resolved to 16-bit indexes at build
/// time.
#[derive(Debug, Clone)]
pub enum Unit {
    Raw(u16),
    String(String),
    Type(String),
    /// class, name, type
    Field(String, String, String),
    /// class, name, `(params)return`
    Method(String, String, String),
}

pub fn raw(units: &[u16]) -> Vec<Unit> {
    units.iter().map(|u| Unit::Raw(*u)).collect()
}

pub fn string(s: &str) -> Unit {
    Unit::String(s.to_string())
}

pub fn ty(s: &str) -> Unit {
    Unit::Type(s.to_string())
}

pub fn field(class: &str, name: &str, field_type: &str) -> Unit {
    Unit::Field(class.to_string(), name.to_string(), field_type.to_string())
}

pub fn method(class: &str, name: &str, sig: &str) -> Unit {
    Unit::Method(class.to_string(), name.to_string(), sig.to_string())
}

#[derive(Debug, Clone)]
pub struct Try {
    pub start: u32,
    pub count: u16,
    pub handlers: Vec<(String, u32)>,
    pub catch_all: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Code {
    pub registers: u16,
    pub ins: u16,
    pub outs: u16,
    pub units: Vec<Unit>,
    pub tries: Vec<Try>,
}

impl Code {
    pub fn new(registers: u16, units: Vec<Unit>) -> Self {
        Code { registers, ins: 0, outs: 0, units, tries: Vec::new() }
    }

    pub fn with_try(mut self, t: Try) -> Self {
        self.tries.push(t);
        self
    }
}

#[derive(Debug, Clone)]
struct FieldSpec {
    name: String,
    field_type: String,
    access: u32,
}

#[derive(Debug, Clone)]
struct MethodSpec {
    name: String,
    sig: String,
    access: u32,
    code: Option<Code>,
}

#[derive(Debug, Clone)]
pub struct ClassSpec {
    name: String,
    superclass: Option<String>,
    interfaces: Vec<String>,
    access: u32,
    source_file: Option<String>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
}

impl ClassSpec {
    pub fn new(name: &str) -> Self {
        ClassSpec {
            name: name.to_string(),
            superclass: Some("Ljava/lang/Object;".to_string()),
            interfaces: Vec::new(),
            access: ACC_PUBLIC,
            source_file: None,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn extends(mut self, superclass: Option<&str>) -> Self {
        self.superclass = superclass.map(|s| s.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn access(mut self, access: u32) -> Self {
        self.access = access;
        self
    }

    pub fn source(mut self, file: &str) -> Self {
        self.source_file = Some(file.to_string());
        self
    }

    pub fn field(mut self, name: &str, field_type: &str, access: u32) -> Self {
        self.fields.push(FieldSpec { name: name.to_string(), field_type: field_type.to_string(), access });
        self
    }

    pub fn method(mut self, name: &str, sig: &str, access: u32, code: Option<Code>) -> Self {
        self.methods.push(MethodSpec { name: name.to_string(), sig: sig.to_string(), access, code });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Proto {
    ret: String,
    params: Vec<String>,
}

fn split_types(mut s: &str) -> Vec<String> {
    let mut out = Vec::new();
    while !s.is_empty() {
        let dims = s.len() - s.trim_start_matches('[').len();
        let rest = &s[dims..];
        let len = if rest.starts_with('L') { rest.find(';').map(|p| p + 1).unwrap_or(rest.len()) } else { 1 };
        out.push(s[..dims + len].to_string());
        s = &s[dims + len..];
    }
    out
}

fn parse_sig(sig: &str) -> Proto {
    let close = sig.find(')').expect("method signature");
    Proto { ret: sig[close + 1..].to_string(), params: split_types(&sig[1..close]) }
}

fn shorty_char(t: &str) -> char {
    match t.chars().next() {
        Some('[') | Some('L') | None => 'L',
        Some(c) => c,
    }
}

impl Proto {
    fn shorty(&self) -> String {
        std::iter::once(&self.ret).chain(self.params.iter()).map(|t| shorty_char(t)).collect()
    }
}

#[derive(Default)]
struct Pools {
    strings: BTreeSet<String>,
    types: BTreeSet<String>,
    protos: BTreeSet<Proto>,
    fields: BTreeSet<(String, String, String)>,
    methods: BTreeSet<(String, String, Proto)>,
}

impl Pools {
    fn add_type(&mut self, t: &str) {
        self.strings.insert(t.to_string());
        self.types.insert(t.to_string());
    }

    fn add_proto(&mut self, p: &Proto) {
        self.strings.insert(p.shorty());
        self.add_type(&p.ret);
        for t in &p.params {
            self.add_type(t);
        }
        self.protos.insert(p.clone());
    }

    fn add_field(&mut self, class: &str, name: &str, field_type: &str) {
        self.add_type(class);
        self.add_type(field_type);
        self.strings.insert(name.to_string());
        self.fields.insert((class.to_string(), name.to_string(), field_type.to_string()));
    }

    fn add_method(&mut self, class: &str, name: &str, sig: &str) {
        let p = parse_sig(sig);
        self.add_type(class);
        self.add_proto(&p);
        self.strings.insert(name.to_string());
        self.methods.insert((class.to_string(), name.to_string(), p));
    }

    fn add_unit(&mut self, u: &Unit) {
        match u {
            Unit::Raw(_) => {}
            Unit::String(s) => {
                self.strings.insert(s.clone());
            }
            Unit::Type(t) => self.add_type(t),
            Unit::Field(c, n, t) => self.add_field(c, n, t),
            Unit::Method(c, n, s) => self.add_method(c, n, s),
        }
    }
}

fn index_of<T: Ord>(set: &BTreeSet<T>, item: &T) -> u32 {
    set.iter().position(|x| x == item).expect("pooled item") as u32
}

#[derive(Debug, Clone)]
pub struct DexBuilder {
    magic: [u8; 8],
    classes: Vec<ClassSpec>,
    strings: Vec<String>,
}

impl Default for DexBuilder {
    fn default() -> Self {
        DexBuilder { magic: *b"dex\n035\0", classes: Vec::new(), strings: Vec::new() }
    }
}

impl DexBuilder {
    pub fn new() -> Self {
        DexBuilder::default()
    }

    pub fn magic(mut self, magic: &[u8; 8]) -> Self {
        self.magic = *magic;
        self
    }

    pub fn class(mut self, class: ClassSpec) -> Self {
        self.classes.push(class);
        self
    }

    /// A string nothing refers to.
    pub fn string(mut self, s: &str) -> Self {
        self.strings.push(s.to_string());
        self
    }

    fn pools(&self) -> Pools {
        let mut p = Pools::default();
        p.strings.extend(self.strings.iter().cloned());
        for c in &self.classes {
            p.add_type(&c.name);
            if let Some(s) = &c.superclass {
                p.add_type(s);
            }
            for i in &c.interfaces {
                p.add_type(i);
            }
            if let Some(f) = &c.source_file {
                p.strings.insert(f.clone());
            }
            for f in &c.fields {
                p.add_field(&c.name, &f.name, &f.field_type);
            }
            for m in &c.methods {
                p.add_method(&c.name, &m.name, &m.sig);
                if let Some(code) = &m.code {
                    for u in &code.units {
                        p.add_unit(u);
                    }
                    for t in &code.tries {
                        for (h, _) in &t.handlers {
                            p.add_type(h);
                        }
                    }
                }
            }
        }
        p
    }

    pub fn build(&self) -> Vec<u8> {
        let p = self.pools();
        let string_idx = |s: &str| index_of(&p.strings, &s.to_string());
        let type_idx = |t: &str| index_of(&p.types, &t.to_string());
        let field_idx = |c: &str, n: &str, t: &str| index_of(&p.fields, &(c.to_string(), n.to_string(), t.to_string()));
        let method_idx = |c: &str, n: &str, s: &str| index_of(&p.methods, &(c.to_string(), n.to_string(), parse_sig(s)));

        let string_ids_off = HEADER_SIZE;
        let type_ids_off = string_ids_off + 4 * p.strings.len() as u32;
        let proto_ids_off = type_ids_off + 4 * p.types.len() as u32;
        let field_ids_off = proto_ids_off + 12 * p.protos.len() as u32;
        let method_ids_off = field_ids_off + 8 * p.fields.len() as u32;
        let class_defs_off = method_ids_off + 8 * p.methods.len() as u32;
        let data_off = class_defs_off + 32 * self.classes.len() as u32;

        let mut data: Vec<u8> = Vec::new();
        let abs = |data: &Vec<u8>| data_off + data.len() as u32;
        let mut map: Vec<MapItem> = Vec::new();
        let section = |map: &mut Vec<MapItem>, t: ItemType, size: usize, offset: u32| {
            if size > 0 {
                map.push(MapItem { type_code: t.code(), unused: 0, size: size as u32, offset });
            }
        };

        // type lists
        let mut lists: BTreeMap<Vec<String>, u32> = BTreeMap::new();
        let wanted: Vec<Vec<String>> = p
            .protos
            .iter()
            .map(|pr| pr.params.clone())
            .chain(self.classes.iter().map(|c| c.interfaces.clone()))
            .filter(|l| !l.is_empty())
            .collect();
        let mut first_list = 0;
        for l in wanted {
            if lists.contains_key(&l) {
                continue;
            }
            pad_to(&mut data, 4);
            if lists.is_empty() {
                first_list = abs(&data);
            }
            lists.insert(l.clone(), abs(&data));
            write_u4(&mut data, l.len() as u32);
            for t in &l {
                write_u2(&mut data, type_idx(t) as u16);
            }
        }
        section(&mut map, ItemType::TypeList, lists.len(), first_list);

        // code items
        let mut code_offs: BTreeMap<(usize, usize), u32> = BTreeMap::new();
        let mut first_code = 0;
        for (ci, c) in self.classes.iter().enumerate() {
            for (mi, m) in c.methods.iter().enumerate() {
                let code = match &m.code {
                    Some(code) => code,
                    None => continue,
                };
                pad_to(&mut data, 4);
                if code_offs.is_empty() {
                    first_code = abs(&data);
                }
                code_offs.insert((ci, mi), abs(&data));
                write_u2(&mut data, code.registers);
                write_u2(&mut data, code.ins);
                write_u2(&mut data, code.outs);
                write_u2(&mut data, code.tries.len() as u16);
                write_u4(&mut data, 0);
                write_u4(&mut data, code.units.len() as u32);
                for u in &code.units {
                    let v = match u {
                        Unit::Raw(v) => *v,
                        Unit::String(s) => string_idx(s) as u16,
                        Unit::Type(t) => type_idx(t) as u16,
                        Unit::Field(c, n, t) => field_idx(c, n, t) as u16,
                        Unit::Method(c, n, s) => method_idx(c, n, s) as u16,
                    };
                    write_u2(&mut data, v);
                }
                if code.tries.is_empty() {
                    continue;
                }
                if code.units.len() % 2 == 1 {
                    write_u2(&mut data, 0);
                }
                let mut handlers = Vec::new();
                write_uleb128(&mut handlers, code.tries.len() as u32);
                let mut handler_offs = Vec::new();
                for t in &code.tries {
                    handler_offs.push(handlers.len() as u16);
                    let size = t.handlers.len() as i32;
                    write_sleb128(&mut handlers, if t.catch_all.is_some() { -size } else { size });
                    for (h, addr) in &t.handlers {
                        write_uleb128(&mut handlers, type_idx(h));
                        write_uleb128(&mut handlers, *addr);
                    }
                    if let Some(addr) = t.catch_all {
                        write_uleb128(&mut handlers, addr);
                    }
                }
                for (t, off) in code.tries.iter().zip(handler_offs) {
                    write_u4(&mut data, t.start);
                    write_u2(&mut data, t.count);
                    write_u2(&mut data, off);
                }
                write_x(&mut data, &handlers);
            }
        }
        section(&mut map, ItemType::Code, code_offs.len(), first_code);

        // string data
        let mut string_data_offs = Vec::new();
        let first_string = abs(&data);
        for s in &p.strings {
            string_data_offs.push(abs(&data));
            write_uleb128(&mut data, mutf8::utf16_len(s));
            write_x(&mut data, &mutf8::encode(s));
            data.push(0);
        }
        section(&mut map, ItemType::StringData, p.strings.len(), first_string);

        // class data
        let mut class_data_offs = Vec::new();
        let first_class_data = abs(&data);
        let mut class_data_count = 0;
        for (ci, c) in self.classes.iter().enumerate() {
            if c.fields.is_empty() && c.methods.is_empty() {
                class_data_offs.push(0);
                continue;
            }
            class_data_count += 1;
            class_data_offs.push(abs(&data));
            let mut statics = Vec::new();
            let mut instance = Vec::new();
            for f in &c.fields {
                let entry = (field_idx(&c.name, &f.name, &f.field_type), f.access);
                if f.access & ACC_STATIC != 0 {
                    statics.push(entry);
                } else {
                    instance.push(entry);
                }
            }
            let mut direct = Vec::new();
            let mut virtuals = Vec::new();
            for (mi, m) in c.methods.iter().enumerate() {
                let entry = (
                    method_idx(&c.name, &m.name, &m.sig),
                    m.access,
                    code_offs.get(&(ci, mi)).copied().unwrap_or(0),
                );
                if m.access & (ACC_STATIC | ACC_PRIVATE | ACC_CONSTRUCTOR) != 0 {
                    direct.push(entry);
                } else {
                    virtuals.push(entry);
                }
            }
            for v in [&mut statics, &mut instance] {
                v.sort_unstable();
            }
            for v in [&mut direct, &mut virtuals] {
                v.sort_unstable();
            }
            for n in [statics.len(), instance.len(), direct.len(), virtuals.len()] {
                write_uleb128(&mut data, n as u32);
            }
            for list in [&statics, &instance] {
                let mut prev = 0;
                for (idx, access) in list {
                    write_uleb128(&mut data, idx - prev);
                    write_uleb128(&mut data, *access);
                    prev = *idx;
                }
            }
            for list in [&direct, &virtuals] {
                let mut prev = 0;
                for (idx, access, code_off) in list {
                    write_uleb128(&mut data, idx - prev);
                    write_uleb128(&mut data, *access);
                    write_uleb128(&mut data, *code_off);
                    prev = *idx;
                }
            }
        }
        section(&mut map, ItemType::ClassData, class_data_count, first_class_data);

        pad_to(&mut data, 4);
        let map_off = abs(&data);

        let mut items = vec![MapItem { type_code: ItemType::Header.code(), unused: 0, size: 1, offset: 0 }];
        let ids = [
            (ItemType::StringId, p.strings.len(), string_ids_off),
            (ItemType::TypeId, p.types.len(), type_ids_off),
            (ItemType::ProtoId, p.protos.len(), proto_ids_off),
            (ItemType::FieldId, p.fields.len(), field_ids_off),
            (ItemType::MethodId, p.methods.len(), method_ids_off),
            (ItemType::ClassDef, self.classes.len(), class_defs_off),
        ];
        for (t, n, off) in ids {
            section(&mut items, t, n, off);
        }
        items.extend(map);
        items.push(MapItem { type_code: ItemType::MapList.code(), unused: 0, size: 1, offset: map_off });
        MapList { items }.write(&mut data);

        let mut out = vec![0u8; HEADER_SIZE as usize];
        for s in &string_data_offs {
            write_u4(&mut out, *s);
        }
        for t in &p.types {
            write_u4(&mut out, string_idx(t));
        }
        for pr in &p.protos {
            write_u4(&mut out, string_idx(&pr.shorty()));
            write_u4(&mut out, type_idx(&pr.ret));
            write_u4(&mut out, lists.get(&pr.params).copied().unwrap_or(0));
        }
        for (c, n, t) in &p.fields {
            write_u2(&mut out, type_idx(c) as u16);
            write_u2(&mut out, type_idx(t) as u16);
            write_u4(&mut out, string_idx(n));
        }
        for (c, n, pr) in &p.methods {
            write_u2(&mut out, type_idx(c) as u16);
            write_u2(&mut out, index_of(&p.protos, pr) as u16);
            write_u4(&mut out, string_idx(n));
        }
        for (ci, c) in self.classes.iter().enumerate() {
            write_u4(&mut out, type_idx(&c.name));
            write_u4(&mut out, c.access);
            write_u4(&mut out, c.superclass.as_deref().map(type_idx).unwrap_or(NO_INDEX));
            write_u4(&mut out, lists.get(&c.interfaces).copied().unwrap_or(0));
            write_u4(&mut out, c.source_file.as_deref().map(string_idx).unwrap_or(NO_INDEX));
            write_u4(&mut out, 0);
            write_u4(&mut out, class_data_offs[ci]);
            write_u4(&mut out, 0);
        }
        assert_eq!(out.len() as u32, data_off);
        out.extend_from_slice(&data);

        let off_or_zero = |n: usize, off: u32| if n > 0 { off } else { 0 };
        let header = Header {
            magic: self.magic,
            checksum: 0,
            signature: [0; 20],
            file_size: out.len() as u32,
            header_size: HEADER_SIZE,
            endian_tag: ENDIAN_CONSTANT,
            link_size: 0,
            link_off: 0,
            map_off,
            string_ids_size: p.strings.len() as u32,
            string_ids_off: off_or_zero(p.strings.len(), string_ids_off),
            type_ids_size: p.types.len() as u32,
            type_ids_off: off_or_zero(p.types.len(), type_ids_off),
            proto_ids_size: p.protos.len() as u32,
            proto_ids_off: off_or_zero(p.protos.len(), proto_ids_off),
            field_ids_size: p.fields.len() as u32,
            field_ids_off: off_or_zero(p.fields.len(), field_ids_off),
            method_ids_size: p.methods.len() as u32,
            method_ids_off: off_or_zero(p.methods.len(), method_ids_off),
            class_defs_size: self.classes.len() as u32,
            class_defs_off: off_or_zero(self.classes.len(), class_defs_off),
            data_size: out.len() as u32 - data_off,
            data_off,
        };
        let mut encoded = Vec::new();
        header.write(&mut encoded);
        out[..encoded.len()].copy_from_slice(&encoded);
        header::fix_checksums(&mut out);
        out
    }
}
