/* Dex container: the loaded sections plus class, method and field views */

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use once_cell::unsync::OnceCell;

use crate::config::Config;
use crate::dex::class_data::{access_flags_string, ClassDataItem, EncodedField, EncodedMethod, FlagTarget};
use crate::dex::class_manager::ClassManager;
use crate::dex::code::CodeItem;
use crate::dex::disassembler::{disassemble_insns, LinearSweep};
use crate::dex::encoded_values::EncodedValue;
use crate::dex::error::DexError;
use crate::dex::hidden_api::HiddenApiFlags;
use crate::dex::instructions::Instruction;
use crate::dex::items::{ClassDefItem, NO_INDEX};
use crate::dex::opcodes::{api_for_dex_version, OpcodeTable};
use crate::dex::writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MethodEntry
{
    class_def: usize,
    encoded: EncodedMethod,
    direct: bool,
    /// Position in the file's method list.
    pos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldEntry
{
    class_def: usize,
    encoded: EncodedField,
    /// Position in the static field list, if static.
    static_pos: Option<usize>,
}

pub struct DexFile
{
    cm: ClassManager,
    config: Config,
    raw: Vec<u8>,
    opcodes: Arc<OpcodeTable>,
    odex: bool,

    class_names: OnceCell<Vec<String>>,
    strings: OnceCell<Vec<String>>,
    methods: OnceCell<Vec<MethodEntry>>,
    fields: OnceCell<Vec<FieldEntry>>,
    /// `method_idx` to position in the method list.
    method_index: OnceCell<HashMap<u32, usize>>,
    /// Decoded code, one slot per method.
    instructions: OnceCell<Vec<OnceCell<Vec<(usize, Instruction)>>>>,
}

impl fmt::Debug for DexFile
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("DexFile")
            .field("version", &self.version())
            .field("odex", &self.odex)
            .field("size", &self.raw.len())
            .field("classes", &self.cm.class_defs.len())
            .finish()
    }
}

impl DexFile
{
    pub fn load(bytes: &[u8]) -> Result<DexFile, DexError>
    {
        DexFile::load_with_config(bytes, &Config::default())
    }

    pub fn load_with_config(bytes: &[u8], config: &Config) -> Result<DexFile, DexError>
    {
        DexFile::load_inner(bytes, config, false)
    }

    pub fn from_file(path: &Path) -> Result<DexFile, DexError>
    {
        let bytes = fs::read(path).map_err(|e| DexError::new(&format!("io Error: {}", e)))?;
        DexFile::load(&bytes)
    }

    /// `odex` enables the optimized opcode set regardless of the magic.
    pub(crate) fn load_inner(bytes: &[u8], config: &Config, odex: bool) -> Result<DexFile, DexError>
    {
        let cm = ClassManager::load(bytes, config)?;
        let odex = odex || cm.header.is_odex();
        let version = cm.header.version();
        let opcodes = OpcodeTable::for_dex_version(version, odex);
        info!("Adding DEX file version {} ({} classes, odex: {})", version, cm.class_defs.len(), odex);

        Ok(DexFile {
            cm,
            config: config.clone(),
            raw: bytes.to_vec(),
            opcodes,
            odex,
            class_names: OnceCell::new(),
            strings: OnceCell::new(),
            methods: OnceCell::new(),
            fields: OnceCell::new(),
            method_index: OnceCell::new(),
            instructions: OnceCell::new(),
        })
    }

    pub fn get_class_manager(&self) -> &ClassManager
    {
        &self.cm
    }

    pub fn config(&self) -> &Config
    {
        &self.config
    }

    pub fn raw(&self) -> &[u8]
    {
        &self.raw
    }

    pub fn opcodes(&self) -> &Arc<OpcodeTable>
    {
        &self.opcodes
    }

    /// Format version from the magic, 35 to 39.
    pub fn version(&self) -> u32
    {
        self.cm.header.version()
    }

    pub fn is_odex(&self) -> bool
    {
        self.odex
    }

    /// First API level that produces this format version.
    pub fn get_api_level(&self) -> i32
    {
        api_for_dex_version(self.version())
    }

    /// Drops the cached name and member lists. Called after renaming.
    pub fn flush(&mut self)
    {
        self.class_names = OnceCell::new();
        self.strings = OnceCell::new();
        self.methods = OnceCell::new();
        self.fields = OnceCell::new();
        self.method_index = OnceCell::new();
        self.instructions = OnceCell::new();
    }

    pub fn get_classes(&self) -> Vec<ClassDef<'_>>
    {
        (0..self.cm.class_defs.len()).map(|idx| ClassDef { dex: self, idx }).collect()
    }

    pub fn get_classes_names(&self) -> &[String]
    {
        self.class_names.get_or_init(|| self.get_classes().iter().map(|c| c.get_name()).collect())
    }

    pub fn get_class(&self, name: &str) -> Option<ClassDef<'_>>
    {
        self.get_classes_names()
            .iter()
            .position(|n| n == name)
            .map(|idx| ClassDef { dex: self, idx })
    }

    /// Every string of the pool, hooks applied.
    pub fn get_strings(&self) -> &[String]
    {
        self.strings.get_or_init(|| (0..self.cm.string_ids.len() as u32).map(|i| self.cm.get_string(i)).collect())
    }

    fn method_entries(&self) -> &[MethodEntry]
    {
        self.methods.get_or_init(|| {
            let mut v = Vec::new();
            for (class_def, cd) in self.cm.class_defs.iter().enumerate()
            {
                if let Some(data) = self.cm.get_class_data(cd.class_data_off)
                {
                    v.extend(data.direct_methods.iter().map(|m| MethodEntry { class_def, encoded: *m, direct: true, pos: 0 }));
                    v.extend(data.virtual_methods.iter().map(|m| MethodEntry { class_def, encoded: *m, direct: false, pos: 0 }));
                }
            }
            for (pos, e) in v.iter_mut().enumerate()
            {
                e.pos = pos;
            }
            debug!("{} methods with bodies or declarations", v.len());
            v
        })
    }

    fn field_entries(&self) -> &[FieldEntry]
    {
        self.fields.get_or_init(|| {
            let mut v = Vec::new();
            for (class_def, cd) in self.cm.class_defs.iter().enumerate()
            {
                if let Some(data) = self.cm.get_class_data(cd.class_data_off)
                {
                    v.extend(data.static_fields.iter().enumerate().map(|(i, f)| FieldEntry {
                        class_def,
                        encoded: *f,
                        static_pos: Some(i),
                    }));
                    v.extend(data.instance_fields.iter().map(|f| FieldEntry { class_def, encoded: *f, static_pos: None }));
                }
            }
            v
        })
    }

    pub fn get_methods(&self) -> Vec<Method<'_>>
    {
        self.method_entries().iter().map(|e| Method { dex: self, entry: *e }).collect()
    }

    pub fn get_fields(&self) -> Vec<Field<'_>>
    {
        self.field_entries().iter().map(|e| Field { dex: self, entry: *e }).collect()
    }

    /// All methods named `name`.
    pub fn get_encoded_method(&self, name: &str) -> Vec<Method<'_>>
    {
        self.get_methods().into_iter().filter(|m| m.get_name() == name).collect()
    }

    /// All fields named `name`.
    pub fn get_encoded_field(&self, name: &str) -> Vec<Field<'_>>
    {
        self.get_fields().into_iter().filter(|f| f.get_name() == name).collect()
    }

    pub fn get_method_descriptor(&self, class_name: &str, name: &str, descriptor: &str) -> Option<Method<'_>>
    {
        self.get_methods().into_iter().find(|m| {
            m.get_class_name() == class_name && m.get_name() == name && m.get_descriptor() == descriptor
        })
    }

    /// The field a `iget/iput/sget/sput` with this reference targets.
    pub fn get_encoded_field_descriptor(&self, class_name: &str, name: &str, field_type: &str) -> Option<Field<'_>>
    {
        self.get_fields().into_iter().find(|f| {
            f.get_class_name() == class_name && f.get_name() == name && f.get_descriptor() == field_type
        })
    }

    /// The defined method whose `method_ids` index is `method_idx`.
    pub fn get_method_by_idx(&self, method_idx: u32) -> Option<Method<'_>>
    {
        let index = self.method_index.get_or_init(|| {
            let mut index = HashMap::new();
            for e in self.method_entries()
            {
                index.entry(e.encoded.method_idx).or_insert(e.pos);
            }
            index
        });
        let pos = *index.get(&method_idx)?;
        self.method_entries().get(pos).map(|e| Method { dex: self, entry: *e })
    }

    fn decoded(&self, entry: &MethodEntry) -> &[(usize, Instruction)]
    {
        let slots = self
            .instructions
            .get_or_init(|| (0..self.method_entries().len()).map(|_| OnceCell::new()).collect());
        match slots.get(entry.pos)
        {
            Some(slot) => slot.get_or_init(|| match self.cm.get_code(entry.encoded.code_off)
            {
                Some(code) => disassemble_insns(self.opcodes.clone(), &code.insns),
                None => Vec::new(),
            })
            .as_slice(),
            None => &[],
        }
    }

    /// Best-effort linear sweep over `size` bytes at file offset `offset`.
    pub fn disassemble(&self, offset: usize, size: usize) -> LinearSweep<'_>
    {
        LinearSweep::new(self.opcodes.clone(), &self.raw, offset, size)
    }

    /// Renames a class through a string hook on its descriptor.
    pub fn set_class_name(&mut self, class_name: &str, value: &str) -> Result<(), DexError>
    {
        let descriptor_idx = match self.get_class(class_name)
        {
            Some(c) => self.cm.type_ids.get(c.item().class_idx as usize).map(|t| t.descriptor_idx),
            None => None,
        };
        match descriptor_idx
        {
            Some(idx) => self.cm.set_hook_string(idx, value),
            None => return Err(DexError::invalid_argument(&format!("Unknown class {}", class_name))),
        }
        self.flush();
        Ok(())
    }

    /// Renames method `method_idx` through a string hook on its name.
    pub fn set_method_name(&mut self, method_idx: u32, value: &str) -> Result<(), DexError>
    {
        let name_idx = match self.cm.get_method_ref(method_idx)
        {
            Some(m) => m.name_idx,
            None => return Err(DexError::invalid_argument(&format!("Unknown method index {}", method_idx))),
        };
        self.cm.set_hook_string(name_idx, value);
        self.flush();
        Ok(())
    }

    /// Renames field `field_idx` through a string hook on its name.
    pub fn set_field_name(&mut self, field_idx: u32, value: &str) -> Result<(), DexError>
    {
        let name_idx = match self.cm.get_field_ref(field_idx)
        {
            Some(f) => f.name_idx,
            None => return Err(DexError::invalid_argument(&format!("Unknown field index {}", field_idx))),
        };
        self.cm.set_hook_string(name_idx, value);
        self.flush();
        Ok(())
    }

    /// Serializes the file again with fresh offsets, signature and checksum.
    /// String hooks are not written; the raw string table is saved as is.
    pub fn save(&self) -> Result<Vec<u8>, DexError>
    {
        writer::save(&self.cm)
    }
}

/// A `class_def_item` of a [`DexFile`].
#[derive(Clone, Copy)]
pub struct ClassDef<'a>
{
    dex: &'a DexFile,
    idx: usize,
}

impl fmt::Debug for ClassDef<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "ClassDef({}, {})", self.idx, self.get_name())
    }
}

impl PartialEq for ClassDef<'_>
{
    fn eq(&self, other: &Self) -> bool
    {
        std::ptr::eq(self.dex, other.dex) && self.idx == other.idx
    }
}

impl Eq for ClassDef<'_> {}

impl<'a> ClassDef<'a>
{
    pub fn dex(&self) -> &'a DexFile
    {
        self.dex
    }

    pub fn index(&self) -> usize
    {
        self.idx
    }

    pub fn item(&self) -> &'a ClassDefItem
    {
        // views are only built for existing indexes
        &self.dex.cm.class_defs.as_slice()[self.idx]
    }

    pub fn get_name(&self) -> String
    {
        self.dex.cm.get_type(self.item().class_idx)
    }

    pub fn get_superclass_name(&self) -> Option<String>
    {
        match self.item().superclass_idx
        {
            NO_INDEX => None,
            idx => Some(self.dex.cm.get_type(idx)),
        }
    }

    pub fn get_interfaces(&self) -> Vec<String>
    {
        self.dex.cm.get_type_list(self.item().interfaces_off)
    }

    pub fn get_access_flags(&self) -> u32
    {
        self.item().access_flags
    }

    pub fn get_access_flags_string(&self) -> String
    {
        access_flags_string(self.get_access_flags(), FlagTarget::Class)
    }

    /// Source file name, if recorded.
    pub fn get_source(&self) -> Option<String>
    {
        match self.item().source_file_idx
        {
            NO_INDEX => None,
            idx => Some(self.dex.cm.get_string(idx)),
        }
    }

    pub fn get_class_data(&self) -> Option<&'a ClassDataItem>
    {
        self.dex.cm.get_class_data(self.item().class_data_off)
    }

    pub fn get_methods(&self) -> Vec<Method<'a>>
    {
        self.dex.method_entries().iter().filter(|e| e.class_def == self.idx).map(|e| Method { dex: self.dex, entry: *e }).collect()
    }

    pub fn get_fields(&self) -> Vec<Field<'a>>
    {
        self.dex.field_entries().iter().filter(|e| e.class_def == self.idx).map(|e| Field { dex: self.dex, entry: *e }).collect()
    }

    /// Initial values of the static fields, in static field order.
    pub fn get_static_values(&self) -> &'a [EncodedValue]
    {
        match self.dex.cm.get_encoded_array(self.item().static_values_off)
        {
            Some(array) => &array.values,
            None => &[],
        }
    }

    /// Type names of the class-level annotations.
    pub fn get_annotations(&self) -> Vec<String>
    {
        let cm = &self.dex.cm;
        let set = cm
            .get_annotations_directory(self.item().annotations_off)
            .and_then(|dir| cm.get_annotation_set(dir.class_annotations_off));
        match set
        {
            Some(set) => set
                .entries
                .iter()
                .filter_map(|off| cm.get_annotation_item(*off))
                .map(|a| cm.get_type(a.annotation.type_idx))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Hidden API flags of every member, static fields first.
    pub fn get_hidden_api_flags(&self) -> Option<&'a [HiddenApiFlags]>
    {
        self.dex.cm.hidden_api().and_then(|h| h.get_flags(self.idx))
    }
}

/// An `encoded_method` of a class.
#[derive(Clone, Copy)]
pub struct Method<'a>
{
    dex: &'a DexFile,
    entry: MethodEntry,
}

impl fmt::Debug for Method<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "Method({})", self.full_name())
    }
}

impl PartialEq for Method<'_>
{
    fn eq(&self, other: &Self) -> bool
    {
        std::ptr::eq(self.dex, other.dex) && self.entry == other.entry
    }
}

impl Eq for Method<'_> {}

impl<'a> Method<'a>
{
    pub fn dex(&self) -> &'a DexFile
    {
        self.dex
    }

    pub fn encoded(&self) -> &EncodedMethod
    {
        &self.entry.encoded
    }

    pub fn get_method_idx(&self) -> u32
    {
        self.entry.encoded.method_idx
    }

    pub fn is_direct(&self) -> bool
    {
        self.entry.direct
    }

    pub fn class_def(&self) -> ClassDef<'a>
    {
        ClassDef { dex: self.dex, idx: self.entry.class_def }
    }

    pub fn get_name(&self) -> String
    {
        self.dex.cm.get_method(self.get_method_idx()).1
    }

    pub fn get_class_name(&self) -> String
    {
        self.dex.cm.get_method(self.get_method_idx()).0
    }

    /// `(params)return`, parameters separated by spaces.
    pub fn get_descriptor(&self) -> String
    {
        self.dex.cm.get_method(self.get_method_idx()).2
    }

    /// `(class, name, descriptor)`.
    pub fn get_triple(&self) -> (String, String, String)
    {
        self.dex.cm.get_method(self.get_method_idx())
    }

    pub fn full_name(&self) -> String
    {
        let (class, name, descriptor) = self.get_triple();
        format!("{} {} {}", class, name, descriptor)
    }

    pub fn get_access_flags(&self) -> u32
    {
        self.entry.encoded.access_flags
    }

    pub fn get_access_flags_string(&self) -> String
    {
        access_flags_string(self.get_access_flags(), FlagTarget::Method)
    }

    pub fn get_code(&self) -> Option<&'a CodeItem>
    {
        self.dex.cm.get_code(self.entry.encoded.code_off)
    }

    /// Length of the code in 16-bit units, 0 without code.
    pub fn get_length(&self) -> usize
    {
        self.get_code().map(|c| c.insns_size() as usize).unwrap_or(0)
    }

    /// `(byte offset, instruction)` pairs of the code; stops early on an
    /// undecodable instruction. Decoded once per method.
    pub fn instructions(&self) -> &'a [(usize, Instruction)]
    {
        self.dex.decoded(&self.entry)
    }

    pub fn get_instructions_idx(&self) -> Vec<(usize, Instruction)>
    {
        self.instructions().to_vec()
    }

    pub fn get_instructions(&self) -> Vec<Instruction>
    {
        self.instructions().iter().map(|(_, ins)| ins.clone()).collect()
    }

    pub fn get_nb_instructions(&self) -> usize
    {
        self.instructions().len()
    }
}

/// An `encoded_field` of a class.
#[derive(Clone, Copy)]
pub struct Field<'a>
{
    dex: &'a DexFile,
    entry: FieldEntry,
}

impl fmt::Debug for Field<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let (class, ty, name) = self.dex.cm.get_field(self.get_field_idx());
        write!(f, "Field({}->{} {})", class, name, ty)
    }
}

impl PartialEq for Field<'_>
{
    fn eq(&self, other: &Self) -> bool
    {
        std::ptr::eq(self.dex, other.dex) && self.entry == other.entry
    }
}

impl Eq for Field<'_> {}

impl<'a> Field<'a>
{
    pub fn dex(&self) -> &'a DexFile
    {
        self.dex
    }

    pub fn encoded(&self) -> &EncodedField
    {
        &self.entry.encoded
    }

    pub fn get_field_idx(&self) -> u32
    {
        self.entry.encoded.field_idx
    }

    pub fn is_static(&self) -> bool
    {
        self.entry.static_pos.is_some()
    }

    pub fn class_def(&self) -> ClassDef<'a>
    {
        ClassDef { dex: self.dex, idx: self.entry.class_def }
    }

    pub fn get_name(&self) -> String
    {
        self.dex.cm.get_field(self.get_field_idx()).2
    }

    pub fn get_class_name(&self) -> String
    {
        self.dex.cm.get_field(self.get_field_idx()).0
    }

    /// The field type.
    pub fn get_descriptor(&self) -> String
    {
        self.dex.cm.get_field(self.get_field_idx()).1
    }

    pub fn get_access_flags(&self) -> u32
    {
        self.entry.encoded.access_flags
    }

    pub fn get_access_flags_string(&self) -> String
    {
        access_flags_string(self.get_access_flags(), FlagTarget::Field)
    }

    /// Initial value of a static field, when the class lists one.
    pub fn get_init_value(&self) -> Option<&'a EncodedValue>
    {
        let pos = self.entry.static_pos?;
        self.class_def().get_static_values().get(pos)
    }
}
