//! Cross-reference analysis over one or more loaded DEX files.
//!
//! An [`Analysis`] owns its [`DexFile`]s and four arenas of wrapper objects
//! ([`ClassAnalysis`], [`MethodAnalysis`], [`FieldAnalysis`],
//! [`StringAnalysis`]). Every cross reference is stored as a key into those
//! arenas. Symbols referenced but defined in none of the loaded files get one
//! external stub per `(class, name, descriptor)`.
//!
//! Files are added while the analysis is in the [`XrefPending`] state;
//! [`Analysis::create_xref`] consumes it and returns the [`XrefLinked`]
//! analysis, on which call graphs and permission queries are available.

pub mod basic_blocks;
pub mod callgraph;
pub mod permissions;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info, warn};
use once_cell::unsync::OnceCell;
use regex::Regex;
use serde::Serialize;

use crate::config::Config;
use crate::dex::class_data::{access_flags_string, FlagTarget};
use crate::dex::dex_file::{ClassDef, DexFile, Field, Method};
use crate::dex::error::DexError;
use crate::dex::hidden_api::HiddenApiFlags;

pub use crate::analysis::basic_blocks::{BasicBlock, BasicBlocks, BlockId, Edge, ExceptionAnalysis};
pub use crate::analysis::callgraph::{CallGraph, CallGraphNode};
pub use crate::analysis::permissions::{PermissionMappings, PermissionSource};

macro_rules! arena_key {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

arena_key!(ClassKey);
arena_key!(MethodKey);
arena_key!(FieldKey);
arena_key!(StringKey);

/// How one class refers to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RefType {
    NewInstance,
    ClassUsage,
    InvokeVirtual,
    InvokeSuper,
    InvokeDirect,
    InvokeStatic,
    InvokeInterface,
    InvokeVirtualRange,
    InvokeSuperRange,
    InvokeDirectRange,
    InvokeStaticRange,
    InvokeInterfaceRange,
}

impl RefType {
    pub fn from_op_value(op: u16) -> Option<RefType> {
        Some(match op {
            0x22 => RefType::NewInstance,
            0x1c => RefType::ClassUsage,
            0x6e => RefType::InvokeVirtual,
            0x6f => RefType::InvokeSuper,
            0x70 => RefType::InvokeDirect,
            0x71 => RefType::InvokeStatic,
            0x72 => RefType::InvokeInterface,
            0x74 => RefType::InvokeVirtualRange,
            0x75 => RefType::InvokeSuperRange,
            0x76 => RefType::InvokeDirectRange,
            0x77 => RefType::InvokeStaticRange,
            0x78 => RefType::InvokeInterfaceRange,
            _ => return None,
        })
    }

    pub fn op_value(self) -> u16 {
        match self {
            RefType::NewInstance => 0x22,
            RefType::ClassUsage => 0x1c,
            RefType::InvokeVirtual => 0x6e,
            RefType::InvokeSuper => 0x6f,
            RefType::InvokeDirect => 0x70,
            RefType::InvokeStatic => 0x71,
            RefType::InvokeInterface => 0x72,
            RefType::InvokeVirtualRange => 0x74,
            RefType::InvokeSuperRange => 0x75,
            RefType::InvokeDirectRange => 0x76,
            RefType::InvokeStaticRange => 0x77,
            RefType::InvokeInterfaceRange => 0x78,
        }
    }
}

/// A class referenced but not defined in any loaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalClass {
    pub name: String,
    pub methods: Vec<MethodKey>,
}

/// A method referenced but not defined in any loaded file. Only its
/// signature is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalMethod {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
}

impl ExternalMethod {
    pub fn full_name(&self) -> String {
        format!("{} {} {}", self.class_name, self.name, self.descriptor)
    }

    /// Key used by permission mappings.
    pub fn permission_api_name(&self) -> String {
        format!("{}-{}-{}", self.class_name, self.name, self.descriptor)
    }

    /// Always empty: nothing is known about the flags of an external method.
    pub fn get_access_flags_string(&self) -> String {
        String::new()
    }
}

impl fmt::Display for ExternalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.class_name, self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassOrigin {
    Internal {
        /// Position of the defining file in [`Analysis::get_vms`].
        vm: usize,
        class_def: usize,
        superclass: Option<String>,
        interfaces: Vec<String>,
        access_flags: u32,
    },
    External(ExternalClass),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodOrigin {
    Internal { vm: usize, class_def: usize, method_idx: u32, access_flags: u32, code_off: u32 },
    External(ExternalMethod),
}

#[derive(Debug, Clone)]
pub struct ClassAnalysis {
    key: ClassKey,
    name: String,
    origin: ClassOrigin,
    methods: Vec<MethodKey>,
    fields: Vec<FieldKey>,
    xref_to: BTreeMap<ClassKey, BTreeSet<(RefType, MethodKey, usize)>>,
    xref_from: BTreeMap<ClassKey, BTreeSet<(RefType, MethodKey, usize)>>,
    xref_new_instance: BTreeSet<(MethodKey, usize)>,
    xref_const_class: BTreeSet<(MethodKey, usize)>,
    hidden_api: Option<Vec<HiddenApiFlags>>,
    android_api: bool,
}

impl ClassAnalysis {
    fn internal(key: ClassKey, vm: usize, class: &ClassDef<'_>) -> Self {
        ClassAnalysis::with_origin(
            key,
            class.get_name(),
            ClassOrigin::Internal {
                vm,
                class_def: class.index(),
                superclass: class.get_superclass_name(),
                interfaces: class.get_interfaces(),
                access_flags: class.get_access_flags(),
            },
            false,
        )
    }

    fn external(key: ClassKey, name: &str, config: &Config) -> Self {
        let origin = ClassOrigin::External(ExternalClass { name: name.to_string(), methods: Vec::new() });
        ClassAnalysis::with_origin(key, name.to_string(), origin, config.is_api_package(name))
    }

    fn with_origin(key: ClassKey, name: String, origin: ClassOrigin, android_api: bool) -> Self {
        ClassAnalysis {
            key,
            name,
            origin,
            methods: Vec::new(),
            fields: Vec::new(),
            xref_to: BTreeMap::new(),
            xref_from: BTreeMap::new(),
            xref_new_instance: BTreeSet::new(),
            xref_const_class: BTreeSet::new(),
            hidden_api: None,
            android_api,
        }
    }

    fn add_method(&mut self, method: MethodKey) {
        self.methods.push(method);
        if let ClassOrigin::External(ext) = &mut self.origin {
            ext.methods.push(method);
        }
    }

    pub fn key(&self) -> ClassKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The superclass; external classes are assumed to extend `Object`.
    pub fn extends(&self) -> Option<&str> {
        match &self.origin {
            ClassOrigin::Internal { superclass, .. } => superclass.as_deref(),
            ClassOrigin::External(_) => Some("Ljava/lang/Object;"),
        }
    }

    pub fn implements(&self) -> &[String] {
        match &self.origin {
            ClassOrigin::Internal { interfaces, .. } => interfaces,
            ClassOrigin::External(_) => &[],
        }
    }

    pub fn get_access_flags_string(&self) -> String {
        match &self.origin {
            ClassOrigin::Internal { access_flags, .. } => access_flags_string(*access_flags, FlagTarget::Class),
            ClassOrigin::External(_) => String::new(),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self.origin, ClassOrigin::External(_))
    }

    /// External classes living in one of the configured API packages.
    pub fn is_android_api(&self) -> bool {
        self.android_api
    }

    pub fn get_vm_class(&self) -> &ClassOrigin {
        &self.origin
    }

    pub fn get_methods(&self) -> &[MethodKey] {
        &self.methods
    }

    pub fn get_fields(&self) -> &[FieldKey] {
        &self.fields
    }

    pub fn get_nb_methods(&self) -> usize {
        self.methods.len()
    }

    /// Classes this class uses, with the kind of use, the method involved
    /// and the offset. For invokes the method is the callee; for
    /// `new-instance` and `const-class` it is the method of this class
    /// holding the instruction.
    pub fn get_xref_to(&self) -> &BTreeMap<ClassKey, BTreeSet<(RefType, MethodKey, usize)>> {
        &self.xref_to
    }

    /// Classes using this class, with the calling method and offset.
    pub fn get_xref_from(&self) -> &BTreeMap<ClassKey, BTreeSet<(RefType, MethodKey, usize)>> {
        &self.xref_from
    }

    pub fn get_xref_new_instance(&self) -> &BTreeSet<(MethodKey, usize)> {
        &self.xref_new_instance
    }

    pub fn get_xref_const_class(&self) -> &BTreeSet<(MethodKey, usize)> {
        &self.xref_const_class
    }

    /// Hidden API flags of the members, static fields first.
    pub fn get_hidden_api_flags(&self) -> Option<&[HiddenApiFlags]> {
        self.hidden_api.as_deref()
    }
}

/// Callback producing source text for a method.
pub trait SourceProvider {
    fn get_source(&self, method: &MethodAnalysis) -> Option<String>;
}

pub struct MethodAnalysis {
    key: MethodKey,
    class_name: String,
    name: String,
    descriptor: String,
    access: String,
    origin: MethodOrigin,
    dex: Option<Rc<DexFile>>,
    length: usize,
    nb_instructions: usize,
    android_api: bool,
    xref_to: BTreeSet<(ClassKey, MethodKey, usize)>,
    xref_from: BTreeSet<(ClassKey, MethodKey, usize)>,
    xref_read: BTreeSet<(ClassKey, FieldKey, usize)>,
    xref_write: BTreeSet<(ClassKey, FieldKey, usize)>,
    xref_new_instance: BTreeSet<(ClassKey, usize)>,
    xref_const_class: BTreeSet<(ClassKey, usize)>,
    basic_blocks: OnceCell<BasicBlocks>,
    decompiler: Option<Rc<dyn SourceProvider>>,
}

impl fmt::Debug for MethodAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodAnalysis")
            .field("key", &self.key)
            .field("method", &self.full_name())
            .field("external", &self.is_external())
            .field("xref_to", &self.xref_to.len())
            .field("xref_from", &self.xref_from.len())
            .finish()
    }
}

impl MethodAnalysis {
    fn internal(key: MethodKey, vm: usize, dex: &Rc<DexFile>, method: &Method<'_>) -> Self {
        let (class_name, name, descriptor) = method.get_triple();
        let origin = MethodOrigin::Internal {
            vm,
            class_def: method.class_def().index(),
            method_idx: method.get_method_idx(),
            access_flags: method.get_access_flags(),
            code_off: method.encoded().code_off,
        };
        let mut m = MethodAnalysis::with_origin(key, class_name, name, descriptor, origin, false);
        m.access = method.get_access_flags_string();
        m.length = method.get_length();
        m.nb_instructions = method.get_nb_instructions();
        m.dex = Some(dex.clone());
        m
    }

    fn external(key: MethodKey, ext: ExternalMethod, config: &Config) -> Self {
        let android_api = config.is_api_package(&ext.class_name);
        let (class_name, name, descriptor) = (ext.class_name.clone(), ext.name.clone(), ext.descriptor.clone());
        MethodAnalysis::with_origin(key, class_name, name, descriptor, MethodOrigin::External(ext), android_api)
    }

    fn with_origin(
        key: MethodKey,
        class_name: String,
        name: String,
        descriptor: String,
        origin: MethodOrigin,
        android_api: bool,
    ) -> Self {
        debug!("adding method {} {}", class_name, name);
        MethodAnalysis {
            key,
            class_name,
            name,
            descriptor,
            access: String::new(),
            origin,
            dex: None,
            length: 0,
            nb_instructions: 0,
            android_api,
            xref_to: BTreeSet::new(),
            xref_from: BTreeSet::new(),
            xref_read: BTreeSet::new(),
            xref_write: BTreeSet::new(),
            xref_new_instance: BTreeSet::new(),
            xref_const_class: BTreeSet::new(),
            basic_blocks: OnceCell::new(),
            decompiler: None,
        }
    }

    pub fn key(&self) -> MethodKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Access flags as text, empty for external methods.
    pub fn access(&self) -> &str {
        &self.access
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// `class name descriptor`.
    pub fn full_name(&self) -> String {
        format!("{} {} {}", self.class_name, self.name, self.descriptor)
    }

    pub fn get_origin(&self) -> &MethodOrigin {
        &self.origin
    }

    pub fn is_external(&self) -> bool {
        matches!(self.origin, MethodOrigin::External(_))
    }

    pub fn is_android_api(&self) -> bool {
        self.android_api
    }

    /// Code length in 16-bit units; 0 without code.
    pub fn get_length(&self) -> usize {
        self.length
    }

    /// Decoded instructions in the code; 0 without code.
    pub fn get_nb_instructions(&self) -> usize {
        self.nb_instructions
    }

    pub fn get_vm(&self) -> Option<&Rc<DexFile>> {
        self.dex.as_ref()
    }

    /// The underlying method of an internal analysis.
    pub fn get_method(&self) -> Option<Method<'_>> {
        match (&self.origin, &self.dex) {
            (MethodOrigin::Internal { method_idx, .. }, Some(dex)) => dex.get_method_by_idx(*method_idx),
            _ => None,
        }
    }

    /// Methods called from this one: `(callee class, callee, offset)`.
    pub fn get_xref_to(&self) -> &BTreeSet<(ClassKey, MethodKey, usize)> {
        &self.xref_to
    }

    /// Methods calling this one: `(caller class, caller, offset)`.
    pub fn get_xref_from(&self) -> &BTreeSet<(ClassKey, MethodKey, usize)> {
        &self.xref_from
    }

    pub fn get_xref_read(&self) -> &BTreeSet<(ClassKey, FieldKey, usize)> {
        &self.xref_read
    }

    pub fn get_xref_write(&self) -> &BTreeSet<(ClassKey, FieldKey, usize)> {
        &self.xref_write
    }

    pub fn get_xref_new_instance(&self) -> &BTreeSet<(ClassKey, usize)> {
        &self.xref_new_instance
    }

    pub fn get_xref_const_class(&self) -> &BTreeSet<(ClassKey, usize)> {
        &self.xref_const_class
    }

    /// Basic blocks of the method, built on first access. `None` for
    /// external methods and methods without code.
    pub fn get_basic_blocks(&self) -> Option<&BasicBlocks> {
        let code_off = match self.origin {
            MethodOrigin::Internal { code_off, .. } => code_off,
            MethodOrigin::External(_) => return None,
        };
        let dex = self.dex.as_ref()?;
        let cm = dex.get_class_manager();
        let code = cm.get_code(code_off)?;
        Some(self.basic_blocks.get_or_init(|| BasicBlocks::build(&self.name, code, dex.opcodes(), cm)))
    }

    /// Source text from the decompiler set with [`Analysis::set_decompiler`].
    pub fn get_source(&self) -> Option<String> {
        self.decompiler.as_ref().and_then(|d| d.get_source(self))
    }
}

#[derive(Debug, Clone)]
pub struct FieldAnalysis {
    key: FieldKey,
    class_name: String,
    name: String,
    descriptor: String,
    access: String,
    vm: usize,
    field_idx: u32,
    xref_read: BTreeSet<(ClassKey, MethodKey, usize)>,
    xref_write: BTreeSet<(ClassKey, MethodKey, usize)>,
}

fn strip_offsets(set: &BTreeSet<(ClassKey, MethodKey, usize)>, with_offset: bool) -> BTreeSet<(ClassKey, MethodKey, Option<usize>)> {
    set.iter().map(|(c, m, off)| (*c, *m, if with_offset { Some(*off) } else { None })).collect()
}

impl FieldAnalysis {
    pub fn key(&self) -> FieldKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The field type.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn access(&self) -> &str {
        &self.access
    }

    /// `(position of the file, field_ids index)`.
    pub fn get_field_ref(&self) -> (usize, u32) {
        (self.vm, self.field_idx)
    }

    /// Where the field is read. Without offsets, several reads from one
    /// method collapse into one entry.
    pub fn get_xref_read(&self, with_offset: bool) -> BTreeSet<(ClassKey, MethodKey, Option<usize>)> {
        strip_offsets(&self.xref_read, with_offset)
    }

    pub fn get_xref_write(&self, with_offset: bool) -> BTreeSet<(ClassKey, MethodKey, Option<usize>)> {
        strip_offsets(&self.xref_write, with_offset)
    }
}

#[derive(Debug, Clone)]
pub struct StringAnalysis {
    key: StringKey,
    value: String,
    orig_value: String,
    xref_from: BTreeSet<(ClassKey, MethodKey, usize)>,
}

impl StringAnalysis {
    pub fn key(&self) -> StringKey {
        self.key
    }

    pub fn get_value(&self) -> &str {
        &self.value
    }

    pub fn get_orig_value(&self) -> &str {
        &self.orig_value
    }

    /// Overrides the value; the original stays available.
    pub fn set_value(&mut self, value: &str) {
        self.value = value.to_string();
    }

    pub fn is_overwritten(&self) -> bool {
        self.value != self.orig_value
    }

    pub fn get_xref_from(&self, with_offset: bool) -> BTreeSet<(ClassKey, MethodKey, Option<usize>)> {
        strip_offsets(&self.xref_from, with_offset)
    }
}

/// A bundle of DEX images, such as an APK.
pub trait DexContainer {
    fn get_all_dex(&self) -> Vec<Vec<u8>>;
    fn get_target_sdk_version(&self) -> u32;
}

#[derive(Debug, Default)]
struct Arena {
    classes: Vec<ClassAnalysis>,
    class_index: HashMap<String, ClassKey>,
    methods: Vec<MethodAnalysis>,
    method_hashes: HashMap<(String, String, String), MethodKey>,
    internal_methods: HashMap<(usize, u32), MethodKey>,
    fields: Vec<FieldAnalysis>,
    field_hashes: HashMap<(String, String, String), FieldKey>,
    internal_fields: HashMap<(usize, u32), FieldKey>,
    strings: Vec<StringAnalysis>,
    string_index: HashMap<String, StringKey>,
}

impl Arena {
    fn class_or_external(&mut self, name: &str, config: &Config) -> ClassKey {
        if let Some(k) = self.class_index.get(name) {
            return *k;
        }
        let key = ClassKey(self.classes.len());
        debug!("[xref] new external class {}", name);
        self.classes.push(ClassAnalysis::external(key, name, config));
        self.class_index.insert(name.to_string(), key);
        key
    }

    /// The method `(class, name, descriptor)`, created as an external stub
    /// on first sight.
    fn resolve_method(&mut self, class_name: &str, name: &str, descriptor: &str, config: &Config) -> (ClassKey, MethodKey) {
        let class = self.class_or_external(class_name, config);
        let hash = (class_name.to_string(), name.to_string(), descriptor.to_string());
        if let Some(m) = self.method_hashes.get(&hash) {
            return (class, *m);
        }
        let key = MethodKey(self.methods.len());
        let ext = ExternalMethod { class_name: hash.0.clone(), name: hash.1.clone(), descriptor: hash.2.clone() };
        self.methods.push(MethodAnalysis::external(key, ext, config));
        self.method_hashes.insert(hash, key);
        self.classes[class.0].add_method(key);
        (class, key)
    }

    fn string(&mut self, value: &str) -> StringKey {
        if let Some(k) = self.string_index.get(value) {
            return *k;
        }
        let key = StringKey(self.strings.len());
        self.strings.push(StringAnalysis {
            key,
            value: value.to_string(),
            orig_value: value.to_string(),
            xref_from: BTreeSet::new(),
        });
        self.string_index.insert(value.to_string(), key);
        key
    }

    fn link_class(&mut self, from: ClassKey, to: ClassKey, kind: RefType, method_to: MethodKey, method_from: MethodKey, off: usize) {
        self.classes[from.0].xref_to.entry(to).or_default().insert((kind, method_to, off));
        self.classes[to.0].xref_from.entry(from).or_default().insert((kind, method_from, off));
    }
}

/// Files can still be added; no cross references exist yet.
#[derive(Debug)]
pub struct XrefPending;

/// Cross references are built; the file set is frozen.
#[derive(Debug)]
pub struct XrefLinked;

pub struct Analysis<S = XrefPending> {
    config: Config,
    vms: Vec<Rc<DexFile>>,
    arena: Arena,
    target_sdk: Option<u32>,
    decompiler: Option<Rc<dyn SourceProvider>>,
    state: PhantomData<S>,
}

impl<S> fmt::Debug for Analysis<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analysis")
            .field("vms", &self.vms.len())
            .field("classes", &self.arena.classes.len())
            .field("methods", &self.arena.methods.len())
            .field("strings", &self.arena.strings.len())
            .finish()
    }
}

impl Default for Analysis<XrefPending> {
    fn default() -> Self {
        Analysis::with_config(Config::default())
    }
}

/// Compiles `pattern` so that it has to match at the start of the text.
fn start_match(pattern: &str) -> Result<Regex, DexError> {
    Regex::new(&format!("^(?:{})", pattern))
        .map_err(|e| DexError::invalid_argument(&format!("Bad pattern {:?}: {}", pattern, e)))
}

impl Analysis<XrefPending> {
    pub fn new() -> Self {
        Analysis::default()
    }

    pub fn with_config(config: Config) -> Self {
        Analysis {
            config,
            vms: Vec::new(),
            arena: Arena::default(),
            target_sdk: None,
            decompiler: None,
            state: PhantomData,
        }
    }

    /// Loads every DEX image of `container`.
    pub fn from_container(container: &dyn DexContainer, config: Config) -> Result<Self, DexError> {
        let mut analysis = Analysis::with_config(config);
        analysis.target_sdk = Some(container.get_target_sdk_version());
        for (i, bytes) in container.get_all_dex().iter().enumerate() {
            let dex = DexFile::load_with_config(bytes, &analysis.config).map_err(|e| DexError::with_context(e, format!("dex #{} of container", i)))?;
            analysis.add(dex);
        }
        Ok(analysis)
    }

    /// Registers the classes, methods, fields and strings of `dex`.
    pub fn add(&mut self, dex: DexFile) {
        let vm = self.vms.len();
        let dex = Rc::new(dex);
        let tic = Instant::now();
        info!("Adding DEX file version {}", dex.version());

        for class in dex.get_classes() {
            let key = ClassKey(self.arena.classes.len());
            let mut ca = ClassAnalysis::internal(key, vm, &class);
            ca.hidden_api = class.get_hidden_api_flags().map(|f| f.to_vec());

            for method in class.get_methods() {
                let mkey = MethodKey(self.arena.methods.len());
                let mut ma = MethodAnalysis::internal(mkey, vm, &dex, &method);
                ma.decompiler = self.decompiler.clone();
                self.arena
                    .method_hashes
                    .insert((ma.class_name.clone(), ma.name.clone(), ma.descriptor.clone()), mkey);
                self.arena.internal_methods.insert((vm, method.get_method_idx()), mkey);
                self.arena.methods.push(ma);
                ca.methods.push(mkey);
            }

            for field in class.get_fields() {
                let fkey = FieldKey(self.arena.fields.len());
                let fa = FieldAnalysis {
                    key: fkey,
                    class_name: field.get_class_name(),
                    name: field.get_name(),
                    descriptor: field.get_descriptor(),
                    access: field.get_access_flags_string(),
                    vm,
                    field_idx: field.get_field_idx(),
                    xref_read: BTreeSet::new(),
                    xref_write: BTreeSet::new(),
                };
                self.arena
                    .field_hashes
                    .insert((fa.class_name.clone(), fa.name.clone(), fa.descriptor.clone()), fkey);
                self.arena.internal_fields.insert((vm, field.get_field_idx()), fkey);
                self.arena.fields.push(fa);
                ca.fields.push(fkey);
            }

            if let Some(previous) = self.arena.class_index.insert(ca.name.clone(), key) {
                warn!("class {} is defined again, shadowing entry {}", ca.name, previous.0);
            }
            self.arena.classes.push(ca);
        }

        for s in dex.get_strings() {
            self.arena.string(s);
        }
        self.vms.push(dex);
        let secs = tic.elapsed().as_secs();
        info!("Added DEX in the analysis took : {}min {:02}s", secs / 60, secs % 60);
    }

    /// Walks every instruction of every method once and records the class,
    /// method, field and string references.
    pub fn create_xref(mut self) -> Analysis<XrefLinked> {
        debug!("Creating Crossreferences (XREF)");
        let tic = Instant::now();
        for vm in 0..self.vms.len() {
            let dex = self.vms[vm].clone();
            for class in dex.get_classes() {
                self.create_class_xref(vm, &class);
            }
        }
        let secs = tic.elapsed().as_secs();
        info!("End of creating cross references (XREF) run time: {}min {:02}s", secs / 60, secs % 60);

        Analysis {
            config: self.config,
            vms: self.vms,
            arena: self.arena,
            target_sdk: self.target_sdk,
            decompiler: self.decompiler,
            state: PhantomData,
        }
    }

    fn create_class_xref(&mut self, vm: usize, class: &ClassDef<'_>) {
        let cur_cls_name = class.get_name();
        let cur_cls = match self.arena.class_index.get(&cur_cls_name) {
            Some(k) => *k,
            None => return,
        };
        debug!("Creating XREF/DREF for class {}", cur_cls_name);
        let cm = class.dex().get_class_manager();

        for method in class.get_methods() {
            let cur_meth = match self.arena.internal_methods.get(&(vm, method.get_method_idx())) {
                Some(k) => *k,
                None => continue,
            };

            for (off, ins) in method.instructions().iter().map(|(off, ins)| (*off, ins)) {
                let op = ins.get_op_value();
                let idx = match ins.get_ref_kind() {
                    Some(idx) => idx,
                    None => continue,
                };
                match op {
                    0x1c | 0x22 => {
                        let type_info = cm.get_type(idx);
                        let type_info = type_info.trim_start_matches('[');
                        if !type_info.starts_with('L') || type_info == cur_cls_name {
                            continue;
                        }
                        let oth_cls = self.arena.class_or_external(type_info, &self.config);
                        let kind = if op == 0x1c { RefType::ClassUsage } else { RefType::NewInstance };
                        self.arena.link_class(cur_cls, oth_cls, kind, cur_meth, cur_meth, off);
                        if op == 0x1c {
                            self.arena.methods[cur_meth.0].xref_const_class.insert((oth_cls, off));
                            self.arena.classes[oth_cls.0].xref_const_class.insert((cur_meth, off));
                        } else {
                            self.arena.methods[cur_meth.0].xref_new_instance.insert((oth_cls, off));
                            self.arena.classes[oth_cls.0].xref_new_instance.insert((cur_meth, off));
                        }
                    }
                    0x6e..=0x72 | 0x74..=0x78 => {
                        if cm.get_method_ref(idx).is_none() {
                            warn!(
                                "[xref] no method {} for instruction at 0x{:x} in {}",
                                idx,
                                off,
                                method.full_name()
                            );
                            continue;
                        }
                        let (class_name, name, descriptor) = cm.get_method(idx);
                        let class_info = class_name.trim_start_matches('[');
                        if !class_info.starts_with('L') {
                            continue;
                        }
                        let (oth_cls, oth_meth) = self.arena.resolve_method(class_info, &name, &descriptor, &self.config);
                        self.arena.methods[cur_meth.0].xref_to.insert((oth_cls, oth_meth, off));
                        self.arena.methods[oth_meth.0].xref_from.insert((cur_cls, cur_meth, off));
                        if let Some(kind) = RefType::from_op_value(op) {
                            self.arena.link_class(cur_cls, oth_cls, kind, oth_meth, cur_meth, off);
                        }
                    }
                    0x1a | 0x1b => {
                        let value = cm.get_string(idx);
                        let key = self.arena.string(&value);
                        self.arena.strings[key.0].xref_from.insert((cur_cls, cur_meth, off));
                    }
                    0x52..=0x6d => {
                        let (class_name, field_type, name) = cm.get_field(idx);
                        let field = match self.arena.field_hashes.get(&(class_name, name, field_type)) {
                            Some(k) => *k,
                            None => continue,
                        };
                        if (0x52..=0x58).contains(&op) || (0x60..=0x66).contains(&op) {
                            self.arena.fields[field.0].xref_read.insert((cur_cls, cur_meth, off));
                            self.arena.methods[cur_meth.0].xref_read.insert((cur_cls, field, off));
                        } else {
                            self.arena.fields[field.0].xref_write.insert((cur_cls, cur_meth, off));
                            self.arena.methods[cur_meth.0].xref_write.insert((cur_cls, field, off));
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

impl<S> Analysis<S> {
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The loaded files, in the order they were added.
    pub fn get_vms(&self) -> &[Rc<DexFile>] {
        &self.vms
    }

    /// Installs `decompiler` on every internal method.
    pub fn set_decompiler(&mut self, decompiler: Rc<dyn SourceProvider>) {
        for m in self.arena.methods.iter_mut().filter(|m| !m.is_external()) {
            m.decompiler = Some(decompiler.clone());
        }
        self.decompiler = Some(decompiler);
    }

    pub fn class(&self, key: ClassKey) -> Option<&ClassAnalysis> {
        self.arena.classes.get(key.0)
    }

    pub fn method(&self, key: MethodKey) -> Option<&MethodAnalysis> {
        self.arena.methods.get(key.0)
    }

    pub fn field(&self, key: FieldKey) -> Option<&FieldAnalysis> {
        self.arena.fields.get(key.0)
    }

    pub fn string(&self, key: StringKey) -> Option<&StringAnalysis> {
        self.arena.strings.get(key.0)
    }

    fn vm_of(&self, dex: &DexFile) -> Option<usize> {
        self.vms.iter().position(|d| std::ptr::eq(Rc::as_ptr(d), dex))
    }

    pub fn get_class_analysis(&self, class_name: &str) -> Option<&ClassAnalysis> {
        self.arena.class_index.get(class_name).and_then(|k| self.class(*k))
    }

    pub fn is_class_present(&self, class_name: &str) -> bool {
        self.arena.class_index.contains_key(class_name)
    }

    /// The analysis wrapping `method`, which must come from one of the
    /// loaded files.
    pub fn get_method(&self, method: &Method<'_>) -> Option<&MethodAnalysis> {
        let vm = self.vm_of(method.dex())?;
        self.arena.internal_methods.get(&(vm, method.get_method_idx())).and_then(|k| self.method(*k))
    }

    pub fn get_method_analysis_by_name(&self, class_name: &str, name: &str, descriptor: &str) -> Option<&MethodAnalysis> {
        let hash = (class_name.to_string(), name.to_string(), descriptor.to_string());
        self.arena.method_hashes.get(&hash).and_then(|k| self.method(*k))
    }

    /// Like [`Analysis::get_method_analysis_by_name`], restricted to methods
    /// defined in a loaded file.
    pub fn get_method_by_name(&self, class_name: &str, name: &str, descriptor: &str) -> Option<Method<'_>> {
        self.get_method_analysis_by_name(class_name, name, descriptor).and_then(|m| m.get_method())
    }

    pub fn get_field_analysis(&self, field: &Field<'_>) -> Option<&FieldAnalysis> {
        let vm = self.vm_of(field.dex())?;
        self.arena.internal_fields.get(&(vm, field.get_field_idx())).and_then(|k| self.field(*k))
    }

    pub fn get_classes(&self) -> &[ClassAnalysis] {
        &self.arena.classes
    }

    pub fn get_internal_classes(&self) -> Vec<&ClassAnalysis> {
        self.arena.classes.iter().filter(|c| !c.is_external()).collect()
    }

    pub fn get_external_classes(&self) -> Vec<&ClassAnalysis> {
        self.arena.classes.iter().filter(|c| c.is_external()).collect()
    }

    pub fn get_methods(&self) -> &[MethodAnalysis] {
        &self.arena.methods
    }

    pub fn get_internal_methods(&self) -> Vec<&MethodAnalysis> {
        self.arena.methods.iter().filter(|m| !m.is_external()).collect()
    }

    pub fn get_external_methods(&self) -> Vec<&MethodAnalysis> {
        self.arena.methods.iter().filter(|m| m.is_external()).collect()
    }

    pub fn get_fields(&self) -> &[FieldAnalysis] {
        &self.arena.fields
    }

    pub fn get_strings(&self) -> &[StringAnalysis] {
        &self.arena.strings
    }

    /// Original string value to its analysis.
    pub fn get_strings_analysis(&self) -> HashMap<&str, &StringAnalysis> {
        self.arena.string_index.iter().map(|(s, k)| (s.as_str(), &self.arena.strings[k.0])).collect()
    }

    pub fn get_string_analysis_mut(&mut self, value: &str) -> Option<&mut StringAnalysis> {
        let key = *self.arena.string_index.get(value)?;
        self.arena.strings.get_mut(key.0)
    }

    /// Classes whose name matches `name` from its first character.
    pub fn find_classes(&self, name: &str, no_external: bool) -> Result<Vec<&ClassAnalysis>, DexError> {
        let re = start_match(name)?;
        Ok(self
            .arena
            .classes
            .iter()
            .filter(|c| !(no_external && c.is_external()) && re.is_match(&c.name))
            .collect())
    }

    pub fn find_methods(
        &self,
        classname: &str,
        methodname: &str,
        descriptor: &str,
        accessflags: &str,
        no_external: bool,
    ) -> Result<Vec<&MethodAnalysis>, DexError> {
        let (class_re, name_re) = (start_match(classname)?, start_match(methodname)?);
        let (desc_re, access_re) = (start_match(descriptor)?, start_match(accessflags)?);
        let mut found = Vec::new();
        for c in self.arena.classes.iter().filter(|c| class_re.is_match(&c.name)) {
            for m in c.methods.iter().map(|k| &self.arena.methods[k.0]) {
                if no_external && m.is_external() {
                    continue;
                }
                if name_re.is_match(&m.name) && desc_re.is_match(&m.descriptor) && access_re.is_match(&m.access) {
                    found.push(m);
                }
            }
        }
        Ok(found)
    }

    pub fn find_strings(&self, pattern: &str) -> Result<Vec<&StringAnalysis>, DexError> {
        let re = start_match(pattern)?;
        Ok(self.arena.strings.iter().filter(|s| re.is_match(&s.orig_value)).collect())
    }

    pub fn find_fields(
        &self,
        classname: &str,
        fieldname: &str,
        fieldtype: &str,
        accessflags: &str,
    ) -> Result<Vec<&FieldAnalysis>, DexError> {
        let (class_re, name_re) = (start_match(classname)?, start_match(fieldname)?);
        let (type_re, access_re) = (start_match(fieldtype)?, start_match(accessflags)?);
        let mut found = Vec::new();
        for c in self.arena.classes.iter().filter(|c| class_re.is_match(&c.name)) {
            for f in c.fields.iter().map(|k| &self.arena.fields[k.0]) {
                if name_re.is_match(&f.name) && type_re.is_match(&f.descriptor) && access_re.is_match(&f.access) {
                    found.push(f);
                }
            }
        }
        Ok(found)
    }

    /// API level used when a query names none: the container's target SDK,
    /// else the configured default.
    fn api_level(&self, requested: Option<u32>) -> u32 {
        requested.or(self.target_sdk).unwrap_or(self.config.default_api)
    }
}

impl Analysis<XrefLinked> {
    /// Call multigraph of the methods matching the four patterns; one edge
    /// per call site.
    pub fn get_call_graph(
        &self,
        classname: &str,
        methodname: &str,
        descriptor: &str,
        accessflags: &str,
        no_isolated: bool,
        entry_points: &[&str],
    ) -> Result<CallGraph, DexError> {
        let methods = self.find_methods(classname, methodname, descriptor, accessflags, false)?;
        Ok(callgraph::build(self, methods, no_isolated, entry_points))
    }

    /// External methods that need a permission, with those permissions.
    pub fn get_permissions<P>(&self, source: &P, api_level: Option<u32>) -> Result<Vec<(&MethodAnalysis, Vec<String>)>, DexError>
    where
        P: PermissionSource + ?Sized,
    {
        let map = permissions::mapping_for(source, self.api_level(api_level))?;
        let mut found = Vec::new();
        for m in self.external_class_methods() {
            if let MethodOrigin::External(ext) = &m.origin {
                if let Some(perms) = map.get(&ext.permission_api_name()) {
                    found.push((m, perms.clone()));
                }
            }
        }
        Ok(found)
    }

    /// External methods guarded by `permission`.
    pub fn get_permission_usage<P>(&self, source: &P, permission: &str, api_level: Option<u32>) -> Result<Vec<&MethodAnalysis>, DexError>
    where
        P: PermissionSource + ?Sized,
    {
        let map = permissions::mapping_for(source, self.api_level(api_level))?;
        let apis: BTreeSet<&str> = map
            .iter()
            .filter(|(_, perms)| perms.iter().any(|p| p == permission))
            .map(|(api, _)| api.as_str())
            .collect();
        if apis.is_empty() {
            return Err(DexError::invalid_argument(&format!(
                "No API methods could be found which use the permission {}",
                permission
            )));
        }
        Ok(self
            .external_class_methods()
            .filter(|m| match &m.origin {
                MethodOrigin::External(ext) => apis.contains(ext.permission_api_name().as_str()),
                MethodOrigin::Internal { .. } => false,
            })
            .collect())
    }

    pub fn get_android_api_usage(&self) -> Vec<&MethodAnalysis> {
        self.external_class_methods().filter(|m| m.is_android_api()).collect()
    }

    fn external_class_methods(&self) -> impl Iterator<Item = &MethodAnalysis> {
        self.arena
            .classes
            .iter()
            .filter(|c| c.is_external())
            .flat_map(move |c| c.methods.iter().map(move |k| &self.arena.methods[k.0]))
    }
}

/// True when a class or method name carries non-ASCII characters.
pub fn is_ascii_obfuscation(dex: &DexFile) -> bool {
    dex.get_classes()
        .iter()
        .any(|c| !c.get_name().is_ascii() || c.get_methods().iter().any(|m| !m.get_name().is_ascii()))
}
