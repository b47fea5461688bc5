//! The Dalvik opcode table and per-API lookups over it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::trace;
use once_cell::sync::Lazy;

use crate::dex::opcode_format::{Format, Opcode, OpcodeFlags, ReferenceType};

const NONE: OpcodeFlags = OpcodeFlags::empty();
const CONT: OpcodeFlags = OpcodeFlags::CAN_CONTINUE;
const REG: OpcodeFlags = OpcodeFlags::CAN_CONTINUE.union(OpcodeFlags::SETS_REGISTER);
const WIDE: OpcodeFlags = REG.union(OpcodeFlags::SETS_WIDE_REGISTER);
const THROW_CONT: OpcodeFlags = OpcodeFlags::CAN_THROW.union(OpcodeFlags::CAN_CONTINUE);
const THROW_REG: OpcodeFlags = THROW_CONT.union(OpcodeFlags::SETS_REGISTER);
const THROW_WIDE: OpcodeFlags = THROW_REG.union(OpcodeFlags::SETS_WIDE_REGISTER);
const INVOKE: OpcodeFlags = THROW_CONT.union(OpcodeFlags::SETS_RESULT);
const STATIC: OpcodeFlags = OpcodeFlags::STATIC_FIELD_ACCESSOR;
const ODEX: OpcodeFlags = OpcodeFlags::ODEX_ONLY;
const VOLATILE: OpcodeFlags = OpcodeFlags::ODEX_ONLY.union(OpcodeFlags::VOLATILE_FIELD_ACCESSOR);
const QUICK: OpcodeFlags = OpcodeFlags::ODEX_ONLY.union(OpcodeFlags::QUICK_FIELD_ACCESSOR);
const JUMBO: OpcodeFlags = OpcodeFlags::ODEX_ONLY.union(OpcodeFlags::JUMBO_OPCODE);

/// API level assumed for optimized (`dey`) files, the last Dalvik release.
pub const ODEX_API: i32 = 19;

/// First API level whose toolchain emits the given DEX format version.
pub fn api_for_dex_version(version: u32) -> i32
{
    match version
    {
        0..=36 => 1,
        37 => 24,
        38 => 26,
        _ => 28,
    }
}

const ACCESS_SUFFIXES: [&str; 7] = ["", "-wide", "-object", "-boolean", "-byte", "-char", "-short"];

fn op(value: u16, name: &'static str, format: Format, rt: ReferenceType, flags: OpcodeFlags) -> Opcode
{
    Opcode::new(Opcode::all_apis(value), name, rt, format, flags)
}

fn leak(s: String) -> &'static str
{
    Box::leak(s.into_boxed_str())
}

fn push_field_family(v: &mut Vec<Opcode>, base: u16, prefix: &str, format: Format, read: bool, extra: OpcodeFlags)
{
    for (i, suffix) in ACCESS_SUFFIXES.iter().enumerate()
    {
        let flags = match (read, *suffix == "-wide")
        {
            (true, true) => THROW_WIDE,
            (true, false) => THROW_REG,
            (false, _) => THROW_CONT,
        };
        v.push(op(base + i as u16, leak(format!("{}{}", prefix, suffix)), format, ReferenceType::Field, flags | extra));
    }
}

fn push_binops(v: &mut Vec<Opcode>, base: u16, suffix: &str, format: Format)
{
    let int_ops = ["add", "sub", "mul", "div", "rem", "and", "or", "xor", "shl", "shr", "ushr"];
    let float_ops = ["add", "sub", "mul", "div", "rem"];
    let mut value = base;
    for (ty, ops, wide) in [("int", &int_ops[..], false), ("long", &int_ops[..], true), ("float", &float_ops[..], false), ("double", &float_ops[..], true)]
    {
        for name in ops
        {
            let mut flags = if wide { WIDE } else { REG };
            if (ty == "int" || ty == "long") && (*name == "div" || *name == "rem")
            {
                flags |= OpcodeFlags::CAN_THROW;
            }
            v.push(op(value, leak(format!("{}-{}{}", name, ty, suffix)), format, ReferenceType::None, flags));
            value += 1;
        }
    }
}

static OPCODES: Lazy<Vec<Opcode>> = Lazy::new(|| {
    use Format::*;
    use ReferenceType as R;

    let mut v = Vec::with_capacity(320);

    v.push(op(0x00, "nop", Format10x, R::None, CONT));
    let moves = ["move", "move/from16", "move/16", "move-wide", "move-wide/from16", "move-wide/16", "move-object", "move-object/from16", "move-object/16"];
    for (i, name) in moves.iter().enumerate()
    {
        let format = [Format12x, Format22x, Format32x][i % 3];
        let flags = if (3..6).contains(&i) { WIDE } else { REG };
        v.push(op(0x01 + i as u16, name, format, R::None, flags));
    }
    v.push(op(0x0a, "move-result", Format11x, R::None, REG));
    v.push(op(0x0b, "move-result-wide", Format11x, R::None, WIDE));
    v.push(op(0x0c, "move-result-object", Format11x, R::None, REG));
    v.push(op(0x0d, "move-exception", Format11x, R::None, REG));
    v.push(op(0x0e, "return-void", Format10x, R::None, NONE));
    v.push(op(0x0f, "return", Format11x, R::None, NONE));
    v.push(op(0x10, "return-wide", Format11x, R::None, NONE));
    v.push(op(0x11, "return-object", Format11x, R::None, NONE));

    v.push(op(0x12, "const/4", Format11n, R::None, REG));
    v.push(op(0x13, "const/16", Format21s, R::None, REG));
    v.push(op(0x14, "const", Format31i, R::None, REG));
    v.push(op(0x15, "const/high16", Format21ih, R::None, REG));
    v.push(op(0x16, "const-wide/16", Format21s, R::None, WIDE));
    v.push(op(0x17, "const-wide/32", Format31i, R::None, WIDE));
    v.push(op(0x18, "const-wide", Format51l, R::None, WIDE));
    v.push(op(0x19, "const-wide/high16", Format21lh, R::None, WIDE));
    v.push(op(0x1a, "const-string", Format21c, R::String, THROW_REG));
    v.push(op(0x1b, "const-string/jumbo", Format31c, R::String, THROW_REG));
    v.push(op(0x1c, "const-class", Format21c, R::Type, THROW_REG));

    v.push(op(0x1d, "monitor-enter", Format11x, R::None, THROW_CONT));
    v.push(op(0x1e, "monitor-exit", Format11x, R::None, THROW_CONT));
    v.push(op(0x1f, "check-cast", Format21c, R::Type, THROW_REG));
    v.push(op(0x20, "instance-of", Format22c, R::Type, THROW_REG));
    v.push(op(0x21, "array-length", Format12x, R::None, THROW_REG));
    v.push(op(0x22, "new-instance", Format21c, R::Type, THROW_REG));
    v.push(op(0x23, "new-array", Format22c, R::Type, THROW_REG));
    v.push(op(0x24, "filled-new-array", Format35c, R::Type, INVOKE));
    v.push(op(0x25, "filled-new-array/range", Format3rc, R::Type, INVOKE));
    v.push(op(0x26, "fill-array-data", Format31t, R::None, CONT));
    v.push(op(0x27, "throw", Format11x, R::None, OpcodeFlags::CAN_THROW));
    v.push(op(0x28, "goto", Format10t, R::None, NONE));
    v.push(op(0x29, "goto/16", Format20t, R::None, NONE));
    v.push(op(0x2a, "goto/32", Format30t, R::None, NONE));
    v.push(op(0x2b, "packed-switch", Format31t, R::None, CONT));
    v.push(op(0x2c, "sparse-switch", Format31t, R::None, CONT));

    for (i, name) in ["cmpl-float", "cmpg-float", "cmpl-double", "cmpg-double", "cmp-long"].iter().enumerate()
    {
        v.push(op(0x2d + i as u16, name, Format23x, R::None, REG));
    }
    for (i, cond) in ["eq", "ne", "lt", "ge", "gt", "le"].iter().enumerate()
    {
        v.push(op(0x32 + i as u16, leak(format!("if-{}", cond)), Format22t, R::None, CONT));
        v.push(op(0x38 + i as u16, leak(format!("if-{}z", cond)), Format21t, R::None, CONT));
    }

    for (i, suffix) in ACCESS_SUFFIXES.iter().enumerate()
    {
        let read = if *suffix == "-wide" { THROW_WIDE } else { THROW_REG };
        v.push(op(0x44 + i as u16, leak(format!("aget{}", suffix)), Format23x, R::None, read));
        v.push(op(0x4b + i as u16, leak(format!("aput{}", suffix)), Format23x, R::None, THROW_CONT));
    }
    push_field_family(&mut v, 0x52, "iget", Format22c, true, NONE);
    push_field_family(&mut v, 0x59, "iput", Format22c, false, NONE);
    push_field_family(&mut v, 0x60, "sget", Format21c, true, STATIC);
    push_field_family(&mut v, 0x67, "sput", Format21c, false, STATIC);

    for (i, kind) in ["virtual", "super", "direct", "static", "interface"].iter().enumerate()
    {
        let flags = if *kind == "direct" { INVOKE | OpcodeFlags::CAN_INITIALIZE_REFERENCE } else { INVOKE };
        v.push(op(0x6e + i as u16, leak(format!("invoke-{}", kind)), Format35c, R::Method, flags));
        v.push(op(0x74 + i as u16, leak(format!("invoke-{}/range", kind)), Format3rc, R::Method, flags));
    }

    let unops = [
        ("neg-int", false), ("not-int", false), ("neg-long", true), ("not-long", true), ("neg-float", false),
        ("neg-double", true), ("int-to-long", true), ("int-to-float", false), ("int-to-double", true),
        ("long-to-int", false), ("long-to-float", false), ("long-to-double", true), ("float-to-int", false),
        ("float-to-long", true), ("float-to-double", true), ("double-to-int", false), ("double-to-long", true),
        ("double-to-float", false), ("int-to-byte", false), ("int-to-char", false), ("int-to-short", false),
    ];
    for (i, (name, wide)) in unops.iter().enumerate()
    {
        v.push(op(0x7b + i as u16, name, Format12x, R::None, if *wide { WIDE } else { REG }));
    }
    push_binops(&mut v, 0x90, "", Format23x);
    push_binops(&mut v, 0xb0, "/2addr", Format12x);

    let lit_ops = ["add", "rsub", "mul", "div", "rem", "and", "or", "xor", "shl", "shr", "ushr"];
    for (i, name) in lit_ops.iter().enumerate()
    {
        let throws = if *name == "div" || *name == "rem" { OpcodeFlags::CAN_THROW } else { NONE };
        if i < 8
        {
            let n = if *name == "rsub" { "rsub-int".to_string() } else { format!("{}-int/lit16", name) };
            v.push(op(0xd0 + i as u16, leak(n), Format22s, R::None, REG | throws));
        }
        v.push(op(0xd8 + i as u16, leak(format!("{}-int/lit8", name)), Format22b, R::None, REG | throws));
    }

    // Dalvik optimizer output, only meaningful in odex files.
    let volatile = [
        (0xe3, "iget-volatile", Format22c, THROW_REG),
        (0xe4, "iput-volatile", Format22c, THROW_CONT),
        (0xe5, "sget-volatile", Format21c, THROW_REG | STATIC),
        (0xe6, "sput-volatile", Format21c, THROW_CONT | STATIC),
        (0xe7, "iget-object-volatile", Format22c, THROW_REG),
        (0xe8, "iget-wide-volatile", Format22c, THROW_WIDE),
        (0xe9, "iput-wide-volatile", Format22c, THROW_CONT),
        (0xea, "sget-wide-volatile", Format21c, THROW_WIDE | STATIC),
        (0xeb, "sput-wide-volatile", Format21c, THROW_CONT | STATIC),
        (0xfc, "iput-object-volatile", Format22c, THROW_CONT),
        (0xfd, "sget-object-volatile", Format21c, THROW_REG | STATIC),
    ];
    for (value, name, format, flags) in volatile
    {
        v.push(Opcode::new(Opcode::first_api(value, 9), name, R::Field, format, flags | VOLATILE));
    }
    v.push(Opcode::new(Opcode::between_api(0xfe, 9, 19), "sput-object-volatile", R::Field, Format21c, THROW_CONT | STATIC | VOLATILE));
    v.push(Opcode::new(Opcode::first_api(0xed, 5), "throw-verification-error", R::None, Format20bc, ODEX | OpcodeFlags::CAN_THROW));
    v.push(Opcode::new(Opcode::all_apis(0xee), "execute-inline", R::Offset, Format35mi, ODEX | INVOKE));
    v.push(Opcode::new(Opcode::first_api(0xef, 8), "execute-inline/range", R::Offset, Format3rmi, ODEX | INVOKE));
    v.push(Opcode::new(Opcode::last_api(0xf0, 13), "invoke-direct-empty", R::Method, Format35c, ODEX | INVOKE));
    v.push(Opcode::new(Opcode::first_api(0xf0, 14), "invoke-object-init/range", R::Method, Format3rc, ODEX | INVOKE));
    v.push(Opcode::new(Opcode::first_api(0xf1, 11), "return-void-barrier", R::None, Format10x, ODEX));
    let quick = [
        (0xf2, "iget-quick", THROW_REG),
        (0xf3, "iget-wide-quick", THROW_WIDE),
        (0xf4, "iget-object-quick", THROW_REG),
        (0xf5, "iput-quick", THROW_CONT),
        (0xf6, "iput-wide-quick", THROW_CONT),
        (0xf7, "iput-object-quick", THROW_CONT),
    ];
    for (value, name, flags) in quick
    {
        v.push(Opcode::new(Opcode::all_apis(value), name, R::Offset, Format22cs, flags | QUICK));
    }
    v.push(Opcode::new(Opcode::all_apis(0xf8), "invoke-virtual-quick", R::Offset, Format35ms, ODEX | INVOKE));
    v.push(Opcode::new(Opcode::all_apis(0xf9), "invoke-virtual-quick/range", R::Offset, Format3rms, ODEX | INVOKE));
    v.push(Opcode::new(Opcode::last_api(0xfa, 25), "invoke-super-quick", R::Offset, Format35ms, ODEX | INVOKE));
    v.push(Opcode::new(Opcode::last_api(0xfb, 25), "invoke-super-quick/range", R::Offset, Format3rms, ODEX | INVOKE));

    // Opcodes added with DEX 038 and 039.
    v.push(Opcode::new(Opcode::first_api(0xfa, 26), "invoke-polymorphic", R::Method, Format45cc, INVOKE).with_second_reference(R::MethodProto));
    v.push(Opcode::new(Opcode::first_api(0xfb, 26), "invoke-polymorphic/range", R::Method, Format4rcc, INVOKE).with_second_reference(R::MethodProto));
    v.push(Opcode::new(Opcode::first_api(0xfc, 26), "invoke-custom", R::CallSite, Format35c, INVOKE));
    v.push(Opcode::new(Opcode::first_api(0xfd, 26), "invoke-custom/range", R::CallSite, Format3rc, INVOKE));
    v.push(Opcode::new(Opcode::first_api(0xfe, 28), "const-method-handle", R::MethodHandle, Format21c, THROW_REG));
    v.push(Opcode::new(Opcode::first_api(0xff, 28), "const-method-type", R::MethodProto, Format21c, THROW_REG));

    v.push(op(0x0100, "packed-switch-payload", PackedSwitchPayload, R::None, NONE));
    v.push(op(0x0200, "sparse-switch-payload", SparseSwitchPayload, R::None, NONE));
    v.push(op(0x0300, "fill-array-data-payload", ArrayPayload, R::None, NONE));

    // Extended-width jumbo opcodes, escaped with a 0xff low byte.
    v.push(op(0x00ff, "const-class/jumbo", Format41c, R::Type, THROW_REG | JUMBO));
    v.push(op(0x01ff, "check-cast/jumbo", Format41c, R::Type, THROW_REG | JUMBO));
    v.push(op(0x02ff, "instance-of/jumbo", Format52c, R::Type, THROW_REG | JUMBO));
    v.push(op(0x03ff, "new-instance/jumbo", Format41c, R::Type, THROW_REG | JUMBO));
    v.push(op(0x04ff, "new-array/jumbo", Format52c, R::Type, THROW_REG | JUMBO));
    v.push(op(0x05ff, "filled-new-array/jumbo", Format5rc, R::Type, INVOKE | JUMBO));
    for (i, suffix) in ACCESS_SUFFIXES.iter().enumerate()
    {
        let i = i as u16;
        v.push(op(0x06ff + (i << 8), leak(format!("iget{}/jumbo", suffix)), Format52c, R::Field, THROW_REG | JUMBO));
        v.push(op(0x0dff + (i << 8), leak(format!("iput{}/jumbo", suffix)), Format52c, R::Field, THROW_CONT | JUMBO));
        v.push(op(0x14ff + (i << 8), leak(format!("sget{}/jumbo", suffix)), Format41c, R::Field, THROW_REG | STATIC | JUMBO));
        v.push(op(0x1bff + (i << 8), leak(format!("sput{}/jumbo", suffix)), Format41c, R::Field, THROW_CONT | STATIC | JUMBO));
    }
    for (i, kind) in ["virtual", "super", "direct", "static", "interface"].iter().enumerate()
    {
        v.push(op(0x22ff + ((i as u16) << 8), leak(format!("invoke-{}/jumbo", kind)), Format5rc, R::Method, INVOKE | JUMBO));
    }
    v.push(op(0xf2ff, "invoke-object-init/jumbo", Format5rc, R::Method, INVOKE | JUMBO));
    let volatile_jumbo = [
        (0xf3ff, "iget-volatile/jumbo", Format52c),
        (0xf4ff, "iget-wide-volatile/jumbo", Format52c),
        (0xf5ff, "iget-object-volatile/jumbo", Format52c),
        (0xf6ff, "iput-volatile/jumbo", Format52c),
        (0xf7ff, "iput-wide-volatile/jumbo", Format52c),
        (0xf8ff, "iput-object-volatile/jumbo", Format52c),
        (0xf9ff, "sget-volatile/jumbo", Format41c),
        (0xfaff, "sget-wide-volatile/jumbo", Format41c),
        (0xfbff, "sget-object-volatile/jumbo", Format41c),
        (0xfcff, "sput-volatile/jumbo", Format41c),
        (0xfdff, "sput-wide-volatile/jumbo", Format41c),
        (0xfeff, "sput-object-volatile/jumbo", Format41c),
    ];
    for (value, name, format) in volatile_jumbo
    {
        v.push(op(value, name, format, R::Field, THROW_REG | VOLATILE | JUMBO));
    }
    v.push(op(0xffff, "throw-verification-error/jumbo", Format40sc, R::None, OpcodeFlags::CAN_THROW | JUMBO));

    v
});

/// Opcode lookup for one API level, with or without the odex extensions.
#[derive(Debug)]
pub struct OpcodeTable {
    api: i32,
    odex: bool,
    by_value: HashMap<u16, &'static Opcode>,
}

static TABLE_CACHE: Lazy<Mutex<HashMap<(i32, bool), Arc<OpcodeTable>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

impl OpcodeTable {
    /// Returns the shared table for `api`. Tables are built once per
    /// (api, odex) pair.
    pub fn new(api: i32, odex: bool) -> Arc<OpcodeTable> {
        let mut cache = match TABLE_CACHE.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache
            .entry((api, odex))
            .or_insert_with(|| {
                trace!("building opcode table for api {} (odex: {})", api, odex);
                let mut by_value = HashMap::new();
                for opcode in OPCODES.iter() {
                    if opcode.odex_only() && !odex {
                        continue;
                    }
                    if let Some(value) = opcode.value_for_api(api) {
                        by_value.insert(value, opcode);
                    }
                }
                Arc::new(OpcodeTable { api, odex, by_value })
            })
            .clone()
    }

    pub fn for_dex_version(version: u32, odex: bool) -> Arc<OpcodeTable> {
        let api = if odex { ODEX_API } else { api_for_dex_version(version) };
        OpcodeTable::new(api, odex)
    }

    pub fn get(&self, value: u16) -> Option<&'static Opcode> {
        self.by_value.get(&value).copied()
    }

    pub fn api(&self) -> i32 {
        self.api
    }

    pub fn is_odex(&self) -> bool {
        self.odex
    }

    /// Single-byte opcode values with no assignment in this table.
    pub fn unused_opcodes(&self) -> Vec<u8> {
        (0u16..=0xff).filter(|v| !self.by_value.contains_key(v)).map(|v| v as u8).collect()
    }
}
