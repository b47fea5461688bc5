use bitflags::bitflags;
use rangemap::RangeInclusiveMap;
use std::ops::RangeInclusive;

/// What kind of pool index an instruction carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceType {
    None,
    String,
    Type,
    Field,
    Method,
    CallSite,
    MethodProto,
    MethodHandle,
    /// Vtable or inline index of an optimized instruction.
    Offset,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpcodeFlags: u32 {
        const CAN_THROW = 0x1;
        const ODEX_ONLY = 0x2;
        const CAN_CONTINUE = 0x4;
        const SETS_RESULT = 0x8;
        const SETS_REGISTER = 0x10;
        const SETS_WIDE_REGISTER = 0x20;
        const QUICK_FIELD_ACCESSOR = 0x40;
        const VOLATILE_FIELD_ACCESSOR = 0x80;
        const STATIC_FIELD_ACCESSOR = 0x100;
        const JUMBO_OPCODE = 0x200;
        const CAN_INITIALIZE_REFERENCE = 0x400;
    }
}

/// Physical encoding of an instruction, named after the Dalvik format ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Format10t,
    Format10x,
    Format11n,
    Format11x,
    Format12x,
    Format20bc,
    Format20t,
    Format21c,
    Format21ih,
    Format21lh,
    Format21s,
    Format21t,
    Format22b,
    Format22c,
    Format22cs,
    Format22s,
    Format22t,
    Format22x,
    Format23x,
    Format30t,
    Format31c,
    Format31i,
    Format31t,
    Format32x,
    Format35c,
    Format35mi,
    Format35ms,
    Format3rc,
    Format3rmi,
    Format3rms,
    Format40sc,
    Format41c,
    Format45cc,
    Format4rcc,
    Format51l,
    Format52c,
    Format5rc,
    ArrayPayload,
    PackedSwitchPayload,
    SparseSwitchPayload,
}

impl Format {
    /// Length in bytes, or `None` for payloads whose length depends on their
    /// contents.
    pub const fn size(&self) -> Option<usize> {
        use Format::*;
        match self {
            Format10t | Format10x | Format11n | Format11x | Format12x => Some(2),

            Format20bc | Format20t | Format21c | Format21ih | Format21lh | Format21s | Format21t | Format22b
            | Format22c | Format22cs | Format22s | Format22t | Format22x | Format23x => Some(4),

            Format30t | Format31c | Format31i | Format31t | Format32x | Format35c | Format35mi | Format35ms
            | Format3rc | Format3rmi | Format3rms => Some(6),

            Format40sc | Format41c | Format45cc | Format4rcc => Some(8),

            Format51l | Format52c | Format5rc => Some(10),

            ArrayPayload | PackedSwitchPayload | SparseSwitchPayload => None,
        }
    }

    pub const fn is_payload_format(&self) -> bool {
        matches!(self, Format::ArrayPayload | Format::PackedSwitchPayload | Format::SparseSwitchPayload)
    }

    /// The short format id, e.g. `"35c"`.
    pub fn id(&self) -> &'static str {
        use Format::*;
        match self {
            Format10t => "10t",
            Format10x => "10x",
            Format11n => "11n",
            Format11x => "11x",
            Format12x => "12x",
            Format20bc => "20bc",
            Format20t => "20t",
            Format21c => "21c",
            Format21ih => "21h",
            Format21lh => "21h",
            Format21s => "21s",
            Format21t => "21t",
            Format22b => "22b",
            Format22c => "22c",
            Format22cs => "22cs",
            Format22s => "22s",
            Format22t => "22t",
            Format22x => "22x",
            Format23x => "23x",
            Format30t => "30t",
            Format31c => "31c",
            Format31i => "31i",
            Format31t => "31t",
            Format32x => "32x",
            Format35c => "35c",
            Format35mi => "35mi",
            Format35ms => "35ms",
            Format3rc => "3rc",
            Format3rmi => "3rmi",
            Format3rms => "3rms",
            Format40sc => "40sc",
            Format41c => "41c",
            Format45cc => "45cc",
            Format4rcc => "4rcc",
            Format51l => "51l",
            Format52c => "52c",
            Format5rc => "5rc",
            ArrayPayload => "fill-array-data-payload",
            PackedSwitchPayload => "packed-switch-payload",
            SparseSwitchPayload => "sparse-switch-payload",
        }
    }
}

/// One opcode definition. The numeric value it is encoded with can move
/// between API levels, which `api_to_value_map` records.
#[derive(Debug)]
pub struct Opcode {
    pub name: &'static str,
    pub reference_type: ReferenceType,
    pub reference_type2: Option<ReferenceType>,
    pub format: Format,
    pub flags: OpcodeFlags,
    pub api_to_value_map: RangeInclusiveMap<i32, u16>,
}

/// An API range paired with the value an opcode has inside that range.
pub struct ApiConstraint {
    pub api_range: RangeInclusive<i32>,
    pub opcode_value: u16,
}

impl Opcode {
    pub(crate) fn new(
        constraints: Vec<ApiConstraint>,
        name: &'static str,
        reference_type: ReferenceType,
        format: Format,
        flags: OpcodeFlags,
    ) -> Self {
        let mut api_to_value_map = RangeInclusiveMap::new();
        for c in constraints {
            if !c.api_range.is_empty() {
                api_to_value_map.insert(c.api_range, c.opcode_value);
            }
        }
        Opcode {
            name,
            reference_type,
            reference_type2: None,
            format,
            flags,
            api_to_value_map,
        }
    }

    pub(crate) fn with_second_reference(mut self, reference_type: ReferenceType) -> Self {
        self.reference_type2 = Some(reference_type);
        self
    }

    pub(crate) fn first_api(opcode_value: u16, api: i32) -> Vec<ApiConstraint> {
        vec![ApiConstraint { api_range: api..=i32::MAX, opcode_value }]
    }

    pub(crate) fn last_api(opcode_value: u16, api: i32) -> Vec<ApiConstraint> {
        vec![ApiConstraint { api_range: i32::MIN..=api, opcode_value }]
    }

    pub(crate) fn between_api(opcode_value: u16, min_api: i32, max_api: i32) -> Vec<ApiConstraint> {
        vec![ApiConstraint { api_range: min_api..=max_api, opcode_value }]
    }

    pub(crate) fn all_apis(opcode_value: u16) -> Vec<ApiConstraint> {
        vec![ApiConstraint { api_range: i32::MIN..=i32::MAX, opcode_value }]
    }

    pub fn can_throw(&self) -> bool {
        self.flags.contains(OpcodeFlags::CAN_THROW)
    }

    pub fn odex_only(&self) -> bool {
        self.flags.contains(OpcodeFlags::ODEX_ONLY)
    }

    /// False for returns, throws and unconditional gotos.
    pub fn can_continue(&self) -> bool {
        self.flags.contains(OpcodeFlags::CAN_CONTINUE)
    }

    pub fn sets_result(&self) -> bool {
        self.flags.contains(OpcodeFlags::SETS_RESULT)
    }

    pub fn sets_register(&self) -> bool {
        self.flags.contains(OpcodeFlags::SETS_REGISTER)
    }

    pub fn sets_wide_register(&self) -> bool {
        self.flags.contains(OpcodeFlags::SETS_WIDE_REGISTER)
    }

    pub fn is_jumbo_opcode(&self) -> bool {
        self.flags.contains(OpcodeFlags::JUMBO_OPCODE)
    }

    pub fn value_for_api(&self, api: i32) -> Option<u16> {
        self.api_to_value_map.get(&api).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_sizes()
    {
        assert_eq!(Format::Format10x.size(), Some(2));
        assert_eq!(Format::Format22c.size(), Some(4));
        assert_eq!(Format::Format35c.size(), Some(6));
        assert_eq!(Format::Format45cc.size(), Some(8));
        assert_eq!(Format::Format41c.size(), Some(8));
        assert_eq!(Format::Format51l.size(), Some(10));
        assert_eq!(Format::Format5rc.size(), Some(10));
        assert_eq!(Format::PackedSwitchPayload.size(), None);
        assert!(Format::ArrayPayload.is_payload_format());
    }

    #[test]
    fn api_ranges_select_values()
    {
        let mut c = Opcode::last_api(0xf0, 13);
        c.extend(Opcode::first_api(0xf1, 14));
        let op = Opcode::new(c, "moving-op", ReferenceType::None, Format::Format10x, OpcodeFlags::CAN_CONTINUE);
        assert_eq!(op.value_for_api(10), Some(0xf0));
        assert_eq!(op.value_for_api(14), Some(0xf1));

        let gated = Opcode::new(Opcode::between_api(0xfe, 9, 19), "gated", ReferenceType::None, Format::Format10x, OpcodeFlags::empty());
        assert_eq!(gated.value_for_api(8), None);
        assert_eq!(gated.value_for_api(20), None);
        assert!(!gated.can_continue());
    }
}
