//! `hiddenapi_class_data_item`: per-member access restrictions added by
//! API 29.

use bitflags::bitflags;

use crate::dex::error::DexError;
use crate::dex::{read_u4, read_uleb128};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestrictionApiFlag {
    Whitelist,
    Greylist,
    Blacklist,
    GreylistMaxO,
    GreylistMaxP,
    GreylistMaxQ,
    GreylistMaxR,
    Unknown(u32),
}

impl RestrictionApiFlag {
    pub fn from_value(v: u32) -> Self {
        match v {
            0 => RestrictionApiFlag::Whitelist,
            1 => RestrictionApiFlag::Greylist,
            2 => RestrictionApiFlag::Blacklist,
            3 => RestrictionApiFlag::GreylistMaxO,
            4 => RestrictionApiFlag::GreylistMaxP,
            5 => RestrictionApiFlag::GreylistMaxQ,
            6 => RestrictionApiFlag::GreylistMaxR,
            other => RestrictionApiFlag::Unknown(other),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RestrictionApiFlag::Whitelist => "whitelist",
            RestrictionApiFlag::Greylist => "greylist",
            RestrictionApiFlag::Blacklist => "blacklist",
            RestrictionApiFlag::GreylistMaxO => "greylist-max-o",
            RestrictionApiFlag::GreylistMaxP => "greylist-max-p",
            RestrictionApiFlag::GreylistMaxQ => "greylist-max-q",
            RestrictionApiFlag::GreylistMaxR => "greylist-max-r",
            RestrictionApiFlag::Unknown(_) => "unknown",
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DomainApiFlag: u32 {
        const CORE_PLATFORM_API = 0x1;
        const TEST_API = 0x2;
    }
}

/// One member's decoded flag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HiddenApiFlags {
    pub raw: u32,
}

impl HiddenApiFlags {
    pub fn restriction(&self) -> RestrictionApiFlag {
        RestrictionApiFlag::from_value(self.raw & 0x7)
    }

    pub fn domain(&self) -> DomainApiFlag {
        DomainApiFlag::from_bits_retain(self.raw >> 3)
    }
}

/// The whole section. `flags[i]` belongs to class_def `i` and lists static
/// fields, instance fields, direct methods then virtual methods; it is `None`
/// when the class has no entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HiddenApiClassData {
    pub flags: Vec<Option<Vec<HiddenApiFlags>>>,
    pub raw: Vec<u8>,
}

impl HiddenApiClassData {
    /// `member_counts` holds the number of members of each class_def, in
    /// class_def order.
    pub fn read(bytes: &[u8], offset: usize, member_counts: &[usize]) -> Result<HiddenApiClassData, DexError> {
        let mut ix = offset;
        let size = read_u4(bytes, &mut ix)? as usize;
        let end = offset.saturating_add(size);
        if size < 4 || end > bytes.len() {
            fail!("hiddenapi_class_data_item of size 0x{:x} overruns the file", size);
        }
        let section = &bytes[offset..end];

        let mut flags = Vec::with_capacity(member_counts.len());
        for (i, count) in member_counts.iter().enumerate() {
            let mut oix = 4 + i * 4;
            let class_off = read_u4(section, &mut oix)? as usize;
            if class_off == 0 {
                flags.push(None);
                continue;
            }
            let mut fix = class_off;
            let mut member_flags = Vec::with_capacity(*count);
            for _ in 0..*count {
                member_flags.push(HiddenApiFlags { raw: read_uleb128(section, &mut fix)? });
            }
            flags.push(Some(member_flags));
        }

        Ok(HiddenApiClassData { flags, raw: section.to_vec() })
    }

    pub fn get_flags(&self, class_def_idx: usize) -> Option<&[HiddenApiFlags]> {
        self.flags.get(class_def_idx).and_then(|f| f.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_per_class()
    {
        // two classes, first without entry, second with 3 members
        let mut bytes = vec![0xaa, 0xbb];
        let section = [
            0x0f, 0x00, 0x00, 0x00, // size
            0x00, 0x00, 0x00, 0x00, // class 0: none
            0x0c, 0x00, 0x00, 0x00, // class 1 at +12
            0x00, 0x0a, 0x0b,
        ];
        bytes.extend_from_slice(&section);
        let data = HiddenApiClassData::read(&bytes, 2, &[4, 3]).unwrap();
        assert_eq!(data.raw, section);
        assert!(data.get_flags(0).is_none());
        let f = data.get_flags(1).unwrap();
        assert_eq!(f.len(), 3);
        assert_eq!(f[0].restriction(), RestrictionApiFlag::Whitelist);
        assert_eq!(f[1].restriction(), RestrictionApiFlag::Blacklist);
        assert_eq!(f[1].domain(), DomainApiFlag::CORE_PLATFORM_API);
        assert_eq!(f[2].restriction(), RestrictionApiFlag::GreylistMaxO);
        assert_eq!(f[2].domain(), DomainApiFlag::CORE_PLATFORM_API);
        assert_eq!(f[2].restriction().name(), "greylist-max-o");
    }

    #[test]
    fn oversized_section_fails()
    {
        let bytes = [0xff, 0x00, 0x00, 0x00];
        assert!(HiddenApiClassData::read(&bytes, 0, &[]).is_err());
    }
}
