// MIT License

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::constants::ZoneType;

/// The two low bits of the zone bitmap byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ZoneState {
    #[default]
    Secure = 0,
    Active = 1,
    Tampered = 2,
    Short = 3,
}

impl ZoneState {
    /// Decode from the low two bits of a zone bitmap byte.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Secure,
            1 => Self::Active,
            2 => Self::Tampered,
            _ => Self::Short,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Secure => "Secure",
            Self::Active => "Active",
            Self::Tampered => "Tampered",
            Self::Short => "Short",
        }
    }
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

bitflags! {
    /// The high six bits of the zone bitmap byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ZoneFlags: u8 {
        const FAULT           = 1 << 2;
        const FAILED_TEST     = 1 << 3;
        const ALARMED         = 1 << 4;
        const MANUAL_BYPASSED = 1 << 5;
        const AUTO_BYPASSED   = 1 << 6;
        const MASKED          = 1 << 7;
    }
}

impl Default for ZoneFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// A single sensor input on the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// 1-based zone number, unique within the panel.
    pub number: u16,
    /// Name from the panel, NUL-stripped and trimmed.
    pub name: String,
    /// Stable identifier ("Z{number}").
    pub id: String,
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    #[serde(default)]
    pub state: ZoneState,
    #[serde(default)]
    pub flags: ZoneFlags,
}

impl Zone {
    pub fn new(number: u16, name: String, zone_type: ZoneType) -> Self {
        Self {
            number,
            name,
            id: format!("Z{}", number),
            zone_type,
            state: ZoneState::Secure,
            flags: ZoneFlags::empty(),
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.flags
            .intersects(ZoneFlags::MANUAL_BYPASSED | ZoneFlags::AUTO_BYPASSED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_state_from_bits() {
        assert_eq!(ZoneState::from_bits(0x00), ZoneState::Secure);
        assert_eq!(ZoneState::from_bits(0x01), ZoneState::Active);
        assert_eq!(ZoneState::from_bits(0x02), ZoneState::Tampered);
        assert_eq!(ZoneState::from_bits(0x03), ZoneState::Short);
        // Only the low two bits count.
        assert_eq!(ZoneState::from_bits(0xFD), ZoneState::Active);
    }

    #[test]
    fn test_zone_id() {
        let zone = Zone::new(12, "Front Door".into(), ZoneType::EntryExit1);
        assert_eq!(zone.id, "Z12");
        assert_eq!(zone.state, ZoneState::Secure);
    }

    #[test]
    fn test_bypassed_accessor() {
        let mut zone = Zone::new(1, "PIR".into(), ZoneType::Guard);
        assert!(!zone.is_bypassed());
        zone.flags |= ZoneFlags::AUTO_BYPASSED;
        assert!(zone.is_bypassed());
    }
}
