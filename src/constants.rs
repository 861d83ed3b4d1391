// MIT License

//! Panel-defined numeric codes and their display names.

use serde::{Deserialize, Serialize};

/// The panel's classification of a zone, as reported in the zone-details
/// record (byte 16 of each 32-byte entry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ZoneType {
    NotUsed = 0,
    EntryExit1 = 1,
    EntryExit2 = 2,
    Guard = 3,
    GuardAccess = 4,
    TwentyFourHourAudible = 5,
    TwentyFourHourSilent = 6,
    PAAudible = 7,
    PASilent = 8,
    Fire = 9,
    Medical = 10,
    TwentyFourHourGas = 11,
    Auxiliary = 12,
    Tamper = 13,
}

impl ZoneType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::NotUsed),
            1 => Some(Self::EntryExit1),
            2 => Some(Self::EntryExit2),
            3 => Some(Self::Guard),
            4 => Some(Self::GuardAccess),
            5 => Some(Self::TwentyFourHourAudible),
            6 => Some(Self::TwentyFourHourSilent),
            7 => Some(Self::PAAudible),
            8 => Some(Self::PASilent),
            9 => Some(Self::Fire),
            10 => Some(Self::Medical),
            11 => Some(Self::TwentyFourHourGas),
            12 => Some(Self::Auxiliary),
            13 => Some(Self::Tamper),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::NotUsed => "Not used",
            Self::EntryExit1 => "Entry/Exit 1",
            Self::EntryExit2 => "Entry/Exit 2",
            Self::Guard => "Guard",
            Self::GuardAccess => "Guard Access",
            Self::TwentyFourHourAudible => "24Hr Audible",
            Self::TwentyFourHourSilent => "24Hr Silent",
            Self::PAAudible => "PA Audible",
            Self::PASilent => "PA Silent",
            Self::Fire => "Fire",
            Self::Medical => "Medical",
            Self::TwentyFourHourGas => "24Hr Gas",
            Self::Auxiliary => "Auxiliary",
            Self::Tamper => "Tamper",
        }
    }
}

/// Description for a log event type byte.
///
/// Unknown codes get a synthesized description rather than being dropped;
/// the log topic carries whatever the panel reports.
pub fn log_event_description(event_type: u8) -> String {
    let known = match event_type {
        1 => "Entry/Exit 1",
        2 => "Entry/Exit 2",
        3 => "Guard",
        4 => "Guard Access",
        5 => "24hr Audible",
        6 => "24hr Silent",
        7 => "Audible PA",
        8 => "Silent PA",
        9 => "Fire Alarm",
        10 => "Medical",
        11 => "24Hr Gas Alarm",
        12 => "Auxiliary Alarm",
        13 => "24hr Tamper Alarm",
        14 => "Exit Terminator",
        15 => "Moment Key",
        16 => "Latch Key",
        17 => "Security",
        18 => "Omit Key",
        19 => "Custom",
        _ => return format!("Unknown Log Event Type: {}", event_type),
    };
    known.to_string()
}

/// Description for a log event group type byte.
pub fn log_group_description(group_type: u8) -> &'static str {
    match group_type {
        0 => "Not Reported",
        1 => "Priority Alarm",
        2 => "Priority Alarm Restore",
        3 => "Alarm",
        4 => "Restore",
        5 => "Open",
        6 => "Close",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_type_roundtrip() {
        for v in 0..=13u8 {
            let t = ZoneType::from_u8(v).unwrap();
            assert_eq!(t as u8, v);
        }
        assert!(ZoneType::from_u8(14).is_none());
    }

    #[test]
    fn test_log_event_descriptions() {
        assert_eq!(log_event_description(9), "Fire Alarm");
        assert_eq!(log_event_description(13), "24hr Tamper Alarm");
        assert_eq!(log_event_description(42), "Unknown Log Event Type: 42");
    }
}
