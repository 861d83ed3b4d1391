// MIT License

use std::fmt;

use serde::{Deserialize, Serialize};

/// Arming state of an area as reported by the panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AreaState {
    #[default]
    Disarmed = 0,
    InExit = 1,
    InEntry = 2,
    Armed = 3,
    PartArmed = 4,
    InAlarm = 5,
}

impl AreaState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Disarmed),
            1 => Some(Self::InExit),
            2 => Some(Self::InEntry),
            3 => Some(Self::Armed),
            4 => Some(Self::PartArmed),
            5 => Some(Self::InAlarm),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Disarmed => "Disarmed",
            Self::InExit => "In Exit",
            Self::InEntry => "In Entry",
            Self::Armed => "Armed",
            Self::PartArmed => "Part Armed",
            Self::InAlarm => "In Alarm",
        }
    }
}

impl fmt::Display for AreaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Arm mode for the arm command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ArmType {
    Full = 0,
    PartArm1 = 1,
    PartArm2 = 2,
    PartArm3 = 3,
}

impl ArmType {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Full => "Full Arm",
            Self::PartArm1 => "Part Arm 1",
            Self::PartArm2 => "Part Arm 2",
            Self::PartArm3 => "Part Arm 3",
        }
    }
}

/// State pair decoded from an 8-byte area flags word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaStatus {
    pub state: AreaState,
    /// Part-arm level 1-3, or 0 when no part-arm flag is set.
    pub part_arm: u8,
}

/// A grouping of zones that arms and disarms as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    /// 1-based area number, unique within the panel.
    pub number: u8,
    /// Name from the panel, NUL-stripped and trimmed.
    pub name: String,
    /// Stable identifier ("A{number}").
    pub id: String,
    #[serde(default)]
    pub state: AreaState,
    /// Part-arm level; non-zero exactly while `state` is [`AreaState::PartArmed`].
    #[serde(default)]
    pub part_arm: u8,
}

impl Area {
    pub fn new(number: u8, name: String) -> Self {
        Self {
            number,
            name,
            id: format!("A{}", number),
            state: AreaState::Disarmed,
            part_arm: 0,
        }
    }

    /// Apply a reported state, maintaining the part-arm invariant.
    pub fn set_state(&mut self, state: AreaState, part_arm: u8) {
        self.state = state;
        self.part_arm = if state == AreaState::PartArmed { part_arm } else { 0 };
    }

    /// Display status, e.g. "Armed" or "Part Armed 2".
    pub fn status_description(&self) -> String {
        if self.state == AreaState::PartArmed && self.part_arm != 0 {
            format!("{} {}", self.state, self.part_arm)
        } else {
            self.state.to_string()
        }
    }
}
