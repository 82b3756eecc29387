use std::fmt;

use serde::{Deserialize, Serialize};

/// Where on the dolly the tag is mounted.
///
/// The codes are already on tags in the field; never renumber them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WriteLocation {
    Hitch = 0x01,
    Handlebar = 0x02,
}

impl WriteLocation {
    pub const ALL: [WriteLocation; 2] = [WriteLocation::Hitch, WriteLocation::Handlebar];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(WriteLocation::Hitch),
            0x02 => Some(WriteLocation::Handlebar),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            WriteLocation::Hitch => "Hitch",
            WriteLocation::Handlebar => "Handlebar",
        }
    }
}

impl fmt::Display for WriteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
