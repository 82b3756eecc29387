use std::fmt;

use serde::{Deserialize, Serialize};

/// Dolly category, as printed in the third segment of the QR identifier.
///
/// The integer code is the wire representation on the tag, so both the
/// parser and the payload codec go through [`DollyCategory::from_code`] and
/// [`DollyCategory::code`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DollyCategory {
    #[default]
    Unknown = 0,
    Standard = 1,
    CutoutLongsideLeft = 2,
    CutoutLongsideRight = 3,
    CutoutShortside = 4,
}

impl DollyCategory {
    pub const ALL: [DollyCategory; 5] = [
        DollyCategory::Unknown,
        DollyCategory::Standard,
        DollyCategory::CutoutLongsideLeft,
        DollyCategory::CutoutLongsideRight,
        DollyCategory::CutoutShortside,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Codes outside the registry are `None`, never `Unknown`.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DollyCategory::Unknown),
            1 => Some(DollyCategory::Standard),
            2 => Some(DollyCategory::CutoutLongsideLeft),
            3 => Some(DollyCategory::CutoutLongsideRight),
            4 => Some(DollyCategory::CutoutShortside),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DollyCategory::Unknown => "No Type",
            DollyCategory::Standard => "Regular",
            DollyCategory::CutoutLongsideLeft => "Cutout Longside LH",
            DollyCategory::CutoutLongsideRight => "Cutout Longside RH",
            DollyCategory::CutoutShortside => "Cutout Shortside",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.name() == name)
    }
}

impl fmt::Display for DollyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
