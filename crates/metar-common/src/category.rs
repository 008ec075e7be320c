//! Flight category classification from ceiling and visibility.
//!
//! | Category | Ceiling (ft AGL) | Visibility (sm) |
//! |----------|------------------|-----------------|
//! | LIFR     | < 500            | < 1             |
//! | IFR      | 500 - 999        | 1 to < 3        |
//! | MVFR     | 1000 - 3000      | 3 - 5           |
//! | VFR      | > 3000 / none    | > 5 / none      |
//!
//! The two parameters are classified independently and the more severe
//! result wins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MetarError;

/// Flight category, ordered by severity (`Vfr` least severe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlightCategory {
    Vfr,
    Mvfr,
    Ifr,
    Lifr,
}

impl FlightCategory {
    pub const ALL: [FlightCategory; 4] = [
        FlightCategory::Vfr,
        FlightCategory::Mvfr,
        FlightCategory::Ifr,
        FlightCategory::Lifr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vfr => "VFR",
            Self::Mvfr => "MVFR",
            Self::Ifr => "IFR",
            Self::Lifr => "LIFR",
        }
    }

    /// Category implied by the ceiling alone. `None` is unlimited.
    pub fn from_ceiling(ceiling_ft: Option<u32>) -> Self {
        match ceiling_ft {
            None => Self::Vfr,
            Some(ft) if ft < 500 => Self::Lifr,
            Some(ft) if ft < 1000 => Self::Ifr,
            Some(ft) if ft <= 3000 => Self::Mvfr,
            Some(_) => Self::Vfr,
        }
    }

    /// Category implied by the visibility alone. `None`, NaN and negative
    /// values are treated as unrestricted.
    pub fn from_visibility(visibility_sm: Option<f64>) -> Self {
        match visibility_sm.filter(|v| v.is_finite() && *v >= 0.0) {
            None => Self::Vfr,
            Some(sm) if sm < 1.0 => Self::Lifr,
            Some(sm) if sm < 3.0 => Self::Ifr,
            Some(sm) if sm <= 5.0 => Self::Mvfr,
            Some(_) => Self::Vfr,
        }
    }

    /// Platform disposition used as a color-coded severity tag.
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Vfr => Disposition::AssumedFriendly,
            Self::Mvfr => Disposition::Suspicious,
            Self::Ifr | Self::Lifr => Disposition::Hostile,
        }
    }
}

/// Classify flight conditions, taking the worse of ceiling and visibility.
pub fn classify(ceiling_ft: Option<u32>, visibility_sm: Option<f64>) -> FlightCategory {
    FlightCategory::from_ceiling(ceiling_ft).max(FlightCategory::from_visibility(visibility_sm))
}

impl fmt::Display for FlightCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightCategory {
    type Err = MetarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VFR" => Ok(Self::Vfr),
            "MVFR" => Ok(Self::Mvfr),
            "IFR" => Ok(Self::Ifr),
            "LIFR" => Ok(Self::Lifr),
            _ => Err(MetarError::UnknownCategory(s.to_string())),
        }
    }
}

/// Entity disposition tag on the situational-awareness platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Disposition {
    #[serde(rename = "DISPOSITION_ASSUMED_FRIENDLY")]
    AssumedFriendly,
    #[serde(rename = "DISPOSITION_SUSPICIOUS")]
    Suspicious,
    #[serde(rename = "DISPOSITION_HOSTILE")]
    Hostile,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssumedFriendly => "DISPOSITION_ASSUMED_FRIENDLY",
            Self::Suspicious => "DISPOSITION_SUSPICIOUS",
            Self::Hostile => "DISPOSITION_HOSTILE",
        }
    }
}
