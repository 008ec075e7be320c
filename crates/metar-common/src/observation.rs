//! Weather observations and forecasts for a single airport.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::{classify, FlightCategory};
use crate::metar::{self, DecodedMetar};

/// Sky cover amount of a cloud layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloudCover {
    Few,
    Sct,
    Bkn,
    Ovc,
}

impl CloudCover {
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "FEW" => Some(Self::Few),
            "SCT" => Some(Self::Sct),
            "BKN" => Some(Self::Bkn),
            "OVC" => Some(Self::Ovc),
            _ => None,
        }
    }

    /// Broken and overcast layers constitute a ceiling.
    pub fn is_ceiling(&self) -> bool {
        matches!(self, Self::Bkn | Self::Ovc)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Few => "FEW",
            Self::Sct => "SCT",
            Self::Bkn => "BKN",
            Self::Ovc => "OVC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudLayer {
    pub cover: CloudCover,
    /// Layer base in feet AGL, if reported
    pub base_ft: Option<u32>,
}

impl fmt::Display for CloudLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.base_ft {
            Some(base) => write!(f, "{} {}ft", self.cover.as_str(), base),
            None => write!(f, "{} unknown", self.cover.as_str()),
        }
    }
}

/// Lowest broken or overcast layer base.
pub fn ceiling_from_layers(layers: &[CloudLayer]) -> Option<u32> {
    layers
        .iter()
        .filter(|layer| layer.cover.is_ceiling())
        .filter_map(|layer| layer.base_ft)
        .min()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindDirection {
    Degrees(u16),
    Variable,
}

impl fmt::Display for WindDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Degrees(deg) => write!(f, "{:03}°", deg),
            Self::Variable => f.write_str("VRB"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wind {
    pub direction: Option<WindDirection>,
    pub speed_kt: u32,
    pub gust_kt: Option<u32>,
}

/// Terminal aerodrome forecast attached to an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub raw_text: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl Forecast {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            issued_at: None,
            valid_from: None,
            valid_to: None,
        }
    }
}

/// Latest surface observation for one airport.
///
/// Every measured field is optional. Absent fields are a normal, degraded
/// state and never prevent classification or entity construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub icao: String,
    pub observed_at: Option<DateTime<Utc>>,
    pub raw_text: String,
    /// Lowest broken/overcast base in feet AGL; `None` means no ceiling
    pub ceiling_ft: Option<u32>,
    /// Vertical visibility into an obscuration (METAR `VV` group)
    pub vertical_visibility_ft: Option<u32>,
    pub visibility_sm: Option<f64>,
    pub temperature_c: Option<f64>,
    pub dewpoint_c: Option<f64>,
    pub wind: Option<Wind>,
    pub altimeter_hpa: Option<f64>,
    #[serde(default)]
    pub cloud_layers: Vec<CloudLayer>,
    pub forecast: Option<Forecast>,
}

impl Observation {
    /// An observation with every measured field absent.
    pub fn new(icao: impl Into<String>) -> Self {
        Self {
            icao: icao.into().to_ascii_uppercase(),
            observed_at: None,
            raw_text: String::new(),
            ceiling_ft: None,
            vertical_visibility_ft: None,
            visibility_sm: None,
            temperature_c: None,
            dewpoint_c: None,
            wind: None,
            altimeter_hpa: None,
            cloud_layers: Vec::new(),
            forecast: None,
        }
    }

    /// Build an observation by decoding the raw METAR text.
    pub fn from_raw(icao: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let mut observation = Self::new(icao);
        observation.raw_text = raw_text.into();
        let decoded = metar::decode(&observation.raw_text);
        observation.fill_missing_from(&decoded);
        observation
    }

    /// Copy every field that is absent here but present in `decoded`.
    pub fn fill_missing_from(&mut self, decoded: &DecodedMetar) {
        if self.cloud_layers.is_empty() && !decoded.cloud_layers.is_empty() {
            self.cloud_layers = decoded.cloud_layers.clone();
        }
        if self.ceiling_ft.is_none() {
            self.ceiling_ft = ceiling_from_layers(&self.cloud_layers);
        }
        self.vertical_visibility_ft = self.vertical_visibility_ft.or(decoded.vertical_visibility_ft);
        self.visibility_sm = self.visibility_sm.or(decoded.visibility_sm);
        self.temperature_c = self.temperature_c.or(decoded.temperature_c);
        self.dewpoint_c = self.dewpoint_c.or(decoded.dewpoint_c);
        self.wind = self.wind.or(decoded.wind);
        self.altimeter_hpa = self.altimeter_hpa.or(decoded.altimeter_hpa);
    }

    /// Ceiling used for classification: the reported ceiling, or the
    /// vertical visibility when the sky is obscured.
    pub fn effective_ceiling(&self) -> Option<u32> {
        self.ceiling_ft.or(self.vertical_visibility_ft)
    }

    pub fn flight_category(&self) -> FlightCategory {
        classify(self.effective_ceiling(), self.visibility_sm)
    }

    pub fn wind_speed_kt(&self) -> Option<u32> {
        self.wind.map(|wind| wind.speed_kt)
    }

    /// True when any field used for health evaluation is missing.
    pub fn is_partial(&self) -> bool {
        self.visibility_sm.is_none() || self.temperature_c.is_none() || self.wind.is_none()
    }

    /// Human-readable sky condition, e.g. "BKN 1200ft, OVC 3000ft".
    pub fn sky_summary(&self) -> String {
        if let Some(vv) = self.vertical_visibility_ft {
            return format!("VV {}ft", vv);
        }
        if self.cloud_layers.is_empty() {
            return "Clear".to_string();
        }
        self.cloud_layers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
