//! Static airport reference data and include/exclude filtering.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{MetarError, MetarResult};

/// Static metadata for a monitored airport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportRecord {
    /// ICAO identifier (e.g. "KBOS")
    pub icao: String,
    /// Display name
    pub name: String,
    pub city: String,
    /// State or region code (e.g. "MA")
    pub region: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl AirportRecord {
    pub fn new(
        icao: impl Into<String>,
        name: impl Into<String>,
        city: impl Into<String>,
        region: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            icao: icao.into().to_ascii_uppercase(),
            name: name.into(),
            city: city.into(),
            region: region.into(),
            latitude,
            longitude,
        }
    }
}

// (icao, name, city, state, lat, lon)
const NEW_ENGLAND: &[(&str, &str, &str, &str, f64, f64)] = &[
    // Massachusetts
    ("KBOS", "General Edward Lawrence Logan International Airport", "Boston", "MA", 42.36298, -71.00684),
    ("KORH", "Worcester Regional Airport", "Worcester", "MA", 42.26734, -71.87571),
    ("KBED", "Laurence G. Hanscom Field", "Bedford", "MA", 42.47000, -71.28900),
    ("KACK", "Nantucket Memorial Airport", "Nantucket", "MA", 41.25305, -70.06018),
    ("KMVY", "Martha's Vineyard Airport", "Martha's Vineyard", "MA", 41.39131, -70.61431),
    ("KHYA", "Barnstable Municipal Airport", "Hyannis", "MA", 41.66934, -70.28036),
    // New Hampshire
    ("KMHT", "Manchester-Boston Regional Airport", "Manchester", "NH", 42.93260, -71.43570),
    ("KLEB", "Lebanon Municipal Airport", "Lebanon", "NH", 43.62608, -72.30417),
    ("KCON", "Concord Municipal Airport", "Concord", "NH", 43.20272, -71.50228),
    // Connecticut
    ("KBDL", "Bradley International Airport", "Hartford/Windsor Locks", "CT", 41.93887, -72.68323),
    ("KHVN", "Tweed New Haven Airport", "New Haven", "CT", 41.26364, -72.88679),
    ("KGON", "Groton-New London Airport", "Groton/New London", "CT", 41.33011, -72.04517),
    // Rhode Island
    ("KPVD", "Theodore Francis Green Airport", "Providence/Warwick", "RI", 41.73239, -71.42056),
    // Vermont
    ("KBTV", "Patrick Leahy Burlington International Airport", "Burlington", "VT", 44.47194, -73.15328),
    ("KMPV", "Edward F. Knapp State Airport", "Montpelier", "VT", 44.20350, -72.56233),
    // Maine
    ("KBGR", "Bangor International Airport", "Bangor", "ME", 44.80744, -68.82814),
    ("KPWM", "Portland International Jetport", "Portland", "ME", 43.64617, -70.30875),
    ("KAUG", "Augusta State Airport", "Augusta", "ME", 44.32061, -69.79733),
    ("KBHB", "Hancock County-Bar Harbor Airport", "Bar Harbor", "ME", 44.44975, -68.36158),
];

/// Normalize and validate an ICAO identifier.
///
/// Identifiers are four ASCII alphanumerics; the result is upper-cased.
pub fn normalize_icao(code: &str) -> MetarResult<String> {
    let trimmed = code.trim();
    if trimmed.len() == 4 && trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(trimmed.to_ascii_uppercase())
    } else {
        Err(MetarError::InvalidIcao(code.to_string()))
    }
}

/// Immutable lookup of ICAO identifier to airport metadata.
///
/// Iteration order is sorted by identifier so cycles and reports are stable.
#[derive(Debug, Clone, Default)]
pub struct AirportCatalog {
    airports: BTreeMap<String, AirportRecord>,
}

impl AirportCatalog {
    pub fn new(records: impl IntoIterator<Item = AirportRecord>) -> Self {
        let airports = records
            .into_iter()
            .map(|record| (record.icao.clone(), record))
            .collect();
        Self { airports }
    }

    /// The built-in New England catalog.
    pub fn new_england() -> Self {
        Self::new(NEW_ENGLAND.iter().map(|&(icao, name, city, region, lat, lon)| {
            AirportRecord::new(icao, name, city, region, lat, lon)
        }))
    }

    /// Look up an airport. Matching is case-insensitive.
    pub fn get(&self, icao: &str) -> Option<&AirportRecord> {
        self.airports.get(&icao.trim().to_ascii_uppercase())
    }

    /// Like [`get`](Self::get) but reports unknown identifiers as an error.
    pub fn require(&self, icao: &str) -> MetarResult<&AirportRecord> {
        self.get(icao)
            .ok_or_else(|| MetarError::UnknownAirport(icao.to_string()))
    }

    pub fn contains(&self, icao: &str) -> bool {
        self.get(icao).is_some()
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AirportRecord> {
        self.airports.values()
    }

    /// All identifiers in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.airports.keys().cloned().collect()
    }

    /// Return a new catalog restricted by `filter`.
    pub fn filtered(&self, filter: &AirportFilter) -> AirportCatalog {
        Self {
            airports: self
                .airports
                .iter()
                .filter(|(icao, _)| filter.allows(icao))
                .map(|(icao, record)| (icao.clone(), record.clone()))
                .collect(),
        }
    }

    /// Identifiers referenced by `filter` that are not in this catalog.
    pub fn unknown_codes(&self, filter: &AirportFilter) -> Vec<String> {
        filter
            .referenced()
            .filter(|code| !self.airports.contains_key(*code))
            .cloned()
            .collect()
    }
}

/// Include/exclude selection over the catalog.
///
/// An empty include list selects every airport. Exclusions always win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AirportFilter {
    include_only: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl AirportFilter {
    pub fn new<I, E, S, T>(include_only: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            include_only: normalize_set(include_only),
            exclude: normalize_set(exclude),
        }
    }

    pub fn allows(&self, icao: &str) -> bool {
        let icao = icao.trim().to_ascii_uppercase();
        if self.exclude.contains(&icao) {
            return false;
        }
        self.include_only.is_empty() || self.include_only.contains(&icao)
    }

    pub fn is_empty(&self) -> bool {
        self.include_only.is_empty() && self.exclude.is_empty()
    }

    fn referenced(&self) -> impl Iterator<Item = &String> {
        self.include_only.iter().chain(self.exclude.iter())
    }
}

fn normalize_set<I, S>(codes: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    codes
        .into_iter()
        .map(|code| code.as_ref().trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty())
        .collect()
}
