//! Error types for the METAR domain crate.

use thiserror::Error;

/// Result type alias using MetarError.
pub type MetarResult<T> = Result<T, MetarError>;

/// Errors raised when parsing domain values from text.
///
/// Classification, health evaluation and entity construction are total and
/// never produce these; they only come from `FromStr` implementations and
/// identifier validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetarError {
    #[error("Invalid ICAO identifier: {0}")]
    InvalidIcao(String),

    #[error("Unknown flight category: {0}")]
    UnknownCategory(String),

    #[error("Unknown health state: {0}")]
    UnknownHealthState(String),

    #[error("Unknown airport: {0}")]
    UnknownAirport(String),
}
