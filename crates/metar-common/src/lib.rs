//! Domain types shared by the METAR weather publisher.
//!
//! Everything here is pure: the airport catalog, METAR decoding,
//! flight-category classification, parameter health evaluation and entity
//! snapshot construction. Network I/O lives in the `metar-publisher` service.

pub mod airport;
pub mod category;
pub mod entity;
pub mod error;
pub mod health;
pub mod metar;
pub mod observation;

pub use airport::{normalize_icao, AirportCatalog, AirportFilter, AirportRecord};
pub use category::{classify, Disposition, FlightCategory};
pub use entity::{
    entity_id, evaluate_components, ComponentHealth, EntityBuilder, EntityPayload, EntitySnapshot,
    GeoPosition, Provenance,
};
pub use error::{MetarError, MetarResult};
pub use health::{HealthEvaluation, HealthState};
pub use metar::DecodedMetar;
pub use observation::{CloudCover, CloudLayer, Forecast, Observation, Wind, WindDirection};
