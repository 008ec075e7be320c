//! Entity snapshots published to the situational-awareness platform.
//!
//! Snapshots are rebuilt from scratch every cycle. The identifier depends
//! only on the airport code, so repeated publishes update the same logical
//! entity instead of creating new ones.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::airport::AirportRecord;
use crate::category::{Disposition, FlightCategory};
use crate::health::{self, HealthEvaluation, HealthState};
use crate::observation::Observation;

pub const DEFAULT_INTEGRATION_NAME: &str = "metar_weather_integration";
pub const DATA_TYPE: &str = "aviation_weather";

/// Stable entity identifier for an airport.
pub fn entity_id(icao: &str) -> String {
    format!("weather_{}", icao.trim().to_ascii_uppercase())
}

/// Health of one monitored parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub id: String,
    pub name: String,
    pub state: HealthState,
    pub message: String,
}

impl ComponentHealth {
    pub fn new(id: impl Into<String>, name: impl Into<String>, eval: HealthEvaluation) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: eval.state,
            message: eval.message,
        }
    }
}

/// Evaluate the four standard health components for an observation.
pub fn evaluate_components(observation: &Observation, category: FlightCategory) -> Vec<ComponentHealth> {
    let icao = observation.icao.as_str();
    vec![
        ComponentHealth::new(
            format!("{}_flight_condition", icao),
            "Flight Condition",
            health::flight_condition_health(category),
        ),
        ComponentHealth::new(
            format!("{}_temperature", icao),
            "Temperature",
            health::temperature_health(observation.temperature_c),
        ),
        ComponentHealth::new(
            format!("{}_wind_speed", icao),
            "Wind Speed",
            health::wind_speed_health(observation.wind_speed_kt()),
        ),
        ComponentHealth::new(
            format!("{}_visibility", icao),
            "Visibility",
            health::visibility_health(observation.visibility_sm),
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Raw report text carried along with the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPayload {
    pub raw_metar: String,
    pub raw_taf: Option<String>,
    pub sky_conditions: String,
    pub observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub integration_name: String,
    pub data_type: String,
    pub source_update_time: DateTime<Utc>,
}

/// Immutable entity representation of one airport for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    pub icao: String,
    /// Display alias, "<name> (<ICAO>)"
    pub name: String,
    /// "<name> (<ICAO>) - <category>"
    pub description: String,
    pub location: GeoPosition,
    pub category: FlightCategory,
    pub disposition: Disposition,
    pub components: Vec<ComponentHealth>,
    /// Most severe component state
    pub health: HealthState,
    pub payload: EntityPayload,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl EntitySnapshot {
    pub fn ttl(&self) -> Duration {
        self.expires_at - self.created_at
    }

    /// Move creation to `at`, keeping the time-to-live.
    pub fn restamp(&mut self, at: DateTime<Utc>) {
        let ttl = self.ttl();
        self.created_at = at;
        self.expires_at = at + ttl;
    }
}

/// Builds entity snapshots with a fixed time-to-live.
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    ttl: Duration,
    integration_name: String,
}

impl EntityBuilder {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            integration_name: DEFAULT_INTEGRATION_NAME.to_string(),
        }
    }

    pub fn with_integration_name(mut self, name: impl Into<String>) -> Self {
        self.integration_name = name.into();
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Compose a snapshot. Never fails; absent observation fields only
    /// degrade the health components and payload.
    pub fn build(
        &self,
        airport: &AirportRecord,
        observation: &Observation,
        category: FlightCategory,
        components: Vec<ComponentHealth>,
        now: DateTime<Utc>,
    ) -> EntitySnapshot {
        let name = format!("{} ({})", airport.name, airport.icao);
        let description = format!("{} - {}", name, category);
        let aggregate = health::aggregate(components.iter().map(|c| c.state));

        EntitySnapshot {
            entity_id: entity_id(&airport.icao),
            icao: airport.icao.clone(),
            name,
            description,
            location: GeoPosition {
                latitude: airport.latitude,
                longitude: airport.longitude,
            },
            category,
            disposition: category.disposition(),
            components,
            health: aggregate,
            payload: EntityPayload {
                raw_metar: observation.raw_text.clone(),
                raw_taf: observation.forecast.as_ref().map(|f| f.raw_text.clone()),
                sky_conditions: observation.sky_summary(),
                observed_at: observation.observed_at,
            },
            provenance: Provenance {
                integration_name: self.integration_name.clone(),
                data_type: DATA_TYPE.to_string(),
                source_update_time: observation.observed_at.unwrap_or(now),
            },
            created_at: now,
            expires_at: now + self.ttl,
        }
    }

    /// Classify, evaluate and build in one step.
    pub fn build_from_observation(
        &self,
        airport: &AirportRecord,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> EntitySnapshot {
        let category = observation.flight_category();
        let components = evaluate_components(observation, category);
        self.build(airport, observation, category, components, now)
    }
}
