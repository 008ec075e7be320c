//! Wire representation of an entity for the Lattice entities REST API.

use chrono::{DateTime, Utc};
use metar_common::{ComponentHealth, EntitySnapshot, HealthState};
use serde::Serialize;

const ENVIRONMENT_SURFACE: &str = "ENVIRONMENT_SURFACE";
const TEMPLATE_SENSOR_POINT_OF_INTEREST: &str = "TEMPLATE_SENSOR_POINT_OF_INTEREST";
const PLATFORM_TYPE: &str = "Weather_Station";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatticeEntity {
    pub entity_id: String,
    pub description: String,
    pub is_live: bool,
    pub created_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    pub aliases: Aliases,
    pub location: Location,
    pub mil_view: MilView,
    pub ontology: Ontology,
    pub health: Health,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize)]
pub struct Aliases {
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub position: Position,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude_degrees: f64,
    pub longitude_degrees: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MilView {
    pub disposition: &'static str,
    pub environment: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ontology {
    pub template: &'static str,
    pub platform_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub health_status: &'static str,
    pub components: Vec<Component>,
    pub update_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub health: &'static str,
    pub messages: Vec<ComponentMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentMessage {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub integration_name: String,
    pub data_type: String,
    pub source_update_time: DateTime<Utc>,
    pub source_description: String,
}

pub fn health_status(state: HealthState) -> &'static str {
    match state {
        HealthState::Healthy => "HEALTH_STATUS_HEALTHY",
        HealthState::Warn => "HEALTH_STATUS_WARN",
        HealthState::Error => "HEALTH_STATUS_FAIL",
    }
}

impl From<&ComponentHealth> for Component {
    fn from(component: &ComponentHealth) -> Self {
        let status = health_status(component.state);
        Self {
            id: component.id.clone(),
            name: component.name.clone(),
            health: status,
            messages: vec![ComponentMessage {
                status,
                message: component.message.clone(),
            }],
        }
    }
}

impl From<&EntitySnapshot> for LatticeEntity {
    fn from(snapshot: &EntitySnapshot) -> Self {
        Self {
            entity_id: snapshot.entity_id.clone(),
            description: snapshot.description.clone(),
            is_live: true,
            created_time: snapshot.created_at,
            expiry_time: snapshot.expires_at,
            aliases: Aliases {
                name: snapshot.name.clone(),
            },
            location: Location {
                position: Position {
                    latitude_degrees: snapshot.location.latitude,
                    longitude_degrees: snapshot.location.longitude,
                },
            },
            mil_view: MilView {
                disposition: snapshot.disposition.as_str(),
                environment: ENVIRONMENT_SURFACE,
            },
            ontology: Ontology {
                template: TEMPLATE_SENSOR_POINT_OF_INTEREST,
                platform_type: PLATFORM_TYPE,
            },
            health: Health {
                health_status: health_status(snapshot.health),
                components: snapshot.components.iter().map(Component::from).collect(),
                update_time: snapshot.created_at,
            },
            provenance: Provenance {
                integration_name: snapshot.provenance.integration_name.clone(),
                data_type: snapshot.provenance.data_type.clone(),
                source_update_time: snapshot.provenance.source_update_time,
                source_description: source_description(snapshot),
            },
        }
    }
}

/// Raw report text and sky summary, carried as the provenance description.
fn source_description(snapshot: &EntitySnapshot) -> String {
    let payload = &snapshot.payload;
    let mut parts = Vec::with_capacity(3);
    if !payload.raw_metar.is_empty() {
        parts.push(format!("METAR: {}", payload.raw_metar));
    }
    if let Some(taf) = &payload.raw_taf {
        parts.push(format!("TAF: {}", taf));
    }
    parts.push(format!("Sky: {}", payload.sky_conditions));
    parts.join(" | ")
}
