//! Health evaluation for individual weather parameters.
//!
//! Every evaluator is total: absent or non-finite inputs map to a fixed
//! fallback state instead of failing.
//!
//! | Parameter   | Healthy        | Warn                          | Error            |
//! |-------------|----------------|-------------------------------|------------------|
//! | Category    | VFR            | MVFR                          | IFR, LIFR        |
//! | Temperature | -10 to 35 °C   | -20 to <-10, >35 to 40 °C     | < -20, > 40 °C   |
//! | Wind speed  | <= 15 kt       | 16 - 30 kt                    | > 30 kt          |
//! | Visibility  | > 5 sm         | 1 - 5 sm                      | < 1 sm           |
//!
//! Absent temperature or wind reports are `Warn`. Absent visibility is
//! `Healthy`, matching the classifier's unrestricted-visibility default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::category::FlightCategory;
use crate::error::MetarError;

/// Three-level health state, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    Healthy,
    Warn,
    Error,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthState {
    type Err = MetarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HEALTHY" => Ok(Self::Healthy),
            "WARN" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            _ => Err(MetarError::UnknownHealthState(s.to_string())),
        }
    }
}

/// A health state together with its human-readable explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEvaluation {
    pub state: HealthState,
    pub message: String,
}

impl HealthEvaluation {
    fn new(state: HealthState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }
}

/// Most severe state among `states`; `Healthy` when there are none.
pub fn aggregate<I>(states: I) -> HealthState
where
    I: IntoIterator<Item = HealthState>,
{
    states.into_iter().max().unwrap_or(HealthState::Healthy)
}

pub fn flight_condition_health(category: FlightCategory) -> HealthEvaluation {
    let state = match category {
        FlightCategory::Vfr => HealthState::Healthy,
        FlightCategory::Mvfr => HealthState::Warn,
        FlightCategory::Ifr | FlightCategory::Lifr => HealthState::Error,
    };
    HealthEvaluation::new(state, format!("Current flight condition: {}", category))
}

pub fn temperature_health(temperature_c: Option<f64>) -> HealthEvaluation {
    let Some(temp) = temperature_c.filter(|t| t.is_finite()) else {
        return HealthEvaluation::new(HealthState::Warn, "Temperature not reported");
    };

    let state = if (-10.0..=35.0).contains(&temp) {
        HealthState::Healthy
    } else if (-20.0..=40.0).contains(&temp) {
        HealthState::Warn
    } else {
        HealthState::Error
    };

    HealthEvaluation::new(
        state,
        format!(
            "Current temperature: {:.1}°C ({:.1}°F)",
            temp,
            celsius_to_fahrenheit(temp)
        ),
    )
}

pub fn wind_speed_health(wind_speed_kt: Option<u32>) -> HealthEvaluation {
    let Some(speed) = wind_speed_kt else {
        return HealthEvaluation::new(HealthState::Warn, "Wind speed not reported");
    };

    let state = match speed {
        0..=15 => HealthState::Healthy,
        16..=30 => HealthState::Warn,
        _ => HealthState::Error,
    };

    HealthEvaluation::new(state, format!("Current wind speed: {} knots", speed))
}

pub fn visibility_health(visibility_sm: Option<f64>) -> HealthEvaluation {
    let Some(vis) = visibility_sm.filter(|v| v.is_finite() && *v >= 0.0) else {
        return HealthEvaluation::new(
            HealthState::Healthy,
            "Visibility not reported, assuming unrestricted",
        );
    };

    let state = if vis > 5.0 {
        HealthState::Healthy
    } else if vis >= 1.0 {
        HealthState::Warn
    } else {
        HealthState::Error
    };

    HealthEvaluation::new(state, format!("Current visibility: {} miles", vis))
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}
