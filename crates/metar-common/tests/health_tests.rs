//! Boundary tests for parameter health evaluation.

use metar_common::category::FlightCategory;
use metar_common::health::{
    flight_condition_health, temperature_health, visibility_health, wind_speed_health, HealthState,
};

// ============================================================================
// Flight condition
// ============================================================================

#[test]
fn test_flight_condition_health() {
    assert_eq!(flight_condition_health(FlightCategory::Vfr).state, HealthState::Healthy);
    assert_eq!(flight_condition_health(FlightCategory::Mvfr).state, HealthState::Warn);
    assert_eq!(flight_condition_health(FlightCategory::Ifr).state, HealthState::Error);
    assert_eq!(flight_condition_health(FlightCategory::Lifr).state, HealthState::Error);
    assert_eq!(
        flight_condition_health(FlightCategory::Ifr).message,
        "Current flight condition: IFR"
    );
}

// ============================================================================
// Temperature
// ============================================================================

#[test]
fn test_temperature_boundaries() {
    let state = |t: f64| temperature_health(Some(t)).state;

    assert_eq!(state(-20.1), HealthState::Error);
    assert_eq!(state(-20.0), HealthState::Warn);
    assert_eq!(state(-10.1), HealthState::Warn);
    assert_eq!(state(-10.0), HealthState::Healthy);
    assert_eq!(state(20.0), HealthState::Healthy);
    assert_eq!(state(35.0), HealthState::Healthy);
    assert_eq!(state(35.1), HealthState::Warn);
    assert_eq!(state(40.0), HealthState::Warn);
    assert_eq!(state(40.1), HealthState::Error);
}

#[test]
fn test_temperature_absent() {
    let eval = temperature_health(None);
    assert_eq!(eval.state, HealthState::Warn);
    assert_eq!(eval.message, "Temperature not reported");
}

// ============================================================================
// Wind speed
// ============================================================================

#[test]
fn test_wind_boundaries() {
    let state = |kt: u32| wind_speed_health(Some(kt)).state;

    assert_eq!(state(0), HealthState::Healthy);
    assert_eq!(state(15), HealthState::Healthy);
    assert_eq!(state(16), HealthState::Warn);
    assert_eq!(state(30), HealthState::Warn);
    assert_eq!(state(31), HealthState::Error);
    assert_eq!(state(u32::MAX), HealthState::Error);
}

#[test]
fn test_wind_absent() {
    assert_eq!(wind_speed_health(None).state, HealthState::Warn);
}

#[test]
fn test_wind_message() {
    assert_eq!(wind_speed_health(Some(12)).message, "Current wind speed: 12 knots");
}

// ============================================================================
// Visibility
// ============================================================================

#[test]
fn test_visibility_boundaries() {
    let state = |sm: f64| visibility_health(Some(sm)).state;

    assert_eq!(state(0.0), HealthState::Error);
    assert_eq!(state(0.99), HealthState::Error);
    assert_eq!(state(1.0), HealthState::Warn);
    assert_eq!(state(5.0), HealthState::Warn);
    assert_eq!(state(5.01), HealthState::Healthy);
    assert_eq!(state(10.0), HealthState::Healthy);
}

#[test]
fn test_visibility_absent_is_unrestricted() {
    assert_eq!(visibility_health(None).state, HealthState::Healthy);
    assert_eq!(visibility_health(Some(-1.0)).state, HealthState::Healthy);
}
