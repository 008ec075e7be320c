//! Tolerant decoder for raw METAR report text.
//!
//! Decodes the groups needed for classification and health evaluation:
//! wind, prevailing visibility, sky condition, temperature/dewpoint and
//! altimeter. Unrecognized groups are skipped and decoding stops at `RMK`,
//! so a malformed report yields a partially filled [`DecodedMetar`] rather
//! than an error.

use crate::observation::{ceiling_from_layers, CloudCover, CloudLayer, Wind, WindDirection};

const METERS_PER_STATUTE_MILE: f64 = 1609.344;
const KNOTS_PER_MPS: f64 = 1.943_844;
const HPA_PER_INHG: f64 = 33.863_89;

/// Fields decoded from a METAR report body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedMetar {
    pub station: Option<String>,
    pub wind: Option<Wind>,
    pub visibility_sm: Option<f64>,
    pub cloud_layers: Vec<CloudLayer>,
    pub vertical_visibility_ft: Option<u32>,
    /// CLR, SKC, NSC, NCD or CAVOK was reported
    pub sky_clear: bool,
    pub temperature_c: Option<f64>,
    pub dewpoint_c: Option<f64>,
    pub altimeter_hpa: Option<f64>,
}

impl DecodedMetar {
    pub fn ceiling_ft(&self) -> Option<u32> {
        ceiling_from_layers(&self.cloud_layers)
    }
}

/// Decode a raw METAR report.
pub fn decode(raw: &str) -> DecodedMetar {
    let mut decoded = DecodedMetar::default();
    let tokens: Vec<&str> = raw.split_whitespace().collect();

    let mut leading = true;
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        i += 1;

        if !token.is_ascii() {
            continue;
        }

        match token {
            "RMK" => break,
            "METAR" | "SPECI" | "AUTO" | "COR" | "NIL" => continue,
            "CLR" | "SKC" | "NSC" | "NCD" => {
                decoded.sky_clear = true;
                continue;
            }
            "CAVOK" => {
                decoded.sky_clear = true;
                decoded.visibility_sm.get_or_insert(10.0);
                continue;
            }
            _ => {}
        }

        // Only the first group after the report type can be the station
        if std::mem::replace(&mut leading, false) && is_station(token) {
            decoded.station = Some(token.to_string());
            continue;
        }

        if decoded.wind.is_none() {
            if let Some(wind) = parse_wind(token) {
                decoded.wind = Some(wind);
                continue;
            }
        }

        if decoded.visibility_sm.is_none() {
            // "1 1/2SM": whole miles and fraction are separate tokens
            if token.len() <= 2 && token.chars().all(|c| c.is_ascii_digit()) {
                if let Some(next) = tokens.get(i) {
                    if let Some(fraction) = parse_visibility_sm(next) {
                        if let Ok(whole) = token.parse::<f64>() {
                            decoded.visibility_sm = Some(whole + fraction);
                            i += 1;
                            continue;
                        }
                    }
                }
            }
            if let Some(vis) = parse_visibility_sm(token) {
                decoded.visibility_sm = Some(vis);
                continue;
            }
            if let Some(vis) = parse_visibility_meters(token) {
                decoded.visibility_sm = Some(vis);
                continue;
            }
        }

        if let Some(layer) = parse_cloud_layer(token) {
            decoded.cloud_layers.push(layer);
            continue;
        }

        if let Some(vv) = token.strip_prefix("VV") {
            decoded.vertical_visibility_ft = parse_height(vv);
            continue;
        }

        if decoded.temperature_c.is_none() {
            if let Some((temp, dew)) = parse_temperature(token) {
                decoded.temperature_c = Some(temp);
                decoded.dewpoint_c = dew;
                continue;
            }
        }

        if decoded.altimeter_hpa.is_none() {
            if let Some(hpa) = parse_altimeter(token) {
                decoded.altimeter_hpa = Some(hpa);
            }
        }
    }

    decoded
}

fn is_station(token: &str) -> bool {
    token.len() == 4
        && token.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && token.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// `dddssKT`, `dddssGggKT`, `VRBssKT`, or the same in `MPS`.
fn parse_wind(token: &str) -> Option<Wind> {
    let (body, factor) = if let Some(body) = token.strip_suffix("KT") {
        (body, 1.0)
    } else if let Some(body) = token.strip_suffix("MPS") {
        (body, KNOTS_PER_MPS)
    } else {
        return None;
    };

    if body.len() < 5 {
        return None;
    }

    let (dir, rest) = body.split_at(3);
    let direction = if dir == "VRB" {
        WindDirection::Variable
    } else if dir.chars().all(|c| c.is_ascii_digit()) {
        WindDirection::Degrees(dir.parse().ok()?)
    } else {
        return None;
    };

    let (speed, gust) = match rest.split_once('G') {
        Some((speed, gust)) => (speed, Some(gust)),
        None => (rest, None),
    };

    let convert = |value: &str| -> Option<u32> {
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let raw: u32 = value.parse().ok()?;
        Some((raw as f64 * factor).round() as u32)
    };

    let speed_kt = convert(speed)?;
    let gust_kt = match gust {
        Some(gust) => Some(convert(gust)?),
        None => None,
    };

    Some(Wind {
        direction: Some(direction),
        speed_kt,
        gust_kt,
    })
}

/// `10SM`, `1/2SM`, `M1/4SM`, `P6SM`.
fn parse_visibility_sm(token: &str) -> Option<f64> {
    let body = token.strip_suffix("SM")?;
    let body = body
        .strip_prefix('M')
        .or_else(|| body.strip_prefix('P'))
        .unwrap_or(body);
    parse_number_or_fraction(body)
}

/// Four-digit metric visibility in meters, `9999` meaning 10 km or more.
fn parse_visibility_meters(token: &str) -> Option<f64> {
    if token.len() != 4 || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let meters: f64 = token.parse().ok()?;
    let meters = if meters >= 9999.0 { 10_000.0 } else { meters };
    Some(meters / METERS_PER_STATUTE_MILE)
}

fn parse_number_or_fraction(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den > 0.0).then(|| num / den)
        }
        None => s.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

/// `BKN012`, `OVC030CB`, `SCT///`.
fn parse_cloud_layer(token: &str) -> Option<CloudLayer> {
    if token.len() < 6 {
        return None;
    }
    let (code, rest) = token.split_at(3);
    let cover = CloudCover::parse(code)?;
    let height = &rest[..3];
    let base_ft = if height == "///" {
        None
    } else {
        Some(parse_height(height)?)
    };
    Some(CloudLayer { cover, base_ft })
}

/// Three-digit height in hundreds of feet.
fn parse_height(s: &str) -> Option<u32> {
    if s.len() != 3 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse::<u32>().ok().map(|h| h * 100)
}

/// `12/08`, `M05/M10`, `04/`.
fn parse_temperature(token: &str) -> Option<(f64, Option<f64>)> {
    let (temp, dew) = token.split_once('/')?;
    let temp = parse_signed_temp(temp)?;
    let dew = if dew.is_empty() {
        None
    } else {
        Some(parse_signed_temp(dew)?)
    };
    Some((temp, dew))
}

fn parse_signed_temp(s: &str) -> Option<f64> {
    let (negative, digits) = match s.strip_prefix('M') {
        Some(digits) => (true, digits),
        None => (false, s),
    };
    if digits.len() != 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: f64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// `A2992` (inches of mercury) or `Q1013` (hectopascals).
fn parse_altimeter(token: &str) -> Option<f64> {
    let digits = |s: &str| s.len() == 4 && s.chars().all(|c| c.is_ascii_digit());
    if let Some(inhg) = token.strip_prefix('A').filter(|s| digits(s)) {
        let inhg: f64 = inhg.parse().ok()?;
        return Some(inhg / 100.0 * HPA_PER_INHG);
    }
    if let Some(hpa) = token.strip_prefix('Q').filter(|s| digits(s)) {
        return hpa.parse().ok();
    }
    None
}
