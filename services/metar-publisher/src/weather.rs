//! Weather acquisition: the upstream source seam and the batching fetcher.
//!
//! [`WeatherSource`] performs one upstream request for a batch of airport
//! codes. [`WeatherFetcher`] splits the requested codes into batches, spaces
//! requests through a shared [`RateLimiter`], retries transient failures and
//! reports per-airport success or failure. It never fails as a whole. Once
//! the cancellation token fires, pending and in-flight batches give up.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use metar_common::{
    metar, normalize_icao, CloudCover, CloudLayer, Forecast, Observation, Wind, WindDirection,
};
use reqwest::StatusCode;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::config::WeatherConfig;
use crate::error::FetchError;
use crate::metrics;
use crate::rate_limit::RateLimiter;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Kind of report requested from the weather source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Current surface observation
    Metar,
    /// Terminal aerodrome forecast
    Taf,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metar => "metar",
            Self::Taf => "taf",
        }
    }

    fn retry_operation(&self) -> &'static str {
        match self {
            Self::Metar => "fetch_metar",
            Self::Taf => "fetch_taf",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed report for one airport.
#[derive(Debug, Clone, PartialEq)]
pub enum WeatherReport {
    Observation(Observation),
    Forecast { icao: String, forecast: Forecast },
}

impl WeatherReport {
    pub fn icao(&self) -> &str {
        match self {
            Self::Observation(obs) => &obs.icao,
            Self::Forecast { icao, .. } => icao,
        }
    }

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Observation(obs) => obs.observed_at,
            Self::Forecast { forecast, .. } => forecast.issued_at,
        }
    }
}

/// A single upstream request for a batch of airport codes.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch(&self, ids: &[String], kind: DataKind) -> Result<Vec<WeatherReport>, FetchError>;
}

// ============================================================================
// aviationweather.gov client
// ============================================================================

/// Client for the aviationweather.gov data API.
pub struct AviationWeatherClient {
    client: reqwest::Client,
    base_url: String,
    lookback_hours: u32,
}

impl AviationWeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            lookback_hours: config.lookback_hours,
        })
    }

    fn endpoint(&self, kind: DataKind) -> String {
        format!("{}/{}", self.base_url, kind.as_str())
    }
}

#[async_trait]
impl WeatherSource for AviationWeatherClient {
    async fn fetch(&self, ids: &[String], kind: DataKind) -> Result<Vec<WeatherReport>, FetchError> {
        let ids_param = ids.join(",");
        let mut request = self
            .client
            .get(self.endpoint(kind))
            .query(&[("ids", ids_param.as_str()), ("format", "json")]);

        if kind == DataKind::Metar {
            let hours = self.lookback_hours.to_string();
            request = request.query(&[("taf", "false"), ("hours", hours.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();

        // No data for any requested station
        if status == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(FetchError::from_status(status));
        }

        let body = response.text().await?;
        parse_response(&body, kind)
    }
}

/// Parse a JSON response body into reports.
///
/// The body must be a JSON array. Individual entries without a usable
/// station code are skipped; unparsable fields become absent.
pub fn parse_response(body: &str, kind: DataKind) -> Result<Vec<WeatherReport>, FetchError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    let entries = value
        .as_array()
        .ok_or_else(|| FetchError::Decode("expected a JSON array".to_string()))?;

    let reports = entries
        .iter()
        .filter_map(|entry| {
            let report = match kind {
                DataKind::Metar => parse_metar_entry(entry).map(WeatherReport::Observation),
                DataKind::Taf => parse_taf_entry(entry)
                    .map(|(icao, forecast)| WeatherReport::Forecast { icao, forecast }),
            };
            if report.is_none() {
                debug!(kind = %kind, "Skipping entry without a valid station code");
            }
            report
        })
        .collect();

    Ok(reports)
}

/// Build an observation from one METAR entry. Structured fields win; the
/// raw report fills whatever they leave out.
pub fn parse_metar_entry(entry: &Value) -> Option<Observation> {
    let icao = station_code(entry)?;
    let mut obs = Observation::new(icao);

    obs.raw_text = entry
        .get("rawOb")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    obs.observed_at = entry
        .get("obsTime")
        .and_then(json_time)
        .or_else(|| entry.get("reportTime").and_then(json_time));
    obs.temperature_c = entry.get("temp").and_then(json_f64);
    obs.dewpoint_c = entry.get("dewp").and_then(json_f64);
    obs.visibility_sm = entry.get("visib").and_then(json_f64).filter(|v| *v >= 0.0);
    obs.altimeter_hpa = entry.get("altim").and_then(json_f64);
    obs.vertical_visibility_ft = entry.get("vertVis").and_then(json_u32);

    if let Some(speed_kt) = entry.get("wspd").and_then(json_u32) {
        obs.wind = Some(Wind {
            direction: entry.get("wdir").and_then(json_wind_direction),
            speed_kt,
            gust_kt: entry.get("wgst").and_then(json_u32),
        });
    }

    if let Some(clouds) = entry.get("clouds").and_then(Value::as_array) {
        obs.cloud_layers = clouds
            .iter()
            .filter_map(|layer| {
                let cover = CloudCover::parse(layer.get("cover")?.as_str()?)?;
                Some(CloudLayer {
                    cover,
                    base_ft: layer.get("base").and_then(json_u32),
                })
            })
            .collect();
    }

    let decoded = metar::decode(&obs.raw_text);
    obs.fill_missing_from(&decoded);
    Some(obs)
}

/// Build a forecast from one TAF entry.
pub fn parse_taf_entry(entry: &Value) -> Option<(String, Forecast)> {
    let icao = station_code(entry)?;
    let raw = entry.get("rawTAF").and_then(Value::as_str)?.trim();
    if raw.is_empty() {
        return None;
    }

    let mut forecast = Forecast::new(raw);
    forecast.issued_at = entry
        .get("issueTime")
        .and_then(json_time)
        .or_else(|| entry.get("bulletinTime").and_then(json_time));
    forecast.valid_from = entry.get("validTimeFrom").and_then(json_time);
    forecast.valid_to = entry.get("validTimeTo").and_then(json_time);
    Some((icao, forecast))
}

fn station_code(entry: &Value) -> Option<String> {
    let code = entry.get("icaoId").and_then(Value::as_str)?;
    normalize_icao(code).ok()
}

/// Numbers, or numeric strings such as "10+".
fn json_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('+').parse().ok(),
        _ => None,
    };
    number.filter(|v: &f64| v.is_finite())
}

fn json_u32(value: &Value) -> Option<u32> {
    json_f64(value)
        .filter(|v| *v >= 0.0 && *v <= u32::MAX as f64)
        .map(|v| v.round() as u32)
}

fn json_wind_direction(value: &Value) -> Option<WindDirection> {
    if value.as_str().is_some_and(|s| s.eq_ignore_ascii_case("VRB")) {
        return Some(WindDirection::Variable);
    }
    json_u32(value)
        .filter(|deg| *deg <= 360)
        .map(|deg| WindDirection::Degrees(deg as u16))
}

/// Unix seconds, RFC 3339, or "YYYY-MM-DD HH:MM:SS" in UTC.
fn json_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => Utc.timestamp_opt(n.as_i64()?, 0).single(),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|naive| Utc.from_utc_datetime(&naive))
                })
        }
        _ => None,
    }
}

// ============================================================================
// Batching fetcher
// ============================================================================

/// Per-airport results of one fetch call.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Latest report per airport code
    pub reports: HashMap<String, WeatherReport>,
    /// Requested codes with no report this cycle
    pub failed: BTreeSet<String>,
}

impl FetchOutcome {
    pub fn succeeded(&self) -> usize {
        self.reports.len()
    }

    pub fn into_observations(self) -> (HashMap<String, Observation>, BTreeSet<String>) {
        let observations = self
            .reports
            .into_iter()
            .filter_map(|(icao, report)| match report {
                WeatherReport::Observation(obs) => Some((icao, obs)),
                WeatherReport::Forecast { .. } => None,
            })
            .collect();
        (observations, self.failed)
    }

    pub fn into_forecasts(self) -> (HashMap<String, Forecast>, BTreeSet<String>) {
        let forecasts = self
            .reports
            .into_iter()
            .filter_map(|(icao, report)| match report {
                WeatherReport::Forecast { forecast, .. } => Some((icao, forecast)),
                WeatherReport::Observation(_) => None,
            })
            .collect();
        (forecasts, self.failed)
    }

    fn merge(&mut self, report: WeatherReport) {
        let icao = report.icao().to_string();
        match self.reports.get(&icao) {
            Some(existing) if existing.timestamp() >= report.timestamp() => {}
            _ => {
                self.reports.insert(icao, report);
            }
        }
    }
}

/// Batches, rate-limits and retries requests against a [`WeatherSource`].
pub struct WeatherFetcher {
    source: Arc<dyn WeatherSource>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    batch_size: usize,
    max_concurrent_batches: usize,
}

impl WeatherFetcher {
    pub fn new(source: Arc<dyn WeatherSource>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            source,
            limiter,
            retry,
            batch_size: 20,
            max_concurrent_batches: 2,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_concurrent_batches(mut self, max: usize) -> Self {
        self.max_concurrent_batches = max.max(1);
        self
    }

    /// Fetch `kind` reports for `ids`.
    ///
    /// Every requested code ends up either in `reports` or in `failed`.
    #[instrument(skip_all, fields(kind = %kind, requested = ids.len()))]
    pub async fn fetch(&self, ids: &[String], kind: DataKind, cancel: &CancellationToken) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();

        let mut requested = BTreeSet::new();
        for id in ids {
            match normalize_icao(id) {
                Ok(icao) => {
                    requested.insert(icao);
                }
                Err(e) => {
                    warn!(code = %id, error = %e, "Skipping invalid airport code");
                    outcome.failed.insert(id.clone());
                }
            }
        }

        let codes: Vec<String> = requested.iter().cloned().collect();
        let batches: Vec<Vec<String>> = codes.chunks(self.batch_size).map(<[String]>::to_vec).collect();

        let results: Vec<(Vec<String>, Result<Vec<WeatherReport>, FetchError>)> = stream::iter(batches)
            .map(|batch| async move {
                let result = self.fetch_batch(&batch, kind, cancel).await;
                (batch, result)
            })
            .buffer_unordered(self.max_concurrent_batches)
            .collect()
            .await;

        for (batch, result) in results {
            match result {
                Ok(reports) => {
                    for report in reports {
                        if requested.contains(report.icao()) {
                            outcome.merge(report);
                        } else {
                            debug!(icao = %report.icao(), "Ignoring report for unrequested station");
                        }
                    }
                }
                Err(FetchError::Cancelled) => {
                    debug!(kind = %kind, airports = %batch.join(","), "Batch abandoned on shutdown");
                    outcome.failed.extend(batch);
                }
                Err(e) => {
                    error!(kind = %kind, airports = %batch.join(","), error = %e, "Batch fetch failed");
                    outcome.failed.extend(batch);
                }
            }
        }

        for icao in &requested {
            if !outcome.reports.contains_key(icao) && !outcome.failed.contains(icao) {
                warn!(icao = %icao, kind = %kind, "No report returned");
                outcome.failed.insert(icao.clone());
            }
        }

        debug!(
            succeeded = outcome.reports.len(),
            failed = outcome.failed.len(),
            "Fetch complete"
        );
        outcome
    }

    async fn fetch_batch(
        &self,
        batch: &[String],
        kind: DataKind,
        cancel: &CancellationToken,
    ) -> Result<Vec<WeatherReport>, FetchError> {
        let source = &self.source;
        let limiter = &self.limiter;

        retry_with_backoff(&self.retry, kind.retry_operation(), cancel, |attempt| async move {
            let request = async {
                limiter.acquire().await;
                debug!(kind = %kind, attempt, count = batch.len(), "Requesting weather batch");
                source.fetch(batch, kind).await
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = request => result,
            };
            metrics::record_fetch(kind.as_str(), result.is_ok());
            result
        })
        .await
    }
}
