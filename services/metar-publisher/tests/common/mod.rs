//! Shared mocks for publisher integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use metar_common::{AirportCatalog, AirportFilter, EntityBuilder, EntitySnapshot, Forecast, Observation};
use metar_publisher::error::{FetchError, PublishError};
use metar_publisher::publisher::EntityPublisher;
use metar_publisher::rate_limit::RateLimiter;
use metar_publisher::retry::RetryPolicy;
use metar_publisher::scheduler::{PublishScheduler, SchedulerConfig};
use metar_publisher::weather::{DataKind, WeatherFetcher, WeatherReport, WeatherSource};

pub const FIVE_AIRPORTS: [&str; 5] = ["KBDL", "KBOS", "KBTV", "KORH", "KPWM"];

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

pub fn catalog(codes: &[&str]) -> AirportCatalog {
    AirportCatalog::new_england().filtered(&AirportFilter::new(codes, Vec::<String>::new()))
}

pub fn vfr_metar(icao: &str) -> String {
    format!("{} 121854Z 27010KT 10SM FEW250 12/M03 A3012", icao)
}

// ============================================================================
// Weather source
// ============================================================================

/// Scripted weather source keyed by airport code.
#[derive(Default)]
pub struct MockWeatherSource {
    pub metars: HashMap<String, String>,
    pub tafs: HashMap<String, String>,
    /// Requests containing any of these codes fail with `fail_with`
    pub failing: HashSet<String>,
    pub fail_with: Option<FetchError>,
    /// Errors returned by the first N requests regardless of content
    pub leading_errors: Mutex<VecDeque<FetchError>>,
    pub taf_error: Option<FetchError>,
    pub calls: AtomicUsize,
    pub batches: Mutex<Vec<Vec<String>>>,
}

impl MockWeatherSource {
    pub fn with_metars(codes: &[&str]) -> Self {
        Self {
            metars: codes.iter().map(|c| (c.to_string(), vfr_metar(c))).collect(),
            ..Default::default()
        }
    }

    pub fn metar(mut self, icao: &str, raw: &str) -> Self {
        self.metars.insert(icao.to_string(), raw.to_string());
        self
    }

    pub fn taf(mut self, icao: &str, raw: &str) -> Self {
        self.tafs.insert(icao.to_string(), raw.to_string());
        self
    }

    pub fn failing(mut self, icao: &str, error: FetchError) -> Self {
        self.failing.insert(icao.to_string());
        self.fail_with = Some(error);
        self
    }

    pub fn leading_errors(self, errors: Vec<FetchError>) -> Self {
        *self.leading_errors.lock().unwrap() = errors.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherSource for MockWeatherSource {
    async fn fetch(&self, ids: &[String], kind: DataKind) -> Result<Vec<WeatherReport>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().unwrap().push(ids.to_vec());

        if let Some(err) = self.leading_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        match kind {
            DataKind::Metar => {
                if let Some(err) = &self.fail_with {
                    if ids.iter().any(|id| self.failing.contains(id)) {
                        return Err(err.clone());
                    }
                }
                Ok(ids
                    .iter()
                    .filter_map(|id| self.metars.get(id).map(|raw| Observation::from_raw(id, raw)))
                    .map(WeatherReport::Observation)
                    .collect())
            }
            DataKind::Taf => {
                if let Some(err) = &self.taf_error {
                    return Err(err.clone());
                }
                Ok(ids
                    .iter()
                    .filter_map(|id| {
                        self.tafs.get(id).map(|raw| WeatherReport::Forecast {
                            icao: id.clone(),
                            forecast: Forecast::new(raw.as_str()),
                        })
                    })
                    .collect())
            }
        }
    }
}

// ============================================================================
// Entity publisher
// ============================================================================

#[derive(Default)]
pub struct MockPublisher {
    pub published: Mutex<Vec<EntitySnapshot>>,
    /// Errors returned, in order, for publishes of a given airport
    pub failures: Mutex<HashMap<String, VecDeque<PublishError>>>,
    /// Error returned for every publish of a given airport
    pub always_fail: HashMap<String, PublishError>,
    pub attempts: Mutex<HashMap<String, usize>>,
    pub delay: Duration,
}

impl MockPublisher {
    pub fn fail_times(self, icao: &str, errors: Vec<PublishError>) -> Self {
        self.failures.lock().unwrap().insert(icao.to_string(), errors.into());
        self
    }

    pub fn always_fail(mut self, icao: &str, error: PublishError) -> Self {
        self.always_fail.insert(icao.to_string(), error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self, icao: &str) -> usize {
        self.attempts.lock().unwrap().get(icao).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn published_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .published
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.icao.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self, icao: &str) -> Option<EntitySnapshot> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.icao == icao)
            .cloned()
    }
}

#[async_trait]
impl EntityPublisher for MockPublisher {
    async fn publish(&self, snapshot: &EntitySnapshot) -> Result<(), PublishError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(snapshot.icao.clone())
            .or_default() += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(err) = self.always_fail.get(&snapshot.icao) {
            return Err(err.clone());
        }
        let scripted = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&snapshot.icao)
            .and_then(VecDeque::pop_front);
        if let Some(err) = scripted {
            return Err(err);
        }

        self.published.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

// ============================================================================
// Assembly
// ============================================================================

pub fn fetcher(source: Arc<MockWeatherSource>, retry: RetryPolicy) -> WeatherFetcher {
    WeatherFetcher::new(source, Arc::new(RateLimiter::new(Duration::ZERO)), retry)
}

pub fn scheduler(
    codes: &[&str],
    source: Arc<MockWeatherSource>,
    publisher: Arc<MockPublisher>,
    config: SchedulerConfig,
) -> PublishScheduler {
    PublishScheduler::new(
        catalog(codes),
        fetcher(source, fast_retry(3)).with_batch_size(1),
        publisher,
        EntityBuilder::new(chrono::Duration::hours(2)),
        config,
    )
}

pub fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        interval: Duration::from_secs(3600),
        include_forecast: true,
        publish_concurrency: 4,
        publish_retry: fast_retry(4),
    }
}
