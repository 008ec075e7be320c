//! Periodic fetch, classify, build and publish cycle.
//!
//! One cycle runs per interval. Airports are independent: a failed fetch or
//! publish for one airport is recorded in the cycle report and the per-airport
//! tallies, and never stops the others. Fetches, retry backoff, the publish
//! stage and the sleep between cycles all observe the cancellation token.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metar_common::{
    evaluate_components, AirportCatalog, EntityBuilder, EntitySnapshot, FlightCategory, HealthState,
    Observation,
};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::PublishError;
use crate::metrics;
use crate::publisher::EntityPublisher;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::weather::{DataKind, WeatherFetcher};

/// Where the scheduler is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Fetching,
    Classifying,
    Publishing,
    Sleeping,
    ShuttingDown,
}

/// Why an airport produced no published entity this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// No usable observation was fetched
    NoData,
    /// Credentials were refused by the entity platform
    Unauthorized(String),
    /// Publish failed after retries or was rejected
    Publish(String),
    /// Cancelled before the publish started
    Shutdown,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => f.write_str("no weather data"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {}", msg),
            Self::Publish(msg) => write!(f, "publish failed: {}", msg),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AirportOutcome {
    Published {
        entity_id: String,
        category: FlightCategory,
        health: HealthState,
    },
    Failed { reason: FailureReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AirportResult {
    pub icao: String,
    #[serde(flatten)]
    pub outcome: AirportOutcome,
}

impl AirportResult {
    fn failed(icao: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            icao: icao.into(),
            outcome: AirportOutcome::Failed { reason },
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self.outcome, AirportOutcome::Published { .. })
    }
}

/// Outcome of one cycle, ordered by airport code.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<AirportResult>,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn published(&self) -> usize {
        self.results.iter().filter(|r| r.is_published()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.published()
    }

    pub fn result(&self, icao: &str) -> Option<&AirportResult> {
        self.results.iter().find(|r| r.icao == icao)
    }

    pub fn failed_airports(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.is_published())
            .map(|r| r.icao.as_str())
            .collect()
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "published {} of {}", self.published(), self.total())
    }
}

/// Running per-airport counts across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AirportTally {
    pub published: u64,
    pub failed: u64,
    pub consecutive_failures: u32,
    pub last_category: Option<FlightCategory>,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
}

impl AirportTally {
    fn record(&mut self, result: &AirportResult, at: DateTime<Utc>) {
        match &result.outcome {
            AirportOutcome::Published { category, .. } => {
                self.published += 1;
                self.consecutive_failures = 0;
                self.last_category = Some(*category);
                self.last_success = Some(at);
            }
            AirportOutcome::Failed { reason } => {
                self.failed += 1;
                self.consecutive_failures += 1;
                self.last_error = Some(reason.to_string());
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub include_forecast: bool,
    pub publish_concurrency: usize,
    pub publish_retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30 * 60),
            include_forecast: true,
            publish_concurrency: 4,
            publish_retry: RetryPolicy::default(),
        }
    }
}

/// Drives the publish cycle for a fixed set of airports.
pub struct PublishScheduler {
    catalog: AirportCatalog,
    fetcher: WeatherFetcher,
    publisher: Arc<dyn EntityPublisher>,
    builder: EntityBuilder,
    config: SchedulerConfig,
    state: watch::Sender<SchedulerState>,
    last_report: RwLock<Option<CycleReport>>,
    tallies: RwLock<BTreeMap<String, AirportTally>>,
}

impl PublishScheduler {
    pub fn new(
        catalog: AirportCatalog,
        fetcher: WeatherFetcher,
        publisher: Arc<dyn EntityPublisher>,
        builder: EntityBuilder,
        config: SchedulerConfig,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            catalog,
            fetcher,
            publisher,
            builder,
            config,
            state,
            last_report: RwLock::new(None),
            tallies: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn catalog(&self) -> &AirportCatalog {
        &self.catalog
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    pub async fn tallies(&self) -> BTreeMap<String, AirportTally> {
        self.tallies.read().await.clone()
    }

    /// Move to `next`, or to `ShuttingDown` once cancellation has been seen.
    fn advance(&self, next: SchedulerState, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            self.set_state(SchedulerState::ShuttingDown);
        } else {
            self.set_state(next);
        }
    }

    fn set_state(&self, state: SchedulerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Scheduler state change");
        }
    }

    /// Run cycles until `cancel` fires.
    pub async fn run_forever(&self, cancel: CancellationToken) {
        info!(
            airports = self.catalog.len(),
            interval_secs = self.config.interval.as_secs(),
            "Starting publish scheduler"
        );

        while !cancel.is_cancelled() {
            self.run_cycle(&cancel).await;
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(SchedulerState::Sleeping);
            info!(
                next_in_secs = self.config.interval.as_secs(),
                "Waiting for next cycle"
            );

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        self.set_state(SchedulerState::ShuttingDown);
        info!("Publish scheduler stopped");
    }

    /// Run one complete cycle. Always returns a report, even when nothing
    /// could be published.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", cycle_id = %cycle_id);
        self.run_cycle_inner(cycle_id, cancel).instrument(span).await
    }

    async fn run_cycle_inner(&self, cycle_id: Uuid, cancel: &CancellationToken) -> CycleReport {
        let started = Instant::now();
        let started_at = Utc::now();
        info!(airports = self.catalog.len(), "Starting publish cycle");

        self.advance(SchedulerState::Fetching, cancel);
        let mut observations = self.fetch_observations(cancel).await;
        let missing = if cancel.is_cancelled() {
            FailureReason::Shutdown
        } else {
            FailureReason::NoData
        };

        self.advance(SchedulerState::Classifying, cancel);
        let mut results = Vec::with_capacity(self.catalog.len());
        let mut snapshots = Vec::new();
        let now = Utc::now();

        for airport in self.catalog.iter() {
            match observations.remove(&airport.icao) {
                Some(observation) => {
                    let category = observation.flight_category();
                    if observation.is_partial() {
                        debug!(icao = %airport.icao, "Observation is partial, absent fields degraded");
                    }
                    let components = evaluate_components(&observation, category);
                    snapshots.push(self.builder.build(airport, &observation, category, components, now));
                }
                None => results.push(AirportResult::failed(&airport.icao, missing.clone())),
            }
        }

        self.advance(SchedulerState::Publishing, cancel);
        results.extend(self.publish_all(snapshots, cancel).await);
        results.sort_by(|a, b| a.icao.cmp(&b.icao));

        let report = CycleReport {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            results,
        };

        self.record(&report).await;
        metrics::record_cycle(report.published(), report.total(), started.elapsed());

        for result in &report.results {
            if let AirportOutcome::Failed { reason } = &result.outcome {
                warn!(icao = %result.icao, reason = %reason, "Airport not published this cycle");
            }
        }
        info!(
            published = report.published(),
            total = report.total(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Published {}/{} weather entities",
            report.published(),
            report.total()
        );

        self.advance(SchedulerState::Idle, cancel);
        report
    }

    /// Observations keyed by airport code, with forecasts attached when enabled.
    async fn fetch_observations(&self, cancel: &CancellationToken) -> HashMap<String, Observation> {
        let ids = self.catalog.ids();
        let (mut observations, failed) = self
            .fetcher
            .fetch(&ids, DataKind::Metar, cancel)
            .await
            .into_observations();
        if cancel.is_cancelled() {
            debug!(fetched = observations.len(), "Shutdown requested during fetch");
            return observations;
        }
        if !failed.is_empty() {
            warn!(count = failed.len(), airports = ?failed, "Observations unavailable");
        }

        if self.config.include_forecast && !observations.is_empty() {
            let observed: Vec<String> = observations.keys().cloned().collect();
            let (forecasts, missing) = self
                .fetcher
                .fetch(&observed, DataKind::Taf, cancel)
                .await
                .into_forecasts();
            if !missing.is_empty() {
                debug!(count = missing.len(), "Forecasts unavailable, publishing without them");
            }
            for (icao, forecast) in forecasts {
                if let Some(observation) = observations.get_mut(&icao) {
                    observation.forecast = Some(forecast);
                }
            }
        }

        observations
    }

    /// Publish through a bounded worker pool. Once `cancel` fires no new
    /// publish is started; those already running finish.
    async fn publish_all(&self, snapshots: Vec<EntitySnapshot>, cancel: &CancellationToken) -> Vec<AirportResult> {
        let pending: BTreeSet<String> = snapshots.iter().map(|s| s.icao.clone()).collect();

        let mut results: Vec<AirportResult> = stream::iter(snapshots)
            .take_until(cancel.clone().cancelled_owned())
            .map(|snapshot| async move { self.publish_one(snapshot, cancel).await })
            .buffer_unordered(self.config.publish_concurrency.max(1))
            .collect()
            .await;

        let attempted: BTreeSet<&str> = results.iter().map(|r| r.icao.as_str()).collect();
        let skipped: Vec<String> = pending
            .iter()
            .filter(|icao| !attempted.contains(icao.as_str()))
            .cloned()
            .collect();

        if !skipped.is_empty() {
            warn!(count = skipped.len(), "Shutdown requested, skipping remaining publishes");
        }
        for icao in skipped {
            metrics::record_publish("skipped");
            results.push(AirportResult::failed(icao, FailureReason::Shutdown));
        }
        results
    }

    /// Publish one snapshot, stamping creation and expiry at each attempt.
    async fn publish_one(&self, snapshot: EntitySnapshot, cancel: &CancellationToken) -> AirportResult {
        let publisher = &self.publisher;
        let snapshot_ref = &snapshot;
        let result = retry_with_backoff(&self.config.publish_retry, "publish", cancel, |attempt| {
            let mut stamped = snapshot_ref.clone();
            stamped.restamp(Utc::now());
            async move {
                debug!(icao = %stamped.icao, attempt, "Publishing entity");
                publisher.publish(&stamped).await
            }
        })
        .await;

        let outcome = match result {
            Ok(()) => {
                metrics::record_publish("success");
                info!(
                    icao = %snapshot.icao,
                    entity_id = %snapshot.entity_id,
                    category = %snapshot.category,
                    health = %snapshot.health,
                    "Published weather entity"
                );
                AirportOutcome::Published {
                    entity_id: snapshot.entity_id.clone(),
                    category: snapshot.category,
                    health: snapshot.health,
                }
            }
            Err(PublishError::Auth(msg)) => {
                metrics::record_publish("unauthorized");
                AirportOutcome::Failed {
                    reason: FailureReason::Unauthorized(msg),
                }
            }
            Err(e) => {
                metrics::record_publish("failure");
                AirportOutcome::Failed {
                    reason: FailureReason::Publish(e.to_string()),
                }
            }
        };

        AirportResult {
            icao: snapshot.icao,
            outcome,
        }
    }

    async fn record(&self, report: &CycleReport) {
        let mut tallies = self.tallies.write().await;
        for result in &report.results {
            tallies
                .entry(result.icao.clone())
                .or_default()
                .record(result, report.finished_at);
        }
        drop(tallies);

        *self.last_report.write().await = Some(report.clone());
    }
}
