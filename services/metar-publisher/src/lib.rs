//! METAR/TAF weather publisher.
//!
//! Fetches aviation weather for a fixed airport catalog, classifies flight
//! conditions and parameter health, and publishes one entity per airport to
//! the Lattice platform on a fixed interval.

pub mod config;
pub mod error;
pub mod lattice;
pub mod metrics;
pub mod publisher;
pub mod rate_limit;
pub mod retry;
pub mod scheduler;
pub mod server;
pub mod weather;

pub use config::{LatticeCredentials, PublisherConfig};
pub use error::{ConfigError, FetchError, PublishError, StartupError};
pub use publisher::{EntityPublisher, LatticePublisher};
pub use rate_limit::RateLimiter;
pub use retry::{retry_with_backoff, RetryPolicy, Retryable};
pub use scheduler::{
    AirportOutcome, AirportResult, AirportTally, CycleReport, FailureReason, PublishScheduler,
    SchedulerConfig, SchedulerState,
};
pub use weather::{AviationWeatherClient, DataKind, FetchOutcome, WeatherFetcher, WeatherReport, WeatherSource};
