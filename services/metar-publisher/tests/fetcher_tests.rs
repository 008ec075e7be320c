//! Batching, rate limiting and retry behavior of the weather fetcher.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::*;
use metar_common::Observation;
use metar_publisher::error::FetchError;
use metar_publisher::rate_limit::RateLimiter;
use metar_publisher::retry::RetryPolicy;
use metar_publisher::weather::{DataKind, WeatherFetcher, WeatherReport, WeatherSource};
use tokio_util::sync::CancellationToken;

fn codes(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("KA{:02}", i)).collect()
}

fn refs(codes: &[String]) -> Vec<&str> {
    codes.iter().map(String::as_str).collect()
}

#[tokio::test]
async fn test_requests_are_batched() {
    let ids = codes(45);
    let source = Arc::new(MockWeatherSource::with_metars(&refs(&ids)));
    let fetcher = fetcher(source.clone(), fast_retry(3)).with_batch_size(20);

    let outcome = fetcher.fetch(&ids, DataKind::Metar, &CancellationToken::new()).await;

    assert_eq!(outcome.succeeded(), 45);
    assert!(outcome.failed.is_empty());
    assert_eq!(source.calls(), 3);
    let batches = source.batches.lock().unwrap();
    assert!(batches.iter().all(|b| b.len() <= 20));
    assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 45);
}

#[tokio::test]
async fn test_duplicate_and_lowercase_codes_are_normalized() {
    let source = Arc::new(MockWeatherSource::with_metars(&["KBOS"]));
    let fetcher = fetcher(source.clone(), fast_retry(3));

    let ids = vec!["kbos".to_string(), "KBOS".to_string(), " KBOS ".to_string()];
    let outcome = fetcher.fetch(&ids, DataKind::Metar, &CancellationToken::new()).await;

    assert_eq!(outcome.succeeded(), 1);
    assert_eq!(source.calls(), 1);
    assert_eq!(source.batches.lock().unwrap()[0], vec!["KBOS".to_string()]);
}

#[tokio::test]
async fn test_invalid_codes_fail_without_request() {
    let source = Arc::new(MockWeatherSource::with_metars(&["KBOS"]));
    let fetcher = fetcher(source.clone(), fast_retry(3));

    let ids = vec!["KBOS".to_string(), "BOSTON".to_string()];
    let outcome = fetcher.fetch(&ids, DataKind::Metar, &CancellationToken::new()).await;

    assert_eq!(outcome.succeeded(), 1);
    assert!(outcome.failed.contains("BOSTON"));
    assert_eq!(source.batches.lock().unwrap()[0], vec!["KBOS".to_string()]);
}

#[tokio::test]
async fn test_transient_failures_retried_until_success() {
    let source = Arc::new(
        MockWeatherSource::with_metars(&["KBOS", "KBDL"])
            .leading_errors(vec![FetchError::Timeout, FetchError::Server(502)]),
    );
    let fetcher = fetcher(source.clone(), fast_retry(4));

    let ids = vec!["KBOS".to_string(), "KBDL".to_string()];
    let outcome = fetcher.fetch(&ids, DataKind::Metar, &CancellationToken::new()).await;

    assert_eq!(outcome.succeeded(), 2);
    assert!(outcome.failed.is_empty());
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_fail_whole_batch_only() {
    let source = Arc::new(
        MockWeatherSource::with_metars(&["KBOS", "KBDL", "KPWM", "KBTV"])
            .failing("KPWM", FetchError::Server(503)),
    );
    let fetcher = fetcher(source.clone(), fast_retry(3)).with_batch_size(2);

    let ids: Vec<String> = ["KBDL", "KBOS", "KBTV", "KPWM"].iter().map(|s| s.to_string()).collect();
    let outcome = fetcher.fetch(&ids, DataKind::Metar, &CancellationToken::new()).await;

    // Sorted batches: [KBDL, KBOS] and [KBTV, KPWM]
    let (observations, failed) = outcome.into_observations();
    assert!(observations.contains_key("KBDL"));
    assert!(observations.contains_key("KBOS"));
    assert_eq!(failed.into_iter().collect::<Vec<_>>(), vec!["KBTV", "KPWM"]);
    assert_eq!(source.calls(), 1 + 3);
}

#[tokio::test]
async fn test_permanent_failure_not_retried() {
    let source = Arc::new(MockWeatherSource::with_metars(&["KBOS"]).failing("KBOS", FetchError::Client(400)));
    let fetcher = fetcher(source.clone(), fast_retry(5));

    let outcome = fetcher
        .fetch(&["KBOS".to_string()], DataKind::Metar, &CancellationToken::new())
        .await;

    assert!(outcome.failed.contains("KBOS"));
    assert_eq!(source.calls(), 1);
}

/// Answers every request with the same fixed set of stations.
struct FixedSource(Vec<&'static str>);

#[async_trait::async_trait]
impl WeatherSource for FixedSource {
    async fn fetch(&self, _ids: &[String], _kind: DataKind) -> Result<Vec<WeatherReport>, FetchError> {
        Ok(self
            .0
            .iter()
            .map(|icao| WeatherReport::Observation(Observation::from_raw(*icao, vfr_metar(icao))))
            .collect())
    }
}

#[tokio::test]
async fn test_unrequested_stations_ignored() {
    let source = Arc::new(FixedSource(vec!["KBOS", "KJFK"]));
    let fetcher = WeatherFetcher::new(source, Arc::new(RateLimiter::new(Duration::ZERO)), fast_retry(1));

    let outcome = fetcher
        .fetch(&["KBOS".to_string(), "KBDL".to_string()], DataKind::Metar, &CancellationToken::new())
        .await;

    assert_eq!(outcome.reports.keys().collect::<Vec<_>>(), vec!["KBOS"]);
    assert!(outcome.failed.contains("KBDL"));
    assert!(!outcome.failed.contains("KJFK"));
}

#[tokio::test]
async fn test_rate_limit_spaces_concurrent_batches() {
    let ids = codes(4);
    let source = Arc::new(MockWeatherSource::with_metars(&refs(&ids)));
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(40)));
    let fetcher = WeatherFetcher::new(source.clone(), limiter, fast_retry(1))
        .with_batch_size(1)
        .with_max_concurrent_batches(4);

    let start = Instant::now();
    let outcome = fetcher.fetch(&ids, DataKind::Metar, &CancellationToken::new()).await;

    assert_eq!(outcome.succeeded(), 4);
    assert!(start.elapsed() >= Duration::from_millis(120));
}

#[tokio::test]
async fn test_forecasts_fetched_by_kind() {
    let source = Arc::new(MockWeatherSource::default().taf("KBOS", "TAF KBOS 121740Z 1218/1324 27012KT P6SM"));
    let fetcher = fetcher(source, fast_retry(1));

    let (forecasts, failed) = fetcher
        .fetch(&["KBOS".to_string(), "KBDL".to_string()], DataKind::Taf, &CancellationToken::new())
        .await
        .into_forecasts();

    assert!(forecasts["KBOS"].raw_text.starts_with("TAF KBOS"));
    assert!(failed.contains("KBDL"));
}

#[tokio::test]
async fn test_cancelled_fetch_sends_no_requests() {
    let source = Arc::new(MockWeatherSource::with_metars(&["KBOS", "KBDL"]));
    let fetcher = fetcher(source.clone(), fast_retry(3));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = fetcher
        .fetch(&["KBOS".to_string(), "KBDL".to_string()], DataKind::Metar, &cancel)
        .await;

    assert_eq!(outcome.succeeded(), 0);
    assert_eq!(outcome.failed.len(), 2);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_cancel_stops_retrying_batch() {
    let source = Arc::new(
        MockWeatherSource::with_metars(&["KBOS"]).leading_errors(vec![FetchError::Server(503); 10]),
    );
    let retry = RetryPolicy {
        max_attempts: 4,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
    };
    let fetcher = fetcher(source.clone(), retry);
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let outcome = fetcher.fetch(&["KBOS".to_string()], DataKind::Metar, &cancel).await;

    assert!(start.elapsed() < Duration::from_millis(900));
    assert!(outcome.failed.contains("KBOS"));
    assert_eq!(source.calls(), 1);
}
