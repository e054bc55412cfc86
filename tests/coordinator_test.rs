mod common;

use common::{MockRateClient, capture_logs, sample_record, sample_snapshot, settings, start_time};
use openei_rates::coordinator::{
    RATE_LIMIT_BACKOFF_CACHED, RATE_LIMIT_BACKOFF_EMPTY, RateCoordinator,
};
use openei_rates::error::OpenEiError;
use openei_rates::fields::{BinaryField, FieldValue, SensorField, UOM_SUFFIX};
use chrono::{DateTime, TimeZone, Utc};
use openei_rates::host::{Clock, EntityState, InMemoryStateStore, ManualClock, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Wall clock that follows tokio's (pausable) time
struct TokioClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.started.elapsed()).unwrap()
    }
}

fn build(
    record: openei_rates::ConfigurationRecord,
    client: Arc<MockRateClient>,
    states: Arc<InMemoryStateStore>,
    clock: Arc<ManualClock>,
    dir: &std::path::Path,
) -> RateCoordinator {
    RateCoordinator::new(record, client, states, clock, settings(dir))
}

#[tokio::test]
async fn successful_fetch_holds_exactly_declared_fields() {
    let dir = tempfile::tempdir().unwrap();
    let client = MockRateClient::new();
    let coord = build(
        sample_record(),
        client.clone(),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(ManualClock::new(start_time())),
        dir.path(),
    );

    coord.refresh().await.unwrap();
    let data = coord.data();

    let mut expected: Vec<String> = SensorField::ALL.iter().map(|f| f.key().to_string()).collect();
    expected.extend(BinaryField::ALL.iter().map(|f| f.key().to_string()));
    expected.push(format!("mincharge{}", UOM_SUFFIX));
    expected.push(format!("fixedchargefirstmeter{}", UOM_SUFFIX));
    expected.sort();
    let keys: Vec<String> = data.keys().map(str::to_string).collect();
    assert_eq!(keys, expected);

    let request = client.requests.lock().unwrap()[0].clone();
    assert_eq!(request.plan, "randomstring");
    assert_eq!(request.at, start_time());
    assert_eq!(
        request.cache_file,
        dir.path().join(format!("openei_{}", coord.entry_id()))
    );
}

#[tokio::test]
async fn manual_plan_overrides_selected_plan() {
    let dir = tempfile::tempdir().unwrap();
    let client = MockRateClient::new();
    let mut record = sample_record();
    record.manual_plan = Some("manualplan".into());
    let coord = build(
        record,
        client.clone(),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(ManualClock::new(start_time())),
        dir.path(),
    );

    coord.fetch_and_update().await.unwrap();
    assert_eq!(client.requests.lock().unwrap()[0].plan, "manualplan");
}

#[tokio::test]
async fn rate_limit_on_empty_cache_backs_off_and_logs() {
    let (logs, _guard) = capture_logs();
    let dir = tempfile::tempdir().unwrap();
    let client = MockRateClient::with_results(vec![Err(OpenEiError::rate_limited("429"))]);
    let coord = build(
        sample_record(),
        client.clone(),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(ManualClock::new(start_time())),
        dir.path(),
    );

    coord.refresh().await.unwrap();
    assert_eq!(coord.rate_limit_count().await, RATE_LIMIT_BACKOFF_EMPTY);
    assert!(coord.data().is_empty());
    assert!(coord.last_update_success());
    assert!(logs.contents().contains("API Rate limit exceeded, retrying later."));

    // Each suppressed cycle costs no client call
    for remaining in [2, 1, 0] {
        coord.refresh().await.unwrap();
        assert_eq!(coord.rate_limit_count().await, remaining);
    }
    assert_eq!(client.fetch_calls(), 1);

    coord.refresh().await.unwrap();
    assert_eq!(client.fetch_calls(), 2);
    assert_eq!(
        coord.data().get("current_rate"),
        Some(&FieldValue::Number(0.24477))
    );
}

#[tokio::test]
async fn rate_limit_with_cached_data_backs_off_six_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let client = MockRateClient::with_results(vec![
        Ok(sample_snapshot()),
        Err(OpenEiError::rate_limited("OVER_RATE_LIMIT")),
    ]);
    let coord = build(
        sample_record(),
        client.clone(),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(ManualClock::new(start_time())),
        dir.path(),
    );

    coord.refresh().await.unwrap();
    coord.on_alarm().await.unwrap();
    assert_eq!(coord.rate_limit_count().await, RATE_LIMIT_BACKOFF_CACHED);

    for _ in 0..RATE_LIMIT_BACKOFF_CACHED {
        coord.on_alarm().await.unwrap();
    }
    assert_eq!(coord.rate_limit_count().await, 0);
    assert_eq!(client.fetch_calls(), 2);
    assert_eq!(
        coord.data().get("rate_name"),
        Some(&FieldValue::Text("Fake Plan Name".into()))
    );
}

#[tokio::test]
async fn missing_meter_warns_and_fetches_without_reading() {
    let (logs, _guard) = capture_logs();
    let dir = tempfile::tempdir().unwrap();
    let client = MockRateClient::new();
    let mut record = sample_record();
    record.sensor = Some("sensor.fake_sensor_1".into());
    let coord = build(
        record,
        client.clone(),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(ManualClock::new(start_time())),
        dir.path(),
    );

    coord.fetch_and_update().await.unwrap();

    assert_eq!(client.fetch_calls(), 1);
    assert_eq!(client.last_reading(), None);
    let out = logs.contents();
    assert!(out.contains("Using meter data from sensor: sensor.fake_sensor_1"));
    assert!(out.contains("Sensor: sensor.fake_sensor_1 is not valid."));
}

#[tokio::test]
async fn numeric_meter_state_is_used_as_reading() {
    let dir = tempfile::tempdir().unwrap();
    let states = Arc::new(InMemoryStateStore::new());
    states.set(EntityState::new("sensor.fake_sensor_1", "542.75"));
    let client = MockRateClient::new();
    let mut record = sample_record();
    record.sensor = Some("sensor.fake_sensor_1".into());
    let coord = build(
        record,
        client.clone(),
        states.clone(),
        Arc::new(ManualClock::new(start_time())),
        dir.path(),
    );

    coord.fetch_and_update().await.unwrap();
    assert_eq!(client.last_reading(), Some(542.75));

    states.set(EntityState::new("sensor.fake_sensor_1", "not-a-number"));
    coord.fetch_and_update().await.unwrap();
    assert_eq!(client.last_reading(), None);
}

#[tokio::test]
async fn failure_keeps_last_mapping_and_reports_update_failed() {
    let dir = tempfile::tempdir().unwrap();
    let client = MockRateClient::with_results(vec![
        Ok(sample_snapshot()),
        Err(OpenEiError::api("Plan randomstring not found")),
    ]);
    let coord = build(
        sample_record(),
        client,
        Arc::new(InMemoryStateStore::new()),
        Arc::new(ManualClock::new(start_time())),
        dir.path(),
    );

    coord.fetch_and_update().await.unwrap();
    let before = coord.data();

    let err = coord.on_alarm().await.unwrap_err();
    assert!(matches!(err, OpenEiError::UpdateFailed { .. }));
    assert!(!coord.last_update_success());
    assert_eq!(*coord.data(), *before);
    assert!(coord.snapshot().last_error.unwrap().contains("not found"));
}

#[tokio::test]
async fn alarm_is_rearmed_to_next_hour_each_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let coord = build(
        sample_record(),
        MockRateClient::new(),
        Arc::new(InMemoryStateStore::new()),
        clock.clone(),
        dir.path(),
    );

    coord.refresh().await.unwrap();
    let first = coord.next_alarm().unwrap();
    assert_eq!(first.to_rfc3339(), "2024-05-01T11:00:01+00:00");

    clock.set(first);
    coord.on_alarm().await.unwrap();
    assert_eq!(
        coord.next_alarm().unwrap().to_rfc3339(),
        "2024-05-01T12:00:01+00:00"
    );
}

#[tokio::test]
async fn fallback_tick_just_before_the_hour_keeps_pending_alarm() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start_time()));
    let client = MockRateClient::new();
    let coord = build(
        sample_record(),
        client.clone(),
        Arc::new(InMemoryStateStore::new()),
        clock.clone(),
        dir.path(),
    );

    coord.refresh().await.unwrap();
    let pending = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 1).unwrap();
    assert_eq!(coord.next_alarm(), Some(pending));

    clock.set(Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap() + chrono::Duration::milliseconds(500));
    coord.refresh().await.unwrap();
    assert_eq!(coord.next_alarm(), Some(pending));
    assert_eq!(client.fetch_calls(), 1);

    clock.set(pending);
    coord.on_alarm().await.unwrap();
    assert_eq!(client.fetch_calls(), 2);
    assert_eq!(
        coord.next_alarm(),
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap())
    );
}

#[tokio::test(start_paused = true)]
async fn run_loop_drives_fallback_poll_and_hourly_alarm() {
    let dir = tempfile::tempdir().unwrap();
    let client = MockRateClient::new();
    let coord = Arc::new(RateCoordinator::new(
        sample_record(),
        client.clone(),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(TokioClock::new(start_time())),
        settings(dir.path()),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = {
        let coord = Arc::clone(&coord);
        tokio::spawn(async move { coord.run(shutdown_rx).await })
    };

    // First fallback tick at 10:15:30 finds nothing cached
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(client.fetch_calls(), 1);
    let pending = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 1).unwrap();
    assert_eq!(coord.next_alarm(), Some(pending));

    // Later ticks, including the one at exactly 11:00:00, neither fetch nor move the alarm
    tokio::time::sleep(Duration::from_millis(2_669_500)).await;
    assert_eq!(client.fetch_calls(), 1);
    assert_eq!(coord.next_alarm(), Some(pending));

    // 11:00:01 fires the alarm, which fetches and arms the following hour
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(client.fetch_calls(), 2);
    assert_eq!(
        coord.next_alarm(),
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap())
    );

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
    assert_eq!(coord.next_alarm(), None);
}
