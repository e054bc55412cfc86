#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use openei_rates::config::ConfigurationRecord;
use openei_rates::coordinator::CoordinatorSettings;
use openei_rates::error::{OpenEiError, Result};
use openei_rates::rates::{
    PlanDirectory, PlanLookup, PlanSummary, RateClient, RateRequest, RateSnapshot, ValueWithUnit,
};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// Rate client that replays queued results and records every request
#[derive(Default)]
pub struct MockRateClient {
    results: Mutex<VecDeque<Result<RateSnapshot>>>,
    lookup_error: Mutex<Option<OpenEiError>>,
    pub directory: Mutex<PlanDirectory>,
    pub requests: Mutex<Vec<RateRequest>>,
    fetch_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl MockRateClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            directory: Mutex::new(sample_directory()),
            ..Self::default()
        })
    }

    pub fn with_results(results: Vec<Result<RateSnapshot>>) -> Arc<Self> {
        let client = Self::new();
        client.results.lock().unwrap().extend(results);
        client
    }

    pub fn push_result(&self, result: Result<RateSnapshot>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn fail_next_lookup(&self, err: OpenEiError) {
        *self.lookup_error.lock().unwrap() = Some(err);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn last_reading(&self) -> Option<f64> {
        self.requests.lock().unwrap().last().and_then(|r| r.reading)
    }
}

#[async_trait::async_trait]
impl RateClient for MockRateClient {
    async fn fetch_rates(&self, request: &RateRequest) -> Result<RateSnapshot> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(sample_snapshot()))
    }

    async fn lookup_plans(&self, _lookup: &PlanLookup) -> Result<PlanDirectory> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.lookup_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.directory.lock().unwrap().clone())
    }
}

pub fn sample_snapshot() -> RateSnapshot {
    RateSnapshot {
        current_rate: Some(0.24477),
        current_adjustment: Some(0.0),
        distributed_generation: Some("Net Metering".into()),
        rate_name: Some("Fake Plan Name".into()),
        current_energy_rate_structure: Some(1),
        next_energy_rate_structure: Some(0),
        next_energy_rate_structure_time: Some(Utc.with_ymd_and_hms(2024, 5, 1, 21, 0, 0).unwrap()),
        all_rates: vec![0.24477, 0.007],
        monthly_tier_rate: None,
        mincharge: Some(ValueWithUnit::new(10.0, "$/month")),
        fixedchargefirstmeter: Some(ValueWithUnit::new(12.38, "$/month")),
        current_sell_rate: Some(0.05),
        approval: true,
    }
}

pub fn sample_directory() -> PlanDirectory {
    PlanDirectory::from([
        (
            "Fake Utility Co".to_string(),
            vec![
                PlanSummary {
                    name: "Fake Plan Name".into(),
                    label: "randomstring".into(),
                },
                PlanSummary {
                    name: "Time of Use".into(),
                    label: "touplan".into(),
                },
            ],
        ),
        (
            "City Power".to_string(),
            vec![PlanSummary {
                name: "Muni Flat".into(),
                label: "muniflat".into(),
            }],
        ),
    ])
}

pub fn sample_record() -> ConfigurationRecord {
    let mut record = ConfigurationRecord::new("fakeAPIKey");
    record.title = "Fake Utility Co".into();
    record.utility = Some("Fake Utility Co".into());
    record.rate_plan = Some("randomstring".into());
    record
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap()
}

pub fn settings(storage_dir: &std::path::Path) -> CoordinatorSettings {
    CoordinatorSettings {
        timezone: chrono_tz::Tz::UTC,
        storage_dir: storage_dir.to_path_buf(),
        fallback_interval: Duration::from_secs(30),
    }
}

/// In-memory sink for formatted tracing output
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

pub struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter(Arc::clone(&self.0))
    }
}

/// Route this thread's tracing output into a buffer until the guard drops
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
