//! Per-entry rate coordinator
//!
//! Owns the cached flattened mapping for one configuration entry and decides
//! when the rate client is called. Two triggers drive it: a fallback poll
//! that only fetches while nothing is cached, and an hourly alarm that always
//! fetches. Rate-limit responses start a backoff measured in update cycles.
//! Observers follow the coordinator through a [`watch`] channel.

pub mod alarm;

pub use alarm::{HourlyAlarm, next_top_of_hour};

use crate::config::ConfigurationRecord;
use crate::error::{OpenEiError, Result};
pub use crate::fields::CachedMapping;
use crate::host::{Clock, StateStore};
use crate::logging::{StructuredLogger, get_entry_logger};
use crate::rates::{RateClient, RateRequest};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval_at};

/// Cycles to skip after a rate limit when nothing is cached yet
pub const RATE_LIMIT_BACKOFF_EMPTY: u32 = 3;

/// Cycles to skip after a rate limit while a mapping is cached
pub const RATE_LIMIT_BACKOFF_CACHED: u32 = 6;

/// What observers see after every update
#[derive(Debug, Clone)]
pub struct CoordinatorSnapshot {
    pub data: Arc<CachedMapping>,
    pub last_update_success: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for CoordinatorSnapshot {
    fn default() -> Self {
        Self {
            data: Arc::new(CachedMapping::default()),
            last_update_success: true,
            last_updated: None,
            last_error: None,
        }
    }
}

/// Runtime settings shared by every coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub timezone: Tz,
    pub storage_dir: PathBuf,
    pub fallback_interval: Duration,
}

#[derive(Debug, Default)]
struct UpdateState {
    rate_limit_count: u32,
}

pub struct RateCoordinator {
    record: ConfigurationRecord,
    client: Arc<dyn RateClient>,
    states: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    settings: CoordinatorSettings,
    /// Serialises read-decide-fetch-replace across both triggers
    update: tokio::sync::Mutex<UpdateState>,
    alarm: Mutex<HourlyAlarm>,
    published: watch::Sender<CoordinatorSnapshot>,
    logger: StructuredLogger,
}

impl RateCoordinator {
    pub fn new(
        record: ConfigurationRecord,
        client: Arc<dyn RateClient>,
        states: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        settings: CoordinatorSettings,
    ) -> Self {
        let (published, _) = watch::channel(CoordinatorSnapshot::default());
        let logger = get_entry_logger("coordinator", &record.entry_id);
        Self {
            record,
            client,
            states,
            clock,
            settings,
            update: tokio::sync::Mutex::new(UpdateState::default()),
            alarm: Mutex::new(HourlyAlarm::new()),
            published,
            logger,
        }
    }

    pub fn record(&self) -> &ConfigurationRecord {
        &self.record
    }

    pub fn entry_id(&self) -> &str {
        &self.record.entry_id
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorSnapshot> {
        self.published.subscribe()
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        self.published.borrow().clone()
    }

    /// Current cached mapping; empty until the first successful fetch
    pub fn data(&self) -> Arc<CachedMapping> {
        Arc::clone(&self.published.borrow().data)
    }

    pub fn last_update_success(&self) -> bool {
        self.published.borrow().last_update_success
    }

    /// Remaining rate-limit backoff cycles
    pub async fn rate_limit_count(&self) -> u32 {
        self.update.lock().await.rate_limit_count
    }

    pub fn next_alarm(&self) -> Option<DateTime<Utc>> {
        self.alarm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .deadline()
    }

    fn arm_alarm(&self) -> DateTime<Utc> {
        let deadline = self
            .alarm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .arm(self.clock.now(), self.settings.timezone);
        self.logger.debug(&format!("Next hourly update at {}", deadline));
        deadline
    }

    /// Fallback poll: fetch only while nothing is cached
    ///
    /// A pending alarm is left alone; one that is already due is consumed
    /// here and counts as an hourly fetch.
    pub async fn refresh(&self) -> Result<()> {
        let mut state = self.update.lock().await;
        let now = self.clock.now();
        let overdue = {
            let mut alarm = self.alarm.lock().unwrap_or_else(PoisonError::into_inner);
            let overdue = alarm.is_due(now);
            if let Some(deadline) = alarm.arm_if_idle(now, self.settings.timezone) {
                self.logger.debug(&format!("Next hourly update at {}", deadline));
            }
            overdue
        };
        if overdue || self.published.borrow().data.is_empty() {
            self.fetch_locked(&mut state).await
        } else {
            Ok(())
        }
    }

    /// Hourly alarm: re-arm and always fetch
    pub async fn on_alarm(&self) -> Result<()> {
        let mut state = self.update.lock().await;
        self.arm_alarm();
        self.fetch_locked(&mut state).await
    }

    /// One update attempt, honouring the rate-limit backoff
    pub async fn fetch_and_update(&self) -> Result<()> {
        let mut state = self.update.lock().await;
        self.fetch_locked(&mut state).await
    }

    async fn fetch_locked(&self, state: &mut UpdateState) -> Result<()> {
        if state.rate_limit_count > 0 {
            state.rate_limit_count -= 1;
            self.logger.debug(&format!(
                "Rate limit backoff, {} cycle(s) left",
                state.rate_limit_count
            ));
            self.publish(None, true, None);
            return Ok(());
        }

        let Some(plan) = self.record.effective_plan() else {
            let err = OpenEiError::config("no rate plan selected");
            self.publish(None, false, Some(err.to_string()));
            return Err(OpenEiError::update_failed(err.to_string()));
        };

        let request = RateRequest {
            api_key: self.record.api_key.clone(),
            plan: plan.to_string(),
            reading: self.resolve_meter(),
            cache_file: self.record.cache_file(&self.settings.storage_dir),
            at: self.clock.now(),
            timezone: self.settings.timezone,
        };

        match self.client.fetch_rates(&request).await {
            Ok(snapshot) => {
                let mapping = CachedMapping::from_snapshot(&snapshot);
                self.logger.debug(&format!(
                    "Updated rate data for plan {} ({} values)",
                    plan,
                    mapping.len()
                ));
                self.publish(Some(Arc::new(mapping)), true, None);
                Ok(())
            }
            Err(e) if e.is_rate_limited() => {
                self.logger.error("API Rate limit exceeded, retrying later.");
                state.rate_limit_count = if self.published.borrow().data.is_empty() {
                    RATE_LIMIT_BACKOFF_EMPTY
                } else {
                    RATE_LIMIT_BACKOFF_CACHED
                };
                self.publish(None, true, None);
                Ok(())
            }
            Err(e) if e.is_malformed() => {
                self.logger
                    .warn(&format!("Ignoring malformed rate data: {}", e));
                self.publish(None, true, None);
                Ok(())
            }
            Err(e) => {
                self.logger.error(&format!("Rate update failed: {}", e));
                self.publish(None, false, Some(e.to_string()));
                Err(OpenEiError::update_failed(e.to_string()))
            }
        }
    }

    /// Numeric reading of the configured meter, if it is usable
    fn resolve_meter(&self) -> Option<f64> {
        let meter = self.record.sensor.as_deref()?;
        self.logger
            .debug(&format!("Using meter data from sensor: {}", meter));

        let reading = self
            .states
            .get(meter)
            .filter(|s| s.has_value())
            .and_then(|s| s.state.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());

        if reading.is_none() {
            self.logger.warn(&format!("Sensor: {} is not valid.", meter));
        }
        reading
    }

    fn publish(&self, data: Option<Arc<CachedMapping>>, success: bool, error: Option<String>) {
        let now = self.clock.now();
        self.published.send_modify(|snap| {
            if let Some(data) = data {
                snap.data = data;
                snap.last_updated = Some(now);
            }
            snap.last_update_success = success;
            snap.last_error = error;
        });
    }

    /// Drive both triggers until `shutdown` flips to true or its sender drops
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.settings.fallback_interval;
        let mut fallback = interval_at(tokio::time::Instant::now() + period, period);
        fallback.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if self.next_alarm().is_none() {
            self.arm_alarm();
        }
        self.logger.info(&format!(
            "Coordinator started for plan {}",
            self.record.effective_plan().unwrap_or("-")
        ));

        loop {
            let until_alarm = self
                .alarm
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remaining(self.clock.now())
                .unwrap_or(period);

            tokio::select! {
                _ = fallback.tick() => {
                    if let Err(e) = self.refresh().await {
                        self.logger.warn(&format!("Fallback update failed: {}", e));
                    }
                }
                () = tokio::time::sleep(until_alarm) => {
                    if let Err(e) = self.on_alarm().await {
                        self.logger.warn(&format!("Hourly update failed: {}", e));
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.logger.info("Coordinator stopping");
                        break;
                    }
                }
            }
        }

        self.alarm
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .disarm();
    }
}
