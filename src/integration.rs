//! Entry lifecycle
//!
//! [`Integration`] owns every loaded configuration entry. Setting an entry up
//! builds its coordinator, performs the first refresh, registers the sensor
//! adapters and starts two tasks: the coordinator loop and a publisher that
//! rewrites the entry's entities whenever the coordinator publishes.

use crate::config::ConfigurationRecord;
use crate::coordinator::{CoordinatorSettings, RateCoordinator};
use crate::entity::{RateBinarySensor, RateSensor};
use crate::error::{OpenEiError, Result};
use crate::host::{Clock, StateStore};
use crate::logging::{StructuredLogger, get_entry_logger, get_logger, startup_banner};
use crate::rates::RateClient;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;

/// How long unload waits for an entry's tasks before aborting them
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything that belongs to one loaded entry
pub struct LoadedEntry {
    pub coordinator: Arc<RateCoordinator>,
    pub sensors: Vec<RateSensor>,
    pub binary_sensors: Vec<RateBinarySensor>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl LoadedEntry {
    /// Entity ids registered for this entry
    pub fn entity_ids(&self) -> Vec<String> {
        self.sensors
            .iter()
            .map(|s| s.entity_id().to_string())
            .chain(self.binary_sensors.iter().map(|b| b.entity_id().to_string()))
            .collect()
    }
}

fn publish_entities(sensors: &[RateSensor], binary: &[RateBinarySensor], store: &dyn StateStore) {
    for sensor in sensors {
        sensor.publish(store);
    }
    for sensor in binary {
        sensor.publish(store);
    }
}

pub struct Integration {
    client: Arc<dyn RateClient>,
    states: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    settings: CoordinatorSettings,
    entries: HashMap<String, LoadedEntry>,
    banner_logged: bool,
    logger: StructuredLogger,
}

impl Integration {
    pub fn new(
        client: Arc<dyn RateClient>,
        states: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            client,
            states,
            clock,
            settings,
            entries: HashMap::new(),
            banner_logged: false,
            logger: get_logger("integration"),
        }
    }

    pub fn is_loaded(&self, entry_id: &str) -> bool {
        self.entries.contains_key(entry_id)
    }

    pub fn entry(&self, entry_id: &str) -> Option<&LoadedEntry> {
        self.entries.get(entry_id)
    }

    pub fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Load one entry
    ///
    /// Fails with [`OpenEiError::NotReady`] when no plan is configured (before
    /// any API call) or when the first refresh fails; the caller retries later.
    pub async fn setup(&mut self, record: ConfigurationRecord) -> Result<()> {
        let record = record.normalized();
        let logger = get_entry_logger("integration", &record.entry_id);

        if !self.banner_logged {
            self.logger.info(&startup_banner());
            self.banner_logged = true;
        }

        if self.entries.contains_key(&record.entry_id) {
            return Err(OpenEiError::config(format!(
                "entry {} is already loaded",
                record.entry_id
            )));
        }

        if record.effective_plan().is_none() {
            return Err(OpenEiError::not_ready(
                "no rate plan selected; reconfigure the entry",
            ));
        }

        let coordinator = Arc::new(RateCoordinator::new(
            record.clone(),
            Arc::clone(&self.client),
            Arc::clone(&self.states),
            Arc::clone(&self.clock),
            self.settings.clone(),
        ));

        coordinator
            .refresh()
            .await
            .map_err(|e| OpenEiError::not_ready(e.to_string()))?;
        if !coordinator.last_update_success() {
            return Err(OpenEiError::not_ready("first refresh did not succeed"));
        }

        // Entries sharing a title must not share entity ids
        let claimed: HashSet<String> = self
            .entries
            .values()
            .flat_map(|entry| entry.entity_ids())
            .collect();
        let states = Arc::clone(&self.states);
        let taken = |id: &str| claimed.contains(id) || states.get(id).is_some();
        let sensors = RateSensor::all_for(&coordinator, &taken);
        let binary_sensors = RateBinarySensor::all_for(&coordinator, &taken);
        publish_entities(&sensors, &binary_sensors, self.states.as_ref());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            self.spawn_coordinator(Arc::clone(&coordinator), shutdown_rx.clone()),
            self.spawn_publisher(&coordinator, &sensors, &binary_sensors, shutdown_rx),
        ];

        logger.info(&format!(
            "Loaded {} ({} sensors, {} binary sensors)",
            if record.title.is_empty() { &record.entry_id } else { &record.title },
            sensors.len(),
            binary_sensors.len()
        ));

        self.entries.insert(
            record.entry_id.clone(),
            LoadedEntry {
                coordinator,
                sensors,
                binary_sensors,
                shutdown,
                tasks,
            },
        );
        Ok(())
    }

    fn spawn_coordinator(
        &self,
        coordinator: Arc<RateCoordinator>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            coordinator.run(shutdown).await;
        })
    }

    fn spawn_publisher(
        &self,
        coordinator: &Arc<RateCoordinator>,
        sensors: &[RateSensor],
        binary_sensors: &[RateBinarySensor],
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let mut updates = WatchStream::from_changes(coordinator.subscribe());
        let sensors = sensors.to_vec();
        let binary_sensors = binary_sensors.to_vec();
        let states = Arc::clone(&self.states);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.next() => {
                        if update.is_none() {
                            break;
                        }
                        publish_entities(&sensors, &binary_sensors, states.as_ref());
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Tear down one entry and remove only its entities
    pub async fn unload(&mut self, entry_id: &str) -> bool {
        let Some(entry) = self.entries.remove(entry_id) else {
            return false;
        };
        let logger = get_entry_logger("integration", entry_id);

        let _ = entry.shutdown.send(true);
        for task in entry.tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(TASK_STOP_TIMEOUT, task).await.is_err() {
                logger.warn("Entry task did not stop in time, aborting");
                abort.abort();
            }
        }

        let mut removed = 0usize;
        for sensor in &entry.sensors {
            removed += usize::from(sensor.remove(self.states.as_ref()));
        }
        for sensor in &entry.binary_sensors {
            removed += usize::from(sensor.remove(self.states.as_ref()));
        }
        logger.info(&format!("Unloaded entry, removed {} entities", removed));
        true
    }

    /// Reload an entry with changed options
    pub async fn options_updated(&mut self, record: ConfigurationRecord) -> Result<()> {
        self.unload(&record.entry_id).await;
        self.setup(record).await
    }

    pub async fn unload_all(&mut self) {
        for id in self.entry_ids() {
            self.unload(&id).await;
        }
    }
}
