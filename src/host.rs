//! Host platform seams
//!
//! The live-state store and the wall clock belong to the host automation
//! platform. They are modelled as small traits with in-process
//! implementations used by the daemon and by tests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError, RwLock};

/// State strings the host uses when no real value exists
pub const STATE_UNKNOWN: &str = "unknown";
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// One entity as seen in the host's live-state store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    pub attributes: Map<String, Value>,
    pub last_updated: DateTime<Utc>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
            last_updated: Utc::now(),
        }
    }

    /// Domain part of the entity id (`sensor` in `sensor.foo`)
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(domain, _)| domain)
    }

    /// Whether the state carries a real value
    pub fn has_value(&self) -> bool {
        let s = self.state.trim();
        !s.is_empty() && s != STATE_UNKNOWN && s != STATE_UNAVAILABLE
    }
}

/// Read/write access to the host's live-state store
pub trait StateStore: Send + Sync {
    /// Current state of an entity, if it exists
    fn get(&self, entity_id: &str) -> Option<EntityState>;

    /// Insert or replace an entity state
    fn set(&self, state: EntityState);

    /// Remove an entity; returns whether it existed
    fn remove(&self, entity_id: &str) -> bool;

    /// Entity ids within a domain, sorted
    fn entity_ids(&self, domain: &str) -> Vec<String>;
}

/// In-process live-state store
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    states: RwLock<BTreeMap<String, EntityState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored state, sorted by entity id
    pub fn all(&self) -> Vec<EntityState> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
            .cloned()
    }

    fn set(&self, state: EntityState) {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state.entity_id.clone(), state);
    }

    fn remove(&self, entity_id: &str) -> bool {
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(entity_id)
            .is_some()
    }

    fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.domain() == domain)
            .map(|s| s.entity_id.clone())
            .collect()
    }
}

/// Source of wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
