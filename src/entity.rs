//! Sensor and binary-sensor adapters
//!
//! Adapters are thin views over a coordinator: they hold no data of their
//! own and read the coordinator's current mapping whenever the host asks for
//! a state.

use crate::coordinator::{CoordinatorSnapshot, RateCoordinator};
use crate::fields::{ATTRIBUTION, BinaryField, EntityCategory, FieldValue, SensorField};
use crate::host::{EntityState, STATE_UNAVAILABLE, STATE_UNKNOWN, StateStore};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Lower-case slug with runs of non-alphanumerics collapsed to `_`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

fn entity_id(domain: &str, title: &str, name: &str) -> String {
    let title = slugify(title);
    let name = slugify(name);
    if title.is_empty() {
        format!("{}.{}", domain, name)
    } else {
        format!("{}.{}_{}", domain, title, name)
    }
}

/// First of `base`, `base_2`, `base_3`, ... that `taken` does not claim
pub fn unique_entity_id(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn base_attributes(
    name: &str,
    icon: &str,
    device_class: Option<&str>,
    category: Option<EntityCategory>,
) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("attribution".into(), Value::from(ATTRIBUTION));
    attrs.insert("friendly_name".into(), Value::from(name));
    attrs.insert("icon".into(), Value::from(icon));
    if let Some(dc) = device_class {
        attrs.insert("device_class".into(), Value::from(dc));
    }
    if let Some(cat) = category {
        attrs.insert("entity_category".into(), Value::from(cat.as_str()));
    }
    attrs
}

/// Sensor adapter for one declared field of one entry
#[derive(Clone)]
pub struct RateSensor {
    field: SensorField,
    coordinator: Arc<RateCoordinator>,
    entity_id: String,
    unique_id: String,
}

impl RateSensor {
    pub fn new(field: SensorField, coordinator: Arc<RateCoordinator>) -> Self {
        let record = coordinator.record();
        let entity_id = entity_id("sensor", &record.title, field.name());
        let unique_id = format!("{}_{}", field.key(), record.entry_id);
        Self {
            field,
            coordinator,
            entity_id,
            unique_id,
        }
    }

    /// One adapter per declared sensor field, skipping entity ids `taken` claims
    pub fn all_for(coordinator: &Arc<RateCoordinator>, taken: &dyn Fn(&str) -> bool) -> Vec<Self> {
        SensorField::ALL
            .iter()
            .map(|f| {
                let mut sensor = Self::new(*f, Arc::clone(coordinator));
                sensor.entity_id = unique_entity_id(&sensor.entity_id, taken);
                sensor
            })
            .collect()
    }

    pub fn field(&self) -> SensorField {
        self.field
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn name(&self) -> &'static str {
        self.field.name()
    }

    pub fn icon(&self) -> &'static str {
        self.field.icon()
    }

    pub fn device_class(&self) -> Option<&'static str> {
        self.field.device_class()
    }

    pub fn entity_category(&self) -> Option<EntityCategory> {
        self.field.entity_category()
    }

    pub fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    /// Unit of measurement stored with the value, if any
    pub fn unit(&self) -> Option<String> {
        self.coordinator
            .data()
            .unit_of(self.field.key())
            .map(str::to_string)
    }

    /// Current value read through the coordinator
    pub fn value(&self) -> FieldValue {
        self.coordinator
            .data()
            .get(self.field.key())
            .cloned()
            .unwrap_or(FieldValue::Missing)
    }

    /// State string plus attributes as the host would store them
    pub fn state(&self) -> EntityState {
        self.state_from(&self.coordinator.snapshot())
    }

    fn state_from(&self, snap: &CoordinatorSnapshot) -> EntityState {
        let value = snap
            .data
            .get(self.field.key())
            .cloned()
            .unwrap_or(FieldValue::Missing);

        let state = if snap.last_update_success {
            value
                .state_string()
                .unwrap_or_else(|| STATE_UNKNOWN.to_string())
        } else {
            STATE_UNAVAILABLE.to_string()
        };

        let mut attributes = base_attributes(
            self.name(),
            self.icon(),
            self.device_class(),
            self.entity_category(),
        );
        if let Some(unit) = snap.data.unit_of(self.field.key()) {
            attributes.insert("unit_of_measurement".into(), Value::from(unit));
        }
        if self.field == SensorField::CurrentRate
            && let Some(all) = snap.data.get(SensorField::AllRates.key())
        {
            attributes.insert("all_rates".into(), all.to_json());
        }

        let mut entity = EntityState::new(self.entity_id.clone(), state);
        entity.attributes = attributes;
        if let Some(at) = snap.last_updated {
            entity.last_updated = at;
        }
        entity
    }

    pub fn publish(&self, store: &dyn StateStore) {
        store.set(self.state());
    }

    pub fn remove(&self, store: &dyn StateStore) -> bool {
        store.remove(&self.entity_id)
    }
}

/// Binary-sensor adapter for one declared flag of one entry
#[derive(Clone)]
pub struct RateBinarySensor {
    field: BinaryField,
    coordinator: Arc<RateCoordinator>,
    entity_id: String,
    unique_id: String,
}

impl RateBinarySensor {
    pub fn new(field: BinaryField, coordinator: Arc<RateCoordinator>) -> Self {
        let record = coordinator.record();
        let entity_id = entity_id("binary_sensor", &record.title, field.name());
        let unique_id = format!("{}_{}", field.key(), record.entry_id);
        Self {
            field,
            coordinator,
            entity_id,
            unique_id,
        }
    }

    pub fn all_for(coordinator: &Arc<RateCoordinator>, taken: &dyn Fn(&str) -> bool) -> Vec<Self> {
        BinaryField::ALL
            .iter()
            .map(|f| {
                let mut sensor = Self::new(*f, Arc::clone(coordinator));
                sensor.entity_id = unique_entity_id(&sensor.entity_id, taken);
                sensor
            })
            .collect()
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn name(&self) -> &'static str {
        self.field.name()
    }

    pub fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    /// Flag value; `None` until data has been fetched
    pub fn is_on(&self) -> Option<bool> {
        self.coordinator
            .data()
            .get(self.field.key())
            .and_then(FieldValue::as_flag)
    }

    pub fn state(&self) -> EntityState {
        let snap = self.coordinator.snapshot();
        let state = if !snap.last_update_success {
            STATE_UNAVAILABLE.to_string()
        } else {
            match snap.data.get(self.field.key()).and_then(FieldValue::as_flag) {
                Some(true) => "on".to_string(),
                Some(false) => "off".to_string(),
                None => STATE_UNKNOWN.to_string(),
            }
        };

        let mut entity = EntityState::new(self.entity_id.clone(), state);
        entity.attributes = base_attributes(
            self.field.name(),
            self.field.icon(),
            self.field.device_class(),
            self.field.entity_category(),
        );
        if let Some(at) = snap.last_updated {
            entity.last_updated = at;
        }
        entity
    }

    pub fn publish(&self, store: &dyn StateStore) {
        store.set(self.state());
    }

    pub fn remove(&self, store: &dyn StateStore) -> bool {
        store.remove(&self.entity_id)
    }
}
