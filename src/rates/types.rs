use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A numeric value paired with its unit, e.g. `(10, "$/month")`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueWithUnit {
    pub value: f64,
    pub unit: String,
}

impl ValueWithUnit {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }
}

/// Rate values for one plan at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub current_rate: Option<f64>,
    pub current_adjustment: Option<f64>,
    pub distributed_generation: Option<String>,
    pub rate_name: Option<String>,
    pub current_energy_rate_structure: Option<u32>,
    pub next_energy_rate_structure: Option<u32>,
    pub next_energy_rate_structure_time: Option<DateTime<Utc>>,
    pub all_rates: Vec<f64>,
    pub monthly_tier_rate: Option<f64>,
    pub mincharge: Option<ValueWithUnit>,
    pub fixedchargefirstmeter: Option<ValueWithUnit>,
    pub current_sell_rate: Option<f64>,
    pub approval: bool,
}

/// Parameters for one rate fetch
#[derive(Clone)]
pub struct RateRequest {
    pub api_key: String,
    /// Plan label (OpenEI `getpage`)
    pub plan: String,
    /// Live meter reading in kWh, when a meter is configured and readable
    pub reading: Option<f64>,
    /// Per-entry cache file owned by the client
    pub cache_file: PathBuf,
    /// Instant the rates are evaluated at
    pub at: DateTime<Utc>,
    /// Timezone of the rate schedules
    pub timezone: Tz,
}

impl std::fmt::Debug for RateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateRequest")
            .field("plan", &self.plan)
            .field("reading", &self.reading)
            .field("cache_file", &self.cache_file)
            .field("at", &self.at)
            .field("timezone", &self.timezone)
            .finish_non_exhaustive()
    }
}

/// Parameters for listing utilities and plans
#[derive(Clone)]
pub struct PlanLookup {
    pub api_key: String,
    /// Address or "lat,lon"
    pub location: String,
    /// Search radius in miles
    pub radius: Option<f64>,
}

impl PlanLookup {
    /// Split a "lat,lon" location into coordinates
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let (lat, lon) = self.location.split_once(',')?;
        let lat = lat.trim().parse::<f64>().ok()?;
        let lon = lon.trim().parse::<f64>().ok()?;
        ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)).then_some((lat, lon))
    }
}

impl std::fmt::Debug for PlanLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanLookup")
            .field("location", &self.location)
            .field("radius", &self.radius)
            .finish_non_exhaustive()
    }
}

/// One selectable plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub name: String,
    pub label: String,
}

/// Plans grouped by utility name
pub type PlanDirectory = BTreeMap<String, Vec<PlanSummary>>;
