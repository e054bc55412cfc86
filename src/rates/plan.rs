//! OpenEI rate-plan document and its evaluation at a point in time
//!
//! A plan lists rate periods (`energyratestructure`), each with usage tiers,
//! and two 12x24 month/hour matrices mapping weekday and weekend hours to a
//! period index. Evaluating a plan picks the period for the local hour and
//! the tier for the month-to-date meter reading.

use crate::error::{OpenEiError, Result};
use crate::rates::types::{RateSnapshot, ValueWithUnit};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// How far ahead to look for the next period change
const NEXT_CHANGE_HORIZON_HOURS: i64 = 24 * 14;

/// One usage tier of a rate period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateTier {
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub adj: Option<f64>,
    /// Upper bound of the tier in kWh per month; unbounded when absent
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub sell: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// OpenEI utility rate plan (`detail=full` item)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatePlan {
    pub label: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub utility: Option<String>,
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub dgrules: Option<String>,
    #[serde(default)]
    pub energyratestructure: Vec<Vec<RateTier>>,
    #[serde(default)]
    pub energyweekdayschedule: Vec<Vec<usize>>,
    #[serde(default)]
    pub energyweekendschedule: Vec<Vec<usize>>,
    #[serde(default)]
    pub fixedchargefirstmeter: Option<f64>,
    #[serde(default)]
    pub fixedchargeunits: Option<String>,
    #[serde(default)]
    pub mincharge: Option<f64>,
    #[serde(default)]
    pub minchargeunits: Option<String>,
}

/// Start of the local hour containing `at`, as an absolute instant
pub fn local_hour_start(at: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = at.with_timezone(&tz);
    let into_hour = Duration::seconds(i64::from(local.minute()) * 60 + i64::from(local.second()))
        + Duration::nanoseconds(i64::from(local.nanosecond() % 1_000_000_000));
    at - into_hour
}

impl RatePlan {
    /// Rate period in effect at `at`
    pub fn period_at(&self, at: DateTime<Utc>, tz: Tz) -> Result<usize> {
        let local = at.with_timezone(&tz);
        let weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        let schedule = if weekend && !self.energyweekendschedule.is_empty() {
            &self.energyweekendschedule
        } else {
            &self.energyweekdayschedule
        };

        let period = schedule
            .get(local.month0() as usize)
            .and_then(|hours| hours.get(local.hour() as usize))
            .copied()
            .ok_or_else(|| {
                OpenEiError::malformed(format!(
                    "plan {} has no schedule entry for month {} hour {}",
                    self.label,
                    local.month(),
                    local.hour()
                ))
            })?;

        if period >= self.energyratestructure.len() {
            return Err(OpenEiError::malformed(format!(
                "plan {} schedules period {} but lists {}",
                self.label,
                period,
                self.energyratestructure.len()
            )));
        }
        Ok(period)
    }

    /// Tier of `period` matching a month-to-date reading; first tier without one
    fn tier_for(&self, period: usize, reading: Option<f64>) -> Result<&RateTier> {
        let tiers = self
            .energyratestructure
            .get(period)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                OpenEiError::malformed(format!("plan {} period {} has no tiers", self.label, period))
            })?;

        let Some(reading) = reading else {
            return Ok(&tiers[0]);
        };
        Ok(tiers
            .iter()
            .find(|t| t.max.is_none_or(|max| reading <= max))
            .unwrap_or(&tiers[tiers.len() - 1]))
    }

    /// Next period change after `at`, within two weeks
    fn next_change(&self, at: DateTime<Utc>, tz: Tz, current: usize) -> Result<Option<(usize, DateTime<Utc>)>> {
        let hour_start = local_hour_start(at, tz);
        for step in 1..=NEXT_CHANGE_HORIZON_HOURS {
            let candidate = hour_start + Duration::hours(step);
            let period = self.period_at(candidate, tz)?;
            if period != current {
                return Ok(Some((period, candidate)));
            }
        }
        Ok(None)
    }

    /// Every tier rate in listing order
    pub fn all_rates(&self) -> Vec<f64> {
        self.energyratestructure
            .iter()
            .flat_map(|tiers| tiers.iter().filter_map(|t| t.rate))
            .collect()
    }

    /// Evaluate the plan at `at` for an optional month-to-date meter reading
    pub fn evaluate(&self, at: DateTime<Utc>, tz: Tz, reading: Option<f64>) -> Result<RateSnapshot> {
        if self.energyratestructure.is_empty() {
            return Err(OpenEiError::malformed(format!(
                "plan {} lists no energy rates",
                self.label
            )));
        }

        let period = self.period_at(at, tz)?;
        let tier = self.tier_for(period, reading)?;
        let next = self.next_change(at, tz, period)?;

        let monthly_tier_rate = reading.and_then(|_| {
            tier.rate
                .map(|rate| rate + tier.adj.unwrap_or(0.0))
        });

        Ok(RateSnapshot {
            current_rate: tier.rate,
            current_adjustment: tier.adj,
            distributed_generation: self.dgrules.clone(),
            rate_name: Some(self.name.clone()).filter(|n| !n.is_empty()),
            current_energy_rate_structure: u32::try_from(period).ok(),
            next_energy_rate_structure: next.and_then(|(p, _)| u32::try_from(p).ok()),
            next_energy_rate_structure_time: next.map(|(_, t)| t),
            all_rates: self.all_rates(),
            monthly_tier_rate,
            mincharge: self
                .mincharge
                .map(|v| ValueWithUnit::new(v, self.minchargeunits.clone().unwrap_or_default())),
            fixedchargefirstmeter: self.fixedchargefirstmeter.map(|v| {
                ValueWithUnit::new(v, self.fixedchargeunits.clone().unwrap_or_default())
            }),
            current_sell_rate: tier.sell,
            approval: self.approved.unwrap_or(false),
        })
    }
}
