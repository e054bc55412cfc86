//! Declared sensor fields and the flattened mapping built from a snapshot
//!
//! Every field the integration exposes is listed once here, with the
//! accessor that reads it off a [`RateSnapshot`]. The coordinator flattens a
//! snapshot through this table and the entity adapters read the result.

use crate::rates::RateSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Suffix of the companion key holding a field's unit of measure
pub const UOM_SUFFIX: &str = "_uom";

/// Attribution attribute shown on every entity
pub const ATTRIBUTION: &str = "Data provided by OpenEI.org";

/// One flattened value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Missing,
    Flag(bool),
    Number(f64),
    Numbers(Vec<f64>),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl FieldValue {
    /// Host state string; `None` when there is no value
    pub fn state_string(&self) -> Option<String> {
        match self {
            FieldValue::Missing => None,
            FieldValue::Flag(b) => Some(if *b { "on" } else { "off" }.to_string()),
            FieldValue::Number(n) => Some(n.to_string()),
            FieldValue::Numbers(ns) => Some(format!(
                "[{}]",
                ns.iter().map(f64::to_string).collect::<Vec<_>>().join(", ")
            )),
            FieldValue::Timestamp(t) => Some(t.to_rfc3339()),
            FieldValue::Text(s) => Some(s.clone()),
        }
    }

    /// JSON form used for entity attributes
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(FieldValue::Missing, FieldValue::Number)
    }
}

impl From<Option<u32>> for FieldValue {
    fn from(v: Option<u32>) -> Self {
        v.map_or(FieldValue::Missing, |n| FieldValue::Number(f64::from(n)))
    }
}

impl From<Option<String>> for FieldValue {
    fn from(v: Option<String>) -> Self {
        v.map_or(FieldValue::Missing, FieldValue::Text)
    }
}

impl From<Option<DateTime<Utc>>> for FieldValue {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        v.map_or(FieldValue::Missing, FieldValue::Timestamp)
    }
}

/// A field as read off a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Scalar(FieldValue),
    Measured { value: f64, unit: String },
}

/// Host entity category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityCategory {
    Diagnostic,
}

impl EntityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Diagnostic => "diagnostic",
        }
    }
}

/// Declared sensor fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorField {
    CurrentRate,
    CurrentAdjustment,
    DistributedGeneration,
    RateName,
    CurrentEnergyRateStructure,
    NextEnergyRateStructure,
    NextEnergyRateStructureTime,
    AllRates,
    MonthlyTierRate,
    MinCharge,
    FixedChargeFirstMeter,
    CurrentSellRate,
}

impl SensorField {
    pub const ALL: [SensorField; 12] = [
        SensorField::CurrentRate,
        SensorField::CurrentAdjustment,
        SensorField::DistributedGeneration,
        SensorField::RateName,
        SensorField::CurrentEnergyRateStructure,
        SensorField::NextEnergyRateStructure,
        SensorField::NextEnergyRateStructureTime,
        SensorField::AllRates,
        SensorField::MonthlyTierRate,
        SensorField::MinCharge,
        SensorField::FixedChargeFirstMeter,
        SensorField::CurrentSellRate,
    ];

    /// Mapping key
    pub fn key(&self) -> &'static str {
        match self {
            SensorField::CurrentRate => "current_rate",
            SensorField::CurrentAdjustment => "current_adjustment",
            SensorField::DistributedGeneration => "distributed_generation",
            SensorField::RateName => "rate_name",
            SensorField::CurrentEnergyRateStructure => "current_energy_rate_structure",
            SensorField::NextEnergyRateStructure => "next_energy_rate_structure",
            SensorField::NextEnergyRateStructureTime => "next_energy_rate_structure_time",
            SensorField::AllRates => "all_rates",
            SensorField::MonthlyTierRate => "monthly_tier_rate",
            SensorField::MinCharge => "mincharge",
            SensorField::FixedChargeFirstMeter => "fixedchargefirstmeter",
            SensorField::CurrentSellRate => "current_sell_rate",
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            SensorField::CurrentRate => "Current Energy Rate",
            SensorField::CurrentAdjustment => "Current Energy Adjustment",
            SensorField::DistributedGeneration => "Distributed Generation",
            SensorField::RateName => "Plan Name",
            SensorField::CurrentEnergyRateStructure => "Current Energy Rate Structure",
            SensorField::NextEnergyRateStructure => "Next Energy Rate Structure",
            SensorField::NextEnergyRateStructureTime => "Next Energy Rate Structure Time",
            SensorField::AllRates => "All Listed Rates",
            SensorField::MonthlyTierRate => "Monthly Energy Rate",
            SensorField::MinCharge => "Minimum Charge",
            SensorField::FixedChargeFirstMeter => "Fixed Charge (first meter)",
            SensorField::CurrentSellRate => "Current Energy Sell Rate",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            SensorField::DistributedGeneration => "mdi:gauge",
            SensorField::RateName
            | SensorField::CurrentEnergyRateStructure
            | SensorField::NextEnergyRateStructure => "mdi:tag",
            SensorField::NextEnergyRateStructureTime => "mdi:clock-outline",
            SensorField::AllRates => "mdi:format-list-bulleted",
            SensorField::CurrentRate
            | SensorField::CurrentAdjustment
            | SensorField::MonthlyTierRate
            | SensorField::MinCharge
            | SensorField::FixedChargeFirstMeter
            | SensorField::CurrentSellRate => "mdi:cash-multiple",
        }
    }

    pub fn device_class(&self) -> Option<&'static str> {
        match self {
            SensorField::NextEnergyRateStructureTime => Some("timestamp"),
            _ => None,
        }
    }

    pub fn entity_category(&self) -> Option<EntityCategory> {
        match self {
            SensorField::DistributedGeneration
            | SensorField::MinCharge
            | SensorField::FixedChargeFirstMeter => Some(EntityCategory::Diagnostic),
            _ => None,
        }
    }

    /// Read this field off a snapshot
    pub fn read(&self, snapshot: &RateSnapshot) -> Reading {
        let measured = |v: &Option<crate::rates::ValueWithUnit>| match v {
            Some(m) => Reading::Measured {
                value: m.value,
                unit: m.unit.clone(),
            },
            None => Reading::Scalar(FieldValue::Missing),
        };

        match self {
            SensorField::CurrentRate => Reading::Scalar(snapshot.current_rate.into()),
            SensorField::CurrentAdjustment => Reading::Scalar(snapshot.current_adjustment.into()),
            SensorField::DistributedGeneration => {
                Reading::Scalar(snapshot.distributed_generation.clone().into())
            }
            SensorField::RateName => Reading::Scalar(snapshot.rate_name.clone().into()),
            SensorField::CurrentEnergyRateStructure => {
                Reading::Scalar(snapshot.current_energy_rate_structure.into())
            }
            SensorField::NextEnergyRateStructure => {
                Reading::Scalar(snapshot.next_energy_rate_structure.into())
            }
            SensorField::NextEnergyRateStructureTime => {
                Reading::Scalar(snapshot.next_energy_rate_structure_time.into())
            }
            SensorField::AllRates => Reading::Scalar(FieldValue::Numbers(snapshot.all_rates.clone())),
            SensorField::MonthlyTierRate => Reading::Scalar(snapshot.monthly_tier_rate.into()),
            SensorField::MinCharge => measured(&snapshot.mincharge),
            SensorField::FixedChargeFirstMeter => measured(&snapshot.fixedchargefirstmeter),
            SensorField::CurrentSellRate => Reading::Scalar(snapshot.current_sell_rate.into()),
        }
    }
}

/// Declared binary sensor fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryField {
    Approval,
}

impl BinaryField {
    pub const ALL: [BinaryField; 1] = [BinaryField::Approval];

    pub fn key(&self) -> &'static str {
        match self {
            BinaryField::Approval => "approval",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BinaryField::Approval => "Approval",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            BinaryField::Approval => "mdi:check",
        }
    }

    pub fn device_class(&self) -> Option<&'static str> {
        match self {
            BinaryField::Approval => Some("connectivity"),
        }
    }

    pub fn entity_category(&self) -> Option<EntityCategory> {
        match self {
            BinaryField::Approval => Some(EntityCategory::Diagnostic),
        }
    }

    pub fn read(&self, snapshot: &RateSnapshot) -> bool {
        match self {
            BinaryField::Approval => snapshot.approval,
        }
    }
}

/// Last successfully flattened snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedMapping {
    values: BTreeMap<String, FieldValue>,
}

impl CachedMapping {
    /// Flatten every declared field of a snapshot
    pub fn from_snapshot(snapshot: &RateSnapshot) -> Self {
        let mut values = BTreeMap::new();

        for field in SensorField::ALL {
            match field.read(snapshot) {
                Reading::Scalar(value) => {
                    values.insert(field.key().to_string(), value);
                }
                Reading::Measured { value, unit } => {
                    values.insert(field.key().to_string(), FieldValue::Number(value));
                    values.insert(format!("{}{}", field.key(), UOM_SUFFIX), FieldValue::Text(unit));
                }
            }
        }

        for field in BinaryField::ALL {
            values.insert(field.key().to_string(), FieldValue::Flag(field.read(snapshot)));
        }

        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values.get(key)
    }

    /// Unit stored alongside a measured field
    pub fn unit_of(&self, key: &str) -> Option<&str> {
        self.values
            .get(&format!("{}{}", key, UOM_SUFFIX))
            .and_then(FieldValue::as_text)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
