//! # OpenEI rates - utility rate sensors for home automation hosts
//!
//! Polls the OpenEI utility-rate API for a configured rate plan, evaluates
//! the plan for the current hour and exposes the results as sensor entities
//! in the host's live-state store.
//!
//! ## Features
//!
//! - **Hourly refresh**: rates are re-fetched one second after every local
//!   top of the hour, with a short fallback poll until the first data arrives
//! - **Rate-limit aware**: upstream rate limits pause fetching for a few
//!   cycles while the last known values stay published
//! - **Usage tiers**: an optional live energy meter selects the usage tier
//! - **Plan cache**: the raw plan document is cached per entry on disk
//! - **Guided setup**: a three-step flow picks utility and plan by location
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `rates`: Rate client trait, OpenEI HTTP client, plan evaluation
//! - `host`: Live-state store and clock seams
//! - `fields`: Declared sensor fields and the flattened mapping
//! - `coordinator`: Per-entry refresh scheduling and backoff
//! - `entity`: Sensor and binary-sensor adapters
//! - `config_flow`: Setup and reconfigure wizard
//! - `integration`: Entry setup, unload and reload

pub mod config;
pub mod config_flow;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod fields;
pub mod host;
pub mod integration;
pub mod logging;
pub mod rates;

// Re-export commonly used types
pub use config::{Config, ConfigurationRecord};
pub use coordinator::{CoordinatorSettings, CoordinatorSnapshot, RateCoordinator};
pub use error::{OpenEiError, Result};
pub use integration::Integration;
pub use rates::{RateClient, RateSnapshot};
