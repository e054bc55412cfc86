//! OpenEI rate-plan access
//!
//! The coordinator only talks to the [`RateClient`] trait. The HTTP
//! implementation lives behind the `http` feature; plan evaluation and the
//! plan cache file are plain code so they can be exercised without network.

pub mod cache;
#[cfg(feature = "http")]
pub mod client;
pub mod plan;
pub mod types;

#[cfg(feature = "http")]
pub use client::OpenEiClient;
pub use plan::{RatePlan, RateTier};
pub use types::{PlanDirectory, PlanLookup, PlanSummary, RateRequest, RateSnapshot, ValueWithUnit};

use crate::error::Result;

/// Source of rate snapshots and plan listings
///
/// Implementations report an upstream rate limit as
/// [`OpenEiError::RateLimited`](crate::error::OpenEiError::RateLimited) and
/// unusable plan data as
/// [`OpenEiError::MalformedResponse`](crate::error::OpenEiError::MalformedResponse).
#[async_trait::async_trait]
pub trait RateClient: Send + Sync {
    /// Fetch the plan and evaluate it at `request.at`
    async fn fetch_rates(&self, request: &RateRequest) -> Result<RateSnapshot>;

    /// List utilities and their residential plans around a location
    async fn lookup_plans(&self, lookup: &PlanLookup) -> Result<PlanDirectory>;
}
