use crate::config::ApiConfig;
use crate::error::{OpenEiError, Result};
use crate::logging::get_logger;
use crate::rates::cache::{CachedPlan, PlanCache};
use crate::rates::plan::RatePlan;
use crate::rates::types::{PlanDirectory, PlanLookup, PlanSummary, RateRequest, RateSnapshot};
use crate::rates::RateClient;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

/// Error code api.data.gov uses for an exhausted key quota
const OVER_RATE_LIMIT: &str = "OVER_RATE_LIMIT";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UtilityRatesResponse {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct PlanListing {
    label: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    utility: String,
}

/// OpenEI utility_rates HTTP client with a per-entry plan cache
pub struct OpenEiClient {
    http: reqwest::Client,
    base_url: String,
    plan_cache_max_age: Duration,
    logger: crate::logging::StructuredLogger,
}

impl OpenEiClient {
    /// Create a new client from API settings
    pub fn new(cfg: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            plan_cache_max_age: Duration::hours(i64::from(cfg.plan_cache_hours)),
            logger: get_logger("openei_client"),
        })
    }

    /// Issue one utility_rates query and unwrap the envelope
    async fn query(&self, params: &[(&str, String)]) -> Result<Vec<Value>> {
        let resp = self
            .http
            .get(&self.base_url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("openei-rates/", env!("CARGO_PKG_VERSION")))
            .query(&[("version", "latest"), ("format", "json")])
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OpenEiError::rate_limited(format!("HTTP {}", status)));
        }

        let body: Option<UtilityRatesResponse> = resp.json().await.ok();
        if let Some(err) = body.as_ref().and_then(|b| b.error.as_ref()) {
            let message = err.message.clone().unwrap_or_else(|| "unknown API error".to_string());
            if err.code.as_deref() == Some(OVER_RATE_LIMIT) {
                return Err(OpenEiError::rate_limited(message));
            }
            return Err(OpenEiError::api(message));
        }
        if !status.is_success() {
            return Err(OpenEiError::api(format!("OpenEI API error: {}", status)));
        }

        body.map(|b| b.items)
            .ok_or_else(|| OpenEiError::malformed("response is not a utility_rates document"))
    }

    /// Fetch the full plan document for a label
    async fn fetch_plan(&self, api_key: &str, label: &str) -> Result<RatePlan> {
        self.logger.debug(&format!("Fetching plan data for {}", label));
        let items = self
            .query(&[
                ("detail", "full".to_string()),
                ("getpage", label.to_string()),
                ("api_key", api_key.to_string()),
            ])
            .await?;

        let Some(item) = items.into_iter().next() else {
            return Err(OpenEiError::api(format!("Plan {} not found", label)));
        };
        serde_json::from_value::<RatePlan>(item)
            .map_err(|e| OpenEiError::malformed(format!("plan {}: {}", label, e)))
    }
}

#[async_trait::async_trait]
impl RateClient for OpenEiClient {
    async fn fetch_rates(&self, request: &RateRequest) -> Result<RateSnapshot> {
        let cache = PlanCache::new(&request.cache_file);
        let plan = match cache
            .fresh(&request.plan, Utc::now(), self.plan_cache_max_age)
            .await
        {
            Some(plan) => plan,
            None => {
                let plan = self.fetch_plan(&request.api_key, &request.plan).await?;
                let entry = CachedPlan {
                    label: request.plan.clone(),
                    fetched_at: Utc::now(),
                    plan: plan.clone(),
                };
                if let Err(e) = cache.save(&entry).await {
                    self.logger.warn(&format!(
                        "Could not write plan cache {}: {}",
                        cache.path().display(),
                        e
                    ));
                }
                plan
            }
        };

        plan.evaluate(request.at, request.timezone, request.reading)
    }

    async fn lookup_plans(&self, lookup: &PlanLookup) -> Result<PlanDirectory> {
        let mut params = vec![
            ("detail", "minimal".to_string()),
            ("sector", "Residential".to_string()),
            ("approved", "true".to_string()),
            ("api_key", lookup.api_key.clone()),
        ];
        match lookup.coordinates() {
            Some((lat, lon)) => {
                params.push(("lat", lat.to_string()));
                params.push(("lon", lon.to_string()));
            }
            None => params.push(("address", lookup.location.clone())),
        }
        if let Some(radius) = lookup.radius.filter(|r| *r > 0.0) {
            params.push(("radius", radius.to_string()));
        }

        let items = self.query(&params).await?;
        let mut directory = PlanDirectory::new();
        for item in items {
            let listing: PlanListing = serde_json::from_value(item)
                .map_err(|e| OpenEiError::malformed(format!("plan listing: {}", e)))?;
            let plans = directory.entry(listing.utility).or_default();
            if !plans.iter().any(|p| p.label == listing.label) {
                plans.push(PlanSummary {
                    name: listing.name,
                    label: listing.label,
                });
            }
        }
        self.logger
            .debug(&format!("lookup_plans: {} utilities", directory.len()));
        Ok(directory)
    }
}
