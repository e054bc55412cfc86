//! Three-step setup wizard and its reconfigure variant
//!
//! The flow collects an API key and lookup location, offers the utilities
//! OpenEI knows about around that location, then the residential plans of
//! the chosen utility. Each step either returns a form to show or finishes
//! with a configuration record.

use crate::config::{ConfigurationRecord, HostConfig};
use crate::error::OpenEiError;
use crate::logging::{StructuredLogger, get_logger};
use crate::rates::{PlanDirectory, PlanLookup, PlanSummary, RateClient};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Form-level error key
pub const BASE_ERROR: &str = "base";

pub const ERROR_CANNOT_CONNECT: &str = "cannot_connect";
pub const ERROR_RATE_LIMITED: &str = "rate_limited";
pub const ERROR_INVALID_UTILITY: &str = "invalid_utility";
pub const ERROR_INVALID_PLAN: &str = "invalid_plan";
pub const ERROR_REQUIRED: &str = "required";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    User,
    #[serde(rename = "user_2")]
    User2,
    #[serde(rename = "user_3")]
    User3,
    Reconfigure,
    #[serde(rename = "reconfig_2")]
    Reconfig2,
    #[serde(rename = "reconfig_3")]
    Reconfig3,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::User => "user",
            StepId::User2 => "user_2",
            StepId::User3 => "user_3",
            StepId::Reconfigure => "reconfigure",
            StepId::Reconfig2 => "reconfig_2",
            StepId::Reconfig3 => "reconfig_3",
        }
    }
}

/// One selectable value of a form field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

/// One input of a form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub key: &'static str,
    pub required: bool,
    pub default: Option<String>,
    /// Allowed values; empty for free text
    pub options: Vec<SelectOption>,
}

impl FormField {
    fn text(key: &'static str, required: bool, default: Option<String>) -> Self {
        Self {
            key,
            required,
            default,
            options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    Form {
        step_id: StepId,
        fields: Vec<FormField>,
        errors: BTreeMap<String, String>,
    },
    CreateEntry {
        title: String,
        record: ConfigurationRecord,
    },
    UpdateEntry {
        record: ConfigurationRecord,
    },
}

impl FlowResult {
    pub fn step_id(&self) -> Option<StepId> {
        match self {
            FlowResult::Form { step_id, .. } => Some(*step_id),
            _ => None,
        }
    }

    pub fn errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            FlowResult::Form { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

/// Input of the first step
#[derive(Debug, Clone, Default)]
pub struct CredentialsInput {
    pub api_key: String,
    pub location: Option<String>,
    pub radius: Option<f64>,
}

/// Input of the second step
#[derive(Debug, Clone, Default)]
pub struct UtilityInput {
    pub utility: String,
}

/// Input of the third step
#[derive(Debug, Clone, Default)]
pub struct PlanInput {
    pub rate_plan: Option<String>,
    pub sensor: Option<String>,
    pub manual_plan: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowMode {
    Create,
    Reconfigure,
}

impl FlowMode {
    fn steps(self) -> [StepId; 3] {
        match self {
            FlowMode::Create => [StepId::User, StepId::User2, StepId::User3],
            FlowMode::Reconfigure => [StepId::Reconfigure, StepId::Reconfig2, StepId::Reconfig3],
        }
    }
}

fn error_map(key: &str, value: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(key.to_string(), value.to_string())])
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct ConfigFlow {
    mode: FlowMode,
    client: Arc<dyn RateClient>,
    host: HostConfig,
    draft: ConfigurationRecord,
    directory: Option<PlanDirectory>,
    logger: StructuredLogger,
}

impl ConfigFlow {
    /// Flow for a brand-new entry
    pub fn new(client: Arc<dyn RateClient>, host: HostConfig) -> Self {
        Self {
            mode: FlowMode::Create,
            client,
            host,
            draft: ConfigurationRecord::new(""),
            directory: None,
            logger: get_logger("config_flow"),
        }
    }

    /// Flow that edits an existing entry, seeded with its current values
    pub fn reconfigure(
        client: Arc<dyn RateClient>,
        host: HostConfig,
        existing: ConfigurationRecord,
    ) -> Self {
        Self {
            mode: FlowMode::Reconfigure,
            client,
            host,
            draft: existing,
            directory: None,
            logger: get_logger("config_flow"),
        }
    }

    /// Record as collected so far
    pub fn draft(&self) -> &ConfigurationRecord {
        &self.draft
    }

    /// First form of the flow
    pub async fn start(&mut self) -> FlowResult {
        self.step_user(None).await
    }

    pub async fn step_user(&mut self, input: Option<CredentialsInput>) -> FlowResult {
        let Some(input) = input else {
            return self.credentials_form(BTreeMap::new());
        };

        let api_key = input.api_key.trim().to_string();
        if api_key.is_empty() {
            return self.credentials_form(error_map("api_key", ERROR_REQUIRED));
        }
        if api_key != self.draft.api_key {
            self.directory = None;
        }
        self.draft.api_key = api_key;
        self.draft.location = non_blank(input.location);
        self.draft.radius = input.radius.filter(|r| *r > 0.0);

        self.step_user_2(None).await
    }

    pub async fn step_user_2(&mut self, input: Option<UtilityInput>) -> FlowResult {
        let directory = match self.load_directory().await {
            Ok(d) => d,
            Err(errors) => return self.credentials_form(errors),
        };

        let Some(input) = input else {
            return self.utility_form(&directory, BTreeMap::new());
        };

        let utility = input.utility.trim().to_string();
        if !directory.contains_key(&utility) {
            return self.utility_form(&directory, error_map("utility", ERROR_INVALID_UTILITY));
        }
        if self.draft.utility.as_deref() != Some(utility.as_str()) {
            self.draft.rate_plan = None;
        }
        self.draft.utility = Some(utility);

        self.step_user_3(None).await
    }

    pub async fn step_user_3(&mut self, input: Option<PlanInput>) -> FlowResult {
        let directory = match self.load_directory().await {
            Ok(d) => d,
            Err(errors) => return self.credentials_form(errors),
        };
        let plans: Vec<PlanSummary> = self
            .draft
            .utility
            .as_ref()
            .and_then(|u| directory.get(u))
            .cloned()
            .unwrap_or_default();

        let Some(input) = input else {
            return self.plan_form(&plans, BTreeMap::new());
        };

        let rate_plan = non_blank(input.rate_plan);
        let manual_plan = non_blank(input.manual_plan);
        let plan_known = rate_plan
            .as_ref()
            .is_some_and(|p| plans.iter().any(|s| &s.label == p));

        if rate_plan.is_some() && !plan_known && manual_plan.is_none() {
            return self.plan_form(&plans, error_map("rate_plan", ERROR_INVALID_PLAN));
        }
        if rate_plan.is_none() && manual_plan.is_none() {
            return self.plan_form(&plans, error_map("rate_plan", ERROR_REQUIRED));
        }

        self.draft.rate_plan = rate_plan;
        self.draft.manual_plan = manual_plan;
        self.draft.sensor = non_blank(input.sensor);
        self.finish()
    }

    fn finish(&mut self) -> FlowResult {
        let record = self.draft.clone().normalized();
        match self.mode {
            FlowMode::Create => {
                let title = record.utility.clone().unwrap_or_default();
                let mut record = record;
                record.title.clone_from(&title);
                self.logger
                    .info(&format!("Creating entry {} for {}", record.entry_id, title));
                FlowResult::CreateEntry { title, record }
            }
            FlowMode::Reconfigure => {
                self.logger
                    .info(&format!("Updating entry {}", record.entry_id));
                FlowResult::UpdateEntry { record }
            }
        }
    }

    async fn load_directory(&mut self) -> Result<PlanDirectory, BTreeMap<String, String>> {
        if let Some(directory) = &self.directory {
            return Ok(directory.clone());
        }

        let lookup = PlanLookup {
            api_key: self.draft.api_key.clone(),
            location: self
                .draft
                .location
                .clone()
                .unwrap_or_else(|| self.host.location()),
            radius: self.draft.radius,
        };

        match self.client.lookup_plans(&lookup).await {
            Ok(directory) => {
                self.logger.debug(&format!(
                    "get_utility_list: {:?}",
                    directory.keys().collect::<Vec<_>>()
                ));
                self.directory = Some(directory.clone());
                Ok(directory)
            }
            Err(e) => {
                self.logger.warn(&format!("Plan lookup failed: {}", e));
                let code = match e {
                    OpenEiError::RateLimited { .. } => ERROR_RATE_LIMITED,
                    _ => ERROR_CANNOT_CONNECT,
                };
                Err(error_map(BASE_ERROR, code))
            }
        }
    }

    fn credentials_form(&self, errors: BTreeMap<String, String>) -> FlowResult {
        let default_location = self
            .draft
            .location
            .clone()
            .unwrap_or_else(|| self.host.location());
        FlowResult::Form {
            step_id: self.mode.steps()[0],
            fields: vec![
                FormField::text(
                    "api_key",
                    true,
                    Some(self.draft.api_key.clone()).filter(|k| !k.is_empty()),
                ),
                FormField::text("location", false, Some(default_location)),
                FormField::text("radius", false, self.draft.radius.map(|r| r.to_string())),
            ],
            errors,
        }
    }

    fn utility_form(&self, directory: &PlanDirectory, errors: BTreeMap<String, String>) -> FlowResult {
        let options = directory
            .keys()
            .map(|u| SelectOption {
                value: u.clone(),
                label: u.clone(),
            })
            .collect();
        FlowResult::Form {
            step_id: self.mode.steps()[1],
            fields: vec![FormField {
                key: "utility",
                required: true,
                default: self.draft.utility.clone(),
                options,
            }],
            errors,
        }
    }

    fn plan_form(&self, plans: &[PlanSummary], errors: BTreeMap<String, String>) -> FlowResult {
        let options = plans
            .iter()
            .map(|p| SelectOption {
                value: p.label.clone(),
                label: p.name.clone(),
            })
            .collect();
        FlowResult::Form {
            step_id: self.mode.steps()[2],
            fields: vec![
                FormField {
                    key: "rate_plan",
                    required: false,
                    default: self.draft.rate_plan.clone(),
                    options,
                },
                FormField::text("sensor", false, self.draft.sensor.clone()),
                FormField::text("manual_plan", false, self.draft.manual_plan.clone()),
            ],
            errors,
        }
    }
}
