//! Per-entry plan cache file
//!
//! The raw plan document is kept on disk so an hourly re-evaluation does not
//! cost an API call. The cache is reused while it is younger than the
//! configured age and belongs to the same plan label.

use crate::error::Result;
use crate::logging::get_logger;
use crate::rates::plan::RatePlan;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of a cache file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPlan {
    /// Plan label the document was fetched for
    pub label: String,

    /// When the document was fetched
    pub fetched_at: DateTime<Utc>,

    /// Raw plan document
    pub plan: RatePlan,
}

/// Cache file manager
pub struct PlanCache {
    file_path: PathBuf,
    logger: crate::logging::StructuredLogger,
}

impl PlanCache {
    /// Create a cache manager for a file
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            logger: get_logger("plan_cache"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Load the cache file; a missing or unreadable file yields `None`
    pub async fn load(&self) -> Option<CachedPlan> {
        let contents = match tokio::fs::read_to_string(&self.file_path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                self.logger.warn(&format!(
                    "Could not read plan cache {}: {}",
                    self.file_path.display(),
                    e
                ));
                return None;
            }
        };

        match serde_json::from_str::<CachedPlan>(&contents) {
            Ok(cached) => Some(cached),
            Err(e) => {
                self.logger.warn(&format!(
                    "Ignoring corrupt plan cache {}: {}",
                    self.file_path.display(),
                    e
                ));
                None
            }
        }
    }

    /// Cached plan for `label` if it is younger than `max_age` at `now`
    pub async fn fresh(&self, label: &str, now: DateTime<Utc>, max_age: Duration) -> Option<RatePlan> {
        let cached = self.load().await?;
        if cached.label != label {
            self.logger.debug("Plan cache belongs to another plan, refetching");
            return None;
        }
        let age = now - cached.fetched_at;
        if age < Duration::zero() || age >= max_age {
            self.logger.debug("Plan cache expired, refetching");
            return None;
        }
        Some(cached.plan)
    }

    /// Write the cache file, creating its directory if needed
    pub async fn save(&self, cached: &CachedPlan) -> Result<()> {
        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(cached)?;
        tokio::fs::write(&self.file_path, contents).await?;
        self.logger.debug("Saved plan cache to disk");
        Ok(())
    }
}
