use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::CohortRegistry;
use crate::domain::{validate_catalog, Cohort, CohortError};

/// Immutable cohort catalog, validated once at load time.
#[derive(Debug, Clone)]
pub struct CohortCatalog {
    cohorts: Vec<Cohort>,
}

impl CohortCatalog {
    pub fn new(cohorts: Vec<Cohort>) -> Result<Self, CohortError> {
        validate_catalog(&cohorts)?;
        Ok(Self { cohorts })
    }

    /// Load a JSON array of cohorts from disk.
    pub fn from_json_file(path: &Path) -> Result<Self, CohortError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CohortError::Unreadable(format!("{}: {e}", path.display())))?;
        let catalog = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            cohorts = catalog.cohorts.len(),
            "loaded cohort catalog"
        );
        Ok(catalog)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CohortError> {
        let cohorts: Vec<Cohort> =
            serde_json::from_str(raw).map_err(|e| CohortError::Unreadable(e.to_string()))?;
        Self::new(cohorts)
    }

    pub fn cohorts(&self) -> &[Cohort] {
        &self.cohorts
    }
}

#[async_trait]
impl CohortRegistry for CohortCatalog {
    async fn list_cohorts(&self) -> Result<Vec<Cohort>> {
        Ok(self.cohorts.clone())
    }
}
