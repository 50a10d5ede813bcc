//! Append-only persistence for plans and their audit trail.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use super::history::PerformanceRecord;
use crate::domain::{AuditEntry, DRPlan, PlanningError};

const PLANS_FILE: &str = "plans.jsonl";
const AUDIT_FILE: &str = "audit.jsonl";
const PERFORMANCE_FILE: &str = "performance.jsonl";

/// Latest plan records plus the full audit trail and execution history.
#[derive(Debug, Default, Clone)]
pub struct StoredState {
    pub plans: Vec<DRPlan>,
    pub audit: Vec<AuditEntry>,
    pub performance: Vec<PerformanceRecord>,
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Record the current version of a plan. Later records supersede earlier ones.
    async fn append_plan(&self, plan: &DRPlan) -> Result<(), PlanningError>;
    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), PlanningError>;
    async fn append_performance(&self, record: &PerformanceRecord) -> Result<(), PlanningError>;
    /// Latest record per plan, in first-seen order, and every audit entry.
    async fn load_all(&self) -> Result<StoredState, PlanningError>;
}

#[derive(Default)]
pub struct InMemoryPlanStore {
    plans: Mutex<Vec<DRPlan>>,
    audit: Mutex<Vec<AuditEntry>>,
    performance: Mutex<Vec<PerformanceRecord>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn append_plan(&self, plan: &DRPlan) -> Result<(), PlanningError> {
        self.plans.lock().push(plan.clone());
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), PlanningError> {
        self.audit.lock().push(entry.clone());
        Ok(())
    }

    async fn append_performance(&self, record: &PerformanceRecord) -> Result<(), PlanningError> {
        self.performance.lock().push(record.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<StoredState, PlanningError> {
        Ok(StoredState {
            plans: latest_per_plan(self.plans.lock().iter().cloned()),
            audit: self.audit.lock().clone(),
            performance: self.performance.lock().clone(),
        })
    }
}

/// JSON-lines files under one directory: `plans.jsonl`, `audit.jsonl` and
/// `performance.jsonl`.
pub struct JsonlPlanStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlPlanStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, PlanningError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "plan store opened");
        Ok(Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn append_line<T: Serialize>(&self, file: &str, record: &T) -> Result<(), PlanningError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .await?;
        handle.write_all(&line).await?;
        handle.flush().await?;
        Ok(())
    }

    async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PlanningError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                // A torn final write should not keep the service from starting.
                Err(e) => warn!(file = %path.display(), line = idx + 1, error = %e, "skipping unreadable record"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl PlanStore for JsonlPlanStore {
    async fn append_plan(&self, plan: &DRPlan) -> Result<(), PlanningError> {
        self.append_line(PLANS_FILE, plan).await
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), PlanningError> {
        self.append_line(AUDIT_FILE, entry).await
    }

    async fn append_performance(&self, record: &PerformanceRecord) -> Result<(), PlanningError> {
        self.append_line(PERFORMANCE_FILE, record).await
    }

    async fn load_all(&self) -> Result<StoredState, PlanningError> {
        let plans: Vec<DRPlan> = Self::read_lines(&self.dir.join(PLANS_FILE)).await?;
        let audit = Self::read_lines(&self.dir.join(AUDIT_FILE)).await?;
        let performance = Self::read_lines(&self.dir.join(PERFORMANCE_FILE)).await?;
        Ok(StoredState {
            plans: latest_per_plan(plans),
            audit,
            performance,
        })
    }
}

fn latest_per_plan(records: impl IntoIterator<Item = DRPlan>) -> Vec<DRPlan> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut latest: HashMap<Uuid, DRPlan> = HashMap::new();
    for plan in records {
        if !latest.contains_key(&plan.id) {
            order.push(plan.id);
        }
        latest.insert(plan.id, plan);
    }
    order.into_iter().filter_map(|id| latest.remove(&id)).collect()
}
