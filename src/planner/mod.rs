//! The planning core: stress classification, allocation, response
//! prediction and plan assembly.

pub mod allocation;
pub mod engine;
pub mod explain;
pub mod flexibility;
pub mod response;
pub mod stress;

pub use allocation::{AllocationOptimizer, AllocationOutcome, AllocationRequest, Exclusion, PlannedAllocation};
pub use engine::{GridStressReport, PlanningEngine, ProposeRequest};
pub use flexibility::FlexibilityEstimate;
pub use response::{plan_confidence, ResponsePredictor};
pub use stress::{StressAssessment, StressClassifier};
