//! # Sentinel Monitor - Approval-Gated Pipeline Monitoring
//!
//! This crate wires the sentinel pieces into one monitoring loop: collect a
//! pipeline's metrics, score them for anomalies and risk, plan follow-up
//! actions, persist the run, then walk every risky action through the human
//! approval gate before anything may act on it.
//!
//! ## Overview
//!
//! One [`PipelineMonitor::run_cycle`] call performs, in order:
//!
//! - **Collect**: pull the raw metrics payload from a [`MetricsSource`]
//! - **Assess**: score anomalies and overall risk via a [`RiskAssessor`]
//! - **Summarize**: optionally render narrative insights via an
//!   [`InsightWriter`] (failures degrade to an error note, never abort)
//! - **Plan**: derive concrete follow-up actions from the assessment
//! - **Record**: persist the run before any approval request exists
//! - **Gate**: submit each approval-requiring action and wait for a verdict
//! - **Checkpoint**: update agent state and append a memory entry
//!
//! The cycle fails only on metrics collection or storage errors. A denied
//! or unanswered action is reported in the [`CycleReport`], not raised; a
//! timed-out request stays pending in the store for a later reviewer.
//!
//! ## Key Components
//!
//! - [`PipelineMonitor`]: the monitoring loop facade
//! - [`ThresholdAssessor`]: built-in anomaly and risk scoring
//! - [`plan_actions`]: assessment to follow-up action rules
//! - [`MetricsSource`] / [`InsightWriter`]: collaborator seams for the
//!   metrics backend and the narrative layer
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sentinel_monitor::{BoxError, MetricsSource, PipelineMonitor};
//! use sentinel_storage::memory::MemorySentinelStore;
//!
//! struct WarehouseMetrics;
//!
//! #[async_trait::async_trait]
//! impl MetricsSource for WarehouseMetrics {
//!     async fn collect(&self, _pipeline_name: &str) -> Result<serde_json::Value, BoxError> {
//!         Ok(serde_json::json!({
//!             "total_records": 8200,
//!             "total_columns": 14,
//!             "duplicate_records": 12,
//!             "data_quality_score": 93.4,
//!         }))
//!     }
//! }
//!
//! # async fn example() {
//! let store = Arc::new(MemorySentinelStore::new());
//! let monitor = PipelineMonitor::new(store, Arc::new(WarehouseMetrics));
//!
//! let report = monitor.run_cycle("Customer ETL").await.unwrap();
//! println!(
//!     "run {}: risk={}, actions={}",
//!     report.run_id,
//!     report.risk_level,
//!     report.outcomes.len()
//! );
//! # }
//! ```
//!
//! ## Approval Flow
//!
//! An action skips the gate only when its plan marks it as not requiring
//! approval (the routine all-clear) or when its risk sits below the gate's
//! review threshold. Everything else becomes a pending approval request
//! tied to the run that produced it, and the cycle blocks on it up to the
//! configured decision timeout.

#![deny(unsafe_code)]

pub mod assess;
pub mod cycle;
pub mod plan;

// Re-export main types
pub use assess::{
    Assessment, AssessorConfig, ColumnStats, MetricsReport, RiskAssessor, ThresholdAssessor,
};
pub use cycle::{
    ActionOutcome, ActionResolution, BoxError, CycleReport, InsightWriter, MetricsSource,
    MonitorConfig, MonitorError, PipelineMonitor,
};
pub use plan::{plan_actions, PlannedAction, Priority};
