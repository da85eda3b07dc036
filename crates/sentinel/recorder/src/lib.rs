//! Sentinel Recorder - durable history of pipeline execution cycles.
//!
//! The recorder translates one externally computed monitoring result into a
//! write-once `MonitoringRun` row. It never dedups by content: every call
//! appends a fresh record, and callers needing exactly-once semantics must
//! dedup upstream. `AgentContext` adds the agent-scoped state and memory
//! helpers the monitoring loop uses for checkpointing between cycles.

#![deny(unsafe_code)]

use sentinel_storage::{
    AgentMemoryStore, AgentStateStore, QueryWindow, RunFilter, RunStore, StorageError,
};
use sentinel_types::{
    AgentId, AgentMemoryEntry, AgentStateRecord, MemoryKind, MonitoringRun, RiskLevel, RunId,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Recorder-related errors.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Input rejected before anything was persisted.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Appends immutable monitoring run records to the store.
pub struct MonitoringRecorder<S> {
    store: Arc<S>,
}

impl<S: RunStore> MonitoringRecorder<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Persist one monitoring cycle outcome.
    ///
    /// Validates before writing: on `RecorderError::Validation` no partial
    /// row exists. Returns the id of the freshly created run.
    pub async fn record(
        &self,
        pipeline_name: &str,
        metrics: serde_json::Value,
        anomalies: Vec<String>,
        risk_level: Option<RiskLevel>,
        ai_insights: Option<String>,
        execution_results: serde_json::Value,
    ) -> Result<RunId, RecorderError> {
        if pipeline_name.trim().is_empty() {
            return Err(RecorderError::Validation(
                "pipeline_name must not be empty".to_string(),
            ));
        }
        if !metrics.is_object() {
            return Err(RecorderError::Validation(
                "metrics must be a JSON object".to_string(),
            ));
        }
        if !execution_results.is_object() {
            return Err(RecorderError::Validation(
                "execution_results must be a JSON object".to_string(),
            ));
        }

        let run = MonitoringRun::new(
            pipeline_name,
            metrics,
            anomalies,
            risk_level,
            ai_insights,
            execution_results,
        );
        let run_id = run.id.clone();
        let anomaly_count = run.anomalies.len();
        self.store.insert_run(run).await?;

        info!(
            run_id = %run_id,
            pipeline = %pipeline_name,
            anomalies = anomaly_count,
            risk = ?risk_level,
            "Monitoring run recorded"
        );
        Ok(run_id)
    }

    /// Read back one run by id.
    pub async fn fetch(&self, run_id: &RunId) -> Result<Option<MonitoringRun>, RecorderError> {
        Ok(self.store.get_run(run_id).await?)
    }

    /// Run history, oldest first, optionally restricted to one pipeline.
    pub async fn history(
        &self,
        pipeline_name: Option<&str>,
        window: QueryWindow,
    ) -> Result<Vec<MonitoringRun>, RecorderError> {
        let filter = match pipeline_name {
            Some(name) => RunFilter::new().with_pipeline(name),
            None => RunFilter::new(),
        };
        Ok(self.store.list_runs(filter, window).await?)
    }
}

/// Agent-scoped state and memory access bound to one agent id.
///
/// State writes are last-write-wins; memory entries are append-only.
pub struct AgentContext<S> {
    store: Arc<S>,
    agent_id: AgentId,
}

impl<S: AgentStateStore + AgentMemoryStore> AgentContext<S> {
    pub fn new(store: Arc<S>, agent_id: AgentId) -> Self {
        Self { store, agent_id }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Write the agent's state blob, creating or replacing it.
    pub async fn save_state(
        &self,
        data: serde_json::Value,
    ) -> Result<AgentStateRecord, RecorderError> {
        self.ensure_agent_id()?;
        let record = self.store.put_state(&self.agent_id, data).await?;
        debug!(agent_id = %self.agent_id, "Agent state saved");
        Ok(record)
    }

    /// Read the agent's current state blob, if any.
    pub async fn load_state(&self) -> Result<Option<AgentStateRecord>, RecorderError> {
        self.ensure_agent_id()?;
        Ok(self.store.get_state(&self.agent_id).await?)
    }

    /// Append one immutable memory entry.
    pub async fn remember(
        &self,
        memory_type: MemoryKind,
        content: serde_json::Value,
    ) -> Result<(), RecorderError> {
        self.ensure_agent_id()?;
        let entry = AgentMemoryEntry::new(self.agent_id.clone(), memory_type, content);
        self.store.append_memory(entry).await?;
        Ok(())
    }

    /// Memory entries for this agent, oldest first.
    pub async fn recall(&self, window: QueryWindow) -> Result<Vec<AgentMemoryEntry>, RecorderError> {
        self.ensure_agent_id()?;
        Ok(self.store.list_memory(&self.agent_id, window).await?)
    }

    fn ensure_agent_id(&self) -> Result<(), RecorderError> {
        if self.agent_id.0.trim().is_empty() {
            return Err(RecorderError::Validation(
                "agent_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
