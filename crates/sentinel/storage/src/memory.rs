//! In-memory reference implementation for sentinel storage traits.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use the PostgreSQL backend for source-of-truth data.

use crate::traits::{
    AgentMemoryStore, AgentStateStore, ApprovalStore, QueryWindow, RequestFilter, RunFilter,
    RunStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_types::{
    AgentId, AgentMemoryEntry, AgentStateRecord, ApprovalRequest, ApprovalStatus, MonitoringRun,
    RequestId, RunId,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory sentinel storage adapter.
#[derive(Default)]
pub struct MemorySentinelStore {
    states: RwLock<HashMap<AgentId, AgentStateRecord>>,
    memories: RwLock<Vec<AgentMemoryEntry>>,
    requests: RwLock<HashMap<RequestId, ApprovalRequest>>,
    runs: RwLock<HashMap<RunId, MonitoringRun>>,
}

impl MemorySentinelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStateStore for MemorySentinelStore {
    async fn put_state(
        &self,
        agent_id: &AgentId,
        data: serde_json::Value,
    ) -> StorageResult<AgentStateRecord> {
        let mut guard = self
            .states
            .write()
            .map_err(|_| StorageError::Backend("states lock poisoned".to_string()))?;

        let now = Utc::now();
        let created_at = guard
            .get(agent_id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        let record = AgentStateRecord {
            agent_id: agent_id.clone(),
            data,
            created_at,
            updated_at: now,
        };
        guard.insert(agent_id.clone(), record.clone());
        Ok(record)
    }

    async fn get_state(&self, agent_id: &AgentId) -> StorageResult<Option<AgentStateRecord>> {
        let guard = self
            .states
            .read()
            .map_err(|_| StorageError::Backend("states lock poisoned".to_string()))?;
        Ok(guard.get(agent_id).cloned())
    }

    async fn list_states(&self, window: QueryWindow) -> StorageResult<Vec<AgentStateRecord>> {
        let guard = self
            .states
            .read()
            .map_err(|_| StorageError::Backend("states lock poisoned".to_string()))?;
        let mut values = guard.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(apply_window(values, window))
    }
}

#[async_trait]
impl AgentMemoryStore for MemorySentinelStore {
    async fn append_memory(&self, entry: AgentMemoryEntry) -> StorageResult<()> {
        let mut guard = self
            .memories
            .write()
            .map_err(|_| StorageError::Backend("memories lock poisoned".to_string()))?;
        guard.push(entry);
        Ok(())
    }

    async fn list_memory(
        &self,
        agent_id: &AgentId,
        window: QueryWindow,
    ) -> StorageResult<Vec<AgentMemoryEntry>> {
        let guard = self
            .memories
            .read()
            .map_err(|_| StorageError::Backend("memories lock poisoned".to_string()))?;
        let mut values = guard
            .iter()
            .filter(|entry| &entry.agent_id == agent_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(apply_window(values, window))
    }
}

#[async_trait]
impl ApprovalStore for MemorySentinelStore {
    async fn create_request(&self, request: ApprovalRequest) -> StorageResult<()> {
        let mut guard = self
            .requests
            .write()
            .map_err(|_| StorageError::Backend("requests lock poisoned".to_string()))?;

        if guard.contains_key(&request.id) {
            return Err(StorageError::Conflict(format!(
                "approval request {} already exists",
                request.id
            )));
        }
        guard.insert(request.id.clone(), request);
        Ok(())
    }

    async fn get_request(&self, id: &RequestId) -> StorageResult<Option<ApprovalRequest>> {
        let guard = self
            .requests
            .read()
            .map_err(|_| StorageError::Backend("requests lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn resolve_request(
        &self,
        id: &RequestId,
        status: ApprovalStatus,
        decision: serde_json::Value,
        decided_at: DateTime<Utc>,
    ) -> StorageResult<ApprovalRequest> {
        if !status.is_terminal() {
            return Err(StorageError::InvalidInput(
                "resolution status must be terminal".to_string(),
            ));
        }

        let mut guard = self
            .requests
            .write()
            .map_err(|_| StorageError::Backend("requests lock poisoned".to_string()))?;
        let record = guard
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("approval request {id} not found")))?;

        match record.status {
            ApprovalStatus::Pending => {}
            ApprovalStatus::Approved | ApprovalStatus::Denied | ApprovalStatus::Modified => {
                return Err(StorageError::AlreadyDecided(format!(
                    "approval request {id} is already {}",
                    record.status
                )));
            }
        }

        record.status = status;
        record.decision = Some(decision);
        record.decided_at = Some(decided_at);
        Ok(record.clone())
    }

    async fn list_requests(
        &self,
        filter: RequestFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<ApprovalRequest>> {
        let guard = self
            .requests
            .read()
            .map_err(|_| StorageError::Backend("requests lock poisoned".to_string()))?;
        let mut values = guard
            .values()
            .filter(|request| filter.matches(request))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(apply_window(values, window))
    }
}

#[async_trait]
impl RunStore for MemorySentinelStore {
    async fn insert_run(&self, run: MonitoringRun) -> StorageResult<()> {
        let mut guard = self
            .runs
            .write()
            .map_err(|_| StorageError::Backend("runs lock poisoned".to_string()))?;

        if guard.contains_key(&run.id) {
            return Err(StorageError::Conflict(format!(
                "monitoring run {} already exists",
                run.id
            )));
        }
        guard.insert(run.id.clone(), run);
        Ok(())
    }

    async fn get_run(&self, id: &RunId) -> StorageResult<Option<MonitoringRun>> {
        let guard = self
            .runs
            .read()
            .map_err(|_| StorageError::Backend("runs lock poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn list_runs(
        &self,
        filter: RunFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<MonitoringRun>> {
        let guard = self
            .runs
            .read()
            .map_err(|_| StorageError::Backend("runs lock poisoned".to_string()))?;
        let mut values = guard
            .values()
            .filter(|run| filter.matches(run))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(apply_window(values, window))
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}
