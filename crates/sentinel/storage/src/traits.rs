use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_types::{
    AgentId, AgentMemoryEntry, AgentStateRecord, ApprovalRequest, ApprovalStatus, MonitoringRun,
    RequestId, RunId,
};
use serde::Deserialize;

/// Generic query window for paged reads. A zero limit means "no limit".
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Filter for approval request listings.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<ApprovalStatus>,
    pub action_type: Option<String>,
    pub run_id: Option<RunId>,
}

impl RequestFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: ApprovalStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_action_type(mut self, action_type: impl Into<String>) -> Self {
        self.action_type = Some(action_type.into());
        self
    }

    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn matches(&self, request: &ApprovalRequest) -> bool {
        if let Some(status) = self.status {
            if request.status != status {
                return false;
            }
        }
        if let Some(action_type) = &self.action_type {
            if &request.action_type != action_type {
                return false;
            }
        }
        if let Some(run_id) = &self.run_id {
            if request.run_id.as_ref() != Some(run_id) {
                return false;
            }
        }
        true
    }
}

/// Filter for monitoring run listings.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub pipeline_name: Option<String>,
}

impl RunFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(mut self, pipeline_name: impl Into<String>) -> Self {
        self.pipeline_name = Some(pipeline_name.into());
        self
    }

    pub fn matches(&self, run: &MonitoringRun) -> bool {
        match &self.pipeline_name {
            Some(name) => &run.pipeline_name == name,
            None => true,
        }
    }
}

/// Storage interface for agent-scoped state blobs.
#[async_trait]
pub trait AgentStateStore: Send + Sync {
    /// Insert or replace the state blob for an agent. `created_at` survives
    /// rewrites; `updated_at` is refreshed on every call.
    async fn put_state(
        &self,
        agent_id: &AgentId,
        data: serde_json::Value,
    ) -> StorageResult<AgentStateRecord>;

    async fn get_state(&self, agent_id: &AgentId) -> StorageResult<Option<AgentStateRecord>>;

    /// All state records, oldest first.
    async fn list_states(&self, window: QueryWindow) -> StorageResult<Vec<AgentStateRecord>>;
}

/// Storage interface for append-only agent memory.
#[async_trait]
pub trait AgentMemoryStore: Send + Sync {
    /// Append one memory entry. Entries are write-once; no update path exists.
    async fn append_memory(&self, entry: AgentMemoryEntry) -> StorageResult<()>;

    /// Entries for one agent, oldest first.
    async fn list_memory(
        &self,
        agent_id: &AgentId,
        window: QueryWindow,
    ) -> StorageResult<Vec<AgentMemoryEntry>>;
}

/// Storage interface for approval request lifecycle records.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Insert a new request. Fails with `Conflict` if the id already exists.
    async fn create_request(&self, request: ApprovalRequest) -> StorageResult<()>;

    async fn get_request(&self, id: &RequestId) -> StorageResult<Option<ApprovalRequest>>;

    /// Atomically move a pending request to a terminal status, setting
    /// `status`, `decision`, and `decided_at` in one durable write guarded by
    /// `status = pending`. The compare-and-set is the sole arbiter under
    /// concurrent resolution: exactly one caller wins, every other caller
    /// observes `AlreadyDecided`.
    async fn resolve_request(
        &self,
        id: &RequestId,
        status: ApprovalStatus,
        decision: serde_json::Value,
        decided_at: DateTime<Utc>,
    ) -> StorageResult<ApprovalRequest>;

    /// Matching requests, oldest first.
    async fn list_requests(
        &self,
        filter: RequestFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<ApprovalRequest>>;
}

/// Storage interface for write-once monitoring run history.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a run row. Fails with `Conflict` if the id already exists.
    async fn insert_run(&self, run: MonitoringRun) -> StorageResult<()>;

    async fn get_run(&self, id: &RunId) -> StorageResult<Option<MonitoringRun>>;

    /// Matching runs, oldest first.
    async fn list_runs(
        &self,
        filter: RunFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<MonitoringRun>>;
}

/// Unified storage bundle covering all four sentinel tables.
pub trait SentinelStore:
    AgentStateStore + AgentMemoryStore + ApprovalStore + RunStore + Send + Sync
{
}

impl<T> SentinelStore for T where
    T: AgentStateStore + AgentMemoryStore + ApprovalStore + RunStore + Send + Sync
{
}

/// Entity tables addressable through [`update_entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    AgentState,
    AgentMemory,
    ApprovalRequest,
    MonitoringRun,
}

#[derive(Debug, Deserialize)]
struct ResolutionFields {
    status: ApprovalStatus,
    #[serde(default)]
    decision: Option<serde_json::Value>,
    #[serde(default)]
    decided_at: Option<DateTime<Utc>>,
}

/// Dynamic update entry point for callers that address tables by kind rather
/// than through the typed traits. Only entities whose lifecycle permits
/// mutation accept it: agent state is replaced wholesale, and a pending
/// approval request is resolved. Memory entries and monitoring runs reject
/// every update with `ImmutableEntity`.
pub async fn update_entity<S>(
    store: &S,
    kind: EntityKind,
    id: &str,
    fields: serde_json::Value,
) -> StorageResult<()>
where
    S: SentinelStore + ?Sized,
{
    match kind {
        EntityKind::AgentState => {
            let agent_id = AgentId::new(id);
            if store.get_state(&agent_id).await?.is_none() {
                return Err(StorageError::NotFound(format!(
                    "agent state {id} not found"
                )));
            }
            store.put_state(&agent_id, fields).await?;
            Ok(())
        }
        EntityKind::ApprovalRequest => {
            let parsed: ResolutionFields = serde_json::from_value(fields)
                .map_err(|e| StorageError::InvalidInput(format!("malformed resolution: {e}")))?;
            if !parsed.status.is_terminal() {
                return Err(StorageError::InvalidInput(
                    "resolution status must be terminal".to_string(),
                ));
            }
            store
                .resolve_request(
                    &RequestId::new(id),
                    parsed.status,
                    parsed.decision.unwrap_or(serde_json::Value::Null),
                    parsed.decided_at.unwrap_or_else(Utc::now),
                )
                .await?;
            Ok(())
        }
        EntityKind::AgentMemory => Err(StorageError::ImmutableEntity(
            "agent memory entries are write-once".to_string(),
        )),
        EntityKind::MonitoringRun => Err(StorageError::ImmutableEntity(
            "monitoring runs are write-once".to_string(),
        )),
    }
}
