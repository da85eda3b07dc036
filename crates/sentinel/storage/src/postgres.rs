//! PostgreSQL adapter for sentinel storage.
//!
//! This adapter is the transactional source-of-truth backend. Approval
//! resolution is a conditional UPDATE guarded by `status = 'pending'`, so
//! concurrent deciders serialize on the database row and exactly one wins.

use crate::traits::{
    AgentMemoryStore, AgentStateStore, ApprovalStore, QueryWindow, RequestFilter, RunFilter,
    RunStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_types::{
    AgentId, AgentMemoryEntry, AgentStateRecord, ApprovalRequest, ApprovalStatus, MemoryKind,
    MonitoringRun, RequestId, RiskLevel, RunId,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresSentinelStore {
    pool: PgPool,
}

impl PostgresSentinelStore {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS agent_storage (
                agent_id TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS agent_memory (
                agent_id TEXT NOT NULL,
                memory_type TEXT NOT NULL,
                content JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS approval_requests (
                id TEXT PRIMARY KEY,
                action_type TEXT NOT NULL,
                description TEXT NOT NULL,
                risk_level TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                decision JSONB,
                run_id TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                decided_at TIMESTAMPTZ
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS monitoring_history (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                metrics JSONB NOT NULL,
                anomalies JSONB,
                risk_level TEXT,
                ai_insights TEXT,
                execution_results JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_agent_memory_agent
                ON agent_memory (agent_id)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_approval_requests_status
                ON approval_requests (status)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_monitoring_history_pipeline
                ON monitoring_history (pipeline_name)
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl AgentStateStore for PostgresSentinelStore {
    async fn put_state(
        &self,
        agent_id: &AgentId,
        data: serde_json::Value,
    ) -> StorageResult<AgentStateRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO agent_storage (agent_id, data, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (agent_id) DO UPDATE SET
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at
            RETURNING agent_id, data, created_at, updated_at
            "#,
        )
        .bind(agent_id.0.clone())
        .bind(data)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        state_row_to_record(row)
    }

    async fn get_state(&self, agent_id: &AgentId) -> StorageResult<Option<AgentStateRecord>> {
        let row = sqlx::query(
            r#"
            SELECT agent_id, data, created_at, updated_at
              FROM agent_storage
             WHERE agent_id = $1
            "#,
        )
        .bind(agent_id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(state_row_to_record).transpose()
    }

    async fn list_states(&self, window: QueryWindow) -> StorageResult<Vec<AgentStateRecord>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT agent_id, data, created_at, updated_at
                  FROM agent_storage
                 ORDER BY created_at ASC
                 OFFSET $1
                "#,
            )
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT agent_id, data, created_at, updated_at
                  FROM agent_storage
                 ORDER BY created_at ASC
                 LIMIT $1 OFFSET $2
                "#,
            )
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(state_row_to_record).collect()
    }
}

#[async_trait]
impl AgentMemoryStore for PostgresSentinelStore {
    async fn append_memory(&self, entry: AgentMemoryEntry) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_memory (agent_id, memory_type, content, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.agent_id.0)
        .bind(memory_kind_to_string(&entry.memory_type))
        .bind(entry.content)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn list_memory(
        &self,
        agent_id: &AgentId,
        window: QueryWindow,
    ) -> StorageResult<Vec<AgentMemoryEntry>> {
        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT agent_id, memory_type, content, created_at
                  FROM agent_memory
                 WHERE agent_id = $1
                 ORDER BY created_at ASC
                 OFFSET $2
                "#,
            )
            .bind(agent_id.0.clone())
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT agent_id, memory_type, content, created_at
                  FROM agent_memory
                 WHERE agent_id = $1
                 ORDER BY created_at ASC
                 LIMIT $2 OFFSET $3
                "#,
            )
            .bind(agent_id.0.clone())
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(memory_row_to_record).collect()
    }
}

#[async_trait]
impl ApprovalStore for PostgresSentinelStore {
    async fn create_request(&self, request: ApprovalRequest) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO approval_requests
                (id, action_type, description, risk_level, status, decision, run_id, created_at, decided_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(request.id.0)
        .bind(request.action_type)
        .bind(request.description)
        .bind(request.risk_level.as_str())
        .bind(request.status.as_str())
        .bind(request.decision)
        .bind(request.run_id.map(|id| id.0))
        .bind(request.created_at)
        .bind(request.decided_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_request(&self, id: &RequestId) -> StorageResult<Option<ApprovalRequest>> {
        let row = sqlx::query(
            r#"
            SELECT id, action_type, description, risk_level, status, decision, run_id, created_at, decided_at
              FROM approval_requests
             WHERE id = $1
            "#,
        )
        .bind(id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(request_row_to_record).transpose()
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

        let row = sqlx::query(
            r#"
            UPDATE approval_requests
               SET status = $1,
                   decision = $2,
                   decided_at = $3
             WHERE id = $4
               AND status = 'pending'
            RETURNING id, action_type, description, risk_level, status, decision, run_id, created_at, decided_at
            "#,
        )
        .bind(status.as_str())
        .bind(decision)
        .bind(decided_at)
        .bind(id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => request_row_to_record(row),
            None => {
                // Lost the race or the id never existed; re-read to tell apart.
                match self.get_request(id).await? {
                    Some(existing) => Err(StorageError::AlreadyDecided(format!(
                        "approval request {id} is already {}",
                        existing.status
                    ))),
                    None => Err(StorageError::NotFound(format!(
                        "approval request {id} not found"
                    ))),
                }
            }
        }
    }

    async fn list_requests(
        &self,
        filter: RequestFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<ApprovalRequest>> {
        let status = filter.status.map(|s| s.as_str());
        let action_type = filter.action_type;
        let run_id = filter.run_id.map(|id| id.0);

        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT id, action_type, description, risk_level, status, decision, run_id, created_at, decided_at
                  FROM approval_requests
                 WHERE ($1::TEXT IS NULL OR status = $1)
                   AND ($2::TEXT IS NULL OR action_type = $2)
                   AND ($3::TEXT IS NULL OR run_id = $3)
                 ORDER BY created_at ASC
                 OFFSET $4
                "#,
            )
            .bind(status)
            .bind(action_type)
            .bind(run_id)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT id, action_type, description, risk_level, status, decision, run_id, created_at, decided_at
                  FROM approval_requests
                 WHERE ($1::TEXT IS NULL OR status = $1)
                   AND ($2::TEXT IS NULL OR action_type = $2)
                   AND ($3::TEXT IS NULL OR run_id = $3)
                 ORDER BY created_at ASC
                 LIMIT $4 OFFSET $5
                "#,
            )
            .bind(status)
            .bind(action_type)
            .bind(run_id)
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(request_row_to_record).collect()
    }
}

#[async_trait]
impl RunStore for PostgresSentinelStore {
    async fn insert_run(&self, run: MonitoringRun) -> StorageResult<()> {
        let anomalies = if run.anomalies.is_empty() {
            None
        } else {
            Some(
                serde_json::to_value(&run.anomalies)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?,
            )
        };

        sqlx::query(
            r#"
            INSERT INTO monitoring_history
                (id, pipeline_name, metrics, anomalies, risk_level, ai_insights, execution_results, created_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(run.id.0)
        .bind(run.pipeline_name)
        .bind(run.metrics)
        .bind(anomalies)
        .bind(run.risk_level.map(|level| level.as_str()))
        .bind(run.ai_insights)
        .bind(run.execution_results)
        .bind(run.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;

        Ok(())
    }

    async fn get_run(&self, id: &RunId) -> StorageResult<Option<MonitoringRun>> {
        let row = sqlx::query(
            r#"
            SELECT id, pipeline_name, metrics, anomalies, risk_level, ai_insights, execution_results, created_at
              FROM monitoring_history
             WHERE id = $1
            "#,
        )
        .bind(id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(run_row_to_record).transpose()
    }

    async fn list_runs(
        &self,
        filter: RunFilter,
        window: QueryWindow,
    ) -> StorageResult<Vec<MonitoringRun>> {
        let pipeline_name = filter.pipeline_name;

        let rows = if window.limit == 0 {
            sqlx::query(
                r#"
                SELECT id, pipeline_name, metrics, anomalies, risk_level, ai_insights, execution_results, created_at
                  FROM monitoring_history
                 WHERE ($1::TEXT IS NULL OR pipeline_name = $1)
                 ORDER BY created_at ASC
                 OFFSET $2
                "#,
            )
            .bind(pipeline_name)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        } else {
            sqlx::query(
                r#"
                SELECT id, pipeline_name, metrics, anomalies, risk_level, ai_insights, execution_results, created_at
                  FROM monitoring_history
                 WHERE ($1::TEXT IS NULL OR pipeline_name = $1)
                 ORDER BY created_at ASC
                 LIMIT $2 OFFSET $3
                "#,
            )
            .bind(pipeline_name)
            .bind(to_i64(window.limit)?)
            .bind(to_i64(window.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
        };

        rows.into_iter().map(run_row_to_record).collect()
    }
}

fn state_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<AgentStateRecord> {
    Ok(AgentStateRecord {
        agent_id: AgentId::new(
            row.try_get::<String, _>("agent_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        data: row
            .try_get("data")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn memory_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<AgentMemoryEntry> {
    let memory_type: String = row
        .try_get("memory_type")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(AgentMemoryEntry {
        agent_id: AgentId::new(
            row.try_get::<String, _>("agent_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        memory_type: MemoryKind::from(memory_type),
        content: row
            .try_get("content")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn request_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<ApprovalRequest> {
    let risk_level: String = row
        .try_get("risk_level")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let run_id: Option<String> = row
        .try_get("run_id")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(ApprovalRequest {
        id: RequestId::new(
            row.try_get::<String, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        action_type: row
            .try_get("action_type")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        description: row
            .try_get("description")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        risk_level: parse_risk_level(&risk_level)?,
        status: parse_approval_status(&status)?,
        decision: row
            .try_get("decision")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        run_id: run_id.map(RunId::new),
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        decided_at: row
            .try_get("decided_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn run_row_to_record(row: sqlx::postgres::PgRow) -> StorageResult<MonitoringRun> {
    let anomalies_json: Option<serde_json::Value> = row
        .try_get("anomalies")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let anomalies: Vec<String> = anomalies_json
        .map(|v| serde_json::from_value(v).map_err(|e| StorageError::Serialization(e.to_string())))
        .transpose()?
        .unwrap_or_default();
    let risk_level: Option<String> = row
        .try_get("risk_level")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(MonitoringRun {
        id: RunId::new(
            row.try_get::<String, _>("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        pipeline_name: row
            .try_get("pipeline_name")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        metrics: row
            .try_get("metrics")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        anomalies,
        risk_level: risk_level.as_deref().map(parse_risk_level).transpose()?,
        ai_insights: row
            .try_get("ai_insights")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        execution_results: row
            .try_get("execution_results")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn memory_kind_to_string(kind: &MemoryKind) -> String {
    kind.as_str().to_string()
}

fn parse_risk_level(raw: &str) -> StorageResult<RiskLevel> {
    raw.parse::<RiskLevel>()
        .map_err(|_| StorageError::Serialization(format!("unknown risk level `{raw}`")))
}

fn parse_approval_status(raw: &str) -> StorageResult<ApprovalStatus> {
    raw.parse::<ApprovalStatus>()
        .map_err(|_| StorageError::Serialization(format!("unknown approval status `{raw}`")))
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}
