//! One full monitoring cycle: collect, assess, plan, record, gate.
//!
//! The run record is made durable before any approval request exists, so
//! every request's `run_id` resolves to a stored run. Gating happens per
//! action; an unanswered request times out in the report but stays pending
//! in the store for a later reviewer.

use crate::assess::{Assessment, MetricsReport, RiskAssessor, ThresholdAssessor};
use crate::plan::{plan_actions, PlannedAction};
use async_trait::async_trait;
use sentinel_gate::{ApprovalGate, DecisionOutcome, GateConfig, GateError};
use sentinel_recorder::{AgentContext, MonitoringRecorder, RecorderError};
use sentinel_storage::SentinelStore;
use sentinel_types::{AgentId, ApprovalStatus, MemoryKind, RequestId, RiskLevel, RunId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Error type collaborator implementations hand back.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Produces the raw metrics payload for one pipeline.
///
/// A collection failure aborts the whole cycle: with no metrics there is
/// nothing truthful to record.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn collect(&self, pipeline_name: &str) -> Result<serde_json::Value, BoxError>;
}

/// Optional narrative layer over an assessment, an LLM in the usual
/// deployment. A writer failure degrades the run's insights to an error
/// note; it never aborts the cycle.
#[async_trait]
pub trait InsightWriter: Send + Sync {
    async fn summarize(
        &self,
        pipeline_name: &str,
        metrics: &serde_json::Value,
        assessment: &Assessment,
    ) -> Result<String, BoxError>;
}

/// Monitor-related errors.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Input rejected before anything was persisted.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("metrics collection failed for pipeline `{pipeline}`: {source}")]
    Collect {
        pipeline: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Gate(#[from] GateError),
}

/// Monitor policy knobs.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Identity used for state checkpoints and memory entries.
    pub agent_id: AgentId,
    /// How long each gated action waits for a verdict before the cycle
    /// reports it timed out.
    pub decision_timeout: Duration,
    /// Gate policy for this monitor.
    pub gate: GateConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            agent_id: AgentId::new("pipeline-monitor"),
            decision_timeout: Duration::from_secs(300),
            gate: GateConfig::default(),
        }
    }
}

/// How one planned action ended up after gating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResolution {
    /// The action never needed the gate.
    AutoApproved,
    Approved,
    Denied,
    Modified,
    /// No verdict within the decision timeout; the request is still
    /// pending in the store.
    TimedOut,
}

impl ActionResolution {
    /// Resolution for a request observed in the given status.
    pub fn from_status(status: ApprovalStatus) -> Self {
        match status {
            ApprovalStatus::Pending => ActionResolution::TimedOut,
            ApprovalStatus::Approved => ActionResolution::Approved,
            ApprovalStatus::Denied => ActionResolution::Denied,
            ApprovalStatus::Modified => ActionResolution::Modified,
        }
    }

    /// Whether the action is cleared to run.
    pub fn allows_execution(&self) -> bool {
        matches!(
            self,
            ActionResolution::AutoApproved | ActionResolution::Approved | ActionResolution::Modified
        )
    }
}

/// One planned action plus how the cycle resolved it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: PlannedAction,
    pub resolution: ActionResolution,
    /// Present when the action went through the gate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

/// Everything one [`PipelineMonitor::run_cycle`] call produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CycleReport {
    pub run_id: RunId,
    pub pipeline_name: String,
    pub risk_level: RiskLevel,
    pub anomalies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<String>,
    pub outcomes: Vec<ActionOutcome>,
}

impl CycleReport {
    /// Actions cleared to run: auto-approved, approved or modified.
    pub fn executable(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes.iter().filter(|o| o.resolution.allows_execution())
    }

    /// Actions a reviewer denied or that ran out of time.
    pub fn blocked(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes.iter().filter(|o| !o.resolution.allows_execution())
    }
}

/// The monitoring loop facade: one store, one metrics source, one scoring
/// policy, and the approval gate in front of every risky action.
pub struct PipelineMonitor<S> {
    recorder: MonitoringRecorder<S>,
    gate: ApprovalGate<S>,
    agent: AgentContext<S>,
    source: Arc<dyn MetricsSource>,
    assessor: Arc<dyn RiskAssessor>,
    insights: Option<Arc<dyn InsightWriter>>,
    config: MonitorConfig,
}

impl<S: SentinelStore> PipelineMonitor<S> {
    pub fn new(store: Arc<S>, source: Arc<dyn MetricsSource>) -> Self {
        Self::with_config(store, source, MonitorConfig::default())
    }

    pub fn with_config(
        store: Arc<S>,
        source: Arc<dyn MetricsSource>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            recorder: MonitoringRecorder::new(Arc::clone(&store)),
            gate: ApprovalGate::with_config(Arc::clone(&store), config.gate.clone()),
            agent: AgentContext::new(store, config.agent_id.clone()),
            source,
            assessor: Arc::new(ThresholdAssessor::default()),
            insights: None,
            config,
        }
    }

    /// Swap in a custom scoring policy.
    pub fn with_assessor(mut self, assessor: Arc<dyn RiskAssessor>) -> Self {
        self.assessor = assessor;
        self
    }

    /// Attach a narrative layer. Without one, runs record no insights.
    pub fn with_insight_writer(mut self, writer: Arc<dyn InsightWriter>) -> Self {
        self.insights = Some(writer);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn recorder(&self) -> &MonitoringRecorder<S> {
        &self.recorder
    }

    pub fn gate(&self) -> &ApprovalGate<S> {
        &self.gate
    }

    pub fn agent(&self) -> &AgentContext<S> {
        &self.agent
    }

    /// Run one full monitoring cycle for a pipeline.
    ///
    /// Collects metrics, scores them, plans follow-up actions, records the
    /// run, then walks each action through the approval gate. The cycle
    /// itself fails only on metrics collection or storage errors; denied
    /// and timed-out actions are reported, not raised.
    #[instrument(skip(self), fields(pipeline = %pipeline_name))]
    pub async fn run_cycle(&self, pipeline_name: &str) -> Result<CycleReport, MonitorError> {
        if pipeline_name.trim().is_empty() {
            return Err(MonitorError::Validation(
                "pipeline_name must not be empty".to_string(),
            ));
        }
        info!("Monitoring cycle started");

        let metrics =
            self.source
                .collect(pipeline_name)
                .await
                .map_err(|source| MonitorError::Collect {
                    pipeline: pipeline_name.to_string(),
                    source,
                })?;

        let assessment = self.assessor.assess(&metrics);
        info!(
            anomalies = assessment.anomalies.len(),
            risk = %assessment.risk_level,
            "Pipeline assessed"
        );

        let ai_insights = self.write_insights(pipeline_name, &metrics, &assessment).await;

        let report = MetricsReport::from_value(&metrics);
        let actions = plan_actions(&assessment, &report);

        let run_id = self
            .recorder
            .record(
                pipeline_name,
                metrics,
                assessment.anomalies.clone(),
                Some(assessment.risk_level),
                ai_insights.clone(),
                serde_json::json!({ "actions_planned": &actions }),
            )
            .await?;

        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            outcomes.push(self.gate_action(&run_id, action).await?);
        }

        self.checkpoint(pipeline_name, &run_id, &assessment, &outcomes).await?;

        info!(
            run_id = %run_id,
            actions = outcomes.len(),
            cleared = outcomes.iter().filter(|o| o.resolution.allows_execution()).count(),
            "Monitoring cycle finished"
        );
        Ok(CycleReport {
            run_id,
            pipeline_name: pipeline_name.to_string(),
            risk_level: assessment.risk_level,
            anomalies: assessment.anomalies,
            ai_insights,
            outcomes,
        })
    }

    async fn write_insights(
        &self,
        pipeline_name: &str,
        metrics: &serde_json::Value,
        assessment: &Assessment,
    ) -> Option<String> {
        let writer = self.insights.as_ref()?;
        match writer.summarize(pipeline_name, metrics, assessment).await {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(error = %err, "Insight writer failed; recording the error instead");
                Some(format!("AI analysis error: {err}"))
            }
        }
    }

    /// Walk one action through the gate.
    ///
    /// An action skips the gate when it does not require approval or when
    /// its risk sits below the gate's review threshold.
    async fn gate_action(
        &self,
        run_id: &RunId,
        action: PlannedAction,
    ) -> Result<ActionOutcome, MonitorError> {
        if !action.requires_approval || !self.gate.needs_review(Some(action.risk_level)) {
            return Ok(ActionOutcome {
                action,
                resolution: ActionResolution::AutoApproved,
                request_id: None,
            });
        }

        let request = self
            .gate
            .submit_for_run(
                &format!("[{}] {}", action.priority, action.action_type),
                &format!(
                    "{}\n\nPriority Level: {}\nRisk Impact: {}",
                    action.description, action.priority, action.risk_level
                ),
                action.risk_level,
                run_id.clone(),
            )
            .await?;

        let resolution = match self
            .gate
            .await_decision(&request.id, self.config.decision_timeout)
            .await?
        {
            DecisionOutcome::Decided(decided) => ActionResolution::from_status(decided.status),
            DecisionOutcome::TimedOut => {
                warn!(
                    request_id = %request.id,
                    action_type = %action.action_type,
                    "No verdict within the decision timeout; action stays blocked"
                );
                ActionResolution::TimedOut
            }
        };

        Ok(ActionOutcome {
            action,
            resolution,
            request_id: Some(request.id),
        })
    }

    /// Persist the agent-side trail of this cycle: a rolling state blob
    /// plus one short-term memory entry.
    async fn checkpoint(
        &self,
        pipeline_name: &str,
        run_id: &RunId,
        assessment: &Assessment,
        outcomes: &[ActionOutcome],
    ) -> Result<(), MonitorError> {
        let cycles_completed = match self.agent.load_state().await? {
            Some(state) => {
                state
                    .data
                    .get("cycles_completed")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
                    + 1
            }
            None => 1,
        };
        self.agent
            .save_state(serde_json::json!({
                "cycles_completed": cycles_completed,
                "last_pipeline": pipeline_name,
                "last_run_id": run_id,
                "last_risk_level": assessment.risk_level,
            }))
            .await?;

        self.agent
            .remember(
                MemoryKind::ShortTerm,
                serde_json::json!({
                    "run_id": run_id,
                    "pipeline": pipeline_name,
                    "risk_level": assessment.risk_level,
                    "anomalies": assessment.anomalies.len(),
                    "actions": outcomes.len(),
                    "cleared": outcomes.iter().filter(|o| o.resolution.allows_execution()).count(),
                }),
            )
            .await?;
        Ok(())
    }
}
