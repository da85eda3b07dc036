//! Sentinel Gate - human-in-the-loop approval state machine.
//!
//! A request moves through `pending -> {approved, denied, modified}` exactly
//! once. The store's compare-and-set on `status` is the sole arbiter under
//! concurrency: of any number of racing `decide` calls, one wins and the rest
//! observe [`GateError::AlreadyDecided`]. The gate never retries on its own;
//! `decide` is not blindly retryable, and a retried `decide` on a decided
//! request must surface the error rather than silently succeed.

#![deny(unsafe_code)]

use chrono::Utc;
use sentinel_storage::{ApprovalStore, QueryWindow, RequestFilter, StorageError};
use sentinel_types::{
    ApprovalRequest, ApprovalStatus, Decision, InvalidRiskLevel, RequestId, RiskLevel, RunId,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Gate policy knobs.
#[derive(Clone, Debug)]
pub struct GateConfig {
    /// Minimum risk level at which `needs_review` asks for a human.
    pub review_threshold: RiskLevel,
    /// Sleep between store reads while waiting for a decision.
    pub poll_interval: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            review_threshold: RiskLevel::Medium,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Outcome of [`ApprovalGate::await_decision`].
///
/// `TimedOut` is a defined outcome, not an error: the request is untouched
/// and may still be decided later by a separate call.
#[derive(Clone, Debug)]
pub enum DecisionOutcome {
    Decided(ApprovalRequest),
    TimedOut,
}

/// Gate-related errors.
#[derive(Debug, Error)]
pub enum GateError {
    /// Input rejected before anything was persisted.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("approval request not found: {0}")]
    NotFound(String),

    /// Attempted transition out of a terminal state.
    #[error("already decided: {0}")]
    AlreadyDecided(String),

    #[error("storage error: {0}")]
    Storage(#[source] StorageError),
}

impl From<StorageError> for GateError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::AlreadyDecided(msg) => Self::AlreadyDecided(msg),
            StorageError::InvalidInput(msg) => Self::Validation(msg),
            StorageError::Conflict(_)
            | StorageError::ImmutableEntity(_)
            | StorageError::Serialization(_)
            | StorageError::Backend(_) => Self::Storage(value),
        }
    }
}

impl From<InvalidRiskLevel> for GateError {
    fn from(value: InvalidRiskLevel) -> Self {
        Self::Validation(value.to_string())
    }
}

/// The approval gate facade over an injected store.
pub struct ApprovalGate<S> {
    store: Arc<S>,
    config: GateConfig,
}

impl<S: ApprovalStore> ApprovalGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, GateConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: GateConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Access the underlying store.
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Review policy predicate the caller evaluates before `submit`.
    ///
    /// An unassessed run (`None`) requires no review; that is a product
    /// decision, not an inferred default.
    pub fn needs_review(&self, risk_level: Option<RiskLevel>) -> bool {
        match risk_level {
            Some(level) => level >= self.config.review_threshold,
            None => {
                debug!("Run without risk assessment skips review");
                false
            }
        }
    }

    /// Create a new request in `pending` state.
    ///
    /// The gate does not itself decide whether review is needed; callers
    /// check [`Self::needs_review`] first.
    pub async fn submit(
        &self,
        action_type: &str,
        description: &str,
        risk_level: RiskLevel,
    ) -> Result<ApprovalRequest, GateError> {
        self.submit_request(ApprovalRequest::new(action_type, description, risk_level))
            .await
    }

    /// `submit` variant carrying the monitoring run that triggered it.
    pub async fn submit_for_run(
        &self,
        action_type: &str,
        description: &str,
        risk_level: RiskLevel,
        run_id: RunId,
    ) -> Result<ApprovalRequest, GateError> {
        self.submit_request(ApprovalRequest::new(action_type, description, risk_level).for_run(run_id))
            .await
    }

    /// `submit` for callers holding a textual risk level.
    ///
    /// An unrecognized level fails validation before any row is created.
    pub async fn submit_raw(
        &self,
        action_type: &str,
        description: &str,
        risk_level: &str,
    ) -> Result<ApprovalRequest, GateError> {
        let risk = risk_level.parse::<RiskLevel>()?;
        self.submit(action_type, description, risk).await
    }

    async fn submit_request(&self, request: ApprovalRequest) -> Result<ApprovalRequest, GateError> {
        if request.action_type.trim().is_empty() {
            return Err(GateError::Validation(
                "action_type must not be empty".to_string(),
            ));
        }
        if request.description.trim().is_empty() {
            return Err(GateError::Validation(
                "description must not be empty".to_string(),
            ));
        }

        self.store.create_request(request.clone()).await?;
        info!(
            request_id = %request.id,
            action_type = %request.action_type,
            risk = %request.risk_level,
            "Approval request submitted"
        );
        Ok(request)
    }

    /// Resolve a pending request with a reviewer's verdict.
    ///
    /// Status, decision payload and `decided_at` land in one durable write;
    /// a partially resolved request is never observable. Exactly one of any
    /// concurrent `decide` calls succeeds.
    pub async fn decide(
        &self,
        request_id: &RequestId,
        decision: Decision,
    ) -> Result<ApprovalRequest, GateError> {
        let status = decision.status();
        let payload = serde_json::to_value(&decision)
            .map_err(|e| GateError::Storage(StorageError::Serialization(e.to_string())))?;
        let resolved = self
            .store
            .resolve_request(request_id, status, payload, Utc::now())
            .await?;

        info!(request_id = %request_id, status = %resolved.status, "Approval request decided");
        Ok(resolved)
    }

    /// Block until the request leaves `pending` or the timeout elapses.
    ///
    /// Polls the store at `poll_interval`; a zero timeout performs exactly
    /// one read. Timing out mutates nothing and the caller may wait again.
    pub async fn await_decision(
        &self,
        request_id: &RequestId,
        timeout: Duration,
    ) -> Result<DecisionOutcome, GateError> {
        let current = self
            .store
            .get_request(request_id)
            .await?
            .ok_or_else(|| GateError::NotFound(format!("approval request {request_id} not found")))?;
        if current.status.is_terminal() {
            return Ok(DecisionOutcome::Decided(current));
        }
        if timeout.is_zero() {
            return Ok(DecisionOutcome::TimedOut);
        }

        match tokio::time::timeout(timeout, self.poll_until_decided(request_id)).await {
            Ok(decided) => Ok(DecisionOutcome::Decided(decided?)),
            Err(_) => {
                debug!(request_id = %request_id, "Decision wait timed out; request remains pending");
                Ok(DecisionOutcome::TimedOut)
            }
        }
    }

    async fn poll_until_decided(&self, request_id: &RequestId) -> Result<ApprovalRequest, GateError> {
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            let request = self.store.get_request(request_id).await?.ok_or_else(|| {
                GateError::NotFound(format!("approval request {request_id} not found"))
            })?;
            if request.status.is_terminal() {
                return Ok(request);
            }
        }
    }

    /// Read back one request by id.
    pub async fn request(&self, request_id: &RequestId) -> Result<Option<ApprovalRequest>, GateError> {
        Ok(self.store.get_request(request_id).await?)
    }

    /// All requests still waiting on a reviewer, oldest first.
    pub async fn pending_requests(&self) -> Result<Vec<ApprovalRequest>, GateError> {
        Ok(self
            .store
            .list_requests(
                RequestFilter::new().with_status(ApprovalStatus::Pending),
                QueryWindow::default(),
            )
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_storage::memory::MemorySentinelStore;

    fn gate() -> ApprovalGate<MemorySentinelStore> {
        ApprovalGate::new(Arc::new(MemorySentinelStore::new()))
    }

    #[tokio::test]
    async fn submitted_request_starts_pending() {
        let gate = gate();
        let request = gate
            .submit("data_quality_check", "2 anomalies found", RiskLevel::Medium)
            .await
            .unwrap();

        assert_eq!(request.status, ApprovalStatus::Pending);
        assert!(request.decision.is_none());
        assert!(request.decided_at.is_none());

        let stored = gate.request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored, request);
    }

    #[tokio::test]
    async fn approve_then_deny_fails_already_decided() {
        let gate = gate();
        let request = gate
            .submit("data_quality_check", "2 anomalies found", RiskLevel::Medium)
            .await
            .unwrap();

        let approved = gate.decide(&request.id, Decision::Approve).await.unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert!(approved.decided_at.is_some());
        assert_eq!(
            approved.decision,
            Some(serde_json::json!({"verdict": "approved"}))
        );

        let denied = gate
            .decide(
                &request.id,
                Decision::Deny {
                    reason: Some("changed my mind".to_string()),
                },
            )
            .await;
        assert!(matches!(denied, Err(GateError::AlreadyDecided(_))));
    }

    #[tokio::test]
    async fn decided_at_is_set_iff_status_is_terminal() {
        let gate = gate();
        let request = gate
            .submit("schema_change", "add column", RiskLevel::High)
            .await
            .unwrap();
        assert!(!request.status.is_terminal());
        assert!(request.decided_at.is_none());

        let resolved = gate
            .decide(
                &request.id,
                Decision::Deny {
                    reason: Some("too risky".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(resolved.status.is_terminal());
        assert!(resolved.decided_at.is_some());
        assert_eq!(
            resolved.decision,
            Some(serde_json::json!({"verdict": "denied", "reason": "too risky"}))
        );
    }

    #[tokio::test]
    async fn modify_is_a_distinct_terminal_state() {
        let gate = gate();
        let request = gate
            .submit("backfill", "rerun last partition", RiskLevel::Medium)
            .await
            .unwrap();

        let changes = serde_json::json!({"partition": "2024-01-02"});
        let modified = gate
            .decide(
                &request.id,
                Decision::Modify {
                    changes: changes.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(modified.status, ApprovalStatus::Modified);
        assert_eq!(
            modified.decision,
            Some(serde_json::json!({"verdict": "modified", "changes": changes}))
        );

        let again = gate.decide(&request.id, Decision::Approve).await;
        assert!(matches!(again, Err(GateError::AlreadyDecided(_))));
    }

    #[tokio::test]
    async fn decide_unknown_id_is_not_found() {
        let gate = gate();
        let result = gate
            .decide(&RequestId::new("missing"), Decision::Approve)
            .await;
        assert!(matches!(result, Err(GateError::NotFound(_))));
    }

    #[tokio::test]
    async fn unknown_risk_string_creates_no_row() {
        let gate = gate();
        let result = gate
            .submit_raw("deploy", "ship the hotfix", "extreme")
            .await;
        assert!(matches!(result, Err(GateError::Validation(_))));

        let pending = gate.pending_requests().await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn empty_action_type_is_rejected() {
        let gate = gate();
        let result = gate.submit("", "description", RiskLevel::Low).await;
        assert!(matches!(result, Err(GateError::Validation(_))));
    }

    #[tokio::test]
    async fn zero_timeout_returns_timed_out_and_leaves_request_pending() {
        let gate = gate();
        let request = gate
            .submit("data_quality_check", "2 anomalies found", RiskLevel::Medium)
            .await
            .unwrap();

        let outcome = gate
            .await_decision(&request.id, Duration::ZERO)
            .await
            .unwrap();
        assert!(matches!(outcome, DecisionOutcome::TimedOut));

        let stored = gate.request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ApprovalStatus::Pending);
        assert!(stored.decided_at.is_none());
    }

    #[tokio::test]
    async fn await_decision_on_already_decided_request_returns_immediately() {
        let gate = gate();
        let request = gate
            .submit("data_quality_check", "2 anomalies found", RiskLevel::Medium)
            .await
            .unwrap();
        gate.decide(&request.id, Decision::Approve).await.unwrap();

        let outcome = gate
            .await_decision(&request.id, Duration::ZERO)
            .await
            .unwrap();
        match outcome {
            DecisionOutcome::Decided(decided) => {
                assert_eq!(decided.status, ApprovalStatus::Approved)
            }
            DecisionOutcome::TimedOut => panic!("expected a decided outcome"),
        }
    }

    #[tokio::test]
    async fn await_decision_unknown_id_is_not_found() {
        let gate = gate();
        let result = gate
            .await_decision(&RequestId::new("missing"), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(GateError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn await_decision_observes_a_concurrent_decide() {
        let store = Arc::new(MemorySentinelStore::new());
        let gate = Arc::new(ApprovalGate::new(Arc::clone(&store)));
        let request = gate
            .submit("data_quality_check", "2 anomalies found", RiskLevel::Medium)
            .await
            .unwrap();

        let decider = Arc::clone(&gate);
        let request_id = request.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            decider.decide(&request_id, Decision::Approve).await.unwrap();
        });

        let outcome = gate
            .await_decision(&request.id, Duration::from_secs(5))
            .await
            .unwrap();
        match outcome {
            DecisionOutcome::Decided(decided) => {
                assert_eq!(decided.status, ApprovalStatus::Approved)
            }
            DecisionOutcome::TimedOut => panic!("expected a decided outcome"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_wait_does_not_block_a_later_decision() {
        let gate = gate();
        let request = gate
            .submit("data_quality_check", "2 anomalies found", RiskLevel::Medium)
            .await
            .unwrap();

        let outcome = gate
            .await_decision(&request.id, Duration::from_millis(200))
            .await
            .unwrap();
        assert!(matches!(outcome, DecisionOutcome::TimedOut));

        // Abandoned waits leave the request decidable.
        let resolved = gate.decide(&request.id, Decision::Approve).await.unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn concurrent_decides_have_exactly_one_winner() {
        let gate = Arc::new(gate());
        let request = gate
            .submit("data_quality_check", "2 anomalies found", RiskLevel::High)
            .await
            .unwrap();

        let approve_gate = Arc::clone(&gate);
        let approve_id = request.id.clone();
        let approve = tokio::spawn(async move {
            approve_gate.decide(&approve_id, Decision::Approve).await
        });

        let deny_gate = Arc::clone(&gate);
        let deny_id = request.id.clone();
        let deny = tokio::spawn(async move {
            deny_gate
                .decide(
                    &deny_id,
                    Decision::Deny {
                        reason: Some("no".to_string()),
                    },
                )
                .await
        });

        let approve_result = approve.await.unwrap();
        let deny_result = deny.await.unwrap();

        let winners = [&approve_result, &deny_result]
            .iter()
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(winners, 1);

        let loser = if approve_result.is_ok() {
            deny_result
        } else {
            approve_result
        };
        assert!(matches!(loser, Err(GateError::AlreadyDecided(_))));

        let stored = gate.request(&request.id).await.unwrap().unwrap();
        assert!(stored.status.is_terminal());
        assert!(stored.decided_at.is_some());
    }

    #[tokio::test]
    async fn needs_review_applies_threshold_and_null_policy() {
        let gate = gate();
        assert!(!gate.needs_review(None));
        assert!(!gate.needs_review(Some(RiskLevel::Low)));
        assert!(gate.needs_review(Some(RiskLevel::Medium)));
        assert!(gate.needs_review(Some(RiskLevel::Critical)));

        let strict = ApprovalGate::with_config(
            Arc::new(MemorySentinelStore::new()),
            GateConfig {
                review_threshold: RiskLevel::High,
                ..GateConfig::default()
            },
        );
        assert!(!strict.needs_review(Some(RiskLevel::Medium)));
        assert!(strict.needs_review(Some(RiskLevel::High)));
    }

    #[test]
    fn storage_errors_lift_into_gate_variants() {
        assert!(matches!(
            GateError::from(StorageError::NotFound("r1".to_string())),
            GateError::NotFound(_)
        ));
        assert!(matches!(
            GateError::from(StorageError::AlreadyDecided("r1".to_string())),
            GateError::AlreadyDecided(_)
        ));
        assert!(matches!(
            GateError::from(StorageError::InvalidInput("bad".to_string())),
            GateError::Validation(_)
        ));

        // Backend failures pass through intact and chain as source().
        let err = GateError::from(StorageError::Backend("connection reset".to_string()));
        assert!(matches!(err, GateError::Storage(StorageError::Backend(_))));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("backend error: connection reset"));
    }

    #[tokio::test]
    async fn submit_for_run_carries_the_run_id() {
        let gate = gate();
        let run_id = RunId::new("run-42");
        let request = gate
            .submit_for_run(
                "data_quality_check",
                "2 anomalies found",
                RiskLevel::Medium,
                run_id.clone(),
            )
            .await
            .unwrap();
        assert_eq!(request.run_id, Some(run_id));

        let stored = gate.request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.run_id, request.run_id);
    }
}
