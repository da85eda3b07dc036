//! Sentinel Types - monitoring runs, approval requests, agent state
#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);
impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}
impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);
impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}
impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);
impl RunId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}
impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered severity of a finding or proposed action. Variant order is the
/// severity order, so `>=` comparisons against a policy threshold are valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized risk level: {0}")]
pub struct InvalidRiskLevel(pub String);

impl std::str::FromStr for RiskLevel {
    type Err = InvalidRiskLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(InvalidRiskLevel(other.to_string())),
        }
    }
}

/// Lifecycle of an approval request. `Pending` is the only non-terminal
/// state; a request leaves it exactly once and never returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Modified,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        match self {
            ApprovalStatus::Pending => false,
            ApprovalStatus::Approved | ApprovalStatus::Denied | ApprovalStatus::Modified => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
            ApprovalStatus::Modified => "modified",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized approval status: {0}")]
pub struct InvalidApprovalStatus(pub String);

impl std::str::FromStr for ApprovalStatus {
    type Err = InvalidApprovalStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "denied" => Ok(ApprovalStatus::Denied),
            "modified" => Ok(ApprovalStatus::Modified),
            other => Err(InvalidApprovalStatus(other.to_string())),
        }
    }
}

/// Verdict a reviewer hands to the gate. Serializes as the stored decision
/// payload: `{"verdict":"approved"}`, `{"verdict":"denied","reason":...}`,
/// `{"verdict":"modified","changes":...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict")]
pub enum Decision {
    #[serde(rename = "approved")]
    Approve,
    #[serde(rename = "denied")]
    Deny {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    #[serde(rename = "modified")]
    Modify { changes: serde_json::Value },
}

impl Decision {
    /// Terminal status this verdict resolves a pending request to.
    pub fn status(&self) -> ApprovalStatus {
        match self {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Deny { .. } => ApprovalStatus::Denied,
            Decision::Modify { .. } => ApprovalStatus::Modified,
        }
    }

    pub fn allows_execution(&self) -> bool {
        match self {
            Decision::Approve | Decision::Modify { .. } => true,
            Decision::Deny { .. } => false,
        }
    }
}

/// Memory tag, open set: the well-known tiers plus anything an agent
/// invents. Round-trips through its plain string form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoryKind {
    ShortTerm,
    LongTerm,
    Other(String),
}

impl MemoryKind {
    pub fn as_str(&self) -> &str {
        match self {
            MemoryKind::ShortTerm => "short_term",
            MemoryKind::LongTerm => "long_term",
            MemoryKind::Other(tag) => tag,
        }
    }
}

impl From<String> for MemoryKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "short_term" => MemoryKind::ShortTerm,
            "long_term" => MemoryKind::LongTerm,
            _ => MemoryKind::Other(s),
        }
    }
}

impl From<MemoryKind> for String {
    fn from(kind: MemoryKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent-scoped state blob, updated in place on every write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentStateRecord {
    pub agent_id: AgentId,
    pub data: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Append-only memory record. No mutation path exists anywhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentMemoryEntry {
    pub agent_id: AgentId,
    pub memory_type: MemoryKind,
    pub content: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl AgentMemoryEntry {
    pub fn new(agent_id: AgentId, memory_type: MemoryKind, content: serde_json::Value) -> Self {
        Self {
            agent_id,
            memory_type,
            content,
            created_at: chrono::Utc::now(),
        }
    }
}

/// A unit of work waiting on human sign-off.
///
/// Invariants: while `status` is `Pending`, `decision` and `decided_at` are
/// both `None`; once terminal, `decided_at` is set and no field ever changes
/// again.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: RequestId,
    pub action_type: String,
    pub description: String,
    pub risk_level: RiskLevel,
    pub status: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ApprovalRequest {
    pub fn new(
        action_type: impl Into<String>,
        description: impl Into<String>,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            action_type: action_type.into(),
            description: description.into(),
            risk_level,
            status: ApprovalStatus::Pending,
            decision: None,
            run_id: None,
            created_at: chrono::Utc::now(),
            decided_at: None,
        }
    }

    /// Attach the monitoring run that triggered this request.
    pub fn for_run(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn is_pending(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Write-once record of one pipeline execution cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoringRun {
    pub id: RunId,
    pub pipeline_name: String,
    pub metrics: serde_json::Value,
    pub anomalies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<String>,
    pub execution_results: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl MonitoringRun {
    pub fn new(
        pipeline_name: impl Into<String>,
        metrics: serde_json::Value,
        anomalies: Vec<String>,
        risk_level: Option<RiskLevel>,
        ai_insights: Option<String>,
        execution_results: serde_json::Value,
    ) -> Self {
        Self {
            id: RunId::generate(),
            pipeline_name: pipeline_name.into(),
            metrics,
            anomalies,
            risk_level,
            ai_insights,
            execution_results,
            created_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert!(RiskLevel::Medium >= RiskLevel::Medium);
    }

    #[test]
    fn risk_level_round_trips_through_strings() {
        for level in [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ] {
            assert_eq!(RiskLevel::from_str(level.as_str()).unwrap(), level);
        }
    }

    #[test]
    fn unknown_risk_level_is_rejected() {
        let err = RiskLevel::from_str("extreme").unwrap_err();
        assert_eq!(err, InvalidRiskLevel("extreme".to_string()));
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(ApprovalStatus::Approved.is_terminal());
        assert!(ApprovalStatus::Denied.is_terminal());
        assert!(ApprovalStatus::Modified.is_terminal());
    }

    #[test]
    fn decision_maps_to_terminal_status() {
        assert_eq!(Decision::Approve.status(), ApprovalStatus::Approved);
        assert_eq!(
            Decision::Deny { reason: None }.status(),
            ApprovalStatus::Denied
        );
        let modify = Decision::Modify {
            changes: serde_json::json!({"batch_size": 100}),
        };
        assert_eq!(modify.status(), ApprovalStatus::Modified);
        assert!(modify.allows_execution());
        assert!(!Decision::Deny { reason: None }.allows_execution());
    }

    #[test]
    fn decision_payload_shape() {
        let payload = serde_json::to_value(Decision::Deny {
            reason: Some("too risky".to_string()),
        })
        .unwrap();
        assert_eq!(
            payload,
            serde_json::json!({"verdict": "denied", "reason": "too risky"})
        );
        assert_eq!(
            serde_json::to_value(Decision::Approve).unwrap(),
            serde_json::json!({"verdict": "approved"})
        );
    }

    #[test]
    fn memory_kind_preserves_unknown_tags() {
        assert_eq!(MemoryKind::from("short_term".to_string()), MemoryKind::ShortTerm);
        let episodic = MemoryKind::from("episodic".to_string());
        assert_eq!(episodic, MemoryKind::Other("episodic".to_string()));
        assert_eq!(String::from(episodic), "episodic");
    }

    #[test]
    fn new_request_starts_pending() {
        let request = ApprovalRequest::new("data_quality_check", "2 anomalies found", RiskLevel::Medium);
        assert_eq!(request.status, ApprovalStatus::Pending);
        assert!(request.decision.is_none());
        assert!(request.decided_at.is_none());
        assert!(request.is_pending());
    }
}
