//! Turns an assessment into the concrete follow-up actions for a run.

use crate::assess::{Assessment, MetricsReport};
use sentinel_types::RiskLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Urgency label attached to a planned action. Distinct from
/// [`RiskLevel`]: priority says how fast a human should look, risk says
/// how bad the underlying finding is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Normal,
    Medium,
    High,
    Urgent,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Normal => "NORMAL",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
            Priority::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// One follow-up action derived from a monitoring run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub action_type: String,
    pub description: String,
    pub priority: Priority,
    pub risk_level: RiskLevel,
    /// Whether this action must pass the approval gate before anyone
    /// acts on it. Only the routine all-clear skips the gate.
    pub requires_approval: bool,
}

/// Derives the action list for a run in a fixed rule order: emergency
/// response, per-anomaly critical responses, volume investigations, then
/// quality improvement. A run that trips no rule gets a single routine
/// action that needs no approval.
pub fn plan_actions(assessment: &Assessment, report: &MetricsReport) -> Vec<PlannedAction> {
    let mut actions = Vec::new();

    if assessment.risk_level >= RiskLevel::High {
        actions.push(PlannedAction {
            action_type: "EMERGENCY Pipeline Response".to_string(),
            description: "Critical pipeline issues detected requiring immediate intervention"
                .to_string(),
            priority: Priority::Urgent,
            risk_level: RiskLevel::High,
            requires_approval: true,
        });
    }

    for anomaly in &assessment.anomalies {
        if anomaly.contains("CRITICAL") {
            actions.push(PlannedAction {
                action_type: "Critical Data Quality Response".to_string(),
                description: format!("Address critical issue: {anomaly}"),
                priority: Priority::High,
                risk_level: RiskLevel::High,
                requires_approval: true,
            });
        }
    }

    if report.total_records == 0 {
        actions.push(PlannedAction {
            action_type: "Pipeline Failure Investigation".to_string(),
            description: "No data processed - investigate source systems and connections"
                .to_string(),
            priority: Priority::Critical,
            risk_level: RiskLevel::High,
            requires_approval: true,
        });
    } else if report.total_records < 100 {
        actions.push(PlannedAction {
            action_type: "Low Volume Investigation".to_string(),
            description: format!(
                "Unusually low record count ({}) requires review",
                report.total_records
            ),
            priority: Priority::Medium,
            risk_level: RiskLevel::Medium,
            requires_approval: true,
        });
    }

    let quality = report.quality_score();
    if quality < 70.0 {
        actions.push(PlannedAction {
            action_type: "Data Quality Improvement".to_string(),
            description: format!("Data quality score ({quality:.1}%) below acceptable threshold"),
            priority: Priority::High,
            risk_level: RiskLevel::Medium,
            requires_approval: true,
        });
    }

    if actions.is_empty() {
        actions.push(PlannedAction {
            action_type: "Routine Monitoring Complete".to_string(),
            description: "Pipeline monitoring completed successfully with no critical issues"
                .to_string(),
            priority: Priority::Normal,
            risk_level: RiskLevel::Low,
            requires_approval: false,
        });
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(value: serde_json::Value) -> MetricsReport {
        MetricsReport::from_value(&value)
    }

    fn assessment(risk_level: RiskLevel, anomalies: &[&str]) -> Assessment {
        Assessment {
            anomalies: anomalies.iter().map(|a| a.to_string()).collect(),
            risk_level,
        }
    }

    #[test]
    fn healthy_run_plans_routine_monitoring_only() {
        let actions = plan_actions(
            &assessment(RiskLevel::Low, &[]),
            &report(serde_json::json!({"total_records": 5000, "total_columns": 10})),
        );

        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, "Routine Monitoring Complete");
        assert_eq!(actions[0].priority, Priority::Normal);
        assert!(!actions[0].requires_approval);
    }

    #[test]
    fn high_risk_plans_an_emergency_response_first() {
        let actions = plan_actions(
            &assessment(RiskLevel::High, &["HIGH: High duplicate rate (18.0%)"]),
            &report(serde_json::json!({"total_records": 5000, "total_columns": 10})),
        );

        assert_eq!(actions[0].action_type, "EMERGENCY Pipeline Response");
        assert_eq!(actions[0].priority, Priority::Urgent);
        assert_eq!(actions[0].risk_level, RiskLevel::High);
        assert!(actions[0].requires_approval);
    }

    #[test]
    fn each_critical_anomaly_gets_its_own_response() {
        let actions = plan_actions(
            &assessment(
                RiskLevel::Medium,
                &[
                    "CRITICAL: Excessive missing data (31.0%)",
                    "MEDIUM: Moderate duplicate rate (6.2%)",
                    "CRITICAL: Very high duplicate rate (24.0%)",
                ],
            ),
            &report(serde_json::json!({"total_records": 5000, "total_columns": 10})),
        );

        let responses: Vec<_> = actions
            .iter()
            .filter(|a| a.action_type == "Critical Data Quality Response")
            .collect();
        assert_eq!(responses.len(), 2);
        assert_eq!(
            responses[0].description,
            "Address critical issue: CRITICAL: Excessive missing data (31.0%)"
        );
        assert!(responses.iter().all(|a| a.requires_approval));
    }

    #[test]
    fn empty_dataset_plans_failure_investigation_not_low_volume() {
        let actions = plan_actions(
            &assessment(RiskLevel::High, &["CRITICAL: No data records found - pipeline failure"]),
            &report(serde_json::json!({"total_records": 0, "total_columns": 0})),
        );

        assert!(actions
            .iter()
            .any(|a| a.action_type == "Pipeline Failure Investigation"
                && a.priority == Priority::Critical));
        assert!(!actions
            .iter()
            .any(|a| a.action_type == "Low Volume Investigation"));
    }

    #[test]
    fn low_but_nonzero_volume_plans_an_investigation() {
        let actions = plan_actions(
            &assessment(RiskLevel::Low, &["HIGH: Extremely low record count (42)"]),
            &report(serde_json::json!({"total_records": 42, "total_columns": 10})),
        );

        let action = actions
            .iter()
            .find(|a| a.action_type == "Low Volume Investigation")
            .unwrap();
        assert_eq!(
            action.description,
            "Unusually low record count (42) requires review"
        );
        assert_eq!(action.priority, Priority::Medium);
        assert_eq!(action.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn low_quality_plans_improvement_work() {
        let actions = plan_actions(
            &assessment(RiskLevel::Low, &["HIGH: Below standard data quality (65.5%)"]),
            &report(serde_json::json!({
                "total_records": 5000,
                "total_columns": 10,
                "data_quality_score": 65.5,
            })),
        );

        let action = actions
            .iter()
            .find(|a| a.action_type == "Data Quality Improvement")
            .unwrap();
        assert_eq!(
            action.description,
            "Data quality score (65.5%) below acceptable threshold"
        );
        assert!(action.requires_approval);
    }

    #[test]
    fn priority_labels_render_uppercase() {
        assert_eq!(Priority::Urgent.to_string(), "URGENT");
        assert_eq!(
            serde_json::to_value(Priority::Critical).unwrap(),
            serde_json::json!("CRITICAL")
        );
    }
}
