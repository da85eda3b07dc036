//! Risk and anomaly scoring over a pipeline's metrics payload.
//!
//! The scoring collaborator is a pure function of the metrics: no side
//! effects on stored state. `ThresholdAssessor` is the built-in
//! implementation; callers with their own scoring plug in via
//! [`RiskAssessor`].

use sentinel_types::RiskLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Typed view of the fields the assessor reads from a metrics payload.
///
/// Every field is optional in the wire form; absent fields score as zero
/// (or, for the quality score, as a perfect 100). A payload this view
/// cannot be read from at all scores as an empty dataset.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MetricsReport {
    #[serde(default)]
    pub total_records: u64,
    #[serde(default)]
    pub total_columns: u64,
    /// Missing-value count per column.
    #[serde(default)]
    pub missing_values: BTreeMap<String, u64>,
    #[serde(default)]
    pub duplicate_records: u64,
    /// Per-column statistics for numeric columns.
    #[serde(default)]
    pub statistical_summary: BTreeMap<String, ColumnStats>,
    #[serde(default)]
    pub data_quality_score: Option<f64>,
}

/// The per-column statistics the assessor cares about. Other keys in the
/// payload (mean, quantiles, ...) are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ColumnStats {
    #[serde(default)]
    pub skewness: f64,
    #[serde(default)]
    pub null_percentage: f64,
}

impl MetricsReport {
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Sum of per-column missing counts, saturating at `u64::MAX`.
    pub fn total_missing(&self) -> u64 {
        self.missing_values
            .values()
            .fold(0u64, |total, count| total.saturating_add(*count))
    }

    /// Quality score with the optimistic default for unreported payloads.
    pub fn quality_score(&self) -> f64 {
        self.data_quality_score.unwrap_or(100.0)
    }
}

/// One scoring pass over a metrics payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Severity-prefixed anomaly descriptions, e.g.
    /// `"CRITICAL: Excessive missing data (26.3%)"`.
    pub anomalies: Vec<String>,
    pub risk_level: RiskLevel,
}

/// The risk/anomaly scoring collaborator seam.
pub trait RiskAssessor: Send + Sync {
    fn assess(&self, metrics: &serde_json::Value) -> Assessment;
}

/// Assessor policy knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssessorConfig {
    /// Record count below which a low-volume anomaly fires.
    pub low_record_count: u64,
    /// Record count below which the volume anomaly escalates to high.
    pub very_low_record_count: u64,
    /// Quality score under which a high-severity quality anomaly fires.
    pub quality_floor_high: f64,
    /// Quality score under which the quality anomaly escalates to critical.
    pub quality_floor_critical: f64,
    /// Weighted anomaly score at which overall risk becomes medium.
    pub medium_risk_score: u32,
    /// Weighted anomaly score at which overall risk becomes high.
    pub high_risk_score: u32,
}

impl Default for AssessorConfig {
    fn default() -> Self {
        Self {
            low_record_count: 200,
            very_low_record_count: 50,
            quality_floor_high: 80.0,
            quality_floor_critical: 60.0,
            medium_risk_score: 8,
            high_risk_score: 15,
        }
    }
}

/// Built-in threshold scoring.
///
/// Anomalies are weighted by their severity prefix and summed; the overall
/// level tops out at `High` even when individual anomalies are
/// critical-severity, keeping "critical" reserved for per-finding tags.
pub struct ThresholdAssessor {
    config: AssessorConfig,
}

impl ThresholdAssessor {
    pub fn new(config: AssessorConfig) -> Self {
        Self { config }
    }

    fn detect_anomalies(&self, report: &MetricsReport) -> Vec<String> {
        let mut anomalies = Vec::new();

        // Missing data across the whole table. The cell count can exceed
        // u64, so the ratio is taken in f64.
        let total_cells = report.total_records as f64 * report.total_columns as f64;
        let null_pct = if total_cells > 0.0 {
            report.total_missing() as f64 / total_cells * 100.0
        } else {
            0.0
        };
        if null_pct > 25.0 {
            anomalies.push(format!("CRITICAL: Excessive missing data ({null_pct:.1}%)"));
        } else if null_pct > 15.0 {
            anomalies.push(format!("HIGH: Significant missing data ({null_pct:.1}%)"));
        } else if null_pct > 8.0 {
            anomalies.push(format!("MEDIUM: Moderate missing data ({null_pct:.1}%)"));
        }

        // Duplicates
        let dup_pct = if report.total_records > 0 {
            report.duplicate_records as f64 / report.total_records as f64 * 100.0
        } else {
            0.0
        };
        if dup_pct > 20.0 {
            anomalies.push(format!("CRITICAL: Very high duplicate rate ({dup_pct:.1}%)"));
        } else if dup_pct > 10.0 {
            anomalies.push(format!("HIGH: High duplicate rate ({dup_pct:.1}%)"));
        } else if dup_pct > 5.0 {
            anomalies.push(format!("MEDIUM: Moderate duplicate rate ({dup_pct:.1}%)"));
        }

        // Volume
        if report.total_records == 0 {
            anomalies.push("CRITICAL: No data records found - pipeline failure".to_string());
        } else if report.total_records < self.config.very_low_record_count {
            anomalies.push(format!(
                "HIGH: Extremely low record count ({})",
                report.total_records
            ));
        } else if report.total_records < self.config.low_record_count {
            anomalies.push(format!("MEDIUM: Low record count ({})", report.total_records));
        }

        // Schema shape
        if report.total_columns < 2 {
            anomalies.push("HIGH: Very few columns - possible data truncation".to_string());
        } else if report.total_columns > 150 {
            anomalies
                .push("MEDIUM: Unusually high column count - consider optimization".to_string());
        }

        // Per-column statistics
        for (column, stats) in &report.statistical_summary {
            if stats.skewness > 3.0 {
                anomalies.push(format!("MEDIUM: High skewness in {column} column"));
            }
            if stats.null_percentage > 50.0 {
                anomalies.push(format!("HIGH: {column} column >50% missing values"));
            }
        }

        // Overall quality score
        let quality = report.quality_score();
        if quality < self.config.quality_floor_critical {
            anomalies.push(format!("CRITICAL: Low data quality score ({quality:.1}%)"));
        } else if quality < self.config.quality_floor_high {
            anomalies.push(format!("HIGH: Below standard data quality ({quality:.1}%)"));
        }

        anomalies
    }

    fn score_risk(&self, anomalies: &[String], report: &MetricsReport) -> RiskLevel {
        if anomalies.is_empty() {
            return RiskLevel::Low;
        }

        let mut score: u32 = 0;
        for anomaly in anomalies {
            score += if anomaly.contains("CRITICAL") {
                10
            } else if anomaly.contains("HIGH") {
                6
            } else if anomaly.contains("MEDIUM") {
                3
            } else {
                1
            };
        }

        // A run with no data at all, or with a collapsed quality score, is
        // riskier than its individual anomalies suggest.
        if report.total_records == 0 {
            score += 15;
        }
        if report.quality_score() < 50.0 {
            score += 8;
        }

        if score >= self.config.high_risk_score {
            RiskLevel::High
        } else if score >= self.config.medium_risk_score {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl Default for ThresholdAssessor {
    fn default() -> Self {
        Self::new(AssessorConfig::default())
    }
}

impl RiskAssessor for ThresholdAssessor {
    fn assess(&self, metrics: &serde_json::Value) -> Assessment {
        let report = MetricsReport::from_value(metrics);
        let anomalies = self.detect_anomalies(&report);
        let risk_level = self.score_risk(&anomalies, &report);
        Assessment {
            anomalies,
            risk_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assess(metrics: serde_json::Value) -> Assessment {
        ThresholdAssessor::default().assess(&metrics)
    }

    #[test]
    fn healthy_metrics_produce_no_anomalies() {
        let assessment = assess(serde_json::json!({
            "total_records": 12000,
            "total_columns": 12,
            "missing_values": {"amount": 0, "region": 0},
            "duplicate_records": 0,
            "data_quality_score": 97.5,
        }));

        assert!(assessment.anomalies.is_empty());
        assert_eq!(assessment.risk_level, RiskLevel::Low);
    }

    #[test]
    fn empty_dataset_is_high_risk_pipeline_failure() {
        let assessment = assess(serde_json::json!({
            "total_records": 0,
            "total_columns": 0,
        }));

        assert!(assessment
            .anomalies
            .contains(&"CRITICAL: No data records found - pipeline failure".to_string()));
        assert!(assessment
            .anomalies
            .contains(&"HIGH: Very few columns - possible data truncation".to_string()));
        assert_eq!(assessment.risk_level, RiskLevel::High);
    }

    #[test]
    fn medium_findings_accumulate_to_medium_risk() {
        // Three medium anomalies (missing data, duplicates, low volume)
        // score 9, past the medium boundary of 8.
        let assessment = assess(serde_json::json!({
            "total_records": 150,
            "total_columns": 10,
            "missing_values": {"a": 150},
            "duplicate_records": 9,
            "data_quality_score": 85.0,
        }));

        assert_eq!(assessment.anomalies.len(), 3);
        assert!(assessment.anomalies[0].starts_with("MEDIUM: Moderate missing data"));
        assert!(assessment.anomalies[1].starts_with("MEDIUM: Moderate duplicate rate"));
        assert_eq!(assessment.anomalies[2], "MEDIUM: Low record count (150)");
        assert_eq!(assessment.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn quality_collapse_is_flagged_critical() {
        let assessment = assess(serde_json::json!({
            "total_records": 5000,
            "total_columns": 8,
            "data_quality_score": 55.0,
        }));

        assert!(assessment
            .anomalies
            .contains(&"CRITICAL: Low data quality score (55.0%)".to_string()));
    }

    #[test]
    fn column_stats_flag_skew_and_sparse_columns() {
        let assessment = assess(serde_json::json!({
            "total_records": 5000,
            "total_columns": 8,
            "statistical_summary": {
                "revenue": {"skewness": 4.2, "null_percentage": 61.0, "mean": 1250.5},
            },
        }));

        assert!(assessment
            .anomalies
            .contains(&"MEDIUM: High skewness in revenue column".to_string()));
        assert!(assessment
            .anomalies
            .contains(&"HIGH: revenue column >50% missing values".to_string()));
    }

    #[test]
    fn overall_risk_never_exceeds_high() {
        // Everything broken at once.
        let assessment = assess(serde_json::json!({
            "total_records": 0,
            "total_columns": 1,
            "duplicate_records": 0,
            "data_quality_score": 10.0,
        }));

        assert_eq!(assessment.risk_level, RiskLevel::High);
    }

    #[test]
    fn unreadable_payload_scores_as_empty_dataset() {
        let assessment = assess(serde_json::json!("not a metrics object"));
        assert!(assessment
            .anomalies
            .contains(&"CRITICAL: No data records found - pipeline failure".to_string()));
        assert_eq!(assessment.risk_level, RiskLevel::High);
    }

    #[test]
    fn thresholds_come_from_config() {
        let strict = ThresholdAssessor::new(AssessorConfig {
            low_record_count: 10_000,
            ..AssessorConfig::default()
        });
        let assessment = strict.assess(&serde_json::json!({
            "total_records": 5000,
            "total_columns": 10,
        }));
        assert_eq!(
            assessment.anomalies,
            vec!["MEDIUM: Low record count (5000)".to_string()]
        );
    }

    #[test]
    fn astronomical_record_counts_score_like_any_other_table() {
        // records * columns exceeds u64 here; the cell count must not wrap.
        let assessment = assess(serde_json::json!({
            "total_records": u64::MAX,
            "total_columns": 2,
            "missing_values": {"amount": 10},
            "duplicate_records": 0,
        }));

        assert!(assessment.anomalies.is_empty());
        assert_eq!(assessment.risk_level, RiskLevel::Low);
    }

    #[test]
    fn saturated_missing_counts_hit_the_worst_null_tier() {
        // Two per-column counts whose sum exceeds u64.
        let assessment = assess(serde_json::json!({
            "total_records": 4,
            "total_columns": 2,
            "missing_values": {"a": u64::MAX, "b": u64::MAX},
        }));

        assert!(assessment
            .anomalies
            .iter()
            .any(|a| a.starts_with("CRITICAL: Excessive missing data")));
    }

    proptest! {
        #[test]
        fn scoring_is_total_and_bounded(
            records in any::<u64>(),
            columns in any::<u64>(),
            missing in proptest::collection::btree_map("[a-z]{1,8}", any::<u64>(), 0..4),
            duplicates in any::<u64>(),
            quality in proptest::option::of(0.0f64..100.0),
        ) {
            let mut metrics = serde_json::json!({
                "total_records": records,
                "total_columns": columns,
                "missing_values": missing,
                "duplicate_records": duplicates,
            });
            if let Some(q) = quality {
                metrics["data_quality_score"] = serde_json::json!(q);
            }

            let assessment = ThresholdAssessor::default().assess(&metrics);

            // The overall ladder stops at High.
            prop_assert!(assessment.risk_level <= RiskLevel::High);
            // No anomalies always means low risk.
            if assessment.anomalies.is_empty() {
                prop_assert_eq!(assessment.risk_level, RiskLevel::Low);
            }
            // Every anomaly carries a recognizable severity prefix.
            for anomaly in &assessment.anomalies {
                prop_assert!(
                    anomaly.starts_with("CRITICAL: ")
                        || anomaly.starts_with("HIGH: ")
                        || anomaly.starts_with("MEDIUM: ")
                );
            }
        }
    }
}
