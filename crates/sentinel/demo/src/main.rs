#![deny(unsafe_code)]
//! Sentinel demo binary walking the approval-gated monitoring loop.
//!
//! Runs a self-contained demonstration of:
//! 1. A healthy pipeline cycle whose routine action clears without review
//! 2. A broken pipeline cycle gated behind a simulated reviewer
//! 3. The audit trail left behind: runs, requests, agent state, memory
//!
//! No external services required -- metrics and the reviewer are simulated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sentinel_gate::ApprovalGate;
use sentinel_monitor::{
    ActionResolution, Assessment, BoxError, CycleReport, InsightWriter, MetricsSource,
    MonitorConfig, PipelineMonitor,
};
use sentinel_storage::memory::MemorySentinelStore;
use sentinel_storage::QueryWindow;
use sentinel_types::Decision;

// ── Formatting Helpers ──────────────────────────────────────────────────

const BANNER: &str = r#"
 ╔══════════════════════════════════════════════════════════════╗
 ║           Sentinel  --  Pipeline Monitoring Demo             ║
 ║                                                              ║
 ║   Metrics scoring, action planning, and human-gated          ║
 ║   approvals over a simulated data warehouse.                 ║
 ╚══════════════════════════════════════════════════════════════╝
"#;

fn section(title: &str) {
    let width: usize = 60;
    println!();
    println!(" ── {} {}", title, "─".repeat(width.saturating_sub(title.len() + 1)));
}

fn ok(msg: &str) {
    println!("   [OK]  {}", msg);
}

fn info(msg: &str) {
    println!("   [--]  {}", msg);
}

fn warn(msg: &str) {
    println!("   [!!]  {}", msg);
}

// ── Simulated Collaborators ─────────────────────────────────────────────

/// Warehouse stand-in: one healthy feed, everything else broken upstream.
struct SimulatedWarehouse;

#[async_trait]
impl MetricsSource for SimulatedWarehouse {
    async fn collect(&self, pipeline_name: &str) -> Result<serde_json::Value, BoxError> {
        let payload = match pipeline_name {
            "Customer ETL" => serde_json::json!({
                "total_records": 12450,
                "total_columns": 14,
                "missing_values": {"email": 120, "region": 45},
                "duplicate_records": 31,
                "statistical_summary": {
                    "order_total": {"skewness": 1.2, "null_percentage": 0.8},
                },
                "data_quality_score": 94.3,
            }),
            _ => serde_json::json!({
                "total_records": 0,
                "total_columns": 1,
                "data_quality_score": 38.0,
            }),
        };
        Ok(payload)
    }
}

/// Insight stand-in for the LLM layer.
struct TemplateInsights;

#[async_trait]
impl InsightWriter for TemplateInsights {
    async fn summarize(
        &self,
        pipeline_name: &str,
        _metrics: &serde_json::Value,
        assessment: &Assessment,
    ) -> Result<String, BoxError> {
        Ok(format!(
            "{}: {} anomalies at {} risk",
            pipeline_name,
            assessment.anomalies.len(),
            assessment.risk_level
        ))
    }
}

/// Background reviewer that clears everything except quality-improvement
/// work, which it sends back.
fn spawn_reviewer(store: Arc<MemorySentinelStore>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let gate = ApprovalGate::new(store);
        loop {
            let pending = match gate.pending_requests().await {
                Ok(pending) => pending,
                Err(_) => return,
            };
            for request in pending {
                let verdict = if request.action_type.contains("Data Quality Improvement") {
                    Decision::Deny {
                        reason: Some("fix the source feed first".to_string()),
                    }
                } else {
                    Decision::Approve
                };
                if gate.decide(&request.id, verdict).await.is_ok() {
                    info(&format!("Reviewer decided: {}", request.action_type));
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
}

// ── Main ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(tracing::Level::WARN)
        .init();

    println!("{}", BANNER);

    if let Err(e) = run_demo().await {
        eprintln!();
        eprintln!("   [FATAL]  Demo failed: {}", e);
        std::process::exit(1);
    }

    println!();
    println!(" ══════════════════════════════════════════════════════════════");
    println!("  Demo complete.");
    println!(" ══════════════════════════════════════════════════════════════");
    println!();
}

async fn run_demo() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemorySentinelStore::new());
    let monitor = PipelineMonitor::with_config(
        Arc::clone(&store),
        Arc::new(SimulatedWarehouse),
        MonitorConfig {
            decision_timeout: Duration::from_secs(10),
            ..MonitorConfig::default()
        },
    )
    .with_insight_writer(Arc::new(TemplateInsights));

    let reviewer = spawn_reviewer(Arc::clone(&store));

    // ── Phase A: healthy pipeline ───────────────────────────────────
    section("Phase A: Healthy Pipeline");

    let report = monitor.run_cycle("Customer ETL").await?;
    print_report(&report);

    // ── Phase B: broken nightly feed ────────────────────────────────
    section("Phase B: Broken Nightly Feed");

    let report = monitor.run_cycle("Nightly Orders Feed").await?;
    print_report(&report);

    reviewer.abort();

    // ── Phase C: audit trail ────────────────────────────────────────
    section("Phase C: Audit Trail");

    let runs = monitor.recorder().history(None, QueryWindow::default()).await?;
    for run in &runs {
        info(&format!(
            "run {}  pipeline={}  risk={}  anomalies={}",
            run.id,
            run.pipeline_name,
            run.risk_level
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unassessed".to_string()),
            run.anomalies.len()
        ));
    }

    if let Some(state) = monitor.agent().load_state().await? {
        ok(&format!("Agent state  : {}", state.data));
    }
    let memories = monitor.agent().recall(QueryWindow::default()).await?;
    ok(&format!("Memory trail : {} entries", memories.len()));

    Ok(())
}

fn print_report(report: &CycleReport) {
    ok(&format!("Run id     : {}", report.run_id));
    ok(&format!("Risk level : {}", report.risk_level));
    if let Some(insights) = &report.ai_insights {
        info(&format!("Insights   : {}", insights));
    }
    for anomaly in &report.anomalies {
        warn(&format!("Anomaly    : {}", anomaly));
    }
    for outcome in &report.outcomes {
        let tag = match outcome.resolution {
            ActionResolution::AutoApproved => "cleared without review",
            ActionResolution::Approved => "approved",
            ActionResolution::Denied => "denied",
            ActionResolution::Modified => "modified",
            ActionResolution::TimedOut => "timed out",
        };
        info(&format!(
            "Action     : [{}] {} -> {}",
            outcome.action.priority, outcome.action.action_type, tag
        ));
    }
}
