use crate::model::{BatchRow, RunStatus};
use crate::report::analysis::AnalysisSummary;

pub fn print_batch_summary(label: &str, rows: &[BatchRow]) {
    let mut completed = 0;
    let mut failed = 0;

    for r in rows {
        match r.status {
            RunStatus::Completed => completed += 1,
            RunStatus::Failed => {
                failed += 1;
                eprintln!(
                    "FAIL [{} goal={} model={}]: {}",
                    r.id, r.goal, r.model, r.message
                );
            }
        }
    }

    eprintln!("{}: completed={} failed={}", label, completed, failed);
}

pub fn print_analysis(summary: &AnalysisSummary) {
    eprintln!(
        "Top model: {} (overall avg {:.3})",
        summary.top_model, summary.top_model_overall_avg
    );
    eprintln!("Metric leaders:");
    for (metric, leader) in &summary.metric_leaders {
        eprintln!(" - {}: {} ({:.3})", metric, leader.model, leader.score);
    }
    if let Some(leader) = &summary.latency_leader {
        eprintln!(
            "Fastest model (per message): {} ({:.2}s average latency per message)",
            leader.model, leader.seconds_per_message
        );
    }
}
