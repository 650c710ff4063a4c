//! Plain-text report output on stdout.

use std::io::Write;

use sparkify_core::pipeline::PipelineSummary;
use sparkify_core::render::{render_counts, render_outcome};
use sparkify_core::validate::{ReportOutcome, ValidationReport};

/// Write row counts followed by each report outcome.
pub fn write_validation(out: &mut impl Write, report: &ValidationReport) -> std::io::Result<()> {
    match &report.counts {
        Ok(counts) => {
            writeln!(out, "== Row counts")?;
            write!(out, "{}", render_counts(counts))?;
        }
        Err(e) => writeln!(out, "== Row counts\nerror: {e}")?,
    }
    write_outcomes(out, &report.reports)
}

pub fn write_outcomes(out: &mut impl Write, outcomes: &[ReportOutcome]) -> std::io::Result<()> {
    for outcome in outcomes {
        writeln!(out)?;
        write!(out, "{}", render_outcome(outcome))?;
    }
    Ok(())
}

/// One JSON object describing a finished pipeline run.
pub fn summary_json(summary: &PipelineSummary) -> serde_json::Value {
    let loaded: serde_json::Map<String, serde_json::Value> = summary
        .load
        .iter()
        .flat_map(|load| load.loaded.iter())
        .map(|(table, rows)| (table.to_string(), serde_json::json!(rows)))
        .collect();
    let inserted: serde_json::Map<String, serde_json::Value> = summary
        .transform
        .iter()
        .flat_map(|report| report.outcomes.iter())
        .map(|o| {
            let value = match &o.result {
                Ok(rows) => serde_json::json!(rows),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            (o.table.to_string(), value)
        })
        .collect();
    serde_json::json!({
        "run_id": summary.run_id.to_string(),
        "started_at": summary.started_at.to_rfc3339(),
        "finished_at": summary.finished_at.to_rfc3339(),
        "loaded": loaded,
        "inserted": inserted,
        "errors": summary.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        "success": summary.is_success(),
    })
}
