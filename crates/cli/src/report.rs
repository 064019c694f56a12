use std::collections::BTreeMap;
use std::path::PathBuf;
use serde::Serialize;
use transcoder::{LedgerTotals, RunSummary};

/// Files whose durations round to the same second. Only groups with two or more members.
pub fn group_by_duration(files: Vec<(PathBuf, f64)>) -> Vec<(u64, Vec<PathBuf>)> {
    let mut groups: BTreeMap<u64, Vec<PathBuf>> = BTreeMap::new();
    for (path, secs) in files {
        if !secs.is_finite() || secs < 0.0 {
            continue;
        }
        groups.entry(secs.round() as u64).or_default().push(path);
    }
    groups
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|(secs, mut paths)| {
            paths.sort();
            (secs, paths)
        })
        .collect()
}

/// `H:MM:SS`
pub fn format_secs(secs: u64) -> String {
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Machine-readable totals for `summary --json`
#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub success_log: PathBuf,
    pub conversions: usize,
    pub original_mb: f64,
    pub new_mb: f64,
    pub saved_mb: f64,
}

impl SummaryReport {
    pub fn new(success_log: PathBuf, totals: &LedgerTotals) -> Self {
        Self {
            success_log,
            conversions: totals.conversions,
            original_mb: round2(totals.original_mb),
            new_mb: round2(totals.new_mb),
            saved_mb: round2(totals.saved_mb),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Closing lines printed after a run
pub fn run_footer(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "Converted {} file(s), {} failed. Total saved: {:.2} MB",
        summary.converted(),
        summary.failed,
        summary.total_saved_mb()
    )];
    if summary.not_started > 0 {
        lines.push(format!("Stopped early: {} file(s) not started", summary.not_started));
    }
    if summary.inconsistent > 0 {
        lines.push(format!(
            "INCONSISTENT STATE: {} file(s) exist only as temp outputs, see the error log",
            summary.inconsistent
        ));
    }
    lines
}
