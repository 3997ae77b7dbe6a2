//! Plain-text rendering for `--output text`.
//!
//! Every function returns a `String` so the binary decides where it goes
//! and tests can compare output directly.

use std::fmt::Write;

use qpadm_client::events::RunEvent;
use qpadm_core::catalog::PopulationCatalog;
use qpadm_core::population::DatasetType;
use qpadm_core::run::{AnalysisRun, RunStatus};
use qpadm_core::usage::UsageStatus;

/// Timestamp format used in listings.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One line per run: id, status, target, dataset and creation time.
pub fn run_line(run: &AnalysisRun) -> String {
    format!(
        "#{:<6} {:<10} {:<40} {:<6} {}",
        run.id,
        run.status.as_str(),
        run.target_label(),
        run.dataset_type.as_str(),
        run.created_at.format(TIME_FORMAT),
    )
}

/// Full description of a single run, including queue placement or results.
pub fn run_details(run: &AnalysisRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run #{} [{}]", run.id, run.status);
    let _ = writeln!(out, "  target:  {}", run.target_label());
    let _ = writeln!(out, "  dataset: {}", run.dataset_type);
    let _ = writeln!(out, "  sources: {}", run.source_populations.join(", "));
    let _ = writeln!(out, "  right:   {}", run.right_populations.join(", "));

    match run.status {
        RunStatus::Queued => {
            if let Some(queue) = &run.queue_info {
                let _ = writeln!(out, "  queue:   {}", queue.summary());
            }
        }
        RunStatus::Processing => {
            if let Some(started) = run.started_at {
                let _ = writeln!(out, "  started: {}", started.format(TIME_FORMAT));
            }
        }
        RunStatus::Failed => {
            let reason = run.error_message.as_deref().unwrap_or("no reason given");
            let _ = writeln!(out, "  error:   {reason}");
        }
        RunStatus::Completed => {}
    }

    if let Some(results) = &run.results {
        let verdict = if results.passed { "passed" } else { "rejected" };
        match results.p_value {
            Some(p) => {
                let _ = writeln!(out, "  model:   {verdict} (p = {p:.4})");
            }
            None => {
                let _ = writeln!(out, "  model:   {verdict}");
            }
        }
        if results.breakdown.is_empty() {
            let _ = writeln!(out, "  no source received a positive weight");
        }
        for row in results.sorted_breakdown() {
            let _ = writeln!(
                out,
                "    {:<30} {:>6.1}% ± {:.1} (z = {:.2})",
                row.source, row.percentage, row.std_error, row.z_score
            );
        }
    }

    if let Some(seconds) = run.execution_time {
        let _ = writeln!(out, "  took:    {seconds:.1}s");
    }
    if let Some(remaining) = run.runs_remaining_today {
        let _ = writeln!(out, "  runs remaining today: {remaining}");
    }
    out
}

pub fn history(runs: &[AnalysisRun]) -> String {
    if runs.is_empty() {
        return "No runs yet.\n".to_string();
    }
    runs.iter().map(|run| run_line(run) + "\n").collect()
}

pub fn usage(status: &UsageStatus) -> String {
    let mut out = status.summary();
    if !status.can_run {
        out.push_str(" (limit reached)");
    }
    if let Some(reset) = status.next_reset {
        let _ = write!(out, ", resets {}", reset.format(TIME_FORMAT));
    }
    out.push('\n');
    out
}

/// Population counts per category followed by the suggested sets.
pub fn catalog(catalog: &PopulationCatalog, dataset: DatasetType) -> String {
    let mut out = format!(
        "{} populations in the {dataset} panel\n",
        catalog.populations.len()
    );
    for (category, members) in &catalog.categories {
        let _ = writeln!(out, "  {category}: {}", members.len());
    }
    for (label, sets) in [
        ("right", &catalog.common_right_sets),
        ("source", &catalog.common_source_sets),
    ] {
        for (name, populations) in sets {
            let _ = writeln!(
                out,
                "  {label} set \"{name}\": {}",
                populations.join(", ")
            );
        }
    }
    out
}

pub fn event(event: &RunEvent) -> String {
    match event {
        RunEvent::HistoryRefreshed { count } => format!("refreshed {count} runs"),
        RunEvent::RunStatusChanged { run_id, from, to } => {
            format!("run #{run_id}: {from} -> {to}")
        }
        RunEvent::RunFinished { run_id, status } => format!("run #{run_id} {status}"),
        RunEvent::HistoryFormatError { message } => {
            format!("history response ignored: {message}")
        }
        RunEvent::RefreshFailed { error } => format!("refresh failed: {error}"),
    }
}
