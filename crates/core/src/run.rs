//! Analysis run records as reported by the backend.
//!
//! The backend owns every [`AnalysisRun`]; the client only ever replaces a
//! run wholesale with a freshly fetched copy. Status moves
//! `queued -> processing -> completed | failed`, but polling samples that
//! sequence and may not observe every step.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::population::DatasetType;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

/// Server-side lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    /// `completed` and `failed` are absorbing; polling stops once reached.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// QueueInfo
// ---------------------------------------------------------------------------

/// Queue placement of a run that is waiting for a worker.
///
/// Recomputed by the backend on every fetch; only meaningful while the
/// run is `queued`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueInfo {
    /// 1-based position among pending runs.
    pub position: u32,
    pub tasks_ahead: u32,
    /// Whether a worker is busy with another run right now.
    pub is_processing: bool,
    pub estimated_wait_minutes: f64,
}

impl QueueInfo {
    /// One-line summary such as `position 3 (2 ahead), ~4 min`.
    pub fn summary(&self) -> String {
        let wait = if self.estimated_wait_minutes < 1.0 {
            "<1 min".to_string()
        } else {
            format!("~{} min", self.estimated_wait_minutes.round() as u64)
        };
        format!(
            "position {} ({} ahead), {wait}",
            self.position, self.tasks_ahead
        )
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Contribution of one source population to the fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceContribution {
    pub source: String,
    /// Mixture proportion in percent.
    pub percentage: f64,
    pub std_error: f64,
    pub z_score: f64,
    #[serde(default)]
    pub p_value: Option<f64>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    /// Model tail probability.
    #[serde(default)]
    pub p_value: Option<f64>,
    /// Whether the backend accepted the model (tail probability at or
    /// above 0.05).
    pub passed: bool,
    /// Unordered; percentages need not sum to exactly 100 and the list is
    /// empty when no source received a positive coefficient.
    #[serde(default)]
    pub breakdown: Vec<SourceContribution>,
}

impl Results {
    pub fn total_percentage(&self) -> f64 {
        self.breakdown.iter().map(|c| c.percentage).sum()
    }

    /// Breakdown ordered by descending percentage, for display.
    pub fn sorted_breakdown(&self) -> Vec<&SourceContribution> {
        let mut rows: Vec<&SourceContribution> = self.breakdown.iter().collect();
        rows.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));
        rows
    }
}

// ---------------------------------------------------------------------------
// AnalysisRun
// ---------------------------------------------------------------------------

/// A submitted run, as last fetched from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub id: DbId,
    /// Owning user id.
    pub user: DbId,
    #[serde(default)]
    pub target_population: Option<String>,
    #[serde(default)]
    pub dna_file_id: Option<DbId>,
    pub source_populations: Vec<String>,
    pub right_populations: Vec<String>,
    pub dataset_type: DatasetType,
    pub status: RunStatus,
    pub created_at: Timestamp,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub completed_at: Option<Timestamp>,
    #[serde(default)]
    pub queue_info: Option<QueueInfo>,
    #[serde(default)]
    pub results: Option<Results>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Wall-clock execution time in seconds.
    #[serde(default)]
    pub execution_time: Option<f64>,
    #[serde(default)]
    pub runs_remaining_today: Option<u32>,
}

impl AnalysisRun {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Display label for the target: the population name, or the DNA file.
    pub fn target_label(&self) -> String {
        match (&self.target_population, self.dna_file_id) {
            (Some(name), _) => name.clone(),
            (None, Some(id)) => format!("DNA file #{id}"),
            (None, None) => "unknown target".to_string(),
        }
    }
}

/// Whether any run in `runs` still needs polling.
pub fn has_active_runs(runs: &[AnalysisRun]) -> bool {
    runs.iter().any(|r| !r.is_terminal())
}

// ---------------------------------------------------------------------------
// History normalisation
// ---------------------------------------------------------------------------

/// Normalise a run-history response body into a plain list.
///
/// Accepts either a bare JSON array of runs or a pagination envelope of the
/// form `{"results": [...]}`. Anything else is a
/// [`CoreError::DataFormat`]; the caller decides how to recover.
///
/// Entries are decoded strictly: a single entry that does not match
/// [`AnalysisRun`] (an unknown status value, a missing required field)
/// fails the whole body rather than being skipped, so a partial list is
/// never mistaken for the full history.
pub fn normalize_history(body: serde_json::Value) -> Result<Vec<AnalysisRun>, CoreError> {
    let items = match body {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("results") {
            Some(serde_json::Value::Array(items)) => items,
            Some(_) => {
                return Err(CoreError::DataFormat(
                    "history envelope \"results\" is not an array".to_string(),
                ))
            }
            None => {
                return Err(CoreError::DataFormat(
                    "history response is an object without \"results\"".to_string(),
                ))
            }
        },
        other => {
            return Err(CoreError::DataFormat(format!(
                "history response is neither a list nor an envelope: {}",
                json_kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item)
                .map_err(|e| CoreError::DataFormat(format!("history entry {i}: {e}")))
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn run_json(id: i64, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user": 1,
            "target_population": "Hungary_Conqueror_Elite.SG",
            "dna_file_id": null,
            "source_populations": ["Estonia_BA.SG", "Russia_Andronovo.SG"],
            "right_populations": ["Mbuti.DG", "A.SG", "B.SG", "C.SG", "D.SG"],
            "dataset_type": "1240k",
            "status": status,
            "created_at": "2024-03-01T12:00:00Z",
            "started_at": null,
            "completed_at": null,
            "runs_remaining_today": 4
        })
    }

    // -- RunStatus ------------------------------------------------------------

    #[test]
    fn terminal_states() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Processing.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    // -- AnalysisRun ----------------------------------------------------------

    #[test]
    fn queued_run_deserialises_with_queue_info() {
        let mut body = run_json(9, "queued");
        body["queue_info"] = json!({
            "position": 3,
            "tasks_ahead": 2,
            "is_processing": true,
            "estimated_wait_minutes": 4.4
        });
        let run: AnalysisRun = serde_json::from_value(body).unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        let queue = run.queue_info.unwrap();
        assert_eq!(queue.position, 3);
        assert_eq!(queue.summary(), "position 3 (2 ahead), ~4 min");
    }

    #[test]
    fn completed_run_carries_results() {
        let mut body = run_json(10, "completed");
        body["results"] = json!({
            "p_value": 0.31,
            "passed": true,
            "breakdown": [
                {"source": "Estonia_BA.SG", "percentage": 38.2, "std_error": 4.1, "z_score": 9.3, "p_value": null},
                {"source": "Russia_Andronovo.SG", "percentage": 61.9, "std_error": 4.1, "z_score": 15.1}
            ]
        });
        body["execution_time"] = json!(12.5);
        let run: AnalysisRun = serde_json::from_value(body).unwrap();
        let results = run.results.unwrap();
        assert!(results.passed);
        assert!((results.total_percentage() - 100.1).abs() < 1e-9);
        assert_eq!(results.sorted_breakdown()[0].source, "Russia_Andronovo.SG");
    }

    #[test]
    fn target_label_for_dna_file() {
        let mut body = run_json(11, "failed");
        body["target_population"] = json!(null);
        body["dna_file_id"] = json!(5);
        body["error_message"] = json!("No overlapping SNPs");
        let run: AnalysisRun = serde_json::from_value(body).unwrap();
        assert_eq!(run.target_label(), "DNA file #5");
        assert!(run.is_terminal());
    }

    #[test]
    fn active_runs_detected() {
        let runs: Vec<AnalysisRun> = ["completed", "processing"]
            .iter()
            .enumerate()
            .map(|(i, s)| serde_json::from_value(run_json(i as i64, s)).unwrap())
            .collect();
        assert!(has_active_runs(&runs));
        assert!(!has_active_runs(&runs[..1]));
        assert!(!has_active_runs(&[]));
    }

    // -- normalize_history ----------------------------------------------------

    #[test]
    fn bare_list_and_envelope_normalise_identically() {
        let list = json!([run_json(1, "completed"), run_json(2, "queued")]);
        let envelope = json!({"count": 2, "next": null, "results": list.clone()});

        let from_list = normalize_history(list).unwrap();
        let from_envelope = normalize_history(envelope).unwrap();
        assert_eq!(from_list, from_envelope);
        assert_eq!(from_list.len(), 2);
    }

    #[test]
    fn scalar_body_is_format_error() {
        assert_matches!(normalize_history(json!("oops")), Err(CoreError::DataFormat(_)));
        assert_matches!(normalize_history(json!(null)), Err(CoreError::DataFormat(_)));
    }

    #[test]
    fn object_without_results_is_format_error() {
        assert_matches!(
            normalize_history(json!({"detail": "x"})),
            Err(CoreError::DataFormat(msg)) if msg.contains("results")
        );
    }

    #[test]
    fn unknown_status_fails_the_whole_body() {
        let mut odd = run_json(2, "queued");
        odd["status"] = json!("cancelled");
        assert_matches!(
            normalize_history(json!([run_json(1, "completed"), odd])),
            Err(CoreError::DataFormat(msg)) if msg.contains("entry 1")
        );
    }

    #[test]
    fn malformed_entry_is_format_error() {
        assert_matches!(
            normalize_history(json!([{"id": "not a run"}])),
            Err(CoreError::DataFormat(msg)) if msg.contains("entry 0")
        );
    }
}
