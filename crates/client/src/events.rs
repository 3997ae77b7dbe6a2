//! Events emitted by the poll controller.
//!
//! These represent the run-list changes a front end cares about. They are
//! derived by comparing each refreshed history against the previous one.

use qpadm_core::run::RunStatus;
use qpadm_core::types::DbId;
use serde::Serialize;

/// A change observed while polling the run history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The history was re-fetched and replaced.
    HistoryRefreshed { count: usize },

    /// A run was seen in a different state than on the previous refresh.
    ///
    /// Intermediate states may be skipped between two samples.
    RunStatusChanged {
        run_id: DbId,
        from: RunStatus,
        to: RunStatus,
    },

    /// A run reached `completed` or `failed`.
    RunFinished { run_id: DbId, status: RunStatus },

    /// The history body had an unexpected shape; the list was cleared.
    HistoryFormatError { message: String },

    /// The refresh request failed; the previous list is kept.
    RefreshFailed { error: String },
}
