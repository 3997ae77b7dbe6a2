//! Daily run quota as reported by the backend status endpoint.
//!
//! The client never counts runs itself; [`UsageStatus::can_run`] from the
//! most recent fetch is the only gate before a submission attempt.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Snapshot of the user's daily quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatus {
    pub runs_used_today: u32,
    pub runs_remaining_today: u32,
    pub daily_limit: u32,
    pub can_run: bool,
    /// When the daily counter resets, if the backend reports it.
    #[serde(default)]
    pub next_reset: Option<Timestamp>,
}

impl UsageStatus {
    /// Short summary such as `2/5 runs used today, 3 remaining`.
    pub fn summary(&self) -> String {
        format!(
            "{}/{} runs used today, {} remaining",
            self.runs_used_today, self.daily_limit, self.runs_remaining_today
        )
    }
}
