use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of one slice within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SliceStatus {
    /// Partitioned, worker not started yet.
    Pending,
    /// Worker process is alive.
    Running,
    /// Partial result read back and complete.
    Completed,
    /// Worker crashed, exited non-zero, or left a missing/corrupt/interrupted partial.
    Failed,
}

impl SliceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SliceStatus::Pending => "pending",
            SliceStatus::Running => "running",
            SliceStatus::Completed => "completed",
            SliceStatus::Failed => "failed",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SliceStatus::Completed | SliceStatus::Failed)
    }
}

/// Lifecycle of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Partitioned,
    Dispatched,
    Merged,
    MergeFailed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Partitioned => "partitioned",
            RunStatus::Dispatched => "dispatched",
            RunStatus::Merged => "merged",
            RunStatus::MergeFailed => "merge_failed",
        }
    }
}

impl fmt::Display for SliceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
