use serde::{Deserialize, Serialize};

use crate::{GpuId, Item, RunId};

/// How a worker finished its slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartialStatus {
    /// Every item of the slice was processed.
    Completed,
    /// The worker was asked to stop; unprocessed labels carry the interrupted sentinel.
    Interrupted,
}

/// A worker's scored output for its slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialResult {
    pub run_id: RunId,
    pub gpu_id: GpuId,
    pub status: PartialStatus,
    pub items: Vec<Item>,
}

impl PartialResult {
    pub fn is_complete(&self) -> bool {
        self.status == PartialStatus::Completed
    }

    pub fn failed_labels(&self) -> usize {
        self.items.iter().map(|i| i.scores.failed_count()).sum()
    }
}
