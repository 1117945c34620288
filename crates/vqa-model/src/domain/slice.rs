use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{GpuId, Item, RunId};

/// A contiguous block of items assigned to exactly one worker.
///
/// Created by the partitioner, handed to the worker as a file, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slice {
    pub run_id: RunId,
    /// Position of this slice in GPU order.
    pub index: usize,
    pub gpu_id: GpuId,
    /// Index of the first item in the record store.
    pub start: usize,
    /// Where the worker publishes its partial result.
    pub output_path: PathBuf,
    /// Label catalog, passed through to the scorer untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_catalog: Option<PathBuf>,
    pub items: Vec<Item>,
}

impl Slice {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of (item, label) pairs to score.
    pub fn pair_count(&self) -> usize {
        self.items.iter().map(|i| i.labels.len()).sum()
    }
}
