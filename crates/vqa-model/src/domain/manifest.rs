use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{GpuId, ItemId, RunId};

/// Where one slice lives and what it must contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceEntry {
    pub index: usize,
    pub gpu_id: GpuId,
    pub slice_path: PathBuf,
    pub output_path: PathBuf,
    /// Item ids in slice order.
    pub ids: Vec<ItemId>,
}

/// Everything the merger needs to reassemble a run, written before any worker starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunManifest {
    pub run_id: RunId,
    pub input: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_catalog: Option<PathBuf>,
    pub output: PathBuf,
    pub total_items: usize,
    pub slices: Vec<SliceEntry>,
}
