//! Reassembly of worker partial outputs into the final scored file.
//!
//! The merger trusts nothing a worker wrote except scores for the labels the slice asked for.
//! Records always come from the record store, in store order.
//! A slice whose partial output is missing, malformed, interrupted or describes other items is marked failed:
//! its labels carry failure sentinels instead of disappearing, so the output always has one record per input item.
use std::{collections::HashSet, path::Path};

use tracing::{debug, info, warn};
use vqa_model::{
    GpuId, Item, ItemId, PartialResult, RunManifest, ScoredRecord, Scores, SliceEntry, SliceStatus,
};

use crate::{error::CoreError, fsio, store::RecordStore};

/// Sentinel for a label a completed worker left without an entry.
const MISSING_SCORE: &str = "missing score";

/// Merger verdict for one slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceReport {
    pub index: usize,
    pub gpu_id: GpuId,
    pub status: SliceStatus,
    pub reason: Option<String>,
    pub items: usize,
    pub failed_labels: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// One record per input item, in input order.
    pub records: Vec<ScoredRecord>,
    pub slices: Vec<SliceReport>,
}

impl MergeOutcome {
    pub fn failed_slices(&self) -> impl Iterator<Item = &SliceReport> {
        self.slices
            .iter()
            .filter(|s| s.status == SliceStatus::Failed)
    }

    pub fn failed_labels(&self) -> usize {
        self.slices.iter().map(|s| s.failed_labels).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_slices().next().is_none()
    }

    /// Publish the final output atomically.
    pub fn write(&self, path: &Path) -> Result<(), CoreError> {
        fsio::write_json_atomic(path, &self.records)?;
        info!(
            target: "vqa.core.merge",
            path = %path.display(),
            records = self.records.len(),
            failed_slices = self.failed_slices().count(),
            failed_labels = self.failed_labels(),
            "output written"
        );
        Ok(())
    }
}

/// Load the manifest and its input, then merge.
pub fn merge_from_manifest(manifest_path: &Path) -> Result<(RunManifest, MergeOutcome), CoreError> {
    let manifest: RunManifest = fsio::read_json(manifest_path)?;
    let store = RecordStore::load(&manifest.input)?;
    let outcome = merge(&store, &manifest)?;
    Ok((manifest, outcome))
}

/// Reassemble every slice's partial output in original input order.
///
/// Fails only on integrity problems (the manifest does not describe the store exactly);
/// worker failures degrade scores, never the record set.
pub fn merge(store: &RecordStore, manifest: &RunManifest) -> Result<MergeOutcome, CoreError> {
    check_manifest(store, manifest)?;

    let mut slots: Vec<Option<Item>> = vec![None; store.len()];
    let mut reports = Vec::with_capacity(manifest.slices.len());

    for entry in &manifest.slices {
        let verdict = load_partial(entry, &manifest.run_id);
        let (status, reason, partial) = match verdict {
            Ok(p) if p.is_complete() => (SliceStatus::Completed, None, Some(p)),
            Ok(p) => (SliceStatus::Failed, Some("worker interrupted".to_string()), Some(p)),
            Err(reason) => (SliceStatus::Failed, Some(reason), None),
        };
        let sentinel = match &reason {
            Some(r) => format!("slice failed: {r}"),
            None => MISSING_SCORE.to_string(),
        };

        let mut failed_labels = 0;
        for (pos_in_slice, id) in entry.ids.iter().enumerate() {
            let pos = store
                .position(id)
                .ok_or_else(|| CoreError::Integrity(format!("unknown item id '{id}'")))?;
            if slots[pos].is_some() {
                return Err(CoreError::Integrity(format!("item id '{id}' merged twice")));
            }

            let mut item = store.items()[pos].clone();
            item.scores = Scores::new();
            if let Some(p) = &partial {
                for (label, score) in p.items[pos_in_slice].scores.iter() {
                    if item.labels.iter().any(|l| l == label) {
                        item.scores.insert(label, score.clone());
                    }
                }
            }
            item.fail_pending(&sentinel);
            failed_labels += item.scores.failed_count();
            slots[pos] = Some(item);
        }

        match &reason {
            Some(r) => warn!(target: "vqa.core.merge", gpu = %entry.gpu_id, reason = %r, items = entry.ids.len(), "slice failed"),
            None => debug!(target: "vqa.core.merge", gpu = %entry.gpu_id, items = entry.ids.len(), failed_labels, "slice merged"),
        }
        reports.push(SliceReport {
            index: entry.index,
            gpu_id: entry.gpu_id,
            status,
            reason,
            items: entry.ids.len(),
            failed_labels,
        });
    }

    let filled = slots.iter().filter(|s| s.is_some()).count();
    let records: Vec<ScoredRecord> = slots
        .into_iter()
        .collect::<Option<Vec<Item>>>()
        .ok_or_else(|| {
            CoreError::Integrity(format!(
                "record count mismatch: {filled} merged, {} expected",
                store.len()
            ))
        })?
        .into_iter()
        .map(ScoredRecord::from)
        .collect();

    Ok(MergeOutcome {
        records,
        slices: reports,
    })
}

/// The manifest must cover the store exactly: same count, known ids, no id in two slices.
fn check_manifest(store: &RecordStore, manifest: &RunManifest) -> Result<(), CoreError> {
    if manifest.total_items != store.len() {
        return Err(CoreError::Integrity(format!(
            "manifest expects {} items, input has {}",
            manifest.total_items,
            store.len()
        )));
    }

    let mut seen: HashSet<&ItemId> = HashSet::with_capacity(store.len());
    let mut gpus: HashSet<GpuId> = HashSet::with_capacity(manifest.slices.len());
    for entry in &manifest.slices {
        if !gpus.insert(entry.gpu_id) {
            return Err(CoreError::Integrity(format!(
                "gpu {} owns more than one slice",
                entry.gpu_id
            )));
        }
        for id in &entry.ids {
            if store.position(id).is_none() {
                return Err(CoreError::Integrity(format!("unknown item id '{id}'")));
            }
            if !seen.insert(id) {
                return Err(CoreError::Integrity(format!(
                    "item id '{id}' assigned to more than one slice"
                )));
            }
        }
    }
    if seen.len() != store.len() {
        return Err(CoreError::Integrity(format!(
            "record count mismatch: slices cover {} of {} items",
            seen.len(),
            store.len()
        )));
    }
    Ok(())
}

/// Read and validate one partial output. The error string becomes the slice failure reason.
fn load_partial(entry: &SliceEntry, run_id: &str) -> Result<PartialResult, String> {
    if !entry.output_path.exists() {
        return Err("partial output missing".to_string());
    }
    let partial: PartialResult =
        fsio::read_json(&entry.output_path).map_err(|e| format!("unreadable partial output: {e}"))?;

    if partial.run_id != run_id {
        return Err(format!(
            "partial output belongs to run '{}', expected '{run_id}'",
            partial.run_id
        ));
    }
    if partial.gpu_id != entry.gpu_id {
        return Err(format!(
            "partial output written for gpu {}, expected gpu {}",
            partial.gpu_id, entry.gpu_id
        ));
    }
    if partial.items.len() != entry.ids.len()
        || partial.items.iter().zip(&entry.ids).any(|(i, id)| i.id != *id)
    {
        return Err("partial output does not match slice contents".to_string());
    }
    Ok(partial)
}

/// Delete slice files and partial outputs of a merged run. The manifest is kept.
pub fn remove_transient_files(manifest: &RunManifest) -> Result<(), CoreError> {
    for entry in &manifest.slices {
        fsio::remove_if_exists(&entry.slice_path)?;
        fsio::remove_if_exists(&entry.output_path)?;
    }
    debug!(target: "vqa.core.merge", run_id = %manifest.run_id, "transient files removed");
    Ok(())
}
