use std::{ops::Range, path::Path};

use tracing::{debug, info};
use vqa_model::{GpuSet, RunManifest, Slice, SliceEntry};

use crate::{config::RunConfig, error::CoreError, fsio, layout::RunLayout, store::RecordStore};

/// Balanced contiguous split of `total` positions into `parts` ranges.
///
/// Range `j` holds `total / parts` positions, plus one when `j < total % parts`.
/// Sizes differ by at most one and the ranges cover `0..total` in order.
pub fn slice_bounds(total: usize, parts: usize) -> Vec<Range<usize>> {
    if parts == 0 {
        return Vec::new();
    }
    let base = total / parts;
    let extra = total % parts;

    let mut start = 0;
    (0..parts)
        .map(|j| {
            let len = base + usize::from(j < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Split the store into one slice per GPU, in GPU-list order.
///
/// GPUs beyond the item count get empty slices.
pub fn partition(
    store: &RecordStore,
    gpus: &GpuSet,
    layout: &RunLayout,
    label_catalog: Option<&Path>,
) -> Result<Vec<Slice>, CoreError> {
    if store.is_empty() {
        return Err(CoreError::EmptyInput);
    }

    let slices: Vec<Slice> = slice_bounds(store.len(), gpus.len())
        .into_iter()
        .zip(gpus.iter())
        .enumerate()
        .map(|(index, (range, gpu_id))| Slice {
            run_id: layout.run_id().to_string(),
            index,
            gpu_id,
            start: range.start,
            output_path: layout.output_path(gpu_id),
            label_catalog: label_catalog.map(Path::to_path_buf),
            items: store.items()[range].to_vec(),
        })
        .collect();

    for s in &slices {
        debug!(target: "vqa.core.partition", gpu = %s.gpu_id, start = s.start, items = s.len(), "slice planned");
    }
    Ok(slices)
}

/// Slices plus the manifest describing them, ready to be written before dispatch.
#[derive(Debug, Clone)]
pub struct Plan {
    pub slices: Vec<Slice>,
    pub manifest: RunManifest,
    pub manifest_path: std::path::PathBuf,
}

impl Plan {
    /// Partition the store according to `cfg`.
    pub fn build(cfg: &RunConfig, store: &RecordStore) -> Result<Self, CoreError> {
        let cfg = cfg.absolute()?;
        cfg.validate()?;
        let layout = cfg.layout();
        let slices = partition(store, &cfg.gpus, &layout, cfg.label_catalog.as_deref())?;

        let entries = slices
            .iter()
            .map(|s| SliceEntry {
                index: s.index,
                gpu_id: s.gpu_id,
                slice_path: layout.slice_path(s.gpu_id),
                output_path: s.output_path.clone(),
                ids: s.items.iter().map(|i| i.id.clone()).collect(),
            })
            .collect();

        let manifest = RunManifest {
            run_id: cfg.run_id.clone(),
            input: cfg.input.clone(),
            label_catalog: cfg.label_catalog.clone(),
            output: cfg.output_path(),
            total_items: store.len(),
            slices: entries,
        };

        Ok(Self {
            slices,
            manifest,
            manifest_path: layout.manifest_path(),
        })
    }

    /// Publish every slice file, then the manifest.
    pub fn write(&self) -> Result<(), CoreError> {
        for (slice, entry) in self.slices.iter().zip(&self.manifest.slices) {
            fsio::write_json_atomic(&entry.slice_path, slice)?;
        }
        fsio::write_json_atomic(&self.manifest_path, &self.manifest)?;
        info!(
            target: "vqa.core.partition",
            run_id = %self.manifest.run_id,
            slices = self.slices.len(),
            items = self.manifest.total_items,
            manifest = %self.manifest_path.display(),
            "run partitioned"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, path::PathBuf};

    use tempfile::TempDir;
    use vqa_model::{GpuId, Item, ItemId};

    use super::*;

    fn store(n: usize) -> RecordStore {
        RecordStore::from_items(
            (0..n)
                .map(|i| Item::new(format!("v{i}"), format!("v{i}.mp4"), ["pan"]))
                .collect(),
        )
        .unwrap()
    }

    fn layout() -> RunLayout {
        RunLayout::new("/work", "input", "run")
    }

    #[test]
    fn ten_items_three_gpus() {
        let sizes: Vec<_> = slice_bounds(10, 3).iter().map(|r| r.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    #[test]
    fn more_gpus_than_items_yields_empty_tail_slices() {
        let slices = partition(&store(2), &GpuSet::from_count(4).unwrap(), &layout(), None).unwrap();
        let sizes: Vec<_> = slices.iter().map(Slice::len).collect();
        assert_eq!(sizes, vec![1, 1, 0, 0]);
    }

    #[test]
    fn empty_input_is_a_partition_failure() {
        let err = partition(&store(0), &GpuSet::from_count(1).unwrap(), &layout(), None).unwrap_err();
        assert!(matches!(err, CoreError::EmptyInput));
        assert!(err.is_partition_failure());
    }

    #[test]
    fn slices_are_disjoint_complete_and_balanced() {
        for m in 1..40 {
            for k in 1..9u32 {
                let s = store(m);
                let slices = partition(&s, &GpuSet::from_count(k).unwrap(), &layout(), None).unwrap();
                assert_eq!(slices.len(), k as usize);

                let sizes: Vec<_> = slices.iter().map(Slice::len).collect();
                let (min, max) = (sizes.iter().min().unwrap(), sizes.iter().max().unwrap());
                assert!(max - min <= 1, "m={m} k={k} sizes={sizes:?}");

                let ids: Vec<ItemId> = slices
                    .iter()
                    .flat_map(|sl| sl.items.iter().map(|i| i.id.clone()))
                    .collect();
                let unique: HashSet<_> = ids.iter().collect();
                assert_eq!(unique.len(), m);

                let original: Vec<ItemId> = s.items().iter().map(|i| i.id.clone()).collect();
                assert_eq!(ids, original, "concatenation must rebuild input order");
            }
        }
    }

    #[test]
    fn partitioning_is_deterministic() {
        let s = store(17);
        let gpus: GpuSet = "3,1,5".parse().unwrap();
        let a = partition(&s, &gpus, &layout(), None).unwrap();
        let b = partition(&s, &gpus, &layout(), None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].gpu_id, GpuId(3));
        assert_eq!(a[0].len(), 6);
    }

    #[test]
    fn plan_writes_slices_and_manifest() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("batch.json");
        let mut cfg = RunConfig::new(&input, GpuSet::from_count(3).unwrap());
        cfg.run_id = "r1".into();
        cfg.label_catalog = Some(dir.path().join("labels.json"));

        let plan = Plan::build(&cfg, &store(10)).unwrap();
        plan.write().unwrap();

        let manifest: RunManifest = fsio::read_json(&plan.manifest_path).unwrap();
        assert_eq!(manifest.total_items, 10);
        assert_eq!(manifest.output, dir.path().join("batch_scored.json"));
        assert_eq!(manifest.slices.len(), 3);

        let second: Slice = fsio::read_json(&manifest.slices[1].slice_path).unwrap();
        assert_eq!(second.start, 4);
        assert_eq!(second.label_catalog, cfg.label_catalog);
        assert_eq!(
            second.items.iter().map(|i| i.id.clone()).collect::<Vec<_>>(),
            manifest.slices[1].ids
        );
    }

    #[test]
    fn manifest_records_absolute_paths() {
        let mut cfg = RunConfig::new("batch.json", GpuSet::from_count(2).unwrap());
        cfg.label_catalog = Some(PathBuf::from("labels.json"));

        let plan = Plan::build(&cfg, &store(3)).unwrap();
        let m = &plan.manifest;
        assert!(plan.manifest_path.is_absolute());
        assert!(m.input.is_absolute() && m.input.ends_with("batch.json"));
        assert!(m.output.is_absolute() && m.output.ends_with("batch_scored.json"));
        assert!(m.label_catalog.as_deref().is_some_and(Path::is_absolute));
        assert!(m.slices.iter().all(|e| e.slice_path.is_absolute() && e.output_path.is_absolute()));
        assert!(plan.slices.iter().all(|s| s.output_path.is_absolute()));
    }
}
