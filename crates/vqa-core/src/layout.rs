use std::path::PathBuf;

use vqa_model::{GpuId, RunId};

/// Naming scheme for the files of one run inside the working directory.
///
/// Every name carries the run id, so runs sharing a directory never collide.
/// Slice and partial names also carry the GPU id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    workdir: PathBuf,
    base: String,
    run_id: RunId,
}

impl RunLayout {
    pub fn new(workdir: impl Into<PathBuf>, base: impl Into<String>, run_id: impl Into<RunId>) -> Self {
        Self {
            workdir: workdir.into(),
            base: base.into(),
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.workdir
            .join(format!("{}.{}.manifest.json", self.base, self.run_id))
    }

    pub fn slice_path(&self, gpu: GpuId) -> PathBuf {
        self.workdir
            .join(format!("{}.{}.gpu{}.slice.json", self.base, self.run_id, gpu))
    }

    pub fn output_path(&self, gpu: GpuId) -> PathBuf {
        self.workdir
            .join(format!("{}.{}.gpu{}.partial.json", self.base, self.run_id, gpu))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_keyed_by_run_and_gpu() {
        let layout = RunLayout::new("/work", "input", "r1");
        assert_eq!(
            layout.output_path(GpuId(2)),
            PathBuf::from("/work/input.r1.gpu2.partial.json")
        );
        assert_eq!(
            layout.slice_path(GpuId(0)),
            PathBuf::from("/work/input.r1.gpu0.slice.json")
        );
        assert_eq!(
            layout.manifest_path(),
            PathBuf::from("/work/input.r1.manifest.json")
        );

        let other = RunLayout::new("/work", "input", "r2");
        assert_ne!(layout.output_path(GpuId(2)), other.output_path(GpuId(2)));
    }
}
