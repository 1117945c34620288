use tracing::{debug, info};
use vqa_model::{GpuId, RunManifest, RunStatus, SliceStatus};

use crate::{error::CoreError, merge::MergeOutcome};

/// Progress of one slice as seen by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceState {
    pub index: usize,
    pub gpu_id: GpuId,
    pub status: SliceStatus,
    /// How the worker process ended, once it has.
    pub exit: Option<String>,
    /// Failure reason when `status` is `Failed`.
    pub error: Option<String>,
}

/// Per-run state machine:
/// `Partitioned → Dispatched → (slices Running → Completed | Failed) → Merged | MergeFailed`.
#[derive(Debug, Clone)]
pub struct RunState {
    run_id: String,
    status: RunStatus,
    slices: Vec<SliceState>,
}

impl RunState {
    /// Start tracking a run whose slices have been planned.
    pub fn partitioned(manifest: &RunManifest) -> Self {
        let slices = manifest
            .slices
            .iter()
            .map(|e| SliceState {
                index: e.index,
                gpu_id: e.gpu_id,
                status: SliceStatus::Pending,
                exit: None,
                error: None,
            })
            .collect();
        Self {
            run_id: manifest.run_id.clone(),
            status: RunStatus::Partitioned,
            slices,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn slices(&self) -> &[SliceState] {
        &self.slices
    }

    pub fn get(&self, gpu_id: GpuId) -> Option<&SliceState> {
        self.slices.iter().find(|s| s.gpu_id == gpu_id)
    }

    /// All workers launched.
    pub fn dispatched(&mut self) {
        self.status = RunStatus::Dispatched;
        for s in &mut self.slices {
            s.status = SliceStatus::Running;
        }
        debug!(target: "vqa.core.state", run_id = %self.run_id, "dispatched");
    }

    /// Record a worker exit. A clean exit is provisional until the merger reads the partial output.
    pub fn worker_exited(&mut self, gpu_id: GpuId, exit: impl Into<String>, error: Option<String>) {
        if let Some(s) = self.slices.iter_mut().find(|s| s.gpu_id == gpu_id) {
            s.exit = Some(exit.into());
            if let Some(err) = error {
                s.status = SliceStatus::Failed;
                s.error = Some(err);
            }
        }
    }

    /// Every slice reached `Completed` or `Failed`.
    pub fn all_terminal(&self) -> bool {
        self.slices.iter().all(|s| s.status.is_terminal())
    }

    /// Apply the merger's verdicts. The partial output decides the final slice status.
    pub fn merged(&mut self, outcome: &MergeOutcome) {
        for report in &outcome.slices {
            if let Some(s) = self.slices.iter_mut().find(|s| s.gpu_id == report.gpu_id) {
                s.status = report.status;
                s.error = report.reason.clone().or_else(|| s.error.take());
            }
        }
        self.status = RunStatus::Merged;
        info!(
            target: "vqa.core.state",
            run_id = %self.run_id,
            failed_slices = self.failed().count(),
            "run merged"
        );
    }

    pub fn merge_failed(&mut self, err: &CoreError) {
        self.status = RunStatus::MergeFailed;
        info!(target: "vqa.core.state", run_id = %self.run_id, error = %err, "run merge failed");
    }

    pub fn failed(&self) -> impl Iterator<Item = &SliceState> {
        self.slices
            .iter()
            .filter(|s| s.status == SliceStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use vqa_model::SliceEntry;

    use super::*;
    use crate::merge::SliceReport;

    fn manifest() -> RunManifest {
        RunManifest {
            run_id: "r".into(),
            input: PathBuf::from("in.json"),
            label_catalog: None,
            output: PathBuf::from("out.json"),
            total_items: 0,
            slices: (0..3)
                .map(|i| SliceEntry {
                    index: i,
                    gpu_id: GpuId(i as u32),
                    slice_path: PathBuf::new(),
                    output_path: PathBuf::new(),
                    ids: Vec::new(),
                })
                .collect(),
        }
    }

    fn report(gpu: u32, status: SliceStatus, reason: Option<&str>) -> SliceReport {
        SliceReport {
            index: gpu as usize,
            gpu_id: GpuId(gpu),
            status,
            reason: reason.map(str::to_string),
            items: 0,
            failed_labels: 0,
        }
    }

    #[test]
    fn walks_the_happy_path() {
        let mut state = RunState::partitioned(&manifest());
        assert_eq!(state.status(), RunStatus::Partitioned);
        assert!(state.slices().iter().all(|s| s.status == SliceStatus::Pending));

        state.dispatched();
        assert_eq!(state.status(), RunStatus::Dispatched);
        assert!(!state.all_terminal());

        for gpu in 0..3 {
            state.worker_exited(GpuId(gpu), "exit code 0", None);
        }
        assert!(!state.all_terminal(), "clean exits stay provisional");

        let outcome = MergeOutcome {
            records: Vec::new(),
            slices: (0..3).map(|g| report(g, SliceStatus::Completed, None)).collect(),
        };
        state.merged(&outcome);
        assert_eq!(state.status(), RunStatus::Merged);
        assert!(state.all_terminal());
        assert_eq!(state.failed().count(), 0);
    }

    #[test]
    fn crashed_worker_is_failed_immediately_and_after_merge() {
        let mut state = RunState::partitioned(&manifest());
        state.dispatched();
        state.worker_exited(GpuId(2), "terminated by signal 9", Some("worker crashed".into()));

        let crashed = state.get(GpuId(2)).unwrap();
        assert_eq!(crashed.status, SliceStatus::Failed);
        assert_eq!(crashed.exit.as_deref(), Some("terminated by signal 9"));

        let outcome = MergeOutcome {
            records: Vec::new(),
            slices: vec![
                report(0, SliceStatus::Completed, None),
                report(1, SliceStatus::Completed, None),
                report(2, SliceStatus::Failed, Some("partial output missing")),
            ],
        };
        state.merged(&outcome);
        let failed: Vec<_> = state.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error.as_deref(), Some("partial output missing"));
    }

    #[test]
    fn integrity_failure_marks_run() {
        let mut state = RunState::partitioned(&manifest());
        state.dispatched();
        state.merge_failed(&CoreError::Integrity("count".into()));
        assert_eq!(state.status(), RunStatus::MergeFailed);
    }
}
