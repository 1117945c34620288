//! Single-GPU worker loop: score every `(item, label)` pair of a slice and publish the partial result.
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vqa_core::fsio;
use vqa_model::{INTERRUPTED, LabelScore, PartialResult, PartialStatus, Slice};

use crate::{
    ENV_LABEL_CATALOG,
    error::ExecResult,
    scorer::{CommandScorer, Scorer, ScorerConfig},
};

/// Everything a worker process needs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub slice: PathBuf,
    pub scorer: ScorerConfig,
}

pub fn load_slice(path: &Path) -> ExecResult<Slice> {
    Ok(fsio::read_json(path)?)
}

/// Score a slice in order.
///
/// A failing call marks only its own pair. Once `cancel` fires, the remaining pairs are marked
/// [`INTERRUPTED`] and the result carries [`PartialStatus::Interrupted`].
pub async fn score_slice<S>(slice: &Slice, scorer: &mut S, cancel: &CancellationToken) -> PartialResult
where
    S: Scorer + ?Sized,
{
    let total = slice.pair_count();
    let mut items = slice.items.clone();
    let mut done = 0usize;
    let mut failed = 0usize;
    let mut interrupted = false;

    'items: for item in items.iter_mut() {
        let pending: Vec<String> = item.pending_labels().map(str::to_string).collect();
        for label in pending {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    interrupted = true;
                    break 'items;
                }
                r = scorer.score(&item.video_ref, &label) => r,
            };

            let score = match result {
                Ok(value) => LabelScore::from_value(value),
                Err(e) => LabelScore::failed(e.to_string()),
            };
            if let LabelScore::Failed { error } = &score {
                failed += 1;
                warn!(target: "vqa.exec.worker", id = %item.id, %label, %error, "scoring failed");
            }
            item.scores.insert(label, score);
            done += 1;
        }
        debug!(target: "vqa.exec.worker", id = %item.id, done, total, "item scored");
    }

    let status = if interrupted {
        for item in items.iter_mut() {
            item.fail_pending(INTERRUPTED);
        }
        warn!(target: "vqa.exec.worker", gpu = %slice.gpu_id, done, total, "slice interrupted");
        PartialStatus::Interrupted
    } else {
        info!(target: "vqa.exec.worker", gpu = %slice.gpu_id, done, failed, scorer = scorer.name(), "slice scored");
        PartialStatus::Completed
    };

    PartialResult {
        run_id: slice.run_id.clone(),
        gpu_id: slice.gpu_id,
        status,
        items,
    }
}

/// Score a slice, stop the scorer, and publish the partial result atomically at `slice.output_path`.
pub async fn run_slice<S>(slice: &Slice, scorer: &mut S, cancel: &CancellationToken) -> ExecResult<PartialResult>
where
    S: Scorer + ?Sized,
{
    let partial = if slice.is_empty() {
        debug!(target: "vqa.exec.worker", gpu = %slice.gpu_id, "empty slice");
        PartialResult {
            run_id: slice.run_id.clone(),
            gpu_id: slice.gpu_id,
            status: PartialStatus::Completed,
            items: Vec::new(),
        }
    } else {
        let partial = score_slice(slice, scorer, cancel).await;
        scorer.shutdown().await;
        partial
    };

    fsio::write_json_atomic(&slice.output_path, &partial)?;
    info!(
        target: "vqa.exec.worker",
        path = %slice.output_path.display(),
        status = ?partial.status,
        "partial result written"
    );
    Ok(partial)
}

/// Worker process entry: load the slice, start the command scorer, run.
///
/// The label catalog of the slice is exposed to the scorer as [`ENV_LABEL_CATALOG`].
pub async fn run_worker(cfg: WorkerConfig, cancel: &CancellationToken) -> ExecResult<PartialResult> {
    let slice = load_slice(&cfg.slice)?;
    info!(
        target: "vqa.exec.worker",
        run = %slice.run_id,
        gpu = %slice.gpu_id,
        items = slice.len(),
        pairs = slice.pair_count(),
        "worker started"
    );

    let mut scorer_cfg = cfg.scorer;
    if let Some(catalog) = &slice.label_catalog {
        scorer_cfg
            .env
            .push((ENV_LABEL_CATALOG.to_string(), catalog.display().to_string()));
    }
    let mut scorer = CommandScorer::new(scorer_cfg)?;
    run_slice(&slice, &mut scorer, cancel).await
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use tempfile::TempDir;
    use vqa_model::{GpuId, Item};

    use super::*;
    use crate::scorer::{FnScorer, ScoreError};

    fn slice(dir: &TempDir, items: usize, labels: &[&str]) -> Slice {
        Slice {
            run_id: "r1".into(),
            index: 0,
            gpu_id: GpuId(2),
            start: 0,
            output_path: dir.path().join("in.r1.gpu2.partial.json"),
            label_catalog: None,
            items: (0..items)
                .map(|i| Item::new(format!("v{i}"), format!("v{i}.mp4"), labels.iter().copied()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn one_failing_call_marks_only_its_pair() {
        let dir = TempDir::new().unwrap();
        let slice = slice(&dir, 10, &["pan", "tilt"]);
        let mut scorer = FnScorer::new("fake", |video: &str, label: &str| {
            if video == "v3.mp4" && label == "tilt" {
                Err(ScoreError::Rejected("decode error".into()))
            } else {
                Ok(0.5)
            }
        });

        let partial = run_slice(&slice, &mut scorer, &CancellationToken::new())
            .await
            .unwrap();

        assert!(partial.is_complete());
        assert_eq!(partial.items.len(), 10);
        assert_eq!(partial.failed_labels(), 1);
        assert_eq!(
            partial.items[3].scores.get("tilt"),
            Some(&LabelScore::failed("decode error"))
        );
        assert_eq!(partial.items[3].scores.get("pan"), Some(&LabelScore::Value(0.5)));

        let on_disk: PartialResult = fsio::read_json(&slice.output_path).unwrap();
        assert_eq!(on_disk, partial);
    }

    #[tokio::test]
    async fn non_finite_scores_are_failures() {
        let dir = TempDir::new().unwrap();
        let slice = slice(&dir, 1, &["pan"]);
        let mut scorer = FnScorer::new("nan", |_: &str, _: &str| Ok(f64::NAN));

        let partial = score_slice(&slice, &mut scorer, &CancellationToken::new()).await;
        assert!(partial.items[0].scores.get("pan").unwrap().is_failed());
    }

    #[tokio::test]
    async fn cancellation_marks_the_rest_interrupted() {
        let dir = TempDir::new().unwrap();
        let slice = slice(&dir, 4, &["pan"]);
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (c, n) = (cancel.clone(), calls.clone());
        let mut scorer = FnScorer::new("stop-after-two", move |_: &str, _: &str| {
            if n.fetch_add(1, Ordering::SeqCst) == 1 {
                c.cancel();
            }
            Ok(1.0)
        });

        let partial = run_slice(&slice, &mut scorer, &cancel).await.unwrap();

        assert_eq!(partial.status, PartialStatus::Interrupted);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(partial.items[1].scores.get("pan"), Some(&LabelScore::Value(1.0)));
        assert_eq!(
            partial.items[2].scores.get("pan"),
            Some(&LabelScore::failed(INTERRUPTED))
        );
        assert!(partial.items.iter().all(|i| i.is_settled()));
        assert!(slice.output_path.exists());
    }

    #[tokio::test]
    async fn empty_slice_writes_an_empty_completed_partial() {
        let dir = TempDir::new().unwrap();
        let slice = slice(&dir, 0, &[]);
        let mut scorer = FnScorer::new("unused", |_: &str, _: &str| -> Result<f64, ScoreError> {
            panic!("no pairs to score")
        });

        let partial = run_slice(&slice, &mut scorer, &CancellationToken::new())
            .await
            .unwrap();

        assert!(partial.is_complete());
        assert!(partial.items.is_empty());
        assert!(slice.output_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn worker_exposes_the_label_catalog_to_the_scorer() {
        let dir = TempDir::new().unwrap();
        let mut s = slice(&dir, 2, &["pan"]);
        s.label_catalog = Some(dir.path().join("labels.json"));
        let slice_path = dir.path().join("in.r1.gpu2.slice.json");
        fsio::write_json_atomic(&slice_path, &s).unwrap();

        let cfg = WorkerConfig {
            slice: slice_path,
            scorer: ScorerConfig::new(
                r#"while read -r line; do
  case "$VQA_LABEL_CATALOG" in *labels.json) echo '{"score": 1}' ;; *) echo '{"error": "no catalog"}' ;; esac
done"#,
            ),
        };
        let partial = run_worker(cfg, &CancellationToken::new()).await.unwrap();

        assert!(partial.is_complete());
        assert_eq!(partial.failed_labels(), 0);
    }
}
