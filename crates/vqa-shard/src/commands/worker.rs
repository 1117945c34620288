use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use vqa_exec::{ScorerConfig, WorkerConfig, run_worker, util::cancel_on_signal};

use super::EXIT_INTERRUPTED;

#[derive(Args, Debug)]
pub struct WorkerCommand {
    /// Slice file written by `run`
    #[arg(long)]
    pub slice: PathBuf,

    /// Scorer command line
    #[arg(long, env = "VQA_SCORER")]
    pub scorer: String,

    #[arg(long)]
    pub score_timeout_secs: Option<u64>,
}

pub async fn execute(cmd: WorkerCommand) -> Result<ExitCode> {
    let mut scorer = ScorerConfig::new(cmd.scorer);
    scorer.timeout = cmd.score_timeout_secs.map(Duration::from_secs);

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let cfg = WorkerConfig {
        slice: cmd.slice,
        scorer,
    };
    let slice = cfg.slice.display().to_string();
    let partial = run_worker(cfg, &cancel)
        .await
        .with_context(|| format!("scoring slice {slice}"))?;

    if partial.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_INTERRUPTED))
    }
}
