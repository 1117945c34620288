use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::Args;
use tracing::{error, info, warn};
use vqa_core::merge_from_manifest;

use super::EXIT_MERGE_FAILED;

#[derive(Args, Debug)]
pub struct MergeCommand {
    /// Run manifest written by `run`
    #[arg(long)]
    pub manifest: PathBuf,

    /// Output file [default: the one recorded in the manifest]
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Re-run the merger over whatever partial outputs exist. Intermediate files are left in place.
pub fn execute(cmd: MergeCommand) -> Result<ExitCode> {
    let merged = merge_from_manifest(&cmd.manifest).and_then(|(manifest, outcome)| {
        let output = cmd.output.clone().unwrap_or_else(|| manifest.output.clone());
        outcome.write(&output)?;
        Ok((output, outcome))
    });

    let (output, outcome) = match merged {
        Ok(v) => v,
        Err(e) => {
            error!(target: "vqa.shard.merge", manifest = %cmd.manifest.display(), error = %e, "merge failed");
            return Ok(ExitCode::from(EXIT_MERGE_FAILED));
        }
    };

    for slice in outcome.failed_slices() {
        warn!(
            target: "vqa.shard.merge",
            gpu = %slice.gpu_id,
            reason = slice.reason.as_deref().unwrap_or("unknown"),
            "slice failed"
        );
    }
    info!(
        target: "vqa.shard.merge",
        output = %output.display(),
        records = outcome.records.len(),
        failed_labels = outcome.failed_labels(),
        "merge finished"
    );
    Ok(ExitCode::SUCCESS)
}
