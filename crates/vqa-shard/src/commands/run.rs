//! `run`: partition, dispatch one worker per GPU, merge.
use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Args};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vqa_core::{
    Plan, RecordStore, RunConfig, RunState,
    config::{DEFAULT_SUFFIX, check_installed, installed_gpu_count},
    merge,
    merge::remove_transient_files,
};
use vqa_exec::{DispatchConfig, dispatch, util::cancel_on_signal};
use vqa_model::{GpuSet, SliceStatus};
use vqa_observe::LoggerConfig;

use super::{EXIT_INTERRUPTED, EXIT_MERGE_FAILED};

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("devices").required(true).args(["gpus", "gpu_ids"])))]
pub struct RunCommand {
    /// Input file: JSON array of records, or JSON Lines (.jsonl)
    #[arg(long)]
    pub input: PathBuf,

    /// Label catalog passed unchanged to the scorer
    #[arg(long)]
    pub labels: PathBuf,

    /// Number of GPUs, enumerated from 0
    #[arg(long)]
    pub gpus: Option<u32>,

    /// Explicit GPU ids, e.g. `0,2,3`
    #[arg(long)]
    pub gpu_ids: Option<String>,

    /// Scorer command line, run through the shell in every worker
    #[arg(long, env = "VQA_SCORER")]
    pub scorer: String,

    /// Directory for slices, partial outputs and the manifest [default: next to the input]
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Final output file [default: <input-stem><suffix>.json]
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_SUFFIX)]
    pub suffix: String,

    /// Run id used in intermediate file names [default: random]
    #[arg(long)]
    pub run_id: Option<String>,

    /// Per-call scorer deadline
    #[arg(long)]
    pub score_timeout_secs: Option<u64>,

    /// Seconds a worker gets between SIGTERM and SIGKILL on cancellation
    #[arg(long, default_value_t = 10)]
    pub kill_grace_secs: u64,

    /// Keep slice files and partial outputs after merging
    #[arg(long)]
    pub keep_partials: bool,

    /// Do not compare the requested GPU ids with the devices the driver reports
    #[arg(long)]
    pub skip_gpu_check: bool,
}

impl RunCommand {
    fn run_config(&self) -> Result<RunConfig> {
        let gpus = match (self.gpus, &self.gpu_ids) {
            (Some(count), _) => GpuSet::from_count(count)?,
            (None, Some(ids)) => ids.parse::<GpuSet>()?,
            (None, None) => bail!("either --gpus or --gpu-ids is required"),
        };
        if !self.skip_gpu_check
            && let Some(installed) = installed_gpu_count()
        {
            check_installed(&gpus, installed)?;
        }

        let mut cfg = RunConfig::new(&self.input, gpus);
        cfg.label_catalog = Some(self.labels.clone());
        if let Some(dir) = &self.workdir {
            cfg.workdir = dir.clone();
        }
        cfg.output = self.output.clone();
        cfg.suffix = self.suffix.clone();
        if let Some(id) = &self.run_id {
            cfg.run_id = id.clone();
        }
        cfg.keep_partials = self.keep_partials;
        Ok(cfg.absolute()?)
    }

    fn dispatch_config(&self, log: &LoggerConfig) -> Result<DispatchConfig> {
        let program = std::env::current_exe().context("locating the vqa-shard executable")?;

        let mut args = vec!["worker".to_string(), "--scorer".to_string(), self.scorer.clone()];
        if let Some(secs) = self.score_timeout_secs {
            args.extend(["--score-timeout-secs".to_string(), secs.to_string()]);
        }
        if !log.use_color {
            args.push("--no-color".to_string());
        }

        let cfg = DispatchConfig {
            args,
            env: log.child_env(),
            kill_grace: Duration::from_secs(self.kill_grace_secs),
            ..DispatchConfig::new(program)
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

pub async fn execute(cmd: RunCommand, log: &LoggerConfig) -> Result<ExitCode> {
    let cfg = cmd.run_config()?;
    let dispatch_cfg = cmd.dispatch_config(log)?;

    let store = RecordStore::load(&cfg.input)
        .with_context(|| format!("loading input {}", cfg.input.display()))?;
    let plan = Plan::build(&cfg, &store).context("partitioning the input")?;
    plan.write().context("writing slices")?;

    let mut state = RunState::partitioned(&plan.manifest);
    info!(
        target: "vqa.shard.run",
        run_id = %cfg.run_id,
        items = store.len(),
        gpus = cfg.gpus.len(),
        "run partitioned"
    );

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    state.dispatched();
    let exits = dispatch(&dispatch_cfg, &plan.manifest, &cancel).await;
    for exit in &exits {
        state.worker_exited(exit.gpu_id, exit.describe(), exit.failure_reason());
    }
    if cancel.is_cancelled() {
        warn!(target: "vqa.shard.run", "run interrupted; merging what the workers wrote");
    }

    let merged = merge(&store, &plan.manifest).and_then(|outcome| {
        outcome.write(&plan.manifest.output)?;
        Ok(outcome)
    });
    let outcome = match merged {
        Ok(outcome) => outcome,
        Err(e) => {
            state.merge_failed(&e);
            error!(target: "vqa.shard.run", error = %e, manifest = %plan.manifest_path.display(), "merge failed");
            return Ok(ExitCode::from(EXIT_MERGE_FAILED));
        }
    };
    state.merged(&outcome);

    for exit in exits.iter().filter(|x| !x.is_success()) {
        if state.get(exit.gpu_id).is_some_and(|s| s.status == SliceStatus::Completed) {
            warn!(
                target: "vqa.shard.run",
                gpu = %exit.gpu_id,
                exit = %exit.describe(),
                "worker exited abnormally after writing a complete partial output"
            );
        }
    }
    for slice in state.failed() {
        warn!(
            target: "vqa.shard.run",
            gpu = %slice.gpu_id,
            exit = slice.exit.as_deref().unwrap_or("unknown"),
            reason = slice.error.as_deref().unwrap_or("unknown"),
            "slice failed"
        );
    }

    if !cfg.keep_partials {
        if let Err(e) = remove_transient_files(&plan.manifest) {
            warn!(target: "vqa.shard.run", error = %e, "could not remove intermediate files");
        }
    }

    info!(
        target: "vqa.shard.run",
        output = %plan.manifest.output.display(),
        records = outcome.records.len(),
        failed_slices = outcome.failed_slices().count(),
        failed_labels = outcome.failed_labels(),
        "run finished"
    );

    if cancel.is_cancelled() {
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunCommand,
    }

    fn parse(args: &[&str]) -> Result<RunCommand, clap::Error> {
        let argv = [
            "run",
            "--input",
            "in.json",
            "--labels",
            "labels.json",
            "--scorer",
            "score.sh",
            "--skip-gpu-check",
        ];
        Harness::try_parse_from(argv.iter().chain(args)).map(|h| h.run)
    }

    #[test]
    fn gpu_count_enumerates_from_zero() {
        let cfg = parse(&["--gpus", "3"]).unwrap().run_config().unwrap();
        let ids: Vec<u32> = cfg.gpus.iter().map(|g| g.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(cfg.output_path(), PathBuf::from("in_scored.json"));
    }

    #[test]
    fn explicit_gpu_ids_keep_their_order() {
        let cfg = parse(&["--gpu-ids", "3,0,2"]).unwrap().run_config().unwrap();
        let ids: Vec<u32> = cfg.gpus.iter().map(|g| g.0).collect();
        assert_eq!(ids, vec![3, 0, 2]);
    }

    #[test]
    fn gpu_selection_is_required_and_exclusive() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--gpus", "2", "--gpu-ids", "0,1"]).is_err());
    }

    #[test]
    fn bad_gpu_lists_are_partition_failures() {
        for args in [["--gpus", "0"], ["--gpu-ids", "0,0"], ["--gpu-ids", "0,x"]] {
            assert!(parse(&args).unwrap().run_config().is_err(), "{args:?}");
        }
    }

    #[test]
    fn worker_arguments_carry_the_scorer() {
        let cmd = parse(&["--gpus", "1", "--score-timeout-secs", "30"]).unwrap();
        let log = LoggerConfig {
            use_color: false,
            ..Default::default()
        };
        let cfg = cmd.dispatch_config(&log).unwrap();
        assert_eq!(
            cfg.args,
            vec!["worker", "--scorer", "score.sh", "--score-timeout-secs", "30", "--no-color"]
        );
        assert_eq!(cfg.slice_flag, "--slice");
        assert_eq!(cfg.env, log.child_env());
    }
}
