//! Launch one worker process per slice and wait for all of them.
//!
//! Workers are plain child processes pinned to their GPU through [`ENV_VISIBLE_DEVICES`].
//! The driver awaits every exit concurrently; on cancellation each worker gets `SIGTERM`
//! (its whole process group) and `SIGKILL` after [`DispatchConfig::kill_grace`].
//! A stopped worker shuts its scorer down itself.
use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tokio::{process::Command, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vqa_model::{GpuId, RunManifest, SliceEntry};

use crate::{
    ENV_VISIBLE_DEVICES,
    error::ExecError,
    limits::{ChildLimits, attach_child_limits},
    util::{describe_exit, kill_graceful},
};

/// How worker processes are started.
///
/// The command line of a worker is `program args.. <slice_flag> <slice path>`.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub slice_flag: String,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub kill_grace: Duration,
    pub limits: ChildLimits,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::new(),
            args: Vec::new(),
            slice_flag: "--slice".to_string(),
            env: Vec::new(),
            cwd: None,
            kill_grace: Duration::from_secs(10),
            limits: ChildLimits::worker(),
        }
    }
}

impl DispatchConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ExecError> {
        if self.program.as_os_str().is_empty() {
            return Err(ExecError::MissingProgram);
        }
        Ok(())
    }

    fn command(&self, entry: &SliceEntry) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&self.slice_flag)
            .arg(&entry.slice_path);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd.env(ENV_VISIBLE_DEVICES, entry.gpu_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        attach_child_limits(&mut cmd, &self.limits);
        cmd
    }
}

/// How a worker process ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
    Success,
    NonZero(i32),
    Signal(Option<i32>),
    SpawnFailed(String),
    WaitFailed(String),
    /// Stopped by the driver after cancellation.
    Cancelled,
}

impl ExitOutcome {
    fn from_status(status: &ExitStatus) -> Self {
        if status.success() {
            return Self::Success;
        }
        if let Some(code) = status.code() {
            return Self::NonZero(code);
        }
        cfg_if::cfg_if! {
            if #[cfg(unix)] {
                use std::os::unix::process::ExitStatusExt;
                Self::Signal(status.signal())
            } else {
                Self::Signal(None)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerExit {
    pub index: usize,
    pub gpu_id: GpuId,
    pub outcome: ExitOutcome,
}

impl WorkerExit {
    pub fn is_success(&self) -> bool {
        self.outcome == ExitOutcome::Success
    }

    pub fn describe(&self) -> String {
        match &self.outcome {
            ExitOutcome::Success => "exit code 0".to_string(),
            ExitOutcome::NonZero(code) => format!("exit code {code}"),
            ExitOutcome::Signal(Some(sig)) => format!("terminated by signal {sig}"),
            ExitOutcome::Signal(None) => "terminated".to_string(),
            ExitOutcome::SpawnFailed(e) => format!("spawn failed: {e}"),
            ExitOutcome::WaitFailed(e) => format!("wait failed: {e}"),
            ExitOutcome::Cancelled => "cancelled".to_string(),
        }
    }

    /// Why the slice should be considered failed, judging by the process alone.
    pub fn failure_reason(&self) -> Option<String> {
        (!self.is_success()).then(|| format!("worker {}", self.describe()))
    }
}

async fn run_one(
    mut cmd: Command,
    index: usize,
    gpu_id: GpuId,
    grace: Duration,
    group: bool,
    cancel: CancellationToken,
) -> WorkerExit {
    let exit = |outcome| WorkerExit {
        index,
        gpu_id,
        outcome,
    };

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return exit(ExitOutcome::SpawnFailed(e.to_string())),
    };
    debug!(target: "vqa.exec.dispatch", %gpu_id, pid = ?child.id(), "worker spawned");

    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => exit(ExitOutcome::from_status(&status)),
            Err(e) => exit(ExitOutcome::WaitFailed(e.to_string())),
        },
        _ = cancel.cancelled() => {
            debug!(target: "vqa.exec.dispatch", %gpu_id, "cancelled; stopping worker");
            match kill_graceful(&mut child, grace, group).await {
                Ok(status) => debug!(target: "vqa.exec.dispatch", %gpu_id, status = %describe_exit(&status), "worker stopped"),
                Err(e) => warn!(target: "vqa.exec.dispatch", %gpu_id, error = %e, "stopping worker failed"),
            }
            exit(ExitOutcome::Cancelled)
        }
    }
}

/// Start one worker per manifest slice and wait until every one has exited.
///
/// Results come back in slice order whatever the completion order.
pub async fn dispatch(cfg: &DispatchConfig, manifest: &RunManifest, cancel: &CancellationToken) -> Vec<WorkerExit> {
    let mut set = JoinSet::new();
    for entry in &manifest.slices {
        set.spawn(run_one(
            cfg.command(entry),
            entry.index,
            entry.gpu_id,
            cfg.kill_grace,
            cfg.limits.own_process_group,
            cancel.clone(),
        ));
    }
    info!(target: "vqa.exec.dispatch", run_id = %manifest.run_id, workers = manifest.slices.len(), "workers dispatched");

    let mut exits = Vec::with_capacity(manifest.slices.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(exit) => {
                if exit.is_success() {
                    info!(target: "vqa.exec.dispatch", gpu_id = %exit.gpu_id, "worker finished");
                } else {
                    warn!(target: "vqa.exec.dispatch", gpu_id = %exit.gpu_id, outcome = %exit.describe(), "worker failed");
                }
                exits.push(exit);
            }
            Err(e) => error!(target: "vqa.exec.dispatch", error = %e, "worker task aborted"),
        }
    }

    // A panicked task leaves its slice without an exit record.
    for entry in &manifest.slices {
        if !exits.iter().any(|x| x.index == entry.index) {
            exits.push(WorkerExit {
                index: entry.index,
                gpu_id: entry.gpu_id,
                outcome: ExitOutcome::WaitFailed("worker task aborted".into()),
            });
        }
    }
    exits.sort_by_key(|x| x.index);
    exits
}
