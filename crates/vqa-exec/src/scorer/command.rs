use std::{path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout},
};
use tracing::{debug, trace, warn};

use super::{ScoreError, Scorer};
use crate::{
    error::ExecError,
    limits::{ChildLimits, attach_child_limits},
    util::{kill_graceful, shell_command},
};

/// Grace between `SIGTERM` and `SIGKILL` when a misbehaving backend is dropped.
const DISCARD_GRACE: Duration = Duration::from_secs(1);

/// Configuration of an external scoring backend.
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Shell command line of the backend.
    pub command: String,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Per-call deadline. On expiry the backend is killed and respawned on the next call.
    pub timeout: Option<Duration>,
    /// How long `shutdown` waits for the backend after closing its stdin.
    pub shutdown_grace: Duration,
    pub limits: ChildLimits,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            env: Vec::new(),
            cwd: None,
            timeout: None,
            shutdown_grace: Duration::from_secs(5),
            limits: ChildLimits::scorer(),
        }
    }
}

impl ScorerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ExecError> {
        if self.command.trim().is_empty() {
            return Err(ExecError::MissingProgram);
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ExecError::Config("score timeout must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Request<'a> {
    video: &'a str,
    label: &'a str,
}

struct Backend {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

/// Long-lived scorer process speaking line-delimited JSON.
///
/// Each request is one line `{"video": ..., "label": ...}` on the backend's stdin.
/// The answer is the next stdout line starting with `{`: either `{"score": <number>}` or `{"error": <reason>}`.
/// Other stdout lines (banners, progress bars) are skipped. The backend's stderr is inherited.
///
/// The process is started lazily and restarted after it dies, times out, or breaks the protocol.
pub struct CommandScorer {
    cfg: ScorerConfig,
    backend: Option<Backend>,
}

impl CommandScorer {
    pub fn new(cfg: ScorerConfig) -> Result<Self, ExecError> {
        cfg.validate()?;
        Ok(Self { cfg, backend: None })
    }

    fn spawn(&self) -> Result<Backend, ScoreError> {
        let mut cmd = shell_command(&self.cfg.command);
        if let Some(cwd) = &self.cfg.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &self.cfg.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        attach_child_limits(&mut cmd, &self.cfg.limits);

        let mut child = cmd
            .spawn()
            .map_err(|e| ScoreError::Backend(format!("spawn '{}': {e}", self.cfg.command)))?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ScoreError::Backend("backend pipes unavailable".into()));
        };

        debug!(target: "vqa.exec.scorer", pid = ?child.id(), command = %self.cfg.command, "scorer backend started");
        Ok(Backend {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        })
    }

    /// Live backend, restarting it if the previous one has exited.
    fn backend(&mut self) -> Result<&mut Backend, ScoreError> {
        if let Some(b) = self.backend.as_mut()
            && let Ok(Some(status)) = b.child.try_wait()
        {
            warn!(target: "vqa.exec.scorer", %status, "scorer backend exited; restarting");
            self.backend = None;
        }
        if self.backend.is_none() {
            self.backend = Some(self.spawn()?);
        }
        self.backend
            .as_mut()
            .ok_or_else(|| ScoreError::Backend("backend unavailable".into()))
    }

    /// Stop the backend and everything it started.
    async fn discard(&mut self) {
        if let Some(mut b) = self.backend.take() {
            drop(b.stdin);
            if let Err(e) = kill_graceful(&mut b.child, DISCARD_GRACE, self.cfg.limits.own_process_group).await {
                warn!(target: "vqa.exec.scorer", error = %e, "failed to stop scorer backend");
            }
        }
    }
}

async fn exchange(backend: &mut Backend, request: &[u8]) -> Result<String, ScoreError> {
    let broken = |e: std::io::Error| ScoreError::Backend(e.to_string());

    backend.stdin.write_all(request).await.map_err(broken)?;
    backend.stdin.flush().await.map_err(broken)?;

    loop {
        match backend.lines.next_line().await.map_err(broken)? {
            None => return Err(ScoreError::Backend("scorer closed its output".into())),
            Some(line) if line.trim_start().starts_with('{') => return Ok(line),
            Some(line) => trace!(target: "vqa.exec.scorer", %line, "skipping non-JSON output"),
        }
    }
}

fn parse_reply(line: &str) -> Result<f64, ScoreError> {
    let reply: Value =
        serde_json::from_str(line).map_err(|e| ScoreError::Protocol(format!("malformed reply: {e}")))?;

    if let Some(reason) = reply.get("error") {
        let reason = match reason {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(ScoreError::Rejected(reason));
    }
    reply
        .get("score")
        .and_then(Value::as_f64)
        .ok_or_else(|| ScoreError::Protocol(format!("reply has no numeric 'score': {line}")))
}

#[async_trait]
impl Scorer for CommandScorer {
    fn name(&self) -> &str {
        "command"
    }

    async fn score(&mut self, video_ref: &str, label: &str) -> Result<f64, ScoreError> {
        let mut request = serde_json::to_vec(&Request {
            video: video_ref,
            label,
        })
        .map_err(|e| ScoreError::Protocol(e.to_string()))?;
        request.push(b'\n');

        let timeout = self.cfg.timeout;
        let backend = self.backend()?;
        let reply = match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange(backend, &request))
                .await
                .unwrap_or(Err(ScoreError::Timeout(limit))),
            None => exchange(backend, &request).await,
        };

        let result = reply.and_then(|line| parse_reply(&line));
        if let Err(e) = &result
            && !matches!(e, ScoreError::Rejected(_))
        {
            debug!(target: "vqa.exec.scorer", error = %e, "dropping scorer backend");
            self.discard().await;
        }
        result
    }

    async fn shutdown(&mut self) {
        let Some(Backend {
            mut child, stdin, ..
        }) = self.backend.take()
        else {
            return;
        };

        // EOF on stdin asks the backend to finish.
        drop(stdin);
        match tokio::time::timeout(self.cfg.shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => debug!(target: "vqa.exec.scorer", %status, "scorer backend stopped"),
            Ok(Err(e)) => warn!(target: "vqa.exec.scorer", error = %e, "waiting for scorer backend failed"),
            Err(_) => {
                warn!(target: "vqa.exec.scorer", "scorer backend ignored EOF; killing");
                let group = self.cfg.limits.own_process_group;
                if let Err(e) = kill_graceful(&mut child, DISCARD_GRACE, group).await {
                    warn!(target: "vqa.exec.scorer", error = %e, "failed to stop scorer backend");
                }
            }
        }
    }
}
