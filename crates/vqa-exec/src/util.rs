use std::{process::ExitStatus, time::Duration};

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A command running `script` through the platform shell (`sh -c` / `cmd /C`).
pub fn shell_command(script: &str) -> Command {
    cfg_if::cfg_if! {
        if #[cfg(windows)] {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(script);
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(script);
        }
    }
    cmd
}

/// Ask a child to stop with `SIGTERM`, escalate to `SIGKILL` after `grace`.
///
/// With `group` set the signals go to the child's whole process group (the child must lead it).
#[cfg(unix)]
pub async fn kill_graceful(child: &mut Child, grace: Duration, group: bool) -> std::io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return child.wait().await;
    };
    let pid = pid as libc::pid_t;
    let signal = |sig: libc::c_int| unsafe {
        if group {
            libc::killpg(pid, sig)
        } else {
            libc::kill(pid, sig)
        }
    };

    if signal(libc::SIGTERM) == 0
        && let Ok(status) = tokio::time::timeout(grace, child.wait()).await
    {
        return status;
    }

    debug!(target: "vqa.exec.util", pid, "grace period elapsed; killing");
    signal(libc::SIGKILL);
    child.kill().await?;
    child.wait().await
}

#[cfg(not(unix))]
pub async fn kill_graceful(child: &mut Child, _grace: Duration, _group: bool) -> std::io::Result<ExitStatus> {
    child.kill().await?;
    child.wait().await
}

/// Human-readable exit description: `exit code N` or `terminated by signal N`.
pub fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::process::ExitStatusExt;
            match status.signal() {
                Some(sig) => format!("terminated by signal {sig}"),
                None => "terminated".to_string(),
            }
        } else {
            "terminated".to_string()
        }
    }
}

/// Resolves on SIGTERM or Ctrl-C (SIGINT).
pub async fn shutdown_signal() {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = term.recv() => {}
                        _ = tokio::signal::ctrl_c() => {}
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        } else {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

/// Cancel `token` when the process receives a shutdown signal.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        debug!(target: "vqa.exec.util", "shutdown signal received");
        token.cancel();
    });
}

#[cfg(all(test, unix))]
mod tests {
    use tokio::process::Command;

    use super::*;

    #[tokio::test]
    async fn describes_exit_codes() {
        let status = shell_command("exit 3").status().await.unwrap();
        assert_eq!(describe_exit(&status), "exit code 3");
    }

    #[tokio::test]
    async fn term_stops_a_cooperative_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let status = kill_graceful(&mut child, Duration::from_secs(5), false)
            .await
            .unwrap();
        assert_eq!(describe_exit(&status), format!("terminated by signal {}", libc::SIGTERM));
    }

    #[tokio::test]
    async fn kill_follows_when_term_is_ignored() {
        let mut child = shell_command("trap '' TERM; sleep 30").spawn().unwrap();
        // Let the shell install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = kill_graceful(&mut child, Duration::from_millis(200), false)
            .await
            .unwrap();
        assert_eq!(describe_exit(&status), format!("terminated by signal {}", libc::SIGKILL));
    }
}
