//! Process hooks applied to worker and scorer children.
//!
//! On Unix the hooks run inside a `pre_exec` closure, in the child after `fork()` and before `execve()`,
//! so the process never runs without them:
//! - `own_process_group`: `setpgid(0, 0)`, so a stop signal reaches the child together with its descendants;
//! - `die_with_parent` (Linux): `PR_SET_PDEATHSIG = SIGTERM`, so children do not outlive a killed parent;
//! - classic `rlimit`s (`RLIMIT_NOFILE`, `RLIMIT_CORE`).
//!
//! On non-Unix platforms the request is logged and ignored.
use tokio::process::Command;
#[cfg(not(unix))]
use tracing::warn;

/// Declarative hooks for a child process. `Default` applies nothing.
#[derive(Debug, Clone, Default)]
pub struct ChildLimits {
    /// Maximum number of open file descriptors (`RLIMIT_NOFILE`).
    pub max_open_files: Option<u64>,
    /// Set `RLIMIT_CORE = 0`. GPU processes dump very large cores.
    pub disable_core_dumps: bool,
    /// Start a new process group led by the child.
    pub own_process_group: bool,
    /// Deliver `SIGTERM` to the child when its parent dies (Linux only).
    ///
    /// The kernel ties this to the spawning thread; tokio runtime threads live as long as the runtime.
    pub die_with_parent: bool,
}

impl ChildLimits {
    /// Hooks for worker processes launched by the driver.
    pub fn worker() -> Self {
        Self {
            own_process_group: true,
            die_with_parent: true,
            ..Default::default()
        }
    }

    /// Hooks for the scorer backend launched by a worker.
    ///
    /// The backend leads its own group: a shell command line may fork model servers or pipelines
    /// that must go down with it.
    pub fn scorer() -> Self {
        Self {
            own_process_group: true,
            die_with_parent: true,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max_open_files.is_none()
            && !self.disable_core_dumps
            && !self.own_process_group
            && !self.die_with_parent
    }
}

pub fn attach_child_limits(cmd: &mut Command, config: &ChildLimits) {
    if config.is_empty() {
        return;
    }

    #[cfg(unix)]
    {
        unix_impl::attach(cmd, config);
    }

    #[cfg(not(unix))]
    {
        let _ = cmd;
        warn!(
            target: "vqa.exec.limits",
            ?config,
            "process hooks requested on a non-Unix OS; they will be ignored"
        );
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::io;

    use tokio::process::Command;

    use super::ChildLimits;

    pub fn attach(cmd: &mut Command, config: &ChildLimits) {
        let ChildLimits {
            max_open_files,
            disable_core_dumps,
            own_process_group,
            die_with_parent,
        } = config.clone();
        let parent = std::process::id();

        unsafe {
            cmd.pre_exec(move || {
                if own_process_group && libc::setpgid(0, 0) != 0 {
                    return Err(io::Error::last_os_error());
                }
                if die_with_parent {
                    set_parent_death_signal(parent)?;
                }
                if let Some(nofile) = max_open_files {
                    apply_rlimit(libc::RLIMIT_NOFILE, nofile)?;
                }
                if disable_core_dumps {
                    apply_rlimit(libc::RLIMIT_CORE, 0)?;
                }
                Ok(())
            });
        }
    }

    #[cfg(target_os = "linux")]
    fn set_parent_death_signal(parent: u32) -> io::Result<()> {
        let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // The parent may have died between fork and prctl.
        if unsafe { libc::getppid() } as u32 != parent {
            return Err(io::Error::other("parent exited before exec"));
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn set_parent_death_signal(_parent: u32) -> io::Result<()> {
        Ok(())
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    type Resource = libc::__rlimit_resource_t;
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    type Resource = libc::c_int;

    fn apply_rlimit(resource: Resource, value: u64) -> io::Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: value as libc::rlim_t,
        };

        let rc = unsafe { libc::setrlimit(resource, &rlim) };
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}
