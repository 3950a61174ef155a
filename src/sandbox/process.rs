//! Local process sandbox.
//!
//! Each execution stages the untrusted source, spawns a fresh OS process
//! with a minimal allow-listed environment and resource limits applied in a
//! pre-exec hook, waits under a wall-clock limit, and drains both output
//! pipes concurrently so a chatty child can never deadlock against a full
//! pipe.
//!
//! # Isolation model
//!
//! When the platform allows it (Linux, running as root, `unshare` and
//! `setpriv` on PATH) the child is wrapped in new network/IPC/PID/mount/UTS
//! namespaces and dropped to an unprivileged user with no supplementary
//! groups and no capabilities:
//!
//! ```text
//! unshare --net --ipc --pid --mount --uts --fork \
//!   setpriv --no-new-privileges --clear-groups --inh-caps=-all \
//!     --uid=nobody --regid=nogroup <interpreter> <script>
//! ```
//!
//! Anywhere else the sandbox degrades to resource-limit-only isolation.
//! The degradation is logged at construction and exposed through
//! [`ProcessSandbox::isolation`], never silent.
//!
//! Lint mode swaps the interpreter for the configured linter and skips both
//! the namespace wrapper and the time limit; the linter is trusted tooling
//! running over an untrusted input file, not untrusted code.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::error::{ConfigError, SandboxError};
use crate::sandbox::limits::{ResourceLimitProfile, allowed_environment};
use crate::sandbox::report::{CommandResult, process_timeout_message};
use crate::sandbox::staging::StagedScript;
use crate::sandbox::{ExecutionRequest, Sandbox};

/// How much of the isolation contract the current host can honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Namespace isolation plus privilege drop plus resource limits.
    Namespaces,
    /// Resource limits and environment scrubbing only.
    ResourceLimitsOnly,
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Namespaces => write!(f, "namespaces"),
            Self::ResourceLimitsOnly => write!(f, "resource-limits-only"),
        }
    }
}

/// Sandbox that runs each request as a fresh, confined OS process.
pub struct ProcessSandbox {
    interpreter: PathBuf,
    linter: Option<PathBuf>,
    limits: ResourceLimitProfile,
    default_time_limit: Duration,
    isolation: IsolationLevel,
}

impl ProcessSandbox {
    /// Creates a process sandbox around the given interpreter.
    ///
    /// Isolation capability is probed once here; a host that cannot provide
    /// namespace isolation is accepted with a warning and a reduced
    /// guarantee, not rejected.
    #[must_use]
    pub fn new(interpreter: impl Into<PathBuf>, linter: Option<PathBuf>) -> Self {
        let isolation = detect_isolation();
        if isolation == IsolationLevel::ResourceLimitsOnly {
            warn!(
                "Namespace isolation unavailable (needs Linux, root, unshare and setpriv); \
                 sandbox degrades to resource limits and environment scrubbing"
            );
        }

        Self {
            interpreter: interpreter.into(),
            linter,
            limits: ResourceLimitProfile::default(),
            default_time_limit: crate::config::DEFAULT_TIME_LIMIT,
            isolation,
        }
    }

    /// Overrides the resource-limit profile.
    #[must_use]
    pub fn with_limits(mut self, limits: ResourceLimitProfile) -> Self {
        self.limits = limits;
        self
    }

    /// Overrides the default execution time limit.
    #[must_use]
    pub fn with_default_time_limit(mut self, limit: Duration) -> Self {
        self.default_time_limit = limit;
        self
    }

    /// The isolation level this host actually provides.
    #[must_use]
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Assembles the argv for executing a staged script.
    fn execute_argv(&self, script: &Path) -> Vec<OsString> {
        let mut argv: Vec<OsString> = Vec::new();

        if self.isolation == IsolationLevel::Namespaces {
            argv.extend(
                [
                    "unshare", "--net", "--ipc", "--pid", "--mount", "--uts", "--fork",
                ]
                .map(OsString::from),
            );
            argv.extend(
                [
                    "setpriv",
                    "--no-new-privileges",
                    "--clear-groups",
                    "--inh-caps=-all",
                    "--uid=nobody",
                    "--regid=nogroup",
                ]
                .map(OsString::from),
            );
        }

        argv.push(self.interpreter.clone().into_os_string());
        argv.push(script.as_os_str().to_os_string());
        argv
    }

    /// Assembles the argv for linting a staged script.
    fn lint_argv(&self, script: &Path) -> Result<Vec<OsString>, ConfigError> {
        let linter = self.linter.as_ref().ok_or(ConfigError::LinterUnconfigured)?;

        let mut argv = vec![linter.clone().into_os_string()];
        argv.extend(["check", "--output-format", "text"].map(OsString::from));
        argv.push(script.as_os_str().to_os_string());
        Ok(argv)
    }

    /// Spawns the assembled command and waits for it under `time_limit`.
    ///
    /// `None` disables the wall-clock limit (lint mode); the resource-limit
    /// profile still bounds CPU time in that case.
    #[instrument(skip(self, argv), fields(isolation = %self.isolation))]
    async fn spawn_and_wait(
        &self,
        argv: Vec<OsString>,
        working_dir: &Path,
        time_limit: Option<Duration>,
    ) -> Result<CommandResult, SandboxError> {
        let program = PathBuf::from(&argv[0]);

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(working_dir)
            .env_clear()
            .envs(allowed_environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Own process group, so a timeout kill reaches the wrapper's
            // descendants too, not just the wrapper.
            .process_group(0)
            .kill_on_drop(true);

        let limits = self.limits.clone();
        // SAFETY: the hook runs between fork and exec and only issues
        // setrlimit syscalls, which are async-signal-safe.
        unsafe {
            cmd.pre_exec(move || limits.apply());
        }

        let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Drain both pipes concurrently so the child can't block on a full
        // pipe and outlive its time limit that way.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = match time_limit {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(waited) => waited.map_err(|source| SandboxError::Wait { source })?,
                Err(_) => {
                    debug!(limit_s = limit.as_secs(), "Time limit elapsed, killing child");
                    kill_process_group(&child);
                    let _ = child.start_kill();
                    let _ = child.wait().await;

                    // The pipes close with the child, so the drain tasks finish.
                    let partial = stdout_task.await.unwrap_or_default();
                    let _ = stderr_task.await;

                    return Ok(CommandResult::timeout(
                        String::from_utf8_lossy(&partial),
                        process_timeout_message(limit),
                    ));
                }
            },
            None => child
                .wait()
                .await
                .map_err(|source| SandboxError::Wait { source })?,
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let exit_code = status.code().unwrap_or(-1);
        debug!(exit_code, "Sandboxed process finished");

        Ok(CommandResult::new(
            String::from_utf8_lossy(&stdout),
            String::from_utf8_lossy(&stderr),
            exit_code,
        ))
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn run(&self, request: &ExecutionRequest) -> Result<CommandResult, SandboxError> {
        if request.screen.is_some() {
            return Err(ConfigError::ScreenUnavailable.into());
        }

        let staged = StagedScript::write(&request.code)?;

        let (argv, time_limit) = if request.lint {
            (self.lint_argv(staged.script_path())?, None)
        } else {
            (
                self.execute_argv(staged.script_path()),
                Some(request.time_limit.unwrap_or(self.default_time_limit)),
            )
        };

        self.spawn_and_wait(argv, staged.dir_path(), time_limit).await
        // `staged` drops here: the directory is removed on every exit path.
    }
}

/// Sends SIGKILL to the child's whole process group.
///
/// The child was spawned as its own group leader, so this is what actually
/// terminates the interpreter behind the `unshare`/`setpriv` wrapper; a
/// plain kill would only reach the wrapper.
fn kill_process_group(child: &tokio::process::Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

/// Probes whether the host can provide the full namespace/privilege-drop
/// wrapper. The result is cached for the process lifetime.
///
/// Presence of `unshare`/`setpriv` is not enough: a containerized root
/// often lacks the privileges to create namespaces, so the probe runs the
/// actual wrapper around `true` once and believes the outcome.
fn detect_isolation() -> IsolationLevel {
    static DETECTED: OnceLock<IsolationLevel> = OnceLock::new();

    *DETECTED.get_or_init(|| {
        #[cfg(target_os = "linux")]
        {
            if nix::unistd::geteuid().is_root()
                && which::which("unshare").is_ok()
                && which::which("setpriv").is_ok()
            {
                let probe = std::process::Command::new("unshare")
                    .args([
                        "--net", "--ipc", "--pid", "--mount", "--uts", "--fork",
                    ])
                    .args([
                        "setpriv",
                        "--no-new-privileges",
                        "--clear-groups",
                        "--inh-caps=-all",
                        "--uid=nobody",
                        "--regid=nogroup",
                        "/bin/true",
                    ])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();

                if matches!(probe, Ok(status) if status.success()) {
                    return IsolationLevel::Namespaces;
                }
            }
        }

        IsolationLevel::ResourceLimitsOnly
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> ProcessSandbox {
        ProcessSandbox::new("/bin/sh", Some(PathBuf::from("/usr/bin/ruff")))
    }

    #[test]
    fn test_execute_argv_ends_with_interpreter_and_script() {
        let sandbox = sandbox();
        let argv = sandbox.execute_argv(Path::new("/tmp/stage/script.py"));

        let tail: Vec<&OsString> = argv.iter().rev().take(2).collect();
        assert_eq!(tail[1], &OsString::from("/bin/sh"));
        assert_eq!(tail[0], &OsString::from("/tmp/stage/script.py"));
    }

    #[test]
    fn test_execute_argv_wrapper_matches_isolation() {
        let sandbox = sandbox();
        let argv = sandbox.execute_argv(Path::new("/tmp/stage/script.py"));

        match sandbox.isolation() {
            IsolationLevel::Namespaces => {
                assert_eq!(argv[0], OsString::from("unshare"));
                assert!(argv.contains(&OsString::from("setpriv")));
                assert!(argv.contains(&OsString::from("--no-new-privileges")));
            }
            IsolationLevel::ResourceLimitsOnly => {
                assert_eq!(argv.len(), 2);
                assert_eq!(argv[0], OsString::from("/bin/sh"));
            }
        }
    }

    #[test]
    fn test_lint_argv_shape() {
        let sandbox = sandbox();
        let argv = sandbox
            .lint_argv(Path::new("/tmp/stage/script.py"))
            .expect("linter configured");

        assert_eq!(argv[0], OsString::from("/usr/bin/ruff"));
        assert_eq!(argv[1], OsString::from("check"));
        assert_eq!(argv[2], OsString::from("--output-format"));
        assert_eq!(argv[3], OsString::from("text"));
        assert_eq!(argv[4], OsString::from("/tmp/stage/script.py"));
    }

    #[test]
    fn test_lint_argv_requires_linter() {
        let sandbox = ProcessSandbox::new("/bin/sh", None);
        let result = sandbox.lint_argv(Path::new("/tmp/script.py"));
        assert!(matches!(result, Err(ConfigError::LinterUnconfigured)));
    }
}
