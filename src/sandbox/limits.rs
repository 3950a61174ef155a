//! Resource-limit policy and the minimal child environment.
//!
//! The limit profile is applied inside the pre-exec hook of the
//! about-to-be-replaced child image, before any untrusted code runs. If a
//! single ceiling cannot be set, the hook fails and the spawn aborts: there
//! is no unconfined fallback.
//!
//! The environment is an allow-list. The child never inherits the parent's
//! full environment; credentials, tokens and internal hostnames must not
//! leak in.

use std::io;

use nix::sys::resource::{Resource, setrlimit};
use tracing::trace;

/// Environment variable names forwarded from the parent when set.
///
/// Locale, timezone, and proxy settings only. Anything else is stripped.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "LANG",
    "LC_ALL",
    "TZ",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "USER_AGENT",
];

/// Fixed environment entries every sandboxed child receives.
const FIXED_ENV: &[(&str, &str)] = &[
    (
        "PATH",
        "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin",
    ),
    ("HOME", "/tmp"),
    ("TERM", "dumb"),
];

/// OS-enforced ceilings applied to a sandboxed process.
///
/// Applied atomically immediately before exec; once set there is no
/// relaxation path for the lifetime of the process.
///
/// # Example
///
/// ```
/// use sandbox_gateway::sandbox::ResourceLimitProfile;
///
/// let profile = ResourceLimitProfile::default()
///     .with_address_space(256 * 1024 * 1024)
///     .with_cpu_seconds(5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimitProfile {
    /// Address-space ceiling in bytes (RLIMIT_AS).
    pub address_space: u64,
    /// CPU-time ceiling in seconds (RLIMIT_CPU).
    pub cpu_seconds: u64,
    /// Process/thread count ceiling (RLIMIT_NPROC).
    pub max_processes: u64,
    /// File-size ceiling in bytes (RLIMIT_FSIZE).
    pub max_file_size: u64,
}

impl Default for ResourceLimitProfile {
    fn default() -> Self {
        Self {
            address_space: 512 * 1024 * 1024,
            cpu_seconds: 10,
            max_processes: 64,
            max_file_size: 16 * 1024 * 1024,
        }
    }
}

impl ResourceLimitProfile {
    /// Sets the address-space ceiling in bytes.
    #[must_use]
    pub fn with_address_space(mut self, bytes: u64) -> Self {
        self.address_space = bytes;
        self
    }

    /// Sets the CPU-time ceiling in seconds.
    #[must_use]
    pub fn with_cpu_seconds(mut self, seconds: u64) -> Self {
        self.cpu_seconds = seconds;
        self
    }

    /// Sets the process-count ceiling.
    #[must_use]
    pub fn with_max_processes(mut self, count: u64) -> Self {
        self.max_processes = count;
        self
    }

    /// Sets the file-size ceiling in bytes.
    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Applies every ceiling to the current process, core dumps last.
    ///
    /// Runs in the forked child between fork and exec, so it must stay
    /// async-signal-safe: plain setrlimit syscalls only, no allocation, no
    /// locks.
    ///
    /// # Errors
    ///
    /// Returns the first syscall failure. The caller's pre-exec contract
    /// turns that into a failed spawn, aborting the child before exec.
    pub fn apply(&self) -> io::Result<()> {
        set_limit(Resource::RLIMIT_AS, self.address_space)?;
        set_limit(Resource::RLIMIT_CPU, self.cpu_seconds)?;
        set_limit(Resource::RLIMIT_NPROC, self.max_processes)?;
        set_limit(Resource::RLIMIT_FSIZE, self.max_file_size)?;
        set_limit(Resource::RLIMIT_CORE, 0)?;
        Ok(())
    }
}

fn set_limit(resource: Resource, ceiling: u64) -> io::Result<()> {
    setrlimit(resource, ceiling, ceiling).map_err(io::Error::from)
}

/// Builds the allow-listed environment for a sandboxed child.
///
/// Fixed safe values first, then the allow-listed subset of the parent
/// environment. Everything else is stripped by the caller's `env_clear()`.
#[must_use]
pub fn allowed_environment() -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = FIXED_ENV
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();

    for name in ALLOWED_ENV_VARS {
        if let Ok(value) = std::env::var(name) {
            trace!(name, "Forwarding allow-listed environment variable");
            env.push(((*name).to_string(), value));
        }
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = ResourceLimitProfile::default();
        assert_eq!(profile.address_space, 512 * 1024 * 1024);
        assert_eq!(profile.cpu_seconds, 10);
        assert_eq!(profile.max_processes, 64);
        assert_eq!(profile.max_file_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_builder_chain() {
        let profile = ResourceLimitProfile::default()
            .with_address_space(1024)
            .with_cpu_seconds(2)
            .with_max_processes(8)
            .with_max_file_size(4096);

        assert_eq!(profile.address_space, 1024);
        assert_eq!(profile.cpu_seconds, 2);
        assert_eq!(profile.max_processes, 8);
        assert_eq!(profile.max_file_size, 4096);
    }

    #[test]
    fn test_environment_contains_fixed_entries() {
        let env = allowed_environment();
        let keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();

        assert!(keys.contains(&"PATH"));
        assert!(keys.contains(&"HOME"));
        assert!(keys.contains(&"TERM"));
    }

    #[test]
    fn test_environment_path_is_hardcoded() {
        let env = allowed_environment();
        let (_, path) = env
            .iter()
            .find(|(k, _)| k == "PATH")
            .expect("PATH must be present");
        assert_eq!(path, "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin");
    }

    #[test]
    fn test_environment_has_no_secret_names() {
        let env = allowed_environment();
        let keys: Vec<&str> = env.iter().map(|(k, _)| k.as_str()).collect();

        for secret in [
            "AWS_SECRET_ACCESS_KEY",
            "GITHUB_TOKEN",
            "GIT_SSH_KEY",
            "SSH_AUTH_SOCK",
            "ANTHROPIC_API_KEY",
        ] {
            assert!(!keys.contains(&secret), "{secret} must never be forwarded");
        }
    }
}
