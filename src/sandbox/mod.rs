//! Sandboxed execution of untrusted, model-generated code and commands.
//!
//! Two deployment modes implement one [`Sandbox`] contract:
//!
//! - [`ProcessSandbox`] spawns a fresh, confined OS process per execution on
//!   this host.
//! - [`RemoteShellSandbox`] drives a pre-provisioned shell over a TCP or
//!   Unix-socket connection with prompt-framed text.
//!
//! The mode is selected once from configuration via [`from_config`], never
//! per call. Every invocation is independent; the gateway imposes no
//! queueing or ordering between concurrent executions, and the only
//! cross-invocation coupling is the OS resource ceilings themselves.
//!
//! # Example
//!
//! ```no_run
//! use sandbox_gateway::config::GatewayConfig;
//! use sandbox_gateway::sandbox::{self, ExecutionRequest};
//!
//! # async fn demo() -> sandbox_gateway::Result<()> {
//! let config = GatewayConfig::default().with_interpreter("/usr/bin/python3");
//! let sandbox = sandbox::from_config(&config)?;
//!
//! let request = ExecutionRequest::new("print('hello')");
//! let result = sandbox.run(&request).await?;
//! println!("{}", result.render());
//! # Ok(())
//! # }
//! ```

mod limits;
mod process;
mod report;
mod shell;
mod staging;

pub use limits::{ALLOWED_ENV_VARS, ResourceLimitProfile, allowed_environment};
pub use process::{IsolationLevel, ProcessSandbox};
pub use report::{
    CommandResult, SHELL_TIMEOUT_MESSAGE, lint_summary, process_timeout_message,
};
pub use shell::{PROMPT_MARKER, RemoteShellSandbox, ShellConnection};
pub use staging::{SCRIPT_FILE_NAME, StagedScript};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::GatewayConfig;
use crate::error::{ConfigError, SandboxError};

/// One sandboxed execution, owned by the tool call that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// The untrusted code or shell command text.
    pub code: String,
    /// Wall-clock limit; the sandbox default applies when absent.
    pub time_limit: Option<Duration>,
    /// Lint the code instead of executing it (process sandbox only).
    pub lint: bool,
    /// Screen session to run in (remote shell sandbox only). An empty
    /// string requests a generated session name.
    pub screen: Option<String>,
}

impl ExecutionRequest {
    /// Creates an execute request with default settings.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            time_limit: None,
            lint: false,
            screen: None,
        }
    }

    /// Sets an explicit time limit.
    #[must_use]
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Switches the request to lint mode.
    #[must_use]
    pub fn with_lint(mut self) -> Self {
        self.lint = true;
        self
    }

    /// Targets a screen session on the remote shell.
    #[must_use]
    pub fn with_screen(mut self, session: impl Into<String>) -> Self {
        self.screen = Some(session.into());
        self
    }
}

/// The sandboxed-execution capability.
///
/// Implementations must be safe to share across concurrent tool calls;
/// each `run` is an independent unit of work with no shared mutable state
/// beyond the OS itself.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Executes the request and reports its outcome.
    ///
    /// Timeouts and non-zero exits are `Ok` results; errors are reserved
    /// for configuration problems and infrastructure failures (staging,
    /// spawn, connect, stream I/O).
    async fn run(&self, request: &ExecutionRequest) -> Result<CommandResult, SandboxError>;
}

/// Selects and builds the sandbox for this deployment.
///
/// A configured remote shell location wins over a local interpreter; the
/// modes are never mixed per call.
///
/// # Errors
///
/// Returns `ConfigError::SandboxUnconfigured` when neither a remote shell
/// location nor an interpreter is configured.
pub fn from_config(config: &GatewayConfig) -> Result<Arc<dyn Sandbox>, ConfigError> {
    if let Some(location) = &config.sandbox_location {
        return Ok(Arc::new(
            RemoteShellSandbox::new(location.clone())
                .with_default_time_limit(config.default_time_limit),
        ));
    }

    if let Some(interpreter) = &config.interpreter {
        return Ok(Arc::new(
            ProcessSandbox::new(interpreter, config.linter.clone())
                .with_default_time_limit(config.default_time_limit),
        ));
    }

    Err(ConfigError::SandboxUnconfigured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ExecutionRequest::new("echo hi")
            .with_time_limit(Duration::from_secs(2))
            .with_screen("mcp_test");

        assert_eq!(request.code, "echo hi");
        assert_eq!(request.time_limit, Some(Duration::from_secs(2)));
        assert!(!request.lint);
        assert_eq!(request.screen.as_deref(), Some("mcp_test"));
    }

    #[test]
    fn test_from_config_unconfigured() {
        let result = from_config(&GatewayConfig::default());
        assert!(matches!(result, Err(ConfigError::SandboxUnconfigured)));
    }

    #[test]
    fn test_from_config_prefers_remote_shell() {
        let config = GatewayConfig::default()
            .with_interpreter("/usr/bin/python3")
            .with_sandbox_socket("/run/sandbox.sock");

        // Selection succeeds; the remote location shadows the interpreter.
        assert!(from_config(&config).is_ok());
    }

    #[test]
    fn test_from_config_process_mode() {
        let config = GatewayConfig::default().with_interpreter("/usr/bin/python3");
        assert!(from_config(&config).is_ok());
    }
}
