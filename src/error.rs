//! Error types for the sandbox gateway.
//!
//! Uses thiserror for deriving std::error::Error and miette for rich diagnostics.
//!
//! The taxonomy follows the tool-call boundary: configuration errors are
//! surfaced to the MCP layer as structured errors (the client can tell a
//! misconfigured tool from a tool that ran and failed), while execution
//! failures become ordinary text results. Timeouts are result states, not
//! errors, and never appear here.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the application.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Gateway configuration error
    #[error("Configuration error")]
    #[diagnostic(code(gateway::config))]
    Config(#[from] ConfigError),

    /// Sandbox execution error
    #[error("Sandbox error")]
    #[diagnostic(code(gateway::sandbox))]
    Sandbox(#[from] SandboxError),

    /// Web fetch error
    #[error("Fetch error")]
    #[diagnostic(code(gateway::fetch))]
    Fetch(#[from] FetchError),

    /// Workspace tool error
    #[error("Workspace error")]
    #[diagnostic(code(gateway::workspace))]
    Workspace(#[from] WorkspaceError),

    /// MCP server error
    #[error("MCP server error")]
    #[diagnostic(code(gateway::server))]
    Server(#[from] ServerError),

    /// I/O error
    #[error("I/O error: {0}")]
    #[diagnostic(code(gateway::io))]
    Io(#[from] std::io::Error),
}

/// Errors in gateway configuration.
///
/// These are fatal to the call that hit them, reported immediately and never
/// retried.
#[derive(Error, Debug, Diagnostic)]
pub enum ConfigError {
    /// No sandbox backend is configured at all.
    #[error("No sandbox is configured on this server")]
    #[diagnostic(
        code(gateway::config::no_sandbox),
        help("Set SANDBOX (host:port), SANDBOX_SOCKET (path) or SANDBOX_PYTHON (interpreter path)")
    )]
    SandboxUnconfigured,

    /// The SANDBOX value does not parse as host:port.
    #[error("Invalid sandbox address '{given}'")]
    #[diagnostic(
        code(gateway::config::sandbox_address),
        help("Expected a host:port pair, e.g. mcp-sandbox:8080")
    )]
    InvalidSandboxAddress { given: String },

    /// The SSE listener address does not parse.
    #[error("Invalid SSE listener address '{given}'")]
    #[diagnostic(code(gateway::config::sse_address))]
    InvalidSseAddress { given: String },

    /// Lint was requested but no linter path is configured.
    #[error("No linter is configured on this server")]
    #[diagnostic(
        code(gateway::config::no_linter),
        help("Set SANDBOX_RUFF to the linter binary path")
    )]
    LinterUnconfigured,

    /// Lint was requested against the remote shell sandbox.
    #[error("Linting is only available with the local process sandbox")]
    #[diagnostic(code(gateway::config::lint_unavailable))]
    LintUnavailable,

    /// A screen session was requested against the local process sandbox.
    #[error("Screen sessions are only available with the remote shell sandbox")]
    #[diagnostic(code(gateway::config::screen_unavailable))]
    ScreenUnavailable,

    /// Search was requested but no SearXNG endpoint is configured.
    #[error("SearXNG query URL is not configured on the server.")]
    #[diagnostic(
        code(gateway::config::no_searxng),
        help("Set SEARXNG_QUERY_URL to the instance's search endpoint")
    )]
    SearchUnconfigured,

    /// An invalid search result format was requested.
    #[error("Invalid format '{given}'. Must be 'json', 'csv', or 'rss'.")]
    #[diagnostic(code(gateway::config::search_format))]
    InvalidSearchFormat { given: String },
}

/// Errors from the sandboxed execution subsystem.
///
/// Non-zero exit codes and timeouts are not errors here: both are ordinary
/// [`crate::sandbox::CommandResult`] states.
#[derive(Error, Debug, Diagnostic)]
pub enum SandboxError {
    /// Configuration problem detected at execution time.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    /// Failed to stage the untrusted script.
    #[error("Failed to stage script: {source}")]
    #[diagnostic(code(gateway::sandbox::staging))]
    Staging {
        #[source]
        source: std::io::Error,
    },

    /// Failed to spawn the sandboxed child process.
    ///
    /// Also raised when the resource limiter cannot apply a ceiling: the
    /// pre-exec hook aborts the child before any untrusted code runs.
    #[error("Failed to spawn sandboxed process '{}': {source}", program.display())]
    #[diagnostic(code(gateway::sandbox::spawn))]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed while waiting for or collecting output from the child.
    #[error("Failed to collect sandboxed process output: {source}")]
    #[diagnostic(code(gateway::sandbox::wait))]
    Wait {
        #[source]
        source: std::io::Error,
    },

    /// Remote shell connection error.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Shell(#[from] ShellError),
}

/// Errors from the remote shell connection.
#[derive(Error, Debug, Diagnostic)]
pub enum ShellError {
    /// Could not reach the remote shell. Distinct from a command timeout.
    #[error("Failed to connect to sandbox at {target}: {source}")]
    #[diagnostic(
        code(gateway::shell::connect),
        help("Check that the sandbox container is running and SANDBOX points at it")
    )]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// Stream read/write failure after the connection was established.
    #[error("Sandbox connection I/O error: {source}")]
    #[diagnostic(code(gateway::shell::io))]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// The command text cannot be quoted for the remote shell.
    #[error("Command cannot be sent to the shell: {reason}")]
    #[diagnostic(code(gateway::shell::command))]
    InvalidCommand { reason: String },
}

/// Errors from the web tools.
///
/// Messages mirror what the LLM client sees, so each variant renders the
/// offending URL.
#[derive(Error, Debug, Diagnostic)]
pub enum FetchError {
    /// Could not construct the HTTP client.
    #[error("Failed to build HTTP client: {detail}")]
    #[diagnostic(code(gateway::fetch::client))]
    Client { detail: String },

    /// The request timed out.
    #[error("Timeout while fetching {url}: {detail}")]
    #[diagnostic(code(gateway::fetch::timeout))]
    Timeout { url: String, detail: String },

    /// TCP/TLS level connection failure.
    #[error("Failed to connect to {url}: {detail}")]
    #[diagnostic(code(gateway::fetch::connect))]
    Connect { url: String, detail: String },

    /// Redirect loop or too-long redirect chain.
    #[error("Too many redirects while fetching {url}: {detail}")]
    #[diagnostic(code(gateway::fetch::redirects))]
    TooManyRedirects { url: String, detail: String },

    /// Non-success HTTP status.
    #[error("Failed to fetch {url}: HTTP {status} ({reason})")]
    #[diagnostic(code(gateway::fetch::status))]
    Status {
        url: String,
        status: u16,
        reason: String,
    },

    /// Success status but nothing in the body.
    #[error("Failed to fetch {url}: HTTP {status} with empty body")]
    #[diagnostic(code(gateway::fetch::empty))]
    EmptyBody { url: String, status: u16 },

    /// Any other network-level failure.
    #[error("Network error while fetching {url}: {detail}")]
    #[diagnostic(code(gateway::fetch::network))]
    Network { url: String, detail: String },

    /// The page yielded no extractable links.
    #[error("No links read on {url} - it may require JavaScript or authentication.")]
    #[diagnostic(code(gateway::fetch::no_links))]
    NoLinks { url: String },
}

/// Errors from the workspace tools.
#[derive(Error, Debug, Diagnostic)]
pub enum WorkspaceError {
    /// The path points (or resolves) outside the workspace root.
    #[error("Path cannot escape workspace root")]
    #[diagnostic(code(gateway::workspace::escape))]
    Escape,

    /// The path contains hidden or special components.
    #[error("Path cannot contain hidden/special components")]
    #[diagnostic(code(gateway::workspace::hidden))]
    HiddenComponent,

    /// Filesystem-level failure.
    #[error("File system error: {source}")]
    #[diagnostic(code(gateway::workspace::fs))]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// An external command (tree, git) failed.
    #[error("{prefix}: {output}")]
    #[diagnostic(code(gateway::workspace::command))]
    CommandFailed { prefix: String, output: String },

    /// Unknown write mode.
    #[error("Invalid mode '{given}'. Use 'overwrite' or 'patch'.")]
    #[diagnostic(code(gateway::workspace::mode))]
    InvalidMode { given: String },

    /// The patch does not apply to the current file content.
    #[error("Patch did not match file content")]
    #[diagnostic(code(gateway::workspace::patch))]
    PatchMismatch,
}

/// Errors from startup provisioning (git identity, SSH agent).
///
/// Provisioning failures are logged and never abort the server; these types
/// exist so the warnings carry precise causes.
#[derive(Error, Debug, Diagnostic)]
pub enum StartupError {
    /// A required external command is not on PATH.
    #[error("Required command not found: {name}")]
    #[diagnostic(code(gateway::startup::command))]
    CommandMissing { name: String },

    /// GIT_USER_NAME failed validation.
    #[error(
        "Git user name can only contain alphanumeric characters, spaces, dots, \
         underscores and hyphens"
    )]
    #[diagnostic(code(gateway::startup::git_name))]
    InvalidGitName,

    /// GIT_USER_EMAIL failed validation.
    #[error("Invalid git email address format")]
    #[diagnostic(code(gateway::startup::git_email))]
    InvalidGitEmail,

    /// GIT_SSH_KEY is not a PEM private key.
    #[error("Invalid SSH key format - must be a PEM formatted private key")]
    #[diagnostic(code(gateway::startup::ssh_key))]
    InvalidSshKey,

    /// git config invocation failed.
    #[error("Failed to configure git: {stderr}")]
    #[diagnostic(code(gateway::startup::git_config))]
    GitConfig { stderr: String },

    /// ssh-agent / ssh-add invocation failed.
    #[error("Failed to set up SSH agent: {detail}")]
    #[diagnostic(code(gateway::startup::ssh_agent))]
    SshAgent { detail: String },
}

/// Errors related to the MCP server.
#[derive(Error, Debug, Diagnostic)]
pub enum ServerError {
    /// Failed to initialize server
    #[error("Failed to initialize MCP server: {0}")]
    #[diagnostic(code(gateway::server::init))]
    InitializationFailed(String),

    /// Transport error
    #[error("Transport error: {0}")]
    #[diagnostic(code(gateway::server::transport))]
    Transport(String),
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
