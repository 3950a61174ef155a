//! Gateway configuration.
//!
//! Configuration is read from the environment (the deployment surface used by
//! the Docker images this server ships in) and can be overridden per-field
//! from the command line. Use the builder methods to customize behavior.
//!
//! Recognized environment variables:
//!
//! - `SANDBOX` - remote shell sandbox as a `host:port` pair
//! - `SANDBOX_SOCKET` - remote shell sandbox as a Unix socket path
//! - `SANDBOX_PYTHON` - interpreter path for the local process sandbox
//! - `SANDBOX_RUFF` - linter path for lint-mode requests
//! - `SSE_HOST` / `SSE_PORT` - serve over SSE instead of stdio
//! - `USER_AGENT` - User-Agent header for the web tools
//! - `SEARXNG_QUERY_URL` - SearXNG endpoint for the search tool

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Fallback User-Agent for web requests when none is configured.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux i686; rv:135.0) Gecko/20100101 Firefox/135.0";

/// Default wall-clock limit for a single sandboxed execution.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(5);

/// Default root directory for the workspace tools.
pub const DEFAULT_WORKSPACE_DIR: &str = "/workspace";

/// Where the remote shell sandbox listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxLocation {
    /// TCP endpoint, e.g. `mcp-sandbox:8080`.
    Tcp { host: String, port: u16 },
    /// Local Unix socket path.
    Unix { path: PathBuf },
}

impl SandboxLocation {
    /// Parses a `host:port` pair as given in the `SANDBOX` variable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSandboxAddress` if the value is not a
    /// `host:port` pair with a numeric port.
    pub fn parse_tcp(value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidSandboxAddress {
            given: value.to_string(),
        };

        let (host, port_str) = value.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port_str.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for SandboxLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix { path } => write!(f, "{}", path.display()),
        }
    }
}

/// Configuration for the gateway server.
///
/// # Example
///
/// ```
/// use sandbox_gateway::config::GatewayConfig;
/// use std::time::Duration;
///
/// let config = GatewayConfig::default()
///     .with_interpreter("/usr/bin/python3")
///     .with_linter("/usr/bin/ruff")
///     .with_default_time_limit(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Remote shell sandbox endpoint, if any.
    pub sandbox_location: Option<SandboxLocation>,

    /// Interpreter used by the local process sandbox.
    pub interpreter: Option<PathBuf>,

    /// Linter used for lint-mode requests.
    pub linter: Option<PathBuf>,

    /// SSE listener as (host, port); stdio transport when absent.
    pub sse: Option<(String, u16)>,

    /// User-Agent header for the web tools.
    pub user_agent: String,

    /// SearXNG endpoint for the search tool.
    pub searxng_url: Option<String>,

    /// Root directory for the workspace tools.
    pub workspace_dir: PathBuf,

    /// Time limit applied when a request does not carry its own.
    pub default_time_limit: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sandbox_location: None,
            interpreter: None,
            linter: None,
            sse: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            searxng_url: None,
            workspace_dir: PathBuf::from(DEFAULT_WORKSPACE_DIR),
            default_time_limit: DEFAULT_TIME_LIMIT,
        }
    }
}

impl GatewayConfig {
    /// Builds a configuration from the process environment.
    ///
    /// A TCP `SANDBOX` address takes precedence over `SANDBOX_SOCKET` when
    /// both are set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSandboxAddress` if `SANDBOX` is set but
    /// malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(addr) = env::var("SANDBOX") {
            config.sandbox_location = Some(SandboxLocation::parse_tcp(&addr)?);
        } else if let Some(path) = env::var_os("SANDBOX_SOCKET") {
            config.sandbox_location = Some(SandboxLocation::Unix {
                path: PathBuf::from(path),
            });
        }

        if let Some(path) = env::var_os("SANDBOX_PYTHON") {
            config.interpreter = Some(PathBuf::from(path));
        }
        if let Some(path) = env::var_os("SANDBOX_RUFF") {
            config.linter = Some(PathBuf::from(path));
        }

        if let (Ok(host), Ok(port)) = (env::var("SSE_HOST"), env::var("SSE_PORT")) {
            let port = port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidSseAddress {
                    given: format!("{host}:{port}"),
                })?;
            config.sse = Some((host, port));
        }

        if let Ok(agent) = env::var("USER_AGENT") {
            if !agent.is_empty() {
                config.user_agent = agent;
            }
        }

        if let Ok(url) = env::var("SEARXNG_QUERY_URL") {
            if !url.is_empty() {
                config.searxng_url = Some(url);
            }
        }

        Ok(config)
    }

    /// Sets the remote shell sandbox from a `host:port` pair.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSandboxAddress` on a malformed pair.
    pub fn with_sandbox_addr(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.sandbox_location = Some(SandboxLocation::parse_tcp(addr)?);
        Ok(self)
    }

    /// Sets the remote shell sandbox to a Unix socket path.
    #[must_use]
    pub fn with_sandbox_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.sandbox_location = Some(SandboxLocation::Unix { path: path.into() });
        self
    }

    /// Sets the interpreter for the local process sandbox.
    #[must_use]
    pub fn with_interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(path.into());
        self
    }

    /// Sets the linter for lint-mode requests.
    #[must_use]
    pub fn with_linter(mut self, path: impl Into<PathBuf>) -> Self {
        self.linter = Some(path.into());
        self
    }

    /// Serves over SSE on the given host and port instead of stdio.
    #[must_use]
    pub fn with_sse(mut self, host: impl Into<String>, port: u16) -> Self {
        self.sse = Some((host.into(), port));
        self
    }

    /// Sets the User-Agent for web requests.
    #[must_use]
    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Sets the SearXNG endpoint for the search tool.
    #[must_use]
    pub fn with_searxng_url(mut self, url: impl Into<String>) -> Self {
        self.searxng_url = Some(url.into());
        self
    }

    /// Sets the workspace root directory.
    #[must_use]
    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = dir.into();
        self
    }

    /// Sets the default execution time limit.
    #[must_use]
    pub fn with_default_time_limit(mut self, limit: Duration) -> Self {
        self.default_time_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_valid() {
        let location = SandboxLocation::parse_tcp("mcp-sandbox:8080").expect("should parse");
        assert_eq!(
            location,
            SandboxLocation::Tcp {
                host: "mcp-sandbox".to_string(),
                port: 8080
            }
        );
        assert_eq!(location.to_string(), "mcp-sandbox:8080");
    }

    #[test]
    fn test_parse_tcp_rejects_missing_port() {
        let result = SandboxLocation::parse_tcp("mcp-sandbox");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSandboxAddress { .. })
        ));
    }

    #[test]
    fn test_parse_tcp_rejects_bad_port() {
        assert!(SandboxLocation::parse_tcp("host:notaport").is_err());
        assert!(SandboxLocation::parse_tcp("host:99999").is_err());
        assert!(SandboxLocation::parse_tcp(":8080").is_err());
    }

    #[test]
    fn test_parse_tcp_ipv6_uses_last_colon() {
        // rsplit keeps the final segment as the port even with colons in the host
        let location = SandboxLocation::parse_tcp("::1:8080").expect("should parse");
        assert_eq!(
            location,
            SandboxLocation::Tcp {
                host: "::1".to_string(),
                port: 8080
            }
        );
    }

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(config.sandbox_location.is_none());
        assert!(config.interpreter.is_none());
        assert!(config.linter.is_none());
        assert!(config.sse.is_none());
        assert!(config.searxng_url.is_none());
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.workspace_dir, PathBuf::from(DEFAULT_WORKSPACE_DIR));
        assert_eq!(config.default_time_limit, DEFAULT_TIME_LIMIT);
    }

    #[test]
    fn test_builder_chain() {
        let config = GatewayConfig::default()
            .with_interpreter("/usr/bin/python3")
            .with_linter("/usr/bin/ruff")
            .with_sse("0.0.0.0", 3001)
            .with_user_agent("test-agent/1.0")
            .with_default_time_limit(Duration::from_secs(10));

        assert_eq!(config.interpreter, Some(PathBuf::from("/usr/bin/python3")));
        assert_eq!(config.linter, Some(PathBuf::from("/usr/bin/ruff")));
        assert_eq!(config.sse, Some(("0.0.0.0".to_string(), 3001)));
        assert_eq!(config.user_agent, "test-agent/1.0");
        assert_eq!(config.default_time_limit, Duration::from_secs(10));
    }

    #[test]
    fn test_with_sandbox_addr() {
        let config = GatewayConfig::default()
            .with_sandbox_addr("127.0.0.1:9999")
            .expect("should parse");
        assert_eq!(
            config.sandbox_location,
            Some(SandboxLocation::Tcp {
                host: "127.0.0.1".to_string(),
                port: 9999
            })
        );
    }

    #[test]
    fn test_with_sandbox_socket() {
        let config = GatewayConfig::default().with_sandbox_socket("/run/sandbox.sock");
        assert_eq!(
            config.sandbox_location,
            Some(SandboxLocation::Unix {
                path: PathBuf::from("/run/sandbox.sock")
            })
        );
    }
}
