//! MCP server handler implementation.
//!
//! Tool results are always text, even for failed executions; structured MCP
//! errors are reserved for configuration problems and web-layer failures,
//! so a client can tell "tool misconfigured" from "tool ran and failed".

use std::sync::Arc;
use std::time::Duration;

use rmcp::{
    ServiceExt, schemars,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{CallToolResult, Content, ErrorData as McpError, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::{ConfigError, Error, Result as GatewayResult, SandboxError, ServerError};
use crate::sandbox::{self, ExecutionRequest, Sandbox, lint_summary};
use crate::web::{self, SearchParams, WebClient};
use crate::workspace::{DEFAULT_READ_LIMIT, Workspace};

fn default_time_limit() -> u64 {
    crate::config::DEFAULT_TIME_LIMIT.as_secs()
}

fn default_max_links() -> usize {
    100
}

fn default_true() -> bool {
    true
}

/// Arguments for the `execute` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ExecuteRequest {
    /// Code or shell command(s) to run in the sandbox.
    pub code: String,
    /// Seconds to wait for output (0 means the server default).
    #[serde(default = "default_time_limit")]
    pub time_limit: u64,
    /// Lint the code instead of executing it.
    #[serde(default)]
    pub lint: bool,
    /// Screen session name for long-running work on the remote shell;
    /// an empty string asks for a generated session.
    #[serde(default)]
    pub screen: Option<String>,
}

/// Arguments for the `fetch` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FetchRequest {
    /// URL to fetch.
    pub url: String,
    /// Max characters to return (0 is unlimited).
    #[serde(default)]
    pub max_length: usize,
    /// Get raw content instead of cleaning/extracting to markdown.
    #[serde(default)]
    pub raw: bool,
}

/// Arguments for the `links` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct LinksRequest {
    /// URL to scrape for links.
    pub url: String,
    /// Maximum number of URLs to return.
    #[serde(default = "default_max_links")]
    pub max_links: usize,
    /// Include the anchor text for each link.
    #[serde(default = "default_true")]
    pub titles: bool,
}

/// Arguments for the `search` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchRequest {
    /// The search query string.
    pub q: String,
    /// Comma-separated result categories.
    #[serde(default)]
    pub categories: Option<String>,
    /// Comma-separated engines to query.
    #[serde(default)]
    pub engines: Option<String>,
    /// Result language code (e.g. "en").
    #[serde(default)]
    pub language: Option<String>,
    /// Result page number.
    #[serde(default)]
    pub pageno: Option<u32>,
    /// Time range filter (day, month, year).
    #[serde(default)]
    pub time_range: Option<String>,
    /// Result format: json, csv or rss (default json).
    #[serde(default)]
    pub format: Option<String>,
    /// Safe-search level (0-2).
    #[serde(default)]
    pub safesearch: Option<u8>,
}

/// Arguments for the `workspace_tree` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct WorkspaceTreeRequest {
    /// Subdirectory relative to the workspace root.
    #[serde(default = "default_dot")]
    pub path: String,
}

/// Arguments for the `workspace_read` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct WorkspaceReadRequest {
    /// File paths relative to the workspace root.
    pub files: Vec<String>,
    /// Maximum bytes to read per file (0 means no limit).
    #[serde(default = "default_read_limit")]
    pub max_length: usize,
}

/// Arguments for the `workspace_write` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct WorkspaceWriteRequest {
    /// File path relative to the workspace root.
    pub path: String,
    /// New file content, or a diff patch to apply.
    pub content: String,
    /// Either "overwrite" to replace the file or "patch" to apply a diff.
    #[serde(default = "default_write_mode")]
    pub mode: String,
}

/// Arguments for the `workspace_git` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct WorkspaceGitRequest {
    /// Full git command to execute (e.g. "git status").
    pub command: String,
    /// Working directory relative to the workspace root.
    #[serde(default = "default_dot")]
    pub cwd: String,
}

fn default_dot() -> String {
    ".".to_string()
}

fn default_read_limit() -> usize {
    DEFAULT_READ_LIMIT
}

fn default_write_mode() -> String {
    "overwrite".to_string()
}

/// The MCP gateway server.
#[derive(Clone)]
pub struct GatewayServer {
    tool_router: ToolRouter<Self>,
    sandbox: Option<Arc<dyn Sandbox>>,
    web: WebClient,
    workspace: Workspace,
    searxng_url: Option<String>,
}

impl GatewayServer {
    /// Builds the server, selecting the sandbox mode from configuration.
    ///
    /// A completely unconfigured sandbox is tolerated here: the web tools
    /// still work, and `execute` reports the configuration error per call.
    ///
    /// # Errors
    ///
    /// Returns configuration errors other than "no sandbox", and web client
    /// construction failures.
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let sandbox = match sandbox::from_config(config) {
            Ok(sandbox) => Some(sandbox),
            Err(ConfigError::SandboxUnconfigured) => {
                warn!("No sandbox configured; the execute tool will report an error");
                None
            }
            Err(other) => return Err(other.into()),
        };

        let web = WebClient::new(&config.user_agent)?;

        Ok(Self {
            tool_router: Self::tool_router(),
            sandbox,
            web,
            workspace: Workspace::new(config.workspace_dir.clone()),
            searxng_url: config.searxng_url.clone(),
        })
    }
}

/// Maps a workspace failure onto the tool boundary.
fn workspace_error(err: crate::error::WorkspaceError) -> McpError {
    McpError::internal_error(err.to_string(), None)
}

#[tool_router]
impl GatewayServer {
    /// Execute code or shell commands in the sandbox environment.
    #[tool(
        description = "Execute code or shell commands in an isolated sandbox environment. \
                       Set `lint` to check the code with a linter instead of running it. \
                       Pass `screen` to keep long-running work alive in a named session \
                       that persists between requests."
    )]
    async fn execute(
        &self,
        Parameters(request): Parameters<ExecuteRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let Some(sandbox) = self.sandbox.as_ref() else {
            return Err(McpError::invalid_params(
                ConfigError::SandboxUnconfigured.to_string(),
                None,
            ));
        };

        let mut execution = ExecutionRequest::new(request.code);
        if request.time_limit > 0 {
            execution = execution.with_time_limit(Duration::from_secs(request.time_limit));
        }
        if request.lint {
            execution = execution.with_lint();
        }
        if let Some(session) = request.screen {
            execution = execution.with_screen(session);
        }

        debug!(lint = execution.lint, "Dispatching execution request");

        match sandbox.run(&execution).await {
            Ok(result) => {
                let text = if execution.lint {
                    lint_summary(&result)
                } else {
                    result.render()
                };
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(SandboxError::Config(err)) => {
                Err(McpError::invalid_params(err.to_string(), None))
            }
            Err(err) => Ok(CallToolResult::success(vec![Content::text(format!(
                "Execution failed: {err}"
            ))])),
        }
    }

    /// Fetch a web page as cleaned-up markdown.
    #[tool(
        description = "Read content from a real internet URL. By default, this tool attempts \
                       to clean pages and format in markdown for efficiency, removing \
                       non-content like navigation or ads to make your job easier. If asked \
                       to find something on a website, you can combine with the `links` tool \
                       to explore a website to find the content you need."
    )]
    async fn fetch(
        &self,
        Parameters(request): Parameters<FetchRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let content = web::fetch(&self.web, &request.url, request.max_length, request.raw)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(content)]))
    }

    /// List the links found on a web page.
    #[tool(
        description = "Fetch a list of links from a webpage. Useful to discover related \
                       pages and understand the structure when exploring a website. By \
                       default, includes the text from the link, which may provide helpful \
                       context. You could then `fetch` URLs to see the content, as you're \
                       not limited in how many tools you can use."
    )]
    async fn links(
        &self,
        Parameters(request): Parameters<LinksRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let listing = web::links(&self.web, &request.url, request.max_links, request.titles)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(listing)]))
    }

    /// Search the web through a SearXNG instance.
    #[tool(
        description = "Search the web using the configured SearXNG instance. Returns the \
                       raw search results (JSON by default). Supports SearXNG parameters \
                       such as categories, engines, language, pageno, time_range and \
                       safesearch."
    )]
    async fn search(
        &self,
        Parameters(request): Parameters<SearchRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let params = SearchParams {
            categories: request.categories,
            engines: request.engines,
            language: request.language,
            pageno: request.pageno,
            time_range: request.time_range,
            format: request.format,
            safesearch: request.safesearch,
        };

        match web::search(&self.web, self.searxng_url.as_deref(), &request.q, &params).await {
            Ok(results) => Ok(CallToolResult::success(vec![Content::text(results)])),
            Err(Error::Config(err)) => Err(McpError::invalid_params(err.to_string(), None)),
            Err(err) => Err(McpError::internal_error(
                format!("SearXNG query failed: {err}"),
                None,
            )),
        }
    }

    /// List the workspace directory tree.
    #[tool(
        description = "List files and directories in the persistent workspace as JSON \
                       (tree output), skipping anything ignored by git."
    )]
    async fn workspace_tree(
        &self,
        Parameters(request): Parameters<WorkspaceTreeRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let listing = self
            .workspace
            .tree(&request.path)
            .await
            .map_err(workspace_error)?;
        Ok(CallToolResult::success(vec![Content::text(listing)]))
    }

    /// Read files from the workspace.
    #[tool(
        description = "Read the contents of files from the persistent workspace. Returns \
                       a JSON map of file paths to their contents, with per-file errors \
                       for anything missing."
    )]
    async fn workspace_read(
        &self,
        Parameters(request): Parameters<WorkspaceReadRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let contents = self
            .workspace
            .read(&request.files, request.max_length)
            .await
            .map_err(workspace_error)?;
        Ok(CallToolResult::success(vec![Content::text(contents)]))
    }

    /// Write or patch a file in the workspace.
    #[tool(
        description = "Write or update a file in the persistent workspace. Mode \
                       'overwrite' replaces the file entirely; mode 'patch' applies a \
                       unified diff patch to the existing content."
    )]
    async fn workspace_write(
        &self,
        Parameters(request): Parameters<WorkspaceWriteRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let message = self
            .workspace
            .write(&request.path, &request.content, &request.mode)
            .await
            .map_err(workspace_error)?;
        Ok(CallToolResult::success(vec![Content::text(message)]))
    }

    /// Run a git command in the workspace.
    #[tool(
        description = "Execute a git command within the persistent workspace (e.g. \
                       'git clone git@github.com:user/repo.git'). Command failures are \
                       returned as text."
    )]
    async fn workspace_git(
        &self,
        Parameters(request): Parameters<WorkspaceGitRequest>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let output = self
            .workspace
            .git(&request.command, &request.cwd)
            .await
            .map_err(workspace_error)?;
        Ok(CallToolResult::success(vec![Content::text(output)]))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for GatewayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Gateway for web access and sandboxed execution. Use `fetch`, `links` and \
                 `search` to read the web, `execute` to run code or shell commands in an \
                 isolated sandbox, and the `workspace_*` tools to keep files in a \
                 persistent workspace."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Run the MCP server over the transport the configuration selects.
///
/// stdio by default; SSE when a listener address is configured. Logs must
/// already be routed to stderr, since stdout carries JSON-RPC in stdio
/// mode.
///
/// # Errors
///
/// Returns error if server initialization or transport fails.
pub async fn run(config: GatewayConfig) -> GatewayResult<()> {
    let server = GatewayServer::new(&config)?;

    match &config.sse {
        Some((host, port)) => serve_sse(server, host, *port).await,
        None => serve_stdio(server).await,
    }
}

async fn serve_stdio(server: GatewayServer) -> GatewayResult<()> {
    info!("Starting MCP gateway on stdio");

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| ServerError::InitializationFailed(e.to_string()))?;

    info!("Server initialized, waiting for requests");

    service
        .waiting()
        .await
        .map_err(|e| ServerError::Transport(e.to_string()))?;

    info!("Server shutdown complete");
    Ok(())
}

async fn serve_sse(server: GatewayServer, host: &str, port: u16) -> GatewayResult<()> {
    use rmcp::transport::sse_server::SseServer;

    let addr = format!("{host}:{port}")
        .parse()
        .map_err(|_| ConfigError::InvalidSseAddress {
            given: format!("{host}:{port}"),
        })?;

    info!(%addr, "Starting MCP gateway over SSE");

    let cancel = SseServer::serve(addr)
        .await
        .map_err(|e| ServerError::InitializationFailed(e.to_string()))?
        .with_service(move || server.clone());

    tokio::signal::ctrl_c().await?;
    cancel.cancel();

    info!("Server shutdown complete");
    Ok(())
}
