//! Sandbox Gateway - Entry Point
//!
//! This is the main entry point for the MCP server binary.

use std::path::PathBuf;

use clap::Parser;
use miette::Result;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

use sandbox_gateway::{config::GatewayConfig, server, startup};

/// Sandbox Gateway - Give your LLM access to external tools.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Remote shell sandbox as a TCP host:port pair (e.g. mcp-sandbox:8080)
    #[arg(long)]
    sandbox: Option<String>,

    /// Remote shell sandbox as a Unix socket path
    #[arg(long)]
    sandbox_socket: Option<PathBuf>,

    /// Interpreter used by the local process sandbox
    #[arg(long)]
    python: Option<PathBuf>,

    /// Linter used for lint-mode requests
    #[arg(long)]
    ruff: Option<PathBuf>,

    /// SSE listening address (e.g. 0.0.0.0)
    #[arg(long)]
    sse_host: Option<String>,

    /// SSE listening port (e.g. 3001)
    #[arg(long)]
    sse_port: Option<u16>,

    /// Custom User-Agent string for web requests
    #[arg(long)]
    user_agent: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    // MCP requires that logs go to stderr (stdout is for JSON-RPC)
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    info!("Sandbox Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Provisioning mutates the process environment, so it has to finish
    // while we are still single-threaded, before the runtime exists.
    startup::secure_startup();

    let mut config = GatewayConfig::from_env()?;

    if let Some(addr) = &args.sandbox {
        config = config.with_sandbox_addr(addr)?;
    }
    if let Some(path) = args.sandbox_socket {
        config = config.with_sandbox_socket(path);
    }
    if let Some(path) = args.python {
        config = config.with_interpreter(path);
    }
    if let Some(path) = args.ruff {
        config = config.with_linter(path);
    }
    if let (Some(host), Some(port)) = (args.sse_host.clone(), args.sse_port) {
        config = config.with_sse(host, port);
    }
    if let Some(agent) = args.user_agent {
        config = config.with_user_agent(agent);
    }

    let runtime = tokio::runtime::Runtime::new().map_err(sandbox_gateway::Error::Io)?;
    runtime.block_on(server::run(config))?;

    Ok(())
}
