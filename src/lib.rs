//! Sandbox Gateway - MCP server for web access and sandboxed execution.
//!
//! This crate gives LLM clients a small set of tools over MCP: fetching and
//! link-scraping web pages, and running untrusted, model-generated code or
//! shell commands under strict resource, privilege, and time isolation.
//!
//! The execution core supports two deployment modes behind one interface:
//! a local per-call process sandbox (private staging directory, allow-listed
//! environment, rlimits applied pre-exec, namespace isolation where the
//! platform provides it) and a remote persistent shell driven over a
//! prompt-framed text stream with screen-session multiplexing.
//!
//! # Example
//!
//! ```no_run
//! use sandbox_gateway::{config::GatewayConfig, server};
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let config = GatewayConfig::from_env()?;
//!
//!     // Serve MCP over stdio (or SSE, when configured)
//!     server::run(config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod sandbox;
pub mod server;
pub mod startup;
pub mod web;
pub mod workspace;

// Re-export commonly used types
pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use sandbox::{CommandResult, ExecutionRequest, Sandbox};
