//! Wire-protocol tests for the remote shell sandbox.
//!
//! A tiny in-process TCP fixture stands in for the socat/bash deployment:
//! it greets with a prompt, answers a handful of commands, tracks the last
//! exit status for `echo $?` probes, and serves prompt-framed lines the way
//! the real shell does.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use sandbox_gateway::config::{GatewayConfig, SandboxLocation};
use sandbox_gateway::error::{ConfigError, SandboxError, ShellError};
use sandbox_gateway::sandbox::{self, ExecutionRequest, RemoteShellSandbox, Sandbox};

const PROMPT: &[u8] = b"$ \n";

/// Starts the fixture shell and returns its address.
async fn spawn_fixture() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind fixture listener");
    let addr = listener.local_addr().expect("no local addr");

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(handle_client(stream));
        }
    });

    addr
}

async fn handle_client(stream: TcpStream) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut last_status: i32 = 0;

    // A fresh shell greets with its prompt.
    let _ = write_half.write_all(PROMPT).await;

    while let Ok(Some(line)) = lines.next_line().await {
        let command = line.trim();

        if command == "echo $?" {
            let reply = format!("{last_status}\n");
            let _ = write_half.write_all(reply.as_bytes()).await;
            let _ = write_half.write_all(PROMPT).await;
            continue;
        }

        if let Some(text) = command.strip_prefix("echo ") {
            let reply = format!("{text}\n");
            let _ = write_half.write_all(reply.as_bytes()).await;
            last_status = 0;
        } else if let Some(secs) = command
            .strip_prefix("sleep ")
            .and_then(|s| s.parse::<u64>().ok())
        {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            last_status = 0;
        } else if command == "false" {
            last_status = 1;
        } else if command == "cat /tmp/mcp_screen.log" {
            let _ = write_half.write_all(b"screen session output\n").await;
            last_status = 0;
        } else if command.starts_with("screen ") {
            last_status = 0;
        } else {
            last_status = 0;
        }

        let _ = write_half.write_all(PROMPT).await;
    }
}

async fn fixture_sandbox() -> RemoteShellSandbox {
    let addr = spawn_fixture().await;
    RemoteShellSandbox::new(SandboxLocation::Tcp {
        host: addr.ip().to_string(),
        port: addr.port(),
    })
}

#[tokio::test]
async fn test_echo_roundtrip() {
    let sandbox = fixture_sandbox().await;
    let request = ExecutionRequest::new("echo hi").with_time_limit(Duration::from_secs(2));

    let result = sandbox.run(&request).await.expect("run failed");

    assert!(result.stdout.contains("hi"), "stdout was: {}", result.stdout);
    assert_eq!(result.exit_code, 0);
    assert!(result.success());
}

#[tokio::test]
async fn test_exit_code_is_captured() {
    let sandbox = fixture_sandbox().await;
    let request = ExecutionRequest::new("false").with_time_limit(Duration::from_secs(2));

    let result = sandbox.run(&request).await.expect("run failed");

    assert_eq!(result.exit_code, 1);
    assert!(!result.success());
}

#[tokio::test]
async fn test_timeout_returns_promptly_with_flagged_result() {
    let sandbox = fixture_sandbox().await;
    let request = ExecutionRequest::new("sleep 10").with_time_limit(Duration::from_secs(1));

    let start = Instant::now();
    let result = sandbox.run(&request).await.expect("run failed");
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_secs(4),
        "timeout took too long: {elapsed:?}"
    );
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "Command timed out");
    assert!(result.render().contains("Command timed out"));
}

#[tokio::test]
async fn test_screen_session_returns_snapshot() {
    let sandbox = fixture_sandbox().await;
    let request = ExecutionRequest::new("./long_task.sh")
        .with_time_limit(Duration::from_secs(2))
        .with_screen("mcp_test");

    let result = sandbox.run(&request).await.expect("run failed");

    assert!(
        result.stdout.contains("screen session output"),
        "snapshot missing: {}",
        result.stdout
    );
    assert_eq!(result.exit_code, 0);
}

#[tokio::test]
async fn test_generated_screen_session_accepted() {
    let sandbox = fixture_sandbox().await;
    // Empty name requests a generated mcp_-prefixed session.
    let request = ExecutionRequest::new("./long_task.sh")
        .with_time_limit(Duration::from_secs(2))
        .with_screen("");

    let result = sandbox.run(&request).await.expect("run failed");
    assert!(result.stdout.contains("screen session output"));
}

#[tokio::test]
async fn test_connect_failure_is_not_a_timeout() {
    // Bind and immediately drop to get a port nobody is listening on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind");
        listener.local_addr().expect("no local addr")
    };

    let sandbox = RemoteShellSandbox::new(SandboxLocation::Tcp {
        host: addr.ip().to_string(),
        port: addr.port(),
    });

    let result = sandbox.run(&ExecutionRequest::new("echo hi")).await;
    assert!(matches!(
        result,
        Err(SandboxError::Shell(ShellError::Connect { .. }))
    ));
}

#[tokio::test]
async fn test_lint_rejected_on_remote_shell() {
    let sandbox = fixture_sandbox().await;
    let result = sandbox
        .run(&ExecutionRequest::new("print('x')").with_lint())
        .await;

    assert!(matches!(
        result,
        Err(SandboxError::Config(ConfigError::LintUnavailable))
    ));
}

#[tokio::test]
async fn test_sequential_commands_stay_in_sync() {
    let sandbox = fixture_sandbox().await;

    for expected in ["one", "two", "three"] {
        let request = ExecutionRequest::new(format!("echo {expected}"))
            .with_time_limit(Duration::from_secs(2));
        let result = sandbox.run(&request).await.expect("run failed");
        assert!(
            result.stdout.contains(expected),
            "lost sync on '{expected}': {}",
            result.stdout
        );
        assert_eq!(result.exit_code, 0);
    }
}

#[tokio::test]
async fn test_selection_unconfigured_is_config_error() {
    let result = sandbox::from_config(&GatewayConfig::default());
    assert!(matches!(result, Err(ConfigError::SandboxUnconfigured)));
}

#[tokio::test]
async fn test_selection_picks_remote_shell() {
    let addr = spawn_fixture().await;
    let config = GatewayConfig::default()
        .with_sandbox_addr(&format!("127.0.0.1:{}", addr.port()))
        .expect("valid addr");

    let sandbox = sandbox::from_config(&config).expect("selection failed");
    let result = sandbox
        .run(&ExecutionRequest::new("echo selected").with_time_limit(Duration::from_secs(2)))
        .await
        .expect("run failed");

    assert!(result.stdout.contains("selected"));
}
