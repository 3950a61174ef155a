//! Remote persistent-shell sandbox.
//!
//! The remote side is a plain bash reachable over TCP or a Unix socket
//! (socat bridging the shell's stdio onto the listener). Commands go out as
//! newline-terminated text; output comes back as lines and is framed by
//! detecting the shell prompt marker. There is no request multiplexing on
//! the wire, so a single [`ShellConnection`] must never carry two in-flight
//! commands; callers serialize access (the gateway opens a fresh connection
//! per tool call).
//!
//! Prompt framing is inherently fragile: output that mimics the prompt, or
//! binary output, can desynchronize it. Every read is therefore bounded by
//! a hard timeout, so desync degrades to a timeout-flagged result instead
//! of a hang.
//!
//! Long-running work uses screen sessions. A named session on the remote
//! shell outlives both the command and this connection; re-issuing the same
//! session name re-attaches to it. The session's visible buffer is
//! snapshotted to a log file and read back as the command output; the
//! snapshot is taken after a short settle delay and is not synchronized
//! with command completion.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::config::SandboxLocation;
use crate::error::{ConfigError, SandboxError, ShellError};
use crate::sandbox::report::{CommandResult, SHELL_TIMEOUT_MESSAGE};
use crate::sandbox::{ExecutionRequest, Sandbox};

/// Line prefix that marks a shell prompt on the wire.
pub const PROMPT_MARKER: &str = "$ ";

/// Remote path the screen snapshot is written to before being read back.
const SCREEN_LOG_PATH: &str = "/tmp/mcp_screen.log";

/// Prefix for generated screen session names.
const SCREEN_PREFIX: &str = "mcp_";

/// Length of the random suffix in generated screen session names.
const SCREEN_ID_LENGTH: usize = 8;

/// How long to wait for the banner prompt on a fresh connection.
const INITIAL_PROMPT_WAIT: Duration = Duration::from_secs(1);

/// Delay between stuffing a command into a screen session and snapshotting
/// its buffer.
const SCREEN_SETTLE: Duration = Duration::from_millis(100);

/// Bound on the bookkeeping exchanges around a command (prompt drains,
/// exit-code probe).
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// A duplex text stream to the remote shell.
pub struct ShellConnection {
    reader: Reader,
    writer: Writer,
}

impl ShellConnection {
    /// Connects to the remote shell at the configured location.
    ///
    /// # Errors
    ///
    /// Returns `ShellError::Connect` if the endpoint is unreachable. This is
    /// raised immediately and is distinct from a command timeout.
    #[instrument]
    pub async fn connect(location: &SandboxLocation) -> Result<Self, ShellError> {
        match location {
            SandboxLocation::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(|source| ShellError::Connect {
                        target: location.to_string(),
                        source,
                    })?;
                debug!(target = %location, "Connected to sandbox shell over TCP");
                Ok(Self::from_stream(stream))
            }
            SandboxLocation::Unix { path } => {
                let stream =
                    UnixStream::connect(path)
                        .await
                        .map_err(|source| ShellError::Connect {
                            target: location.to_string(),
                            source,
                        })?;
                debug!(target = %location, "Connected to sandbox shell over Unix socket");
                Ok(Self::from_stream(stream))
            }
        }
    }

    /// Wraps an established duplex stream. Used directly by tests.
    #[must_use]
    pub fn from_stream(
        stream: impl AsyncRead + AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(Box::new(read_half)),
            writer: Box::new(write_half),
        }
    }

    /// Closes the connection.
    ///
    /// # Errors
    ///
    /// Returns `ShellError::Io` if the shutdown handshake fails.
    pub async fn close(mut self) -> Result<(), ShellError> {
        self.writer.shutdown().await?;
        Ok(())
    }

    /// Runs a command and returns its output.
    ///
    /// `time_limit` bounds the wait for the command's own output. With a
    /// screen session name the command is injected into that session and
    /// the session's buffer snapshot is returned instead of direct output;
    /// an empty name asks for a generated one.
    ///
    /// A timeout is not an error: it yields a result flagged with
    /// [`SHELL_TIMEOUT_MESSAGE`], exit code 1 and whatever output was
    /// buffered.
    ///
    /// # Errors
    ///
    /// Returns `ShellError` only for stream-level failures (broken
    /// connection, unquotable command text).
    #[instrument(skip(self, command), fields(time_limit_s = time_limit.as_secs()))]
    pub async fn run_command(
        &mut self,
        command: &str,
        time_limit: Duration,
        screen: Option<&str>,
    ) -> Result<CommandResult, ShellError> {
        // Drain the banner prompt a fresh shell emits on connect. Silence is
        // tolerated: a reused connection is already sitting at a prompt we
        // consumed, and the command read below enforces the real limit.
        let mut banner = String::new();
        let _ = timeout(INITIAL_PROMPT_WAIT, self.read_until_prompt(&mut banner)).await;

        if let Some(session) = screen {
            return self.run_in_screen(command, session, time_limit).await;
        }

        self.write_line(command).await?;

        let mut stdout = String::new();
        if timeout(time_limit, self.read_until_prompt(&mut stdout))
            .await
            .is_err()
        {
            debug!("Command output wait timed out");
            return Ok(CommandResult::timeout(stdout, SHELL_TIMEOUT_MESSAGE));
        }

        let exit_code = self.read_exit_code().await;
        Ok(CommandResult::new(stdout, String::new(), exit_code))
    }

    /// Runs a command inside a (possibly new) screen session.
    ///
    /// Sequence on the wire: create-or-reattach, stuff the command text,
    /// settle, snapshot the visible buffer to [`SCREEN_LOG_PATH`], detach,
    /// read the log back. The exit code is reported as 0 because the
    /// snapshot is not synchronized with command completion.
    async fn run_in_screen(
        &mut self,
        command: &str,
        session: &str,
        time_limit: Duration,
    ) -> Result<CommandResult, ShellError> {
        let session = if session.is_empty() {
            generate_session_name()
        } else {
            session.to_string()
        };
        debug!(session = %session, "Running command in screen session");

        // Create a new detached session, or poke the existing one awake.
        self.control(&format!(
            "screen -dmS {session} 2>/dev/null || screen -S {session} -X stuff $'\\n'"
        ))
        .await?;

        // Stuff the command text, then a separate newline to submit it, so
        // the control channel itself stays line-framed.
        let stuffed = shlex::try_quote(command).map_err(|e| ShellError::InvalidCommand {
            reason: e.to_string(),
        })?;
        self.control(&format!("screen -S {session} -X stuff {stuffed}"))
            .await?;
        self.control(&format!("screen -S {session} -X stuff $'\\n'"))
            .await?;

        sleep(SCREEN_SETTLE).await;

        self.control(&format!(
            "screen -S {session} -X hardcopy {SCREEN_LOG_PATH}"
        ))
        .await?;
        self.control(&format!("screen -S {session} -X detach")).await?;

        self.write_line(&format!("cat {SCREEN_LOG_PATH}")).await?;

        let mut stdout = String::new();
        if timeout(time_limit, self.read_until_prompt(&mut stdout))
            .await
            .is_err()
        {
            return Ok(CommandResult::timeout(stdout, SHELL_TIMEOUT_MESSAGE));
        }

        Ok(CommandResult::new(stdout, String::new(), 0))
    }

    /// Sends one bookkeeping command and drains its output up to the next
    /// prompt, keeping the stream in sync for the following exchange.
    async fn control(&mut self, command: &str) -> Result<(), ShellError> {
        self.write_line(command).await?;
        let mut sink = String::new();
        let _ = timeout(CONTROL_TIMEOUT, self.read_until_prompt(&mut sink)).await;
        Ok(())
    }

    /// Captures the previous command's exit code with an `echo $?` probe.
    ///
    /// Best effort: a missing or non-numeric reply reads as exit code 1.
    async fn read_exit_code(&mut self) -> i32 {
        if self.write_line("echo $?").await.is_err() {
            return 1;
        }

        let mut reply = String::new();
        if timeout(CONTROL_TIMEOUT, self.read_until_prompt(&mut reply))
            .await
            .is_err()
        {
            return 1;
        }

        reply.trim().parse().unwrap_or(1)
    }

    async fn write_line(&mut self, line: &str) -> Result<(), ShellError> {
        trace!(len = line.len(), "Writing command line");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads lines into `out` until a prompt-marker line or EOF.
    ///
    /// The accumulated lines stay in `out` even if the caller's timeout
    /// cancels this future, which is what makes partial output reporting
    /// possible.
    async fn read_until_prompt(&mut self, out: &mut String) -> Result<(), ShellError> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = self.reader.read_until(b'\n', &mut line).await?;
            if n == 0 {
                break;
            }
            if line.starts_with(PROMPT_MARKER.as_bytes()) {
                break;
            }
            out.push_str(&String::from_utf8_lossy(&line));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ShellConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellConnection").finish_non_exhaustive()
    }
}

/// Generates a screen session name like `mcp_1a2b3c4d`.
fn generate_session_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{SCREEN_PREFIX}{}", &id[..SCREEN_ID_LENGTH])
}

/// Sandbox that dispatches every request to the remote shell.
///
/// A fresh connection is opened per request; the persistence boundary is
/// the remote screen session, not the socket.
#[derive(Debug, Clone)]
pub struct RemoteShellSandbox {
    location: SandboxLocation,
    default_time_limit: Duration,
}

impl RemoteShellSandbox {
    /// Creates a remote shell sandbox for the given endpoint.
    #[must_use]
    pub fn new(location: SandboxLocation) -> Self {
        Self {
            location,
            default_time_limit: crate::config::DEFAULT_TIME_LIMIT,
        }
    }

    /// Overrides the default command time limit.
    #[must_use]
    pub fn with_default_time_limit(mut self, limit: Duration) -> Self {
        self.default_time_limit = limit;
        self
    }
}

#[async_trait]
impl Sandbox for RemoteShellSandbox {
    async fn run(&self, request: &ExecutionRequest) -> Result<CommandResult, SandboxError> {
        if request.lint {
            return Err(ConfigError::LintUnavailable.into());
        }

        let mut conn = ShellConnection::connect(&self.location).await?;
        let time_limit = request.time_limit.unwrap_or(self.default_time_limit);

        let result = conn
            .run_command(&request.code, time_limit, request.screen.as_deref())
            .await;
        let _ = conn.close().await;

        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_session_name_shape() {
        let name = generate_session_name();
        assert!(name.starts_with(SCREEN_PREFIX));
        assert_eq!(name.len(), SCREEN_PREFIX.len() + SCREEN_ID_LENGTH);

        let other = generate_session_name();
        assert_ne!(name, other);
    }

    #[tokio::test]
    async fn test_read_until_prompt_collects_prior_lines() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut conn = ShellConnection::from_stream(client);

        server
            .write_all(b"line one\nline two\n$ \n")
            .await
            .expect("write failed");

        let mut out = String::new();
        conn.read_until_prompt(&mut out).await.expect("read failed");
        assert_eq!(out, "line one\nline two\n");
    }

    #[tokio::test]
    async fn test_read_until_prompt_stops_at_eof() {
        let (client, server) = tokio::io::duplex(1024);
        let mut conn = ShellConnection::from_stream(client);
        drop(server);

        let mut out = String::new();
        conn.read_until_prompt(&mut out).await.expect("read failed");
        assert!(out.is_empty());
    }
}
