//! Execution results and their rendering.
//!
//! Both sandbox modes produce the same [`CommandResult`] value, and one
//! renderer turns it into the single string the MCP layer hands back to the
//! client. Stderr is never dropped when stdout is present, the exit code is
//! always surfaced, and timeout results carry a message distinguishable from
//! ordinary program output.

use std::time::Duration;

/// Output from a command executed in a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code from the command (0 typically indicates success).
    pub exit_code: i32,
}

impl CommandResult {
    /// Creates a result from captured output and an exit code.
    #[must_use]
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Creates a timeout result.
    ///
    /// `stdout` holds whatever partial output was captured before expiry
    /// (best effort, may be empty); `message` is the mode-specific timeout
    /// text; the exit code is fixed at 1.
    #[must_use]
    pub fn timeout(stdout: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: message.into(),
            exit_code: 1,
        }
    }

    /// Returns `true` if the command exited successfully (exit code 0).
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Renders the result for the LLM client.
    ///
    /// Sections are `Exit code:`, fenced `Output:` and fenced `Error:`,
    /// separated by blank lines. Empty streams are omitted; when both are
    /// empty the body is `No output`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut sections = vec![format!("Exit code: {}", self.exit_code)];

        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            sections.push(format!("Output:\n```\n{stdout}\n```"));
        }

        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            sections.push(format!("Error:\n```\n{stderr}\n```"));
        }

        if sections.len() == 1 {
            sections.push("No output".to_string());
        }

        sections.join("\n\n")
    }

    /// Merges stdout and stderr into one diagnostic blob.
    ///
    /// Used for lint output, where the interesting content may land on
    /// either stream and there is no meaningful exit-code story to tell.
    #[must_use]
    pub fn merged(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();

        match (stdout.is_empty(), stderr.is_empty()) {
            (false, false) => format!("{stdout}\nErrors:\n{stderr}"),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (true, true) => String::new(),
        }
    }
}

/// Timeout message for the local process sandbox.
#[must_use]
pub fn process_timeout_message(limit: Duration) -> String {
    format!("Execution terminated after {} seconds", limit.as_secs())
}

/// Timeout message for the remote shell sandbox.
pub const SHELL_TIMEOUT_MESSAGE: &str = "Command timed out";

/// Normalizes lint diagnostics for the client.
///
/// An empty diagnostic blob means the linter found nothing to complain
/// about.
#[must_use]
pub fn lint_summary(result: &CommandResult) -> String {
    let merged = result.merged();
    if merged.is_empty() {
        "No issues found!".to_string()
    } else {
        merged
    }
}
