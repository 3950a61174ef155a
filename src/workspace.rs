//! Persistent workspace file operations.
//!
//! The workspace is a single directory (by default `/workspace`, so a
//! Docker volume keeps it across restarts) that the listing, read, write
//! and git tools operate in. Every incoming path is sanitised before use:
//! no absolute paths, no escape above the root, no hidden or special
//! components. Sanitisation is lexical, so it also covers paths that do
//! not exist yet.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use serde_json::json;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::WorkspaceError;

/// Default byte limit per file for workspace reads.
pub const DEFAULT_READ_LIMIT: usize = 65_536;

/// Handle on the workspace root directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Creates a handle for the given root directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the workspace root, creating it if needed.
    fn ensure_root(&self) -> Result<&Path, WorkspaceError> {
        std::fs::create_dir_all(&self.root)?;
        Ok(&self.root)
    }

    /// Sanitises a path so it cannot escape the workspace.
    ///
    /// Returns the path relative to the workspace root.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceError::Escape` for absolute paths and any `..`
    /// traversal above the root, and `WorkspaceError::HiddenComponent` for
    /// dot-prefixed components.
    pub fn sanitise(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let path = path.as_ref();

        if path.is_absolute() || path.starts_with("..") {
            return Err(WorkspaceError::Escape);
        }

        let mut clean = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    if part.to_string_lossy().starts_with('.') {
                        return Err(WorkspaceError::HiddenComponent);
                    }
                    clean.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if !clean.pop() {
                        return Err(WorkspaceError::Escape);
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(WorkspaceError::Escape);
                }
            }
        }

        Ok(clean)
    }

    /// Lists files and directories with the `tree` command.
    ///
    /// # Errors
    ///
    /// Returns sanitisation errors and `WorkspaceError::CommandFailed` if
    /// the tree command fails.
    #[instrument(skip(self))]
    pub async fn tree(&self, path: &str) -> Result<String, WorkspaceError> {
        let mut target = self.sanitise(path)?;
        if target.as_os_str().is_empty() {
            target = PathBuf::from(".");
        }
        let root = self.ensure_root()?.to_path_buf();

        run_command(
            "tree",
            &[
                "-aiJ".as_ref(),
                "-I".as_ref(),
                ".git".as_ref(),
                "--gitignore".as_ref(),
                target.as_os_str(),
            ],
            &root,
            "Tree command failed",
        )
        .await
    }

    /// Reads files into a JSON map of path to content.
    ///
    /// `max_length` bounds the bytes read per file; 0 means no limit.
    /// Missing files produce per-file `error` entries rather than failing
    /// the whole call.
    ///
    /// # Errors
    ///
    /// Returns sanitisation errors; read failures are reported per file.
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub async fn read(&self, files: &[String], max_length: usize) -> Result<String, WorkspaceError> {
        let root = self.ensure_root()?.to_path_buf();
        let mut contents = serde_json::Map::new();

        for file in files {
            let path = root.join(self.sanitise(file)?);
            let entry = if path.exists() {
                match read_file(&path, max_length).await {
                    Ok(value) => value,
                    Err(err) => json!({ "error": format!("Error reading file: {err}") }),
                }
            } else {
                json!({ "error": format!("File not found: {file}") })
            };
            contents.insert(file.clone(), entry);
        }

        Ok(json!({ "files": contents }).to_string())
    }

    /// Writes or patches a file.
    ///
    /// `mode` is `overwrite` (replace the whole file, creating parents) or
    /// `patch` (apply a minimal unified diff).
    ///
    /// # Errors
    ///
    /// Returns sanitisation errors, `WorkspaceError::InvalidMode`,
    /// `WorkspaceError::PatchMismatch`, and filesystem failures.
    #[instrument(skip(self, content))]
    pub async fn write(
        &self,
        path: &str,
        content: &str,
        mode: &str,
    ) -> Result<String, WorkspaceError> {
        let target = self.ensure_root()?.join(self.sanitise(path)?);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match mode {
            "overwrite" => {
                tokio::fs::write(&target, content).await?;
                debug!(path, "Wrote file");
                Ok(format!("File '{path}' written successfully."))
            }
            "patch" => {
                if !target.exists() {
                    tokio::fs::write(&target, "").await?;
                }
                let current = tokio::fs::read_to_string(&target).await?;
                let patched = apply_patch(&current, content)?;
                tokio::fs::write(&target, patched).await?;
                debug!(path, "Patched file");
                Ok("Patch applied successfully.".to_string())
            }
            other => Err(WorkspaceError::InvalidMode {
                given: other.to_string(),
            }),
        }
    }

    /// Runs a git command inside the workspace.
    ///
    /// Command failures come back as text (they are data for the caller,
    /// like a non-zero exit from the sandbox); only sanitisation and
    /// filesystem errors fail the call.
    ///
    /// # Errors
    ///
    /// Returns sanitisation errors and filesystem failures for the working
    /// directory.
    #[instrument(skip(self))]
    pub async fn git(&self, command: &str, cwd: &str) -> Result<String, WorkspaceError> {
        let work_dir = self.ensure_root()?.join(self.sanitise(cwd)?);
        tokio::fs::create_dir_all(&work_dir).await?;

        let args = shlex::split(command).unwrap_or_default();
        if args.is_empty() {
            return Ok("Git command failed: empty command".to_string());
        }

        let argv: Vec<&std::ffi::OsStr> = args[1..].iter().map(AsRef::as_ref).collect();
        match run_command(&args[0], &argv, &work_dir, "Git command failed").await {
            Ok(output) => Ok(output),
            Err(WorkspaceError::CommandFailed { prefix, output }) => {
                Ok(format!("{prefix}: {output}"))
            }
            Err(err) => Err(err),
        }
    }
}

/// Runs one external command and captures its output.
async fn run_command(
    program: &str,
    args: &[&std::ffi::OsStr],
    cwd: &Path,
    error_prefix: &str,
) -> Result<String, WorkspaceError> {
    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await?;

    let formatted = format_output(&output.stdout, &output.stderr);
    if output.status.success() {
        Ok(formatted)
    } else {
        Err(WorkspaceError::CommandFailed {
            prefix: error_prefix.to_string(),
            output: formatted,
        })
    }
}

/// Joins the non-empty, trimmed output streams.
fn format_output(stdout: &[u8], stderr: &[u8]) -> String {
    [stdout, stderr]
        .iter()
        .map(|bytes| String::from_utf8_lossy(bytes))
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads one file with an optional length limit.
async fn read_file(path: &Path, max_length: usize) -> std::io::Result<serde_json::Value> {
    let data = tokio::fs::read(path).await?;

    let (slice, truncated) = if max_length > 0 && data.len() >= max_length {
        (&data[..max_length], true)
    } else {
        (&data[..], false)
    };

    Ok(json!({
        "content": String::from_utf8_lossy(slice),
        "truncated": truncated,
    }))
}

/// Applies a minimal unified diff patch.
///
/// Only a single hunk replacing the entire content is supported: the `-`
/// lines must match the current content exactly.
fn apply_patch(current: &str, patch: &str) -> Result<String, WorkspaceError> {
    let mut old_lines = Vec::new();
    let mut new_lines = Vec::new();
    let mut in_hunk = false;

    for line in patch.lines() {
        if line.starts_with("@@") {
            in_hunk = true;
        } else if in_hunk {
            if let Some(removed) = line.strip_prefix('-') {
                old_lines.push(removed);
            } else if let Some(added) = line.strip_prefix('+') {
                new_lines.push(added);
            } else {
                new_lines.push(line);
            }
        }
    }

    if current.trim() == old_lines.join("\n").trim() {
        Ok(new_lines.join("\n"))
    } else {
        Err(WorkspaceError::PatchMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let workspace = Workspace::new(dir.path());
        (dir, workspace)
    }

    #[test]
    fn test_sanitise_accepts_relative_paths() {
        let (_dir, ws) = workspace();
        assert_eq!(ws.sanitise("a/b.txt").expect("valid"), PathBuf::from("a/b.txt"));
        assert_eq!(ws.sanitise("./a").expect("valid"), PathBuf::from("a"));
        assert_eq!(ws.sanitise("a/../b").expect("valid"), PathBuf::from("b"));
    }

    #[test]
    fn test_sanitise_rejects_absolute_paths() {
        let (_dir, ws) = workspace();
        assert!(matches!(ws.sanitise("/etc/passwd"), Err(WorkspaceError::Escape)));
    }

    #[test]
    fn test_sanitise_rejects_traversal() {
        let (_dir, ws) = workspace();
        assert!(matches!(ws.sanitise("../outside"), Err(WorkspaceError::Escape)));
        assert!(matches!(ws.sanitise("a/../../b"), Err(WorkspaceError::Escape)));
    }

    #[test]
    fn test_sanitise_rejects_hidden_components() {
        let (_dir, ws) = workspace();
        assert!(matches!(
            ws.sanitise(".ssh/id_rsa"),
            Err(WorkspaceError::HiddenComponent)
        ));
        assert!(matches!(
            ws.sanitise("a/.hidden/b"),
            Err(WorkspaceError::HiddenComponent)
        ));
    }

    #[tokio::test]
    async fn test_write_and_read_roundtrip() {
        let (_dir, ws) = workspace();

        let message = ws
            .write("notes/hello.txt", "hello workspace", "overwrite")
            .await
            .expect("write failed");
        assert!(message.contains("hello.txt"));

        let listing = ws
            .read(&["notes/hello.txt".to_string()], 0)
            .await
            .expect("read failed");
        assert!(listing.contains("hello workspace"));
        assert!(listing.contains("\"truncated\":false"));
    }

    #[tokio::test]
    async fn test_read_reports_missing_files() {
        let (_dir, ws) = workspace();
        let listing = ws
            .read(&["missing.txt".to_string()], 0)
            .await
            .expect("read failed");
        assert!(listing.contains("File not found: missing.txt"));
    }

    #[tokio::test]
    async fn test_read_truncates_at_limit() {
        let (_dir, ws) = workspace();
        ws.write("big.txt", "0123456789", "overwrite")
            .await
            .expect("write failed");

        let listing = ws
            .read(&["big.txt".to_string()], 4)
            .await
            .expect("read failed");
        assert!(listing.contains("0123"));
        assert!(!listing.contains("0123456789"));
        assert!(listing.contains("\"truncated\":true"));
    }

    #[tokio::test]
    async fn test_write_rejects_unknown_mode() {
        let (_dir, ws) = workspace();
        let result = ws.write("a.txt", "content", "append").await;
        assert!(matches!(result, Err(WorkspaceError::InvalidMode { .. })));
    }

    #[tokio::test]
    async fn test_patch_replaces_matching_content() {
        let (_dir, ws) = workspace();
        ws.write("a.txt", "old line", "overwrite")
            .await
            .expect("write failed");

        let patch = "@@ -1 +1 @@\n-old line\n+new line";
        ws.write("a.txt", patch, "patch").await.expect("patch failed");

        let listing = ws.read(&["a.txt".to_string()], 0).await.expect("read failed");
        assert!(listing.contains("new line"));
    }

    #[tokio::test]
    async fn test_patch_mismatch_is_an_error() {
        let (_dir, ws) = workspace();
        ws.write("a.txt", "different content", "overwrite")
            .await
            .expect("write failed");

        let patch = "@@ -1 +1 @@\n-old line\n+new line";
        let result = ws.write("a.txt", patch, "patch").await;
        assert!(matches!(result, Err(WorkspaceError::PatchMismatch)));
    }

    #[tokio::test]
    async fn test_git_failure_is_returned_as_text() {
        let (_dir, ws) = workspace();

        // A fresh temp dir is not a repository, so git exits non-zero and
        // the message comes back as data rather than an error.
        match ws.git("git status --porcelain", ".").await {
            Ok(output) => {
                assert!(
                    output.contains("Git command failed") || output.is_empty(),
                    "unexpected git output: {output}"
                );
            }
            // Tolerated: git is not installed on this host.
            Err(WorkspaceError::Io { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_apply_patch_replaces_whole_content() {
        let patched = apply_patch("a\nb", "@@ -1,2 +1,2 @@\n-a\n-b\n+x\n+y").expect("patch");
        assert_eq!(patched, "x\ny");
    }
}
