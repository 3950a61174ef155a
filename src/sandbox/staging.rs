//! Script staging for the process sandbox.
//!
//! Every execution stages the untrusted source into its own exclusively
//! created temp directory. The directory name comes from the OS temp-file
//! primitive, so concurrent calls cannot collide or predict each other's
//! paths. Cleanup is tied to the value's lifetime: dropping a
//! [`StagedScript`] removes the directory and everything in it, on every
//! exit path.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::trace;

use crate::error::SandboxError;

/// Fixed name of the staged source file inside the staging directory.
pub const SCRIPT_FILE_NAME: &str = "script.py";

/// Prefix for staging directory names, for identification in `/tmp` listings.
const STAGING_PREFIX: &str = "sandbox-gateway-";

/// An exclusively owned staging directory holding one untrusted script.
#[derive(Debug)]
pub struct StagedScript {
    dir: TempDir,
    script_path: PathBuf,
}

impl StagedScript {
    /// Stages `source` verbatim into a fresh private directory.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::Staging` if the directory or file cannot be
    /// created.
    pub fn write(source: &str) -> Result<Self, SandboxError> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir()
            .map_err(|source| SandboxError::Staging { source })?;

        let script_path = dir.path().join(SCRIPT_FILE_NAME);
        fs::write(&script_path, source).map_err(|source| SandboxError::Staging { source })?;

        // The sandboxed child may run as an unprivileged user (privilege
        // drop), so the staged script must stay readable after the drop.
        // The directory name is unguessable; exclusivity, not secrecy, is
        // the invariant.
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755))
            .and_then(|()| fs::set_permissions(&script_path, fs::Permissions::from_mode(0o644)))
            .map_err(|source| SandboxError::Staging { source })?;

        trace!(dir = %dir.path().display(), "Staged script");
        Ok(Self { dir, script_path })
    }

    /// Path of the staged script file.
    #[must_use]
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Path of the staging directory (the child's working directory).
    #[must_use]
    pub fn dir_path(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_source_verbatim() {
        let staged = StagedScript::write("print('test')").expect("staging failed");

        assert!(staged.dir_path().exists());
        assert!(staged.script_path().exists());
        assert_eq!(
            fs::read_to_string(staged.script_path()).expect("read failed"),
            "print('test')"
        );
        assert_eq!(
            staged.script_path().file_name().and_then(|n| n.to_str()),
            Some(SCRIPT_FILE_NAME)
        );
    }

    #[test]
    fn test_directories_do_not_collide() {
        let a = StagedScript::write("a").expect("staging failed");
        let b = StagedScript::write("b").expect("staging failed");
        assert_ne!(a.dir_path(), b.dir_path());
    }

    #[test]
    fn test_cleanup_on_drop() {
        let staged = StagedScript::write("print('test')").expect("staging failed");
        let dir = staged.dir_path().to_path_buf();
        let script = staged.script_path().to_path_buf();

        drop(staged);

        assert!(!dir.exists(), "staging directory was not cleaned up");
        assert!(!script.exists(), "script file was not cleaned up");
    }
}
