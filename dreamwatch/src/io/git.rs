//! Git adapter for the supervisor.
//!
//! The supervisor only needs a handful of version-control operations, so they
//! sit behind [`VersionControl`] and the production [`Git`] wrapper shells out
//! to `git`.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument, warn};

/// Version-control operations used during a session.
pub trait VersionControl {
    /// Working tree the session operates in.
    fn workdir(&self) -> &Path;

    /// True if `workdir` is inside a git work tree.
    fn is_repository(&self) -> bool;

    /// Create and check out `branch` at the current HEAD.
    fn create_branch(&self, branch: &str) -> Result<()>;

    /// True if the working tree has staged, unstaged, or untracked changes.
    fn has_uncommitted_changes(&self) -> Result<bool>;

    /// Stage everything and commit. Returns `false` if nothing was staged.
    fn commit_all(&self, message: &str) -> Result<bool>;

    /// Directory git reads hooks from.
    fn hooks_dir(&self) -> Result<PathBuf>;
}

/// `git` run inside one working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Run git and return stdout, failing on a non-zero exit.
    fn stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args)?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl VersionControl for Git {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn is_repository(&self) -> bool {
        match self.stdout(&["rev-parse", "--is-inside-work-tree"]) {
            Ok(out) => out.trim() == "true",
            Err(err) => {
                debug!(err = %err, "not inside a git work tree");
                false
            }
        }
    }

    #[instrument(skip_all, fields(branch = %branch))]
    fn create_branch(&self, branch: &str) -> Result<()> {
        self.stdout(&["checkout", "-b", branch])?;
        debug!("branch checked out");
        Ok(())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        let status = self.stdout(&["status", "--porcelain", "--untracked-files=all"])?;
        Ok(status.lines().any(|line| !line.trim().is_empty()))
    }

    #[instrument(skip_all)]
    fn commit_all(&self, message: &str) -> Result<bool> {
        self.stdout(&["add", "--all"])?;

        // `diff --quiet` exits 1 when the index differs from HEAD.
        let staged = self.output(&["diff", "--cached", "--quiet"])?;
        match staged.status.code() {
            Some(0) => {
                warn!("status reported changes but nothing was staged");
                return Ok(false);
            }
            Some(1) => {}
            code => bail!(
                "git diff --cached failed ({code:?}): {}",
                String::from_utf8_lossy(&staged.stderr).trim()
            ),
        }

        self.stdout(&["commit", "-m", message])?;
        debug!("changes committed");
        Ok(true)
    }

    fn hooks_dir(&self) -> Result<PathBuf> {
        let out = self.stdout(&["rev-parse", "--git-path", "hooks"])?;
        let hooks = PathBuf::from(out.trim());
        Ok(if hooks.is_absolute() {
            hooks
        } else {
            self.workdir.join(hooks)
        })
    }
}
