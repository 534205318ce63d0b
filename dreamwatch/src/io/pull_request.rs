//! Pull-request creation on the code host.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

const GH_TIMEOUT: Duration = Duration::from_secs(120);
const GH_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Parameters for opening a pull request from the current branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRequest {
    pub title: String,
    pub body: String,
    pub draft: bool,
}

/// Code-hosting backend that can open pull requests.
pub trait PullRequestHost {
    /// Open a pull request and return its URL.
    fn create_pull_request(&self, request: &PullRequestRequest) -> Result<String>;
}

/// Pull-request host backed by the GitHub CLI (`gh pr create`).
#[derive(Debug, Clone)]
pub struct GhCli {
    workdir: PathBuf,
}

impl GhCli {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl PullRequestHost for GhCli {
    #[instrument(skip_all, fields(draft = request.draft))]
    fn create_pull_request(&self, request: &PullRequestRequest) -> Result<String> {
        let mut cmd = Command::new("gh");
        cmd.args(["pr", "create"]);
        if request.draft {
            cmd.arg("--draft");
        }
        cmd.arg("--title")
            .arg(&request.title)
            .arg("--body")
            .arg(&request.body)
            .current_dir(&self.workdir);

        debug!(workdir = %self.workdir.display(), "running gh pr create");
        let output = run_command_with_timeout(cmd, GH_TIMEOUT, GH_OUTPUT_LIMIT_BYTES)
            .context("run gh pr create")?;
        if output.timed_out {
            return Err(anyhow!("gh pr create timed out after {GH_TIMEOUT:?}"));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "gh pr create failed");
            return Err(anyhow!(
                "gh pr create failed: {}",
                output.stderr_lossy().trim()
            ));
        }

        let url = pull_request_url(&output.stdout_lossy())?;
        info!(url = %url, "pull request created");
        Ok(url)
    }
}

/// `gh pr create` prints progress lines before the URL; the URL is the last line.
fn pull_request_url(stdout: &str) -> Result<String> {
    stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("gh pr create printed no pull request url"))
}
