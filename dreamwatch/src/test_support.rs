//! Test-only helpers: a scratch git repository and in-memory fakes for the
//! supervisor's capability traits.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow, bail};
use tempfile::TempDir;

use crate::io::agent::{AgentExit, AgentLauncher, AgentProcess, LaunchRequest, StopSignal};
use crate::io::git::VersionControl;
use crate::io::pull_request::{PullRequestHost, PullRequestRequest};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Temporary git repository with one commit on its initial branch.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let repo = Self { dir };
        repo.git(&["init"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "user.name", "test"])?;
        fs::write(repo.path().join("README.md"), "hi\n").context("write README")?;
        repo.git(&["add", "README.md"])?;
        repo.git(&["commit", "-m", "chore: init"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Subject and body of HEAD, trimmed.
    pub fn last_commit_message(&self) -> String {
        self.git_output(&["log", "-1", "--format=%B"])
            .map(|out| out.trim().to_string())
            .unwrap_or_default()
    }

    pub fn current_branch(&self) -> String {
        self.git_output(&["rev-parse", "--abbrev-ref", "HEAD"])
            .map(|out| out.trim().to_string())
            .unwrap_or_default()
    }

    fn git(&self, args: &[&str]) -> Result<()> {
        self.git_output(args).map(|_| ())
    }

    fn git_output(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[derive(Debug, Default)]
struct VcsLog {
    branches: Vec<String>,
    commits: Vec<String>,
    dirty: bool,
}

/// In-memory [`VersionControl`]. Hooks live under `<root>/.git/hooks` so the
/// real hook installer can be exercised against it.
#[derive(Debug, Clone)]
pub struct FakeVcs {
    root: PathBuf,
    repository: bool,
    fail_branch: bool,
    fail_commit: bool,
    log: Arc<Mutex<VcsLog>>,
}

impl FakeVcs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            repository: true,
            fail_branch: false,
            fail_commit: false,
            log: Arc::default(),
        }
    }

    pub fn not_a_repo(mut self) -> Self {
        self.repository = false;
        self
    }

    pub fn failing_branch(mut self) -> Self {
        self.fail_branch = true;
        self
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Report uncommitted changes until the next successful commit.
    pub fn dirty(self) -> Self {
        lock(&self.log).dirty = true;
        self
    }

    pub fn branches(&self) -> Vec<String> {
        lock(&self.log).branches.clone()
    }

    pub fn commits(&self) -> Vec<String> {
        lock(&self.log).commits.clone()
    }

    pub fn hook_path(&self) -> PathBuf {
        self.root.join(".git").join("hooks").join("pre-push")
    }
}

impl VersionControl for FakeVcs {
    fn workdir(&self) -> &Path {
        &self.root
    }

    fn is_repository(&self) -> bool {
        self.repository
    }

    fn create_branch(&self, branch: &str) -> Result<()> {
        if self.fail_branch {
            bail!("git checkout -b {branch} failed: already exists");
        }
        lock(&self.log).branches.push(branch.to_string());
        Ok(())
    }

    fn has_uncommitted_changes(&self) -> Result<bool> {
        Ok(lock(&self.log).dirty)
    }

    fn commit_all(&self, message: &str) -> Result<bool> {
        if self.fail_commit {
            bail!("git commit failed: hook rejected");
        }
        let mut log = lock(&self.log);
        if !log.dirty {
            return Ok(false);
        }
        log.dirty = false;
        log.commits.push(message.to_string());
        Ok(true)
    }

    fn hooks_dir(&self) -> Result<PathBuf> {
        Ok(self.root.join(".git").join("hooks"))
    }
}

/// In-memory [`PullRequestHost`] that records every request.
#[derive(Debug, Clone)]
pub struct FakePullRequests {
    result: Result<String, String>,
    requests: Arc<Mutex<Vec<PullRequestRequest>>>,
}

impl FakePullRequests {
    pub fn succeeding(url: impl Into<String>) -> Self {
        Self {
            result: Ok(url.into()),
            requests: Arc::default(),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<PullRequestRequest> {
        lock(&self.requests).clone()
    }
}

impl PullRequestHost for FakePullRequests {
    fn create_pull_request(&self, request: &PullRequestRequest) -> Result<String> {
        lock(&self.requests).push(request.clone());
        self.result.clone().map_err(|message| anyhow!(message))
    }
}

/// How a [`FakeAgent`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentScript {
    /// Exit immediately with this code.
    Exits(i32),
    /// Run until signalled. Kill always ends it; terminate only if honoured.
    Hangs { honours_terminate: bool },
    /// `launch` itself fails.
    FailsToLaunch,
}

#[derive(Debug, Default)]
struct AgentInner {
    exit: Option<AgentExit>,
    signals: Vec<StopSignal>,
}

/// Scripted in-memory agent process.
#[derive(Debug)]
pub struct FakeAgent {
    script: AgentScript,
    inner: Mutex<AgentInner>,
    exited: Condvar,
}

impl FakeAgent {
    pub fn new(script: AgentScript) -> Self {
        let exit = match script {
            AgentScript::Exits(code) => Some(AgentExit { code: Some(code) }),
            _ => None,
        };
        Self {
            script,
            inner: Mutex::new(AgentInner {
                exit,
                signals: Vec::new(),
            }),
            exited: Condvar::new(),
        }
    }

    /// Signals received so far, in order.
    pub fn signals(&self) -> Vec<StopSignal> {
        lock(&self.inner).signals.clone()
    }
}

impl AgentProcess for FakeAgent {
    fn id(&self) -> u32 {
        4242
    }

    fn wait(&self) -> Result<AgentExit> {
        let mut inner = lock(&self.inner);
        loop {
            if let Some(exit) = inner.exit {
                return Ok(exit);
            }
            inner = self
                .exited
                .wait(inner)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn signal(&self, signal: StopSignal) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.signals.push(signal);
        let stops = match (signal, self.script) {
            (StopSignal::Kill, _) => true,
            (StopSignal::Terminate, AgentScript::Hangs { honours_terminate }) => {
                honours_terminate
            }
            (StopSignal::Terminate, _) => false,
        };
        if stops && inner.exit.is_none() {
            inner.exit = Some(AgentExit { code: None });
            self.exited.notify_all();
        }
        Ok(())
    }
}

/// [`AgentLauncher`] handing out one [`FakeAgent`] per launch.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    script: AgentScript,
    launched: Arc<Mutex<Vec<(LaunchRequest, Arc<FakeAgent>)>>>,
}

impl FakeLauncher {
    pub fn new(script: AgentScript) -> Self {
        Self {
            script,
            launched: Arc::default(),
        }
    }

    /// The most recently launched agent.
    pub fn agent(&self) -> Option<Arc<FakeAgent>> {
        lock(&self.launched)
            .last()
            .map(|(_, agent)| Arc::clone(agent))
    }

    pub fn requests(&self) -> Vec<LaunchRequest> {
        lock(&self.launched)
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }
}

impl AgentLauncher for FakeLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<Arc<dyn AgentProcess>> {
        if self.script == AgentScript::FailsToLaunch {
            bail!("spawn claude: No such file or directory");
        }
        let agent = Arc::new(FakeAgent::new(self.script));
        lock(&self.launched).push((request.clone(), Arc::clone(&agent)));
        Ok(agent)
    }
}
