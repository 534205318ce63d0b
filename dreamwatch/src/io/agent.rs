//! Agent launch abstraction.
//!
//! The [`AgentLauncher`] trait decouples the supervisor from the actual agent
//! backend (currently `claude --print`). Tests use scripted launchers that
//! hand back in-memory processes instead of spawning anything.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, instrument};
use wait_timeout::ChildExt;

/// Parameters for launching the agent.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Repository the agent works in.
    pub workdir: PathBuf,
    /// Task text passed as the agent's directive.
    pub task: String,
    /// File that receives the agent's stdout and stderr (opened for append).
    pub log_path: PathBuf,
}

/// How the agent process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentExit {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub code: Option<i32>,
}

impl AgentExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Signals the supervisor sends to stop the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Polite request (SIGTERM).
    Terminate,
    /// Forceful kill (SIGKILL).
    Kill,
}

/// A running agent.
///
/// `wait` blocks the calling thread until the process exits; `signal` may be
/// called concurrently from another thread while a `wait` is outstanding.
pub trait AgentProcess: Send + Sync {
    fn id(&self) -> u32;
    fn wait(&self) -> Result<AgentExit>;
    fn signal(&self, signal: StopSignal) -> Result<()>;
}

/// Abstraction over agent backends.
pub trait AgentLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<Arc<dyn AgentProcess>>;
}

/// Launcher that spawns `claude --print --dangerously-skip-permissions <task>`.
#[derive(Debug, Clone)]
pub struct ClaudeLauncher {
    program: String,
}

impl Default for ClaudeLauncher {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
        }
    }
}

impl ClaudeLauncher {
    /// Use a different executable (e.g. a wrapper script) with the same arguments.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AgentLauncher for ClaudeLauncher {
    #[instrument(skip_all, fields(program = %self.program))]
    fn launch(&self, request: &LaunchRequest) -> Result<Arc<dyn AgentProcess>> {
        if let Some(parent) = request.log_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&request.log_path)
            .with_context(|| format!("open agent log {}", request.log_path.display()))?;
        let log_err = log.try_clone().context("clone agent log handle")?;

        let child = Command::new(&self.program)
            .arg("--print")
            .arg("--dangerously-skip-permissions")
            .arg(&request.task)
            .current_dir(&request.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .spawn()
            .with_context(|| format!("spawn {}", self.program))?;

        info!(
            pid = child.id(),
            log = %request.log_path.display(),
            "agent launched"
        );
        Ok(Arc::new(ChildAgent::new(child)?))
    }
}

/// How long `wait` holds the child lock per poll, bounding how long a
/// concurrent `signal` can be delayed.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// OS child process.
///
/// Reaping and signalling both happen under one lock, and a reaped child is
/// never signalled, so a recycled pid cannot be hit.
#[derive(Debug)]
pub struct ChildAgent {
    pid: Pid,
    state: Mutex<ChildState>,
}

#[derive(Debug)]
struct ChildState {
    child: Child,
    exit: Option<AgentExit>,
}

impl ChildAgent {
    pub fn new(child: Child) -> Result<Self> {
        let raw = i32::try_from(child.id()).context("child pid out of range")?;
        Ok(Self {
            pid: Pid::from_raw(raw),
            state: Mutex::new(ChildState { child, exit: None }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ChildState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("agent handle poisoned"))
    }
}

impl ChildState {
    /// Wait up to `timeout` for the child, remembering its exit once reaped.
    fn poll(&mut self, timeout: Duration) -> Result<Option<AgentExit>> {
        if self.exit.is_none()
            && let Some(status) = self
                .child
                .wait_timeout(timeout)
                .context("wait for agent")?
        {
            debug!(exit_code = ?status.code(), "agent reaped");
            self.exit = Some(AgentExit {
                code: status.code(),
            });
        }
        Ok(self.exit)
    }
}

impl AgentProcess for ChildAgent {
    fn id(&self) -> u32 {
        self.pid.as_raw().unsigned_abs()
    }

    fn wait(&self) -> Result<AgentExit> {
        loop {
            if let Some(exit) = self.lock()?.poll(WAIT_POLL)? {
                return Ok(exit);
            }
            // Let a pending `signal` take the lock between polls.
            thread::yield_now();
        }
    }

    fn signal(&self, signal: StopSignal) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(exit) = state.poll(Duration::ZERO)? {
            debug!(exit_code = ?exit.code, "agent already reaped, not signalling");
            return Ok(());
        }
        let sig = match signal {
            StopSignal::Terminate => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        };
        debug!(pid = self.pid.as_raw(), signal = %sig, "signalling agent");
        kill(self.pid, sig).with_context(|| format!("send {sig} to agent {}", self.pid))
    }
}
