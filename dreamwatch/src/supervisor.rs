//! Session supervisor: the lifecycle state machine.
//!
//! A session moves `Idle → Starting → Running → ShuttingDown → Terminated`.
//! Starting prepares an isolated branch and persists the session record;
//! running launches the agent and races three shutdown sources (agent exit,
//! wall-clock timeout, operator interrupt) through a [`ShutdownTrigger`].
//! Whichever fires first picks the [`ShutdownCause`]; the graceful-shutdown
//! sequence then runs exactly once, and every step in it tolerates its own
//! failure so the session record is always cleared.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::branch::slugify;
use crate::core::duration::format_duration;
use crate::core::types::{ReportData, SessionState, ShutdownCause};
use crate::error::DreamwatchError;
use crate::exit_codes;
use crate::io::agent::{AgentExit, AgentLauncher, AgentProcess, LaunchRequest, StopSignal};
use crate::io::branch::{create_branch, install_pre_push_hook, remove_pre_push_hook};
use crate::io::config::Config;
use crate::io::git::VersionControl;
use crate::io::paths::DataPaths;
use crate::io::pull_request::{PullRequestHost, PullRequestRequest};
use crate::io::report::{generate_report, save_report};
use crate::io::session_store::{clear_session, save_session};
use crate::io::signals::SignalListener;
use crate::trigger::{ShutdownTrigger, shutdown_channel};

/// Time between the polite terminate and the forceful kill.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// How long to wait for the agent to be reaped after a forceful kill.
const KILL_SETTLE: Duration = Duration::from_secs(2);

/// Lifecycle phase of a [`Supervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Starting,
    Running,
    ShuttingDown,
    Terminated,
}

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub task: String,
    /// Budget limit in USD.
    pub budget: f64,
    /// Wall-clock limit measured from session start.
    pub timeout: Duration,
    /// Explicit branch name; generated from the task when `None`.
    pub branch: Option<String>,
    /// Open a pull request at shutdown.
    pub create_pr: bool,
}

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Delay before escalating terminate to kill.
    pub grace_period: Duration,
    /// Install SIGINT/SIGTERM handlers while running.
    pub handle_signals: bool,
    /// Pid recorded in the session record (the supervising process).
    pub pid: u32,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            handle_signals: true,
            pid: std::process::id(),
        }
    }
}

/// Result of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub cause: ShutdownCause,
    pub branch: String,
    /// Where the report was written, if persisting it succeeded.
    pub report_path: Option<PathBuf>,
    pub pr_url: Option<String>,
}

impl SessionOutcome {
    /// Process exit code: success only for a completed session.
    pub fn exit_code(&self) -> i32 {
        if self.cause.is_success() {
            exit_codes::OK
        } else {
            exit_codes::SESSION_FAILED
        }
    }
}

/// Everything owned for the lifetime of one running session.
struct ActiveSession {
    state: SessionState,
    /// `None` when the timeout is too large to represent as an `Instant`.
    deadline: Option<Instant>,
    create_pr: bool,
    /// Where the push guard was installed; `None` if installing it failed.
    hooks_dir: Option<PathBuf>,
    agent: Option<Arc<dyn AgentProcess>>,
    exits: Option<Receiver<AgentExit>>,
    signals: Option<SignalListener>,
}

/// Supervises one agent session from branch creation to final cleanup.
pub struct Supervisor<V, P, L> {
    vcs: V,
    prs: P,
    launcher: L,
    paths: DataPaths,
    config: Config,
    options: SupervisorOptions,
    phase: Phase,
    trigger: ShutdownTrigger,
    causes: Receiver<ShutdownCause>,
    active: Option<ActiveSession>,
    /// Spend reported so far. Nothing meters the agent yet, so this stays 0.
    budget_used: f64,
}

impl<V: VersionControl, P: PullRequestHost, L: AgentLauncher> Supervisor<V, P, L> {
    pub fn new(vcs: V, prs: P, launcher: L, paths: DataPaths, config: Config) -> Self {
        let (trigger, causes) = shutdown_channel();
        Self {
            vcs,
            prs,
            launcher,
            paths,
            config,
            options: SupervisorOptions::default(),
            phase: Phase::Idle,
            trigger,
            causes,
            active: None,
            budget_used: 0.0,
        }
    }

    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The in-flight session record, while one exists.
    pub fn session(&self) -> Option<&SessionState> {
        self.active.as_ref().map(|active| &active.state)
    }

    /// A handle that can request shutdown from any thread.
    pub fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    pub fn budget_used(&self) -> f64 {
        self.budget_used
    }

    /// Start a session and block until it has shut down.
    pub fn run(&mut self, request: SessionRequest) -> Result<SessionOutcome> {
        self.start(request)?;
        self.wait_for_shutdown()
    }

    /// Prepare the branch, persist the session, and launch the agent.
    ///
    /// Fails only if the working directory is not a repository or the branch
    /// cannot be created; in both cases no session is recorded.
    #[instrument(skip_all, fields(task = %request.task))]
    pub fn start(&mut self, request: SessionRequest) -> Result<SessionState> {
        if self.phase != Phase::Idle {
            bail!("supervisor already used (phase {:?})", self.phase);
        }
        self.phase = Phase::Starting;

        let mut active = match self.prepare(&request) {
            Ok(active) => active,
            Err(err) => {
                self.phase = Phase::Terminated;
                return Err(err);
            }
        };

        self.launch(&mut active);
        let state = active.state.clone();
        self.active = Some(active);
        self.phase = Phase::Running;
        info!(branch = %state.branch, pid = state.pid, "session running");
        Ok(state)
    }

    fn prepare(&self, request: &SessionRequest) -> Result<ActiveSession> {
        let workdir = self.vcs.workdir().to_path_buf();
        if !self.vcs.is_repository() {
            return Err(DreamwatchError::NotARepo(workdir).into());
        }

        let slug = slugify(&request.task);
        let branch = create_branch(
            &self.vcs,
            &slug,
            &self.config.branch_prefix,
            request.branch.as_deref(),
        )?;

        let hooks_dir = match self
            .vcs
            .hooks_dir()
            .and_then(|dir| install_pre_push_hook(&dir).map(|_| dir))
        {
            Ok(dir) => Some(dir),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to install pre-push hook");
                None
            }
        };

        let started = Instant::now();
        let state = SessionState {
            pid: self.options.pid,
            task: request.task.clone(),
            branch,
            budget: request.budget,
            timeout_ms: u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX),
            started_at: Utc::now(),
            cwd: workdir,
        };
        if let Err(err) = save_session(&self.paths.session_path, &state) {
            warn!(err = %format!("{err:#}"), "failed to save session");
        }

        Ok(ActiveSession {
            state,
            deadline: started.checked_add(request.timeout),
            create_pr: request.create_pr,
            hooks_dir,
            agent: None,
            exits: None,
            signals: None,
        })
    }

    fn launch(&mut self, active: &mut ActiveSession) {
        if self.options.handle_signals {
            match SignalListener::install(self.trigger.clone()) {
                Ok(listener) => active.signals = Some(listener),
                Err(err) => warn!(err = %format!("{err:#}"), "failed to install signal handlers"),
            }
        }

        let request = LaunchRequest {
            workdir: active.state.cwd.clone(),
            task: active.state.task.clone(),
            log_path: self.paths.log_path(Utc::now().date_naive()),
        };
        match self.launcher.launch(&request) {
            Ok(agent) => {
                let (exit_tx, exit_rx) = mpsc::channel();
                spawn_exit_watcher(Arc::clone(&agent), exit_tx, self.trigger.clone());
                active.agent = Some(agent);
                active.exits = Some(exit_rx);
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to launch agent");
                self.trigger.fire(ShutdownCause::Error);
            }
        }
    }

    /// Block until a shutdown source fires, then run the shutdown sequence.
    pub fn wait_for_shutdown(&mut self) -> Result<SessionOutcome> {
        if self.phase != Phase::Running {
            bail!("no running session (phase {:?})", self.phase);
        }
        let deadline = self.active.as_ref().and_then(|active| active.deadline);
        let cause = self.next_cause(deadline);
        self.shutdown(cause)
            .ok_or_else(|| anyhow!("shutdown already ran"))
    }

    fn next_cause(&self, deadline: Option<Instant>) -> ShutdownCause {
        let received = match deadline {
            Some(deadline) => self
                .causes
                .recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => self
                .causes
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(cause) => cause,
            Err(RecvTimeoutError::Timeout) => {
                if self.trigger.fire(ShutdownCause::Timeout) {
                    info!("timeout reached, shutting down gracefully");
                }
                // The winner has sent (or is about to send) its cause.
                self.causes.recv().unwrap_or(ShutdownCause::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => ShutdownCause::Error,
        }
    }

    /// Run the graceful-shutdown sequence for `cause`.
    ///
    /// Returns `None` without doing anything if no session is running, which
    /// includes every call after the first.
    #[instrument(skip_all, fields(%cause))]
    pub fn shutdown(&mut self, cause: ShutdownCause) -> Option<SessionOutcome> {
        if self.phase != Phase::Running {
            debug!(phase = ?self.phase, "no running session, ignoring shutdown");
            return None;
        }
        let mut active = self.active.take()?;
        self.phase = Phase::ShuttingDown;
        // Close the latch so late exits/timeouts/signals are ignored.
        self.trigger.claim();
        info!(branch = %active.state.branch, "graceful shutdown initiated");

        self.stop_agent(&mut active);
        self.commit_changes(&active.state, cause);

        let mut report = self.build_report(&active.state, cause);
        let (rendered, mut report_path) = self.persist_report(&report);

        let pr_url = if active.create_pr {
            self.open_pull_request(&active.state, &mut report, rendered.as_deref())
        } else {
            debug!("pull request creation disabled");
            None
        };
        if pr_url.is_some() {
            let (_, updated_path) = self.persist_report(&report);
            report_path = updated_path.or(report_path);
        }

        if let Some(hooks_dir) = &active.hooks_dir
            && let Err(err) = remove_pre_push_hook(hooks_dir)
        {
            warn!(err = %format!("{err:#}"), "failed to remove pre-push hook");
        }

        if let Err(err) = clear_session(&self.paths.session_path) {
            warn!(err = %format!("{err:#}"), "failed to clear session");
        }

        if active.signals.take().is_some() {
            debug!("signal listener removed");
        }
        let branch = active.state.branch.clone();
        self.phase = Phase::Terminated;
        info!("shutdown complete");

        Some(SessionOutcome {
            cause,
            branch,
            report_path,
            pr_url,
        })
    }

    /// Terminate the agent if it is still running, escalating to a kill after
    /// the grace period.
    fn stop_agent(&self, active: &mut ActiveSession) {
        let (Some(agent), Some(exits)) = (&active.agent, &active.exits) else {
            return;
        };
        match exits.try_recv() {
            Ok(exit) => {
                debug!(exit_code = ?exit.code, "agent already exited");
                return;
            }
            Err(TryRecvError::Disconnected) => {
                warn!(pid = agent.id(), "agent exit status unavailable, not signalling");
                return;
            }
            Err(TryRecvError::Empty) => {}
        }

        info!(pid = agent.id(), "terminating agent");
        if let Err(err) = agent.signal(StopSignal::Terminate) {
            warn!(err = %format!("{err:#}"), "failed to send terminate to agent");
        }
        match exits.recv_timeout(self.options.grace_period) {
            Ok(exit) => debug!(exit_code = ?exit.code, "agent exited after terminate"),
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    grace_ms = self.options.grace_period.as_millis() as u64,
                    "agent still running after grace period, force killing"
                );
                if let Err(err) = agent.signal(StopSignal::Kill) {
                    warn!(err = %format!("{err:#}"), "failed to kill agent");
                }
                if exits.recv_timeout(KILL_SETTLE).is_err() {
                    warn!(pid = agent.id(), "agent did not exit after kill");
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!(pid = agent.id(), "lost track of agent exit");
            }
        }
    }

    fn commit_changes(&self, state: &SessionState, cause: ShutdownCause) {
        match self.vcs.has_uncommitted_changes() {
            Ok(false) => debug!("working tree clean, nothing to commit"),
            Ok(true) => {
                let message = commit_message(cause, &state.branch);
                match self.vcs.commit_all(&message) {
                    Ok(true) => info!(message = %message, "committed uncommitted changes"),
                    Ok(false) => debug!("nothing staged after add, no commit"),
                    Err(err) => warn!(err = %format!("{err:#}"), "failed to commit changes"),
                }
            }
            Err(err) => warn!(err = %format!("{err:#}"), "failed to inspect working tree"),
        }
    }

    fn build_report(&self, state: &SessionState, cause: ShutdownCause) -> ReportData {
        let completed_at = Utc::now();
        ReportData {
            task: state.task.clone(),
            started_at: state.started_at,
            completed_at,
            duration: format_duration(state.elapsed_at(completed_at)),
            budget_used: self.budget_used,
            budget_limit: state.budget,
            status: cause,
            summary: vec![format!("Session ended: {cause}")],
            pr_url: None,
        }
    }

    /// Render and save the report. Returns the rendered text and saved path,
    /// each `None` if that stage failed.
    fn persist_report(&self, report: &ReportData) -> (Option<String>, Option<PathBuf>) {
        let text = match generate_report(report) {
            Ok(text) => text,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to render report");
                return (None, None);
            }
        };
        match save_report(&self.paths.reports_dir, report.started_at, &text) {
            Ok(path) => {
                info!(path = %path.display(), "report saved");
                (Some(text), Some(path))
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to save report");
                (Some(text), None)
            }
        }
    }

    fn open_pull_request(
        &self,
        state: &SessionState,
        report: &mut ReportData,
        rendered: Option<&str>,
    ) -> Option<String> {
        let request = PullRequestRequest {
            title: format!("dreamwatch: {}", state.task),
            body: rendered
                .map(str::to_string)
                .unwrap_or_else(|| report.summary.join("\n")),
            draft: self.config.pr_draft,
        };
        match self.prs.create_pull_request(&request) {
            Ok(url) => {
                info!(url = %url, "pull request created");
                report.pr_url = Some(url.clone());
                Some(url)
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to create pull request");
                None
            }
        }
    }
}

/// Commit message for work left uncommitted at shutdown.
pub fn commit_message(cause: ShutdownCause, branch: &str) -> String {
    format!("dreamwatch: auto-commit on {} ({branch})", cause.label())
}

/// Block on the agent in a background thread, publish its exit, and fire the
/// matching cause.
fn spawn_exit_watcher(
    agent: Arc<dyn AgentProcess>,
    exits: Sender<AgentExit>,
    trigger: ShutdownTrigger,
) {
    thread::spawn(move || {
        let cause = match agent.wait() {
            Ok(exit) => {
                info!(exit_code = ?exit.code, "agent exited");
                let _ = exits.send(exit);
                if exit.success() {
                    ShutdownCause::Completed
                } else {
                    ShutdownCause::Error
                }
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to wait for agent");
                ShutdownCause::Error
            }
        };
        trigger.fire(cause);
    });
}
