//! Shared types for the session lifecycle.
//!
//! These types define the persisted contracts (`session.json`, reports) and
//! must keep a stable serialized shape.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShutdownCause {
    /// The agent exited with status zero.
    Completed,
    /// Reserved for a spend-metering trigger; nothing produces it yet.
    BudgetExceeded,
    /// The wall-clock timeout elapsed.
    Timeout,
    /// An operator interrupt (SIGINT/SIGTERM) arrived.
    Killed,
    /// The agent exited non-zero, was killed by a signal, or failed to launch.
    Error,
}

impl ShutdownCause {
    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownCause::Completed => "COMPLETED",
            ShutdownCause::BudgetExceeded => "BUDGET_EXCEEDED",
            ShutdownCause::Timeout => "TIMEOUT",
            ShutdownCause::Killed => "KILLED",
            ShutdownCause::Error => "ERROR",
        }
    }

    /// Lowercase form used in commit messages.
    pub fn label(self) -> String {
        self.as_str().to_lowercase()
    }

    pub fn is_success(self) -> bool {
        self == ShutdownCause::Completed
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted record of the in-flight session (`session.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Pid of the supervising `dreamwatch` process.
    pub pid: u32,
    pub task: String,
    pub branch: String,
    /// Budget limit in USD.
    pub budget: f64,
    /// Wall-clock timeout in milliseconds.
    #[serde(rename = "timeout")]
    pub timeout_ms: u64,
    pub started_at: DateTime<Utc>,
    /// Absolute path of the repository the agent works in.
    pub cwd: PathBuf,
}

impl SessionState {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Time since the session started, clamped at zero.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or_default()
    }

    /// Time left before the timeout fires, clamped at zero.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.timeout().saturating_sub(self.elapsed_at(now))
    }
}

/// Outcome record rendered into a session report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Pre-formatted elapsed time (see `format_duration`).
    pub duration: String,
    pub budget_used: f64,
    pub budget_limit: f64,
    pub status: ShutdownCause,
    pub summary: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}
