//! Inspection and control of a recorded session (`status` and `kill`).
//!
//! Both commands treat a record whose pid is gone as stale and clear it.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::core::types::SessionState;
use crate::error::DreamwatchError;
use crate::io::session_store::{clear_session, is_session_alive, load_session};
use crate::io::signals::request_termination;

/// What `dreamwatch status` found.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    /// No session record exists.
    Idle,
    /// A record existed but its process was gone; the record was cleared.
    Stale(SessionState),
    /// The recorded session is alive.
    Running {
        session: SessionState,
        elapsed: Duration,
        remaining: Duration,
    },
}

/// What `dreamwatch kill` did.
#[derive(Debug, Clone, PartialEq)]
pub enum KillOutcome {
    Idle,
    Stale(SessionState),
    /// SIGTERM was sent to the supervising process.
    Signalled(SessionState),
}

/// Report on the recorded session as of `now`, clearing it if stale.
pub fn session_status(session_path: &Path, now: DateTime<Utc>) -> Result<SessionStatus> {
    let Some(session) = load_live_or_clear(session_path)? else {
        return Ok(SessionStatus::Idle);
    };
    match session {
        Liveness::Stale(session) => Ok(SessionStatus::Stale(session)),
        Liveness::Alive(session) => {
            let elapsed = session.elapsed_at(now);
            let remaining = session.remaining_at(now);
            Ok(SessionStatus::Running {
                session,
                elapsed,
                remaining,
            })
        }
    }
}

/// Ask the recorded session to shut down gracefully.
pub fn kill_session(session_path: &Path) -> Result<KillOutcome> {
    let Some(session) = load_live_or_clear(session_path)? else {
        return Ok(KillOutcome::Idle);
    };
    match session {
        Liveness::Stale(session) => Ok(KillOutcome::Stale(session)),
        Liveness::Alive(session) => {
            request_termination(session.pid)?;
            info!(pid = session.pid, "sent SIGTERM to session");
            Ok(KillOutcome::Signalled(session))
        }
    }
}

/// Refuse to start while another session is alive; clear a stale record.
pub fn ensure_no_live_session(session_path: &Path) -> Result<()> {
    match load_live_or_clear(session_path)? {
        Some(Liveness::Alive(session)) => {
            Err(DreamwatchError::SessionActive { pid: session.pid }.into())
        }
        Some(Liveness::Stale(_)) | None => Ok(()),
    }
}

enum Liveness {
    Alive(SessionState),
    Stale(SessionState),
}

fn load_live_or_clear(session_path: &Path) -> Result<Option<Liveness>> {
    let Some(session) = load_session(session_path) else {
        return Ok(None);
    };
    if is_session_alive(&session) {
        return Ok(Some(Liveness::Alive(session)));
    }
    debug!(pid = session.pid, "session process is gone, clearing stale record");
    clear_session(session_path)?;
    Ok(Some(Liveness::Stale(session)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::session_store::save_session;
    use std::path::PathBuf;

    fn session(pid: u32, started_at: DateTime<Utc>) -> SessionState {
        SessionState {
            pid,
            task: "night task".to_string(),
            branch: "dreamwatch/2026-10-15/night-task".to_string(),
            budget: 5.0,
            timeout_ms: 3_600_000,
            started_at,
            cwd: PathBuf::from("/repo"),
        }
    }

    #[test]
    fn status_without_record_is_idle() {
        let temp = tempfile::tempdir().expect("tempdir");
        let status = session_status(&temp.path().join("session.json"), Utc::now()).expect("status");
        assert_eq!(status, SessionStatus::Idle);
    }

    #[test]
    fn stale_record_is_reported_and_cleared() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("session.json");
        let stale = session(i32::MAX as u32, Utc::now());
        save_session(&path, &stale).expect("save");

        let status = session_status(&path, Utc::now()).expect("status");
        assert_eq!(status, SessionStatus::Stale(stale));
        assert!(!path.exists());
    }

    #[test]
    fn live_record_reports_elapsed_and_remaining() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("session.json");
        let started = Utc::now();
        let live = session(std::process::id(), started);
        save_session(&path, &live).expect("save");

        let now = started + chrono::Duration::minutes(10);
        let status = session_status(&path, now).expect("status");
        assert_eq!(
            status,
            SessionStatus::Running {
                session: live,
                elapsed: Duration::from_secs(600),
                remaining: Duration::from_secs(3_000),
            }
        );
        assert!(path.exists());
    }

    #[test]
    fn live_session_blocks_a_new_start() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("session.json");
        save_session(&path, &session(std::process::id(), Utc::now())).expect("save");

        let err = ensure_no_live_session(&path).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DreamwatchError>(),
            Some(&DreamwatchError::SessionActive {
                pid: std::process::id()
            })
        );
    }

    #[test]
    fn stale_session_does_not_block_a_new_start() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("session.json");
        save_session(&path, &session(i32::MAX as u32, Utc::now())).expect("save");

        ensure_no_live_session(&path).expect("stale record is cleared");
        assert!(!path.exists());
    }

    #[test]
    fn kill_clears_stale_record_without_signalling() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("session.json");
        let stale = session(i32::MAX as u32, Utc::now());
        save_session(&path, &stale).expect("save");

        assert_eq!(kill_session(&path).expect("kill"), KillOutcome::Stale(stale));
        assert!(!path.exists());
        assert_eq!(kill_session(&path).expect("kill again"), KillOutcome::Idle);
    }
}
