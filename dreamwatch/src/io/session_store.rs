//! Single-slot storage for the in-flight session (`session.json`).

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::core::types::SessionState;

/// Atomically write the session record, replacing any previous one.
pub fn save_session(path: &Path, state: &SessionState) -> Result<()> {
    debug!(path = %path.display(), pid = state.pid, branch = %state.branch, "writing session");
    let mut buf = serde_json::to_string_pretty(state).context("serialize session")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Load the session record.
///
/// Returns `None` when no record exists. An unreadable or corrupt record is
/// logged and also treated as absent.
pub fn load_session(path: &Path) -> Option<SessionState> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "failed to read session");
            return None;
        }
    };
    match serde_json::from_str::<SessionState>(&contents) {
        Ok(state) => {
            debug!(pid = state.pid, branch = %state.branch, "session loaded");
            Some(state)
        }
        Err(err) => {
            warn!(path = %path.display(), err = %err, "failed to parse session");
            None
        }
    }
}

/// Delete the session record if present.
pub fn clear_session(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "session cleared");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove session {}", path.display())),
    }
}

/// Best-effort liveness probe: signal 0 to the recorded pid.
///
/// Any probe failure (no such process, permission denied, pid out of range)
/// counts as not alive.
pub fn is_session_alive(state: &SessionState) -> bool {
    let Ok(raw) = i32::try_from(state.pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    kill(Pid::from_raw(raw), None).is_ok()
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("session path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp session {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace session {}", path.display()))?;
    Ok(())
}
