//! User-facing error taxonomy.
//!
//! Adapters and orchestration return `anyhow::Result`; these variants are the
//! failures a caller may need to tell apart (and downcast to).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DreamwatchError {
    #[error("invalid duration format: '{0}' (use formats like \"4h\", \"30m\", \"2h30m\")")]
    InvalidFormat(String),

    #[error("invalid budget amount: '{0}'")]
    InvalidAmount(String),

    #[error("not a git repository: {} (run from inside a git repo)", .0.display())]
    NotARepo(PathBuf),

    #[error("a dreamwatch session is already running (pid {pid}); use `dreamwatch kill` to stop it first")]
    SessionActive { pid: u32 },
}
