//! Per-user data directory layout (`~/.dreamwatch/`).

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;

/// Environment variable that overrides the data directory location.
pub const HOME_ENV: &str = "DREAMWATCH_HOME";

/// All canonical paths within the dreamwatch data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub session_path: PathBuf,
    pub logs_dir: PathBuf,
    pub reports_dir: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_path: root.join("config.json"),
            session_path: root.join("session.json"),
            logs_dir: root.join("logs"),
            reports_dir: root.join("reports"),
            root,
        }
    }

    /// `$DREAMWATCH_HOME` if set, otherwise `~/.dreamwatch`.
    pub fn resolve() -> Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(root));
        }
        let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
        Ok(Self::new(home.join(".dreamwatch")))
    }

    /// Create the root, logs, and reports directories if missing.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.root, &self.logs_dir, &self.reports_dir] {
            fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Agent output log for the given day (`logs/<YYYY-MM-DD>.log`).
    pub fn log_path(&self, date: NaiveDate) -> PathBuf {
        self.logs_dir.join(format!("{}.log", date.format("%Y-%m-%d")))
    }
}
