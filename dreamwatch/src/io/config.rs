//! User configuration stored at `~/.dreamwatch/config.json`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Dreamwatch configuration (JSON).
///
/// Every field is optional in the file; missing fields take the defaults
/// below. The loaded value is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Budget limit in USD when `--budget` is not given.
    pub default_budget: f64,

    /// Timeout string (e.g. `"4h"`) when `--timeout` is not given.
    pub default_timeout: String,

    /// First path segment of generated branch names.
    pub branch_prefix: String,

    /// Open a pull request when a session ends.
    pub autopr: bool,

    /// Open pull requests as drafts.
    pub pr_draft: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_budget: 5.0,
            default_timeout: "4h".to_string(),
            branch_prefix: "dreamwatch".to_string(),
            autopr: true,
            pr_draft: true,
        }
    }
}

/// Load config from a JSON file.
///
/// A missing file yields `Config::default()`. An unreadable or malformed file
/// is logged and also yields the defaults.
pub fn load_config(path: &Path) -> Config {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Config::default();
    }
    match read_config(path) {
        Ok(cfg) => cfg,
        Err(err) => {
            warn!(
                path = %path.display(),
                err = %format!("{err:#}"),
                "failed to load config, using defaults"
            );
            Config::default()
        }
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg = serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.json"));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_overlays_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"defaultBudget": 12.5, "prDraft": false}"#).expect("write");

        let cfg = load_config(&path);
        assert_eq!(cfg.default_budget, 12.5);
        assert!(!cfg.pr_draft);
        assert_eq!(cfg.default_timeout, "4h");
        assert_eq!(cfg.branch_prefix, "dreamwatch");
        assert!(cfg.autopr);
    }

    #[test]
    fn malformed_file_falls_back_to_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        fs::write(&path, "{ not json").expect("write");
        assert_eq!(load_config(&path), Config::default());
    }

    #[test]
    fn wrong_field_type_falls_back_to_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"autopr": "yes"}"#).expect("write");
        assert_eq!(load_config(&path), Config::default());
    }
}
