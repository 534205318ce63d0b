//! Session report rendering and storage (`~/.dreamwatch/reports/`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::types::ReportData;

const REPORT_TEMPLATE: &str = include_str!("templates/report.md");

/// Render a report document. Pure function of `data`.
pub fn generate_report(data: &ReportData) -> Result<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.add_template("report.md", REPORT_TEMPLATE)
        .context("load report template")?;
    let template = env.get_template("report.md")?;
    let rendered = template
        .render(context! {
            task => data.task.as_str(),
            started_at => data.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            completed_at => data.completed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            duration => data.duration.as_str(),
            status => data.status.as_str(),
            budget_used => format!("{:.2}", data.budget_used),
            budget_limit => format!("{:.2}", data.budget_limit),
            pr_url => data.pr_url.as_deref(),
            summary => &data.summary,
        })
        .context("render report")?;
    Ok(rendered)
}

/// Write a rendered report for the session that started at `started_at`.
///
/// The file name is derived from the start time, so re-saving the same
/// session replaces its earlier document.
pub fn save_report(reports_dir: &Path, started_at: DateTime<Utc>, text: &str) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("create reports dir {}", reports_dir.display()))?;
    let path = reports_dir.join(format!("{}.md", started_at.format("%Y-%m-%d-%H%M%S")));
    fs::write(&path, text).with_context(|| format!("write report {}", path.display()))?;
    debug!(path = %path.display(), "report saved");
    Ok(path)
}

/// Content of the most recently written report, if any.
pub fn latest_report(reports_dir: &Path) -> Result<Option<String>> {
    let Some(path) = latest_report_path(reports_dir)? else {
        return Ok(None);
    };
    let text =
        fs::read_to_string(&path).with_context(|| format!("read report {}", path.display()))?;
    Ok(Some(text))
}

/// Path of the most recently modified `.md` file; ties go to the later name.
pub fn latest_report_path(reports_dir: &Path) -> Result<Option<PathBuf>> {
    if !reports_dir.exists() {
        return Ok(None);
    }
    let mut latest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(reports_dir)
        .with_context(|| format!("read {}", reports_dir.display()))?
    {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "md") {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .with_context(|| format!("stat {}", path.display()))?;
        let candidate = (modified, path);
        if latest.as_ref().is_none_or(|current| candidate > *current) {
            latest = Some(candidate);
        }
    }
    Ok(latest.map(|(_, path)| path))
}
