//! Branch creation and the pre-push guard installed for a session.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::branch::branch_name;
use crate::io::git::VersionControl;

/// Text that identifies a hook as ours.
pub const HOOK_MARKER: &str = "dreamwatch pre-push hook";

const PRE_PUSH_HOOK: &str = r#"#!/bin/sh
# dreamwatch pre-push hook: reject pushes to main/master

while read local_ref local_sha remote_ref remote_sha
do
  if [ "$remote_ref" = "refs/heads/main" ] || [ "$remote_ref" = "refs/heads/master" ]; then
    echo "ERROR: dreamwatch blocks direct pushes to main/master"
    echo "This is a dreamwatch safety rail. Push to a feature branch instead."
    exit 1
  fi
done

exit 0
"#;

/// Create and check out the session branch, returning its name.
///
/// The name is `custom` if given, else `<prefix>/<today>/<slug>`.
pub fn create_branch<V: VersionControl>(
    vcs: &V,
    slug: &str,
    prefix: &str,
    custom: Option<&str>,
) -> Result<String> {
    let branch = branch_name(slug, prefix, custom, Utc::now().date_naive());
    vcs.create_branch(&branch)
        .with_context(|| format!("create branch {branch}"))?;
    info!(branch = %branch, "created session branch");
    Ok(branch)
}

/// Write the pre-push guard into `hooks_dir`, replacing any existing hook.
pub fn install_pre_push_hook(hooks_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(hooks_dir)
        .with_context(|| format!("create hooks dir {}", hooks_dir.display()))?;
    let path = hooks_dir.join("pre-push");
    fs::write(&path, PRE_PUSH_HOOK).with_context(|| format!("write hook {}", path.display()))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod hook {}", path.display()))?;
    debug!(path = %path.display(), "installed pre-push hook");
    Ok(path)
}

/// Remove the pre-push hook if (and only if) we installed it.
///
/// Returns `true` when a hook was deleted.
pub fn remove_pre_push_hook(hooks_dir: &Path) -> Result<bool> {
    let path = hooks_dir.join("pre-push");
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err).with_context(|| format!("read hook {}", path.display())),
    };
    if !content.contains(HOOK_MARKER) {
        warn!(path = %path.display(), "pre-push hook is not ours, leaving it in place");
        return Ok(false);
    }
    fs::remove_file(&path).with_context(|| format!("remove hook {}", path.display()))?;
    debug!(path = %path.display(), "removed pre-push hook");
    Ok(true)
}
