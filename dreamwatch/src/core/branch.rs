//! Deterministic branch naming for sessions.

use chrono::NaiveDate;

/// Maximum length of a task slug.
pub const MAX_SLUG_LEN: usize = 50;

/// Lowercase `task`, collapse every run of non-alphanumeric characters into a
/// single `-`, trim leading/trailing hyphens, and cap the length.
pub fn slugify(task: &str) -> String {
    let mut slug = String::with_capacity(task.len());
    let mut pending_hyphen = false;
    for ch in task.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }
    // Only ASCII is pushed, so byte truncation stays on a char boundary.
    slug.truncate(MAX_SLUG_LEN);
    slug
}

/// Branch name for a session: `custom` if given, else `<prefix>/<YYYY-MM-DD>/<slug>`.
pub fn branch_name(slug: &str, prefix: &str, custom: Option<&str>, date: NaiveDate) -> String {
    match custom {
        Some(name) => name.to_string(),
        None => format!("{prefix}/{}/{slug}", date.format("%Y-%m-%d")),
    }
}
