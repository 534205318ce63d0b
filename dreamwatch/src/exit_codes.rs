//! Stable exit codes for dreamwatch CLI commands.

/// Command succeeded, or the session ended `COMPLETED`.
pub const OK: i32 = 0;
/// The session ended for any reason other than `COMPLETED`.
pub const SESSION_FAILED: i32 = 1;
/// Invalid input, missing repository, an already-running session, or another
/// error before a session could start.
pub const INVALID: i32 = 2;
