//! Overnight supervisor for an autonomous coding agent.
//!
//! A session runs the agent on an isolated branch and always ends the same
//! way: stop the agent, commit leftovers, write a report, optionally open a
//! pull request, and clean up. The crate is split as:
//!
//! - **[`core`]**: Pure logic (duration/budget parsing, slugs, session types).
//! - **[`io`]**: Side effects (git, `gh`, the agent process, signals, files).
//!   Each external tool sits behind a trait so tests can swap in fakes.
//!
//! [`supervisor`] drives one session through its lifecycle; [`trigger`] is
//! the first-wins latch its shutdown sources race on, and [`status`] backs
//! the `status` and `kill` commands.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod status;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod trigger;
