//! I/O adapters for the supervisor and CLI commands.

pub mod agent;
pub mod branch;
pub mod config;
pub mod git;
pub mod paths;
pub mod process;
pub mod pull_request;
pub mod report;
pub mod session_store;
pub mod signals;
