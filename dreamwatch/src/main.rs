//! `dreamwatch` command-line entry point.
//!
//! Starts a supervised agent session in the current repository, or inspects
//! and controls the recorded one.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use dreamwatch::core::duration::{format_duration, parse_budget, parse_duration};
use dreamwatch::exit_codes;
use dreamwatch::io::agent::ClaudeLauncher;
use dreamwatch::io::config::{Config, load_config};
use dreamwatch::io::git::Git;
use dreamwatch::io::paths::DataPaths;
use dreamwatch::io::pull_request::GhCli;
use dreamwatch::io::report::latest_report;
use dreamwatch::logging;
use dreamwatch::status::{
    KillOutcome, SessionStatus, ensure_no_live_session, kill_session, session_status,
};
use dreamwatch::supervisor::{SessionRequest, Supervisor};

#[derive(Parser, Debug)]
#[command(
    name = "dreamwatch",
    version,
    about = "Run a coding agent overnight on its own branch, then commit, report, and open a PR",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Task for the agent to work on.
    task: Option<String>,

    /// Budget limit in USD (defaults to the configured value).
    #[arg(long, value_parser = parse_budget_arg)]
    budget: Option<f64>,

    /// Maximum session length, e.g. "4h", "30m", "2h30m".
    #[arg(long, value_parser = parse_duration_arg)]
    timeout: Option<Duration>,

    /// Branch name to use instead of a generated one.
    #[arg(long)]
    branch: Option<String>,

    /// Skip opening a pull request at the end of the session.
    #[arg(long)]
    no_pr: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Show the running session, if any.
    Status,
    /// Print the most recent session report.
    Report,
    /// Ask the running session to shut down gracefully.
    Kill,
}

fn parse_budget_arg(value: &str) -> Result<f64, String> {
    parse_budget(value).map_err(|err| err.to_string())
}

fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|err| err.to_string())
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = DataPaths::resolve()?;
    match cli.command {
        Some(Command::Status) => cmd_status(&paths),
        Some(Command::Report) => cmd_report(&paths),
        Some(Command::Kill) => cmd_kill(&paths),
        None => {
            let Some(task) = cli.task.clone() else {
                eprintln!("Usage: dreamwatch <task> [--budget N] [--timeout D] [--branch NAME] [--no-pr]");
                return Ok(exit_codes::INVALID);
            };
            cmd_start(&paths, &cli, task)
        }
    }
}

fn cmd_start(paths: &DataPaths, cli: &Cli, task: String) -> Result<i32> {
    paths.ensure()?;
    let config = load_config(&paths.config_path);
    ensure_no_live_session(&paths.session_path)?;

    let request = session_request(cli, task, &config)?;
    let cwd = std::env::current_dir().context("determine current directory")?;
    let mut supervisor = Supervisor::new(
        Git::new(&cwd),
        GhCli::new(&cwd),
        ClaudeLauncher::default(),
        paths.clone(),
        config,
    );

    let state = supervisor.start(request)?;
    println!("dreamwatch started");
    println!("  Task:    {}", state.task);
    println!("  Branch:  {}", state.branch);
    println!("  Budget:  ${:.2}", state.budget);
    println!("  Timeout: {}", format_duration(state.timeout()));
    println!("Press Ctrl+C to stop gracefully.");

    let outcome = supervisor.wait_for_shutdown()?;
    println!();
    println!("Session ended: {}", outcome.cause);
    println!(
        "Budget used: ${:.2} / ${:.2}",
        supervisor.budget_used(),
        state.budget
    );
    if let Some(path) = &outcome.report_path {
        println!("Report: {}", path.display());
    }
    if let Some(url) = &outcome.pr_url {
        println!("Pull request: {url}");
    }
    Ok(outcome.exit_code())
}

/// Merge command-line options over the configured defaults.
fn session_request(cli: &Cli, task: String, config: &Config) -> Result<SessionRequest> {
    let timeout = match cli.timeout {
        Some(timeout) => timeout,
        None => parse_duration(&config.default_timeout)
            .with_context(|| format!("configured defaultTimeout '{}'", config.default_timeout))?,
    };
    let budget = match cli.budget {
        Some(budget) => budget,
        None => parse_budget(config.default_budget)
            .with_context(|| format!("configured defaultBudget {}", config.default_budget))?,
    };
    Ok(SessionRequest {
        task,
        budget,
        timeout,
        branch: cli.branch.clone(),
        create_pr: config.autopr && !cli.no_pr,
    })
}

fn cmd_status(paths: &DataPaths) -> Result<i32> {
    match session_status(&paths.session_path, Utc::now())? {
        SessionStatus::Idle => println!("No active dreamwatch session."),
        SessionStatus::Stale(session) => println!(
            "Session (pid {}) is no longer running; cleared stale session.",
            session.pid
        ),
        SessionStatus::Running {
            session,
            elapsed,
            remaining,
        } => {
            println!("dreamwatch session running");
            println!("  Task:      {}", session.task);
            println!("  Branch:    {}", session.branch);
            println!("  Budget:    ${:.2}", session.budget);
            println!("  Elapsed:   {}", format_duration(elapsed));
            println!("  Remaining: {}", format_duration(remaining));
            println!("  PID:       {}", session.pid);
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_report(paths: &DataPaths) -> Result<i32> {
    match latest_report(&paths.reports_dir)? {
        Some(report) => print!("{report}"),
        None => println!("No reports found."),
    }
    Ok(exit_codes::OK)
}

fn cmd_kill(paths: &DataPaths) -> Result<i32> {
    match kill_session(&paths.session_path)? {
        KillOutcome::Idle => println!("No active dreamwatch session."),
        KillOutcome::Stale(session) => println!(
            "Session (pid {}) is no longer running; cleared stale session.",
            session.pid
        ),
        KillOutcome::Signalled(session) => println!(
            "Sent stop signal to session (pid {}); it will commit and report before exiting.",
            session.pid
        ),
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dreamwatch::error::DreamwatchError;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("dreamwatch").chain(args.iter().copied()))
    }

    #[test]
    fn task_with_options_parses() {
        let cli = parse(&[
            "fix the flaky test",
            "--budget",
            "7.5",
            "--timeout",
            "2h30m",
            "--no-pr",
        ])
        .expect("parse");
        assert_eq!(cli.command, None);
        assert_eq!(cli.task.as_deref(), Some("fix the flaky test"));
        assert_eq!(cli.budget, Some(7.5));
        assert_eq!(cli.timeout, Some(Duration::from_secs(9_000)));
        assert!(cli.no_pr);
    }

    #[test]
    fn subcommands_parse() {
        assert_eq!(parse(&["status"]).expect("status").command, Some(Command::Status));
        assert_eq!(parse(&["report"]).expect("report").command, Some(Command::Report));
        assert_eq!(parse(&["kill"]).expect("kill").command, Some(Command::Kill));
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        let err = parse(&["task", "--timeout", "soon"]).unwrap_err();
        assert!(err.to_string().contains("invalid duration format"));
    }

    #[test]
    fn invalid_budget_is_rejected() {
        assert!(parse(&["task", "--budget", "lots"]).is_err());
    }

    #[test]
    fn request_falls_back_to_config() {
        let cli = parse(&["task"]).expect("parse");
        let config = Config {
            default_budget: 3.0,
            default_timeout: "45m".to_string(),
            autopr: false,
            ..Config::default()
        };
        let request = session_request(&cli, "task".to_string(), &config).expect("request");
        assert_eq!(request.budget, 3.0);
        assert_eq!(request.timeout, Duration::from_secs(45 * 60));
        assert!(!request.create_pr);
        assert_eq!(request.branch, None);
    }

    #[test]
    fn negative_configured_budget_is_rejected() {
        let cli = parse(&["task"]).expect("parse");
        let config = Config {
            default_budget: -3.0,
            ..Config::default()
        };
        let err = session_request(&cli, "task".to_string(), &config).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DreamwatchError>(),
            Some(&DreamwatchError::InvalidAmount("-3".to_string()))
        );
    }

    #[test]
    fn explicit_budget_ignores_configured_default() {
        let cli = parse(&["task", "--budget", "2.5"]).expect("parse");
        let config = Config {
            default_budget: -3.0,
            ..Config::default()
        };
        let request = session_request(&cli, "task".to_string(), &config).expect("request");
        assert_eq!(request.budget, 2.5);
    }

    #[test]
    fn no_pr_overrides_config() {
        let cli = parse(&["task", "--no-pr"]).expect("parse");
        let request =
            session_request(&cli, "task".to_string(), &Config::default()).expect("request");
        assert!(!request.create_pr);
    }
}
