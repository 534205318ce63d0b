//! Bounded execution of short-lived helper commands (`gh`).

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Exit status and captured streams of a finished helper command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// The command overran its timeout and was killed.
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run `cmd` to completion or until `timeout`, keeping at most `limit` bytes
/// of each output stream.
///
/// Both pipes are drained on their own threads for the whole run, so a chatty
/// child never blocks on a full pipe.
#[instrument(skip_all, fields(timeout_ms = timeout.as_millis() as u64, limit))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    limit: usize,
) -> Result<CommandOutput> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("spawn command")?;

    let stdout = capture(child.stdout.take(), limit)?;
    let stderr = capture(child.stderr.take(), limit)?;

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => (status, false),
        None => {
            warn!(timeout_ms = timeout.as_millis() as u64, "command timed out, killing");
            child.kill().context("kill command")?;
            (child.wait().context("reap killed command")?, true)
        }
    };

    let output = CommandOutput {
        status,
        stdout: collect(stdout).context("read stdout")?,
        stderr: collect(stderr).context("read stderr")?,
        timed_out,
    };
    debug!(exit_code = ?output.status.code(), timed_out, "command finished");
    Ok(output)
}

fn capture<R>(stream: Option<R>, limit: usize) -> Result<JoinHandle<io::Result<Vec<u8>>>>
where
    R: Read + Send + 'static,
{
    let mut stream = stream.ok_or_else(|| anyhow!("output stream was not piped"))?;
    Ok(thread::spawn(move || {
        let mut kept = Vec::new();
        (&mut stream).take(limit as u64).read_to_end(&mut kept)?;
        let dropped = io::copy(&mut stream, &mut io::sink())?;
        if dropped > 0 {
            warn!(dropped, "command output truncated");
        }
        Ok(kept)
    }))
}

fn collect(handle: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader panicked"))?
        .map_err(Into::into)
}
