//! Process signal plumbing: operator interrupts in, terminate requests out.

use std::thread;

use anyhow::{Context, Result, bail};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, info};

use crate::core::types::ShutdownCause;
use crate::trigger::ShutdownTrigger;

/// Background listener that turns SIGINT/SIGTERM into a `Killed` shutdown.
///
/// Dropping the listener unregisters the handlers and joins the thread.
pub struct SignalListener {
    handle: Handle,
    thread: Option<thread::JoinHandle<()>>,
}

impl SignalListener {
    pub fn install(trigger: ShutdownTrigger) -> Result<Self> {
        let mut signals =
            Signals::new([SIGINT, SIGTERM]).context("register SIGINT/SIGTERM handlers")?;
        let handle = signals.handle();
        let thread = thread::spawn(move || {
            for signal in signals.forever() {
                let name = if signal == SIGINT { "SIGINT" } else { "SIGTERM" };
                if trigger.fire(ShutdownCause::Killed) {
                    info!(signal = name, "received interrupt, shutting down gracefully");
                } else {
                    info!(signal = name, "shutdown already in progress, ignoring interrupt");
                }
            }
        });
        debug!("signal listener installed");
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Ask a running session to shut down gracefully (SIGTERM to its pid).
pub fn request_termination(pid: u32) -> Result<()> {
    // pid 0 would signal our whole process group.
    if pid == 0 {
        bail!("refusing to signal pid 0");
    }
    let raw = i32::try_from(pid).with_context(|| format!("pid {pid} out of range"))?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).with_context(|| format!("send SIGTERM to {pid}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::shutdown_channel;
    use std::time::Duration;

    #[test]
    fn sigterm_to_self_is_reported_as_killed() {
        let (trigger, causes) = shutdown_channel();
        let listener = SignalListener::install(trigger).expect("install listener");

        request_termination(std::process::id()).expect("signal self");

        assert_eq!(
            causes.recv_timeout(Duration::from_secs(2)),
            Ok(ShutdownCause::Killed)
        );
        drop(listener);
    }

    #[test]
    fn terminating_a_missing_pid_fails() {
        assert!(request_termination(i32::MAX as u32).is_err());
        assert!(request_termination(u32::MAX).is_err());
        assert!(request_termination(0).is_err());
    }
}
