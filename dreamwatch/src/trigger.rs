//! First-trigger-wins shutdown latch.
//!
//! Agent exit, timeout expiry, and operator signals all race to end a session.
//! Each source holds a cloned [`ShutdownTrigger`]; the first `fire` flips the
//! latch and delivers its cause to the single receiver owned by the
//! supervisor. Later fires are ignored.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::debug;

use crate::core::types::ShutdownCause;

#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    fired: Arc<AtomicBool>,
    tx: Sender<ShutdownCause>,
}

/// Create a latch and the receiver that observes the winning cause.
pub fn shutdown_channel() -> (ShutdownTrigger, Receiver<ShutdownCause>) {
    let (tx, rx) = mpsc::channel();
    let trigger = ShutdownTrigger {
        fired: Arc::new(AtomicBool::new(false)),
        tx,
    };
    (trigger, rx)
}

impl ShutdownTrigger {
    /// Request shutdown with `cause`. Returns `true` only for the winning call.
    pub fn fire(&self, cause: ShutdownCause) -> bool {
        if !self.claim() {
            debug!(%cause, "shutdown already triggered, ignoring");
            return false;
        }
        debug!(%cause, "shutdown triggered");
        // Fails only once the supervisor is gone.
        let _ = self.tx.send(cause);
        true
    }

    /// Flip the latch without delivering a cause.
    pub(crate) fn claim(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[cfg(test)]
    pub(crate) fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn first_fire_wins() {
        let (trigger, rx) = shutdown_channel();
        assert!(!trigger.has_fired());
        assert!(trigger.fire(ShutdownCause::Timeout));
        assert!(!trigger.fire(ShutdownCause::Killed));
        assert!(trigger.has_fired());

        assert_eq!(rx.try_recv(), Ok(ShutdownCause::Timeout));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn claim_blocks_later_fires() {
        let (trigger, rx) = shutdown_channel();
        assert!(trigger.claim());
        assert!(!trigger.fire(ShutdownCause::Completed));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn concurrent_fires_deliver_exactly_one_cause() {
        let (trigger, rx) = shutdown_channel();
        let causes = [
            ShutdownCause::Completed,
            ShutdownCause::Error,
            ShutdownCause::Timeout,
            ShutdownCause::Killed,
        ];
        let handles: Vec<_> = causes
            .into_iter()
            .cycle()
            .take(32)
            .map(|cause| {
                let trigger = trigger.clone();
                thread::spawn(move || trigger.fire(cause))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        drop(trigger);
        assert_eq!(rx.iter().count(), 1);
    }
}
