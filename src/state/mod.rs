// Supervisor phase tracking
//
// The poll-and-deliver loop moves through Running -> [DrainingAfterCancel] -> Stopped.
// PhaseTracker is owned by the supervisor and publishes every transition through a
// watch channel; handles hold a PhaseWatcher to observe or await it.

use tokio::sync::watch;

/// Phase of one poll-and-deliver loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Ticking: receiving from the transport and delivering
    Running,

    /// Cancel observed; flushing and tearing the worker down
    DrainingAfterCancel,

    /// Final `done` delivered and worker joined; terminal
    Stopped,
}

impl LoopPhase {
    /// Whether `next` is a legal successor of this phase
    pub fn can_transition_to(self, next: LoopPhase) -> bool {
        matches!(
            (self, next),
            (LoopPhase::Running, LoopPhase::DrainingAfterCancel)
                | (LoopPhase::Running, LoopPhase::Stopped)
                | (LoopPhase::DrainingAfterCancel, LoopPhase::Stopped)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == LoopPhase::Stopped
    }
}

/// Supervisor-side owner of the phase
#[derive(Debug)]
pub struct PhaseTracker {
    tx: watch::Sender<LoopPhase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LoopPhase::Running);
        Self { tx }
    }

    pub fn current(&self) -> LoopPhase {
        *self.tx.borrow()
    }

    /// Move to `next` if the transition is legal
    ///
    /// # Returns
    /// `true` if the phase changed; illegal or repeated transitions are ignored
    pub fn transition(&self, next: LoopPhase) -> bool {
        let changed = self.tx.send_if_modified(|phase| {
            if phase.can_transition_to(next) {
                *phase = next;
                true
            } else {
                false
            }
        });

        if changed {
            tracing::debug!("Supervisor phase -> {:?}", next);
        } else {
            tracing::trace!("Ignored phase transition {:?} -> {:?}", self.current(), next);
        }

        changed
    }

    pub fn watcher(&self) -> PhaseWatcher {
        PhaseWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a supervisor's phase
#[derive(Debug, Clone)]
pub struct PhaseWatcher {
    rx: watch::Receiver<LoopPhase>,
}

impl PhaseWatcher {
    pub fn current(&self) -> LoopPhase {
        *self.rx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.current().is_terminal()
    }

    /// Wait until the supervisor reaches `Stopped`
    ///
    /// Also returns if the supervisor went away without reaching it.
    pub async fn wait_stopped(&self) {
        let mut rx = self.rx.clone();
        loop {
            if rx.borrow_and_update().is_terminal() {
                return;
            }
            if rx.changed().await.is_err() {
                tracing::debug!("Phase tracker dropped before Stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_legal_transitions() {
        assert!(LoopPhase::Running.can_transition_to(LoopPhase::DrainingAfterCancel));
        assert!(LoopPhase::Running.can_transition_to(LoopPhase::Stopped));
        assert!(LoopPhase::DrainingAfterCancel.can_transition_to(LoopPhase::Stopped));

        assert!(!LoopPhase::Stopped.can_transition_to(LoopPhase::Running));
        assert!(!LoopPhase::DrainingAfterCancel.can_transition_to(LoopPhase::Running));
        assert!(!LoopPhase::Running.can_transition_to(LoopPhase::Running));
    }

    #[test]
    fn test_stopped_is_terminal() {
        let tracker = PhaseTracker::new();
        assert!(tracker.transition(LoopPhase::Stopped));
        assert!(!tracker.transition(LoopPhase::Stopped));
        assert!(!tracker.transition(LoopPhase::DrainingAfterCancel));
        assert_eq!(tracker.current(), LoopPhase::Stopped);
    }

    #[test]
    fn test_watcher_sees_transitions() {
        let tracker = PhaseTracker::new();
        let watcher = tracker.watcher();
        assert_eq!(watcher.current(), LoopPhase::Running);

        tracker.transition(LoopPhase::DrainingAfterCancel);
        assert_eq!(watcher.current(), LoopPhase::DrainingAfterCancel);
        assert!(!watcher.is_stopped());
    }

    #[tokio::test]
    async fn test_wait_stopped_wakes_on_stop() {
        let tracker = PhaseTracker::new();
        let watcher = tracker.watcher();

        let waiter = tokio::spawn(async move { watcher.wait_stopped().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.transition(LoopPhase::Stopped);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_stopped_returns_when_tracker_dropped() {
        let tracker = PhaseTracker::new();
        let watcher = tracker.watcher();
        drop(tracker);

        tokio::time::timeout(Duration::from_secs(1), watcher.wait_stopped())
            .await
            .expect("waiter hung after tracker drop");
    }
}
