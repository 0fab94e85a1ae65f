use crate::models::WorkerMessage;

/// Everything pending at the moment of a drain
#[derive(Debug, Clone, PartialEq)]
pub struct Flush<R> {
    pub status_text: Option<String>,
    pub events: Option<Vec<R>>,
}

/// Coalesces worker output between two deliveries
///
/// Status text is last-write-wins: intermediate values absorbed between two drains
/// are dropped. Result batches are concatenated in arrival order.
#[derive(Debug)]
pub struct ResultAccumulator<R> {
    pending_status: Option<String>,
    pending_events: Vec<R>,
}

impl<R> Default for ResultAccumulator<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ResultAccumulator<R> {
    pub fn new() -> Self {
        Self {
            pending_status: None,
            pending_events: Vec::new(),
        }
    }

    /// Merge one message into the pending state
    pub fn absorb(&mut self, message: WorkerMessage<R>) {
        match message {
            // An empty status replaces the pending one, leaving nothing to show
            WorkerMessage::StatusUpdate(text) if text.is_empty() => self.pending_status = None,
            WorkerMessage::StatusUpdate(text) => self.pending_status = Some(text),
            WorkerMessage::ResultBatch(mut items) => self.pending_events.append(&mut items),
        }
    }

    /// Take and clear everything pending
    ///
    /// # Returns
    /// `None` when there is nothing to send, so callers can skip the delivery
    pub fn drain(&mut self) -> Option<Flush<R>> {
        if self.is_empty() {
            return None;
        }

        let status_text = self.pending_status.take();
        let events = if self.pending_events.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending_events))
        };

        Some(Flush {
            status_text,
            events,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pending_status.is_none() && self.pending_events.is_empty()
    }

    pub fn pending_event_count(&self) -> usize {
        self.pending_events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_last_write_wins() {
        let mut acc = ResultAccumulator::<u32>::new();
        acc.absorb(WorkerMessage::StatusUpdate("Opening".into()));
        acc.absorb(WorkerMessage::StatusUpdate("Scanning".into()));

        let flush = acc.drain().unwrap();
        assert_eq!(flush.status_text.as_deref(), Some("Scanning"));
        assert!(flush.events.is_none());
    }

    #[test]
    fn test_batches_concatenate_in_order() {
        let mut acc = ResultAccumulator::new();
        acc.absorb(WorkerMessage::ResultBatch(vec![1, 2]));
        acc.absorb(WorkerMessage::StatusUpdate("halfway".into()));
        acc.absorb(WorkerMessage::ResultBatch(vec![3, 4, 5]));
        acc.absorb(WorkerMessage::ResultBatch(vec![6]));
        assert_eq!(acc.pending_event_count(), 6);

        let flush = acc.drain().unwrap();
        assert_eq!(flush.events, Some(vec![1, 2, 3, 4, 5, 6]));
        assert_eq!(flush.status_text.as_deref(), Some("halfway"));
    }

    #[test]
    fn test_second_drain_is_noop() {
        let mut acc = ResultAccumulator::new();
        acc.absorb(WorkerMessage::ResultBatch(vec![1]));

        assert!(acc.drain().is_some());
        assert!(acc.drain().is_none());
        assert!(acc.is_empty());
    }

    #[test]
    fn test_empty_inputs_leave_nothing_to_send() {
        let mut acc = ResultAccumulator::<u32>::new();
        acc.absorb(WorkerMessage::ResultBatch(Vec::new()));
        acc.absorb(WorkerMessage::StatusUpdate(String::new()));
        assert!(acc.drain().is_none());
    }

    #[test]
    fn test_empty_status_clears_pending_status() {
        let mut acc = ResultAccumulator::<u32>::new();
        acc.absorb(WorkerMessage::StatusUpdate("stale".into()));
        acc.absorb(WorkerMessage::StatusUpdate(String::new()));
        assert!(acc.drain().is_none());
    }
}
