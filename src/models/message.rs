use serde::{Deserialize, Serialize};
use std::fmt;

/// A message sent from a worker to its supervisor.
///
/// Over a process pipe each message is one JSON line, e.g.
/// `{"status_update":"Reading trace.log"}` or `{"result_batch":[...]}`.
/// The implicit third case, the worker closing its end, is reported by
/// [`Transport::try_receive`](crate::services::Transport::try_receive) as `Closed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerMessage<R> {
    StatusUpdate(String),
    ResultBatch(Vec<R>),
}

/// Identifies one dispatch (analysis or load) in deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchId(pub u64);

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A notification posted to the consumer loop.
///
/// Every field is optional; a delivery carries only what changed since the
/// previous one. `done` is set on exactly one delivery per analysis, and that
/// delivery carries nothing else. Load deliveries carry either `payload` or
/// `error_text`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<R, P> {
    pub dispatch_id: DispatchId,
    pub status_text: Option<String>,
    pub events: Option<Vec<R>>,
    pub done: bool,
    pub payload: Option<P>,
    pub error_text: Option<String>,
}

impl<R, P> Delivery<R, P> {
    fn empty(dispatch_id: DispatchId) -> Self {
        Self {
            dispatch_id,
            status_text: None,
            events: None,
            done: false,
            payload: None,
            error_text: None,
        }
    }

    /// Incremental progress from an analysis
    pub fn progress(
        dispatch_id: DispatchId,
        status_text: Option<String>,
        events: Option<Vec<R>>,
    ) -> Self {
        Self {
            status_text,
            events,
            ..Self::empty(dispatch_id)
        }
    }

    /// Status text only
    pub fn status(dispatch_id: DispatchId, text: impl Into<String>) -> Self {
        Self {
            status_text: Some(text.into()),
            ..Self::empty(dispatch_id)
        }
    }

    /// Final notification of an analysis
    pub fn done(dispatch_id: DispatchId) -> Self {
        Self {
            done: true,
            ..Self::empty(dispatch_id)
        }
    }

    /// Successful completion of a load
    pub fn loaded(dispatch_id: DispatchId, payload: P) -> Self {
        Self {
            payload: Some(payload),
            ..Self::empty(dispatch_id)
        }
    }

    /// Failed load; the error is also surfaced as status text
    pub fn load_failed(dispatch_id: DispatchId, status_text: String, error_text: String) -> Self {
        Self {
            status_text: Some(status_text),
            error_text: Some(error_text),
            ..Self::empty(dispatch_id)
        }
    }

    /// Number of result records carried by this delivery
    pub fn event_count(&self) -> usize {
        self.events.as_ref().map_or(0, Vec::len)
    }
}
