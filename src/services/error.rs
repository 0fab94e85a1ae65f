use thiserror::Error;

/// Errors that can occur while dispatching work
///
/// None of these ever propagate into the consumer loop: the supervisor turns
/// them into status text and a final `done` delivery.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The worker execution context could not be created
    #[error("Failed to launch worker: {0}")]
    LaunchFailure(String),

    #[error("Invalid analysis request: {0}")]
    InvalidRequest(String),

    /// A transport read failed for a reason other than the peer closing
    #[error("Transport receive fault: {0}")]
    ReceiveFault(String),

    #[error("Failed to join worker: {0}")]
    Join(String),

    /// The consumer loop is no longer accepting deliveries
    #[error("Consumer loop has stopped accepting deliveries")]
    ConsumerGone,
}

/// Returned to a worker when its supervisor no longer wants output
///
/// Worker entries propagate it with `?` to return early after a cancel.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Worker output was stopped by the supervisor")]
pub struct WorkerStopped;
