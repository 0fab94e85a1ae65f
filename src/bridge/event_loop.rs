// EventLoopBridge - Coordinates between the tokio runtime and the consumer loop
//
// The consumer loop is single-threaded and must never block. The bridge provides:
// - Non-blocking posts of deliveries from supervisors and load tasks (any thread)
// - Spawning async and blocking work onto the tokio runtime
// - A ready-made ConsumerQueue that a frame/timer-driven loop drains with try_recv

use crate::metrics::DispatchMetrics;
use crate::models::Delivery;
use crate::services::DispatchError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Thread-safe "post to consumer loop" capability
///
/// Implementations must not block. Any `Fn(Delivery<R, P>)` closure is a sink,
/// which is how a GUI toolkit's "invoke from event loop" hook plugs in.
pub trait DeliverySink<R, P>: Send + Sync + 'static {
    /// # Errors
    /// Returns [`DispatchError::ConsumerGone`] if the consumer loop has shut down.
    fn deliver(&self, delivery: Delivery<R, P>) -> Result<(), DispatchError>;
}

impl<R, P, F> DeliverySink<R, P> for F
where
    F: Fn(Delivery<R, P>) + Send + Sync + 'static,
{
    fn deliver(&self, delivery: Delivery<R, P>) -> Result<(), DispatchError> {
        self(delivery);
        Ok(())
    }
}

/// Sink half of a [`ConsumerQueue`]
struct QueueSink<R, P> {
    tx: mpsc::UnboundedSender<Delivery<R, P>>,
}

impl<R, P> DeliverySink<R, P> for QueueSink<R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    fn deliver(&self, delivery: Delivery<R, P>) -> Result<(), DispatchError> {
        self.tx
            .send(delivery)
            .map_err(|_| DispatchError::ConsumerGone)
    }
}

/// Consumer-loop side of the default delivery channel
///
/// Unbounded so that a slow consumer never causes a `done` to be dropped; the
/// supervisor's pacing keeps the volume at one delivery per tick per analysis.
pub struct ConsumerQueue<R, P> {
    rx: mpsc::UnboundedReceiver<Delivery<R, P>>,
}

impl<R, P> ConsumerQueue<R, P> {
    /// Take the next delivery if one is ready, without blocking
    pub fn try_next(&mut self) -> Option<Delivery<R, P>> {
        self.rx.try_recv().ok()
    }

    /// Take every delivery that is ready right now
    pub fn drain_ready(&mut self) -> Vec<Delivery<R, P>> {
        let mut ready = Vec::new();
        while let Ok(delivery) = self.rx.try_recv() {
            ready.push(delivery);
        }
        ready
    }

    /// Wait for the next delivery (for async consumers)
    ///
    /// Returns `None` once every bridge clone has been dropped.
    pub async fn next(&mut self) -> Option<Delivery<R, P>> {
        self.rx.recv().await
    }
}

/// Coordinates between the tokio runtime and the consumer loop
///
/// Cheap to clone; every supervisor and load task holds one.
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let (bridge, mut queue) = EventLoopBridge::<Event, Trace>::with_queue(runtime.handle().clone());
///
/// // Each frame of the consumer loop:
/// for delivery in queue.drain_ready() {
///     render(delivery);
/// }
/// ```
pub struct EventLoopBridge<R, P> {
    /// Handle to the tokio runtime for spawning tasks
    tokio_handle: tokio::runtime::Handle,

    /// Where deliveries are posted
    sink: Arc<dyn DeliverySink<R, P>>,

    metrics: Arc<DispatchMetrics>,
}

// Manual Clone implementation to avoid requiring R: Clone, P: Clone
impl<R, P> Clone for EventLoopBridge<R, P> {
    fn clone(&self) -> Self {
        Self {
            tokio_handle: self.tokio_handle.clone(),
            sink: Arc::clone(&self.sink),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<R, P> EventLoopBridge<R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    /// Create a bridge posting into a custom sink
    pub fn new<S>(tokio_handle: tokio::runtime::Handle, sink: S) -> Self
    where
        S: DeliverySink<R, P>,
    {
        Self {
            tokio_handle,
            sink: Arc::new(sink),
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    /// Create a bridge posting into a [`ConsumerQueue`]
    pub fn with_queue(tokio_handle: tokio::runtime::Handle) -> (Self, ConsumerQueue<R, P>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = Self::new(tokio_handle, QueueSink { tx });
        (bridge, ConsumerQueue { rx })
    }

    /// Share an existing metrics instance
    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Post a delivery to the consumer loop from any thread
    ///
    /// Never blocks. A consumer that has gone away is logged, not propagated.
    pub fn deliver(&self, delivery: Delivery<R, P>) {
        match self.sink.deliver(delivery) {
            Ok(()) => self.metrics.record_delivery(),
            Err(e) => {
                self.metrics.record_delivery_dropped();
                tracing::warn!("Failed to post delivery: {}", e);
            }
        }
    }

    /// Spawn an async task on the tokio runtime
    pub fn spawn_async<F, Fut>(&self, future_factory: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        })
    }

    /// Run blocking work on the runtime's blocking pool
    pub fn spawn_blocking<F>(&self, work: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tokio_handle.spawn_blocking(work)
    }

    pub fn runtime(&self) -> &tokio::runtime::Handle {
        &self.tokio_handle
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }
}
