use crate::bridge::EventLoopBridge;
use crate::models::{Delivery, DispatchId, DispatchSettings, WorkRequest};
use crate::services::accumulator::ResultAccumulator;
use crate::services::launcher::{Launcher, WorkerHandle};
use crate::services::transport::{Received, Transport};
use crate::state::{LoopPhase, PhaseTracker, PhaseWatcher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Per-dispatch cancellation flag
///
/// Each dispatch owns its own token; cancelling one never affects another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Consumer-side handle to a running analysis
///
/// Dropping the handle before the analysis has stopped tears it down: the
/// supervisor is cancelled and woken, and when the drop happens outside the
/// runtime (on the consumer loop's thread) it blocks until the worker is joined.
pub struct AnalysisHandle {
    id: DispatchId,
    cancel: CancelToken,
    shutdown: Arc<Notify>,
    phase: PhaseWatcher,
    task: Option<JoinHandle<()>>,
    runtime: tokio::runtime::Handle,
}

impl AnalysisHandle {
    pub fn id(&self) -> DispatchId {
        self.id
    }

    /// Request cancellation
    ///
    /// Observed at the supervisor's next tick, which delivers the final `done`.
    /// Calling it again is a no-op.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("Cancellation requested for analysis {}", self.id);
        }
        self.cancel.cancel();
    }

    /// A cancel token that can be moved to another thread or task
    pub fn canceller(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase.current()
    }

    pub fn is_stopped(&self) -> bool {
        self.phase.is_stopped()
    }

    pub fn watcher(&self) -> PhaseWatcher {
        self.phase.clone()
    }

    /// Wait until the final `done` has been delivered and the worker joined
    pub async fn wait_stopped(&self) {
        self.phase.wait_stopped().await;
    }

    /// Cancel, wake the supervisor immediately, and wait for it to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.shutdown.notify_one();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Supervisor for analysis {} failed: {}", self.id, e);
            }
        }
    }
}

impl Drop for AnalysisHandle {
    fn drop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        if self.phase.is_stopped() {
            return;
        }

        tracing::info!("Analysis {} handle dropped while running - tearing down", self.id);
        self.cancel.cancel();
        self.shutdown.notify_one();

        if tokio::runtime::Handle::try_current().is_ok() {
            // Cannot block a runtime thread; the supervisor owns the worker and
            // completes teardown on its own
            tracing::debug!("Analysis {} teardown continues on the runtime", self.id);
            return;
        }

        if let Err(e) = self.runtime.block_on(task) {
            tracing::error!("Supervisor for analysis {} failed: {}", self.id, e);
        }
    }
}

/// Start the poll-and-deliver loop for one analysis
///
/// The launch itself happens on the runtime; this returns immediately.
pub(crate) fn spawn_analysis<R, P, L>(
    id: DispatchId,
    launcher: L,
    request: WorkRequest,
    bridge: EventLoopBridge<R, P>,
    settings: DispatchSettings,
) -> AnalysisHandle
where
    R: Send + 'static,
    P: Send + 'static,
    L: Launcher<R>,
{
    let cancel = CancelToken::new();
    let shutdown = Arc::new(Notify::new());
    let phase = PhaseTracker::new();
    let watcher = phase.watcher();
    let runtime = bridge.runtime().clone();

    let supervisor = Supervisor {
        id,
        bridge: bridge.clone(),
        settings,
        cancel: cancel.clone(),
        shutdown: Arc::clone(&shutdown),
        phase,
        accumulator: ResultAccumulator::new(),
        worker: None,
        transport: None,
        done_sent: false,
    };

    let task = bridge.spawn_async(move || supervisor.run(launcher, request));

    AnalysisHandle {
        id,
        cancel,
        shutdown,
        phase: watcher,
        task: Some(task),
        runtime,
    }
}

/// Owns one worker and its transport; ticks until stopped
struct Supervisor<R, P> {
    id: DispatchId,
    bridge: EventLoopBridge<R, P>,
    settings: DispatchSettings,
    cancel: CancelToken,
    shutdown: Arc<Notify>,
    phase: PhaseTracker,
    accumulator: ResultAccumulator<R>,
    worker: Option<WorkerHandle>,
    transport: Option<Transport<R>>,
    done_sent: bool,
}

impl<R, P> Supervisor<R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    async fn run<L: Launcher<R>>(mut self, launcher: L, request: WorkRequest) {
        tracing::info!(
            "Analysis {} starting on {} file(s)",
            self.id,
            request.files.len()
        );

        if let Err(e) = request.validate() {
            tracing::warn!("Analysis {} rejected: {}", self.id, e);
            self.bridge.deliver(Delivery::status(self.id, e.to_string()));
            self.stop().await;
            return;
        }

        match launcher.launch(&request).await {
            Ok(launched) => {
                self.bridge.metrics().record_worker_launched();
                tracing::info!(
                    "Analysis {} running on worker {}",
                    self.id,
                    launched.handle.label()
                );
                self.worker = Some(launched.handle);
                self.transport = Some(launched.transport);
            }
            Err(e) => {
                self.bridge.metrics().record_launch_failure();
                tracing::error!("Analysis {} could not start: {}", self.id, e);
                self.bridge.deliver(Delivery::status(
                    self.id,
                    format!("Could not start analysis: {}", e),
                ));
                self.stop().await;
                return;
            }
        }

        let interval = self.settings.poll_interval();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.notified() => {
                    tracing::debug!("Analysis {} woken for teardown", self.id);
                }
            }

            if self.tick().await.is_terminal() {
                break;
            }
        }
    }

    /// One scheduled invocation of the loop
    async fn tick(&mut self) -> LoopPhase {
        self.bridge.metrics().record_tick();

        if self.cancel.is_cancelled() {
            tracing::info!("Analysis {} cancelled", self.id);
            // Every earlier tick ended with a flush, so nothing is pending here;
            // the phase only marks the teardown window
            self.phase.transition(LoopPhase::DrainingAfterCancel);
            self.stop().await;
            return self.phase.current();
        }

        let closed = self.receive_pending();
        self.flush();

        if closed {
            tracing::info!("Analysis {} finished: worker closed its transport", self.id);
            self.stop().await;
        }

        self.phase.current()
    }

    /// Drain the transport without blocking, up to the per-tick bound
    ///
    /// # Returns
    /// `true` if the transport is closed or faulted
    fn receive_pending(&mut self) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            return true;
        };

        let metrics = self.bridge.metrics();

        for _ in 0..self.settings.max_receives_per_tick {
            match transport.try_receive() {
                Received::Message(message) => {
                    metrics.record_message();
                    self.accumulator.absorb(message);
                }
                Received::WouldBlock => return false,
                Received::Closed => return true,
                Received::Fault(e) => {
                    metrics.record_receive_fault();
                    tracing::warn!("Analysis {}: {} - stopping worker", self.id, e);
                    return true;
                }
            }
        }

        tracing::debug!(
            "Analysis {} hit the receive bound; remaining messages wait for the next tick",
            self.id
        );
        false
    }

    /// Deliver whatever the accumulator holds, if anything
    fn flush(&mut self) {
        match self.accumulator.drain() {
            Some(flush) => {
                tracing::debug!(
                    "Analysis {} delivering {} event(s), status: {:?}",
                    self.id,
                    flush.events.as_ref().map_or(0, Vec::len),
                    flush.status_text
                );
                self.bridge.deliver(Delivery::progress(
                    self.id,
                    flush.status_text,
                    flush.events,
                ));
            }
            None => self.bridge.metrics().record_empty_flush(),
        }
    }

    /// Deliver `done`, tear the worker down, release the transport
    async fn stop(&mut self) {
        if self.done_sent {
            return;
        }
        self.done_sent = true;

        self.bridge.deliver(Delivery::done(self.id));

        if let Some(mut worker) = self.worker.take() {
            match worker.terminate_and_join().await {
                Ok(true) => self.bridge.metrics().record_worker_torn_down(),
                Ok(false) => {}
                Err(e) => {
                    // The join failed but the execution context is gone either way
                    self.bridge.metrics().record_worker_torn_down();
                    tracing::warn!("Analysis {}: {}", self.id, e);
                }
            }
        }

        self.transport = None;
        self.phase.transition(LoopPhase::Stopped);
        tracing::info!("Analysis {} stopped", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::launcher::ThreadLauncher;
    use std::time::Duration;

    fn fast_settings() -> DispatchSettings {
        DispatchSettings::default().with_poll_interval(Duration::from_millis(20))
    }

    #[test]
    fn test_cancel_tokens_are_independent() {
        let a = CancelToken::new();
        let b = CancelToken::new();
        a.cancel();
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(a.clone().is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_receive_bound_spreads_messages_across_ticks() {
        let (bridge, mut queue) =
            EventLoopBridge::<u32, ()>::with_queue(tokio::runtime::Handle::current());
        let settings = DispatchSettings {
            max_receives_per_tick: 2,
            ..fast_settings()
        };

        let launcher = ThreadLauncher::<u32>::new(|_, out| {
            for i in 0..5 {
                out.send_results(vec![i])?;
            }
            Ok(())
        });

        let handle = spawn_analysis(
            DispatchId(1),
            launcher,
            WorkRequest::new(["a.log"]),
            bridge,
            settings,
        );
        tokio::time::timeout(Duration::from_secs(5), handle.wait_stopped())
            .await
            .expect("analysis did not stop");

        let mut sizes = Vec::new();
        let mut all = Vec::new();
        while let Some(delivery) = queue.try_next() {
            if let Some(events) = delivery.events {
                sizes.push(events.len());
                all.extend(events);
            }
        }

        assert!(sizes.iter().all(|&n| n <= 2), "sizes: {:?}", sizes);
        assert_eq!(all, vec![0, 1, 2, 3, 4]);
    }
}
