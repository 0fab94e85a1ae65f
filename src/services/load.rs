use crate::bridge::EventLoopBridge;
use crate::models::{Delivery, DispatchId, LoadOptions};
use anyhow::anyhow;
use camino::{Utf8Path, Utf8PathBuf};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Cancel flag whose check-and-deliver is atomic with respect to `close`
///
/// Once `close` has returned, no delivery can start.
#[derive(Debug, Clone, Default)]
struct DeliveryGate(Arc<Mutex<bool>>);

impl DeliveryGate {
    fn lock(&self) -> MutexGuard<'_, bool> {
        // The flag stays meaningful even if a holder panicked
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn close(&self) {
        *self.lock() = true;
    }

    fn is_closed(&self) -> bool {
        *self.lock()
    }

    /// Run `deliver` unless the gate is closed; `close` waits for it to finish
    fn deliver_if_open(&self, deliver: impl FnOnce()) -> bool {
        let closed = self.lock();
        if *closed {
            return false;
        }
        deliver();
        true
    }
}

/// Consumer-side handle to a one-shot load
///
/// The load cannot be interrupted; cancelling only suppresses its delivery.
pub struct LoadHandle {
    id: DispatchId,
    gate: DeliveryGate,
    task: JoinHandle<()>,
}

impl LoadHandle {
    pub fn id(&self) -> DispatchId {
        self.id
    }

    /// Suppress the delivery if it has not been posted yet
    ///
    /// After this returns, no delivery for this load will be posted.
    pub fn cancel(&self) {
        tracing::debug!("Load {} cancelled", self.id);
        self.gate.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.is_closed()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the load to finish (delivered or suppressed)
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Load {} task failed: {}", self.id, e);
        }
    }
}

/// Run `loader` off the consumer loop and deliver exactly one result
pub(crate) fn spawn_load<R, P, F>(
    id: DispatchId,
    bridge: EventLoopBridge<R, P>,
    file: Utf8PathBuf,
    options: LoadOptions,
    loader: F,
) -> LoadHandle
where
    R: Send + 'static,
    P: Send + 'static,
    F: FnOnce(&Utf8Path, &LoadOptions) -> anyhow::Result<P> + Send + 'static,
{
    let gate = DeliveryGate::default();
    let task_gate = gate.clone();
    let poster = bridge.clone();

    let task = bridge.spawn_blocking(move || {
        tracing::debug!("Load {} opening {}", id, file);

        let result = panic::catch_unwind(AssertUnwindSafe(|| loader(&file, &options)))
            .unwrap_or_else(|_| Err(anyhow!("loader panicked")));

        let delivery = match result {
            Ok(payload) => Delivery::loaded(id, payload),
            Err(e) => Delivery::load_failed(
                id,
                format!("Could not open {}: {:#}", file, e),
                format!("{:#}", e),
            ),
        };
        let failure = delivery.error_text.clone();

        let delivered = task_gate.deliver_if_open(|| {
            poster.metrics().record_load_completed();
            poster.deliver(delivery);
        });

        if !delivered {
            poster.metrics().record_load_suppressed();
            tracing::debug!("Load {} finished after cancel; delivery suppressed", id);
        } else if let Some(failure) = failure {
            tracing::warn!("Load {} failed for {}: {}", id, file, failure);
        } else {
            tracing::info!("Load {} opened {}", id, file);
        }
    });

    LoadHandle { id, gate, task }
}
