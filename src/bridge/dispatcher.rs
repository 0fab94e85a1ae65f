// Dispatcher - The entry point the consumer loop calls into
//
// Starts analyses (supervised, cancellable, incremental) and one-shot loads on the
// runtime behind an EventLoopBridge, and numbers every dispatch so deliveries from
// concurrent dispatches can be told apart.

use crate::bridge::event_loop::EventLoopBridge;
use crate::models::{DispatchId, DispatchSettings, LoadOptions, WorkRequest};
use crate::services::launcher::Launcher;
use crate::services::load::{LoadHandle, spawn_load};
use crate::services::supervisor::{AnalysisHandle, spawn_analysis};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Dispatch entry point for the consumer loop
///
/// Every method returns immediately; results arrive later through the bridge's sink.
///
/// # Example
/// ```ignore
/// let (bridge, mut queue) = EventLoopBridge::with_queue(runtime.handle().clone());
/// let dispatcher = Dispatcher::new(bridge, config.dispatch.clone());
///
/// let analysis = dispatcher.start_analysis(launcher, WorkRequest::new(files));
/// // ...later, from a "Stop" button
/// analysis.cancel();
/// ```
pub struct Dispatcher<R, P> {
    bridge: EventLoopBridge<R, P>,
    settings: DispatchSettings,
    next_id: AtomicU64,
}

impl<R, P> Dispatcher<R, P>
where
    R: Send + 'static,
    P: Send + 'static,
{
    pub fn new(bridge: EventLoopBridge<R, P>, settings: DispatchSettings) -> Self {
        Self {
            bridge,
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> DispatchId {
        DispatchId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Start a supervised analysis
    ///
    /// The request is validated and the worker launched on the runtime. Failures are
    /// delivered as status text followed by `done`; they are never returned here.
    pub fn start_analysis<L>(&self, launcher: L, request: WorkRequest) -> AnalysisHandle
    where
        L: Launcher<R>,
    {
        let id = self.next_id();
        tracing::debug!("Dispatching analysis {}", id);
        spawn_analysis(
            id,
            launcher,
            request,
            self.bridge.clone(),
            self.settings.clone(),
        )
    }

    /// Open a single file for display without blocking the consumer loop
    ///
    /// Exactly one delivery follows: `payload` on success, `error_text` on failure,
    /// unless the handle is cancelled first.
    pub fn start_load<F>(
        &self,
        file: impl Into<Utf8PathBuf>,
        options: LoadOptions,
        loader: F,
    ) -> LoadHandle
    where
        F: FnOnce(&Utf8Path, &LoadOptions) -> anyhow::Result<P> + Send + 'static,
    {
        let id = self.next_id();
        tracing::debug!("Dispatching load {}", id);
        spawn_load(id, self.bridge.clone(), file.into(), options, loader)
    }

    pub fn bridge(&self) -> &EventLoopBridge<R, P> {
        &self.bridge
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }
}
