//! PoreDispatch - Headless driver for the analysis dispatch bridge
//!
//! # Overview
//!
//! Runs one analysis over the data files given on the command line, using the worker
//! executable configured in `PoreDispatch Data/PoreDispatch.yaml` (or through
//! `PORE_WORKER__PROGRAM`). It initializes:
//! - Logging infrastructure (file rotation + optional console output)
//! - Tokio async runtime for the supervisor, pipe readers and blocking work
//! - Configuration loading ([`ConfigManager`])
//! - A [`Dispatcher`] posting into a [`ConsumerQueue`](poredispatch::ConsumerQueue)
//!
//! The main thread plays the part of a GUI event loop: it never blocks on the
//! analysis, it drains whatever deliveries are ready once per frame.
//!
//! # Execution Flow
//!
//! 1. Load configuration from `PoreDispatch Data/`
//! 2. Initialize logging → logs/poredispatch.<date>
//! 3. Create the tokio runtime
//! 4. Start the analysis on the configured process worker
//! 5. Drain deliveries each frame until `done` (Ctrl-C cancels)
//! 6. Shutdown tokio runtime with 5s timeout
//!
//! # Usage
//!
//! ```text
//! poredispatch <data-file>...
//! ```

use anyhow::{Context, Result, bail};
use poredispatch::{
    APP_NAME, ConfigManager, Dispatcher, EventLoopBridge, ProcessLauncher, VERSION, WorkRequest,
};
use std::time::Duration;

/// Interval between consumer-loop frames
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    let files: Vec<String> = std::env::args().skip(1).collect();
    if files.is_empty() {
        bail!("usage: {} <data-file>...", APP_NAME);
    }

    let config_manager = ConfigManager::new("PoreDispatch Data")?;
    let config = config_manager.load()?;

    let _log_guard = poredispatch::logging::setup_logging(&config.logging)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("poredispatch-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let Some(launcher) = ProcessLauncher::from_settings(&config.worker) else {
        bail!(
            "No worker program configured; set worker.program in {} or PORE_WORKER__PROGRAM",
            config_manager.config_path()
        );
    };

    tracing::info!("Using worker program {}", launcher.program());

    let (bridge, mut queue) =
        EventLoopBridge::<serde_json::Value, ()>::with_queue(runtime.handle().clone());
    let metrics = bridge.metrics().clone();
    let dispatcher = Dispatcher::new(bridge, config.dispatch.clone());

    let analysis = dispatcher.start_analysis(launcher, WorkRequest::new(files));

    let canceller = analysis.canceller();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted - cancelling analysis");
            canceller.cancel();
        }
    });

    // Consumer loop: drain what is ready, never wait on the analysis itself
    let mut total_events = 0usize;
    'frames: loop {
        for delivery in queue.drain_ready() {
            if let Some(status) = &delivery.status_text {
                println!("{}", status);
            }
            if let Some(events) = &delivery.events {
                total_events += events.len();
                println!("+{} events ({} total)", events.len(), total_events);
            }
            if delivery.done {
                break 'frames;
            }
        }
        std::thread::sleep(FRAME_INTERVAL);
    }

    println!("Analysis finished: {} events", total_events);

    // `done` precedes teardown; wait for the worker to be joined
    runtime.block_on(analysis.shutdown());

    metrics.log_summary();

    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");
    Ok(())
}
