// PoreDispatch - Asynchronous work dispatch for nanopore event analysis
//
// This is the library crate: launchers, transports, the poll-and-deliver supervisor,
// one-shot load tasks, and the bridge that posts their results to a consumer loop.
// The binary crate (main.rs) provides a headless command-line driver.

pub mod bridge;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use bridge::{ConsumerQueue, DeliverySink, Dispatcher, EventLoopBridge};
pub use config::ConfigManager;
pub use metrics::DispatchMetrics;
pub use models::{AppConfig, Delivery, DispatchId, LoadOptions, WorkRequest, WorkerMessage};
pub use services::{
    AnalysisHandle, CancelToken, DispatchError, LoadHandle, ProcessLauncher, ThreadLauncher,
    WorkerOutput,
};
pub use state::LoopPhase;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
