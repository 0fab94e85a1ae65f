//! Data models for PoreDispatch.
//!
//! This module contains the plain data types exchanged across the dispatch bridge:
//! - [`WorkRequest`]: Immutable analysis parameters copied into a worker at launch
//! - [`LoadOptions`]: Options for a one-shot load of a single file
//! - [`WorkerMessage`]: Status updates and result batches streamed by a worker
//! - [`Delivery`]: The notification posted to the consumer loop
//! - [`AppConfig`]: Pacing, worker program, and logging settings from `PoreDispatch.yaml`
//!
//! # Architecture Note
//!
//! Requests and messages derive `Serialize`/`Deserialize` so the same types travel
//! over an in-process channel or, one JSON line at a time, over a worker process pipe.

pub mod config;
pub mod message;
pub mod request;

pub use config::{AppConfig, DispatchSettings, LoggingSettings, WorkerSettings};
pub use message::{Delivery, DispatchId, WorkerMessage};
pub use request::{LoadOptions, PlotRange, ThresholdDirection, ThresholdType, WorkRequest};
