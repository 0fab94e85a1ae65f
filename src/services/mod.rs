//! Services module - Scheduling, streaming, and teardown of analysis work.
//!
//! This module contains everything between "the consumer asked for work" and "a
//! delivery was posted". The services have no knowledge of any GUI toolkit; the only
//! thing they need from the consumer side is the [`EventLoopBridge`](crate::bridge::EventLoopBridge).
//!
//! # Components
//!
//! - [`Transport`] / [`WorkerSender`] / [`PipeWriter`]: Ordered worker-to-supervisor
//!   channel with non-blocking receive and close detection, in-process or over a pipe
//! - [`Launcher`]: Starts a worker in its own execution context
//!   - [`ThreadLauncher`]: dedicated OS thread, cooperative termination
//!   - [`ProcessLauncher`]: child process speaking JSON lines, forceful termination
//! - [`ResultAccumulator`]: Coalesces status (last write wins) and result batches
//!   (concatenated) between deliveries
//! - Supervisor ([`AnalysisHandle`]): The timer-driven poll-and-deliver loop; owns one
//!   worker and its transport, delivers at most once per tick, and delivers a single
//!   final `done`
//! - Load task ([`LoadHandle`]): One-shot bounded work on the blocking pool with exactly
//!   one delivery
//! - [`run_stdio_worker`]: Entry helper for worker executables
//!
//! # Data Flow
//!
//! 1. The consumer calls `start_analysis`; the supervisor launches the worker
//! 2. The worker streams `StatusUpdate` / `ResultBatch` messages over its transport
//! 3. Each tick drains the transport (bounded, non-blocking) into the accumulator
//! 4. The accumulator is flushed into at most one delivery per tick
//! 5. On cancel or transport close: `done` is delivered, the worker is terminated
//!    and joined, the transport is released
//!
//! # Error Handling
//!
//! No failure here reaches the consumer loop as a fault. Launch failures and receive
//! faults become status text followed by `done` (see [`DispatchError`]).

pub mod accumulator;
pub mod error;
pub mod launcher;
pub mod load;
pub mod supervisor;
pub mod transport;
pub mod worker;

pub use accumulator::{Flush, ResultAccumulator};
pub use error::{DispatchError, WorkerStopped};
pub use launcher::{
    LaunchedWorker, Launcher, ProcessLauncher, ThreadLauncher, WorkerEntry, WorkerHandle,
};
pub use load::LoadHandle;
pub use supervisor::{AnalysisHandle, CancelToken};
pub use transport::{
    PipeWriter, Received, Transport, WorkerOutput, WorkerSender, channel, spawn_pipe_reader,
};
pub use worker::{run_stdio_worker, serve_worker};
