//! Helpers for worker executables used with [`ProcessLauncher`](crate::services::ProcessLauncher).
//!
//! A worker executable reads its [`WorkRequest`] as one JSON line on stdin and
//! writes one [`WorkerMessage`](crate::models::WorkerMessage) per line to stdout.
//! Exiting closes stdout, which the supervisor observes as the end of the analysis.
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     poredispatch::services::run_stdio_worker::<Event, _>(find_events)
//! }
//! ```

use crate::models::WorkRequest;
use crate::services::transport::{PipeWriter, WorkerOutput};
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{BufRead, Write};

/// Serve one request over this process's stdin/stdout
///
/// # Errors
/// Fails if the request cannot be read or parsed, or if `entry` fails for a reason
/// other than the supervisor stopping it. Entry failures are also reported to the
/// supervisor as a final status update.
pub fn run_stdio_worker<R, E>(entry: E) -> Result<()>
where
    R: Serialize,
    E: FnOnce(&WorkRequest, &mut dyn WorkerOutput<R>) -> Result<()>,
{
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve_worker(stdin.lock(), stdout.lock(), entry)
}

/// Serve one request over arbitrary streams
pub fn serve_worker<I, O, R, E>(mut input: I, output: O, entry: E) -> Result<()>
where
    I: BufRead,
    O: Write,
    R: Serialize,
    E: FnOnce(&WorkRequest, &mut dyn WorkerOutput<R>) -> Result<()>,
{
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read analysis request")?;

    let request: WorkRequest =
        serde_json::from_str(line.trim()).context("Failed to parse analysis request")?;

    tracing::debug!("Worker serving request for {} file(s)", request.files.len());

    let mut out = PipeWriter::<O, R>::new(output);

    match entry(&request, &mut out) {
        Ok(()) => Ok(()),
        Err(e) if out.is_stopped() => {
            tracing::debug!("Worker stopped by supervisor: {:#}", e);
            Ok(())
        }
        Err(e) => {
            let _ = out.send_status(&format!("Analysis failed: {:#}", e));
            Err(e)
        }
    }
}
