use crate::models::{WorkRequest, WorkerSettings};
use crate::services::error::DispatchError;
use crate::services::transport::{self, Transport, WorkerOutput, spawn_pipe_reader};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

/// A worker computation: reads the request, streams output, returns when done.
///
/// Returning (or panicking) closes the worker's end of the transport. An error is
/// reported to the consumer as a final status update.
pub type WorkerEntry<R> =
    Arc<dyn Fn(&WorkRequest, &mut dyn WorkerOutput<R>) -> anyhow::Result<()> + Send + Sync>;

/// A freshly started worker and the supervisor end of its transport
pub struct LaunchedWorker<R> {
    pub handle: WorkerHandle,
    pub transport: Transport<R>,
}

/// Starts a worker in its own execution context
///
/// `launch` resolves as soon as the worker exists; it does not wait for output.
pub trait Launcher<R>: Send + Sync + 'static {
    /// # Errors
    /// Returns [`DispatchError::LaunchFailure`] if the execution context could not be
    /// created. No handle is returned in that case.
    fn launch(
        &self,
        request: &WorkRequest,
    ) -> impl Future<Output = Result<LaunchedWorker<R>, DispatchError>> + Send;
}

enum WorkerKind {
    Thread {
        stop: Arc<AtomicBool>,
        join: Option<std::thread::JoinHandle<()>>,
    },
    Process {
        child: Child,
        feeder: Option<tokio::task::JoinHandle<()>>,
    },
}

/// Exclusive ownership of a worker's execution context
///
/// Teardown is guarded: only the first [`terminate_and_join`](Self::terminate_and_join)
/// touches the worker.
pub struct WorkerHandle {
    label: String,
    kind: WorkerKind,
    torn_down: bool,
}

impl WorkerHandle {
    fn thread(label: String, stop: Arc<AtomicBool>, join: std::thread::JoinHandle<()>) -> Self {
        Self {
            label,
            kind: WorkerKind::Thread {
                stop,
                join: Some(join),
            },
            torn_down: false,
        }
    }

    fn process(label: String, child: Child, feeder: Option<tokio::task::JoinHandle<()>>) -> Self {
        Self {
            label,
            kind: WorkerKind::Process { child, feeder },
            torn_down: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Stop the worker and wait for its execution context to exit
    ///
    /// Processes are killed outright. Threads cannot be preempted: their output is
    /// cut off and the join waits for the entry to return.
    ///
    /// # Returns
    /// `Ok(true)` if this call tore the worker down, `Ok(false)` if it already was
    pub async fn terminate_and_join(&mut self) -> Result<bool, DispatchError> {
        if self.torn_down {
            return Ok(false);
        }
        self.torn_down = true;

        match &mut self.kind {
            WorkerKind::Thread { stop, join } => {
                stop.store(true, Ordering::Release);

                if let Some(join) = join.take() {
                    let joined = tokio::task::spawn_blocking(move || join.join())
                        .await
                        .map_err(|e| DispatchError::Join(e.to_string()))?;

                    if joined.is_err() {
                        return Err(DispatchError::Join(format!(
                            "worker thread {} panicked",
                            self.label
                        )));
                    }
                }
            }
            WorkerKind::Process { child, feeder } => {
                if let Some(feeder) = feeder.take() {
                    feeder.abort();
                }

                // Fails only if the child was already reaped
                if let Err(e) = child.start_kill() {
                    tracing::debug!("Kill of {} skipped: {}", self.label, e);
                }

                let status = child
                    .wait()
                    .await
                    .map_err(|e| DispatchError::Join(e.to_string()))?;
                tracing::debug!("Worker {} exited with {}", self.label, status);
            }
        }

        tracing::debug!("Worker {} terminated and joined", self.label);
        Ok(true)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }

        tracing::warn!("Worker {} dropped without teardown", self.label);

        // Processes are covered by kill_on_drop
        if let WorkerKind::Thread { stop, .. } = &self.kind {
            stop.store(true, Ordering::Release);
        }
    }
}

/// Runs a [`WorkerEntry`] on a dedicated OS thread with an in-process transport
pub struct ThreadLauncher<R> {
    entry: WorkerEntry<R>,
    thread_name: String,
}

impl<R> Clone for ThreadLauncher<R> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
            thread_name: self.thread_name.clone(),
        }
    }
}

impl<R: Send + 'static> ThreadLauncher<R> {
    pub fn new<E>(entry: E) -> Self
    where
        E: Fn(&WorkRequest, &mut dyn WorkerOutput<R>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            entry: Arc::new(entry),
            thread_name: "poredispatch-worker".to_string(),
        }
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

impl<R: Send + 'static> Launcher<R> for ThreadLauncher<R> {
    async fn launch(&self, request: &WorkRequest) -> Result<LaunchedWorker<R>, DispatchError> {
        let (mut sender, transport) = transport::channel::<R>();
        let stop = sender.stop_flag();
        let entry = Arc::clone(&self.entry);
        let request = request.clone();

        // The sender moves into the thread; the supervisor keeps no copy of it, so the
        // transport closes exactly when the entry returns.
        let join = std::thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                tracing::debug!("Worker thread started for {} file(s)", request.files.len());

                if let Err(e) = entry(&request, &mut sender) {
                    if sender.is_stopped() {
                        tracing::debug!("Worker stopped: {:#}", e);
                    } else {
                        tracing::warn!("Worker failed: {:#}", e);
                        let _ = sender.send_status(&format!("Analysis failed: {:#}", e));
                    }
                }
            })
            .map_err(|e| DispatchError::LaunchFailure(e.to_string()))?;

        Ok(LaunchedWorker {
            handle: WorkerHandle::thread(self.thread_name.clone(), stop, join),
            transport,
        })
    }
}

/// Runs an external worker program, speaking JSON lines over its stdio
///
/// The request is written to the child's stdin as one JSON line, after which stdin
/// is closed. Every line the child prints to stdout is one [`WorkerMessage`](crate::models::WorkerMessage).
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: String,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a launcher from configuration, if a worker program is configured
    pub fn from_settings(settings: &WorkerSettings) -> Option<Self> {
        settings
            .program
            .as_ref()
            .map(|program| Self::new(program.clone(), settings.args.iter().cloned()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl<R: DeserializeOwned + Send + 'static> Launcher<R> for ProcessLauncher {
    async fn launch(&self, request: &WorkRequest) -> Result<LaunchedWorker<R>, DispatchError> {
        let mut line = serde_json::to_vec(request)
            .map_err(|e| DispatchError::LaunchFailure(format!("could not encode request: {}", e)))?;
        line.push(b'\n');

        tracing::info!("Launching worker: {} {:?}", self.program, self.args);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DispatchError::LaunchFailure(format!("{}: {}", self.program, e)))?;

        // On any early return below the child is dropped and killed
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DispatchError::LaunchFailure("worker stdout unavailable".to_string()))?;
        let transport = spawn_pipe_reader(stdout);

        // The child may not read stdin before the pipe buffer fills, so the request
        // is fed from its own task and launch never waits on the worker
        let feeder = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                // A worker that exits without reading its request is not a launch failure
                if let Err(e) = stdin.write_all(&line).await {
                    tracing::debug!("Worker did not accept its request: {}", e);
                }
            })
        });

        let label = match child.id() {
            Some(pid) => format!("{} (pid {})", self.program, pid),
            None => self.program.clone(),
        };

        Ok(LaunchedWorker {
            handle: WorkerHandle::process(label, child, feeder),
            transport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transport::Received;
    use std::time::Duration;

    async fn collect_until_closed<R>(transport: &mut Transport<R>) -> Vec<crate::models::WorkerMessage<R>> {
        let mut messages = Vec::new();
        loop {
            match transport.try_receive() {
                Received::Message(m) => messages.push(m),
                Received::WouldBlock => tokio::time::sleep(Duration::from_millis(5)).await,
                Received::Closed | Received::Fault(_) => return messages,
            }
        }
    }

    #[tokio::test]
    async fn test_thread_worker_closes_transport_on_return() {
        let launcher = ThreadLauncher::<u32>::new(|request, out| {
            out.send_status(&format!("{} files", request.files.len()))?;
            out.send_results(vec![1, 2])?;
            Ok(())
        });

        let mut launched = launcher
            .launch(&WorkRequest::new(["a.log", "b.log"]))
            .await
            .unwrap();
        let messages = collect_until_closed(&mut launched.transport).await;

        assert_eq!(messages.len(), 2);
        assert!(launched.handle.terminate_and_join().await.unwrap());
        assert!(!launched.handle.terminate_and_join().await.unwrap());
        assert!(launched.handle.is_torn_down());
    }

    #[tokio::test]
    async fn test_thread_worker_error_becomes_status() {
        let launcher = ThreadLauncher::<u32>::new(|_, _| anyhow::bail!("bad header"));

        let mut launched = launcher.launch(&WorkRequest::new(["a.log"])).await.unwrap();
        let messages = collect_until_closed(&mut launched.transport).await;

        assert_eq!(
            messages,
            vec![crate::models::WorkerMessage::StatusUpdate(
                "Analysis failed: bad header".to_string()
            )]
        );
        launched.handle.terminate_and_join().await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_stops_cooperative_thread() {
        let launcher = ThreadLauncher::<u32>::new(|_, out| {
            loop {
                out.send_results(vec![0])?;
                std::thread::sleep(Duration::from_millis(1));
            }
        });

        let mut launched = launcher.launch(&WorkRequest::new(["a.log"])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let joined = tokio::time::timeout(
            Duration::from_secs(5),
            launched.handle.terminate_and_join(),
        )
        .await
        .expect("worker thread did not stop");
        assert!(joined.unwrap());
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let launcher = ProcessLauncher::new("/nonexistent/poredispatch-worker", Vec::<String>::new());
        let result: Result<LaunchedWorker<u32>, _> =
            launcher.launch(&WorkRequest::new(["a.log"])).await;

        assert!(matches!(result, Err(DispatchError::LaunchFailure(_))));
    }

    #[test]
    fn test_from_settings_requires_program() {
        assert!(ProcessLauncher::from_settings(&WorkerSettings::default()).is_none());

        let settings = WorkerSettings {
            program: Some("find-events".to_string()),
            args: vec!["--stdio".to_string()],
        };
        let launcher = ProcessLauncher::from_settings(&settings).unwrap();
        assert_eq!(launcher.program(), "find-events");
    }
}
