//! Ordered worker-to-supervisor channel with non-blocking receive and close detection.
//!
//! Both flavours end in the same supervisor-side [`Transport`]:
//! - In-process: [`channel`] pairs a [`WorkerSender`] with the transport directly.
//! - Cross-process: [`spawn_pipe_reader`] decodes JSON lines from a child's stdout
//!   and forwards them into the transport. EOF on the pipe surfaces as `Closed`.

use crate::models::WorkerMessage;
use crate::services::error::{DispatchError, WorkerStopped};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

type Frame<R> = Result<WorkerMessage<R>, DispatchError>;

/// Outcome of a single non-blocking receive attempt
#[derive(Debug)]
pub enum Received<R> {
    Message(WorkerMessage<R>),
    /// Nothing is buffered right now
    WouldBlock,
    /// The worker side has gone away; no further messages will arrive
    Closed,
    /// The stream broke for another reason; callers treat this like `Closed`
    Fault(DispatchError),
}

/// Worker-side output interface
///
/// Implemented by [`WorkerSender`] for thread workers and by [`PipeWriter`] for
/// worker executables, so one entry function can run in either context.
pub trait WorkerOutput<R> {
    /// Send one message to the supervisor
    ///
    /// # Errors
    /// Returns [`WorkerStopped`] once the supervisor has terminated the worker or
    /// released its end of the transport.
    fn send(&mut self, message: WorkerMessage<R>) -> Result<(), WorkerStopped>;

    fn send_status(&mut self, text: &str) -> Result<(), WorkerStopped> {
        self.send(WorkerMessage::StatusUpdate(text.to_string()))
    }

    fn send_results(&mut self, items: Vec<R>) -> Result<(), WorkerStopped> {
        self.send(WorkerMessage::ResultBatch(items))
    }

    /// Whether further output would be discarded
    fn is_stopped(&self) -> bool;
}

/// Create an in-process transport pair
///
/// The channel is unbounded so a worker never blocks on send.
pub fn channel<R>() -> (WorkerSender<R>, Transport<R>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = WorkerSender {
        tx,
        stop: Arc::new(AtomicBool::new(false)),
    };
    (sender, Transport::from_receiver(rx))
}

/// Worker end of an in-process transport
///
/// Dropping it is the worker's close signal.
pub struct WorkerSender<R> {
    tx: mpsc::UnboundedSender<Frame<R>>,
    stop: Arc<AtomicBool>,
}

impl<R> WorkerSender<R> {
    /// Flag shared with the worker handle; set on terminate
    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

impl<R> WorkerOutput<R> for WorkerSender<R> {
    fn send(&mut self, message: WorkerMessage<R>) -> Result<(), WorkerStopped> {
        if self.is_stopped() {
            return Err(WorkerStopped);
        }
        self.tx.send(Ok(message)).map_err(|_| WorkerStopped)
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

/// Supervisor end of a transport
pub struct Transport<R> {
    rx: mpsc::UnboundedReceiver<Frame<R>>,
    closed: bool,
}

impl<R> Transport<R> {
    fn from_receiver(rx: mpsc::UnboundedReceiver<Frame<R>>) -> Self {
        Self { rx, closed: false }
    }

    /// Attempt to take the next message without blocking
    ///
    /// Once `Closed` or `Fault` has been returned, every later call returns `Closed`.
    pub fn try_receive(&mut self) -> Received<R> {
        if self.closed {
            return Received::Closed;
        }

        match self.rx.try_recv() {
            Ok(Ok(message)) => Received::Message(message),
            Ok(Err(fault)) => {
                self.closed = true;
                self.rx.close();
                Received::Fault(fault)
            }
            Err(mpsc::error::TryRecvError::Empty) => Received::WouldBlock,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.closed = true;
                Received::Closed
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Start decoding a worker's output pipe into a transport
///
/// Must be called from within a tokio runtime. The reader task ends at EOF, on the
/// first undecodable line or read error (reported as a fault), or as soon as the
/// transport is dropped.
pub fn spawn_pipe_reader<R, T>(pipe: T) -> Transport<R>
where
    R: DeserializeOwned + Send + 'static,
    T: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(read_frames(pipe, tx));
    Transport::from_receiver(rx)
}

async fn read_frames<R, T>(pipe: T, tx: mpsc::UnboundedSender<Frame<R>>)
where
    R: DeserializeOwned,
    T: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();

    loop {
        let next = tokio::select! {
            next = lines.next_line() => next,
            _ = tx.closed() => {
                tracing::debug!("Transport released, abandoning worker pipe");
                return;
            }
        };

        match next {
            Ok(Some(line)) => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }

                match serde_json::from_str::<WorkerMessage<R>>(text) {
                    Ok(message) => {
                        if tx.send(Ok(message)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Undecodable line from worker: {}", e);
                        let _ = tx.send(Err(DispatchError::ReceiveFault(format!(
                            "undecodable worker message: {}",
                            e
                        ))));
                        return;
                    }
                }
            }
            Ok(None) => {
                tracing::debug!("Worker pipe reached end of stream");
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to read worker pipe: {}", e);
                let _ = tx.send(Err(DispatchError::ReceiveFault(e.to_string())));
                return;
            }
        }
    }
}

/// Worker end of a process pipe: writes one JSON message per line
pub struct PipeWriter<W, R> {
    writer: W,
    broken: bool,
    _records: PhantomData<fn(R)>,
}

impl<W: Write, R> PipeWriter<W, R> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            broken: false,
            _records: PhantomData,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write, R: Serialize> WorkerOutput<R> for PipeWriter<W, R> {
    fn send(&mut self, message: WorkerMessage<R>) -> Result<(), WorkerStopped> {
        if self.broken {
            return Err(WorkerStopped);
        }

        let written = serde_json::to_writer(&mut self.writer, &message)
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"))
            .and_then(|()| self.writer.flush());

        written.map_err(|e| {
            // A closed pipe means the supervisor is gone or has killed us
            tracing::debug!("Worker pipe closed: {}", e);
            self.broken = true;
            WorkerStopped
        })
    }

    fn is_stopped(&self) -> bool {
        self.broken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_receive_in_send_order() {
        let (mut sender, mut transport) = channel::<u32>();
        sender.send_status("one").unwrap();
        sender.send_results(vec![1, 2]).unwrap();

        assert!(matches!(
            transport.try_receive(),
            Received::Message(WorkerMessage::StatusUpdate(ref s)) if s == "one"
        ));
        assert!(matches!(
            transport.try_receive(),
            Received::Message(WorkerMessage::ResultBatch(ref v)) if v == &vec![1, 2]
        ));
        assert!(matches!(transport.try_receive(), Received::WouldBlock));
    }

    #[test]
    fn test_dropping_sender_surfaces_closed_after_buffer() {
        let (mut sender, mut transport) = channel::<u32>();
        sender.send_results(vec![7]).unwrap();
        drop(sender);

        assert!(matches!(transport.try_receive(), Received::Message(_)));
        assert!(matches!(transport.try_receive(), Received::Closed));
        assert!(matches!(transport.try_receive(), Received::Closed));
        assert!(transport.is_closed());
    }

    #[test]
    fn test_sender_stops_when_transport_dropped() {
        let (mut sender, transport) = channel::<u32>();
        drop(transport);

        assert!(sender.is_stopped());
        assert_eq!(sender.send_status("late"), Err(WorkerStopped));
    }

    #[test]
    fn test_stop_flag_rejects_sends() {
        let (mut sender, _transport) = channel::<u32>();
        sender.stop_flag().store(true, Ordering::Release);
        assert_eq!(sender.send_results(vec![1]), Err(WorkerStopped));
    }

    #[test]
    fn test_pipe_writer_emits_json_lines() {
        let mut writer: PipeWriter<Vec<u8>, u32> = PipeWriter::new(Vec::new());
        writer.send_status("scanning").unwrap();
        writer.send_results(vec![4, 5]).unwrap();

        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            text,
            "{\"status_update\":\"scanning\"}\n{\"result_batch\":[4,5]}\n"
        );
    }

    #[tokio::test]
    async fn test_pipe_reader_decodes_until_eof() {
        let input: &[u8] = b"{\"status_update\":\"a\"}\n\n{\"result_batch\":[1,2,3]}\n";
        let mut transport = spawn_pipe_reader::<u32, _>(input);

        let mut messages = Vec::new();
        loop {
            match transport.try_receive() {
                Received::Message(m) => messages.push(m),
                Received::WouldBlock => tokio::task::yield_now().await,
                Received::Closed => break,
                Received::Fault(e) => panic!("unexpected fault: {e}"),
            }
        }

        assert_eq!(
            messages,
            vec![
                WorkerMessage::StatusUpdate("a".to_string()),
                WorkerMessage::ResultBatch(vec![1, 2, 3]),
            ]
        );
    }

    #[tokio::test]
    async fn test_pipe_reader_reports_garbage_as_fault() {
        let input: &[u8] = b"{\"result_batch\":[1]}\nnot json\n{\"result_batch\":[2]}\n";
        let mut transport = spawn_pipe_reader::<u32, _>(input);

        let mut batches = 0;
        let fault = loop {
            match transport.try_receive() {
                Received::Message(_) => batches += 1,
                Received::WouldBlock => tokio::task::yield_now().await,
                Received::Closed => panic!("expected a fault before close"),
                Received::Fault(e) => break e,
            }
        };

        assert_eq!(batches, 1);
        assert!(matches!(fault, DispatchError::ReceiveFault(_)));
        assert!(matches!(transport.try_receive(), Received::Closed));
    }
}
