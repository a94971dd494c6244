//! Worker runtime - fetch / execute / report loop.
//!
//! # Flow
//! 1. Connect to the broker's worker port (bounded by `connect_timeout`).
//!    On failure wait `reconnect_delay` and try again.
//! 2. Send `FETCH`, read one reply line.
//! 3. `JOB <id> <text>`: walk the words, emitting each to the word sink and
//!    sleeping `word_delay` per word, then send `DONE <id>` and read the ack.
//! 4. `NOJOB` or anything unrecognized: wait `fetch_interval`, go to 2.
//! 5. Any I/O failure drops back to 1.
//!
//! Cancellation is observed at every wait and between words. A job cut short
//! by cancellation is never reported done.

pub mod sink;
pub mod state;

pub use sink::{MulticastListener, MulticastWordSink, NoopSink, StatusSink, SyslogNotifier, WordSink};
pub use state::WorkerState;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::domain::JobId;
use crate::error::{JoblineError, Result};
use crate::protocol::Reply;

/// Totals reported when the runtime stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub completed: u64,
    pub aborted: u64,
    pub reconnects: u64,
}

/// Why a connected session ended.
enum SessionEnd {
    Cancelled,
    Lost(JoblineError),
}

enum Execution {
    Finished,
    Aborted,
}

/// Line-oriented connection to the broker.
struct BrokerLink {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: Vec<u8>,
}

impl BrokerLink {
    fn new(stream: TcpStream) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
            line: Vec::new(),
        }
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        let mut payload = Vec::with_capacity(line.len() + 1);
        payload.extend_from_slice(line.as_bytes());
        payload.push(b'\n');
        self.writer.write_all(&payload).await?;
        Ok(())
    }

    /// Next reply line without its terminator. Invalid UTF-8 is replaced,
    /// not treated as a broken connection.
    async fn recv(&mut self) -> Result<String> {
        self.line.clear();
        if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
            return Err(JoblineError::ConnectionClosed);
        }
        let mut end = self.line.len();
        while end > 0 && matches!(self.line[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        Ok(String::from_utf8_lossy(&self.line[..end]).into_owned())
    }
}

pub struct WorkerRuntime {
    config: WorkerConfig,
    words: Arc<dyn WordSink>,
    status: Arc<dyn StatusSink>,
    state_tx: watch::Sender<WorkerState>,
    summary: WorkerSummary,
}

impl WorkerRuntime {
    pub fn new(config: WorkerConfig, words: Arc<dyn WordSink>, status: Arc<dyn StatusSink>) -> Self {
        let (state_tx, _) = watch::channel(WorkerState::Disconnected);
        Self {
            config,
            words,
            status,
            state_tx,
            summary: WorkerSummary::default(),
        }
    }

    /// Runtime with both side channels disabled.
    pub fn without_sinks(config: WorkerConfig) -> Self {
        Self::new(config, Arc::new(NoopSink), Arc::new(NoopSink))
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> WorkerState {
        *self.state_tx.borrow()
    }

    /// Run until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> WorkerSummary {
        info!(broker = %self.config.broker_addr, "worker starting");

        while !cancel.is_cancelled() {
            self.set_state(WorkerState::Connecting);
            match self.connect(&cancel).await {
                Ok(Some(stream)) => {
                    self.notify("worker started").await;
                    match self.session(BrokerLink::new(stream), &cancel).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Lost(e) => {
                            warn!(error = %e, "connection lost");
                            self.notify("connection lost, reconnecting").await;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(broker = %self.config.broker_addr, error = %e, "connect failed");
                }
            }

            self.set_state(WorkerState::Disconnected);
            if pause(self.config.reconnect_delay(), &cancel).await {
                break;
            }
            self.summary.reconnects += 1;
        }

        self.set_state(WorkerState::Stopped);
        self.notify("worker stopped").await;
        info!(
            completed = self.summary.completed,
            aborted = self.summary.aborted,
            reconnects = self.summary.reconnects,
            "worker stopped"
        );
        self.summary
    }

    /// `Ok(None)` when cancelled while connecting.
    async fn connect(&self, cancel: &CancellationToken) -> Result<Option<TcpStream>> {
        let timeout = self.config.connect_timeout();
        let attempt = tokio::time::timeout(timeout, TcpStream::connect(&self.config.broker_addr));
        tokio::select! {
            _ = cancel.cancelled() => Ok(None),
            result = attempt => match result {
                Ok(stream) => Ok(Some(stream?)),
                Err(_) => Err(JoblineError::Timeout(timeout)),
            },
        }
    }

    async fn session(&mut self, mut link: BrokerLink, cancel: &CancellationToken) -> SessionEnd {
        loop {
            if cancel.is_cancelled() {
                return SessionEnd::Cancelled;
            }
            self.set_state(WorkerState::Idle);
            self.notify("fetching job").await;

            let reply = tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                reply = fetch(&mut link) => match reply {
                    Ok(reply) => reply,
                    Err(e) => return SessionEnd::Lost(e),
                },
            };

            match reply {
                Reply::Job { id, text } => match self.execute(id, &text, cancel).await {
                    Execution::Finished => {
                        if let Err(e) = self.report_done(&mut link, id).await {
                            return SessionEnd::Lost(e);
                        }
                    }
                    Execution::Aborted => return SessionEnd::Cancelled,
                },
                Reply::Malformed => {
                    debug!("skipping malformed job reply");
                }
                Reply::NoJob => {
                    if pause(self.config.fetch_interval(), cancel).await {
                        return SessionEnd::Cancelled;
                    }
                }
                Reply::Other(line) => {
                    debug!(reply = %line, "unrecognized fetch reply");
                    if pause(self.config.fetch_interval(), cancel).await {
                        return SessionEnd::Cancelled;
                    }
                }
            }
        }
    }

    async fn execute(&mut self, id: JobId, text: &str, cancel: &CancellationToken) -> Execution {
        self.set_state(WorkerState::Executing(id));
        self.notify(&format!("starting job {id}")).await;
        info!(job_id = %id, "job started");

        for word in text.split_whitespace() {
            if let Err(e) = self.words.emit(word).await {
                debug!(job_id = %id, error = %e, "word sink failed");
            }
            if pause(self.config.word_delay(), cancel).await || cancel.is_cancelled() {
                warn!(job_id = %id, "job aborted by shutdown");
                self.summary.aborted += 1;
                return Execution::Aborted;
            }
        }

        self.notify(&format!("completed job {id}")).await;
        Execution::Finished
    }

    async fn report_done(&mut self, link: &mut BrokerLink, id: JobId) -> Result<()> {
        link.send(&format!("DONE {id}")).await?;
        let ack = link.recv().await?;
        if ack == "OK" {
            self.summary.completed += 1;
            info!(job_id = %id, "job done");
        } else {
            warn!(job_id = %id, reply = %ack, "broker rejected DONE");
        }
        Ok(())
    }

    async fn notify(&self, message: &str) {
        if let Err(e) = self.status.notify(message).await {
            debug!(error = %e, "status sink failed");
        }
    }

    fn set_state(&self, next: WorkerState) {
        self.state_tx.send_replace(next);
    }
}

async fn fetch(link: &mut BrokerLink) -> Result<Reply> {
    link.send("FETCH").await?;
    let line = link.recv().await?;
    Ok(Reply::parse(&line))
}

/// Sleep for `delay` unless cancelled first. Returns true if cancelled.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
