//! Broker - readiness-driven connection multiplexer.
//!
//! 単一タスクのイベントループ。二つの listener と全コネクションの
//! readiness を待ち、届いた行を router に渡して応答を書き戻す。
//!
//! # Flow
//! 1. Wait (bounded by `poll_interval`) for: shutdown, a pending accept on
//!    either listener, or any registered connection becoming readable.
//! 2. Accept: register the socket with the role of its listener.
//! 3. Readable: sweep every connection with one bounded non-blocking read,
//!    frame complete lines, route each and write the single reply back.
//! 4. Any read error, zero-length read, oversized line or failed write tears
//!    the connection down.
//!
//! The `JobStore` is owned by the loop and only touched from step 3, so it
//! needs no lock.

pub mod registry;

pub use registry::{Connection, ConnectionId, ConnectionRegistry};

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::error::{JoblineError, Result};
use crate::observability::JobCounts;
use crate::protocol::{Role, route};
use crate::store::JobStore;

pub struct Broker {
    config: BrokerConfig,
    client_listener: TcpListener,
    worker_listener: TcpListener,
    registry: ConnectionRegistry,
    store: JobStore,
    read_buf: Vec<u8>,
}

/// What woke the loop up.
enum Readiness {
    Shutdown,
    Accepted(Role, io::Result<(TcpStream, SocketAddr)>),
    Readable(ConnectionId, io::Result<()>),
    Idle,
}

/// What to do with a connection after servicing it.
#[derive(Debug, PartialEq, Eq)]
enum Fate {
    Keep,
    Close(String),
}

impl Broker {
    /// Bind both listeners. This is the only fatal error of the broker.
    pub async fn bind(config: BrokerConfig) -> Result<Self> {
        config.validate()?;

        let client_listener = bind_listener(Role::Client, config.client_addr).await?;
        let worker_listener = bind_listener(Role::Worker, config.worker_addr).await?;

        Ok(Self {
            registry: ConnectionRegistry::new(config.max_line_bytes),
            store: JobStore::new(),
            read_buf: vec![0u8; config.read_chunk_bytes],
            config,
            client_listener,
            worker_listener,
        })
    }

    pub fn client_addr(&self) -> Result<SocketAddr> {
        Ok(self.client_listener.local_addr()?)
    }

    pub fn worker_addr(&self) -> Result<SocketAddr> {
        Ok(self.worker_listener.local_addr()?)
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Run until `shutdown` is cancelled. Returns the final job counts.
    pub async fn run(mut self, shutdown: CancellationToken) -> JobCounts {
        info!(
            client = ?self.client_listener.local_addr().ok(),
            worker = ?self.worker_listener.local_addr().ok(),
            "broker listening"
        );
        let poll_interval = self.config.poll_interval();

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => Readiness::Shutdown,
                accepted = self.client_listener.accept() => Readiness::Accepted(Role::Client, accepted),
                accepted = self.worker_listener.accept() => Readiness::Accepted(Role::Worker, accepted),
                (id, result) = self.registry.readable() => Readiness::Readable(id, result),
                _ = tokio::time::sleep(poll_interval) => Readiness::Idle,
            };

            match event {
                Readiness::Shutdown => break,
                Readiness::Accepted(role, Ok((stream, peer))) => {
                    let id = self.registry.register(stream, peer, role);
                    debug!(conn = %id, %role, %peer, open = self.registry.len(), "connection accepted");
                }
                Readiness::Accepted(role, Err(e)) => {
                    warn!(%role, error = %e, "accept failed");
                }
                Readiness::Readable(id, Err(e)) => {
                    self.teardown(id, &format!("socket error: {e}"));
                }
                Readiness::Readable(_, Ok(())) => self.service_ready().await,
                Readiness::Idle => {
                    let counts = self.store.counts();
                    debug!(
                        waiting = counts.waiting,
                        running = counts.running,
                        completed = counts.completed,
                        clients = self.registry.count_role(Role::Client),
                        workers = self.registry.count_role(Role::Worker),
                        "idle"
                    );
                }
            }
        }

        let counts = self.store.counts();
        info!(
            waiting = counts.waiting,
            running = counts.running,
            completed = counts.completed,
            "broker stopped"
        );
        counts
    }

    /// One bounded read from every connection that has data.
    async fn service_ready(&mut self) {
        let write_timeout = self.config.write_timeout();
        for id in self.registry.ids() {
            let Some(conn) = self.registry.get_mut(id) else {
                continue;
            };
            let fate =
                service_connection(conn, &mut self.store, &mut self.read_buf, write_timeout).await;
            if let Fate::Close(reason) = fate {
                self.teardown(id, &reason);
            }
        }
    }

    fn teardown(&mut self, id: ConnectionId, reason: &str) {
        if let Some(conn) = self.registry.remove(id) {
            debug!(
                conn = %id,
                role = %conn.role,
                peer = %conn.peer,
                discarded = conn.framer.remainder().len(),
                reason,
                "connection closed"
            );
        }
    }
}

async fn bind_listener(role: Role, addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| JoblineError::Bind { role, addr, source })
}

async fn service_connection(
    conn: &mut Connection,
    store: &mut JobStore,
    buf: &mut [u8],
    write_timeout: Duration,
) -> Fate {
    let n = match conn.try_read(buf) {
        Ok(None) => return Fate::Keep,
        Ok(Some(0)) => return Fate::Close("peer closed".to_string()),
        Ok(Some(n)) => n,
        Err(e) => return Fate::Close(format!("read failed: {e}")),
    };

    let lines = match conn.framer.push(&buf[..n]) {
        Ok(lines) => lines,
        Err(e) => return Fate::Close(e.to_string()),
    };

    for line in lines {
        let Some(response) = route(conn.role, &line, store) else {
            continue;
        };
        if let Err(e) = conn.send_line(&response.to_string(), write_timeout).await {
            return Fate::Close(format!("write failed: {e}"));
        }
    }
    Fate::Keep
}
