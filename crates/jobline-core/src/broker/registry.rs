//! Connection registry: every accepted socket, its role and its framer.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures::future::select_all;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::protocol::{LineFramer, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An accepted socket. Dropping it closes the socket.
#[derive(Debug)]
pub struct Connection {
    pub role: Role,
    pub peer: SocketAddr,
    pub(crate) stream: TcpStream,
    pub(crate) framer: LineFramer,
}

impl Connection {
    /// Non-blocking read of at most `buf.len()` bytes.
    ///
    /// `Ok(None)` means nothing was ready; `Ok(Some(0))` means the peer closed.
    pub(crate) fn try_read(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.stream.try_read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write one reply line, giving up after `timeout`.
    pub(crate) async fn send_line(&mut self, line: &str, timeout: Duration) -> io::Result<()> {
        let mut payload = Vec::with_capacity(line.len() + 1);
        payload.extend_from_slice(line.as_bytes());
        payload.push(b'\n');

        match tokio::time::timeout(timeout, self.stream.write_all(&payload)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        }
    }
}

/// Open connections keyed by id. Iteration order is accept order.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, Connection>,
    next_id: u64,
    max_line_bytes: usize,
}

impl ConnectionRegistry {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: 0,
            max_line_bytes,
        }
    }

    pub fn register(&mut self, stream: TcpStream, peer: SocketAddr, role: Role) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.connections.insert(
            id,
            Connection {
                role,
                peer,
                stream,
                framer: LineFramer::with_max_line(self.max_line_bytes),
            },
        );
        id
    }

    /// Remove and return the connection; dropping the return value closes it.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.connections.values().filter(|c| c.role == role).count()
    }

    /// Wait until any registered connection is readable (or errored).
    ///
    /// Never resolves while the registry is empty.
    pub async fn readable(&self) -> (ConnectionId, io::Result<()>) {
        if self.connections.is_empty() {
            return std::future::pending().await;
        }
        let waits = self.connections.iter().map(|(id, conn)| {
            let id = *id;
            Box::pin(async move { (id, conn.stream.readable().await) })
        });
        let (ready, _, _) = select_all(waits).await;
        ready
    }
}
