//! Best-effort side channels used while a worker runs.
//!
//! - `WordSink`: each job word as it is processed (multicast UDP)
//! - `StatusSink`: human-readable lifecycle messages (syslog-style UDP)
//!
//! Neither is acknowledged. A failing sink never affects job execution; the
//! runtime logs the error at `debug` and moves on.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use tokio::net::UdpSocket;

/// Multicast hop limit for word datagrams.
pub const MULTICAST_TTL: u32 = 32;

#[async_trait]
pub trait WordSink: Send + Sync {
    async fn emit(&self, word: &str) -> io::Result<()>;
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn notify(&self, message: &str) -> io::Result<()>;
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl WordSink for NoopSink {
    async fn emit(&self, _word: &str) -> io::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl StatusSink for NoopSink {
    async fn notify(&self, _message: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Sends `<word>\n` datagrams to a multicast group.
#[derive(Debug)]
pub struct MulticastWordSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl MulticastWordSink {
    pub async fn new(group: Ipv4Addr, port: u16) -> io::Result<Self> {
        Self::with_target(SocketAddr::V4(SocketAddrV4::new(group, port))).await
    }

    /// Sink aimed at any address; the TTL only matters for multicast targets.
    pub async fn with_target(target: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

#[async_trait]
impl WordSink for MulticastWordSink {
    async fn emit(&self, word: &str) -> io::Result<()> {
        let payload = format!("{word}\n");
        self.socket.send_to(payload.as_bytes(), self.target).await?;
        Ok(())
    }
}

/// Sends `<14>worker: <message>\n` to a syslog listener on localhost.
///
/// Priority 14 is facility `user`, severity `info`.
#[derive(Debug)]
pub struct SyslogNotifier {
    socket: UdpSocket,
    target: SocketAddr,
}

impl SyslogNotifier {
    pub async fn new(port: u16) -> io::Result<Self> {
        Self::with_target(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await
    }

    pub async fn with_target(target: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
        Ok(Self { socket, target })
    }

    pub fn format(message: &str) -> String {
        format!("<14>worker: {message}\n")
    }
}

#[async_trait]
impl StatusSink for SyslogNotifier {
    async fn notify(&self, message: &str) -> io::Result<()> {
        self.socket
            .send_to(Self::format(message).as_bytes(), self.target)
            .await?;
        Ok(())
    }
}

/// Receives words sent by `MulticastWordSink`.
#[derive(Debug)]
pub struct MulticastListener {
    socket: UdpSocket,
}

impl MulticastListener {
    pub async fn bind(group: Ipv4Addr, port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).await?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        Ok(Self { socket })
    }

    /// Next datagram as text, trailing newline removed.
    pub async fn recv_word(&self) -> io::Result<(String, SocketAddr)> {
        let mut buf = vec![0u8; 65_535];
        let (n, from) = self.socket.recv_from(&mut buf).await?;
        Ok((decode_word(&buf[..n]), from))
    }
}

fn decode_word(datagram: &[u8]) -> String {
    String::from_utf8_lossy(datagram).trim_end().to_string()
}
