// Shared helpers for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use jobline_core::{Broker, BrokerConfig, JobCounts};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestBroker {
    pub client_addr: SocketAddr,
    pub worker_addr: SocketAddr,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<JobCounts>,
}

impl TestBroker {
    pub async fn start() -> Self {
        Self::start_with(BrokerConfig::ephemeral()).await
    }

    pub async fn start_with(mut config: BrokerConfig) -> Self {
        config.poll_interval_ms = 100;
        let broker = Broker::bind(config).await.unwrap();
        let client_addr = broker.client_addr().unwrap();
        let worker_addr = broker.worker_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(broker.run(shutdown.clone()));
        Self {
            client_addr,
            worker_addr,
            shutdown,
            handle,
        }
    }

    pub async fn client(&self) -> LineConn {
        LineConn::connect(self.client_addr).await
    }

    pub async fn worker(&self) -> LineConn {
        LineConn::connect(self.worker_addr).await
    }

    pub async fn stop(self) -> JobCounts {
        self.shutdown.cancel();
        tokio::time::timeout(REPLY_TIMEOUT, self.handle)
            .await
            .unwrap()
            .unwrap()
    }
}

/// A raw protocol connection: write lines, read reply lines.
pub struct LineConn {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl LineConn {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Next reply line, `None` once the broker closed the connection.
    pub async fn read_line(&mut self) -> Option<String> {
        match tokio::time::timeout(REPLY_TIMEOUT, self.lines.next_line()).await {
            Ok(Ok(line)) => line,
            Ok(Err(_)) => None,
            Err(_) => panic!("no reply within {REPLY_TIMEOUT:?}"),
        }
    }

    pub async fn send(&mut self, line: &str) -> String {
        self.write_raw(format!("{line}\n").as_bytes()).await;
        self.read_line().await.expect("connection closed")
    }
}
