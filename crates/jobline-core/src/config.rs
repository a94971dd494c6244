//! Broker and worker configuration.
//!
//! Both structs deserialize from JSON with every field optional, so a config
//! file only needs the values it changes. Durations are kept as milliseconds.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JoblineError, Result};
use crate::protocol::framer::DEFAULT_MAX_LINE_BYTES;

pub const DEFAULT_CLIENT_PORT: u16 = 50000;
pub const DEFAULT_WORKER_PORT: u16 = 50001;
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 0, 0, 1);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub client_addr: SocketAddr,
    pub worker_addr: SocketAddr,
    /// Upper bound on one readiness wait.
    pub poll_interval_ms: u64,
    /// Bytes read per connection per readiness cycle.
    pub read_chunk_bytes: usize,
    pub max_line_bytes: usize,
    pub write_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            client_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_CLIENT_PORT)),
            worker_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_WORKER_PORT)),
            poll_interval_ms: 1000,
            read_chunk_bytes: 4096,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            write_timeout_ms: 500,
        }
    }
}

impl BrokerConfig {
    pub fn new(client_addr: SocketAddr, worker_addr: SocketAddr) -> Self {
        Self {
            client_addr,
            worker_addr,
            ..Default::default()
        }
    }

    /// Both listeners on 127.0.0.1 with OS-assigned ports.
    pub fn ephemeral() -> Self {
        let any = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        Self::new(any, any)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_chunk_bytes == 0 {
            return Err(JoblineError::Config("read_chunk_bytes must be > 0".into()));
        }
        if self.max_line_bytes == 0 {
            return Err(JoblineError::Config("max_line_bytes must be > 0".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(JoblineError::Config("poll_interval_ms must be > 0".into()));
        }
        if self.client_addr.port() != 0 && self.client_addr == self.worker_addr {
            return Err(JoblineError::Config(format!(
                "client and worker listeners share {}",
                self.client_addr
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// `host:port` of the broker's worker-facing listener.
    pub broker_addr: String,
    pub connect_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    /// Wait before the next FETCH after `NOJOB` or an unrecognized reply.
    pub fetch_interval_ms: u64,
    /// Simulated work per job word.
    pub word_delay_ms: u64,
    pub multicast_group: Ipv4Addr,
    /// UDP port words are multicast to. `None` disables the broadcast.
    pub output_port: Option<u16>,
    /// Local UDP port for lifecycle notifications. `None` disables them.
    pub syslog_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            broker_addr: format!("127.0.0.1:{DEFAULT_WORKER_PORT}"),
            connect_timeout_ms: 10_000,
            reconnect_delay_ms: 1000,
            fetch_interval_ms: 500,
            word_delay_ms: 250,
            multicast_group: DEFAULT_MULTICAST_GROUP,
            output_port: None,
            syslog_port: None,
        }
    }
}

impl WorkerConfig {
    pub fn new(broker_addr: impl Into<String>) -> Self {
        Self {
            broker_addr: broker_addr.into(),
            ..Default::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.broker_addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => match port.parse::<u16>() {
                Ok(p) if p > 0 => {}
                _ => {
                    return Err(JoblineError::Config(format!(
                        "invalid broker port in {:?}",
                        self.broker_addr
                    )));
                }
            },
            _ => {
                return Err(JoblineError::Config(format!(
                    "broker address must be host:port, got {:?}",
                    self.broker_addr
                )));
            }
        }
        if !self.multicast_group.is_multicast() {
            return Err(JoblineError::Config(format!(
                "{} is not a multicast group",
                self.multicast_group
            )));
        }
        if self.output_port == Some(0) || self.syslog_port == Some(0) {
            return Err(JoblineError::Config("sink ports must be 1-65535".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }

    pub fn word_delay(&self) -> Duration {
        Duration::from_millis(self.word_delay_ms)
    }
}
