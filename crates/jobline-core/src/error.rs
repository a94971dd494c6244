use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::Role;

#[derive(Debug, Error)]
pub enum JoblineError {
    #[error("failed to bind {role} listener on {addr}: {source}")]
    Bind {
        role: Role,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("job text must not be empty")]
    EmptyJob,

    #[error("unexpected reply from broker: {0:?}")]
    UnexpectedReply(String),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, JoblineError>;
