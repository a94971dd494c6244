//! Client helpers: submit jobs and query status over the client port.
//!
//! Every call opens a fresh connection, sends one line and reads one line,
//! which is how the protocol is meant to be used from the command line.

use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::domain::JobId;
use crate::error::{JoblineError, Result};

/// Words `random_job_text` draws from.
pub const VOCABULARY: &[&str] = &[
    "analyze", "process", "compute", "calculate", "transform", "optimize", "generate",
    "encrypt", "decode", "compress", "extract", "validate", "filter", "sort", "merge",
    "backup", "restore", "monitor", "scan", "index", "search", "query", "update",
    "synchronize", "migrate", "convert", "parse", "render", "compile", "execute",
    "database", "algorithm", "network", "security", "performance", "scalability",
    "distributed", "parallel", "concurrent", "asynchronous", "real-time", "batch",
    "streaming", "pipeline", "workflow", "scheduler", "load-balancer", "cache",
    "server", "client", "protocol", "authentication", "authorization", "encryption",
    "hash", "signature", "certificate", "token", "session", "transaction", "commit",
    "rollback", "checkpoint", "recovery", "failover", "redundancy", "availability",
    "throughput", "latency", "bandwidth", "capacity", "utilization", "efficiency",
    "resource", "allocation", "partition", "shard", "replica", "cluster", "node",
    "container", "microservice", "API", "REST", "GraphQL", "JSON", "XML", "YAML",
    "configuration", "deployment", "monitoring", "logging", "debugging", "testing",
    "validation", "verification", "simulation", "modeling", "prediction", "analysis",
];

const MAX_RANDOM_WORDS: usize = 5;

/// Send one line, return the first reply line (without the newline).
pub async fn request(addr: &str, line: &str) -> Result<String> {
    let stream = TcpStream::connect(addr).await?;
    let (read, mut write) = stream.into_split();

    write.write_all(format!("{line}\n").as_bytes()).await?;

    let mut reply = String::new();
    let n = BufReader::new(read).read_line(&mut reply).await?;
    if n == 0 {
        return Err(JoblineError::ConnectionClosed);
    }
    Ok(reply.trim_end_matches(['\r', '\n']).to_string())
}

/// Submit `text` as a job and return its id.
pub async fn submit(addr: &str, text: &str) -> Result<JobId> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return Err(JoblineError::EmptyJob);
    }

    let reply = request(addr, &format!("JOB {text}")).await?;
    parse_id_reply(&reply)
}

/// Ask for a job's state. The broker's answer is returned as-is.
pub async fn status(addr: &str, id: &str) -> Result<String> {
    request(addr, &format!("STATUS {id}")).await
}

fn parse_id_reply(reply: &str) -> Result<JobId> {
    reply
        .strip_prefix("ID ")
        .and_then(|id| id.trim().parse::<JobId>().ok())
        .ok_or_else(|| JoblineError::UnexpectedReply(reply.to_string()))
}

/// 1 to 5 distinct words from `VOCABULARY`.
pub fn random_job_text<R: Rng + ?Sized>(rng: &mut R) -> String {
    let count = rng.gen_range(1..=MAX_RANDOM_WORDS);
    VOCABULARY
        .choose_multiple(rng, count)
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Outcome of one job in an auto-call batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub text: String,
    pub job_id: Option<JobId>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoCallSummary {
    pub submissions: Vec<Submission>,
}

impl AutoCallSummary {
    pub fn job_ids(&self) -> Vec<JobId> {
        self.submissions.iter().filter_map(|s| s.job_id).collect()
    }

    pub fn failures(&self) -> usize {
        self.submissions.iter().filter(|s| s.error.is_some()).count()
    }
}

/// Submit `count` random jobs, one connection each, `delay` apart.
///
/// A failed submission is recorded and the batch carries on.
pub async fn auto_call(addr: &str, count: usize, delay: Duration) -> AutoCallSummary {
    let mut summary = AutoCallSummary::default();

    for i in 0..count {
        // thread_rng is !Send; keep it out of the await points
        let text = random_job_text(&mut rand::thread_rng());
        let submission = match submit(addr, &text).await {
            Ok(id) => {
                debug!(n = i + 1, job_id = %id, text = %text, "submitted");
                Submission { text, job_id: Some(id), error: None }
            }
            Err(e) => {
                warn!(n = i + 1, error = %e, "submit failed");
                Submission { text, job_id: None, error: Some(e.to_string()) }
            }
        };
        summary.submissions.push(submission);

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    summary
}
