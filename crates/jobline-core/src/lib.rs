//! jobline-core
//!
//! A minimal work-distribution broker and its worker.
//!
//! # Modules
//! - **domain**: JobId, JobState, JobRecord
//! - **store**: JobStore（waiting queue / running set / completed set）
//! - **protocol**: line framer, request/response types, router
//! - **broker**: connection registry + single-task readiness loop
//! - **worker**: fetch / execute / report runtime and its side channels
//! - **client**: one-shot JOB / STATUS helpers and the random job generator
//! - **config**, **error**, **shutdown**, **observability**

pub mod broker;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod shutdown;
pub mod store;
pub mod worker;

pub use broker::Broker;
pub use config::{BrokerConfig, WorkerConfig};
pub use domain::{JobId, JobState};
pub use error::{JoblineError, Result};
pub use observability::JobCounts;
pub use protocol::Role;
pub use store::JobStore;
pub use worker::{WorkerRuntime, WorkerState, WorkerSummary};
