//! Line protocol shared by the broker, the worker and the client.
//!
//! One command or one reply per `\n`-terminated line, strictly
//! request/response per connection.
//!
//! | Sender | Line | Response |
//! |---|---|---|
//! | Client | `JOB <text>` | `ID <id>` |
//! | Client | `STATUS <id>` | `waiting` / `running` / `completed` / `unknown` |
//! | Worker | `FETCH` | `JOB <id> <text>` / `NOJOB` |
//! | Worker | `DONE <id>` | `OK` / `ERR` |
//!
//! Anything else gets `ERR`.

pub mod framer;
pub mod router;

pub use framer::{FrameError, LineFramer};
pub use router::route;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{JobId, JobState};

/// Which listener a connection came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Worker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Worker => f.write_str("worker"),
        }
    }
}

/// STATUS argument: either a well-formed id or an integer no job can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTarget {
    Id(JobId),
    NeverIssued,
}

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Submit(String),
    Status(StatusTarget),
    Fetch,
    Done(Option<JobId>),
    Invalid,
}

impl Request {
    /// Parse one stripped line. `None` means the line was blank.
    pub fn parse(role: Role, line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next()?.to_ascii_uppercase();
        let args: Vec<&str> = tokens.collect();

        let request = match (role, command.as_str(), args.as_slice()) {
            (Role::Client, "JOB", text) if !text.is_empty() => Request::Submit(text.join(" ")),
            (Role::Client, "STATUS", [id]) => match parse_integer(id) {
                Some(value) => Request::Status(
                    u64::try_from(value)
                        .map(|v| StatusTarget::Id(JobId::new(v)))
                        .unwrap_or(StatusTarget::NeverIssued),
                ),
                None => Request::Invalid,
            },
            (Role::Worker, "FETCH", _) => Request::Fetch,
            (Role::Worker, "DONE", [id, ..]) => {
                Request::Done(parse_integer(id).and_then(|v| u64::try_from(v).ok()).map(JobId::new))
            }
            _ => Request::Invalid,
        };
        Some(request)
    }
}

/// Any optionally signed run of digits is an integer; values past `i128`
/// saturate, which still lands outside every issued id.
fn parse_integer(token: &str) -> Option<i128> {
    if let Ok(value) = token.parse::<i128>() {
        return Some(value);
    }
    let (negative, digits) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(if negative { i128::MIN } else { i128::MAX })
}

/// A reply line sent by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Id(JobId),
    State(JobState),
    Unknown,
    Job { id: JobId, text: String },
    NoJob,
    Ok,
    Err,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Id(id) => write!(f, "ID {id}"),
            Response::State(state) => f.write_str(state.as_str()),
            Response::Unknown => f.write_str("unknown"),
            Response::Job { id, text } => write!(f, "JOB {id} {text}"),
            Response::NoJob => f.write_str("NOJOB"),
            Response::Ok => f.write_str("OK"),
            Response::Err => f.write_str("ERR"),
        }
    }
}

/// How a worker reads the broker's answer to FETCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Job { id: JobId, text: String },
    NoJob,
    /// Starts with `JOB ` but carries no usable id or text.
    Malformed,
    Other(String),
}

impl Reply {
    pub fn parse(line: &str) -> Self {
        if let Some(rest) = line.strip_prefix("JOB ") {
            let rest = rest.trim_start();
            let Some((id, text)) = rest.split_once(char::is_whitespace) else {
                return Reply::Malformed;
            };
            let text = text.trim();
            return match id.parse::<JobId>() {
                Ok(id) if !text.is_empty() => Reply::Job {
                    id,
                    text: text.to_string(),
                },
                _ => Reply::Malformed,
            };
        }
        if line == "NOJOB" {
            return Reply::NoJob;
        }
        Reply::Other(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::job("JOB hello world", Request::Submit("hello world".to_string()))]
    #[case::job_lowercase("job hello", Request::Submit("hello".to_string()))]
    #[case::job_squeezes_spaces("JOB  a   b\tc ", Request::Submit("a b c".to_string()))]
    #[case::job_without_text("JOB", Request::Invalid)]
    #[case::status("STATUS 3", Request::Status(StatusTarget::Id(JobId::new(3))))]
    #[case::status_mixed_case("Status 3", Request::Status(StatusTarget::Id(JobId::new(3))))]
    #[case::status_negative("STATUS -4", Request::Status(StatusTarget::NeverIssued))]
    #[case::status_not_a_number("STATUS abc", Request::Invalid)]
    #[case::status_missing_id("STATUS", Request::Invalid)]
    #[case::status_extra_args("STATUS 1 2", Request::Invalid)]
    #[case::status_huge("STATUS 1000000000000000000000000000000000000000000", Request::Status(StatusTarget::NeverIssued))]
    #[case::status_huge_negative("STATUS -99999999999999999999999999999999999999999", Request::Status(StatusTarget::NeverIssued))]
    #[case::status_sign_only("STATUS -", Request::Invalid)]
    #[case::worker_verb("FETCH", Request::Invalid)]
    #[case::garbage("HELLO", Request::Invalid)]
    fn parses_client_lines(#[case] line: &str, #[case] expected: Request) {
        assert_eq!(Request::parse(Role::Client, line), Some(expected));
    }

    #[rstest]
    #[case::fetch("FETCH", Request::Fetch)]
    #[case::fetch_lowercase("fetch", Request::Fetch)]
    #[case::fetch_with_args("FETCH now", Request::Fetch)]
    #[case::done("DONE 7", Request::Done(Some(JobId::new(7))))]
    #[case::done_not_a_number("DONE seven", Request::Done(None))]
    #[case::done_negative("DONE -7", Request::Done(None))]
    #[case::done_extra_args("DONE 7 extra", Request::Done(Some(JobId::new(7))))]
    #[case::done_huge("DONE 1000000000000000000000000000000000000000000", Request::Done(None))]
    #[case::done_missing_id("DONE", Request::Invalid)]
    #[case::client_verb("JOB x", Request::Invalid)]
    fn parses_worker_lines(#[case] line: &str, #[case] expected: Request) {
        assert_eq!(Request::parse(Role::Worker, line), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t\r")]
    fn blank_lines_are_not_requests(#[case] line: &str) {
        assert_eq!(Request::parse(Role::Client, line), None);
        assert_eq!(Request::parse(Role::Worker, line), None);
    }

    #[test]
    fn responses_render_wire_lines() {
        assert_eq!(Response::Id(JobId::new(1)).to_string(), "ID 1");
        assert_eq!(Response::State(JobState::Running).to_string(), "running");
        assert_eq!(Response::Unknown.to_string(), "unknown");
        assert_eq!(
            Response::Job { id: JobId::new(2), text: "a b".to_string() }.to_string(),
            "JOB 2 a b"
        );
        assert_eq!(Response::NoJob.to_string(), "NOJOB");
        assert_eq!(Response::Ok.to_string(), "OK");
        assert_eq!(Response::Err.to_string(), "ERR");
    }

    #[rstest]
    #[case::job("JOB 4 hello world", Reply::Job { id: JobId::new(4), text: "hello world".to_string() })]
    #[case::nojob("NOJOB", Reply::NoJob)]
    #[case::missing_text("JOB 4", Reply::Malformed)]
    #[case::bad_id("JOB x hello", Reply::Malformed)]
    #[case::blank_text("JOB 4   ", Reply::Malformed)]
    #[case::other("ERR", Reply::Other("ERR".to_string()))]
    #[case::stray_ack("OK", Reply::Other("OK".to_string()))]
    fn parses_fetch_replies(#[case] line: &str, #[case] expected: Reply) {
        assert_eq!(Reply::parse(line), expected);
    }
}
