//! Protocol router: one request line in, at most one response line out.

use tracing::debug;

use super::{Request, Response, Role, StatusTarget};
use crate::store::JobStore;

/// Interpret `line` from a connection with `role` against `store`.
///
/// Returns `None` for a blank line; nothing is mutated in that case and the
/// caller sends nothing back. Every `Response::Err` path leaves the store
/// untouched.
pub fn route(role: Role, line: &str, store: &mut JobStore) -> Option<Response> {
    let request = Request::parse(role, line)?;

    let response = match request {
        Request::Submit(text) => match store.submit(text) {
            Ok(id) => {
                debug!(job_id = %id, "job submitted");
                Response::Id(id)
            }
            Err(_) => Response::Err,
        },
        Request::Status(StatusTarget::Id(id)) => {
            store.state(id).map_or(Response::Unknown, Response::State)
        }
        Request::Status(StatusTarget::NeverIssued) => Response::Unknown,
        Request::Fetch => match store.fetch() {
            Some(assignment) => {
                debug!(job_id = %assignment.id, "job assigned");
                Response::Job {
                    id: assignment.id,
                    text: assignment.text,
                }
            }
            None => Response::NoJob,
        },
        Request::Done(Some(id)) => match store.complete(id) {
            Ok(job) => {
                debug!(job_id = %id, age_ms = job.age().as_millis() as u64, "job completed");
                Response::Ok
            }
            Err(err) => {
                debug!(job_id = %id, error = %err, "done rejected");
                Response::Err
            }
        },
        Request::Done(None) | Request::Invalid => Response::Err,
    };
    Some(response)
}
