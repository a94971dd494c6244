//! Domain model (ids, job state, job records).
//!
//! - **ids**: 強く型付けされた JobId
//! - **state**: Waiting -> Running -> Completed の状態機械
//! - **job**: JobRecord（ジョブの正本）

pub mod ids;
pub mod job;
pub mod state;

pub use ids::JobId;
pub use job::JobRecord;
pub use state::JobState;
