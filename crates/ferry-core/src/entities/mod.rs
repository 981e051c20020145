//! Entity structs for all Ferry domain objects.
//!
//! Each entity maps to a table in the libSQL database. All structs derive
//! `Serialize`, `Deserialize`, and `JsonSchema` for JSON output and schema
//! validation.

mod environment;
mod job;
mod outcome;
mod retry_batch;
mod run;

pub use environment::Environment;
pub use job::{Job, JobSpec, JobSummary};
pub use outcome::RowOutcome;
pub use retry_batch::{RetryBatch, RetryEntry};
pub use run::JobRun;
