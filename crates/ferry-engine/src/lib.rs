//! # ferry-engine
//!
//! Executes migration jobs: reads rows from a source environment, reshapes them
//! with the job's column mapping, and writes them to a destination environment.
//!
//! - [`JobScheduler`]: submit, cancel, retry; one running job at a time
//! - [`extract::RowExtractor`]: lazy paged read of the source entity
//! - [`transform::RowTransformer`]: pure mapping application
//! - [`load::RowLoader`]: destination writes with in-process backoff
//! - [`retry::RetryCoordinator`]: retry-batch membership and attempt numbers
//! - [`progress::ProgressTracker`]: counters, percent, and rate of the active run

pub mod error;
pub mod extract;
pub mod load;
mod pipeline;
pub mod progress;
pub mod retry;
mod scheduler;
pub mod transform;

pub use error::{EngineError, LoadError, SequenceError, TransformError};
pub use pipeline::RunEnd;
pub use progress::ProgressSnapshot;
pub use scheduler::{EngineSettings, INTERRUPTED_REASON, JobScheduler, RecoveryReport};
