//! Repository modules for Ferry entities.
//!
//! Each module adds methods to `FerryStore` via `impl FerryStore` blocks.

pub mod checkpoint;
pub mod environment;
pub mod job;
pub mod outcome;
pub mod retry_batch;
pub mod run;
