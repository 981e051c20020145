mod env;
mod job;

pub use env::EnvCommands;
pub use job::{CreateJobArgs, JobCommands};
