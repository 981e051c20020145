use clap::{Args, Subcommand, ValueEnum};

use crate::cli::subcommands::{EnvCommands, JobCommands};

/// Top-level command tree.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Environment records.
    Env {
        #[command(subcommand)]
        action: EnvCommands,
    },
    /// Migration jobs.
    Job {
        #[command(subcommand)]
        action: JobCommands,
    },
    /// Run queued jobs until the queue is empty.
    Run(RunArgs),
    /// Print a JSON Schema.
    Schema(SchemaArgs),
}

/// Arguments for `ferry run`.
#[derive(Clone, Debug, Args)]
pub struct RunArgs {
    /// Seconds between progress lines on stderr.
    #[arg(long, default_value_t = 2)]
    pub progress_interval: u64,
}

/// Types with a published schema.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SchemaType {
    /// A column mapping file.
    Mapping,
    /// A job record as printed by `job get`.
    Job,
}

/// Arguments for `ferry schema`.
#[derive(Clone, Debug, Args)]
pub struct SchemaArgs {
    #[arg(value_enum)]
    pub type_name: SchemaType,
}
