use clap::{Args, Subcommand};

/// Migration job commands.
#[derive(Clone, Debug, Subcommand)]
pub enum JobCommands {
    /// Submit a job.
    Create(CreateJobArgs),
    /// List jobs with progress.
    List,
    /// Get a job by ID.
    Get { id: String },
    /// Cancel a queued or running job.
    Cancel { id: String },
    /// Queue a retry pass over a job's failed rows.
    Retry {
        id: String,
        /// Run the retry here and wait for it to finish.
        #[arg(long)]
        wait: bool,
    },
    /// Show the row-outcome log.
    Outcomes {
        id: String,
        #[arg(long)]
        failed_only: bool,
        #[arg(long)]
        limit: Option<u32>,
        /// Write the log as JSON Lines instead of printing it.
        #[arg(long)]
        export: Option<String>,
    },
    /// Show rows waiting for a retry pass.
    Batch { id: String },
}

/// Arguments for `ferry job create`.
#[derive(Clone, Debug, Args)]
pub struct CreateJobArgs {
    #[arg(long)]
    pub source_env: String,
    #[arg(long)]
    pub dest_env: String,
    #[arg(long)]
    pub source_entity: String,
    #[arg(long)]
    pub dest_entity: String,
    /// Mapping file (`.json` or `.toml`).
    #[arg(long)]
    pub mapping: String,
    #[arg(long)]
    pub name: Option<String>,
    /// Run the job here and wait for it to finish.
    #[arg(long)]
    pub wait: bool,
}
