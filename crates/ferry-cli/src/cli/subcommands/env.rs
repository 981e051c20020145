use clap::Subcommand;

/// Environment record commands.
#[derive(Clone, Debug, Subcommand)]
pub enum EnvCommands {
    /// Register an environment.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        username: String,
        /// Mark the password as configured (the secret lives in config).
        #[arg(long)]
        password_configured: bool,
    },
    /// List environments.
    List,
    /// Get an environment by ID.
    Get { id: String },
    /// Set or clear the password-configured flag.
    SetPasswordFlag {
        id: String,
        #[arg(action = clap::ArgAction::Set)]
        configured: bool,
    },
}
