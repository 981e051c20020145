mod add;
mod get;
mod list;
mod set_password_flag;
mod types;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::EnvCommands;
use crate::context::AppContext;

/// Handle `ferry env`.
pub async fn handle(action: &EnvCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        EnvCommands::Add {
            name,
            url,
            username,
            password_configured,
        } => add::run(name, url, username, *password_configured, ctx, flags).await,
        EnvCommands::List => list::run(ctx, flags).await,
        EnvCommands::Get { id } => get::run(id, ctx, flags).await,
        EnvCommands::SetPasswordFlag { id, configured } => {
            set_password_flag::run(id, *configured, ctx, flags).await
        }
    }
}
