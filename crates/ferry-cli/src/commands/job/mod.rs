mod batch;
mod cancel;
mod create;
mod get;
mod list;
mod outcomes;
mod retry;
mod types;

use crate::cli::GlobalFlags;
use crate::cli::subcommands::JobCommands;
use crate::context::AppContext;

/// Handle `ferry job`.
pub async fn handle(action: &JobCommands, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    match action {
        JobCommands::Create(args) => create::run(args, ctx, flags).await,
        JobCommands::List => list::run(ctx, flags).await,
        JobCommands::Get { id } => get::run(id, ctx, flags).await,
        JobCommands::Cancel { id } => cancel::run(id, ctx, flags).await,
        JobCommands::Retry { id, wait } => retry::run(id, *wait, ctx, flags).await,
        JobCommands::Outcomes {
            id,
            failed_only,
            limit,
            export,
        } => outcomes::run(id, *failed_only, *limit, export.as_deref(), ctx, flags).await,
        JobCommands::Batch { id } => batch::run(id, ctx, flags).await,
    }
}
