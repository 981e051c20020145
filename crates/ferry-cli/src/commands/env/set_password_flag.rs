use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

use super::types::{EnvironmentView, lookup_error};

pub async fn run(
    id: &str,
    configured: bool,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    let environment = ctx
        .store
        .set_password_configured(id, configured)
        .await
        .map_err(lookup_error(id))?;
    tracing::info!(environment_id = id, configured, "password flag updated");
    output(
        &EnvironmentView::new(environment, &ctx.config.credentials),
        flags.format,
    )
}
