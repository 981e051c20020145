use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

use super::types::{EnvironmentView, lookup_error};

pub async fn run(id: &str, ctx: &AppContext, flags: &GlobalFlags) -> anyhow::Result<()> {
    let environment = ctx.store.get_environment(id).await.map_err(lookup_error(id))?;
    output(
        &EnvironmentView::new(environment, &ctx.config.credentials),
        flags.format,
    )
}
