use anyhow::{Context, bail};

use crate::cli::GlobalFlags;
use crate::context::AppContext;
use crate::output::output;

use super::types::EnvironmentView;

pub async fn run(
    name: &str,
    url: &str,
    username: &str,
    password_configured: bool,
    ctx: &AppContext,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    validate(name, url, username)?;
    let environment = ctx
        .store
        .create_environment(name.trim(), url.trim_end_matches('/'), username, password_configured)
        .await
        .context("failed to create environment")?;
    tracing::info!(environment_id = %environment.id, "environment registered");

    if password_configured && ctx.config.credentials.password_for(&environment.id).is_none() {
        eprintln!(
            "note: set the password with FERRY_CREDENTIALS__{}=<secret> or [credentials] in .ferry/config.toml",
            environment.id.replace('-', "_").to_ascii_uppercase()
        );
    }
    output(
        &EnvironmentView::new(environment, &ctx.config.credentials),
        flags.format,
    )
}

fn validate(name: &str, url: &str, username: &str) -> anyhow::Result<()> {
    if name.trim().is_empty() {
        bail!("environment name must not be blank");
    }
    if username.trim().is_empty() {
        bail!("environment username must not be blank");
    }
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        bail!("environment url must start with http:// or https:// (got '{url}')");
    }
    Ok(())
}
