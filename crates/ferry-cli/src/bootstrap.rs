use std::path::Path;

use anyhow::Context;
use ferry_config::FerryConfig;

/// Load the project's `.env` (falling back to the current directory's), then
/// the layered configuration for `project_root`.
pub fn load_config(project_root: &Path) -> anyhow::Result<FerryConfig> {
    load_project_dotenv(project_root)?;
    FerryConfig::load_in(project_root).context("failed to load ferry configuration")
}

fn load_project_dotenv(project_root: &Path) -> anyhow::Result<()> {
    let env_path = project_root.join(".env");
    if env_path.exists() {
        dotenvy::from_path(&env_path)
            .with_context(|| format!("failed to load dotenv file at {}", env_path.display()))?;
        return Ok(());
    }

    dotenvy::dotenv().ok();
    Ok(())
}
