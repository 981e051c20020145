use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

mod bootstrap;
mod cli;
mod commands;
mod context;
mod output;
mod ui;
mod write_lock;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("ferry error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let flags = cli.global_flags();
    ui::init(&flags);

    if let cli::Commands::Schema(args) = &cli.command {
        return commands::schema::handle(args, &flags);
    }

    let project_root = resolve_project_root(flags.project.as_deref())?;
    let config = bootstrap::load_config(&project_root)?;

    let command = cli.command;
    let write_lock = if command_runs_engine(&command) {
        let lock_path = config.storage.lock_path_in(&project_root);
        Some(write_lock::acquire(&lock_path).await?)
    } else {
        None
    };

    let ctx = context::AppContext::init(&project_root, config)
        .await
        .context("failed to initialize ferry application context")?;

    let result = commands::dispatch::dispatch(command, &ctx, &flags).await;
    drop(write_lock);
    result
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("FERRY_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

/// `--project` wins; otherwise the nearest ancestor holding `.ferry`, else the
/// current directory (state is created there on first use).
fn resolve_project_root(project_override: Option<&str>) -> anyhow::Result<PathBuf> {
    if let Some(path) = project_override {
        let explicit = PathBuf::from(path);

        if explicit
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name == context::STATE_DIR)
        {
            return explicit
                .parent()
                .map(Path::to_path_buf)
                .context("invalid --project path: '.ferry' directory has no parent");
        }

        if explicit.is_dir() {
            return Ok(explicit);
        }

        anyhow::bail!(
            "invalid --project '{}': directory does not exist",
            explicit.display()
        );
    }

    let start = std::env::current_dir().context("failed to read current directory")?;
    Ok(context::find_project_root(&start).unwrap_or(start))
}

/// Commands that dispatch runs in this process and so must hold the engine lock.
fn command_runs_engine(command: &cli::Commands) -> bool {
    use crate::cli::subcommands::JobCommands;

    match command {
        cli::Commands::Run(_) => true,
        cli::Commands::Job { action } => match action {
            JobCommands::Create(args) => args.wait,
            JobCommands::Retry { wait, .. } => *wait,
            JobCommands::List
            | JobCommands::Get { .. }
            | JobCommands::Cancel { .. }
            | JobCommands::Outcomes { .. }
            | JobCommands::Batch { .. } => false,
        },
        cli::Commands::Env { .. } | cli::Commands::Schema(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{command_runs_engine, resolve_project_root};
    use crate::cli::Cli;

    fn runs_engine(args: &[&str]) -> bool {
        let cli = Cli::try_parse_from(args).expect("cli should parse");
        command_runs_engine(&cli.command)
    }

    #[test]
    fn only_dispatching_commands_take_the_lock() {
        assert!(runs_engine(&["ferry", "run"]));
        assert!(runs_engine(&["ferry", "job", "retry", "job-1", "--wait"]));
        assert!(!runs_engine(&["ferry", "job", "retry", "job-1"]));
        assert!(!runs_engine(&["ferry", "job", "cancel", "job-1"]));
        assert!(!runs_engine(&["ferry", "env", "list"]));
    }

    #[test]
    fn explicit_state_dir_resolves_to_parent() {
        let temp = tempfile::tempdir().expect("tempdir should create");
        let state = temp.path().join(".ferry");
        std::fs::create_dir(&state).expect(".ferry should create");

        let root = resolve_project_root(state.to_str()).expect("root should resolve");
        assert_eq!(root, temp.path());
    }

    #[test]
    fn missing_explicit_project_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir should create");
        let missing = temp.path().join("nope");
        let err = resolve_project_root(missing.to_str()).expect_err("should fail");
        assert!(err.to_string().contains("does not exist"));
    }
}
