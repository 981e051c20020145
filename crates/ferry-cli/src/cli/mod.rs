use clap::Parser;

pub mod global;
pub mod root_commands;
pub mod subcommands;

pub use global::{GlobalFlags, OutputFormat};
pub use root_commands::Commands;

/// Top-level CLI parser for the `ferry` binary.
#[derive(Debug, Parser)]
#[command(name = "ferry", version, about = "Ferry - CRM record migrations")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: json, table, raw
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Quiet mode (errors only, no progress lines)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project root path (defaults to the nearest directory holding .ferry)
    #[arg(short, long, global = true)]
    pub project: Option<String>,
}

impl Cli {
    #[must_use]
    pub fn global_flags(&self) -> GlobalFlags {
        GlobalFlags {
            format: self.format,
            quiet: self.quiet,
            project: self.project.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::root_commands::SchemaType;
    use super::subcommands::{EnvCommands, JobCommands};
    use super::{Cli, Commands, OutputFormat};

    #[test]
    fn clap_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_before_and_after_subcommand() {
        let cli = Cli::try_parse_from(["ferry", "--format", "table", "job", "list", "--quiet"])
            .expect("cli should parse");

        assert_eq!(cli.format, OutputFormat::Table);
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Commands::Job {
                action: JobCommands::List
            }
        ));
    }

    #[test]
    fn output_format_rejects_invalid_value() {
        assert!(Cli::try_parse_from(["ferry", "--format", "xml", "job", "list"]).is_err());
    }

    #[test]
    fn job_create_requires_both_environments() {
        let parsed = Cli::try_parse_from([
            "ferry",
            "job",
            "create",
            "--source-env",
            "env-1",
            "--source-entity",
            "contact",
            "--dest-entity",
            "Contact",
            "--mapping",
            "map.json",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn job_create_parses_all_arguments() {
        let cli = Cli::try_parse_from([
            "ferry",
            "job",
            "create",
            "--source-env",
            "env-1",
            "--dest-env",
            "env-2",
            "--source-entity",
            "contact",
            "--dest-entity",
            "Contact",
            "--mapping",
            "map.toml",
            "--name",
            "contacts",
            "--wait",
        ])
        .expect("cli should parse");

        let Commands::Job {
            action: JobCommands::Create(args),
        } = cli.command
        else {
            panic!("expected job create");
        };
        assert_eq!(args.source_env, "env-1");
        assert_eq!(args.dest_env, "env-2");
        assert_eq!(args.mapping, "map.toml");
        assert_eq!(args.name.as_deref(), Some("contacts"));
        assert!(args.wait);
    }

    #[test]
    fn outcomes_flags_parse() {
        let cli = Cli::try_parse_from([
            "ferry",
            "job",
            "outcomes",
            "job-1",
            "--failed-only",
            "--limit",
            "5",
        ])
        .expect("cli should parse");

        assert!(matches!(
            cli.command,
            Commands::Job {
                action: JobCommands::Outcomes {
                    failed_only: true,
                    limit: Some(5),
                    export: None,
                    ..
                }
            }
        ));
    }

    #[test]
    fn password_flag_takes_explicit_boolean() {
        let cli = Cli::try_parse_from(["ferry", "env", "set-password-flag", "env-1", "false"])
            .expect("cli should parse");
        assert!(matches!(
            cli.command,
            Commands::Env {
                action: EnvCommands::SetPasswordFlag {
                    configured: false,
                    ..
                }
            }
        ));
        assert!(Cli::try_parse_from(["ferry", "env", "set-password-flag", "env-1"]).is_err());
    }

    #[test]
    fn schema_accepts_known_types_only() {
        let cli = Cli::try_parse_from(["ferry", "schema", "mapping"]).expect("cli should parse");
        assert!(matches!(cli.command, Commands::Schema(args) if args.type_name == SchemaType::Mapping));
        assert!(Cli::try_parse_from(["ferry", "schema", "widget"]).is_err());
    }

    #[test]
    fn project_flag_is_copied_into_global_flags() {
        let cli = Cli::try_parse_from(["ferry", "--project", "/tmp/demo", "run"])
            .expect("cli should parse");
        assert_eq!(cli.global_flags().project.as_deref(), Some("/tmp/demo"));
    }
}
