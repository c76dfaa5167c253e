pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "leadgate",
    about = "Leadgate operator CLI",
    long_about = "Check runtime readiness, apply lead log migrations, inspect configuration, and \
                  list persisted leads for manual follow-up.",
    after_help = "Examples:\n  leadgate doctor --json\n  leadgate config\n  leadgate leads --tag system-failure --limit 20"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending lead log migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, inference readiness, and lead log connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List recent lead log rows, newest first")]
    Leads {
        #[arg(long, help = "Only rows with this tag: rescued-contact, qualified, system-failure")]
        tag: Option<String>,
        #[arg(long, default_value_t = 20, help = "Maximum number of rows to return")]
        limit: u32,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Leads { tag, limit } => commands::leads::run(tag.as_deref(), limit),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
