pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "azops",
    about = "Azops operator CLI",
    long_about = "Check runtime readiness, apply ledger migrations, inspect configuration, and dry-run resource commands.",
    after_help = "Examples:\n  azops doctor --json\n  azops config\n  azops render disk name=disk01 resource_group=rg1 size_gb=128"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM credentials, approval channel, CLI and DB readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the Azure CLI command and monthly estimate for a resource")]
    Render {
        #[arg(help = "Resource type: resource_group, vm, disk, storage, vnet")]
        kind: String,
        #[arg(help = "Parameters as key=value, e.g. name=disk01 size_gb=128")]
        params: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Render { kind, params } => commands::render::run(&kind, &params),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
