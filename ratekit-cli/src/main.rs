//! Ratekit CLI - batch rate imports for your billing platform

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{config, demo, exists, export, import, logs, services};

/// Ratekit - import and export rate revisions
#[derive(Parser)]
#[command(name = "ratekit", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import rate revisions from a CSV file
    Import {
        /// CSV file with account_id, service_key/service_id, rate, cogs, revision_start_date
        file: PathBuf,
        /// Rows per submission chunk (defaults to import.chunkSize)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Validate and show the plan without submitting anything
        #[arg(long)]
        preview: bool,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
        /// Don't compare the file with accounts and rates already on the server
        #[arg(long)]
        skip_server_check: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export existing rate revisions to CSV
    Export {
        /// Which revisions to export: all, latest or list-prices
        #[arg(long, default_value = "all")]
        mode: String,
        /// Output file (prints to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the service catalog
    Services {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a rate revision already exists
    Exists {
        /// Account id (0 for a global rate)
        #[arg(long)]
        account: u64,
        /// Service key or numeric service id
        #[arg(long)]
        service: String,
        /// Effective date (YYYYMMDD or YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or change settings
    Config {
        #[command(subcommand)]
        command: Option<config::ConfigCommands>,
    },

    /// Manage demo mode (offline in-memory backend)
    Demo {
        #[command(subcommand)]
        command: Option<demo::DemoCommands>,
    },

    /// View and manage the event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Import { .. } => "import",
            Commands::Export { .. } => "export",
            Commands::Services { .. } => "services",
            Commands::Exists { .. } => "exists",
            Commands::Config { .. } => "config",
            Commands::Demo { .. } => "demo",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    commands::log_command(cli.command.name());

    match cli.command {
        Commands::Import { file, chunk_size, preview, yes, skip_server_check, json } => {
            import::run(&file, chunk_size, preview, yes, !skip_server_check, json)
        }
        Commands::Export { mode, output, json } => export::run(&mode, output.as_deref(), json),
        Commands::Services { json } => services::run(json),
        Commands::Exists { account, service, date, json } => {
            exists::run(account, &service, &date, json)
        }
        Commands::Config { command } => config::run(command),
        Commands::Demo { command } => demo::run(command),
        Commands::Logs { command } => logs::run(command),
    }
}
