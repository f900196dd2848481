pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use leadflow_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "leadflow",
    about = "Leadflow operator CLI",
    long_about = "Operate lead assignment: migrations, demo data, config inspection, readiness checks, \
                  assignment, rebalancing and manager attachment.",
    after_help = "Examples:\n  leadflow doctor --json\n  leadflow assign LEAD-008 --requester MGR-002\n  leadflow rebalance acme-realty --executive EXE-002 --executive EXE-003"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo organisation and verify it")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run automatic assignment for one lead")]
    Assign {
        lead_id: String,
        #[arg(long, help = "Member on whose behalf the lead is assigned")]
        requester: Option<String>,
        #[arg(long, help = "Member recorded on the activity entry")]
        performed_by: Option<String>,
    },
    #[command(about = "Rebalance pipeline leads across executives of a company")]
    Rebalance {
        company_id: String,
        #[arg(long = "executive", help = "Restrict the roster to these executives (repeatable)")]
        executives: Vec<String>,
    },
    #[command(about = "Attach a parentless executive to the least loaded manager")]
    Attach { member_id: String },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Assign { lead_id, requester, performed_by } => {
            commands::assign::run(&lead_id, requester.as_deref(), performed_by.as_deref())
        }
        Command::Rebalance { company_id, executives } => {
            commands::rebalance::run(&company_id, &executives)
        }
        Command::Attach { member_id } => commands::attach::run(&member_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr; stdout carries only the command payload.
fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
