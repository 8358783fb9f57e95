mod commands;
mod input;
mod output;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::calc::{IndexationArgs, ProrateArgs};
use commands::lease::{
    ApproveArgs, CalculateArgs, ChangeDatesArgs, InvoicesArgs, SettingsOverrides, TerminateArgs, VerifyArgs,
    WorkbookArgs,
};

/// Lease term verification, approval and invoice calculation
#[derive(Parser)]
#[command(
    name = "leaseterm",
    version,
    about = "Lease term verification, approval and invoice calculation",
    long_about = "A CLI over a JSON lease workbook (lease, invoices, index values and \
                  settings). Rolls term chains forward, applies indexation, approves \
                  terms and reconciles invoice items with decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Settings file (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Epoch date overriding the configured one
    #[arg(long, global = true, conflicts_with = "no_epoch")]
    epoch_date: Option<NaiveDate>,

    /// Ignore any configured epoch date
    #[arg(long, global = true)]
    no_epoch: bool,

    /// Log debug events to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh new terms and roll term chains forward
    Verify(VerifyArgs),
    /// Approve all new terms (and optionally due invoices)
    Approve(ApproveArgs),
    /// Reconcile invoice items for a period
    Calculate(CalculateArgs),
    /// Move the start and end of one term
    ChangeDates(ChangeDatesArgs),
    /// Terminate the lease on a date
    Terminate(TerminateArgs),
    /// List every term of every item
    Timeline(WorkbookArgs),
    /// List the invoice items of the lease
    Invoices(InvoicesArgs),
    /// Index a value by the ratio of two index values
    Indexation(IndexationArgs),
    /// Prorate an annual value over billing cycles
    Prorate(ProrateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let overrides = SettingsOverrides {
        config: cli.config,
        epoch_date: cli.epoch_date,
        no_epoch: cli.no_epoch,
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Verify(args) => commands::lease::run_verify(args, &overrides),
        Commands::Approve(args) => commands::lease::run_approve(args, &overrides),
        Commands::Calculate(args) => commands::lease::run_calculate(args, &overrides),
        Commands::ChangeDates(args) => commands::lease::run_change_dates(args, &overrides),
        Commands::Terminate(args) => commands::lease::run_terminate(args, &overrides),
        Commands::Timeline(args) => commands::lease::run_timeline(args, &overrides),
        Commands::Invoices(args) => commands::lease::run_invoices(args, &overrides),
        Commands::Indexation(args) => commands::calc::run_indexation(args),
        Commands::Prorate(args) => commands::calc::run_prorate(args),
        Commands::Version => {
            println!("leaseterm {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
