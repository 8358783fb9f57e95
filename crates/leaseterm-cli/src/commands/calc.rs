use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use leaseterm_core::frequency::InvoicingFrequency;
use leaseterm_core::indexation::{self, IndexationInput};
use leaseterm_core::interval::DateInterval;
use leaseterm_core::proration::{self, ProrationInput};

use crate::input;

/// Arguments for a single indexation
#[derive(Args)]
pub struct IndexationArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Index value at the base date
    #[arg(long)]
    pub base_index: Option<Decimal>,

    /// Index value at the next date
    #[arg(long)]
    pub next_index: Option<Decimal>,

    /// Value to index
    #[arg(long)]
    pub base_value: Option<Decimal>,

    /// Product of rebase factors between the two index bases
    #[arg(long)]
    pub rebase_factor: Option<Decimal>,
}

pub fn run_indexation(args: IndexationArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let indexation_input: IndexationInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        let base_value = args
            .base_value
            .ok_or("--base-value is required (or provide --input)")?;
        IndexationInput {
            base_index_value: args.base_index,
            next_index_value: args.next_index,
            base_value,
            rebase_factor: args.rebase_factor,
        }
    };

    let result = indexation::calculate_indexation(&indexation_input)?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for prorating an annual value
#[derive(Args)]
pub struct ProrateArgs {
    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Annual value
    #[arg(long)]
    pub value: Option<Decimal>,

    /// Invoicing frequency, e.g. QUARTERLY_IN_ADVANCE
    #[arg(long)]
    pub frequency: Option<InvoicingFrequency>,

    /// First day the value applies
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// Last day the value applies (default: open-ended)
    #[arg(long)]
    pub to: Option<NaiveDate>,

    /// First day of the period to prorate
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last day of the period (default: the whole cycle containing --start)
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

pub fn run_prorate(args: ProrateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let proration_input: ProrationInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        let value = args.value.ok_or("--value is required (or provide --input)")?;
        let frequency = args
            .frequency
            .ok_or("--frequency is required (or provide --input)")?;
        let period_start = args.start.ok_or("--start is required (or provide --input)")?;
        ProrationInput {
            effective_interval: DateInterval::including(args.from, args.to)?,
            period_start,
            period_end: args.end,
            value,
            frequency,
        }
    };

    let result = proration::prorate(&proration_input)?;
    Ok(serde_json::to_value(result)?)
}
