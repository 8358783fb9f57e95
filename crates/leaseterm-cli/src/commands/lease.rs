use chrono::NaiveDate;
use clap::Args;
use serde_json::Value;
use tracing::debug;

use leaseterm_core::clock::{Clock, SystemClock};
use leaseterm_core::invoice::InvoiceRunType;
use leaseterm_core::reconcile::CalculationRequest;
use leaseterm_core::settings::EngineSettings;
use leaseterm_core::workbook::{LeaseWorkbook, TermDatesChange};

use crate::input;

type CommandResult = Result<Value, Box<dyn std::error::Error>>;

/// Global settings flags, applied on top of the workbook's own settings.
pub struct SettingsOverrides {
    pub config: Option<String>,
    pub epoch_date: Option<NaiveDate>,
    pub no_epoch: bool,
}

/// Where the workbook comes from and where the updated one goes
#[derive(Args)]
pub struct WorkbookArgs {
    /// Path to the JSON workbook (otherwise read from stdin)
    #[arg(long)]
    pub input: Option<String>,

    /// Write the updated workbook to this file
    #[arg(long)]
    pub write: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub workbook: WorkbookArgs,

    /// Roll terms forward up to this date (default: today)
    #[arg(long)]
    pub until: Option<NaiveDate>,
}

#[derive(Args)]
pub struct ApproveArgs {
    #[command(flatten)]
    pub workbook: WorkbookArgs,

    /// Also approve the invoices due on or before this date
    #[arg(long)]
    pub invoices_until: Option<NaiveDate>,
}

#[derive(Args)]
pub struct CalculateArgs {
    #[command(flatten)]
    pub workbook: WorkbookArgs,

    /// Any date in the first cycle (default: start of the current quarter)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last date of the period (default: one cycle)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Due date for every item (default: each cycle's own due date)
    #[arg(long)]
    pub due: Option<NaiveDate>,

    /// Book the items on a retro run
    #[arg(long)]
    pub retro: bool,
}

#[derive(Args)]
pub struct ChangeDatesArgs {
    #[command(flatten)]
    pub workbook: WorkbookArgs,

    /// Lease item id
    #[arg(long)]
    pub item: u32,

    /// Term id within the item
    #[arg(long)]
    pub term: u32,

    /// New first day of the term
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// New last day of the term (omit for open-ended)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Move the neighbouring terms along
    #[arg(long)]
    pub adjust: bool,
}

#[derive(Args)]
pub struct TerminateArgs {
    #[command(flatten)]
    pub workbook: WorkbookArgs,

    /// Termination date (default: today)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Confirm the termination
    #[arg(long)]
    pub confirm: bool,
}

#[derive(Args)]
pub struct InvoicesArgs {
    #[command(flatten)]
    pub workbook: WorkbookArgs,

    /// Only items due on or after this date
    #[arg(long)]
    pub from: Option<NaiveDate>,
}

pub fn run_verify(args: VerifyArgs, overrides: &SettingsOverrides) -> CommandResult {
    let mut wb = load_workbook(&args.workbook, overrides)?;
    let until = args.until.unwrap_or_else(|| SystemClock.today());
    let out = wb.verify_until(until)?;
    save_workbook(&args.workbook, &wb)?;
    Ok(serde_json::to_value(out)?)
}

pub fn run_approve(args: ApproveArgs, overrides: &SettingsOverrides) -> CommandResult {
    let mut wb = load_workbook(&args.workbook, overrides)?;
    let mut out = serde_json::to_value(wb.approve_all_terms()?)?;
    if let Some(until) = args.invoices_until {
        let approved = wb.approve_invoices_due(until);
        if let Value::Object(map) = &mut out {
            map.insert("approved_invoices".into(), serde_json::to_value(approved)?);
        }
    }
    save_workbook(&args.workbook, &wb)?;
    Ok(out)
}

pub fn run_calculate(args: CalculateArgs, overrides: &SettingsOverrides) -> CommandResult {
    let mut wb = load_workbook(&args.workbook, overrides)?;
    let request = CalculationRequest {
        period_start: args.start.unwrap_or_else(|| SystemClock.beginning_of_quarter()),
        period_end: args.end,
        due_date: args.due,
        run_type: if args.retro {
            InvoiceRunType::RetroRun
        } else {
            InvoiceRunType::NormalRun
        },
    };
    let out = wb.calculate(&request)?;
    save_workbook(&args.workbook, &wb)?;
    Ok(serde_json::to_value(out)?)
}

pub fn run_change_dates(args: ChangeDatesArgs, overrides: &SettingsOverrides) -> CommandResult {
    let mut wb = load_workbook(&args.workbook, overrides)?;
    let out = wb.change_term_dates(&TermDatesChange {
        item: args.item,
        term: args.term,
        start_date: args.start,
        end_date: args.end,
        adjust_neighbours: args.adjust,
    })?;
    save_workbook(&args.workbook, &wb)?;
    Ok(serde_json::to_value(out)?)
}

pub fn run_terminate(args: TerminateArgs, overrides: &SettingsOverrides) -> CommandResult {
    let mut wb = load_workbook(&args.workbook, overrides)?;
    let date = args
        .date
        .unwrap_or_else(|| wb.lease.default_termination_date(&SystemClock));
    let out = wb.terminate(date, args.confirm)?;
    save_workbook(&args.workbook, &wb)?;
    Ok(serde_json::to_value(out)?)
}

pub fn run_timeline(args: WorkbookArgs, overrides: &SettingsOverrides) -> CommandResult {
    let wb = load_workbook(&args, overrides)?;
    Ok(serde_json::to_value(wb.timeline())?)
}

pub fn run_invoices(args: InvoicesArgs, overrides: &SettingsOverrides) -> CommandResult {
    let wb = load_workbook(&args.workbook, overrides)?;
    let rows: Vec<_> = wb
        .invoice_rows()
        .into_iter()
        .filter(|r| args.from.map_or(true, |from| r.due_date >= from))
        .collect();
    Ok(serde_json::to_value(rows)?)
}

// ---------------------------------------------------------------------------
// Workbook and settings plumbing
// ---------------------------------------------------------------------------

fn load_workbook(
    args: &WorkbookArgs,
    overrides: &SettingsOverrides,
) -> Result<LeaseWorkbook, Box<dyn std::error::Error>> {
    let mut wb: LeaseWorkbook = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <workbook.json> or stdin required".into());
    };

    let mut settings = match overrides.config {
        Some(ref path) => input::file::read_yaml::<EngineSettings>(path)?,
        None => EngineSettings::default(),
    };
    if wb.settings.epoch_date.is_some() {
        settings.update_epoch_date(wb.settings.epoch_date);
    }
    if let Some(epoch) = overrides.epoch_date {
        settings.update_epoch_date(Some(epoch));
    }
    if overrides.no_epoch {
        settings.update_epoch_date(None);
    }
    debug!(epoch_date = ?settings.epoch_date, lease = %wb.lease.reference, "workbook loaded");
    wb.settings = settings;
    Ok(wb)
}

fn save_workbook(args: &WorkbookArgs, wb: &LeaseWorkbook) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(ref path) = args.write {
        input::file::write_json(path, wb)?;
    }
    Ok(())
}
