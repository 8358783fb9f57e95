//! Turning approved lease terms into invoice items.
//!
//! For every billing cycle of a requested period the net amount is
//! recomputed and compared with the unapproved item already generated for
//! the same cycle start and due date. That item is updated in place,
//! removed when nothing is owed any more, or created when missing. Items on
//! approved invoices are never touched; their amounts are subtracted from
//! what is still owed for the cycle.
//!
//! All outcomes are planned before the first item is written.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LeaseError;
use crate::frequency::{BillingCycle, InvoicingFrequency};
use crate::interval::{previous_day, DateInterval};
use crate::invoice::{
    approved_total, InvoiceItemDraft, InvoiceItemId, InvoiceItemStore, InvoiceRunType, TermRef,
};
use crate::proration::cycle_amount_exact;
use crate::settings::EngineSettings;
use crate::term::LeaseTerm;
use crate::types::{round_half_up, Money};
use crate::LeaseResult;

const MONEY_SCALE: u32 = 2;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// What to invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRequest {
    /// Any date in the first cycle to invoice
    pub period_start: NaiveDate,
    /// Last date to invoice; defaults to `period_start`, i.e. the whole
    /// cycle containing it. Proration uses the same default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<NaiveDate>,
    /// Due date for every generated item; defaults to each cycle's own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub run_type: InvoiceRunType,
}

impl CalculationRequest {
    /// One cycle, invoiced on `due_date`.
    pub fn single(period_start: NaiveDate, due_date: NaiveDate) -> Self {
        CalculationRequest {
            period_start,
            period_end: None,
            due_date: Some(due_date),
            run_type: InvoiceRunType::NormalRun,
        }
    }

    pub fn period_end(&self) -> NaiveDate {
        self.period_end.unwrap_or(self.period_start)
    }

    pub fn validate(&self) -> LeaseResult<()> {
        if self.period_end() < self.period_start {
            return Err(LeaseError::InvalidInput {
                field: "period_end".into(),
                reason: format!(
                    "Period end {} is before period start {}",
                    self.period_end(),
                    self.period_start
                ),
            });
        }
        Ok(())
    }
}

/// Where a term sits, as needed to invoice it.
#[derive(Debug, Clone, PartialEq)]
pub struct TermPlacement {
    pub source: TermRef,
    /// The term's own interval
    pub term_interval: DateInterval,
    /// Term interval cut by its item's and lease's intervals
    pub effective_interval: Option<DateInterval>,
    pub frequency: InvoicingFrequency,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Unchanged,
    Removed,
    /// Billable days but nothing owed, and no item to remove
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledItem {
    pub term: TermRef,
    pub cycle_start: NaiveDate,
    pub cycle_end: NaiveDate,
    pub due_date: NaiveDate,
    pub net_amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_item: Option<InvoiceItemId>,
    pub outcome: ReconcileOutcome,
}

struct Planned {
    cycle: BillingCycle,
    due_date: NaiveDate,
    net_amount: Money,
    existing: Option<InvoiceItemId>,
    outcome: ReconcileOutcome,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Reconciles the invoice items of one approved term for `request`.
pub fn calculate_term(
    term: &mut LeaseTerm,
    placement: &TermPlacement,
    request: &CalculationRequest,
    settings: &EngineSettings,
    store: &mut dyn InvoiceItemStore,
) -> LeaseResult<Vec<ReconciledItem>> {
    if !term.is_approved() {
        return Err(LeaseError::validation(format!(
            "term {} of item {} on lease {} is not approved and cannot be calculated",
            term.sequence, placement.source.item, placement.source.lease
        )));
    }
    request.validate()?;

    let plan = plan_cycles(term, placement, request, settings, &*store)?;

    let mut report = Vec::with_capacity(plan.len());
    for p in plan {
        let invoice_item = match p.outcome {
            ReconcileOutcome::Created => {
                let id = store.create_item(InvoiceItemDraft {
                    source: placement.source.clone(),
                    start_date: p.cycle.start_date,
                    end_date: p.cycle.end_date,
                    due_date: p.due_date,
                    net_amount: p.net_amount,
                    run_type: request.run_type,
                    description: format!("{}/{}", p.cycle.start_date, p.cycle.end_date),
                })?;
                term.invoice_items.push(id);
                Some(id)
            }
            ReconcileOutcome::Updated => {
                if let Some(id) = p.existing {
                    store.update_net_amount(id, p.net_amount)?;
                }
                p.existing
            }
            ReconcileOutcome::Removed => {
                if let Some(id) = p.existing {
                    store.delete_item(id)?;
                    term.invoice_items.retain(|i| *i != id);
                }
                None
            }
            ReconcileOutcome::Unchanged | ReconcileOutcome::Skipped => p.existing,
        };
        debug!(
            term = term.sequence,
            cycle_start = %p.cycle.start_date,
            due_date = %p.due_date,
            net_amount = %p.net_amount,
            outcome = ?p.outcome,
            "cycle reconciled"
        );
        report.push(ReconciledItem {
            term: placement.source.clone(),
            cycle_start: p.cycle.start_date,
            cycle_end: p.cycle.end_date,
            due_date: p.due_date,
            net_amount: p.net_amount,
            invoice_item,
            outcome: p.outcome,
        });
    }
    info!(
        lease = %placement.source.lease,
        item = placement.source.item,
        term = term.sequence,
        cycles = report.len(),
        "term calculated"
    );
    Ok(report)
}

/// The unapproved item of `term` for the cycle starting `start_date` and
/// due on `due_date`.
pub fn find_unapproved_invoice_item_for(
    term: &LeaseTerm,
    store: &dyn InvoiceItemStore,
    start_date: NaiveDate,
    due_date: NaiveDate,
) -> Option<InvoiceItemId> {
    term.invoice_items.iter().copied().find(|id| {
        !store.is_approved(*id)
            && store
                .item(*id)
                .map_or(false, |i| i.start_date == start_date && i.due_date == due_date)
    })
}

/// Deletes the unapproved items of `term` for a cycle start and due date.
/// Returns how many were removed.
pub fn remove_unapproved_invoice_items_for(
    term: &mut LeaseTerm,
    store: &mut dyn InvoiceItemStore,
    start_date: NaiveDate,
    due_date: NaiveDate,
) -> LeaseResult<usize> {
    let doomed: Vec<InvoiceItemId> = term
        .invoice_items
        .iter()
        .copied()
        .filter(|id| {
            !store.is_approved(*id)
                && store
                    .item(*id)
                    .map_or(false, |i| i.start_date == start_date && i.due_date == due_date)
        })
        .collect();
    for id in &doomed {
        store.delete_item(*id)?;
    }
    term.invoice_items.retain(|i| !doomed.contains(i));
    if !doomed.is_empty() {
        info!(term = term.sequence, %start_date, %due_date, count = doomed.len(), "unapproved invoice items removed");
    }
    Ok(doomed.len())
}

/// Deletes every unapproved item of `term`, failing first if any item is
/// on an approved invoice.
pub fn remove_all_unapproved_invoice_items(
    term: &mut LeaseTerm,
    store: &mut dyn InvoiceItemStore,
) -> LeaseResult<usize> {
    ensure_no_approved_items(term, &*store)?;
    let ids = std::mem::take(&mut term.invoice_items);
    for id in &ids {
        store.delete_item(*id)?;
    }
    Ok(ids.len())
}

pub fn ensure_no_approved_items(term: &LeaseTerm, store: &dyn InvoiceItemStore) -> LeaseResult<()> {
    if let Some(id) = term.invoice_items.iter().find(|id| store.is_approved(**id)) {
        return Err(LeaseError::validation(format!(
            "term {} has invoice item {id} on an approved invoice",
            term.sequence
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

fn plan_cycles(
    term: &LeaseTerm,
    placement: &TermPlacement,
    request: &CalculationRequest,
    settings: &EngineSettings,
    store: &dyn InvoiceItemStore,
) -> LeaseResult<Vec<Planned>> {
    let frequency = placement.frequency;
    let period_end = request.period_end();
    let mut plan = Vec::new();
    let mut cycle = frequency.cycle_containing(request.period_start)?;

    while cycle.start_date <= period_end {
        let billable = placement
            .effective_interval
            .and_then(|e| e.overlap(&cycle.interval()));
        if let Some(billable) = billable {
            let regular_due = frequency.due_date_for(&cycle)?;
            let due_date = request.due_date.unwrap_or(regular_due);
            let exact = exact_amount(term, placement, &cycle, &billable, due_date, regular_due, settings)?;
            let already_approved = approved_for_cycle(term, store, cycle.start_date);
            let net_amount = round_half_up(exact - already_approved, MONEY_SCALE);
            let existing = find_unapproved_invoice_item_for(term, store, cycle.start_date, due_date);
            let outcome = match (net_amount.is_zero(), existing) {
                (true, Some(_)) => ReconcileOutcome::Removed,
                (true, None) => ReconcileOutcome::Skipped,
                (false, None) => ReconcileOutcome::Created,
                (false, Some(id)) => {
                    if store.item(id).map(|i| i.net_amount) == Some(net_amount) {
                        ReconcileOutcome::Unchanged
                    } else {
                        ReconcileOutcome::Updated
                    }
                }
            };
            plan.push(Planned {
                cycle,
                due_date,
                net_amount,
                existing,
                outcome,
            });
        }
        cycle = frequency.next_cycle(&cycle)?;
    }
    Ok(plan)
}

/// Unrounded amount owed for `billable` days of `cycle`.
///
/// Before the epoch date the previous system already billed the value that
/// applied on the cycle's regular due date, so only the difference is owed
/// for those days.
fn exact_amount(
    term: &LeaseTerm,
    placement: &TermPlacement,
    cycle: &BillingCycle,
    billable: &DateInterval,
    due_date: NaiveDate,
    regular_due: NaiveDate,
    settings: &EngineSettings,
) -> LeaseResult<Decimal> {
    let frequency = placement.frequency;
    let value = term.value_for_due_date(due_date, &placement.term_interval);

    let epoch = match settings.epoch_date {
        Some(epoch) if cycle.start_date < epoch => epoch,
        _ => return Ok(cycle_amount_exact(value, frequency, cycle, Some(billable))),
    };

    let legacy_value = term.value_for_due_date(regular_due, &placement.term_interval);
    let before = billable.overlap(&DateInterval::until(previous_day(epoch)?));
    let after = billable.overlap(&DateInterval::starting(epoch));
    Ok(cycle_amount_exact(value - legacy_value, frequency, cycle, before.as_ref())
        + cycle_amount_exact(value, frequency, cycle, after.as_ref()))
}

fn approved_for_cycle(term: &LeaseTerm, store: &dyn InvoiceItemStore, cycle_start: NaiveDate) -> Money {
    let in_cycle: Vec<InvoiceItemId> = term
        .invoice_items
        .iter()
        .copied()
        .filter(|id| store.item(*id).map_or(false, |i| i.start_date == cycle_start))
        .collect();
    approved_total(store, &in_cycle)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
