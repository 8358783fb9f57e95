//! The lease aggregate.
//!
//! A lease owns its items (each with a term chain), the occupancies of the
//! units it rents and its break options. Operations spanning several items
//! are validated for every item before the first one is changed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::break_option::{BreakExerciseType, BreakOption, BreakType};
use crate::chain::{IntervalChain, MemberId};
use crate::clock::Clock;
use crate::error::LeaseError;
use crate::frequency::InvoicingFrequency;
use crate::indexation::IndexValueSource;
use crate::interval::{next_day, previous_day, DateInterval};
use crate::invoice::{InvoiceItemStore, LeaseItemId};
use crate::item::{CalculationReport, LeaseItem, LeaseItemType, VerifyReport};
use crate::occupancy::Occupancy;
use crate::reconcile::{CalculationRequest, ReconciledItem};
use crate::settings::EngineSettings;
use crate::LeaseResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub reference: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landlord: Option<String>,
    pub interval: DateInterval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_reference: Option<String>,
    #[serde(default)]
    pub items: Vec<LeaseItem>,
    #[serde(default)]
    pub occupancies: IntervalChain<Occupancy>,
    #[serde(default)]
    pub break_options: Vec<BreakOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemVerification {
    pub item: LeaseItemId,
    pub item_type: LeaseItemType,
    #[serde(flatten)]
    pub report: VerifyReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermKey {
    pub item: LeaseItemId,
    pub term: MemberId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminationReport {
    pub termination_date: Option<NaiveDate>,
    /// Terms removed per item because they started after the termination
    pub removed_terms: Vec<TermKey>,
    /// Items dropped because they started after the termination
    pub removed_items: Vec<LeaseItemId>,
    pub ended_occupancies: Vec<MemberId>,
    pub removed_occupancies: Vec<MemberId>,
    pub removed_break_options: Vec<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Construction and lookup
// ---------------------------------------------------------------------------

impl Lease {
    pub fn new(
        reference: impl Into<String>,
        name: impl Into<String>,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> LeaseResult<Self> {
        Ok(Lease {
            reference: reference.into(),
            name: name.into(),
            tenant: None,
            landlord: None,
            interval: DateInterval::including(Some(start_date), end_date)?,
            termination_date: None,
            previous_reference: None,
            next_reference: None,
            items: Vec::new(),
            occupancies: IntervalChain::new(),
            break_options: Vec::new(),
        })
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.interval.start_date()
    }

    /// The lease interval cut at the termination date.
    pub fn effective_interval(&self) -> DateInterval {
        let end = match (self.interval.end_date(), self.termination_date) {
            (Some(e), Some(t)) => Some(e.min(t)),
            (e, t) => e.or(t),
        };
        DateInterval::including(self.interval.start_date(), end).unwrap_or(self.interval)
    }

    pub fn new_item(
        &mut self,
        item_type: LeaseItemType,
        invoicing_frequency: InvoicingFrequency,
        start_date: NaiveDate,
    ) -> LeaseResult<LeaseItemId> {
        if !self.effective_interval().contains(start_date) {
            return Err(LeaseError::validation(format!(
                "item start {start_date} is outside lease {} ({})",
                self.reference,
                self.effective_interval()
            )));
        }
        let id = match self.items.iter().map(|i| i.id).max() {
            Some(last) => last.checked_add(1).ok_or_else(|| {
                LeaseError::invariant(format!("item id {last} exhausts the id space"))
            })?,
            None => 0,
        };
        let sequence = self.items.iter().filter(|i| i.item_type == item_type).count() as u32 + 1;
        self.items.push(LeaseItem::new(
            id,
            sequence,
            item_type,
            start_date,
            invoicing_frequency,
        ));
        info!(lease = %self.reference, item = id, %item_type, %start_date, "item created");
        Ok(id)
    }

    pub fn item(&self, id: LeaseItemId) -> LeaseResult<&LeaseItem> {
        self.items
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| LeaseError::NotFound(format!("item {id} on lease {}", self.reference)))
    }

    pub fn item_mut(&mut self, id: LeaseItemId) -> LeaseResult<&mut LeaseItem> {
        let reference = &self.reference;
        self.items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| LeaseError::NotFound(format!("item {id} on lease {reference}")))
    }

    pub fn find_item(
        &self,
        item_type: LeaseItemType,
        start_date: NaiveDate,
        sequence: u32,
    ) -> Option<&LeaseItem> {
        self.items.iter().find(|i| {
            i.item_type == item_type && i.start_date() == Some(start_date) && i.sequence == sequence
        })
    }

    pub fn find_first_item_of_type(&self, item_type: LeaseItemType) -> Option<&LeaseItem> {
        self.items.iter().find(|i| i.item_type == item_type)
    }
}

// ---------------------------------------------------------------------------
// Verification, approval and invoicing
// ---------------------------------------------------------------------------

impl Lease {
    /// Verifies every item up to `target`. All items or none are updated.
    pub fn verify_until(
        &mut self,
        target: NaiveDate,
        indices: &dyn IndexValueSource,
    ) -> LeaseResult<Vec<ItemVerification>> {
        let mut items = self.items.clone();
        let mut reports = Vec::with_capacity(items.len());
        for item in &mut items {
            let report = item.verify_until(target, indices)?;
            reports.push(ItemVerification {
                item: item.id,
                item_type: item.item_type,
                report,
            });
        }
        self.items = items;
        Ok(reports)
    }

    /// Verifies up to today.
    pub fn verify(
        &mut self,
        clock: &dyn Clock,
        indices: &dyn IndexValueSource,
    ) -> LeaseResult<Vec<ItemVerification>> {
        self.verify_until(clock.today(), indices)
    }

    /// Approves every new term of every item.
    pub fn approve_all_terms(&mut self) -> LeaseResult<Vec<TermKey>> {
        let mut approved = Vec::new();
        for item in &mut self.items {
            for term in item.approve_all_terms()? {
                approved.push(TermKey {
                    item: item.id,
                    term,
                });
            }
        }
        if !approved.is_empty() {
            info!(lease = %self.reference, count = approved.len(), "terms approved");
        }
        Ok(approved)
    }

    pub fn change_term_dates(
        &mut self,
        item: LeaseItemId,
        term: MemberId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        adjust_neighbours: bool,
    ) -> LeaseResult<()> {
        self.item_mut(item)?
            .change_term_dates(term, start, end, adjust_neighbours)
    }

    /// Invoices all approved terms of all items. New terms are skipped.
    /// Items and invoices are staged and only replaced when every item
    /// succeeded.
    pub fn calculate<S: InvoiceItemStore + Clone>(
        &mut self,
        request: &CalculationRequest,
        settings: &EngineSettings,
        store: &mut S,
    ) -> LeaseResult<CalculationReport> {
        let interval = self.effective_interval();
        let mut items = self.items.clone();
        let mut staged = store.clone();
        let mut report = CalculationReport::default();
        for item in &mut items {
            report.merge(item.calculate_into(&self.reference, &interval, request, settings, &mut staged)?);
        }
        self.items = items;
        *store = staged;
        Ok(report)
    }

    /// Invoices one term; fails while that term is new.
    pub fn calculate_term(
        &mut self,
        item: LeaseItemId,
        term: MemberId,
        request: &CalculationRequest,
        settings: &EngineSettings,
        store: &mut dyn InvoiceItemStore,
    ) -> LeaseResult<Vec<ReconciledItem>> {
        let interval = self.effective_interval();
        let reference = self.reference.clone();
        self.item_mut(item)?
            .calculate_term(term, &reference, &interval, request, settings, store)
    }
}

// ---------------------------------------------------------------------------
// Occupancies and break options
// ---------------------------------------------------------------------------

impl Lease {
    /// Starts occupying `unit` on `start_date`, ending the lease's previous
    /// open occupancy of the same unit the day before.
    pub fn occupy(&mut self, unit: &str, start_date: NaiveDate) -> LeaseResult<MemberId> {
        if !self.effective_interval().contains(start_date) {
            return Err(LeaseError::validation(format!(
                "occupancy start {start_date} is outside lease {}",
                self.reference
            )));
        }
        let occupancy = Occupancy::new(unit);
        let id = match self.occupancies.last(&unit.to_string()).map(|s| s.id()) {
            Some(last) => self.occupancies.succeeded_by(
                last,
                Some(start_date),
                None,
                false,
                move |_: &DateInterval| occupancy,
            )?,
            None => self
                .occupancies
                .insert(DateInterval::starting(start_date), occupancy)?,
        };
        Ok(id)
    }

    pub fn new_break_option(
        &mut self,
        break_date: NaiveDate,
        notification_period: &str,
        exercise_type: BreakExerciseType,
        break_type: BreakType,
        description: &str,
    ) -> LeaseResult<&BreakOption> {
        if self
            .break_options
            .iter()
            .any(|b| b.break_type == break_type && b.break_date == break_date)
        {
            return Err(LeaseError::validation(format!(
                "This lease already has a {break_type:?} break option for this date"
            )));
        }
        if !self.effective_interval().contains(break_date) {
            return Err(LeaseError::validation(format!(
                "break date {break_date} is outside lease {}",
                self.reference
            )));
        }
        let option = BreakOption::new(
            break_type,
            exercise_type,
            break_date,
            notification_period,
            description,
        )?;
        self.break_options.push(option);
        self.break_options.sort_by_key(|b| b.break_date);
        self.break_options
            .iter()
            .find(|b| b.break_type == break_type && b.break_date == break_date)
            .ok_or_else(|| LeaseError::invariant("break option vanished after insertion"))
    }
}

// ---------------------------------------------------------------------------
// Termination, assignment and renewal
// ---------------------------------------------------------------------------

impl Lease {
    /// Ends the lease on `date`. Terms, items, occupancies and break
    /// options running past the date are cut back or removed.
    pub fn terminate<S: InvoiceItemStore + Clone>(
        &mut self,
        date: NaiveDate,
        confirm: bool,
        store: &mut S,
    ) -> LeaseResult<TerminationReport> {
        if !confirm {
            return Err(LeaseError::validation("Make sure you confirm this action"));
        }
        if self.start_date().map_or(false, |s| date < s) {
            return Err(LeaseError::validation("Termination date can't be before start date"));
        }
        for item in &self.items {
            item.check_truncate_at(date, &*store)?;
        }

        let mut report = TerminationReport {
            termination_date: Some(date),
            ..TerminationReport::default()
        };

        // everything below is staged on copies
        let mut occupancies = self.occupancies.clone();
        let later: Vec<MemberId> = occupancies
            .segments()
            .iter()
            .rev()
            .filter(|s| s.start_date().map_or(false, |start| start > date))
            .map(|s| s.id())
            .collect();
        for id in later {
            occupancies.detach_last(id)?;
            report.removed_occupancies.push(id);
        }
        let running: Vec<(MemberId, Option<NaiveDate>)> = occupancies
            .segments()
            .iter()
            .filter(|s| s.end_date().map_or(true, |end| end > date))
            .map(|s| (s.id(), s.start_date()))
            .collect();
        for (id, start) in running {
            occupancies.change_dates(id, start, Some(date), false)?;
            report.ended_occupancies.push(id);
        }

        let mut items = self.items.clone();
        let mut staged = store.clone();
        for item in &mut items {
            let before: Vec<MemberId> = item.timeline().iter().map(|s| s.id()).collect();
            if !item.truncate_at(date, &mut staged)? {
                report.removed_items.push(item.id);
            }
            let after: Vec<MemberId> = item.timeline().iter().map(|s| s.id()).collect();
            for term in before.into_iter().filter(|t| !after.contains(t)) {
                report.removed_terms.push(TermKey {
                    item: item.id,
                    term,
                });
            }
        }
        let dropped = &report.removed_items;
        items.retain(|i| !dropped.contains(&i.id));
        self.items = items;
        self.occupancies = occupancies;
        *store = staged;

        self.break_options.retain(|b| {
            let keep = b.break_date <= date;
            if !keep {
                report.removed_break_options.push(b.break_date);
            }
            keep
        });
        self.termination_date = Some(date);
        info!(lease = %self.reference, termination_date = %date, "lease terminated");
        Ok(report)
    }

    /// Hands the lease over to a new lease starting on `start_date`.
    ///
    /// The new lease gets every item running on `start_date` with its term
    /// covering that date (as a new term), the occupancies running on that
    /// date and the later break options. This lease is then terminated the
    /// day before.
    pub fn assign<S: InvoiceItemStore + Clone>(
        &mut self,
        reference: &str,
        name: &str,
        tenant: Option<String>,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        confirm: bool,
        store: &mut S,
    ) -> LeaseResult<Lease> {
        if !confirm {
            return Err(LeaseError::validation("Make sure you confirm this action"));
        }
        if reference == self.reference {
            return Err(LeaseError::validation(format!(
                "the new lease needs a reference other than {reference}"
            )));
        }
        if self.start_date().map_or(false, |s| start_date <= s) {
            return Err(LeaseError::validation(format!(
                "the new lease must start after {}",
                self.interval
            )));
        }
        let mut next = Lease::new(reference, name, start_date, end_date)?;
        next.tenant = tenant;
        next.landlord = self.landlord.clone();
        next.previous_reference = Some(self.reference.clone());

        for item in &self.items {
            if item.end_date().map_or(false, |e| e < start_date) {
                continue;
            }
            let item_start = item.start_date().map_or(start_date, |s| s.max(start_date));
            let mut copy = LeaseItem::new(
                item.id,
                item.sequence,
                item.item_type,
                item_start,
                item.invoicing_frequency,
            );
            if let Some(term) = item.find_current_or_next_term(item_start) {
                let term_start = term.start_date().map_or(item_start, |s| s.max(item_start));
                let carried = term.member().carried_over();
                copy.new_term(carried.kind, carried.frequency, term_start, term.end_date())?;
            }
            next.items.push(copy);
        }

        for s in self.occupancies.segments() {
            if s.interval().contains(start_date) {
                next.occupancies
                    .insert(DateInterval::starting(start_date), s.member().clone())?;
            }
        }
        next.break_options = self
            .break_options
            .iter()
            .filter(|b| b.break_date >= start_date)
            .cloned()
            .collect();

        self.terminate(previous_day(start_date)?, true, store)?;
        self.next_reference = Some(next.reference.clone());
        info!(from = %self.reference, to = %next.reference, %start_date, "lease assigned");
        Ok(next)
    }

    /// Continues the lease with the same tenant, by default from the day
    /// after its current end.
    pub fn renew<S: InvoiceItemStore + Clone>(
        &mut self,
        reference: &str,
        name: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        confirm: bool,
        store: &mut S,
    ) -> LeaseResult<Lease> {
        let start_date = match start_date {
            Some(d) => d,
            None => {
                let end = self.effective_interval().end_date().ok_or_else(|| {
                    LeaseError::validation(format!(
                        "lease {} has no end date; give a start date for the renewal",
                        self.reference
                    ))
                })?;
                next_day(end)?
            }
        };
        let tenant = self.tenant.clone();
        self.assign(reference, name, tenant, start_date, end_date, confirm, store)
    }

    pub fn default_termination_date(&self, clock: &dyn Clock) -> NaiveDate {
        clock.today()
    }

    pub fn default_break_date(&self, clock: &dyn Clock) -> NaiveDate {
        clock.beginning_of_month()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::frequency::TermFrequency;
    use crate::indexation::IndexTable;
    use crate::invoice::{InvoiceBook, InvoiceItem, InvoiceItemDraft, InvoiceItemId};
    use crate::term::{ServiceChargeBudget, TermKind};
    use crate::types::Money;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn lease() -> Lease {
        let mut lease = Lease::new("OXF-TOPMODEL-001", "Topmodel", d(2010, 7, 15), Some(d(2022, 7, 14))).unwrap();
        lease.tenant = Some("TOPMODEL".into());
        let item = lease
            .new_item(LeaseItemType::ServiceCharge, InvoicingFrequency::QuarterlyInAdvance, d(2010, 7, 15))
            .unwrap();
        lease
            .item_mut(item)
            .unwrap()
            .new_term(
                TermKind::ServiceCharge(ServiceChargeBudget {
                    budgeted_value: dec!(6000),
                    audited_value: None,
                }),
                TermFrequency::Yearly,
                d(2010, 7, 15),
                None,
            )
            .unwrap();
        lease.verify_until(d(2013, 1, 1), &IndexTable::new()).unwrap();
        lease.occupy("OXF-001", d(2010, 7, 15)).unwrap();
        lease
    }

    /// Book that refuses writes once its budget is spent.
    #[derive(Debug, Clone, PartialEq)]
    struct LimitedBook {
        book: InvoiceBook,
        writes_left: usize,
    }

    impl LimitedBook {
        fn spend(&mut self) -> LeaseResult<()> {
            self.writes_left = self
                .writes_left
                .checked_sub(1)
                .ok_or_else(|| LeaseError::invariant("invoice store unavailable"))?;
            Ok(())
        }
    }

    impl InvoiceItemStore for LimitedBook {
        fn item(&self, id: InvoiceItemId) -> Option<&InvoiceItem> {
            self.book.item(id)
        }

        fn is_approved(&self, id: InvoiceItemId) -> bool {
            self.book.is_approved(id)
        }

        fn create_item(&mut self, draft: InvoiceItemDraft) -> LeaseResult<InvoiceItemId> {
            self.spend()?;
            self.book.create_item(draft)
        }

        fn update_net_amount(&mut self, id: InvoiceItemId, net_amount: Money) -> LeaseResult<()> {
            self.spend()?;
            self.book.update_net_amount(id, net_amount)
        }

        fn delete_item(&mut self, id: InvoiceItemId) -> LeaseResult<()> {
            self.spend()?;
            self.book.delete_item(id)
        }
    }

    /// The fixture lease with a second, smaller service charge item, all
    /// terms approved.
    fn two_item_lease() -> Lease {
        let mut l = lease();
        let second = l
            .new_item(LeaseItemType::ServiceCharge, InvoicingFrequency::QuarterlyInAdvance, d(2010, 7, 15))
            .unwrap();
        l.item_mut(second)
            .unwrap()
            .new_term(
                TermKind::ServiceCharge(ServiceChargeBudget {
                    budgeted_value: dec!(1200),
                    audited_value: None,
                }),
                TermFrequency::Yearly,
                d(2010, 7, 15),
                None,
            )
            .unwrap();
        l.verify_until(d(2013, 1, 1), &IndexTable::new()).unwrap();
        l.approve_all_terms().unwrap();
        l
    }

    #[test]
    fn test_calculate_failing_on_later_item_changes_nothing() {
        let mut l = two_item_lease();
        let mut store = LimitedBook {
            book: InvoiceBook::new(),
            writes_left: 1,
        };
        let before = l.clone();
        let err = l
            .calculate(
                &CalculationRequest::single(d(2011, 1, 1), d(2011, 1, 1)),
                &EngineSettings::default(),
                &mut store,
            )
            .unwrap_err();
        assert!(matches!(err, LeaseError::InvariantViolation(_)));
        assert_eq!(store.book.items().count(), 0);
        assert_eq!(store.book.invoices().count(), 0);
        assert_eq!(l, before);

        store.writes_left = 2;
        let report = l
            .calculate(
                &CalculationRequest::single(d(2011, 1, 1), d(2011, 1, 1)),
                &EngineSettings::default(),
                &mut store,
            )
            .unwrap();
        assert_eq!(report.items.len(), 2);
        assert_eq!(store.book.items().count(), 2);
    }

    #[test]
    fn test_terminate_failing_on_later_item_changes_nothing() {
        let mut l = two_item_lease();
        let mut store = LimitedBook {
            book: InvoiceBook::new(),
            writes_left: 2,
        };
        l.calculate(
            &CalculationRequest::single(d(2012, 1, 1), d(2012, 1, 1)),
            &EngineSettings::default(),
            &mut store,
        )
        .unwrap();
        assert_eq!(store.book.items().count(), 2);

        store.writes_left = 1;
        let before = l.clone();
        let book_before = store.book.clone();
        assert!(l.terminate(d(2011, 6, 30), true, &mut store).is_err());
        assert_eq!(l, before);
        assert_eq!(store.book, book_before);
        assert_eq!(l.termination_date, None);

        store.writes_left = 2;
        let report = l.terminate(d(2011, 6, 30), true, &mut store).unwrap();
        assert_eq!(report.removed_terms.len(), 4);
        assert_eq!(store.book.items().count(), 0);
    }

    #[test]
    fn test_new_item_sequence_and_lookup() {
        let mut l = lease();
        let second = l
            .new_item(LeaseItemType::ServiceCharge, InvoicingFrequency::QuarterlyInAdvance, d(2010, 7, 15))
            .unwrap();
        assert_eq!(l.item(second).unwrap().sequence, 2);
        assert!(l.find_item(LeaseItemType::ServiceCharge, d(2010, 7, 15), 2).is_some());
        assert!(l.find_first_item_of_type(LeaseItemType::Rent).is_none());
        assert!(l
            .new_item(LeaseItemType::Rent, InvoicingFrequency::QuarterlyInAdvance, d(2009, 1, 1))
            .is_err());
    }

    #[test]
    fn test_terminate_requires_confirmation_and_valid_date() {
        let mut l = lease();
        let mut book = InvoiceBook::new();
        let err = l.terminate(d(2012, 6, 30), false, &mut book).unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: Make sure you confirm this action");
        let err = l.terminate(d(2010, 1, 1), true, &mut book).unwrap_err();
        assert!(err.to_string().contains("can't be before start date"));
        assert_eq!(l.termination_date, None);
    }

    #[test]
    fn test_terminate_cuts_terms_occupancies_and_breaks() {
        let mut l = lease();
        l.new_break_option(d(2016, 7, 15), "6m", BreakExerciseType::Tenant, BreakType::Fixed, "")
            .unwrap();
        let mut book = InvoiceBook::new();
        let report = l.terminate(d(2011, 6, 30), true, &mut book).unwrap();
        assert_eq!(report.removed_terms.len(), 2);
        assert_eq!(report.removed_break_options, vec![d(2016, 7, 15)]);
        assert_eq!(report.ended_occupancies.len(), 1);

        let item = &l.items[0];
        assert_eq!(item.timeline().len(), 2);
        assert_eq!(item.last_term().unwrap().end_date(), Some(d(2011, 6, 30)));
        assert_eq!(item.end_date(), Some(d(2011, 6, 30)));
        assert_eq!(l.effective_interval().end_date(), Some(d(2011, 6, 30)));
        assert_eq!(l.occupancies.segments()[0].end_date(), Some(d(2011, 6, 30)));
    }

    #[test]
    fn test_terminate_refused_when_later_term_invoiced() {
        let mut l = lease();
        l.approve_all_terms().unwrap();
        let mut book = InvoiceBook::new();
        let report = l
            .calculate(
                &CalculationRequest::single(d(2012, 1, 1), d(2012, 1, 1)),
                &EngineSettings::default(),
                &mut book,
            )
            .unwrap();
        let invoice = book.item(report.items[0].invoice_item.unwrap()).unwrap().invoice;
        book.approve_invoice(invoice).unwrap();

        let before = l.clone();
        assert!(l.terminate(d(2011, 6, 30), true, &mut book).unwrap_err().is_validation());
        assert_eq!(l, before);
    }

    #[test]
    fn test_occupy_closes_previous_occupancy_of_unit() {
        let mut l = lease();
        l.occupy("OXF-001", d(2012, 1, 1)).unwrap();
        let unit = l.occupancies.group(&"OXF-001".to_string());
        assert_eq!(unit.len(), 2);
        assert_eq!(unit[0].end_date(), Some(d(2011, 12, 31)));
        assert!(l.occupy("OXF-001", d(2030, 1, 1)).is_err());
    }

    #[test]
    fn test_duplicate_break_option() {
        let mut l = lease();
        l.new_break_option(d(2016, 7, 15), "6m", BreakExerciseType::Tenant, BreakType::Fixed, "")
            .unwrap();
        let err = l
            .new_break_option(d(2016, 7, 15), "3m", BreakExerciseType::Landlord, BreakType::Fixed, "")
            .unwrap_err();
        assert!(err.to_string().contains("already has a Fixed break option"));
        l.new_break_option(d(2016, 7, 15), "3m", BreakExerciseType::Landlord, BreakType::Rolling, "")
            .unwrap();
        assert!(l
            .new_break_option(d(2017, 1, 1), "soon", BreakExerciseType::Tenant, BreakType::Fixed, "")
            .is_err());
    }

    #[test]
    fn test_assign_creates_follow_on_lease() {
        let mut l = lease();
        let mut book = InvoiceBook::new();
        let next = l
            .assign("OXF-NEWCO-001", "Newco", Some("NEWCO".into()), d(2011, 7, 1), None, true, &mut book)
            .unwrap();
        assert_eq!(next.previous_reference.as_deref(), Some("OXF-TOPMODEL-001"));
        assert_eq!(l.next_reference.as_deref(), Some("OXF-NEWCO-001"));
        assert_eq!(l.termination_date, Some(d(2011, 6, 30)));
        let item = &next.items[0];
        assert_eq!(item.timeline().len(), 1);
        let term = item.first_term().unwrap();
        assert_eq!(term.start_date(), Some(d(2011, 7, 1)));
        assert_eq!(term.end_date(), Some(d(2011, 12, 31)));
        assert!(!term.member().is_approved());
        assert_eq!(next.occupancies.len(), 1);
    }

    #[test]
    fn test_renew_defaults_to_day_after_end() {
        let mut l = Lease::new("L-1", "Short", d(2010, 1, 1), Some(d(2010, 12, 31))).unwrap();
        l.tenant = Some("T".into());
        let mut book = InvoiceBook::new();
        let next = l.renew("L-2", "Short again", None, None, true, &mut book).unwrap();
        assert_eq!(next.start_date(), Some(d(2011, 1, 1)));
        assert_eq!(next.tenant.as_deref(), Some("T"));

        let mut open = Lease::new("L-3", "Open", d(2010, 1, 1), None).unwrap();
        assert!(open.renew("L-4", "x", None, None, true, &mut book).is_err());
    }

    #[test]
    fn test_verify_uses_clock() {
        let mut l = lease();
        let reports = l
            .verify(&FixedClock(d(2014, 3, 1)), &IndexTable::new())
            .unwrap();
        assert_eq!(reports[0].report.created.len(), 1);
        assert_eq!(l.default_break_date(&FixedClock(d(2014, 3, 17))), d(2014, 3, 1));
    }
}
