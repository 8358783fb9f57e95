//! Lease items and the term chain each of them owns.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::{IntervalChain, MemberId, Segment};
use crate::error::LeaseError;
use crate::frequency::{InvoicingFrequency, TermFrequency};
use crate::indexation::IndexValueSource;
use crate::interval::{next_day, DateInterval};
use crate::invoice::{InvoiceItemId, InvoiceItemStore, LeaseItemId, TermRef};
use crate::reconcile::{
    self, ensure_no_approved_items, CalculationRequest, ReconciledItem, TermPlacement,
};
use crate::settings::EngineSettings;
use crate::term::{LeaseTerm, TermKind};
use crate::LeaseResult;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaseItemType {
    Rent,
    ServiceCharge,
    TurnoverRent,
    Discount,
    EntryFee,
}

impl LeaseItemType {
    /// Whether terms of `kind` may be created on an item of this type.
    pub fn accepts(&self, kind: &TermKind) -> bool {
        matches!(
            (self, kind),
            (LeaseItemType::Rent, TermKind::IndexableRent(_))
                | (LeaseItemType::Rent, TermKind::Fixed(_))
                | (LeaseItemType::ServiceCharge, TermKind::ServiceCharge(_))
                | (LeaseItemType::TurnoverRent, TermKind::Fixed(_))
                | (LeaseItemType::Discount, TermKind::Fixed(_))
                | (LeaseItemType::EntryFee, TermKind::Fixed(_))
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            LeaseItemType::Rent => "RENT",
            LeaseItemType::ServiceCharge => "SERVICE_CHARGE",
            LeaseItemType::TurnoverRent => "TURNOVER_RENT",
            LeaseItemType::Discount => "DISCOUNT",
            LeaseItemType::EntryFee => "ENTRY_FEE",
        }
    }
}

impl fmt::Display for LeaseItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LeaseItemType {
    type Err = LeaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        [
            LeaseItemType::Rent,
            LeaseItemType::ServiceCharge,
            LeaseItemType::TurnoverRent,
            LeaseItemType::Discount,
            LeaseItemType::EntryFee,
        ]
        .into_iter()
        .find(|t| t.code() == wanted)
        .ok_or_else(|| LeaseError::validation(format!("unrecognized lease item type '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Terms whose trial values changed
    pub recalculated: Vec<MemberId>,
    /// Terms created to extend coverage
    pub created: Vec<MemberId>,
}

impl VerifyReport {
    pub fn is_empty(&self) -> bool {
        self.recalculated.is_empty() && self.created.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTerm {
    pub term: TermRef,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationReport {
    pub items: Vec<ReconciledItem>,
    pub skipped_terms: Vec<SkippedTerm>,
}

impl CalculationReport {
    pub fn merge(&mut self, other: CalculationReport) {
        self.items.extend(other.items);
        self.skipped_terms.extend(other.skipped_terms);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseItem {
    pub id: LeaseItemId,
    #[serde(default)]
    pub sequence: u32,
    pub item_type: LeaseItemType,
    pub interval: DateInterval,
    pub invoicing_frequency: InvoicingFrequency,
    #[serde(default)]
    pub terms: IntervalChain<LeaseTerm>,
}

// ---------------------------------------------------------------------------
// Term chain
// ---------------------------------------------------------------------------

impl LeaseItem {
    pub fn new(
        id: LeaseItemId,
        sequence: u32,
        item_type: LeaseItemType,
        start_date: NaiveDate,
        invoicing_frequency: InvoicingFrequency,
    ) -> Self {
        LeaseItem {
            id,
            sequence,
            item_type,
            interval: DateInterval::starting(start_date),
            invoicing_frequency,
            terms: IntervalChain::new(),
        }
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.interval.start_date()
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.interval.end_date()
    }

    /// The first term of the item. Later terms are created through
    /// succession so the chain stays contiguous.
    pub fn new_term(
        &mut self,
        kind: TermKind,
        frequency: TermFrequency,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> LeaseResult<MemberId> {
        if !self.terms.is_empty() {
            return Err(LeaseError::validation(format!(
                "item {} already has terms; create successors or predecessors instead",
                self.id
            )));
        }
        if !self.item_type.accepts(&kind) {
            return Err(LeaseError::validation(format!(
                "a {} item cannot hold this kind of term",
                self.item_type
            )));
        }
        let interval = DateInterval::including(Some(start), end)?;
        let id = self.terms.insert(interval, LeaseTerm::new(1, frequency, kind))?;
        info!(item = self.id, term = id, %interval, "first term created");
        Ok(id)
    }

    pub fn term(&self, id: MemberId) -> LeaseResult<&Segment<LeaseTerm>> {
        self.terms.segment(id).map_err(|_| {
            LeaseError::NotFound(format!("term {id} on item {}", self.id))
        })
    }

    pub fn term_mut(&mut self, id: MemberId) -> LeaseResult<&mut LeaseTerm> {
        let item = self.id;
        self.terms
            .member_mut(id)
            .ok_or_else(|| LeaseError::NotFound(format!("term {id} on item {item}")))
    }

    /// The term starting exactly on `start_date`.
    pub fn find_term(&self, start_date: NaiveDate) -> Option<&Segment<LeaseTerm>> {
        self.terms
            .segments()
            .iter()
            .find(|s| s.start_date() == Some(start_date))
    }

    pub fn find_term_containing(&self, date: NaiveDate) -> Option<&Segment<LeaseTerm>> {
        self.terms.find_containing(&(), date)
    }

    pub fn find_current_or_next_term(&self, date: NaiveDate) -> Option<&Segment<LeaseTerm>> {
        self.terms.find_current_or_next(&(), date)
    }

    /// Terms oldest first.
    pub fn timeline(&self) -> &[Segment<LeaseTerm>] {
        self.terms.segments()
    }

    pub fn first_term(&self) -> Option<&Segment<LeaseTerm>> {
        self.terms.first(&())
    }

    pub fn last_term(&self) -> Option<&Segment<LeaseTerm>> {
        self.terms.last(&())
    }

    /// Inserts a term continuing `id` from `start`.
    pub fn create_successor_term(
        &mut self,
        id: MemberId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        confirm: bool,
    ) -> LeaseResult<MemberId> {
        let successor = self.term(id)?.member().successor()?;
        let new_id = self
            .terms
            .succeeded_by(id, start, end, confirm, move |_: &DateInterval| successor)?;
        self.renumber();
        Ok(new_id)
    }

    /// Inserts a term ending right before `id` starts.
    pub fn create_predecessor_term(
        &mut self,
        id: MemberId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        confirm: bool,
    ) -> LeaseResult<MemberId> {
        let predecessor = self.term(id)?.member().carried_over();
        let new_id = self
            .terms
            .preceded_by(id, start, end, confirm, move |_: &DateInterval| predecessor)?;
        self.renumber();
        Ok(new_id)
    }

    /// Moves the bounds of term `id`, optionally dragging its neighbours.
    pub fn change_term_dates(
        &mut self,
        id: MemberId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        adjust_neighbours: bool,
    ) -> LeaseResult<()> {
        self.terms.change_dates(id, start, end, adjust_neighbours)
    }

    pub fn approve_term(&mut self, id: MemberId) -> LeaseResult<()> {
        self.term_mut(id)?.approve().map(|_| ())
    }

    /// Approves every new term; approved terms are left alone.
    pub fn approve_all_terms(&mut self) -> LeaseResult<Vec<MemberId>> {
        let pending: Vec<MemberId> = self
            .terms
            .segments()
            .iter()
            .filter(|s| !s.member().is_approved())
            .map(|s| s.id())
            .collect();
        for id in &pending {
            self.approve_term(*id)?;
        }
        Ok(pending)
    }

    fn renumber(&mut self) {
        let ids: Vec<MemberId> = self.terms.segments().iter().map(|s| s.id()).collect();
        for (pos, id) in ids.into_iter().enumerate() {
            if let Some(term) = self.terms.member_mut(id) {
                term.sequence = pos as u32 + 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

impl LeaseItem {
    /// Refreshes the trial values of new terms and extends the chain until
    /// a term starts after `target` (or the item ends).
    ///
    /// Calling it again with the same target changes nothing.
    pub fn verify_until(
        &mut self,
        target: NaiveDate,
        indices: &dyn IndexValueSource,
    ) -> LeaseResult<VerifyReport> {
        let mut report = VerifyReport::default();
        let start = self
            .terms
            .segments()
            .iter()
            .find(|s| !s.member().is_approved())
            .or_else(|| self.terms.segments().last())
            .map(|s| s.id());
        let Some(mut current) = start else {
            return Ok(report);
        };

        let mut chain = self.terms.clone();
        loop {
            let predecessor_value = chain.predecessor(current).map(|p| p.member().value());
            if let Some(term) = chain.member_mut(current) {
                if term.refresh(predecessor_value, indices)? {
                    report.recalculated.push(current);
                }
            }

            if let Some(next) = chain.successor(current) {
                current = next.id();
                continue;
            }

            let segment = chain.segment(current)?;
            let next_start = match (segment.end_date(), segment.start_date()) {
                (Some(end), _) => Some(next_day(end)?),
                (None, Some(start)) => segment.member().frequency.next_date(start),
                (None, None) => None,
            };
            let Some(next_start) = next_start else {
                break;
            };
            if next_start > target || self.interval.end_date().map_or(false, |e| next_start > e) {
                break;
            }

            let successor = segment.member().successor()?;
            let created = chain.succeeded_by(current, Some(next_start), None, false, move |_: &DateInterval| {
                successor
            })?;
            debug!(item = self.id, term = created, %next_start, "term created by verification");
            report.created.push(created);
            current = created;
        }

        self.terms = chain;
        self.renumber();
        if !report.is_empty() {
            info!(
                item = self.id,
                %target,
                created = report.created.len(),
                recalculated = report.recalculated.len(),
                "item verified"
            );
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Invoicing
// ---------------------------------------------------------------------------

impl LeaseItem {
    /// Where a term sits for invoicing: its interval cut by the item and
    /// the lease.
    pub fn placement(
        &self,
        id: MemberId,
        lease_reference: &str,
        lease_interval: &DateInterval,
    ) -> LeaseResult<TermPlacement> {
        let segment = self.term(id)?;
        let term_interval = segment.interval();
        let effective_interval = term_interval
            .overlap(&self.interval)
            .and_then(|i| i.overlap(lease_interval));
        Ok(TermPlacement {
            source: TermRef {
                lease: lease_reference.to_string(),
                item: self.id,
                term: id,
            },
            term_interval,
            effective_interval,
            frequency: self.invoicing_frequency,
        })
    }

    /// Invoices one term; refused while the term is new.
    pub fn calculate_term(
        &mut self,
        id: MemberId,
        lease_reference: &str,
        lease_interval: &DateInterval,
        request: &CalculationRequest,
        settings: &EngineSettings,
        store: &mut dyn InvoiceItemStore,
    ) -> LeaseResult<Vec<ReconciledItem>> {
        self.terms.check_integrity()?;
        let placement = self.placement(id, lease_reference, lease_interval)?;
        let term = self.term_mut(id)?;
        reconcile::calculate_term(term, &placement, request, settings, store)
    }

    /// Invoices every approved term touching the requested period. New
    /// terms are reported as skipped. On error neither the item nor the
    /// store is changed.
    pub fn calculate<S: InvoiceItemStore + Clone>(
        &mut self,
        lease_reference: &str,
        lease_interval: &DateInterval,
        request: &CalculationRequest,
        settings: &EngineSettings,
        store: &mut S,
    ) -> LeaseResult<CalculationReport> {
        let mut item = self.clone();
        let mut staged = store.clone();
        let report = item.calculate_into(lease_reference, lease_interval, request, settings, &mut staged)?;
        *self = item;
        *store = staged;
        Ok(report)
    }

    /// Works on `store` directly; callers stage it.
    pub(crate) fn calculate_into(
        &mut self,
        lease_reference: &str,
        lease_interval: &DateInterval,
        request: &CalculationRequest,
        settings: &EngineSettings,
        store: &mut dyn InvoiceItemStore,
    ) -> LeaseResult<CalculationReport> {
        request.validate()?;
        self.terms.check_integrity()?;
        let first_cycle = self.invoicing_frequency.cycle_containing(request.period_start)?;
        let last_cycle = self.invoicing_frequency.cycle_containing(request.period_end())?;
        let window = DateInterval::between(first_cycle.start_date, last_cycle.end_date)?;

        let mut report = CalculationReport::default();
        let ids: Vec<MemberId> = self.terms.segments().iter().map(|s| s.id()).collect();
        for id in ids {
            let placement = self.placement(id, lease_reference, lease_interval)?;
            let touches = placement
                .effective_interval
                .map_or(false, |e| e.overlaps(&window));
            if !touches {
                continue;
            }
            let term = self.term_mut(id)?;
            if !term.is_approved() {
                report.skipped_terms.push(SkippedTerm {
                    term: placement.source,
                    reason: format!("term {} is not approved", term.sequence),
                });
                continue;
            }
            let items = reconcile::calculate_term(term, &placement, request, settings, store)?;
            report.items.extend(items);
        }
        Ok(report)
    }

    pub fn find_unapproved_invoice_item_for(
        &self,
        id: MemberId,
        store: &dyn InvoiceItemStore,
        start_date: NaiveDate,
        due_date: NaiveDate,
    ) -> LeaseResult<Option<InvoiceItemId>> {
        let term = self.term(id)?.member();
        Ok(reconcile::find_unapproved_invoice_item_for(
            term, store, start_date, due_date,
        ))
    }

    pub fn remove_unapproved_invoice_items_for(
        &mut self,
        id: MemberId,
        store: &mut dyn InvoiceItemStore,
        start_date: NaiveDate,
        due_date: NaiveDate,
    ) -> LeaseResult<usize> {
        let term = self.term_mut(id)?;
        reconcile::remove_unapproved_invoice_items_for(term, store, start_date, due_date)
    }

    /// Removes `id` and every later term together with their unapproved
    /// invoice items. Nothing is removed if any of those terms has an item
    /// on an approved invoice.
    pub fn remove_term(
        &mut self,
        id: MemberId,
        store: &mut dyn InvoiceItemStore,
    ) -> LeaseResult<Vec<MemberId>> {
        let mut doomed = vec![id];
        doomed.extend(self.terms.later_members(id)?);
        for t in &doomed {
            ensure_no_approved_items(self.term(*t)?.member(), &*store)?;
        }
        for t in doomed.iter().rev() {
            let term = self.term_mut(*t)?;
            reconcile::remove_all_unapproved_invoice_items(term, store)?;
            self.terms.detach_last(*t)?;
        }
        self.renumber();
        info!(item = self.id, removed = doomed.len(), "terms removed");
        Ok(doomed)
    }

    /// Cuts the item at `date`: the term running on `date` ends there and
    /// every later term is removed. Returns `false` when the whole item
    /// starts after `date` and should be dropped.
    pub(crate) fn truncate_at(
        &mut self,
        date: NaiveDate,
        store: &mut dyn InvoiceItemStore,
    ) -> LeaseResult<bool> {
        let after = next_day(date)?;
        let first_later = self
            .terms
            .segments()
            .iter()
            .find(|s| s.start_date().map_or(false, |start| start >= after))
            .map(|s| s.id());
        if let Some(id) = first_later {
            self.remove_term(id, store)?;
        }
        if self.interval.start_date().map_or(false, |s| s > date) {
            return Ok(false);
        }
        if let Some((id, start, end)) = self
            .terms
            .find_containing(&(), date)
            .map(|s| (s.id(), s.start_date(), s.end_date()))
        {
            if end != Some(date) {
                self.terms.change_dates(id, start, Some(date), false)?;
            }
        }
        if self.interval.end_date().map_or(true, |e| e > date) {
            self.interval = self.interval.with_end(Some(date))?;
        }
        Ok(true)
    }

    /// Fails if `truncate_at(date)` would have to remove invoiced terms.
    pub(crate) fn check_truncate_at(
        &self,
        date: NaiveDate,
        store: &dyn InvoiceItemStore,
    ) -> LeaseResult<()> {
        for s in self.terms.segments() {
            if s.start_date().map_or(false, |start| start > date) {
                ensure_no_approved_items(s.member(), store)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
