//! Lease terms: the dated, valued slices of a lease item.
//!
//! A term starts out `New` with a trial value that verification keeps
//! recomputing. Approval freezes the trial value as the approved value;
//! from then on the term's fields can no longer be edited and only
//! approved terms generate invoice items.

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::ChainMember;
use crate::error::LeaseError;
use crate::frequency::TermFrequency;
use crate::indexation::{calculate_indexation, resolve_indexation_input, IndexValueSource};
use crate::interval::DateInterval;
use crate::invoice::InvoiceItemId;
use crate::types::{IndexPoint, Money};
use crate::LeaseResult;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TermStatus {
    #[default]
    New,
    Approved,
}

/// The calculation rule of a term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TermKind {
    IndexableRent(RentIndexation),
    ServiceCharge(ServiceChargeBudget),
    /// Discounts, entry fees and other flat charges
    Fixed(FixedCharge),
}

impl TermKind {
    pub fn code(&self) -> &'static str {
        match self {
            TermKind::IndexableRent(_) => "INDEXABLE_RENT",
            TermKind::ServiceCharge(_) => "SERVICE_CHARGE",
            TermKind::Fixed(_) => "FIXED",
        }
    }
}

// ---------------------------------------------------------------------------
// Term kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RentIndexation {
    /// Name of the index series, e.g. "ISTAT-FOI"
    pub index: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_index_start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_index_start_date: Option<NaiveDate>,
    /// Invoices due on or after this date bill the indexed value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    /// Un-indexed annual rent
    pub base_value: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_index_value: Option<IndexPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_index_value: Option<IndexPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebase_factor: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexation_percentage: Option<IndexPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_value: Option<Money>,
    /// Negotiated value overriding the indexed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_value: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceChargeBudget {
    pub budgeted_value: Money,
    /// Actual charges, known after the term has ended
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audited_value: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FixedCharge {
    pub value: Money,
}

// ---------------------------------------------------------------------------
// Lease term
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseTerm {
    #[serde(default)]
    pub sequence: u32,
    #[serde(default)]
    pub status: TermStatus,
    #[serde(default)]
    pub frequency: TermFrequency,
    pub kind: TermKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_value: Option<Money>,
    /// Invoice items this term generated; the items live on their invoices
    #[serde(default)]
    pub invoice_items: Vec<InvoiceItemId>,
}

impl ChainMember for LeaseTerm {
    /// Every term chain belongs to exactly one lease item.
    type Group = ();

    fn group(&self) -> Self::Group {}
}

impl LeaseTerm {
    pub fn new(sequence: u32, frequency: TermFrequency, kind: TermKind) -> Self {
        LeaseTerm {
            sequence,
            status: TermStatus::New,
            frequency,
            kind,
            approved_value: None,
            invoice_items: Vec::new(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == TermStatus::Approved
    }

    /// The provisional value computed from the term's own fields.
    pub fn trial_value(&self) -> Money {
        match &self.kind {
            TermKind::IndexableRent(r) => r
                .settled_value
                .or(r.indexed_value)
                .unwrap_or(r.base_value),
            TermKind::ServiceCharge(s) => s.audited_value.unwrap_or(s.budgeted_value),
            TermKind::Fixed(f) => f.value,
        }
    }

    /// Approved value once approved, the trial value before.
    pub fn value(&self) -> Money {
        match (self.status, self.approved_value) {
            (TermStatus::Approved, Some(v)) => v,
            _ => self.trial_value(),
        }
    }

    /// Freezes the trial value. Approving twice is refused.
    pub fn approve(&mut self) -> LeaseResult<Money> {
        if self.is_approved() {
            return Err(LeaseError::validation(format!(
                "term {} is already approved",
                self.sequence
            )));
        }
        let value = self.trial_value();
        self.approved_value = Some(value);
        self.status = TermStatus::Approved;
        info!(sequence = self.sequence, %value, "term approved");
        Ok(value)
    }

    /// Annual value billed on an invoice due on `due_date`.
    ///
    /// Rent bills its base value until the effective date of the
    /// indexation. A service charge bills its budget, and switches to the
    /// audited amount for invoices due after the term has ended.
    pub fn value_for_due_date(&self, due_date: NaiveDate, interval: &DateInterval) -> Money {
        match &self.kind {
            TermKind::IndexableRent(r) => match r.effective_date {
                Some(effective) if due_date < effective => r.base_value,
                _ => self.value(),
            },
            TermKind::ServiceCharge(s) => {
                let after_end = interval.end_date().map_or(false, |end| due_date > end);
                if after_end && s.audited_value.is_some() {
                    self.value()
                } else {
                    s.budgeted_value
                }
            }
            TermKind::Fixed(_) => self.value(),
        }
    }

    /// Recomputes derived values of a new term. `predecessor_value` is the
    /// value of the term right before this one, which becomes the base of
    /// an indexable rent. Returns whether anything changed.
    pub fn refresh(
        &mut self,
        predecessor_value: Option<Money>,
        indices: &dyn IndexValueSource,
    ) -> LeaseResult<bool> {
        if self.is_approved() {
            return Ok(false);
        }
        let sequence = self.sequence;
        let TermKind::IndexableRent(rent) = &mut self.kind else {
            return Ok(false);
        };
        let before = rent.clone();
        if let Some(v) = predecessor_value {
            rent.base_value = v;
        }
        match (rent.base_index_start_date, rent.next_index_start_date) {
            (Some(base_date), Some(next_date)) => {
                let input =
                    resolve_indexation_input(indices, &rent.index, base_date, next_date, rent.base_value)?;
                let output = calculate_indexation(&input)?;
                rent.base_index_value = input.base_index_value;
                rent.next_index_value = input.next_index_value;
                rent.rebase_factor = input.rebase_factor;
                rent.indexation_percentage = output.indexation_percentage;
                rent.indexed_value = Some(output.indexed_value);
            }
            _ => {
                rent.indexation_percentage = None;
                rent.indexed_value = Some(rent.base_value);
            }
        }
        let changed = *rent != before;
        if changed {
            debug!(sequence, value = %self.trial_value(), "term recalculated");
        }
        Ok(changed)
    }

    /// The kind of the term that follows this one.
    pub fn successor_kind(&self) -> TermKind {
        match &self.kind {
            TermKind::IndexableRent(r) => TermKind::IndexableRent(RentIndexation {
                index: r.index.clone(),
                base_index_start_date: r.next_index_start_date,
                next_index_start_date: r.next_index_start_date.and_then(add_year),
                effective_date: r.effective_date.and_then(add_year),
                base_value: self.value(),
                ..RentIndexation::default()
            }),
            TermKind::ServiceCharge(s) => TermKind::ServiceCharge(ServiceChargeBudget {
                budgeted_value: s.audited_value.unwrap_or(s.budgeted_value),
                audited_value: None,
            }),
            TermKind::Fixed(f) => TermKind::Fixed(FixedCharge { value: f.value }),
        }
    }

    /// A new term continuing this one.
    pub fn successor(&self) -> LeaseResult<LeaseTerm> {
        let sequence = self.sequence.checked_add(1).ok_or_else(|| {
            LeaseError::invariant(format!("term {} has no successor sequence", self.sequence))
        })?;
        Ok(LeaseTerm::new(sequence, self.frequency, self.successor_kind()))
    }

    fn ensure_editable(&self) -> LeaseResult<()> {
        if self.is_approved() {
            return Err(LeaseError::validation(format!(
                "term {} is approved and can no longer be changed",
                self.sequence
            )));
        }
        Ok(())
    }

    pub fn set_base_value(&mut self, value: Money) -> LeaseResult<()> {
        self.ensure_editable()?;
        match &mut self.kind {
            TermKind::IndexableRent(r) => r.base_value = value,
            TermKind::ServiceCharge(s) => s.budgeted_value = value,
            TermKind::Fixed(f) => f.value = value,
        }
        Ok(())
    }

    pub fn set_settled_value(&mut self, value: Option<Money>) -> LeaseResult<()> {
        self.ensure_editable()?;
        match &mut self.kind {
            TermKind::IndexableRent(r) => {
                r.settled_value = value;
                Ok(())
            }
            _ => Err(LeaseError::validation("only rent terms carry a settled value")),
        }
    }

    pub fn set_audited_value(&mut self, value: Option<Money>) -> LeaseResult<()> {
        self.ensure_editable()?;
        match &mut self.kind {
            TermKind::ServiceCharge(s) => {
                s.audited_value = value;
                Ok(())
            }
            _ => Err(LeaseError::validation("only service charge terms carry an audited value")),
        }
    }

    /// Copy suitable for a follow-on lease: new, without invoice history.
    pub fn carried_over(&self) -> LeaseTerm {
        let mut kind = self.kind.clone();
        if let TermKind::IndexableRent(r) = &mut kind {
            r.base_value = self.value();
            r.indexed_value = None;
            r.indexation_percentage = None;
            r.base_index_value = None;
            r.next_index_value = None;
            r.rebase_factor = None;
        }
        LeaseTerm::new(self.sequence, self.frequency, kind)
    }
}

fn add_year(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(12))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
