//! A lease with everything needed to work on it: its invoices, the index
//! series and the engine settings. This is the unit the CLI and the
//! bindings read and write as JSON.

use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::chain::MemberId;
use crate::indexation::IndexTable;
use crate::invoice::{InvoiceBook, InvoiceId, InvoiceItemId, InvoiceRunType, InvoiceStatus, LeaseItemId};
use crate::item::{CalculationReport, LeaseItemType};
use crate::lease::{ItemVerification, Lease, TermKey, TerminationReport};
use crate::reconcile::CalculationRequest;
use crate::settings::EngineSettings;
use crate::term::TermStatus;
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::LeaseResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseWorkbook {
    pub lease: Lease,
    #[serde(default)]
    pub invoices: InvoiceBook,
    #[serde(default)]
    pub indices: IndexTable,
    #[serde(default)]
    pub settings: EngineSettings,
}

/// One term as listed by `timeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermRow {
    pub item: LeaseItemId,
    pub item_type: LeaseItemType,
    pub term: MemberId,
    pub sequence: u32,
    pub kind: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: TermStatus,
    pub value: Money,
}

/// One invoice item as listed by `invoices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRow {
    pub invoice: InvoiceId,
    pub item: InvoiceItemId,
    pub due_date: NaiveDate,
    pub run_type: InvoiceRunType,
    pub status: InvoiceStatus,
    pub lease_item: LeaseItemId,
    pub term: MemberId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub net_amount: Money,
}

#[derive(Debug, Serialize)]
struct TargetAssumption {
    lease: String,
    target: NaiveDate,
}

/// A request to move the bounds of one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermDatesChange {
    pub item: LeaseItemId,
    pub term: MemberId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Move the adjacent terms along instead of requiring a fit
    #[serde(default)]
    pub adjust_neighbours: bool,
}

#[derive(Debug, Serialize)]
struct CalculationAssumption<'a> {
    lease: &'a str,
    request: &'a CalculationRequest,
    settings: &'a EngineSettings,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl LeaseWorkbook {
    pub fn new(lease: Lease) -> Self {
        LeaseWorkbook {
            lease,
            invoices: InvoiceBook::new(),
            indices: IndexTable::new(),
            settings: EngineSettings::default(),
        }
    }

    pub fn from_json(json: &str) -> LeaseResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> LeaseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn verify_until(
        &mut self,
        target: NaiveDate,
    ) -> LeaseResult<ComputationOutput<Vec<ItemVerification>>> {
        let start = Instant::now();
        let reports = self.lease.verify_until(target, &self.indices)?;
        let mut warnings = Vec::new();
        if self.lease.items.is_empty() {
            warnings.push(format!("Lease {} has no items to verify", self.lease.reference));
        }
        Ok(with_metadata(
            "Term chain verification (refresh new terms, roll forward to target)",
            &TargetAssumption {
                lease: self.lease.reference.clone(),
                target,
            },
            warnings,
            start.elapsed().as_micros() as u64,
            reports,
        ))
    }

    pub fn approve_all_terms(&mut self) -> LeaseResult<ComputationOutput<Vec<TermKey>>> {
        let start = Instant::now();
        let approved = self.lease.approve_all_terms()?;
        let warnings = if approved.is_empty() {
            vec!["No new terms to approve".to_string()]
        } else {
            Vec::new()
        };
        Ok(with_metadata(
            "Term approval (values frozen at approval)",
            &serde_json::json!({ "lease": self.lease.reference }),
            warnings,
            start.elapsed().as_micros() as u64,
            approved,
        ))
    }

    pub fn calculate(
        &mut self,
        request: &CalculationRequest,
    ) -> LeaseResult<ComputationOutput<CalculationReport>> {
        let start = Instant::now();
        let report = self.lease.calculate(request, &self.settings, &mut self.invoices)?;
        let warnings = report
            .skipped_terms
            .iter()
            .map(|s| format!("item {} term {}: {}", s.term.item, s.term.term, s.reason))
            .collect();
        Ok(with_metadata(
            "Invoice item reconciliation keyed by cycle start and due date",
            &CalculationAssumption {
                lease: &self.lease.reference,
                request,
                settings: &self.settings,
            },
            warnings,
            start.elapsed().as_micros() as u64,
            report,
        ))
    }

    pub fn terminate(
        &mut self,
        date: NaiveDate,
        confirm: bool,
    ) -> LeaseResult<ComputationOutput<TerminationReport>> {
        let start = Instant::now();
        let report = self.lease.terminate(date, confirm, &mut self.invoices)?;
        Ok(with_metadata(
            "Lease termination (cascading truncation of terms, occupancies and break options)",
            &TargetAssumption {
                lease: self.lease.reference.clone(),
                target: date,
            },
            Vec::new(),
            start.elapsed().as_micros() as u64,
            report,
        ))
    }

    /// Moves a term's bounds and lists that item's terms afterwards.
    pub fn change_term_dates(
        &mut self,
        change: &TermDatesChange,
    ) -> LeaseResult<ComputationOutput<Vec<TermRow>>> {
        let start = Instant::now();
        self.lease.change_term_dates(
            change.item,
            change.term,
            change.start_date,
            change.end_date,
            change.adjust_neighbours,
        )?;
        let rows = self
            .timeline()
            .into_iter()
            .filter(|r| r.item == change.item)
            .collect();
        Ok(with_metadata(
            "Term date change within the item's contiguous chain",
            change,
            Vec::new(),
            start.elapsed().as_micros() as u64,
            rows,
        ))
    }

    /// Approves the unapproved invoices of this lease due on or before
    /// `due_until`.
    pub fn approve_invoices_due(&mut self, due_until: NaiveDate) -> Vec<InvoiceId> {
        self.invoices.approve_due(&self.lease.reference, due_until)
    }

    /// Every term of every item, items in order, terms by start date.
    pub fn timeline(&self) -> Vec<TermRow> {
        let mut rows = Vec::new();
        for item in &self.lease.items {
            for segment in item.timeline() {
                let term = segment.member();
                rows.push(TermRow {
                    item: item.id,
                    item_type: item.item_type,
                    term: segment.id(),
                    sequence: term.sequence,
                    kind: term.kind.code().to_string(),
                    start_date: segment.start_date(),
                    end_date: segment.end_date(),
                    status: term.status,
                    value: term.value(),
                });
            }
        }
        rows
    }

    /// Invoice items of this lease, by due date then item id.
    pub fn invoice_rows(&self) -> Vec<InvoiceRow> {
        let mut rows: Vec<InvoiceRow> = self
            .invoices
            .invoices()
            .filter(|inv| inv.lease_reference == self.lease.reference)
            .flat_map(|inv| {
                self.invoices.items_of(inv.id).into_iter().map(move |item| InvoiceRow {
                    invoice: inv.id,
                    item: item.id,
                    due_date: inv.due_date,
                    run_type: inv.run_type,
                    status: inv.status,
                    lease_item: item.source.item,
                    term: item.source.term,
                    start_date: item.start_date,
                    end_date: item.end_date,
                    net_amount: item.net_amount,
                })
            })
            .collect();
        rows.sort_by_key(|r| (r.due_date, r.item));
        rows
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
