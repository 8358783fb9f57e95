//! Invoices and the invoice items generated from lease terms.
//!
//! Items are grouped into invoices per lease, due date and run type. Once an
//! invoice is approved none of its items can be changed or deleted.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::MemberId;
use crate::error::LeaseError;
use crate::types::Money;
use crate::LeaseResult;

pub type InvoiceId = u32;
pub type InvoiceItemId = u32;
pub type LeaseItemId = u32;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceRunType {
    #[default]
    NormalRun,
    /// Catch-up run for periods that were already invoiced
    RetroRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    #[default]
    New,
    Approved,
}

impl fmt::Display for InvoiceRunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceRunType::NormalRun => f.write_str("NORMAL_RUN"),
            InvoiceRunType::RetroRun => f.write_str("RETRO_RUN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The lease term an invoice item was generated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermRef {
    pub lease: String,
    pub item: LeaseItemId,
    pub term: MemberId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub invoice: InvoiceId,
    pub source: TermRef,
    /// Start of the billing cycle the item covers
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub due_date: NaiveDate,
    pub net_amount: Money,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub lease_reference: String,
    pub due_date: NaiveDate,
    pub run_type: InvoiceRunType,
    pub status: InvoiceStatus,
    pub items: Vec<InvoiceItemId>,
}

/// What the reconciler asks the store to create.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceItemDraft {
    pub source: TermRef,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub due_date: NaiveDate,
    pub net_amount: Money,
    pub run_type: InvoiceRunType,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Persistence of invoice items as seen by the reconciler. Every method is
/// one independent, retry-safe side effect.
pub trait InvoiceItemStore {
    fn item(&self, id: InvoiceItemId) -> Option<&InvoiceItem>;

    /// Whether the item belongs to an approved invoice.
    fn is_approved(&self, id: InvoiceItemId) -> bool;

    fn create_item(&mut self, draft: InvoiceItemDraft) -> LeaseResult<InvoiceItemId>;

    fn update_net_amount(&mut self, id: InvoiceItemId, net_amount: Money) -> LeaseResult<()>;

    fn delete_item(&mut self, id: InvoiceItemId) -> LeaseResult<()>;
}

/// In-memory invoices keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInvoiceBook")]
pub struct InvoiceBook {
    invoices: BTreeMap<InvoiceId, Invoice>,
    items: BTreeMap<InvoiceItemId, InvoiceItem>,
    next_invoice_id: InvoiceId,
    next_item_id: InvoiceItemId,
}

#[derive(Deserialize)]
struct RawInvoiceBook {
    #[serde(default)]
    invoices: BTreeMap<InvoiceId, Invoice>,
    #[serde(default)]
    items: BTreeMap<InvoiceItemId, InvoiceItem>,
    #[serde(default)]
    next_invoice_id: InvoiceId,
    #[serde(default)]
    next_item_id: InvoiceItemId,
}

impl TryFrom<RawInvoiceBook> for InvoiceBook {
    type Error = LeaseError;

    fn try_from(raw: RawInvoiceBook) -> Result<Self, Self::Error> {
        let mut next_invoice_id = raw.next_invoice_id;
        for (key, invoice) in &raw.invoices {
            if *key != invoice.id {
                return Err(LeaseError::invariant(format!(
                    "invoice {} is stored under id {key}",
                    invoice.id
                )));
            }
            next_invoice_id = next_invoice_id.max(id_after(*key, "invoice")?);
            for item in &invoice.items {
                if raw.items.get(item).map(|i| i.invoice) != Some(*key) {
                    return Err(LeaseError::invariant(format!(
                        "invoice {key} lists item {item} which does not belong to it"
                    )));
                }
            }
        }
        let mut next_item_id = raw.next_item_id;
        for (key, item) in &raw.items {
            if *key != item.id {
                return Err(LeaseError::invariant(format!(
                    "invoice item {} is stored under id {key}",
                    item.id
                )));
            }
            let listed = raw
                .invoices
                .get(&item.invoice)
                .map_or(false, |inv| inv.items.contains(key));
            if !listed {
                return Err(LeaseError::invariant(format!(
                    "invoice item {key} is not listed on invoice {}",
                    item.invoice
                )));
            }
            next_item_id = next_item_id.max(id_after(*key, "invoice item")?);
        }
        Ok(InvoiceBook {
            invoices: raw.invoices,
            items: raw.items,
            next_invoice_id,
            next_item_id,
        })
    }
}

fn id_after(id: u32, what: &str) -> LeaseResult<u32> {
    id.checked_add(1)
        .ok_or_else(|| LeaseError::invariant(format!("{what} id {id} exhausts the id space")))
}

impl InvoiceBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invoices(&self) -> impl Iterator<Item = &Invoice> {
        self.invoices.values()
    }

    pub fn items(&self) -> impl Iterator<Item = &InvoiceItem> {
        self.items.values()
    }

    pub fn invoice(&self, id: InvoiceId) -> Option<&Invoice> {
        self.invoices.get(&id)
    }

    pub fn items_of(&self, invoice: InvoiceId) -> Vec<&InvoiceItem> {
        self.items.values().filter(|i| i.invoice == invoice).collect()
    }

    pub fn invoice_total(&self, id: InvoiceId) -> Money {
        self.items_of(id).iter().map(|i| i.net_amount).sum()
    }

    /// Freezes an invoice and every item on it.
    pub fn approve_invoice(&mut self, id: InvoiceId) -> LeaseResult<()> {
        let invoice = self
            .invoices
            .get_mut(&id)
            .ok_or_else(|| LeaseError::NotFound(format!("invoice {id}")))?;
        if invoice.status == InvoiceStatus::Approved {
            return Err(LeaseError::validation(format!("invoice {id} is already approved")));
        }
        invoice.status = InvoiceStatus::Approved;
        info!(invoice = id, due_date = %invoice.due_date, "invoice approved");
        Ok(())
    }

    /// Approves every new invoice of `lease_reference` due on or before `due_until`.
    pub fn approve_due(&mut self, lease_reference: &str, due_until: NaiveDate) -> Vec<InvoiceId> {
        let ids: Vec<InvoiceId> = self
            .invoices
            .values()
            .filter(|i| {
                i.lease_reference == lease_reference
                    && i.status == InvoiceStatus::New
                    && i.due_date <= due_until
            })
            .map(|i| i.id)
            .collect();
        for id in &ids {
            if let Some(invoice) = self.invoices.get_mut(id) {
                invoice.status = InvoiceStatus::Approved;
            }
        }
        if !ids.is_empty() {
            info!(lease = lease_reference, count = ids.len(), %due_until, "invoices approved");
        }
        ids
    }

    fn open_invoice_for(
        &mut self,
        lease: &str,
        due_date: NaiveDate,
        run_type: InvoiceRunType,
    ) -> LeaseResult<InvoiceId> {
        if let Some(existing) = self.invoices.values().find(|i| {
            i.status == InvoiceStatus::New
                && i.lease_reference == lease
                && i.due_date == due_date
                && i.run_type == run_type
        }) {
            return Ok(existing.id);
        }
        let id = self.next_invoice_id;
        self.next_invoice_id = id_after(id, "invoice")?;
        self.invoices.insert(
            id,
            Invoice {
                id,
                lease_reference: lease.to_string(),
                due_date,
                run_type,
                status: InvoiceStatus::New,
                items: Vec::new(),
            },
        );
        debug!(invoice = id, lease, %due_date, %run_type, "invoice opened");
        Ok(id)
    }

    fn ensure_mutable(&self, id: InvoiceItemId) -> LeaseResult<()> {
        if !self.items.contains_key(&id) {
            return Err(LeaseError::NotFound(format!("invoice item {id}")));
        }
        if self.is_approved(id) {
            return Err(LeaseError::validation(format!(
                "invoice item {id} is on an approved invoice"
            )));
        }
        Ok(())
    }
}

impl InvoiceItemStore for InvoiceBook {
    fn item(&self, id: InvoiceItemId) -> Option<&InvoiceItem> {
        self.items.get(&id)
    }

    fn is_approved(&self, id: InvoiceItemId) -> bool {
        self.items
            .get(&id)
            .and_then(|item| self.invoices.get(&item.invoice))
            .map_or(false, |inv| inv.status == InvoiceStatus::Approved)
    }

    fn create_item(&mut self, draft: InvoiceItemDraft) -> LeaseResult<InvoiceItemId> {
        let id = self.next_item_id;
        let next_item_id = id_after(id, "invoice item")?;
        let invoice = self.open_invoice_for(&draft.source.lease, draft.due_date, draft.run_type)?;
        self.next_item_id = next_item_id;
        self.items.insert(
            id,
            InvoiceItem {
                id,
                invoice,
                source: draft.source,
                start_date: draft.start_date,
                end_date: draft.end_date,
                due_date: draft.due_date,
                net_amount: draft.net_amount,
                description: draft.description,
            },
        );
        if let Some(inv) = self.invoices.get_mut(&invoice) {
            inv.items.push(id);
        }
        Ok(id)
    }

    fn update_net_amount(&mut self, id: InvoiceItemId, net_amount: Money) -> LeaseResult<()> {
        self.ensure_mutable(id)?;
        if let Some(item) = self.items.get_mut(&id) {
            item.net_amount = net_amount;
        }
        Ok(())
    }

    fn delete_item(&mut self, id: InvoiceItemId) -> LeaseResult<()> {
        self.ensure_mutable(id)?;
        if let Some(item) = self.items.remove(&id) {
            let now_empty = match self.invoices.get_mut(&item.invoice) {
                Some(inv) => {
                    inv.items.retain(|i| *i != id);
                    inv.items.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.invoices.remove(&item.invoice);
            }
        }
        Ok(())
    }
}

/// Sum of the amounts on approved items among `ids`.
pub fn approved_total<'a, S: InvoiceItemStore + ?Sized>(
    store: &S,
    ids: impl IntoIterator<Item = &'a InvoiceItemId>,
) -> Money {
    ids.into_iter()
        .filter(|id| store.is_approved(**id))
        .filter_map(|id| store.item(*id))
        .map(|i| i.net_amount)
        .fold(Decimal::ZERO, |acc, v| acc + v)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
