use chrono::NaiveDate;
use leaseterm_core::chain::MemberId;
use leaseterm_core::frequency::{InvoicingFrequency, TermFrequency};
use leaseterm_core::indexation::IndexTable;
use leaseterm_core::invoice::{InvoiceBook, InvoiceItemStore, InvoiceStatus, LeaseItemId};
use leaseterm_core::item::LeaseItemType;
use leaseterm_core::lease::Lease;
use leaseterm_core::reconcile::{CalculationRequest, ReconcileOutcome};
use leaseterm_core::settings::EngineSettings;
use leaseterm_core::term::{RentIndexation, ServiceChargeBudget, TermKind};
use leaseterm_core::workbook::LeaseWorkbook;
use leaseterm_core::Money;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

// ===========================================================================
// Fixtures
// ===========================================================================

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn istat() -> IndexTable {
    let mut t = IndexTable::new();
    t.add_base("ISTAT-FOI", 2004, None);
    t.add_base("ISTAT-FOI", 2010, Some(dec!(1.373)));
    t.add_value("ISTAT-FOI", d(2010, 1, 1), dec!(137.6), 2004);
    t.add_value("ISTAT-FOI", d(2011, 1, 1), dec!(101.2), 2010);
    t.add_value("ISTAT-FOI", d(2012, 1, 1), dec!(103.9), 2010);
    t.add_value("ISTAT-FOI", d(2013, 1, 1), dec!(106.4), 2010);
    t
}

struct Topmodel {
    lease: Lease,
    rent: LeaseItemId,
    service: LeaseItemId,
}

fn topmodel() -> Topmodel {
    let mut lease = Lease::new("OXF-TOPMODEL-001", "Topmodel", d(2010, 7, 15), Some(d(2022, 7, 14))).unwrap();
    lease.tenant = Some("TOPMODEL".into());

    let rent = lease
        .new_item(LeaseItemType::Rent, InvoicingFrequency::QuarterlyInAdvance, d(2010, 7, 15))
        .unwrap();
    lease
        .item_mut(rent)
        .unwrap()
        .new_term(
            TermKind::IndexableRent(RentIndexation {
                index: "ISTAT-FOI".into(),
                base_index_start_date: Some(d(2010, 1, 1)),
                next_index_start_date: Some(d(2011, 1, 1)),
                effective_date: Some(d(2011, 1, 1)),
                base_value: dec!(20000.00),
                ..RentIndexation::default()
            }),
            TermFrequency::Yearly,
            d(2010, 7, 15),
            None,
        )
        .unwrap();

    let service = lease
        .new_item(LeaseItemType::ServiceCharge, InvoicingFrequency::QuarterlyInAdvance, d(2010, 7, 15))
        .unwrap();
    lease
        .item_mut(service)
        .unwrap()
        .new_term(
            TermKind::ServiceCharge(ServiceChargeBudget {
                budgeted_value: dec!(6000.00),
                audited_value: None,
            }),
            TermFrequency::Yearly,
            d(2010, 7, 15),
            None,
        )
        .unwrap();

    Topmodel { lease, rent, service }
}

fn first_term(lease: &Lease, item: LeaseItemId) -> MemberId {
    lease.item(item).unwrap().first_term().unwrap().id()
}

fn unapproved_amount(
    lease: &Lease,
    book: &InvoiceBook,
    item: LeaseItemId,
    term: MemberId,
    start: NaiveDate,
    due: NaiveDate,
) -> Option<Money> {
    lease
        .item(item)
        .unwrap()
        .find_unapproved_invoice_item_for(term, book, start, due)
        .unwrap()
        .and_then(|id| book.item(id).map(|i| i.net_amount))
}

// ===========================================================================
// Verification
// ===========================================================================

#[test]
fn test_verify_indexes_rent_and_rolls_forward() {
    let mut t = topmodel();
    t.lease.verify_until(d(2014, 1, 1), &istat()).unwrap();

    let rent = t.lease.item(t.rent).unwrap();
    let values: Vec<Money> = rent.timeline().iter().map(|s| s.member().value()).collect();
    assert_eq!(
        values,
        vec![
            dec!(20200.00),
            dec!(20745.40),
            dec!(21243.29),
            dec!(21243.29),
            dec!(21243.29)
        ]
    );

    let second = &rent.timeline()[1];
    assert_eq!(second.start_date(), Some(d(2011, 1, 1)));
    assert_eq!(second.end_date(), Some(d(2011, 12, 31)));
    match &second.member().kind {
        TermKind::IndexableRent(r) => {
            assert_eq!(r.base_index_value, Some(dec!(101.2)));
            assert_eq!(r.next_index_value, Some(dec!(103.9)));
            assert_eq!(r.indexation_percentage, Some(dec!(2.7)));
            assert_eq!(r.effective_date, Some(d(2012, 1, 1)));
        }
        other => panic!("unexpected kind {other:?}"),
    }
    assert!(rent.last_term().unwrap().end_date().is_none());
    assert_eq!(t.lease.item(t.service).unwrap().timeline().len(), 5);
}

#[test]
fn test_verify_is_idempotent() {
    let mut t = topmodel();
    t.lease.verify_until(d(2014, 1, 1), &istat()).unwrap();
    let once = t.lease.clone();
    let reports = t.lease.verify_until(d(2014, 1, 1), &istat()).unwrap();
    assert!(reports.iter().all(|r| r.report.is_empty()));
    assert_eq!(t.lease, once);
}

#[test]
fn test_approved_terms_are_not_recalculated() {
    let mut t = topmodel();
    t.lease.verify_until(d(2011, 1, 1), &istat()).unwrap();
    t.lease.approve_all_terms().unwrap();

    let mut revised = istat();
    revised.values.retain(|v| v.date != d(2012, 1, 1));
    revised.add_value("ISTAT-FOI", d(2012, 1, 1), dec!(110.0), 2010);
    t.lease.verify_until(d(2011, 1, 1), &revised).unwrap();

    let rent = t.lease.item(t.rent).unwrap();
    assert_eq!(rent.timeline()[1].member().value(), dec!(20745.40));
}

// ===========================================================================
// Invoicing
// ===========================================================================

#[test]
fn test_rent_invoicing_scenario() {
    let mut t = topmodel();
    t.lease.verify_until(d(2011, 1, 1), &istat()).unwrap();
    let term = first_term(&t.lease, t.rent);
    let mut book = InvoiceBook::new();
    let mut settings = EngineSettings::default();

    // new terms cannot be invoiced
    let err = t
        .lease
        .calculate_term(t.rent, term, &CalculationRequest::single(d(2010, 7, 1), d(2010, 7, 1)), &settings, &mut book)
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(book.items().count(), 0);

    t.lease.approve_all_terms().unwrap();

    let calc = |lease: &mut Lease, book: &mut InvoiceBook, settings: &EngineSettings, start, due| {
        lease
            .calculate_term(t.rent, term, &CalculationRequest::single(start, due), settings, book)
            .unwrap()
    };

    calc(&mut t.lease, &mut book, &settings, d(2010, 7, 1), d(2010, 7, 1));
    assert_eq!(
        unapproved_amount(&t.lease, &book, t.rent, term, d(2010, 7, 1), d(2010, 7, 1)),
        Some(dec!(4239.13))
    );

    calc(&mut t.lease, &mut book, &settings, d(2010, 10, 1), d(2010, 10, 1));
    assert_eq!(
        unapproved_amount(&t.lease, &book, t.rent, term, d(2010, 10, 1), d(2010, 10, 1)),
        Some(dec!(5000.00))
    );

    // due after the effective date: the indexed value applies
    calc(&mut t.lease, &mut book, &settings, d(2010, 10, 1), d(2011, 4, 1));
    assert_eq!(
        unapproved_amount(&t.lease, &book, t.rent, term, d(2010, 10, 1), d(2011, 4, 1)),
        Some(dec!(5050.00))
    );

    // before the epoch the previous system billed 5000 already
    settings.update_epoch_date(Some(d(2011, 1, 1)));
    let report = calc(&mut t.lease, &mut book, &settings, d(2010, 10, 1), d(2011, 4, 1));
    assert_eq!(report[0].outcome, ReconcileOutcome::Updated);
    assert_eq!(
        unapproved_amount(&t.lease, &book, t.rent, term, d(2010, 10, 1), d(2011, 4, 1)),
        Some(dec!(50.00))
    );

    let removed = t
        .lease
        .item_mut(t.rent)
        .unwrap()
        .remove_unapproved_invoice_items_for(term, &mut book, d(2010, 10, 1), d(2010, 10, 1))
        .unwrap();
    assert_eq!(removed, 1);
    let remaining = &t.lease.item(t.rent).unwrap().term(term).unwrap().member().invoice_items;
    assert_eq!(remaining.len(), 2);
    assert_eq!(book.items().count(), 2);
}

#[test]
fn test_service_charge_budget_then_audit() {
    let mut t = topmodel();
    // closes the first term on 2010-12-31
    t.lease.verify_until(d(2011, 1, 1), &istat()).unwrap();
    let term = first_term(&t.lease, t.service);
    t.lease
        .item_mut(t.service)
        .unwrap()
        .term_mut(term)
        .unwrap()
        .set_audited_value(Some(dec!(6600.00)))
        .unwrap();
    t.lease.approve_all_terms().unwrap();
    let mut book = InvoiceBook::new();
    let mut settings = EngineSettings::default();

    for (start, due, expected) in [
        (d(2010, 7, 1), d(2010, 7, 1), dec!(1271.74)),
        (d(2010, 10, 1), d(2010, 10, 1), dec!(1500.00)),
        (d(2010, 10, 1), d(2011, 10, 1), dec!(1650.00)),
    ] {
        t.lease
            .calculate_term(t.service, term, &CalculationRequest::single(start, due), &settings, &mut book)
            .unwrap();
        assert_eq!(unapproved_amount(&t.lease, &book, t.service, term, start, due), Some(expected));
    }

    settings.update_epoch_date(Some(d(2011, 10, 1)));
    t.lease
        .calculate_term(
            t.service,
            term,
            &CalculationRequest::single(d(2010, 10, 1), d(2011, 10, 1)),
            &settings,
            &mut book,
        )
        .unwrap();
    assert_eq!(
        unapproved_amount(&t.lease, &book, t.service, term, d(2010, 10, 1), d(2011, 10, 1)),
        Some(dec!(150.00))
    );
}

#[test]
fn test_bulk_calculation_is_idempotent() {
    let mut t = topmodel();
    t.lease.verify_until(d(2011, 1, 1), &istat()).unwrap();
    t.lease.approve_all_terms().unwrap();
    let mut book = InvoiceBook::new();
    let settings = EngineSettings::default();
    let request = CalculationRequest {
        period_start: d(2010, 7, 1),
        period_end: Some(d(2011, 6, 30)),
        due_date: None,
        run_type: Default::default(),
    };

    let first = t.lease.calculate(&request, &settings, &mut book).unwrap();
    // two items, four quarters each
    assert_eq!(first.items.len(), 8);
    assert!(first.items.iter().all(|i| i.outcome == ReconcileOutcome::Created));
    let snapshot = book.clone();

    let second = t.lease.calculate(&request, &settings, &mut book).unwrap();
    assert!(second.items.iter().all(|i| i.outcome == ReconcileOutcome::Unchanged));
    assert_eq!(book, snapshot);
}

// ===========================================================================
// Removal and termination
// ===========================================================================

#[test]
fn test_remove_term_cascade() {
    let mut t = topmodel();
    t.lease.verify_until(d(2014, 1, 1), &istat()).unwrap();
    let mut book = InvoiceBook::new();
    let item = t.lease.item_mut(t.rent).unwrap();
    let third = item.find_term(d(2012, 1, 1)).unwrap().id();
    let removed = item.remove_term(third, &mut book).unwrap();
    assert_eq!(removed.len(), 3);
    assert_eq!(item.timeline().len(), 2);
    assert!(item.terms.check_integrity().is_ok());
}

#[test]
fn test_terminate_then_recalculate() {
    let mut t = topmodel();
    t.lease.verify_until(d(2012, 1, 1), &istat()).unwrap();
    t.lease.approve_all_terms().unwrap();
    let mut book = InvoiceBook::new();
    let settings = EngineSettings::default();

    let report = t.lease.terminate(d(2011, 2, 15), true, &mut book).unwrap();
    assert_eq!(report.removed_terms.len(), 2);
    assert_eq!(t.lease.effective_interval().end_date(), Some(d(2011, 2, 15)));

    let out = t
        .lease
        .calculate(&CalculationRequest::single(d(2011, 1, 1), d(2011, 1, 1)), &settings, &mut book)
        .unwrap();
    let rent: Vec<_> = out.items.iter().filter(|i| i.term.item == t.rent).collect();
    assert_eq!(rent.len(), 1);
    // 46 of 90 days at 20200 a year
    assert_eq!(rent[0].net_amount, dec!(2581.11));
}

// ===========================================================================
// Workbook
// ===========================================================================

#[test]
fn test_workbook_json_round_trip_preserves_behaviour() {
    let t = topmodel();
    let mut wb = LeaseWorkbook::new(t.lease);
    wb.indices = istat();
    wb.verify_until(d(2011, 1, 1)).unwrap();
    wb.approve_all_terms().unwrap();

    let mut restored = LeaseWorkbook::from_json(&wb.to_json().unwrap()).unwrap();
    assert_eq!(restored, wb);

    let request = CalculationRequest::single(d(2010, 7, 1), d(2010, 7, 1));
    let a = wb.calculate(&request).unwrap();
    let b = restored.calculate(&request).unwrap();
    assert_eq!(a.result, b.result);
    assert_eq!(wb.invoices, restored.invoices);
}

#[test]
fn test_workbook_without_counters_keeps_approved_invoices() {
    let t = topmodel();
    let mut wb = LeaseWorkbook::new(t.lease);
    wb.indices = istat();
    wb.verify_until(d(2011, 1, 1)).unwrap();
    wb.approve_all_terms().unwrap();
    wb.calculate(&CalculationRequest::single(d(2010, 7, 1), d(2010, 7, 1)))
        .unwrap();
    assert_eq!(wb.approve_invoices_due(d(2010, 7, 1)).len(), 1);

    // hand-edited workbooks may lack the id counters
    let mut json = serde_json::to_value(&wb).unwrap();
    let invoices = json["invoices"].as_object_mut().unwrap();
    invoices.remove("next_invoice_id");
    invoices.remove("next_item_id");
    let mut restored = LeaseWorkbook::from_json(&json.to_string()).unwrap();

    let out = restored
        .calculate(&CalculationRequest::single(d(2010, 10, 1), d(2010, 10, 1)))
        .unwrap();
    assert_eq!(out.result.items.len(), 2);

    let rows = restored.invoice_rows();
    assert_eq!(rows.len(), 4);
    let approved: Vec<Money> = rows
        .iter()
        .filter(|r| r.status == InvoiceStatus::Approved)
        .map(|r| r.net_amount)
        .collect();
    assert_eq!(approved, vec![dec!(4239.13), dec!(1271.74)]);
    let fresh: Vec<Money> = rows
        .iter()
        .filter(|r| r.status == InvoiceStatus::New)
        .map(|r| r.net_amount)
        .collect();
    assert_eq!(fresh, vec![dec!(5000.00), dec!(1500.00)]);
}

#[test]
fn test_workbook_with_repeated_term_id_is_rejected() {
    let t = topmodel();
    let mut wb = LeaseWorkbook::new(t.lease);
    wb.indices = istat();
    wb.verify_until(d(2012, 1, 1)).unwrap();

    let mut json = serde_json::to_value(&wb).unwrap();
    let segments = &mut json["lease"]["items"][0]["terms"]["segments"];
    let first_id = segments[0]["id"].clone();
    segments[2]["id"] = first_id;
    let err = LeaseWorkbook::from_json(&json.to_string()).unwrap_err();
    assert!(err.to_string().contains("duplicate chain member id"));
}
