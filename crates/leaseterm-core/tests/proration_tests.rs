use chrono::{Duration, NaiveDate};
use leaseterm_core::frequency::InvoicingFrequency;
use leaseterm_core::indexation::{calculate_indexation, IndexationInput};
use leaseterm_core::interval::DateInterval;
use leaseterm_core::proration::{cycle_amount, cycle_amount_exact, prorate, ProrationInput};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn frequency() -> impl Strategy<Value = InvoicingFrequency> {
    prop::sample::select(InvoicingFrequency::ALL.to_vec())
}

fn money() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

#[test]
fn test_known_partial_quarter() {
    let cycle = InvoicingFrequency::QuarterlyInAdvance
        .cycle_containing(d(2010, 7, 1))
        .unwrap();
    let billable = DateInterval::starting(d(2010, 7, 15));
    assert_eq!(
        cycle_amount(dec!(20000), InvoicingFrequency::QuarterlyInAdvance, &cycle, Some(&billable)),
        dec!(4239.13)
    );
}

proptest! {
    #[test]
    fn split_cycles_add_up(
        value in money(),
        freq in frequency(),
        day in 0i64..3650,
        cut in 0i64..200,
    ) {
        let cycle = freq.cycle_containing(d(2010, 1, 1) + Duration::days(day)).unwrap();
        let cut = cycle.start_date + Duration::days(cut % cycle.days());
        let whole = cycle_amount_exact(value, freq, &cycle, Some(&cycle.interval()));
        let before = DateInterval::including(Some(cycle.start_date), Some(cut)).unwrap();
        let after = DateInterval::starting(cut + Duration::days(1));
        let parts = cycle_amount_exact(value, freq, &cycle, Some(&before))
            + cycle_amount_exact(value, freq, &cycle, Some(&after));
        prop_assert!((whole - parts).abs() < dec!(0.000000000001));
        prop_assert_eq!(
            cycle_amount(value, freq, &cycle, Some(&cycle.interval())),
            (value * Decimal::from(freq.months()) / dec!(12)).round_dp_with_strategy(
                2,
                rust_decimal::RoundingStrategy::MidpointAwayFromZero
            )
        );
    }

    #[test]
    fn proration_is_deterministic(value in money(), freq in frequency(), offset in 0i64..365) {
        let input = ProrationInput {
            effective_interval: DateInterval::starting(d(2010, 7, 15)),
            period_start: d(2010, 7, 1) + Duration::days(offset),
            period_end: None,
            value,
            frequency: freq,
        };
        let a = prorate(&input).unwrap();
        let b = prorate(&input).unwrap();
        prop_assert_eq!(a.result.net_amount, b.result.net_amount);
        prop_assert_eq!(a.result.cycles.len(), b.result.cycles.len());
    }

    #[test]
    fn equal_index_values_leave_value_unchanged(value in money(), index in 1i64..30_000) {
        let point = Decimal::new(index, 1);
        let out = calculate_indexation(&IndexationInput {
            base_index_value: Some(point),
            next_index_value: Some(point),
            base_value: value,
            rebase_factor: None,
        })
        .unwrap();
        prop_assert_eq!(out.indexation_percentage, Some(Decimal::ZERO));
        prop_assert_eq!(out.indexed_value, value);
    }
}
