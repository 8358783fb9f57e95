//! Day-based proration of annual values over billing cycles.
//!
//! A cycle's full amount is `annual value × months / 12`. When only part of
//! a cycle is billable the amount is scaled by `billable days / cycle days`.
//! The multiplication is carried out before the single division so that the
//! same inputs always produce the same digits, and rounding to cents
//! happens once, at the end.

use std::time::Instant;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LeaseError;
use crate::frequency::{BillingCycle, InvoicingFrequency};
use crate::interval::DateInterval;
use crate::types::{round_half_up, with_metadata, ComputationOutput, Money};
use crate::LeaseResult;

const MONEY_SCALE: u32 = 2;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProrationInput {
    /// Interval in which the term may bill
    pub effective_interval: DateInterval,
    /// First day of the requested period
    pub period_start: NaiveDate,
    /// Last day of the requested period. Without it the period is the
    /// whole cycle containing `period_start`, as when invoicing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<NaiveDate>,
    /// Annual value
    pub value: Money,
    pub frequency: InvoicingFrequency,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleProration {
    pub cycle_start: NaiveDate,
    pub cycle_end: NaiveDate,
    /// Billable days of this cycle within the period and the term
    pub days_in_overlap: i64,
    pub days_in_cycle: i64,
    /// This cycle's share, rounded on its own
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProrationOutput {
    /// Sum over all cycles, rounded once
    pub net_amount: Money,
    pub cycles: Vec<CycleProration>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Prorate `input.value` over the requested period.
pub fn prorate(input: &ProrationInput) -> LeaseResult<ComputationOutput<ProrationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let first = input.frequency.cycle_containing(input.period_start)?;
    let (period_start, period_end) = match input.period_end {
        Some(end) => (input.period_start, end),
        None => (first.start_date, first.end_date),
    };
    if period_end < period_start {
        return Err(LeaseError::InvalidInput {
            field: "period_end".into(),
            reason: format!("Period end {period_end} is before period start {period_start}"),
        });
    }
    let window = DateInterval::between(period_start, period_end)?;
    if !window.overlaps(&input.effective_interval) {
        warnings.push(format!(
            "Period {window} lies outside the effective interval {}",
            input.effective_interval
        ));
    }

    let mut exact_total = Decimal::ZERO;
    let mut cycles = Vec::new();
    let mut cycle = first;
    while cycle.start_date <= period_end {
        let billable = input
            .effective_interval
            .overlap(&window)
            .and_then(|w| w.overlap(&cycle.interval()));
        let days_in_overlap = billable.and_then(|b| b.days()).unwrap_or(0);
        let exact = cycle_amount_exact(input.value, input.frequency, &cycle, billable.as_ref());
        exact_total += exact;
        cycles.push(CycleProration {
            cycle_start: cycle.start_date,
            cycle_end: cycle.end_date,
            days_in_overlap,
            days_in_cycle: cycle.days(),
            amount: round_half_up(exact, MONEY_SCALE),
        });
        cycle = input.frequency.next_cycle(&cycle)?;
    }

    let output = ProrationOutput {
        net_amount: round_half_up(exact_total, MONEY_SCALE),
        cycles,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Day-based proration of an annual value over billing cycles",
        input,
        warnings,
        elapsed,
        output,
    ))
}

/// Unrounded share of `annual_value` for the days of `cycle` inside
/// `billable`. `None` or a disjoint interval yields zero.
pub fn cycle_amount_exact(
    annual_value: Money,
    frequency: InvoicingFrequency,
    cycle: &BillingCycle,
    billable: Option<&DateInterval>,
) -> Decimal {
    let days = billable
        .and_then(|b| b.overlap(&cycle.interval()))
        .and_then(|o| o.days())
        .unwrap_or(0);
    if days == 0 {
        return Decimal::ZERO;
    }
    let numerator = annual_value * Decimal::from(i64::from(frequency.months()) * days);
    numerator / Decimal::from(12 * cycle.days())
}

/// Rounded share of `annual_value` for one cycle restricted to `billable`.
pub fn cycle_amount(
    annual_value: Money,
    frequency: InvoicingFrequency,
    cycle: &BillingCycle,
    billable: Option<&DateInterval>,
) -> Money {
    round_half_up(
        cycle_amount_exact(annual_value, frequency, cycle, billable),
        MONEY_SCALE,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rent_input(start: NaiveDate, end: Option<NaiveDate>) -> ProrationInput {
        ProrationInput {
            effective_interval: DateInterval::between(d(2010, 7, 15), d(2010, 12, 31)).unwrap(),
            period_start: start,
            period_end: end,
            value: dec!(20000.00),
            frequency: InvoicingFrequency::QuarterlyInAdvance,
        }
    }

    #[test]
    fn test_partial_first_quarter() {
        let out = prorate(&rent_input(d(2010, 7, 1), None)).unwrap().result;
        assert_eq!(out.net_amount, dec!(4239.13));
        assert_eq!(out.cycles.len(), 1);
        assert_eq!(out.cycles[0].days_in_overlap, 78);
        assert_eq!(out.cycles[0].days_in_cycle, 92);
    }

    #[test]
    fn test_full_quarter() {
        let out = prorate(&rent_input(d(2010, 10, 1), None)).unwrap().result;
        assert_eq!(out.net_amount, dec!(5000.00));
    }

    #[test]
    fn test_service_charge_partial_quarter() {
        let mut input = rent_input(d(2010, 7, 1), None);
        input.value = dec!(6000.00);
        assert_eq!(prorate(&input).unwrap().result.net_amount, dec!(1271.74));
    }

    #[test]
    fn test_open_period_covers_whole_cycle() {
        let out = prorate(&rent_input(d(2010, 11, 15), None)).unwrap().result;
        assert_eq!(out.net_amount, dec!(5000.00));
        assert_eq!(out.cycles[0].cycle_start, d(2010, 10, 1));
        assert_eq!(out.cycles[0].days_in_overlap, 92);
    }

    #[test]
    fn test_multi_cycle_period() {
        let out = prorate(&rent_input(d(2010, 7, 1), Some(d(2010, 12, 31))))
            .unwrap()
            .result;
        assert_eq!(out.cycles.len(), 2);
        assert_eq!(out.net_amount, dec!(9239.13));
    }

    #[test]
    fn test_period_outside_term_is_zero_with_warning() {
        let out = prorate(&rent_input(d(2011, 1, 1), None)).unwrap();
        assert_eq!(out.result.net_amount, Decimal::ZERO);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_reversed_period_is_rejected() {
        let err = prorate(&rent_input(d(2010, 10, 1), Some(d(2010, 9, 1)))).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_split_quarter_sums_to_full_quarter() {
        let a = prorate(&rent_input(d(2010, 10, 1), Some(d(2010, 11, 14)))).unwrap().result;
        let b = prorate(&rent_input(d(2010, 11, 15), Some(d(2010, 12, 31)))).unwrap().result;
        let diff = (a.net_amount + b.net_amount - dec!(5000.00)).abs();
        assert!(diff <= dec!(0.01), "difference {diff}");
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let input = rent_input(d(2010, 7, 1), None);
        let a = prorate(&input).unwrap().result;
        let b = prorate(&input).unwrap().result;
        assert_eq!(a, b);
        assert_eq!(a.net_amount.to_string(), b.net_amount.to_string());
    }
}
