//! Rent indexation against a published price index.
//!
//! The indexation percentage is the change between a base and a next index
//! value, rounded to one decimal, and the indexed value applies that
//! percentage to the un-indexed base value. Index series are occasionally
//! rebased (for example from base year 2004 to base year 2010); a base value
//! expressed on an older base is first divided by the rebase factor so both
//! values are comparable.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LeaseError;
use crate::types::{round_half_up, IndexPoint, Money};
use crate::LeaseResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const INDEX_SCALE: u32 = 4;
const PERCENTAGE_SCALE: u32 = 1;
const MONEY_SCALE: u32 = 2;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Input for a single indexation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexationInput {
    /// Index value at the base index start date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_index_value: Option<IndexPoint>,
    /// Index value at the next index start date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_index_value: Option<IndexPoint>,
    /// Un-indexed annual value
    pub base_value: Money,
    /// Divisor converting the base index value onto the next value's base
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebase_factor: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexationOutput {
    /// Percentage change, one decimal; absent when indexation was skipped
    pub indexation_percentage: Option<IndexPoint>,
    /// Base value with the percentage applied, two decimals
    pub indexed_value: Money,
    /// False when index data was missing and the base value passed through
    pub indexed: bool,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Index `input.base_value` by the ratio of the next to the base index value.
///
/// A missing or zero base index value, or a missing next index value, means
/// the term is not indexable yet: the base value is returned unchanged.
pub fn calculate_indexation(input: &IndexationInput) -> LeaseResult<IndexationOutput> {
    validate_input(input)?;

    let skipped = IndexationOutput {
        indexation_percentage: None,
        indexed_value: input.base_value,
        indexed: false,
    };

    let (base, next) = match (input.base_index_value, input.next_index_value) {
        (Some(b), Some(n)) if !b.is_zero() => (b, n),
        _ => return Ok(skipped),
    };

    let base = match input.rebase_factor {
        Some(factor) => round_half_up(base / factor, INDEX_SCALE),
        None => base,
    };
    if base.is_zero() {
        return Ok(skipped);
    }

    let percentage = round_half_up((next / base - Decimal::ONE) * dec!(100), PERCENTAGE_SCALE);
    let indexed_value = round_half_up(
        input.base_value * (dec!(100) + percentage) / dec!(100),
        MONEY_SCALE,
    );

    Ok(IndexationOutput {
        indexation_percentage: Some(percentage),
        indexed_value,
        indexed: true,
    })
}

// ---------------------------------------------------------------------------
// Index value source
// ---------------------------------------------------------------------------

/// A published index value and the base year it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexValue {
    pub value: IndexPoint,
    pub base_year: i32,
}

/// Lookup of index values, consumed by rent terms during verification.
pub trait IndexValueSource {
    /// The value published for the month containing `date`.
    fn index_value(&self, index: &str, date: NaiveDate) -> Option<IndexValue>;

    /// Divisor to bring a value on `from_base` onto `to_base`; `None` when
    /// both are the same base.
    fn rebase_factor(&self, index: &str, from_base: i32, to_base: i32) -> LeaseResult<Option<Decimal>>;
}

/// One base of an index series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexBase {
    pub index: String,
    pub base_year: i32,
    /// Factor relative to the previous base of the same index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexValueRecord {
    pub index: String,
    /// Any date within the month the value was published for
    pub date: NaiveDate,
    pub value: IndexPoint,
    pub base_year: i32,
}

/// In-memory index series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexTable {
    #[serde(default)]
    pub bases: Vec<IndexBase>,
    #[serde(default)]
    pub values: Vec<IndexValueRecord>,
}

impl IndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_base(&mut self, index: &str, base_year: i32, factor: Option<Decimal>) {
        self.bases.push(IndexBase {
            index: index.to_string(),
            base_year,
            factor,
        });
    }

    pub fn add_value(&mut self, index: &str, date: NaiveDate, value: IndexPoint, base_year: i32) {
        self.values.push(IndexValueRecord {
            index: index.to_string(),
            date,
            value,
            base_year,
        });
    }
}

impl IndexValueSource for IndexTable {
    fn index_value(&self, index: &str, date: NaiveDate) -> Option<IndexValue> {
        self.values
            .iter()
            .find(|v| v.index == index && v.date.year() == date.year() && v.date.month() == date.month())
            .map(|v| IndexValue {
                value: v.value,
                base_year: v.base_year,
            })
    }

    fn rebase_factor(&self, index: &str, from_base: i32, to_base: i32) -> LeaseResult<Option<Decimal>> {
        if from_base == to_base {
            return Ok(None);
        }
        if from_base > to_base {
            return Err(LeaseError::invariant(format!(
                "index {index}: cannot rebase from {from_base} back to {to_base}"
            )));
        }
        let mut bases: Vec<&IndexBase> = self
            .bases
            .iter()
            .filter(|b| b.index == index && b.base_year > from_base && b.base_year <= to_base)
            .collect();
        bases.sort_by_key(|b| b.base_year);
        if bases.last().map(|b| b.base_year) != Some(to_base) {
            return Err(LeaseError::validation(format!(
                "index {index} has no base {to_base}"
            )));
        }
        let mut product = Decimal::ONE;
        for base in bases {
            let factor = base.factor.ok_or_else(|| {
                LeaseError::validation(format!(
                    "index {index} base {} has no rebase factor",
                    base.base_year
                ))
            })?;
            product *= factor;
        }
        Ok(Some(product))
    }
}

/// Builds the indexation input for a rent term from published values.
///
/// Missing index values are not an error: the term simply stays
/// un-indexed until the values are published.
pub fn resolve_indexation_input(
    source: &dyn IndexValueSource,
    index: &str,
    base_index_start_date: NaiveDate,
    next_index_start_date: NaiveDate,
    base_value: Money,
) -> LeaseResult<IndexationInput> {
    let base = source.index_value(index, base_index_start_date);
    let next = source.index_value(index, next_index_start_date);
    if base.is_none() || next.is_none() {
        warn!(
            index,
            %base_index_start_date,
            %next_index_start_date,
            "index values not available; indexation skipped"
        );
    }
    let rebase_factor = match (base, next) {
        (Some(b), Some(n)) => source.rebase_factor(index, b.base_year, n.base_year)?,
        _ => None,
    };
    Ok(IndexationInput {
        base_index_value: base.map(|b| b.value),
        next_index_value: next.map(|n| n.value),
        base_value,
        rebase_factor,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_input(input: &IndexationInput) -> LeaseResult<()> {
    for (field, value) in [
        ("base_index_value", input.base_index_value),
        ("next_index_value", input.next_index_value),
    ] {
        if let Some(v) = value {
            if v.is_sign_negative() && !v.is_zero() {
                return Err(LeaseError::invariant(format!(
                    "{field} is negative ({v})"
                )));
            }
        }
    }
    if let Some(factor) = input.rebase_factor {
        if factor.is_zero() {
            return Err(LeaseError::DivisionByZero {
                context: "rebase factor".into(),
            });
        }
        if factor.is_sign_negative() {
            return Err(LeaseError::InvalidInput {
                field: "rebase_factor".into(),
                reason: "Rebase factor must be positive".into(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

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
        t
    }

    #[test]
    fn test_rebased_regression_yields_20200() {
        let out = calculate_indexation(&IndexationInput {
            base_index_value: Some(dec!(137.6)),
            next_index_value: Some(dec!(101.2)),
            base_value: dec!(20000.00),
            rebase_factor: Some(dec!(1.373)),
        })
        .unwrap();
        assert_eq!(out.indexation_percentage, Some(dec!(1.0)));
        assert_eq!(out.indexed_value, dec!(20200.00));
        assert!(out.indexed);
    }

    #[test]
    fn test_equal_index_values_leave_value_unchanged() {
        let out = calculate_indexation(&IndexationInput {
            base_index_value: Some(dec!(101.2)),
            next_index_value: Some(dec!(101.2)),
            base_value: dec!(20000.00),
            rebase_factor: None,
        })
        .unwrap();
        assert_eq!(out.indexation_percentage, Some(dec!(0.0)));
        assert_eq!(out.indexed_value, dec!(20000.00));
    }

    #[test]
    fn test_same_base_indexation() {
        let out = calculate_indexation(&IndexationInput {
            base_index_value: Some(dec!(101.2)),
            next_index_value: Some(dec!(103.9)),
            base_value: dec!(20200.00),
            rebase_factor: None,
        })
        .unwrap();
        assert_eq!(out.indexation_percentage, Some(dec!(2.7)));
        assert_eq!(out.indexed_value, dec!(20745.40));
    }

    #[test]
    fn test_zero_or_missing_base_index_skips() {
        for base in [None, Some(Decimal::ZERO)] {
            let out = calculate_indexation(&IndexationInput {
                base_index_value: base,
                next_index_value: Some(dec!(101.2)),
                base_value: dec!(20000.00),
                rebase_factor: None,
            })
            .unwrap();
            assert_eq!(out.indexed_value, dec!(20000.00));
            assert_eq!(out.indexation_percentage, None);
            assert!(!out.indexed);
        }
    }

    #[test]
    fn test_negative_index_is_invariant_violation() {
        let err = calculate_indexation(&IndexationInput {
            base_index_value: Some(dec!(-1)),
            next_index_value: Some(dec!(101.2)),
            base_value: dec!(20000.00),
            rebase_factor: None,
        })
        .unwrap_err();
        assert!(matches!(err, LeaseError::InvariantViolation(_)));
    }

    #[test]
    fn test_zero_rebase_factor() {
        let err = calculate_indexation(&IndexationInput {
            base_index_value: Some(dec!(137.6)),
            next_index_value: Some(dec!(101.2)),
            base_value: dec!(20000.00),
            rebase_factor: Some(Decimal::ZERO),
        })
        .unwrap_err();
        assert!(matches!(err, LeaseError::DivisionByZero { .. }));
    }

    #[test]
    fn test_table_lookup_by_month() {
        let t = istat();
        let v = t.index_value("ISTAT-FOI", d(2011, 1, 20)).unwrap();
        assert_eq!(v.value, dec!(101.2));
        assert_eq!(v.base_year, 2010);
        assert!(t.index_value("ISTAT-FOI", d(2013, 1, 1)).is_none());
        assert!(t.index_value("OTHER", d(2011, 1, 1)).is_none());
    }

    #[test]
    fn test_table_rebase_factor() {
        let t = istat();
        assert_eq!(t.rebase_factor("ISTAT-FOI", 2010, 2010).unwrap(), None);
        assert_eq!(t.rebase_factor("ISTAT-FOI", 2004, 2010).unwrap(), Some(dec!(1.373)));
        assert!(t.rebase_factor("ISTAT-FOI", 2010, 2004).is_err());
        assert!(t.rebase_factor("ISTAT-FOI", 2004, 2015).is_err());
    }

    #[test]
    fn test_resolve_from_table() {
        let t = istat();
        let input =
            resolve_indexation_input(&t, "ISTAT-FOI", d(2010, 1, 1), d(2011, 1, 1), dec!(20000)).unwrap();
        assert_eq!(input.rebase_factor, Some(dec!(1.373)));
        assert_eq!(calculate_indexation(&input).unwrap().indexed_value, dec!(20200.00));

        let missing =
            resolve_indexation_input(&t, "ISTAT-FOI", d(2012, 1, 1), d(2013, 1, 1), dec!(20745.40)).unwrap();
        assert_eq!(missing.next_index_value, None);
        assert_eq!(calculate_indexation(&missing).unwrap().indexed_value, dec!(20745.40));
    }
}
