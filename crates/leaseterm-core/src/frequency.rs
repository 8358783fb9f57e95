//! Billing cycles and term roll-forward frequencies.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::LeaseError;
use crate::interval::{next_day, previous_day, DateInterval};
use crate::LeaseResult;

// ---------------------------------------------------------------------------
// Invoicing frequency
// ---------------------------------------------------------------------------

/// How often a lease item is invoiced and whether invoices fall due at the
/// start of the cycle (in advance) or the day after it (in arrears).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoicingFrequency {
    MonthlyInAdvance,
    MonthlyInArrears,
    QuarterlyInAdvance,
    QuarterlyInArrears,
    /// Quarters starting February, May, August and November.
    QuarterlyPlus1mInAdvance,
    QuarterlyPlus1mInArrears,
    SemiYearlyInAdvance,
    SemiYearlyInArrears,
    YearlyInAdvance,
    YearlyInArrears,
}

/// One full billing cycle; both bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCycle {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl BillingCycle {
    pub fn interval(&self) -> DateInterval {
        DateInterval::starting(self.start_date)
            .with_end(Some(self.end_date))
            .unwrap_or(DateInterval::starting(self.start_date))
    }

    pub fn days(&self) -> i64 {
        self.end_date.signed_duration_since(self.start_date).num_days() + 1
    }
}

impl InvoicingFrequency {
    pub const ALL: [InvoicingFrequency; 10] = [
        InvoicingFrequency::MonthlyInAdvance,
        InvoicingFrequency::MonthlyInArrears,
        InvoicingFrequency::QuarterlyInAdvance,
        InvoicingFrequency::QuarterlyInArrears,
        InvoicingFrequency::QuarterlyPlus1mInAdvance,
        InvoicingFrequency::QuarterlyPlus1mInArrears,
        InvoicingFrequency::SemiYearlyInAdvance,
        InvoicingFrequency::SemiYearlyInArrears,
        InvoicingFrequency::YearlyInAdvance,
        InvoicingFrequency::YearlyInArrears,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            InvoicingFrequency::MonthlyInAdvance => "MONTHLY_IN_ADVANCE",
            InvoicingFrequency::MonthlyInArrears => "MONTHLY_IN_ARREARS",
            InvoicingFrequency::QuarterlyInAdvance => "QUARTERLY_IN_ADVANCE",
            InvoicingFrequency::QuarterlyInArrears => "QUARTERLY_IN_ARREARS",
            InvoicingFrequency::QuarterlyPlus1mInAdvance => "QUARTERLY_PLUS1M_IN_ADVANCE",
            InvoicingFrequency::QuarterlyPlus1mInArrears => "QUARTERLY_PLUS1M_IN_ARREARS",
            InvoicingFrequency::SemiYearlyInAdvance => "SEMI_YEARLY_IN_ADVANCE",
            InvoicingFrequency::SemiYearlyInArrears => "SEMI_YEARLY_IN_ARREARS",
            InvoicingFrequency::YearlyInAdvance => "YEARLY_IN_ADVANCE",
            InvoicingFrequency::YearlyInArrears => "YEARLY_IN_ARREARS",
        }
    }

    /// Length of one cycle in months.
    pub fn months(&self) -> u32 {
        match self {
            InvoicingFrequency::MonthlyInAdvance | InvoicingFrequency::MonthlyInArrears => 1,
            InvoicingFrequency::QuarterlyInAdvance
            | InvoicingFrequency::QuarterlyInArrears
            | InvoicingFrequency::QuarterlyPlus1mInAdvance
            | InvoicingFrequency::QuarterlyPlus1mInArrears => 3,
            InvoicingFrequency::SemiYearlyInAdvance | InvoicingFrequency::SemiYearlyInArrears => 6,
            InvoicingFrequency::YearlyInAdvance | InvoicingFrequency::YearlyInArrears => 12,
        }
    }

    fn month_offset(&self) -> i32 {
        match self {
            InvoicingFrequency::QuarterlyPlus1mInAdvance
            | InvoicingFrequency::QuarterlyPlus1mInArrears => 1,
            _ => 0,
        }
    }

    pub fn in_advance(&self) -> bool {
        matches!(
            self,
            InvoicingFrequency::MonthlyInAdvance
                | InvoicingFrequency::QuarterlyInAdvance
                | InvoicingFrequency::QuarterlyPlus1mInAdvance
                | InvoicingFrequency::SemiYearlyInAdvance
                | InvoicingFrequency::YearlyInAdvance
        )
    }

    /// The full cycle `date` falls in.
    pub fn cycle_containing(&self, date: NaiveDate) -> LeaseResult<BillingCycle> {
        let months = self.months() as i32;
        let offset = self.month_offset();
        let total = date.year() * 12 + date.month0() as i32 - offset;
        let start_total = total - total.rem_euclid(months) + offset;
        let year = start_total.div_euclid(12);
        let month = start_total.rem_euclid(12) as u32 + 1;
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| LeaseError::DateError(format!("no cycle start for {date}")))?;
        self.cycle_starting(start)
    }

    /// The cycle directly after `cycle`.
    pub fn next_cycle(&self, cycle: &BillingCycle) -> LeaseResult<BillingCycle> {
        self.cycle_starting(next_day(cycle.end_date)?)
    }

    fn cycle_starting(&self, start: NaiveDate) -> LeaseResult<BillingCycle> {
        let end_excl = start
            .checked_add_months(Months::new(self.months()))
            .ok_or_else(|| LeaseError::DateError(format!("cycle from {start} overflows")))?;
        Ok(BillingCycle {
            start_date: start,
            end_date: previous_day(end_excl)?,
        })
    }

    /// Regular due date of a cycle.
    pub fn due_date_for(&self, cycle: &BillingCycle) -> LeaseResult<NaiveDate> {
        if self.in_advance() {
            Ok(cycle.start_date)
        } else {
            next_day(cycle.end_date)
        }
    }
}

impl fmt::Display for InvoicingFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for InvoicingFrequency {
    type Err = LeaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        InvoicingFrequency::ALL
            .iter()
            .find(|f| f.code() == wanted)
            .copied()
            .ok_or_else(|| LeaseError::validation(format!("unrecognized invoicing frequency '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Term frequency
// ---------------------------------------------------------------------------

/// How a term's successor is dated when a chain is extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TermFrequency {
    /// Successors start on the next 1 January.
    #[default]
    Yearly,
    /// Successors start on the same day one year later.
    YearlyAnniversary,
    /// The term never rolls forward.
    None,
}

impl TermFrequency {
    /// Start date of the term following one that starts on `start`.
    pub fn next_date(&self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            TermFrequency::Yearly => NaiveDate::from_ymd_opt(start.year() + 1, 1, 1),
            TermFrequency::YearlyAnniversary => start.checked_add_months(Months::new(12)),
            TermFrequency::None => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TermFrequency::Yearly => "YEARLY",
            TermFrequency::YearlyAnniversary => "YEARLY_ANNIVERSARY",
            TermFrequency::None => "NONE",
        }
    }
}

impl FromStr for TermFrequency {
    type Err = LeaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "YEARLY" => Ok(TermFrequency::Yearly),
            "YEARLY_ANNIVERSARY" => Ok(TermFrequency::YearlyAnniversary),
            "NONE" => Ok(TermFrequency::None),
            _ => Err(LeaseError::validation(format!("unrecognized term frequency '{s}'"))),
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
