//! Source of "today" for default dates.
//!
//! Calculations always take explicit dates; the clock only proposes
//! defaults.

use chrono::{Datelike, Local, NaiveDate};

pub trait Clock {
    fn today(&self) -> NaiveDate;

    fn beginning_of_month(&self) -> NaiveDate {
        beginning_of_month(self.today())
    }

    fn beginning_of_quarter(&self) -> NaiveDate {
        beginning_of_quarter(self.today())
    }
}

/// The machine's local date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock stuck on one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

pub fn beginning_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn beginning_of_quarter(date: NaiveDate) -> NaiveDate {
    let month = (date.month0() / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
}
