//! Break options: the right to end a lease early after giving notice.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::LeaseError;
use crate::LeaseResult;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakType {
    /// Exercisable once, on the break date
    Fixed,
    /// Exercisable at any time after the break date
    Rolling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakExerciseType {
    Landlord,
    Tenant,
    Mutual,
}

// ---------------------------------------------------------------------------
// Notification period
// ---------------------------------------------------------------------------

/// Notice to give before a break date, written like `6y5m2d` or `3m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NotificationPeriod {
    pub years: u32,
    pub months: u32,
    pub days: u32,
}

impl NotificationPeriod {
    /// The last date on which notice can be given for `break_date`.
    pub fn subtract_from(&self, break_date: NaiveDate) -> LeaseResult<NaiveDate> {
        break_date
            .checked_sub_months(Months::new(self.years * 12 + self.months))
            .and_then(|d| d.checked_sub_days(Days::new(u64::from(self.days))))
            .ok_or_else(|| LeaseError::DateError(format!("{self} before {break_date} is out of range")))
    }
}

impl FromStr for NotificationPeriod {
    type Err = LeaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unrecognized = || LeaseError::validation(format!("Notification period format not recognized: '{s}'"));
        let mut period = NotificationPeriod::default();
        let mut seen = [false; 3];
        let mut digits = String::new();
        for c in s.trim().chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            let slot = match c.to_ascii_lowercase() {
                'y' => 0,
                'm' => 1,
                'd' => 2,
                _ => return Err(unrecognized()),
            };
            if digits.is_empty() || seen[slot] {
                return Err(unrecognized());
            }
            let n: u32 = digits.parse().map_err(|_| unrecognized())?;
            match slot {
                0 => period.years = n,
                1 => period.months = n,
                _ => period.days = n,
            }
            seen[slot] = true;
            digits.clear();
        }
        if !digits.is_empty() || !seen.iter().any(|s| *s) {
            return Err(unrecognized());
        }
        Ok(period)
    }
}

impl TryFrom<String> for NotificationPeriod {
    type Error = LeaseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NotificationPeriod> for String {
    fn from(p: NotificationPeriod) -> String {
        p.to_string()
    }
}

impl fmt::Display for NotificationPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        for (n, unit) in [(self.years, 'y'), (self.months, 'm'), (self.days, 'd')] {
            if n > 0 {
                write!(f, "{n}{unit}")?;
                wrote = true;
            }
        }
        if !wrote {
            write!(f, "0d")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Break option
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakOption {
    pub break_type: BreakType,
    pub exercise_type: BreakExerciseType,
    pub break_date: NaiveDate,
    pub notification_period: NotificationPeriod,
    /// Last day to give notice
    pub exercise_date: NaiveDate,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl BreakOption {
    pub fn new(
        break_type: BreakType,
        exercise_type: BreakExerciseType,
        break_date: NaiveDate,
        notification_period: &str,
        description: impl Into<String>,
    ) -> LeaseResult<Self> {
        let notification_period: NotificationPeriod = notification_period.parse()?;
        let exercise_date = notification_period.subtract_from(break_date)?;
        Ok(BreakOption {
            break_type,
            exercise_type,
            break_date,
            notification_period,
            exercise_date,
            description: description.into(),
        })
    }
}
