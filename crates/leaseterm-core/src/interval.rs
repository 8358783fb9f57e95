//! Closed date intervals with optionally unbounded ends.
//!
//! Both bounds are inclusive. A missing start means "since forever", a
//! missing end means "open ended". Every other module expresses its date
//! arithmetic through these operations.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::LeaseError;
use crate::LeaseResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Inclusive date interval. If both bounds are present, start <= end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "RawDateInterval", into = "RawDateInterval")]
pub struct DateInterval {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawDateInterval {
    #[serde(default)]
    start_date: Option<NaiveDate>,
    #[serde(default)]
    end_date: Option<NaiveDate>,
}

impl TryFrom<RawDateInterval> for DateInterval {
    type Error = LeaseError;

    fn try_from(raw: RawDateInterval) -> Result<Self, Self::Error> {
        DateInterval::including(raw.start_date, raw.end_date)
    }
}

impl From<DateInterval> for RawDateInterval {
    fn from(interval: DateInterval) -> Self {
        RawDateInterval {
            start_date: interval.start_date,
            end_date: interval.end_date,
        }
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl DateInterval {
    /// The interval covering every date.
    pub const UNBOUNDED: DateInterval = DateInterval {
        start_date: None,
        end_date: None,
    };

    /// Interval with both bounds inclusive.
    pub fn including(start: Option<NaiveDate>, end: Option<NaiveDate>) -> LeaseResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if e < s {
                return Err(LeaseError::validation(format!(
                    "end date {e} is before start date {s}"
                )));
            }
        }
        Ok(DateInterval {
            start_date: start,
            end_date: end,
        })
    }

    /// Interval whose end is given as the first date no longer covered.
    pub fn excluding(start: Option<NaiveDate>, end_excl: Option<NaiveDate>) -> LeaseResult<Self> {
        let end = end_excl.map(previous_day).transpose()?;
        Self::including(start, end)
    }

    /// Bounded interval from `start` to `end` inclusive.
    pub fn between(start: NaiveDate, end: NaiveDate) -> LeaseResult<Self> {
        Self::including(Some(start), Some(end))
    }

    /// Open-ended interval starting on `start`.
    pub fn starting(start: NaiveDate) -> Self {
        DateInterval {
            start_date: Some(start),
            end_date: None,
        }
    }

    /// Interval covering everything up to and including `end`.
    pub fn until(end: NaiveDate) -> Self {
        DateInterval {
            start_date: None,
            end_date: Some(end),
        }
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    /// Same interval with a different start, validated.
    pub fn with_start(&self, start: Option<NaiveDate>) -> LeaseResult<Self> {
        Self::including(start, self.end_date)
    }

    /// Same interval with a different end, validated.
    pub fn with_end(&self, end: Option<NaiveDate>) -> LeaseResult<Self> {
        Self::including(self.start_date, end)
    }
}

// ---------------------------------------------------------------------------
// Algebra
// ---------------------------------------------------------------------------

impl DateInterval {
    /// The day after the end date, or `None` when open ended.
    pub fn end_date_excluding(&self) -> Option<NaiveDate> {
        self.end_date.and_then(|d| d.succ_opt())
    }

    pub fn is_open_ended(&self) -> bool {
        self.end_date.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |s| s <= date) && self.end_date.map_or(true, |e| date <= e)
    }

    /// Whether `other` lies completely inside this interval.
    pub fn encloses(&self, other: &DateInterval) -> bool {
        let start_ok = match (self.start_date, other.start_date) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a <= b,
        };
        let end_ok = match (self.end_date, other.end_date) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => b <= a,
        };
        start_ok && end_ok
    }

    /// Intersection of two intervals, `None` when they share no date.
    pub fn overlap(&self, other: &DateInterval) -> Option<DateInterval> {
        let start = match (self.start_date, other.start_date) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let end = match (self.end_date, other.end_date) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return None;
            }
        }
        Some(DateInterval {
            start_date: start,
            end_date: end,
        })
    }

    pub fn overlaps(&self, other: &DateInterval) -> bool {
        self.overlap(other).is_some()
    }

    /// True when `next` starts exactly on the day after this interval ends.
    pub fn is_contiguous_with(&self, next: &DateInterval) -> bool {
        match (self.end_date_excluding(), next.start_date) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Number of days covered; `None` when either side is unbounded.
    pub fn days(&self) -> Option<i64> {
        match (self.start_date, self.end_date) {
            (Some(s), Some(e)) => Some(e.signed_duration_since(s).num_days() + 1),
            _ => None,
        }
    }
}

/// Free-function form of [`DateInterval::overlap`].
pub fn overlap(a: &DateInterval, b: &DateInterval) -> Option<DateInterval> {
    a.overlap(b)
}

/// Free-function form of [`DateInterval::contains`].
pub fn contains(interval: &DateInterval, date: NaiveDate) -> bool {
    interval.contains(date)
}

/// Free-function form of [`DateInterval::is_contiguous_with`].
pub fn is_contiguous_with(a: &DateInterval, b: &DateInterval) -> bool {
    a.is_contiguous_with(b)
}

pub fn next_day(date: NaiveDate) -> LeaseResult<NaiveDate> {
    date.succ_opt()
        .ok_or_else(|| LeaseError::DateError(format!("no day after {date}")))
}

pub fn previous_day(date: NaiveDate) -> LeaseResult<NaiveDate> {
    date.pred_opt()
        .ok_or_else(|| LeaseError::DateError(format!("no day before {date}")))
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start_date {
            Some(s) => write!(f, "{s}")?,
            None => write!(f, "----------")?,
        }
        write!(f, "/")?;
        match self.end_date {
            Some(e) => write!(f, "{e}"),
            None => write!(f, "----------"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_including_rejects_reversed_bounds() {
        let err = DateInterval::including(Some(d(2012, 2, 1)), Some(d(2012, 1, 1))).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_single_day_interval_is_valid() {
        let i = DateInterval::between(d(2012, 1, 1), d(2012, 1, 1)).unwrap();
        assert_eq!(i.days(), Some(1));
    }

    #[test]
    fn test_end_date_excluding() {
        let i = DateInterval::between(d(2012, 1, 1), d(2012, 6, 30)).unwrap();
        assert_eq!(i.end_date_excluding(), Some(d(2012, 7, 1)));
        assert_eq!(DateInterval::starting(d(2012, 1, 1)).end_date_excluding(), None);
    }

    #[test]
    fn test_excluding_constructor() {
        let i = DateInterval::excluding(Some(d(2012, 1, 1)), Some(d(2012, 7, 1))).unwrap();
        assert_eq!(i.end_date(), Some(d(2012, 6, 30)));
    }

    #[test]
    fn test_contains_with_unbounded_sides() {
        assert!(DateInterval::UNBOUNDED.contains(d(1900, 1, 1)));
        let open = DateInterval::starting(d(2010, 7, 15));
        assert!(open.contains(d(2099, 1, 1)));
        assert!(!open.contains(d(2010, 7, 14)));
        let closed = DateInterval::until(d(2010, 12, 31));
        assert!(closed.contains(d(2010, 12, 31)));
        assert!(!closed.contains(d(2011, 1, 1)));
    }

    #[test]
    fn test_overlap_of_bounded_intervals() {
        let a = DateInterval::between(d(2010, 7, 1), d(2010, 9, 30)).unwrap();
        let b = DateInterval::starting(d(2010, 7, 15));
        let o = a.overlap(&b).unwrap();
        assert_eq!(o.start_date(), Some(d(2010, 7, 15)));
        assert_eq!(o.end_date(), Some(d(2010, 9, 30)));
        assert_eq!(o.days(), Some(78));
    }

    #[test]
    fn test_overlap_empty_when_disjoint() {
        let a = DateInterval::between(d(2010, 1, 1), d(2010, 1, 31)).unwrap();
        let b = DateInterval::between(d(2010, 2, 1), d(2010, 2, 28)).unwrap();
        assert!(overlap(&a, &b).is_none());
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_overlap_of_unbounded_is_unbounded() {
        let o = DateInterval::UNBOUNDED.overlap(&DateInterval::UNBOUNDED).unwrap();
        assert_eq!(o, DateInterval::UNBOUNDED);
    }

    #[test]
    fn test_contiguity() {
        let a = DateInterval::between(d(2010, 1, 1), d(2010, 12, 31)).unwrap();
        let b = DateInterval::starting(d(2011, 1, 1));
        let c = DateInterval::starting(d(2011, 1, 2));
        assert!(is_contiguous_with(&a, &b));
        assert!(!a.is_contiguous_with(&c));
        assert!(!b.is_contiguous_with(&a));
    }

    #[test]
    fn test_encloses() {
        let outer = DateInterval::starting(d(2010, 1, 1));
        let inner = DateInterval::between(d(2010, 3, 1), d(2010, 3, 31)).unwrap();
        assert!(outer.encloses(&inner));
        assert!(!inner.encloses(&outer));
    }

    #[test]
    fn test_deserialize_rejects_reversed_interval() {
        let json = r#"{"start_date":"2012-02-01","end_date":"2012-01-01"}"#;
        assert!(serde_json::from_str::<DateInterval>(json).is_err());
        let ok = r#"{"start_date":"2012-01-01"}"#;
        let i: DateInterval = serde_json::from_str(ok).unwrap();
        assert!(i.is_open_ended());
    }

    #[test]
    fn test_display() {
        let i = DateInterval::starting(d(2012, 1, 1));
        assert_eq!(i.to_string(), "2012-01-01/----------");
    }
}
