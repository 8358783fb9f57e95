//! Engine-wide settings threaded into every calculation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Cutover date of a migration. Periods before it were billed by the
    /// previous system and only the difference is billed again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_date: Option<NaiveDate>,
}

impl EngineSettings {
    pub fn with_epoch_date(epoch_date: Option<NaiveDate>) -> Self {
        EngineSettings { epoch_date }
    }

    pub fn update_epoch_date(&mut self, epoch_date: Option<NaiveDate>) {
        if self.epoch_date != epoch_date {
            info!(?epoch_date, "epoch date updated");
        }
        self.epoch_date = epoch_date;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_epoch() {
        let s: EngineSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s, EngineSettings::default());
        assert_eq!(serde_json::to_string(&s).unwrap(), "{}");
    }

    #[test]
    fn test_update_epoch_date() {
        let mut s = EngineSettings::default();
        let epoch = NaiveDate::from_ymd_opt(2011, 1, 1);
        s.update_epoch_date(epoch);
        assert_eq!(s.epoch_date, epoch);
        s.update_epoch_date(None);
        assert_eq!(s.epoch_date, None);
    }
}
