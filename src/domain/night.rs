// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::constants::SECONDS_PER_DAY;
use crate::domain::error::AppError;
use crate::domain::vault::NightNumber;
use chrono::{DateTime, Days, NaiveDate, Utc};

/// Converts calendar days to epoch-relative night numbers and back.
///
/// The range starts at the epoch: dates before it are rejected with
/// `InvalidDate` rather than encoded as zero or negative nights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightCodec {
    epoch: NaiveDate,
}

impl NightCodec {
    pub fn new(epoch: NaiveDate) -> Self {
        Self { epoch }
    }

    pub fn from_epoch_str(raw: &str) -> Result<Self, AppError> {
        let epoch = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|e| AppError::Config(format!("Invalid night epoch {raw:?}: {e}")))?;
        Ok(Self::new(epoch))
    }

    pub fn epoch(&self) -> NaiveDate {
        self.epoch
    }

    pub fn date_to_night(&self, date: NaiveDate) -> Result<NightNumber, AppError> {
        let days = date.signed_duration_since(self.epoch).num_days();
        if days < 0 {
            return Err(AppError::InvalidDate(format!(
                "{date} is before the night epoch {}",
                self.epoch
            )));
        }
        Ok(NightNumber(days as u64 + 1))
    }

    /// Time of day is dropped; the UTC calendar day decides the night.
    pub fn datetime_to_night(&self, at: DateTime<Utc>) -> Result<NightNumber, AppError> {
        self.date_to_night(at.date_naive())
    }

    pub fn timestamp_to_night(&self, unix_secs: u64) -> Result<NightNumber, AppError> {
        let at = DateTime::<Utc>::from_timestamp(unix_secs as i64, 0)
            .ok_or_else(|| AppError::InvalidDate(format!("timestamp {unix_secs} out of range")))?;
        self.datetime_to_night(at)
    }

    pub fn night_to_date(&self, night: NightNumber) -> Result<NaiveDate, AppError> {
        if night.get() == 0 {
            return Err(AppError::InvalidDate(
                "night numbers start at 1".to_string(),
            ));
        }
        self.epoch
            .checked_add_days(Days::new(night.get() - 1))
            .ok_or_else(|| AppError::InvalidDate(format!("{night} is out of calendar range")))
    }

    /// Unix seconds of midnight UTC starting `night`.
    pub fn night_start(&self, night: NightNumber) -> Result<u64, AppError> {
        let date = self.night_to_date(night)?;
        date_midnight_unix(date)
    }

    /// Check-in/check-out window of a single night: `[midnight, next midnight)`.
    pub fn night_window(&self, night: NightNumber) -> Result<(u64, u64), AppError> {
        let start = self.night_start(night)?;
        Ok((start, start + SECONDS_PER_DAY as u64))
    }

    /// Nights covered by a stay; `check_out` is exclusive.
    pub fn nights_between(
        &self,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Vec<NightNumber>, AppError> {
        if check_out <= check_in {
            return Err(AppError::invalid_input(
                "check_out",
                format!("{check_out} must be after {check_in}"),
            ));
        }
        let first = self.date_to_night(check_in)?;
        let last = self.date_to_night(check_out)?;
        Ok((first.get()..last.get()).map(NightNumber).collect())
    }
}

pub fn date_midnight_unix(date: NaiveDate) -> Result<u64, AppError> {
    let secs = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::InvalidDate(format!("{date} has no midnight")))?
        .and_utc()
        .timestamp();
    if secs < 0 {
        return Err(AppError::InvalidDate(format!(
            "{date} is before the unix epoch"
        )));
    }
    Ok(secs as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn codec() -> NightCodec {
        NightCodec::from_epoch_str("2025-01-01").unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn epoch_day_is_night_one() {
        assert_eq!(codec().date_to_night(date(2025, 1, 1)).unwrap(), NightNumber(1));
        assert_eq!(codec().date_to_night(date(2025, 2, 1)).unwrap(), NightNumber(32));
    }

    #[test]
    fn dates_before_epoch_are_rejected() {
        let err = codec().date_to_night(date(2024, 12, 31)).unwrap_err();
        assert!(matches!(err, AppError::InvalidDate(_)));
        assert!(codec().night_to_date(NightNumber(0)).is_err());
    }

    #[test]
    fn round_trip_normalizes_time_of_day() {
        let c = codec();
        let mut day = date(2025, 1, 1);
        // spans a leap day and several month boundaries
        for _ in 0..800 {
            let noon = Utc.from_utc_datetime(&day.and_hms_opt(13, 45, 10).unwrap());
            let night = c.datetime_to_night(noon).unwrap();
            assert_eq!(c.night_to_date(night).unwrap(), day);
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn night_window_spans_one_day() {
        let c = codec();
        let (start, end) = c.night_window(NightNumber(1)).unwrap();
        assert_eq!(start, 1_735_689_600);
        assert_eq!(end - start, 86_400);
        assert_eq!(c.timestamp_to_night(end - 1).unwrap(), NightNumber(1));
        assert_eq!(c.timestamp_to_night(end).unwrap(), NightNumber(2));
    }

    #[test]
    fn nights_between_excludes_checkout_day() {
        let nights = codec()
            .nights_between(date(2025, 1, 10), date(2025, 1, 13))
            .unwrap();
        assert_eq!(nights, vec![NightNumber(10), NightNumber(11), NightNumber(12)]);
        assert!(codec()
            .nights_between(date(2025, 1, 10), date(2025, 1, 10))
            .is_err());
    }
}
