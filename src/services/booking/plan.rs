// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::constants::SECONDS_PER_DAY;
use crate::domain::error::AppError;
use crate::domain::night::{NightCodec, date_midnight_unix};
use crate::domain::vault::{NightNumber, SubVaultKey};
use alloy::primitives::U256;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// One bookable unit: a single night or a contiguous date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookingUnit {
    pub key: SubVaultKey,
    /// Unix seconds, midnight UTC.
    pub check_in: u64,
    /// Unix seconds, midnight UTC, exclusive.
    pub check_out: u64,
}

impl BookingUnit {
    pub fn night(codec: &NightCodec, night: NightNumber) -> Result<Self, AppError> {
        let (check_in, check_out) = codec.night_window(night)?;
        Ok(Self {
            key: SubVaultKey::Night(night),
            check_in,
            check_out,
        })
    }

    pub fn range(
        codec: &NightCodec,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Self, AppError> {
        // Validates ordering and the epoch boundary.
        codec.nights_between(check_in, check_out)?;
        let check_in = date_midnight_unix(check_in)?;
        let check_out = date_midnight_unix(check_out)?;
        Ok(Self {
            key: SubVaultKey::Range {
                check_in,
                check_out,
            },
            check_in,
            check_out,
        })
    }

    pub fn nights(&self) -> u64 {
        (self.check_out.saturating_sub(self.check_in) / SECONDS_PER_DAY as u64).max(1)
    }

    /// Stake owed for this unit at `daily_price`.
    pub fn stake(&self, daily_price: U256) -> U256 {
        daily_price.saturating_mul(U256::from(self.nights()))
    }
}

/// What the caller selected: one parent vault and an ordered batch of units.
#[derive(Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub vault_id: String,
    pub master_access_code: String,
    pub units: Vec<BookingUnit>,
}

impl fmt::Debug for BookingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookingRequest")
            .field("vault_id", &self.vault_id)
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

impl BookingRequest {
    pub fn for_nights(
        codec: &NightCodec,
        vault_id: &str,
        master_access_code: &str,
        nights: &[NightNumber],
    ) -> Result<Self, AppError> {
        let units = nights
            .iter()
            .map(|n| BookingUnit::night(codec, *n))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            vault_id: vault_id.to_string(),
            master_access_code: master_access_code.to_string(),
            units,
        })
    }

    /// One night unit per date, in the given order.
    pub fn for_dates(
        codec: &NightCodec,
        vault_id: &str,
        master_access_code: &str,
        dates: &[NaiveDate],
    ) -> Result<Self, AppError> {
        let nights = dates
            .iter()
            .map(|d| codec.date_to_night(*d))
            .collect::<Result<Vec<_>, _>>()?;
        Self::for_nights(codec, vault_id, master_access_code, &nights)
    }

    /// A single date-range unit covering `[check_in, check_out)`.
    pub fn for_date_range(
        codec: &NightCodec,
        vault_id: &str,
        master_access_code: &str,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Self, AppError> {
        Ok(Self {
            vault_id: vault_id.to_string(),
            master_access_code: master_access_code.to_string(),
            units: vec![BookingUnit::range(codec, check_in, check_out)?],
        })
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.vault_id.trim().is_empty() {
            return Err(AppError::invalid_input("vault_id", "must not be empty"));
        }
        if self.units.is_empty() {
            return Err(AppError::invalid_input("units", "batch is empty"));
        }
        if self.master_access_code.is_empty() {
            return Err(AppError::invalid_input(
                "master_access_code",
                "must not be empty",
            ));
        }
        let mut seen = HashSet::new();
        for unit in &self.units {
            if unit.check_out <= unit.check_in {
                return Err(AppError::invalid_input(
                    "units",
                    format!("{} has an empty stay window", unit.key),
                ));
            }
            if !seen.insert(unit.key) {
                return Err(AppError::invalid_input(
                    "units",
                    format!("{} selected twice", unit.key),
                ));
            }
        }
        Ok(())
    }
}

/// Price shown at the confirm step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub daily_base_price: U256,
    pub nights: u64,
    pub total_stake: U256,
}

impl Quote {
    pub fn for_units(daily_base_price: U256, units: &[BookingUnit]) -> Self {
        let nights: u64 = units.iter().map(BookingUnit::nights).sum();
        Self {
            daily_base_price,
            nights,
            total_stake: daily_base_price.saturating_mul(U256::from(nights)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> NightCodec {
        NightCodec::from_epoch_str("2025-01-01").unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn range_unit_counts_nights() {
        let unit = BookingUnit::range(&codec(), date(2025, 3, 1), date(2025, 3, 4)).unwrap();
        assert_eq!(unit.nights(), 3);
        assert_eq!(unit.stake(U256::from(100u64)), U256::from(300u64));
    }

    #[test]
    fn duplicate_and_empty_batches_are_rejected() {
        let c = codec();
        let empty = BookingRequest::for_nights(&c, "APT-1", "code", &[]).unwrap();
        assert!(matches!(empty.validate(), Err(AppError::InvalidInput { .. })));

        let dup = BookingRequest::for_nights(&c, "APT-1", "code", &[NightNumber(4), NightNumber(4)])
            .unwrap();
        assert!(dup.validate().is_err());

        let ok = BookingRequest::for_dates(&c, "APT-1", "code", &[date(2025, 1, 2)]).unwrap();
        assert!(ok.validate().is_ok());
        assert_eq!(ok.units[0].key, SubVaultKey::Night(NightNumber(2)));
    }

    #[test]
    fn debug_output_hides_the_master_code() {
        let req = BookingRequest::for_nights(&codec(), "APT-1", "s3cret", &[NightNumber(1)]).unwrap();
        assert!(!format!("{req:?}").contains("s3cret"));
    }

    #[test]
    fn quote_sums_nights_across_units() {
        let c = codec();
        let req = BookingRequest::for_nights(&c, "APT-1", "code", &[NightNumber(1), NightNumber(2)])
            .unwrap();
        let quote = Quote::for_units(U256::from(100_000_000u64), &req.units);
        assert_eq!(quote.nights, 2);
        assert_eq!(quote.total_stake, U256::from(200_000_000u64));
    }
}
