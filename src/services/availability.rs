// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use crate::domain::night::NightCodec;
use crate::domain::vault::{NightNumber, SubVault, SubVaultKey, VaultState};
use crate::infrastructure::ledger::LedgerClient;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayState {
    Free,
    Auction,
    Settled,
    /// No sub-vault yet; bookable like `Free`.
    Uncreated,
}

impl DayState {
    pub fn is_bookable(self) -> bool {
        matches!(self, DayState::Free | DayState::Uncreated)
    }
}

impl From<VaultState> for DayState {
    fn from(state: VaultState) -> Self {
        match state {
            VaultState::Free => DayState::Free,
            VaultState::Auction => DayState::Auction,
            VaultState::Settled => DayState::Settled,
        }
    }
}

fn precedence(state: VaultState) -> u8 {
    match state {
        VaultState::Free => 0,
        VaultState::Auction => 1,
        VaultState::Settled => 2,
    }
}

/// Overlapping records resolve to the furthest-along state.
fn strongest(a: VaultState, b: VaultState) -> VaultState {
    if precedence(b) > precedence(a) { b } else { a }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RangeSummary {
    pub free: u32,
    pub auction: u32,
    pub settled: u32,
    pub uncreated: u32,
}

impl RangeSummary {
    fn add(&mut self, state: DayState) {
        match state {
            DayState::Free => self.free += 1,
            DayState::Auction => self.auction += 1,
            DayState::Settled => self.settled += 1,
            DayState::Uncreated => self.uncreated += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.free + self.auction + self.settled + self.uncreated
    }

    pub fn bookable(&self) -> u32 {
        self.free + self.uncreated
    }
}

/// Nights `[first, end)` covered by one date-range sub-vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NightSpan {
    first: u64,
    end: u64,
    state: VaultState,
}

impl NightSpan {
    fn covers(&self, night: NightNumber) -> bool {
        (self.first..self.end).contains(&night.get())
    }
}

/// Read-only per-night view over the sub-vaults of one parent.
///
/// Built from a single batch read; every query afterwards is local. Range
/// sub-vaults are kept as spans, so their length costs nothing up front.
#[derive(Debug, Clone)]
pub struct AvailabilityProjector {
    codec: NightCodec,
    nights: BTreeMap<NightNumber, VaultState>,
    /// Sorted by `first`.
    spans: Vec<NightSpan>,
}

impl AvailabilityProjector {
    pub fn from_sub_vaults(codec: NightCodec, sub_vaults: &[SubVault]) -> Self {
        let mut nights: BTreeMap<NightNumber, VaultState> = BTreeMap::new();
        let mut spans = Vec::new();
        for sub in sub_vaults {
            match sub.key {
                SubVaultKey::Night(night) => {
                    nights
                        .entry(night)
                        .and_modify(|s| *s = strongest(*s, sub.state))
                        .or_insert(sub.state);
                }
                SubVaultKey::Range { .. } => {
                    if let Some(span) = span_of(&codec, &sub.key, sub.state) {
                        spans.push(span);
                    }
                }
            }
        }
        spans.sort_by_key(|s| s.first);
        Self {
            codec,
            nights,
            spans,
        }
    }

    pub async fn load(
        ledger: &LedgerClient,
        codec: NightCodec,
        vault_id: &str,
    ) -> Result<Self, AppError> {
        let subs = ledger.sub_vaults(vault_id).await?;
        tracing::debug!(
            target: "availability",
            vault_id,
            sub_vaults = subs.len(),
            "Projected availability"
        );
        Ok(Self::from_sub_vaults(codec, &subs))
    }

    pub fn night_state(&self, night: NightNumber) -> DayState {
        let spanned = self
            .spans
            .iter()
            .take_while(|s| s.first <= night.get())
            .filter(|s| s.covers(night))
            .map(|s| s.state);
        self.nights
            .get(&night)
            .copied()
            .into_iter()
            .chain(spanned)
            .reduce(strongest)
            .map(DayState::from)
            .unwrap_or(DayState::Uncreated)
    }

    pub fn day_state(&self, date: NaiveDate) -> Result<DayState, AppError> {
        Ok(self.night_state(self.codec.date_to_night(date)?))
    }

    pub fn is_bookable(&self, date: NaiveDate) -> Result<bool, AppError> {
        Ok(self.day_state(date)?.is_bookable())
    }

    /// Counts over `[from, to)`. Days before the epoch are not counted.
    pub fn range_summary(&self, from: NaiveDate, to: NaiveDate) -> Result<RangeSummary, AppError> {
        if to < from {
            return Err(AppError::invalid_input(
                "to",
                format!("{to} is before {from}"),
            ));
        }
        let mut summary = RangeSummary::default();
        for day in from.iter_days().take_while(|d| *d < to) {
            if day < self.codec.epoch() {
                continue;
            }
            summary.add(self.day_state(day)?);
        }
        Ok(summary)
    }

    pub fn month_summary(&self, year: i32, month: u32) -> Result<RangeSummary, AppError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            AppError::InvalidDate(format!("{year}-{month:02} is not a month"))
        })?;
        let next = if first.month() == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| AppError::InvalidDate(format!("{year}-{month:02} has no successor")))?;
        self.range_summary(first, next)
    }

    /// Bookable nights in `[from, to)`, in calendar order.
    pub fn bookable_nights(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NightNumber>, AppError> {
        let start = from.max(self.codec.epoch());
        let mut out = Vec::new();
        for day in start.iter_days().take_while(|d| *d < to) {
            let night = self.codec.date_to_night(day)?;
            if self.night_state(night).is_bookable() {
                out.push(night);
            }
        }
        Ok(out)
    }
}

fn span_of(codec: &NightCodec, key: &SubVaultKey, state: VaultState) -> Option<NightSpan> {
    let SubVaultKey::Range {
        check_in,
        check_out,
    } = key
    else {
        return None;
    };
    let first = codec.timestamp_to_night(*check_in).ok()?.get();
    let last = codec.timestamp_to_night(*check_out).ok()?.get();
    Some(NightSpan {
        first,
        end: last.max(first + 1),
        state,
    })
}
