// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

//! Typed records for everything read off the vault contracts.
//!
//! Each ledger read maps onto exactly one of these shapes at the client
//! boundary; call sites never inspect raw tuples.

use crate::domain::error::AppError;
use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::fmt;

/// Epoch-relative night index. Night 1 starts at midnight UTC of the epoch date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NightNumber(pub u64);

impl NightNumber {
    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        NightNumber(self.0.saturating_add(1))
    }
}

impl fmt::Display for NightNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "night#{}", self.0)
    }
}

/// Key of a sub-vault under its parent. Which variant is used depends on the
/// property's granularity mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubVaultKey {
    Night(NightNumber),
    /// Unix seconds, midnight aligned; `check_out` is exclusive.
    Range { check_in: u64, check_out: u64 },
}

impl fmt::Display for SubVaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubVaultKey::Night(night) => write!(f, "{night}"),
            SubVaultKey::Range {
                check_in,
                check_out,
            } => write!(f, "range[{check_in}..{check_out})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VaultState {
    Free,
    Auction,
    Settled,
}

impl VaultState {
    pub fn from_code(code: u8) -> Result<Self, AppError> {
        match code {
            0 => Ok(VaultState::Free),
            1 => Ok(VaultState::Auction),
            2 => Ok(VaultState::Settled),
            other => Err(AppError::invalid_input(
                "state",
                format!("unknown sub-vault state code {other}"),
            )),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            VaultState::Free => 0,
            VaultState::Auction => 1,
            VaultState::Settled => 2,
        }
    }

    /// Lifecycle only moves forward: FREE -> AUCTION -> SETTLED.
    pub fn can_advance_to(self, next: VaultState) -> bool {
        matches!(
            (self, next),
            (VaultState::Free, VaultState::Auction) | (VaultState::Auction, VaultState::Settled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentVault {
    pub vault_id: String,
    pub address: Address,
    pub owner: Address,
    pub property_details: String,
    pub daily_base_price: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubVault {
    pub address: Address,
    pub parent_vault_id: String,
    pub key: SubVaultKey,
    pub state: VaultState,
    pub daily_price: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub booker: Address,
    pub stake_amount: U256,
    pub check_in: u64,
    pub check_out: u64,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bid {
    pub bidder: Address,
    pub amount: U256,
    pub timestamp: u64,
    pub is_active: bool,
}

/// A bid together with its position in the on-ledger bid array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedBid {
    pub index: u64,
    pub bid: Bid,
}

/// Active bids ordered by amount descending, earliest timestamp first on ties.
pub fn rank_bids(bids: &[Bid]) -> Vec<RankedBid> {
    let mut ranked: Vec<RankedBid> = bids
        .iter()
        .enumerate()
        .filter(|(_, bid)| bid.is_active)
        .map(|(idx, bid)| RankedBid {
            index: idx as u64,
            bid: bid.clone(),
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.bid
            .amount
            .cmp(&a.bid.amount)
            .then(a.bid.timestamp.cmp(&b.bid.timestamp))
            .then(a.index.cmp(&b.index))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(byte: u8, amount: u64, timestamp: u64, is_active: bool) -> Bid {
        Bid {
            bidder: Address::repeat_byte(byte),
            amount: U256::from(amount),
            timestamp,
            is_active,
        }
    }

    #[test]
    fn ranking_prefers_amount_then_earliest_timestamp() {
        let bids = vec![bid(0xA, 100, 1, true), bid(0xB, 150, 2, true), bid(0xC, 150, 0, true)];
        let order: Vec<Address> = rank_bids(&bids).into_iter().map(|r| r.bid.bidder).collect();
        assert_eq!(
            order,
            vec![
                Address::repeat_byte(0xC),
                Address::repeat_byte(0xB),
                Address::repeat_byte(0xA)
            ]
        );
    }

    #[test]
    fn ranking_skips_inactive_bids_but_keeps_ledger_indices() {
        let bids = vec![bid(1, 500, 0, false), bid(2, 200, 5, true)];
        let ranked = rank_bids(&bids);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].index, 1);
    }

    #[test]
    fn state_codes_round_trip_and_reject_unknown() {
        for state in [VaultState::Free, VaultState::Auction, VaultState::Settled] {
            assert_eq!(VaultState::from_code(state.code()).unwrap(), state);
        }
        // Garbage state from the ledger is final, never retried as transport noise.
        let err = VaultState::from_code(9).unwrap_err();
        assert_eq!(err.kind(), crate::domain::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn lifecycle_never_moves_backward() {
        assert!(VaultState::Free.can_advance_to(VaultState::Auction));
        assert!(VaultState::Auction.can_advance_to(VaultState::Settled));
        assert!(!VaultState::Settled.can_advance_to(VaultState::Free));
        assert!(!VaultState::Auction.can_advance_to(VaultState::Free));
    }
}
