// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod constants;
pub mod error;
pub mod night;
pub mod vault;

pub use night::NightCodec;
pub use vault::{
    Bid, NightNumber, ParentVault, RankedBid, Reservation, SubVault, SubVaultKey, VaultState,
    rank_bids,
};
