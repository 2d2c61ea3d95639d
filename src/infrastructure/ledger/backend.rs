// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

//! Raw contract surface of the vault factory, the sub-vaults and the token.
//!
//! Implementations translate each method onto the concrete ledger. They do
//! not cache, retry or wait for receipts; [`LedgerClient`] owns that policy.
//!
//! [`LedgerClient`]: super::client::LedgerClient

use crate::domain::error::AppError;
use crate::domain::vault::{Bid, ParentVault, Reservation, SubVault, SubVaultKey};
use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    CreateVault,
    CreateSubVault,
    ApproveSpending,
    CreateReservation,
    PlaceBid,
    CedeReservation,
    WithdrawBid,
    CheckIn,
    CheckOut,
    CancelReservation,
    UpdateMasterAccessCode,
}

impl WriteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteKind::CreateVault => "createVault",
            WriteKind::CreateSubVault => "getOrCreateSubVault",
            WriteKind::ApproveSpending => "approve",
            WriteKind::CreateReservation => "createReservation",
            WriteKind::PlaceBid => "placeBid",
            WriteKind::CedeReservation => "cedeReservation",
            WriteKind::WithdrawBid => "withdrawBid",
            WriteKind::CheckIn => "checkIn",
            WriteKind::CheckOut => "checkOut",
            WriteKind::CancelReservation => "cancelReservation",
            WriteKind::UpdateMasterAccessCode => "updateMasterAccessCode",
        }
    }
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state-changing call. Access codes never show up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub enum WriteRequest {
    CreateVault {
        vault_id: String,
        property_details: String,
        daily_base_price: U256,
        master_access_code: String,
    },
    CreateSubVault {
        vault_id: String,
        key: SubVaultKey,
        master_access_code: String,
    },
    ApproveSpending {
        spender: Address,
        amount: U256,
    },
    CreateReservation {
        sub_vault: Address,
        stake: U256,
        check_in: u64,
        check_out: u64,
    },
    PlaceBid {
        sub_vault: Address,
        amount: U256,
    },
    CedeReservation {
        sub_vault: Address,
        bid_index: u64,
    },
    WithdrawBid {
        sub_vault: Address,
        bid_index: u64,
    },
    CheckIn {
        sub_vault: Address,
    },
    CheckOut {
        sub_vault: Address,
    },
    CancelReservation {
        sub_vault: Address,
    },
    UpdateMasterAccessCode {
        vault: Address,
        new_code: String,
    },
}

impl WriteRequest {
    pub fn kind(&self) -> WriteKind {
        match self {
            WriteRequest::CreateVault { .. } => WriteKind::CreateVault,
            WriteRequest::CreateSubVault { .. } => WriteKind::CreateSubVault,
            WriteRequest::ApproveSpending { .. } => WriteKind::ApproveSpending,
            WriteRequest::CreateReservation { .. } => WriteKind::CreateReservation,
            WriteRequest::PlaceBid { .. } => WriteKind::PlaceBid,
            WriteRequest::CedeReservation { .. } => WriteKind::CedeReservation,
            WriteRequest::WithdrawBid { .. } => WriteKind::WithdrawBid,
            WriteRequest::CheckIn { .. } => WriteKind::CheckIn,
            WriteRequest::CheckOut { .. } => WriteKind::CheckOut,
            WriteRequest::CancelReservation { .. } => WriteKind::CancelReservation,
            WriteRequest::UpdateMasterAccessCode { .. } => WriteKind::UpdateMasterAccessCode,
        }
    }

    pub fn bid_index(&self) -> Option<u64> {
        match self {
            WriteRequest::CedeReservation { bid_index, .. }
            | WriteRequest::WithdrawBid { bid_index, .. } => Some(*bid_index),
            _ => None,
        }
    }

    /// Contract the call lands on, when it is known before submission.
    pub fn target(&self) -> Option<Address> {
        match self {
            WriteRequest::CreateVault { .. } | WriteRequest::CreateSubVault { .. } => None,
            WriteRequest::ApproveSpending { spender, .. } => Some(*spender),
            WriteRequest::CreateReservation { sub_vault, .. }
            | WriteRequest::PlaceBid { sub_vault, .. }
            | WriteRequest::CedeReservation { sub_vault, .. }
            | WriteRequest::WithdrawBid { sub_vault, .. }
            | WriteRequest::CheckIn { sub_vault }
            | WriteRequest::CheckOut { sub_vault }
            | WriteRequest::CancelReservation { sub_vault } => Some(*sub_vault),
            WriteRequest::UpdateMasterAccessCode { vault, .. } => Some(*vault),
        }
    }
}

impl fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteRequest::CreateVault { vault_id, .. } => f
                .debug_struct("CreateVault")
                .field("vault_id", vault_id)
                .finish_non_exhaustive(),
            WriteRequest::CreateSubVault { vault_id, key, .. } => f
                .debug_struct("CreateSubVault")
                .field("vault_id", vault_id)
                .field("key", key)
                .finish_non_exhaustive(),
            WriteRequest::UpdateMasterAccessCode { vault, .. } => f
                .debug_struct("UpdateMasterAccessCode")
                .field("vault", vault)
                .finish_non_exhaustive(),
            other => write!(f, "{}(target={:?})", other.kind(), other.target()),
        }
    }
}

/// What a mined receipt says about a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub success: bool,
    pub block_number: Option<u64>,
    pub revert_reason: Option<String>,
}

#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Address that signs every write submitted through this backend.
    fn signer(&self) -> Address;

    async fn all_vault_ids(&self) -> Result<Vec<String>, AppError>;

    async fn vault_info(&self, vault_id: &str) -> Result<Option<ParentVault>, AppError>;

    async fn vault_address(&self, vault_id: &str) -> Result<Option<Address>, AppError>;

    /// `None` when the sub-vault has not been created yet.
    async fn sub_vault_address(
        &self,
        vault_id: &str,
        key: &SubVaultKey,
    ) -> Result<Option<Address>, AppError>;

    async fn sub_vault_info(&self, sub_vault: Address) -> Result<SubVault, AppError>;

    /// Every sub-vault known under a parent, in one batch read.
    async fn sub_vaults(&self, vault_id: &str) -> Result<Vec<SubVault>, AppError>;

    async fn is_date_range_available(
        &self,
        vault_id: &str,
        check_in: u64,
        check_out: u64,
    ) -> Result<bool, AppError>;

    async fn current_reservation(&self, sub_vault: Address)
    -> Result<Option<Reservation>, AppError>;

    async fn auction_bids(&self, sub_vault: Address) -> Result<Vec<Bid>, AppError>;

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, AppError>;

    async fn balance(&self, owner: Address) -> Result<U256, AppError>;

    async fn master_access_code(&self, vault: Address) -> Result<String, AppError>;

    async fn current_access_code(&self, sub_vault: Address) -> Result<String, AppError>;

    /// Sign and broadcast. Returns once the ledger accepted the transaction.
    async fn submit(&self, request: &WriteRequest) -> Result<B256, AppError>;

    /// `None` while the transaction is not mined (or its receipt is not visible).
    async fn receipt(&self, hash: B256) -> Result<Option<TxOutcome>, AppError>;

    async fn block_number(&self) -> Result<u64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vault::NightNumber;

    #[test]
    fn debug_output_redacts_access_codes() {
        let req = WriteRequest::CreateSubVault {
            vault_id: "APT-1".to_string(),
            key: SubVaultKey::Night(NightNumber(3)),
            master_access_code: "hunter2".to_string(),
        };
        let rendered = format!("{req:?}");
        assert!(rendered.contains("APT-1"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn spend_calls_target_their_sub_vault() {
        let sub = Address::repeat_byte(7);
        let req = WriteRequest::PlaceBid {
            sub_vault: sub,
            amount: U256::from(1u64),
        };
        assert_eq!(req.kind(), WriteKind::PlaceBid);
        assert_eq!(req.target(), Some(sub));
    }
}
