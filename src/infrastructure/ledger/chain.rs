// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::{AppError, RevertSite};
use crate::domain::vault::{
    Bid, NightNumber, ParentVault, Reservation, SubVault, SubVaultKey, VaultState,
};
use crate::infrastructure::data::contracts::{ERC20, ShareVault, VaultFactory};
use crate::infrastructure::ledger::backend::{LedgerBackend, TxOutcome, WriteRequest};
use crate::infrastructure::network::provider::HttpProvider;
use alloy::contract::Error as ContractError;
use alloy::hex;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::Provider;
use alloy::sol_types::{Revert, SolError};
use async_trait::async_trait;

/// [`LedgerBackend`] over JSON-RPC using the generated contract bindings.
#[derive(Clone)]
pub struct AlloyLedger {
    provider: HttpProvider,
    signer: Address,
    factory: Address,
    token: Address,
}

fn rpc_err(call: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Connection(format!("{call} failed: {e}"))
}

/// Revert reason carried by a failed call, if the node answered with one.
fn revert_reason(e: &ContractError) -> Option<String> {
    if let Some(data) = e.as_revert_data() {
        return Some(decode_revert(&data));
    }
    match e {
        ContractError::TransportError(t) => t
            .as_error_resp()
            .filter(|p| p.message.contains("revert"))
            .map(|p| p.message.to_string()),
        _ => None,
    }
}

/// Render revert data the way the contracts name their errors, e.g. `BidInactive(2)`.
fn decode_revert(data: &[u8]) -> String {
    if let Ok(e) = Revert::abi_decode(data) {
        return e.reason;
    }
    if let Ok(e) = VaultFactory::VaultNotFound::abi_decode(data) {
        return format!("VaultNotFound({})", e.vaultId);
    }
    if let Ok(e) = VaultFactory::VaultAlreadyExists::abi_decode(data) {
        return format!("VaultAlreadyExists({})", e.vaultId);
    }
    if VaultFactory::InvalidAccessCode::abi_decode(data).is_ok() {
        return "InvalidAccessCode()".to_string();
    }
    if ShareVault::NotBooker::abi_decode(data).is_ok() {
        return "NotBooker()".to_string();
    }
    if ShareVault::NotBidder::abi_decode(data).is_ok() {
        return "NotBidder()".to_string();
    }
    if ShareVault::NotOwner::abi_decode(data).is_ok() {
        return "NotOwner()".to_string();
    }
    if let Ok(e) = ShareVault::InvalidState::abi_decode(data) {
        return format!("InvalidState({})", e.current);
    }
    if let Ok(e) = ShareVault::InvalidBidIndex::abi_decode(data) {
        return format!("InvalidBidIndex({})", e.index);
    }
    if let Ok(e) = ShareVault::BidInactive::abi_decode(data) {
        return format!("BidInactive({})", e.index);
    }
    if let Ok(e) = ShareVault::StakeTooLow::abi_decode(data) {
        return format!("StakeTooLow({}, {})", e.required, e.provided);
    }
    if let Ok(e) = ShareVault::BidTooLow::abi_decode(data) {
        return format!("BidTooLow({}, {})", e.currentStake, e.provided);
    }
    format!("revert 0x{}", hex::encode(data))
}

fn to_u64(value: U256) -> u64 {
    value.saturating_to::<u64>()
}

fn sub_vault_key(night: U256, check_in: U256, check_out: U256) -> SubVaultKey {
    if night.is_zero() {
        SubVaultKey::Range {
            check_in: to_u64(check_in),
            check_out: to_u64(check_out),
        }
    } else {
        SubVaultKey::Night(NightNumber(to_u64(night)))
    }
}

impl AlloyLedger {
    pub fn new(provider: HttpProvider, signer: Address, factory: Address, token: Address) -> Self {
        Self {
            provider,
            signer,
            factory,
            token,
        }
    }

    fn factory(&self) -> VaultFactory::VaultFactoryInstance<HttpProvider> {
        VaultFactory::new(self.factory, self.provider.clone())
    }

    fn sub_vault(&self, addr: Address) -> ShareVault::ShareVaultInstance<HttpProvider> {
        ShareVault::new(addr, self.provider.clone())
    }

    fn token(&self) -> ERC20::ERC20Instance<HttpProvider> {
        ERC20::new(self.token, self.provider.clone())
    }

    /// Reverts are contract answers and final; everything else is transport.
    fn read_err(&self, call: &str, e: ContractError) -> AppError {
        if let Some(reason) = revert_reason(&e) {
            let caller = format!("{:#x}", self.signer);
            let site = RevertSite {
                action: call,
                caller: &caller,
                hash: "eth_call",
                bid_index: None,
            };
            return AppError::from_revert(site, &reason);
        }
        match e {
            ContractError::ZeroData(..) | ContractError::AbiError(_) => {
                AppError::invalid_input(call, format!("undecodable contract response: {e}"))
            }
            other => rpc_err(call, other),
        }
    }

    fn send_err(&self, request: &WriteRequest, e: ContractError) -> AppError {
        let call = request.kind().as_str();
        match revert_reason(&e) {
            Some(reason) => {
                let caller = format!("{:#x}", self.signer);
                let site = RevertSite {
                    action: call,
                    caller: &caller,
                    hash: "unsent",
                    bid_index: request.bid_index(),
                };
                AppError::from_revert(site, &reason)
            }
            None => AppError::Transaction {
                hash: "unsent".to_string(),
                reason: format!("{call}: {e}"),
            },
        }
    }
}

#[async_trait]
impl LedgerBackend for AlloyLedger {
    fn signer(&self) -> Address {
        self.signer
    }

    async fn all_vault_ids(&self) -> Result<Vec<String>, AppError> {
        self.factory()
            .getAllVaultIds()
            .call()
            .await
            .map_err(|e| self.read_err("getAllVaultIds", e))
    }

    async fn vault_info(&self, vault_id: &str) -> Result<Option<ParentVault>, AppError> {
        let record = match self.factory().getVaultInfo(vault_id.to_string()).call().await {
            Ok(record) => record,
            Err(e) => {
                return match self.read_err("getVaultInfo", e) {
                    AppError::InvalidInput { field, .. } if field == "vault_id" => Ok(None),
                    other => Err(other),
                };
            }
        };
        if record.vaultAddress == Address::ZERO {
            return Ok(None);
        }
        Ok(Some(ParentVault {
            vault_id: record.vaultId,
            address: record.vaultAddress,
            owner: record.owner,
            property_details: record.propertyDetails,
            daily_base_price: record.dailyBasePrice,
        }))
    }

    async fn vault_address(&self, vault_id: &str) -> Result<Option<Address>, AppError> {
        let addr = self
            .factory()
            .getVaultAddress(vault_id.to_string())
            .call()
            .await
            .map_err(|e| self.read_err("getVaultAddress", e))?;
        Ok((addr != Address::ZERO).then_some(addr))
    }

    async fn sub_vault_address(
        &self,
        vault_id: &str,
        key: &SubVaultKey,
    ) -> Result<Option<Address>, AppError> {
        let factory = self.factory();
        let addr = match key {
            SubVaultKey::Night(night) => factory
                .getDailySubVault(vault_id.to_string(), U256::from(night.get()))
                .call()
                .await
                .map_err(|e| self.read_err("getDailySubVault", e))?,
            SubVaultKey::Range {
                check_in,
                check_out,
            } => factory
                .getDateVault(
                    vault_id.to_string(),
                    U256::from(*check_in),
                    U256::from(*check_out),
                )
                .call()
                .await
                .map_err(|e| self.read_err("getDateVault", e))?,
        };
        Ok((addr != Address::ZERO).then_some(addr))
    }

    async fn sub_vault_info(&self, sub_vault: Address) -> Result<SubVault, AppError> {
        let info = self
            .sub_vault(sub_vault)
            .getVaultInfo()
            .call()
            .await
            .map_err(|e| self.read_err("getVaultInfo", e))?;
        Ok(SubVault {
            address: sub_vault,
            parent_vault_id: info.parentVaultId,
            key: sub_vault_key(info.nightNumber, info.checkIn, info.checkOut),
            state: VaultState::from_code(info.currentState)?,
            daily_price: info.dailyPrice,
        })
    }

    async fn sub_vaults(&self, vault_id: &str) -> Result<Vec<SubVault>, AppError> {
        let records = self
            .factory()
            .getDailySubVaultsInfo(vault_id.to_string())
            .call()
            .await
            .map_err(|e| self.read_err("getDailySubVaultsInfo", e))?;
        records
            .into_iter()
            .filter(|r| r.subVault != Address::ZERO)
            .map(|r| {
                Ok(SubVault {
                    address: r.subVault,
                    parent_vault_id: vault_id.to_string(),
                    key: sub_vault_key(r.nightNumber, r.checkIn, r.checkOut),
                    state: VaultState::from_code(r.state)?,
                    daily_price: r.dailyPrice,
                })
            })
            .collect()
    }

    async fn is_date_range_available(
        &self,
        vault_id: &str,
        check_in: u64,
        check_out: u64,
    ) -> Result<bool, AppError> {
        self.factory()
            .isDateRangeAvailable(
                vault_id.to_string(),
                U256::from(check_in),
                U256::from(check_out),
            )
            .call()
            .await
            .map_err(|e| self.read_err("isDateRangeAvailable", e))
    }

    async fn current_reservation(
        &self,
        sub_vault: Address,
    ) -> Result<Option<Reservation>, AppError> {
        let r = self
            .sub_vault(sub_vault)
            .getCurrentReservation()
            .call()
            .await
            .map_err(|e| self.read_err("getCurrentReservation", e))?;
        if !r.isActive || r.booker == Address::ZERO {
            return Ok(None);
        }
        Ok(Some(Reservation {
            booker: r.booker,
            stake_amount: r.stakeAmount,
            check_in: to_u64(r.checkInDate),
            check_out: to_u64(r.checkOutDate),
            is_active: r.isActive,
        }))
    }

    async fn auction_bids(&self, sub_vault: Address) -> Result<Vec<Bid>, AppError> {
        let bids = self
            .sub_vault(sub_vault)
            .getAuctionBids()
            .call()
            .await
            .map_err(|e| self.read_err("getAuctionBids", e))?;
        Ok(bids
            .into_iter()
            .map(|b| Bid {
                bidder: b.bidder,
                amount: b.amount,
                timestamp: to_u64(b.timestamp),
                is_active: b.isActive,
            })
            .collect())
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, AppError> {
        self.token()
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| self.read_err("allowance", e))
    }

    async fn balance(&self, owner: Address) -> Result<U256, AppError> {
        self.token()
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| self.read_err("balanceOf", e))
    }

    async fn master_access_code(&self, vault: Address) -> Result<String, AppError> {
        self.sub_vault(vault)
            .getMasterAccessCode()
            .from(self.signer)
            .call()
            .await
            .map_err(|e| self.read_err("getMasterAccessCode", e))
    }

    async fn current_access_code(&self, sub_vault: Address) -> Result<String, AppError> {
        self.sub_vault(sub_vault)
            .getCurrentAccessCode()
            .from(self.signer)
            .call()
            .await
            .map_err(|e| self.read_err("getCurrentAccessCode", e))
    }

    async fn submit(&self, request: &WriteRequest) -> Result<B256, AppError> {
        let pending = match request {
            WriteRequest::CreateVault {
                vault_id,
                property_details,
                daily_base_price,
                master_access_code,
            } => self
                .factory()
                .createVault(
                    vault_id.clone(),
                    property_details.clone(),
                    *daily_base_price,
                    master_access_code.clone(),
                )
                .send()
                .await,
            WriteRequest::CreateSubVault {
                vault_id,
                key: SubVaultKey::Night(night),
                master_access_code,
            } => self
                .factory()
                .getOrCreateNightVault(
                    vault_id.clone(),
                    U256::from(night.get()),
                    master_access_code.clone(),
                )
                .send()
                .await,
            WriteRequest::CreateSubVault {
                vault_id,
                key:
                    SubVaultKey::Range {
                        check_in,
                        check_out,
                    },
                master_access_code,
            } => self
                .factory()
                .getOrCreateDateVault(
                    vault_id.clone(),
                    U256::from(*check_in),
                    U256::from(*check_out),
                    master_access_code.clone(),
                )
                .send()
                .await,
            WriteRequest::ApproveSpending { spender, amount } => {
                self.token().approve(*spender, *amount).send().await
            }
            WriteRequest::CreateReservation {
                sub_vault,
                stake,
                check_in,
                check_out,
            } => self
                .sub_vault(*sub_vault)
                .createReservation(*stake, U256::from(*check_in), U256::from(*check_out))
                .send()
                .await,
            WriteRequest::PlaceBid { sub_vault, amount } => {
                self.sub_vault(*sub_vault).placeBid(*amount).send().await
            }
            WriteRequest::CedeReservation {
                sub_vault,
                bid_index,
            } => self
                .sub_vault(*sub_vault)
                .cedeReservation(U256::from(*bid_index))
                .send()
                .await,
            WriteRequest::WithdrawBid {
                sub_vault,
                bid_index,
            } => self
                .sub_vault(*sub_vault)
                .withdrawBid(U256::from(*bid_index))
                .send()
                .await,
            WriteRequest::CheckIn { sub_vault } => {
                self.sub_vault(*sub_vault).checkIn().send().await
            }
            WriteRequest::CheckOut { sub_vault } => {
                self.sub_vault(*sub_vault).checkOut().send().await
            }
            WriteRequest::CancelReservation { sub_vault } => {
                self.sub_vault(*sub_vault).cancelReservation().send().await
            }
            WriteRequest::UpdateMasterAccessCode { vault, new_code } => self
                .sub_vault(*vault)
                .updateMasterAccessCode(new_code.clone())
                .send()
                .await,
        }
        .map_err(|e| self.send_err(request, e))?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, hash: B256) -> Result<Option<TxOutcome>, AppError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| rpc_err("eth_getTransactionReceipt", e))?;
        Ok(receipt.map(|rcpt| {
            let success = rcpt.status();
            TxOutcome {
                success,
                block_number: rcpt.block_number,
                revert_reason: (!success).then(|| "execution reverted".to_string()),
            }
        }))
    }

    async fn block_number(&self) -> Result<u64, AppError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| rpc_err("eth_blockNumber", e))
    }
}
