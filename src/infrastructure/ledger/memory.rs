// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

//! In-process ledger with the same contract rules as the deployed vaults.
//!
//! Backs `--dry-run` and the test-suite. Several signers can share one
//! ledger through [`InMemoryLedger::view_as`], and faults can be queued to
//! simulate reverts, rejected signatures and receipts that never show up.

use crate::domain::constants::SECONDS_PER_DAY;
use crate::domain::error::AppError;
use crate::domain::night::NightCodec;
use crate::domain::vault::{Bid, ParentVault, Reservation, SubVault, SubVaultKey, VaultState};
use crate::infrastructure::ledger::backend::{LedgerBackend, TxOutcome, WriteKind, WriteRequest};
use alloy::primitives::{Address, B256, U256, keccak256};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// 2025-01-01T00:00:00Z
const GENESIS_TIME: u64 = 1_735_689_600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultTarget {
    Any,
    Address(Address),
    Key(SubVaultKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultEffect {
    /// Mined with a failed status; state is untouched.
    Revert(String),
    /// Never broadcast, as when the signer declines the prompt.
    Reject(String),
    /// Applied on the ledger, but the receipt is never observed.
    LostReceipt,
}

#[derive(Debug, Clone)]
struct Fault {
    kind: WriteKind,
    target: FaultTarget,
    effect: FaultEffect,
}

impl Fault {
    fn matches(&self, request: &WriteRequest) -> bool {
        if self.kind != request.kind() {
            return false;
        }
        match &self.target {
            FaultTarget::Any => true,
            FaultTarget::Address(addr) => request.target() == Some(*addr),
            FaultTarget::Key(key) => {
                matches!(request, WriteRequest::CreateSubVault { key: k, .. } if k == key)
            }
        }
    }
}

/// A write as the ledger saw it, for assertions and dry-run summaries.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub hash: B256,
    pub signer: Address,
    pub request: WriteRequest,
}

#[derive(Debug, Clone)]
struct ParentRecord {
    info: ParentVault,
    master_code: String,
}

#[derive(Debug, Clone)]
struct SubRecord {
    info: SubVault,
    reservation: Option<Reservation>,
    bids: Vec<Bid>,
}

#[derive(Debug, Default)]
struct LedgerState {
    vault_order: Vec<String>,
    vaults: HashMap<String, ParentRecord>,
    sub_by_key: HashMap<(String, SubVaultKey), Address>,
    subs: HashMap<Address, SubRecord>,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    receipts: HashMap<B256, TxOutcome>,
    faults: VecDeque<Fault>,
    writes: Vec<WriteRecord>,
    block: u64,
    clock: u64,
    nonce: u64,
    offline: bool,
}

#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    signer: Address,
    codec: NightCodec,
}

impl InMemoryLedger {
    pub fn new(codec: NightCodec, signer: Address) -> Self {
        let state = LedgerState {
            clock: GENESIS_TIME,
            ..LedgerState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            signer,
            codec,
        }
    }

    /// Another signer's handle onto the same ledger state.
    pub fn view_as(&self, signer: Address) -> Self {
        Self {
            state: Arc::clone(&self.state),
            signer,
            codec: self.codec,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// State for a contract read. Fails like a dropped RPC while offline.
    fn read_state(&self) -> Result<MutexGuard<'_, LedgerState>, AppError> {
        let state = self.lock();
        if state.offline {
            return Err(AppError::Connection("in-memory ledger is offline".to_string()));
        }
        Ok(state)
    }

    /// Make every read fail with a connection error until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn mint(&self, owner: Address, amount: U256) {
        let mut state = self.lock();
        let entry = state.balances.entry(owner).or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Register a parent vault directly, bypassing the write path.
    pub fn seed_vault(
        &self,
        owner: Address,
        vault_id: &str,
        property_details: &str,
        daily_base_price: U256,
        master_access_code: &str,
    ) -> Address {
        let mut state = self.lock();
        insert_parent(
            &mut state,
            owner,
            vault_id,
            property_details,
            daily_base_price,
            master_access_code,
        )
    }

    pub fn inject_fault(&self, kind: WriteKind, target: FaultTarget, effect: FaultEffect) {
        self.lock().faults.push_back(Fault {
            kind,
            target,
            effect,
        });
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self, kind: WriteKind) -> usize {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.request.kind() == kind)
            .count()
    }

    pub fn sub_vault_count(&self) -> usize {
        self.lock().subs.len()
    }

    pub fn balance_of(&self, owner: Address) -> U256 {
        self.lock().balances.get(&owner).copied().unwrap_or_default()
    }

    fn apply(&self, state: &mut LedgerState, request: &WriteRequest) -> Result<(), String> {
        let caller = self.signer;
        match request {
            WriteRequest::CreateVault {
                vault_id,
                property_details,
                daily_base_price,
                master_access_code,
            } => {
                if vault_id.trim().is_empty() {
                    return Err("empty vault id".into());
                }
                if state.vaults.contains_key(vault_id) {
                    return Err(format!("VaultAlreadyExists({vault_id})"));
                }
                if daily_base_price.is_zero() {
                    return Err("daily base price must be positive".into());
                }
                insert_parent(
                    state,
                    caller,
                    vault_id,
                    property_details,
                    *daily_base_price,
                    master_access_code,
                );
                Ok(())
            }
            WriteRequest::CreateSubVault {
                vault_id,
                key,
                master_access_code,
            } => {
                let parent = state
                    .vaults
                    .get(vault_id)
                    .ok_or_else(|| format!("VaultNotFound({vault_id})"))?;
                if parent.master_code != *master_access_code {
                    return Err("InvalidAccessCode()".into());
                }
                let map_key = (vault_id.clone(), *key);
                if state.sub_by_key.contains_key(&map_key) {
                    return Ok(());
                }
                if let SubVaultKey::Range {
                    check_in,
                    check_out,
                } = key
                {
                    if check_out <= check_in {
                        return Err("empty date range".into());
                    }
                    if !range_available(state, &self.codec, vault_id, *check_in, *check_out) {
                        return Err("date range overlaps an existing booking".into());
                    }
                }
                let price = parent.info.daily_base_price;
                let address = derive_address(&format!("sub:{vault_id}:{key}"));
                state.sub_by_key.insert(map_key, address);
                state.subs.insert(
                    address,
                    SubRecord {
                        info: SubVault {
                            address,
                            parent_vault_id: vault_id.clone(),
                            key: *key,
                            state: VaultState::Free,
                            daily_price: price,
                        },
                        reservation: None,
                        bids: Vec::new(),
                    },
                );
                Ok(())
            }
            WriteRequest::ApproveSpending { spender, amount } => {
                state.allowances.insert((caller, *spender), *amount);
                Ok(())
            }
            WriteRequest::CreateReservation {
                sub_vault,
                stake,
                check_in,
                check_out,
            } => {
                let sub = state.subs.get(sub_vault).ok_or("unknown sub-vault")?;
                if !sub.info.state.can_advance_to(VaultState::Auction) {
                    return Err(format!("InvalidState({})", sub.info.state.code()));
                }
                if sub.reservation.as_ref().is_some_and(|r| r.is_active) {
                    return Err("already reserved".into());
                }
                if check_out <= check_in {
                    return Err("empty stay window".into());
                }
                let nights = ((check_out - check_in) / SECONDS_PER_DAY as u64).max(1);
                let required = sub.info.daily_price.saturating_mul(U256::from(nights));
                if *stake < required {
                    return Err(format!("StakeTooLow({required}, {stake})"));
                }
                transfer_from(state, caller, *sub_vault, *stake)?;
                let sub = state.subs.get_mut(sub_vault).ok_or("unknown sub-vault")?;
                sub.reservation = Some(Reservation {
                    booker: caller,
                    stake_amount: *stake,
                    check_in: *check_in,
                    check_out: *check_out,
                    is_active: true,
                });
                sub.info.state = VaultState::Auction;
                Ok(())
            }
            WriteRequest::PlaceBid { sub_vault, amount } => {
                let sub = state.subs.get(sub_vault).ok_or("unknown sub-vault")?;
                if sub.info.state != VaultState::Auction {
                    return Err(format!("InvalidState({})", sub.info.state.code()));
                }
                let reservation = sub
                    .reservation
                    .as_ref()
                    .filter(|r| r.is_active)
                    .ok_or("no active reservation")?;
                if reservation.booker == caller {
                    return Err("booker cannot bid".into());
                }
                if *amount <= reservation.stake_amount {
                    return Err(format!("BidTooLow({}, {amount})", reservation.stake_amount));
                }
                transfer_from(state, caller, *sub_vault, *amount)?;
                let timestamp = state.clock;
                let sub = state.subs.get_mut(sub_vault).ok_or("unknown sub-vault")?;
                sub.bids.push(Bid {
                    bidder: caller,
                    amount: *amount,
                    timestamp,
                    is_active: true,
                });
                Ok(())
            }
            WriteRequest::CedeReservation {
                sub_vault,
                bid_index,
            } => {
                let sub = state.subs.get(sub_vault).ok_or("unknown sub-vault")?;
                let reservation = sub
                    .reservation
                    .clone()
                    .filter(|r| r.is_active)
                    .ok_or("no active reservation")?;
                if reservation.booker != caller {
                    return Err("NotBooker()".into());
                }
                if !sub.info.state.can_advance_to(VaultState::Settled) {
                    return Err(format!("InvalidState({})", sub.info.state.code()));
                }
                let bid = sub
                    .bids
                    .get(*bid_index as usize)
                    .cloned()
                    .ok_or_else(|| format!("InvalidBidIndex({bid_index})"))?;
                if !bid.is_active {
                    return Err(format!("BidInactive({bid_index})"));
                }
                credit(state, *sub_vault, reservation.booker, reservation.stake_amount);
                let sub = state.subs.get_mut(sub_vault).ok_or("unknown sub-vault")?;
                sub.bids[*bid_index as usize].is_active = false;
                sub.reservation = Some(Reservation {
                    booker: bid.bidder,
                    stake_amount: bid.amount,
                    ..reservation
                });
                sub.info.state = VaultState::Settled;
                Ok(())
            }
            WriteRequest::WithdrawBid {
                sub_vault,
                bid_index,
            } => {
                let sub = state.subs.get(sub_vault).ok_or("unknown sub-vault")?;
                let bid = sub
                    .bids
                    .get(*bid_index as usize)
                    .cloned()
                    .ok_or_else(|| format!("InvalidBidIndex({bid_index})"))?;
                if bid.bidder != caller {
                    return Err("NotBidder()".into());
                }
                if !bid.is_active {
                    return Err(format!("BidInactive({bid_index})"));
                }
                credit(state, *sub_vault, bid.bidder, bid.amount);
                let sub = state.subs.get_mut(sub_vault).ok_or("unknown sub-vault")?;
                sub.bids[*bid_index as usize].is_active = false;
                Ok(())
            }
            WriteRequest::CheckIn { sub_vault } => {
                let sub = booked_by(state, *sub_vault, caller)?;
                if sub.info.state == VaultState::Free {
                    return Err("InvalidState(0)".into());
                }
                let refunds: Vec<(Address, U256)> = sub
                    .bids
                    .iter()
                    .filter(|b| b.is_active)
                    .map(|b| (b.bidder, b.amount))
                    .collect();
                for (bidder, amount) in refunds {
                    credit(state, *sub_vault, bidder, amount);
                }
                let sub = state.subs.get_mut(sub_vault).ok_or("unknown sub-vault")?;
                for bid in &mut sub.bids {
                    bid.is_active = false;
                }
                sub.info.state = VaultState::Settled;
                Ok(())
            }
            WriteRequest::CheckOut { sub_vault } => {
                let sub = booked_by(state, *sub_vault, caller)?;
                if sub.info.state != VaultState::Settled {
                    return Err(format!("InvalidState({})", sub.info.state.code()));
                }
                let parent_owner = state
                    .vaults
                    .get(&sub.info.parent_vault_id)
                    .map(|p| p.info.owner)
                    .ok_or("orphaned sub-vault")?;
                let stake = sub
                    .reservation
                    .as_ref()
                    .map(|r| r.stake_amount)
                    .unwrap_or_default();
                credit(state, *sub_vault, parent_owner, stake);
                if let Some(r) = state
                    .subs
                    .get_mut(sub_vault)
                    .and_then(|s| s.reservation.as_mut())
                {
                    r.is_active = false;
                }
                Ok(())
            }
            WriteRequest::CancelReservation { sub_vault } => {
                let sub = booked_by(state, *sub_vault, caller)?;
                if sub.info.state != VaultState::Auction {
                    return Err(format!("InvalidState({})", sub.info.state.code()));
                }
                if sub.bids.iter().any(|b| b.is_active) {
                    return Err("active bids outstanding".into());
                }
                let stake = sub
                    .reservation
                    .as_ref()
                    .map(|r| r.stake_amount)
                    .unwrap_or_default();
                credit(state, *sub_vault, caller, stake);
                let sub = state.subs.get_mut(sub_vault).ok_or("unknown sub-vault")?;
                if let Some(r) = sub.reservation.as_mut() {
                    r.is_active = false;
                }
                sub.info.state = VaultState::Free;
                Ok(())
            }
            WriteRequest::UpdateMasterAccessCode { vault, new_code } => {
                let parent = state
                    .vaults
                    .values_mut()
                    .find(|p| p.info.address == *vault)
                    .ok_or("unknown vault")?;
                if parent.info.owner != caller {
                    return Err("NotOwner()".into());
                }
                if new_code.is_empty() {
                    return Err("empty access code".into());
                }
                parent.master_code = new_code.clone();
                Ok(())
            }
        }
    }
}

fn derive_address(seed: &str) -> Address {
    Address::from_slice(&keccak256(seed.as_bytes())[12..])
}

fn insert_parent(
    state: &mut LedgerState,
    owner: Address,
    vault_id: &str,
    property_details: &str,
    daily_base_price: U256,
    master_access_code: &str,
) -> Address {
    let address = derive_address(&format!("vault:{vault_id}"));
    if !state.vaults.contains_key(vault_id) {
        state.vault_order.push(vault_id.to_string());
    }
    state.vaults.insert(
        vault_id.to_string(),
        ParentRecord {
            info: ParentVault {
                vault_id: vault_id.to_string(),
                address,
                owner,
                property_details: property_details.to_string(),
                daily_base_price,
            },
            master_code: master_access_code.to_string(),
        },
    );
    address
}

fn transfer_from(
    state: &mut LedgerState,
    owner: Address,
    spender: Address,
    amount: U256,
) -> Result<(), String> {
    let allowance = state
        .allowances
        .get(&(owner, spender))
        .copied()
        .unwrap_or_default();
    if allowance < amount {
        return Err(format!("ERC20: insufficient allowance ({allowance} < {amount})"));
    }
    let balance = state.balances.get(&owner).copied().unwrap_or_default();
    if balance < amount {
        return Err(format!("ERC20: transfer amount exceeds balance ({balance} < {amount})"));
    }
    state.allowances.insert((owner, spender), allowance - amount);
    state.balances.insert(owner, balance - amount);
    let to = state.balances.entry(spender).or_default();
    *to = to.saturating_add(amount);
    Ok(())
}

fn credit(state: &mut LedgerState, from: Address, to: Address, amount: U256) {
    let held = state.balances.entry(from).or_default();
    *held = held.saturating_sub(amount);
    let dest = state.balances.entry(to).or_default();
    *dest = dest.saturating_add(amount);
}

fn booked_by(state: &LedgerState, sub_vault: Address, caller: Address) -> Result<SubRecord, String> {
    let sub = state.subs.get(&sub_vault).ok_or("unknown sub-vault")?;
    match &sub.reservation {
        Some(r) if r.is_active && r.booker == caller => Ok(sub.clone()),
        Some(r) if r.is_active => Err("NotBooker()".into()),
        _ => Err("no active reservation".into()),
    }
}

fn nights_of(codec: &NightCodec, key: &SubVaultKey) -> Option<(u64, u64)> {
    match key {
        SubVaultKey::Night(n) => Some((n.get(), n.get() + 1)),
        SubVaultKey::Range {
            check_in,
            check_out,
        } => {
            let first = codec.timestamp_to_night(*check_in).ok()?;
            let last = codec.timestamp_to_night(*check_out).ok()?;
            Some((first.get(), last.get().max(first.get() + 1)))
        }
    }
}

fn range_available(
    state: &LedgerState,
    codec: &NightCodec,
    vault_id: &str,
    check_in: u64,
    check_out: u64,
) -> bool {
    let Some((from, to)) = nights_of(
        codec,
        &SubVaultKey::Range {
            check_in,
            check_out,
        },
    ) else {
        return false;
    };
    state
        .subs
        .values()
        .filter(|s| s.info.parent_vault_id == vault_id && s.info.state != VaultState::Free)
        .filter_map(|s| nights_of(codec, &s.info.key))
        .all(|(a, b)| b <= from || a >= to)
}

#[async_trait]
impl LedgerBackend for InMemoryLedger {
    fn signer(&self) -> Address {
        self.signer
    }

    async fn all_vault_ids(&self) -> Result<Vec<String>, AppError> {
        Ok(self.read_state()?.vault_order.clone())
    }

    async fn vault_info(&self, vault_id: &str) -> Result<Option<ParentVault>, AppError> {
        Ok(self.read_state()?.vaults.get(vault_id).map(|p| p.info.clone()))
    }

    async fn vault_address(&self, vault_id: &str) -> Result<Option<Address>, AppError> {
        Ok(self.read_state()?.vaults.get(vault_id).map(|p| p.info.address))
    }

    async fn sub_vault_address(
        &self,
        vault_id: &str,
        key: &SubVaultKey,
    ) -> Result<Option<Address>, AppError> {
        Ok(self
            .read_state()?
            .sub_by_key
            .get(&(vault_id.to_string(), *key))
            .copied())
    }

    async fn sub_vault_info(&self, sub_vault: Address) -> Result<SubVault, AppError> {
        self.read_state()?
            .subs
            .get(&sub_vault)
            .map(|s| s.info.clone())
            .ok_or_else(|| AppError::invalid_input("sub_vault", format!("{sub_vault:#x} is not a sub-vault")))
    }

    async fn sub_vaults(&self, vault_id: &str) -> Result<Vec<SubVault>, AppError> {
        let state = self.read_state()?;
        let mut subs: Vec<SubVault> = state
            .subs
            .values()
            .filter(|s| s.info.parent_vault_id == vault_id)
            .map(|s| s.info.clone())
            .collect();
        subs.sort_by_key(|s| s.key);
        Ok(subs)
    }

    async fn is_date_range_available(
        &self,
        vault_id: &str,
        check_in: u64,
        check_out: u64,
    ) -> Result<bool, AppError> {
        let state = self.read_state()?;
        Ok(check_out > check_in && range_available(&state, &self.codec, vault_id, check_in, check_out))
    }

    async fn current_reservation(
        &self,
        sub_vault: Address,
    ) -> Result<Option<Reservation>, AppError> {
        Ok(self
            .read_state()?
            .subs
            .get(&sub_vault)
            .and_then(|s| s.reservation.clone())
            .filter(|r| r.is_active))
    }

    async fn auction_bids(&self, sub_vault: Address) -> Result<Vec<Bid>, AppError> {
        Ok(self
            .read_state()?
            .subs
            .get(&sub_vault)
            .map(|s| s.bids.clone())
            .unwrap_or_default())
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, AppError> {
        Ok(self
            .read_state()?
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn balance(&self, owner: Address) -> Result<U256, AppError> {
        Ok(self
            .read_state()?
            .balances
            .get(&owner)
            .copied()
            .unwrap_or_default())
    }

    async fn master_access_code(&self, vault: Address) -> Result<String, AppError> {
        let state = self.read_state()?;
        let parent = state
            .vaults
            .values()
            .find(|p| p.info.address == vault)
            .ok_or_else(|| AppError::invalid_input("vault", format!("{vault:#x} is not a vault")))?;
        if parent.info.owner != self.signer {
            return Err(AppError::AuthorizationFailure {
                action: "read the master access code".to_string(),
                caller: format!("{:#x}", self.signer),
            });
        }
        Ok(parent.master_code.clone())
    }

    async fn current_access_code(&self, sub_vault: Address) -> Result<String, AppError> {
        let state = self.read_state()?;
        let reservation = state
            .subs
            .get(&sub_vault)
            .and_then(|s| s.reservation.as_ref())
            .filter(|r| r.is_active && r.booker == self.signer);
        Ok(match reservation {
            Some(r) => {
                let digest = keccak256([sub_vault.as_slice(), r.booker.as_slice()].concat());
                let code = u32::from_be_bytes([0, digest[0], digest[1], digest[2]]) % 1_000_000;
                format!("{code:06}")
            }
            None => String::new(),
        })
    }

    async fn submit(&self, request: &WriteRequest) -> Result<B256, AppError> {
        let mut state = self.lock();
        let fault_pos = state.faults.iter().position(|f| f.matches(request));
        let effect = fault_pos
            .and_then(|pos| state.faults.remove(pos))
            .map(|f| f.effect);

        if let Some(FaultEffect::Reject(reason)) = &effect {
            return Err(AppError::Transaction {
                hash: "unsent".to_string(),
                reason: reason.clone(),
            });
        }

        state.nonce += 1;
        state.block += 1;
        state.clock += 1;
        let hash = keccak256([self.signer.as_slice(), &state.nonce.to_be_bytes()].concat());
        let block = state.block;
        state.writes.push(WriteRecord {
            hash,
            signer: self.signer,
            request: request.clone(),
        });

        let outcome = match &effect {
            Some(FaultEffect::Revert(reason)) => TxOutcome {
                success: false,
                block_number: Some(block),
                revert_reason: Some(reason.clone()),
            },
            _ => match self.apply(&mut state, request) {
                Ok(()) => TxOutcome {
                    success: true,
                    block_number: Some(block),
                    revert_reason: None,
                },
                Err(reason) => TxOutcome {
                    success: false,
                    block_number: Some(block),
                    revert_reason: Some(reason),
                },
            },
        };
        if effect != Some(FaultEffect::LostReceipt) {
            state.receipts.insert(hash, outcome);
        }
        Ok(hash)
    }

    async fn receipt(&self, hash: B256) -> Result<Option<TxOutcome>, AppError> {
        Ok(self.lock().receipts.get(&hash).cloned())
    }

    async fn block_number(&self) -> Result<u64, AppError> {
        Ok(self.lock().block)
    }
}

/// Used by `--dry-run`: one property, a funded signer, nothing booked yet.
pub fn demo_ledger(codec: NightCodec, signer: Address) -> InMemoryLedger {
    let ledger = InMemoryLedger::new(codec, signer);
    ledger.seed_vault(
        Address::repeat_byte(0x0a),
        "APT-1",
        "Two-room apartment, harbour view",
        U256::from(100_000_000u64),
        "demo-code",
    );
    ledger.mint(signer, U256::from(10_000_000_000u64));
    ledger
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vault::NightNumber;

    fn setup() -> (InMemoryLedger, Address) {
        let codec = NightCodec::from_epoch_str("2025-01-01").unwrap();
        let guest = Address::repeat_byte(0x11);
        let ledger = InMemoryLedger::new(codec, guest);
        ledger.seed_vault(
            Address::repeat_byte(0x0a),
            "APT-1",
            "flat",
            U256::from(100u64),
            "code",
        );
        ledger.mint(guest, U256::from(1_000u64));
        (ledger, guest)
    }

    async fn create_sub(ledger: &InMemoryLedger, night: u64) -> Address {
        let key = SubVaultKey::Night(NightNumber(night));
        ledger
            .submit(&WriteRequest::CreateSubVault {
                vault_id: "APT-1".into(),
                key,
                master_access_code: "code".into(),
            })
            .await
            .unwrap();
        ledger.sub_vault_address("APT-1", &key).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn wrong_master_code_reverts_without_creating() {
        let (ledger, _) = setup();
        let hash = ledger
            .submit(&WriteRequest::CreateSubVault {
                vault_id: "APT-1".into(),
                key: SubVaultKey::Night(NightNumber(1)),
                master_access_code: "nope".into(),
            })
            .await
            .unwrap();
        let outcome = ledger.receipt(hash).await.unwrap().unwrap();
        assert!(!outcome.success);
        assert_eq!(ledger.sub_vault_count(), 0);
    }

    #[tokio::test]
    async fn reservation_pulls_stake_through_allowance() {
        let (ledger, guest) = setup();
        let sub = create_sub(&ledger, 5).await;
        let reserve = WriteRequest::CreateReservation {
            sub_vault: sub,
            stake: U256::from(100u64),
            check_in: 0,
            check_out: 86_400,
        };
        let hash = ledger.submit(&reserve).await.unwrap();
        assert!(!ledger.receipt(hash).await.unwrap().unwrap().success);

        ledger
            .submit(&WriteRequest::ApproveSpending {
                spender: sub,
                amount: U256::from(100u64),
            })
            .await
            .unwrap();
        let hash = ledger.submit(&reserve).await.unwrap();
        assert!(ledger.receipt(hash).await.unwrap().unwrap().success);
        assert_eq!(ledger.balance_of(guest), U256::from(900u64));
        assert_eq!(
            ledger.sub_vault_info(sub).await.unwrap().state,
            VaultState::Auction
        );
    }

    #[tokio::test]
    async fn lost_receipt_still_applies_the_write() {
        let (ledger, guest) = setup();
        let sub = create_sub(&ledger, 2).await;
        ledger.inject_fault(
            WriteKind::ApproveSpending,
            FaultTarget::Address(sub),
            FaultEffect::LostReceipt,
        );
        let hash = ledger
            .submit(&WriteRequest::ApproveSpending {
                spender: sub,
                amount: U256::from(7u64),
            })
            .await
            .unwrap();
        assert!(ledger.receipt(hash).await.unwrap().is_none());
        assert_eq!(ledger.allowance(guest, sub).await.unwrap(), U256::from(7u64));
    }

    #[tokio::test]
    async fn range_vaults_cannot_overlap_booked_nights() {
        let (ledger, _) = setup();
        let codec = NightCodec::from_epoch_str("2025-01-01").unwrap();
        let sub = create_sub(&ledger, 3).await;
        ledger
            .submit(&WriteRequest::ApproveSpending {
                spender: sub,
                amount: U256::from(100u64),
            })
            .await
            .unwrap();
        let (check_in, check_out) = codec.night_window(NightNumber(3)).unwrap();
        ledger
            .submit(&WriteRequest::CreateReservation {
                sub_vault: sub,
                stake: U256::from(100u64),
                check_in,
                check_out,
            })
            .await
            .unwrap();

        let (start, _) = codec.night_window(NightNumber(2)).unwrap();
        let (_, end) = codec.night_window(NightNumber(4)).unwrap();
        assert!(!ledger.is_date_range_available("APT-1", start, end).await.unwrap());
        let (start, _) = codec.night_window(NightNumber(4)).unwrap();
        assert!(ledger.is_date_range_available("APT-1", start, end).await.unwrap());
    }

    #[tokio::test]
    async fn injected_revert_keeps_its_reason_and_state() {
        let (ledger, guest) = setup();
        let sub = create_sub(&ledger, 6).await;
        ledger.inject_fault(
            WriteKind::ApproveSpending,
            FaultTarget::Any,
            FaultEffect::Revert("ERC20: paused".into()),
        );
        let hash = ledger
            .submit(&WriteRequest::ApproveSpending {
                spender: sub,
                amount: U256::from(9u64),
            })
            .await
            .unwrap();
        let outcome = ledger.receipt(hash).await.unwrap().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.revert_reason.as_deref(), Some("ERC20: paused"));
        assert_eq!(ledger.allowance(guest, sub).await.unwrap(), U256::ZERO);
        assert_eq!(ledger.writes().len(), 2);
    }

    #[tokio::test]
    async fn settled_vault_cannot_be_ceded_again() {
        let (ledger, guest) = setup();
        let rival = Address::repeat_byte(0x22);
        ledger.mint(rival, U256::from(1_000u64));
        let sub = create_sub(&ledger, 7).await;
        let (check_in, check_out) = ledger.codec.night_window(NightNumber(7)).unwrap();
        for (who, request) in [
            (guest, WriteRequest::ApproveSpending { spender: sub, amount: U256::from(100u64) }),
            (
                guest,
                WriteRequest::CreateReservation {
                    sub_vault: sub,
                    stake: U256::from(100u64),
                    check_in,
                    check_out,
                },
            ),
            (rival, WriteRequest::ApproveSpending { spender: sub, amount: U256::from(300u64) }),
            (rival, WriteRequest::PlaceBid { sub_vault: sub, amount: U256::from(150u64) }),
            (guest, WriteRequest::CheckIn { sub_vault: sub }),
        ] {
            let hash = ledger.view_as(who).submit(&request).await.unwrap();
            assert!(ledger.receipt(hash).await.unwrap().unwrap().success, "{request:?}");
        }

        let hash = ledger
            .submit(&WriteRequest::CedeReservation {
                sub_vault: sub,
                bid_index: 0,
            })
            .await
            .unwrap();
        let outcome = ledger.receipt(hash).await.unwrap().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.revert_reason.as_deref(), Some("InvalidState(2)"));
        assert_eq!(ledger.sub_vault_info(sub).await.unwrap().state, VaultState::Settled);
    }
}
