// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::retry::retry_async;
use crate::domain::constants::{
    DEFAULT_READ_CACHE_TTL_MS, DEFAULT_READ_RETRY_ATTEMPTS, DEFAULT_RECEIPT_CONFIRM_BLOCKS,
    DEFAULT_RECEIPT_POLL_MS, DEFAULT_RECEIPT_TIMEOUT_MS, MIN_RECEIPT_POLL_MS,
    READ_RETRY_INITIAL_DELAY_MS,
};
use crate::domain::error::AppError;
use crate::domain::vault::{Bid, ParentVault, Reservation, SubVault, SubVaultKey};
use crate::infrastructure::ledger::backend::{LedgerBackend, WriteKind, WriteRequest};
use alloy::primitives::{Address, B256, U256};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Receipt, cache and retry policy for one ledger connection.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub receipt_poll_ms: u64,
    pub receipt_timeout_ms: u64,
    pub receipt_confirm_blocks: u64,
    pub read_cache_ttl_ms: u64,
    pub read_retry_attempts: usize,
    pub read_retry_delay_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            receipt_poll_ms: DEFAULT_RECEIPT_POLL_MS,
            receipt_timeout_ms: DEFAULT_RECEIPT_TIMEOUT_MS,
            receipt_confirm_blocks: DEFAULT_RECEIPT_CONFIRM_BLOCKS,
            read_cache_ttl_ms: DEFAULT_READ_CACHE_TTL_MS,
            read_retry_attempts: DEFAULT_READ_RETRY_ATTEMPTS,
            read_retry_delay_ms: READ_RETRY_INITIAL_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    ConfirmedSuccess,
    ConfirmedRevert,
    UnknownTimeout,
}

/// Audit record of one write, kept by the callers for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxRecord {
    pub hash: B256,
    pub action: WriteKind,
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
    pub revert_reason: Option<String>,
}

impl TxRecord {
    pub fn succeeded(&self) -> bool {
        self.status == ReceiptStatus::ConfirmedSuccess
    }

    pub fn failure_reason(&self) -> String {
        match self.status {
            ReceiptStatus::ConfirmedSuccess => "confirmed".to_string(),
            ReceiptStatus::ConfirmedRevert => self
                .revert_reason
                .clone()
                .unwrap_or_else(|| "reverted".to_string()),
            ReceiptStatus::UnknownTimeout => {
                format!("no receipt for {:#x} before timeout", self.hash)
            }
        }
    }
}

/// A broadcast write. Holds the signer's write lane until confirmed.
#[derive(Debug)]
pub struct PendingTx {
    pub hash: B256,
    pub action: WriteKind,
    _lane: OwnedMutexGuard<()>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Vault(String),
    SubVault(Address),
}

#[derive(Debug, Clone)]
enum Cached {
    Vault(Option<ParentVault>),
    SubVault(SubVault),
}

#[derive(Debug)]
struct ReadCache {
    ttl: Duration,
    entries: DashMap<CacheKey, (Instant, Cached)>,
}

impl ReadCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<Cached> {
        if self.ttl.is_zero() {
            return None;
        }
        let hit = self.entries.get(key).and_then(|entry| {
            let (stored, value) = entry.value();
            (stored.elapsed() < self.ttl).then(|| value.clone())
        });
        if hit.is_none() {
            self.entries.remove(key);
        }
        hit
    }

    fn put(&self, key: CacheKey, value: Cached) {
        if !self.ttl.is_zero() {
            self.entries.insert(key, (Instant::now(), value));
        }
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

/// Typed facade over a [`LedgerBackend`].
///
/// Reads are retried on connection errors and, for parent-vault and
/// sub-vault records only, cached for a short TTL. Writes of one client go
/// through a single lane: a second write cannot be submitted before the
/// previous [`PendingTx`] is confirmed or dropped.
#[derive(Clone)]
pub struct LedgerClient {
    backend: Arc<dyn LedgerBackend>,
    config: LedgerConfig,
    cache: Arc<ReadCache>,
    write_lane: Arc<Mutex<()>>,
}

impl LedgerClient {
    pub fn new(backend: Arc<dyn LedgerBackend>, config: LedgerConfig) -> Self {
        let ttl = Duration::from_millis(config.read_cache_ttl_ms);
        Self {
            backend,
            config,
            cache: Arc::new(ReadCache::new(ttl)),
            write_lane: Arc::new(Mutex::new(())),
        }
    }

    pub fn signer(&self) -> Address {
        self.backend.signer()
    }

    async fn read<T, F, Fut>(&self, op: F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let delay = Duration::from_millis(self.config.read_retry_delay_ms);
        // Only transport failures are retried; anything else is final.
        let outcome = retry_async(
            |_| {
                let fut = op();
                async move {
                    match fut.await {
                        Err(AppError::Connection(msg)) => Err(AppError::Connection(msg)),
                        other => Ok(other),
                    }
                }
            },
            self.config.read_retry_attempts.max(1),
            delay,
        )
        .await?;
        outcome
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub async fn all_vault_ids(&self) -> Result<Vec<String>, AppError> {
        self.read(|| self.backend.all_vault_ids()).await
    }

    pub async fn vault_info(&self, vault_id: &str) -> Result<Option<ParentVault>, AppError> {
        let key = CacheKey::Vault(vault_id.to_string());
        if let Some(Cached::Vault(hit)) = self.cache.get(&key) {
            return Ok(hit);
        }
        let info = self.read(|| self.backend.vault_info(vault_id)).await?;
        self.cache.put(key, Cached::Vault(info.clone()));
        Ok(info)
    }

    /// Like [`vault_info`](Self::vault_info) but a missing vault is an input error.
    pub async fn require_vault(&self, vault_id: &str) -> Result<ParentVault, AppError> {
        self.vault_info(vault_id).await?.ok_or_else(|| {
            AppError::invalid_input("vault_id", format!("vault {vault_id:?} does not exist"))
        })
    }

    pub async fn vault_address(&self, vault_id: &str) -> Result<Option<Address>, AppError> {
        self.read(|| self.backend.vault_address(vault_id)).await
    }

    pub async fn sub_vault_address(
        &self,
        vault_id: &str,
        key: &SubVaultKey,
    ) -> Result<Option<Address>, AppError> {
        let addr = self
            .read(|| self.backend.sub_vault_address(vault_id, key))
            .await?;
        Ok(addr.filter(|a| *a != Address::ZERO))
    }

    pub async fn sub_vault_info(&self, sub_vault: Address) -> Result<SubVault, AppError> {
        let key = CacheKey::SubVault(sub_vault);
        if let Some(Cached::SubVault(hit)) = self.cache.get(&key) {
            return Ok(hit);
        }
        let info = self.read(|| self.backend.sub_vault_info(sub_vault)).await?;
        self.cache.put(key, Cached::SubVault(info.clone()));
        Ok(info)
    }

    /// Uncached read for decisions that gate a write. Refreshes the cache.
    pub async fn sub_vault_info_fresh(&self, sub_vault: Address) -> Result<SubVault, AppError> {
        let info = self.read(|| self.backend.sub_vault_info(sub_vault)).await?;
        self.cache
            .put(CacheKey::SubVault(sub_vault), Cached::SubVault(info.clone()));
        Ok(info)
    }

    pub async fn sub_vaults(&self, vault_id: &str) -> Result<Vec<SubVault>, AppError> {
        let subs = self.read(|| self.backend.sub_vaults(vault_id)).await?;
        for sub in &subs {
            self.cache
                .put(CacheKey::SubVault(sub.address), Cached::SubVault(sub.clone()));
        }
        Ok(subs)
    }

    pub async fn is_date_range_available(
        &self,
        vault_id: &str,
        check_in: u64,
        check_out: u64,
    ) -> Result<bool, AppError> {
        self.read(|| {
            self.backend
                .is_date_range_available(vault_id, check_in, check_out)
        })
        .await
    }

    pub async fn current_reservation(
        &self,
        sub_vault: Address,
    ) -> Result<Option<Reservation>, AppError> {
        let reservation = self
            .read(|| self.backend.current_reservation(sub_vault))
            .await?;
        Ok(reservation.filter(|r| r.is_active && r.booker != Address::ZERO))
    }

    pub async fn auction_bids(&self, sub_vault: Address) -> Result<Vec<Bid>, AppError> {
        self.read(|| self.backend.auction_bids(sub_vault)).await
    }

    /// Always a fresh read.
    pub async fn allowance(&self, owner: Address, spender: Address) -> Result<U256, AppError> {
        self.read(|| self.backend.allowance(owner, spender)).await
    }

    pub async fn balance(&self, owner: Address) -> Result<U256, AppError> {
        self.read(|| self.backend.balance(owner)).await
    }

    pub async fn master_access_code(&self, vault: Address) -> Result<String, AppError> {
        self.read(|| self.backend.master_access_code(vault)).await
    }

    pub async fn current_access_code(&self, sub_vault: Address) -> Result<String, AppError> {
        self.read(|| self.backend.current_access_code(sub_vault))
            .await
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Broadcast one write. Waits for the lane if another write is in flight.
    pub async fn submit(&self, request: WriteRequest) -> Result<PendingTx, AppError> {
        let lane = Arc::clone(&self.write_lane).lock_owned().await;
        let action = request.kind();
        tracing::info!(
            target: "ledger",
            action = %action,
            request = ?request,
            signer = %format!("{:#x}", self.signer()),
            "Submitting transaction"
        );
        let hash = self.backend.submit(&request).await?;
        tracing::debug!(
            target: "ledger",
            action = %action,
            hash = %format!("{:#x}", hash),
            "Transaction broadcast"
        );
        Ok(PendingTx {
            hash,
            action,
            _lane: lane,
        })
    }

    /// Wait for the receipt of `pending` and release the write lane.
    ///
    /// A timeout yields [`ReceiptStatus::UnknownTimeout`]; the write is never
    /// resubmitted here. Callers re-read ledger state to learn what happened.
    pub async fn confirm(&self, pending: PendingTx) -> Result<TxRecord, AppError> {
        let (status, block_number, revert_reason) = self.await_receipt(&pending.hash).await?;
        // Any mined write may have changed vault records.
        self.cache.clear();
        let record = TxRecord {
            hash: pending.hash,
            action: pending.action,
            status,
            block_number,
            revert_reason,
        };
        match status {
            ReceiptStatus::ConfirmedSuccess => tracing::info!(
                target: "ledger",
                action = %record.action,
                hash = %format!("{:#x}", record.hash),
                block = ?record.block_number,
                "Transaction confirmed"
            ),
            ReceiptStatus::ConfirmedRevert => tracing::warn!(
                target: "ledger",
                action = %record.action,
                hash = %format!("{:#x}", record.hash),
                reason = record.revert_reason.as_deref().unwrap_or("unknown"),
                "Transaction reverted"
            ),
            ReceiptStatus::UnknownTimeout => tracing::warn!(
                target: "ledger",
                action = %record.action,
                hash = %format!("{:#x}", record.hash),
                timeout_ms = self.config.receipt_timeout_ms,
                "Receipt wait timed out"
            ),
        }
        drop(pending);
        Ok(record)
    }

    /// Submit and confirm in one go.
    pub async fn execute(&self, request: WriteRequest) -> Result<TxRecord, AppError> {
        let pending = self.submit(request).await?;
        self.confirm(pending).await
    }

    fn receipt_is_confirmed(current_head: u64, receipt_block: u64, confirm_blocks: u64) -> bool {
        let needed_head = receipt_block.saturating_add(confirm_blocks.saturating_sub(1));
        current_head >= needed_head
    }

    async fn await_receipt(
        &self,
        hash: &B256,
    ) -> Result<(ReceiptStatus, Option<u64>, Option<String>), AppError> {
        let timeout = Duration::from_millis(self.config.receipt_timeout_ms.max(1));
        let poll = Duration::from_millis(self.config.receipt_poll_ms.max(MIN_RECEIPT_POLL_MS));
        let confirm_blocks = self.config.receipt_confirm_blocks.max(1);
        let started = Instant::now();

        loop {
            match self.backend.receipt(*hash).await {
                Ok(Some(outcome)) => {
                    if !outcome.success {
                        return Ok((
                            ReceiptStatus::ConfirmedRevert,
                            outcome.block_number,
                            outcome.revert_reason,
                        ));
                    }
                    let Some(receipt_block) = outcome.block_number else {
                        return Ok((ReceiptStatus::ConfirmedSuccess, None, None));
                    };
                    let head = match self.backend.block_number().await {
                        Ok(head) => head,
                        Err(e) => {
                            tracing::debug!(target: "ledger", error = %e, "Head lookup failed");
                            0
                        }
                    };
                    if Self::receipt_is_confirmed(
                        head.max(receipt_block),
                        receipt_block,
                        confirm_blocks,
                    ) {
                        return Ok((ReceiptStatus::ConfirmedSuccess, Some(receipt_block), None));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        target: "ledger",
                        error = %e,
                        hash = %format!("{:#x}", hash),
                        "Receipt lookup error; retrying"
                    );
                }
            }

            if started.elapsed() >= timeout {
                break;
            }
            tokio::time::sleep(poll).await;
        }

        Ok((ReceiptStatus::UnknownTimeout, None, None))
    }

    // Typed write helpers, one per contract call.

    pub async fn create_vault(
        &self,
        vault_id: &str,
        property_details: &str,
        daily_base_price: U256,
        master_access_code: &str,
    ) -> Result<PendingTx, AppError> {
        self.submit(WriteRequest::CreateVault {
            vault_id: vault_id.to_string(),
            property_details: property_details.to_string(),
            daily_base_price,
            master_access_code: master_access_code.to_string(),
        })
        .await
    }

    pub async fn resolve_or_create_sub_vault(
        &self,
        vault_id: &str,
        key: SubVaultKey,
        master_access_code: &str,
    ) -> Result<PendingTx, AppError> {
        self.submit(WriteRequest::CreateSubVault {
            vault_id: vault_id.to_string(),
            key,
            master_access_code: master_access_code.to_string(),
        })
        .await
    }

    pub async fn approve_spending(
        &self,
        spender: Address,
        amount: U256,
    ) -> Result<PendingTx, AppError> {
        self.submit(WriteRequest::ApproveSpending { spender, amount })
            .await
    }

    pub async fn create_reservation(
        &self,
        sub_vault: Address,
        stake: U256,
        check_in: u64,
        check_out: u64,
    ) -> Result<PendingTx, AppError> {
        self.submit(WriteRequest::CreateReservation {
            sub_vault,
            stake,
            check_in,
            check_out,
        })
        .await
    }

    pub async fn place_bid(&self, sub_vault: Address, amount: U256) -> Result<PendingTx, AppError> {
        self.submit(WriteRequest::PlaceBid { sub_vault, amount })
            .await
    }

    pub async fn cede_reservation(
        &self,
        sub_vault: Address,
        bid_index: u64,
    ) -> Result<PendingTx, AppError> {
        self.submit(WriteRequest::CedeReservation {
            sub_vault,
            bid_index,
        })
        .await
    }

    pub async fn withdraw_bid(
        &self,
        sub_vault: Address,
        bid_index: u64,
    ) -> Result<PendingTx, AppError> {
        self.submit(WriteRequest::WithdrawBid {
            sub_vault,
            bid_index,
        })
        .await
    }

    pub async fn check_in(&self, sub_vault: Address) -> Result<PendingTx, AppError> {
        self.submit(WriteRequest::CheckIn { sub_vault }).await
    }

    pub async fn check_out(&self, sub_vault: Address) -> Result<PendingTx, AppError> {
        self.submit(WriteRequest::CheckOut { sub_vault }).await
    }

    pub async fn cancel_reservation(&self, sub_vault: Address) -> Result<PendingTx, AppError> {
        self.submit(WriteRequest::CancelReservation { sub_vault })
            .await
    }

    pub async fn update_master_access_code(
        &self,
        vault: Address,
        new_code: &str,
    ) -> Result<PendingTx, AppError> {
        self.submit(WriteRequest::UpdateMasterAccessCode {
            vault,
            new_code: new_code.to_string(),
        })
        .await
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> LedgerConfig {
    LedgerConfig {
        receipt_poll_ms: MIN_RECEIPT_POLL_MS,
        receipt_timeout_ms: 250,
        read_retry_delay_ms: 1,
        ..LedgerConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::night::NightCodec;
    use crate::domain::vault::{NightNumber, VaultState};
    use crate::infrastructure::ledger::memory::{FaultEffect, FaultTarget, InMemoryLedger};

    fn client() -> (LedgerClient, InMemoryLedger) {
        let codec = NightCodec::from_epoch_str("2025-01-01").unwrap();
        let ledger = InMemoryLedger::new(codec, Address::repeat_byte(0x11));
        ledger.seed_vault(
            Address::repeat_byte(0x0a),
            "APT-1",
            "flat",
            U256::from(100u64),
            "code",
        );
        let client = LedgerClient::new(Arc::new(ledger.clone()), test_config());
        (client, ledger)
    }

    #[test]
    fn confirmation_depth_counts_the_receipt_block() {
        assert!(LedgerClient::receipt_is_confirmed(10, 10, 1));
        assert!(!LedgerClient::receipt_is_confirmed(10, 10, 2));
        assert!(LedgerClient::receipt_is_confirmed(11, 10, 2));
    }

    #[tokio::test]
    async fn confirmed_write_invalidates_cached_records() {
        let (client, _ledger) = client();
        let key = SubVaultKey::Night(NightNumber(4));
        let record = client
            .execute(WriteRequest::CreateSubVault {
                vault_id: "APT-1".into(),
                key,
                master_access_code: "code".into(),
            })
            .await
            .unwrap();
        assert!(record.succeeded());
        let sub = client
            .sub_vault_address("APT-1", &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(client.sub_vault_info(sub).await.unwrap().state, VaultState::Free);

        client
            .execute(WriteRequest::ApproveSpending {
                spender: sub,
                amount: U256::from(100u64),
            })
            .await
            .unwrap();
        assert!(client.cache.get(&CacheKey::SubVault(sub)).is_none());
    }

    #[tokio::test]
    async fn fresh_read_bypasses_a_stale_cache_entry() {
        let (client, ledger) = client();
        let key = SubVaultKey::Night(NightNumber(6));
        client
            .execute(WriteRequest::CreateSubVault {
                vault_id: "APT-1".into(),
                key,
                master_access_code: "code".into(),
            })
            .await
            .unwrap();
        let sub = client.sub_vault_address("APT-1", &key).await.unwrap().unwrap();
        assert_eq!(client.sub_vault_info(sub).await.unwrap().state, VaultState::Free);

        // Another signer reserves; this client's cache does not hear about it.
        let other = Address::repeat_byte(0x44);
        ledger.mint(other, U256::from(100u64));
        let rival = LedgerClient::new(Arc::new(ledger.view_as(other)), test_config());
        rival
            .execute(WriteRequest::ApproveSpending {
                spender: sub,
                amount: U256::from(100u64),
            })
            .await
            .unwrap();
        let codec = NightCodec::from_epoch_str("2025-01-01").unwrap();
        let (check_in, check_out) = codec.night_window(NightNumber(6)).unwrap();
        rival
            .execute(WriteRequest::CreateReservation {
                sub_vault: sub,
                stake: U256::from(100u64),
                check_in,
                check_out,
            })
            .await
            .unwrap();

        assert_eq!(client.sub_vault_info(sub).await.unwrap().state, VaultState::Free);
        assert_eq!(
            client.sub_vault_info_fresh(sub).await.unwrap().state,
            VaultState::Auction
        );
        assert_eq!(client.sub_vault_info(sub).await.unwrap().state, VaultState::Auction);
    }

    #[tokio::test]
    async fn lost_receipt_times_out_without_resubmitting() {
        let (client, ledger) = client();
        ledger.inject_fault(WriteKind::ApproveSpending, FaultTarget::Any, FaultEffect::LostReceipt);
        let record = client
            .execute(WriteRequest::ApproveSpending {
                spender: Address::repeat_byte(0x22),
                amount: U256::from(5u64),
            })
            .await
            .unwrap();
        assert_eq!(record.status, ReceiptStatus::UnknownTimeout);
        assert_eq!(ledger.write_count(WriteKind::ApproveSpending), 1);
    }

    #[tokio::test]
    async fn write_lane_serializes_submissions() {
        let (client, _ledger) = client();
        let first = client
            .approve_spending(Address::repeat_byte(0x22), U256::from(1u64))
            .await
            .unwrap();
        let second = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .approve_spending(Address::repeat_byte(0x23), U256::from(1u64))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());
        client.confirm(first).await.unwrap();
        let second = second.await.unwrap().unwrap();
        assert!(client.confirm(second).await.unwrap().succeeded());
    }
}
