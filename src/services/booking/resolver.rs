// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use crate::domain::vault::SubVaultKey;
use crate::infrastructure::ledger::{LedgerClient, TxRecord};
use alloy::primitives::Address;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub address: Address,
    /// True when this call issued the creation write.
    pub created: bool,
    pub tx: Option<TxRecord>,
}

/// Get-or-create for sub-vaults.
///
/// The address is always read back after a creation write, so two racing
/// resolutions for one key settle on the same address and only the first
/// one writes.
#[derive(Clone)]
pub struct VaultResolver {
    ledger: LedgerClient,
    in_flight: Arc<DashMap<(String, SubVaultKey), Arc<Mutex<()>>>>,
}

impl VaultResolver {
    pub fn new(ledger: LedgerClient) -> Self {
        Self {
            ledger,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub async fn resolve(
        &self,
        vault_id: &str,
        key: SubVaultKey,
        master_access_code: &str,
    ) -> Result<Resolution, AppError> {
        self.resolve_into(vault_id, key, master_access_code, &mut Vec::new())
            .await
    }

    /// Like [`Self::resolve`], but pushes the creation write onto `trail` as
    /// soon as its receipt settles, whether or not the read-back succeeds.
    pub async fn resolve_into(
        &self,
        vault_id: &str,
        key: SubVaultKey,
        master_access_code: &str,
        trail: &mut Vec<TxRecord>,
    ) -> Result<Resolution, AppError> {
        if vault_id.trim().is_empty() {
            return Err(AppError::invalid_input("vault_id", "must not be empty"));
        }
        let slot_key = (vault_id.to_string(), key);
        let slot = self
            .in_flight
            .entry(slot_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = slot.lock().await;
            self.resolve_locked(vault_id, key, master_access_code, trail)
                .await
        };
        drop(slot);
        // Last holder out removes the slot.
        self.in_flight
            .remove_if(&slot_key, |_, held| Arc::strong_count(held) == 1);
        result
    }

    async fn resolve_locked(
        &self,
        vault_id: &str,
        key: SubVaultKey,
        master_access_code: &str,
        trail: &mut Vec<TxRecord>,
    ) -> Result<Resolution, AppError> {
        if let Some(address) = self.ledger.sub_vault_address(vault_id, &key).await? {
            tracing::debug!(
                target: "resolver",
                vault_id,
                key = %key,
                address = %format!("{address:#x}"),
                "Sub-vault already exists"
            );
            return Ok(Resolution {
                address,
                created: false,
                tx: None,
            });
        }

        let failure = |reason: String| AppError::ResolutionFailure {
            vault_id: vault_id.to_string(),
            key: key.to_string(),
            reason,
        };

        if master_access_code.is_empty() {
            return Err(failure("master access code is required to create a sub-vault".into()));
        }

        tracing::info!(target: "resolver", vault_id, key = %key, "Creating sub-vault");
        let pending = self
            .ledger
            .resolve_or_create_sub_vault(vault_id, key, master_access_code)
            .await
            .map_err(|e| failure(e.to_string()))?;
        let tx = self.ledger.confirm(pending).await?;
        trail.push(tx.clone());

        // Read back even on revert or timeout: a racing creator may have won.
        match self.ledger.sub_vault_address(vault_id, &key).await? {
            Some(address) => Ok(Resolution {
                address,
                created: tx.succeeded(),
                tx: Some(tx),
            }),
            None => Err(failure(tx.failure_reason())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::night::NightCodec;
    use crate::domain::vault::NightNumber;
    use crate::infrastructure::ledger::client::test_config;
    use crate::infrastructure::ledger::{FaultEffect, FaultTarget, InMemoryLedger, WriteKind};
    use alloy::primitives::U256;

    fn resolver() -> (VaultResolver, InMemoryLedger) {
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
        (VaultResolver::new(client), ledger)
    }

    #[tokio::test]
    async fn repeated_resolution_creates_once() {
        let (resolver, ledger) = resolver();
        let key = SubVaultKey::Night(NightNumber(12));
        let first = resolver.resolve("APT-1", key, "code").await.unwrap();
        let second = resolver.resolve("APT-1", key, "code").await.unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.address, second.address);
        assert_eq!(ledger.write_count(WriteKind::CreateSubVault), 1);
    }

    #[tokio::test]
    async fn concurrent_resolution_converges() {
        let (resolver, ledger) = resolver();
        let key = SubVaultKey::Night(NightNumber(3));
        let (a, b) = tokio::join!(
            resolver.resolve("APT-1", key, "code"),
            resolver.resolve("APT-1", key, "code")
        );
        assert_eq!(a.unwrap().address, b.unwrap().address);
        assert_eq!(ledger.write_count(WriteKind::CreateSubVault), 1);
    }

    #[tokio::test]
    async fn bad_master_code_names_the_unit() {
        let (resolver, _) = resolver();
        let err = resolver
            .resolve("APT-1", SubVaultKey::Night(NightNumber(9)), "wrong")
            .await
            .unwrap_err();
        match err {
            AppError::ResolutionFailure { key, reason, .. } => {
                assert_eq!(key, "night#9");
                assert!(reason.contains("InvalidAccessCode"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn lost_creation_receipt_still_resolves() {
        let (resolver, ledger) = resolver();
        let key = SubVaultKey::Night(NightNumber(20));
        ledger.inject_fault(WriteKind::CreateSubVault, FaultTarget::Key(key), FaultEffect::LostReceipt);
        let res = resolver.resolve("APT-1", key, "code").await.unwrap();
        assert!(!res.created);
        assert_eq!(ledger.write_count(WriteKind::CreateSubVault), 1);
        assert_eq!(ledger.sub_vault_count(), 1);
    }

    #[tokio::test]
    async fn in_flight_slots_are_released() {
        let (resolver, _) = resolver();
        let a = SubVaultKey::Night(NightNumber(30));
        let b = SubVaultKey::Night(NightNumber(31));
        let (x, y) = tokio::join!(
            resolver.resolve("APT-1", a, "code"),
            resolver.resolve("APT-1", a, "code")
        );
        x.unwrap();
        y.unwrap();
        resolver.resolve("APT-1", b, "code").await.unwrap();
        resolver.resolve("APT-1", b, "wrong-but-existing").await.unwrap();
        assert!(resolver.in_flight.is_empty());
    }

    #[tokio::test]
    async fn reverted_creation_is_recorded_in_the_trail() {
        let (resolver, ledger) = resolver();
        let key = SubVaultKey::Night(NightNumber(40));
        ledger.inject_fault(
            WriteKind::CreateSubVault,
            FaultTarget::Key(key),
            FaultEffect::Revert("Paused()".into()),
        );
        let mut trail = Vec::new();
        let err = resolver
            .resolve_into("APT-1", key, "code", &mut trail)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ResolutionFailure { .. }));
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].hash, ledger.writes()[0].hash);
        assert!(resolver.in_flight.is_empty());
    }
}
