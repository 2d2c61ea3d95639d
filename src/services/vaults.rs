// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::format_token_amount;
use crate::domain::error::AppError;
use crate::domain::vault::ParentVault;
use crate::infrastructure::ledger::{LedgerClient, TxRecord};
use alloy::primitives::U256;
use futures::future::try_join_all;

/// Owner-side operations on parent vaults.
#[derive(Clone)]
pub struct VaultAdmin {
    ledger: LedgerClient,
}

impl VaultAdmin {
    pub fn new(ledger: LedgerClient) -> Self {
        Self { ledger }
    }

    pub async fn list(&self) -> Result<Vec<ParentVault>, AppError> {
        let ids = self.ledger.all_vault_ids().await?;
        // Reads may run concurrently; only writes share the lane.
        let infos = try_join_all(ids.iter().map(|id| self.ledger.vault_info(id))).await?;
        Ok(infos.into_iter().flatten().collect())
    }

    pub async fn create_vault(
        &self,
        vault_id: &str,
        property_details: &str,
        daily_base_price: U256,
        master_access_code: &str,
    ) -> Result<ParentVault, AppError> {
        if vault_id.trim().is_empty() {
            return Err(AppError::invalid_input("vault_id", "must not be empty"));
        }
        if daily_base_price.is_zero() {
            return Err(AppError::invalid_input("daily_base_price", "must be positive"));
        }
        if master_access_code.is_empty() {
            return Err(AppError::invalid_input("master_access_code", "must not be empty"));
        }
        if self.ledger.vault_info(vault_id).await?.is_some() {
            return Err(AppError::invalid_input(
                "vault_id",
                format!("{vault_id:?} already exists"),
            ));
        }

        let pending = self
            .ledger
            .create_vault(vault_id, property_details, daily_base_price, master_access_code)
            .await?;
        let tx = self.ledger.confirm(pending).await?;
        // Timeouts fall through to the read below.
        if let Some(vault) = self.ledger.vault_info(vault_id).await? {
            tracing::info!(
                target: "ledger",
                vault_id,
                price = %format_token_amount(daily_base_price),
                address = %format!("{:#x}", vault.address),
                "Vault created"
            );
            return Ok(vault);
        }
        Err(AppError::Transaction {
            hash: format!("{:#x}", tx.hash),
            reason: tx.failure_reason(),
        })
    }

    pub async fn update_master_access_code(
        &self,
        vault_id: &str,
        new_code: &str,
    ) -> Result<TxRecord, AppError> {
        if new_code.is_empty() {
            return Err(AppError::invalid_input("new_code", "must not be empty"));
        }
        let vault = self.ledger.require_vault(vault_id).await?;
        let signer = self.ledger.signer();
        if vault.owner != signer {
            return Err(AppError::AuthorizationFailure {
                action: format!("update the master code of {vault_id}"),
                caller: format!("{signer:#x}"),
            });
        }
        let pending = self
            .ledger
            .update_master_access_code(vault.address, new_code)
            .await?;
        let tx = self.ledger.confirm(pending).await?;
        if !tx.succeeded() {
            return Err(AppError::Transaction {
                hash: format!("{:#x}", tx.hash),
                reason: tx.failure_reason(),
            });
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::night::NightCodec;
    use crate::domain::vault::{NightNumber, SubVaultKey};
    use crate::infrastructure::ledger::client::test_config;
    use crate::infrastructure::ledger::{InMemoryLedger, WriteKind};
    use crate::services::booking::VaultResolver;
    use alloy::primitives::Address;
    use std::sync::Arc;

    const OWNER: Address = Address::repeat_byte(0x0a);

    fn admin(signer: Address, ledger: &InMemoryLedger) -> VaultAdmin {
        VaultAdmin::new(LedgerClient::new(Arc::new(ledger.view_as(signer)), test_config()))
    }

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new(NightCodec::from_epoch_str("2025-01-01").unwrap(), OWNER)
    }

    #[tokio::test]
    async fn create_validates_before_writing() {
        let ledger = ledger();
        let admin = admin(OWNER, &ledger);
        assert!(admin.create_vault("", "x", U256::from(1u64), "c").await.is_err());
        assert!(admin.create_vault("A", "x", U256::ZERO, "c").await.is_err());
        assert!(admin.create_vault("A", "x", U256::from(1u64), "").await.is_err());
        assert_eq!(ledger.write_count(WriteKind::CreateVault), 0);

        let vault = admin
            .create_vault("APT-9", "loft", U256::from(5u64), "c")
            .await
            .unwrap();
        assert_eq!(vault.owner, OWNER);
        assert_eq!(admin.list().await.unwrap().len(), 1);
        assert!(admin.create_vault("APT-9", "loft", U256::from(5u64), "c").await.is_err());
    }

    #[tokio::test]
    async fn new_master_code_gates_sub_vault_creation() {
        let ledger = ledger();
        let owner = admin(OWNER, &ledger);
        owner
            .create_vault("APT-1", "flat", U256::from(5u64), "old")
            .await
            .unwrap();

        let stranger = admin(Address::repeat_byte(0x33), &ledger);
        let err = stranger
            .update_master_access_code("APT-1", "new")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthorizationFailure { .. }));

        owner.update_master_access_code("APT-1", "new").await.unwrap();
        let resolver = VaultResolver::new(LedgerClient::new(Arc::new(ledger.clone()), test_config()));
        let key = SubVaultKey::Night(NightNumber(1));
        assert!(resolver.resolve("APT-1", key, "old").await.is_err());
        assert!(resolver.resolve("APT-1", key, "new").await.is_ok());
    }
}
