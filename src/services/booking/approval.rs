// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::format_token_amount;
use crate::domain::error::AppError;
use crate::infrastructure::ledger::{LedgerClient, ReceiptStatus, TxRecord};
use alloy::primitives::{Address, U256};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// Nothing was sent.
    AlreadySufficient { allowance: U256 },
    Approved { tx: TxRecord },
}

impl ApprovalOutcome {
    pub fn tx(&self) -> Option<&TxRecord> {
        match self {
            ApprovalOutcome::AlreadySufficient { .. } => None,
            ApprovalOutcome::Approved { tx } => Some(tx),
        }
    }
}

/// Raises token allowances only when the fresh on-ledger value falls short.
///
/// Allowances are tracked per `(owner, spender)`; every sub-vault is its own
/// spender, so nothing here is cached.
#[derive(Clone)]
pub struct ApprovalGate {
    ledger: LedgerClient,
}

impl ApprovalGate {
    pub fn new(ledger: LedgerClient) -> Self {
        Self { ledger }
    }

    pub async fn ensure_allowance(
        &self,
        owner: Address,
        spender: Address,
        required: U256,
    ) -> Result<ApprovalOutcome, AppError> {
        self.ensure_allowance_into(owner, spender, required, &mut Vec::new())
            .await
    }

    /// Like [`Self::ensure_allowance`], but pushes any confirmed or timed-out
    /// approval onto `trail` before the outcome is decided.
    pub async fn ensure_allowance_into(
        &self,
        owner: Address,
        spender: Address,
        required: U256,
        trail: &mut Vec<TxRecord>,
    ) -> Result<ApprovalOutcome, AppError> {
        if spender == Address::ZERO {
            return Err(AppError::invalid_input("spender", "zero address"));
        }
        if owner != self.ledger.signer() {
            return Err(AppError::AuthorizationFailure {
                action: format!("approve spending on behalf of {owner:#x}"),
                caller: format!("{:#x}", self.ledger.signer()),
            });
        }

        // Checked even when the allowance already covers `required`.
        let balance = self.ledger.balance(owner).await?;
        if balance < required {
            return Err(AppError::InsufficientFunds {
                required: format_token_amount(required),
                available: format_token_amount(balance),
            });
        }

        let current = self.ledger.allowance(owner, spender).await?;
        if current >= required {
            tracing::debug!(
                target: "approval",
                spender = %format!("{spender:#x}"),
                allowance = %format_token_amount(current),
                required = %format_token_amount(required),
                "Allowance already covers spend"
            );
            return Ok(ApprovalOutcome::AlreadySufficient { allowance: current });
        }

        let spender_label = format!("{spender:#x}");
        let pending = self
            .ledger
            .approve_spending(spender, required)
            .await
            .map_err(|e| AppError::ApprovalFailure {
                spender: spender_label.clone(),
                reason: e.to_string(),
            })?;
        let tx = self.ledger.confirm(pending).await?;
        trail.push(tx.clone());

        match tx.status {
            ReceiptStatus::ConfirmedSuccess => {
                tracing::info!(
                    target: "approval",
                    spender = %spender_label,
                    amount = %format_token_amount(required),
                    hash = %format!("{:#x}", tx.hash),
                    "Allowance raised"
                );
                Ok(ApprovalOutcome::Approved { tx })
            }
            ReceiptStatus::ConfirmedRevert => Err(AppError::ApprovalFailure {
                spender: spender_label,
                reason: tx.failure_reason(),
            }),
            ReceiptStatus::UnknownTimeout => {
                // The approval may still have landed; trust the ledger, not the timeout.
                let observed = self.ledger.allowance(owner, spender).await?;
                if observed >= required {
                    tracing::info!(
                        target: "approval",
                        spender = %spender_label,
                        hash = %format!("{:#x}", tx.hash),
                        "Approval landed despite receipt timeout"
                    );
                    Ok(ApprovalOutcome::Approved { tx })
                } else {
                    Err(AppError::ApprovalFailure {
                        spender: spender_label,
                        reason: tx.failure_reason(),
                    })
                }
            }
        }
    }
}
