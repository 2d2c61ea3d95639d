// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

//! Bid placement and the booker/bidder actions on a sub-vault in auction.
//!
//! Index-based actions (`cede`, `withdraw`) take the bid the caller saw and
//! refetch the live bid list first; if the slot no longer holds that bid the
//! action fails with `StaleReference` instead of hitting the wrong bid.

use crate::common::parsing::format_token_amount;
use crate::domain::error::{AppError, RevertSite};
use crate::domain::vault::{Bid, RankedBid, Reservation, SubVault, VaultState, rank_bids};
use crate::infrastructure::ledger::{LedgerClient, PendingTx, ReceiptStatus, TxRecord};
use crate::services::booking::approval::ApprovalGate;
use alloy::primitives::{Address, U256};
use serde::Serialize;

/// Snapshot of one sub-vault's auction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuctionView {
    pub sub_vault: SubVault,
    pub reservation: Option<Reservation>,
    pub bids: Vec<Bid>,
    pub ranked: Vec<RankedBid>,
}

impl AuctionView {
    pub fn highest_bid(&self) -> Option<&RankedBid> {
        self.ranked.first()
    }

    pub fn current_stake(&self) -> Option<U256> {
        self.reservation.as_ref().map(|r| r.stake_amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BidReceipt {
    pub approval: Option<TxRecord>,
    pub bid: TxRecord,
}

#[derive(Clone)]
pub struct AuctionCoordinator {
    ledger: LedgerClient,
    gate: ApprovalGate,
}

impl AuctionCoordinator {
    pub fn new(ledger: LedgerClient) -> Self {
        Self {
            gate: ApprovalGate::new(ledger.clone()),
            ledger,
        }
    }

    pub async fn load(&self, sub_vault: Address) -> Result<AuctionView, AppError> {
        let info = self.ledger.sub_vault_info(sub_vault).await?;
        let reservation = self.ledger.current_reservation(sub_vault).await?;
        let bids = self.ledger.auction_bids(sub_vault).await?;
        let ranked = rank_bids(&bids);
        Ok(AuctionView {
            sub_vault: info,
            reservation,
            bids,
            ranked,
        })
    }

    /// Bid on the auction shown in `view`.
    ///
    /// Amounts at or below the current stake are refused without touching
    /// the ledger.
    pub async fn place_bid(&self, view: &AuctionView, amount: U256) -> Result<BidReceipt, AppError> {
        let sub_vault = view.sub_vault.address;
        let stake = view.current_stake().ok_or_else(|| {
            AppError::invalid_input("sub_vault", format!("{sub_vault:#x} has no reservation to bid on"))
        })?;
        if amount <= stake {
            return Err(AppError::invalid_input(
                "amount",
                format!(
                    "bid {} must exceed the current stake {}",
                    format_token_amount(amount),
                    format_token_amount(stake)
                ),
            ));
        }
        if view.sub_vault.state != VaultState::Auction {
            return Err(AppError::invalid_input(
                "sub_vault",
                format!("{sub_vault:#x} is {:?}, not in auction", view.sub_vault.state),
            ));
        }
        let signer = self.ledger.signer();
        if view.reservation.as_ref().is_some_and(|r| r.booker == signer) {
            return Err(AppError::AuthorizationFailure {
                action: "bid on own reservation".to_string(),
                caller: format!("{signer:#x}"),
            });
        }

        let approval = self.gate.ensure_allowance(signer, sub_vault, amount).await?;
        let pending = self.ledger.place_bid(sub_vault, amount).await?;
        let bid = self.settle(pending, None).await?;
        tracing::info!(
            target: "auction",
            sub_vault = %format!("{sub_vault:#x}"),
            amount = %format_token_amount(amount),
            hash = %format!("{:#x}", bid.hash),
            "Bid placed"
        );
        Ok(BidReceipt {
            approval: approval.tx().cloned(),
            bid,
        })
    }

    /// Hand the reservation to the bid at `bid_index`. Booker only.
    pub async fn cede_reservation(
        &self,
        sub_vault: Address,
        bid_index: u64,
        expected: &Bid,
    ) -> Result<TxRecord, AppError> {
        let signer = self.ledger.signer();
        let reservation = self.ledger.current_reservation(sub_vault).await?;
        match reservation {
            Some(r) if r.booker == signer => {}
            _ => {
                return Err(AppError::AuthorizationFailure {
                    action: format!("cede reservation on {sub_vault:#x}"),
                    caller: format!("{signer:#x}"),
                });
            }
        }
        self.check_bid_slot(sub_vault, bid_index, expected).await?;

        let pending = self.ledger.cede_reservation(sub_vault, bid_index).await?;
        let tx = self.settle(pending, Some(bid_index)).await?;
        tracing::info!(
            target: "auction",
            sub_vault = %format!("{sub_vault:#x}"),
            bid_index,
            to = %format!("{:#x}", expected.bidder),
            "Reservation ceded"
        );
        Ok(tx)
    }

    /// Pull back an own active bid.
    pub async fn withdraw_bid(
        &self,
        sub_vault: Address,
        bid_index: u64,
        expected: &Bid,
    ) -> Result<TxRecord, AppError> {
        let signer = self.ledger.signer();
        if expected.bidder != signer {
            return Err(AppError::AuthorizationFailure {
                action: format!("withdraw bid {bid_index} on {sub_vault:#x}"),
                caller: format!("{signer:#x}"),
            });
        }
        self.check_bid_slot(sub_vault, bid_index, expected).await?;

        let pending = self.ledger.withdraw_bid(sub_vault, bid_index).await?;
        let tx = self.settle(pending, Some(bid_index)).await?;
        tracing::info!(
            target: "auction",
            sub_vault = %format!("{sub_vault:#x}"),
            bid_index,
            "Bid withdrawn"
        );
        Ok(tx)
    }

    pub async fn check_in(&self, sub_vault: Address) -> Result<TxRecord, AppError> {
        self.require_booker(sub_vault, "check in").await?;
        let pending = self.ledger.check_in(sub_vault).await?;
        self.settle(pending, None).await
    }

    pub async fn check_out(&self, sub_vault: Address) -> Result<TxRecord, AppError> {
        let reservation = self.require_booker(sub_vault, "check out").await?;
        let info = self.ledger.sub_vault_info(sub_vault).await?;
        if info.state != VaultState::Settled {
            return Err(AppError::ReservationFailure {
                sub_vault: format!("{sub_vault:#x}"),
                reason: format!("cannot check out while {:?}", info.state),
            });
        }
        tracing::debug!(target: "auction", stake = %format_token_amount(reservation.stake_amount), "Checking out");
        let pending = self.ledger.check_out(sub_vault).await?;
        self.settle(pending, None).await
    }

    pub async fn cancel_reservation(&self, sub_vault: Address) -> Result<TxRecord, AppError> {
        self.require_booker(sub_vault, "cancel").await?;
        let bids = self.ledger.auction_bids(sub_vault).await?;
        if bids.iter().any(|b| b.is_active) {
            return Err(AppError::ReservationFailure {
                sub_vault: format!("{sub_vault:#x}"),
                reason: "active bids are outstanding; cede or wait for withdrawal".to_string(),
            });
        }
        let pending = self.ledger.cancel_reservation(sub_vault).await?;
        self.settle(pending, None).await
    }

    /// Guest code for the current booker.
    pub async fn access_code(&self, sub_vault: Address) -> Result<String, AppError> {
        self.require_booker(sub_vault, "read the access code").await?;
        self.ledger.current_access_code(sub_vault).await
    }

    async fn require_booker(&self, sub_vault: Address, action: &str) -> Result<Reservation, AppError> {
        let signer = self.ledger.signer();
        match self.ledger.current_reservation(sub_vault).await? {
            Some(r) if r.booker == signer => Ok(r),
            _ => Err(AppError::AuthorizationFailure {
                action: format!("{action} on {sub_vault:#x}"),
                caller: format!("{signer:#x}"),
            }),
        }
    }

    async fn check_bid_slot(
        &self,
        sub_vault: Address,
        bid_index: u64,
        expected: &Bid,
    ) -> Result<(), AppError> {
        let live = self.ledger.auction_bids(sub_vault).await?;
        let Some(current) = live.get(bid_index as usize) else {
            return Err(AppError::StaleReference {
                bid_index,
                reason: format!("only {} bids on the ledger", live.len()),
            });
        };
        if current.bidder != expected.bidder
            || current.amount != expected.amount
            || current.timestamp != expected.timestamp
        {
            return Err(AppError::StaleReference {
                bid_index,
                reason: "slot now holds a different bid; refetch and retry".to_string(),
            });
        }
        if !current.is_active {
            return Err(AppError::StaleReference {
                bid_index,
                reason: "bid is no longer active".to_string(),
            });
        }
        Ok(())
    }

    /// Wait for the receipt. A confirmed revert is classified by its reason;
    /// a timeout stays `Transaction` since the outcome is unknown.
    async fn settle(&self, pending: PendingTx, bid_index: Option<u64>) -> Result<TxRecord, AppError> {
        let action = pending.action;
        let tx = self.ledger.confirm(pending).await?;
        let hash = format!("{:#x}", tx.hash);
        match tx.status {
            ReceiptStatus::ConfirmedSuccess => Ok(tx),
            ReceiptStatus::ConfirmedRevert => {
                let action = action.to_string();
                let caller = format!("{:#x}", self.ledger.signer());
                let site = RevertSite {
                    action: &action,
                    caller: &caller,
                    hash: &hash,
                    bid_index,
                };
                Err(AppError::from_revert(site, &tx.failure_reason()))
            }
            ReceiptStatus::UnknownTimeout => Err(AppError::Transaction {
                hash,
                reason: format!("{action}: {}", tx.failure_reason()),
            }),
        }
    }
}
