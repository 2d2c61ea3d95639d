// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

//! Batch booking state machine.
//!
//! `SelectDates -> Confirm -> CreateVault -> ApprovePyusd -> CreateReservation`
//! loops once per unit and ends in `Success`, or in `Failed` at the step that
//! broke. Units are processed strictly one after another; each write is
//! confirmed before the next is submitted.

use crate::common::parsing::format_token_amount;
use crate::domain::error::{AppError, ErrorKind};
use crate::domain::vault::{SubVaultKey, VaultState};
use crate::infrastructure::ledger::{LedgerClient, ReceiptStatus, TxRecord};
use crate::services::booking::approval::ApprovalGate;
use crate::services::booking::plan::{BookingRequest, BookingUnit, Quote};
use crate::services::booking::resolver::VaultResolver;
use alloy::primitives::{Address, B256, U256};
use serde::Serialize;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BookingStep {
    SelectDates,
    Confirm,
    CreateVault,
    ApprovePyusd,
    CreateReservation,
    Success,
    Failed,
}

impl BookingStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStep::Success | BookingStep::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedUnit {
    pub unit_index: usize,
    pub key: SubVaultKey,
    pub sub_vault: Address,
    pub stake: U256,
    /// Found already reserved by this signer instead of reserved in this run.
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: BookingStep,
    pub unit_index: Option<usize>,
    pub key: Option<SubVaultKey>,
    pub kind: ErrorKind,
    pub reason: String,
}

/// Work done so far on the unit at `current_unit_index`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct UnitProgress {
    sub_vault: Option<Address>,
    stake: Option<U256>,
}

/// The whole observable state of a batch. Callers render it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingState {
    pub step: BookingStep,
    pub current_unit_index: usize,
    pub completed_units: Vec<CompletedUnit>,
    pub last_error: Option<StepFailure>,
    pub quote: Option<Quote>,
    pub transactions: Vec<TxRecord>,
    #[serde(skip)]
    progress: UnitProgress,
}

impl Default for BookingState {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingState {
    pub fn new() -> Self {
        Self {
            step: BookingStep::SelectDates,
            current_unit_index: 0,
            completed_units: Vec::new(),
            last_error: None,
            quote: None,
            transactions: Vec::new(),
            progress: UnitProgress::default(),
        }
    }

    /// A batch already quoted and waiting at `Confirm`.
    pub fn confirmed(quote: Quote) -> Self {
        Self {
            step: BookingStep::Confirm,
            quote: Some(quote),
            ..Self::new()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.step.is_terminal()
    }

    fn is_completed(&self, unit_index: usize) -> bool {
        self.completed_units
            .iter()
            .any(|c| c.unit_index == unit_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingUnit {
    pub unit_index: usize,
    pub key: SubVaultKey,
}

/// Summary handed back to the caller after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub vault_id: String,
    pub step: BookingStep,
    pub completed: Vec<CompletedUnit>,
    pub failed: Option<StepFailure>,
    pub not_attempted: Vec<PendingUnit>,
    pub transactions: Vec<B256>,
}

#[derive(Clone)]
pub struct BookingSequencer {
    ledger: LedgerClient,
    resolver: VaultResolver,
    gate: ApprovalGate,
}

impl BookingSequencer {
    pub fn new(ledger: LedgerClient) -> Self {
        Self {
            resolver: VaultResolver::new(ledger.clone()),
            gate: ApprovalGate::new(ledger.clone()),
            ledger,
        }
    }

    /// Validate and quote. Leaves the batch at `Confirm`, or `Failed` on bad input.
    pub async fn start(&self, request: &BookingRequest) -> BookingState {
        self.advance(request, BookingState::new()).await
    }

    /// Perform exactly one transition.
    pub async fn advance(&self, request: &BookingRequest, mut state: BookingState) -> BookingState {
        let step = state.step;
        let result = match step {
            BookingStep::SelectDates => self.select_dates(request, &mut state).await,
            BookingStep::Confirm => {
                self.enter_next_unit(request, &mut state);
                Ok(())
            }
            BookingStep::CreateVault => self.create_vault(request, &mut state).await,
            BookingStep::ApprovePyusd => self.approve(&mut state).await,
            BookingStep::CreateReservation => self.reserve(request, &mut state).await,
            BookingStep::Success | BookingStep::Failed => Ok(()),
        };
        if let Err(err) = result {
            self.fail(request, &mut state, step, err);
        }
        state
    }

    /// Drive `state` until it is terminal or `cancel` fires.
    ///
    /// Cancellation is only observed between steps; a submitted write is
    /// always awaited to its receipt first.
    pub async fn run(
        &self,
        request: &BookingRequest,
        mut state: BookingState,
        cancel: &CancellationToken,
    ) -> BookingState {
        while !state.is_terminal() {
            if cancel.is_cancelled() {
                tracing::info!(
                    target: "booking",
                    step = ?state.step,
                    unit = state.current_unit_index,
                    "Batch cancelled; stopping before next step"
                );
                break;
            }
            state = self.advance(request, state).await;
        }
        state
    }

    /// Prepare a failed or interrupted batch for another run.
    ///
    /// Completed units are kept and skipped; work restarts at the first
    /// unfinished unit, whose sub-vault is resolved again (no duplicate
    /// creation).
    pub fn resume(&self, request: &BookingRequest, mut state: BookingState) -> BookingState {
        if matches!(state.step, BookingStep::SelectDates | BookingStep::Success) {
            return state;
        }
        if state.quote.is_none() {
            state.step = BookingStep::SelectDates;
            state.last_error = None;
            return state;
        }
        state.last_error = None;
        state.progress = UnitProgress::default();
        state.current_unit_index = 0;
        self.enter_next_unit(request, &mut state);
        tracing::info!(
            target: "booking",
            completed = state.completed_units.len(),
            next_unit = state.current_unit_index,
            "Resuming batch"
        );
        state
    }

    pub fn report(&self, request: &BookingRequest, state: &BookingState) -> BatchReport {
        let failed_index = state.last_error.as_ref().and_then(|f| f.unit_index);
        let done: HashSet<usize> = state.completed_units.iter().map(|c| c.unit_index).collect();
        let not_attempted = request
            .units
            .iter()
            .enumerate()
            .filter(|(idx, _)| !done.contains(idx) && Some(*idx) != failed_index)
            .map(|(unit_index, unit)| PendingUnit {
                unit_index,
                key: unit.key,
            })
            .collect();
        BatchReport {
            vault_id: request.vault_id.clone(),
            step: state.step,
            completed: state.completed_units.clone(),
            failed: state.last_error.clone(),
            not_attempted,
            transactions: state.transactions.iter().map(|t| t.hash).collect(),
        }
    }

    /// Validate the batch and price it against the parent vault's daily rate.
    /// Sends nothing.
    pub async fn quote(&self, request: &BookingRequest) -> Result<Quote, AppError> {
        request.validate()?;
        let vault = self.ledger.require_vault(&request.vault_id).await?;
        let quote = Quote::for_units(vault.daily_base_price, &request.units);

        let balance = self.ledger.balance(self.ledger.signer()).await?;
        if balance < quote.total_stake {
            tracing::warn!(
                target: "booking",
                balance = %format_token_amount(balance),
                total = %format_token_amount(quote.total_stake),
                "Balance does not cover the whole batch"
            );
        }
        tracing::info!(
            target: "booking",
            vault_id = %request.vault_id,
            units = request.units.len(),
            nights = quote.nights,
            total = %format_token_amount(quote.total_stake),
            "Batch quoted"
        );
        Ok(quote)
    }

    async fn select_dates(
        &self,
        request: &BookingRequest,
        state: &mut BookingState,
    ) -> Result<(), AppError> {
        state.quote = Some(self.quote(request).await?);
        state.step = BookingStep::Confirm;
        Ok(())
    }

    /// Point the state at the first unit not yet completed.
    fn enter_next_unit(&self, request: &BookingRequest, state: &mut BookingState) {
        state.progress = UnitProgress::default();
        let next = (state.current_unit_index..request.units.len()).find(|idx| !state.is_completed(*idx));
        match next {
            Some(idx) => {
                state.current_unit_index = idx;
                state.step = BookingStep::CreateVault;
            }
            None => {
                state.current_unit_index = request.units.len();
                state.step = BookingStep::Success;
                tracing::info!(
                    target: "booking",
                    vault_id = %request.vault_id,
                    completed = state.completed_units.len(),
                    "Batch complete"
                );
            }
        }
    }

    fn current_unit(
        &self,
        request: &BookingRequest,
        state: &BookingState,
    ) -> Result<BookingUnit, AppError> {
        request
            .units
            .get(state.current_unit_index)
            .copied()
            .ok_or_else(|| {
                AppError::invalid_input(
                    "units",
                    format!("unit index {} out of range", state.current_unit_index),
                )
            })
    }

    fn complete_unit(
        &self,
        request: &BookingRequest,
        state: &mut BookingState,
        unit: BookingUnit,
        sub_vault: Address,
        stake: U256,
        resumed: bool,
    ) {
        tracing::info!(
            target: "booking",
            unit = state.current_unit_index,
            key = %unit.key,
            sub_vault = %format!("{sub_vault:#x}"),
            resumed,
            "Unit reserved"
        );
        state.completed_units.push(CompletedUnit {
            unit_index: state.current_unit_index,
            key: unit.key,
            sub_vault,
            stake,
            resumed,
        });
        self.enter_next_unit(request, state);
    }

    async fn create_vault(
        &self,
        request: &BookingRequest,
        state: &mut BookingState,
    ) -> Result<(), AppError> {
        let unit = self.current_unit(request, state)?;
        let resolution = self
            .resolver
            .resolve_into(
                &request.vault_id,
                unit.key,
                &request.master_access_code,
                &mut state.transactions,
            )
            .await?;
        let sub_vault = resolution.address;
        let info = self.ledger.sub_vault_info_fresh(sub_vault).await?;
        let stake = unit.stake(info.daily_price);

        if let Some(existing) = self.ledger.current_reservation(sub_vault).await? {
            if existing.booker == self.ledger.signer() {
                self.complete_unit(request, state, unit, sub_vault, existing.stake_amount, true);
                return Ok(());
            }
            return Err(AppError::ReservationFailure {
                sub_vault: format!("{sub_vault:#x}"),
                reason: format!("{} is already reserved by {:#x}", unit.key, existing.booker),
            });
        }
        if info.state != VaultState::Free {
            return Err(AppError::ReservationFailure {
                sub_vault: format!("{sub_vault:#x}"),
                reason: format!("{} is {:?}, not bookable", unit.key, info.state),
            });
        }

        state.progress = UnitProgress {
            sub_vault: Some(sub_vault),
            stake: Some(stake),
        };
        state.step = BookingStep::ApprovePyusd;
        Ok(())
    }

    fn progress(&self, state: &BookingState) -> Result<(Address, U256), AppError> {
        match (state.progress.sub_vault, state.progress.stake) {
            (Some(sub_vault), Some(stake)) => Ok((sub_vault, stake)),
            _ => Err(AppError::invalid_input(
                "state",
                "unit has no resolved sub-vault; resume the batch",
            )),
        }
    }

    async fn approve(&self, state: &mut BookingState) -> Result<(), AppError> {
        let (sub_vault, stake) = self.progress(state)?;
        self.gate
            .ensure_allowance_into(self.ledger.signer(), sub_vault, stake, &mut state.transactions)
            .await?;
        state.step = BookingStep::CreateReservation;
        Ok(())
    }

    async fn reserve(
        &self,
        request: &BookingRequest,
        state: &mut BookingState,
    ) -> Result<(), AppError> {
        let unit = self.current_unit(request, state)?;
        let (sub_vault, stake) = self.progress(state)?;
        let sub_label = format!("{sub_vault:#x}");

        let pending = self
            .ledger
            .create_reservation(sub_vault, stake, unit.check_in, unit.check_out)
            .await
            .map_err(|e| AppError::ReservationFailure {
                sub_vault: sub_label.clone(),
                reason: e.to_string(),
            })?;
        let tx = self.ledger.confirm(pending).await?;
        let status = tx.status;
        let reason = tx.failure_reason();
        state.transactions.push(tx);

        match status {
            ReceiptStatus::ConfirmedSuccess => {
                self.complete_unit(request, state, unit, sub_vault, stake, false);
                Ok(())
            }
            ReceiptStatus::ConfirmedRevert => Err(AppError::ReservationFailure {
                sub_vault: sub_label,
                reason,
            }),
            ReceiptStatus::UnknownTimeout => {
                // Never resubmit; the reservation may have landed.
                let observed = self.ledger.current_reservation(sub_vault).await?;
                match observed {
                    Some(r) if r.booker == self.ledger.signer() => {
                        self.complete_unit(request, state, unit, sub_vault, r.stake_amount, false);
                        Ok(())
                    }
                    _ => Err(AppError::ReservationFailure {
                        sub_vault: sub_label,
                        reason,
                    }),
                }
            }
        }
    }

    fn fail(
        &self,
        request: &BookingRequest,
        state: &mut BookingState,
        step: BookingStep,
        err: AppError,
    ) {
        let unit_index = match step {
            BookingStep::CreateVault | BookingStep::ApprovePyusd | BookingStep::CreateReservation => {
                Some(state.current_unit_index)
            }
            _ => None,
        };
        let key = unit_index.and_then(|idx| request.units.get(idx)).map(|u| u.key);
        tracing::warn!(
            target: "booking",
            step = ?step,
            unit = ?unit_index,
            key = ?key,
            error = %err,
            completed = state.completed_units.len(),
            "Batch halted"
        );
        state.last_error = Some(StepFailure {
            step,
            unit_index,
            key,
            kind: err.kind(),
            reason: err.to_string(),
        });
        state.step = BookingStep::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::night::NightCodec;
    use crate::domain::vault::NightNumber;
    use crate::infrastructure::ledger::client::test_config;
    use crate::infrastructure::ledger::{
        FaultEffect, FaultTarget, InMemoryLedger, WriteKind, WriteRequest,
    };
    use crate::services::auction::AuctionCoordinator;
    use std::sync::Arc;

    const GUEST: Address = Address::repeat_byte(0x11);

    fn setup(funds: u64) -> (BookingSequencer, InMemoryLedger, NightCodec) {
        let codec = NightCodec::from_epoch_str("2025-01-01").unwrap();
        let ledger = InMemoryLedger::new(codec, GUEST);
        ledger.seed_vault(
            Address::repeat_byte(0x0a),
            "APT-1",
            "flat",
            U256::from(100u64),
            "code",
        );
        ledger.mint(GUEST, U256::from(funds));
        let client = LedgerClient::new(Arc::new(ledger.clone()), test_config());
        (BookingSequencer::new(client), ledger, codec)
    }

    fn request(codec: &NightCodec, nights: &[u64]) -> BookingRequest {
        let nights: Vec<NightNumber> = nights.iter().copied().map(NightNumber).collect();
        BookingRequest::for_nights(codec, "APT-1", "code", &nights).unwrap()
    }

    #[tokio::test]
    async fn start_stops_at_confirm_with_quote() {
        let (seq, ledger, codec) = setup(1_000);
        let req = request(&codec, &[5, 6]);
        let state = seq.start(&req).await;
        assert_eq!(state.step, BookingStep::Confirm);
        assert_eq!(state.quote.as_ref().unwrap().total_stake, U256::from(200u64));
        assert!(ledger.writes().is_empty());
    }

    #[tokio::test]
    async fn invalid_batch_fails_before_ledger_calls() {
        let (seq, ledger, codec) = setup(1_000);
        let req = request(&codec, &[]);
        let state = seq.start(&req).await;
        assert_eq!(state.step, BookingStep::Failed);
        let failure = state.last_error.unwrap();
        assert_eq!(failure.step, BookingStep::SelectDates);
        assert_eq!(failure.kind, ErrorKind::InvalidInput);
        assert!(ledger.writes().is_empty());
    }

    #[tokio::test]
    async fn unknown_vault_fails_at_select() {
        let (seq, _, codec) = setup(1_000);
        let mut req = request(&codec, &[1]);
        req.vault_id = "NOPE".into();
        let state = seq.start(&req).await;
        assert_eq!(state.last_error.unwrap().step, BookingStep::SelectDates);
    }

    #[tokio::test]
    async fn failing_unit_halts_the_batch_and_resume_continues() {
        let (seq, ledger, codec) = setup(1_000);
        let req = request(&codec, &[10, 11, 12]);
        let cancel = CancellationToken::new();

        let mut state = seq.start(&req).await;
        while state.completed_units.is_empty() {
            state = seq.advance(&req, state).await;
        }
        ledger.inject_fault(
            WriteKind::CreateReservation,
            FaultTarget::Any,
            FaultEffect::Revert("DateConflict()".into()),
        );
        let state = seq.run(&req, state, &cancel).await;
        assert_eq!(state.step, BookingStep::Failed);
        let failure = state.last_error.clone().unwrap();
        assert_eq!(failure.unit_index, Some(1));
        assert_eq!(failure.step, BookingStep::CreateReservation);
        assert_eq!(failure.kind, ErrorKind::ReservationFailure);
        assert!(failure.reason.contains("DateConflict"));

        let report = seq.report(&req, &state);
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.completed[0].unit_index, 0);
        assert_eq!(report.not_attempted.len(), 1);
        assert_eq!(report.not_attempted[0].unit_index, 2);

        let state = seq.resume(&req, state);
        assert_eq!(state.step, BookingStep::CreateVault);
        assert_eq!(state.current_unit_index, 1);
        let state = seq.run(&req, state, &cancel).await;
        assert_eq!(state.step, BookingStep::Success);
        assert_eq!(state.completed_units.len(), 3);
        // Unit 2's sub-vault is reused, unit 1 is not touched again.
        assert_eq!(ledger.write_count(WriteKind::CreateSubVault), 3);
        assert_eq!(ledger.write_count(WriteKind::CreateReservation), 4);
    }

    #[tokio::test]
    async fn already_reserved_units_are_skipped_on_rerun() {
        let (seq, ledger, codec) = setup(1_000);
        let req = request(&codec, &[3, 4]);
        let cancel = CancellationToken::new();
        let first = seq.run(&req, BookingState::new(), &cancel).await;
        assert_eq!(first.step, BookingStep::Success);

        let again = seq.run(&req, BookingState::new(), &cancel).await;
        assert_eq!(again.step, BookingStep::Success);
        assert!(again.completed_units.iter().all(|c| c.resumed));
        assert_eq!(ledger.write_count(WriteKind::CreateReservation), 2);
        assert_eq!(ledger.write_count(WriteKind::CreateSubVault), 2);
    }

    #[tokio::test]
    async fn someone_elses_reservation_is_a_conflict() {
        let (seq, ledger, codec) = setup(1_000);
        let rival = Address::repeat_byte(0x44);
        ledger.mint(rival, U256::from(1_000u64));
        let rival_seq = BookingSequencer::new(LedgerClient::new(
            Arc::new(ledger.view_as(rival)),
            test_config(),
        ));
        let req = request(&codec, &[8]);
        let cancel = CancellationToken::new();
        let rival_state = rival_seq.run(&req, BookingState::new(), &cancel).await;
        assert_eq!(rival_state.step, BookingStep::Success);

        let state = seq.run(&req, BookingState::new(), &cancel).await;
        let failure = state.last_error.unwrap();
        assert_eq!(failure.step, BookingStep::CreateVault);
        assert_eq!(failure.kind, ErrorKind::ReservationFailure);
    }

    #[tokio::test]
    async fn cancellation_stops_between_steps() {
        let (seq, ledger, codec) = setup(1_000);
        let req = request(&codec, &[1, 2]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let state = seq.run(&req, BookingState::new(), &cancel).await;
        assert_eq!(state.step, BookingStep::SelectDates);
        assert!(ledger.writes().is_empty());
    }

    #[tokio::test]
    async fn reservation_timeout_rereads_instead_of_resubmitting() {
        let (seq, ledger, codec) = setup(1_000);
        let req = request(&codec, &[30]);
        ledger.inject_fault(WriteKind::CreateReservation, FaultTarget::Any, FaultEffect::LostReceipt);
        let state = seq
            .run(&req, BookingState::new(), &CancellationToken::new())
            .await;
        assert_eq!(state.step, BookingStep::Success);
        assert_eq!(ledger.write_count(WriteKind::CreateReservation), 1);
        let last = state.transactions.last().unwrap();
        assert_eq!(last.status, ReceiptStatus::UnknownTimeout);
    }

    #[tokio::test]
    async fn insufficient_funds_fail_at_approval() {
        let (seq, ledger, codec) = setup(150);
        let req = request(&codec, &[1, 2]);
        let state = seq
            .run(&req, BookingState::new(), &CancellationToken::new())
            .await;
        let failure = state.last_error.clone().unwrap();
        assert_eq!(failure.step, BookingStep::ApprovePyusd);
        assert_eq!(failure.unit_index, Some(1));
        assert_eq!(failure.kind, ErrorKind::InsufficientFunds);
        assert_eq!(state.completed_units.len(), 1);
        assert_eq!(ledger.write_count(WriteKind::ApproveSpending), 1);
    }

    #[tokio::test]
    async fn quote_keeps_the_underlying_error_kind() {
        let (seq, ledger, codec) = setup(1_000);
        let req = request(&codec, &[1]);
        assert_eq!(seq.quote(&req).await.unwrap().total_stake, U256::from(100u64));

        ledger.set_offline(true);
        let err = seq.quote(&req).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        let state = seq.start(&req).await;
        assert_eq!(state.last_error.unwrap().kind, ErrorKind::Connection);
    }

    #[tokio::test]
    async fn quoted_state_runs_like_a_started_one() {
        let (seq, ledger, codec) = setup(1_000);
        let req = request(&codec, &[16, 17]);
        let quote = seq.quote(&req).await.unwrap();
        let state = BookingState::confirmed(quote.clone());
        assert_eq!(state, seq.start(&req).await);

        let state = seq.run(&req, state, &CancellationToken::new()).await;
        assert_eq!(state.step, BookingStep::Success);
        assert_eq!(state.quote, Some(quote));
        assert_eq!(ledger.write_count(WriteKind::CreateReservation), 2);
    }

    #[tokio::test]
    async fn preapproved_unit_still_needs_the_balance() {
        let (seq, ledger, codec) = setup(50);
        let key = SubVaultKey::Night(NightNumber(9));
        seq.ledger
            .execute(WriteRequest::CreateSubVault {
                vault_id: "APT-1".into(),
                key,
                master_access_code: "code".into(),
            })
            .await
            .unwrap();
        let sub = seq.ledger.sub_vault_address("APT-1", &key).await.unwrap().unwrap();
        seq.ledger
            .execute(WriteRequest::ApproveSpending {
                spender: sub,
                amount: U256::from(100u64),
            })
            .await
            .unwrap();

        let state = seq
            .run(&request(&codec, &[9]), BookingState::new(), &CancellationToken::new())
            .await;
        let failure = state.last_error.unwrap();
        assert_eq!(failure.step, BookingStep::ApprovePyusd);
        assert_eq!(failure.kind, ErrorKind::InsufficientFunds);
        assert_eq!(ledger.write_count(WriteKind::CreateReservation), 0);
    }

    #[tokio::test]
    async fn failed_writes_are_kept_in_the_transaction_trail() {
        let (seq, ledger, codec) = setup(1_000);
        let req = request(&codec, &[14]);
        ledger.inject_fault(
            WriteKind::ApproveSpending,
            FaultTarget::Any,
            FaultEffect::Revert("paused".into()),
        );
        let state = seq
            .run(&req, BookingState::new(), &CancellationToken::new())
            .await;
        assert_eq!(state.last_error.as_ref().unwrap().kind, ErrorKind::ApprovalFailure);

        let sent: Vec<B256> = ledger.writes().iter().map(|w| w.hash).collect();
        assert_eq!(sent.len(), 2);
        assert_eq!(seq.report(&req, &state).transactions, sent);
    }

    #[tokio::test]
    async fn freed_night_is_bookable_despite_a_cached_auction_record() {
        let (seq, ledger, codec) = setup(1_000);
        let rival = Address::repeat_byte(0x44);
        ledger.mint(rival, U256::from(1_000u64));
        let rival_client = LedgerClient::new(Arc::new(ledger.view_as(rival)), test_config());
        let req = request(&codec, &[8]);
        let cancel = CancellationToken::new();
        let rival_state = BookingSequencer::new(rival_client.clone())
            .run(&req, BookingState::new(), &cancel)
            .await;
        let sub = rival_state.completed_units[0].sub_vault;

        assert_eq!(
            seq.ledger.sub_vault_info(sub).await.unwrap().state,
            VaultState::Auction
        );
        AuctionCoordinator::new(rival_client)
            .cancel_reservation(sub)
            .await
            .unwrap();

        let state = seq.run(&req, BookingState::new(), &cancel).await;
        assert_eq!(state.step, BookingStep::Success, "{:?}", state.last_error);
        assert_eq!(state.completed_units[0].sub_vault, sub);
    }
}
