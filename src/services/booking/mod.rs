// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

pub mod approval;
pub mod plan;
pub mod resolver;
pub mod sequencer;

pub use approval::{ApprovalGate, ApprovalOutcome};
pub use plan::{BookingRequest, BookingUnit, Quote};
pub use resolver::{Resolution, VaultResolver};
pub use sequencer::{
    BatchReport, BookingSequencer, BookingState, BookingStep, CompletedUnit, PendingUnit,
    StepFailure,
};
