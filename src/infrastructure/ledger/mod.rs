// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

pub mod backend;
pub mod chain;
pub mod client;
pub mod memory;

pub use backend::{LedgerBackend, TxOutcome, WriteKind, WriteRequest};
pub use chain::AlloyLedger;
pub use client::{LedgerClient, LedgerConfig, PendingTx, ReceiptStatus, TxRecord};
pub use memory::{FaultEffect, FaultTarget, InMemoryLedger};
