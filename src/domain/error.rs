// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    #[error("Transaction failed: {hash}, reason: {reason}")]
    Transaction { hash: String, reason: String },

    #[error("Invalid input for {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Address {0} is invalid")]
    InvalidAddress(String),

    #[error("Insufficient funds. Required: {required}, Available: {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("Approval for spender {spender} failed: {reason}")]
    ApprovalFailure { spender: String, reason: String },

    #[error("Sub-vault resolution for {vault_id}/{key} failed: {reason}")]
    ResolutionFailure {
        vault_id: String,
        key: String,
        reason: String,
    },

    #[error("Reservation on {sub_vault} failed: {reason}")]
    ReservationFailure { sub_vault: String, reason: String },

    #[error("{caller} is not authorized to {action}")]
    AuthorizationFailure { action: String, caller: String },

    #[error("Bid index {bid_index} is stale: {reason}")]
    StaleReference { bid_index: u64, reason: String },

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

/// Failure class without the message payload, for reports and audit output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Connection,
    Transaction,
    InvalidInput,
    InsufficientFunds,
    ApprovalFailure,
    ResolutionFailure,
    ReservationFailure,
    AuthorizationFailure,
    StaleReference,
    Unknown,
}

/// Where a ledger revert surfaced. Used to map the revert reason onto [`AppError`].
#[derive(Debug, Clone, Copy)]
pub struct RevertSite<'a> {
    pub action: &'a str,
    pub caller: &'a str,
    pub hash: &'a str,
    pub bid_index: Option<u64>,
}

impl AppError {
    /// Classify a revert reason such as `NotBooker()` or `BidInactive(2)`.
    ///
    /// Unrecognized reasons stay `Transaction`.
    pub fn from_revert(site: RevertSite<'_>, reason: &str) -> Self {
        let reason = reason.trim();
        let (name, args) = match reason.split_once('(') {
            Some((name, rest)) => (name.trim(), rest.trim_end_matches(')').trim()),
            None => (reason, ""),
        };
        match name {
            "NotBooker" | "NotBidder" | "NotOwner" | "InvalidAccessCode" => {
                AppError::AuthorizationFailure {
                    action: format!("{} ({name})", site.action),
                    caller: site.caller.to_string(),
                }
            }
            "InvalidBidIndex" | "BidInactive" => AppError::StaleReference {
                bid_index: site
                    .bid_index
                    .or_else(|| args.parse().ok())
                    .unwrap_or_default(),
                reason: format!("{}: {reason}", site.action),
            },
            "VaultNotFound" => AppError::invalid_input(
                "vault_id",
                format!("{}: vault {args} does not exist", site.action),
            ),
            _ => AppError::Transaction {
                hash: site.hash.to_string(),
                reason: format!("{}: {reason}", site.action),
            },
        }
    }

    pub fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        AppError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Config(_) => ErrorKind::Config,
            AppError::Connection(_) => ErrorKind::Connection,
            AppError::Transaction { .. } => ErrorKind::Transaction,
            AppError::InvalidInput { .. } | AppError::InvalidDate(_) | AppError::InvalidAddress(_) => {
                ErrorKind::InvalidInput
            }
            AppError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            AppError::ApprovalFailure { .. } => ErrorKind::ApprovalFailure,
            AppError::ResolutionFailure { .. } => ErrorKind::ResolutionFailure,
            AppError::ReservationFailure { .. } => ErrorKind::ReservationFailure,
            AppError::AuthorizationFailure { .. } => ErrorKind::AuthorizationFailure,
            AppError::StaleReference { .. } => ErrorKind::StaleReference,
            AppError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_and_address_errors_classify_as_invalid_input() {
        assert_eq!(
            AppError::InvalidDate("1999-01-01".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            AppError::InvalidAddress("0x12".into()).kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn stale_reference_message_names_the_index() {
        let err = AppError::StaleReference {
            bid_index: 3,
            reason: "bidder changed".into(),
        };
        assert!(err.to_string().contains("Bid index 3"));
        assert_eq!(err.kind(), ErrorKind::StaleReference);
    }

    fn site(bid_index: Option<u64>) -> RevertSite<'static> {
        RevertSite {
            action: "cedeReservation",
            caller: "0x11",
            hash: "0xab",
            bid_index,
        }
    }

    #[test]
    fn revert_reasons_map_onto_the_taxonomy() {
        let err = AppError::from_revert(site(None), "NotBooker()");
        assert!(matches!(&err, AppError::AuthorizationFailure { caller, .. } if caller == "0x11"));

        let err = AppError::from_revert(site(None), "BidInactive(4)");
        assert!(matches!(err, AppError::StaleReference { bid_index: 4, .. }));
        let err = AppError::from_revert(site(Some(2)), "InvalidBidIndex(9)");
        assert!(matches!(err, AppError::StaleReference { bid_index: 2, .. }));

        let err = AppError::from_revert(site(None), "VaultNotFound(APT-9)");
        assert!(matches!(&err, AppError::InvalidInput { field, .. } if field == "vault_id"));

        let err = AppError::from_revert(site(None), "ERC20: transfer amount exceeds balance");
        assert!(matches!(&err, AppError::Transaction { hash, .. } if hash == "0xab"));
    }
}
