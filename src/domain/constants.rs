// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

// =============================================================================
// NETWORK CONSTANTS
// =============================================================================

pub const CHAIN_ETHEREUM: u64 = 1;
pub const CHAIN_SEPOLIA: u64 = 11_155_111;
pub const CHAIN_ARBITRUM: u64 = 42161;
pub const CHAIN_ARBITRUM_SEPOLIA: u64 = 421_614;

// Block times in seconds (approximate)
pub fn get_block_time(chain_id: u64) -> u64 {
    match chain_id {
        CHAIN_ETHEREUM | CHAIN_SEPOLIA => 12,
        CHAIN_ARBITRUM | CHAIN_ARBITRUM_SEPOLIA => 1,
        _ => 12, // Default
    }
}

// =============================================================================
// TOKEN CONSTANTS
// =============================================================================

/// Every monetary field on the vault contracts is a 6-decimal fixed-point integer.
pub const TOKEN_DECIMALS: u8 = 6;
pub const TOKEN_SCALE: u64 = 1_000_000;
pub const TOKEN_SYMBOL: &str = "PYUSD";

// =============================================================================
// CALENDAR CONSTANTS
// =============================================================================

pub const SECONDS_PER_DAY: i64 = 86_400;
/// Night 1 is the night starting at midnight UTC of this date.
pub const DEFAULT_NIGHT_EPOCH: &str = "2025-01-01";

// =============================================================================
// RECEIPT & READ POLICY
// =============================================================================

pub const MIN_RECEIPT_POLL_MS: u64 = 100;
pub const DEFAULT_RECEIPT_POLL_MS: u64 = 1_000;
pub const DEFAULT_RECEIPT_TIMEOUT_MS: u64 = 90_000;
pub const DEFAULT_RECEIPT_CONFIRM_BLOCKS: u64 = 1;
pub const DEFAULT_READ_CACHE_TTL_MS: u64 = 5_000;
pub const DEFAULT_READ_RETRY_ATTEMPTS: usize = 3;
pub const READ_RETRY_INITIAL_DELAY_MS: u64 = 100;
