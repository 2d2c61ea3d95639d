// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::constants::{TOKEN_DECIMALS, TOKEN_SCALE};
use crate::domain::error::AppError;
use alloy::primitives::{Address, U256};
use std::str::FromStr;

pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

pub fn parse_address_hex(s: &str) -> Option<Address> {
    Address::from_str(strip_0x(s.trim())).ok()
}

pub fn require_address(field: &str, raw: &str) -> Result<Address, AppError> {
    let addr = parse_address_hex(raw).ok_or_else(|| AppError::InvalidAddress(raw.to_string()))?;
    if addr == Address::ZERO {
        return Err(AppError::invalid_input(field, "zero address"));
    }
    Ok(addr)
}

/// Render a 6-decimal fixed-point amount, e.g. `100000000` -> `100.000000`.
pub fn format_token_amount(amount: U256) -> String {
    let scale = U256::from(TOKEN_SCALE);
    let whole = amount / scale;
    let frac = (amount % scale).saturating_to::<u64>();
    format!("{whole}.{frac:0width$}", width = TOKEN_DECIMALS as usize)
}

/// Parse a decimal token amount (`"100"`, `"99.5"`) into its fixed-point integer.
pub fn parse_token_amount(raw: &str) -> Result<U256, AppError> {
    let trimmed = raw.trim();
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    let decimals = TOKEN_DECIMALS as usize;
    let well_formed = !whole.is_empty()
        && whole.chars().all(|c| c.is_ascii_digit())
        && frac.chars().all(|c| c.is_ascii_digit())
        && frac.len() <= decimals;
    if !well_formed {
        return Err(AppError::invalid_input(
            "amount",
            format!("{raw:?} is not a {decimals}-decimal amount"),
        ));
    }
    let whole = U256::from_str_radix(whole, 10)
        .map_err(|e| AppError::invalid_input("amount", e.to_string()))?;
    let frac_padded = format!("{frac:0<decimals$}");
    let frac = U256::from_str_radix(&frac_padded, 10)
        .map_err(|e| AppError::invalid_input("amount", e.to_string()))?;
    whole
        .checked_mul(U256::from(TOKEN_SCALE))
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(|| AppError::invalid_input("amount", "overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_six_decimal_amounts() {
        assert_eq!(format_token_amount(U256::from(100_000_000u64)), "100.000000");
        assert_eq!(format_token_amount(U256::from(1u64)), "0.000001");
    }

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse_token_amount("100").unwrap(), U256::from(100_000_000u64));
        assert_eq!(parse_token_amount("99.5").unwrap(), U256::from(99_500_000u64));
        assert!(parse_token_amount("1.0000001").is_err());
        assert!(parse_token_amount("-3").is_err());
        assert!(parse_token_amount(".5").is_err());
    }

    #[test]
    fn address_parser_rejects_zero_and_garbage() {
        assert!(require_address("spender", "0x12").is_err());
        assert!(require_address("spender", &format!("{:#x}", Address::ZERO)).is_err());
        let addr = Address::repeat_byte(0x11);
        assert_eq!(require_address("spender", &format!("{addr:#x}")).unwrap(), addr);
    }
}
