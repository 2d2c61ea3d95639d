// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::parsing::strip_0x;
use crate::domain::constants;
use crate::domain::error::AppError;
use crate::domain::night::NightCodec;
use crate::infrastructure::ledger::LedgerConfig;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_false")]
    pub debug: bool,
    #[serde(default = "default_false")]
    pub log_json: bool,

    // Network
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    pub rpc_url: Option<String>,
    pub factory_address: Option<Address>,
    pub token_address: Option<Address>,

    // Identity
    #[serde(default)]
    pub wallet_key: String,
    pub wallet_address: Option<Address>,

    // Calendar
    #[serde(default = "default_night_epoch")]
    pub night_epoch: String,

    // Receipts & reads
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
    #[serde(default = "default_receipt_confirm_blocks")]
    pub receipt_confirm_blocks: u64,
    #[serde(default = "default_read_cache_ttl_ms")]
    pub read_cache_ttl_ms: u64,
    #[serde(default = "default_read_retry_attempts")]
    pub read_retry_attempts: usize,
}

// Defaults
fn default_false() -> bool {
    false
}
fn default_chain_id() -> u64 {
    constants::CHAIN_SEPOLIA
}
fn default_night_epoch() -> String {
    constants::DEFAULT_NIGHT_EPOCH.to_string()
}
fn default_receipt_poll_ms() -> u64 {
    constants::DEFAULT_RECEIPT_POLL_MS
}
fn default_receipt_timeout_ms() -> u64 {
    constants::DEFAULT_RECEIPT_TIMEOUT_MS
}
fn default_receipt_confirm_blocks() -> u64 {
    constants::DEFAULT_RECEIPT_CONFIRM_BLOCKS
}
fn default_read_cache_ttl_ms() -> u64 {
    constants::DEFAULT_READ_CACHE_TTL_MS
}
fn default_read_retry_attempts() -> usize {
    constants::DEFAULT_READ_RETRY_ATTEMPTS
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let selected_config = resolve_config_path(path);
        let mut builder = Config::builder();

        if let Some(ref selected_path) = selected_config {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Deterministic precedence: CLI (in main) > env/.env > selected profile file.
        builder = builder.add_source(Environment::default());

        let settings: GlobalSettings = builder.build()?.try_deserialize()?;

        // Fail on a bad epoch now rather than on the first date conversion.
        settings.night_codec()?;

        tracing::debug!(
            target: "config",
            file = selected_config.as_deref().unwrap_or("config.toml (optional)"),
            chain_id = settings.chain_id,
            epoch = %settings.night_epoch,
            "Settings loaded"
        );
        Ok(settings)
    }

    pub fn log_level(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }

    pub fn night_codec(&self) -> Result<NightCodec, AppError> {
        NightCodec::from_epoch_str(&self.night_epoch)
    }

    pub fn receipt_poll_ms_value(&self) -> u64 {
        self.receipt_poll_ms.max(constants::MIN_RECEIPT_POLL_MS)
    }

    pub fn receipt_timeout_ms_value(&self) -> u64 {
        self.receipt_timeout_ms.max(self.receipt_poll_ms_value())
    }

    pub fn receipt_confirm_blocks_value(&self) -> u64 {
        self.receipt_confirm_blocks.max(1)
    }

    pub fn read_retry_attempts_value(&self) -> usize {
        self.read_retry_attempts.max(1)
    }

    pub fn rpc_url_value(&self) -> Result<String, AppError> {
        self.rpc_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| AppError::Config("RPC_URL is missing".to_string()))
    }

    /// Factory and token addresses; both are required against a live ledger.
    pub fn contract_addresses(&self) -> Result<(Address, Address), AppError> {
        let factory = self
            .factory_address
            .filter(|a| *a != Address::ZERO)
            .ok_or_else(|| AppError::Config("FACTORY_ADDRESS is missing".to_string()))?;
        let token = self
            .token_address
            .filter(|a| *a != Address::ZERO)
            .ok_or_else(|| AppError::Config("TOKEN_ADDRESS is missing".to_string()))?;
        Ok((factory, token))
    }

    /// Receipt, cache and retry policy handed to the ledger client.
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            receipt_poll_ms: self.receipt_poll_ms_value(),
            receipt_timeout_ms: self.receipt_timeout_ms_value(),
            receipt_confirm_blocks: self.receipt_confirm_blocks_value(),
            read_cache_ttl_ms: self.read_cache_ttl_ms,
            read_retry_attempts: self.read_retry_attempts_value(),
            read_retry_delay_ms: constants::READ_RETRY_INITIAL_DELAY_MS,
        }
    }

    pub fn wallet_signer(&self) -> Result<PrivateKeySigner, AppError> {
        let raw = self.wallet_key.trim();
        if raw.is_empty() {
            return Err(AppError::Config("WALLET_KEY is missing".to_string()));
        }
        let signer = PrivateKeySigner::from_str(strip_0x(raw))
            .map_err(|e| AppError::Config(format!("Invalid WALLET_KEY: {}", e)))?;
        if let Some(expected) = self.wallet_address
            && expected != signer.address()
        {
            return Err(AppError::Config(format!(
                "WALLET_ADDRESS {:#x} does not match WALLET_KEY ({:#x})",
                expected,
                signer.address()
            )));
        }
        Ok(signer)
    }

    /// Address used in dry-run mode when no key is configured.
    pub fn identity(&self) -> Address {
        self.wallet_signer()
            .map(|s| s.address())
            .ok()
            .or(self.wallet_address)
            .unwrap_or(Address::repeat_byte(0x11))
    }
}

fn resolve_config_path(path: Option<&str>) -> Option<String> {
    if let Some(path) = path {
        return Some(path.to_string());
    }
    detect_active_config_file()
}

fn detect_active_config_file() -> Option<String> {
    let priority_files = [
        "config.prod.toml",
        "config.dev.toml",
        "config.testnet.toml",
        "config.toml",
    ];

    for file in priority_files.iter() {
        if let Some(true) = config_has_active_flag(file) {
            return Some((*file).to_string());
        }
    }

    // Fallback: scan current dir for config.*.toml with THIS_ACTIVE = true
    if let Ok(entries) = fs::read_dir(".") {
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && name.starts_with("config.")
                && name.ends_with(".toml")
                && let Some(true) = config_has_active_flag(name)
            {
                return Some(name.to_string());
            }
        }
    }

    None
}

fn config_has_active_flag(path: &str) -> Option<bool> {
    let p = Path::new(path);
    if !p.exists() {
        return None;
    }

    Config::builder()
        .add_source(File::from(p))
        .build()
        .ok()?
        .get_bool("THIS_ACTIVE")
        .ok()
}
