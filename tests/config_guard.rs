// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use regex::Regex;
use std::fs;
use std::path::Path;

const CANDIDATES: [&str; 5] = [
    "config.toml",
    "config.prod.toml",
    "config.dev.toml",
    "config.testnet.toml",
    "config.example.toml",
];

/// Fail CI if config files contain 64-hex private keys or obvious secrets.
#[test]
fn no_committed_hex_keys_in_configs() {
    let re = Regex::new(r"0x?[a-fA-F0-9]{64}").unwrap();
    for file in CANDIDATES {
        if !Path::new(file).exists() {
            continue;
        }
        let body = fs::read_to_string(file).expect("read config");
        for (idx, line) in body.lines().enumerate() {
            if re.is_match(line) {
                panic!("Secret-looking hex in {} at line {}", file, idx + 1);
            }
        }
    }
}

/// Keys and access codes belong in the environment, never in a profile file.
#[test]
fn no_secret_fields_in_configs() {
    let re = Regex::new(r"^\s*(wallet_key|master_access_code)\s*=").unwrap();
    for file in CANDIDATES {
        if !Path::new(file).exists() {
            continue;
        }
        let body = fs::read_to_string(file).expect("read config");
        for (idx, line) in body.lines().enumerate() {
            if re.is_match(line) {
                panic!("Secret field set in {} at line {}", file, idx + 1);
            }
        }
    }
}
