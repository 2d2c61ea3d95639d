// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::error::AppError;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use url::Url;

pub type HttpProvider = DynProvider;

pub struct ConnectionFactory;

impl ConnectionFactory {
    fn parse(rpc_url: &str) -> Result<Url, AppError> {
        Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))
    }

    /// HTTP provider that fills nonce, gas and chain id and signs with `signer`.
    pub fn signing_http(rpc_url: &str, signer: PrivateKeySigner) -> Result<HttpProvider, AppError> {
        let url = Self::parse(rpc_url)?;
        Ok(ProviderBuilder::new()
            .wallet(signer)
            .connect_http(url)
            .erased())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_urls() {
        let err = ConnectionFactory::signing_http("not a url", PrivateKeySigner::random())
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn accepts_http_endpoints() {
        assert!(ConnectionFactory::signing_http("http://127.0.0.1:8545", PrivateKeySigner::random()).is_ok());
    }
}
