//! HTTP JSON-RPC client backed by an ethers provider

use super::ChainClient;
use crate::error::{DispatchError, DispatchResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;
use tracing::debug;

/// JSON-RPC client for a single node endpoint
pub struct RpcClient {
    url: String,
    provider: Provider<Http>,
}

impl RpcClient {
    /// Create a new client for `url`
    pub fn new(url: &str) -> DispatchResult<Self> {
        let provider = Provider::<Http>::try_from(url)
            .map_err(|e| DispatchError::Config(format!("Invalid RPC endpoint {}: {}", url, e)))?
            .interval(Duration::from_millis(100));

        debug!("Created HTTP provider for {}", url);

        Ok(Self {
            url: url.to_string(),
            provider,
        })
    }

    /// Endpoint this client talks to
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn estimate_gas(&self, tx: &TypedTransaction) -> DispatchResult<U256> {
        self.provider
            .estimate_gas(tx, None)
            .await
            .map_err(|e| DispatchError::GasEstimation(e.to_string()))
    }

    async fn gas_price(&self) -> DispatchResult<U256> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| DispatchError::rpc("gas price", e))
    }

    async fn pending_nonce(&self, address: Address) -> DispatchResult<U256> {
        self.provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| DispatchError::rpc("pending nonce", e))
    }

    async fn chain_id(&self) -> DispatchResult<U256> {
        self.provider
            .get_chainid()
            .await
            .map_err(|e| DispatchError::rpc("chain id", e))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> DispatchResult<H256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| DispatchError::rpc("send transaction", e))?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> DispatchResult<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| DispatchError::rpc("transaction receipt", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_endpoint() {
        let err = RpcClient::new("not a url").err().unwrap();
        assert!(matches!(err, DispatchError::Config(_)));
    }

    #[test]
    fn test_keeps_endpoint() {
        let client = RpcClient::new("http://127.0.0.1:8545").unwrap();
        assert_eq!(client.url(), "http://127.0.0.1:8545");
    }
}
