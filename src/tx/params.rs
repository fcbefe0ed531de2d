//! Network parameters for a pending call
//!
//! Gas limit, gas price, pending nonce and chain id are fetched fresh for every
//! transaction: the nonce advances after each submission and the gas price
//! moves over time, so nothing here is cached.

use crate::batch::CallRequest;
use crate::chain::{with_timeout, ChainClient};
use crate::config::GasConfig;
use crate::error::{DispatchError, DispatchResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A call with every field needed to build the transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCall {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub nonce: U256,
    pub chain_id: u64,
}

/// Fetches gas, nonce and chain id for calls
pub struct ParameterFetcher {
    client: Arc<dyn ChainClient>,
    request_timeout: Duration,
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl ParameterFetcher {
    pub fn new(client: Arc<dyn ChainClient>, request_timeout: Duration, gas: &GasConfig) -> Self {
        Self {
            client,
            request_timeout,
            gas_limit_buffer_percent: gas.limit_buffer_percent,
            gas_price_buffer_percent: gas.price_buffer_percent,
        }
    }

    /// Fill in gas limit, gas price, nonce and chain id for `call`.
    /// Each value is its own bounded request; any failure aborts the fetch.
    pub async fn fetch_params(&self, call: &CallRequest) -> DispatchResult<ResolvedCall> {
        let estimate_tx = estimate_request(call);

        let gas_limit = with_timeout(
            "gas estimation",
            self.request_timeout,
            self.client.estimate_gas(&estimate_tx),
        )
        .await?;

        let gas_price =
            with_timeout("gas price", self.request_timeout, self.client.gas_price()).await?;

        let nonce = with_timeout(
            "pending nonce",
            self.request_timeout,
            self.client.pending_nonce(call.from),
        )
        .await?;

        let chain_id =
            with_timeout("chain id", self.request_timeout, self.client.chain_id()).await?;
        if chain_id.bits() > 64 {
            return Err(DispatchError::rpc("chain id", format!("chain id {} out of range", chain_id)));
        }

        let resolved = ResolvedCall {
            from: call.from,
            to: call.to,
            value: call.value,
            data: call.data.clone(),
            gas_limit: with_buffer(gas_limit, self.gas_limit_buffer_percent),
            gas_price: with_buffer(gas_price, self.gas_price_buffer_percent),
            nonce,
            chain_id: chain_id.as_u64(),
        };

        debug!(
            "Resolved call from {:?}: nonce {}, gas {} @ {}, chain {}",
            resolved.from, resolved.nonce, resolved.gas_limit, resolved.gas_price, resolved.chain_id
        );
        Ok(resolved)
    }
}

/// Transaction used for `eth_estimateGas`
fn estimate_request(call: &CallRequest) -> TypedTransaction {
    let mut request = TransactionRequest::new()
        .from(call.from)
        .value(call.value)
        .data(call.data.clone());
    if let Some(to) = call.to {
        request = request.to(to);
    }
    request.into()
}

fn with_buffer(amount: U256, percent: u64) -> U256 {
    amount + amount * percent / 100
}
