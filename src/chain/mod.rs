//! Chain module - the JSON-RPC boundary of the dispatcher
//!
//! This module provides:
//! - The `ChainClient` trait covering every node call the pipeline makes
//! - An HTTP implementation backed by an ethers provider
//! - Bounded-time execution for individual network operations

pub mod provider;

pub use provider::RpcClient;

use crate::error::{DispatchError, DispatchResult};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use std::future::Future;
use std::time::Duration;

/// Node operations needed to fill, submit and confirm a transaction
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Estimate the gas limit for a call
    async fn estimate_gas(&self, tx: &TypedTransaction) -> DispatchResult<U256>;

    /// Suggested gas price
    async fn gas_price(&self) -> DispatchResult<U256>;

    /// Nonce of `address` including pending transactions
    async fn pending_nonce(&self, address: Address) -> DispatchResult<U256>;

    /// Chain identifier used for replay protection
    async fn chain_id(&self) -> DispatchResult<U256>;

    /// Submit an RLP encoded signed transaction, returning its hash
    async fn send_raw_transaction(&self, raw: Bytes) -> DispatchResult<H256>;

    /// Receipt for a mined transaction, `None` while still pending
    async fn transaction_receipt(&self, tx_hash: H256) -> DispatchResult<Option<TransactionReceipt>>;
}

/// Run a network operation under its own deadline
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> DispatchResult<T>
where
    F: Future<Output = DispatchResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout {
            operation: operation.to_string(),
        }),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable in-memory node used by pipeline tests

    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeChainState {
        pub nonce: u64,
        pub estimated: Vec<TypedTransaction>,
        /// Accepted raw transactions
        pub submitted: Vec<Bytes>,
        pub submit_attempts: usize,
        pub nonce_queries: usize,
        pub chain_id_queries: usize,
        pub receipt_polls: usize,
    }

    /// In-memory node. Nonces advance with every accepted submission.
    pub struct FakeChain {
        pub chain_id: u64,
        pub gas_price: U256,
        pub gas_limit: U256,
        /// Submission attempts (0-based) that the node rejects
        pub reject_submissions: HashSet<usize>,
        /// Poll count after which a receipt becomes available
        pub receipt_after_polls: Option<usize>,
        /// Never answer gas price requests
        pub stall_gas_price: bool,
        pub state: Mutex<FakeChainState>,
    }

    impl FakeChain {
        pub fn new(chain_id: u64) -> Self {
            Self {
                chain_id,
                gas_price: U256::from(1_000_000_000u64),
                gas_limit: U256::from(21_000u64),
                reject_submissions: HashSet::new(),
                receipt_after_polls: None,
                stall_gas_price: false,
                state: Mutex::new(FakeChainState::default()),
            }
        }

        pub fn submitted(&self) -> usize {
            self.state.lock().unwrap().submitted.len()
        }
    }

    #[async_trait]
    impl ChainClient for FakeChain {
        async fn estimate_gas(&self, tx: &TypedTransaction) -> DispatchResult<U256> {
            self.state.lock().unwrap().estimated.push(tx.clone());
            Ok(self.gas_limit)
        }

        async fn gas_price(&self) -> DispatchResult<U256> {
            if self.stall_gas_price {
                std::future::pending::<()>().await;
            }
            Ok(self.gas_price)
        }

        async fn pending_nonce(&self, _address: Address) -> DispatchResult<U256> {
            let mut state = self.state.lock().unwrap();
            state.nonce_queries += 1;
            Ok(U256::from(state.nonce))
        }

        async fn chain_id(&self) -> DispatchResult<U256> {
            self.state.lock().unwrap().chain_id_queries += 1;
            Ok(U256::from(self.chain_id))
        }

        async fn send_raw_transaction(&self, raw: Bytes) -> DispatchResult<H256> {
            let mut state = self.state.lock().unwrap();
            let attempt = state.submit_attempts;
            state.submit_attempts += 1;
            if self.reject_submissions.contains(&attempt) {
                return Err(DispatchError::rpc("send transaction", "insufficient funds"));
            }
            state.nonce += 1;
            state.submitted.push(raw.clone());
            Ok(H256::from(ethers::utils::keccak256(&raw)))
        }

        async fn transaction_receipt(
            &self,
            tx_hash: H256,
        ) -> DispatchResult<Option<TransactionReceipt>> {
            let mut state = self.state.lock().unwrap();
            state.receipt_polls += 1;
            match self.receipt_after_polls {
                Some(after) if state.receipt_polls > after => Ok(Some(TransactionReceipt {
                    transaction_hash: tx_hash,
                    status: Some(1u64.into()),
                    ..Default::default()
                })),
                _ => Ok(None),
            }
        }
    }
}
