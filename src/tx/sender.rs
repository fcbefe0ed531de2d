//! Single transaction path shared by `send` and `sendBatch`

use super::builder::{SignedTransaction, TransactionBuilder};
use super::params::{ParameterFetcher, ResolvedCall};
use super::tracker::ConfirmationTracker;
use crate::batch::CallRequest;
use crate::chain::ChainClient;
use crate::config::Settings;
use crate::error::DispatchResult;
use crate::wallet::TransactionSigner;

use ethers::types::H256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Fills, signs, submits and optionally confirms transactions
pub struct TransactionSender {
    fetcher: ParameterFetcher,
    builder: TransactionBuilder,
    tracker: ConfirmationTracker,
    wait_timeout: Duration,
}

impl TransactionSender {
    /// Create a new transaction sender
    pub fn new(
        client: Arc<dyn ChainClient>,
        signer: Arc<dyn TransactionSigner>,
        settings: &Settings,
    ) -> Self {
        Self {
            fetcher: ParameterFetcher::new(client.clone(), settings.request_timeout(), &settings.gas),
            builder: TransactionBuilder::new(signer),
            tracker: ConfirmationTracker::new(client, settings.request_timeout(), settings.poll_interval()),
            wait_timeout: settings.wait_timeout(),
        }
    }

    /// Fetch gas, nonce and chain id for `call`
    pub async fn resolve(&self, call: &CallRequest) -> DispatchResult<ResolvedCall> {
        self.fetcher.fetch_params(call).await
    }

    /// Sign a resolved call
    pub async fn sign(&self, call: ResolvedCall, passphrase: &str) -> DispatchResult<SignedTransaction> {
        self.builder.sign(call, passphrase).await
    }

    /// Submit a signed transaction
    pub async fn submit(&self, signed: &SignedTransaction) -> DispatchResult<H256> {
        self.tracker.submit(signed).await
    }

    /// Send `call`, optionally waiting for it to be mined.
    ///
    /// A wait that runs out is not an error: the transaction was accepted
    /// and its hash is returned either way.
    pub async fn send_transaction(
        &self,
        call: &CallRequest,
        passphrase: &str,
        wait: bool,
    ) -> DispatchResult<H256> {
        let resolved = self.resolve(call).await?;
        let signed = self.sign(resolved, passphrase).await?;
        let hash = self.submit(&signed).await?;

        if wait {
            match self.tracker.wait_mined(hash, self.wait_timeout).await {
                Ok(receipt) => info!(
                    "transaction receipt: hash={:?} block={:?} gas_used={:?} status={:?}",
                    receipt.transaction_hash, receipt.block_number, receipt.gas_used, receipt.status
                ),
                Err(e) => warn!("wait transaction receipt failed: {}", e),
            }
        }

        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::FakeChain;
    use crate::error::DispatchError;
    use crate::wallet::testing::PlainSigner;
    use ethers::types::{Address, U256};

    fn sender(chain: Arc<FakeChain>, signer: PlainSigner) -> TransactionSender {
        TransactionSender::new(chain, Arc::new(signer), &Settings::default())
    }

    fn call(from: Address) -> CallRequest {
        CallRequest {
            from,
            to: Some(Address::repeat_byte(0x22)),
            value: U256::from(1),
            data: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_send_without_wait() {
        let chain = Arc::new(FakeChain::new(1337));
        let signer = PlainSigner::new("pw");
        let from = signer.address();
        let sender = sender(chain.clone(), signer);

        let hash = sender.send_transaction(&call(from), "pw", false).await.unwrap();

        let state = chain.state.lock().unwrap();
        assert_eq!(state.submitted.len(), 1);
        assert_eq!(hash, H256::from(ethers::utils::keccak256(&state.submitted[0])));
        assert_eq!(state.receipt_polls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_still_returns_hash() {
        let chain = Arc::new(FakeChain::new(1337));
        let signer = PlainSigner::new("pw");
        let from = signer.address();
        let sender = sender(chain.clone(), signer);

        let started = tokio::time::Instant::now();
        let hash = sender.send_transaction(&call(from), "pw", true).await;

        tokio_test::assert_ok!(hash);
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert!(chain.state.lock().unwrap().receipt_polls > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_after_receipt() {
        let mut chain = FakeChain::new(1337);
        chain.receipt_after_polls = Some(1);
        let chain = Arc::new(chain);
        let signer = PlainSigner::new("pw");
        let from = signer.address();

        sender(chain.clone(), signer)
            .send_transaction(&call(from), "pw", true)
            .await
            .unwrap();
        assert_eq!(chain.state.lock().unwrap().receipt_polls, 2);
    }

    #[tokio::test]
    async fn test_signing_failure_submits_nothing() {
        let chain = Arc::new(FakeChain::new(1337));
        let signer = PlainSigner::new("pw");
        let from = signer.address();

        let err = sender(chain.clone(), signer)
            .send_transaction(&call(from), "wrong", false)
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Wallet(_)));
        assert_eq!(chain.submitted(), 0);
    }
}
