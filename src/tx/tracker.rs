//! Submission and confirmation tracking
//!
//! Waiting for a receipt is an explicit polling state machine: each
//! iteration polls once, checks the deadline, then sleeps one interval. It
//! runs on tokio's clock, so tests drive it with a paused clock.

use super::builder::SignedTransaction;
use crate::chain::{with_timeout, ChainClient};
use crate::error::{DispatchError, DispatchResult};

use ethers::types::{TransactionReceipt, H256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of the most recent receipt poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    NotPolled,
    Pending,
    Failed,
}

/// Progress of a confirmation wait
#[derive(Debug)]
pub struct WaitState {
    started: Instant,
    deadline: Duration,
    polls: u32,
    last: PollOutcome,
}

impl WaitState {
    pub fn new(deadline: Duration) -> Self {
        Self {
            started: Instant::now(),
            deadline,
            polls: 0,
            last: PollOutcome::NotPolled,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_sub(self.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.deadline
    }

    fn record(&mut self, outcome: PollOutcome) {
        self.polls += 1;
        self.last = outcome;
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn last(&self) -> PollOutcome {
        self.last
    }
}

/// Submits signed transactions and waits for them to be mined
pub struct ConfirmationTracker {
    client: Arc<dyn ChainClient>,
    request_timeout: Duration,
    poll_interval: Duration,
}

impl ConfirmationTracker {
    pub fn new(client: Arc<dyn ChainClient>, request_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            client,
            request_timeout,
            poll_interval,
        }
    }

    /// Submit a signed transaction
    pub async fn submit(&self, signed: &SignedTransaction) -> DispatchResult<H256> {
        let hash = with_timeout(
            "send transaction",
            self.request_timeout,
            self.client.send_raw_transaction(signed.raw.clone()),
        )
        .await?;

        if hash != signed.hash {
            warn!(
                "Node reported hash {:?} for locally computed {:?}",
                hash, signed.hash
            );
        }
        info!("sendTransaction, hash={:?}", hash);
        Ok(hash)
    }

    /// Poll for the receipt of `tx_hash` until it is mined or `deadline`
    /// has elapsed. A missing receipt or a failed poll means keep polling.
    pub async fn wait_mined(&self, tx_hash: H256, deadline: Duration) -> DispatchResult<TransactionReceipt> {
        let mut state = WaitState::new(deadline);

        loop {
            let limit = self.request_timeout.min(state.remaining());
            let poll = with_timeout(
                "transaction receipt",
                limit,
                self.client.transaction_receipt(tx_hash),
            )
            .await;

            match poll {
                Ok(Some(receipt)) => {
                    if receipt.status == Some(0u64.into()) {
                        warn!("Transaction {:?} mined but reverted", tx_hash);
                    }
                    return Ok(receipt);
                }
                Ok(None) => state.record(PollOutcome::Pending),
                Err(e) => {
                    debug!("Receipt poll for {:?} failed: {}", tx_hash, e);
                    state.record(PollOutcome::Failed);
                }
            }

            if state.expired() {
                return Err(DispatchError::WaitTimeout {
                    tx_hash: format!("{:?}", tx_hash),
                    waited_secs: state.elapsed().as_secs(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
