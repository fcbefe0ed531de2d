//! Transaction pipeline: parameters, signing, submission and confirmation

mod builder;
mod params;
mod sender;
mod tracker;

pub use builder::{build_transaction, SignedTransaction, TransactionBuilder};
pub use params::{ParameterFetcher, ResolvedCall};
pub use sender::TransactionSender;
pub use tracker::{ConfirmationTracker, PollOutcome, WaitState};
