//! Batch orchestration
//!
//! A batch run:
//! 1. Validates the requested row range and every row inside it
//! 2. Loads token definitions if any row carries a macro payload
//! 3. Sends each row in order, isolating per-row failures
//! 4. Writes each transaction hash back to its row and flushes once

mod intent;
mod source;
mod spreadsheet;
mod text;

pub use intent::{BatchRange, BatchRow, CallRequest, Payload, TransactionIntent};
pub use source::{open_row_source, RowSource, RowSourceKind};

use crate::error::{DispatchError, DispatchResult};
use crate::macros::MacroResolver;
use crate::tx::TransactionSender;

use ethers::types::H256;
use std::path::PathBuf;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Stage a row was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStage {
    MacroExpanding,
    Resolving,
    Signing,
    Submitting,
}

/// What happened to one row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Sent and hash written back
    Recorded { hash: H256 },
    /// Sent, but writing the hash back failed
    Unrecorded { hash: H256, error: String },
    /// Not sent
    Failed { stage: RowStage, error: String },
}

/// Per-row results of a batch run
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub range: BatchRange,
    /// Absolute row index and outcome, in processing order
    pub outcomes: Vec<(usize, RowOutcome)>,
}

impl BatchReport {
    fn new(range: BatchRange) -> Self {
        Self {
            range,
            outcomes: Vec::with_capacity(range.len()),
        }
    }

    pub fn recorded(&self) -> usize {
        self.count(|o| matches!(o, RowOutcome::Recorded { .. }))
    }

    pub fn unrecorded(&self) -> usize {
        self.count(|o| matches!(o, RowOutcome::Unrecorded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RowOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&RowOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Drives a batch file through the transaction pipeline
pub struct BatchDispatcher<'a> {
    sender: &'a TransactionSender,
    default_passphrase: String,
    token_file: Option<PathBuf>,
}

impl<'a> BatchDispatcher<'a> {
    pub fn new(sender: &'a TransactionSender, default_passphrase: String, token_file: Option<PathBuf>) -> Self {
        Self {
            sender,
            default_passphrase,
            token_file,
        }
    }

    /// Send rows `[begin, end)` of `source`. `end` defaults to the row count.
    ///
    /// Only fatal conditions are returned as errors: a bad range, a
    /// malformed row, unusable token definitions, or a failed read or flush.
    /// Individual row failures are logged and reported in the `BatchReport`.
    pub async fn run(
        &self,
        source: &mut dyn RowSource,
        begin: usize,
        end: Option<usize>,
    ) -> DispatchResult<BatchReport> {
        let run_id = Uuid::new_v4();
        let result = self
            .run_inner(source, begin, end)
            .instrument(info_span!("batch", %run_id))
            .await;
        if let Err(e) = &result {
            error!(%run_id, fatal = e.is_fatal(), "Batch aborted: {}", e);
        }
        result
    }

    async fn run_inner(
        &self,
        source: &mut dyn RowSource,
        begin: usize,
        end: Option<usize>,
    ) -> DispatchResult<BatchReport> {
        BatchRange::precheck(begin, end)?;

        let rows = source.read_all()?;
        let range = BatchRange::resolve(begin, end, rows.len())?;

        let intents = rows[range.indices()]
            .iter()
            .zip(range.indices())
            .map(|(row, index)| {
                TransactionIntent::from_row(row).map_err(|e| {
                    DispatchError::InvalidArguments(format!("row {}: {}", index, e))
                })
            })
            .collect::<DispatchResult<Vec<_>>>()?;

        let resolver = if intents.iter().any(TransactionIntent::is_macro) {
            let token_file = self.token_file.as_deref().ok_or_else(|| {
                DispatchError::TokenDefinition("Macro rows present but no token file given".into())
            })?;
            Some(MacroResolver::load(token_file)?)
        } else {
            None
        };

        info!(
            "Sending rows [{}, {}) of {} from {:?} source ({} macro rows)",
            range.begin,
            range.end,
            rows.len(),
            source.kind(),
            intents.iter().filter(|i| i.is_macro()).count()
        );

        let mut report = BatchReport::new(range);
        for (index, intent) in range.indices().zip(&intents) {
            let outcome = self.process_row(source, index, intent, resolver.as_ref()).await;
            report.outcomes.push((index, outcome));
        }

        source.flush()?;

        info!(
            "Batch complete: {} recorded, {} unrecorded, {} failed",
            report.recorded(),
            report.unrecorded(),
            report.failed()
        );
        Ok(report)
    }

    /// Send one row and record its hash. Never fails: every error becomes
    /// part of the returned outcome.
    async fn process_row(
        &self,
        source: &mut dyn RowSource,
        index: usize,
        intent: &TransactionIntent,
        resolver: Option<&MacroResolver>,
    ) -> RowOutcome {
        let hash = match self.send_row(intent, resolver).await {
            Ok(hash) => hash,
            Err((stage, e)) => {
                error!("Row {} failed while {:?}: {}", index, stage, e);
                return RowOutcome::Failed {
                    stage,
                    error: e.to_string(),
                };
            }
        };

        let coordinate = source.output_coordinate(index);
        match source.write_string(&coordinate, &format!("{:?}", hash)) {
            Ok(()) => RowOutcome::Recorded { hash },
            Err(e) => {
                warn!("Row {} sent as {:?} but recording at {} failed: {}", index, hash, coordinate, e);
                RowOutcome::Unrecorded {
                    hash,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn send_row(
        &self,
        intent: &TransactionIntent,
        resolver: Option<&MacroResolver>,
    ) -> Result<H256, (RowStage, DispatchError)> {
        let call = intent
            .to_call(resolver)
            .map_err(|e| (RowStage::MacroExpanding, e))?;
        let passphrase = intent
            .passphrase
            .as_deref()
            .unwrap_or(&self.default_passphrase);

        // batch sends never wait for confirmation
        let resolved = self
            .sender
            .resolve(&call)
            .await
            .map_err(|e| (RowStage::Resolving, e))?;
        let signed = self
            .sender
            .sign(resolved, passphrase)
            .await
            .map_err(|e| (RowStage::Signing, e))?;
        self.sender
            .submit(&signed)
            .await
            .map_err(|e| (RowStage::Submitting, e))
    }
}
