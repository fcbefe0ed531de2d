//! Transaction intents and batch ranges

use crate::error::{DispatchError, DispatchResult};
use crate::macros::{is_macro_definition, MacroResolver};

use ethers::types::{Address, Bytes, U256};
use std::ops::Range;

/// Raw fields of one batch row, as stored in the batch file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchRow {
    pub sender: String,
    pub receiver: String,
    pub value: String,
    pub payload: String,
    pub passphrase: Option<String>,
}

/// Call data of an intent
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Raw(Bytes),
    /// Unexpanded `$macro(...)` expression
    Macro(String),
}

/// A validated request to send one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionIntent {
    pub sender: Address,
    /// `None` deploys a contract
    pub receiver: Option<Address>,
    pub value: U256,
    pub payload: Payload,
    pub passphrase: Option<String>,
}

/// Transaction fields before network parameters are filled in
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
}

impl TransactionIntent {
    /// Validate raw string fields into an intent
    pub fn parse(
        sender: &str,
        receiver: &str,
        value: &str,
        payload: &str,
        passphrase: Option<&str>,
    ) -> DispatchResult<Self> {
        let sender = sender.trim();
        if sender.is_empty() {
            return Err(invalid("empty sender"));
        }
        let sender = parse_address(sender).ok_or_else(|| invalid(format!("bad sender {}", sender)))?;

        let receiver = receiver.trim();
        let receiver = if receiver.is_empty() {
            None
        } else {
            Some(parse_address(receiver).ok_or_else(|| invalid(format!("bad receiver {}", receiver)))?)
        };

        let value = value.trim();
        let value = if value.is_empty() {
            U256::zero()
        } else {
            U256::from_dec_str(value).map_err(|_| invalid(format!("bad value {}", value)))?
        };

        let payload = payload.trim();
        let payload = if is_macro_definition(payload) {
            Payload::Macro(payload.to_string())
        } else {
            let digits = payload.strip_prefix("0x").unwrap_or(payload);
            let bytes = hex::decode(digits).map_err(|_| invalid(format!("bad payload {}", payload)))?;
            Payload::Raw(bytes.into())
        };

        if receiver.is_none() && matches!(&payload, Payload::Raw(data) if data.is_empty()) {
            return Err(invalid("contract creation without code"));
        }

        Ok(Self {
            sender,
            receiver,
            value,
            payload,
            passphrase: passphrase.filter(|p| !p.is_empty()).map(str::to_string),
        })
    }

    /// Validate one batch row
    pub fn from_row(row: &BatchRow) -> DispatchResult<Self> {
        Self::parse(
            &row.sender,
            &row.receiver,
            &row.value,
            &row.payload,
            row.passphrase.as_deref(),
        )
    }

    pub fn is_macro(&self) -> bool {
        matches!(self.payload, Payload::Macro(_))
    }

    /// Produce the call to submit, expanding a macro payload first.
    /// A macro payload without a resolver is an error, never raw call data.
    pub fn to_call(&self, resolver: Option<&MacroResolver>) -> DispatchResult<CallRequest> {
        match &self.payload {
            Payload::Raw(data) => Ok(CallRequest {
                from: self.sender,
                to: self.receiver,
                value: self.value,
                data: data.clone(),
            }),
            Payload::Macro(expression) => {
                let resolver = resolver
                    .ok_or_else(|| DispatchError::Macro("No token definitions loaded".into()))?;
                let expansion = resolver.parse(expression, self.sender, self.receiver)?;
                Ok(CallRequest {
                    from: self.sender,
                    to: Some(expansion.to),
                    value: self.value,
                    data: expansion.data,
                })
            }
        }
    }
}

fn parse_address(input: &str) -> Option<Address> {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    if digits.len() != 40 {
        return None;
    }
    digits.parse().ok()
}

fn invalid(reason: impl Into<String>) -> DispatchError {
    DispatchError::InvalidArguments(reason.into())
}

/// Half-open range `[begin, end)` of rows to process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    pub begin: usize,
    pub end: usize,
}

impl BatchRange {
    /// Reject a range that is empty whatever the file holds. Run before
    /// the batch file is read.
    pub fn precheck(begin: usize, end: Option<usize>) -> DispatchResult<()> {
        match end {
            Some(end) if begin >= end => Err(DispatchError::InvalidBatchRange { begin, end }),
            _ => Ok(()),
        }
    }

    /// Resolve against the number of rows; `end` defaults to `rows`
    pub fn resolve(begin: usize, end: Option<usize>, rows: usize) -> DispatchResult<Self> {
        let end = end.unwrap_or(rows);
        if begin >= end || end > rows {
            return Err(DispatchError::InvalidBatchRange { begin, end });
        }
        Ok(Self { begin, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }

    pub fn indices(&self) -> Range<usize> {
        self.begin..self.end
    }
}
