//! Token definition table loaded from a TOML file
//!
//! ```toml
//! [[tokens]]
//! symbol = "USDT"
//! address = "0xdAC17F958D2ee523a2206206994597C13D831ec7"
//! decimals = 6
//! ```

use crate::error::{DispatchError, DispatchResult};

use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// A single ERC-20 token
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenDefinition {
    pub symbol: String,
    pub address: Address,
    #[serde(default)]
    pub decimals: u32,
}

#[derive(Deserialize)]
struct TokenFile {
    #[serde(default)]
    tokens: Vec<TokenDefinition>,
}

/// Tokens indexed by upper-cased symbol
#[derive(Debug, Default)]
pub struct TokenTable {
    tokens: HashMap<String, TokenDefinition>,
}

impl TokenTable {
    /// Load a token table from disk
    pub fn load(path: &Path) -> DispatchResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DispatchError::TokenDefinition(format!("Failed to read token file {:?}: {}", path, e))
        })?;
        Self::parse(&contents)
    }

    /// Parse a token table from TOML text
    pub fn parse(contents: &str) -> DispatchResult<Self> {
        let file: TokenFile = toml::from_str(contents)
            .map_err(|e| DispatchError::TokenDefinition(e.to_string()))?;

        let mut tokens = HashMap::new();
        for token in file.tokens {
            if token.decimals > 77 {
                return Err(DispatchError::TokenDefinition(format!(
                    "Token {} has unsupported decimals {}",
                    token.symbol, token.decimals
                )));
            }
            let key = token.symbol.to_uppercase();
            if tokens.insert(key, token.clone()).is_some() {
                return Err(DispatchError::TokenDefinition(format!(
                    "Duplicate token symbol {}",
                    token.symbol
                )));
            }
        }

        Ok(Self { tokens })
    }

    /// Look up a token by symbol, ignoring case
    pub fn get(&self, symbol: &str) -> Option<&TokenDefinition> {
        self.tokens.get(&symbol.to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
