//! Macro payloads for batch rows
//!
//! A payload of the form `$name(arg, ...)` is expanded into a concrete
//! recipient and ABI encoded call data before the row is submitted:
//!
//! - `$transfer(TOKEN, to, amount)`
//! - `$approve(TOKEN, spender, amount)`
//! - `$transferFrom(TOKEN, from, to, amount)`
//!
//! `TOKEN` is a symbol from the token file or a literal contract address.
//! Address arguments may be literal or one of `$sender` / `$receiver`, taken
//! from the row being expanded. Amounts are decimal strings in whole token
//! units, scaled by the token's decimals.

mod tokens;

pub use tokens::{TokenDefinition, TokenTable};

use crate::error::{DispatchError, DispatchResult};

use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::{id, parse_units};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use tracing::debug;

lazy_static! {
    static ref MACRO_CALL: Regex =
        Regex::new(r"^\s*\$([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)\s*$").unwrap();
}

/// Whether `payload` is an unexpanded macro expression. Performs no I/O.
pub fn is_macro_definition(payload: &str) -> bool {
    MACRO_CALL.is_match(payload)
}

/// Result of expanding a macro payload
#[derive(Debug, Clone, PartialEq)]
pub struct MacroExpansion {
    /// Contract the call is sent to
    pub to: Address,
    /// ABI encoded call data
    pub data: Bytes,
    /// Token definition the macro referenced, if it named one by symbol
    pub token: Option<TokenDefinition>,
}

/// ERC-20 calls a macro can expand to
#[derive(Debug, Clone, Copy)]
enum Erc20Call {
    Transfer,
    Approve,
    TransferFrom,
}

impl Erc20Call {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "transfer" => Some(Erc20Call::Transfer),
            "approve" => Some(Erc20Call::Approve),
            "transferFrom" => Some(Erc20Call::TransferFrom),
            _ => None,
        }
    }

    fn signature(self) -> &'static str {
        match self {
            Erc20Call::Transfer => "transfer(address,uint256)",
            Erc20Call::Approve => "approve(address,uint256)",
            Erc20Call::TransferFrom => "transferFrom(address,address,uint256)",
        }
    }

    /// Number of address arguments following the token
    fn address_args(self) -> usize {
        match self {
            Erc20Call::Transfer | Erc20Call::Approve => 1,
            Erc20Call::TransferFrom => 2,
        }
    }
}

/// Expands macro payloads against a token table
#[derive(Debug)]
pub struct MacroResolver {
    tokens: TokenTable,
}

impl MacroResolver {
    /// Build a resolver from a token definition file
    pub fn load(token_file: &Path) -> DispatchResult<Self> {
        let tokens = TokenTable::load(token_file)?;
        debug!("Loaded {} token definitions from {:?}", tokens.len(), token_file);
        Ok(Self::new(tokens))
    }

    pub fn new(tokens: TokenTable) -> Self {
        Self { tokens }
    }

    /// Expand `payload` using the row's sender and receiver as context
    pub fn parse(
        &self,
        payload: &str,
        sender: Address,
        receiver: Option<Address>,
    ) -> DispatchResult<MacroExpansion> {
        let caps = MACRO_CALL
            .captures(payload)
            .ok_or_else(|| DispatchError::Macro(format!("Not a macro expression: {}", payload)))?;

        let name = &caps[1];
        let call = Erc20Call::from_name(name)
            .ok_or_else(|| DispatchError::Macro(format!("Unknown macro ${}", name)))?;

        let args: Vec<&str> = caps[2].split(',').map(str::trim).collect();
        let expected = call.address_args() + 2;
        if args.len() != expected {
            return Err(DispatchError::Macro(format!(
                "${} takes {} arguments, got {}",
                name,
                expected,
                args.len()
            )));
        }

        let (to, decimals, token) = self.resolve_token(args[0])?;

        let mut tokens = Vec::with_capacity(expected - 1);
        for arg in &args[1..=call.address_args()] {
            tokens.push(Token::Address(resolve_address(arg, sender, receiver)?));
        }
        tokens.push(Token::Uint(parse_amount(args[expected - 1], decimals)?));

        let mut data = id(call.signature()).to_vec();
        data.extend_from_slice(&abi::encode(&tokens));

        Ok(MacroExpansion {
            to,
            data: data.into(),
            token,
        })
    }

    fn resolve_token(&self, arg: &str) -> DispatchResult<(Address, u32, Option<TokenDefinition>)> {
        if let Some(token) = self.tokens.get(arg) {
            return Ok((token.address, token.decimals, Some(token.clone())));
        }
        match arg.parse::<Address>() {
            Ok(address) => Ok((address, 0, None)),
            Err(_) => Err(DispatchError::Macro(format!("Unknown token {}", arg))),
        }
    }
}

fn resolve_address(arg: &str, sender: Address, receiver: Option<Address>) -> DispatchResult<Address> {
    match arg {
        "$sender" => Ok(sender),
        "$receiver" => receiver
            .ok_or_else(|| DispatchError::Macro("$receiver used in a row without receiver".into())),
        literal => literal
            .parse::<Address>()
            .map_err(|_| DispatchError::Macro(format!("Invalid address argument {}", literal))),
    }
}

fn parse_amount(amount: &str, decimals: u32) -> DispatchResult<U256> {
    if amount.is_empty() || amount.starts_with('-') {
        return Err(DispatchError::Macro(format!("Invalid amount {:?}", amount)));
    }
    if let Some((_, fraction)) = amount.split_once('.') {
        if fraction.len() > decimals as usize {
            return Err(DispatchError::Macro(format!(
                "Amount {} has more than {} decimals",
                amount, decimals
            )));
        }
    }
    parse_units(amount, decimals)
        .map(U256::from)
        .map_err(|e| DispatchError::Macro(format!("Invalid amount {:?}: {}", amount, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const USDT: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

    fn resolver() -> MacroResolver {
        let tokens = TokenTable::parse(&format!(
            "[[tokens]]\nsymbol = \"USDT\"\naddress = \"{}\"\ndecimals = 6\n",
            USDT
        ))
        .unwrap();
        MacroResolver::new(tokens)
    }

    fn sender() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn receiver() -> Address {
        Address::repeat_byte(0xbb)
    }

    #[test]
    fn test_detects_macro_expressions() {
        assert!(is_macro_definition("$transfer(USDT, $receiver, 10)"));
        assert!(is_macro_definition("  $approve(USDT,0x01,1)  "));
        assert!(!is_macro_definition(""));
        assert!(!is_macro_definition("0xa9059cbb"));
        assert!(!is_macro_definition("transfer(USDT, 1)"));
    }

    #[test]
    fn test_transfer_expansion() {
        let expansion = resolver()
            .parse("$transfer(usdt, $receiver, 1.5)", sender(), Some(receiver()))
            .unwrap();

        assert_eq!(expansion.to, USDT.parse::<Address>().unwrap());
        assert_eq!(expansion.token.unwrap().symbol, "USDT");

        let data = expansion.data.to_vec();
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        let decoded = abi::decode(
            &[abi::ParamType::Address, abi::ParamType::Uint(256)],
            &data[4..],
        )
        .unwrap();
        assert_eq!(decoded[0], Token::Address(receiver()));
        assert_eq!(decoded[1], Token::Uint(U256::from(1_500_000u64)));
    }

    #[test]
    fn test_transfer_from_uses_sender_context() {
        let expansion = resolver()
            .parse("$transferFrom(USDT, $sender, 0x00000000000000000000000000000000000000cc, 2)", sender(), None)
            .unwrap();

        let data = expansion.data.to_vec();
        assert_eq!(&data[..4], &id("transferFrom(address,address,uint256)"));
        let decoded = abi::decode(
            &[
                abi::ParamType::Address,
                abi::ParamType::Address,
                abi::ParamType::Uint(256),
            ],
            &data[4..],
        )
        .unwrap();
        assert_eq!(decoded[0], Token::Address(sender()));
        assert_eq!(decoded[2], Token::Uint(U256::from(2_000_000u64)));
    }

    #[test]
    fn test_literal_token_address_uses_raw_units() {
        let expansion = resolver()
            .parse(
                "$approve(0x1111111111111111111111111111111111111111, $receiver, 42)",
                sender(),
                Some(receiver()),
            )
            .unwrap();
        assert_eq!(expansion.to, Address::repeat_byte(0x11));
        assert!(expansion.token.is_none());
        assert_eq!(&expansion.data[expansion.data.len() - 1..], &[42]);
    }

    #[test]
    fn test_expansion_failures() {
        let resolver = resolver();
        let cases = [
            "$transfer(DAI, $receiver, 1)",
            "$transfer(USDT, $receiver)",
            "$mint(USDT, $receiver, 1)",
            "$transfer(USDT, nobody, 1)",
            "$transfer(USDT, $receiver, -1)",
            "$transfer(USDT, $receiver, 0.0000001)",
        ];
        for payload in cases {
            let err = resolver.parse(payload, sender(), Some(receiver())).unwrap_err();
            assert!(matches!(err, DispatchError::Macro(_)), "{}", payload);
        }
    }

    #[test]
    fn test_receiver_required_when_referenced() {
        let err = resolver()
            .parse("$transfer(USDT, $receiver, 1)", sender(), None)
            .unwrap_err();
        assert!(matches!(err, DispatchError::Macro(_)));
    }

    #[test]
    fn test_expanded_payload_is_not_a_macro() {
        let expansion = resolver()
            .parse("$transfer(USDT, $receiver, 3)", sender(), Some(receiver()))
            .unwrap();
        let expanded = format!("0x{}", hex::encode(&expansion.data));
        assert!(!is_macro_definition(&expanded));
    }
}
