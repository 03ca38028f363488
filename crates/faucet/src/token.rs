//! ERC-20 token handles and call encoding

use crate::config::TokenConfig;
use crate::error::{FaucetError, FaucetResult};
use ethabi::{ParamType, Token, Uint};
use kol_common::Address;
use tracing::error;

/// A configured faucet token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHandle {
    pub symbol: String,
    pub address: Address,
    /// Per-request amount in base units
    pub amount: Uint,
    pub decimals: u32,
}

impl TokenHandle {
    /// Build from configuration. An unparseable amount is logged and treated
    /// as zero, which disables that token.
    pub fn from_config(config: &TokenConfig, decimals: u32) -> FaucetResult<Self> {
        let address = config.address.parse::<Address>().map_err(|e| {
            FaucetError::Configuration(format!("{} address: {}", config.symbol, e))
        })?;

        let amount = parse_units(&config.amount, decimals).unwrap_or_else(|e| {
            error!(
                "Invalid faucet amount {:?} for {}: {}. Defaulting to 0.",
                config.amount, config.symbol, e
            );
            Uint::zero()
        });

        Ok(Self {
            symbol: config.symbol.clone(),
            address,
            amount,
            decimals,
        })
    }

    /// Amount in whole tokens, for logs
    pub fn display_amount(&self) -> String {
        format_units(self.amount, self.decimals)
    }
}

/// Convert a decimal token amount (e.g. `"12.5"`) to base units
pub fn parse_units(amount: &str, decimals: u32) -> FaucetResult<Uint> {
    let amount = amount.trim();
    let invalid = || FaucetError::Configuration(format!("invalid token amount {:?}", amount));

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > decimals as usize {
        return Err(FaucetError::Configuration(format!(
            "token amount {:?} has more than {} decimals",
            amount, decimals
        )));
    }

    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(whole);
    digits.push_str(fraction);
    digits.extend(std::iter::repeat('0').take(decimals as usize - fraction.len()));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(Uint::zero());
    }
    Uint::from_dec_str(digits).map_err(|_| invalid())
}

/// Base units back to a decimal string, trailing zeros trimmed
pub fn format_units(amount: Uint, decimals: u32) -> String {
    let unit = Uint::exp10(decimals as usize);
    let whole = amount / unit;
    let fraction = amount % unit;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

/// Calldata for `transfer(address,uint256)`
pub fn encode_transfer(to: &Address, amount: Uint) -> Vec<u8> {
    let mut data =
        ethabi::short_signature("transfer", &[ParamType::Address, ParamType::Uint(256)]).to_vec();
    data.extend(ethabi::encode(&[
        Token::Address(ethabi::Address::from(to.0)),
        Token::Uint(amount),
    ]));
    data
}

/// Calldata for `balanceOf(address)`
pub fn encode_balance_of(owner: &Address) -> Vec<u8> {
    let mut data = ethabi::short_signature("balanceOf", &[ParamType::Address]).to_vec();
    data.extend(ethabi::encode(&[Token::Address(ethabi::Address::from(owner.0))]));
    data
}

/// Decode a single `uint256` return value
pub fn decode_uint(output: &[u8]) -> FaucetResult<Uint> {
    let tokens = ethabi::decode(&[ParamType::Uint(256)], output)
        .map_err(|e| FaucetError::RpcError(format!("cannot decode uint256: {}", e)))?;
    match tokens.into_iter().next() {
        Some(Token::Uint(value)) => Ok(value),
        _ => Err(FaucetError::RpcError("empty uint256 result".to_string())),
    }
}
