use std::fmt;

use ethers::{
    types::{H160, U256},
    utils::{format_units, parse_units},
};
use serde::Serialize;
use tracing::warn;

use crate::{backend::DexBackend, error::DexError};

pub const DEFAULT_DECIMALS: u8 = 18;
const MAX_DECIMALS: u8 = 36;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub symbol: String,
    pub address: H160,
    pub decimals: u8,
}

impl Token {
    pub fn new(symbol: impl Into<String>, address: H160, decimals: u8) -> Self {
        Token {
            symbol: symbol.into(),
            address,
            decimals,
        }
    }

    /// Reads `decimals()` from the token contract. Falls back to 18 when the
    /// call fails or reports something implausible, so balances still render.
    pub async fn resolve<B: DexBackend + ?Sized>(
        backend: &B,
        symbol: impl Into<String>,
        address: H160,
    ) -> Self {
        let symbol = symbol.into();
        let decimals = match backend.token_decimals(address).await {
            Ok(d) if (1..=MAX_DECIMALS).contains(&d) => d,
            Ok(d) => {
                warn!(%symbol, decimals = d, "implausible token decimals, using 18");
                DEFAULT_DECIMALS
            }
            Err(err) => {
                warn!(%symbol, error = %err, "could not read token decimals, using 18");
                DEFAULT_DECIMALS
            }
        };
        Token::new(symbol, address, decimals)
    }

    pub fn parse(&self, amount: &str) -> Result<U256, DexError> {
        parse_amount(amount, self.decimals)
    }

    pub fn format(&self, amount: U256) -> String {
        format_amount(amount, self.decimals)
    }
}

/// Parses a decimal string into the token's fixed-point integer representation.
/// More fractional digits than the token carries is a format error.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, DexError> {
    let trimmed = checked_amount(amount)?;
    if let Some((_, frac)) = trimmed.split_once('.') {
        if frac.len() > decimals as usize {
            return Err(invalid_format(amount));
        }
    }
    parse_units(trimmed, decimals as u32)
        .map(U256::from)
        .map_err(|_| invalid_format(amount))
}

/// Like [`parse_amount`], but digits beyond the token's precision are
/// dropped. Used for values derived by the client, not typed sell amounts.
pub fn parse_amount_truncating(amount: &str, decimals: u8) -> Result<U256, DexError> {
    let trimmed = checked_amount(amount)?;
    let trimmed = match trimmed.split_once('.') {
        Some((whole, frac))
            if frac.len() > decimals as usize && frac.bytes().all(|b| b.is_ascii_digit()) =>
        {
            let cut = whole.len() + 1 + decimals as usize;
            trimmed[..cut].trim_end_matches('.')
        }
        _ => trimmed,
    };
    parse_units(trimmed, decimals as u32)
        .map(U256::from)
        .map_err(|_| invalid_format(amount))
}

fn checked_amount(amount: &str) -> Result<&str, DexError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return Err(invalid_format(amount));
    }
    Ok(trimmed)
}

fn invalid_format(amount: &str) -> DexError {
    DexError::invalid_amount(format!("Invalid amount format: {}", amount))
}

/// Formats a fixed-point integer, trimming trailing zeros but keeping one
/// fractional digit (`1.0`, `0.25`).
pub fn format_amount(amount: U256, decimals: u8) -> String {
    let formatted = match format_units(amount, decimals as u32) {
        Ok(s) => s,
        Err(_) => return amount.to_string(),
    };
    match formatted.split_once('.') {
        Some((whole, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                format!("{}.0", whole)
            } else {
                format!("{}.{}", whole, frac)
            }
        }
        None => format!("{}.0", formatted),
    }
}

/// Rescales a raw amount between two decimal precisions, truncating.
pub fn rescale(amount: U256, from_decimals: u8, to_decimals: u8) -> U256 {
    if from_decimals == to_decimals {
        amount
    } else if to_decimals > from_decimals {
        amount.saturating_mul(U256::exp10((to_decimals - from_decimals) as usize))
    } else {
        amount / U256::exp10((from_decimals - to_decimals) as usize)
    }
}

/// One side of the fixed native/token pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Native,
    Token,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Native => Side::Token,
            Side::Token => Side::Native,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwapDirection {
    NativeToToken,
    TokenToNative,
}

impl SwapDirection {
    pub fn selling(side: Side) -> Self {
        match side {
            Side::Native => SwapDirection::NativeToToken,
            Side::Token => SwapDirection::TokenToNative,
        }
    }

    pub fn sell_side(self) -> Side {
        match self {
            SwapDirection::NativeToToken => Side::Native,
            SwapDirection::TokenToNative => Side::Token,
        }
    }

    pub fn buy_side(self) -> Side {
        self.sell_side().other()
    }
}

/// The fixed two-token set: the chain's native coin (traded through its
/// wrapper) and one ERC-20 token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradePair {
    pub native_symbol: String,
    pub wrapped: Token,
    pub token: Token,
}

impl TradePair {
    pub fn new(native_symbol: impl Into<String>, wrapped: Token, token: Token) -> Self {
        TradePair {
            native_symbol: native_symbol.into(),
            wrapped,
            token,
        }
    }

    /// Token standing for `side` on-chain. The native side trades as its wrapper.
    pub fn token(&self, side: Side) -> &Token {
        match side {
            Side::Native => &self.wrapped,
            Side::Token => &self.token,
        }
    }

    pub fn symbol(&self, side: Side) -> &str {
        match side {
            Side::Native => &self.native_symbol,
            Side::Token => &self.token.symbol,
        }
    }

    pub fn sell_token(&self, direction: SwapDirection) -> &Token {
        self.token(direction.sell_side())
    }

    pub fn buy_token(&self, direction: SwapDirection) -> &Token {
        self.token(direction.buy_side())
    }

    pub fn path(&self, direction: SwapDirection) -> Vec<H160> {
        vec![
            self.sell_token(direction).address,
            self.buy_token(direction).address,
        ]
    }

    /// Resolves a user-supplied symbol. The wrapper symbol counts as the native side.
    pub fn side(&self, symbol: &str) -> Option<Side> {
        if symbol.eq_ignore_ascii_case(&self.native_symbol)
            || symbol.eq_ignore_ascii_case(&self.wrapped.symbol)
        {
            Some(Side::Native)
        } else if symbol.eq_ignore_ascii_case(&self.token.symbol) {
            Some(Side::Token)
        } else {
            None
        }
    }
}

impl fmt::Display for TradePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.native_symbol, self.token.symbol)
    }
}
