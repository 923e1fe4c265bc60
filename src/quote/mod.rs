//! Swap quotes: the router's `getAmountsOut` first, then a local
//! constant-product calculation from fresh reserves when the router call fails.

pub mod debounce;

use std::{fmt, sync::Arc};

use ethers::types::U256;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    amm::uniswap_v2::{
        factory::UniswapV2Factory,
        math::{get_amount_out, AmmError},
        pool::UniswapV2Pool,
    },
    backend::DexBackend,
    error::{DexError, ErrorKind},
    market::Market,
    token::SwapDirection,
    trade::slippage::Slippage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuoteSource {
    Router,
    Manual,
}

/// Why no numeric quote could be produced. `Display` is the text shown in
/// place of the amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QuoteUnavailable {
    Empty,
    RouterNotDeployed,
    WrappedNotDeployed,
    InvalidFormat(String),
    InvalidAmount,
    NoLiquidity,
    InsufficientLiquidity,
    PoolTooImbalanced,
    Failed(ErrorKind),
}

impl QuoteUnavailable {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QuoteUnavailable::Empty => ErrorKind::QuoteUnavailable,
            QuoteUnavailable::RouterNotDeployed | QuoteUnavailable::WrappedNotDeployed => {
                ErrorKind::RouterNotDeployed
            }
            QuoteUnavailable::InvalidFormat(_) | QuoteUnavailable::InvalidAmount => {
                ErrorKind::InvalidAmount
            }
            QuoteUnavailable::NoLiquidity | QuoteUnavailable::InsufficientLiquidity => {
                ErrorKind::NoLiquidity
            }
            QuoteUnavailable::PoolTooImbalanced => ErrorKind::QuoteUnavailable,
            QuoteUnavailable::Failed(kind) => *kind,
        }
    }
}

impl fmt::Display for QuoteUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteUnavailable::Empty => Ok(()),
            QuoteUnavailable::RouterNotDeployed => f.write_str("Router not deployed"),
            QuoteUnavailable::WrappedNotDeployed => f.write_str("WTIA not deployed"),
            QuoteUnavailable::InvalidFormat(amount) => write!(f, "Invalid amount format: {}", amount),
            QuoteUnavailable::InvalidAmount => f.write_str("Invalid amount"),
            QuoteUnavailable::NoLiquidity => f.write_str("No liquidity"),
            QuoteUnavailable::InsufficientLiquidity => f.write_str("Insufficient liquidity"),
            QuoteUnavailable::PoolTooImbalanced => {
                f.write_str("Pool too imbalanced - add more liquidity")
            }
            QuoteUnavailable::Failed(kind) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Quote {
    Amount {
        raw: U256,
        formatted: String,
        decimals: u8,
        source: QuoteSource,
    },
    Unavailable(QuoteUnavailable),
}

impl Quote {
    pub fn amount(&self) -> Option<U256> {
        match self {
            Quote::Amount { raw, .. } => Some(*raw),
            Quote::Unavailable(_) => None,
        }
    }

    /// Smallest output accepted at `slippage`, never below one base unit.
    pub fn min_received(&self, slippage: Slippage) -> Option<U256> {
        self.amount().map(|raw| slippage.apply(raw))
    }
}

impl fmt::Display for Quote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quote::Amount { formatted, .. } => f.write_str(formatted),
            Quote::Unavailable(reason) => write!(f, "{}", reason),
        }
    }
}

impl From<QuoteUnavailable> for Quote {
    fn from(reason: QuoteUnavailable) -> Self {
        Quote::Unavailable(reason)
    }
}

pub struct QuoteEngine<B: ?Sized> {
    backend: Arc<B>,
    market: Market,
}

impl<B: DexBackend + ?Sized> QuoteEngine<B> {
    pub fn new(backend: Arc<B>, market: Market) -> Self {
        QuoteEngine { backend, market }
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    /// Expected output for selling `amount` in `direction`. Never fails: every
    /// problem becomes a [`QuoteUnavailable`].
    pub async fn quote(&self, direction: SwapDirection, amount: &str) -> Quote {
        if amount.trim().is_empty() {
            return QuoteUnavailable::Empty.into();
        }
        if self.market.router.is_zero() {
            return QuoteUnavailable::RouterNotDeployed.into();
        }
        if self.market.pair.wrapped.address.is_zero() {
            return QuoteUnavailable::WrappedNotDeployed.into();
        }
        let sell = self.market.pair.sell_token(direction);
        let Ok(amount_in) = sell.parse(amount) else {
            return QuoteUnavailable::InvalidFormat(amount.to_string()).into();
        };
        if amount_in.is_zero() {
            return QuoteUnavailable::InvalidAmount.into();
        }

        let path = self.market.pair.path(direction);
        debug!(?direction, %amount_in, ?path, "requesting router quote");
        match self.backend.get_amounts_out(amount_in, path).await {
            Ok(amounts) => match amounts.last() {
                Some(out) => self.amount(direction, *out, QuoteSource::Router),
                None => QuoteUnavailable::NoLiquidity.into(),
            },
            Err(err) => {
                warn!(error = %format!("{:#}", err), "router quote failed, calculating from reserves");
                match self.manual_quote(direction, amount_in).await {
                    Ok(quote) => quote,
                    Err(err) => {
                        let err = DexError::classify(&err, ErrorKind::QuoteUnavailable);
                        warn!(error = %err, "manual quote failed");
                        QuoteUnavailable::Failed(err.kind).into()
                    }
                }
            }
        }
    }

    async fn manual_quote(&self, direction: SwapDirection, amount_in: U256) -> eyre::Result<Quote> {
        let sell = self.market.pair.sell_token(direction);
        let buy = self.market.pair.buy_token(direction);
        let factory = UniswapV2Factory::from_router(self.backend.as_ref()).await?;
        let Some(pool) =
            UniswapV2Pool::load(self.backend.as_ref(), &factory, sell.address, buy.address).await?
        else {
            return Ok(QuoteUnavailable::NoLiquidity.into());
        };
        let (reserve_in, reserve_out) = pool.oriented(&sell.address);
        debug!(pair = ?pool.address, %reserve_in, %reserve_out, %amount_in, "manual quote inputs");

        let quote = match get_amount_out(amount_in, reserve_in, reserve_out) {
            Ok(out) if out.is_zero() => {
                warn!(%reserve_in, %reserve_out, "quote is zero, pool too imbalanced");
                QuoteUnavailable::PoolTooImbalanced.into()
            }
            Ok(out) => self.amount(direction, out, QuoteSource::Manual),
            Err(AmmError::InsufficientLiquidity) => QuoteUnavailable::InsufficientLiquidity.into(),
            Err(AmmError::InsufficientInputAmount) => QuoteUnavailable::InvalidAmount.into(),
            Err(AmmError::Overflow) => QuoteUnavailable::Failed(ErrorKind::QuoteUnavailable).into(),
        };
        Ok(quote)
    }

    fn amount(&self, direction: SwapDirection, raw: U256, source: QuoteSource) -> Quote {
        let buy = self.market.pair.buy_token(direction);
        if buy.decimals >= 6 && raw < U256::exp10((buy.decimals - 6) as usize) {
            warn!(output = %raw, token = %buy.symbol, "very small output, the pool may be imbalanced");
        }
        Quote::Amount {
            raw,
            formatted: buy.format(raw),
            decimals: buy.decimals,
            source,
        }
    }
}
