use std::sync::Arc;

use ethers::types::U256;
use serde::Serialize;
use tracing::debug;

use crate::{
    amm::uniswap_v2::{
        factory::UniswapV2Factory,
        math::{quote_liquidity, AmmError},
        pool::UniswapV2Pool,
    },
    backend::DexBackend,
    error::{DexError, ErrorKind},
    market::Market,
    token::Side,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidityAmounts {
    pub native: U256,
    pub token: U256,
    pub native_formatted: String,
    pub token_formatted: String,
}

/// Derives the second deposit amount from the current pool ratio.
pub struct LiquidityPlanner<B: ?Sized> {
    backend: Arc<B>,
    market: Market,
}

impl<B: DexBackend + ?Sized> LiquidityPlanner<B> {
    pub fn new(backend: Arc<B>, market: Market) -> Self {
        LiquidityPlanner { backend, market }
    }

    /// Given `amount` of `side`, returns both deposit amounts at the current
    /// ratio `other = amount * other_reserve / input_reserve`. Reserves are
    /// read on every call.
    pub async fn counterpart(&self, side: Side, amount: &str) -> Result<LiquidityAmounts, DexError> {
        let input = self.market.pair.token(side);
        let other = self.market.pair.token(side.other());
        let amount_in = input.parse(amount)?;

        let factory = UniswapV2Factory::from_router(self.backend.as_ref()).await?;
        let pool = UniswapV2Pool::load(self.backend.as_ref(), &factory, input.address, other.address)
            .await?
            .ok_or_else(|| DexError::new(ErrorKind::NoLiquidity, "Pair does not exist yet"))?;
        let reserve_in = U256::from(pool.get_reserve_for_token(&input.address));
        let reserve_other = U256::from(pool.get_reserve_for_token(&other.address));
        debug!(pair = ?pool.address, %reserve_in, %reserve_other, "liquidity ratio");

        let amount_other = quote_liquidity(amount_in, reserve_in, reserve_other).map_err(|err| match err {
            AmmError::InsufficientInputAmount => DexError::invalid_amount("Amount must be greater than zero"),
            AmmError::InsufficientLiquidity => DexError::new(ErrorKind::NoLiquidity, "Pool has no reserves"),
            AmmError::Overflow => DexError::invalid_amount(err.to_string()),
        })?;

        let (native, token) = match side {
            Side::Native => (amount_in, amount_other),
            Side::Token => (amount_other, amount_in),
        };
        Ok(LiquidityAmounts {
            native,
            token,
            native_formatted: self.market.pair.wrapped.format(native),
            token_formatted: self.market.pair.token.format(token),
        })
    }
}
