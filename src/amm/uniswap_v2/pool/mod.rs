use ethers::types::{H160, U256};
use serde::Serialize;

use super::{factory::UniswapV2Factory, math::sort_tokens};
use crate::backend::DexBackend;

/// Reserves of one pair, as reported by `getReserves()` at read time.
/// Never cached beyond the caller's scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UniswapV2Pool {
    pub address: H160,
    pub token_0: H160,
    pub token_1: H160,
    pub reserve_0: u128,
    pub reserve_1: u128,
}

impl UniswapV2Pool {
    pub fn new(address: H160, token_a: H160, token_b: H160, reserve_0: u128, reserve_1: u128) -> Self {
        let (token_0, token_1) = sort_tokens(token_a, token_b);
        UniswapV2Pool {
            address,
            token_0,
            token_1,
            reserve_0,
            reserve_1,
        }
    }

    /// Looks the pair up through the factory and reads its reserves.
    /// `Ok(None)` when no pair exists for the two tokens.
    pub async fn load<B: DexBackend + ?Sized>(
        backend: &B,
        factory: &UniswapV2Factory,
        token_a: H160,
        token_b: H160,
    ) -> eyre::Result<Option<Self>> {
        let Some(address) = factory.get_pair_address(backend, token_a, token_b).await? else {
            return Ok(None);
        };
        let mut pool = Self::new(address, token_a, token_b, 0, 0);
        pool.sync_reserves(backend).await?;
        Ok(Some(pool))
    }

    pub async fn get_reserves<B: DexBackend + ?Sized>(&self, backend: &B) -> eyre::Result<(u128, u128)> {
        backend.get_reserves(self.address).await
    }

    pub async fn sync_reserves<B: DexBackend + ?Sized>(&mut self, backend: &B) -> eyre::Result<()> {
        (self.reserve_0, self.reserve_1) = self.get_reserves(backend).await?;
        Ok(())
    }

    pub fn get_reserve_for_token(&self, token: &H160) -> u128 {
        if *token == self.token_0 {
            self.reserve_0
        } else if *token == self.token_1 {
            self.reserve_1
        } else {
            0
        }
    }

    /// `(reserve_in, reserve_out)` for a trade selling `sell`.
    pub fn oriented(&self, sell: &H160) -> (U256, U256) {
        if *sell == self.token_0 {
            (self.reserve_0.into(), self.reserve_1.into())
        } else {
            (self.reserve_1.into(), self.reserve_0.into())
        }
    }

    pub fn has_liquidity(&self) -> bool {
        self.reserve_0 > 0 && self.reserve_1 > 0
    }
}

#[cfg(test)]
mod tests;
