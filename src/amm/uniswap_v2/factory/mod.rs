use ethers::types::H160;

use crate::backend::DexBackend;

pub struct UniswapV2Factory {
    pub address: H160,
}

impl UniswapV2Factory {
    pub fn new(address: H160) -> Self {
        UniswapV2Factory { address }
    }

    /// Resolves the factory the router was deployed against.
    pub async fn from_router<B: DexBackend + ?Sized>(backend: &B) -> eyre::Result<Self> {
        Ok(Self::new(backend.router_factory().await?))
    }

    /// Pair address for two tokens in either order, `None` if the factory
    /// never created the pair.
    pub async fn get_pair_address<B: DexBackend + ?Sized>(
        &self,
        backend: &B,
        token_a: H160,
        token_b: H160,
    ) -> eyre::Result<Option<H160>> {
        let pair = backend.get_pair(self.address, token_a, token_b).await?;
        Ok((!pair.is_zero()).then_some(pair))
    }
}

#[cfg(test)]
mod tests;
