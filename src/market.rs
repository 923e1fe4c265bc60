use ethers::types::H160;
use serde::Serialize;
use tracing::debug;

use crate::{
    address_book::{AddressBook, SwapSettings},
    backend::DexBackend,
    token::{Token, TradePair, DEFAULT_DECIMALS},
};

/// Everything the quote engine and the orchestrator share about one
/// deployment: the router, the token pair with resolved decimals, and the
/// tunables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Market {
    pub router: H160,
    pub pair: TradePair,
    pub settings: SwapSettings,
}

impl Market {
    pub fn new(router: H160, pair: TradePair, settings: SwapSettings) -> Self {
        Market {
            router,
            pair,
            settings,
        }
    }

    /// Builds the market from a deployment, reading the token's decimals on-chain.
    /// The wrapper always uses 18 decimals, like the native coin it wraps.
    pub async fn resolve<B: DexBackend + ?Sized>(backend: &B, book: &AddressBook) -> Self {
        let wrapped = Token::new(book.wrapped_symbol.clone(), book.wrapped, DEFAULT_DECIMALS);
        let token = Token::resolve(backend, book.token_symbol.clone(), book.token).await;
        debug!(token = %token.symbol, decimals = token.decimals, "market resolved");
        Market::new(
            book.router,
            TradePair::new(book.native_symbol.clone(), wrapped, token),
            book.settings.clone(),
        )
    }
}
