use super::*;
use crate::backend::fake::{addr, FakeChain};

fn setup() -> (FakeChain, H160, H160) {
    let chain = FakeChain::new(None);
    let (weth, ytk) = (addr(0x20), addr(0x10));
    chain.set_pair(weth, ytk, 1_000, 1_000_000);
    (chain, weth, ytk)
}

#[tokio::test]
async fn test_load() {
    let (chain, weth, ytk) = setup();
    let factory = UniswapV2Factory::from_router(&chain).await.unwrap();
    let pool = UniswapV2Pool::load(&chain, &factory, weth, ytk)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pool.address, addr(0xbeef));
    assert_eq!(pool.token_0, ytk);
    assert_eq!(pool.token_1, weth);
    assert_eq!(pool.get_reserve_for_token(&weth), 1_000);
    assert_eq!(pool.get_reserve_for_token(&ytk), 1_000_000);
    assert!(pool.has_liquidity());
}

#[tokio::test]
async fn test_load_missing_pair() {
    let chain = FakeChain::new(None);
    let factory = UniswapV2Factory::from_router(&chain).await.unwrap();
    let pool = UniswapV2Pool::load(&chain, &factory, addr(1), addr(2))
        .await
        .unwrap();
    assert!(pool.is_none());
}

#[tokio::test]
async fn test_sync_reserves() {
    let (chain, weth, ytk) = setup();
    let factory = UniswapV2Factory::from_router(&chain).await.unwrap();
    let mut pool = UniswapV2Pool::load(&chain, &factory, weth, ytk)
        .await
        .unwrap()
        .unwrap();
    chain.set_pair(weth, ytk, 2_000, 500_000);
    pool.sync_reserves(&chain).await.unwrap();
    assert_eq!(pool.get_reserve_for_token(&weth), 2_000);
    assert_eq!(pool.get_reserve_for_token(&ytk), 500_000);
}

#[test]
fn test_oriented_follows_address_order() {
    let (weth, ytk) = (addr(0x20), addr(0x10));
    let pool = UniswapV2Pool::new(addr(0xbeef), weth, ytk, 1_000_000, 1_000);
    // ytk sorts first, so reserve_0 belongs to ytk
    assert_eq!(pool.oriented(&ytk), (U256::from(1_000_000), U256::from(1_000)));
    assert_eq!(pool.oriented(&weth), (U256::from(1_000), U256::from(1_000_000)));
}
