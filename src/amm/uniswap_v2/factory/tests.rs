use super::*;
use crate::backend::fake::{addr, FakeChain};

#[tokio::test]
async fn test_from_router() {
    let chain = FakeChain::new(None);
    let factory = UniswapV2Factory::from_router(&chain).await.unwrap();
    assert_eq!(factory.address, addr(0xf0));
}

#[tokio::test]
async fn test_get_pair_address() {
    let chain = FakeChain::new(None);
    let (weth, ytk) = (addr(0x20), addr(0x10));
    chain.set_pair(weth, ytk, 1, 1000);
    let factory = UniswapV2Factory::from_router(&chain).await.unwrap();
    let a1 = factory.get_pair_address(&chain, weth, ytk).await.unwrap();
    let a2 = factory.get_pair_address(&chain, ytk, weth).await.unwrap();
    assert_eq!(a1, a2);
    assert_eq!(a1, Some(addr(0xbeef)));
}

#[tokio::test]
async fn test_get_pair_address_missing_pair() {
    let chain = FakeChain::new(None);
    let factory = UniswapV2Factory::from_router(&chain).await.unwrap();
    let pair = factory
        .get_pair_address(&chain, addr(0x20), addr(0x10))
        .await
        .unwrap();
    assert_eq!(pair, None);
}
