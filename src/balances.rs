use std::{sync::Arc, time::Duration};

use ethers::types::{H160, U256};
use serde::Serialize;
use tokio::{sync::Notify, time::MissedTickBehavior};
use tracing::{debug, warn};

use crate::{backend::DexBackend, format::format_balance, token::TradePair};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Balances {
    pub native: U256,
    pub wrapped: U256,
    pub token: U256,
    pub wrapped_decimals: u8,
    pub token_decimals: u8,
}

impl Balances {
    /// `(symbol, display amount)` rows in native, wrapped, token order.
    pub fn rows(&self, pair: &TradePair) -> Vec<(String, String)> {
        vec![
            (
                pair.native_symbol.clone(),
                format_balance(&pair.wrapped.format(self.native)),
            ),
            (
                pair.wrapped.symbol.clone(),
                format_balance(&pair.wrapped.format(self.wrapped)),
            ),
            (
                pair.token.symbol.clone(),
                format_balance(&pair.token.format(self.token)),
            ),
        ]
    }
}

pub struct BalanceReader<B: ?Sized> {
    backend: Arc<B>,
    pair: TradePair,
    last: Balances,
    refresh: Arc<Notify>,
}

impl<B: DexBackend + ?Sized> BalanceReader<B> {
    pub fn new(backend: Arc<B>, pair: TradePair) -> Self {
        let last = Balances {
            wrapped_decimals: pair.wrapped.decimals,
            token_decimals: pair.token.decimals,
            ..Default::default()
        };
        BalanceReader {
            backend,
            pair,
            last,
            refresh: Arc::new(Notify::new()),
        }
    }

    /// Handle that triggers an immediate refresh of a running [`watch`](Self::watch).
    pub fn refresh_handle(&self) -> Arc<Notify> {
        self.refresh.clone()
    }

    /// Reads all three balances. A failed token read keeps the last known value.
    pub async fn fetch(&mut self, account: H160) -> eyre::Result<Balances> {
        self.last.native = self.backend.native_balance(account).await?;
        let (wrapped, token) = futures::join!(
            self.backend.token_balance(self.pair.wrapped.address, account),
            self.backend.token_balance(self.pair.token.address, account),
        );
        match wrapped {
            Ok(balance) => self.last.wrapped = balance,
            Err(err) => warn!(token = %self.pair.wrapped.symbol, error = %err, "keeping previous balance"),
        }
        match token {
            Ok(balance) => self.last.token = balance,
            Err(err) => warn!(token = %self.pair.token.symbol, error = %err, "keeping previous balance"),
        }
        Ok(self.last.clone())
    }

    /// Polls every `interval` and whenever the refresh handle is notified.
    /// Runs until `on_update` returns `false`.
    pub async fn watch<F>(&mut self, account: H160, interval: Duration, mut on_update: F)
    where
        F: FnMut(&Balances) -> bool,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let refresh = self.refresh.clone();
        loop {
            tokio::select! {
                _ = ticker.tick() => debug!("balance poll"),
                _ = refresh.notified() => debug!("balance refresh requested"),
            }
            match self.fetch(account).await {
                Ok(balances) => {
                    if !on_update(&balances) {
                        return;
                    }
                }
                Err(err) => warn!(error = %format!("{:#}", err), "balance refresh failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::fake::{addr, FakeChain},
        market::test_utils::{market, ytk},
    };

    fn account() -> H160 {
        addr(0xacc)
    }

    fn chain() -> Arc<FakeChain> {
        let chain = Arc::new(FakeChain::new(Some(account())));
        {
            let mut state = chain.state.lock().unwrap();
            state.native_balances.insert(account(), U256::exp10(18) * 3);
            state.balances.insert((addr(0x20), account()), U256::exp10(17));
            state.balances.insert((ytk(), account()), U256::from(2_500_000));
        }
        chain
    }

    #[tokio::test]
    async fn test_fetch() {
        let mut reader = BalanceReader::new(chain(), market(6).pair);
        let balances = reader.fetch(account()).await.unwrap();
        assert_eq!(balances.native, U256::exp10(18) * 3);
        assert_eq!(balances.wrapped, U256::exp10(17));
        assert_eq!(balances.token, U256::from(2_500_000));
        let pair = market(6).pair;
        assert_eq!(
            balances.rows(&pair),
            vec![
                ("TIA".to_string(), "3".to_string()),
                ("WTIA".to_string(), "0.1".to_string()),
                ("YTK".to_string(), "2.5".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_token_read_keeps_previous_value() {
        let chain = chain();
        let mut reader = BalanceReader::new(chain.clone(), market(6).pair);
        reader.fetch(account()).await.unwrap();
        chain.fail("token_balance");
        chain
            .state
            .lock()
            .unwrap()
            .native_balances
            .insert(account(), U256::exp10(18));
        let balances = reader.fetch(account()).await.unwrap();
        assert_eq!(balances.native, U256::exp10(18));
        assert_eq!(balances.token, U256::from(2_500_000));
        assert_eq!(balances.wrapped, U256::exp10(17));
    }

    #[tokio::test]
    async fn test_failed_native_read_is_an_error() {
        let chain = chain();
        chain.fail("native_balance");
        let mut reader = BalanceReader::new(chain, market(6).pair);
        assert!(reader.fetch(account()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_polls_until_stopped() {
        let mut reader = BalanceReader::new(chain(), market(6).pair);
        let mut seen = 0;
        reader
            .watch(account(), Duration::from_secs(10), |b| {
                seen += 1;
                assert_eq!(b.token, U256::from(2_500_000));
                seen < 3
            })
            .await;
        assert_eq!(seen, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_handle_fetches_before_next_tick() {
        let chain = chain();
        let mut reader = BalanceReader::new(chain.clone(), market(6).pair);
        let refresh = reader.refresh_handle();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let watcher = tokio::spawn(async move {
            reader
                .watch(account(), Duration::from_secs(3600), move |b| {
                    tx.send(b.token).is_ok()
                })
                .await;
        });

        assert_eq!(rx.recv().await.unwrap(), U256::from(2_500_000));
        chain
            .state
            .lock()
            .unwrap()
            .balances
            .insert((ytk(), account()), U256::from(7_000_000));
        let start = tokio::time::Instant::now();
        refresh.notify_one();
        assert_eq!(rx.recv().await.unwrap(), U256::from(7_000_000));
        assert!(start.elapsed() < Duration::from_secs(3600));
        watcher.abort();
    }
}
