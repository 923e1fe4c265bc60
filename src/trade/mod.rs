//! Transaction orchestration: approve when needed, then swap, add liquidity,
//! wrap or unwrap. Every step waits for the previous one to confirm.

pub mod liquidity;
pub mod slippage;

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use ethers::types::{H160, H256, U256};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{info, warn};

use self::slippage::Slippage;
use crate::{
    amm::uniswap_v2::math::add_gas_buffer,
    backend::{DexBackend, DexCall, TxReceipt, TxStatus},
    error::{DexError, ErrorKind},
    market::Market,
    token::{parse_amount_truncating, rescale, SwapDirection, Token},
};

/// Minimum output of a swap: a user-entered amount of the buy token, or
/// derived from the slippage tolerance when the swap is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MinOutput {
    Exact(String),
    #[default]
    FromSlippage,
}

impl MinOutput {
    pub const FROM_SLIPPAGE_LABEL: &'static str = "Calculated on swap";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SwapState {
    Idle,
    Validating,
    Rejected(String),
    Approving,
    Approved(H256),
    Submitting,
    Pending(H256),
    Confirmed(TxReceipt),
    Reverted(TxReceipt),
}

pub trait SwapObserver: Send + Sync {
    fn on_state(&self, state: &SwapState);
}

/// Logs every transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl SwapObserver for LogObserver {
    fn on_state(&self, state: &SwapState) {
        match state {
            SwapState::Rejected(reason) => warn!(%reason, "rejected"),
            SwapState::Reverted(receipt) => warn!(hash = ?receipt.hash, "transaction reverted"),
            SwapState::Approved(hash) => info!(?hash, "approval confirmed"),
            SwapState::Pending(hash) => info!(?hash, "transaction pending"),
            SwapState::Confirmed(receipt) => {
                info!(hash = ?receipt.hash, block = ?receipt.block_number, "transaction confirmed")
            }
            other => info!(state = ?other, "swap state"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeOutcome {
    pub approval: Option<TxReceipt>,
    pub receipt: TxReceipt,
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub deadline: U256,
}

pub struct SwapExecutor<B: ?Sized> {
    backend: Arc<B>,
    market: Market,
    estimate_gas: bool,
    balance_refresh: Option<Arc<Notify>>,
}

impl<B: DexBackend + ?Sized> SwapExecutor<B> {
    pub fn new(backend: Arc<B>, market: Market) -> Self {
        let estimate_gas = market.settings.estimate_gas;
        SwapExecutor {
            backend,
            market,
            estimate_gas,
            balance_refresh: None,
        }
    }

    pub fn with_gas_estimation(mut self, estimate_gas: bool) -> Self {
        self.estimate_gas = estimate_gas;
        self
    }

    /// Wakes a balance watcher after every confirmed transaction.
    pub fn with_balance_refresh(mut self, refresh: Arc<Notify>) -> Self {
        self.balance_refresh = Some(refresh);
        self
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub async fn swap(
        &self,
        direction: SwapDirection,
        amount: &str,
        min_output: &MinOutput,
        slippage: Slippage,
        observer: &dyn SwapObserver,
    ) -> Result<TradeOutcome, DexError> {
        observer.on_state(&SwapState::Idle);
        observer.on_state(&SwapState::Validating);
        let sell = self.market.pair.sell_token(direction).clone();
        let buy = self.market.pair.buy_token(direction).clone();
        let validated = self
            .validate_swap_amount(&sell, amount)
            .and_then(|amount_in| Ok((amount_in, self.account()?)))
            .and_then(|(amount_in, account)| {
                let min = self.min_output(&sell, &buy, amount_in, min_output, slippage)?;
                Ok((amount_in, account, min))
            });
        let (amount_in, account, amount_out_min) =
            validated.map_err(|err| rejected(observer, err))?;

        let approval = match direction {
            SwapDirection::TokenToNative => {
                self.ensure_allowance(&sell, account, amount_in, observer)
                    .await?
            }
            SwapDirection::NativeToToken => None,
        };

        let deadline = self.deadline().map_err(|err| rejected(observer, err))?;
        let path = self.market.pair.path(direction);
        let call = match direction {
            SwapDirection::NativeToToken => DexCall::SwapExactEthForTokens {
                value: amount_in,
                amount_out_min,
                path,
                to: account,
                deadline,
            },
            SwapDirection::TokenToNative => DexCall::SwapExactTokensForEth {
                amount_in,
                amount_out_min,
                path,
                to: account,
                deadline,
            },
        };
        info!(
            ?direction,
            amount_in = %sell.format(amount_in),
            amount_out_min = %buy.format(amount_out_min),
            "submitting swap"
        );
        let receipt = self.execute(&call, observer).await?;
        Ok(TradeOutcome {
            approval,
            receipt,
            amount_in,
            amount_out_min,
            deadline,
        })
    }

    /// Adds liquidity to the native/token pool with zero minimums.
    pub async fn add_liquidity(
        &self,
        token_amount: &str,
        native_amount: &str,
        observer: &dyn SwapObserver,
    ) -> Result<TradeOutcome, DexError> {
        observer.on_state(&SwapState::Idle);
        observer.on_state(&SwapState::Validating);
        let token = self.market.pair.token.clone();
        let wrapped = self.market.pair.wrapped.clone();
        let validated = positive(&token, token_amount).and_then(|token_in| {
            Ok((token_in, positive(&wrapped, native_amount)?, self.account()?))
        });
        let (amount_token, amount_native, account) =
            validated.map_err(|err| rejected(observer, err))?;

        let approval = self
            .ensure_allowance(&token, account, amount_token, observer)
            .await?;
        let deadline = self.deadline().map_err(|err| rejected(observer, err))?;
        let call = DexCall::AddLiquidityEth {
            token: token.address,
            amount_token_desired: amount_token,
            amount_token_min: U256::zero(),
            amount_eth_min: U256::zero(),
            value: amount_native,
            to: account,
            deadline,
        };
        info!(
            token_amount = %token.format(amount_token),
            native_amount = %wrapped.format(amount_native),
            "adding liquidity"
        );
        let receipt = self.execute(&call, observer).await?;
        Ok(TradeOutcome {
            approval,
            receipt,
            amount_in: amount_native,
            amount_out_min: U256::zero(),
            deadline,
        })
    }

    /// Approves the router for the configured approval amount of the token.
    pub async fn approve_max(&self, observer: &dyn SwapObserver) -> Result<TxReceipt, DexError> {
        let token = self.market.pair.token.clone();
        let amount = self
            .approval_amount(&token, U256::zero())
            .and_then(|amount| self.account().map(|_| amount))
            .map_err(|err| rejected(observer, err))?;
        self.approve(&token, amount, observer).await
    }

    /// Wraps native coin into the wrapper token.
    pub async fn wrap(&self, amount: &str, observer: &dyn SwapObserver) -> Result<TxReceipt, DexError> {
        let value = positive(&self.market.pair.wrapped, amount)
            .and_then(|value| self.account().map(|_| value))
            .map_err(|err| rejected(observer, err))?;
        self.execute(&DexCall::Deposit { value }, observer).await
    }

    pub async fn unwrap(&self, amount: &str, observer: &dyn SwapObserver) -> Result<TxReceipt, DexError> {
        let amount = positive(&self.market.pair.wrapped, amount)
            .and_then(|amount| self.account().map(|_| amount))
            .map_err(|err| rejected(observer, err))?;
        self.execute(&DexCall::Withdraw { amount }, observer).await
    }

    fn account(&self) -> Result<H160, DexError> {
        self.backend.account().ok_or_else(|| {
            DexError::new(
                ErrorKind::InvalidAddress,
                "No wallet connected, set PRIVATE_KEY",
            )
        })
    }

    fn validate_swap_amount(&self, sell: &Token, amount: &str) -> Result<U256, DexError> {
        let amount_in = positive(sell, amount)?;
        let minimum = parse_amount_truncating(&self.market.settings.min_swap_amount, sell.decimals)
            .map_err(|_| {
                DexError::invalid_amount(format!(
                    "Invalid minimum swap amount setting: {}",
                    self.market.settings.min_swap_amount
                ))
            })?
            .max(U256::one());
        if amount_in < minimum {
            return Err(DexError::invalid_amount(format!(
                "Amount too small. Minimum amount is {}",
                self.market.settings.min_swap_amount
            )));
        }
        Ok(amount_in)
    }

    fn min_output(
        &self,
        sell: &Token,
        buy: &Token,
        amount_in: U256,
        min_output: &MinOutput,
        slippage: Slippage,
    ) -> Result<U256, DexError> {
        match min_output {
            MinOutput::Exact(value) => parse_amount_truncating(value, buy.decimals),
            MinOutput::FromSlippage => Ok(slippage
                .apply(rescale(amount_in, sell.decimals, buy.decimals))
                .max(U256::one())),
        }
    }

    fn deadline(&self) -> Result<U256, DexError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| DexError::new(ErrorKind::TransactionRevert, err.to_string()))?;
        Ok(U256::from(
            now.as_secs() + self.market.settings.deadline_buffer_secs,
        ))
    }

    fn approval_amount(&self, token: &Token, needed: U256) -> Result<U256, DexError> {
        let configured = token.parse(&self.market.settings.approval_amount)?;
        Ok(configured.max(needed))
    }

    async fn ensure_allowance(
        &self,
        token: &Token,
        owner: H160,
        needed: U256,
        observer: &dyn SwapObserver,
    ) -> Result<Option<TxReceipt>, DexError> {
        let current = self
            .backend
            .allowance(token.address, owner, self.market.router)
            .await
            .map_err(|err| rejected(observer, DexError::classify(&err, ErrorKind::NetworkError)))?;
        if current >= needed {
            return Ok(None);
        }
        info!(
            token = %token.symbol,
            allowance = %token.format(current),
            needed = %token.format(needed),
            "allowance too low, approving router"
        );
        let amount = self
            .approval_amount(token, needed)
            .map_err(|err| rejected(observer, err))?;
        self.approve(token, amount, observer).await.map(Some)
    }

    async fn approve(
        &self,
        token: &Token,
        amount: U256,
        observer: &dyn SwapObserver,
    ) -> Result<TxReceipt, DexError> {
        observer.on_state(&SwapState::Approving);
        let call = DexCall::Approve {
            token: token.address,
            spender: self.market.router,
            amount,
        };
        let hash = self.send(&call).await.map_err(|err| {
            let err = DexError::new(
                err.kind,
                format!("Failed to approve token spending: {}", err.detail),
            );
            rejected(observer, err)
        })?;
        let receipt = self
            .backend
            .wait_for_receipt(hash)
            .await
            .map_err(|err| rejected(observer, DexError::classify(&err, ErrorKind::NetworkError)))?;
        if receipt.status == TxStatus::Reverted {
            observer.on_state(&SwapState::Reverted(receipt.clone()));
            return Err(reverted(&call, &receipt));
        }
        observer.on_state(&SwapState::Approved(hash));
        Ok(receipt)
    }

    /// Estimates gas (when enabled) and signs the call.
    async fn send(&self, call: &DexCall) -> Result<H256, DexError> {
        let gas_limit = if self.estimate_gas {
            let estimate = self.backend.estimate_gas(call).await?;
            Some(add_gas_buffer(
                estimate,
                self.market.settings.gas_buffer_percent,
            ))
        } else {
            None
        };
        Ok(self.backend.submit(call, gas_limit).await?)
    }

    async fn execute(&self, call: &DexCall, observer: &dyn SwapObserver) -> Result<TxReceipt, DexError> {
        observer.on_state(&SwapState::Submitting);
        let hash = self
            .send(call)
            .await
            .map_err(|err| rejected(observer, err))?;
        observer.on_state(&SwapState::Pending(hash));
        let receipt = self
            .backend
            .wait_for_receipt(hash)
            .await
            .map_err(|err| rejected(observer, DexError::classify(&err, ErrorKind::NetworkError)))?;
        match receipt.status {
            TxStatus::Success => {
                observer.on_state(&SwapState::Confirmed(receipt.clone()));
                if let Some(refresh) = &self.balance_refresh {
                    refresh.notify_one();
                }
                Ok(receipt)
            }
            TxStatus::Reverted => {
                observer.on_state(&SwapState::Reverted(receipt.clone()));
                Err(reverted(call, &receipt))
            }
        }
    }
}

fn positive(token: &Token, amount: &str) -> Result<U256, DexError> {
    let value = token.parse(amount)?;
    if value.is_zero() {
        return Err(DexError::invalid_amount(format!(
            "{} amount must be greater than zero",
            token.symbol
        )));
    }
    Ok(value)
}

/// Reports a failure that ended the flow without a mined receipt.
fn rejected(observer: &dyn SwapObserver, err: DexError) -> DexError {
    observer.on_state(&SwapState::Rejected(err.to_string()));
    err
}

fn reverted(call: &DexCall, receipt: &TxReceipt) -> DexError {
    DexError::new(
        ErrorKind::TransactionRevert,
        format!("{} transaction {:?} reverted", call.name(), receipt.hash),
    )
}
