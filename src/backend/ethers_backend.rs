use std::sync::Arc;

use async_trait::async_trait;
use ethers::{
    providers::{Middleware, PendingTransaction},
    types::{transaction::eip2718::TypedTransaction, H160, H256, U256},
};
use eyre::{bail, eyre, WrapErr};

use super::{DexBackend, DexCall, TxReceipt, TxStatus};
use crate::contract::{IErc20, IUniswapV2Factory, IUniswapV2Pair, IUniswapV2Router, IWeth9};

/// JSON-RPC backend. Reads and writes go through the same middleware. Give it
/// a `SignerMiddleware` (and the signer's address) to submit transactions.
#[derive(Debug, Clone)]
pub struct EthersBackend<M> {
    client: Arc<M>,
    router: H160,
    wrapped: H160,
    account: Option<H160>,
}

impl<M: Middleware + 'static> EthersBackend<M> {
    pub fn new(client: Arc<M>, router: H160, wrapped: H160, account: Option<H160>) -> Self {
        EthersBackend {
            client,
            router,
            wrapped,
            account,
        }
    }

    fn router(&self) -> IUniswapV2Router<M> {
        IUniswapV2Router::new(self.router, self.client.clone())
    }

    fn erc20(&self, token: H160) -> IErc20<M> {
        IErc20::new(token, self.client.clone())
    }

    fn transaction(&self, call: &DexCall) -> TypedTransaction {
        let mut tx = match call {
            DexCall::Approve {
                token,
                spender,
                amount,
            } => self.erc20(*token).approve(*spender, *amount).tx,
            DexCall::SwapExactEthForTokens {
                value,
                amount_out_min,
                path,
                to,
                deadline,
            } => {
                self.router()
                    .swap_exact_eth_for_tokens(*amount_out_min, path.clone(), *to, *deadline)
                    .value(*value)
                    .tx
            }
            DexCall::SwapExactTokensForEth {
                amount_in,
                amount_out_min,
                path,
                to,
                deadline,
            } => {
                self.router()
                    .swap_exact_tokens_for_eth(
                        *amount_in,
                        *amount_out_min,
                        path.clone(),
                        *to,
                        *deadline,
                    )
                    .tx
            }
            DexCall::AddLiquidityEth {
                token,
                amount_token_desired,
                amount_token_min,
                amount_eth_min,
                value,
                to,
                deadline,
            } => {
                self.router()
                    .add_liquidity_eth(
                        *token,
                        *amount_token_desired,
                        *amount_token_min,
                        *amount_eth_min,
                        *to,
                        *deadline,
                    )
                    .value(*value)
                    .tx
            }
            DexCall::Deposit { value } => {
                IWeth9::new(self.wrapped, self.client.clone())
                    .deposit()
                    .value(*value)
                    .tx
            }
            DexCall::Withdraw { amount } => {
                IWeth9::new(self.wrapped, self.client.clone())
                    .withdraw(*amount)
                    .tx
            }
        };
        if let Some(from) = self.account {
            tx.set_from(from);
        }
        tx
    }
}

#[async_trait]
impl<M: Middleware + 'static> DexBackend for EthersBackend<M> {
    fn account(&self) -> Option<H160> {
        self.account
    }

    async fn chain_id(&self) -> eyre::Result<u64> {
        let id = self
            .client
            .get_chainid()
            .await
            .wrap_err("Could not get chain id")?;
        Ok(id.as_u64())
    }

    async fn code_exists(&self, address: H160) -> eyre::Result<bool> {
        let code = self
            .client
            .get_code(address, None)
            .await
            .wrap_err_with(|| format!("Could not get code at {:?}", address))?;
        Ok(!code.is_empty())
    }

    async fn native_balance(&self, owner: H160) -> eyre::Result<U256> {
        self.client
            .get_balance(owner, None)
            .await
            .wrap_err_with(|| format!("Could not get native balance of {:?}", owner))
    }

    async fn token_decimals(&self, token: H160) -> eyre::Result<u8> {
        self.erc20(token)
            .decimals()
            .call()
            .await
            .wrap_err_with(|| format!("Could not get decimals of {:?}", token))
    }

    async fn token_balance(&self, token: H160, owner: H160) -> eyre::Result<U256> {
        self.erc20(token)
            .balance_of(owner)
            .call()
            .await
            .wrap_err_with(|| format!("Could not get balance of {:?} for {:?}", token, owner))
    }

    async fn allowance(&self, token: H160, owner: H160, spender: H160) -> eyre::Result<U256> {
        self.erc20(token)
            .allowance(owner, spender)
            .call()
            .await
            .wrap_err_with(|| format!("Could not get allowance of {:?}", token))
    }

    async fn router_weth(&self) -> eyre::Result<H160> {
        self.router()
            .weth()
            .call()
            .await
            .wrap_err("Could not get router WETH address")
    }

    async fn router_factory(&self) -> eyre::Result<H160> {
        self.router()
            .factory()
            .call()
            .await
            .wrap_err("Could not get router factory address")
    }

    async fn get_amounts_out(&self, amount_in: U256, path: Vec<H160>) -> eyre::Result<Vec<U256>> {
        self.router()
            .get_amounts_out(amount_in, path)
            .call()
            .await
            .wrap_err("Router getAmountsOut failed")
    }

    async fn get_pair(&self, factory: H160, token_a: H160, token_b: H160) -> eyre::Result<H160> {
        IUniswapV2Factory::new(factory, self.client.clone())
            .get_pair(token_a, token_b)
            .call()
            .await
            .wrap_err_with(|| {
                format!(
                    "Could not get pair address for tokens {:?}, {:?}",
                    token_a, token_b
                )
            })
    }

    async fn get_reserves(&self, pair: H160) -> eyre::Result<(u128, u128)> {
        let (reserve_0, reserve_1, _) = IUniswapV2Pair::new(pair, self.client.clone())
            .get_reserves()
            .call()
            .await
            .wrap_err_with(|| format!("Could not get reserves of {:?}", pair))?;
        Ok((reserve_0, reserve_1))
    }

    async fn pair_token0(&self, pair: H160) -> eyre::Result<H160> {
        IUniswapV2Pair::new(pair, self.client.clone())
            .token_0()
            .call()
            .await
            .wrap_err_with(|| format!("Could not get token0 of {:?}", pair))
    }

    async fn estimate_gas(&self, call: &DexCall) -> eyre::Result<U256> {
        let tx = self.transaction(call);
        self.client
            .estimate_gas(&tx, None)
            .await
            .wrap_err_with(|| format!("Could not estimate gas for {}", call.name()))
    }

    async fn submit(&self, call: &DexCall, gas_limit: Option<U256>) -> eyre::Result<H256> {
        if self.account.is_none() {
            bail!("No signer configured, cannot submit {}", call.name());
        }
        let mut tx = self.transaction(call);
        if let Some(gas) = gas_limit {
            tx.set_gas(gas);
        }
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .wrap_err_with(|| format!("Could not send {}", call.name()))?;
        Ok(pending.tx_hash())
    }

    async fn wait_for_receipt(&self, hash: H256) -> eyre::Result<TxReceipt> {
        let receipt = PendingTransaction::new(hash, self.client.provider())
            .confirmations(1)
            .await
            .wrap_err_with(|| format!("Could not confirm transaction {:?}", hash))?
            .ok_or_else(|| eyre!("Transaction {:?} was dropped from the mempool", hash))?;
        let status = match receipt.status {
            Some(s) if s.as_u64() == 1 => TxStatus::Success,
            _ => TxStatus::Reverted,
        };
        Ok(TxReceipt {
            hash,
            status,
            block_number: receipt.block_number.map(|b| b.as_u64()),
            gas_used: receipt.gas_used,
        })
    }
}
