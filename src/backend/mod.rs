//! The seam between the swap logic and the chain.
//!
//! Everything the quote engine and the transaction orchestrator need from the
//! node goes through [`DexBackend`]. [`EthersBackend`] talks JSON-RPC through
//! the abigen bindings; tests use an in-memory chain.

mod ethers_backend;
#[cfg(test)]
pub(crate) mod fake;

pub use ethers_backend::EthersBackend;

use async_trait::async_trait;
use ethers::types::{H160, H256, U256};
use serde::Serialize;

/// A state-changing contract call. Built fresh for every user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DexCall {
    Approve {
        token: H160,
        spender: H160,
        amount: U256,
    },
    SwapExactEthForTokens {
        value: U256,
        amount_out_min: U256,
        path: Vec<H160>,
        to: H160,
        deadline: U256,
    },
    SwapExactTokensForEth {
        amount_in: U256,
        amount_out_min: U256,
        path: Vec<H160>,
        to: H160,
        deadline: U256,
    },
    AddLiquidityEth {
        token: H160,
        amount_token_desired: U256,
        amount_token_min: U256,
        amount_eth_min: U256,
        value: U256,
        to: H160,
        deadline: U256,
    },
    Deposit {
        value: U256,
    },
    Withdraw {
        amount: U256,
    },
}

impl DexCall {
    pub fn name(&self) -> &'static str {
        match self {
            DexCall::Approve { .. } => "approve",
            DexCall::SwapExactEthForTokens { .. } => "swapExactETHForTokens",
            DexCall::SwapExactTokensForEth { .. } => "swapExactTokensForETH",
            DexCall::AddLiquidityEth { .. } => "addLiquidityETH",
            DexCall::Deposit { .. } => "deposit",
            DexCall::Withdraw { .. } => "withdraw",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub hash: H256,
    pub status: TxStatus,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

#[async_trait]
pub trait DexBackend: Send + Sync {
    /// Account that signs submitted calls, if any.
    fn account(&self) -> Option<H160>;

    async fn chain_id(&self) -> eyre::Result<u64>;
    async fn code_exists(&self, address: H160) -> eyre::Result<bool>;
    async fn native_balance(&self, owner: H160) -> eyre::Result<U256>;

    async fn token_decimals(&self, token: H160) -> eyre::Result<u8>;
    async fn token_balance(&self, token: H160, owner: H160) -> eyre::Result<U256>;
    async fn allowance(&self, token: H160, owner: H160, spender: H160) -> eyre::Result<U256>;

    async fn router_weth(&self) -> eyre::Result<H160>;
    async fn router_factory(&self) -> eyre::Result<H160>;
    async fn get_amounts_out(&self, amount_in: U256, path: Vec<H160>) -> eyre::Result<Vec<U256>>;

    async fn get_pair(&self, factory: H160, token_a: H160, token_b: H160) -> eyre::Result<H160>;
    async fn get_reserves(&self, pair: H160) -> eyre::Result<(u128, u128)>;
    async fn pair_token0(&self, pair: H160) -> eyre::Result<H160>;

    async fn estimate_gas(&self, call: &DexCall) -> eyre::Result<U256>;
    /// Signs and broadcasts `call`, returning as soon as the node accepts it.
    async fn submit(&self, call: &DexCall, gas_limit: Option<U256>) -> eyre::Result<H256>;
    /// Waits for one confirmation of a submitted transaction.
    async fn wait_for_receipt(&self, hash: H256) -> eyre::Result<TxReceipt>;
}
