//! In-memory chain used by unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use ethers::types::{H160, H256, U256};
use eyre::{bail, eyre};

use super::{DexBackend, DexCall, TxReceipt, TxStatus};
use crate::amm::uniswap_v2::math::sort_tokens;

#[derive(Debug, Default)]
pub struct ChainState {
    pub chain_id: u64,
    pub router: H160,
    pub factory: H160,
    pub weth: H160,
    pub code: HashSet<H160>,
    pub decimals: HashMap<H160, u8>,
    pub native_balances: HashMap<H160, U256>,
    pub balances: HashMap<(H160, H160), U256>,
    pub allowances: HashMap<(H160, H160, H160), U256>,
    /// Pair address and (reserve0, reserve1), keyed by sorted token addresses.
    pub pairs: HashMap<(H160, H160), (H160, u128, u128)>,
    /// Outcome of `getAmountsOut`; `None` makes the call revert.
    pub amounts_out: Option<Vec<U256>>,
    pub failing: HashSet<&'static str>,
    pub revert_calls: HashSet<&'static str>,
    pub submitted: Vec<(DexCall, Option<U256>)>,
    pub gas_estimate: U256,
}

#[derive(Debug)]
pub struct FakeChain {
    pub account: Option<H160>,
    pub state: Mutex<ChainState>,
}

pub fn addr(v: u64) -> H160 {
    H160::from_low_u64_be(v)
}

impl FakeChain {
    pub fn new(account: Option<H160>) -> Self {
        let state = ChainState {
            chain_id: 984123,
            router: addr(0xa0),
            factory: addr(0xf0),
            weth: addr(0x20),
            gas_estimate: U256::from(100_000),
            ..Default::default()
        };
        FakeChain {
            account,
            state: Mutex::new(state),
        }
    }

    pub fn set_pair(&self, token_a: H160, token_b: H160, reserve_a: u128, reserve_b: u128) {
        let (token0, _) = sort_tokens(token_a, token_b);
        let reserves = if token0 == token_a {
            (reserve_a, reserve_b)
        } else {
            (reserve_b, reserve_a)
        };
        let mut state = self.state.lock().unwrap();
        state
            .pairs
            .insert(sort_tokens(token_a, token_b), (addr(0xbeef), reserves.0, reserves.1));
    }

    pub fn fail(&self, method: &'static str) {
        self.state.lock().unwrap().failing.insert(method);
    }

    pub fn revert(&self, call_name: &'static str) {
        self.state.lock().unwrap().revert_calls.insert(call_name);
    }

    pub fn submitted(&self) -> Vec<DexCall> {
        let state = self.state.lock().unwrap();
        state.submitted.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn submitted_gas(&self) -> Vec<Option<U256>> {
        let state = self.state.lock().unwrap();
        state.submitted.iter().map(|(_, g)| *g).collect()
    }

    fn check(&self, method: &'static str) -> eyre::Result<()> {
        if self.state.lock().unwrap().failing.contains(method) {
            bail!("{} failed: error sending request for url (http://fake)", method);
        }
        Ok(())
    }

    fn apply(&self, state: &mut ChainState, call: &DexCall) {
        let Some(owner) = self.account else { return };
        match call {
            DexCall::Approve {
                token,
                spender,
                amount,
            } => {
                state.allowances.insert((*token, owner, *spender), *amount);
            }
            DexCall::Deposit { value } => {
                let weth = state.weth;
                *state.balances.entry((weth, owner)).or_default() += *value;
            }
            _ => {}
        }
    }
}

#[async_trait]
impl DexBackend for FakeChain {
    fn account(&self) -> Option<H160> {
        self.account
    }

    async fn chain_id(&self) -> eyre::Result<u64> {
        self.check("chain_id")?;
        Ok(self.state.lock().unwrap().chain_id)
    }

    async fn code_exists(&self, address: H160) -> eyre::Result<bool> {
        self.check("code_exists")?;
        Ok(self.state.lock().unwrap().code.contains(&address))
    }

    async fn native_balance(&self, owner: H160) -> eyre::Result<U256> {
        self.check("native_balance")?;
        let state = self.state.lock().unwrap();
        Ok(state.native_balances.get(&owner).copied().unwrap_or_default())
    }

    async fn token_decimals(&self, token: H160) -> eyre::Result<u8> {
        self.check("token_decimals")?;
        let state = self.state.lock().unwrap();
        state
            .decimals
            .get(&token)
            .copied()
            .ok_or_else(|| eyre!("call revert exception"))
    }

    async fn token_balance(&self, token: H160, owner: H160) -> eyre::Result<U256> {
        self.check("token_balance")?;
        let state = self.state.lock().unwrap();
        Ok(state.balances.get(&(token, owner)).copied().unwrap_or_default())
    }

    async fn allowance(&self, token: H160, owner: H160, spender: H160) -> eyre::Result<U256> {
        self.check("allowance")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn router_weth(&self) -> eyre::Result<H160> {
        self.check("router_weth")?;
        Ok(self.state.lock().unwrap().weth)
    }

    async fn router_factory(&self) -> eyre::Result<H160> {
        self.check("router_factory")?;
        Ok(self.state.lock().unwrap().factory)
    }

    async fn get_amounts_out(&self, _amount_in: U256, _path: Vec<H160>) -> eyre::Result<Vec<U256>> {
        self.check("get_amounts_out")?;
        self.state
            .lock()
            .unwrap()
            .amounts_out
            .clone()
            .ok_or_else(|| eyre!("Contract call reverted with data: 0x"))
    }

    async fn get_pair(&self, factory: H160, token_a: H160, token_b: H160) -> eyre::Result<H160> {
        self.check("get_pair")?;
        let state = self.state.lock().unwrap();
        if factory != state.factory {
            bail!("missing revert data in call exception");
        }
        Ok(state
            .pairs
            .get(&sort_tokens(token_a, token_b))
            .map(|(pair, _, _)| *pair)
            .unwrap_or_else(H160::zero))
    }

    async fn get_reserves(&self, pair: H160) -> eyre::Result<(u128, u128)> {
        self.check("get_reserves")?;
        let state = self.state.lock().unwrap();
        state
            .pairs
            .values()
            .find(|(p, _, _)| *p == pair)
            .map(|(_, r0, r1)| (*r0, *r1))
            .ok_or_else(|| eyre!("call revert exception"))
    }

    async fn pair_token0(&self, pair: H160) -> eyre::Result<H160> {
        self.check("pair_token0")?;
        let state = self.state.lock().unwrap();
        state
            .pairs
            .iter()
            .find(|(_, (p, _, _))| *p == pair)
            .map(|((token0, _), _)| *token0)
            .ok_or_else(|| eyre!("call revert exception"))
    }

    async fn estimate_gas(&self, call: &DexCall) -> eyre::Result<U256> {
        self.check("estimate_gas")?;
        let state = self.state.lock().unwrap();
        if state.revert_calls.contains(call.name()) {
            bail!("execution reverted: UniswapV2Router: INSUFFICIENT_OUTPUT_AMOUNT");
        }
        Ok(state.gas_estimate)
    }

    async fn submit(&self, call: &DexCall, gas_limit: Option<U256>) -> eyre::Result<H256> {
        self.check("submit")?;
        if self.account.is_none() {
            bail!("No signer configured, cannot submit {}", call.name());
        }
        let mut state = self.state.lock().unwrap();
        state.submitted.push((call.clone(), gas_limit));
        let hash = H256::from_low_u64_be(state.submitted.len() as u64);
        if !state.revert_calls.contains(call.name()) {
            self.apply(&mut state, call);
        }
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: H256) -> eyre::Result<TxReceipt> {
        self.check("wait_for_receipt")?;
        let state = self.state.lock().unwrap();
        let index = hash.to_low_u64_be() as usize;
        let (call, _) = state
            .submitted
            .get(index.wrapping_sub(1))
            .ok_or_else(|| eyre!("unknown transaction {:?}", hash))?;
        let status = if state.revert_calls.contains(call.name()) {
            TxStatus::Reverted
        } else {
            TxStatus::Success
        };
        Ok(TxReceipt {
            hash,
            status,
            block_number: Some(index as u64),
            gas_used: Some(state.gas_estimate),
        })
    }
}
