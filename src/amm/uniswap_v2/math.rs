//! Integer arithmetic of the Uniswap V2 pair and library contracts.
//!
//! These functions predict what the deployed contracts compute, so they follow
//! the on-chain integer semantics exactly: U256 operands, division truncating
//! toward zero and the 997/1000 fee.

use ethers::types::{H160, U256};
use thiserror::Error;

pub const FEE_NUMERATOR: u64 = 997;
pub const FEE_DENOMINATOR: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmmError {
    #[error("insufficient input amount")]
    InsufficientInputAmount,
    #[error("insufficient liquidity")]
    InsufficientLiquidity,
    #[error("arithmetic overflow")]
    Overflow,
}

/// `amount_in * 997 * reserve_out / (reserve_in * 1000 + amount_in * 997)`
pub fn get_amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
) -> Result<U256, AmmError> {
    if amount_in.is_zero() {
        return Err(AmmError::InsufficientInputAmount);
    }
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return Err(AmmError::InsufficientLiquidity);
    }
    let amount_in_with_fee = amount_in
        .checked_mul(U256::from(FEE_NUMERATOR))
        .ok_or(AmmError::Overflow)?;
    let numerator = amount_in_with_fee
        .checked_mul(reserve_out)
        .ok_or(AmmError::Overflow)?;
    let denominator = reserve_in
        .checked_mul(U256::from(FEE_DENOMINATOR))
        .and_then(|d| d.checked_add(amount_in_with_fee))
        .ok_or(AmmError::Overflow)?;
    Ok(numerator / denominator)
}

/// Amount of the other asset that keeps the pool ratio when `amount_a` is added.
pub fn quote_liquidity(
    amount_a: U256,
    reserve_a: U256,
    reserve_b: U256,
) -> Result<U256, AmmError> {
    if amount_a.is_zero() {
        return Err(AmmError::InsufficientInputAmount);
    }
    if reserve_a.is_zero() || reserve_b.is_zero() {
        return Err(AmmError::InsufficientLiquidity);
    }
    amount_a
        .checked_mul(reserve_b)
        .map(|n| n / reserve_a)
        .ok_or(AmmError::Overflow)
}

/// Factory ordering: token0 is the numerically smaller address.
pub fn sort_tokens(token_a: H160, token_b: H160) -> (H160, H160) {
    if token_a < token_b {
        (token_a, token_b)
    } else {
        (token_b, token_a)
    }
}

pub fn add_gas_buffer(estimate: U256, buffer_percent: u64) -> U256 {
    estimate.saturating_mul(U256::from(100 + buffer_percent)) / U256::from(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ether(v: &str) -> U256 {
        ethers::utils::parse_ether(v).unwrap()
    }

    #[test]
    fn test_get_amount_out_matches_formula() {
        let (a, r_in, r_out) = (U256::from(10), U256::from(1000), U256::from(1000));
        // 10*997*1000 / (1000*1000 + 10*997) = 9_970_000 / 1_009_970
        assert_eq!(get_amount_out(a, r_in, r_out).unwrap(), U256::from(9));
    }

    #[test]
    fn test_get_amount_out_truncates() {
        for (a, r_in, r_out) in [(7u64, 13u64, 29u64), (1, 1, 1), (123_456, 999, 1_000_000)] {
            let expected =
                U256::from(a * 997 * r_out) / U256::from(r_in * 1000 + a * 997);
            assert_eq!(
                get_amount_out(a.into(), r_in.into(), r_out.into()).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn test_get_amount_out_wtia_ytk_scenario() {
        // reserves (1 WTIA, 1000 YTK), 0.001 WTIA in
        let out = get_amount_out(ether("0.001"), ether("1"), ether("1000")).unwrap();
        let fee = U256::from(FEE_NUMERATOR);
        let expected = ether("0.001") * fee * ether("1000")
            / (ether("1") * U256::from(FEE_DENOMINATOR) + ether("0.001") * fee);
        assert_eq!(out, expected);
        assert_eq!(out, U256::from_dec_str("996006981039903216").unwrap());
    }

    #[test]
    fn test_get_amount_out_zero_input() {
        assert_eq!(
            get_amount_out(U256::zero(), U256::from(1), U256::from(1)),
            Err(AmmError::InsufficientInputAmount)
        );
    }

    #[test]
    fn test_get_amount_out_zero_reserves() {
        assert_eq!(
            get_amount_out(U256::from(1), U256::zero(), U256::from(1)),
            Err(AmmError::InsufficientLiquidity)
        );
        assert_eq!(
            get_amount_out(U256::from(1), U256::from(1), U256::zero()),
            Err(AmmError::InsufficientLiquidity)
        );
    }

    #[test]
    fn test_round_trip_loses_value() {
        let (r_a, r_b) = (ether("10"), ether("25000"));
        for amount in [ether("0.001"), ether("1"), ether("9")] {
            let out = get_amount_out(amount, r_a, r_b).unwrap();
            let back = get_amount_out(out, r_b, r_a).unwrap();
            assert!(back < amount);
        }
    }

    #[test]
    fn test_uint112_reserves_do_not_overflow() {
        let max_112 = (U256::one() << 112) - 1;
        assert!(get_amount_out(max_112, max_112, max_112).is_ok());
    }

    #[test]
    fn test_quote_liquidity() {
        assert_eq!(
            quote_liquidity(ether("2"), ether("1"), ether("1000")).unwrap(),
            ether("2000")
        );
        assert_eq!(
            quote_liquidity(U256::from(1), U256::zero(), U256::from(5)),
            Err(AmmError::InsufficientLiquidity)
        );
    }

    #[test]
    fn test_sort_tokens() {
        let a = H160::from_low_u64_be(2);
        let b = H160::from_low_u64_be(1);
        assert_eq!(sort_tokens(a, b), (b, a));
        assert_eq!(sort_tokens(b, a), (b, a));
    }

    #[test]
    fn test_add_gas_buffer() {
        assert_eq!(add_gas_buffer(U256::from(100_000), 20), U256::from(120_000));
        assert_eq!(add_gas_buffer(U256::from(7), 20), U256::from(8));
    }
}
