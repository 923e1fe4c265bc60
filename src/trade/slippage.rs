use std::{fmt, str::FromStr};

use ethers::types::U256;
use serde::Serialize;

use crate::error::DexError;

const BPS_DENOMINATOR: u32 = 10_000;
const MIN_BPS: u32 = 10;
const MAX_BPS: u32 = 5_000;

/// Slippage tolerance in basis points, limited to 0.1 %..=50 %.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Slippage {
    bps: u32,
}

impl Slippage {
    pub const PRESETS: [Slippage; 3] = [
        Slippage { bps: 50 },
        Slippage { bps: 100 },
        Slippage { bps: 200 },
    ];

    pub fn from_percent(percent: f64) -> Result<Self, DexError> {
        if !percent.is_finite() {
            return Err(out_of_range(percent));
        }
        let bps = (percent * 100.0).round();
        if bps < MIN_BPS as f64 || bps > MAX_BPS as f64 {
            return Err(out_of_range(percent));
        }
        Ok(Slippage { bps: bps as u32 })
    }

    pub fn bps(&self) -> u32 {
        self.bps
    }

    pub fn percent(&self) -> f64 {
        self.bps as f64 / 100.0
    }

    /// `amount * (1 - s/100)`, truncated, but never below one base unit for a
    /// nonzero amount.
    pub fn apply(&self, amount: U256) -> U256 {
        if amount.is_zero() {
            return amount;
        }
        let min = amount.saturating_mul(U256::from(BPS_DENOMINATOR - self.bps))
            / U256::from(BPS_DENOMINATOR);
        min.max(U256::one())
    }
}

fn out_of_range(percent: f64) -> DexError {
    DexError::invalid_amount(format!(
        "Slippage must be between 0.1% and 50%, got {}%",
        percent
    ))
}

impl Default for Slippage {
    fn default() -> Self {
        Slippage { bps: 100 }
    }
}

impl FromStr for Slippage {
    type Err = DexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('%').trim();
        let percent = trimmed
            .parse::<f64>()
            .map_err(|_| DexError::invalid_amount(format!("Invalid slippage: {}", s)))?;
        Self::from_percent(percent)
    }
}

impl fmt::Display for Slippage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}
