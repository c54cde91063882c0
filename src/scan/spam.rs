//! Dust and spam filtering by per-symbol minimum balance

use super::TokenBalance;

use ethers::types::U256;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Most fractional digits a threshold may carry
const MAX_SCALE: usize = 36;

/// A minimum balance in whole units, stored as `units * 10^-scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    units: u64,
    scale: u32,
}

impl Threshold {
    pub const fn new(units: u64, scale: u32) -> Self {
        Self { units, scale }
    }

    /// Smallest raw balance that meets the threshold for a token with
    /// `decimals` places, rounded up
    pub fn min_raw(&self, decimals: u8) -> U256 {
        let decimals = decimals as u32;
        let units = U256::from(self.units);
        if units.is_zero() {
            return units;
        }
        if decimals >= self.scale {
            U256::from(10u8)
                .checked_pow(U256::from(decimals - self.scale))
                .and_then(|factor| units.checked_mul(factor))
                .unwrap_or(U256::MAX)
        } else {
            let Some(divisor) = U256::from(10u8).checked_pow(U256::from(self.scale - decimals))
            else {
                return U256::one();
            };
            let (q, r) = units.div_mod(divisor);
            if r.is_zero() {
                q
            } else {
                q + 1
            }
        }
    }
}

impl FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err("empty threshold".to_string());
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(format!("not a decimal number: {}", s));
        }
        if frac.len() > MAX_SCALE {
            return Err(format!(
                "{}: more than {} decimal places",
                s, MAX_SCALE
            ));
        }
        let digits = format!("{}{}", whole, frac);
        let units = if digits.trim_start_matches('0').is_empty() {
            0
        } else {
            digits
                .trim_start_matches('0')
                .parse::<u64>()
                .map_err(|e| format!("{}: {}", s, e))?
        };
        Ok(Self {
            units,
            scale: frac.len() as u32,
        })
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.units.to_string();
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}", digits);
        }
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (whole, frac) = padded.split_at(padded.len() - scale);
        write!(f, "{}.{}", whole, frac)
    }
}

const STABLE: Threshold = Threshold::new(1, 2); // 0.01
const ETH_LIKE: Threshold = Threshold::new(1, 4); // 0.0001
const CHEAP_NATIVE: Threshold = Threshold::new(1, 2); // 0.01
const MID_NATIVE: Threshold = Threshold::new(1, 3); // 0.001
const BTC_LIKE: Threshold = Threshold::new(1, 6); // 0.000001
const DEFAULT: Threshold = Threshold::new(1, 2);

const BUILTIN: &[(&str, Threshold)] = &[
    ("USDC", STABLE),
    ("USDT", STABLE),
    ("DAI", STABLE),
    ("USDBC", STABLE),
    ("ETH", ETH_LIKE),
    ("WETH", ETH_LIKE),
    ("CBETH", ETH_LIKE),
    ("BNB", ETH_LIKE),
    ("WBNB", ETH_LIKE),
    ("POL", CHEAP_NATIVE),
    ("WPOL", CHEAP_NATIVE),
    ("MATIC", CHEAP_NATIVE),
    ("AVAX", MID_NATIVE),
    ("WAVAX", MID_NATIVE),
    ("WBTC", BTC_LIKE),
];

/// Symbol -> minimum balance lookup
#[derive(Debug, Clone)]
pub struct SpamFilter {
    thresholds: HashMap<String, Threshold>,
    default: Threshold,
}

impl SpamFilter {
    pub fn new() -> Self {
        Self {
            thresholds: BUILTIN
                .iter()
                .map(|(symbol, t)| (symbol.to_string(), *t))
                .collect(),
            default: DEFAULT,
        }
    }

    /// Builtin table with per-symbol overrides from configuration
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Result<Self, String> {
        let mut filter = Self::new();
        for (symbol, raw) in overrides {
            filter
                .thresholds
                .insert(symbol.to_ascii_uppercase(), raw.parse()?);
        }
        Ok(filter)
    }

    pub fn threshold(&self, symbol: &str) -> Threshold {
        self.thresholds
            .get(&symbol.to_ascii_uppercase())
            .copied()
            .unwrap_or(self.default)
    }

    pub fn is_dust(&self, balance: &TokenBalance) -> bool {
        balance.balance < self.threshold(&balance.symbol).min_raw(balance.decimals)
    }

    /// Keep balances at or above their symbol's threshold
    pub fn filter(&self, balances: &[TokenBalance]) -> Vec<TokenBalance> {
        balances
            .iter()
            .filter(|b| !self.is_dust(b))
            .cloned()
            .collect()
    }
}

impl Default for SpamFilter {
    fn default() -> Self {
        Self::new()
    }
}
