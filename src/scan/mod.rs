//! Balance discovery for a single chain
//!
//! Scanning produces the raw balance set for an account, the spam filter
//! narrows it to balances worth moving, and the funding resolver picks the
//! token that pays protocol fees from the owner's EOA.

pub mod funding;
pub mod scanner;
pub mod spam;

pub use funding::{FundingResolver, FundingToken};
pub use scanner::BalanceScanner;
pub use spam::{SpamFilter, Threshold};

use ethers::types::{Address, U256};
use ethers::utils::format_units;
use serde::Serialize;

/// A strictly positive balance observed during one scan pass
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub chain_id: u64,
    pub chain_name: String,
    /// Zero address for the native asset
    pub token_address: Address,
    pub symbol: String,
    #[serde(with = "crate::protocol::types::decimal_u256")]
    pub balance: U256,
    pub decimals: u8,
    pub is_native: bool,
}

impl TokenBalance {
    /// Balance in whole units, e.g. `"0.0005"`
    pub fn display_amount(&self) -> String {
        format_units(self.balance, self.decimals as u32)
            .map(|s| trim_decimal(&s))
            .unwrap_or_else(|_| self.balance.to_string())
    }
}

pub(crate) fn trim_decimal(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}
