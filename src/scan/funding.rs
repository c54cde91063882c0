//! Fee-token discovery on the owner's EOA

use crate::catalog::tokens;
use crate::catalog::ChainCatalog;
use crate::chain::BalanceReader;
use crate::error::EngineResult;
use crate::retry::RetryPolicy;

use ethers::types::{Address, U256};
use serde::Serialize;
use tracing::{debug, info, warn};

/// A token pulled from the owner's EOA to pay for execution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingToken {
    pub token_address: Address,
    pub chain_id: u64,
    #[serde(with = "crate::protocol::types::decimal_u256")]
    pub amount: U256,
    #[serde(skip)]
    pub symbol: String,
    #[serde(skip)]
    pub decimals: u8,
}

pub struct FundingResolver {
    catalog: ChainCatalog,
    retry: RetryPolicy,
}

impl FundingResolver {
    pub fn new(catalog: ChainCatalog, retry: RetryPolicy) -> Self {
        Self { catalog, retry }
    }

    /// First fee-capable token on `owner` holding at least one whole token
    /// and at least `amount` whole units (`None` defaults to one token).
    ///
    /// `Ok(None)` means the chain cannot be serviced; it is not an error.
    pub async fn find_funding_token(
        &self,
        reader: &dyn BalanceReader,
        owner: Address,
        amount: Option<&str>,
    ) -> EngineResult<Option<FundingToken>> {
        let chain_id = reader.chain_id();
        let chain = self.catalog.require(chain_id)?;

        for token in tokens::fee_tokens(chain_id) {
            let one = U256::exp10(token.decimals as usize);
            let wanted = match amount {
                Some(amount) => parse_amount(amount, token.decimals)?,
                None => one,
            };
            let floor = wanted.max(one);

            let address = token.address();
            let balance = match self
                .retry
                .run("funding balance", |_| reader.erc20_balance(address, owner))
                .await
            {
                Ok(balance) => balance,
                Err(e) => {
                    warn!(
                        "Skipping funding candidate {} on {}: {}",
                        token.symbol, chain.label, e
                    );
                    continue;
                }
            };

            if balance >= floor {
                info!(
                    "Funding token on {}: {} (balance {}, using {})",
                    chain.label, token.symbol, balance, wanted
                );
                return Ok(Some(FundingToken {
                    token_address: address,
                    chain_id,
                    amount: wanted,
                    symbol: token.symbol.to_string(),
                    decimals: token.decimals,
                }));
            }

            debug!(
                "{} on {} below funding floor: {} < {}",
                token.symbol, chain.label, balance, floor
            );
        }

        Ok(None)
    }
}

/// Parse a whole-unit decimal string into raw token units
pub fn parse_amount(amount: &str, decimals: u8) -> EngineResult<U256> {
    let amount = amount.trim();
    if let Some((_, fraction)) = amount.split_once('.') {
        if fraction.len() > decimals as usize {
            return Err(crate::error::EngineError::MissingParameters(format!(
                "amount {:?} has more than {} decimal places",
                amount, decimals
            )));
        }
    }
    ethers::utils::parse_units(amount, decimals as u32)
        .map(Into::into)
        .map_err(|e| {
            crate::error::EngineError::MissingParameters(format!(
                "invalid amount {:?}: {}",
                amount, e
            ))
        })
}
