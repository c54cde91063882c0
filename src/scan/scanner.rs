//! Balance scanning for a smart account on one chain

use super::TokenBalance;
use crate::catalog::tokens::TokenInfo;
use crate::catalog::ChainCatalog;
use crate::chain::BalanceReader;
use crate::error::{EngineError, EngineResult};
use crate::retry::RetryPolicy;

use ethers::types::Address;
use tracing::{debug, warn};

/// Reads native and known ERC-20 balances
pub struct BalanceScanner {
    catalog: ChainCatalog,
    retry: RetryPolicy,
}

impl BalanceScanner {
    pub fn new(catalog: ChainCatalog, retry: RetryPolicy) -> Self {
        Self { catalog, retry }
    }

    /// Scan `account` on the reader's chain.
    ///
    /// A failed native read means the chain itself is unreachable and is
    /// returned as [`EngineError::ChainScanFailure`]. A failed token read is
    /// logged and that token skipped.
    pub async fn scan(
        &self,
        reader: &dyn BalanceReader,
        account: Address,
    ) -> EngineResult<Vec<TokenBalance>> {
        let chain_id = reader.chain_id();
        let chain = self.catalog.require(chain_id)?;
        let mut balances = Vec::new();

        let native = self
            .retry
            .run("native balance", |_| reader.native_balance(account))
            .await
            .map_err(|e| EngineError::ChainScanFailure {
                chain_id,
                message: e.to_string(),
            })?;

        if !native.is_zero() {
            balances.push(TokenBalance {
                chain_id,
                chain_name: chain.label.to_string(),
                token_address: Address::zero(),
                symbol: chain.native_symbol.to_string(),
                balance: native,
                decimals: 18,
                is_native: true,
            });
        }

        for token in self.scan_order(chain_id) {
            let address = token.address();
            let result = self
                .retry
                .run("erc20 balance", |_| reader.erc20_balance(address, account))
                .await;

            match result {
                Ok(balance) if balance.is_zero() => {}
                Ok(balance) => {
                    debug!("{} {} on chain {}", balance, token.symbol, chain_id);
                    balances.push(TokenBalance {
                        chain_id,
                        chain_name: chain.label.to_string(),
                        token_address: address,
                        symbol: token.symbol.to_string(),
                        balance,
                        decimals: token.decimals,
                        is_native: false,
                    });
                }
                Err(e) => {
                    warn!(
                        "Skipping {} on chain {}: balance read failed: {}",
                        token.symbol, chain_id, e
                    );
                }
            }
        }

        debug!(
            "Chain {}: {} non-zero balances for {:?}",
            chain_id,
            balances.len(),
            account
        );
        crate::metrics::record_tokens_found(chain_id, balances.len());

        Ok(balances)
    }

    /// Priority tokens first, then the remaining catalog tokens
    fn scan_order(&self, chain_id: u64) -> Vec<&'static TokenInfo> {
        let tokens = self.catalog.tokens(chain_id);
        tokens
            .iter()
            .filter(|t| t.is_priority())
            .chain(tokens.iter().filter(|t| !t.is_priority()))
            .collect()
    }
}
