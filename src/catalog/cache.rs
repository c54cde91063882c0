//! Token metadata cache shared across chain pipelines
//!
//! The engine itself holds no state between runs; callers decide how long a
//! cache lives by choosing where to create it and which engine receives it.

use crate::chain::BalanceReader;
use crate::error::EngineResult;
use crate::retry::RetryPolicy;

use dashmap::DashMap;
use ethers::types::Address;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Default)]
pub struct TokenMetadataCache {
    entries: DashMap<(u64, Address), TokenMetadata>,
}

impl TokenMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chain_id: u64, token: Address) -> Option<TokenMetadata> {
        self.entries.get(&(chain_id, token)).map(|e| e.value().clone())
    }

    pub fn insert(&self, chain_id: u64, token: Address, metadata: TokenMetadata) {
        self.entries.insert((chain_id, token), metadata);
    }

    /// Return cached metadata or read `decimals()` from the chain
    pub async fn get_or_fetch(
        &self,
        reader: &dyn BalanceReader,
        token: Address,
        retry: &RetryPolicy,
    ) -> EngineResult<TokenMetadata> {
        let chain_id = reader.chain_id();
        if let Some(hit) = self.get(chain_id, token) {
            return Ok(hit);
        }

        let decimals = retry
            .run("erc20 decimals", |_| reader.erc20_decimals(token))
            .await?;
        let metadata = TokenMetadata {
            symbol: format!("{:?}", token),
            decimals,
        };

        debug!(
            "Cached metadata for {:?} on chain {}: {} decimals",
            token, chain_id, decimals
        );
        self.insert(chain_id, token, metadata.clone());
        Ok(metadata)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
