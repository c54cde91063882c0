//! Chain provider with multi-RPC support and automatic failover

use super::BalanceReader;
use crate::config::ChainConfig;
use crate::error::{EngineError, EngineResult};
use crate::retry::with_timeout;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

abigen!(
    Erc20,
    r#"[
        function balanceOf(address account) external view returns (uint256)
        function decimals() external view returns (uint8)
    ]"#
);

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    chain_id: u64,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Per-call deadline
    read_timeout: Duration,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: &ChainConfig, read_timeout: Duration) -> EngineResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(EngineError::ServiceUnavailable(format!(
                "no valid RPC providers for chain {}",
                config.chain_id
            )));
        }

        Ok(Self {
            chain_id: config.chain_id,
            http_providers,
            current_provider: AtomicUsize::new(0),
            read_timeout,
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        if self.http_providers.len() > 1 {
            warn!("Chain {} failover to provider {}", self.chain_id, next);
        }
    }

    fn rpc_error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Rpc {
            chain_id: self.chain_id,
            message: message.into(),
        }
    }

    fn all_failed(&self, what: &str) -> EngineError {
        self.rpc_error(format!("all providers failed to {}", what))
    }
}

#[async_trait]
impl BalanceReader for ChainProvider {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn block_number(&self) -> EngineResult<u64> {
        for _ in 0..self.http_providers.len() {
            match timeout(self.read_timeout, self.http().get_block_number()).await {
                Ok(Ok(block)) => return Ok(block.as_u64()),
                Ok(Err(e)) => {
                    warn!("Failed to get block number from chain {}: {}", self.chain_id, e);
                }
                Err(_) => warn!("Block number request timed out on chain {}", self.chain_id),
            }
            self.failover();
        }

        Err(self.all_failed("get block number"))
    }

    async fn native_balance(&self, owner: Address) -> EngineResult<U256> {
        for _ in 0..self.http_providers.len() {
            match timeout(self.read_timeout, self.http().get_balance(owner, None)).await {
                Ok(Ok(balance)) => return Ok(balance),
                Ok(Err(e)) => {
                    warn!("Failed to get native balance on chain {}: {}", self.chain_id, e);
                }
                Err(_) => warn!("Native balance request timed out on chain {}", self.chain_id),
            }
            self.failover();
        }

        Err(self.all_failed("get native balance"))
    }

    async fn erc20_balance(&self, token: Address, owner: Address) -> EngineResult<U256> {
        let contract = Erc20::new(token, Arc::new(self.http().clone()));
        let operation = format!("balanceOf {:?} on chain {}", token, self.chain_id);
        let result = with_timeout(self.read_timeout, &operation, async {
            contract
                .balance_of(owner)
                .call()
                .await
                .map_err(|e| self.rpc_error(format!("balanceOf {:?}: {}", token, e)))
        })
        .await;

        if matches!(result, Err(EngineError::Rpc { .. })) {
            self.failover();
        }
        result
    }

    async fn erc20_decimals(&self, token: Address) -> EngineResult<u8> {
        let contract = Erc20::new(token, Arc::new(self.http().clone()));
        let operation = format!("decimals {:?} on chain {}", token, self.chain_id);
        let result = with_timeout(self.read_timeout, &operation, async {
            contract
                .decimals()
                .call()
                .await
                .map_err(|e| self.rpc_error(format!("decimals {:?}: {}", token, e)))
        })
        .await;

        if matches!(result, Err(EngineError::Rpc { .. })) {
            self.failover();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(urls: &[&str]) -> ChainConfig {
        ChainConfig {
            chain_id: 8453,
            rpc_urls: urls.iter().map(|u| u.to_string()).collect(),
            enabled: true,
        }
    }

    #[test]
    fn requires_at_least_one_valid_url() {
        let err = ChainProvider::new(&config(&["not a url"]), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::ServiceUnavailable(_)));
    }

    #[test]
    fn failover_cycles_through_providers() {
        let provider = ChainProvider::new(
            &config(&["http://127.0.0.1:1", "http://127.0.0.1:2"]),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 0);
        provider.failover();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 1);
        provider.failover();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn unreachable_rpc_surfaces_retryable_error() {
        let provider =
            ChainProvider::new(&config(&["http://127.0.0.1:1"]), Duration::from_secs(2)).unwrap();
        let err = provider.native_balance(Address::zero()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(provider.block_number().await.is_err());
    }
}
