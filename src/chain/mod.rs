//! Chain module - balance reads across every configured chain
//!
//! This module provides:
//! - The `BalanceReader` capability the scanner and funding resolver depend on
//! - An ethers-backed provider with multi-RPC failover
//! - A registry of readers keyed by chain ID

pub mod provider;

pub use provider::ChainProvider;

use crate::catalog::{ChainCatalog, ChainInfo};
use crate::config::Settings;
use crate::error::{EngineError, EngineResult};

use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Read-only balance queries against one chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceReader: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn block_number(&self) -> EngineResult<u64>;

    async fn native_balance(&self, owner: Address) -> EngineResult<U256>;

    async fn erc20_balance(&self, token: Address, owner: Address) -> EngineResult<U256>;

    async fn erc20_decimals(&self, token: Address) -> EngineResult<u8>;
}

/// Balance readers for every enabled chain
#[derive(Clone)]
pub struct ChainRegistry {
    catalog: ChainCatalog,
    /// Readers indexed by chain ID, iterated in ID order
    readers: BTreeMap<u64, Arc<dyn BalanceReader>>,
}

impl ChainRegistry {
    pub fn new(catalog: ChainCatalog) -> Self {
        Self {
            catalog,
            readers: BTreeMap::new(),
        }
    }

    /// Create a provider for each enabled chain in the settings
    pub fn from_settings(settings: &Settings) -> EngineResult<Self> {
        let mut registry = Self::new(ChainCatalog::builtin());

        for (name, chain_config) in settings.enabled_chains() {
            let info = registry.catalog.require_name(name)?.clone();
            let provider = ChainProvider::new(chain_config, settings.read_timeout())?;
            registry.insert(Arc::new(provider));
            info!("Chain {} (ID: {}) registered", info.label, info.chain_id);
        }

        Ok(registry)
    }

    pub fn insert(&mut self, reader: Arc<dyn BalanceReader>) {
        self.readers.insert(reader.chain_id(), reader);
    }

    pub fn catalog(&self) -> &ChainCatalog {
        &self.catalog
    }

    /// Get reader for a specific chain
    pub fn reader(&self, chain_id: u64) -> EngineResult<Arc<dyn BalanceReader>> {
        let info = self.catalog.require(chain_id)?;
        self.readers.get(&chain_id).cloned().ok_or_else(|| {
            EngineError::ServiceUnavailable(format!("no chain client configured for {}", info.label))
        })
    }

    /// Chains that have a reader, in chain ID order
    pub fn chains(&self) -> Vec<ChainInfo> {
        self.readers
            .keys()
            .filter_map(|id| self.catalog.by_id(*id).cloned())
            .collect()
    }

    /// Health check for all chains
    pub async fn health_check(&self) -> Vec<(u64, bool)> {
        let checks = self.readers.iter().map(|(chain_id, reader)| async move {
            let healthy = reader.block_number().await.is_ok();
            crate::metrics::record_chain_health(*chain_id, healthy);
            (*chain_id, healthy)
        });
        futures::future::join_all(checks).await
    }
}
