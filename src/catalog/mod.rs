//! Static chain and token catalog
//!
//! This module provides:
//! - Chain name / chain ID / human label lookup
//! - Known token tables per chain with scan and funding priorities
//! - An injectable cache for token metadata resolved at runtime

pub mod cache;
pub mod tokens;

pub use cache::{TokenMetadata, TokenMetadataCache};
pub use tokens::{TokenInfo, TokenRole};

use crate::error::{EngineError, EngineResult};

/// A chain known to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct ChainInfo {
    pub chain_id: u64,
    /// Config key, e.g. `base`
    pub name: &'static str,
    /// Human label, e.g. `Base`
    pub label: &'static str,
    pub native_symbol: &'static str,
}

/// Lookup table over every supported chain
#[derive(Debug, Clone)]
pub struct ChainCatalog {
    chains: Vec<ChainInfo>,
}

const CHAINS: &[ChainInfo] = &[
    ChainInfo {
        chain_id: 1,
        name: "ethereum",
        label: "Ethereum",
        native_symbol: "ETH",
    },
    ChainInfo {
        chain_id: 10,
        name: "optimism",
        label: "OP Mainnet",
        native_symbol: "ETH",
    },
    ChainInfo {
        chain_id: 56,
        name: "bsc",
        label: "BNB Smart Chain",
        native_symbol: "BNB",
    },
    ChainInfo {
        chain_id: 137,
        name: "polygon",
        label: "Polygon",
        native_symbol: "POL",
    },
    ChainInfo {
        chain_id: 8453,
        name: "base",
        label: "Base",
        native_symbol: "ETH",
    },
    ChainInfo {
        chain_id: 42161,
        name: "arbitrum",
        label: "Arbitrum One",
        native_symbol: "ETH",
    },
    ChainInfo {
        chain_id: 43114,
        name: "avalanche",
        label: "Avalanche C-Chain",
        native_symbol: "AVAX",
    },
];

impl ChainCatalog {
    pub fn builtin() -> Self {
        Self {
            chains: CHAINS.to_vec(),
        }
    }

    pub fn all(&self) -> &[ChainInfo] {
        &self.chains
    }

    pub fn by_id(&self, chain_id: u64) -> Option<&ChainInfo> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    pub fn by_name(&self, name: &str) -> Option<&ChainInfo> {
        let name = name.trim();
        self.chains
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name) || c.label.eq_ignore_ascii_case(name))
    }

    /// Resolve a chain by ID, failing the single operation if unknown
    pub fn require(&self, chain_id: u64) -> EngineResult<&ChainInfo> {
        self.by_id(chain_id).ok_or_else(|| EngineError::UnsupportedChain {
            chain: chain_id.to_string(),
        })
    }

    pub fn require_name(&self, name: &str) -> EngineResult<&ChainInfo> {
        self.by_name(name).ok_or_else(|| EngineError::UnsupportedChain {
            chain: name.to_string(),
        })
    }

    pub fn label(&self, chain_id: u64) -> String {
        self.by_id(chain_id)
            .map(|c| c.label.to_string())
            .unwrap_or_else(|| format!("chain {}", chain_id))
    }

    /// Known tokens for a chain
    pub fn tokens(&self, chain_id: u64) -> &'static [TokenInfo] {
        tokens::for_chain(chain_id)
    }

    /// Resolve a token by symbol or address on a chain
    pub fn token(&self, chain_id: u64, symbol_or_address: &str) -> EngineResult<&'static TokenInfo> {
        self.require(chain_id)?;
        let needle = symbol_or_address.trim();
        self.tokens(chain_id)
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(needle) || t.address.eq_ignore_ascii_case(needle))
            .ok_or_else(|| EngineError::UnknownToken {
                chain_id,
                token: needle.to_string(),
            })
    }
}

impl Default for ChainCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
