//! Configuration management for the intent engine
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::catalog::ChainCatalog;
use crate::retry::RetryPolicy;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub engine: EngineConfig,
    pub protocol: ProtocolConfig,
    pub account: AccountConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    pub chains: HashMap<String, ChainConfig>,
    /// Symbol -> minimum balance in whole units, e.g. `USDC = "0.01"`
    #[serde(default)]
    pub spam_thresholds: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub max_concurrent_chains: usize,
    pub read_timeout_secs: u64,
    pub submit_timeout_secs: u64,
    /// Amount of the fee token pulled from the EOA per chain, in whole units
    pub default_funding_amount: String,
    /// Maximum slippage for rebalance intents, as a fraction
    #[serde(default = "default_slippage")]
    pub slippage: f64,
    pub retry: RetryConfig,
}

fn default_slippage() -> f64 {
    0.01
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    pub api_url: String,
    pub explorer_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub owner_address: String,
    pub smart_account_address: String,
    pub withdraw_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignerConfig {
    pub private_key_env: Option<String>,
    pub custodial_url: Option<String>,
    pub custodial_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    pub enabled: bool,
}

impl Settings {
    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(raw);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        if self.protocol.api_url.trim().is_empty() {
            anyhow::bail!("protocol.api_url must be set");
        }

        if self.engine.max_concurrent_chains == 0 {
            anyhow::bail!("engine.max_concurrent_chains must be at least 1");
        }

        if !(self.engine.slippage > 0.0 && self.engine.slippage <= 0.5) {
            anyhow::bail!("engine.slippage must be in (0, 0.5]");
        }

        if self.engine.retry.attempts == 0 {
            anyhow::bail!("engine.retry.attempts must be at least 1");
        }

        let catalog = ChainCatalog::builtin();
        for (name, chain) in &self.chains {
            match catalog.by_name(name) {
                Some(info) if info.chain_id != chain.chain_id => anyhow::bail!(
                    "Chain {} is configured with id {} but is known as {}",
                    name,
                    chain.chain_id,
                    info.chain_id
                ),
                Some(_) => {}
                None => anyhow::bail!("Chain {} is not in the chain catalog", name),
            }

            if chain.enabled && chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", name);
            }
        }

        for (symbol, threshold) in &self.spam_thresholds {
            threshold
                .parse::<crate::scan::Threshold>()
                .map_err(|e| anyhow::anyhow!("Invalid spam threshold for {}: {}", symbol, e))?;
        }

        if self.signer.private_key_env.is_none() && self.signer.custodial_url.is_none() {
            tracing::warn!("No signer configured - quotes cannot be signed");
        }

        Ok(())
    }

    /// Enabled chains ordered by chain ID
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        let mut chains: Vec<_> = self.chains.iter().filter(|(_, c)| c.enabled).collect();
        chains.sort_by_key(|(_, c)| c.chain_id);
        chains
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.read_timeout_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.submit_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.engine.retry.attempts,
            base_delay: Duration::from_millis(self.engine.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.engine.retry.max_delay_ms),
            jitter: self.engine.retry.jitter,
        }
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex");

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
