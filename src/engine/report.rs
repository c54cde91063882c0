//! Per-chain results and the aggregated run report

use crate::catalog::ChainInfo;
use crate::error::EngineError;
use crate::protocol::QuoteType;
use crate::scan::{FundingToken, TokenBalance};

use chrono::{DateTime, Utc};
use ethers::types::Address;
use serde::Serialize;
use std::fmt::Write as _;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// Outcome of one chain pipeline
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainResult {
    pub chain: String,
    pub chain_id: u64,
    pub status: ChainStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supertx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
    pub tokens_moved: Vec<TokenBalance>,
    pub tokens_found: usize,
    pub tokens_filtered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_token: Option<FundingToken>,
    /// Failure or skip reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChainResult {
    pub fn new(chain: &ChainInfo) -> Self {
        Self {
            chain: chain.label.to_string(),
            chain_id: chain.chain_id,
            status: ChainStatus::Skipped,
            supertx_hash: None,
            explorer_url: None,
            tokens_moved: Vec::new(),
            tokens_found: 0,
            tokens_filtered: 0,
            funding_token: None,
            reason: None,
        }
    }

    pub fn succeed(mut self, supertx_hash: String, explorer_url: String) -> Self {
        self.status = ChainStatus::Succeeded;
        self.supertx_hash = Some(supertx_hash);
        self.explorer_url = Some(explorer_url);
        self.reason = None;
        self
    }

    pub fn fail(mut self, error: &EngineError) -> Self {
        self.status = ChainStatus::Failed;
        self.reason = Some(error.to_string());
        self
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.status = ChainStatus::Skipped;
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepTotals {
    pub tokens_found: usize,
    pub tokens_filtered: usize,
    pub tokens_moved: usize,
    pub chains_attempted: usize,
    pub chains_succeeded: usize,
    pub chains_failed: usize,
    pub chains_skipped: usize,
}

impl SweepTotals {
    fn from_results(results: &[ChainResult]) -> Self {
        let mut totals = SweepTotals {
            chains_attempted: results.len(),
            ..Default::default()
        };
        for result in results {
            totals.tokens_found += result.tokens_found;
            totals.tokens_filtered += result.tokens_filtered;
            totals.tokens_moved += result.tokens_moved.len();
            match result.status {
                ChainStatus::Succeeded => totals.chains_succeeded += 1,
                ChainStatus::Failed => totals.chains_failed += 1,
                ChainStatus::Skipped => totals.chains_skipped += 1,
            }
        }
        totals
    }
}

/// Every attempted chain, in chain ID order, plus totals
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub owner: Address,
    pub smart_account: Address,
    pub recipient: Address,
    pub chains: Vec<ChainResult>,
    pub totals: SweepTotals,
}

impl SweepReport {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        owner: Address,
        smart_account: Address,
        recipient: Address,
        mut chains: Vec<ChainResult>,
    ) -> Self {
        chains.sort_by_key(|c| c.chain_id);
        let totals = SweepTotals::from_results(&chains);
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            owner,
            smart_account,
            recipient,
            chains,
            totals,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.totals.chains_failed > 0
    }

    /// Human-readable report
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Sweep {} ({:?} -> {:?})",
            self.run_id, self.smart_account, self.recipient
        );

        for chain in &self.chains {
            match chain.status {
                ChainStatus::Succeeded => {
                    let moved: Vec<String> = chain
                        .tokens_moved
                        .iter()
                        .map(|t| format!("{} {}", t.display_amount(), t.symbol))
                        .collect();
                    let _ = writeln!(out, "  [ok]   {}: moved {}", chain.chain, moved.join(", "));
                    if let Some(url) = &chain.explorer_url {
                        let _ = writeln!(out, "         {}", url);
                    }
                }
                ChainStatus::Failed => {
                    let _ = writeln!(
                        out,
                        "  [fail] {}: {}",
                        chain.chain,
                        chain.reason.as_deref().unwrap_or("unknown failure")
                    );
                }
                ChainStatus::Skipped => {
                    let _ = writeln!(
                        out,
                        "  [skip] {}: {}",
                        chain.chain,
                        chain.reason.as_deref().unwrap_or("nothing to do")
                    );
                }
            }
        }

        let t = &self.totals;
        let _ = write!(
            out,
            "{} chains: {} succeeded, {} failed, {} skipped; {} tokens found, {} filtered as dust, {} moved",
            t.chains_attempted,
            t.chains_succeeded,
            t.chains_failed,
            t.chains_skipped,
            t.tokens_found,
            t.tokens_filtered,
            t.tokens_moved
        );
        out
    }
}

/// Result of a submitted rebalance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceOutcome {
    pub supertx_hash: String,
    pub explorer_url: String,
    pub quote_type: QuoteType,
    pub flows: usize,
    pub funding_tokens: Vec<FundingToken>,
}

impl RebalanceOutcome {
    pub fn summary(&self) -> String {
        format!(
            "Rebalance submitted ({} flows, {:?} quote): {}\n  {}",
            self.flows, self.quote_type, self.supertx_hash, self.explorer_url
        )
    }
}
