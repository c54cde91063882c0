//! Engine module - drives sweeps and rebalances across chains
//!
//! This module provides:
//! - The orchestrator running one independent pipeline per chain
//! - Per-chain results and the aggregated report handed back to callers

pub mod orchestrator;
pub mod report;

pub use orchestrator::{
    InputPosition, Orchestrator, OrchestratorConfig, RebalanceRequest, SweepOptions,
    TargetPosition,
};
pub use report::{ChainResult, ChainStatus, RebalanceOutcome, SweepReport, SweepTotals};
