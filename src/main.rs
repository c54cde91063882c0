//! Intent Engine - multi-chain sweep and rebalance through an intent execution protocol
//!
//! Scans smart-account balances across chains, filters dust, composes
//! withdrawal or rebalance instructions, and submits them as signed
//! supertransactions.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ethers::types::Address;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

mod catalog;
mod chain;
mod config;
mod engine;
mod error;
mod intent;
mod metrics;
mod protocol;
mod retry;
mod scan;
#[cfg(test)]
mod test_support;

use catalog::TokenMetadataCache;
use chain::ChainRegistry;
use config::Settings;
use engine::{Orchestrator, OrchestratorConfig, RebalanceRequest, SweepOptions};
use protocol::{select_signer, HttpProtocolClient, ProtocolApi, StatusTracker};
use scan::SpamFilter;

#[derive(Parser, Debug)]
#[command(name = "intent-engine", version, about = "Multi-chain intent execution engine")]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "INTENT_ENGINE_CONFIG",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Print the Prometheus text exposition after the command
    #[arg(long, global = true)]
    print_metrics: bool,

    /// Print results as JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Withdraw every non-dust smart-account balance on every chain
    Sweep(SweepArgs),
    /// Submit a weighted rebalance described in a JSON file
    Rebalance {
        #[arg(long, value_name = "FILE")]
        request: PathBuf,
    },
    /// Look up a supertransaction
    Status(StatusArgs),
    /// List configured chains and whether their RPCs respond
    Chains,
}

#[derive(Args, Debug)]
struct SweepArgs {
    /// Fee-token amount pulled from the EOA per chain, in whole units
    #[arg(long)]
    funding_amount: Option<String>,
    /// Recipient of the withdrawn balances
    #[arg(long)]
    withdraw_address: Option<Address>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    hash: String,
    /// Poll until the supertransaction is final
    #[arg(long)]
    wait: bool,
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.log_json);

    info!("Starting Intent Engine v{}", env!("CARGO_PKG_VERSION"));

    let print_metrics = cli.print_metrics;
    let code = tokio::select! {
        result = run(cli) => result?,
        _ = shutdown_signal() => {
            warn!("Interrupted, abandoning in-flight work");
            ExitCode::from(130)
        }
    };

    if print_metrics {
        print!("{}", metrics::render());
    }
    Ok(code)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // Load configuration
    let settings = Settings::load_from(&cli.config)?;
    info!(
        "Loaded configuration for {} chains",
        settings.enabled_chains().len()
    );

    match cli.command {
        Command::Sweep(args) => {
            let orchestrator = build_orchestrator(&settings)?;
            let report = match orchestrator
                .sweep(SweepOptions {
                    funding_amount_per_chain: args.funding_amount,
                    withdraw_address: args.withdraw_address,
                })
                .await
            {
                Ok(report) => report,
                Err(e) if e.is_fatal() => {
                    error!("Sweep aborted: {}", e);
                    return Ok(ExitCode::from(3));
                }
                Err(e) => return Err(e.into()),
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.summary());
            }
            Ok(if report.has_failures() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            })
        }

        Command::Rebalance { request } => {
            let raw = std::fs::read_to_string(&request)
                .with_context(|| format!("Failed to read rebalance request: {:?}", request))?;
            let request: RebalanceRequest =
                serde_json::from_str(&raw).context("Failed to parse rebalance request")?;

            let orchestrator = build_orchestrator(&settings)?;
            let outcome = orchestrator.rebalance(request).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.summary());
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Status(args) => {
            let tracker = StatusTracker::new(protocol_client(&settings)?);
            let status = if args.wait {
                tracker
                    .wait_for_final(
                        &args.hash,
                        Duration::from_secs(args.interval_secs),
                        Duration::from_secs(args.timeout_secs),
                    )
                    .await?
            } else {
                tracker.status(&args.hash).await?
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}: {}", args.hash, status.status);
                println!("  {}", tracker.explorer_url(&args.hash));
            }
            Ok(if status.is_failure() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            })
        }

        Command::Chains => {
            let registry = ChainRegistry::from_settings(&settings)?;
            let health: HashMap<u64, bool> = registry.health_check().await.into_iter().collect();
            for chain in registry.catalog().all() {
                let state = match health.get(&chain.chain_id) {
                    Some(true) => "ok",
                    Some(false) => {
                        warn!("Chain {} health check failed", chain.chain_id);
                        "unreachable"
                    }
                    None => "not configured",
                };
                println!("{:>6}  {:<20} {}", chain.chain_id, chain.label, state);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn protocol_client(settings: &Settings) -> Result<Arc<dyn ProtocolApi>> {
    let client = HttpProtocolClient::new(
        &settings.protocol,
        settings.read_timeout(),
        settings.submit_timeout(),
        settings.retry_policy(),
    )?;
    Ok(Arc::new(client))
}

fn build_orchestrator(settings: &Settings) -> Result<Orchestrator> {
    let config = OrchestratorConfig::from_settings(settings)?;

    // Initialize chain registry (one provider per enabled chain)
    let registry = ChainRegistry::from_settings(settings)?;
    info!("Chain providers initialized");

    let protocol = protocol_client(settings)?;
    let signer = select_signer(&settings.signer, config.owner, settings.submit_timeout())?;
    let spam_filter = SpamFilter::with_overrides(&settings.spam_thresholds)
        .map_err(|e| anyhow::anyhow!("Invalid spam threshold: {}", e))?;

    Ok(Orchestrator::new(
        config,
        registry,
        protocol,
        signer,
        spam_filter,
        Arc::new(TokenMetadataCache::new()),
    ))
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,intent_engine=debug,hyper=warn,reqwest=warn")
    });
    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so reports on stdout stay machine-readable
    if json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}
