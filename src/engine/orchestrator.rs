//! Per-chain sweep pipelines and the rebalance flow
//!
//! A sweep runs `scan -> filter -> fund -> compose -> quote -> sign -> execute`
//! for every registered chain as an independent task. Tasks never share
//! mutable state; their results are reduced in chain order once all of them
//! have finished.

use super::report::{ChainResult, RebalanceOutcome, SweepReport};
use crate::catalog::{ChainInfo, TokenMetadataCache};
use crate::chain::ChainRegistry;
use crate::config::Settings;
use crate::error::{EngineError, EngineResult};
use crate::intent::{IntentComposer, RebalanceInput, RebalanceTarget, WithdrawAsset};
use crate::protocol::{
    FeeToken, PayloadSigner, ProtocolApi, QuoteMode, QuoteRequest, QuoteType, Signer,
    StatusTracker,
};
use crate::retry::RetryPolicy;
use crate::scan::funding::parse_amount;
use crate::scan::{BalanceScanner, FundingResolver, FundingToken, SpamFilter};

use chrono::Utc;
use ethers::types::{Address, U256};
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Account addresses and knobs the orchestrator runs with
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub owner: Address,
    pub smart_account: Address,
    /// Default withdrawal recipient
    pub recipient: Address,
    pub default_funding_amount: String,
    pub max_concurrent_chains: usize,
    pub slippage: f64,
    pub retry: RetryPolicy,
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> EngineResult<Self> {
        let owner = parse_address("account.owner_address", &settings.account.owner_address)?;
        let smart_account = parse_address(
            "account.smart_account_address",
            &settings.account.smart_account_address,
        )?;
        let recipient = match &settings.account.withdraw_address {
            Some(raw) if !raw.trim().is_empty() => parse_address("account.withdraw_address", raw)?,
            _ => owner,
        };

        Ok(Self {
            owner,
            smart_account,
            recipient,
            default_funding_amount: settings.engine.default_funding_amount.clone(),
            max_concurrent_chains: settings.engine.max_concurrent_chains.max(1),
            slippage: settings.engine.slippage,
            retry: settings.retry_policy(),
        })
    }
}

fn parse_address(field: &str, raw: &str) -> EngineResult<Address> {
    raw.trim()
        .parse()
        .map_err(|_| EngineError::Config(format!("{} is not an address: {:?}", field, raw)))
}

/// Caller overrides for a single sweep
#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    /// Fee-token amount pulled from the EOA on each chain, in whole units
    pub funding_amount_per_chain: Option<String>,
    pub withdraw_address: Option<Address>,
}

/// A rebalance as submitted by the caller
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceRequest {
    pub inputs: Vec<InputPosition>,
    pub targets: Vec<TargetPosition>,
    #[serde(default)]
    pub mode: Option<QuoteMode>,
    #[serde(default)]
    pub recipient: Option<Address>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputPosition {
    pub chain_id: u64,
    /// Symbol or address
    pub token: String,
    /// Whole units, e.g. `"1000"`
    pub amount: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPosition {
    pub chain_id: u64,
    pub token: String,
    pub weight: f64,
}

enum PipelineOutcome {
    Submitted { supertx_hash: String },
    NothingToMove(String),
}

#[derive(Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: ChainRegistry,
    scanner: Arc<BalanceScanner>,
    spam_filter: Arc<SpamFilter>,
    funding: Arc<FundingResolver>,
    composer: IntentComposer,
    protocol: Arc<dyn ProtocolApi>,
    payload_signer: Arc<PayloadSigner>,
    status: Arc<StatusTracker>,
    cache: Arc<TokenMetadataCache>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: ChainRegistry,
        protocol: Arc<dyn ProtocolApi>,
        signer: Arc<dyn Signer>,
        spam_filter: SpamFilter,
        cache: Arc<TokenMetadataCache>,
    ) -> Self {
        let catalog = registry.catalog().clone();
        let payload_signer = PayloadSigner::new(signer);
        if payload_signer.address() != config.owner {
            warn!(
                "Signer {:?} is not the configured owner {:?}",
                payload_signer.address(),
                config.owner
            );
        }

        Self {
            scanner: Arc::new(BalanceScanner::new(catalog.clone(), config.retry.clone())),
            funding: Arc::new(FundingResolver::new(catalog, config.retry.clone())),
            composer: IntentComposer::new(config.slippage),
            payload_signer: Arc::new(payload_signer),
            status: Arc::new(StatusTracker::new(protocol.clone())),
            spam_filter: Arc::new(spam_filter),
            config,
            registry,
            protocol,
            cache,
        }
    }

    /// Withdraw every non-dust smart-account balance on every chain.
    ///
    /// Only caller input errors fail the whole sweep; everything that goes
    /// wrong on a chain ends up in that chain's result.
    pub async fn sweep(&self, options: SweepOptions) -> EngineResult<SweepReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let recipient = options.withdraw_address.unwrap_or(self.config.recipient);
        if recipient.is_zero() {
            return Err(EngineError::MissingParameters(
                "withdraw address must not be the zero address".to_string(),
            ));
        }
        let funding_amount = options
            .funding_amount_per_chain
            .unwrap_or_else(|| self.config.default_funding_amount.clone());
        if parse_amount(&funding_amount, 18)?.is_zero() {
            return Err(EngineError::MissingParameters(
                "funding amount must be positive".to_string(),
            ));
        }

        let chains = self.registry.chains();
        if chains.is_empty() {
            return Err(EngineError::ServiceUnavailable(
                "no chain clients configured".to_string(),
            ));
        }

        info!(
            "Sweep {} starting on {} chains ({} at a time) -> {:?}",
            run_id,
            chains.len(),
            self.config.max_concurrent_chains,
            recipient
        );

        debug!("Read retry schedule: {:?}", self.config.retry.schedule());

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_chains));
        let handles: Vec<_> = chains
            .iter()
            .map(|chain| {
                let this = self.clone();
                let chain = chain.clone();
                let semaphore = semaphore.clone();
                let funding_amount = funding_amount.clone();
                let span = info_span!("chain", chain_id = chain.chain_id, chain = chain.label);

                tokio::spawn(
                    async move {
                        let _permit = match semaphore.acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => {
                                return ChainResult::new(&chain).fail(
                                    &EngineError::ServiceUnavailable(
                                        "chain scheduler closed".to_string(),
                                    ),
                                )
                            }
                        };
                        this.sweep_chain(&chain, recipient, &funding_amount).await
                    }
                    .instrument(span),
                )
            })
            .collect();

        let results: Vec<ChainResult> = join_all(handles)
            .await
            .into_iter()
            .zip(chains.iter())
            .map(|(joined, chain)| match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("Chain task for {} aborted: {}", chain.label, e);
                    ChainResult::new(chain).fail(&EngineError::ExecutionFailed(format!(
                        "chain pipeline aborted: {}",
                        e
                    )))
                }
            })
            .collect();

        for result in &results {
            crate::metrics::record_chain_outcome(result.chain_id, result.status);
        }

        let report = SweepReport::new(
            run_id,
            started_at,
            self.config.owner,
            self.config.smart_account,
            recipient,
            results,
        );
        info!(
            "Sweep {} finished: {} succeeded, {} failed, {} skipped",
            run_id,
            report.totals.chains_succeeded,
            report.totals.chains_failed,
            report.totals.chains_skipped
        );
        Ok(report)
    }

    async fn sweep_chain(
        &self,
        chain: &ChainInfo,
        recipient: Address,
        funding_amount: &str,
    ) -> ChainResult {
        let mut result = ChainResult::new(chain);
        match self
            .run_sweep_pipeline(chain, recipient, funding_amount, &mut result)
            .await
        {
            Ok(PipelineOutcome::Submitted { supertx_hash }) => {
                let url = self.status.explorer_url(&supertx_hash);
                info!("Sweep submitted on {}: {}", chain.label, url);
                result.succeed(supertx_hash, url)
            }
            Ok(PipelineOutcome::NothingToMove(reason)) => {
                info!("Skipping {}: {}", chain.label, reason);
                result.skip(reason)
            }
            Err(e @ EngineError::FundingNotFound { .. }) => {
                warn!("Skipping {}: {}", chain.label, e);
                result.skip(e.to_string())
            }
            Err(e) => {
                error!("Sweep failed on {}: {}", chain.label, e);
                result.fail(&e)
            }
        }
    }

    async fn run_sweep_pipeline(
        &self,
        chain: &ChainInfo,
        recipient: Address,
        funding_amount: &str,
        result: &mut ChainResult,
    ) -> EngineResult<PipelineOutcome> {
        let chain_id = chain.chain_id;
        let reader = self.registry.reader(chain_id)?;

        let balances = self
            .scanner
            .scan(reader.as_ref(), self.config.smart_account)
            .await?;
        let actionable = self.spam_filter.filter(&balances);
        result.tokens_found = balances.len();
        result.tokens_filtered = balances.len() - actionable.len();
        crate::metrics::record_tokens_filtered(chain_id, result.tokens_filtered);

        if actionable.is_empty() {
            return Ok(PipelineOutcome::NothingToMove(if balances.is_empty() {
                "no balances on smart account".to_string()
            } else {
                format!("{} balance(s), all below dust thresholds", balances.len())
            }));
        }

        let funding = self
            .funding
            .find_funding_token(reader.as_ref(), self.config.owner, Some(funding_amount))
            .await?
            .ok_or_else(|| EngineError::FundingNotFound {
                chain_id,
                message: format!(
                    "owner holds no fee-capable token worth {} on {}",
                    funding_amount, chain.label
                ),
            })?;
        result.funding_token = Some(funding.clone());

        let flows = actionable
            .iter()
            .map(|balance| {
                let asset = if balance.is_native {
                    WithdrawAsset::Native {
                        amount: balance.balance,
                    }
                } else {
                    WithdrawAsset::Erc20 {
                        token: balance.token_address,
                    }
                };
                self.composer.build_withdrawal(asset, chain_id, recipient)
            })
            .collect::<EngineResult<Vec<_>>>()?;
        debug!("{} withdrawal flows on {}", flows.len(), chain.label);

        let request = QuoteRequest {
            mode: QuoteMode::Eoa,
            owner_address: self.config.owner,
            compose_flows: flows,
            fee_token: Some(FeeToken {
                address: funding.token_address,
                chain_id,
            }),
            funding_tokens: vec![funding],
        };

        let (supertx_hash, _) = self.quote_sign_execute(&request).await?;
        result.tokens_moved = actionable;
        Ok(PipelineOutcome::Submitted { supertx_hash })
    }

    /// Validate, resolve and submit a weighted rebalance.
    ///
    /// Weights are checked before any network call, and EOA funding before
    /// the quote is requested.
    pub async fn rebalance(&self, request: RebalanceRequest) -> EngineResult<RebalanceOutcome> {
        let mode = request.mode.unwrap_or(QuoteMode::Eoa);
        let recipient = request.recipient.unwrap_or(self.config.owner);

        let targets = request
            .targets
            .iter()
            .map(|t| {
                let (token_address, _) = self.resolve_token(t.chain_id, &t.token)?;
                Ok(RebalanceTarget {
                    chain_id: t.chain_id,
                    token_address,
                    weight: t.weight,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        crate::intent::compose::validate_weights(&targets)?;
        if request.inputs.is_empty() {
            return Err(EngineError::MissingParameters(
                "rebalance needs at least one input position".to_string(),
            ));
        }

        let mut funding_tokens = Vec::with_capacity(request.inputs.len());
        for input in &request.inputs {
            funding_tokens.push(self.resolve_input(input, mode).await?);
        }
        let inputs: Vec<RebalanceInput> = funding_tokens
            .iter()
            .map(|f| RebalanceInput {
                chain_id: f.chain_id,
                token_address: f.token_address,
                amount: f.amount,
            })
            .collect();

        let flows = self
            .composer
            .compose_rebalance(mode, &inputs, &targets, recipient)?;

        let funding_tokens = match mode {
            QuoteMode::Eoa => {
                self.check_eoa_funding(&funding_tokens).await?;
                funding_tokens
            }
            QuoteMode::SmartAccount => vec![self.smart_account_fee_token(&inputs[0]).await?],
        };

        let request = QuoteRequest {
            mode,
            owner_address: self.config.owner,
            compose_flows: flows,
            fee_token: funding_tokens.first().map(|f| FeeToken {
                address: f.token_address,
                chain_id: f.chain_id,
            }),
            funding_tokens,
        };
        let flow_count = request.compose_flows.len();

        let (supertx_hash, quote_type) = self.quote_sign_execute(&request).await?;
        let explorer_url = self.status.explorer_url(&supertx_hash);
        info!("Rebalance submitted: {}", explorer_url);
        debug!("{} token metadata entries cached", self.cache.len());

        Ok(RebalanceOutcome {
            supertx_hash,
            explorer_url,
            quote_type,
            flows: flow_count,
            funding_tokens: request.funding_tokens,
        })
    }

    /// Symbol, native symbol or address to (address, known decimals)
    fn resolve_token(&self, chain_id: u64, token: &str) -> EngineResult<(Address, Option<u8>)> {
        let catalog = self.registry.catalog();
        let chain = catalog.require(chain_id)?;
        if token.trim().eq_ignore_ascii_case(chain.native_symbol) {
            return Ok((Address::zero(), Some(18)));
        }

        match catalog.token(chain_id, token) {
            Ok(info) => Ok((info.address(), Some(info.decimals))),
            Err(unknown) => token
                .trim()
                .parse::<Address>()
                .map(|address| (address, None))
                .map_err(|_| unknown),
        }
    }

    async fn resolve_input(
        &self,
        input: &InputPosition,
        mode: QuoteMode,
    ) -> EngineResult<FundingToken> {
        let (token_address, known_decimals) = self.resolve_token(input.chain_id, &input.token)?;
        if token_address.is_zero() && mode == QuoteMode::Eoa {
            return Err(EngineError::MissingParameters(format!(
                "native input on chain {} cannot fund an EOA rebalance; use the wrapped token",
                input.chain_id
            )));
        }

        let (symbol, decimals) = match known_decimals {
            Some(decimals) => (input.token.trim().to_string(), decimals),
            None => {
                let reader = self.registry.reader(input.chain_id)?;
                let metadata = self
                    .cache
                    .get_or_fetch(reader.as_ref(), token_address, &self.config.retry)
                    .await?;
                (metadata.symbol, metadata.decimals)
            }
        };

        let amount = parse_amount(&input.amount, decimals)?;
        if amount.is_zero() {
            return Err(EngineError::MissingParameters(format!(
                "input {} on chain {} has a zero amount",
                symbol, input.chain_id
            )));
        }

        Ok(FundingToken {
            token_address,
            chain_id: input.chain_id,
            amount,
            symbol,
            decimals,
        })
    }

    /// Every input must already sit in the owner's EOA. Inputs drawing on
    /// the same token are summed before the balance comparison.
    async fn check_eoa_funding(&self, inputs: &[FundingToken]) -> EngineResult<()> {
        let mut required: Vec<(u64, Address, U256, &FundingToken)> = Vec::new();
        for input in inputs {
            match required
                .iter_mut()
                .find(|(chain_id, token, _, _)| {
                    *chain_id == input.chain_id && *token == input.token_address
                })
            {
                Some(entry) => {
                    entry.2 = entry.2.checked_add(input.amount).ok_or_else(|| {
                        EngineError::MissingParameters(format!(
                            "total {} input on chain {} overflows",
                            input.symbol, input.chain_id
                        ))
                    })?;
                }
                None => required.push((input.chain_id, input.token_address, input.amount, input)),
            }
        }

        let owner = self.config.owner;
        for (chain_id, token, needed, input) in required {
            let reader = self.registry.reader(chain_id)?;
            let balance = self
                .config
                .retry
                .run("funding balance", |_| reader.erc20_balance(token, owner))
                .await?;

            if balance < needed {
                return Err(EngineError::FundingNotFound {
                    chain_id,
                    message: format!(
                        "owner holds {} of {} on {}, needs {}",
                        balance,
                        input.symbol,
                        self.registry.catalog().label(chain_id),
                        needed
                    ),
                });
            }
        }
        Ok(())
    }

    async fn smart_account_fee_token(&self, input: &RebalanceInput) -> EngineResult<FundingToken> {
        let reader = self.registry.reader(input.chain_id)?;
        self.funding
            .find_funding_token(
                reader.as_ref(),
                self.config.owner,
                Some(&self.config.default_funding_amount),
            )
            .await?
            .ok_or_else(|| EngineError::FundingNotFound {
                chain_id: input.chain_id,
                message: "owner holds no fee-capable token to pay for the rebalance".to_string(),
            })
    }

    async fn quote_sign_execute(&self, request: &QuoteRequest) -> EngineResult<(String, QuoteType)> {
        let quote = self.protocol.quote(request).await?;
        let signed = self.payload_signer.sign_quote(&quote).await?;
        let supertx_hash = self.protocol.execute(&signed).await?;
        Ok((supertx_hash, quote.quote_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ChainCatalog;
    use crate::chain::{BalanceReader, MockBalanceReader};
    use crate::engine::ChainStatus;
    use crate::protocol::client::MockProtocolApi;
    use crate::protocol::signer::MockSigner;
    use crate::protocol::QuoteResponse;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    fn owner() -> Address {
        Address::repeat_byte(0x11)
    }

    fn smart_account() -> Address {
        Address::repeat_byte(0x22)
    }

    fn token(chain_id: u64, symbol: &str) -> Address {
        ChainCatalog::builtin()
            .token(chain_id, symbol)
            .unwrap()
            .address()
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            owner: owner(),
            smart_account: smart_account(),
            recipient: owner(),
            default_funding_amount: "1".to_string(),
            max_concurrent_chains: 2,
            slippage: 0.01,
            retry: RetryPolicy {
                attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                jitter: 0.0,
            },
        }
    }

    /// 0.001 ETH on the smart account, 5 USDC on the owner's EOA
    fn healthy_reader(chain_id: u64) -> Arc<dyn BalanceReader> {
        let usdc = token(chain_id, "USDC");
        let mut reader = MockBalanceReader::new();
        reader.expect_chain_id().return_const(chain_id);
        reader
            .expect_native_balance()
            .returning(|_| Ok(U256::exp10(15)));
        reader.expect_erc20_balance().returning(move |t, holder| {
            Ok(if t == usdc && holder == owner() {
                U256::from(5_000_000u64)
            } else {
                U256::zero()
            })
        });
        Arc::new(reader)
    }

    fn broken_reader(chain_id: u64) -> Arc<dyn BalanceReader> {
        let mut reader = MockBalanceReader::new();
        reader.expect_chain_id().return_const(chain_id);
        reader.expect_native_balance().returning(move |_| {
            Err(EngineError::Rpc {
                chain_id,
                message: "connection refused".into(),
            })
        });
        Arc::new(reader)
    }

    fn registry(readers: Vec<Arc<dyn BalanceReader>>) -> ChainRegistry {
        let mut registry = ChainRegistry::new(ChainCatalog::builtin());
        for reader in readers {
            registry.insert(reader);
        }
        registry
    }

    fn permit_quote() -> QuoteResponse {
        serde_json::from_value(json!({
            "quoteType": "permit",
            "ownerAddress": format!("{:?}", owner()),
            "payloadToSign": [{
                "signablePayload": {"domain": {}, "types": {}, "primaryType": "Permit", "message": {}}
            }],
            "hash": "0xquote"
        }))
        .unwrap()
    }

    fn protocol(captured: Arc<Mutex<Vec<Value>>>) -> MockProtocolApi {
        let mut api = MockProtocolApi::new();
        api.expect_quote().returning(move |req| {
            captured.lock().unwrap().push(serde_json::to_value(req).unwrap());
            Ok(permit_quote())
        });
        api.expect_execute().returning(|signed| {
            assert!(signed.is_fully_signed());
            Ok("0xsupertx".to_string())
        });
        api.expect_explorer_url()
            .returning(|hash| format!("https://explorer.example/details/{}", hash));
        api
    }

    /// Signer that identifies as the owner and expects no signing
    fn bare_signer() -> MockSigner {
        let mut signer = MockSigner::new();
        signer.expect_address().return_const(owner());
        signer
    }

    fn signer() -> MockSigner {
        let mut signer = bare_signer();
        signer.expect_backend().return_const("mock");
        signer
            .expect_sign_typed_data()
            .returning(|_| Ok("0xsig".to_string()));
        signer
    }

    fn orchestrator(registry: ChainRegistry, api: MockProtocolApi, signer: MockSigner) -> Orchestrator {
        Orchestrator::new(
            config(),
            registry,
            Arc::new(api),
            Arc::new(signer),
            SpamFilter::new(),
            Arc::new(TokenMetadataCache::new()),
        )
    }

    #[tokio::test]
    async fn failed_chain_does_not_block_its_siblings() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let engine = orchestrator(
            registry(vec![healthy_reader(10), broken_reader(137), healthy_reader(8453)]),
            protocol(captured.clone()),
            signer(),
        );

        let report = engine.sweep(SweepOptions::default()).await.unwrap();

        let statuses: Vec<(u64, ChainStatus)> =
            report.chains.iter().map(|c| (c.chain_id, c.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (10, ChainStatus::Succeeded),
                (137, ChainStatus::Failed),
                (8453, ChainStatus::Succeeded),
            ]
        );
        assert!(report.chains[1]
            .reason
            .as_deref()
            .unwrap()
            .contains("Balance scan failed"));
        assert_eq!(report.chains[0].tokens_moved.len(), 1);
        assert_eq!(
            report.chains[2].explorer_url.as_deref(),
            Some("https://explorer.example/details/0xsupertx")
        );
        assert_eq!(report.totals.chains_attempted, 3);
        assert_eq!(report.totals.chains_failed, 1);

        let requests = captured.lock().unwrap();
        assert_eq!(requests.len(), 2);
        for request in requests.iter() {
            assert_eq!(request["mode"], "eoa");
            assert_eq!(request["composeFlows"][0]["type"], "/instructions/build");
            assert_eq!(request["composeFlows"][0]["data"]["value"], "1000000000000000");
            assert_eq!(request["fundingTokens"][0]["amount"], "1000000");
        }
    }

    #[tokio::test]
    async fn chain_without_funding_is_skipped() {
        let mut reader = MockBalanceReader::new();
        reader.expect_chain_id().return_const(8453u64);
        reader
            .expect_native_balance()
            .returning(|_| Ok(U256::exp10(15)));
        reader
            .expect_erc20_balance()
            .returning(|_, _| Ok(U256::zero()));

        let mut api = MockProtocolApi::new();
        api.expect_quote().never();

        let report = orchestrator(registry(vec![Arc::new(reader)]), api, bare_signer())
            .sweep(SweepOptions::default())
            .await
            .unwrap();

        let chain = &report.chains[0];
        assert_eq!(chain.status, ChainStatus::Skipped);
        assert!(chain.reason.as_deref().unwrap().contains("No funding token"));
        assert_eq!(chain.tokens_found, 1);
    }

    #[tokio::test]
    async fn dust_only_chain_is_skipped() {
        let mut reader = MockBalanceReader::new();
        reader.expect_chain_id().return_const(8453u64);
        // 0.00005 ETH
        reader
            .expect_native_balance()
            .returning(|_| Ok(U256::from(50_000_000_000_000u64)));
        reader
            .expect_erc20_balance()
            .returning(|_, _| Ok(U256::zero()));

        let mut api = MockProtocolApi::new();
        api.expect_quote().never();

        let report = orchestrator(registry(vec![Arc::new(reader)]), api, bare_signer())
            .sweep(SweepOptions::default())
            .await
            .unwrap();

        let chain = &report.chains[0];
        assert_eq!(chain.status, ChainStatus::Skipped);
        assert_eq!(chain.tokens_found, 1);
        assert_eq!(chain.tokens_filtered, 1);
        assert_eq!(report.totals.chains_skipped, 1);
    }

    #[tokio::test]
    async fn authorization_required_is_recorded_per_chain() {
        let mut api = MockProtocolApi::new();
        api.expect_quote().returning(|_| {
            Err(EngineError::AuthorizationRequired {
                authorizations: vec![json!({"chainId": 8453})],
            })
        });
        api.expect_execute().never();

        let report = orchestrator(registry(vec![healthy_reader(8453)]), api, bare_signer())
            .sweep(SweepOptions::default())
            .await
            .unwrap();

        let chain = &report.chains[0];
        assert_eq!(chain.status, ChainStatus::Failed);
        assert!(chain.reason.as_deref().unwrap().contains("authorization required"));
    }

    #[tokio::test]
    async fn panicking_chain_becomes_a_failed_result() {
        let mut reader = MockBalanceReader::new();
        reader.expect_chain_id().return_const(42161u64);
        reader
            .expect_native_balance()
            .returning(|_| panic!("reader bug"));

        let report = orchestrator(
            registry(vec![healthy_reader(10), Arc::new(reader)]),
            protocol(Arc::new(Mutex::new(Vec::new()))),
            signer(),
        )
        .sweep(SweepOptions::default())
        .await
        .unwrap();

        assert_eq!(report.chains[0].status, ChainStatus::Succeeded);
        assert_eq!(report.chains[1].chain_id, 42161);
        assert_eq!(report.chains[1].status, ChainStatus::Failed);
        assert!(report.chains[1].reason.as_deref().unwrap().contains("aborted"));
    }

    #[tokio::test]
    async fn sweep_honours_overrides() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let recipient = Address::repeat_byte(0x33);
        let report = orchestrator(
            registry(vec![healthy_reader(8453)]),
            protocol(captured.clone()),
            signer(),
        )
        .sweep(SweepOptions {
            funding_amount_per_chain: Some("2".into()),
            withdraw_address: Some(recipient),
        })
        .await
        .unwrap();

        assert_eq!(report.recipient, recipient);
        let requests = captured.lock().unwrap();
        assert_eq!(requests[0]["fundingTokens"][0]["amount"], "2000000");
        assert_eq!(
            requests[0]["composeFlows"][0]["data"]["to"],
            serde_json::to_value(recipient).unwrap()
        );
    }

    #[tokio::test]
    async fn sweep_rejects_bad_input_before_touching_chains() {
        let engine = orchestrator(registry(vec![]), MockProtocolApi::new(), bare_signer());
        let err = engine
            .sweep(SweepOptions {
                funding_amount_per_chain: Some("plenty".into()),
                withdraw_address: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingParameters(_)));

        let err = engine
            .sweep(SweepOptions {
                funding_amount_per_chain: None,
                withdraw_address: Some(Address::zero()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingParameters(_)));

        let err = engine.sweep(SweepOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::ServiceUnavailable(_)));
    }

    fn rebalance_request(weights: (f64, f64)) -> RebalanceRequest {
        serde_json::from_value(json!({
            "inputs": [{"chainId": 8453, "token": "USDC", "amount": "1000"}],
            "targets": [
                {"chainId": 8453, "token": "WETH", "weight": weights.0},
                {"chainId": 10, "token": "USDT", "weight": weights.1}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn rebalance_end_to_end() {
        let usdc = token(8453, "USDC");
        let mut base = MockBalanceReader::new();
        base.expect_chain_id().return_const(8453u64);
        base.expect_erc20_balance().returning(move |t, holder| {
            assert_eq!(t, usdc);
            assert_eq!(holder, owner());
            Ok(U256::from(2_500_000_000u64))
        });
        let mut optimism = MockBalanceReader::new();
        optimism.expect_chain_id().return_const(10u64);

        let captured = Arc::new(Mutex::new(Vec::new()));
        let engine = orchestrator(
            registry(vec![Arc::new(base), Arc::new(optimism)]),
            protocol(captured.clone()),
            signer(),
        );

        let outcome = engine.rebalance(rebalance_request((0.6, 0.4))).await.unwrap();
        assert_eq!(outcome.supertx_hash, "0xsupertx");
        assert_eq!(outcome.flows, 3);
        assert_eq!(outcome.quote_type, QuoteType::Permit);

        let requests = captured.lock().unwrap();
        let request = &requests[0];
        assert_eq!(
            request["fundingTokens"],
            json!([{
                "tokenAddress": serde_json::to_value(usdc).unwrap(),
                "chainId": 8453,
                "amount": "1000000000"
            }])
        );
        let flows = request["composeFlows"].as_array().unwrap();
        assert_eq!(flows.len(), 3);
        assert_eq!(flows[0]["type"], "/instructions/intent");
        assert_eq!(flows[0]["data"]["targetPositions"][0]["weight"], 0.6);
        assert_eq!(flows[1]["data"]["chainId"], 8453);
        assert_eq!(
            flows[1]["data"]["to"],
            serde_json::to_value(token(8453, "WETH")).unwrap()
        );
        assert_eq!(flows[2]["data"]["chainId"], 10);
        assert_eq!(
            flows[2]["data"]["to"],
            serde_json::to_value(token(10, "USDT")).unwrap()
        );
    }

    #[tokio::test]
    async fn bad_weights_fail_before_any_network_call() {
        let mut base = MockBalanceReader::new();
        base.expect_chain_id().return_const(8453u64);
        base.expect_erc20_balance().never();
        let mut api = MockProtocolApi::new();
        api.expect_quote().never();

        let err = orchestrator(registry(vec![Arc::new(base)]), api, bare_signer())
            .rebalance(rebalance_request((0.4, 0.3)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidWeights { .. }));
    }

    #[tokio::test]
    async fn insufficient_eoa_balance_stops_before_quote() {
        let mut base = MockBalanceReader::new();
        base.expect_chain_id().return_const(8453u64);
        base.expect_erc20_balance()
            .returning(|_, _| Ok(U256::from(999_000_000u64)));
        let mut api = MockProtocolApi::new();
        api.expect_quote().never();

        let err = orchestrator(registry(vec![Arc::new(base)]), api, bare_signer())
            .rebalance(rebalance_request((0.6, 0.4)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::FundingNotFound { chain_id: 8453, .. }));
    }

    #[tokio::test]
    async fn repeated_inputs_are_checked_against_one_balance() {
        let mut base = MockBalanceReader::new();
        base.expect_chain_id().return_const(8453u64);
        base.expect_erc20_balance()
            .times(1)
            .returning(|_, _| Ok(U256::from(1_000_000_000u64)));
        let mut api = MockProtocolApi::new();
        api.expect_quote().never();

        let request: RebalanceRequest = serde_json::from_value(json!({
            "inputs": [
                {"chainId": 8453, "token": "USDC", "amount": "800"},
                {"chainId": 8453, "token": "USDC", "amount": "800"}
            ],
            "targets": [{"chainId": 8453, "token": "WETH", "weight": 1.0}]
        }))
        .unwrap();

        let err = orchestrator(registry(vec![Arc::new(base)]), api, bare_signer())
            .rebalance(request)
            .await
            .unwrap_err();
        match err {
            EngineError::FundingNotFound { chain_id, message } => {
                assert_eq!(chain_id, 8453);
                assert!(message.contains("needs 1600000000"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_symbols_and_chains_are_rejected() {
        let engine = orchestrator(registry(vec![]), MockProtocolApi::new(), bare_signer());

        let mut request = rebalance_request((0.6, 0.4));
        request.targets[0].token = "NOPE".into();
        assert!(matches!(
            engine.rebalance(request).await,
            Err(EngineError::UnknownToken { chain_id: 8453, .. })
        ));

        let mut request = rebalance_request((0.6, 0.4));
        request.targets[1].chain_id = 31337;
        assert!(matches!(
            engine.rebalance(request).await,
            Err(EngineError::UnsupportedChain { .. })
        ));
    }

    #[tokio::test]
    async fn raw_address_input_reads_decimals_once() {
        let custom = Address::repeat_byte(0x77);
        let mut base = MockBalanceReader::new();
        base.expect_chain_id().return_const(8453u64);
        base.expect_erc20_decimals().times(1).returning(|_| Ok(8));
        base.expect_erc20_balance()
            .returning(|_, _| Ok(U256::from(10u64).pow(U256::from(12))));

        let captured = Arc::new(Mutex::new(Vec::new()));
        let engine = orchestrator(
            registry(vec![Arc::new(base)]),
            protocol(captured.clone()),
            signer(),
        );

        let request: RebalanceRequest = serde_json::from_value(json!({
            "inputs": [{"chainId": 8453, "token": format!("{:?}", custom), "amount": "2.5"}],
            "targets": [{"chainId": 8453, "token": "USDC", "weight": 1.0}]
        }))
        .unwrap();

        engine.rebalance(request.clone()).await.unwrap();
        engine.rebalance(request).await.unwrap();

        let requests = captured.lock().unwrap();
        assert_eq!(requests[0]["fundingTokens"][0]["amount"], "250000000");
        assert_eq!(requests[0]["composeFlows"][0]["type"], "/instructions/intent-simple");
    }

    #[tokio::test]
    async fn onchain_quote_fails_closed() {
        let mut base = MockBalanceReader::new();
        base.expect_chain_id().return_const(8453u64);
        base.expect_erc20_balance()
            .returning(|_, _| Ok(U256::from(5_000_000_000u64)));
        let mut optimism = MockBalanceReader::new();
        optimism.expect_chain_id().return_const(10u64);

        let mut api = MockProtocolApi::new();
        api.expect_quote().returning(|_| {
            let mut quote = permit_quote();
            quote.quote_type = QuoteType::Onchain;
            Ok(quote)
        });
        api.expect_execute().never();

        let mut signer = bare_signer();
        signer.expect_backend().return_const("mock");
        signer.expect_supports_onchain_approval().return_const(false);
        signer.expect_sign_typed_data().never();

        let err = orchestrator(
            registry(vec![Arc::new(base), Arc::new(optimism)]),
            api,
            signer,
        )
        .rebalance(rebalance_request((0.6, 0.4)))
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::OnchainApprovalRequired { index: 0 }));
    }
}
