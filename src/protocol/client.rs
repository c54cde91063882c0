//! HTTP client for the execution protocol
//!
//! Quote and execute are single-shot: a failed call is reported, never
//! replayed. Only the explorer status read is retried.

use super::types::{
    AuthorizationRequiredBody, ExecuteResponse, QuoteRequest, QuoteResponse, SupertxStatus,
};
use crate::config::ProtocolConfig;
use crate::error::{EngineError, EngineResult};
use crate::retry::RetryPolicy;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Quote, execute and status calls against the protocol
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProtocolApi: Send + Sync {
    /// Request a quote; a 412 surfaces as [`EngineError::AuthorizationRequired`]
    async fn quote(&self, request: &QuoteRequest) -> EngineResult<QuoteResponse>;

    /// Submit a fully signed quote, returning the supertransaction hash
    async fn execute(&self, signed: &QuoteResponse) -> EngineResult<String>;

    async fn status(&self, hash: &str) -> EngineResult<SupertxStatus>;

    fn explorer_url(&self, hash: &str) -> String;
}

pub struct HttpProtocolClient {
    client: Client,
    api_url: String,
    explorer_url: String,
    api_key: Option<String>,
    read_timeout: Duration,
    submit_timeout: Duration,
    retry: RetryPolicy,
}

impl HttpProtocolClient {
    pub fn new(
        config: &ProtocolConfig,
        read_timeout: Duration,
        submit_timeout: Duration,
        retry: RetryPolicy,
    ) -> EngineResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("intent-engine/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            explorer_url: config.explorer_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            read_timeout,
            submit_timeout,
            retry,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}{}", self.api_url, path))
            .timeout(self.submit_timeout);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }
        req
    }

    async fn fetch_status(&self, hash: &str) -> EngineResult<SupertxStatus> {
        let mut req = self
            .client
            .get(format!("{}/v1/explorer/{}", self.api_url, hash))
            .timeout(self.read_timeout);
        if let Some(key) = &self.api_key {
            req = req.header("x-api-key", key);
        }

        let resp = req.send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ProtocolApi for HttpProtocolClient {
    async fn quote(&self, request: &QuoteRequest) -> EngineResult<QuoteResponse> {
        debug!(
            "Requesting quote: {} flows, {} funding tokens",
            request.compose_flows.len(),
            request.funding_tokens.len()
        );
        let started = Instant::now();
        let resp = self.post("/v1/quote").json(request).send().await;
        crate::metrics::record_protocol_latency("quote", started.elapsed().as_secs_f64());

        let resp = resp.map_err(|e| {
            crate::metrics::record_protocol_request("quote", "transport_error");
            EngineError::Http(e)
        })?;
        let status = resp.status();
        let body = resp.text().await?;

        let result = interpret_quote(status, &body);
        crate::metrics::record_protocol_request(
            "quote",
            match &result {
                Ok(_) => "ok",
                Err(EngineError::AuthorizationRequired { .. }) => "authorization_required",
                Err(_) => "error",
            },
        );

        if let Ok(quote) = &result {
            info!(
                "Quote received: {:?} with {} payloads",
                quote.quote_type,
                quote.payload_to_sign.len()
            );
        }
        result
    }

    async fn execute(&self, signed: &QuoteResponse) -> EngineResult<String> {
        if !signed.is_fully_signed() {
            return Err(EngineError::SigningFailed(
                "refusing to submit a partially signed payload set".to_string(),
            ));
        }

        let started = Instant::now();
        let resp = self.post("/v1/execute").json(signed).send().await;
        crate::metrics::record_protocol_latency("execute", started.elapsed().as_secs_f64());

        let resp = resp.map_err(|e| {
            crate::metrics::record_protocol_request("execute", "transport_error");
            EngineError::ExecutionFailed(format!("execute request failed: {}", e))
        })?;
        let status = resp.status();
        let body = resp.text().await?;

        let result = interpret_execute(status, &body);
        crate::metrics::record_protocol_request(
            "execute",
            if result.is_ok() { "ok" } else { "error" },
        );
        result
    }

    async fn status(&self, hash: &str) -> EngineResult<SupertxStatus> {
        self.retry
            .run("supertx status", |_| self.fetch_status(hash))
            .await
    }

    fn explorer_url(&self, hash: &str) -> String {
        format!("{}/details/{}", self.explorer_url, hash)
    }
}

/// Map a quote response to a quote or the matching error
pub(crate) fn interpret_quote(status: StatusCode, body: &str) -> EngineResult<QuoteResponse> {
    if status == StatusCode::PRECONDITION_FAILED {
        let parsed: AuthorizationRequiredBody =
            serde_json::from_str(body).unwrap_or(AuthorizationRequiredBody {
                authorizations: Vec::new(),
            });
        warn!(
            "Quote requires {} owner authorization(s)",
            parsed.authorizations.len()
        );
        return Err(EngineError::AuthorizationRequired {
            authorizations: parsed.authorizations,
        });
    }

    if !status.is_success() {
        return Err(EngineError::QuoteFailed {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    serde_json::from_str(body).map_err(|e| EngineError::QuoteFailed {
        status: status.as_u16(),
        body: format!("unreadable quote ({}): {}", e, body),
    })
}

/// Map an execute response to the supertransaction hash or the matching error
pub(crate) fn interpret_execute(status: StatusCode, body: &str) -> EngineResult<String> {
    if !status.is_success() {
        return Err(EngineError::ExecutionFailed(format!(
            "execute returned {}: {}",
            status, body
        )));
    }

    let parsed: ExecuteResponse = serde_json::from_str(body).map_err(|e| {
        EngineError::ExecutionFailed(format!("unreadable execute response ({}): {}", e, body))
    })?;

    match (parsed.success, parsed.supertx_hash) {
        (true, Some(hash)) if !hash.is_empty() => Ok(hash),
        (true, _) => Err(EngineError::ExecutionFailed(
            "protocol reported success without a supertransaction hash".to_string(),
        )),
        (false, _) => Err(EngineError::ExecutionFailed(
            parsed
                .error
                .unwrap_or_else(|| "protocol reported failure without detail".to_string()),
        )),
    }
}
