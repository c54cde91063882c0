//! Signing backends
//!
//! The engine only depends on the [`Signer`] capability. Two backends exist:
//! a custodial HTTP signer and a local ethers wallet. When both are
//! configured the custodial signer wins so key material never reaches the
//! local signing path.

use super::types::{PayloadToSign, SignablePayload};
use crate::config::SignerConfig;
use crate::error::{EngineError, EngineResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer as _};
use ethers::types::transaction::eip712::TypedData;
use ethers::types::Address;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// EIP-712 signature over `{domain, types, primaryType, message}`
    async fn sign_typed_data(&self, payload: &SignablePayload) -> EngineResult<String>;

    /// Whether the backend can send an approval transaction inline
    fn supports_onchain_approval(&self) -> bool {
        false
    }

    /// Send the approval transaction an onchain quote demands and return
    /// the value to place in the payload's signature slot
    async fn submit_approval(&self, _payload: &PayloadToSign) -> EngineResult<String> {
        Err(EngineError::SigningFailed(format!(
            "{} signer cannot submit approval transactions",
            self.backend()
        )))
    }
}

fn typed_data(payload: &SignablePayload) -> EngineResult<TypedData> {
    let raw = json!({
        "domain": payload.domain,
        "types": payload.types,
        "primaryType": payload.primary_type,
        "message": payload.message,
    });
    serde_json::from_value(raw)
        .map_err(|e| EngineError::SigningFailed(format!("malformed typed data: {}", e)))
}

/// Signs with a private key held in process memory
pub struct LocalWalletSigner {
    wallet: LocalWallet,
}

impl LocalWalletSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    /// Load the key from the named environment variable
    pub fn from_env(var: &str) -> EngineResult<Self> {
        let key = std::env::var(var).map_err(|_| {
            EngineError::ServiceUnavailable(format!("signer key variable {} is not set", var))
        })?;
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| EngineError::Config(format!("Invalid private key in {}: {}", var, e)))?;
        Ok(Self::new(wallet))
    }
}

#[async_trait]
impl Signer for LocalWalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn backend(&self) -> &'static str {
        "local-wallet"
    }

    async fn sign_typed_data(&self, payload: &SignablePayload) -> EngineResult<String> {
        let typed = typed_data(payload)?;
        let signature = self
            .wallet
            .sign_typed_data(&typed)
            .await
            .map_err(|e| EngineError::SigningFailed(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }
}

#[derive(Deserialize)]
struct CustodialSignature {
    signature: String,
}

/// Delegates signing to a custodial service over HTTP
pub struct CustodialSigner {
    client: Client,
    url: String,
    api_key: Option<String>,
    address: Address,
}

impl CustodialSigner {
    pub fn new(
        url: &str,
        api_key: Option<String>,
        address: Address,
        timeout: Duration,
    ) -> EngineResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            address,
        })
    }
}

#[async_trait]
impl Signer for CustodialSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn backend(&self) -> &'static str {
        "custodial"
    }

    async fn sign_typed_data(&self, payload: &SignablePayload) -> EngineResult<String> {
        let mut req = self
            .client
            .post(format!("{}/sign-typed-data", self.url))
            .json(&json!({ "address": self.address, "typedData": payload }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| EngineError::SigningFailed(format!("custodian unreachable: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::SigningFailed(format!(
                "custodian rejected signature request ({}): {}",
                status, body
            )));
        }

        let signed: CustodialSignature = resp
            .json()
            .await
            .map_err(|e| EngineError::SigningFailed(format!("unreadable custodian reply: {}", e)))?;
        debug!("Custodian signed {} payload", payload.primary_type);
        Ok(signed.signature)
    }
}

/// Pick the signing backend, preferring the custodian
pub fn select_signer(
    config: &SignerConfig,
    owner: Address,
    timeout: Duration,
) -> EngineResult<Arc<dyn Signer>> {
    if let Some(url) = &config.custodial_url {
        info!("Using custodial signer at {}", url);
        return Ok(Arc::new(CustodialSigner::new(
            url,
            config.custodial_api_key.clone(),
            owner,
            timeout,
        )?));
    }

    if let Some(var) = &config.private_key_env {
        let signer = LocalWalletSigner::from_env(var)?;
        if signer.address() != owner {
            return Err(EngineError::Config(format!(
                "signer address {:?} does not match owner {:?}",
                signer.address(),
                owner
            )));
        }
        info!("Using local wallet signer {:?}", signer.address());
        return Ok(Arc::new(signer));
    }

    Err(EngineError::ServiceUnavailable(
        "no signer configured: set signer.custodial_url or signer.private_key_env".to_string(),
    ))
}
