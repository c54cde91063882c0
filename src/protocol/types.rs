//! Wire types for the execution protocol's quote, execute and explorer endpoints

use crate::intent::ComposeFlow;
use crate::scan::FundingToken;

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// U256 as a base-10 string; accepts `0x` hex on input
pub mod decimal_u256 {
    use ethers::types::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(d)?;
        let parsed = match raw.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).ok(),
            None => U256::from_dec_str(&raw).ok(),
        };
        parsed.ok_or_else(|| de::Error::custom(format!("invalid uint256: {}", raw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteMode {
    #[serde(rename = "eoa")]
    Eoa,
    #[serde(rename = "smart-account")]
    SmartAccount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeToken {
    pub address: Address,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub mode: QuoteMode,
    pub owner_address: Address,
    /// Rebalance instructions precede the withdrawals that sweep their output
    pub compose_flows: Vec<ComposeFlow>,
    pub funding_tokens: Vec<FundingToken>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_token: Option<FeeToken>,
}

/// The signing scheme a quote demands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteType {
    Permit,
    Simple,
    Onchain,
}

/// EIP-712 typed data as returned by the protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignablePayload {
    pub domain: Value,
    pub types: Value,
    pub primary_type: String,
    pub message: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadToSign {
    pub signable_payload: SignablePayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub quote_type: QuoteType,
    /// Executed in order by the protocol
    pub payload_to_sign: Vec<PayloadToSign>,
    pub owner_address: Address,
    /// Every other field, echoed back verbatim on execute
    #[serde(flatten)]
    pub returned_data: Map<String, Value>,
}

impl QuoteResponse {
    pub fn is_fully_signed(&self) -> bool {
        self.payload_to_sign.iter().all(|p| p.signature.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(default)]
    pub supertx_hash: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupertxStatus {
    pub status: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

const SUCCESS_STATUSES: &[&str] = &["SUCCESS", "MINED_SUCCESS", "COMPLETED"];
const FAILURE_STATUSES: &[&str] = &["FAILED", "MINED_FAIL", "REVERTED", "EXPIRED"];

impl SupertxStatus {
    pub fn is_success(&self) -> bool {
        SUCCESS_STATUSES.contains(&self.status.to_ascii_uppercase().as_str())
    }

    pub fn is_failure(&self) -> bool {
        FAILURE_STATUSES.contains(&self.status.to_ascii_uppercase().as_str())
    }

    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.is_failure()
    }
}

/// Body of a 412 quote response
#[derive(Debug, Deserialize)]
pub(crate) struct AuthorizationRequiredBody {
    #[serde(default)]
    pub authorizations: Vec<Value>,
}
