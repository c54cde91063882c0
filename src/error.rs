//! Error types for the intent engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Unsupported chain: {chain}")]
    UnsupportedChain { chain: String },

    #[error("Balance scan failed on chain {chain_id}: {message}")]
    ChainScanFailure { chain_id: u64, message: String },

    #[error("No funding token on chain {chain_id}: {message}")]
    FundingNotFound { chain_id: u64, message: String },

    #[error("Target weights must sum to 1.0 (got {sum:.4})")]
    InvalidWeights { sum: f64 },

    #[error("Missing or invalid parameters: {0}")]
    MissingParameters(String),

    #[error("Unknown token {token} on chain {chain_id}")]
    UnknownToken { chain_id: u64, token: String },

    #[error("Owner authorization required before a quote can be produced ({} pending)", authorizations.len())]
    AuthorizationRequired {
        authorizations: Vec<serde_json::Value>,
    },

    #[error("Quote request failed with status {status}: {body}")]
    QuoteFailed { status: u16, body: String },

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Payload {index} requires an onchain approval transaction the signer cannot submit (unsupported, approval required)")]
    OnchainApprovalRequired { index: usize },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("RPC error on chain {chain_id}: {message}")]
    Rpc { chain_id: u64, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Transport-level failures of idempotent reads are the only retryable errors
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Rpc { .. } | EngineError::Timeout { .. } => true,
            EngineError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map_or(false, |s| s.is_server_error())
            }
            _ => false,
        }
    }

    /// Errors that should abort a whole run rather than a single chain
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ServiceUnavailable(_) | EngineError::Config(_)
        )
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
