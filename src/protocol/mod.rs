//! Execution protocol access: quote, sign, execute, track
//!
//! A request moves through
//! `Requested -> Quoted -> Signed -> Submitted -> {Succeeded | Failed}`.
//! Quote and execute live in `client`, signing in `payload` and `signer`,
//! status lookups in `status`.

pub mod client;
pub mod payload;
pub mod signer;
pub mod status;
pub mod types;

pub use client::{HttpProtocolClient, ProtocolApi};
pub use payload::PayloadSigner;
pub use signer::{select_signer, CustodialSigner, LocalWalletSigner, Signer};
pub use status::StatusTracker;
pub use types::{
    FeeToken, QuoteMode, QuoteRequest, QuoteResponse, QuoteType, SignablePayload, SupertxStatus,
};
