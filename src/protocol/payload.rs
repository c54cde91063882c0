//! Quote payload signing
//!
//! The quote type picks the signing branch. A quote comes back either fully
//! signed or not at all: any failure discards every signature produced so far.

use super::signer::Signer;
use super::types::{QuoteResponse, QuoteType};
use crate::error::{EngineError, EngineResult};

use std::sync::Arc;
use tracing::{debug, info};

pub struct PayloadSigner {
    signer: Arc<dyn Signer>,
}

impl PayloadSigner {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }

    pub fn address(&self) -> ethers::types::Address {
        self.signer.address()
    }

    /// Return a copy of `quote` with every payload signed, in order
    pub async fn sign_quote(&self, quote: &QuoteResponse) -> EngineResult<QuoteResponse> {
        if quote.payload_to_sign.is_empty() {
            return Err(EngineError::SigningFailed(
                "quote contains no payloads to sign".to_string(),
            ));
        }

        let mut signed = quote.clone();
        for (index, payload) in signed.payload_to_sign.iter_mut().enumerate() {
            let signature = match quote.quote_type {
                QuoteType::Permit | QuoteType::Simple => {
                    self.signer
                        .sign_typed_data(&payload.signable_payload)
                        .await?
                }
                QuoteType::Onchain => {
                    if !self.signer.supports_onchain_approval() {
                        return Err(EngineError::OnchainApprovalRequired { index });
                    }
                    self.signer.submit_approval(payload).await?
                }
            };

            if signature.is_empty() {
                return Err(EngineError::SigningFailed(format!(
                    "{} signer returned an empty signature for payload {}",
                    self.signer.backend(),
                    index
                )));
            }

            debug!("Signed payload {} ({:?})", index, quote.quote_type);
            payload.signature = Some(signature);
        }

        info!(
            "Signed {} {:?} payload(s) with {} signer",
            signed.payload_to_sign.len(),
            quote.quote_type,
            self.signer.backend()
        );
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::signer::MockSigner;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quote(quote_type: &str, payloads: usize) -> QuoteResponse {
        let payload = json!({
            "signablePayload": {"domain": {}, "types": {}, "primaryType": "Permit", "message": {}}
        });
        serde_json::from_value(json!({
            "quoteType": quote_type,
            "ownerAddress": "0x1111111111111111111111111111111111111111",
            "payloadToSign": vec![payload; payloads],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn permit_and_simple_sign_every_payload_in_order() {
        for quote_type in ["permit", "simple"] {
            let counter = Arc::new(AtomicUsize::new(0));
            let seen = counter.clone();
            let mut signer = MockSigner::new();
            signer.expect_backend().return_const("mock");
            signer.expect_sign_typed_data().times(3).returning(move |_| {
                Ok(format!("0xsig{}", seen.fetch_add(1, Ordering::SeqCst)))
            });

            let signed = PayloadSigner::new(Arc::new(signer))
                .sign_quote(&quote(quote_type, 3))
                .await
                .unwrap();

            let sigs: Vec<_> = signed
                .payload_to_sign
                .iter()
                .map(|p| p.signature.clone().unwrap())
                .collect();
            assert_eq!(sigs, vec!["0xsig0", "0xsig1", "0xsig2"]);
            assert!(signed.is_fully_signed());
        }
    }

    #[tokio::test]
    async fn onchain_fails_closed_without_typed_data_signature() {
        let mut signer = MockSigner::new();
        signer.expect_backend().return_const("mock");
        signer.expect_supports_onchain_approval().return_const(false);
        signer.expect_sign_typed_data().never();
        signer.expect_submit_approval().never();

        let err = PayloadSigner::new(Arc::new(signer))
            .sign_quote(&quote("onchain", 1))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::OnchainApprovalRequired { index: 0 }));
        assert!(err.to_string().contains("approval required"));
    }

    #[tokio::test]
    async fn onchain_uses_inline_approval_when_supported() {
        let mut signer = MockSigner::new();
        signer.expect_backend().return_const("mock");
        signer.expect_supports_onchain_approval().return_const(true);
        signer.expect_sign_typed_data().never();
        signer
            .expect_submit_approval()
            .times(1)
            .returning(|_| Ok("0xapprovaltx".to_string()));

        let signed = PayloadSigner::new(Arc::new(signer))
            .sign_quote(&quote("onchain", 1))
            .await
            .unwrap();
        assert_eq!(
            signed.payload_to_sign[0].signature.as_deref(),
            Some("0xapprovaltx")
        );
    }

    #[tokio::test]
    async fn later_failure_discards_earlier_signatures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut signer = MockSigner::new();
        signer.expect_backend().return_const("mock");
        signer.expect_sign_typed_data().returning(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 1 {
                Err(EngineError::SigningFailed("user rejected".into()))
            } else {
                Ok("0xok".into())
            }
        });

        let original = quote("permit", 3);
        let err = PayloadSigner::new(Arc::new(signer))
            .sign_quote(&original)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::SigningFailed(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(original.payload_to_sign.iter().all(|p| p.signature.is_none()));
    }

    #[tokio::test]
    async fn empty_signature_is_rejected() {
        let mut signer = MockSigner::new();
        signer.expect_backend().return_const("mock");
        signer
            .expect_sign_typed_data()
            .returning(|_| Ok(String::new()));

        let err = PayloadSigner::new(Arc::new(signer))
            .sign_quote(&quote("simple", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SigningFailed(_)));
    }
}
