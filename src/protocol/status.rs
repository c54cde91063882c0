//! Supertransaction status lookups

use super::client::ProtocolApi;
use super::types::SupertxStatus;
use crate::error::{EngineError, EngineResult};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

pub struct StatusTracker {
    api: Arc<dyn ProtocolApi>,
}

impl StatusTracker {
    pub fn new(api: Arc<dyn ProtocolApi>) -> Self {
        Self { api }
    }

    pub async fn status(&self, hash: &str) -> EngineResult<SupertxStatus> {
        self.api.status(hash).await
    }

    pub fn explorer_url(&self, hash: &str) -> String {
        self.api.explorer_url(hash)
    }

    /// Poll until the supertransaction reaches a terminal status
    pub async fn wait_for_final(
        &self,
        hash: &str,
        interval: Duration,
        limit: Duration,
    ) -> EngineResult<SupertxStatus> {
        let deadline = Instant::now() + limit;
        loop {
            let status = self.api.status(hash).await?;
            if status.is_terminal() {
                return Ok(status);
            }
            debug!("Supertx {} still {}", hash, status.status);

            if Instant::now() + interval > deadline {
                return Err(EngineError::Timeout {
                    operation: format!("supertransaction {} to finalize", hash),
                });
            }
            sleep(interval).await;
        }
    }
}
