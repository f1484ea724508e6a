//! Deferred-interaction webhook edits.
//!
//! Replayed slash tasks answer through the interaction webhook REST endpoint
//! directly; the gateway session that deferred them died with the previous
//! process. Content is text-only, so replayed replies always link rather
//! than attach.

use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use clyppy_models::limits::API_TIMEOUT;

use crate::error::{EmbedError, EmbedResult};

const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// PATCHes `@original` deferred responses.
#[derive(Debug, Clone)]
pub struct WebhookEditor {
    http: Client,
    api_base: String,
    /// When set, edits are logged and dropped.
    test_sink: bool,
}

impl WebhookEditor {
    pub fn new(test_sink: bool) -> EmbedResult<Self> {
        let http = Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| EmbedError::config_error(format!("webhook client: {e}")))?;
        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            test_sink,
        })
    }

    /// Override the API base (tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        let base: String = base.into();
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Replace the content of the original deferred response.
    pub async fn edit_original(
        &self,
        application_id: u64,
        interaction_token: &str,
        content: &str,
    ) -> EmbedResult<()> {
        if self.test_sink {
            info!(application_id, "test sink: webhook edit dropped");
            return Ok(());
        }

        let url = format!(
            "{}/webhooks/{application_id}/{interaction_token}/messages/@original",
            self.api_base
        );
        let response = self
            .http
            .patch(&url)
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(|e| EmbedError::gateway(format!("webhook edit failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EmbedError::gateway(format!(
                "webhook edit returned {}",
                response.status()
            )));
        }
        debug!(application_id, "edited deferred response");
        Ok(())
    }
}
