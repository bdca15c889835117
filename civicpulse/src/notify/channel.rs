//! Outbound messaging channel abstraction
//!
//! The trait is the seam between the dispatcher and whatever provider
//! carries the message. Channel-specific address framing (the `whatsapp:`
//! prefix) is applied here at the transport boundary only; canonical
//! numbers are stored unframed.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bound on a single provider call so a slow provider cannot stall a sweep
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider rejected the message: {0}")]
    Rejected(String),
}

/// One external messaging channel
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Channel name recorded in the audit log, e.g. "whatsapp"
    fn name(&self) -> &'static str;

    /// Deliver `body` from `from` to `to` (canonical international numbers).
    ///
    /// Returns the provider-assigned message id.
    async fn send(&self, from: &str, to: &str, body: &str) -> Result<String, ChannelError>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: String,
    to: String,
    body: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    message_id: String,
}

/// WhatsApp delivery over the provider's HTTP API
pub struct HttpMessageChannel {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpMessageChannel {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl MessageChannel for HttpMessageChannel {
    fn name(&self) -> &'static str {
        "whatsapp"
    }

    async fn send(&self, from: &str, to: &str, body: &str) -> Result<String, ChannelError> {
        let request = SendRequest {
            from: format!("whatsapp:{from}"),
            to: format!("whatsapp:{to}"),
            body,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected(format!("{status}: {detail}")));
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        debug!(message_id = %parsed.message_id, "provider accepted message");
        Ok(parsed.message_id)
    }
}
