// libs/conversation-cell/src/services/sender.rs
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::models::{Button, OutboundKind, OutboundMessage, SendResult};

/// Outbound chat transport. Failures are reported in `SendResult`, never as
/// errors, so a failed send cannot undo work already committed in the turn.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, to: &str, content: &str) -> SendResult;

    async fn send_buttons(&self, to: &str, content: &str, buttons: &[Button]) -> SendResult;

    async fn send_list(&self, to: &str, content: &str, options: &[Button]) -> SendResult;

    async fn send(&self, message: &OutboundMessage) -> SendResult {
        match &message.kind {
            OutboundKind::Text => self.send_text(&message.to, &message.content).await,
            OutboundKind::Buttons(buttons) => self.send_buttons(&message.to, &message.content, buttons).await,
            OutboundKind::List(options) => self.send_list(&message.to, &message.content, options).await,
        }
    }
}

// ==============================================================================
// HTTP GATEWAY
// ==============================================================================

/// Posts provider-neutral JSON to a message gateway that owns the provider
/// wire format.
pub struct HttpMessageSender {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpMessageSender {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.outbound_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.message_gateway_url.trim_end_matches('/').to_string(),
            token: config.message_gateway_token.clone(),
        })
    }

    async fn post(&self, path: &str, body: Value) -> SendResult {
        let url = format!("{}{}", self.base_url, path);
        debug!("Sending outbound message via {}", url);

        let response = match self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Message gateway request failed: {}", e);
                return SendResult::failed(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Message gateway error ({}): {}", status, text);
            return SendResult::failed(format!("Gateway returned {}: {}", status, text));
        }

        match response.json::<Value>().await {
            Ok(payload) => SendResult::delivered(
                payload
                    .get("message_id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            ),
            Err(_) => SendResult::delivered(None),
        }
    }
}

#[async_trait]
impl MessageSender for HttpMessageSender {
    async fn send_text(&self, to: &str, content: &str) -> SendResult {
        self.post("/messages/text", json!({ "to": to, "content": content })).await
    }

    async fn send_buttons(&self, to: &str, content: &str, buttons: &[Button]) -> SendResult {
        self.post(
            "/messages/buttons",
            json!({ "to": to, "content": content, "buttons": buttons }),
        )
        .await
    }

    async fn send_list(&self, to: &str, content: &str, options: &[Button]) -> SendResult {
        self.post(
            "/messages/list",
            json!({ "to": to, "content": content, "options": options }),
        )
        .await
    }
}

// ==============================================================================
// RECORDING
// ==============================================================================

/// Keeps every outbound message in memory. Used when no gateway is
/// configured and in tests.
#[derive(Clone, Default)]
pub struct RecordingMessageSender {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    fail: bool,
}

impl RecordingMessageSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records nothing and reports every send as failed.
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    async fn record(&self, message: OutboundMessage) -> SendResult {
        if self.fail {
            return SendResult::failed("recording sender configured to fail");
        }
        self.sent.lock().await.push(message);
        SendResult::delivered(None)
    }
}

#[async_trait]
impl MessageSender for RecordingMessageSender {
    async fn send_text(&self, to: &str, content: &str) -> SendResult {
        self.record(OutboundMessage::text(to, content)).await
    }

    async fn send_buttons(&self, to: &str, content: &str, buttons: &[Button]) -> SendResult {
        self.record(OutboundMessage {
            to: to.to_string(),
            content: content.to_string(),
            kind: OutboundKind::Buttons(buttons.to_vec()),
        })
        .await
    }

    async fn send_list(&self, to: &str, content: &str, options: &[Button]) -> SendResult {
        self.record(OutboundMessage {
            to: to.to_string(),
            content: content.to_string(),
            kind: OutboundKind::List(options.to_vec()),
        })
        .await
    }
}
