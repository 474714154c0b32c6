use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing;

use relay_core::config::ExpoConfig;
use relay_core::types::Notification;
use relay_core::{RelayError, Result};

use crate::{ProviderMessage, ProviderTicket, PushProvider, Receipt};

const PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";
const RECEIPT_URL: &str = "https://exp.host/--/api/v2/push/getReceipts";

/// Expo's hard cap on messages per send request.
const MAX_MESSAGES_PER_REQUEST: usize = 100;
/// Receipt ids per getReceipts request.
const MAX_RECEIPTS_PER_REQUEST: usize = 1000;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Push adapter speaking the Expo HTTP protocol.
pub struct ExpoProvider {
    client: reqwest::Client,
    access_token: Option<String>,
    batch_size: usize,
    default_sound: String,
    default_ttl: u32,
    default_priority: String,
}

#[derive(Debug, Serialize)]
struct ExpoPushMessage<'a> {
    to: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    data: &'a HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<u32>,
    #[serde(rename = "richContent", skip_serializing_if = "Option::is_none")]
    rich_content: Option<RichContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RichContent<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExpoApiError {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExpoPushResponse {
    #[serde(default)]
    data: Vec<ProviderTicket>,
    #[serde(default)]
    errors: Vec<ExpoApiError>,
}

#[derive(Debug, Deserialize)]
struct ExpoReceipt {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<ExpoReceiptDetails>,
}

#[derive(Debug, Deserialize)]
struct ExpoReceiptDetails {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExpoReceiptResponse {
    #[serde(default)]
    data: HashMap<String, ExpoReceipt>,
    #[serde(default)]
    errors: Vec<ExpoApiError>,
}

impl ExpoProvider {
    pub fn new(config: &ExpoConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RelayError::ProviderTransport(format!("build HTTP client: {}", e)))?;

        if config.access_token.is_some() {
            tracing::info!("Expo provider initialized with access token");
        } else {
            tracing::info!("Expo provider initialized without access token");
        }

        Ok(ExpoProvider {
            client,
            access_token: config.access_token.clone(),
            batch_size: config.batch_size.clamp(1, MAX_MESSAGES_PER_REQUEST),
            default_sound: config.default_sound.clone(),
            default_ttl: config.default_ttl,
            default_priority: config.default_priority.clone(),
        })
    }

    fn build_message<'a>(&'a self, token: &'a str, n: &'a Notification) -> ExpoPushMessage<'a> {
        ExpoPushMessage {
            to: token,
            title: &n.title,
            body: &n.body,
            data: &n.data,
            sound: Some(n.sound.as_deref().unwrap_or(&self.default_sound)),
            ttl: Some(n.ttl_seconds.unwrap_or(self.default_ttl)),
            priority: Some(n.priority.as_deref().unwrap_or(&self.default_priority)),
            badge: n.badge,
            rich_content: n.image_url.as_deref().map(|image| RichContent { image }),
        }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let req = req
            .header("Accept", "application/json")
            .header("Accept-Encoding", "gzip, deflate");
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn post_push(&self, payload: serde_json::Value) -> Result<ExpoPushResponse> {
        let response = self
            .authorized(self.client.post(PUSH_URL))
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::ProviderTransport(format!("push request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::ProviderTransport(format!("read push response: {}", e)))?;

        if status != reqwest::StatusCode::OK {
            return Err(RelayError::ProviderTransport(format!(
                "push API returned {}: {}",
                status, body
            )));
        }

        let parsed: ExpoPushResponse = serde_json::from_str(&body)
            .map_err(|e| RelayError::ProviderTransport(format!("parse push response: {}", e)))?;

        if !parsed.errors.is_empty() {
            let summary: Vec<String> = parsed
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect();
            return Err(RelayError::ProviderReject(summary.join("; ")));
        }

        Ok(parsed)
    }

    async fn fetch_receipts_chunk(&self, ids: &[String]) -> Result<HashMap<String, Receipt>> {
        let response = self
            .authorized(self.client.post(RECEIPT_URL))
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await
            .map_err(|e| RelayError::ProviderTransport(format!("receipt request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::ProviderTransport(format!("read receipt response: {}", e)))?;

        if status != reqwest::StatusCode::OK {
            return Err(RelayError::ProviderTransport(format!(
                "receipt API returned {}: {}",
                status, body
            )));
        }

        let parsed: ExpoReceiptResponse = serde_json::from_str(&body)
            .map_err(|e| RelayError::ProviderTransport(format!("parse receipt response: {}", e)))?;

        if !parsed.errors.is_empty() {
            let summary: Vec<String> = parsed
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.code, e.message))
                .collect();
            return Err(RelayError::ProviderReject(summary.join("; ")));
        }

        let mut receipts = HashMap::with_capacity(parsed.data.len());
        for (id, receipt) in parsed.data {
            let device_unregistered = receipt
                .details
                .as_ref()
                .and_then(|d| d.error.as_deref())
                .map(|e| e == "DeviceNotRegistered")
                .unwrap_or(false);
            receipts.insert(
                id,
                Receipt {
                    delivered: receipt.status == "ok",
                    error: if receipt.status == "ok" {
                        None
                    } else {
                        Some(
                            receipt
                                .message
                                .unwrap_or_else(|| "delivery failed".to_string()),
                        )
                    },
                    device_unregistered,
                },
            );
        }
        Ok(receipts)
    }
}

/// Syntactic Expo token check, shared with the dispatcher's pre-flight
/// validation.
pub fn validate_expo_token(token: &str) -> bool {
    token.len() >= 20
        && (token.starts_with("ExponentPushToken[") || token.starts_with("ExpoPushToken["))
}

#[async_trait]
impl PushProvider for ExpoProvider {
    fn name(&self) -> &str {
        "expo"
    }

    fn max_batch(&self) -> usize {
        self.batch_size
    }

    fn validate_token(&self, token: &str) -> bool {
        validate_expo_token(token)
    }

    async fn send(&self, token: &str, notification: &Notification) -> Result<ProviderTicket> {
        // A single message goes out as a bare object.
        let payload = serde_json::to_value(self.build_message(token, notification))
            .map_err(|e| RelayError::ProviderTransport(format!("encode message: {}", e)))?;
        let mut response = self.post_push(payload).await?;

        let ticket = response.data.drain(..).next();
        ticket.ok_or_else(|| RelayError::ProviderTransport("empty push response".to_string()))
    }

    async fn send_batch(&self, messages: &[ProviderMessage]) -> Result<Vec<ProviderTicket>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        if messages.len() > self.max_batch() {
            return Err(RelayError::invalid_argument(format!(
                "batch of {} exceeds cap of {}",
                messages.len(),
                self.max_batch()
            )));
        }

        let payload = if messages.len() == 1 {
            serde_json::to_value(self.build_message(&messages[0].token, &messages[0].notification))
        } else {
            let wire: Vec<ExpoPushMessage> = messages
                .iter()
                .map(|m| self.build_message(&m.token, &m.notification))
                .collect();
            serde_json::to_value(wire)
        }
        .map_err(|e| RelayError::ProviderTransport(format!("encode batch: {}", e)))?;

        let response = self.post_push(payload).await?;

        if response.data.len() != messages.len() {
            tracing::warn!(
                "push response carried {} tickets for {} messages",
                response.data.len(),
                messages.len()
            );
        }

        Ok(response.data)
    }

    async fn fetch_receipts(&self, receipt_ids: &[String]) -> Result<HashMap<String, Receipt>> {
        let mut all = HashMap::with_capacity(receipt_ids.len());
        for chunk in receipt_ids.chunks(MAX_RECEIPTS_PER_REQUEST) {
            let receipts = self.fetch_receipts_chunk(chunk).await?;
            all.extend(receipts);
        }
        Ok(all)
    }

    async fn health(&self) -> Result<()> {
        // Any HTTP response, including an API error, proves connectivity;
        // only a transport failure is unhealthy.
        let result = self
            .authorized(self.client.post(PUSH_URL))
            .timeout(HEALTH_CHECK_TIMEOUT)
            .json(&serde_json::json!({
                "to": "ExponentPushToken[health-check]",
                "body": "health check",
            }))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(RelayError::NotConnected(format!("expo unreachable: {}", e))),
        }
    }
}
