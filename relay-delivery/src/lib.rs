pub mod dispatcher;
pub mod expo;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use relay_core::types::Notification;
use relay_core::Result;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use expo::ExpoProvider;

/// One push message addressed to a single device token. Batch sends carry a
/// slice of these; the dispatcher builds one per `(recipient, token)`.
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    pub token: String,
    pub notification: Notification,
}

/// Per-message outcome of a gateway send request.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTicket {
    pub status: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ProviderTicket {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Asynchronous delivery status fetched from the gateway after a send.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub delivered: bool,
    pub error: Option<String>,
    /// The gateway reports the device token as gone. Surfaced to the caller
    /// so an operator may prune the binding; never acted on automatically.
    pub device_unregistered: bool,
}

/// A mobile-push backend. Adapters are stateless apart from an HTTP client
/// and safe to share across tasks.
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Stable identifier, also the platform key in the token store.
    fn name(&self) -> &str;

    /// Per-request message cap; callers above it must chunk.
    fn max_batch(&self) -> usize;

    /// Purely syntactic check, no network.
    fn validate_token(&self, token: &str) -> bool;

    async fn send(&self, token: &str, notification: &Notification) -> Result<ProviderTicket>;

    /// One network request for the whole slice; `messages.len()` must not
    /// exceed `max_batch()`.
    async fn send_batch(&self, messages: &[ProviderMessage]) -> Result<Vec<ProviderTicket>>;

    async fn fetch_receipts(&self, receipt_ids: &[String]) -> Result<HashMap<String, Receipt>>;

    /// Best-effort connectivity probe.
    async fn health(&self) -> Result<()>;
}
