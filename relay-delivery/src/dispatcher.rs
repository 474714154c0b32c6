use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing;

use relay_core::config::ExpoConfig;
use relay_core::types::{now_unix, BatchResult, Notification, PushResult};
use relay_core::{RelayError, Result, Store};

use crate::{ProviderMessage, PushProvider, Receipt};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_concurrency: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_concurrency: 6,
        }
    }
}

impl From<&ExpoConfig> for DispatcherConfig {
    fn from(config: &ExpoConfig) -> Self {
        DispatcherConfig {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            max_concurrency: config.max_concurrency.max(1),
        }
    }
}

/// One `(recipient, platform, token)` delivery candidate.
#[derive(Debug, Clone)]
struct Attempt {
    meta_id: String,
    platform: String,
    token: String,
}

struct RegisteredProvider {
    provider: Arc<dyn PushProvider>,
    semaphore: Arc<Semaphore>,
}

/// Bounded-concurrency fan-out over the registered providers.
///
/// Per call, each `(meta_id, platform)` pair is attempted at most once;
/// batches retry only on transport errors, per-message API rejections are
/// terminal. Results stream back over a channel and are folded into one
/// `BatchResult`.
pub struct Dispatcher {
    store: Arc<Store>,
    providers: HashMap<String, RegisteredProvider>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, config: DispatcherConfig) -> Self {
        Dispatcher {
            store,
            providers: HashMap::new(),
            config,
        }
    }

    pub fn register_provider(&mut self, provider: Arc<dyn PushProvider>) {
        let name = provider.name().to_string();
        tracing::info!("registered push provider: {}", name);
        self.providers.insert(
            name,
            RegisteredProvider {
                provider,
                semaphore: Arc::new(Semaphore::new(self.config.max_concurrency)),
            },
        );
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// Resolves each recipient's devices and fans the notification out.
    /// Unknown platforms are skipped; invalid tokens fail without a network
    /// call. Cancelling `cancel` lets in-flight requests finish and marks
    /// queued batches as cancelled.
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        recipients: &[String],
        notification: &Notification,
    ) -> Result<BatchResult> {
        let start = Instant::now();
        let mut batch = BatchResult::default();

        if recipients.is_empty() {
            return Ok(batch.finish(0, start.elapsed()));
        }

        let all_tokens = self.store.get_all_user_tokens(recipients).await?;

        // Flatten to unique (meta_id, platform) attempts, dropping platforms
        // with no registered provider.
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut invalid: Vec<Attempt> = Vec::new();
        let mut per_provider: HashMap<String, Vec<Attempt>> = HashMap::new();

        for (meta_id, user_tokens) in &all_tokens {
            for (platform, token) in &user_tokens.tokens {
                let registered = match self.providers.get(platform) {
                    Some(r) => r,
                    None => continue,
                };
                if !seen.insert((meta_id.clone(), platform.clone())) {
                    continue;
                }
                let attempt = Attempt {
                    meta_id: meta_id.clone(),
                    platform: platform.clone(),
                    token: token.clone(),
                };
                if registered.provider.validate_token(token) {
                    per_provider.entry(platform.clone()).or_default().push(attempt);
                } else {
                    invalid.push(attempt);
                }
            }
        }

        for attempt in invalid {
            batch.results.push(failed_result(
                &attempt,
                &RelayError::InvalidToken(attempt.token.clone()),
                Duration::ZERO,
            ));
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PushResult>>();
        let mut handles = Vec::new();

        for (platform, attempts) in per_provider {
            let registered = &self.providers[&platform];
            let max_batch = registered.provider.max_batch().max(1);

            for chunk in attempts.chunks(max_batch) {
                let provider = Arc::clone(&registered.provider);
                let semaphore = Arc::clone(&registered.semaphore);
                let cancel = cancel.clone();
                let config = self.config.clone();
                let notification = notification.clone();
                let chunk: Vec<Attempt> = chunk.to_vec();
                let tx = tx.clone();

                handles.push(tokio::spawn(async move {
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };
                    let results =
                        send_batch_with_retry(&*provider, &cancel, &config, &chunk, &notification)
                            .await;
                    let _ = tx.send(results);
                }));
            }
        }
        drop(tx);

        while let Some(results) = rx.recv().await {
            batch.results.extend(results);
        }
        for handle in handles {
            let _ = handle.await;
        }

        let unique_users: HashSet<&String> = recipients.iter().collect();
        Ok(batch.finish(unique_users.len(), start.elapsed()))
    }

    /// Receipt lookup pass-through for the management surface.
    pub async fn check_receipts(
        &self,
        platform: &str,
        receipt_ids: &[String],
    ) -> Result<HashMap<String, Receipt>> {
        let registered = self.providers.get(platform).ok_or_else(|| {
            RelayError::invalid_argument(format!("no provider for platform {}", platform))
        })?;
        registered.provider.fetch_receipts(receipt_ids).await
    }

    pub async fn health(&self) -> HashMap<String, Option<String>> {
        let mut results = HashMap::with_capacity(self.providers.len());
        for (name, registered) in &self.providers {
            let status = registered.provider.health().await.err().map(|e| e.to_string());
            results.insert(name.clone(), status);
        }
        results
    }
}

/// Sends one chunk, retrying transport failures with exponential backoff.
async fn send_batch_with_retry(
    provider: &dyn PushProvider,
    cancel: &CancellationToken,
    config: &DispatcherConfig,
    attempts: &[Attempt],
    notification: &Notification,
) -> Vec<PushResult> {
    let start = Instant::now();

    let messages: Vec<ProviderMessage> = attempts
        .iter()
        .map(|a| ProviderMessage {
            token: a.token.clone(),
            notification: notification.clone(),
        })
        .collect();

    let mut retry = 0u32;
    loop {
        if cancel.is_cancelled() {
            return cancelled_results(attempts, start.elapsed());
        }

        match provider.send_batch(&messages).await {
            Ok(tickets) => {
                return attempts
                    .iter()
                    .enumerate()
                    .map(|(i, attempt)| match tickets.get(i) {
                        Some(ticket) if ticket.is_ok() => PushResult {
                            meta_id: attempt.meta_id.clone(),
                            platform: attempt.platform.clone(),
                            token: attempt.token.clone(),
                            success: true,
                            receipt_id: ticket.id.clone(),
                            error: None,
                            duration: start.elapsed(),
                            timestamp: now_unix(),
                        },
                        Some(ticket) => failed_result(
                            attempt,
                            &RelayError::ProviderReject(
                                ticket
                                    .message
                                    .clone()
                                    .unwrap_or_else(|| "push rejected".to_string()),
                            ),
                            start.elapsed(),
                        ),
                        None => failed_result(
                            attempt,
                            &RelayError::ProviderTransport("missing ticket".to_string()),
                            start.elapsed(),
                        ),
                    })
                    .collect();
            }
            Err(err) if err.is_retryable() && retry < config.max_retries => {
                retry += 1;
                let delay = backoff_delay(config.base_delay, retry);
                tracing::warn!(
                    "provider {} batch failed ({}), retry {}/{} in {:?}",
                    provider.name(),
                    err,
                    retry,
                    config.max_retries,
                    delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return cancelled_results(attempts, start.elapsed());
                    }
                }
            }
            Err(err) => {
                tracing::error!("provider {} batch failed: {}", provider.name(), err);
                return attempts
                    .iter()
                    .map(|a| failed_result(a, &err, start.elapsed()))
                    .collect();
            }
        }
    }
}

/// `delay_n = base · 2^(n-1) · (1 + jitter)`, jitter drawn from [0, 0.1].
fn backoff_delay(base: Duration, retry: u32) -> Duration {
    let exp = base.as_secs_f64() * 2f64.powi(retry as i32 - 1);
    let jitter: f64 = rand::thread_rng().gen_range(0.0..=0.1);
    Duration::from_secs_f64(exp * (1.0 + jitter))
}

fn failed_result(attempt: &Attempt, err: &RelayError, duration: Duration) -> PushResult {
    PushResult {
        meta_id: attempt.meta_id.clone(),
        platform: attempt.platform.clone(),
        token: attempt.token.clone(),
        success: false,
        receipt_id: None,
        error: Some(err.to_string()),
        duration,
        timestamp: now_unix(),
    }
}

fn cancelled_results(attempts: &[Attempt], duration: Duration) -> Vec<PushResult> {
    attempts
        .iter()
        .map(|a| failed_result(a, &RelayError::Cancelled, duration))
        .collect()
}
