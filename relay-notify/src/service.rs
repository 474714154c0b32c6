use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing;

use relay_core::types::{now_unix, Envelope, Notification, KIND_GROUP_CHAT, KIND_PRIVATE_CHAT};
use relay_core::{RelayContext, Result};
use relay_delivery::Dispatcher;

use crate::compose::{notification_body, notification_title};

/// The envelope-to-dispatch state machine.
///
/// Each envelope runs on its own task under a 30 s deadline owned by the
/// consumer. Dispatcher failures are logged per call and never abort the
/// envelope; the only fatal path here is the store going away during the
/// dedup check, where dropping the envelope beats risking a re-notify storm.
pub struct RelayService {
    ctx: RelayContext,
    dispatcher: Arc<Dispatcher>,
}

impl RelayService {
    pub fn new(ctx: RelayContext, dispatcher: Arc<Dispatcher>) -> Self {
        Self { ctx, dispatcher }
    }

    pub async fn process_envelope(
        &self,
        cancel: &CancellationToken,
        envelope: Envelope,
    ) -> Result<()> {
        if envelope.raw_message.is_null() {
            tracing::warn!("dropping envelope without message content");
            return Ok(());
        }

        if !self.ctx.config.kind_enabled(&envelope.kind) {
            tracing::debug!("kind {} disabled, skipping", envelope.kind);
            return Ok(());
        }

        if !envelope.pin_id.is_empty() {
            match self.ctx.store.is_notified_pin(&envelope.pin_id).await {
                Ok(true) => {
                    tracing::debug!("pin {} already notified, skipping", envelope.pin_id);
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("dedup check failed for pin {}: {}", envelope.pin_id, e);
                    return Err(e);
                }
            }
        }

        if envelope.repost_meta_ids.is_empty() {
            tracing::debug!("envelope has no recipients, skipping");
            return Ok(());
        }

        let filtered = self.filter_recipients(&envelope).await;

        let mentioned = envelope.mention_meta_ids.clone();
        let plain: Vec<String> = filtered
            .into_iter()
            .filter(|meta_id| !mentioned.contains(meta_id))
            .collect();

        if !mentioned.is_empty() {
            let notification = self.build_notification(&envelope, true);
            tracing::info!(
                "pushing mention notification for {} recipients",
                mentioned.len()
            );
            match self.dispatcher.dispatch(cancel, &mentioned, &notification).await {
                Ok(result) => {
                    tracing::info!(
                        "mention push done: users={} ok={} failed={} took={:?}",
                        result.total_users,
                        result.success_count,
                        result.failure_count,
                        result.duration
                    );
                }
                Err(e) => tracing::error!("mention push failed: {}", e),
            }
        }

        if !plain.is_empty() {
            let notification = self.build_notification(&envelope, false);
            tracing::info!("pushing notification for {} recipients", plain.len());
            match self.dispatcher.dispatch(cancel, &plain, &notification).await {
                Ok(result) => {
                    tracing::info!(
                        "push done: users={} ok={} failed={} took={:?}",
                        result.total_users,
                        result.success_count,
                        result.failure_count,
                        result.duration
                    );
                    for push in result.results.iter().filter(|r| !r.success) {
                        tracing::warn!(
                            "push failed for {} on {}: {}",
                            push.meta_id,
                            push.platform,
                            push.error.as_deref().unwrap_or("unknown")
                        );
                    }
                }
                Err(e) => tracing::error!("push failed: {}", e),
            }
        }

        // The dedup record lands even when some recipients failed; a second
        // envelope for this pin is a duplicate, not a retry.
        if !envelope.pin_id.is_empty() {
            let store = Arc::clone(&self.ctx.store);
            let pin_id = envelope.pin_id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.add_notified_pin(&pin_id).await {
                    tracing::error!("recording notified pin {} failed: {}", pin_id, e);
                }
            });
        }

        Ok(())
    }

    /// Applies self-suppression and the per-user mute list. A store error
    /// defaults to "not blocked" so a flaky disk never silences pushes.
    async fn filter_recipients(&self, envelope: &Envelope) -> Vec<String> {
        let chat_id = match envelope.kind.as_str() {
            KIND_PRIVATE_CHAT => envelope.private_meta_id.as_str(),
            KIND_GROUP_CHAT => envelope.group_id.as_str(),
            _ => "",
        };

        let mut filtered = Vec::with_capacity(envelope.repost_meta_ids.len());
        let mut blocked_count = 0usize;

        for meta_id in &envelope.repost_meta_ids {
            if envelope.kind == KIND_PRIVATE_CHAT && meta_id == chat_id {
                // No push for the sender's own message.
                continue;
            }

            if chat_id.is_empty() {
                filtered.push(meta_id.clone());
                continue;
            }

            match self.ctx.store.is_user_blocked_chat(meta_id, chat_id).await {
                Ok(true) => {
                    blocked_count += 1;
                    tracing::debug!("{} muted chat {}, skipping", meta_id, chat_id);
                }
                Ok(false) => filtered.push(meta_id.clone()),
                Err(e) => {
                    tracing::warn!(
                        "mute lookup failed for {} (chat {}): {}, including recipient",
                        meta_id,
                        chat_id,
                        e
                    );
                    filtered.push(meta_id.clone());
                }
            }
        }

        if blocked_count > 0 {
            tracing::debug!("{} recipients muted this chat", blocked_count);
        }
        filtered
    }

    fn build_notification(&self, envelope: &Envelope, is_mention: bool) -> Notification {
        let title = notification_title(&envelope.kind, is_mention);
        let body = notification_body(
            &envelope.kind,
            &envelope.sender_name,
            envelope.chat_info_type,
            is_mention,
        );

        let mut data: HashMap<String, Value> = HashMap::new();
        data.insert("type".to_string(), Value::from(envelope.kind.clone()));
        data.insert("message".to_string(), envelope.raw_message.clone());
        data.insert("timestamp".to_string(), Value::from(now_unix()));
        data.insert("pinId".to_string(), Value::from(envelope.pin_id.clone()));
        match envelope.kind.as_str() {
            KIND_PRIVATE_CHAT if !envelope.private_meta_id.is_empty() => {
                data.insert(
                    "metaId".to_string(),
                    Value::from(envelope.private_meta_id.clone()),
                );
            }
            KIND_GROUP_CHAT if !envelope.group_id.is_empty() => {
                data.insert("groupId".to_string(), Value::from(envelope.group_id.clone()));
            }
            _ => {}
        }
        if is_mention {
            data.insert("isMention".to_string(), Value::from(true));
        }

        Notification {
            title,
            body,
            data,
            sound: Some("default".to_string()),
            ..Default::default()
        }
    }
}
