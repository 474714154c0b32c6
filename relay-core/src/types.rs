use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Per-user push tokens, one per platform at most.
///
/// Field names stay camelCase on disk and on the management API to match
/// what the chat clients already send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTokens {
    #[serde(rename = "metaId")]
    pub meta_id: String,
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: i64,
}

impl UserTokens {
    pub fn empty(meta_id: &str) -> Self {
        UserTokens {
            meta_id: meta_id.to_string(),
            tokens: HashMap::new(),
            updated_at: 0,
        }
    }
}

/// A push token bound to its current owner. The token itself is the device
/// primary key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceBinding {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    pub platform: String,
    #[serde(rename = "metaId")]
    pub meta_id: String,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedChat {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "chatId")]
    pub chat_id: String,
    #[serde(rename = "chatType", default)]
    pub chat_type: String,
    #[serde(rename = "blockedAt", default)]
    pub blocked_at: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBlockedChats {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "blockedChats", default)]
    pub blocked_chats: Vec<BlockedChat>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: i64,
}

impl UserBlockedChats {
    pub fn empty(user_id: &str) -> Self {
        UserBlockedChats {
            user_id: user_id.to_string(),
            blocked_chats: Vec::new(),
            updated_at: 0,
        }
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.blocked_chats.iter().any(|c| c.chat_id == chat_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifiedPin {
    #[serde(rename = "pinId")]
    pub pin_id: String,
    #[serde(rename = "notifiedAt", default)]
    pub notified_at: i64,
}

/// Chat notification kinds the relay understands.
pub const KIND_PRIVATE_CHAT: &str = "private_chat";
pub const KIND_GROUP_CHAT: &str = "group_chat";

/// A typed chat-server notification, decoded from one upstream frame and
/// consumed by exactly one relay task.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub kind: String,
    pub pin_id: String,
    pub sender_name: String,
    pub chat_info_type: i64,
    pub private_meta_id: String,
    pub group_id: String,
    pub repost_meta_ids: Vec<String>,
    pub mention_meta_ids: Vec<String>,
    /// Original message blob, forwarded untouched in the push payload.
    pub raw_message: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: &str) -> Self {
        Envelope {
            kind: kind.to_string(),
            pin_id: String::new(),
            sender_name: String::new(),
            chat_info_type: 0,
            private_meta_id: String::new(),
            group_id: String::new(),
            repost_meta_ids: Vec::new(),
            mention_meta_ids: Vec::new(),
            raw_message: serde_json::Value::Null,
        }
    }
}

/// Outbound notification content handed to the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: HashMap<String, serde_json::Value>,
    pub sound: Option<String>,
    pub badge: Option<u32>,
    pub priority: Option<String>,
    pub image_url: Option<String>,
    pub ttl_seconds: Option<u32>,
}

/// Outcome of one `(meta_id, platform, token)` delivery attempt.
#[derive(Debug, Clone)]
pub struct PushResult {
    pub meta_id: String,
    pub platform: String,
    pub token: String,
    pub success: bool,
    pub receipt_id: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
    pub timestamp: i64,
}

/// Aggregate of one dispatcher call.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub total_users: usize,
    pub total_platforms: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<PushResult>,
    pub duration: Duration,
}

impl BatchResult {
    /// Roll counts up from the collected per-attempt results.
    pub fn finish(mut self, total_users: usize, duration: Duration) -> Self {
        self.total_users = total_users;
        self.duration = duration;
        self.success_count = self.results.iter().filter(|r| r.success).count();
        self.failure_count = self.results.len() - self.success_count;
        let platforms: std::collections::HashSet<&str> =
            self.results.iter().map(|r| r.platform.as_str()).collect();
        self.total_platforms = platforms.len();
        self
    }
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
