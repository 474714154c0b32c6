use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::Serialize;
use tracing;

use crate::error::{RelayError, Result};
use crate::types::{
    now_unix, BlockedChat, DeviceBinding, NotifiedPin, UserBlockedChats, UserTokens,
};

pub const KEYSPACE_USER_TOKENS: &str = "user_tokens";
pub const KEYSPACE_DEVICES: &str = "devices";
pub const KEYSPACE_BLOCKED_CHATS: &str = "blocked_chats";
pub const KEYSPACE_NOTIFIED_PINS: &str = "notified_pins";

const ALL_KEYSPACES: &[&str] = &[
    KEYSPACE_USER_TOKENS,
    KEYSPACE_DEVICES,
    KEYSPACE_BLOCKED_CHATS,
    KEYSPACE_NOTIFIED_PINS,
];

const DEFAULT_PAGE_SIZE: usize = 10;
const MAX_PAGE_SIZE: usize = 100;

/// Embedded store over one sled database per logical keyspace.
///
/// Each keyspace lives in its own directory under `base_path` and is opened
/// on first use; all opened keyspaces are flushed and dropped in `close`.
/// Values are JSON, keys are the logical id bytes.
///
/// Reads take the shared latch, writes the exclusive latch, so the
/// read-modify-write paths (token transfer, blocked-chat edits) are atomic
/// from any reader's point of view.
pub struct Store {
    base_path: PathBuf,
    keyspaces: RwLock<HashMap<&'static str, sled::Db>>,
    latch: RwLock<()>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginatedUserTokens {
    pub items: Vec<UserTokens>,
    pub total: usize,
    pub page: usize,
    #[serde(rename = "pageSize")]
    pub page_size: usize,
    #[serde(rename = "totalPages")]
    pub total_pages: usize,
    #[serde(rename = "hasNext")]
    pub has_next: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyspaceInfo {
    pub name: String,
    pub count: usize,
}

impl Store {
    /// Opens the store root. Keyspaces themselves are created lazily; this
    /// only verifies the base directory is usable.
    pub fn open(db_path: &str) -> Result<Self> {
        let base_path = PathBuf::from(db_path);
        std::fs::create_dir_all(&base_path)
            .map_err(|e| RelayError::StoreUnavailable(format!("create {}: {}", db_path, e)))?;

        tracing::info!("Store opened at {}", base_path.display());

        Ok(Store {
            base_path,
            keyspaces: RwLock::new(HashMap::new()),
            latch: RwLock::new(()),
        })
    }

    /// Flushes and drops every opened keyspace.
    pub async fn close(&self) -> Result<()> {
        let dbs: Vec<(&'static str, sled::Db)> = {
            let mut keyspaces = self.keyspaces.write().unwrap();
            keyspaces.drain().collect()
        };

        for (name, db) in dbs {
            db.flush_async().await?;
            tracing::info!("Keyspace {} closed", name);
        }
        Ok(())
    }

    /// Double-checked lazy open of one keyspace database.
    fn keyspace(&self, name: &'static str) -> Result<sled::Db> {
        {
            let keyspaces = self.keyspaces.read().unwrap();
            if let Some(db) = keyspaces.get(name) {
                return Ok(db.clone());
            }
        }

        let mut keyspaces = self.keyspaces.write().unwrap();
        if let Some(db) = keyspaces.get(name) {
            return Ok(db.clone());
        }

        let path = self.base_path.join(name);
        let db = sled::open(&path)?;
        tracing::info!("Keyspace {} opened at {}", name, path.display());
        keyspaces.insert(name, db.clone());
        Ok(db)
    }

    fn get_json<T: serde::de::DeserializeOwned>(db: &sled::Db, key: &str) -> Result<Option<T>> {
        match db.get(key.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(db: &sled::Db, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_vec(value)?;
        db.insert(key.as_bytes(), raw)?;
        Ok(())
    }

    // ----- user tokens ---------------------------------------------------

    /// Registers `token` for `(meta_id, platform)`. The token is the device
    /// primary key: when it currently belongs to a different user, that
    /// user's matching platform entry is scrubbed before the binding is
    /// rewritten. Both keyspaces are durable before this returns.
    pub async fn set_user_token(&self, meta_id: &str, platform: &str, token: &str) -> Result<()> {
        if meta_id.is_empty() || platform.is_empty() || token.is_empty() {
            return Err(RelayError::invalid_argument(
                "metaId, platform and token must be non-empty",
            ));
        }

        let tokens_db = self.keyspace(KEYSPACE_USER_TOKENS)?;
        let devices_db = self.keyspace(KEYSPACE_DEVICES)?;

        {
            let _guard = self.latch.write().unwrap();

            if let Some(binding) = Self::get_json::<DeviceBinding>(&devices_db, token)? {
                if binding.meta_id != meta_id {
                    tracing::warn!(
                        "token transferred from {} to {} (platform {})",
                        binding.meta_id,
                        meta_id,
                        platform
                    );
                    if let Some(mut prior) =
                        Self::get_json::<UserTokens>(&tokens_db, &binding.meta_id)?
                    {
                        if prior.tokens.get(platform).map(String::as_str) == Some(token) {
                            prior.tokens.remove(platform);
                            prior.updated_at = now_unix();
                            Self::put_json(&tokens_db, &binding.meta_id, &prior)?;
                        }
                    }
                }
            }

            // Token map first, binding second: a reader holding the shared
            // latch next must never see the binding ahead of the entry.
            let mut user_tokens = Self::get_json::<UserTokens>(&tokens_db, meta_id)?
                .unwrap_or_else(|| UserTokens::empty(meta_id));
            user_tokens
                .tokens
                .insert(platform.to_string(), token.to_string());
            user_tokens.updated_at = now_unix();
            Self::put_json(&tokens_db, meta_id, &user_tokens)?;

            let binding = DeviceBinding {
                device_id: token.to_string(),
                platform: platform.to_string(),
                meta_id: meta_id.to_string(),
                updated_at: now_unix(),
            };
            Self::put_json(&devices_db, token, &binding)?;
        }

        tokens_db.flush_async().await?;
        devices_db.flush_async().await?;
        Ok(())
    }

    /// Absent users come back as an empty token set, never as an error.
    pub async fn get_user_tokens(&self, meta_id: &str) -> Result<UserTokens> {
        if meta_id.is_empty() {
            return Err(RelayError::invalid_argument("metaId must be non-empty"));
        }
        let db = self.keyspace(KEYSPACE_USER_TOKENS)?;
        let _guard = self.latch.read().unwrap();
        Ok(Self::get_json::<UserTokens>(&db, meta_id)?
            .unwrap_or_else(|| UserTokens::empty(meta_id)))
    }

    /// Idempotent: removing an absent entry is a success.
    pub async fn remove_user_token(&self, meta_id: &str, platform: &str) -> Result<()> {
        if meta_id.is_empty() || platform.is_empty() {
            return Err(RelayError::invalid_argument(
                "metaId and platform must be non-empty",
            ));
        }

        let db = self.keyspace(KEYSPACE_USER_TOKENS)?;
        let changed = {
            let _guard = self.latch.write().unwrap();
            match Self::get_json::<UserTokens>(&db, meta_id)? {
                Some(mut user_tokens) => {
                    if user_tokens.tokens.remove(platform).is_some() {
                        user_tokens.updated_at = now_unix();
                        Self::put_json(&db, meta_id, &user_tokens)?;
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if changed {
            db.flush_async().await?;
        }
        Ok(())
    }

    /// Removes the user-tokens key entirely. Device bindings are left
    /// intact; cleaning those up is an operator concern.
    pub async fn delete_user_tokens(&self, meta_id: &str) -> Result<()> {
        if meta_id.is_empty() {
            return Err(RelayError::invalid_argument("metaId must be non-empty"));
        }
        let db = self.keyspace(KEYSPACE_USER_TOKENS)?;
        {
            let _guard = self.latch.write().unwrap();
            db.remove(meta_id.as_bytes())?;
        }
        db.flush_async().await?;
        Ok(())
    }

    /// Batched point gets. Output order is not guaranteed.
    pub async fn get_all_user_tokens(
        &self,
        meta_ids: &[String],
    ) -> Result<HashMap<String, UserTokens>> {
        let mut result = HashMap::with_capacity(meta_ids.len());
        if meta_ids.is_empty() {
            return Ok(result);
        }

        let db = self.keyspace(KEYSPACE_USER_TOKENS)?;
        let _guard = self.latch.read().unwrap();
        for meta_id in meta_ids {
            let tokens = Self::get_json::<UserTokens>(&db, meta_id)?
                .unwrap_or_else(|| UserTokens::empty(meta_id));
            result.insert(meta_id.clone(), tokens);
        }
        Ok(result)
    }

    pub async fn get_device(&self, device_id: &str) -> Result<Option<DeviceBinding>> {
        if device_id.is_empty() {
            return Err(RelayError::invalid_argument("deviceId must be non-empty"));
        }
        let db = self.keyspace(KEYSPACE_DEVICES)?;
        let _guard = self.latch.read().unwrap();
        Self::get_json::<DeviceBinding>(&db, device_id)
    }

    /// Stable iteration over the user-tokens keyspace. `page` starts at 1;
    /// `page_size` is clamped to [1, 100]. `total` comes from the same scan
    /// that produced the page, so a paging session never sees stale counts.
    pub async fn list_user_tokens(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<PaginatedUserTokens> {
        let page = page.max(1);
        let page_size = if page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size.min(MAX_PAGE_SIZE)
        };

        let db = self.keyspace(KEYSPACE_USER_TOKENS)?;
        let all: Vec<UserTokens> = {
            let _guard = self.latch.read().unwrap();
            let mut all = Vec::new();
            for entry in db.iter() {
                let (key, raw) = entry?;
                match serde_json::from_slice::<UserTokens>(&raw) {
                    Ok(tokens) => all.push(tokens),
                    Err(e) => {
                        tracing::warn!(
                            "skipping corrupt user_tokens record {}: {}",
                            String::from_utf8_lossy(&key),
                            e
                        );
                    }
                }
            }
            all
        };

        let total = all.len();
        let total_pages = total.div_ceil(page_size);
        let start = (page - 1) * page_size;
        let items = if start >= total {
            Vec::new()
        } else {
            all[start..(start + page_size).min(total)].to_vec()
        };

        Ok(PaginatedUserTokens {
            items,
            total,
            page,
            page_size,
            total_pages,
            has_next: page < total_pages,
        })
    }

    // ----- blocked chats -------------------------------------------------

    /// Appends a blocked chat for the user. Adding a chat that is already
    /// present is a no-op.
    pub async fn add_blocked_chat(
        &self,
        user_id: &str,
        chat_id: &str,
        chat_type: &str,
        reason: &str,
    ) -> Result<()> {
        if user_id.is_empty() || chat_id.is_empty() {
            return Err(RelayError::invalid_argument(
                "userId and chatId must be non-empty",
            ));
        }

        let db = self.keyspace(KEYSPACE_BLOCKED_CHATS)?;
        let changed = {
            let _guard = self.latch.write().unwrap();
            let mut chats = Self::get_json::<UserBlockedChats>(&db, user_id)?
                .unwrap_or_else(|| UserBlockedChats::empty(user_id));
            if chats.contains(chat_id) {
                false
            } else {
                chats.blocked_chats.push(BlockedChat {
                    user_id: user_id.to_string(),
                    chat_id: chat_id.to_string(),
                    chat_type: chat_type.to_string(),
                    blocked_at: now_unix(),
                    reason: reason.to_string(),
                });
                chats.updated_at = now_unix();
                Self::put_json(&db, user_id, &chats)?;
                true
            }
        };

        if changed {
            db.flush_async().await?;
        }
        Ok(())
    }

    /// Removes a blocked chat; deleting the last entry removes the key.
    /// Removing an absent entry is a success.
    pub async fn remove_blocked_chat(&self, user_id: &str, chat_id: &str) -> Result<()> {
        if user_id.is_empty() || chat_id.is_empty() {
            return Err(RelayError::invalid_argument(
                "userId and chatId must be non-empty",
            ));
        }

        let db = self.keyspace(KEYSPACE_BLOCKED_CHATS)?;
        let changed = {
            let _guard = self.latch.write().unwrap();
            match Self::get_json::<UserBlockedChats>(&db, user_id)? {
                Some(mut chats) => {
                    let before = chats.blocked_chats.len();
                    chats.blocked_chats.retain(|c| c.chat_id != chat_id);
                    if chats.blocked_chats.len() == before {
                        false
                    } else if chats.blocked_chats.is_empty() {
                        db.remove(user_id.as_bytes())?;
                        true
                    } else {
                        chats.updated_at = now_unix();
                        Self::put_json(&db, user_id, &chats)?;
                        true
                    }
                }
                None => false,
            }
        };

        if changed {
            db.flush_async().await?;
        }
        Ok(())
    }

    /// Absence means "not blocked".
    pub async fn is_user_blocked_chat(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        if user_id.is_empty() || chat_id.is_empty() {
            return Err(RelayError::invalid_argument(
                "userId and chatId must be non-empty",
            ));
        }
        let db = self.keyspace(KEYSPACE_BLOCKED_CHATS)?;
        let _guard = self.latch.read().unwrap();
        Ok(Self::get_json::<UserBlockedChats>(&db, user_id)?
            .map(|chats| chats.contains(chat_id))
            .unwrap_or(false))
    }

    pub async fn get_user_blocked_chats(&self, user_id: &str) -> Result<UserBlockedChats> {
        if user_id.is_empty() {
            return Err(RelayError::invalid_argument("userId must be non-empty"));
        }
        let db = self.keyspace(KEYSPACE_BLOCKED_CHATS)?;
        let _guard = self.latch.read().unwrap();
        Ok(Self::get_json::<UserBlockedChats>(&db, user_id)?
            .unwrap_or_else(|| UserBlockedChats::empty(user_id)))
    }

    // ----- notified pins -------------------------------------------------

    /// Set semantics; re-adding a pin is a success.
    pub async fn add_notified_pin(&self, pin_id: &str) -> Result<()> {
        if pin_id.is_empty() {
            return Err(RelayError::invalid_argument("pinId must be non-empty"));
        }
        let db = self.keyspace(KEYSPACE_NOTIFIED_PINS)?;
        {
            let _guard = self.latch.write().unwrap();
            let pin = NotifiedPin {
                pin_id: pin_id.to_string(),
                notified_at: now_unix(),
            };
            Self::put_json(&db, pin_id, &pin)?;
        }
        db.flush_async().await?;
        Ok(())
    }

    pub async fn is_notified_pin(&self, pin_id: &str) -> Result<bool> {
        if pin_id.is_empty() {
            return Err(RelayError::invalid_argument("pinId must be non-empty"));
        }
        let db = self.keyspace(KEYSPACE_NOTIFIED_PINS)?;
        let _guard = self.latch.read().unwrap();
        Ok(db.contains_key(pin_id.as_bytes())?)
    }

    pub async fn remove_notified_pin(&self, pin_id: &str) -> Result<()> {
        if pin_id.is_empty() {
            return Err(RelayError::invalid_argument("pinId must be non-empty"));
        }
        let db = self.keyspace(KEYSPACE_NOTIFIED_PINS)?;
        {
            let _guard = self.latch.write().unwrap();
            db.remove(pin_id.as_bytes())?;
        }
        db.flush_async().await?;
        Ok(())
    }

    // ----- inspection ----------------------------------------------------

    /// Record counts per keyspace, for the management surface.
    pub async fn keyspace_stats(&self) -> Result<Vec<KeyspaceInfo>> {
        let mut result = Vec::with_capacity(ALL_KEYSPACES.len());
        for &name in ALL_KEYSPACES {
            let db = self.keyspace(name)?;
            let _guard = self.latch.read().unwrap();
            result.push(KeyspaceInfo {
                name: name.to_string(),
                count: db.len(),
            });
        }
        Ok(result)
    }

    /// Deletes every record in one keyspace. Operators use this to prune
    /// `notified_pins`.
    pub async fn clear_keyspace(&self, name: &str) -> Result<usize> {
        let name = ALL_KEYSPACES
            .iter()
            .find(|k| **k == name)
            .copied()
            .ok_or_else(|| RelayError::invalid_argument(format!("unknown keyspace: {}", name)))?;

        let db = self.keyspace(name)?;
        let removed = {
            let _guard = self.latch.write().unwrap();
            let keys: Vec<sled::IVec> = db.iter().keys().filter_map(|k| k.ok()).collect();
            let mut batch = sled::Batch::default();
            for key in &keys {
                batch.remove(key.clone());
            }
            db.apply_batch(batch)?;
            keys.len()
        };
        db.flush_async().await?;

        tracing::info!("cleared keyspace {} ({} records)", name, removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().to_str().unwrap()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn register_token_creates_binding() {
        let (_dir, store) = open_store();

        store
            .set_user_token("u1", "expo", "ExponentPushToken[AAA]")
            .await
            .unwrap();

        let tokens = store.get_user_tokens("u1").await.unwrap();
        assert_eq!(
            tokens.tokens.get("expo").map(String::as_str),
            Some("ExponentPushToken[AAA]")
        );

        let binding = store
            .get_device("ExponentPushToken[AAA]")
            .await
            .unwrap()
            .expect("binding must exist");
        assert_eq!(binding.meta_id, "u1");
        assert_eq!(binding.platform, "expo");
    }

    #[tokio::test]
    async fn token_transfer_scrubs_prior_owner() {
        let (_dir, store) = open_store();

        store
            .set_user_token("u1", "expo", "ExponentPushToken[AAA]")
            .await
            .unwrap();
        store
            .set_user_token("u2", "expo", "ExponentPushToken[AAA]")
            .await
            .unwrap();

        let u1 = store.get_user_tokens("u1").await.unwrap();
        assert!(u1.tokens.is_empty());

        let u2 = store.get_user_tokens("u2").await.unwrap();
        assert_eq!(
            u2.tokens.get("expo").map(String::as_str),
            Some("ExponentPushToken[AAA]")
        );

        let binding = store
            .get_device("ExponentPushToken[AAA]")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(binding.meta_id, "u2");
    }

    #[tokio::test]
    async fn transfer_keeps_unrelated_platform_tokens() {
        let (_dir, store) = open_store();

        store
            .set_user_token("u1", "expo", "ExponentPushToken[AAA]")
            .await
            .unwrap();
        store
            .set_user_token("u1", "fcm", "fcm-token-1")
            .await
            .unwrap();
        store
            .set_user_token("u2", "expo", "ExponentPushToken[AAA]")
            .await
            .unwrap();

        let u1 = store.get_user_tokens("u1").await.unwrap();
        assert!(u1.tokens.get("expo").is_none());
        assert_eq!(u1.tokens.get("fcm").map(String::as_str), Some("fcm-token-1"));
    }

    #[tokio::test]
    async fn absent_user_reads_as_empty() {
        let (_dir, store) = open_store();
        let tokens = store.get_user_tokens("ghost").await.unwrap();
        assert_eq!(tokens.meta_id, "ghost");
        assert!(tokens.tokens.is_empty());
    }

    #[tokio::test]
    async fn remove_token_is_idempotent() {
        let (_dir, store) = open_store();

        store.remove_user_token("u1", "expo").await.unwrap();

        store
            .set_user_token("u1", "expo", "ExponentPushToken[AAA]")
            .await
            .unwrap();
        store.remove_user_token("u1", "expo").await.unwrap();
        store.remove_user_token("u1", "expo").await.unwrap();

        let tokens = store.get_user_tokens("u1").await.unwrap();
        assert!(tokens.tokens.is_empty());
    }

    #[tokio::test]
    async fn delete_user_tokens_leaves_binding() {
        let (_dir, store) = open_store();

        store
            .set_user_token("u1", "expo", "ExponentPushToken[AAA]")
            .await
            .unwrap();
        store.delete_user_tokens("u1").await.unwrap();

        let tokens = store.get_user_tokens("u1").await.unwrap();
        assert!(tokens.tokens.is_empty());
        assert!(store
            .get_device("ExponentPushToken[AAA]")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn empty_arguments_are_rejected() {
        let (_dir, store) = open_store();

        let err = store.set_user_token("", "expo", "t").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidArgument(_)));
        let err = store.set_user_token("u", "", "t").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidArgument(_)));
        let err = store.set_user_token("u", "expo", "").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn blocked_chat_add_is_deduplicated() {
        let (_dir, store) = open_store();

        store
            .add_blocked_chat("u3", "g1", "group", "")
            .await
            .unwrap();
        store
            .add_blocked_chat("u3", "g1", "group", "again")
            .await
            .unwrap();

        let chats = store.get_user_blocked_chats("u3").await.unwrap();
        assert_eq!(chats.blocked_chats.len(), 1);
        assert!(store.is_user_blocked_chat("u3", "g1").await.unwrap());
        assert!(!store.is_user_blocked_chat("u3", "g2").await.unwrap());
        assert!(!store.is_user_blocked_chat("other", "g1").await.unwrap());
    }

    #[tokio::test]
    async fn removing_last_blocked_chat_deletes_key() {
        let (_dir, store) = open_store();

        store
            .add_blocked_chat("u3", "g1", "group", "")
            .await
            .unwrap();
        store
            .add_blocked_chat("u3", "p9", "private", "")
            .await
            .unwrap();

        store.remove_blocked_chat("u3", "g1").await.unwrap();
        assert!(!store.is_user_blocked_chat("u3", "g1").await.unwrap());
        assert!(store.is_user_blocked_chat("u3", "p9").await.unwrap());

        store.remove_blocked_chat("u3", "p9").await.unwrap();
        let db = store.keyspace(KEYSPACE_BLOCKED_CHATS).unwrap();
        assert!(db.get(b"u3").unwrap().is_none());

        // Removing something never blocked still succeeds.
        store.remove_blocked_chat("u3", "nope").await.unwrap();
    }

    #[tokio::test]
    async fn notified_pin_set_semantics() {
        let (_dir, store) = open_store();

        assert!(!store.is_notified_pin("P1").await.unwrap());
        store.add_notified_pin("P1").await.unwrap();
        store.add_notified_pin("P1").await.unwrap();
        assert!(store.is_notified_pin("P1").await.unwrap());

        store.remove_notified_pin("P1").await.unwrap();
        assert!(!store.is_notified_pin("P1").await.unwrap());
    }

    #[tokio::test]
    async fn pagination_covers_scan_without_overlap() {
        let (_dir, store) = open_store();

        for i in 0..25 {
            store
                .set_user_token(&format!("user-{:02}", i), "expo", &format!("ExponentPushToken[{:02}]", i))
                .await
                .unwrap();
        }

        let full = store.list_user_tokens(1, 100).await.unwrap();
        assert_eq!(full.total, 25);
        assert_eq!(full.items.len(), 25);

        let mut collected = Vec::new();
        let mut page = 1;
        loop {
            let result = store.list_user_tokens(page, 10).await.unwrap();
            assert_eq!(result.total, 25);
            assert_eq!(result.total_pages, 3);
            collected.extend(result.items.iter().map(|t| t.meta_id.clone()));
            if !result.has_next {
                break;
            }
            page += 1;
        }

        let full_ids: Vec<String> = full.items.iter().map(|t| t.meta_id.clone()).collect();
        assert_eq!(collected, full_ids);

        let unique: std::collections::HashSet<&String> = collected.iter().collect();
        assert_eq!(unique.len(), collected.len());
    }

    #[tokio::test]
    async fn page_size_is_clamped() {
        let (_dir, store) = open_store();
        store
            .set_user_token("u1", "expo", "ExponentPushToken[AAA]")
            .await
            .unwrap();

        let result = store.list_user_tokens(1, 10_000).await.unwrap();
        assert_eq!(result.page_size, 100);

        let result = store.list_user_tokens(0, 0).await.unwrap();
        assert_eq!(result.page, 1);
        assert_eq!(result.page_size, DEFAULT_PAGE_SIZE);

        let past_end = store.list_user_tokens(99, 10).await.unwrap();
        assert!(past_end.items.is_empty());
        assert!(!past_end.has_next);
    }

    #[tokio::test]
    async fn stats_and_clear() {
        let (_dir, store) = open_store();

        store.add_notified_pin("P1").await.unwrap();
        store.add_notified_pin("P2").await.unwrap();

        let stats = store.keyspace_stats().await.unwrap();
        let pins = stats
            .iter()
            .find(|k| k.name == KEYSPACE_NOTIFIED_PINS)
            .unwrap();
        assert_eq!(pins.count, 2);

        let removed = store.clear_keyspace(KEYSPACE_NOTIFIED_PINS).await.unwrap();
        assert_eq!(removed, 2);
        assert!(!store.is_notified_pin("P1").await.unwrap());

        let err = store.clear_keyspace("bogus").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidArgument(_)));
    }
}
