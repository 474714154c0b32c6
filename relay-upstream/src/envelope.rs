use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing;

use relay_core::types::{Envelope, KIND_GROUP_CHAT, KIND_PRIVATE_CHAT};

// Upstream frame methods.
pub const METHOD_HEART_BEAT: &str = "HEART_BEAT";
pub const METHOD_PONG: &str = "PONG";
pub const METHOD_NOTIFY_PRIVATE_CHAT: &str = "WS_SERVER_NOTIFY_PRIVATE_CHAT";
pub const METHOD_NOTIFY_GROUP_CHAT: &str = "WS_SERVER_NOTIFY_GROUP_CHAT";
pub const METHOD_NOTIFY_GROUP_ROLE: &str = "WS_SERVER_NOTIFY_GROUP_ROLE";

pub const CODE_HEART_BEAT: i64 = 10;

/// Application payload carried by every upstream `message` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketData {
    #[serde(rename = "M", default)]
    pub method: String,
    #[serde(rename = "C", default)]
    pub code: Value,
    #[serde(rename = "D", default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl SocketData {
    pub fn heartbeat() -> Self {
        SocketData {
            method: METHOD_PONG.to_string(),
            code: Value::from(CODE_HEART_BEAT),
            data: Value::Null,
        }
    }
}

/// Where a decoded frame goes.
#[derive(Debug)]
pub enum Route {
    Heartbeat,
    Envelope(Envelope),
    Unknown(String),
}

/// Routes one `{M, C, D}` payload by method, decoding chat notifications
/// into envelopes. Method matching is case-insensitive.
pub fn route(data: SocketData) -> Route {
    match data.method.to_ascii_uppercase().as_str() {
        METHOD_HEART_BEAT | METHOD_PONG => Route::Heartbeat,
        METHOD_NOTIFY_PRIVATE_CHAT => {
            Route::Envelope(decode_envelope(KIND_PRIVATE_CHAT, &data.data))
        }
        METHOD_NOTIFY_GROUP_CHAT | METHOD_NOTIFY_GROUP_ROLE => {
            Route::Envelope(decode_envelope(KIND_GROUP_CHAT, &data.data))
        }
        _ => Route::Unknown(data.method),
    }
}

/// Decodes the tolerant envelope shape out of `D`.
///
/// Missing arrays become empty; a missing `message` object keeps the whole
/// payload as the raw blob so downstream apps still see the original data.
pub fn decode_envelope(kind: &str, data: &Value) -> Envelope {
    let mut envelope = Envelope::new(kind);

    envelope.repost_meta_ids = string_array(data.get("repostMetaIds"));
    envelope.mention_meta_ids = string_array(data.get("mentionMetaIds"));

    let message = match data.get("message") {
        Some(message) => message.clone(),
        None => data.clone(),
    };

    if let Some(obj) = message.as_object() {
        if let Some(pin_id) = obj.get("pinId").and_then(Value::as_str) {
            envelope.pin_id = pin_id.to_string();
        }
        if let Some(name) = obj
            .get("userInfo")
            .and_then(|u| u.get("name"))
            .and_then(Value::as_str)
        {
            envelope.sender_name = name.to_string();
        }

        match kind {
            KIND_PRIVATE_CHAT => {
                // First of metaId, from, to.
                for field in ["metaId", "from", "to"] {
                    if let Some(meta_id) = obj.get(field).and_then(Value::as_str) {
                        envelope.private_meta_id = meta_id.to_string();
                        break;
                    }
                }
            }
            KIND_GROUP_CHAT => {
                for field in ["groupId", "channelId"] {
                    if let Some(group_id) = obj.get(field).and_then(Value::as_str) {
                        envelope.group_id = group_id.to_string();
                        break;
                    }
                }
                if let Some(chat_type) = obj.get("chatType") {
                    envelope.chat_info_type = numeric_code(chat_type);
                }
            }
            _ => {}
        }
    }

    envelope.raw_message = message;
    envelope
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    match value.and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

/// Accepts any integer or float representation; anything else is logged and
/// defaults to 0.
fn numeric_code(value: &Value) -> i64 {
    if let Some(n) = value.as_i64() {
        return n;
    }
    if let Some(f) = value.as_f64() {
        return f as i64;
    }
    tracing::warn!("unexpected chatType value: {}", value);
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn private_chat_envelope_is_decoded() {
        let data = json!({
            "message": {
                "pinId": "P1",
                "metaId": "u1",
                "userInfo": {"name": "Alice"},
                "text": "hello"
            },
            "repostMetaIds": ["u1", "u2"],
            "mentionMetaIds": []
        });

        let envelope = decode_envelope(KIND_PRIVATE_CHAT, &data);
        assert_eq!(envelope.kind, KIND_PRIVATE_CHAT);
        assert_eq!(envelope.pin_id, "P1");
        assert_eq!(envelope.private_meta_id, "u1");
        assert_eq!(envelope.sender_name, "Alice");
        assert_eq!(envelope.repost_meta_ids, vec!["u1", "u2"]);
        assert!(envelope.mention_meta_ids.is_empty());
        assert_eq!(envelope.raw_message["text"], "hello");
    }

    #[test]
    fn private_meta_id_falls_back_to_from_then_to() {
        let data = json!({"message": {"from": "sender-1"}});
        let envelope = decode_envelope(KIND_PRIVATE_CHAT, &data);
        assert_eq!(envelope.private_meta_id, "sender-1");

        let data = json!({"message": {"to": "receiver-1"}});
        let envelope = decode_envelope(KIND_PRIVATE_CHAT, &data);
        assert_eq!(envelope.private_meta_id, "receiver-1");

        let data = json!({"message": {"metaId": "m", "from": "f", "to": "t"}});
        let envelope = decode_envelope(KIND_PRIVATE_CHAT, &data);
        assert_eq!(envelope.private_meta_id, "m");
    }

    #[test]
    fn group_id_falls_back_to_channel_id() {
        let data = json!({"message": {"channelId": "c9"}});
        let envelope = decode_envelope(KIND_GROUP_CHAT, &data);
        assert_eq!(envelope.group_id, "c9");

        let data = json!({"message": {"groupId": "g1", "channelId": "c9"}});
        let envelope = decode_envelope(KIND_GROUP_CHAT, &data);
        assert_eq!(envelope.group_id, "g1");
    }

    #[test]
    fn chat_info_type_accepts_int_and_float() {
        let data = json!({"message": {"groupId": "g1", "chatType": 23}});
        assert_eq!(decode_envelope(KIND_GROUP_CHAT, &data).chat_info_type, 23);

        let data = json!({"message": {"groupId": "g1", "chatType": 1.0}});
        assert_eq!(decode_envelope(KIND_GROUP_CHAT, &data).chat_info_type, 1);

        let data = json!({"message": {"groupId": "g1", "chatType": "nope"}});
        assert_eq!(decode_envelope(KIND_GROUP_CHAT, &data).chat_info_type, 0);
    }

    #[test]
    fn missing_message_keeps_whole_payload_as_raw() {
        let data = json!({"repostMetaIds": ["u1"], "something": "else"});
        let envelope = decode_envelope(KIND_PRIVATE_CHAT, &data);
        assert_eq!(envelope.repost_meta_ids, vec!["u1"]);
        assert_eq!(envelope.raw_message["something"], "else");
    }

    #[test]
    fn non_string_array_entries_are_skipped() {
        let data = json!({"repostMetaIds": ["u1", 7, null, "u2"]});
        let envelope = decode_envelope(KIND_PRIVATE_CHAT, &data);
        assert_eq!(envelope.repost_meta_ids, vec!["u1", "u2"]);
    }

    #[test]
    fn routing_is_case_insensitive() {
        let data = SocketData {
            method: "ws_server_notify_private_chat".to_string(),
            code: Value::Null,
            data: json!({"message": {}}),
        };
        assert!(matches!(route(data), Route::Envelope(e) if e.kind == KIND_PRIVATE_CHAT));

        let heartbeat = SocketData {
            method: "HEART_BEAT".to_string(),
            code: Value::from(10),
            data: Value::Null,
        };
        assert!(matches!(route(heartbeat), Route::Heartbeat));

        let unknown = SocketData {
            method: "WS_SOMETHING_ELSE".to_string(),
            code: Value::Null,
            data: Value::Null,
        };
        assert!(matches!(route(unknown), Route::Unknown(_)));
    }

    #[test]
    fn group_role_routes_as_group_chat() {
        let data = SocketData {
            method: METHOD_NOTIFY_GROUP_ROLE.to_string(),
            code: Value::Null,
            data: json!({"message": {"groupId": "g1"}}),
        };
        assert!(matches!(route(data), Route::Envelope(e) if e.kind == KIND_GROUP_CHAT));
    }
}
