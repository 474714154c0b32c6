use relay_core::types::{KIND_GROUP_CHAT, KIND_PRIVATE_CHAT};

/// Display-name cap in a notification line, ellipsis included.
const MAX_NAME_LEN: usize = 20;

/// Candy Bag message tags.
fn is_candy_bag(chat_info_type: i64) -> bool {
    chat_info_type == 1 || chat_info_type == 23
}

/// Caps a sender name at 20 characters; longer names end in `...` with the
/// ellipsis counted against the cap.
pub fn truncate_name(name: &str) -> String {
    if name.chars().count() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let mut truncated: String = name.chars().take(MAX_NAME_LEN - 3).collect();
    truncated.push_str("...");
    truncated
}

pub fn notification_title(kind: &str, is_mention: bool) -> String {
    if is_mention {
        match kind {
            KIND_GROUP_CHAT => "You were mentioned",
            _ => "New Mention",
        }
    } else {
        match kind {
            KIND_GROUP_CHAT => "New Message in Group",
            _ => "New Message",
        }
    }
    .to_string()
}

pub fn notification_body(
    kind: &str,
    sender_name: &str,
    chat_info_type: i64,
    is_mention: bool,
) -> String {
    if is_mention {
        let mut name = truncate_name(sender_name);
        if name.is_empty() {
            name = "Someone".to_string();
        }
        return if is_candy_bag(chat_info_type) {
            format!("{} mentioned you with a Candy Bag", name)
        } else {
            format!("{} mentioned you", name)
        };
    }

    match kind {
        KIND_GROUP_CHAT => {
            if sender_name.is_empty() {
                "New message in group".to_string()
            } else {
                let name = truncate_name(sender_name);
                if is_candy_bag(chat_info_type) {
                    format!("{} sent a Candy Bag", name)
                } else {
                    format!("{} sent a message", name)
                }
            }
        }
        // private_chat and anything unrecognized share the private wording.
        _ => {
            if sender_name.is_empty() {
                "You have a new message".to_string()
            } else {
                let name = truncate_name(sender_name);
                if is_candy_bag(chat_info_type) {
                    format!("{} sent you a Candy Bag", name)
                } else {
                    format!("{} sent you a message", name)
                }
            }
        }
    }
}
