use chrono::{ SecondsFormat, Utc };
use serde::{ Deserialize, Serialize };
use std::fmt;
use uuid::Uuid;

pub const PLACEHOLDER_TITLE: &str = "New chat";
pub const TITLE_MAX_CHARS: usize = 30;
pub const TRUNCATION_MARKER: &str = "...";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            timestamp: now_iso8601(),
        }
    }
}

/// One entry of the history sent for completion: role and content only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl From<&ChatMessage> for ChatTurn {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: String,
    /// Absent in lists written before titles were tracked; kept absent on save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_set: Option<bool>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: new_id(),
            title: PLACEHOLDER_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now_iso8601(),
            title_set: None,
        }
    }

    /// Appends a message. The first message of an untitled conversation names it.
    pub fn push_message(&mut self, message: ChatMessage) {
        if self.messages.is_empty() && !self.has_title() {
            self.title = derive_title(&message.content);
            self.title_set = Some(true);
        }
        self.messages.push(message);
    }

    pub fn rename(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.title_set = Some(true);
    }

    pub fn has_title(&self) -> bool {
        self.title_set.unwrap_or(false)
    }

    pub fn history(&self) -> Vec<ChatTurn> {
        self.messages.iter().map(ChatTurn::from).collect()
    }

    pub fn preview(&self, max_chars: usize) -> Option<String> {
        self.messages.last().map(|m| truncate_chars(m.content.trim(), max_chars))
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Most recently created or updated first.
pub type ConversationList = Vec<Conversation>;

pub fn derive_title(text: &str) -> String {
    truncate_chars(text, TITLE_MAX_CHARS)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Time-ordered id: 48 bits of milliseconds followed by random bits.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn short_first_message_becomes_title_unchanged() {
        let mut conv = Conversation::new();
        conv.push_message(ChatMessage::new(Role::User, "Hello world"));
        assert_eq!(conv.title, "Hello world");
        assert!(conv.has_title());
    }

    #[test]
    fn long_first_message_is_truncated_with_marker() {
        let text = "a".repeat(40);
        let mut conv = Conversation::new();
        conv.push_message(ChatMessage::new(Role::User, text));
        assert_eq!(conv.title, format!("{}...", "a".repeat(30)));
    }

    #[test]
    fn exactly_thirty_chars_has_no_marker() {
        let text = "b".repeat(30);
        assert_eq!(derive_title(&text), text);
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let text = "привет ".repeat(10);
        let title = derive_title(&text);
        assert_eq!(title.chars().count(), 30 + TRUNCATION_MARKER.len());
        assert!(title.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn later_messages_leave_title_alone() {
        let mut conv = Conversation::new();
        conv.push_message(ChatMessage::new(Role::User, "first"));
        conv.push_message(ChatMessage::new(Role::Assistant, "reply"));
        conv.push_message(ChatMessage::new(Role::User, "second question"));
        assert_eq!(conv.title, "first");
    }

    #[test]
    fn first_message_equal_to_placeholder_still_sets_flag() {
        let mut conv = Conversation::new();
        conv.push_message(ChatMessage::new(Role::User, PLACEHOLDER_TITLE));
        conv.push_message(ChatMessage::new(Role::User, "something else"));
        assert_eq!(conv.title, PLACEHOLDER_TITLE);
        assert!(conv.has_title());
    }

    #[test]
    fn renamed_conversation_keeps_title_on_first_message() {
        let mut conv = Conversation::new();
        conv.rename("Pinned");
        conv.push_message(ChatMessage::new(Role::User, "hi"));
        assert_eq!(conv.title, "Pinned");
    }

    #[test]
    fn history_strips_ids_and_timestamps() {
        let mut conv = Conversation::new();
        conv.push_message(ChatMessage::new(Role::User, "q"));
        conv.push_message(ChatMessage::new(Role::Assistant, "a"));
        let json = serde_json::to_value(conv.history()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                { "role": "user", "content": "q" },
                { "role": "assistant", "content": "a" }
            ])
        );
    }

    #[test]
    fn ids_are_unique_under_rapid_generation() {
        let ids: HashSet<String> = (0..10_000).map(|_| new_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn serialized_layout_uses_camel_case_keys() {
        let mut conv = Conversation::new();
        let json = serde_json::to_value(&conv).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("titleSet").is_none());
        assert_eq!(json["title"], PLACEHOLDER_TITLE);

        conv.rename("Named");
        let json = serde_json::to_value(&conv).unwrap();
        assert_eq!(json["titleSet"], true);
    }

    #[test]
    fn payload_without_title_flag_still_loads() {
        let raw = r#"[{"id":"x","title":"Old","messages":[],"createdAt":"2024-01-01T00:00:00.000Z"}]"#;
        let list: ConversationList = serde_json::from_str(raw).unwrap();
        assert_eq!(list[0].title_set, None);
        assert!(!list[0].has_title());
        assert_eq!(list[0].created_at, "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn preview_truncates_last_message() {
        let mut conv = Conversation::new();
        assert_eq!(conv.preview(5), None);
        conv.push_message(ChatMessage::new(Role::User, "  abcdefgh  "));
        assert_eq!(conv.preview(5).as_deref(), Some("abcde..."));
    }

    #[test]
    fn timestamps_are_millisecond_utc() {
        let ts = now_iso8601();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000Z".len());
    }
}
