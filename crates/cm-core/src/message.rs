//! Message types
//!
//! Three shapes of the same conversational turn:
//! - [`StoredMessage`]: the persisted form inside a session document (`human` / `ai`)
//! - [`Message`]: the rich in-memory form handed to the conversation loop
//! - [`ChatTurn`]: the simplified transport form (`userMessage` / `apiMessage`)

use mongodb::bson::Document;
use serde::{Deserialize, Serialize};

/// Role of a persisted message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredRole {
    Human,
    Ai,
}

/// One persisted turn. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: StoredRole,
    pub content: String,
    /// Auxiliary fields passed through untouched
    #[serde(flatten)]
    pub extra: Document,
}

impl StoredMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: StoredRole::Human,
            content: content.into(),
            extra: Document::new(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: StoredRole::Ai,
            content: content.into(),
            extra: Document::new(),
        }
    }
}

/// Role of a rich message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Ai => write!(f, "ai"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Rich message used by the conversation loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Document::is_empty")]
    pub additional: Document,
}

impl Message {
    /// Create a human (user-authored) message
    pub fn human(content: impl Into<String>) -> Self {
        Self::with_role(Role::Human, content)
    }

    /// Create an AI (assistant-authored) message
    pub fn ai(content: impl Into<String>) -> Self {
        Self::with_role(Role::Ai, content)
    }

    /// Create a system message, typically used to seed context
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            additional: Document::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Convert to the simplified transport form
    pub fn to_turn(&self) -> ChatTurn {
        let kind = match self.role {
            Role::Human => TurnKind::UserMessage,
            Role::Ai => TurnKind::ApiMessage,
            Role::System => TurnKind::SystemMessage,
        };
        ChatTurn {
            text: self.content.clone(),
            kind,
        }
    }
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        let role = match stored.role {
            StoredRole::Human => Role::Human,
            StoredRole::Ai => Role::Ai,
        };
        Self {
            role,
            content: stored.content,
            additional: stored.extra,
        }
    }
}

/// Tag of a transport message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnKind {
    UserMessage,
    ApiMessage,
    SystemMessage,
    /// Any tag this crate does not recognise
    #[serde(other)]
    Other,
}

/// Simplified transport message: `{ "text": ..., "type": "userMessage" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: TurnKind,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: TurnKind::UserMessage,
        }
    }

    pub fn api(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: TurnKind::ApiMessage,
        }
    }

    /// Persisted form of this turn, `None` for tags that are never stored
    pub fn to_stored(&self) -> Option<StoredMessage> {
        match self.kind {
            TurnKind::UserMessage => Some(StoredMessage::human(&self.text)),
            TurnKind::ApiMessage => Some(StoredMessage::ai(&self.text)),
            TurnKind::SystemMessage | TurnKind::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{self, doc};

    #[test]
    fn test_stored_message_layout() {
        let doc = bson::to_document(&StoredMessage::human("hi")).unwrap();
        assert_eq!(doc, doc! { "role": "human", "content": "hi" });
    }

    #[test]
    fn test_stored_message_keeps_extra_fields() {
        let raw = doc! { "role": "ai", "content": "hello!", "model": "m-1" };
        let stored: StoredMessage = bson::from_document(raw).unwrap();
        assert_eq!(stored.role, StoredRole::Ai);
        assert_eq!(stored.extra.get_str("model").unwrap(), "m-1");

        let message = Message::from(stored);
        assert_eq!(message.role(), Role::Ai);
        assert_eq!(message.additional.get_str("model").unwrap(), "m-1");
    }

    #[test]
    fn test_unknown_stored_role_is_rejected() {
        let raw = doc! { "role": "system", "content": "nope" };
        assert!(bson::from_document::<StoredMessage>(raw).is_err());
    }

    #[test]
    fn test_turn_kind_tags() {
        let turn: ChatTurn =
            serde_json::from_str(r#"{"text":"hi","type":"userMessage"}"#).unwrap();
        assert_eq!(turn, ChatTurn::user("hi"));

        let turn: ChatTurn =
            serde_json::from_str(r#"{"text":"?","type":"toolMessage"}"#).unwrap();
        assert_eq!(turn.kind, TurnKind::Other);
        assert!(turn.to_stored().is_none());
    }

    #[test]
    fn test_message_to_turn() {
        assert_eq!(Message::human("q").to_turn(), ChatTurn::user("q"));
        assert_eq!(Message::ai("a").to_turn(), ChatTurn::api("a"));
        assert_eq!(Message::system("s").to_turn().kind, TurnKind::SystemMessage);
    }
}
