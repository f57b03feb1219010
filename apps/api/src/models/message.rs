use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed fragment of a message. Only text is consumed; other kinds are
/// accepted from the client and dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    #[serde(other)]
    Unsupported,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub role: String,
    pub parts: Json<Vec<MessagePart>>,
    pub attachments: Json<Vec<Attachment>>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn text(&self) -> String {
        join_text(&self.parts)
    }
}

/// A message ready to be appended to a project's log.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

impl NewMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::now(Role::User, vec![MessagePart::text(text)], Vec::new())
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::now(Role::Assistant, vec![MessagePart::text(text)], Vec::new())
    }

    pub fn now(role: Role, parts: Vec<MessagePart>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            parts,
            attachments,
            created_at: Utc::now(),
        }
    }
}

/// A conversation message as submitted by the chat client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    #[serde(default, alias = "experimental_attachments")]
    pub attachments: Vec<Attachment>,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: None,
            role,
            content: text.clone(),
            parts: vec![MessagePart::text(text)],
            attachments: Vec::new(),
        }
    }

    /// Text of the message, preferring parts over the flat `content` field.
    pub fn text(&self) -> String {
        let from_parts = join_text(&self.parts);
        if from_parts.is_empty() {
            self.content.clone()
        } else {
            from_parts
        }
    }

    /// Parts to persist. Falls back to `content` when the client sent none.
    pub fn persisted_parts(&self) -> Vec<MessagePart> {
        let parts: Vec<MessagePart> = self
            .parts
            .iter()
            .filter(|p| matches!(p, MessagePart::Text { .. }))
            .cloned()
            .collect();
        if parts.is_empty() {
            vec![MessagePart::text(self.content.clone())]
        } else {
            parts
        }
    }
}

fn join_text(parts: &[MessagePart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            MessagePart::Text { text } => Some(text.as_str()),
            MessagePart::Unsupported => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The newest message sent by the user, if any.
pub fn latest_user_message(messages: &[ChatMessage]) -> Option<&ChatMessage> {
    messages.iter().rev().find(|m| m.role == Role::User)
}
