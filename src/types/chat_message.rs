use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::SessionId;

/// Who wrote a message.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The person at the keyboard.
    User,
    /// The document assistant.
    #[serde(alias = "assistant")]
    Bot,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Bot => write!(f, "bot"),
        }
    }
}

/// A message in the client's ordered, in-memory list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Author of the message.
    pub sender: Sender,

    /// Message body.
    pub text: String,

    /// Client-side timestamp.
    #[serde(with = "crate::utils::time")]
    pub at: OffsetDateTime,
}

impl ChatMessage {
    /// A message from the user, stamped now.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    /// A message from the assistant, stamped now.
    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text)
    }

    /// A message from `sender`, stamped now.
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            at: OffsetDateTime::now_utc(),
        }
    }
}

impl From<MessageRecord> for ChatMessage {
    fn from(record: MessageRecord) -> Self {
        Self {
            sender: record.role,
            text: record.message,
            at: record.created_at.unwrap_or_else(OffsetDateTime::now_utc),
        }
    }
}

/// A message as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    /// Server-issued message id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Owning session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// Author.
    pub role: Sender,

    /// Body.
    pub message: String,

    /// Server-side creation time.
    #[serde(
        default,
        with = "crate::utils::time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

/// Body of `POST /chat/session/{id}/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMessage {
    /// Author.
    pub role: Sender,
    /// Body.
    pub content: String,
}

impl NewMessage {
    /// Build the persistence request for an in-memory message.
    pub fn from_chat(message: &ChatMessage) -> Self {
        Self {
            role: message.sender,
            content: message.text.clone(),
        }
    }
}

/// Body of `POST /chat/session/{id}/process`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessRequest {
    /// The question to answer from the session's documents.
    pub user_message: String,
}

/// Answer returned by `POST /chat/session/{id}/process`.
///
/// The backend stores the answer as a bot message itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessResponse {
    /// Session the answer belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    /// Echo of the question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,

    /// The generated answer.
    pub answer: String,
}
