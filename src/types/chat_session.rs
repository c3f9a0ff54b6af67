use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Server-issued identifier of a chat session.
pub type SessionId = i64;

/// Title the backend gives a session created without one.
///
/// A session still carrying this title is eligible for the automatic rename
/// from its first user message.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// A chat session as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSessionRecord {
    /// Server-issued session id.
    pub id: SessionId,

    /// Owner of the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,

    /// Display title.
    #[serde(default = "default_title")]
    pub session_name: String,

    /// Creation time.
    #[serde(
        default,
        with = "crate::utils::time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,

    /// Time of the last rename or message.
    #[serde(
        default,
        with = "crate::utils::time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

fn default_title() -> String {
    DEFAULT_SESSION_TITLE.to_string()
}

impl ChatSessionRecord {
    /// Create a record with the placeholder title and no timestamps.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            user_id: None,
            session_name: default_title(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.session_name = title.into();
        self
    }

    /// The display title.
    pub fn title(&self) -> &str {
        &self.session_name
    }

    /// True while the title is still the backend's placeholder.
    pub fn has_default_title(&self) -> bool {
        self.session_name.trim() == DEFAULT_SESSION_TITLE
    }
}

/// Body of `PUT /chat/session/{id}/rename`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenameRequest {
    /// The new title.
    pub new_name: String,
}
