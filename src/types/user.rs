use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Server-issued user id.
    pub id: i64,

    /// Login email.
    pub email: String,

    /// Uploaded avatar, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl User {
    /// Create a user without an avatar.
    pub fn new(id: i64, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            avatar_url: None,
        }
    }

    /// The avatar to show: the uploaded one, else a Gravatar identicon.
    ///
    /// Returns `None` only when there is neither an avatar nor an email.
    pub fn avatar(&self) -> Option<String> {
        if let Some(url) = self.avatar_url.as_deref().filter(|url| !url.is_empty()) {
            return Some(url.to_string());
        }
        let email = self.email.trim().to_lowercase();
        if email.is_empty() {
            return None;
        }
        let digest = hex::encode(Sha256::digest(email.as_bytes()));
        Some(format!("https://www.gravatar.com/avatar/{digest}?d=identicon"))
    }
}
