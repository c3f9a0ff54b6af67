use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::SessionId;

/// Server-issued identifier of an uploaded file.
pub type FileId = i64;

/// An uploaded file as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    /// Server-issued file id.
    pub id: FileId,

    /// Owner of the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,

    /// Original file name.
    pub filename: String,

    /// Public URL of the stored object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,

    /// MIME type reported at upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,

    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// Row linking a file to the session it was uploaded into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionFileLink {
    /// The session.
    pub session_id: SessionId,

    /// The file.
    pub file_id: FileId,

    /// When the file was attached.
    #[serde(
        default,
        with = "crate::utils::time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

/// Response of `POST /chat/session/{id}/upload`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    /// Id of the new file record.
    pub id: FileId,

    /// The inserted rows, when the backend echoes them.
    #[serde(default)]
    pub db_response: Vec<FileRecord>,
}

impl UploadResponse {
    /// The stored record, or one assembled from what we sent when the backend
    /// did not echo it.
    pub fn into_record(self, filename: &str, mime_type: &str, size: u64) -> FileRecord {
        let id = self.id;
        self.db_response
            .into_iter()
            .find(|record| record.id == id)
            .unwrap_or_else(|| FileRecord {
                id,
                user_id: None,
                filename: filename.to_string(),
                file_url: None,
                file_type: Some(mime_type.to_string()),
                file_size: Some(size),
            })
    }
}
