//! Chat persistence gated on sign-in.
//!
//! Every call checks the [`AuthContext`] first.  In guest mode it fails with
//! [`Error::SignInRequired`] and nothing is sent.

use std::sync::Arc;

use futures::future::join_all;

use crate::auth::AuthContext;
use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::observability::STORAGE_GUEST_REFUSALS;
use crate::types::{
    ChatSessionRecord, FileId, FileRecord, MessageRecord, NewMessage, ProcessResponse, SessionId,
};
use crate::upload::LocalFile;

const SAVE_CHAT: &str = "Please sign in to save chat";
const VIEW_HISTORY: &str = "Please sign in to view chat history";
const UPDATE_CHAT: &str = "Please sign in to update chat";
const DELETE_CHAT: &str = "Please sign in to delete chat";

/// Session, message and file persistence for the signed-in user.
pub struct ChatStorage<B: Backend> {
    backend: Arc<B>,
    auth: Arc<AuthContext<B>>,
}

impl<B: Backend> Clone for ChatStorage<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            auth: Arc::clone(&self.auth),
        }
    }
}

impl<B: Backend> ChatStorage<B> {
    /// Storage over `backend`, gated on `auth`.
    pub fn new(backend: Arc<B>, auth: Arc<AuthContext<B>>) -> Self {
        Self { backend, auth }
    }

    /// The auth context this storage checks.
    pub fn auth(&self) -> &Arc<AuthContext<B>> {
        &self.auth
    }

    fn require_user(&self, message: &'static str) -> Result<()> {
        if self.auth.can_save_chat() {
            Ok(())
        } else {
            STORAGE_GUEST_REFUSALS.click();
            Err(Error::sign_in_required(message))
        }
    }

    /// Create a session with `title`.
    pub async fn create_session(&self, title: &str) -> Result<ChatSessionRecord> {
        self.require_user(SAVE_CHAT)?;
        self.backend.create_session(title).await
    }

    /// All of the user's sessions.
    pub async fn list_sessions(&self) -> Result<Vec<ChatSessionRecord>> {
        self.require_user(VIEW_HISTORY)?;
        self.backend.list_sessions().await
    }

    /// One session.
    pub async fn get_session(&self, session_id: SessionId) -> Result<ChatSessionRecord> {
        self.require_user(VIEW_HISTORY)?;
        self.backend.get_session(session_id).await
    }

    /// Messages of a session, oldest first.  A session without messages
    /// yields an empty list.
    pub async fn get_messages(&self, session_id: SessionId) -> Result<Vec<MessageRecord>> {
        self.require_user(VIEW_HISTORY)?;
        match self.backend.get_messages(session_id).await {
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            other => other,
        }
    }

    /// Append a message to a session.
    pub async fn save_message(
        &self,
        session_id: SessionId,
        message: &NewMessage,
    ) -> Result<MessageRecord> {
        self.require_user(SAVE_CHAT)?;
        self.backend.save_message(session_id, message).await
    }

    /// Ask the backend to answer `user_message` from the session's documents.
    pub async fn process_message(
        &self,
        session_id: SessionId,
        user_message: &str,
    ) -> Result<ProcessResponse> {
        self.require_user(SAVE_CHAT)?;
        self.backend.process_message(session_id, user_message).await
    }

    /// Set a session's title.
    pub async fn rename_session(
        &self,
        session_id: SessionId,
        new_name: &str,
    ) -> Result<ChatSessionRecord> {
        self.require_user(UPDATE_CHAT)?;
        self.backend.rename_session(session_id, new_name).await
    }

    /// Set a session's title unless it has already been changed.
    pub async fn rename_if_default(
        &self,
        session_id: SessionId,
        new_name: &str,
    ) -> Result<Option<ChatSessionRecord>> {
        self.require_user(UPDATE_CHAT)?;
        self.backend.rename_if_default(session_id, new_name).await
    }

    /// Delete a session with its messages and files.
    pub async fn delete_session(&self, session_id: SessionId) -> Result<bool> {
        self.require_user(DELETE_CHAT)?;
        self.backend.delete_session(session_id).await
    }

    /// Upload a document into a session.
    pub async fn upload_file(&self, session_id: SessionId, file: &LocalFile) -> Result<FileRecord> {
        self.require_user(SAVE_CHAT)?;
        self.backend.upload_file(session_id, file).await
    }

    /// Files attached to a session, in attachment order.
    ///
    /// Links whose file can no longer be fetched are skipped.
    pub async fn list_files(&self, session_id: SessionId) -> Result<Vec<FileRecord>> {
        self.require_user(VIEW_HISTORY)?;
        let links = match self.backend.list_session_files(session_id).await {
            Ok(links) => links,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let lookups = links
            .iter()
            .map(|link| self.backend.get_file(link.file_id));
        let mut files = Vec::with_capacity(links.len());
        for (link, result) in links.iter().zip(join_all(lookups).await) {
            match result {
                Ok(file) => files.push(file),
                Err(err) => {
                    tracing::warn!(file_id = link.file_id, error = %err, "skipping unreadable file");
                }
            }
        }
        Ok(files)
    }

    /// One file.
    pub async fn get_file(&self, file_id: FileId) -> Result<FileRecord> {
        self.require_user(VIEW_HISTORY)?;
        self.backend.get_file(file_id).await
    }

    /// Delete a file.
    pub async fn delete_file(&self, file_id: FileId) -> Result<bool> {
        self.require_user(DELETE_CHAT)?;
        self.backend.delete_file(file_id).await
    }
}
