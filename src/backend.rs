//! The set of backend operations the rest of the crate depends on.
//!
//! [`ApiClient`](crate::ApiClient) implements this over HTTP.  Storage, auth
//! and the controller are generic over it so they can run against any
//! implementation, including an in-memory one.

use crate::error::Result;
use crate::types::{
    AuthResponse, ChatSessionRecord, Credentials, FileId, FileRecord, MessageRecord, NewMessage,
    ProcessResponse, ResetPasswordRequest, SessionFileLink, SessionId, VerifyEmailRequest,
};
use crate::upload::LocalFile;

/// Operations offered by the document-chat backend.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// `POST /user/register`
    async fn register(&self, credentials: &Credentials) -> Result<AuthResponse>;

    /// `POST /user/login`
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse>;

    /// `POST /user/logout`
    async fn logout(&self) -> Result<AuthResponse>;

    /// `POST /user/refresh-token`
    async fn refresh_token(&self) -> Result<AuthResponse>;

    /// `POST /user/forgot-password`
    async fn forgot_password(&self, email: &str) -> Result<AuthResponse>;

    /// `POST /user/reset-password`
    async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<AuthResponse>;

    /// `POST /user/verify`
    async fn verify_email(&self, request: &VerifyEmailRequest) -> Result<AuthResponse>;

    /// `POST /user/resend-verification`
    async fn resend_verification(&self, email: &str) -> Result<AuthResponse>;

    /// `GET /user/profile`
    async fn profile(&self) -> Result<AuthResponse>;

    /// `POST /chat/create?title=`
    async fn create_session(&self, title: &str) -> Result<ChatSessionRecord>;

    /// `GET /chat/user/`
    async fn list_sessions(&self) -> Result<Vec<ChatSessionRecord>>;

    /// `GET /chat/session/{id}`
    async fn get_session(&self, session_id: SessionId) -> Result<ChatSessionRecord>;

    /// `GET /chat/session/{id}/messages`
    async fn get_messages(&self, session_id: SessionId) -> Result<Vec<MessageRecord>>;

    /// `POST /chat/session/{id}/messages`
    async fn save_message(
        &self,
        session_id: SessionId,
        message: &NewMessage,
    ) -> Result<MessageRecord>;

    /// `POST /chat/session/{id}/upload`
    async fn upload_file(&self, session_id: SessionId, file: &LocalFile) -> Result<FileRecord>;

    /// `POST /chat/session/{id}/process`
    async fn process_message(
        &self,
        session_id: SessionId,
        user_message: &str,
    ) -> Result<ProcessResponse>;

    /// `PUT /chat/session/{id}/rename`
    async fn rename_session(
        &self,
        session_id: SessionId,
        new_name: &str,
    ) -> Result<ChatSessionRecord>;

    /// Rename only while the session still has the placeholder title.
    ///
    /// Returns the renamed session, or `None` when the title had already been
    /// changed.  Backends with a conditional update should override this; the
    /// provided body reads then writes and can lose a race with a concurrent
    /// rename.
    async fn rename_if_default(
        &self,
        session_id: SessionId,
        new_name: &str,
    ) -> Result<Option<ChatSessionRecord>> {
        let session = self.get_session(session_id).await?;
        if !session.has_default_title() {
            return Ok(None);
        }
        self.rename_session(session_id, new_name).await.map(Some)
    }

    /// `DELETE /chat/session/{id}`
    async fn delete_session(&self, session_id: SessionId) -> Result<bool>;

    /// `GET /chat/session/{id}/files`
    async fn list_session_files(&self, session_id: SessionId) -> Result<Vec<SessionFileLink>>;

    /// `GET /chat/file/{id}`
    async fn get_file(&self, file_id: FileId) -> Result<FileRecord>;

    /// `DELETE /chat/file/{id}`
    async fn delete_file(&self, file_id: FileId) -> Result<bool>;
}
