// Public modules
pub mod auth_payloads;
pub mod chat_message;
pub mod chat_session;
pub mod file_record;
pub mod user;

// Re-exports
pub use auth_payloads::{
    AuthResponse, Credentials, EmailRequest, HealthStatus, RefreshTokenRequest,
    ResetPasswordRequest, VerifyEmailRequest,
};
pub use chat_message::{
    ChatMessage, MessageRecord, NewMessage, ProcessRequest, ProcessResponse, Sender,
};
pub use chat_session::{ChatSessionRecord, DEFAULT_SESSION_TITLE, RenameRequest, SessionId};
pub use file_record::{FileId, FileRecord, SessionFileLink, UploadResponse};
pub use user::User;
