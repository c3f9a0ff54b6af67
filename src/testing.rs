//! An in-memory [`Backend`] for unit tests.
//!
//! It mirrors the REST backend's observable behavior: 404 for empty message
//! and file lists, `New Chat` as the default title, and the bot answer stored
//! by `process`.  Every call is recorded by name.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{
    AuthResponse, ChatSessionRecord, Credentials, FileId, FileRecord, MessageRecord, NewMessage,
    ProcessResponse, ResetPasswordRequest, Sender, SessionFileLink, SessionId, User,
    VerifyEmailRequest,
};
use crate::upload::LocalFile;

#[derive(Default)]
struct State {
    signed_in: bool,
    next_id: i64,
    sessions: Vec<ChatSessionRecord>,
    messages: HashMap<SessionId, Vec<MessageRecord>>,
    files: HashMap<FileId, FileRecord>,
    links: Vec<SessionFileLink>,
    calls: Vec<String>,
    fail_logout: bool,
    fail_uploads: bool,
    fail_process: bool,
    fail_save: bool,
    fail_get_session: bool,
    keep_files: bool,
}

pub(crate) struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                ..State::default()
            }),
        }
    }

    pub(crate) fn signed_in() -> Self {
        let backend = Self::new();
        backend.lock().signed_in = true;
        backend
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: &str) -> std::sync::MutexGuard<'_, State> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        state
    }

    fn user() -> User {
        User::new(1, "ada@example.com")
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub(crate) fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub(crate) fn fail_logout(&self) {
        self.lock().fail_logout = true;
    }

    pub(crate) fn fail_uploads(&self) {
        self.lock().fail_uploads = true;
    }

    pub(crate) fn fail_process(&self) {
        self.lock().fail_process = true;
    }

    pub(crate) fn fail_save(&self) {
        self.lock().fail_save = true;
    }

    pub(crate) fn fail_get_session(&self) {
        self.lock().fail_get_session = true;
    }

    /// File deletions answer `false` and leave the file in place.
    pub(crate) fn keep_files(&self) {
        self.lock().keep_files = true;
    }

    pub(crate) fn insert_session(&self, title: &str) -> ChatSessionRecord {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let session = ChatSessionRecord::new(id).with_title(title);
        state.sessions.push(session.clone());
        session
    }

    pub(crate) fn session_ids(&self) -> Vec<SessionId> {
        self.lock().sessions.iter().map(|s| s.id).collect()
    }

    pub(crate) fn title_of(&self, session_id: SessionId) -> Option<String> {
        self.lock()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .map(|s| s.session_name.clone())
    }

    pub(crate) fn stored_messages(&self, session_id: SessionId) -> Vec<(Sender, String)> {
        self.lock()
            .messages
            .get(&session_id)
            .map(|messages| {
                messages
                    .iter()
                    .map(|m| (m.role, m.message.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn session_not_found() -> Error {
    Error::not_found("Chat session not found", None, None)
}

#[async_trait::async_trait]
impl Backend for FakeBackend {
    async fn register(&self, credentials: &Credentials) -> Result<AuthResponse> {
        self.record("register");
        Ok(AuthResponse {
            success: true,
            message: Some("Registration successful".to_string()),
            email: Some(credentials.email.clone()),
            ..AuthResponse::default()
        })
    }

    async fn login(&self, _: &Credentials) -> Result<AuthResponse> {
        let mut state = self.record("login");
        state.signed_in = true;
        Ok(AuthResponse {
            success: true,
            user: Some(Self::user()),
            ..AuthResponse::default()
        })
    }

    async fn logout(&self) -> Result<AuthResponse> {
        let mut state = self.record("logout");
        state.signed_in = false;
        if state.fail_logout {
            return Err(Error::internal_server("Logout failed"));
        }
        Ok(AuthResponse {
            success: true,
            ..AuthResponse::default()
        })
    }

    async fn refresh_token(&self) -> Result<AuthResponse> {
        self.record("refresh_token");
        Ok(AuthResponse::default())
    }

    async fn forgot_password(&self, _: &str) -> Result<AuthResponse> {
        self.record("forgot_password");
        Ok(AuthResponse::default())
    }

    async fn reset_password(&self, _: &ResetPasswordRequest) -> Result<AuthResponse> {
        self.record("reset_password");
        Ok(AuthResponse::default())
    }

    async fn verify_email(&self, _: &VerifyEmailRequest) -> Result<AuthResponse> {
        let mut state = self.record("verify_email");
        state.signed_in = true;
        Ok(AuthResponse {
            success: true,
            user: Some(Self::user()),
            ..AuthResponse::default()
        })
    }

    async fn resend_verification(&self, _: &str) -> Result<AuthResponse> {
        self.record("resend_verification");
        Ok(AuthResponse::default())
    }

    async fn profile(&self) -> Result<AuthResponse> {
        let state = self.record("profile");
        if !state.signed_in {
            return Err(Error::authentication("Not authenticated"));
        }
        Ok(AuthResponse {
            success: true,
            user: Some(Self::user()),
            ..AuthResponse::default()
        })
    }

    async fn create_session(&self, title: &str) -> Result<ChatSessionRecord> {
        self.record("create_session");
        // Let a concurrent caller run between the request and its answer.
        tokio::task::yield_now().await;
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let title = if title.trim().is_empty() {
            crate::types::DEFAULT_SESSION_TITLE
        } else {
            title
        };
        let session = ChatSessionRecord::new(id).with_title(title);
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn list_sessions(&self) -> Result<Vec<ChatSessionRecord>> {
        let state = self.record("list_sessions");
        Ok(state.sessions.clone())
    }

    async fn get_session(&self, session_id: SessionId) -> Result<ChatSessionRecord> {
        let state = self.record("get_session");
        if state.fail_get_session {
            return Err(Error::service_unavailable("Service unavailable", None));
        }
        state
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(session_not_found)
    }

    async fn get_messages(&self, session_id: SessionId) -> Result<Vec<MessageRecord>> {
        let state = self.record("get_messages");
        match state.messages.get(&session_id) {
            Some(messages) if !messages.is_empty() => Ok(messages.clone()),
            _ => Err(Error::not_found("No messages found", None, None)),
        }
    }

    async fn save_message(
        &self,
        session_id: SessionId,
        message: &NewMessage,
    ) -> Result<MessageRecord> {
        let mut state = self.record("save_message");
        if state.fail_save {
            return Err(Error::internal_server("Failed to save message"));
        }
        if !state.sessions.iter().any(|s| s.id == session_id) {
            return Err(session_not_found());
        }
        let record = MessageRecord {
            id: Some(state.next_id),
            session_id: Some(session_id),
            role: message.role,
            message: message.content.clone(),
            created_at: None,
        };
        state.next_id += 1;
        state
            .messages
            .entry(session_id)
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn upload_file(&self, session_id: SessionId, file: &LocalFile) -> Result<FileRecord> {
        self.record("upload_file");
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if state.fail_uploads {
            return Err(Error::internal_server("Upload failed"));
        }
        if !state.sessions.iter().any(|s| s.id == session_id) {
            return Err(session_not_found());
        }
        let id = state.next_id;
        state.next_id += 1;
        let record = FileRecord {
            id,
            user_id: Some(1),
            filename: file.name().to_string(),
            file_url: Some(format!("https://files.example.com/{id}")),
            file_type: Some(file.mime_type().to_string()),
            file_size: Some(file.size()),
        };
        state.files.insert(id, record.clone());
        state.links.push(SessionFileLink {
            session_id,
            file_id: id,
            created_at: None,
        });
        Ok(record)
    }

    async fn process_message(
        &self,
        session_id: SessionId,
        user_message: &str,
    ) -> Result<ProcessResponse> {
        self.record("process_message");
        tokio::task::yield_now().await;
        let mut state = self.lock();
        if state.fail_process {
            return Err(Error::internal_server("Error processing message"));
        }
        let answer = format!("Answer to: {user_message}");
        let id = state.next_id;
        state.next_id += 1;
        state
            .messages
            .entry(session_id)
            .or_default()
            .push(MessageRecord {
                id: Some(id),
                session_id: Some(session_id),
                role: Sender::Bot,
                message: answer.clone(),
                created_at: None,
            });
        Ok(ProcessResponse {
            session_id: Some(session_id),
            user_message: Some(user_message.to_string()),
            answer,
        })
    }

    async fn rename_session(
        &self,
        session_id: SessionId,
        new_name: &str,
    ) -> Result<ChatSessionRecord> {
        let mut state = self.record("rename_session");
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(session_not_found)?;
        session.session_name = new_name.to_string();
        Ok(session.clone())
    }

    async fn delete_session(&self, session_id: SessionId) -> Result<bool> {
        let mut state = self.record("delete_session");
        let before = state.sessions.len();
        state.sessions.retain(|s| s.id != session_id);
        state.messages.remove(&session_id);
        state.links.retain(|l| l.session_id != session_id);
        Ok(state.sessions.len() != before)
    }

    async fn list_session_files(&self, session_id: SessionId) -> Result<Vec<SessionFileLink>> {
        let state = self.record("list_session_files");
        let links: Vec<_> = state
            .links
            .iter()
            .filter(|l| l.session_id == session_id)
            .cloned()
            .collect();
        if links.is_empty() {
            return Err(Error::not_found("No files found", None, None));
        }
        Ok(links)
    }

    async fn get_file(&self, file_id: FileId) -> Result<FileRecord> {
        let state = self.record("get_file");
        state
            .files
            .get(&file_id)
            .cloned()
            .ok_or_else(|| Error::not_found("File not found", None, None))
    }

    async fn delete_file(&self, file_id: FileId) -> Result<bool> {
        let mut state = self.record("delete_file");
        if state.keep_files {
            return Ok(false);
        }
        let removed = state.files.remove(&file_id).is_some();
        state.links.retain(|l| l.file_id != file_id);
        Ok(removed)
    }
}
