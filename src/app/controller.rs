//! The chat session lifecycle.
//!
//! A [`DocChat`] owns the active session, its message list and its file
//! list.  A session moves from no-session to session-without-files (asking is
//! disabled) to session-with-files (asking is enabled), and back to
//! without-files when its last file is deleted.
//!
//! Methods take `&self`.  State sits behind a mutex that is never held across
//! an await; a method that suspends re-reads the active session afterwards so
//! that a completion for a session the user has left does not touch the
//! current one.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;
use time::OffsetDateTime;

use crate::auth::AuthContext;
use crate::background::BackgroundTasks;
use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::local_state::{LAST_CHAT_ID_KEY, LocalStore, Theme};
use crate::observability::{
    ANSWER_DURATION, MESSAGES_SENT, SESSIONS_AUTO_RENAMED, SESSIONS_CREATED, UPLOAD_BYTES,
    UPLOADS_FAILED, UPLOADS_REJECTED,
};
use crate::storage::ChatStorage;
use crate::types::{
    ChatMessage, ChatSessionRecord, DEFAULT_SESSION_TITLE, FileId, FileRecord, NewMessage, Sender,
    SessionId, User,
};
use crate::upload::{self, LocalFile};

/// Bot message opening a freshly created chat.
pub const GREETING: &str = "Hi! Upload a document, then ask me anything about it.";

/// Longest title derived from a first message, in characters.
pub const MAX_AUTO_TITLE_CHARS: usize = 60;

/// Where the controller is in the session lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No session is active.
    NoSession,
    /// A session is active but has no documents; asking is disabled.
    WithoutFiles,
    /// A session with at least one document; asking is enabled.
    WithFiles,
}

/// Outcome of [`DocChat::upload_files`].
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Files stored by the backend.
    pub uploaded: Vec<FileRecord>,
    /// Files refused locally, never sent.
    pub rejected: Vec<Error>,
    /// Files the backend failed to store, by name.
    pub failed: Vec<(String, Error)>,
    /// Why no chat could be created to hold the accepted files.  When set,
    /// nothing was uploaded.
    pub session_error: Option<Error>,
}

#[derive(Serialize)]
struct Transcript<'a> {
    session_id: Option<SessionId>,
    title: Option<&'a str>,
    #[serde(with = "crate::utils::time")]
    exported_at: OffsetDateTime,
    messages: &'a [ChatMessage],
}

#[derive(Default)]
struct ControllerState {
    session: Option<ChatSessionRecord>,
    messages: Vec<ChatMessage>,
    files: Vec<FileRecord>,
    sessions: Vec<ChatSessionRecord>,
    auto_renamed: HashSet<SessionId>,
    theme: Theme,
}

impl ControllerState {
    fn active_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    fn is_active(&self, session_id: SessionId) -> bool {
        self.active_id() == Some(session_id)
    }

    fn activate(
        &mut self,
        session: ChatSessionRecord,
        messages: Vec<ChatMessage>,
        files: Vec<FileRecord>,
    ) {
        if let Some(known) = self.sessions.iter_mut().find(|s| s.id == session.id) {
            *known = session.clone();
        } else {
            self.sessions.insert(0, session.clone());
        }
        self.session = Some(session);
        self.messages = messages;
        self.files = files;
    }

    fn clear(&mut self) {
        self.session = None;
        self.messages.clear();
        self.files.clear();
    }

    fn update_title(&mut self, renamed: &ChatSessionRecord) {
        if let Some(session) = self.session.as_mut().filter(|s| s.id == renamed.id) {
            session.session_name = renamed.session_name.clone();
        }
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == renamed.id) {
            session.session_name = renamed.session_name.clone();
        }
    }
}

/// Clears an in-flight flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The document-chat application.
pub struct DocChat<B: Backend + 'static> {
    auth: Arc<AuthContext<B>>,
    storage: ChatStorage<B>,
    store: Arc<dyn LocalStore>,
    background: BackgroundTasks,
    state: Arc<Mutex<ControllerState>>,
    creating: AtomicBool,
    sending: AtomicBool,
}

impl<B: Backend + 'static> DocChat<B> {
    /// A controller over `backend`, persisting local state to `store`.
    pub fn new(backend: Arc<B>, store: Arc<dyn LocalStore>) -> Self {
        let auth = Arc::new(AuthContext::new(Arc::clone(&backend)));
        Self::with_auth(backend, auth, store)
    }

    /// A controller sharing an existing auth context.
    pub fn with_auth(
        backend: Arc<B>,
        auth: Arc<AuthContext<B>>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        let storage = ChatStorage::new(backend, Arc::clone(&auth));
        let state = ControllerState {
            theme: store.theme(),
            ..ControllerState::default()
        };
        Self {
            auth,
            storage,
            store,
            background: BackgroundTasks::new(),
            state: Arc::new(Mutex::new(state)),
            creating: AtomicBool::new(false),
            sending: AtomicBool::new(false),
        }
    }

    /// The auth context.
    pub fn auth(&self) -> &Arc<AuthContext<B>> {
        &self.auth
    }

    /// The storage adapter.
    pub fn storage(&self) -> &ChatStorage<B> {
        &self.storage
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        lock_state(&self.state)
    }

    /// Start up: restore the user, then the last open chat.
    ///
    /// Without a stored chat and with no chats at all, one empty chat is
    /// created and made current without a greeting.
    pub async fn load(&self) -> Result<SessionState> {
        if !self.auth.init().await {
            tracing::info!("starting in guest mode");
            let mut state = self.lock();
            state.clear();
            state.sessions.clear();
            state.auto_renamed.clear();
            return Ok(SessionState::NoSession);
        }

        if let Some(session_id) = self.store.last_chat_id() {
            match self.storage.get_session(session_id).await {
                Ok(session) => {
                    self.open(session).await?;
                    self.refresh_sessions().await;
                    return Ok(self.state());
                }
                Err(err) if err.is_not_found() => {
                    tracing::info!(session_id, error = %err, "last chat is gone");
                    if let Err(err) = self.store.remove(LAST_CHAT_ID_KEY) {
                        tracing::warn!(error = %err, "cannot forget last chat");
                    }
                }
                Err(err) => {
                    tracing::warn!(session_id, error = %err, "cannot restore last chat");
                    return Err(err);
                }
            }
        }

        let sessions = self.storage.list_sessions().await?;
        if sessions.is_empty() {
            let session = self.storage.create_session(DEFAULT_SESSION_TITLE).await?;
            SESSIONS_CREATED.click();
            tracing::info!(session_id = session.id, "created first chat");
            let session_id = session.id;
            self.lock().activate(session, Vec::new(), Vec::new());
            self.remember(session_id);
        } else {
            let mut state = self.lock();
            state.clear();
            state.sessions = sessions;
        }
        Ok(self.state())
    }

    /// Log in, then load the user's chats.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let user = self.auth.sign_in(email, password).await?;
        self.load().await?;
        Ok(user)
    }

    /// Log out and forget the active chat.
    pub async fn sign_out(&self) -> Result<()> {
        let outcome = self.auth.sign_out().await;
        {
            let mut state = self.lock();
            state.clear();
            state.sessions.clear();
            state.auto_renamed.clear();
        }
        outcome
    }

    /// Create a new chat and make it current.
    ///
    /// Returns `None` without doing anything when another creation is
    /// already running.
    pub async fn new_chat(&self) -> Result<Option<SessionId>> {
        let Some(_in_flight) = InFlight::acquire(&self.creating) else {
            tracing::debug!("new chat already in progress");
            return Ok(None);
        };
        let session = self.storage.create_session(DEFAULT_SESSION_TITLE).await?;
        SESSIONS_CREATED.click();
        let session_id = session.id;
        tracing::info!(session_id, "new chat");

        let mut messages: Vec<ChatMessage> = self
            .storage
            .get_messages(session_id)
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(session_id, error = %err, "cannot load messages");
                Vec::new()
            })
            .into_iter()
            .map(ChatMessage::from)
            .collect();
        if messages.is_empty() {
            messages.push(ChatMessage::bot(GREETING));
        }
        let files = self
            .storage
            .list_files(session_id)
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(session_id, error = %err, "cannot load files");
                Vec::new()
            });

        self.lock().activate(session, messages, files);
        self.remember(session_id);
        Ok(Some(session_id))
    }

    /// Make an existing chat current, loading its messages and files.
    pub async fn switch_session(&self, session_id: SessionId) -> Result<()> {
        let session = self.storage.get_session(session_id).await?;
        self.open(session).await
    }

    async fn open(&self, session: ChatSessionRecord) -> Result<()> {
        let session_id = session.id;
        let (messages, files) = tokio::join!(
            self.storage.get_messages(session_id),
            self.storage.list_files(session_id)
        );
        let messages = messages?.into_iter().map(ChatMessage::from).collect();
        let files = files?;
        self.lock().activate(session, messages, files);
        self.remember(session_id);
        tracing::info!(session_id, "opened chat");
        Ok(())
    }

    /// Validate and upload documents into the current chat.
    ///
    /// Files failing the type or size checks are reported and never sent.  A
    /// chat is created first when none is current; if that fails the report
    /// carries the error alongside the refused files.
    pub async fn upload_files(&self, files: Vec<LocalFile>) -> Result<UploadReport> {
        let (accepted, rejected) = upload::partition(files);
        for err in &rejected {
            UPLOADS_REJECTED.click();
            tracing::info!(error = %err, "file refused");
        }
        let mut report = UploadReport {
            rejected,
            ..UploadReport::default()
        };
        if accepted.is_empty() {
            return Ok(report);
        }

        let current = self.lock().active_id();
        let session_id = match current {
            Some(session_id) => session_id,
            None => {
                let session = match self.storage.create_session(DEFAULT_SESSION_TITLE).await {
                    Ok(session) => session,
                    Err(err) => {
                        tracing::warn!(error = %err, "cannot create chat for upload");
                        report.session_error = Some(err);
                        return Ok(report);
                    }
                };
                SESSIONS_CREATED.click();
                let session_id = session.id;
                tracing::info!(session_id, "created chat for upload");
                self.lock().activate(session, Vec::new(), Vec::new());
                self.remember(session_id);
                session_id
            }
        };

        for file in accepted {
            match self.storage.upload_file(session_id, &file).await {
                Ok(record) => {
                    UPLOAD_BYTES.count(file.size());
                    tracing::info!(session_id, file_id = record.id, name = file.name(), "uploaded");
                    let mut state = self.lock();
                    if state.is_active(session_id) {
                        state.files.push(record.clone());
                    } else {
                        tracing::debug!(session_id, "upload finished for inactive chat");
                    }
                    report.uploaded.push(record);
                }
                Err(err) => {
                    UPLOADS_FAILED.click();
                    tracing::warn!(session_id, name = file.name(), error = %err, "upload failed");
                    let notice = format!("Failed to upload \"{}\": {}", file.name(), err.message());
                    let mut state = self.lock();
                    if state.is_active(session_id) {
                        state.messages.push(ChatMessage::bot(notice));
                    }
                    report.failed.push((file.name().to_string(), err));
                }
            }
        }

        if !report.uploaded.is_empty() {
            let confirmation = {
                let mut state = self.lock();
                if state.is_active(session_id) {
                    let message = ChatMessage::bot(upload_confirmation(state.files.len()));
                    state.messages.push(message.clone());
                    Some(message)
                } else {
                    None
                }
            };
            if let Some(message) = confirmation {
                self.persist_in_background(session_id, &message);
            }
        }
        Ok(report)
    }

    /// Ask a question about the current chat's documents.
    ///
    /// Returns the bot's reply.  A failed answer becomes a bot notice rather
    /// than an error; only the local preconditions produce errors, and those
    /// are raised before anything is sent.
    pub async fn send_message(&self, text: &str) -> Result<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation(
                "Message is empty",
                Some("message".to_string()),
            ));
        }
        let (session_id, first_question) = {
            let state = self.lock();
            let Some(session_id) = state.active_id() else {
                return Err(Error::validation(
                    "Start a chat before sending a message",
                    Some("session".to_string()),
                ));
            };
            if state.files.is_empty() {
                return Err(Error::validation(
                    "Upload a document before asking questions",
                    Some("files".to_string()),
                ));
            }
            let first = !state.messages.iter().any(|m| m.sender == Sender::User);
            (session_id, first)
        };
        let Some(_in_flight) = InFlight::acquire(&self.sending) else {
            return Err(Error::validation(
                "A message is already being sent",
                Some("message".to_string()),
            ));
        };
        MESSAGES_SENT.click();

        let question = ChatMessage::user(text);
        self.push_if_active(session_id, question.clone());
        if let Err(err) = self
            .storage
            .save_message(session_id, &NewMessage::from_chat(&question))
            .await
        {
            tracing::warn!(session_id, error = %err, "cannot save question");
        }

        if first_question && self.lock().auto_renamed.insert(session_id) {
            self.schedule_auto_rename(session_id, text);
        }

        let start = Instant::now();
        let reply = match self.storage.process_message(session_id, text).await {
            Ok(response) => {
                ANSWER_DURATION.add(start.elapsed().as_secs_f64());
                ChatMessage::bot(response.answer)
            }
            Err(err) => {
                tracing::warn!(session_id, error = %err, "cannot answer");
                ChatMessage::bot(format!(
                    "Sorry, I couldn't process your message: {}",
                    err.message()
                ))
            }
        };
        self.push_if_active(session_id, reply.clone());
        Ok(reply)
    }

    fn schedule_auto_rename(&self, session_id: SessionId, text: &str) {
        let title = title_from_message(text);
        let storage = self.storage.clone();
        let state = Arc::clone(&self.state);
        self.background.spawn("auto-rename", async move {
            if let Some(renamed) = storage.rename_if_default(session_id, &title).await? {
                SESSIONS_AUTO_RENAMED.click();
                tracing::info!(session_id, title = %renamed.session_name, "chat titled");
                lock_state(&state).update_title(&renamed);
            }
            Ok(())
        });
    }

    fn persist_in_background(&self, session_id: SessionId, message: &ChatMessage) {
        let storage = self.storage.clone();
        let body = NewMessage::from_chat(message);
        self.background.spawn("save-message", async move {
            storage.save_message(session_id, &body).await.map(|_| ())
        });
    }

    fn push_if_active(&self, session_id: SessionId, message: ChatMessage) {
        let mut state = self.lock();
        if state.is_active(session_id) {
            state.messages.push(message);
        }
    }

    /// Retitle a chat.
    pub async fn rename_session(&self, session_id: SessionId, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::validation(
                "Chat title cannot be empty",
                Some("title".to_string()),
            ));
        }
        let renamed = self.storage.rename_session(session_id, title).await?;
        let mut state = self.lock();
        state.auto_renamed.insert(session_id);
        state.update_title(&renamed);
        Ok(())
    }

    /// Delete a chat.
    ///
    /// Deleting the current chat replaces it with exactly one new chat.
    pub async fn delete_session(&self, session_id: SessionId) -> Result<()> {
        if !self.storage.delete_session(session_id).await? {
            return Err(Error::not_found(
                "Chat session not found",
                Some("session".to_string()),
                Some(session_id.to_string()),
            ));
        }
        tracing::info!(session_id, "deleted chat");
        let was_active = {
            let mut state = self.lock();
            state.sessions.retain(|s| s.id != session_id);
            state.auto_renamed.remove(&session_id);
            let was_active = state.is_active(session_id);
            if was_active {
                state.clear();
            }
            was_active
        };
        if was_active {
            if let Err(err) = self.store.remove(LAST_CHAT_ID_KEY) {
                tracing::warn!(error = %err, "cannot forget last chat");
            }
            self.new_chat().await?;
        } else {
            self.refresh_sessions().await;
        }
        Ok(())
    }

    /// Delete a document from the current chat.
    pub async fn delete_file(&self, file_id: FileId) -> Result<SessionState> {
        let attached = self.lock().files.iter().any(|f| f.id == file_id);
        if !attached {
            return Err(Error::not_found(
                "File is not attached to this chat",
                Some("file".to_string()),
                Some(file_id.to_string()),
            ));
        }
        if !self.storage.delete_file(file_id).await? {
            return Err(Error::not_found(
                "File not found",
                Some("file".to_string()),
                Some(file_id.to_string()),
            ));
        }
        self.lock().files.retain(|f| f.id != file_id);
        let state = self.state();
        if state == SessionState::WithoutFiles {
            tracing::info!("last document removed");
        }
        Ok(state)
    }

    /// Fetch the user's chats.
    pub async fn list_sessions(&self) -> Result<Vec<ChatSessionRecord>> {
        let sessions = self.storage.list_sessions().await?;
        self.lock().sessions = sessions.clone();
        Ok(sessions)
    }

    async fn refresh_sessions(&self) {
        if let Err(err) = self.list_sessions().await {
            tracing::warn!(error = %err, "cannot refresh chat list");
        }
    }

    /// Switch between light and dark and remember the choice.
    pub fn toggle_theme(&self) -> Result<Theme> {
        let theme = {
            let mut state = self.lock();
            state.theme = state.theme.toggle();
            state.theme
        };
        self.store.set_theme(theme)?;
        Ok(theme)
    }

    /// The current theme.
    pub fn theme(&self) -> Theme {
        self.lock().theme
    }

    /// Write the current chat's messages to `path` as JSON.
    pub async fn export_transcript(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = {
            let state = self.lock();
            let transcript = Transcript {
                session_id: state.active_id(),
                title: state.session.as_ref().map(|s| s.title()),
                exported_at: OffsetDateTime::now_utc(),
                messages: &state.messages,
            };
            serde_json::to_vec_pretty(&transcript)?
        };
        tokio::fs::write(path, bytes)
            .await
            .map_err(|err| Error::io(format!("cannot write {}", path.display()), err))
    }

    /// Text of the most recent bot message.
    pub fn last_answer(&self) -> Option<String> {
        self.lock()
            .messages
            .iter()
            .rev()
            .find(|m| m.sender == Sender::Bot)
            .map(|m| m.text.clone())
    }

    /// Messages of the current chat, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages.clone()
    }

    /// Documents of the current chat.
    pub fn files(&self) -> Vec<FileRecord> {
        self.lock().files.clone()
    }

    /// The current chat.
    pub fn current_session(&self) -> Option<ChatSessionRecord> {
        self.lock().session.clone()
    }

    /// Chats as of the last listing.
    pub fn known_sessions(&self) -> Vec<ChatSessionRecord> {
        self.lock().sessions.clone()
    }

    /// Where the lifecycle stands.
    pub fn state(&self) -> SessionState {
        let state = self.lock();
        match (&state.session, state.files.is_empty()) {
            (None, _) => SessionState::NoSession,
            (Some(_), true) => SessionState::WithoutFiles,
            (Some(_), false) => SessionState::WithFiles,
        }
    }

    /// True when a question may be sent now.
    pub fn can_send(&self) -> bool {
        self.state() == SessionState::WithFiles && !self.sending.load(Ordering::Acquire)
    }

    /// Wait for background persistence and renames to finish.
    pub async fn flush_background(&self) {
        self.background.drain().await;
    }

    fn remember(&self, session_id: SessionId) {
        if let Err(err) = self.store.set_last_chat_id(session_id) {
            tracing::warn!(session_id, error = %err, "cannot remember last chat");
        }
    }
}

fn lock_state(state: &Mutex<ControllerState>) -> MutexGuard<'_, ControllerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Bot confirmation after documents are added to a chat holding `count`.
pub fn upload_confirmation(count: usize) -> &'static str {
    if count == 1 {
        "Your document is ready. Ask me anything about it."
    } else {
        "Your documents are ready. Ask me anything about them."
    }
}

/// Chat title derived from its first question.
///
/// Whitespace runs collapse to one space and the result is cut to
/// [`MAX_AUTO_TITLE_CHARS`] characters.
pub fn title_from_message(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_AUTO_TITLE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_state::MemoryStore;
    use crate::testing::FakeBackend;

    fn controller(backend: &Arc<FakeBackend>) -> (DocChat<FakeBackend>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let chat = DocChat::new(Arc::clone(backend), store.clone());
        (chat, store)
    }

    async fn loaded() -> (Arc<FakeBackend>, DocChat<FakeBackend>, Arc<MemoryStore>) {
        let backend = Arc::new(FakeBackend::signed_in());
        let (chat, store) = controller(&backend);
        chat.load().await.unwrap();
        (backend, chat, store)
    }

    fn pdf(name: &str) -> LocalFile {
        LocalFile::new(name, "%PDF-1.7 handbook")
    }

    #[test]
    fn titles_from_messages() {
        assert_eq!(
            title_from_message("  What is   the refund\npolicy? "),
            "What is the refund policy?"
        );
        let long = "word ".repeat(30);
        assert_eq!(title_from_message(&long).chars().count(), MAX_AUTO_TITLE_CHARS);
        assert_eq!(title_from_message("ééé"), "ééé");
    }

    #[test]
    fn confirmation_wording() {
        assert_eq!(
            upload_confirmation(1),
            "Your document is ready. Ask me anything about it."
        );
        assert_eq!(
            upload_confirmation(3),
            "Your documents are ready. Ask me anything about them."
        );
    }

    #[tokio::test]
    async fn load_with_no_sessions_creates_one_without_greeting() {
        let (backend, chat, store) = loaded().await;
        assert_eq!(backend.count("create_session"), 1);
        assert_eq!(chat.state(), SessionState::WithoutFiles);
        assert!(chat.messages().is_empty());
        assert_eq!(store.last_chat_id(), chat.current_session().map(|s| s.id));
    }

    #[tokio::test]
    async fn load_restores_last_chat() {
        let backend = Arc::new(FakeBackend::signed_in());
        backend.insert_session("Older");
        let kept = backend.insert_session("Handbook questions");
        let (chat, store) = controller(&backend);
        store.set_last_chat_id(kept.id).unwrap();
        chat.load().await.unwrap();
        assert_eq!(chat.current_session().map(|s| s.id), Some(kept.id));
        assert_eq!(backend.count("create_session"), 0);
    }

    #[tokio::test]
    async fn load_with_stale_last_chat_and_existing_sessions_stays_idle() {
        let backend = Arc::new(FakeBackend::signed_in());
        backend.insert_session("Older");
        let (chat, store) = controller(&backend);
        store.set_last_chat_id(404).unwrap();
        assert_eq!(chat.load().await.unwrap(), SessionState::NoSession);
        assert_eq!(backend.count("create_session"), 0);
        assert_eq!(store.last_chat_id(), None);
        assert_eq!(chat.known_sessions().len(), 1);
    }

    #[tokio::test]
    async fn load_keeps_last_chat_when_backend_is_down() {
        let backend = Arc::new(FakeBackend::signed_in());
        let kept = backend.insert_session("Handbook questions");
        let (chat, store) = controller(&backend);
        store.set_last_chat_id(kept.id).unwrap();
        backend.fail_get_session();
        let err = chat.load().await.unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(store.last_chat_id(), Some(kept.id));
        assert_eq!(backend.count("create_session"), 0);
    }

    #[tokio::test]
    async fn guest_load_forgets_previous_chat_list() {
        let backend = Arc::new(FakeBackend::signed_in());
        backend.insert_session("Older");
        backend.insert_session("Newer");
        let (chat, _) = controller(&backend);
        chat.load().await.unwrap();
        assert_eq!(chat.known_sessions().len(), 2);

        chat.auth().sign_out().await.unwrap();
        assert_eq!(chat.load().await.unwrap(), SessionState::NoSession);
        assert!(chat.known_sessions().is_empty());
    }

    #[tokio::test]
    async fn guest_upload_reports_refused_files() {
        let backend = Arc::new(FakeBackend::new());
        let (chat, _) = controller(&backend);
        chat.load().await.unwrap();
        let report = chat
            .upload_files(vec![pdf("a.pdf"), LocalFile::new("run.exe", "MZ")])
            .await
            .unwrap();
        assert!(report.uploaded.is_empty());
        assert_eq!(report.rejected.len(), 1);
        assert!(report.session_error.unwrap().is_sign_in_required());
        assert_eq!(backend.count("upload_file"), 0);
    }

    #[tokio::test]
    async fn guest_load_makes_no_chat_calls() {
        let backend = Arc::new(FakeBackend::new());
        let (chat, _) = controller(&backend);
        assert_eq!(chat.load().await.unwrap(), SessionState::NoSession);
        assert_eq!(backend.calls(), vec!["profile".to_string()]);
        let err = chat.new_chat().await.unwrap_err();
        assert!(err.is_sign_in_required());
        assert_eq!(backend.calls(), vec!["profile".to_string()]);
    }

    #[tokio::test]
    async fn new_chat_seeds_greeting() {
        let (_, chat, store) = loaded().await;
        let id = chat.new_chat().await.unwrap().unwrap();
        assert_eq!(store.last_chat_id(), Some(id));
        let messages = chat.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, Sender::Bot);
        assert_eq!(messages[0].text, GREETING);
    }

    #[tokio::test]
    async fn concurrent_new_chat_creates_once() {
        let (backend, chat, _) = loaded().await;
        backend.clear_calls();
        let (a, b) = tokio::join!(chat.new_chat(), chat.new_chat());
        let created: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
        assert_eq!(created.len(), 1);
        assert_eq!(backend.count("create_session"), 1);
    }

    #[tokio::test]
    async fn sending_without_files_is_refused_locally() {
        let (backend, chat, _) = loaded().await;
        backend.clear_calls();
        let err = chat.send_message("What is the refund policy?").await.unwrap_err();
        assert!(err.is_validation());
        let err = chat.send_message("   ").await.unwrap_err();
        assert!(err.is_validation());
        assert!(backend.calls().is_empty());
        assert!(!chat.can_send());
    }

    #[tokio::test]
    async fn oversized_pdf_is_never_uploaded() {
        let (backend, chat, _) = loaded().await;
        backend.clear_calls();
        let big = LocalFile::new("handbook.pdf", vec![0u8; 25 * 1024 * 1024]);
        let report = chat.upload_files(vec![big]).await.unwrap();
        assert_eq!(report.rejected.len(), 1);
        assert!(report.rejected[0].message().contains("too large"));
        assert!(report.uploaded.is_empty());
        assert_eq!(backend.count("upload_file"), 0);
        assert_eq!(chat.state(), SessionState::WithoutFiles);
    }

    #[tokio::test]
    async fn upload_enables_messaging_and_confirms() {
        let (backend, chat, _) = loaded().await;
        let report = chat
            .upload_files(vec![pdf("handbook.pdf"), LocalFile::new("run.exe", "MZ")])
            .await
            .unwrap();
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(chat.state(), SessionState::WithFiles);
        assert_eq!(
            chat.last_answer().as_deref(),
            Some("Your document is ready. Ask me anything about it.")
        );
        chat.flush_background().await;
        let session_id = chat.current_session().unwrap().id;
        assert_eq!(backend.stored_messages(session_id).len(), 1);
    }

    #[tokio::test]
    async fn upload_without_session_creates_one() {
        let backend = Arc::new(FakeBackend::signed_in());
        backend.insert_session("Existing");
        let (chat, _) = controller(&backend);
        assert_eq!(chat.load().await.unwrap(), SessionState::NoSession);
        chat.upload_files(vec![pdf("a.pdf"), pdf("b.pdf")])
            .await
            .unwrap();
        assert_eq!(backend.count("create_session"), 1);
        assert_eq!(chat.files().len(), 2);
        assert_eq!(
            chat.last_answer().as_deref(),
            Some("Your documents are ready. Ask me anything about them.")
        );
    }

    #[tokio::test]
    async fn failed_upload_becomes_notice() {
        let (backend, chat, _) = loaded().await;
        backend.fail_uploads();
        let report = chat.upload_files(vec![pdf("a.pdf")]).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(chat.state(), SessionState::WithoutFiles);
        assert_eq!(
            chat.last_answer().as_deref(),
            Some("Failed to upload \"a.pdf\": Upload failed")
        );
    }

    #[tokio::test]
    async fn first_message_renames_once() {
        let (backend, chat, _) = loaded().await;
        chat.upload_files(vec![pdf("policy.pdf")]).await.unwrap();
        let session_id = chat.current_session().unwrap().id;

        let reply = chat.send_message("What is the refund policy?").await.unwrap();
        assert_eq!(reply.text, "Answer to: What is the refund policy?");
        chat.send_message("And for digital goods?").await.unwrap();
        chat.flush_background().await;

        assert_eq!(backend.count("rename_session"), 1);
        assert_eq!(
            backend.title_of(session_id).as_deref(),
            Some("What is the refund policy?")
        );
        assert_eq!(
            chat.current_session().map(|s| s.session_name),
            Some("What is the refund policy?".to_string())
        );
        let stored = backend.stored_messages(session_id);
        assert!(stored.contains(&(Sender::User, "What is the refund policy?".to_string())));
    }

    #[tokio::test]
    async fn user_title_is_not_overwritten() {
        let (backend, chat, _) = loaded().await;
        chat.upload_files(vec![pdf("policy.pdf")]).await.unwrap();
        let session_id = chat.current_session().unwrap().id;
        chat.rename_session(session_id, "Policies").await.unwrap();
        chat.send_message("What is the refund policy?").await.unwrap();
        chat.flush_background().await;
        assert_eq!(backend.title_of(session_id).as_deref(), Some("Policies"));
        assert_eq!(backend.count("rename_session"), 1);
    }

    #[tokio::test]
    async fn empty_rename_is_refused() {
        let (backend, chat, _) = loaded().await;
        let session_id = chat.current_session().unwrap().id;
        backend.clear_calls();
        assert!(chat.rename_session(session_id, "  ").await.unwrap_err().is_validation());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn processing_failure_is_a_notice() {
        let (backend, chat, _) = loaded().await;
        chat.upload_files(vec![pdf("policy.pdf")]).await.unwrap();
        backend.fail_process();
        backend.fail_save();
        let reply = chat.send_message("Anything?").await.unwrap();
        assert_eq!(reply.sender, Sender::Bot);
        assert!(reply.text.contains("Error processing message"));
        assert!(chat.can_send());
    }

    #[tokio::test]
    async fn deleting_active_session_replaces_it_once() {
        let (backend, chat, store) = loaded().await;
        let old = chat.current_session().unwrap().id;
        backend.clear_calls();
        chat.delete_session(old).await.unwrap();
        assert_eq!(backend.count("create_session"), 1);
        let current = chat.current_session().unwrap().id;
        assert_ne!(current, old);
        assert_eq!(store.last_chat_id(), Some(current));
        assert_eq!(backend.session_ids(), vec![current]);
    }

    #[tokio::test]
    async fn deleting_other_session_keeps_current() {
        let (backend, chat, _) = loaded().await;
        let current = chat.current_session().unwrap().id;
        let other = backend.insert_session("Other");
        backend.clear_calls();
        chat.delete_session(other.id).await.unwrap();
        assert_eq!(backend.count("create_session"), 0);
        assert_eq!(chat.current_session().map(|s| s.id), Some(current));
    }

    #[tokio::test]
    async fn removing_last_file_disables_messaging() {
        let (_, chat, _) = loaded().await;
        let report = chat.upload_files(vec![pdf("a.pdf")]).await.unwrap();
        let file_id = report.uploaded[0].id;
        assert_eq!(chat.delete_file(file_id).await.unwrap(), SessionState::WithoutFiles);
        assert!(chat.send_message("still there?").await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn file_kept_by_backend_stays_attached() {
        let (backend, chat, _) = loaded().await;
        let report = chat.upload_files(vec![pdf("a.pdf")]).await.unwrap();
        let file_id = report.uploaded[0].id;
        backend.keep_files();
        let err = chat.delete_file(file_id).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(chat.files().len(), 1);
        assert_eq!(chat.state(), SessionState::WithFiles);
    }

    #[tokio::test]
    async fn switching_loads_history() {
        let (_, chat, store) = loaded().await;
        let first = chat.current_session().unwrap().id;
        chat.upload_files(vec![pdf("a.pdf")]).await.unwrap();
        chat.send_message("Question one").await.unwrap();
        chat.flush_background().await;
        chat.new_chat().await.unwrap();
        chat.switch_session(first).await.unwrap();
        assert_eq!(store.last_chat_id(), Some(first));
        assert_eq!(chat.state(), SessionState::WithFiles);
        let texts: Vec<_> = chat.messages().into_iter().map(|m| m.text).collect();
        assert!(texts.contains(&"Question one".to_string()));
        assert!(texts.contains(&"Answer to: Question one".to_string()));
    }

    #[tokio::test]
    async fn theme_toggle_persists() {
        let (_, chat, store) = loaded().await;
        assert_eq!(chat.theme(), Theme::Light);
        assert_eq!(chat.toggle_theme().unwrap(), Theme::Dark);
        assert_eq!(store.theme(), Theme::Dark);
    }

    #[tokio::test]
    async fn export_writes_messages() {
        let (_, chat, _) = loaded().await;
        chat.new_chat().await.unwrap();
        let path = std::env::temp_dir().join(format!("docchat-export-{}.json", std::process::id()));
        chat.export_transcript(&path).await.unwrap();
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["messages"][0]["text"], GREETING);
        assert_eq!(written["title"], DEFAULT_SESSION_TITLE);
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn sign_out_forgets_session() {
        let (_, chat, _) = loaded().await;
        chat.sign_out().await.unwrap();
        assert_eq!(chat.state(), SessionState::NoSession);
        assert!(!chat.auth().is_logged_in());
    }
}
