//! Current-user state shared by storage and the controller.
//!
//! An [`AuthContext`] is constructed once and handed around as an `Arc`.  It
//! holds the signed-in user, or nothing in guest mode, and broadcasts an
//! [`AuthEvent`] whenever sign-in state is (re)established.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{AuthResponse, Credentials, ResetPasswordRequest, User, VerifyEmailRequest};

const EVENT_CAPACITY: usize = 16;

/// Sign-in state change delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user is signed in.
    SignedIn(User),
    /// Nobody is signed in.
    SignedOut,
}

impl AuthEvent {
    fn from_user(user: Option<User>) -> Self {
        match user {
            Some(user) => AuthEvent::SignedIn(user),
            None => AuthEvent::SignedOut,
        }
    }
}

/// A live registration for [`AuthEvent`]s.
///
/// Dropping the subscription cancels delivery.
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    /// Wait for the next event.
    ///
    /// Returns `None` once the context is gone.  Events missed because the
    /// subscriber fell behind are skipped.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "auth subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The next event, if one is already queued.
    pub fn try_recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {}
}

/// Holder of the current user.
pub struct AuthContext<B: Backend> {
    backend: Arc<B>,
    user: Mutex<Option<User>>,
    events: broadcast::Sender<AuthEvent>,
}

impl<B: Backend> AuthContext<B> {
    /// A context with nobody signed in.
    pub fn new(backend: Arc<B>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            user: Mutex::new(None),
            events,
        }
    }

    /// Fetch the profile and adopt it as the current user.
    ///
    /// Any failure, including an expired session, leaves the context in guest
    /// mode and returns false.
    pub async fn init(&self) -> bool {
        match self.backend.profile().await {
            Ok(AuthResponse {
                user: Some(user), ..
            }) => {
                tracing::info!(user_id = user.id, "session restored");
                self.set_user(Some(user));
                true
            }
            Ok(_) => {
                self.set_user(None);
                false
            }
            Err(err) => {
                tracing::debug!(error = %err, "no authenticated session");
                self.set_user(None);
                false
            }
        }
    }

    /// Re-run [`init`](Self::init) and tell every subscriber the outcome.
    pub async fn revalidate(&self) -> bool {
        let signed_in = self.init().await;
        self.emit();
        signed_in
    }

    /// Register for sign-in state changes.
    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            receiver: self.events.subscribe(),
        }
    }

    /// Log in and adopt the returned user.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let response = self
            .backend
            .login(&Credentials::new(email, password))
            .await?;
        let Some(user) = response.user else {
            return Err(Error::authentication(
                response
                    .message
                    .unwrap_or_else(|| "Login failed".to_string()),
            ));
        };
        tracing::info!(user_id = user.id, "signed in");
        self.set_user(Some(user.clone()));
        self.emit();
        Ok(user)
    }

    /// Register a new account.
    ///
    /// The account must be verified before it can sign in, so the context
    /// stays signed out.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthResponse> {
        self.backend
            .register(&Credentials::new(email, password))
            .await
    }

    /// Log out.
    ///
    /// Local state is cleared even when the backend call fails; the failure is
    /// still returned.
    pub async fn sign_out(&self) -> Result<()> {
        let outcome = self.backend.logout().await;
        self.set_user(None);
        self.emit();
        tracing::info!("signed out");
        outcome.map(|_| ())
    }

    /// Confirm an email with its one-time code.
    ///
    /// Adopts the user when the backend signs them in as part of verification.
    pub async fn verify_email(&self, email: &str, otp_code: &str) -> Result<AuthResponse> {
        let request = VerifyEmailRequest {
            email: email.to_string(),
            otp_code: otp_code.to_string(),
        };
        let response = self.backend.verify_email(&request).await?;
        if let Some(user) = response.user.clone() {
            self.set_user(Some(user));
            self.emit();
        }
        Ok(response)
    }

    /// Ask the backend to email a password-reset code.
    pub async fn request_password_reset(&self, email: &str) -> Result<AuthResponse> {
        self.backend.forgot_password(email).await
    }

    /// Set a new password using the emailed code.
    pub async fn confirm_password_reset(
        &self,
        email: &str,
        otp_code: &str,
        new_password: &str,
    ) -> Result<AuthResponse> {
        let request = ResetPasswordRequest {
            email: email.to_string(),
            otp_code: otp_code.to_string(),
            new_password: new_password.to_string(),
        };
        self.backend.reset_password(&request).await
    }

    /// Ask for another verification code.
    pub async fn resend_verification(&self, email: &str) -> Result<AuthResponse> {
        self.backend.resend_verification(email).await
    }

    /// The signed-in user, if any.
    pub fn current_user(&self) -> Option<User> {
        self.lock().clone()
    }

    /// True when a user is signed in.
    pub fn is_logged_in(&self) -> bool {
        self.lock().is_some()
    }

    /// True when chats may be persisted, which requires a user.
    pub fn can_save_chat(&self) -> bool {
        self.is_logged_in()
    }

    fn set_user(&self, user: Option<User>) {
        *self.lock() = user;
    }

    fn emit(&self) {
        // No subscribers is not an error.
        let _ = self.events.send(AuthEvent::from_user(self.current_user()));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<User>> {
        self.user
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
