use serde::{Deserialize, Serialize};

use crate::types::User;

/// Body of `/user/register` and `/user/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    /// Login email.
    pub email: String,
    /// Plain-text password, sent over TLS.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Body of `/user/forgot-password` and `/user/resend-verification`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailRequest {
    /// Target email.
    pub email: String,
}

/// Body of `/user/verify`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyEmailRequest {
    /// Email being verified.
    pub email: String,
    /// One-time code sent by email.
    pub otp_code: String,
}

/// Body of `/user/reset-password`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResetPasswordRequest {
    /// Account email.
    pub email: String,
    /// One-time code sent by email.
    pub otp_code: String,
    /// Replacement password.
    pub new_password: String,
}

/// Body of `/user/refresh-token` and `/user/logout`.
///
/// The refresh token normally travels as a cookie, so the field is usually
/// empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshTokenRequest {
    /// Explicit refresh token, if not using the cookie.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Common envelope of every `/user/*` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthResponse {
    /// Whether the backend considers the call successful.
    #[serde(default)]
    pub success: bool,

    /// Human-readable status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The user, on login, verify and profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// Echoed email, on register.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Next-step hint, on register.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// True when the backend is up.
    #[serde(default)]
    pub ok: bool,
}
